pub mod decay;
pub mod gossip;
pub mod lifecycle;
pub mod router;
pub mod stats;
pub mod types;

use anyhow::Result;
use braid::config::BraidConfig;
use braid::engine::{spawn_sweeper, CaptureRequest, MemoryEngine};
use braid::memory::lifecycle::SplitPartition;
use braid::memory::types::{OriginType, SplitLockMode};
use clap::{Parser, Subcommand};
use std::io::Read;
use std::str::FromStr;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "braid", version, about = "Decaying thread memory engine for AI agents")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the engine with the periodic sweep loop until interrupted
    Run,
    /// Capture content from stdin into the thread population
    Capture {
        /// Origin of the content: prompt, file_read, task, fetch
        #[arg(long, default_value = "prompt")]
        origin: String,
        /// Originating file, recorded as message metadata
        #[arg(long)]
        file: Option<String>,
    },
    /// Run one maintenance sweep (decay, archival, bridge pruning)
    Sweep,
    /// Show store statistics
    Stats,
    /// Walk the bridge graph outward from a thread
    Network {
        thread_id: String,
        #[arg(long, default_value_t = 2)]
        hops: usize,
    },
    /// Set the quota mode: light, normal, heavy, max
    Mode { mode: String },
    /// Merge one thread into another (the absorbed thread is archived)
    Merge {
        survivor_id: String,
        absorbed_id: String,
    },
    /// Split messages out of a thread; partitions are read from stdin as
    /// JSON: [{"title": "...", "message_ids": ["..."], "topics": ["..."]}]
    Split {
        thread_id: String,
        /// Lock mode for the new children: compaction, agent_release, force
        #[arg(long, default_value = "agent_release")]
        lock: String,
    },
    /// Release a thread's split lock
    Release { thread_id: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = BraidConfig::load()?;

    // Log to stderr so stdout stays clean for command output.
    let filter = EnvFilter::try_new(&config.server.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let engine = MemoryEngine::new(config)?;

    match cli.command {
        Command::Run => {
            let engine = Arc::new(engine);
            let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
            let sweeper = spawn_sweeper(engine, shutdown_rx);
            tracing::info!("engine running, ctrl-c to stop");

            tokio::signal::ctrl_c().await?;
            shutdown_tx.send(true)?;
            sweeper.await?;
        }
        Command::Capture { origin, file } => {
            let origin = OriginType::from_str(&origin).map_err(anyhow::Error::msg)?;
            let mut content = String::new();
            std::io::stdin().read_to_string(&mut content)?;

            let mut request = CaptureRequest::new(content, origin);
            request.file_path = file;
            let result = engine.capture(request)?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Command::Sweep => {
            let report = engine.sweep()?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Stats => {
            let stats = engine.stats()?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        Command::Network { thread_id, hops } => {
            let network = engine.network(&thread_id, hops)?;
            println!("{}", serde_json::to_string_pretty(&network)?);
        }
        Command::Mode { mode } => {
            let quota = engine.set_mode(&mode)?;
            println!("mode {mode} (quota {quota})");
        }
        Command::Merge {
            survivor_id,
            absorbed_id,
        } => {
            let result = engine.merge(&survivor_id, &absorbed_id)?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Command::Split { thread_id, lock } => {
            let lock = SplitLockMode::from_str(&lock).map_err(anyhow::Error::msg)?;
            let mut input = String::new();
            std::io::stdin().read_to_string(&mut input)?;
            let partitions: Vec<SplitPartition> = serde_json::from_str(&input)?;

            let children = engine.split(&thread_id, &partitions, lock)?;
            for child in children {
                println!("{}\t{}", child.id, child.title);
            }
        }
        Command::Release { thread_id } => {
            let released = engine.release_split_lock(&thread_id)?;
            println!("{}", if released { "released" } else { "not locked" });
        }
    }

    Ok(())
}

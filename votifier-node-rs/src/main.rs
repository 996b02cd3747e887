//! Votifier Node
//!
//! Standalone host for the vote receiver:
//! - `run` - Listen for votes until Ctrl-C
//! - `keygen` - Create the RSA key pair handed to vote-reporting services
//! - `send` - Deliver a single vote to a running receiver

mod config;
mod error;
mod keystore;
mod listeners;
mod service;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};
use votifier_core::{Vote, VoteSender};

use crate::config::{NodeConfig, CONFIG_FILE};
use crate::error::NodeError;
use crate::keystore::KeyStore;
use crate::listeners::{LogListener, VoteLogListener};
use crate::service::Service;

#[derive(Parser)]
#[command(name = "votifier-node")]
#[command(about = "Receives vote notifications from vote-reporting services")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Listen for votes until interrupted
    Run {
        /// Directory holding config.json and the rsa/ key pair
        #[arg(short, long, default_value = "./votifier")]
        data_dir: PathBuf,
    },

    /// Generate the RSA key pair
    Keygen {
        /// Directory holding the rsa/ key pair
        #[arg(short, long, default_value = "./votifier")]
        data_dir: PathBuf,

        /// Replace an existing key pair
        #[arg(long)]
        force: bool,
    },

    /// Send one vote to a receiver
    Send {
        /// Receiver host
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Receiver port
        #[arg(short, long, default_value = "8192")]
        port: u16,

        /// Path to the receiver's public.key
        #[arg(short = 'k', long)]
        public_key: PathBuf,

        /// Name of the reporting service
        #[arg(short, long)]
        service: String,

        /// Voting user
        #[arg(short, long)]
        username: String,

        /// Voter's IP address
        #[arg(short, long, default_value = "127.0.0.1")]
        address: String,

        /// Vote timestamp, defaults to now (unix seconds)
        #[arg(short, long)]
        timestamp: Option<String>,

        /// Give up after this many seconds
        #[arg(long, default_value = "5")]
        timeout: u64,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize logging, RUST_LOG wins over the flags
    let level = if cli.verbose { "debug" } else { cli.log_level.as_str() };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    fmt().with_env_filter(filter).with_target(false).init();

    let result = match cli.command {
        Commands::Run { data_dir } => run(&data_dir).await,
        Commands::Keygen { data_dir, force } => keygen(&data_dir, force),
        Commands::Send {
            host,
            port,
            public_key,
            service,
            username,
            address,
            timestamp,
            timeout,
        } => {
            let timestamp = timestamp.unwrap_or_else(|| chrono::Utc::now().timestamp().to_string());
            match Vote::new(service, username, address, timestamp) {
                Ok(vote) => send(&host, port, &public_key, &vote, Duration::from_secs(timeout)).await,
                Err(e) => Err(NodeError::InvalidVote(e.to_string())),
            }
        }
    };

    if let Err(e) = result {
        error!("{}", e);
        std::process::exit(1);
    }
}

async fn run(data_dir: &Path) -> Result<(), NodeError> {
    let mut service = match init(data_dir) {
        Ok(service) => service,
        Err(e) => {
            error!("Votifier did not initialize properly!");
            return Err(e);
        }
    };

    if let Err(e) = service.enable().await {
        error!("Votifier did not initialize properly!");
        return Err(e);
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl-C: {}", e);
    }

    service.disable().await;

    let stats = service.stats();
    info!(
        "Connections: {} accepted, {} delivered, {} rejected",
        stats.accepted, stats.delivered, stats.rejected
    );
    Ok(())
}

fn init(data_dir: &Path) -> Result<Service, NodeError> {
    let (config, _) = NodeConfig::load_or_create(&data_dir.join(CONFIG_FILE))?;
    let keys = KeyStore::new(data_dir.join("rsa")).load_or_generate()?;

    let service = Service::new(config.receiver_config(), keys);
    service.registry().register(Arc::new(LogListener));

    if let Some(path) = &config.vote_log {
        // Relative paths live in the data directory
        let path = data_dir.join(path);
        let listener = VoteLogListener::open(&path)?;
        info!("Logging votes to {}", listener.path().display());
        service.registry().register(Arc::new(listener));
    }

    Ok(service)
}

fn keygen(data_dir: &Path, force: bool) -> Result<(), NodeError> {
    let store = KeyStore::new(data_dir.join("rsa"));
    if store.exists() && !force {
        info!(
            "Key pair already exists in {} (use --force to replace it)",
            data_dir.join("rsa").display()
        );
        return Ok(());
    }

    let keys = votifier_core::KeyPair::generate()?;
    store.save(&keys)?;
    info!("Public key written to {}", store.public_key_path().display());
    Ok(())
}

async fn send(
    host: &str,
    port: u16,
    public_key: &Path,
    vote: &Vote,
    timeout: Duration,
) -> Result<(), NodeError> {
    let key = keystore::read_public_key(public_key)?;

    let addr = tokio::net::lookup_host((host, port))
        .await
        .ok()
        .and_then(|mut addrs| addrs.next())
        .ok_or_else(|| NodeError::Resolve(format!("{}:{}", host, port)))?;

    let greeting = VoteSender::new(addr, key)
        .with_timeout(timeout)
        .send(vote)
        .await?;
    info!("Sent {} to {} ({})", vote, addr, greeting);
    Ok(())
}

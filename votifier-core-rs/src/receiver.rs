//! TCP vote receiver
//!
//! Owns the listening socket and the accept loop. Every accepted connection
//! is handled on its own task inside a `JoinSet` owned by the accept loop, so
//! a stalled client never holds up the next accept and shutdown knows exactly
//! which handlers are still running.
//!
//! ```text
//! Stopped ──start()──► Starting ──bind ok──► Running
//!    ▲                    │                     │
//!    │                 bind err             shutdown()
//!    │                    ▼                     ▼
//!    └──────────────── Stopped ◄──drain── ShuttingDown
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

use crate::crypto::{CryptoCodec, KeyPair, PayloadDecryptor};
use crate::error::{BindError, ShutdownTimeoutError};
use crate::handler::ConnectionHandler;
use crate::listener::ListenerRegistry;
use crate::stats::{ReceiverStats, StatsSnapshot};

/// Default port when the host has nothing better
pub const DEFAULT_PORT: u16 = 8192;

/// Pause after a failed accept, e.g. when out of file descriptors
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Receiver settings supplied by the host
#[derive(Debug, Clone)]
pub struct ReceiverConfig {
    pub host: String,
    pub port: u16,

    /// Log rejected votes in detail
    pub debug: bool,

    /// How long a client gets to deliver its block
    pub read_timeout: Duration,

    /// How long shutdown waits for in-flight connections
    pub shutdown_grace: Duration,

    /// Version announced in the greeting line
    pub version: String,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            debug: false,
            read_timeout: Duration::from_secs(5),
            shutdown_grace: Duration::from_secs(5),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl ReceiverConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Lifecycle state of a [`VoteReceiver`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiverState {
    Stopped,
    Starting,
    Running,
    ShuttingDown,
}

/// How a shutdown went
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// Receiver was not running
    AlreadyStopped,
    /// Every in-flight connection finished within the grace period
    Graceful { drained: usize },
    /// Some connections were aborted after the grace period
    Forced { aborted: usize },
}

struct RunningReceiver {
    local_addr: SocketAddr,
    shutdown_tx: watch::Sender<bool>,
    accept_task: JoinHandle<ShutdownOutcome>,
}

/// Accepts vote connections and hands them to a [`ConnectionHandler`].
///
/// Dropping a running receiver also stops the accept loop, but only
/// [`VoteReceiver::shutdown`] waits for in-flight connections.
pub struct VoteReceiver {
    config: ReceiverConfig,
    decryptor: Arc<dyn PayloadDecryptor>,
    registry: Arc<ListenerRegistry>,
    stats: Arc<ReceiverStats>,
    state: ReceiverState,
    running: Option<RunningReceiver>,
}

impl VoteReceiver {
    /// Create a stopped receiver decrypting with `keys`
    pub fn new(config: ReceiverConfig, keys: Arc<KeyPair>, registry: Arc<ListenerRegistry>) -> Self {
        Self::with_decryptor(config, Arc::new(CryptoCodec::new(keys)), registry)
    }

    pub fn with_decryptor(
        config: ReceiverConfig,
        decryptor: Arc<dyn PayloadDecryptor>,
        registry: Arc<ListenerRegistry>,
    ) -> Self {
        Self {
            config,
            decryptor,
            registry,
            stats: Arc::new(ReceiverStats::default()),
            state: ReceiverState::Stopped,
            running: None,
        }
    }

    pub fn state(&self) -> ReceiverState {
        self.state
    }

    /// Address actually bound, while running
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.running.as_ref().map(|r| r.local_addr)
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub fn registry(&self) -> &Arc<ListenerRegistry> {
        &self.registry
    }

    /// Bind the configured address and start accepting connections.
    ///
    /// Returns the bound address. Calling this while already running is a
    /// no-op.
    pub async fn start(&mut self) -> Result<SocketAddr, BindError> {
        if let Some(running) = &self.running {
            warn!("Vote receiver already running on {}", running.local_addr);
            return Ok(running.local_addr);
        }

        self.state = ReceiverState::Starting;
        let addr = self.config.bind_addr();

        let listener = match TcpListener::bind(&addr).await {
            Ok(listener) => listener,
            Err(source) => {
                self.state = ReceiverState::Stopped;
                return Err(BindError { addr, source });
            }
        };
        let local_addr = match listener.local_addr() {
            Ok(local_addr) => local_addr,
            Err(source) => {
                self.state = ReceiverState::Stopped;
                return Err(BindError { addr, source });
            }
        };

        let handler = ConnectionHandler::new(
            self.decryptor.clone(),
            self.registry.clone(),
            &self.config.version,
            self.config.read_timeout,
        )
        .with_debug(self.config.debug)
        .with_stats(self.stats.clone());

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let accept_task = tokio::spawn(accept_loop(
            listener,
            Arc::new(handler),
            self.stats.clone(),
            shutdown_rx,
            self.config.shutdown_grace,
        ));

        self.running = Some(RunningReceiver {
            local_addr,
            shutdown_tx,
            accept_task,
        });
        self.state = ReceiverState::Running;

        info!("Vote receiver listening on {}", local_addr);
        if self.config.debug {
            info!("DEBUG mode enabled!");
        }
        Ok(local_addr)
    }

    /// Stop accepting, then wait for in-flight connections.
    ///
    /// Handlers still running after the grace period are aborted. Calling
    /// this on a stopped receiver does nothing.
    pub async fn shutdown(&mut self) -> ShutdownOutcome {
        let Some(running) = self.running.take() else {
            return ShutdownOutcome::AlreadyStopped;
        };

        self.state = ReceiverState::ShuttingDown;
        info!("Shutting down vote receiver on {}", running.local_addr);

        let _ = running.shutdown_tx.send(true);
        let outcome = match running.accept_task.await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("Vote receiver accept loop failed: {}", e);
                ShutdownOutcome::Forced { aborted: 0 }
            }
        };

        self.state = ReceiverState::Stopped;
        info!("Vote receiver stopped ({:?})", outcome);
        outcome
    }
}

async fn accept_loop(
    listener: TcpListener,
    handler: Arc<ConnectionHandler>,
    stats: Arc<ReceiverStats>,
    mut shutdown_rx: watch::Receiver<bool>,
    grace: Duration,
) -> ShutdownOutcome {
    let mut tasks = JoinSet::new();

    loop {
        tokio::select! {
            biased;

            // Fires on shutdown() and when the receiver is dropped
            _ = shutdown_rx.changed() => break,

            Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                log_join(joined);
            }

            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    stats.record_accepted();
                    debug!("Accepted connection from {}", peer);

                    let handler = handler.clone();
                    tasks.spawn(async move {
                        let _ = handler.handle(stream, peer).await;
                    });
                }
                Err(e) => {
                    error!("Vote receiver accept error: {}", e);
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            },
        }
    }

    // Close the socket before draining so new clients are refused
    drop(listener);
    drain(tasks, grace).await
}

async fn drain(mut tasks: JoinSet<()>, grace: Duration) -> ShutdownOutcome {
    let in_flight = tasks.len();
    if in_flight > 0 {
        debug!("Waiting for {} in-flight connection(s)", in_flight);
    }

    let finished = tokio::time::timeout(grace, async {
        while let Some(joined) = tasks.join_next().await {
            log_join(joined);
        }
    })
    .await;

    if finished.is_ok() {
        return ShutdownOutcome::Graceful { drained: in_flight };
    }

    let err = ShutdownTimeoutError {
        outstanding: tasks.len(),
        grace,
    };
    warn!("Vote receiver shutdown: {}", err);

    tasks.abort_all();
    while tasks.join_next().await.is_some() {}

    ShutdownOutcome::Forced {
        aborted: err.outstanding,
    }
}

fn log_join(joined: Result<(), JoinError>) {
    if let Err(e) = joined {
        if e.is_panic() {
            error!("Connection handler panicked: {}", e);
        }
    }
}

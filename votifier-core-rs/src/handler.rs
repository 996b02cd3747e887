//! Per-connection vote handling
//!
//! One call to [`ConnectionHandler::handle`] runs the full exchange for one
//! client: greeting, ciphertext block, decrypt, parse, dispatch, close.
//! Nothing is written back after the greeting, whatever the outcome.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, error, info, warn};

use crate::crypto::PayloadDecryptor;
use crate::error::{ConnectionError, MalformedVoteError};
use crate::listener::{DispatchReport, ListenerRegistry};
use crate::protocol;
use crate::stats::ReceiverStats;
use crate::vote::Vote;

/// Runs the vote exchange on accepted connections
pub struct ConnectionHandler {
    decryptor: Arc<dyn PayloadDecryptor>,
    registry: Arc<ListenerRegistry>,
    stats: Arc<ReceiverStats>,
    greeting: String,
    read_timeout: Duration,
    debug: bool,
}

impl ConnectionHandler {
    pub fn new(
        decryptor: Arc<dyn PayloadDecryptor>,
        registry: Arc<ListenerRegistry>,
        version: &str,
        read_timeout: Duration,
    ) -> Self {
        Self {
            decryptor,
            registry,
            stats: Arc::new(ReceiverStats::default()),
            greeting: protocol::greeting(version),
            read_timeout,
            debug: false,
        }
    }

    /// Log rejected votes with full detail
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn with_stats(mut self, stats: Arc<ReceiverStats>) -> Self {
        self.stats = stats;
        self
    }

    /// Handle one connection to completion.
    ///
    /// Takes ownership of the stream, so the socket is closed exactly once
    /// when this returns, on every path. Errors are logged here; the return
    /// value only informs the caller.
    pub async fn handle<S>(
        &self,
        mut stream: S,
        peer: SocketAddr,
    ) -> Result<DispatchReport, ConnectionError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let result = self.exchange(&mut stream).await;

        // Best effort; the peer may already be gone
        let _ = stream.shutdown().await;
        drop(stream);

        match result {
            Ok(vote) => {
                info!("Received {} via {}", vote, peer);
                let report = self.dispatch(vote).await;
                self.stats.record_delivered();
                Ok(report)
            }
            Err(ConnectionError::Malformed(e)) => {
                self.stats.record_rejected();
                self.log_rejection(&e, peer);
                Err(ConnectionError::Malformed(e))
            }
            Err(ConnectionError::Io(e)) => {
                self.stats.record_rejected();
                debug!("Connection from {} failed: {}", peer, e);
                Err(ConnectionError::Io(e))
            }
        }
    }

    /// Run the listeners on the blocking pool.
    ///
    /// Listeners are synchronous and may block on I/O. Off the async workers
    /// they cannot stall other connections, and aborting this task during
    /// shutdown abandons the wait instead of hanging on the listener.
    async fn dispatch(&self, vote: Vote) -> DispatchReport {
        let registry = self.registry.clone();
        match tokio::task::spawn_blocking(move || registry.dispatch(&vote)).await {
            Ok(report) => report,
            Err(e) => {
                error!("Vote dispatch task failed: {}", e);
                DispatchReport::default()
            }
        }
    }

    async fn exchange<S>(&self, stream: &mut S) -> Result<Vote, ConnectionError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        stream.write_all(self.greeting.as_bytes()).await?;
        stream.flush().await?;

        let block = self.read_block(stream).await?;
        let plaintext = self
            .decryptor
            .decrypt(&block)
            .map_err(MalformedVoteError::from)?;
        let vote = protocol::parse(&plaintext)?;
        Ok(vote)
    }

    /// Read exactly one ciphertext block, bounded by the read timeout.
    ///
    /// Shorter payloads never reach the decryptor. Bytes sent after the
    /// first block are left unread, so an oversized payload still has its
    /// first block decrypted, as Votifier receivers have always done.
    async fn read_block<S>(&self, stream: &mut S) -> Result<Vec<u8>, ConnectionError>
    where
        S: AsyncRead + Unpin,
    {
        let expected = self.decryptor.block_size();
        let mut block = vec![0u8; expected];
        let mut received = 0;

        let read_all = async {
            while received < expected {
                let n = stream.read(&mut block[received..]).await?;
                if n == 0 {
                    return Err(ConnectionError::Malformed(MalformedVoteError::Truncated {
                        expected,
                        received,
                    }));
                }
                received += n;
            }
            Ok::<(), ConnectionError>(())
        };

        match tokio::time::timeout(self.read_timeout, read_all).await {
            Ok(Ok(())) => Ok(block),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(ConnectionError::Malformed(MalformedVoteError::Timeout {
                expected,
                received,
            })),
        }
    }

    fn log_rejection(&self, err: &MalformedVoteError, peer: SocketAddr) {
        if !self.debug {
            info!("Ignored {} vote from {}", err.kind(), peer);
            return;
        }

        match err {
            MalformedVoteError::Decryption(e) => {
                warn!(
                    "Could not decrypt vote from {}: {} (is the service using the current public key?)",
                    peer, e
                );
            }
            MalformedVoteError::Truncated { received: 0, .. } => {
                // Health checks open and close without sending anything
                debug!("Connection from {} closed without a payload", peer);
            }
            other => {
                warn!("Malformed vote from {}: {}", peer, other);
            }
        }
    }
}

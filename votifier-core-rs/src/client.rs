//! Sending side of the protocol
//!
//! What a vote-reporting service does: connect, read the greeting, send one
//! encrypted block. Used to test receivers end to end.

use std::net::SocketAddr;
use std::time::Duration;

use rsa::RsaPublicKey;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::debug;

use crate::crypto;
use crate::error::SendError;
use crate::protocol::{self, GREETING_PREFIX};
use crate::vote::Vote;

/// Sends votes to one receiver
#[derive(Debug, Clone)]
pub struct VoteSender {
    addr: SocketAddr,
    public_key: RsaPublicKey,
    timeout: Duration,
}

impl VoteSender {
    pub fn new(addr: SocketAddr, public_key: RsaPublicKey) -> Self {
        Self {
            addr,
            public_key,
            timeout: Duration::from_secs(5),
        }
    }

    /// Bound on the whole exchange
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Deliver one vote. Returns the receiver's greeting line.
    pub async fn send(&self, vote: &Vote) -> Result<String, SendError> {
        let block = crypto::encrypt(&self.public_key, &protocol::encode(vote))?;

        tokio::time::timeout(self.timeout, self.exchange(&block))
            .await
            .map_err(|_| SendError::Timeout(self.addr.to_string()))?
    }

    async fn exchange(&self, block: &[u8]) -> Result<String, SendError> {
        let stream = TcpStream::connect(self.addr).await?;
        let mut reader = BufReader::new(stream);

        let mut greeting = String::new();
        reader.read_line(&mut greeting).await?;
        let greeting = greeting.trim_end().to_string();
        if !greeting.starts_with(GREETING_PREFIX) {
            return Err(SendError::UnexpectedGreeting(greeting));
        }
        debug!("Connected to {} ({})", self.addr, greeting);

        let stream = reader.get_mut();
        stream.write_all(block).await?;
        stream.shutdown().await?;

        Ok(greeting)
    }
}

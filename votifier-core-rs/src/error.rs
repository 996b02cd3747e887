//! Error types for the vote receiver
//!
//! Only [`BindError`] ever leaves the receiver. Everything that goes wrong on
//! a single connection is contained in the connection handler and logged.

use std::io;
use std::time::Duration;

use thiserror::Error;

/// The listening socket could not be established
#[derive(Debug, Error)]
#[error("failed to bind vote receiver to {addr}: {source}")]
pub struct BindError {
    pub addr: String,
    #[source]
    pub source: io::Error,
}

/// Ciphertext could not be decrypted with the held private key
#[derive(Debug, Error)]
pub enum DecryptionError {
    #[error("ciphertext is {actual} bytes, expected {expected}")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("RSA decryption failed: {0}")]
    Rsa(#[from] rsa::Error),
}

/// A vote that failed structural validation or never fully arrived
#[derive(Debug, Error)]
pub enum MalformedVoteError {
    #[error("connection closed after {received} of {expected} bytes")]
    Truncated { expected: usize, received: usize },

    #[error("timed out after {received} of {expected} bytes")]
    Timeout { expected: usize, received: usize },

    #[error(transparent)]
    Decryption(#[from] DecryptionError),

    #[error("payload does not start with the opening token")]
    BadOpeningToken,

    #[error("missing field: {0}")]
    MissingField(&'static str),

    #[error("blank field: {0}")]
    BlankField(&'static str),

    #[error("field {0} is not valid UTF-8")]
    NotUtf8(&'static str),

    #[error("field {0} contains a line break")]
    LineBreak(&'static str),
}

impl MalformedVoteError {
    /// Short label for minimal (non-debug) log lines
    pub fn kind(&self) -> &'static str {
        match self {
            MalformedVoteError::Truncated { .. } => "truncated",
            MalformedVoteError::Timeout { .. } => "timeout",
            MalformedVoteError::Decryption(_) => "undecryptable",
            MalformedVoteError::BadOpeningToken
            | MalformedVoteError::MissingField(_)
            | MalformedVoteError::BlankField(_)
            | MalformedVoteError::NotUtf8(_)
            | MalformedVoteError::LineBreak(_) => "malformed",
        }
    }
}

/// Error returned by a listener that could not handle a vote
pub type ListenerError = Box<dyn std::error::Error + Send + Sync>;

/// Why a single listener failed during dispatch
#[derive(Debug, Error)]
pub enum DispatchFailure {
    #[error("returned error: {0}")]
    Error(ListenerError),

    #[error("panicked: {0}")]
    Panic(String),
}

/// One listener failed while being notified
#[derive(Debug, Error)]
#[error("listener '{listener}' {failure}")]
pub struct DispatchError {
    pub listener: String,
    pub failure: DispatchFailure,
}

/// In-flight connections outlived the shutdown grace period
#[derive(Debug, Error)]
#[error("{outstanding} connection handler(s) still running after {grace:?}, aborting")]
pub struct ShutdownTimeoutError {
    pub outstanding: usize,
    pub grace: Duration,
}

/// Failure while processing one connection
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error(transparent)]
    Malformed(#[from] MalformedVoteError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Key generation or key encoding failure
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("key generation failed: {0}")]
    Generation(#[source] rsa::Error),

    #[error("failed to encode key: {0}")]
    Encoding(String),

    #[error("failed to decode key: {0}")]
    Decoding(String),

    #[error("public key does not match private key")]
    Mismatch,
}

/// Failure sending a vote to a receiver
#[derive(Debug, Error)]
pub enum SendError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("timed out talking to {0}")]
    Timeout(String),

    #[error("unexpected greeting: {0:?}")]
    UnexpectedGreeting(String),

    #[error("encryption failed: {0}")]
    Encryption(#[from] rsa::Error),
}

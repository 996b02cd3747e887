//! Node error types

use std::io;
use std::path::PathBuf;

use thiserror::Error;
use votifier_core::{BindError, KeyError, SendError};

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("failed to read config '{}': {source}", .path.display())]
    ConfigRead { path: PathBuf, source: io::Error },

    #[error("invalid config '{}': {source}", .path.display())]
    ConfigParse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("failed to encode config '{}': {source}", .path.display())]
    ConfigEncode {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("failed to write '{}': {source}", .path.display())]
    Write { path: PathBuf, source: io::Error },

    #[error("failed to read key file '{}': {source}", .path.display())]
    KeyRead { path: PathBuf, source: io::Error },

    #[error("key file '{}' is not valid base64: {source}", .path.display())]
    KeyEncoding {
        path: PathBuf,
        source: base64::DecodeError,
    },

    #[error(transparent)]
    Key(#[from] KeyError),

    #[error(transparent)]
    Bind(#[from] BindError),

    #[error(transparent)]
    Send(#[from] SendError),

    #[error("could not resolve '{0}'")]
    Resolve(String),

    #[error("invalid vote: {0}")]
    InvalidVote(String),
}

//! Votifier Core Library
//!
//! Receives vote notifications from vote-reporting services over TCP.
//! Each connection carries one RSA-encrypted vote; decoded votes are handed
//! to every registered [`VoteListener`].
//!
//! ```text
//! client ──TCP──► VoteReceiver ──► ConnectionHandler
//!                                   │ greeting, read block
//!                                   ▼
//!                              CryptoCodec ──► protocol::parse ──► ListenerRegistry
//! ```

pub mod client;
pub mod crypto;
pub mod error;
pub mod handler;
pub mod listener;
pub mod protocol;
pub mod receiver;
pub mod stats;
pub mod vote;

#[cfg(test)]
pub(crate) mod test_support;

pub use client::VoteSender;
pub use crypto::{CryptoCodec, KeyPair, PayloadDecryptor};
pub use error::{
    BindError, ConnectionError, DecryptionError, DispatchError, DispatchFailure, KeyError,
    ListenerError, MalformedVoteError, SendError, ShutdownTimeoutError,
};
pub use handler::ConnectionHandler;
pub use listener::{ChannelListener, DispatchReport, FnListener, ListenerId, ListenerRegistry, VoteListener};
pub use receiver::{ReceiverConfig, ReceiverState, ShutdownOutcome, VoteReceiver};
pub use stats::StatsSnapshot;
pub use vote::Vote;

// Key type used by VoteSender
pub use rsa::RsaPublicKey;

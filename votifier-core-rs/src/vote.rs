//! Decoded vote record

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::MalformedVoteError;

/// One vote as reported by a vote-reporting service.
///
/// All four fields are free-form strings from the client. None of them is
/// empty, whitespace-only or spans more than one line; the record cannot
/// change after construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "RawVote")]
pub struct Vote {
    service_name: String,
    username: String,
    address: String,
    timestamp: String,
}

impl Vote {
    /// Build a vote, rejecting blank fields and fields with line breaks
    pub fn new(
        service_name: impl Into<String>,
        username: impl Into<String>,
        address: impl Into<String>,
        timestamp: impl Into<String>,
    ) -> Result<Self, MalformedVoteError> {
        let vote = Self {
            service_name: non_blank("serviceName", service_name.into())?,
            username: non_blank("username", username.into())?,
            address: non_blank("address", address.into())?,
            timestamp: non_blank("timestamp", timestamp.into())?,
        };
        Ok(vote)
    }

    /// Name of the service the vote was cast on
    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    /// Address reported by the client. Not the TCP peer.
    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }
}

impl fmt::Display for Vote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Vote (from:{} username:{} address:{} timeStamp:{})",
            self.service_name, self.username, self.address, self.timestamp
        )
    }
}

fn non_blank(field: &'static str, value: String) -> Result<String, MalformedVoteError> {
    if value.trim().is_empty() {
        return Err(MalformedVoteError::BlankField(field));
    }
    // Fields are newline-delimited on the wire
    if value.contains(['\n', '\r']) {
        return Err(MalformedVoteError::LineBreak(field));
    }
    Ok(value)
}

/// Unvalidated wire shape used by serde before the blank-field check
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawVote {
    service_name: String,
    username: String,
    address: String,
    timestamp: String,
}

impl TryFrom<RawVote> for Vote {
    type Error = MalformedVoteError;

    fn try_from(raw: RawVote) -> Result<Self, Self::Error> {
        Vote::new(raw.service_name, raw.username, raw.address, raw.timestamp)
    }
}

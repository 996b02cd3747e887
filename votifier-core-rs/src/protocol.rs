//! Votifier wire format
//!
//! After accepting a connection the server writes a greeting line
//! (`VOTIFIER <version>\n`). The client answers with one RSA block whose
//! plaintext is:
//!
//! ```text
//! VOTIFIER\n
//! <serviceName>\n
//! <username>\n
//! <address>\n
//! <timestamp>\n
//! ```

use crate::error::MalformedVoteError;
use crate::vote::Vote;

/// First line of every decrypted payload
pub const OPENING_TOKEN: &str = "VOTIFIER";

/// Protocol name written at the start of the greeting line
pub const GREETING_PREFIX: &str = "VOTIFIER";

const FIELDS: [&str; 4] = ["serviceName", "username", "address", "timestamp"];

/// Greeting line sent on every accepted connection
pub fn greeting(version: &str) -> String {
    format!("{} {}\n", GREETING_PREFIX, version)
}

/// Parse decrypted plaintext into a vote.
///
/// The opening token is checked before any field is looked at, so garbage
/// from a wrong key or another protocol version fails here.
pub fn parse(plaintext: &[u8]) -> Result<Vote, MalformedVoteError> {
    let mut lines = plaintext.split(|b| *b == b'\n');

    match lines.next() {
        Some(token) if token == OPENING_TOKEN.as_bytes() => {}
        _ => return Err(MalformedVoteError::BadOpeningToken),
    }

    let mut values: [&str; 4] = [""; 4];
    for (slot, name) in values.iter_mut().zip(FIELDS) {
        let line = lines.next().ok_or(MalformedVoteError::MissingField(name))?;
        let text = std::str::from_utf8(line).map_err(|_| MalformedVoteError::NotUtf8(name))?;
        if text.trim().is_empty() {
            return Err(MalformedVoteError::BlankField(name));
        }
        *slot = text;
    }

    // Anything after the timestamp line is ignored
    let [service_name, username, address, timestamp] = values;
    Vote::new(service_name, username, address, timestamp)
}

/// Encode a vote as plaintext, ready for encryption
pub fn encode(vote: &Vote) -> Vec<u8> {
    format!(
        "{}\n{}\n{}\n{}\n{}\n",
        OPENING_TOKEN,
        vote.service_name(),
        vote.username(),
        vote.address(),
        vote.timestamp()
    )
    .into_bytes()
}

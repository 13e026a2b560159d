//! Handler identifiers and the callback payload wire format
//!
//! Payloads look like `<identifier>,<args>`. The identifier is the hex SHA-256
//! of the handler id truncated to a fixed length, so the same handler gets
//! the same identifier in every process that runs the same build.

use std::fmt;

use regex::Regex;
use sha2::{Digest, Sha256};

use super::handler::HandlerId;
use crate::core::error::{AppError, AppResult};

/// Hex characters kept from the digest (64 bits)
pub const DEFAULT_IDENTIFIER_LEN: usize = 16;

/// Separates the identifier from free-form arguments
pub const PAYLOAD_DELIMITER: char = ',';

/// Telegram's limit on `callback_data`, in bytes
pub const MAX_CALLBACK_DATA_LEN: usize = 64;

/// Short deterministic token standing for a handler on the wire
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Identifier(String);

impl Identifier {
    /// Derives the identifier for `handler_id`, keeping `len` hex characters (1..=64).
    pub fn derive(handler_id: &HandlerId, len: usize) -> Self {
        let digest = Sha256::digest(handler_id.as_str().as_bytes());
        let mut hex = hex::encode(digest);
        hex.truncate(len.clamp(1, 64));
        Self(hex)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Regex recognizing a payload addressed to this identifier; group 1 is the args.
    pub fn pattern(&self) -> AppResult<Regex> {
        let source = format!(
            "(?s)^{}{}(.*)$",
            regex::escape(&self.0),
            regex::escape(&PAYLOAD_DELIMITER.to_string())
        );
        Regex::new(&source).map_err(|e| AppError::Config(format!("callback pattern for {}: {}", self.0, e)))
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier for a handler id with the default length.
pub fn checksum(handler_id: &HandlerId) -> Identifier {
    Identifier::derive(handler_id, DEFAULT_IDENTIFIER_LEN)
}

/// Builds `<identifier>,<args>`, refusing payloads Telegram would reject.
pub fn encode_payload(identifier: &Identifier, args: &str) -> AppResult<String> {
    let payload = format!("{}{}{}", identifier, PAYLOAD_DELIMITER, args);
    if payload.len() > MAX_CALLBACK_DATA_LEN {
        return Err(AppError::PayloadTooLong {
            len: payload.len(),
            max: MAX_CALLBACK_DATA_LEN,
        });
    }
    Ok(payload)
}

/// Splits a payload into identifier and args; `None` without a delimiter.
pub fn decode_payload(data: &str) -> Option<(&str, &str)> {
    data.split_once(PAYLOAD_DELIMITER)
}

//! Frame parsing and encoding.

use std::fmt;
use thiserror::Error;

/// Prefix of a registration frame, including its delimiter.
pub const REGISTER_PREFIX: &str = "register:";

/// Prefix of an addressed-send frame, including its delimiter.
pub const SEND_PREFIX: &str = "send:";

const DELIMITER: char = ':';

/// A parsed client-to-broker frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Bind the issuing connection to `name`.
    Register {
        /// Agent name (case-sensitive, opaque).
        name: String,
    },
    /// Forward `payload` to whoever currently holds `target`.
    Send {
        /// Destination agent name.
        target: String,
        /// Opaque payload, forwarded verbatim.
        payload: String,
    },
}

/// Why a frame could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("missing ':' delimiter")]
    MissingDelimiter,
    #[error("unknown frame prefix '{0}'")]
    UnknownPrefix(String),
    #[error("empty agent name")]
    EmptyName,
}

impl Frame {
    /// Build a registration frame.
    pub fn register(name: impl Into<String>) -> Self {
        Self::Register { name: name.into() }
    }

    /// Build an addressed-send frame.
    pub fn send(target: impl Into<String>, payload: impl Into<String>) -> Self {
        Self::Send {
            target: target.into(),
            payload: payload.into(),
        }
    }

    /// Parse one text frame. Splits on at most two delimiters, so payloads
    /// keep any colons they contain.
    pub fn parse(text: &str) -> Result<Self, FrameError> {
        if let Some(name) = text.strip_prefix(REGISTER_PREFIX) {
            if name.is_empty() {
                return Err(FrameError::EmptyName);
            }
            return Ok(Self::register(name));
        }

        if let Some(rest) = text.strip_prefix(SEND_PREFIX) {
            let (target, payload) = rest
                .split_once(DELIMITER)
                .ok_or(FrameError::MissingDelimiter)?;
            if target.is_empty() {
                return Err(FrameError::EmptyName);
            }
            return Ok(Self::send(target, payload));
        }

        match text.split_once(DELIMITER) {
            Some((prefix, _)) => Err(FrameError::UnknownPrefix(truncate(prefix, 32))),
            None => Err(FrameError::MissingDelimiter),
        }
    }

    /// Encode back to wire text.
    pub fn encode(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Register { name } => write!(f, "{REGISTER_PREFIX}{name}"),
            Self::Send { target, payload } => write!(f, "{SEND_PREFIX}{target}:{payload}"),
        }
    }
}

impl std::str::FromStr for Frame {
    type Err = FrameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Cut a string to at most `max` characters on a char boundary.
fn truncate(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

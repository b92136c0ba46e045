//! Broker-to-sender notices.
//!
//! Notices travel on the same channel as forwarded payloads and carry no
//! structural tag. Clients that need to tell them apart can use
//! [`Notice::recognize`], which matches only the exact shapes the broker emits.

use std::fmt;

const UNAVAILABLE_HEAD: &str = "Error: Agent '";
const UNAVAILABLE_TAIL: &str = "' not available";
const MALFORMED_TEXT: &str = "Error: Invalid message format";

/// A human-readable notice sent back to the originating connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// The addressed agent is not currently registered.
    TargetUnavailable(String),
    /// The frame could not be parsed.
    Malformed,
}

impl Notice {
    /// Match text against the notice shapes the broker produces.
    pub fn recognize(text: &str) -> Option<Self> {
        if text == MALFORMED_TEXT {
            return Some(Self::Malformed);
        }
        text.strip_prefix(UNAVAILABLE_HEAD)
            .and_then(|rest| rest.strip_suffix(UNAVAILABLE_TAIL))
            .map(|name| Self::TargetUnavailable(name.to_string()))
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TargetUnavailable(name) => {
                write!(f, "{UNAVAILABLE_HEAD}{name}{UNAVAILABLE_TAIL}")
            }
            Self::Malformed => f.write_str(MALFORMED_TEXT),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notice_text() {
        assert_eq!(
            Notice::TargetUnavailable("ghost".to_string()).to_string(),
            "Error: Agent 'ghost' not available"
        );
        assert_eq!(Notice::Malformed.to_string(), "Error: Invalid message format");
    }

    #[test]
    fn test_recognize() {
        assert_eq!(
            Notice::recognize("Error: Agent 'reviewer' not available"),
            Some(Notice::TargetUnavailable("reviewer".to_string()))
        );
        assert_eq!(
            Notice::recognize("Error: Invalid message format"),
            Some(Notice::Malformed)
        );
    }

    #[test]
    fn test_recognize_ignores_ordinary_payloads() {
        assert_eq!(Notice::recognize("Make me a plan"), None);
        assert_eq!(Notice::recognize("Error: Agent 'x' exploded"), None);
        assert_eq!(Notice::recognize("Error processing request: boom"), None);
    }
}

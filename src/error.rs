use std::fmt;

/// Main error type for the gossamer membership service
#[derive(Debug)]
pub enum GossamerError {
    /// Configuration or CLI argument errors
    Config(String),

    /// Transport layer errors
    Transport(String),

    /// System I/O errors
    Io(std::io::Error),

    /// Inbound bytes that do not form a valid message
    Malformed(MalformedMessage),

    /// The node could not join the cluster
    Bootstrap(String),

    /// Serialization errors (audit records, snapshots)
    Serialization(serde_json::Error),
}

/// Structural problems found while decoding a wire message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MalformedMessage {
    /// Leading tag byte is not a known message type
    UnknownMessageType(u8),

    /// Fewer bytes than the fixed part of the message requires
    Truncated { needed: usize, available: usize },

    /// A list payload whose declared count disagrees with its length
    LengthMismatch {
        declared: u64,
        expected: usize,
        actual: usize,
    },

    /// Bytes left over after a complete message
    TrailingBytes(usize),

    /// PING/PONG gossip presence flag other than 0 or 1
    InvalidGossipFlag(u8),

    /// Member status byte is not a known status
    InvalidStatus(u8),

    /// Sender is the all-zero address
    NullSender,
}

impl fmt::Display for GossamerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GossamerError::Config(msg) => write!(f, "Configuration error: {}", msg),
            GossamerError::Transport(msg) => write!(f, "Transport error: {}", msg),
            GossamerError::Io(err) => write!(f, "I/O error: {}", err),
            GossamerError::Malformed(err) => write!(f, "Malformed message: {}", err),
            GossamerError::Bootstrap(msg) => write!(f, "Bootstrap failure: {}", msg),
            GossamerError::Serialization(err) => write!(f, "Serialization error: {}", err),
        }
    }
}

impl fmt::Display for MalformedMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MalformedMessage::UnknownMessageType(tag) => {
                write!(f, "unknown message type tag {}", tag)
            }
            MalformedMessage::Truncated { needed, available } => write!(
                f,
                "truncated: needed {} bytes, {} available",
                needed, available
            ),
            MalformedMessage::LengthMismatch {
                declared,
                expected,
                actual,
            } => write!(
                f,
                "declared {} entries ({} bytes) but message is {} bytes",
                declared, expected, actual
            ),
            MalformedMessage::TrailingBytes(n) => write!(f, "{} trailing bytes", n),
            MalformedMessage::InvalidGossipFlag(flag) => {
                write!(f, "invalid gossip flag {}", flag)
            }
            MalformedMessage::InvalidStatus(status) => {
                write!(f, "invalid member status {}", status)
            }
            MalformedMessage::NullSender => write!(f, "null sender address"),
        }
    }
}

impl std::error::Error for GossamerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            GossamerError::Io(err) => Some(err),
            GossamerError::Malformed(err) => Some(err),
            GossamerError::Serialization(err) => Some(err),
            _ => None,
        }
    }
}

impl std::error::Error for MalformedMessage {}

// Convenient type alias for Results using our error type
pub type Result<T> = std::result::Result<T, GossamerError>;

impl GossamerError {
    /// Get the error type identifier
    pub fn error_type(&self) -> &'static str {
        match self {
            GossamerError::Config(_) => "configuration_error",
            GossamerError::Transport(_) => "transport_error",
            GossamerError::Io(_) => "io_error",
            GossamerError::Malformed(_) => "malformed_message",
            GossamerError::Bootstrap(_) => "bootstrap_failure",
            GossamerError::Serialization(_) => "serialization_error",
        }
    }

    /// Only bootstrap failures are meant to stop the process
    pub fn is_fatal(&self) -> bool {
        matches!(self, GossamerError::Bootstrap(_))
    }
}

// Conversions from common error types
impl From<std::io::Error> for GossamerError {
    fn from(err: std::io::Error) -> Self {
        GossamerError::Io(err)
    }
}

impl From<serde_json::Error> for GossamerError {
    fn from(err: serde_json::Error) -> Self {
        GossamerError::Serialization(err)
    }
}

impl From<MalformedMessage> for GossamerError {
    fn from(err: MalformedMessage) -> Self {
        GossamerError::Malformed(err)
    }
}

// Helper macros for common error construction patterns
#[macro_export]
macro_rules! config_error {
    ($msg:expr) => {
        $crate::error::GossamerError::Config($msg.to_string())
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::error::GossamerError::Config(format!($fmt, $($arg)*))
    };
}

#[macro_export]
macro_rules! transport_error {
    ($msg:expr) => {
        $crate::error::GossamerError::Transport($msg.to_string())
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::error::GossamerError::Transport(format!($fmt, $($arg)*))
    };
}

#[macro_export]
macro_rules! bootstrap_error {
    ($msg:expr) => {
        $crate::error::GossamerError::Bootstrap($msg.to_string())
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::error::GossamerError::Bootstrap(format!($fmt, $($arg)*))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let config_err = GossamerError::Config("tremove must exceed tfail".to_string());
        assert_eq!(
            config_err.to_string(),
            "Configuration error: tremove must exceed tfail"
        );

        let io_err = GossamerError::Io(std::io::Error::new(
            std::io::ErrorKind::AddrInUse,
            "address in use",
        ));
        assert!(io_err.to_string().contains("I/O error"));
    }

    #[test]
    fn test_malformed_display() {
        let err: GossamerError = MalformedMessage::LengthMismatch {
            declared: 3,
            expected: 65,
            actual: 51,
        }
        .into();
        assert_eq!(
            err.to_string(),
            "Malformed message: declared 3 entries (65 bytes) but message is 51 bytes"
        );
        assert_eq!(err.error_type(), "malformed_message");
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_macros() {
        let err = config_error!("Port {} is invalid", 0);
        assert_eq!(err.to_string(), "Configuration error: Port 0 is invalid");

        let err = bootstrap_error!("introducer never answered");
        assert_eq!(
            err.to_string(),
            "Bootstrap failure: introducer never answered"
        );
        assert!(err.is_fatal());

        let err = transport_error!("socket closed");
        assert!(matches!(err, GossamerError::Transport(_)));
    }
}

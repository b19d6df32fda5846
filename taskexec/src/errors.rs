//! Typed errors that callers recover with `anyhow::Error::downcast_ref`.

use std::fmt;

/// The invocation was cancelled at a suspension point.
///
/// State has already been persisted (as `paused`, or as a resumable loop
/// checkpoint) by the time this error is returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interrupted {
    /// Where the cancellation was observed.
    pub during: String,
}

impl fmt::Display for Interrupted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "interrupted during {}", self.during)
    }
}

impl std::error::Error for Interrupted {}

/// The completion provider could not be reached (spawn, network, auth, timeout).
///
/// Unlike ordinary provider failures, these abort the edit loop instead of
/// being recorded as a failing iteration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportError {
    pub provider: String,
    pub message: String,
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "provider '{}' transport error: {}", self.provider, self.message)
    }
}

impl std::error::Error for TransportError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    UnknownProvider { id: String, known: Vec<String> },
    InvalidProvider { id: String, reason: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownProvider { id, known } => write!(
                f,
                "unknown provider '{id}' (known: {})",
                if known.is_empty() {
                    "none".to_string()
                } else {
                    known.join(", ")
                }
            ),
            Self::InvalidProvider { id, reason } => {
                write!(f, "invalid configuration for provider '{id}': {reason}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// `resume` was asked to continue a loop that is absent or already finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopNotResumable {
    pub status: Option<String>,
}

impl fmt::Display for LoopNotResumable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.status {
            Some(status) => write!(f, "edit loop is {status}, only running loops can resume"),
            None => write!(f, "no edit loop checkpoint to resume"),
        }
    }
}

impl std::error::Error for LoopNotResumable {}

// Hora Widget Error Types
// Shared error enum for config, fetch, payload and cache failures

use thiserror::Error;

pub type HoraResult<T> = Result<T, HoraError>;

#[derive(Debug, Error)]
pub enum HoraError {
    /// Missing API key or an unusable setting. Fatal at startup.
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Transport error{}: {message}", status_suffix(.status))]
    Transport {
        status: Option<u16>,
        message: String,
    },

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Cache error: {0}")]
    Cache(String),
}

impl HoraError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            status: None,
            message: message.into(),
        }
    }

    /// True for failures the scheduler should ride out until the next attempt.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Transport { .. } | Self::Authentication(_) | Self::Parse(_) | Self::Cache(_)
        )
    }

    /// HTTP status attached to a transport failure, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Transport { status, .. } => *status,
            _ => None,
        }
    }
}

impl From<reqwest::Error> for HoraError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            return Self::Parse(e.to_string());
        }
        Self::Transport {
            status: e.status().map(|s| s.as_u16()),
            message: e.to_string(),
        }
    }
}

impl From<serde_json::Error> for HoraError {
    fn from(e: serde_json::Error) -> Self {
        Self::Parse(e.to_string())
    }
}

impl From<std::io::Error> for HoraError {
    fn from(e: std::io::Error) -> Self {
        Self::Cache(e.to_string())
    }
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" (HTTP {})", s)).unwrap_or_default()
}

/// Truncate an upstream error body so it stays readable in a notification.
pub(crate) fn truncate_body(body: &str, max: usize) -> String {
    let trimmed = body.trim();
    if trimmed.chars().count() <= max {
        return trimmed.to_string();
    }
    let cut: String = trimmed.chars().take(max).collect();
    format!("{}...", cut)
}

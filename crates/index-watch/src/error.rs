//! Error Types for Index Watch

use thiserror::Error;

pub type Result<T> = std::result::Result<T, WatchError>;

/// Every variant is scoped to one symbol or one recipient within a single
/// evaluation cycle; none of them stops the scheduler.
#[derive(Error, Debug)]
pub enum WatchError {
    /// Empty or too-short price series
    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    /// Computed values violate an invariant (non-positive ATH, unsorted dates)
    #[error("Data integrity violation: {0}")]
    DataIntegrity(String),

    /// Price or sentiment source failed, timed out or returned garbage
    #[error("Provider {source_name} unavailable: {reason}")]
    ProviderUnavailable {
        source_name: String,
        reason: String,
    },

    /// Alert state or subscriber storage failed
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Message could not be delivered to a recipient
    #[error("Delivery to {recipient} failed: {reason}")]
    Delivery {
        recipient: String,
        reason: String,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl WatchError {
    pub fn provider(source_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ProviderUnavailable {
            source_name: source_name.into(),
            reason: reason.into(),
        }
    }

    pub fn delivery(recipient: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Delivery {
            recipient: recipient.into(),
            reason: reason.into(),
        }
    }

    /// Transient failures that may succeed on the next cycle
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ProviderUnavailable { .. } | Self::Delivery { .. } | Self::Io(_)
        )
    }

    /// Errors that point at a bug rather than a flaky dependency
    pub const fn is_bug(&self) -> bool {
        matches!(self, Self::DataIntegrity(_))
    }

    /// Short text suitable for a chat reply
    pub fn user_message(&self) -> String {
        match self {
            Self::InsufficientData(_) => "Not enough price history is available yet.".into(),
            Self::ProviderUnavailable { source_name, .. } => format!(
                "Failed to fetch market data from {source_name}. Please try again in a few minutes."
            ),
            Self::Persistence(_) => "Storage is temporarily unavailable. Please try again later.".into(),
            Self::Delivery { .. } => "Message delivery failed.".into(),
            Self::Config(msg) => format!("Configuration problem: {msg}"),
            _ => "An unexpected error occurred.".into(),
        }
    }
}

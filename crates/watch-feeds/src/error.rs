//! Feed Error Types

use index_watch::WatchError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, FeedError>;

#[derive(Error, Debug)]
pub enum FeedError {
    /// Transport failure; the URL is stripped so tokens never reach logs
    #[error("HTTP error: {0}")]
    Http(#[source] reqwest::Error),

    #[error("Unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    /// The remote API answered but reported an error
    #[error("API error: {0}")]
    Api(String),

    #[error("Malformed response: {0}")]
    Parse(String),

    /// The request could not be built from the arguments given
    #[error("Invalid request: {0}")]
    Request(String),
}

impl From<reqwest::Error> for FeedError {
    fn from(err: reqwest::Error) -> Self {
        Self::Http(err.without_url())
    }
}

impl From<serde_json::Error> for FeedError {
    fn from(err: serde_json::Error) -> Self {
        Self::Parse(err.to_string())
    }
}

impl FeedError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Http(e) if e.is_timeout())
    }

    /// As a data-source failure of `source_name`
    pub fn into_provider(self, source_name: &str) -> WatchError {
        WatchError::provider(source_name, self.to_string())
    }

    /// As a failed delivery to `recipient`
    pub fn into_delivery(self, recipient: &str) -> WatchError {
        WatchError::delivery(recipient, self.to_string())
    }
}

/// Read the body, turning non-2xx statuses into [`FeedError::Status`]
pub(crate) async fn checked_text(response: reqwest::Response) -> Result<String> {
    let status = response.status();
    let body = response.text().await?;
    if status.is_success() {
        Ok(body)
    } else {
        Err(FeedError::Status {
            status: status.as_u16(),
            body: body.chars().take(200).collect(),
        })
    }
}

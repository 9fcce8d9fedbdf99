use std::io;

use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("failed to resolve required path: {0}")]
    Path(String),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Database(#[from] rusqlite::Error),
    #[error(transparent)]
    Keychain(#[from] keyring::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error("{0}")]
    Config(String),
    #[error("{0}")]
    InvalidInput(String),
    #[error("language model request failed: {0}")]
    Model(String),
    #[error(transparent)]
    Search(#[from] SearchError),
}

/// Failures surfaced by a place search. `Display` is the copy shown to the user.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SearchError {
    #[error("No internet connection. Check your connection and try again.")]
    Offline,
    #[error("Too many searches. Please try again in a few minutes.")]
    QuotaExceeded,
    #[error("Search service unavailable. Please try again later.")]
    Denied,
    #[error("Invalid search. Please try a different query.")]
    InvalidRequest,
    #[error("Search failed: {0}")]
    UnknownStatus(String),
    #[error("Network error: {message}")]
    Transport { message: String, network: bool },
    #[error("Something went wrong. Please try again.")]
    Unknown,
}

impl SearchError {
    pub fn code(&self) -> &str {
        match self {
            SearchError::Offline => "OFFLINE",
            SearchError::QuotaExceeded => "OVER_QUERY_LIMIT",
            SearchError::Denied => "REQUEST_DENIED",
            SearchError::InvalidRequest => "INVALID_REQUEST",
            SearchError::UnknownStatus(status) => status.as_str(),
            SearchError::Transport { .. } => "HTTP_ERROR",
            SearchError::Unknown => "UNKNOWN",
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SearchError::UnknownStatus(_) | SearchError::Transport { .. }
        )
    }

    /// Maps the error left over after retries are exhausted to what the caller sees.
    pub fn into_terminal(self) -> Self {
        match self {
            SearchError::Transport { network: true, .. } => SearchError::Offline,
            SearchError::Transport { network: false, .. } => SearchError::Unknown,
            other => other,
        }
    }
}

impl From<reqwest::Error> for SearchError {
    fn from(err: reqwest::Error) -> Self {
        SearchError::Transport {
            network: err.is_connect() || err.is_timeout(),
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transport_and_unknown_status_retry() {
        assert!(SearchError::UnknownStatus("UNKNOWN_ERROR".into()).is_retryable());
        assert!(SearchError::Transport {
            message: "reset".into(),
            network: true
        }
        .is_retryable());
        assert!(!SearchError::QuotaExceeded.is_retryable());
        assert!(!SearchError::Denied.is_retryable());
        assert!(!SearchError::InvalidRequest.is_retryable());
        assert!(!SearchError::Offline.is_retryable());
    }

    #[test]
    fn terminal_mapping_keeps_status_named_errors() {
        let network = SearchError::Transport {
            message: "connect refused".into(),
            network: true,
        };
        let http = SearchError::Transport {
            message: "503".into(),
            network: false,
        };
        assert_eq!(network.into_terminal(), SearchError::Offline);
        assert_eq!(http.into_terminal(), SearchError::Unknown);
        assert_eq!(
            SearchError::UnknownStatus("UNKNOWN_ERROR".into()).into_terminal(),
            SearchError::UnknownStatus("UNKNOWN_ERROR".into())
        );
        assert_eq!(
            SearchError::UnknownStatus("UNKNOWN_ERROR".into()).to_string(),
            "Search failed: UNKNOWN_ERROR"
        );
    }
}

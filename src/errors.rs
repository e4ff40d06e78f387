//! Error types shared across the crate.
//!
//! Every failure coming out of the explorer clients is normalized into an
//! [`ApiError`] carrying an [`ErrorKind`] before it reaches a consumer; raw
//! transport errors never leave the `explorer` module.

use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Client-side address format failure. Never retried, never hits the network.
    InvalidAddress,
    /// Watchlist mutation rejected because the address is already present.
    DuplicateAddress,
    /// The endpoint reported a logical failure (`status == "0"`).
    ApiError,
    /// Success payload without the expected fields.
    InvalidData,
    /// Price field present but not a positive number.
    InvalidPrice,
    /// Transport or HTTP failure.
    NetworkError,
    UnknownError,
    /// The request was aborted through its cancellation token.
    ///
    /// Only produced when the caller cancels the token it passed to
    /// `fetch_balance` or `fetch_price`. The query cache drops the result
    /// of a cancelled request, so subscribers never observe this kind.
    Cancelled,
}

impl ErrorKind {
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::InvalidAddress => "INVALID_ADDRESS",
            ErrorKind::DuplicateAddress => "DUPLICATE_ADDRESS",
            ErrorKind::ApiError => "API_ERROR",
            ErrorKind::InvalidData => "INVALID_DATA",
            ErrorKind::InvalidPrice => "INVALID_PRICE",
            ErrorKind::NetworkError => "NETWORK_ERROR",
            ErrorKind::UnknownError => "UNKNOWN_ERROR",
            ErrorKind::Cancelled => "CANCELLED",
        }
    }

    /// Kinds the retry engine may attempt again.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ErrorKind::NetworkError | ErrorKind::ApiError | ErrorKind::UnknownError
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// A normalized explorer failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct ApiError {
    pub kind: ErrorKind,
    pub message: String,
    /// HTTP status when one is known.
    pub status: Option<u16>,
}

impl ApiError {
    pub fn new(kind: ErrorKind, message: impl Into<String>, status: Option<u16>) -> Self {
        Self {
            kind,
            message: message.into(),
            status,
        }
    }

    pub fn invalid_address() -> Self {
        Self::new(
            ErrorKind::InvalidAddress,
            "Invalid Ethereum address format",
            Some(400),
        )
    }

    pub fn api(message: &str, default_message: &str, status: u16) -> Self {
        let message = if message.trim().is_empty() {
            default_message
        } else {
            message
        };
        Self::new(ErrorKind::ApiError, message, Some(status))
    }

    pub fn network(message: impl fmt::Display, status: Option<u16>) -> Self {
        Self::new(
            ErrorKind::NetworkError,
            format!("Network error: {message}"),
            Some(status.unwrap_or(500)),
        )
    }

    pub fn invalid_data() -> Self {
        Self::new(
            ErrorKind::InvalidData,
            "Invalid data received from API",
            Some(500),
        )
    }

    pub fn invalid_price() -> Self {
        Self::new(
            ErrorKind::InvalidPrice,
            "Invalid price value received from API",
            Some(500),
        )
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::UnknownError, message, Some(500))
    }

    pub fn cancelled() -> Self {
        Self::new(ErrorKind::Cancelled, "Request cancelled", None)
    }

    pub fn code(&self) -> &'static str {
        self.kind.code()
    }

    /// True for any status in the 4xx range.
    pub fn is_client_error(&self) -> bool {
        matches!(self.status, Some(status) if (400..500).contains(&status))
    }

    pub fn is_cancelled(&self) -> bool {
        self.kind == ErrorKind::Cancelled
    }
}

/// Rejected watchlist mutations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WatchlistError {
    #[error("Address must be exactly 42 characters")]
    InvalidLength,
    #[error("Enter a valid Ethereum address starting with 0x")]
    InvalidFormat,
    #[error("This address is already being monitored")]
    DuplicateAddress,
}

impl WatchlistError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            WatchlistError::InvalidLength | WatchlistError::InvalidFormat => {
                ErrorKind::InvalidAddress
            }
            WatchlistError::DuplicateAddress => ErrorKind::DuplicateAddress,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConversionError {
    #[error("not a base-10 integer amount: {0:?}")]
    InvalidInteger(String),
    #[error("not a decimal amount: {0:?}")]
    InvalidDecimal(String),
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("storage io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("storage serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

use std::fmt;
use tokio::time::Instant;

use crate::constants::PRICE_SYMBOL;
use crate::errors::ApiError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryKind {
    Balance,
    Price,
}

impl QueryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryKind::Balance => "balance",
            QueryKind::Price => "price",
        }
    }
}

/// Cache identity of a query: request kind plus address or symbol.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryKey {
    pub kind: QueryKind,
    pub discriminator: String,
}

impl QueryKey {
    pub fn balance(address: impl Into<String>) -> Self {
        Self {
            kind: QueryKind::Balance,
            discriminator: address.into(),
        }
    }

    pub fn price() -> Self {
        Self {
            kind: QueryKind::Price,
            discriminator: PRICE_SYMBOL.to_string(),
        }
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind.as_str(), self.discriminator)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryStatus {
    /// No value and no error yet.
    Pending,
    Success,
    Error,
}

/// What subscribers of a key observe.
#[derive(Debug, Clone)]
pub struct QueryState<V> {
    pub status: QueryStatus,
    /// Last successful value, kept while a refetch is in flight or after it fails.
    pub data: Option<V>,
    pub error: Option<ApiError>,
    /// Failed attempts of the current or last fetch.
    pub failure_count: u32,
    pub is_fetching: bool,
    /// When `data` was last written.
    pub updated_at: Option<Instant>,
}

impl<V> Default for QueryState<V> {
    fn default() -> Self {
        Self {
            status: QueryStatus::Pending,
            data: None,
            error: None,
            failure_count: 0,
            is_fetching: false,
            updated_at: None,
        }
    }
}

impl<V> QueryState<V> {
    pub fn is_loading(&self) -> bool {
        self.status == QueryStatus::Pending
    }

    pub fn is_success(&self) -> bool {
        self.status == QueryStatus::Success
    }

    pub fn is_error(&self) -> bool {
        self.status == QueryStatus::Error
    }

    /// Fresh values are served without a new request.
    pub fn is_stale(&self, stale_time: std::time::Duration, now: Instant) -> bool {
        match self.updated_at {
            Some(updated_at) => now.duration_since(updated_at) >= stale_time,
            None => true,
        }
    }
}

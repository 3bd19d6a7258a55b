/// Error types for the user store
///
/// Every failure surfaced by this crate is a "storage operation failed" error.
/// The variants only record where the failure originated so callers can log it
/// usefully; none of them is retried or recovered from inside the crate.
///
/// # Example
///
/// ```no_run
/// use userstore_shared::error::StoreError;
///
/// fn describe(err: &StoreError) -> &'static str {
///     match err {
///         StoreError::Connection(_) => "transport",
///         StoreError::Query { .. } => "rejected by server",
///         StoreError::Serialization(_) => "bad row",
///         StoreError::Config(_) => "misconfigured",
///     }
/// }
/// ```

use thiserror::Error;

/// Storage operation errors
#[derive(Error, Debug)]
pub enum StoreError {
    /// Transport-level failure (DNS, TCP, TLS, client-side timeout)
    #[error("ClickHouse connection error: {0}")]
    Connection(String),

    /// The server answered with a non-success status
    ///
    /// `message` is the response body as returned by ClickHouse.
    #[error("ClickHouse query failed with status {status}: {message}")]
    Query { status: u16, message: String },

    /// A row could not be encoded to or decoded from JSONEachRow
    #[error("Row serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Missing or invalid configuration
    #[error("ClickHouse configuration error: {0}")]
    Config(String),
}

impl From<reqwest::Error> for StoreError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            StoreError::Connection(format!("request timed out: {}", err))
        } else if err.is_builder() {
            StoreError::Config(format!("invalid request: {}", err))
        } else {
            StoreError::Connection(err.to_string())
        }
    }
}

/// Result alias used throughout the crate
pub type StoreResult<T> = Result<T, StoreError>;

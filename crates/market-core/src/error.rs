use thiserror::Error;

/// Failure taxonomy for the market-data pipeline.
///
/// The `Display` strings for the transient variants are user-facing verbatim:
/// the UI layer shows them as-is, so callers must be able to distinguish a
/// slow upstream from an unreachable one from everything else.
#[derive(Error, Debug)]
pub enum MarketDataError {
    #[error("Request took too long to complete. Please try again later.")]
    RequestTimeout,

    #[error("Unable to connect to the server. Please check your internet connection.")]
    Unreachable,

    #[error("HTTP error! status: {0}")]
    HttpStatus(u16),

    #[error("FINNHUB_API_KEY is not configured")]
    MissingToken,

    #[error("Failed to decode upstream response: {0}")]
    Decode(String),

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("User not authenticated")]
    Unauthenticated,

    #[error("Database error: {0}")]
    Database(String),
}

impl MarketDataError {
    /// Transient failures are the ones the retry policy is allowed to spend
    /// its budget on: timeouts, connectivity loss, 429 and 5xx statuses.
    pub fn is_transient(&self) -> bool {
        match self {
            MarketDataError::RequestTimeout | MarketDataError::Unreachable => true,
            MarketDataError::HttpStatus(status) => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

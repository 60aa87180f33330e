use async_trait::async_trait;

use crate::{AddOutcome, MarketDataError, StockView, UserIdentity, WatchlistEntry};

/// Persistence collaborator for watchlist rows. The pipeline only calls this
/// interface; it owns no schema or write path of its own.
#[async_trait]
pub trait WatchlistStore: Send + Sync {
    /// Symbols for a user, most recently added first.
    async fn symbols_for_user(&self, user_id: &str) -> Result<Vec<String>, MarketDataError>;

    /// Full entries for a user, most recently added first.
    async fn entries_for_user(&self, user_id: &str) -> Result<Vec<WatchlistEntry>, MarketDataError>;

    async fn add(
        &self,
        user_id: &str,
        symbol: &str,
        company: &str,
    ) -> Result<AddOutcome, MarketDataError>;

    async fn remove(&self, user_id: &str, symbol: &str) -> Result<(), MarketDataError>;

    /// Remove every entry for a user. Returns true if anything was deleted.
    async fn clear(&self, user_id: &str) -> Result<bool, MarketDataError>;
}

/// Auth collaborator: yields the current identity or signals unauthenticated.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn current_user(&self) -> Option<UserIdentity>;
}

/// Produces the denormalized per-symbol view. Implemented by the aggregator;
/// a trait so the orchestrator can be exercised with fakes.
#[async_trait]
pub trait StockDetailsProvider: Send + Sync {
    async fn stock_details(&self, symbol: &str) -> Result<StockView, MarketDataError>;
}

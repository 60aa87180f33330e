//! Watchlist orchestration: persisted entries merged with freshly aggregated
//! per-symbol data.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use finnhub_client::{FinnhubClient, SearchCache};
use futures_util::future::join_all;
use market_core::{
    AddOutcome, IdentityProvider, MarketDataError, SearchResult, StockDetailsProvider,
    WatchlistStore,
};
use serde::Serialize;

/// One display row: persisted entry metadata plus the aggregated view fields.
#[derive(Debug, Clone, Serialize)]
pub struct WatchlistRow {
    pub symbol: String,
    pub company: String,
    pub added_at: DateTime<Utc>,
    pub current_price: f64,
    pub price_formatted: String,
    pub change_formatted: String,
    pub change_percent: f64,
    pub market_cap: String,
    pub pe_ratio: String,
}

pub struct WatchlistService {
    store: Arc<dyn WatchlistStore>,
    details: Arc<dyn StockDetailsProvider>,
    identity: Arc<dyn IdentityProvider>,
    client: Arc<FinnhubClient>,
}

impl WatchlistService {
    pub fn new(
        store: Arc<dyn WatchlistStore>,
        details: Arc<dyn StockDetailsProvider>,
        identity: Arc<dyn IdentityProvider>,
        client: Arc<FinnhubClient>,
    ) -> Self {
        Self {
            store,
            details,
            identity,
            client,
        }
    }

    /// Entries for the current user, most recently added first, each merged
    /// with freshly aggregated data. A per-symbol aggregation failure becomes
    /// an all-"Error" row in place rather than dropping the row, so
    /// positional integrity is preserved for the UI.
    pub async fn get_watchlist_with_data(&self) -> Result<Vec<WatchlistRow>, MarketDataError> {
        let user = self
            .identity
            .current_user()
            .await
            .ok_or(MarketDataError::Unauthenticated)?;

        let entries = self.store.entries_for_user(&user.id).await?;
        if entries.is_empty() {
            return Ok(Vec::new());
        }

        let fetches = entries.iter().map(|e| self.details.stock_details(&e.symbol));
        let results = join_all(fetches).await;

        Ok(entries
            .into_iter()
            .zip(results)
            .map(|(entry, result)| match result {
                Ok(view) => WatchlistRow {
                    symbol: entry.symbol,
                    company: if view.company.is_empty() {
                        entry.company
                    } else {
                        view.company
                    },
                    added_at: entry.added_at,
                    current_price: view.current_price,
                    price_formatted: view.price_formatted,
                    change_formatted: view.change_formatted,
                    change_percent: view.change_percent,
                    market_cap: view.market_cap_formatted,
                    pe_ratio: view.pe_ratio,
                },
                Err(err) => {
                    tracing::error!(
                        symbol = %entry.symbol,
                        error = %err,
                        "aggregation failed; substituting error row"
                    );
                    WatchlistRow {
                        symbol: entry.symbol,
                        company: entry.company,
                        added_at: entry.added_at,
                        current_price: 0.0,
                        price_formatted: "Error".to_string(),
                        change_formatted: "Error".to_string(),
                        change_percent: 0.0,
                        market_cap: "Error".to_string(),
                        pe_ratio: "Error".to_string(),
                    }
                }
            })
            .collect())
    }

    pub async fn add_stock(
        &self,
        symbol: &str,
        company: &str,
    ) -> Result<AddOutcome, MarketDataError> {
        let user = self
            .identity
            .current_user()
            .await
            .ok_or(MarketDataError::Unauthenticated)?;
        self.store.add(&user.id, symbol, company).await
    }

    pub async fn remove_stock(&self, symbol: &str) -> Result<(), MarketDataError> {
        let user = self
            .identity
            .current_user()
            .await
            .ok_or(MarketDataError::Unauthenticated)?;
        self.store.remove(&user.id, symbol).await
    }

    pub async fn clear(&self) -> Result<bool, MarketDataError> {
        let user = self
            .identity
            .current_user()
            .await
            .ok_or(MarketDataError::Unauthenticated)?;
        self.store.clear(&user.id).await
    }

    /// Search with each row's watchlist-membership flag stitched in locally.
    /// Membership lookup failures leave the flags unset instead of failing
    /// the search.
    pub async fn search(&self, query: &str, cache: &SearchCache) -> Vec<SearchResult> {
        let mut results = self.client.search(query, cache).await;

        if let Some(user) = self.identity.current_user().await {
            match self.store.symbols_for_user(&user.id).await {
                Ok(symbols) => {
                    let owned: HashSet<String> = symbols.into_iter().collect();
                    for result in &mut results {
                        result.is_in_watchlist = owned.contains(&result.symbol);
                    }
                }
                Err(err) => {
                    tracing::error!(error = %err, "watchlist lookup failed; leaving membership flags unset");
                }
            }
        }

        results
    }

    /// Symbols backing the user's scoped news feed. Degrades to an empty
    /// list (general feed) on any failure.
    pub async fn news_symbols(&self) -> Vec<String> {
        let Some(user) = self.identity.current_user().await else {
            return Vec::new();
        };
        match self.store.symbols_for_user(&user.id).await {
            Ok(symbols) => symbols,
            Err(err) => {
                tracing::error!(error = %err, "watchlist symbols lookup failed");
                Vec::new()
            }
        }
    }
}

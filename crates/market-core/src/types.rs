use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Point-in-time price snapshot. Never persisted; fetched fresh on demand.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Quote {
    /// Last traded price.
    pub current: Option<f64>,
    /// Absolute change since previous close.
    pub change: Option<f64>,
    /// Percent change since previous close.
    pub percent_change: Option<f64>,
}

/// Slowly-changing company reference data.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompanyProfile {
    pub name: Option<String>,
    pub exchange: Option<String>,
    pub industry: Option<String>,
    /// Market capitalization as reported by the profile endpoint.
    pub market_capitalization: Option<f64>,
}

/// Valuation ratios from the aggregate-metrics endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FinancialMetrics {
    pub pe_normalized_annual: Option<f64>,
    pub market_capitalization: Option<f64>,
}

/// Denormalized, display-ready union of quote + profile + metrics for one
/// symbol. Every formatted field has a defined "N/A" fallback; no string
/// field ever carries a raw NaN or an unformatted number.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockView {
    pub symbol: String,
    pub company: String,
    pub current_price: f64,
    pub price_formatted: String,
    pub change_formatted: String,
    /// Raw percent change, kept numeric for sorting and coloring.
    pub change_percent: f64,
    pub market_cap_formatted: String,
    pub pe_ratio: String,
}

/// One row of a symbol/text search, with local watchlist membership stitched
/// in by the caller (it is a view concern, not upstream data).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub symbol: String,
    pub name: String,
    pub exchange: String,
    pub instrument_type: String,
    pub is_in_watchlist: bool,
}

/// News article shaped for display. `title` carries the upstream `headline`.
///
/// The upstream id alone is not globally unique across category feeds, so the
/// deduplication identity is the composite (id, url, title).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsArticle {
    pub id: i64,
    pub title: String,
    pub summary: String,
    pub url: String,
    pub image: String,
    /// Publish time, unix seconds.
    pub datetime: i64,
    pub source: String,
    /// Symbol the article was fetched for, when company-scoped.
    pub symbol: Option<String>,
}

impl NewsArticle {
    /// Composite deduplication key.
    pub fn dedup_key(&self) -> String {
        format!("{}-{}-{}", self.id, self.url, self.title)
    }
}

/// Persisted watchlist row, unique per (user_id, symbol).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchlistEntry {
    pub user_id: String,
    pub symbol: String,
    /// Company-name snapshot taken at add time.
    pub company: String,
    pub added_at: DateTime<Utc>,
}

/// Outcome of a watchlist add; a duplicate is not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    Added,
    AlreadyPresent,
}

/// Authenticated user identity yielded by the auth collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserIdentity {
    pub id: String,
    pub email: String,
}

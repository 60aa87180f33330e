//! Finnhub market-data client: endpoint URL construction and response shaping
//! on top of the retrying fetch layer.

use std::collections::HashMap;

use chrono::NaiveDate;
use futures_util::future::join_all;
use market_core::{
    CompanyProfile, FinancialMetrics, MarketDataError, NewsArticle, Quote, SearchResult,
};
use serde::Deserialize;
use tokio::sync::Mutex;

mod fetch;

use fetch::Fetcher;

const BASE_URL: &str = "https://finnhub.io/api/v1";

/// Fixed listing shown for an empty search query; the top 10 are looked up.
pub const POPULAR_STOCK_SYMBOLS: &[&str] = &[
    "AAPL", "MSFT", "GOOGL", "AMZN", "NVDA", "META", "TSLA", "JPM", "V", "UNH", "JNJ", "XOM",
    "PG", "HD", "LLY",
];

const POPULAR_LIMIT: usize = 10;
const SEARCH_RESULT_LIMIT: usize = 15;

// Freshness hints: profiles are slowly-changing reference data, search can be
// reused for a while, news goes stale quickly. Quotes are never cached.
const REVALIDATE_PROFILE_SECS: u64 = 3600;
const REVALIDATE_SEARCH_SECS: u64 = 1800;
const REVALIDATE_NEWS_SECS: u64 = 300;

/// Request-scoped search memoization: constructed at the start of one logical
/// operation and dropped with it, keyed by trimmed query. Deliberately not
/// process-wide so no state leaks across unrelated requests.
#[derive(Default)]
pub struct SearchCache {
    entries: Mutex<HashMap<String, Vec<SearchResult>>>,
}

impl SearchCache {
    pub fn new() -> Self {
        Self::default()
    }

    async fn get(&self, query: &str) -> Option<Vec<SearchResult>> {
        self.entries.lock().await.get(query).cloned()
    }

    async fn put(&self, query: String, results: Vec<SearchResult>) {
        self.entries.lock().await.insert(query, results);
    }
}

pub struct FinnhubClient {
    token: Option<String>,
    base_url: String,
    fetcher: Fetcher,
}

impl FinnhubClient {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()).filter(|t| !t.is_empty()),
            base_url: BASE_URL.to_string(),
            fetcher: Fetcher::new(),
        }
    }

    /// Read the access token from `FINNHUB_API_KEY`. A missing token is not
    /// fatal here: detail/news calls will error, search degrades to empty.
    pub fn from_env() -> Self {
        let token = std::env::var("FINNHUB_API_KEY").ok();
        Self {
            token: token.filter(|t| !t.is_empty()),
            base_url: BASE_URL.to_string(),
            fetcher: Fetcher::new(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn token(&self) -> Result<&str, MarketDataError> {
        self.token.as_deref().ok_or(MarketDataError::MissingToken)
    }

    /// Current price snapshot. Always fetched fresh.
    pub async fn quote(&self, symbol: &str) -> Result<Quote, MarketDataError> {
        let token = self.token()?;
        let url = format!("{}/quote", self.base_url);
        let raw: RawQuote = self
            .fetcher
            .fetch_json(
                self.fetcher.get(&url).query(&[("symbol", symbol), ("token", token)]),
                None,
            )
            .await?;
        Ok(Quote {
            current: raw.c,
            change: raw.d,
            percent_change: raw.dp,
        })
    }

    /// Company profile (multi-hour freshness window upstream).
    pub async fn profile(&self, symbol: &str) -> Result<CompanyProfile, MarketDataError> {
        let token = self.token()?;
        let raw = self.fetch_profile(symbol, token).await?;
        Ok(CompanyProfile {
            name: non_empty(raw.name),
            exchange: non_empty(raw.exchange),
            industry: non_empty(raw.finnhub_industry),
            market_capitalization: raw.market_capitalization,
        })
    }

    /// Aggregate valuation metrics (`metric=all`).
    pub async fn metrics(&self, symbol: &str) -> Result<FinancialMetrics, MarketDataError> {
        let token = self.token()?;
        let url = format!("{}/stock/metric", self.base_url);
        let raw: RawMetricsResponse = self
            .fetcher
            .fetch_json(
                self.fetcher
                    .get(&url)
                    .query(&[("symbol", symbol), ("metric", "all"), ("token", token)]),
                None,
            )
            .await?;
        Ok(FinancialMetrics {
            pe_normalized_annual: raw.metric.pe_normalized_annual,
            market_capitalization: raw.metric.market_capitalization,
        })
    }

    /// Company-scoped news over a date range (inclusive, `YYYY-MM-DD`).
    /// Articles come back tagged with the symbol they were fetched for.
    pub async fn company_news(
        &self,
        symbol: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<NewsArticle>, MarketDataError> {
        let token = self.token()?;
        let url = format!("{}/company-news", self.base_url);
        let from_s = from.format("%Y-%m-%d").to_string();
        let to_s = to.format("%Y-%m-%d").to_string();
        let raw: Vec<RawNewsArticle> = self
            .fetcher
            .fetch_json(
                self.fetcher.get(&url).query(&[
                    ("symbol", symbol),
                    ("from", from_s.as_str()),
                    ("to", to_s.as_str()),
                    ("token", token),
                ]),
                Some(REVALIDATE_NEWS_SECS),
            )
            .await?;
        Ok(raw
            .into_iter()
            .map(|a| a.into_article(Some(symbol.to_string())))
            .collect())
    }

    /// General (category-scoped) news feed, roughly reverse-chronological.
    pub async fn general_news(&self) -> Result<Vec<NewsArticle>, MarketDataError> {
        let token = self.token()?;
        let url = format!("{}/news", self.base_url);
        let raw: Vec<RawNewsArticle> = self
            .fetcher
            .fetch_json(
                self.fetcher
                    .get(&url)
                    .query(&[("category", "general"), ("token", token)]),
                Some(REVALIDATE_NEWS_SECS),
            )
            .await?;
        Ok(raw.into_iter().map(|a| a.into_article(None)).collect())
    }

    /// Symbol/text search. Degrades to an empty (logged) result on any
    /// failure, including a missing token, because it backs an interactive
    /// field that should never error the whole page. Results are memoized in
    /// the caller's request-scoped cache, one network fan-out per unique
    /// query.
    pub async fn search(&self, query: &str, cache: &SearchCache) -> Vec<SearchResult> {
        let trimmed = query.trim().to_string();
        if let Some(hit) = cache.get(&trimmed).await {
            tracing::debug!(query = %trimmed, "search memoization hit");
            return hit;
        }

        let token = match self.token() {
            Ok(token) => token.to_string(),
            Err(_) => {
                tracing::error!("FINNHUB API key is not configured; search returns no results");
                return Vec::new();
            }
        };

        let results = if trimmed.is_empty() {
            self.popular_stocks(&token).await
        } else {
            match self.text_search(&trimmed, &token).await {
                Ok(results) => results,
                Err(err) => {
                    tracing::error!(query = %trimmed, error = %err, "search failed");
                    Vec::new()
                }
            }
        };

        cache.put(trimmed, results.clone()).await;
        results
    }

    /// Empty-query listing: one concurrent profile lookup per popular symbol.
    /// A failed lookup silently drops that symbol rather than failing the
    /// whole listing.
    async fn popular_stocks(&self, token: &str) -> Vec<SearchResult> {
        let lookups = POPULAR_STOCK_SYMBOLS[..POPULAR_LIMIT].iter().map(|&symbol| async move {
            let raw = self.fetch_profile(symbol, token).await.ok()?;
            let has_industry = raw
                .finnhub_industry
                .as_deref()
                .is_some_and(|s| !s.is_empty());
            Some(SearchResult {
                symbol: symbol.to_string(),
                name: non_empty(raw.name).unwrap_or_else(|| symbol.to_string()),
                exchange: non_empty(raw.exchange).unwrap_or_else(|| "US".to_string()),
                instrument_type: if has_industry { "Stock" } else { "Crypto" }.to_string(),
                is_in_watchlist: false,
            })
        });
        join_all(lookups).await.into_iter().flatten().collect()
    }

    async fn text_search(
        &self,
        query: &str,
        token: &str,
    ) -> Result<Vec<SearchResult>, MarketDataError> {
        let url = format!("{}/search", self.base_url);
        let raw: RawSearchResponse = self
            .fetcher
            .fetch_json(
                self.fetcher.get(&url).query(&[("q", query), ("token", token)]),
                Some(REVALIDATE_SEARCH_SECS),
            )
            .await?;
        // Upstream is assumed already de-duplicated by symbol.
        Ok(raw
            .result
            .into_iter()
            .take(SEARCH_RESULT_LIMIT)
            .map(|item| SearchResult {
                symbol: item.symbol,
                name: item.description,
                exchange: "US".to_string(),
                instrument_type: non_empty(item.instrument_type).unwrap_or_else(|| "Stock".to_string()),
                is_in_watchlist: false,
            })
            .collect())
    }

    async fn fetch_profile(
        &self,
        symbol: &str,
        token: &str,
    ) -> Result<RawProfile, MarketDataError> {
        let url = format!("{}/stock/profile2", self.base_url);
        self.fetcher
            .fetch_json(
                self.fetcher.get(&url).query(&[("symbol", symbol), ("token", token)]),
                Some(REVALIDATE_PROFILE_SECS),
            )
            .await
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.is_empty())
}

// Raw upstream shapes. Every field defaults: partially-populated or entirely
// missing fields must never crash the pipeline.

#[derive(Debug, Deserialize)]
struct RawQuote {
    #[serde(default)]
    c: Option<f64>,
    #[serde(default)]
    d: Option<f64>,
    #[serde(default)]
    dp: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct RawProfile {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    exchange: Option<String>,
    #[serde(default, rename = "finnhubIndustry")]
    finnhub_industry: Option<String>,
    #[serde(default, rename = "marketCapitalization")]
    market_capitalization: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RawMetricsResponse {
    #[serde(default)]
    metric: RawMetricFields,
}

#[derive(Debug, Default, Deserialize)]
struct RawMetricFields {
    #[serde(default, rename = "peNormalizedAnnual")]
    pe_normalized_annual: Option<f64>,
    #[serde(default, rename = "marketCapitalization")]
    market_capitalization: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RawSearchResponse {
    #[serde(default)]
    result: Vec<RawSearchItem>,
}

#[derive(Debug, Deserialize)]
struct RawSearchItem {
    #[serde(default)]
    symbol: String,
    #[serde(default)]
    description: String,
    #[serde(default, rename = "type")]
    instrument_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawNewsArticle {
    #[serde(default)]
    id: i64,
    #[serde(default)]
    headline: String,
    #[serde(default)]
    summary: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    image: String,
    #[serde(default)]
    datetime: i64,
    #[serde(default)]
    source: String,
}

impl RawNewsArticle {
    fn into_article(self, symbol: Option<String>) -> NewsArticle {
        NewsArticle {
            id: self.id,
            // Field rename, not a transform: display title is the headline.
            title: self.headline,
            summary: self.summary,
            url: self.url,
            image: self.image,
            datetime: self.datetime,
            source: self.source,
            symbol,
        }
    }
}

//! Fans out per-symbol news requests, interleaves results fairly across
//! symbols, and falls back to the general feed when nothing usable remains.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use chrono::{Duration, NaiveDate, Utc};
use finnhub_client::FinnhubClient;
use futures_util::future::join_all;
use market_core::{MarketDataError, NewsArticle};

/// Final article cap for both the symbol-scoped and general paths.
pub const MAX_ARTICLES: usize = 6;

/// Unique general-feed candidates collected before the final truncation.
const GENERAL_UNIQUE_CAP: usize = 20;

const NEWS_WINDOW_DAYS: i64 = 5;

pub struct NewsSelector {
    client: Arc<FinnhubClient>,
}

impl NewsSelector {
    pub fn new(client: Arc<FinnhubClient>) -> Self {
        Self { client }
    }

    /// With symbols: company news per symbol over a trailing 5-day window,
    /// fetched concurrently, per-symbol failures isolated to an empty list;
    /// valid articles are round-robin interleaved up to the cap and sorted
    /// newest-first. With no symbols, or when the fan-out yields nothing,
    /// the general feed is deduplicated and truncated in upstream order.
    pub async fn get_news(&self, symbols: &[String]) -> Result<Vec<NewsArticle>, MarketDataError> {
        let clean: Vec<String> = symbols
            .iter()
            .filter_map(|s| {
                let trimmed = s.trim().to_uppercase();
                (!trimmed.is_empty()).then_some(trimmed)
            })
            .collect();

        if !clean.is_empty() {
            let (from, to) = trailing_window(NEWS_WINDOW_DAYS);
            let fetches = clean.iter().map(|symbol| self.fetch_symbol_news(symbol, from, to));
            let mut per_symbol: Vec<VecDeque<NewsArticle>> = join_all(fetches).await;

            let mut collected = round_robin_select(&mut per_symbol, MAX_ARTICLES);
            if !collected.is_empty() {
                collected.sort_by(|a, b| b.datetime.cmp(&a.datetime));
                collected.truncate(MAX_ARTICLES);
                return Ok(collected);
            }
        }

        let general = self.client.general_news().await?;
        Ok(select_general(general, MAX_ARTICLES))
    }

    async fn fetch_symbol_news(
        &self,
        symbol: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> VecDeque<NewsArticle> {
        match self.client.company_news(symbol, from, to).await {
            Ok(articles) => articles.into_iter().filter(is_valid_article).collect(),
            Err(err) => {
                tracing::error!(%symbol, error = %err, "company news fetch failed");
                VecDeque::new()
            }
        }
    }
}

/// All display-critical fields present and non-empty.
pub fn is_valid_article(article: &NewsArticle) -> bool {
    !article.title.is_empty()
        && !article.summary.is_empty()
        && !article.url.is_empty()
        && !article.image.is_empty()
        && !article.source.is_empty()
        && article.datetime > 0
}

/// One article from the front of each list in turn; an exhausted list is
/// skipped in later rounds without stalling the rotation. Stops as soon as
/// the cap is reached.
pub fn round_robin_select(
    per_symbol: &mut [VecDeque<NewsArticle>],
    cap: usize,
) -> Vec<NewsArticle> {
    let mut collected = Vec::new();
    'rounds: for _ in 0..cap {
        for list in per_symbol.iter_mut() {
            let Some(article) = list.pop_front() else {
                continue;
            };
            collected.push(article);
            if collected.len() >= cap {
                break 'rounds;
            }
        }
    }
    collected
}

/// General-feed shaping: validity filter, composite-key dedupe, at most
/// `GENERAL_UNIQUE_CAP` unique candidates, truncated to `cap`. Upstream
/// order (roughly reverse-chronological) is preserved, not re-sorted.
pub fn select_general(articles: Vec<NewsArticle>, cap: usize) -> Vec<NewsArticle> {
    let mut seen = HashSet::new();
    let mut unique = Vec::new();
    for article in articles {
        if !is_valid_article(&article) {
            continue;
        }
        if !seen.insert(article.dedup_key()) {
            continue;
        }
        unique.push(article);
        if unique.len() >= GENERAL_UNIQUE_CAP {
            break;
        }
    }
    unique.truncate(cap);
    unique
}

fn trailing_window(days: i64) -> (NaiveDate, NaiveDate) {
    let to = Utc::now().date_naive();
    (to - Duration::days(days), to)
}

//! Retrying HTTP fetch with timeout, backoff and an optional freshness cache.

use std::fmt;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use market_core::MarketDataError;
use serde::de::DeserializeOwned;

const MAX_ATTEMPTS: u32 = 3;
const ATTEMPT_TIMEOUT: Duration = Duration::from_secs(15);

/// Delay before attempt `n` (n >= 2): 1s, 2s, ...
fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_secs(1u64 << (attempt - 2))
}

/// Per-attempt failure, classified so the retry loop can decide whether the
/// budget applies and so the terminal error keeps its cause.
enum AttemptError {
    Timeout,
    Connect(String),
    Status(u16),
    Decode(String),
    Other(String),
}

impl AttemptError {
    /// 4xx statuses other than 429 will not self-heal; everything else is
    /// worth a retry.
    fn retryable(&self) -> bool {
        match self {
            AttemptError::Status(status) => *status == 429 || *status >= 500,
            _ => true,
        }
    }

    fn into_terminal(self) -> MarketDataError {
        match self {
            AttemptError::Timeout => MarketDataError::RequestTimeout,
            AttemptError::Connect(_) => MarketDataError::Unreachable,
            AttemptError::Status(status) => MarketDataError::HttpStatus(status),
            AttemptError::Decode(msg) => MarketDataError::Decode(msg),
            AttemptError::Other(msg) => MarketDataError::Upstream(msg),
        }
    }
}

impl fmt::Display for AttemptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptError::Timeout => write!(f, "timed out after {:?}", ATTEMPT_TIMEOUT),
            AttemptError::Connect(msg) => write!(f, "connection failed: {}", msg),
            AttemptError::Status(status) => write!(f, "HTTP status {}", status),
            AttemptError::Decode(msg) => write!(f, "decode failed: {}", msg),
            AttemptError::Other(msg) => write!(f, "{}", msg),
        }
    }
}

struct CachedBody {
    body: serde_json::Value,
    fetched_at: Instant,
    ttl: Duration,
}

/// HTTP-call wrapper: fixed 15s per-attempt timeout (the in-flight call is
/// dropped on expiry), up to 3 total attempts with 1s/2s backoff, and a
/// URL-keyed freshness cache honoring the caller's revalidate hint.
pub(crate) struct Fetcher {
    client: reqwest::Client,
    cache: DashMap<String, CachedBody>,
}

impl Fetcher {
    pub(crate) fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            cache: DashMap::new(),
        }
    }

    pub(crate) fn get(&self, url: &str) -> reqwest::RequestBuilder {
        self.client.get(url)
    }

    /// Execute the built request, retrying per policy, and deserialize the
    /// JSON body. `revalidate` seconds, when given, caches the successful
    /// body keyed by the final URL.
    pub(crate) async fn fetch_json<T: DeserializeOwned>(
        &self,
        builder: reqwest::RequestBuilder,
        revalidate: Option<u64>,
    ) -> Result<T, MarketDataError> {
        let request = builder
            .build()
            .map_err(|e| MarketDataError::Upstream(e.to_string()))?;
        let url = request.url().to_string();

        if let Some(body) = self.cache_lookup(&url) {
            tracing::debug!(%url, "freshness cache hit");
            return serde_json::from_value(body).map_err(|e| MarketDataError::Decode(e.to_string()));
        }

        let mut last_err = AttemptError::Other("no attempts made".to_string());
        for attempt in 1..=MAX_ATTEMPTS {
            if attempt > 1 {
                let delay = backoff_delay(attempt);
                tracing::warn!(
                    %url,
                    "attempt {} failed ({}); retrying in {:?}",
                    attempt - 1,
                    last_err,
                    delay
                );
                tokio::time::sleep(delay).await;
            }

            let req = match request.try_clone() {
                Some(req) => req,
                None => return Err(MarketDataError::Upstream("request cannot be cloned".into())),
            };

            match self.attempt(req).await {
                Ok(body) => {
                    if let Some(secs) = revalidate.filter(|s| *s > 0) {
                        self.cache.insert(
                            url,
                            CachedBody {
                                body: body.clone(),
                                fetched_at: Instant::now(),
                                ttl: Duration::from_secs(secs),
                            },
                        );
                    }
                    return serde_json::from_value(body)
                        .map_err(|e| MarketDataError::Decode(e.to_string()));
                }
                Err(err) if !err.retryable() => {
                    tracing::warn!(%url, "permanent failure ({}), not retrying", err);
                    return Err(err.into_terminal());
                }
                Err(err) => last_err = err,
            }
        }

        tracing::error!(%url, "giving up after {} attempts: {}", MAX_ATTEMPTS, last_err);
        Err(last_err.into_terminal())
    }

    async fn attempt(&self, request: reqwest::Request) -> Result<serde_json::Value, AttemptError> {
        let response = match tokio::time::timeout(ATTEMPT_TIMEOUT, self.client.execute(request)).await
        {
            Err(_) => return Err(AttemptError::Timeout),
            Ok(Err(e)) if e.is_connect() => return Err(AttemptError::Connect(e.to_string())),
            Ok(Err(e)) if e.is_timeout() => return Err(AttemptError::Timeout),
            Ok(Err(e)) => return Err(AttemptError::Other(e.to_string())),
            Ok(Ok(response)) => response,
        };

        let status = response.status();
        if !status.is_success() {
            return Err(AttemptError::Status(status.as_u16()));
        }

        response
            .json()
            .await
            .map_err(|e| AttemptError::Decode(e.to_string()))
    }

    fn cache_lookup(&self, url: &str) -> Option<serde_json::Value> {
        let entry = self.cache.get(url)?;
        if entry.fetched_at.elapsed() < entry.ttl {
            return Some(entry.body.clone());
        }
        drop(entry);
        self.cache.remove(url);
        None
    }
}

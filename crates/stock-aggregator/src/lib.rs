//! Joins quote + profile + metrics for one symbol into a display-ready view.

use std::sync::Arc;

use async_trait::async_trait;
use finnhub_client::FinnhubClient;
use market_core::{
    CompanyProfile, FinancialMetrics, MarketDataError, Quote, StockDetailsProvider, StockView,
};

pub struct StockAggregator {
    client: Arc<FinnhubClient>,
}

impl StockAggregator {
    pub fn new(client: Arc<FinnhubClient>) -> Self {
        Self { client }
    }

    /// Concurrent quote + profile + metrics, joined all-or-nothing: any
    /// sub-failure fails the whole operation rather than producing a
    /// partially-filled view.
    pub async fn get_stock_details(&self, symbol: &str) -> Result<StockView, MarketDataError> {
        tracing::debug!(%symbol, "aggregating quote, profile and metrics");
        let (quote, profile, metrics) = tokio::try_join!(
            self.client.quote(symbol),
            self.client.profile(symbol),
            self.client.metrics(symbol),
        )?;
        Ok(build_view(symbol, &quote, &profile, &metrics))
    }
}

#[async_trait]
impl StockDetailsProvider for StockAggregator {
    async fn stock_details(&self, symbol: &str) -> Result<StockView, MarketDataError> {
        self.get_stock_details(symbol).await
    }
}

/// Assemble the denormalized view. Pure; all formatting fallbacks live here.
pub fn build_view(
    symbol: &str,
    quote: &Quote,
    profile: &CompanyProfile,
    metrics: &FinancialMetrics,
) -> StockView {
    // Profile market cap wins unless it is absent, zero or NaN; then the
    // metrics value is consulted. A negative profile value is kept (and
    // formats to "N/A") rather than falling through.
    let market_cap = profile
        .market_capitalization
        .filter(|m| *m != 0.0 && !m.is_nan())
        .or(metrics.market_capitalization);

    StockView {
        symbol: symbol.to_string(),
        company: profile.name.clone().unwrap_or_else(|| symbol.to_string()),
        current_price: quote.current.filter(|c| c.is_finite()).unwrap_or(0.0),
        price_formatted: format_price(quote.current),
        change_formatted: format_change(quote.change, quote.percent_change),
        change_percent: quote.percent_change.filter(|p| p.is_finite()).unwrap_or(0.0),
        market_cap_formatted: format_market_cap(market_cap),
        pe_ratio: format_pe(metrics.pe_normalized_annual),
    }
}

/// Bucketed market-cap string: `$X.XXT` / `$X.XXB` / `$X.XXM`, plain dollars
/// under a million, "N/A" for absent, non-finite or non-positive values.
pub fn format_market_cap(market_cap: Option<f64>) -> String {
    let m = match market_cap {
        Some(m) if m.is_finite() && m > 0.0 => m,
        _ => return "N/A".to_string(),
    };
    if m >= 1e12 {
        format!("${:.2}T", m / 1e12)
    } else if m >= 1e9 {
        format!("${:.2}B", m / 1e9)
    } else if m >= 1e6 {
        format!("${:.2}M", m / 1e6)
    } else {
        format!("${:.2}", m)
    }
}

pub fn format_price(current: Option<f64>) -> String {
    match current {
        Some(c) if c != 0.0 && c.is_finite() => format!("${:.2}", c),
        _ => "N/A".to_string(),
    }
}

/// Sign-prefixed absolute change with the percent in parentheses. The percent
/// falls back to "0.00" on its own; a missing/zero change makes the whole
/// string "N/A".
pub fn format_change(change: Option<f64>, percent: Option<f64>) -> String {
    let d = match change {
        Some(d) if d != 0.0 && d.is_finite() => d,
        _ => return "N/A".to_string(),
    };
    let sign = if d > 0.0 { "+" } else { "" };
    let pct = percent
        .filter(|p| p.is_finite())
        .map(|p| format!("{:.2}", p))
        .unwrap_or_else(|| "0.00".to_string());
    format!("{}{:.2} ({}%)", sign, d, pct)
}

pub fn format_pe(pe: Option<f64>) -> String {
    pe.filter(|p| p.is_finite())
        .map(|p| format!("{:.2}", p))
        .unwrap_or_else(|| "N/A".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn market_cap_buckets_have_no_gaps_at_boundaries() {
        assert_eq!(format_market_cap(Some(1e12)), "$1.00T");
        assert_eq!(format_market_cap(Some(2.45e12)), "$2.45T");
        assert_eq!(format_market_cap(Some(1e9)), "$1.00B");
        assert_eq!(format_market_cap(Some(1e6)), "$1.00M");
        assert_eq!(format_market_cap(Some(999_999.0)), "$999999.00");
        assert_eq!(format_market_cap(Some(500.5)), "$500.50");
    }

    #[test]
    fn market_cap_falls_back_for_degenerate_values() {
        assert_eq!(format_market_cap(None), "N/A");
        assert_eq!(format_market_cap(Some(0.0)), "N/A");
        assert_eq!(format_market_cap(Some(-5e9)), "N/A");
        assert_eq!(format_market_cap(Some(f64::NAN)), "N/A");
        assert_eq!(format_market_cap(Some(f64::INFINITY)), "N/A");
    }

    #[test]
    fn price_formats_or_falls_back() {
        assert_eq!(format_price(Some(123.456)), "$123.46");
        assert_eq!(format_price(Some(0.0)), "N/A");
        assert_eq!(format_price(None), "N/A");
        assert_eq!(format_price(Some(f64::NAN)), "N/A");
    }

    #[test]
    fn change_is_sign_prefixed_with_percent() {
        assert_eq!(format_change(Some(2.5), Some(1.45)), "+2.50 (1.45%)");
        assert_eq!(format_change(Some(-3.25), Some(-1.1)), "-3.25 (-1.10%)");
        assert_eq!(format_change(Some(2.5), None), "+2.50 (0.00%)");
        assert_eq!(format_change(Some(2.5), Some(0.0)), "+2.50 (0.00%)");
        assert_eq!(format_change(None, Some(1.0)), "N/A");
        assert_eq!(format_change(Some(0.0), Some(1.0)), "N/A");
    }

    #[test]
    fn pe_formats_or_falls_back() {
        assert_eq!(format_pe(Some(28.5)), "28.50");
        assert_eq!(format_pe(Some(0.0)), "0.00");
        assert_eq!(format_pe(None), "N/A");
        assert_eq!(format_pe(Some(f64::NAN)), "N/A");
    }

    #[test]
    fn view_never_emits_raw_nan_or_unformatted_numbers() {
        let quote = Quote {
            current: Some(f64::NAN),
            change: Some(f64::NAN),
            percent_change: Some(f64::NAN),
        };
        let view = build_view(
            "AAPL",
            &quote,
            &CompanyProfile::default(),
            &FinancialMetrics::default(),
        );
        assert_eq!(view.price_formatted, "N/A");
        assert_eq!(view.change_formatted, "N/A");
        assert_eq!(view.market_cap_formatted, "N/A");
        assert_eq!(view.pe_ratio, "N/A");
        assert_eq!(view.current_price, 0.0);
        assert_eq!(view.change_percent, 0.0);
    }

    #[test]
    fn company_name_falls_back_to_symbol() {
        let view = build_view(
            "TSLA",
            &Quote::default(),
            &CompanyProfile::default(),
            &FinancialMetrics::default(),
        );
        assert_eq!(view.company, "TSLA");
    }

    #[test]
    fn zero_profile_cap_falls_through_to_metrics_cap() {
        let profile = CompanyProfile {
            market_capitalization: Some(0.0),
            ..CompanyProfile::default()
        };
        let metrics = FinancialMetrics {
            market_capitalization: Some(5e9),
            ..FinancialMetrics::default()
        };
        let view = build_view("AAPL", &Quote::default(), &profile, &metrics);
        assert_eq!(view.market_cap_formatted, "$5.00B");
    }

    #[test]
    fn negative_profile_cap_does_not_fall_through() {
        let profile = CompanyProfile {
            market_capitalization: Some(-10.0),
            ..CompanyProfile::default()
        };
        let metrics = FinancialMetrics {
            market_capitalization: Some(5e9),
            ..FinancialMetrics::default()
        };
        let view = build_view("AAPL", &Quote::default(), &profile, &metrics);
        assert_eq!(view.market_cap_formatted, "N/A");
    }
}

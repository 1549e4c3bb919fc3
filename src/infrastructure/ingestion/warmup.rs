//! Startup (and on-demand, per newly armed rule) historical candle
//! warm-up: fetches the last N closed candles for every `(Symbol,
//! Timeframe)` a rule depends on and loads them into `CandleStore` before
//! the engine will evaluate that rule.
//!
//! The client wraps a plain `reqwest::Client` in `reqwest-middleware`
//! with a bounded exponential-backoff retry policy: a 15s per-series
//! timeout with 3 retries, sized for many small warm-up fetches rather
//! than one large download.

use std::time::Duration;

use reqwest::Client;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::policies::ExponentialBackoff;
use reqwest_retry::RetryTransientMiddleware;
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::application::candle_store::CandleStore;
use crate::domain::candle::Candle;
use crate::domain::errors::AlertError;
use crate::domain::rule::Rule;
use crate::domain::symbol::Symbol;
use crate::domain::timeframe::Timeframe;

const PER_SERIES_TIMEOUT: Duration = Duration::from_secs(15);
const MAX_RETRIES: u32 = 3;

pub fn build_client() -> ClientWithMiddleware {
    let retry_policy = ExponentialBackoff::builder().build_with_max_retries(MAX_RETRIES);
    let client = Client::builder()
        .timeout(PER_SERIES_TIMEOUT)
        .connect_timeout(Duration::from_secs(5))
        .build()
        .unwrap_or_else(|_| Client::new());

    ClientBuilder::new(client)
        .with(RetryTransientMiddleware::new_with_policy(retry_policy))
        .build()
}

#[derive(Debug, Deserialize)]
struct RestCandle {
    open_time: i64,
    open: String,
    high: String,
    low: String,
    close: String,
    volume: String,
}

/// Fetches the last `count` closed candles for one series from the REST
/// warm-up endpoint. Ascending `open_time` order is assumed of the
/// response, matching CandleStore's append precondition.
async fn fetch_candles(
    client: &ClientWithMiddleware,
    rest_base_url: &str,
    symbol: &Symbol,
    timeframe: Timeframe,
    count: usize,
) -> Result<Vec<Candle>, AlertError> {
    let url = format!(
        "{}/klines?symbol={}&interval={}&limit={count}",
        rest_base_url.trim_end_matches('/'),
        symbol,
        timeframe.to_binance_string(),
    );
    let response = client.get(&url).send().await.map_err(|e| AlertError::TransientUpstream {
        reason: format!("warm-up fetch for {symbol} {timeframe} failed: {e}"),
    })?;
    let raw: Vec<RestCandle> = response.json().await.map_err(|e| AlertError::TransientUpstream {
        reason: format!("warm-up response for {symbol} {timeframe} was not valid JSON: {e}"),
    })?;

    Ok(raw
        .into_iter()
        .map(|c| Candle {
            open_time: c.open_time,
            close_time: c.open_time + timeframe.to_millis(),
            open: c.open.parse().unwrap_or_default(),
            high: c.high.parse().unwrap_or_default(),
            low: c.low.parse().unwrap_or_default(),
            close: c.close.parse().unwrap_or_default(),
            volume: c.volume.parse().unwrap_or_default(),
        })
        .collect())
}

/// Drains newly (upserted/bulk-loaded) rules from `inbox` and warms up
/// every series they depend on that `CandleStore` hasn't already marked
/// warmed. A series that exhausts its retries is left un-warmed rather
/// than failing the whole rule: it reports `warming_up` indefinitely
/// until the next rule edit retries it.
pub async fn run(
    mut inbox: mpsc::Receiver<Rule>,
    candles: CandleStore,
    client: ClientWithMiddleware,
    rest_base_url: String,
) {
    while let Some(rule) = inbox.recv().await {
        for (timeframe, depth) in rule.required_series() {
            if candles.is_warmed_up(&rule.symbol, timeframe).await {
                continue;
            }
            match fetch_candles(&client, &rest_base_url, &rule.symbol, timeframe, depth).await {
                Ok(series) => {
                    info!(symbol = %rule.symbol, %timeframe, count = series.len(), "warm-up loaded");
                    candles.bulk_load(rule.symbol.clone(), timeframe, series).await;
                }
                Err(e) => {
                    warn!(symbol = %rule.symbol, %timeframe, error = %e, "warm-up fetch exhausted retries; rule stays warming_up");
                }
            }
        }
    }
}

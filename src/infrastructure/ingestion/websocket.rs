//! A resilient connection to the upstream all-mini-ticker stream.
//! Reconnects with exponential backoff capped at 30s, re-subscribes to
//! the full symbol set on every reconnect, and flags the first tick
//! delivered per symbol after a reconnect `resync=true`.
//!
//! The reconnect loop and ping task are split the way a long-lived
//! exchange WebSocket client usually is, generalized from a single
//! per-symbol trade stream to the bulk mini-ticker array this system
//! depends on.

use std::collections::HashSet;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use rust_decimal::Decimal;
use serde::Deserialize;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

use crate::domain::symbol::Symbol;
use crate::domain::tick::TickEvent;
use crate::infrastructure::ingestion::backpressure::LatestTickBuffer;
use crate::infrastructure::observability::Metrics;

const INITIAL_BACKOFF_SECS: u64 = 1;
const MAX_BACKOFF_SECS: u64 = 30;
const PING_INTERVAL: Duration = Duration::from_secs(180);

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum IncomingFrame {
    Bulk(Vec<MiniTicker>),
    Single(MiniTicker),
}

#[derive(Debug, Deserialize)]
struct MiniTicker {
    #[serde(rename = "s")]
    symbol: String,
    #[serde(rename = "c")]
    close: String,
    #[serde(rename = "o")]
    open: String,
    #[serde(rename = "h")]
    high: String,
    #[serde(rename = "l")]
    low: String,
    #[serde(rename = "v")]
    volume: String,
    #[serde(rename = "E")]
    event_time: i64,
}

/// Runs the reconnect loop until the process exits. Every failure is
/// retried with backoff - the loop itself never returns an error; the
/// only thing that ends it is the process-wide shutdown.
pub async fn run(ws_url: String, symbols: Vec<String>, buffer: LatestTickBuffer, metrics: Metrics) {
    let mut backoff = INITIAL_BACKOFF_SECS;
    loop {
        info!(url = %ws_url, symbols = symbols.len(), "connecting to upstream mini-ticker stream");
        match connect_and_stream(&ws_url, &symbols, &buffer, &metrics).await {
            Ok(()) => {
                info!("upstream stream closed gracefully; reconnecting");
                backoff = INITIAL_BACKOFF_SECS;
            }
            Err(e) => {
                warn!(error = %e, backoff_secs = backoff, "upstream stream failed; reconnecting");
                metrics.ingestion_reconnects_total.inc();
            }
        }
        tokio::time::sleep(Duration::from_secs(backoff)).await;
        backoff = (backoff * 2).min(MAX_BACKOFF_SECS);
    }
}

async fn connect_and_stream(
    ws_url: &str,
    symbols: &[String],
    buffer: &LatestTickBuffer,
    metrics: &Metrics,
) -> anyhow::Result<()> {
    let url = format!("{}/stream?streams=!miniTicker@arr", ws_url.trim_end_matches('/'));
    let (ws_stream, _) = connect_async(&url).await?;
    info!("upstream mini-ticker stream connected");

    let (mut write, mut read) = ws_stream.split();
    let (out_tx, mut out_rx) = tokio::sync::mpsc::channel::<Message>(32);

    tokio::spawn(async move {
        while let Some(msg) = out_rx.recv().await {
            if write.send(msg).await.is_err() {
                break;
            }
        }
    });

    let ping_tx = out_tx.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(PING_INTERVAL);
        loop {
            ticker.tick().await;
            if ping_tx.send(Message::Ping(Vec::new().into())).await.is_err() {
                break;
            }
        }
    });

    // Re-subscribing here means every symbol gets its next tick flagged
    // resync=true - the set only shrinks as each symbol's first
    // post-connect tick is forwarded.
    let mut pending_resync: HashSet<Symbol> = symbols.iter().map(Symbol::new).collect();

    while let Some(msg) = read.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                handle_frame(&text, buffer, metrics, &mut pending_resync);
            }
            Ok(Message::Ping(payload)) => {
                let _ = out_tx.send(Message::Pong(payload)).await;
            }
            Ok(Message::Pong(_)) => {}
            Ok(Message::Close(frame)) => {
                info!(?frame, "upstream closed the connection");
                break;
            }
            Err(e) => return Err(anyhow::anyhow!("upstream read error: {e}")),
            _ => {}
        }
    }
    Ok(())
}

fn handle_frame(
    text: &str,
    buffer: &LatestTickBuffer,
    metrics: &Metrics,
    pending_resync: &mut HashSet<Symbol>,
) {
    let tickers: Vec<MiniTicker> = match serde_json::from_str::<IncomingFrame>(text) {
        Ok(IncomingFrame::Bulk(tickers)) => tickers,
        Ok(IncomingFrame::Single(ticker)) => vec![ticker],
        Err(e) => {
            debug!(error = %e, "ignoring unparseable upstream frame");
            return;
        }
    };

    for ticker in tickers {
        let symbol = Symbol::new(&ticker.symbol);
        let resync = pending_resync.remove(&symbol);
        let tick = TickEvent {
            price: parse_decimal(&ticker.close),
            volume: parse_decimal(&ticker.volume),
            ts_ms: ticker.event_time,
            day_open: Some(parse_decimal(&ticker.open)),
            day_high: Some(parse_decimal(&ticker.high)),
            day_low: Some(parse_decimal(&ticker.low)),
            day_volume: Some(parse_decimal(&ticker.volume)),
            resync,
            symbol,
        };
        buffer.publish(tick, metrics);
    }
}

fn parse_decimal(raw: &str) -> Decimal {
    raw.parse().unwrap_or(Decimal::ZERO)
}

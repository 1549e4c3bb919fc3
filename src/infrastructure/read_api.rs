//! Optional, read-only HTTP surface (feature `read-api`, gated at
//! runtime behind `LISTEN_ADDR`): a chart/candle query endpoint and a
//! per-rule status lookup. Nothing here accepts a mutation - rule edits
//! and the trigger feed go through their own channels - this module only
//! answers questions about state the rest of the crate already owns.
//!
//! Built on the standard `axum::Router` + `State` + `Json` dashboard-API
//! shape (see DESIGN.md for where this module's stack is grounded).

use std::str::FromStr;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use axum::routing::get;
use axum::Router;
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};

use crate::application::alert_index::AlertIndex;
use crate::application::candle_store::CandleStore;
use crate::domain::candle::Candle;
use crate::domain::rule::{RuleId, RuleStatus};
use crate::domain::symbol::Symbol;
use crate::domain::timeframe::Timeframe;

#[derive(Clone)]
struct ApiState {
    candles: CandleStore,
    index: AlertIndex,
}

/// Builds the router. `listen_addr` is read by the caller (the binary's
/// `main`), not here - this function only assembles routes.
pub fn router(candles: CandleStore, index: AlertIndex) -> Router {
    let state = Arc::new(ApiState { candles, index });
    Router::new()
        .route("/candles/:symbol/:timeframe", get(get_candles))
        .route("/rules/:id/status", get(get_rule_status))
        .with_state(state)
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
}

#[derive(Debug, Deserialize)]
struct CandlesQuery {
    count: Option<usize>,
}

#[derive(Debug, Serialize)]
struct CandlesResponse {
    symbol: String,
    timeframe: String,
    candles: Vec<Candle>,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

const DEFAULT_CANDLE_COUNT: usize = 100;
const MAX_CANDLE_COUNT: usize = 1000;

async fn get_candles(
    Path((symbol, timeframe)): Path<(String, String)>,
    Query(query): Query<CandlesQuery>,
    State(state): State<Arc<ApiState>>,
) -> impl IntoResponse {
    let timeframe = match Timeframe::from_str(&timeframe) {
        Ok(tf) => tf,
        Err(e) => {
            return (StatusCode::BAD_REQUEST, Json(ErrorResponse { error: e.to_string() }))
                .into_response()
        }
    };
    let count = query.count.unwrap_or(DEFAULT_CANDLE_COUNT).min(MAX_CANDLE_COUNT);
    let symbol = Symbol::new(&symbol);
    let candles = state.candles.last_n(&symbol, timeframe, count).await;

    Json(CandlesResponse {
        symbol: symbol.to_string(),
        timeframe: timeframe.to_string(),
        candles,
    })
    .into_response()
}

#[derive(Debug, Serialize)]
struct RuleStatusResponse {
    rule_id: RuleId,
    status: RuleStatus,
}

async fn get_rule_status(
    Path(raw_id): Path<String>,
    State(state): State<Arc<ApiState>>,
) -> impl IntoResponse {
    let rule_id = match RuleId::parse_str(&raw_id) {
        Ok(id) => id,
        Err(_) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse { error: format!("'{raw_id}' is not a valid rule id") }),
            )
                .into_response();
        }
    };
    let snap = state.index.snapshot();
    let Some(rule) = snap.get(&rule_id) else {
        return (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse { error: format!("unknown rule {rule_id}") }),
        )
            .into_response();
    };

    let status = if snap.is_dormant(&rule_id) {
        RuleStatus::Dormant
    } else {
        let mut warmed_up = true;
        for (timeframe, _depth) in rule.required_series() {
            if !state.candles.is_warmed_up(&rule.symbol, timeframe).await {
                warmed_up = false;
                break;
            }
        }
        if warmed_up { RuleStatus::Armed } else { RuleStatus::WarmingUp }
    };

    Json(RuleStatusResponse { rule_id, status }).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::rule::{Direction, Rule, Target, ThrottleSpec};
    use rust_decimal_macros::dec;

    fn rule(symbol: &str) -> Rule {
        Rule {
            id: RuleId::new_v4(),
            symbol: Symbol::new(symbol),
            direction: Direction::Above,
            target: Target::PriceLevel { value: dec!(100) },
            reference_price: None,
            candle_shape: None,
            rsi: None,
            ema: None,
            volume_spike: None,
            min_daily_volume: None,
            throttle: ThrottleSpec::default(),
            active: true,
            created_at: chrono::Utc::now(),
            last_triggered_at: None,
        }
    }

    #[tokio::test]
    async fn armed_rule_with_no_required_series_reports_armed() {
        let index = AlertIndex::new();
        let candles = CandleStore::new(64);
        let r = rule("BTCUSDT");
        let id = r.id;
        index.apply(crate::application::alert_index::IndexMutation::Upsert(r));

        let state = Arc::new(ApiState { candles, index });
        let snap = state.index.snapshot();
        let rule = snap.get(&id).unwrap();
        assert!(rule.required_series().is_empty());
        assert!(!snap.is_dormant(&id));
    }
}

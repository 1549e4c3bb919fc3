use chrono::{DateTime, Datelike, TimeZone, Timelike, Utc, Weekday};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::errors::AlertError;

/// The closed set of aggregation windows the engine understands.
///
/// Every variant carries a fixed duration and a rule for computing the
/// aligned bucket-open time for any instant. All alignment is to the UTC
/// epoch; the daily bucket opens at 00:00 UTC and the weekly bucket opens
/// on Monday 00:00 UTC (ISO 8601 week start).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    OneMin,
    FiveMin,
    FifteenMin,
    ThirtyMin,
    OneHour,
    FourHour,
    TwelveHour,
    OneDay,
    OneWeek,
}

impl Timeframe {
    pub fn all() -> [Timeframe; 9] {
        [
            Timeframe::OneMin,
            Timeframe::FiveMin,
            Timeframe::FifteenMin,
            Timeframe::ThirtyMin,
            Timeframe::OneHour,
            Timeframe::FourHour,
            Timeframe::TwelveHour,
            Timeframe::OneDay,
            Timeframe::OneWeek,
        ]
    }

    /// Duration in seconds. `OneWeek` is a fixed 7-day span measured from
    /// its Monday-aligned open, not a calendar month-sensitive quantity.
    pub fn to_seconds(&self) -> i64 {
        match self {
            Timeframe::OneMin => 60,
            Timeframe::FiveMin => 5 * 60,
            Timeframe::FifteenMin => 15 * 60,
            Timeframe::ThirtyMin => 30 * 60,
            Timeframe::OneHour => 60 * 60,
            Timeframe::FourHour => 4 * 60 * 60,
            Timeframe::TwelveHour => 12 * 60 * 60,
            Timeframe::OneDay => 24 * 60 * 60,
            Timeframe::OneWeek => 7 * 24 * 60 * 60,
        }
    }

    pub fn to_millis(&self) -> i64 {
        self.to_seconds() * 1000
    }

    pub fn to_binance_string(&self) -> &'static str {
        match self {
            Timeframe::OneMin => "1m",
            Timeframe::FiveMin => "5m",
            Timeframe::FifteenMin => "15m",
            Timeframe::ThirtyMin => "30m",
            Timeframe::OneHour => "1h",
            Timeframe::FourHour => "4h",
            Timeframe::TwelveHour => "12h",
            Timeframe::OneDay => "1d",
            Timeframe::OneWeek => "1w",
        }
    }

    /// True iff `timestamp_ms` lands exactly on this timeframe's bucket-open
    /// boundary.
    pub fn is_period_start(&self, timestamp_ms: i64) -> bool {
        self.period_start(timestamp_ms) == timestamp_ms
    }

    /// The aligned bucket-open time (epoch millis) covering `timestamp_ms`.
    pub fn period_start(&self, timestamp_ms: i64) -> i64 {
        match self {
            Timeframe::OneDay => Self::day_start_ms(timestamp_ms),
            Timeframe::OneWeek => Self::week_start_ms(timestamp_ms),
            _ => {
                let period_ms = self.to_millis();
                timestamp_ms.div_euclid(period_ms) * period_ms
            }
        }
    }

    fn day_start_ms(timestamp_ms: i64) -> i64 {
        let dt = Self::to_datetime(timestamp_ms);
        let midnight = dt
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .expect("midnight is always a valid time");
        Utc.from_utc_datetime(&midnight).timestamp_millis()
    }

    fn week_start_ms(timestamp_ms: i64) -> i64 {
        let dt = Self::to_datetime(timestamp_ms);
        let days_since_monday = dt.weekday().num_days_from_monday() as i64;
        let day_start = Self::day_start_ms(timestamp_ms);
        day_start - days_since_monday * 24 * 60 * 60 * 1000
    }

    fn to_datetime(timestamp_ms: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(timestamp_ms)
            .single()
            .unwrap_or_else(Utc::now)
    }

    /// Number of candles to request on warm-up for an indicator of the
    /// given period, padded 10% to absorb off-by-one edges.
    pub fn warmup_candles(&self, indicator_period: usize) -> usize {
        ((indicator_period as f64) * 1.1).ceil() as usize
    }
}

impl FromStr for Timeframe {
    type Err = AlertError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "1m" | "1min" => Ok(Timeframe::OneMin),
            "5m" | "5min" => Ok(Timeframe::FiveMin),
            "15m" | "15min" => Ok(Timeframe::FifteenMin),
            "30m" | "30min" => Ok(Timeframe::ThirtyMin),
            "1h" | "60m" => Ok(Timeframe::OneHour),
            "4h" => Ok(Timeframe::FourHour),
            "12h" => Ok(Timeframe::TwelveHour),
            "1d" => Ok(Timeframe::OneDay),
            "1w" => Ok(Timeframe::OneWeek),
            other => Err(AlertError::Configuration {
                reason: format!("unknown timeframe '{other}'"),
            }),
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_binance_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minute_buckets_align_to_epoch() {
        // 10:02:00 UTC on 2024-01-01 falls inside the 10:00:00 5m bucket.
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 10, 2, 0).unwrap().timestamp_millis();
        let open = Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap().timestamp_millis();
        assert_eq!(Timeframe::FiveMin.period_start(ts), open);
    }

    #[test]
    fn daily_bucket_opens_at_midnight_utc() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 7, 13, 45, 0).unwrap().timestamp_millis();
        let open = Utc.with_ymd_and_hms(2024, 3, 7, 0, 0, 0).unwrap().timestamp_millis();
        assert_eq!(Timeframe::OneDay.period_start(ts), open);
    }

    #[test]
    fn weekly_bucket_opens_monday_midnight_utc() {
        // 2024-03-07 is a Thursday; the week's Monday is 2024-03-04.
        let ts = Utc.with_ymd_and_hms(2024, 3, 7, 13, 45, 0).unwrap().timestamp_millis();
        let open = Utc.with_ymd_and_hms(2024, 3, 4, 0, 0, 0).unwrap().timestamp_millis();
        assert_eq!(Timeframe::OneWeek.period_start(ts), open);
    }

    #[test]
    fn exact_boundary_is_a_period_start() {
        let open = Utc.with_ymd_and_hms(2024, 1, 1, 11, 0, 0).unwrap().timestamp_millis();
        assert!(Timeframe::OneHour.is_period_start(open));
        assert!(!Timeframe::OneHour.is_period_start(open + 1));
    }

    #[test]
    fn from_str_is_case_insensitive() {
        assert_eq!(Timeframe::from_str("1H").unwrap(), Timeframe::OneHour);
        assert!(Timeframe::from_str("bogus").is_err());
    }
}

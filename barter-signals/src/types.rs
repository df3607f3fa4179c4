//! Core market series types consumed by the analytics engine.
//!
//! These mirror the JSON shapes delivered by the exchange REST layer: camelCase fields and
//! epoch millisecond timestamps. Every series is expected ascending by timestamp, except
//! funding rates which the exchange returns most-recent-first.

use crate::error::AnalyticsError;
use chrono::{DateTime, Utc};
use derive_more::{Constructor, Display};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// OHLCV candle, one per interval bucket.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize, Constructor)]
pub struct Candle {
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Open interest reading for a symbol.
///
/// `delta` and `change_percent` are relative to the preceding point of the same series, see
/// [`with_deltas`].
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenInterestPoint {
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    pub value: f64,
    pub symbol: SmolStr,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change_percent: Option<f64>,
}

impl OpenInterestPoint {
    pub fn new(symbol: impl Into<SmolStr>, timestamp: DateTime<Utc>, value: f64) -> Self {
        Self {
            timestamp,
            value,
            symbol: symbol.into(),
            delta: None,
            change_percent: None,
        }
    }
}

/// Position type being force-closed by a liquidation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize, Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LiquidationSide {
    #[display("LONG")]
    Long,
    #[display("SHORT")]
    Short,
}

/// Forced liquidation of a single position.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Constructor)]
pub struct LiquidationEvent {
    pub id: SmolStr,
    pub symbol: SmolStr,
    pub side: LiquidationSide,
    pub price: f64,
    pub quantity: f64,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
}

impl LiquidationEvent {
    /// Quote notional of the liquidation (quantity × price).
    pub fn notional(&self) -> f64 {
        self.quantity * self.price
    }
}

/// Periodic funding payment rate between perpetual longs and shorts.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Constructor)]
#[serde(rename_all = "camelCase")]
pub struct FundingRatePoint {
    pub symbol: SmolStr,
    /// Raw rate per funding period (e.g. 0.0001 = 0.01%).
    pub funding_rate: f64,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub funding_time: DateTime<Utc>,
}

/// Ratio of accounts positioned long versus short.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Constructor)]
#[serde(rename_all = "camelCase")]
pub struct LongShortRatioPoint {
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    pub long_short_ratio: f64,
    #[serde(default)]
    pub long_account: Option<f64>,
    #[serde(default)]
    pub short_account: Option<f64>,
}

/// Aggressor (taker) buy and sell volume over one interval.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize, Constructor)]
#[serde(rename_all = "camelCase")]
pub struct TakerVolumePoint {
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    pub buy_volume: f64,
    pub sell_volume: f64,
}

/// Directional positioning bias shared by the pressure, funding and flow analytics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize, Serialize, Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Bias {
    #[display("LONG")]
    Long,
    #[display("SHORT")]
    Short,
    #[default]
    #[display("NEUTRAL")]
    Neutral,
}

/// Series element carrying an exchange timestamp.
pub trait Timestamped {
    fn timestamp(&self) -> DateTime<Utc>;
}

impl Timestamped for Candle {
    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

impl Timestamped for OpenInterestPoint {
    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

impl Timestamped for LiquidationEvent {
    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

impl Timestamped for LongShortRatioPoint {
    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

impl Timestamped for TakerVolumePoint {
    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// Fail with [`AnalyticsError::UnorderedSeries`] if any timestamp decreases.
///
/// Equal consecutive timestamps are allowed.
pub fn ensure_ascending<T: Timestamped>(series: &str, points: &[T]) -> Result<(), AnalyticsError> {
    match points
        .iter()
        .map(Timestamped::timestamp)
        .tuple_windows()
        .position(|(prev, next)| next < prev)
    {
        Some(position) => Err(AnalyticsError::UnorderedSeries {
            series: series.to_string(),
            index: position + 1,
        }),
        None => Ok(()),
    }
}

/// Fill `delta` and `change_percent` of each point relative to the point before it.
///
/// The first point gets zero for both. `change_percent` is zero when the previous value is
/// zero.
pub fn with_deltas(points: &[OpenInterestPoint]) -> Vec<OpenInterestPoint> {
    let mut prev_value: Option<f64> = None;

    points
        .iter()
        .map(|point| {
            let (delta, change_percent) = match prev_value {
                Some(prev) => {
                    let delta = point.value - prev;
                    let pct = if prev != 0.0 { delta / prev * 100.0 } else { 0.0 };
                    (delta, pct)
                }
                None => (0.0, 0.0),
            };
            prev_value = Some(point.value);

            OpenInterestPoint {
                delta: Some(delta),
                change_percent: Some(change_percent),
                ..point.clone()
            }
        })
        .collect()
}

//! Price / open interest divergence detection.
//!
//! Compares the percentage move of price and OI over a sliding window of `W` points. Price and
//! OI series are aligned by index: callers pre-align them to the same cadence.

use crate::{
    error::AnalyticsError,
    types::{Candle, OpenInterestPoint, ensure_ascending},
};
use chrono::{DateTime, Utc};
use derive_more::Display;
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const DEFAULT_DIVERGENCE_WINDOW: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DivergenceConfig {
    /// Number of points between the compared readings.
    pub window: usize,
    /// Minimum |price change %| over the window for a signal.
    pub min_price_change_pct: f64,
    /// Minimum |OI change %| over the window for a signal.
    pub min_oi_change_pct: f64,
}

impl Default for DivergenceConfig {
    fn default() -> Self {
        Self {
            window: DEFAULT_DIVERGENCE_WINDOW,
            min_price_change_pct: 0.1,
            min_oi_change_pct: 0.1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize, Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DivergenceKind {
    /// Price down, OI up: new positions building into a falling market.
    #[display("BEARISH_TRAP")]
    BearishTrap,
    /// Price up, OI up: move confirmed by rising participation.
    #[display("BULLISH_CONTINUATION")]
    BullishContinuation,
    /// Price down, OI down: move confirmed by de-risking.
    #[display("BEARISH_CONTINUATION")]
    BearishContinuation,
    /// Price up, OI down: rally on unwinding positions (short covering), fragile.
    #[display("BULLISH_TRAP")]
    BullishTrap,
}

impl DivergenceKind {
    /// Classify a window from its price and OI percentage changes.
    ///
    /// Returns `None` unless both moves clear their minimum magnitude.
    pub fn classify(
        price_change_pct: f64,
        oi_change_pct: f64,
        min_price_change_pct: f64,
        min_oi_change_pct: f64,
    ) -> Option<Self> {
        let price_up = price_change_pct >= min_price_change_pct;
        let price_down = price_change_pct <= -min_price_change_pct;
        let oi_up = oi_change_pct >= min_oi_change_pct;
        let oi_down = oi_change_pct <= -min_oi_change_pct;

        match (price_up, price_down, oi_up, oi_down) {
            (false, true, true, false) => Some(Self::BearishTrap),
            (true, false, false, true) => Some(Self::BullishTrap),
            (true, false, true, false) => Some(Self::BullishContinuation),
            (false, true, false, true) => Some(Self::BearishContinuation),
            _ => None,
        }
    }

    /// Price and OI moved in opposite directions.
    pub fn is_divergence(&self) -> bool {
        matches!(self, Self::BearishTrap | Self::BullishTrap)
    }
}

/// Classified price / OI move over one window, stamped with the window's closing point.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DivergenceSignal {
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub kind: DivergenceKind,
    /// Geometric mean of |price change %| and |OI change %|.
    pub strength: f64,
    pub price_change_percent: f64,
    pub oi_change_percent: f64,
}

/// Emit one [`DivergenceSignal`] per index `i >= window` whose price and OI moves against
/// index `i - window` both clear the configured minimums, in ascending timestamp order.
///
/// Empty or too-short series yield no signals. Series of unequal length or with decreasing
/// timestamps are rejected.
pub fn detect_divergences(
    candles: &[Candle],
    open_interest: &[OpenInterestPoint],
    config: &DivergenceConfig,
) -> Result<Vec<DivergenceSignal>, AnalyticsError> {
    if candles.is_empty() || open_interest.is_empty() {
        return Ok(Vec::new());
    }
    if config.window == 0 {
        return Err(AnalyticsError::invalid_parameter("window", config.window));
    }
    if candles.len() != open_interest.len() {
        return Err(AnalyticsError::misaligned(
            "candles",
            candles.len(),
            "open_interest",
            open_interest.len(),
        ));
    }
    ensure_ascending("candles", candles)?;
    ensure_ascending("open_interest", open_interest)?;

    let window = config.window;
    if candles.len() <= window {
        return Ok(Vec::new());
    }

    let signals: Vec<DivergenceSignal> = (window..candles.len())
        .filter_map(|index| {
            let price_base = candles[index - window].close;
            let oi_base = open_interest[index - window].value;
            if price_base == 0.0 || oi_base == 0.0 {
                return None;
            }

            let price_change_percent = (candles[index].close - price_base) / price_base * 100.0;
            let oi_change_percent = (open_interest[index].value - oi_base) / oi_base * 100.0;

            let kind = DivergenceKind::classify(
                price_change_percent,
                oi_change_percent,
                config.min_price_change_pct,
                config.min_oi_change_pct,
            )?;

            Some(DivergenceSignal {
                timestamp: candles[index].timestamp,
                kind,
                strength: (price_change_percent.abs() * oi_change_percent.abs()).sqrt(),
                price_change_percent,
                oi_change_percent,
            })
        })
        .collect();

    debug!(
        points = candles.len(),
        window,
        signals = signals.len(),
        "detected price/OI divergences"
    );

    Ok(signals)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::test_utils::{candle, oi};

    const MINUTE: i64 = 60_000;

    fn series(prices: &[f64], oi_values: &[f64]) -> (Vec<Candle>, Vec<OpenInterestPoint>) {
        let candles = prices
            .iter()
            .enumerate()
            .map(|(i, price)| candle(i as i64 * MINUTE, *price))
            .collect();
        let open_interest = oi_values
            .iter()
            .enumerate()
            .map(|(i, value)| oi(i as i64 * MINUTE, *value))
            .collect();
        (candles, open_interest)
    }

    #[test]
    fn test_falling_price_rising_oi_is_bearish_trap() {
        let prices: Vec<f64> = (0..30).map(|i| 100.0 - i as f64).collect();
        let oi_values: Vec<f64> = (0..30).map(|i| 1000.0 + 10.0 * i as f64).collect();
        let (candles, open_interest) = series(&prices, &oi_values);

        let actual =
            detect_divergences(&candles, &open_interest, &DivergenceConfig::default()).unwrap();

        assert_eq!(actual.len(), 10);
        assert_eq!(actual[0].kind, DivergenceKind::BearishTrap);
        assert_eq!(actual[0].timestamp, candles[20].timestamp);
        assert!((actual[0].price_change_percent + 20.0).abs() < 1e-9);
        assert!((actual[0].oi_change_percent - 20.0).abs() < 1e-9);
        assert!((actual[0].strength - 20.0).abs() < 1e-9);
        assert!(actual.iter().all(|s| s.kind == DivergenceKind::BearishTrap));
        assert!(actual.windows(2).all(|pair| pair[0].timestamp < pair[1].timestamp));
    }

    #[test]
    fn test_divergence_kinds() {
        struct TestCase {
            input: (f64, f64),
            expected: Option<DivergenceKind>,
        }

        let tests = vec![
            TestCase {
                // TC0: price down, OI up
                input: (-2.0, 3.0),
                expected: Some(DivergenceKind::BearishTrap),
            },
            TestCase {
                // TC1: price up, OI down
                input: (2.0, -3.0),
                expected: Some(DivergenceKind::BullishTrap),
            },
            TestCase {
                // TC2: both up
                input: (2.0, 3.0),
                expected: Some(DivergenceKind::BullishContinuation),
            },
            TestCase {
                // TC3: both down
                input: (-2.0, -3.0),
                expected: Some(DivergenceKind::BearishContinuation),
            },
            TestCase {
                // TC4: price move below minimum magnitude
                input: (0.05, 3.0),
                expected: None,
            },
            TestCase {
                // TC5: OI move below minimum magnitude
                input: (-2.0, -0.01),
                expected: None,
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let actual = DivergenceKind::classify(test.input.0, test.input.1, 0.1, 0.1);
            assert_eq!(actual, test.expected, "TC{} failed", index);
        }

        assert!(DivergenceKind::BearishTrap.is_divergence());
        assert!(!DivergenceKind::BullishContinuation.is_divergence());
    }

    #[test]
    fn test_signals_not_merged_and_flat_windows_skipped() {
        // Flat for 5 points, then price and OI both climb
        let prices = [100.0, 100.0, 100.0, 100.0, 100.0, 101.0, 102.0, 103.0];
        let oi_values = [50.0, 50.0, 50.0, 50.0, 50.0, 51.0, 52.0, 53.0];
        let (candles, open_interest) = series(&prices, &oi_values);
        let config = DivergenceConfig {
            window: 2,
            ..Default::default()
        };

        let actual = detect_divergences(&candles, &open_interest, &config).unwrap();

        let timestamps: Vec<_> = actual.iter().map(|s| s.timestamp).collect();
        assert_eq!(
            timestamps,
            vec![candles[5].timestamp, candles[6].timestamp, candles[7].timestamp]
        );
        assert!(actual.iter().all(|s| s.kind == DivergenceKind::BullishContinuation));
    }

    #[test]
    fn test_short_and_empty_series() {
        let (candles, open_interest) = series(&[100.0; 20], &[10.0; 20]);
        let config = DivergenceConfig::default();

        assert!(detect_divergences(&candles, &open_interest, &config).unwrap().is_empty());
        assert!(detect_divergences(&[], &open_interest, &config).unwrap().is_empty());
        assert!(detect_divergences(&candles, &[], &config).unwrap().is_empty());

        let zero_window = DivergenceConfig {
            window: 0,
            ..Default::default()
        };
        assert!(detect_divergences(&[], &[], &zero_window).unwrap().is_empty());
        assert!(detect_divergences(&candles, &open_interest, &zero_window).is_err());
    }

    #[test]
    fn test_invariant_violations() {
        let (candles, open_interest) = series(&[100.0; 25], &[10.0; 24]);
        assert_eq!(
            detect_divergences(&candles, &open_interest, &DivergenceConfig::default()),
            Err(AnalyticsError::misaligned("candles", 25, "open_interest", 24))
        );

        let (mut candles, open_interest) = series(&[100.0; 25], &[10.0; 25]);
        candles.swap(3, 4);
        assert_eq!(
            detect_divergences(&candles, &open_interest, &DivergenceConfig::default()),
            Err(AnalyticsError::UnorderedSeries {
                series: "candles".to_string(),
                index: 4
            })
        );
    }
}

//! Taker (aggressor) flow summary over a trailing window of volume buckets.

use crate::{
    error::AnalyticsError,
    types::{Bias, TakerVolumePoint, ensure_ascending},
};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Buy pressure above which taker flow leans long.
pub const LONG_PRESSURE_THRESHOLD: f64 = 55.0;
/// Buy pressure below which taker flow leans short.
pub const SHORT_PRESSURE_THRESHOLD: f64 = 45.0;

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TakerFlowSummary {
    /// Number of buckets summarised (at most the requested window).
    pub points: usize,
    pub buy_volume: f64,
    pub sell_volume: f64,
    /// Buy / sell volume, absent when no sell volume traded.
    pub buy_sell_ratio: Option<f64>,
    /// 100 = all buying, 0 = all selling, 50 = balanced or no volume.
    pub buy_pressure: f64,
    pub bias: Bias,
}

impl Default for TakerFlowSummary {
    fn default() -> Self {
        Self {
            points: 0,
            buy_volume: 0.0,
            sell_volume: 0.0,
            buy_sell_ratio: None,
            buy_pressure: 50.0,
            bias: Bias::Neutral,
        }
    }
}

/// Summarise the trailing `window` taker volume buckets.
pub fn summarize_taker_flow(
    points: &[TakerVolumePoint],
    window: usize,
) -> Result<TakerFlowSummary, AnalyticsError> {
    if window == 0 {
        return Err(AnalyticsError::invalid_parameter("window", window));
    }
    ensure_ascending("taker_volume", points)?;

    let recent = &points[points.len().saturating_sub(window)..];
    let (buy_volume, sell_volume) = recent
        .iter()
        .filter(|point| point.buy_volume.is_finite() && point.sell_volume.is_finite())
        .fold((0.0, 0.0), |(buy, sell), point| {
            (buy + point.buy_volume, sell + point.sell_volume)
        });

    let total = buy_volume + sell_volume;
    let buy_pressure = if total > 0.0 {
        buy_volume / total * 100.0
    } else {
        50.0
    };

    let bias = if buy_pressure > LONG_PRESSURE_THRESHOLD {
        Bias::Long
    } else if buy_pressure < SHORT_PRESSURE_THRESHOLD {
        Bias::Short
    } else {
        Bias::Neutral
    };

    debug!(points = recent.len(), buy_pressure, %bias, "summarised taker flow");

    Ok(TakerFlowSummary {
        points: recent.len(),
        buy_volume,
        sell_volume,
        buy_sell_ratio: (sell_volume > 0.0).then(|| buy_volume / sell_volume),
        buy_pressure,
        bias,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::test_utils::ts;

    fn point(millis: i64, buy: f64, sell: f64) -> TakerVolumePoint {
        TakerVolumePoint::new(ts(millis), buy, sell)
    }

    #[test]
    fn test_summarize_taker_flow() {
        struct TestCase {
            input: Vec<TakerVolumePoint>,
            window: usize,
            expected_ratio: Option<f64>,
            expected_pressure: f64,
            expected_bias: Bias,
        }

        let tests = vec![
            // TC0: window trims the oldest bucket
            TestCase {
                input: vec![point(0, 1.0, 100.0), point(1, 30.0, 10.0), point(2, 40.0, 20.0)],
                window: 2,
                expected_ratio: Some(70.0 / 30.0),
                expected_pressure: 70.0,
                expected_bias: Bias::Long,
            },
            // TC1: window longer than the series uses every bucket
            TestCase {
                input: vec![point(0, 20.0, 80.0)],
                window: 12,
                expected_ratio: Some(0.25),
                expected_pressure: 20.0,
                expected_bias: Bias::Short,
            },
            // TC2: balanced inside the neutral band
            TestCase {
                input: vec![point(0, 52.0, 48.0)],
                window: 12,
                expected_ratio: Some(52.0 / 48.0),
                expected_pressure: 52.0,
                expected_bias: Bias::Neutral,
            },
            // TC3: no sell volume has no ratio
            TestCase {
                input: vec![point(0, 10.0, 0.0)],
                window: 12,
                expected_ratio: None,
                expected_pressure: 100.0,
                expected_bias: Bias::Long,
            },
            // TC4: no volume at all is neutral
            TestCase {
                input: vec![point(0, 0.0, 0.0), point(1, 0.0, 0.0)],
                window: 12,
                expected_ratio: None,
                expected_pressure: 50.0,
                expected_bias: Bias::Neutral,
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let actual = summarize_taker_flow(&test.input, test.window).unwrap();

            match (actual.buy_sell_ratio, test.expected_ratio) {
                (Some(actual), Some(expected)) => {
                    assert!((actual - expected).abs() < 1e-9, "TC{} failed", index)
                }
                (None, None) => {}
                _ => panic!("TC{} failed: ratio {:?}", index, actual.buy_sell_ratio),
            }
            assert!(
                (actual.buy_pressure - test.expected_pressure).abs() < 1e-9,
                "TC{} failed",
                index
            );
            assert_eq!(actual.bias, test.expected_bias, "TC{} failed", index);
        }
    }

    #[test]
    fn test_summarize_taker_flow_empty() {
        assert_eq!(summarize_taker_flow(&[], 12).unwrap(), TakerFlowSummary::default());
    }

    #[test]
    fn test_summarize_taker_flow_invalid() {
        assert_eq!(
            summarize_taker_flow(&[], 0),
            Err(AnalyticsError::invalid_parameter("window", 0))
        );
        assert_eq!(
            summarize_taker_flow(&[point(5, 1.0, 1.0), point(1, 1.0, 1.0)], 2),
            Err(AnalyticsError::UnorderedSeries {
                series: "taker_volume".to_string(),
                index: 1
            })
        );
    }
}

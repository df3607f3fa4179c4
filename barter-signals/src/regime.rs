//! Funding-rate and composite market regime classification.
//!
//! Both classifiers are ordered rule cascades: rules are evaluated top to bottom and the
//! first match wins. Description strings are consumed verbatim by the dashboard.

use crate::types::{Bias, FundingRatePoint, LongShortRatioPoint, OpenInterestPoint};
use derive_more::{Constructor, Display};
use serde::{Deserialize, Serialize};

/// Number of most recent funding periods averaged into [`FundingRegime::average`].
pub const FUNDING_AVERAGE_PERIODS: usize = 10;

/// Funding (in percent) above which the regime is extreme in either direction.
const FUNDING_EXTREME_PCT: f64 = 0.1;
/// Funding (in percent) beyond which the regime leans positive / negative.
const FUNDING_ELEVATED_PCT: f64 = 0.03;

pub const NO_FUNDING_DATA_DESCRIPTION: &str = "No funding rate data available";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize, Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RegimeKind {
    #[display("BULLISH_OVERHEATED")]
    BullishOverheated,
    #[display("BEARISH_OVERHEATED")]
    BearishOverheated,
    #[display("BULLISH_HEALTHY")]
    BullishHealthy,
    #[display("BEARISH_HEALTHY")]
    BearishHealthy,
    #[display("NEUTRAL")]
    Neutral,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize, Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskLevel {
    #[display("HIGH")]
    High,
    #[display("MEDIUM")]
    Medium,
    #[display("LOW")]
    Low,
}

/// Scalar inputs of [`classify_market_regime`].
#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize, Serialize, Constructor)]
#[serde(rename_all = "camelCase")]
pub struct RegimeInputs {
    pub funding_rate: f64,
    pub long_short_ratio: f64,
    pub oi_change: f64,
}

/// Composite market regime, echoing the inputs it was derived from.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketRegime {
    pub regime: RegimeKind,
    pub risk: RiskLevel,
    pub description: String,
    pub funding_rate: f64,
    pub long_short_ratio: f64,
    pub oi_change: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize, Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FundingRegimeKind {
    #[display("EXTREME")]
    Extreme,
    #[display("POSITIVE")]
    Positive,
    #[display("NEGATIVE")]
    Negative,
    #[display("NEUTRAL")]
    Neutral,
}

/// Funding regime of the most recent funding period.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FundingRegime {
    pub regime: FundingRegimeKind,
    /// Latest funding rate in percent.
    pub value: f64,
    /// Mean funding rate in percent over the most recent [`FUNDING_AVERAGE_PERIODS`].
    pub average: f64,
    /// Side favoured by a contrarian reading of the funding imbalance.
    pub bias: Bias,
    pub description: String,
}

struct MarketRegimeRule {
    matches: fn(&RegimeInputs) -> bool,
    regime: RegimeKind,
    risk: RiskLevel,
    description: &'static str,
}

static MARKET_REGIME_RULES: [MarketRegimeRule; 4] = [
    MarketRegimeRule {
        matches: |i: &RegimeInputs| {
            i.funding_rate > 0.01 && i.oi_change > 0.1 && i.long_short_ratio > 1.5
        },
        regime: RegimeKind::BullishOverheated,
        risk: RiskLevel::High,
        description: "Longs are overcrowded: high positive funding, rising open interest and a \
                      long-heavy ratio. Elevated risk of a long squeeze.",
    },
    MarketRegimeRule {
        matches: |i: &RegimeInputs| {
            i.funding_rate < -0.01 && i.oi_change > 0.1 && i.long_short_ratio < 0.7
        },
        regime: RegimeKind::BearishOverheated,
        risk: RiskLevel::High,
        description: "Shorts are overcrowded: deeply negative funding, rising open interest and \
                      a short-heavy ratio. Elevated risk of a short squeeze.",
    },
    MarketRegimeRule {
        matches: |i: &RegimeInputs| {
            i.funding_rate > 0.0
                && i.funding_rate <= 0.01
                && (1.2..=1.5).contains(&i.long_short_ratio)
        },
        regime: RegimeKind::BullishHealthy,
        risk: RiskLevel::Low,
        description: "Healthy bullish positioning: modest positive funding with a moderate long \
                      bias.",
    },
    MarketRegimeRule {
        matches: |i: &RegimeInputs| {
            i.funding_rate >= -0.01
                && i.funding_rate < 0.0
                && (0.7..0.9).contains(&i.long_short_ratio)
        },
        regime: RegimeKind::BearishHealthy,
        risk: RiskLevel::Low,
        description: "Healthy bearish positioning: modest negative funding with a moderate short \
                      bias.",
    },
];

const NEUTRAL_REGIME_DESCRIPTION: &str =
    "Balanced market: no clear positioning imbalance between longs and shorts.";

/// Classify the composite market regime from funding, long/short ratio and OI change.
pub fn classify_market_regime(
    funding_rate: f64,
    long_short_ratio: f64,
    oi_change: f64,
) -> MarketRegime {
    let inputs = RegimeInputs::new(funding_rate, long_short_ratio, oi_change);

    let (regime, risk, description) = MARKET_REGIME_RULES
        .iter()
        .find(|rule| (rule.matches)(&inputs))
        .map(|rule| (rule.regime, rule.risk, rule.description))
        .unwrap_or((
            RegimeKind::Neutral,
            RiskLevel::Medium,
            NEUTRAL_REGIME_DESCRIPTION,
        ));

    MarketRegime {
        regime,
        risk,
        description: description.to_string(),
        funding_rate,
        long_short_ratio,
        oi_change,
    }
}

struct FundingRule {
    matches: fn(f64) -> bool,
    regime: FundingRegimeKind,
    bias: Bias,
    describe: fn(f64) -> String,
}

static FUNDING_RULES: [FundingRule; 5] = [
    FundingRule {
        matches: |value: f64| value.abs() > FUNDING_EXTREME_PCT && value > 0.0,
        regime: FundingRegimeKind::Extreme,
        bias: Bias::Short,
        describe: |value: f64| {
            format!(
                "Extreme positive funding ({value:.4}%): longs are paying a heavy premium, \
                 long squeeze risk is elevated"
            )
        },
    },
    FundingRule {
        matches: |value: f64| value.abs() > FUNDING_EXTREME_PCT,
        regime: FundingRegimeKind::Extreme,
        bias: Bias::Long,
        describe: |value: f64| {
            format!(
                "Extreme negative funding ({value:.4}%): shorts are paying a heavy premium, \
                 short squeeze risk is elevated"
            )
        },
    },
    FundingRule {
        matches: |value: f64| value > FUNDING_ELEVATED_PCT,
        regime: FundingRegimeKind::Positive,
        bias: Bias::Short,
        describe: |value: f64| {
            format!("Positive funding ({value:.4}%): longs are paying shorts, market leans long")
        },
    },
    FundingRule {
        matches: |value: f64| value < -FUNDING_ELEVATED_PCT,
        regime: FundingRegimeKind::Negative,
        bias: Bias::Long,
        describe: |value: f64| {
            format!("Negative funding ({value:.4}%): shorts are paying longs, market leans short")
        },
    },
    FundingRule {
        matches: |_: f64| true,
        regime: FundingRegimeKind::Neutral,
        bias: Bias::Neutral,
        describe: |value: f64| format!("Neutral funding ({value:.4}%): positioning is balanced"),
    },
];

/// Classify the funding regime of a most-recent-first funding rate series.
pub fn classify_funding_regime(funding_rates: &[FundingRatePoint]) -> FundingRegime {
    let Some(latest) = funding_rates.first() else {
        return FundingRegime {
            regime: FundingRegimeKind::Neutral,
            value: 0.0,
            average: 0.0,
            bias: Bias::Neutral,
            description: NO_FUNDING_DATA_DESCRIPTION.to_string(),
        };
    };

    let value = latest.funding_rate * 100.0;

    let recent = &funding_rates[..funding_rates.len().min(FUNDING_AVERAGE_PERIODS)];
    let average =
        recent.iter().map(|point| point.funding_rate).sum::<f64>() / recent.len() as f64 * 100.0;

    // Final rule matches unconditionally, so a rule is always found
    let rule = FUNDING_RULES
        .iter()
        .find(|rule| (rule.matches)(value))
        .unwrap_or(&FUNDING_RULES[FUNDING_RULES.len() - 1]);

    FundingRegime {
        regime: rule.regime,
        value,
        average,
        bias: rule.bias,
        description: (rule.describe)(value),
    }
}

/// Derive [`classify_market_regime`] inputs from raw series.
///
/// - funding: latest rate of the most-recent-first series, in percent.
/// - long/short ratio: latest point of the ascending series, 1.0 when absent.
/// - OI change: fractional change between the first and last OI reading, 0 when undefined.
pub fn regime_inputs(
    funding_rates: &[FundingRatePoint],
    long_short_ratios: &[LongShortRatioPoint],
    open_interest: &[OpenInterestPoint],
) -> RegimeInputs {
    let funding_rate = funding_rates
        .first()
        .map(|point| point.funding_rate * 100.0)
        .unwrap_or(0.0);

    let long_short_ratio = long_short_ratios
        .last()
        .map(|point| point.long_short_ratio)
        .unwrap_or(1.0);

    let oi_change = match (open_interest.first(), open_interest.last()) {
        (Some(first), Some(last)) if first.value != 0.0 => (last.value - first.value) / first.value,
        _ => 0.0,
    };

    RegimeInputs::new(funding_rate, long_short_ratio, oi_change)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::test_utils::{oi, ts};

    fn funding(rates: &[f64]) -> Vec<FundingRatePoint> {
        rates
            .iter()
            .enumerate()
            .map(|(index, rate)| {
                FundingRatePoint::new("BTCUSDT".into(), *rate, ts(-(index as i64) * 28_800_000))
            })
            .collect()
    }

    #[test]
    fn test_classify_market_regime() {
        struct TestCase {
            input: (f64, f64, f64),
            expected: (RegimeKind, RiskLevel),
        }

        let tests = vec![
            TestCase {
                // TC0: overheated longs
                input: (0.02, 1.6, 0.15),
                expected: (RegimeKind::BullishOverheated, RiskLevel::High),
            },
            TestCase {
                // TC1: overheated shorts
                input: (-0.02, 0.5, 0.2),
                expected: (RegimeKind::BearishOverheated, RiskLevel::High),
            },
            TestCase {
                // TC2: healthy bullish at the inclusive upper funding bound
                input: (0.01, 1.5, 0.0),
                expected: (RegimeKind::BullishHealthy, RiskLevel::Low),
            },
            TestCase {
                // TC3: healthy bullish at the inclusive lower ratio bound
                input: (0.005, 1.2, 0.5),
                expected: (RegimeKind::BullishHealthy, RiskLevel::Low),
            },
            TestCase {
                // TC4: healthy bearish
                input: (-0.01, 0.7, 0.0),
                expected: (RegimeKind::BearishHealthy, RiskLevel::Low),
            },
            TestCase {
                // TC5: bearish ratio upper bound is exclusive
                input: (-0.005, 0.9, 0.0),
                expected: (RegimeKind::Neutral, RiskLevel::Medium),
            },
            TestCase {
                // TC6: zero everything is neutral
                input: (0.0, 1.0, 0.0),
                expected: (RegimeKind::Neutral, RiskLevel::Medium),
            },
            TestCase {
                // TC7: overheated funding and ratio without OI growth falls through to neutral
                input: (0.02, 1.6, 0.05),
                expected: (RegimeKind::Neutral, RiskLevel::Medium),
            },
            TestCase {
                // TC8: NaN inputs never match a rule
                input: (f64::NAN, f64::NAN, f64::NAN),
                expected: (RegimeKind::Neutral, RiskLevel::Medium),
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let (funding_rate, ratio, oi_change) = test.input;
            let actual = classify_market_regime(funding_rate, ratio, oi_change);
            assert_eq!((actual.regime, actual.risk), test.expected, "TC{} failed", index);
        }
    }

    #[test]
    fn test_classify_market_regime_echoes_inputs() {
        let actual = classify_market_regime(0.02, 1.6, 0.15);

        assert_eq!(actual.funding_rate, 0.02);
        assert_eq!(actual.long_short_ratio, 1.6);
        assert_eq!(actual.oi_change, 0.15);
        assert_eq!(
            actual.description,
            "Longs are overcrowded: high positive funding, rising open interest and a long-heavy \
             ratio. Elevated risk of a long squeeze."
        );
    }

    #[test]
    fn test_classify_funding_regime() {
        struct TestCase {
            input: Vec<FundingRatePoint>,
            expected_regime: FundingRegimeKind,
            expected_bias: Bias,
            expected_description: &'static str,
        }

        let tests = vec![
            TestCase {
                // TC0: extreme positive
                input: funding(&[0.0015]),
                expected_regime: FundingRegimeKind::Extreme,
                expected_bias: Bias::Short,
                expected_description: "Extreme positive funding (0.1500%): longs are paying a \
                                       heavy premium, long squeeze risk is elevated",
            },
            TestCase {
                // TC1: extreme negative
                input: funding(&[-0.002]),
                expected_regime: FundingRegimeKind::Extreme,
                expected_bias: Bias::Long,
                expected_description: "Extreme negative funding (-0.2000%): shorts are paying a \
                                       heavy premium, short squeeze risk is elevated",
            },
            TestCase {
                // TC2: positive
                input: funding(&[0.0005, 0.0001]),
                expected_regime: FundingRegimeKind::Positive,
                expected_bias: Bias::Short,
                expected_description: "Positive funding (0.0500%): longs are paying shorts, \
                                       market leans long",
            },
            TestCase {
                // TC3: negative
                input: funding(&[-0.0004]),
                expected_regime: FundingRegimeKind::Negative,
                expected_bias: Bias::Long,
                expected_description: "Negative funding (-0.0400%): shorts are paying longs, \
                                       market leans short",
            },
            TestCase {
                // TC4: standard 0.01% funding is neutral
                input: funding(&[0.0001]),
                expected_regime: FundingRegimeKind::Neutral,
                expected_bias: Bias::Neutral,
                expected_description: "Neutral funding (0.0100%): positioning is balanced",
            },
            TestCase {
                // TC5: exactly 0.1% is not extreme
                input: funding(&[0.001]),
                expected_regime: FundingRegimeKind::Positive,
                expected_bias: Bias::Short,
                expected_description: "Positive funding (0.1000%): longs are paying shorts, \
                                       market leans long",
            },
            TestCase {
                // TC6: no data
                input: vec![],
                expected_regime: FundingRegimeKind::Neutral,
                expected_bias: Bias::Neutral,
                expected_description: NO_FUNDING_DATA_DESCRIPTION,
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let actual = classify_funding_regime(&test.input);
            assert_eq!(actual.regime, test.expected_regime, "TC{} failed", index);
            assert_eq!(actual.bias, test.expected_bias, "TC{} failed", index);
            assert_eq!(actual.description, test.expected_description, "TC{} failed", index);
        }
    }

    #[test]
    fn test_classify_funding_regime_empty() {
        let actual = classify_funding_regime(&[]);
        assert_eq!(actual.regime, FundingRegimeKind::Neutral);
        assert_eq!(actual.value, 0.0);
        assert_eq!(actual.average, 0.0);
        assert_eq!(actual.bias, Bias::Neutral);
    }

    #[test]
    fn test_classify_funding_regime_average_uses_ten_most_recent() {
        let mut rates = vec![0.0002; 10];
        rates.extend([0.01; 5]);

        let actual = classify_funding_regime(&funding(&rates));
        assert!((actual.value - 0.02).abs() < 1e-12);
        assert!((actual.average - 0.02).abs() < 1e-12);

        let actual = classify_funding_regime(&funding(&[0.0002, 0.0004]));
        assert!((actual.average - 0.03).abs() < 1e-12);
    }

    #[test]
    fn test_regime_inputs() {
        let long_short = vec![
            LongShortRatioPoint::new(ts(0), 1.1, None, None),
            LongShortRatioPoint::new(ts(1), 1.7, Some(0.63), Some(0.37)),
        ];
        let open_interest = vec![oi(0, 100.0), oi(1, 90.0), oi(2, 120.0)];

        let actual = regime_inputs(&funding(&[0.0002, 0.0001]), &long_short, &open_interest);

        assert!((actual.funding_rate - 0.02).abs() < 1e-12);
        assert_eq!(actual.long_short_ratio, 1.7);
        assert!((actual.oi_change - 0.2).abs() < 1e-12);

        assert_eq!(regime_inputs(&[], &[], &[]), RegimeInputs::new(0.0, 1.0, 0.0));
    }
}

//! Open interest momentum / acceleration analysis.
//!
//! Separates sustained ("real") OI moves from single-point noise ("fake") and tags the
//! scenario driving each point: trend continuation, swing reversal, forced unwind
//! (deleveraging) and the bounce that follows it.
//!
//! Momentum is the mean per-point percentage OI change over a short trailing window, and
//! acceleration is the point-to-point change of momentum.

use crate::{
    error::{AnalyticsError, ensure_positive},
    types::{OpenInterestPoint, ensure_ascending},
};
use chrono::{DateTime, Utc};
use derive_more::Display;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MomentumConfig {
    /// Trailing number of per-point changes averaged into momentum.
    pub window: usize,
    /// Minimum |momentum| (% per point) for a move to be material.
    pub materiality_pct: f64,
    /// Minimum |acceleration| for trend continuation / reversal.
    pub acceleration_threshold: f64,
    /// Consecutive material same-signed points required for a real move.
    pub confirmation_points: usize,
    /// Unwind requires momentum at or below `-unwind_multiplier * materiality_pct`.
    pub unwind_multiplier: f64,
    /// Points after a forced unwind during which positive momentum counts as a bounce.
    pub bounce_lookback: usize,
}

impl Default for MomentumConfig {
    fn default() -> Self {
        Self {
            window: 3,
            materiality_pct: 0.5,
            acceleration_threshold: 0.1,
            confirmation_points: 3,
            unwind_multiplier: 2.0,
            bounce_lookback: 5,
        }
    }
}

impl MomentumConfig {
    fn validate(&self) -> Result<(), AnalyticsError> {
        if self.window == 0 {
            return Err(AnalyticsError::invalid_parameter("window", self.window));
        }
        if self.confirmation_points == 0 {
            return Err(AnalyticsError::invalid_parameter(
                "confirmation_points",
                self.confirmation_points,
            ));
        }
        ensure_positive("materiality_pct", self.materiality_pct)?;
        ensure_positive("unwind_multiplier", self.unwind_multiplier)?;
        if !(self.acceleration_threshold.is_finite() && self.acceleration_threshold >= 0.0) {
            return Err(AnalyticsError::invalid_parameter(
                "acceleration_threshold",
                self.acceleration_threshold,
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize, Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MomentumScenario {
    /// Momentum and acceleration aligned and material.
    #[display("TREND_CONTINUATION")]
    TrendContinuation,
    /// Momentum flipped sign, with acceleration pushing against the prior trend.
    #[display("SWING_REVERSAL")]
    SwingReversal,
    /// Sharp OI drop after a sustained build-up: positions being force-closed.
    #[display("FORCED_UNWIND")]
    ForcedUnwind,
    /// OI rebuilding right after a forced unwind.
    #[display("POST_LIQUIDATION_BOUNCE")]
    PostLiquidationBounce,
    /// No scenario applies.
    #[display("NEUTRAL")]
    Neutral,
}

/// Whether an OI move reflects a sustained commitment or transient positioning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize, Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OiMoveQuality {
    #[display("REAL")]
    Real,
    #[display("FAKE")]
    Fake,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OiMomentumRecord {
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    pub value: f64,
    /// Mean % change per point over the trailing window.
    pub momentum: f64,
    /// Change in momentum since the previous point.
    pub acceleration: f64,
    pub scenario: MomentumScenario,
    pub quality: OiMoveQuality,
}

/// Classify every point from index `window + 1` onwards.
///
/// Uses each point's precomputed `delta` when present, falling back to the difference with
/// the previous value. Series shorter than `window + 2` points yield no records.
pub fn analyze_oi_momentum(
    open_interest: &[OpenInterestPoint],
    config: &MomentumConfig,
) -> Result<Vec<OiMomentumRecord>, AnalyticsError> {
    config.validate()?;
    ensure_ascending("open_interest", open_interest)?;

    let window = config.window;
    if open_interest.len() < window + 2 {
        return Ok(Vec::new());
    }

    let pct_changes = percentage_changes(open_interest);

    // momentum[i] is only meaningful for i >= window
    let momentum: Vec<f64> = (0..open_interest.len())
        .map(|index| {
            if index < window {
                0.0
            } else {
                pct_changes[index + 1 - window..=index].iter().sum::<f64>() / window as f64
            }
        })
        .collect();

    let is_material = |value: f64| value.abs() >= config.materiality_pct;

    let mut last_unwind: Option<usize> = None;
    // Most recent material momentum before the current point, 0.0 when none yet
    let mut prior_trend = Some(momentum[window])
        .filter(|value| is_material(*value))
        .unwrap_or(0.0);
    let mut records = Vec::with_capacity(open_interest.len() - window - 1);

    for index in window + 1..open_interest.len() {
        let current = momentum[index];
        let acceleration = current - momentum[index - 1];

        let scenario = classify_scenario(
            Reading {
                index,
                current,
                acceleration,
                prior: &momentum[window..index],
                prior_trend,
            },
            last_unwind,
            config,
        );
        if scenario == MomentumScenario::ForcedUnwind {
            last_unwind = Some(index);
        }
        if is_material(current) {
            prior_trend = current;
        }

        let quality = if is_sustained(&pct_changes[1..=index], config) {
            OiMoveQuality::Real
        } else {
            OiMoveQuality::Fake
        };

        records.push(OiMomentumRecord {
            timestamp: open_interest[index].timestamp,
            value: open_interest[index].value,
            momentum: current,
            acceleration,
            scenario,
            quality,
        });
    }

    debug!(
        points = open_interest.len(),
        records = records.len(),
        unwinds = records
            .iter()
            .filter(|r| r.scenario == MomentumScenario::ForcedUnwind)
            .count(),
        "analysed OI momentum"
    );

    Ok(records)
}

fn percentage_changes(open_interest: &[OpenInterestPoint]) -> Vec<f64> {
    std::iter::once(0.0)
        .chain(open_interest.windows(2).map(|pair| {
            let prev = pair[0].value;
            let delta = pair[1].delta.unwrap_or(pair[1].value - prev);
            if prev != 0.0 { delta / prev * 100.0 } else { 0.0 }
        }))
        .collect()
}

/// Last `confirmation_points` per-point changes are all material and share a sign.
fn is_sustained(pct_changes: &[f64], config: &MomentumConfig) -> bool {
    let Some(start) = pct_changes.len().checked_sub(config.confirmation_points) else {
        return false;
    };
    let recent = &pct_changes[start..];

    recent.iter().all(|pct| *pct >= config.materiality_pct)
        || recent.iter().all(|pct| *pct <= -config.materiality_pct)
}

/// Momentum state at one point of the analysed series.
#[derive(Debug, Clone, Copy)]
struct Reading<'a> {
    index: usize,
    current: f64,
    acceleration: f64,
    /// Momentum readings before `index`, starting at the first full window.
    prior: &'a [f64],
    /// Most recent material reading in `prior`, 0.0 when none.
    prior_trend: f64,
}

fn classify_scenario(
    reading: Reading<'_>,
    last_unwind: Option<usize>,
    config: &MomentumConfig,
) -> MomentumScenario {
    let Reading {
        index,
        current,
        acceleration,
        prior,
        prior_trend,
    } = reading;

    let material = current.abs() >= config.materiality_pct;
    let accelerating = acceleration.abs() >= config.acceleration_threshold;

    let after_unwind =
        last_unwind.is_some_and(|unwind| index - unwind <= config.bounce_lookback);
    let prior_uptrend = prior.len() >= config.confirmation_points
        && prior[prior.len() - config.confirmation_points..]
            .iter()
            .all(|m| *m >= config.materiality_pct);

    if after_unwind && current >= config.materiality_pct {
        MomentumScenario::PostLiquidationBounce
    } else if prior_uptrend && current <= -config.unwind_multiplier * config.materiality_pct {
        MomentumScenario::ForcedUnwind
    } else if material
        && accelerating
        && prior_trend * current < 0.0
        && acceleration * current > 0.0
    {
        MomentumScenario::SwingReversal
    } else if material && accelerating && acceleration * current > 0.0 {
        MomentumScenario::TrendContinuation
    } else {
        MomentumScenario::Neutral
    }
}

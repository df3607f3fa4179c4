//! Analytics configuration.
//!
//! Every section deserialises with defaults, so a partial JSON document only needs the fields
//! it overrides. [`AnalyticsConfig::from_env`] layers environment variables on top.

use crate::{
    divergence::DivergenceConfig,
    heatmap::HeatmapConfig,
    liquidation::{DEFAULT_BUCKET_SIZE, DEFAULT_DANGER_THRESHOLD, DEFAULT_ZONE_THRESHOLD},
    momentum::MomentumConfig,
};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::warn;

/// Default number of trailing taker volume buckets summarised.
pub const DEFAULT_FLOW_WINDOW: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AnalyticsConfig {
    pub liquidation: LiquidationConfig,
    pub divergence: DivergenceConfig,
    pub momentum: MomentumConfig,
    pub heatmap: HeatmapConfig,
    pub flow: FlowConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LiquidationConfig {
    pub bucket_size: f64,
    /// Fraction of the largest cluster a zone must reach.
    pub zone_threshold: f64,
    /// Per-side notional a cascade level must exceed.
    pub danger_threshold: f64,
}

impl Default for LiquidationConfig {
    fn default() -> Self {
        Self {
            bucket_size: DEFAULT_BUCKET_SIZE,
            zone_threshold: DEFAULT_ZONE_THRESHOLD,
            danger_threshold: DEFAULT_DANGER_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FlowConfig {
    pub window: usize,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            window: DEFAULT_FLOW_WINDOW,
        }
    }
}

impl AnalyticsConfig {
    /// Defaults overridden by any of the supported environment variables:
    ///
    /// | Variable | Field |
    /// |---|---|
    /// | `LIQ_BUCKET_SIZE` | `liquidation.bucket_size` |
    /// | `LIQ_ZONE_THRESHOLD` | `liquidation.zone_threshold` |
    /// | `LIQ_DANGER_THRESHOLD` | `liquidation.danger_threshold` |
    /// | `DIVERGENCE_WINDOW` | `divergence.window` |
    /// | `DIVERGENCE_MIN_PRICE_PCT` | `divergence.min_price_change_pct` |
    /// | `DIVERGENCE_MIN_OI_PCT` | `divergence.min_oi_change_pct` |
    /// | `MOMENTUM_WINDOW` | `momentum.window` |
    /// | `MOMENTUM_MATERIALITY_PCT` | `momentum.materiality_pct` |
    /// | `HEATMAP_PRICE_STEP` | `heatmap.price_step` |
    /// | `HEATMAP_TIME_STEP_MS` | `heatmap.time_step_ms` |
    /// | `HEATMAP_NORMALIZE` | `heatmap.normalize` |
    /// | `FLOW_WINDOW` | `flow.window` |
    pub fn from_env() -> Self {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    /// Override fields from `lookup`, keyed by the variable names of [`Self::from_env`].
    ///
    /// Unparseable values are logged and leave the field unchanged.
    pub fn with_overrides(self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let Self {
            liquidation,
            divergence,
            momentum,
            heatmap,
            flow,
        } = self;

        Self {
            liquidation: LiquidationConfig {
                bucket_size: overlay(&lookup, "LIQ_BUCKET_SIZE", liquidation.bucket_size),
                zone_threshold: overlay(&lookup, "LIQ_ZONE_THRESHOLD", liquidation.zone_threshold),
                danger_threshold: overlay(
                    &lookup,
                    "LIQ_DANGER_THRESHOLD",
                    liquidation.danger_threshold,
                ),
            },
            divergence: DivergenceConfig {
                window: overlay(&lookup, "DIVERGENCE_WINDOW", divergence.window),
                min_price_change_pct: overlay(
                    &lookup,
                    "DIVERGENCE_MIN_PRICE_PCT",
                    divergence.min_price_change_pct,
                ),
                min_oi_change_pct: overlay(
                    &lookup,
                    "DIVERGENCE_MIN_OI_PCT",
                    divergence.min_oi_change_pct,
                ),
            },
            momentum: MomentumConfig {
                window: overlay(&lookup, "MOMENTUM_WINDOW", momentum.window),
                materiality_pct: overlay(
                    &lookup,
                    "MOMENTUM_MATERIALITY_PCT",
                    momentum.materiality_pct,
                ),
                ..momentum
            },
            heatmap: HeatmapConfig {
                price_step: overlay(&lookup, "HEATMAP_PRICE_STEP", heatmap.price_step),
                time_step_ms: overlay(&lookup, "HEATMAP_TIME_STEP_MS", heatmap.time_step_ms),
                normalize: overlay(&lookup, "HEATMAP_NORMALIZE", heatmap.normalize),
                ..heatmap
            },
            flow: FlowConfig {
                window: overlay(&lookup, "FLOW_WINDOW", flow.window),
            },
        }
    }
}

fn overlay<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, current: T) -> T
where
    T: FromStr,
{
    lookup(key)
        .and_then(|value| match value.trim().parse() {
            Ok(parsed) => Some(parsed),
            Err(_) => {
                warn!(key, %value, "ignoring unparseable configuration override");
                None
            }
        })
        .unwrap_or(current)
}

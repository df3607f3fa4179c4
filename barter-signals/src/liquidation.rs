//! Liquidation cluster aggregation.
//!
//! Buckets discrete liquidation events by price level and derives zone, pressure and cascade
//! statistics from the resulting clusters.

use crate::{
    bucket::bucket_index,
    error::{AnalyticsError, ensure_positive},
    types::{Bias, LiquidationEvent, LiquidationSide},
};
use fnv::FnvHashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Default price bucket width used to group liquidations.
pub const DEFAULT_BUCKET_SIZE: f64 = 10.0;

/// Default fraction of the largest cluster a cluster must reach to count as a zone.
pub const DEFAULT_ZONE_THRESHOLD: f64 = 0.7;

/// Default per-side notional a cluster must exceed to be reported as a cascade level.
pub const DEFAULT_DANGER_THRESHOLD: f64 = 1_000_000.0;

/// Long ratio above which net pressure is long biased (and `1 - ratio` short biased).
const PRESSURE_BIAS_RATIO: f64 = 0.6;

/// Liquidations aggregated into one price bucket.
#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LiquidationCluster {
    /// Bucket floor: `floor(price / bucket_size) * bucket_size`.
    pub price: f64,
    /// Summed quantity of force-closed longs.
    pub long_liquidations: f64,
    /// Summed quantity of force-closed shorts.
    pub short_liquidations: f64,
    /// Σ quantity × price over every event in the bucket.
    pub total_value: f64,
}

impl LiquidationCluster {
    pub fn total_quantity(&self) -> f64 {
        self.long_liquidations + self.short_liquidations
    }

    /// Share of `total_value` attributable to one side, split by quantity.
    pub fn side_value(&self, side: LiquidationSide) -> f64 {
        let total = self.total_quantity();
        if total <= 0.0 {
            return 0.0;
        }
        let quantity = match side {
            LiquidationSide::Long => self.long_liquidations,
            LiquidationSide::Short => self.short_liquidations,
        };
        self.total_value * quantity / total
    }
}

/// Net long versus short liquidation pressure across a set of clusters.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NetPressure {
    pub net_long: f64,
    pub net_short: f64,
    /// `net_long / (net_long + net_short)`, 0.5 when nothing was liquidated.
    pub long_ratio: f64,
    pub bias: Bias,
}

/// Price level whose liquidations could accelerate a move through it.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CascadeLevel {
    pub price: f64,
    pub total_value: f64,
    /// Side whose liquidations dominate the level.
    pub side: LiquidationSide,
}

/// Nearest significant liquidation levels either side of the current price.
#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CascadeLevels {
    /// Largest long-liquidation cluster below price: a break down cascades through it.
    pub below: Option<CascadeLevel>,
    /// Largest short-liquidation cluster above price: fuel for a short squeeze.
    pub above: Option<CascadeLevel>,
}

/// Group liquidations into `bucket_size` wide price buckets, sorted by descending
/// `total_value` (ties broken by ascending price).
pub fn aggregate_liquidations(
    events: &[LiquidationEvent],
    bucket_size: f64,
) -> Result<Vec<LiquidationCluster>, AnalyticsError> {
    ensure_positive("bucket_size", bucket_size)?;

    let mut buckets: FnvHashMap<i64, LiquidationCluster> = FnvHashMap::default();

    for event in events {
        let bucket = bucket_index(event.price, 0.0, bucket_size);
        let cluster = buckets.entry(bucket).or_insert_with(|| LiquidationCluster {
            price: bucket as f64 * bucket_size,
            ..Default::default()
        });

        match event.side {
            LiquidationSide::Long => cluster.long_liquidations += event.quantity,
            LiquidationSide::Short => cluster.short_liquidations += event.quantity,
        }
        cluster.total_value += event.notional();
    }

    let mut clusters: Vec<LiquidationCluster> = buckets.into_values().collect();
    clusters.sort_by(|a, b| {
        b.total_value
            .total_cmp(&a.total_value)
            .then(a.price.total_cmp(&b.price))
    });

    debug!(
        events = events.len(),
        clusters = clusters.len(),
        bucket_size,
        "aggregated liquidations"
    );

    Ok(clusters)
}

/// Clusters whose `total_value` reaches `threshold` × the largest observed `total_value`.
///
/// Input order is preserved. A threshold of zero returns every cluster.
pub fn find_liquidation_zones(
    clusters: &[LiquidationCluster],
    threshold: f64,
) -> Vec<LiquidationCluster> {
    let Some(max_value) = clusters.iter().map(|c| c.total_value).reduce(f64::max) else {
        return Vec::new();
    };

    let cutoff = threshold * max_value;
    clusters
        .iter()
        .filter(|cluster| cluster.total_value >= cutoff)
        .copied()
        .collect()
}

/// Sum long and short liquidated quantity and derive the dominant side.
pub fn calculate_net_pressure(clusters: &[LiquidationCluster]) -> NetPressure {
    let (net_long, net_short) = clusters.iter().fold((0.0, 0.0), |(long, short), c| {
        (long + c.long_liquidations, short + c.short_liquidations)
    });

    let total = net_long + net_short;
    let long_ratio = if total > 0.0 { net_long / total } else { 0.5 };

    let bias = if long_ratio > PRESSURE_BIAS_RATIO {
        Bias::Long
    } else if long_ratio < 1.0 - PRESSURE_BIAS_RATIO {
        Bias::Short
    } else {
        Bias::Neutral
    };

    NetPressure {
        net_long,
        net_short,
        long_ratio,
        bias,
    }
}

/// Locate the heaviest long-liquidation cluster below `current_price` and the heaviest
/// short-liquidation cluster above it, ignoring clusters whose side notional does not exceed
/// `min_side_value`.
pub fn find_cascade_levels(
    clusters: &[LiquidationCluster],
    current_price: f64,
    min_side_value: f64,
) -> CascadeLevels {
    if !(current_price.is_finite() && current_price > 0.0) {
        return CascadeLevels::default();
    }

    let heaviest = |side: LiquidationSide, on_side: &dyn Fn(f64) -> bool| {
        clusters
            .iter()
            .filter(|c| on_side(c.price) && c.side_value(side) > min_side_value)
            .max_by(|a, b| a.total_value.total_cmp(&b.total_value))
            .map(|c| CascadeLevel {
                price: c.price,
                total_value: c.total_value,
                side,
            })
    };

    CascadeLevels {
        below: heaviest(LiquidationSide::Long, &|price| price < current_price),
        above: heaviest(LiquidationSide::Short, &|price| price > current_price),
    }
}

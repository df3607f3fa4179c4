//! Full signal report over one market snapshot.

use crate::{
    bucket::bucket_index,
    config::AnalyticsConfig,
    divergence::{DivergenceSignal, detect_divergences},
    error::AnalyticsError,
    flow::{TakerFlowSummary, summarize_taker_flow},
    heatmap::{
        Heatmap, PriceRange, build_combined_heatmap, build_liquidation_heatmap, build_oi_heatmap,
    },
    liquidation::{
        CascadeLevels, LiquidationCluster, NetPressure, aggregate_liquidations,
        calculate_net_pressure, find_cascade_levels, find_liquidation_zones,
    },
    momentum::{OiMomentumRecord, analyze_oi_momentum},
    regime::{
        FundingRegime, MarketRegime, classify_funding_regime, classify_market_regime,
        regime_inputs,
    },
    types::{
        Candle, FundingRatePoint, LiquidationEvent, LongShortRatioPoint, OpenInterestPoint,
        TakerVolumePoint, with_deltas,
    },
};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use tracing::debug;

/// Every series the analytics consume for a single symbol.
///
/// All series are ascending by timestamp except `funding_rates`, which is most-recent-first.
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MarketSnapshot {
    pub symbol: SmolStr,
    pub candles: Vec<Candle>,
    pub open_interest: Vec<OpenInterestPoint>,
    pub liquidations: Vec<LiquidationEvent>,
    pub funding_rates: Vec<FundingRatePoint>,
    pub long_short_ratios: Vec<LongShortRatioPoint>,
    pub taker_volume: Vec<TakerVolumePoint>,
}

impl MarketSnapshot {
    /// Close of the most recent candle.
    pub fn current_price(&self) -> Option<f64> {
        self.candles.last().map(|candle| candle.close)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalReport {
    pub symbol: SmolStr,
    pub current_price: Option<f64>,
    pub liquidations: LiquidationReport,
    pub market_regime: MarketRegime,
    pub funding_regime: FundingRegime,
    pub divergences: Vec<DivergenceSignal>,
    pub oi_momentum: Vec<OiMomentumRecord>,
    pub heatmaps: HeatmapReport,
    pub taker_flow: TakerFlowSummary,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LiquidationReport {
    pub clusters: Vec<LiquidationCluster>,
    pub zones: Vec<LiquidationCluster>,
    pub net_pressure: NetPressure,
    pub cascade_levels: CascadeLevels,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HeatmapReport {
    pub open_interest: Heatmap,
    pub liquidations: Heatmap,
    pub combined: Heatmap,
}

/// Run every analytic over `snapshot`.
///
/// Candles and OI are aligned on their trailing common length before divergence detection,
/// so a feed that returned a few extra older points does not fail the whole report.
pub fn build_report(
    snapshot: &MarketSnapshot,
    config: &AnalyticsConfig,
) -> Result<SignalReport, AnalyticsError> {
    let MarketSnapshot {
        symbol,
        candles,
        open_interest,
        liquidations,
        funding_rates,
        long_short_ratios,
        taker_volume,
    } = snapshot;

    let current_price = snapshot.current_price();
    let open_interest = with_deltas(open_interest);

    // Liquidations
    let clusters = aggregate_liquidations(liquidations, config.liquidation.bucket_size)?;
    let liquidation_report = LiquidationReport {
        zones: find_liquidation_zones(&clusters, config.liquidation.zone_threshold),
        net_pressure: calculate_net_pressure(&clusters),
        cascade_levels: current_price
            .map(|price| {
                find_cascade_levels(&clusters, price, config.liquidation.danger_threshold)
            })
            .unwrap_or_default(),
        clusters,
    };

    // Regimes
    let inputs = regime_inputs(funding_rates, long_short_ratios, &open_interest);
    let market_regime =
        classify_market_regime(inputs.funding_rate, inputs.long_short_ratio, inputs.oi_change);
    let funding_regime = classify_funding_regime(funding_rates);

    // Divergence & momentum
    let aligned = candles.len().min(open_interest.len());
    let divergences = detect_divergences(
        &candles[candles.len() - aligned..],
        &open_interest[open_interest.len() - aligned..],
        &config.divergence,
    )?;
    let oi_momentum = analyze_oi_momentum(&open_interest, &config.momentum)?;

    // Heatmaps
    let oi_heatmap = build_oi_heatmap(&open_interest, candles, &config.heatmap)?;
    let liquidation_heatmap = build_liquidation_heatmap(
        liquidations,
        liquidation_price_range(candles, liquidations, config.heatmap.price_step),
        &config.heatmap,
    )?;
    let combined = build_combined_heatmap(&oi_heatmap, &liquidation_heatmap, candles)?;

    let taker_flow = summarize_taker_flow(taker_volume, config.flow.window)?;

    debug!(
        %symbol,
        clusters = liquidation_report.clusters.len(),
        divergences = divergences.len(),
        momentum_records = oi_momentum.len(),
        regime = %market_regime.regime,
        "built signal report"
    );

    Ok(SignalReport {
        symbol: symbol.clone(),
        current_price,
        liquidations: liquidation_report,
        market_regime,
        funding_regime,
        divergences,
        oi_momentum,
        heatmaps: HeatmapReport {
            open_interest: oi_heatmap,
            liquidations: liquidation_heatmap,
            combined,
        },
        taker_flow,
    })
}

/// Price range of the liquidation heatmap: the traded candle range, or the liquidation prices
/// when no candles are available, snapped outwards to `step` multiples so the grid lines up
/// with the OI heatmap.
fn liquidation_price_range(
    candles: &[Candle],
    liquidations: &[LiquidationEvent],
    step: f64,
) -> PriceRange {
    let traded = candles
        .iter()
        .flat_map(|candle| [candle.low, candle.high])
        .filter(|price| price.is_finite())
        .minmax()
        .into_option();

    let range = traded.or_else(|| {
        liquidations
            .iter()
            .map(|event| event.price)
            .filter(|price| price.is_finite())
            .minmax()
            .into_option()
    });

    match range {
        Some((low, high)) if step.is_finite() && step > 0.0 => PriceRange::new(
            bucket_index(low, 0.0, step) as f64 * step,
            (bucket_index(high, 0.0, step) + 1) as f64 * step,
        ),
        _ => PriceRange::new(0.0, 0.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        regime::{FundingRegimeKind, NO_FUNDING_DATA_DESCRIPTION, RegimeKind},
        types::{
            Bias, LiquidationSide,
            test_utils::{candle, liquidation, oi},
        },
    };

    #[test]
    fn test_build_report_empty_snapshot() {
        let snapshot = MarketSnapshot {
            symbol: SmolStr::new_static("BTCUSDT"),
            ..Default::default()
        };

        let actual = build_report(&snapshot, &AnalyticsConfig::default()).unwrap();

        assert_eq!(actual.current_price, None);
        assert!(actual.liquidations.clusters.is_empty());
        assert_eq!(actual.liquidations.net_pressure.long_ratio, 0.5);
        assert_eq!(actual.liquidations.cascade_levels, CascadeLevels::default());
        assert_eq!(actual.market_regime.regime, RegimeKind::Neutral);
        assert_eq!(actual.funding_regime.regime, FundingRegimeKind::Neutral);
        assert_eq!(actual.funding_regime.description, NO_FUNDING_DATA_DESCRIPTION);
        assert!(actual.divergences.is_empty());
        assert!(actual.oi_momentum.is_empty());
        assert!(actual.heatmaps.open_interest.is_empty());
        assert!(actual.heatmaps.liquidations.is_empty());
        assert!(actual.heatmaps.combined.is_empty());
        assert_eq!(actual.taker_flow.bias, Bias::Neutral);
    }

    #[test]
    fn test_build_report_aligns_trailing_points() {
        let candles: Vec<Candle> = (0..25).map(|i| candle(i * 60_000, 100.0 - i as f64)).collect();
        let open_interest = (3..25)
            .map(|i| oi(i * 60_000, 1000.0 + 10.0 * i as f64))
            .collect();
        let snapshot = MarketSnapshot {
            candles,
            open_interest,
            ..Default::default()
        };

        let actual = build_report(&snapshot, &AnalyticsConfig::default()).unwrap();

        // 22 aligned points with a window of 20
        assert_eq!(actual.divergences.len(), 2);
        assert_eq!(actual.current_price, Some(76.0));
    }

    #[test]
    fn test_build_report_rejects_unordered_liquidations() {
        let snapshot = MarketSnapshot {
            liquidations: vec![
                liquidation(LiquidationSide::Long, 100.0, 1.0, 10),
                liquidation(LiquidationSide::Long, 100.0, 1.0, 5),
            ],
            ..Default::default()
        };

        assert!(matches!(
            build_report(&snapshot, &AnalyticsConfig::default()),
            Err(AnalyticsError::UnorderedSeries { .. })
        ));
    }

    #[test]
    fn test_liquidation_price_range() {
        let candles = vec![candle(0, 120.0), candle(1, 380.0)];
        let events = vec![liquidation(LiquidationSide::Short, 900.0, 1.0, 0)];

        assert_eq!(
            liquidation_price_range(&candles, &events, 100.0),
            PriceRange::new(100.0, 400.0)
        );
        assert_eq!(
            liquidation_price_range(&[], &events, 100.0),
            PriceRange::new(900.0, 1000.0)
        );
        assert_eq!(liquidation_price_range(&[], &[], 100.0), PriceRange::new(0.0, 0.0));
    }
}

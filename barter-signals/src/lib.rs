//! Barter Signals - derivatives market analytics
//!
//! Pure computations over historical market series (candles, open interest, liquidations,
//! funding rates, long/short ratios and taker volume):
//! - liquidation clusters, zones, net pressure and cascade levels
//! - funding and composite market regime classification
//! - price / open interest divergence detection
//! - open interest momentum and acceleration scenarios
//! - price × time heatmaps of OI, liquidations and their weighted combination
//! - taker flow summary
//!
//! Fetching data and serving results are left to the caller. [`report::build_report`] runs
//! every analytic over one [`report::MarketSnapshot`], and [`response::ApiResponse`] plus
//! [`cache::TtlCache`] support serving them over a request/response API.

pub mod bucket;
pub mod cache;
pub mod config;
pub mod divergence;
pub mod error;
pub mod flow;
pub mod heatmap;
pub mod liquidation;
pub mod momentum;
pub mod regime;
pub mod report;
pub mod response;
pub mod types;

// Re-export commonly used types for convenience
pub use config::AnalyticsConfig;
pub use error::AnalyticsError;
pub use report::{MarketSnapshot, SignalReport, build_report};
pub use response::ApiResponse;
pub use types::{
    Bias, Candle, FundingRatePoint, LiquidationEvent, LiquidationSide, LongShortRatioPoint,
    OpenInterestPoint, TakerVolumePoint,
};

pub use divergence::{DivergenceConfig, DivergenceKind, DivergenceSignal, detect_divergences};
pub use heatmap::{
    Heatmap, HeatmapCell, HeatmapConfig, PriceRange, TimeRange, build_combined_heatmap,
    build_liquidation_heatmap, build_oi_heatmap,
};
pub use liquidation::{
    LiquidationCluster, NetPressure, aggregate_liquidations, calculate_net_pressure,
    find_liquidation_zones,
};
pub use momentum::{MomentumConfig, MomentumScenario, OiMomentumRecord, analyze_oi_momentum};
pub use regime::{
    FundingRegime, MarketRegime, RegimeKind, RiskLevel, classify_funding_regime,
    classify_market_regime,
};

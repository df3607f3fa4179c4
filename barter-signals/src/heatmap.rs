//! Price × time intensity grids for open interest, liquidations and their combination.
//!
//! Every grid is dense: each (price bucket, time bucket) pair of the declared range is present,
//! with zero intensity where no data contributed. Rows are price buckets (ascending) and
//! columns are time buckets (ascending); cells are stored row-major.

use crate::{
    bucket::{BUCKET_EPSILON, bucket_count, bucket_index},
    error::{AnalyticsError, ensure_positive},
    types::{Candle, LiquidationEvent, OpenInterestPoint, ensure_ascending},
};
use chrono::{DateTime, Utc};
use derive_more::Constructor;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Weight of the normalised OI grid in [`build_combined_heatmap`].
pub const OI_WEIGHT: f64 = 0.6;
/// Weight of the normalised liquidation grid in [`build_combined_heatmap`].
pub const LIQUIDATION_WEIGHT: f64 = 0.4;

/// Largest grid any builder allocates, and the largest length of either axis. Requests that
/// would exceed it (e.g. a tiny `price_step` over a wide range) fail with
/// [`AnalyticsError::InvalidParameter`].
pub const MAX_HEATMAP_CELLS: usize = 2_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HeatmapConfig {
    pub price_step: f64,
    pub time_step_ms: i64,
    /// Rescale intensities to [0, 1] by the largest cell.
    pub normalize: bool,
    /// Declared time range. Derived from the data (snapped to `time_step_ms`) when absent.
    pub time_range: Option<TimeRange>,
}

impl Default for HeatmapConfig {
    fn default() -> Self {
        Self {
            price_step: 100.0,
            time_step_ms: 60 * 60 * 1000,
            normalize: true,
            time_range: None,
        }
    }
}

impl HeatmapConfig {
    fn validate(&self) -> Result<(), AnalyticsError> {
        ensure_positive("price_step", self.price_step)?;
        if self.time_step_ms <= 0 {
            return Err(AnalyticsError::invalid_parameter(
                "time_step_ms",
                self.time_step_ms,
            ));
        }
        if let Some(range) = &self.time_range {
            if range.end < range.start {
                return Err(AnalyticsError::invalid_parameter(
                    "time_range",
                    format!("{} > {}", range.start, range.end),
                ));
            }
        }
        Ok(())
    }
}

/// Closed price interval `[min, max]`.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize, Constructor)]
pub struct PriceRange {
    pub min: f64,
    pub max: f64,
}

/// Closed time interval `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Constructor)]
pub struct TimeRange {
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub start: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub end: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HeatmapCell {
    /// Lower price edge of the row.
    pub price_bucket: f64,
    /// Start of the column.
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub time_bucket: DateTime<Utc>,
    /// Normalised [0, 1] or raw, depending on [`Heatmap::normalized`].
    pub intensity: f64,
    /// Raw magnitude accumulated into the cell.
    pub contributing_value: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Heatmap {
    pub price_min: f64,
    pub price_max: f64,
    pub price_step: f64,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub time_start: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub time_end: DateTime<Utc>,
    pub time_step_ms: i64,
    pub price_buckets: usize,
    pub time_buckets: usize,
    pub normalized: bool,
    pub cells: Vec<HeatmapCell>,
}

impl Heatmap {
    /// Grid with no rows or columns.
    pub fn empty(config: &HeatmapConfig) -> Self {
        let epoch = DateTime::<Utc>::UNIX_EPOCH;
        let (time_start, time_end) = config
            .time_range
            .map(|range| (range.start, range.end))
            .unwrap_or((epoch, epoch));

        Self {
            price_min: 0.0,
            price_max: 0.0,
            price_step: config.price_step,
            time_start,
            time_end,
            time_step_ms: config.time_step_ms,
            price_buckets: 0,
            time_buckets: 0,
            normalized: config.normalize,
            cells: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Cell at price row `row` and time column `column`.
    pub fn cell(&self, row: usize, column: usize) -> Option<&HeatmapCell> {
        if row >= self.price_buckets || column >= self.time_buckets {
            return None;
        }
        self.cells.get(row * self.time_buckets + column)
    }

    /// All cells of one price row, ordered by time.
    pub fn row(&self, row: usize) -> Option<&[HeatmapCell]> {
        let start = row.checked_mul(self.time_buckets)?;
        self.cells.get(start..start + self.time_buckets)
    }

    /// Σ `contributing_value` over every cell.
    pub fn total_contribution(&self) -> f64 {
        self.cells.iter().map(|cell| cell.contributing_value).sum()
    }

    pub fn max_contribution(&self) -> f64 {
        self.cells
            .iter()
            .map(|cell| cell.contributing_value)
            .fold(0.0, f64::max)
    }

    /// Upper edge of the last row (`price_min + price_buckets * price_step`), which may exceed
    /// `price_max` when the declared range is not a step multiple.
    fn grid_top(&self) -> f64 {
        self.price_min + self.price_buckets as f64 * self.price_step
    }

    /// Locate the row whose lower edge is `price`, if any.
    fn row_at(&self, price: f64) -> Option<usize> {
        let row = ((price - self.price_min) / self.price_step).round();
        (row >= 0.0 && (row as usize) < self.price_buckets).then_some(row as usize)
    }

    fn column_at(&self, time: DateTime<Utc>) -> Option<usize> {
        let offset = time.timestamp_millis() - self.time_start.timestamp_millis();
        (offset >= 0 && offset % self.time_step_ms == 0)
            .then_some((offset / self.time_step_ms) as usize)
            .filter(|column| *column < self.time_buckets)
    }
}

/// Price axis over the closed interval `[min, max]`.
#[derive(Debug, Clone, Copy)]
struct PriceAxis {
    min: f64,
    max: f64,
    step: f64,
    len: usize,
}

impl PriceAxis {
    /// Axis spanning exactly `[min, max]`: `ceil((max - min) / step)` rows.
    fn declared(min: f64, max: f64, step: f64) -> Result<Self, AnalyticsError> {
        Ok(Self {
            min,
            max,
            step,
            len: within_cell_limit("price_step", Some(bucket_count(max - min, step)))?,
        })
    }

    /// Axis snapped outwards to step multiples so rows match `floor(price / step) * step`.
    fn snapped(lowest: f64, highest: f64, step: f64) -> Result<Self, AnalyticsError> {
        let first = bucket_index(lowest, 0.0, step);
        let last = bucket_index(highest, 0.0, step);
        let len = last
            .checked_sub(first)
            .and_then(|span| span.checked_add(1))
            .and_then(|len| usize::try_from(len).ok());
        let len = within_cell_limit("price_step", len)?;
        let min = first as f64 * step;

        Ok(Self {
            min,
            max: min + len as f64 * step,
            step,
            len,
        })
    }

    /// Row holding `price`. Prices outside `[min, max]` have no row; `price == max` falls
    /// into the last row.
    fn index(&self, price: f64) -> Option<usize> {
        if self.len == 0 || !price.is_finite() || price < self.min || price > self.max {
            return None;
        }
        let row = bucket_index(price, self.min, self.step).max(0) as usize;
        Some(row.min(self.len - 1))
    }

    fn bucket(&self, row: usize) -> f64 {
        self.min + row as f64 * self.step
    }
}

/// Time axis over the closed interval `[start, end]` in epoch milliseconds.
#[derive(Debug, Clone, Copy)]
struct TimeAxis {
    start: i64,
    end: i64,
    step: i64,
    len: usize,
}

impl TimeAxis {
    /// Axis spanning exactly `[start, end]`: `ceil((end - start) / step)` columns.
    fn declared(start: i64, end: i64, step: i64) -> Result<Self, AnalyticsError> {
        let len = usize::try_from(ceil_div(end.saturating_sub(start).max(0), step)).ok();

        Ok(Self {
            start,
            end,
            step,
            len: within_cell_limit("time_step_ms", len)?,
        })
    }

    /// Axis snapped outwards to step multiples. Fails when the last column edge is not a
    /// representable timestamp.
    fn snapped(earliest: i64, latest: i64, step: i64) -> Result<Self, AnalyticsError> {
        let first = earliest.div_euclid(step);
        let last = latest.div_euclid(step);

        let start = first.checked_mul(step);
        let end = last
            .checked_add(1)
            .and_then(|edge| edge.checked_mul(step))
            .filter(|end| DateTime::from_timestamp_millis(*end).is_some());
        let (Some(start), Some(end)) = (start, end) else {
            return Err(AnalyticsError::invalid_parameter("time_step_ms", step));
        };

        let len = last
            .checked_sub(first)
            .and_then(|span| span.checked_add(1))
            .and_then(|len| usize::try_from(len).ok());

        Ok(Self {
            start,
            end,
            step,
            len: within_cell_limit("time_step_ms", len)?,
        })
    }

    fn from_config(
        config: &HeatmapConfig,
        mut times: impl Iterator<Item = i64>,
    ) -> Result<Option<Self>, AnalyticsError> {
        match config.time_range {
            Some(range) => Self::declared(
                range.start.timestamp_millis(),
                range.end.timestamp_millis(),
                config.time_step_ms,
            )
            .map(Some),
            None => {
                let Some(first) = times.next() else {
                    return Ok(None);
                };
                let (earliest, latest) =
                    times.fold((first, first), |(lo, hi), time| (lo.min(time), hi.max(time)));
                Self::snapped(earliest, latest, config.time_step_ms).map(Some)
            }
        }
    }

    fn index(&self, time: i64) -> Option<usize> {
        if self.len == 0 || time < self.start || time > self.end {
            return None;
        }
        let column = ((time - self.start) / self.step) as usize;
        Some(column.min(self.len - 1))
    }

    fn bucket(&self, column: usize) -> DateTime<Utc> {
        let millis = self.start + column as i64 * self.step;
        DateTime::from_timestamp_millis(millis).unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
    }
}

/// `ceil(span / step)` for a non-negative `span` and positive `step`, without overflow.
fn ceil_div(span: i64, step: i64) -> i64 {
    span / step + i64::from(span % step != 0)
}

/// Accept a row, column or cell count of at most [`MAX_HEATMAP_CELLS`]. `None` marks a count
/// that overflowed while being computed.
fn within_cell_limit(name: &str, count: Option<usize>) -> Result<usize, AnalyticsError> {
    match count {
        Some(count) if count <= MAX_HEATMAP_CELLS => Ok(count),
        _ => Err(AnalyticsError::invalid_parameter(
            name,
            format!("grid exceeds {MAX_HEATMAP_CELLS} cells"),
        )),
    }
}

/// Dense accumulation grid backing every builder.
struct Grid {
    prices: PriceAxis,
    times: TimeAxis,
    values: Vec<f64>,
}

impl Grid {
    fn new(prices: PriceAxis, times: TimeAxis) -> Result<Self, AnalyticsError> {
        let cells = within_cell_limit("heatmap_cells", prices.len.checked_mul(times.len))?;

        Ok(Self {
            values: vec![0.0; cells],
            prices,
            times,
        })
    }

    /// Accumulate `value` into the cell at (`price`, `time`). Returns false when the point
    /// lies outside the grid.
    fn add(&mut self, price: f64, time: i64, value: f64) -> bool {
        match (self.prices.index(price), self.times.index(time)) {
            (Some(row), Some(column)) => {
                self.values[row * self.times.len + column] += value;
                true
            }
            _ => false,
        }
    }

    fn into_heatmap(self, normalize: bool) -> Heatmap {
        let max = self.values.iter().copied().fold(0.0, f64::max);
        let Self {
            prices,
            times,
            values,
        } = self;

        let cells = (0..prices.len)
            .cartesian_product(0..times.len)
            .zip(values)
            .map(|((row, column), value)| HeatmapCell {
                price_bucket: prices.bucket(row),
                time_bucket: times.bucket(column),
                intensity: match normalize {
                    true if max > 0.0 => value / max,
                    true => 0.0,
                    false => value,
                },
                contributing_value: value,
            })
            .collect();

        Heatmap {
            price_min: prices.min,
            price_max: prices.max,
            price_step: prices.step,
            time_start: DateTime::from_timestamp_millis(times.start)
                .unwrap_or(DateTime::<Utc>::UNIX_EPOCH),
            time_end: DateTime::from_timestamp_millis(times.end)
                .unwrap_or(DateTime::<Utc>::UNIX_EPOCH),
            time_step_ms: times.step,
            price_buckets: prices.len,
            time_buckets: times.len,
            normalized: normalize,
            cells,
        }
    }
}

/// Close of the candle nearest in time to `at`; ties resolve to the earlier candle.
fn nearest_close(candles: &[Candle], at: DateTime<Utc>) -> Option<f64> {
    let index = candles.partition_point(|candle| candle.timestamp < at);
    let before = index.checked_sub(1).map(|i| &candles[i]);
    let after = candles.get(index);

    match (before, after) {
        (Some(before), Some(after)) => {
            if at - before.timestamp <= after.timestamp - at {
                Some(before.close)
            } else {
                Some(after.close)
            }
        }
        (Some(candle), None) | (None, Some(candle)) => Some(candle.close),
        (None, None) => None,
    }
}

/// Accumulate OI values into (price, time) cells, pricing each OI reading at the close of the
/// nearest candle.
///
/// The price extent is snapped outwards to multiples of `price_step`, so each row is the
/// absolute bucket `floor(price / price_step) * price_step`.
pub fn build_oi_heatmap(
    open_interest: &[OpenInterestPoint],
    candles: &[Candle],
    config: &HeatmapConfig,
) -> Result<Heatmap, AnalyticsError> {
    config.validate()?;
    ensure_ascending("open_interest", open_interest)?;
    ensure_ascending("candles", candles)?;

    let located: Vec<(f64, i64, f64)> = open_interest
        .iter()
        .filter(|point| point.value.is_finite())
        .filter_map(|point| {
            let price = nearest_close(candles, point.timestamp)?;
            price
                .is_finite()
                .then_some((price, point.timestamp.timestamp_millis(), point.value))
        })
        .collect();

    let Some((lowest, highest)) = located.iter().map(|(price, _, _)| *price).minmax().into_option()
    else {
        return Ok(Heatmap::empty(config));
    };
    let prices = PriceAxis::snapped(lowest, highest, config.price_step)?;
    let Some(times) = TimeAxis::from_config(config, located.iter().map(|(_, time, _)| *time))?
    else {
        return Ok(Heatmap::empty(config));
    };

    let mut grid = Grid::new(prices, times)?;
    let dropped = located
        .iter()
        .filter(|(price, time, value)| !grid.add(*price, *time, *value))
        .count();

    debug!(
        points = open_interest.len(),
        rows = prices.len,
        columns = times.len,
        dropped,
        "built OI heatmap"
    );

    Ok(grid.into_heatmap(config.normalize))
}

/// Accumulate liquidation notional (quantity × price) into (price, time) cells of a grid
/// spanning exactly `price_range`.
///
/// Events priced outside the range are dropped, not clamped.
pub fn build_liquidation_heatmap(
    events: &[LiquidationEvent],
    price_range: PriceRange,
    config: &HeatmapConfig,
) -> Result<Heatmap, AnalyticsError> {
    config.validate()?;
    if !(price_range.min.is_finite()
        && price_range.max.is_finite()
        && price_range.min <= price_range.max)
    {
        return Err(AnalyticsError::invalid_parameter(
            "price_range",
            format!("[{}, {}]", price_range.min, price_range.max),
        ));
    }
    ensure_ascending("liquidations", events)?;

    let prices = PriceAxis::declared(price_range.min, price_range.max, config.price_step)?;
    let Some(times) = TimeAxis::from_config(
        config,
        events.iter().map(|event| event.timestamp.timestamp_millis()),
    )?
    else {
        return Ok(Heatmap {
            price_min: prices.min,
            price_max: prices.max,
            price_buckets: prices.len,
            ..Heatmap::empty(config)
        });
    };

    let mut grid = Grid::new(prices, times)?;
    let dropped = events
        .iter()
        .filter(|event| {
            !grid.add(
                event.price,
                event.timestamp.timestamp_millis(),
                event.notional(),
            )
        })
        .count();

    debug!(
        events = events.len(),
        rows = prices.len,
        columns = times.len,
        dropped,
        "built liquidation heatmap"
    );

    Ok(grid.into_heatmap(config.normalize))
}

/// Merge an OI grid and a liquidation grid cell by cell.
///
/// Each source is normalised by its own largest `contributing_value`, then combined as
/// `OI_WEIGHT * oi + LIQUIDATION_WEIGHT * liquidations`. Cells missing from one source count
/// as zero. The combined grid covers the union of both grids, widened to the candle low/high
/// range so the traded range is always visible. `contributing_value` carries the weighted
/// score and `intensity` the score rescaled to [0, 1].
pub fn build_combined_heatmap(
    oi: &Heatmap,
    liquidations: &Heatmap,
    candles: &[Candle],
) -> Result<Heatmap, AnalyticsError> {
    let sources: Vec<&Heatmap> = [oi, liquidations]
        .into_iter()
        .filter(|heatmap| !heatmap.is_empty())
        .collect();

    let Some(reference) = sources.first().copied() else {
        return Ok(Heatmap::empty(&HeatmapConfig {
            price_step: oi.price_step,
            time_step_ms: oi.time_step_ms,
            normalize: true,
            time_range: None,
        }));
    };
    let price_step = reference.price_step;
    let time_step = reference.time_step_ms;
    ensure_positive("price_step", price_step)?;
    if time_step <= 0 {
        return Err(AnalyticsError::invalid_parameter("time_step_ms", time_step));
    }

    for other in &sources[1..] {
        ensure_compatible(reference, other)?;
    }

    // Union of the source extents, aligned to the reference grid origin
    let mut price_low = sources
        .iter()
        .map(|heatmap| heatmap.price_min)
        .fold(f64::INFINITY, f64::min);
    let mut price_high = sources
        .iter()
        .map(|heatmap| heatmap.grid_top())
        .fold(f64::NEG_INFINITY, f64::max);

    let candle_range = candles
        .iter()
        .flat_map(|candle| [candle.low, candle.high])
        .filter(|price| price.is_finite())
        .minmax()
        .into_option();

    if let Some((low, high)) = candle_range {
        let origin = reference.price_min;
        let low_row = bucket_index(low, origin, price_step);
        let high_row = bucket_index(high, origin, price_step);
        price_low = price_low.min(origin + low_row as f64 * price_step);
        price_high = price_high.max(origin + high_row.saturating_add(1) as f64 * price_step);
    }

    let time_start = sources
        .iter()
        .map(|heatmap| heatmap.time_start.timestamp_millis())
        .min()
        .unwrap_or(0);
    let time_end = sources
        .iter()
        .map(|heatmap| heatmap.time_end.timestamp_millis())
        .max()
        .unwrap_or(0);

    let rows = bucket_count(price_high - price_low, price_step);
    let rows = within_cell_limit("price_step", Some(rows))?;
    let prices = PriceAxis {
        min: price_low,
        max: price_low + rows as f64 * price_step,
        step: price_step,
        len: rows,
    };
    let times = TimeAxis::declared(time_start, time_end, time_step)?;

    let oi_max = oi.max_contribution();
    let liquidation_max = liquidations.max_contribution();
    let normalised = |heatmap: &Heatmap, max: f64, price: f64, time: DateTime<Utc>| -> f64 {
        if max <= 0.0 {
            return 0.0;
        }
        heatmap
            .row_at(price)
            .zip(heatmap.column_at(time))
            .and_then(|(row, column)| heatmap.cell(row, column))
            .map(|cell| cell.contributing_value / max)
            .unwrap_or(0.0)
    };

    let mut grid = Grid::new(prices, times)?;
    for (row, column) in (0..prices.len).cartesian_product(0..times.len) {
        let price = prices.bucket(row);
        let time = times.bucket(column);
        grid.values[row * times.len + column] = OI_WEIGHT * normalised(oi, oi_max, price, time)
            + LIQUIDATION_WEIGHT * normalised(liquidations, liquidation_max, price, time);
    }

    debug!(rows = prices.len, columns = times.len, "built combined heatmap");

    Ok(grid.into_heatmap(true))
}

fn ensure_compatible(reference: &Heatmap, other: &Heatmap) -> Result<(), AnalyticsError> {
    if (reference.price_step - other.price_step).abs() > BUCKET_EPSILON * reference.price_step {
        return Err(AnalyticsError::GridMismatch(format!(
            "price steps differ: {} vs {}",
            reference.price_step, other.price_step
        )));
    }
    if reference.time_step_ms != other.time_step_ms {
        return Err(AnalyticsError::GridMismatch(format!(
            "time steps differ: {}ms vs {}ms",
            reference.time_step_ms, other.time_step_ms
        )));
    }

    let row_offset = (other.price_min - reference.price_min) / reference.price_step;
    if (row_offset - row_offset.round()).abs() > 1e-6 {
        return Err(AnalyticsError::GridMismatch(format!(
            "price origins {} and {} are not aligned to step {}",
            reference.price_min, other.price_min, reference.price_step
        )));
    }

    let time_offset = other.time_start.timestamp_millis() - reference.time_start.timestamp_millis();
    if time_offset % reference.time_step_ms != 0 {
        return Err(AnalyticsError::GridMismatch(format!(
            "time origins {} and {} are not aligned to step {}ms",
            reference.time_start, other.time_start, reference.time_step_ms
        )));
    }

    Ok(())
}

//! Floor-division bucketing shared by the liquidation aggregator and the heatmap builders.

/// Tolerance applied before flooring so values that are exact decimal multiples of the step
/// (e.g. `0.3 / 0.1`) land in their own bucket rather than the one below.
pub const BUCKET_EPSILON: f64 = 1e-9;

/// Index of the bucket containing `value` on an axis starting at `origin` with a fixed `step`.
///
/// `floor((value - origin) / step)`, so exact multiples of `step` open a new bucket.
#[inline]
pub fn bucket_index(value: f64, origin: f64, step: f64) -> i64 {
    ((value - origin) / step + BUCKET_EPSILON).floor() as i64
}

/// Lower edge of the absolute bucket containing `value`: `floor(value / step) * step`.
#[inline]
pub fn bucket_floor(value: f64, step: f64) -> f64 {
    bucket_index(value, 0.0, step) as f64 * step
}

/// Number of `step` sized buckets needed to cover `span`: `ceil(span / step)`.
#[inline]
pub fn bucket_count(span: f64, step: f64) -> usize {
    if span <= 0.0 {
        return 0;
    }
    (span / step - BUCKET_EPSILON).ceil().max(0.0) as usize
}

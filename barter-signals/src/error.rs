use serde::{Deserialize, Serialize};
use std::fmt::Display;
use thiserror::Error;

/// All errors generated in `barter-signals`.
///
/// Insufficient data is never an error: analytics return empty or neutral results instead.
/// These variants only flag caller invariant violations (unordered or misaligned series,
/// nonsensical parameters).
#[derive(Debug, Clone, Eq, PartialEq, Hash, Deserialize, Serialize, Error)]
pub enum AnalyticsError {
    #[error("series {series} is not ascending by timestamp at index {index}")]
    UnorderedSeries { series: String, index: usize },

    #[error(
        "\
        MisalignedSeries: {left} ({left_len} points) is not index aligned with \
        {right} ({right_len} points)\
    "
    )]
    MisalignedSeries {
        left: String,
        right: String,
        left_len: usize,
        right_len: usize,
    },

    #[error("invalid parameter {name}: {value}")]
    InvalidParameter { name: String, value: String },

    #[error("heatmap grids cannot be combined: {0}")]
    GridMismatch(String),
}

impl AnalyticsError {
    /// Construct an [`AnalyticsError::InvalidParameter`].
    pub fn invalid_parameter(name: &str, value: impl Display) -> Self {
        Self::InvalidParameter {
            name: name.to_string(),
            value: value.to_string(),
        }
    }

    /// Construct an [`AnalyticsError::MisalignedSeries`].
    pub fn misaligned(left: &str, left_len: usize, right: &str, right_len: usize) -> Self {
        Self::MisalignedSeries {
            left: left.to_string(),
            right: right.to_string(),
            left_len,
            right_len,
        }
    }
}

/// Fail unless `value` is a finite, strictly positive step or bucket size.
pub(crate) fn ensure_positive(name: &str, value: f64) -> Result<(), AnalyticsError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(AnalyticsError::invalid_parameter(name, value))
    }
}

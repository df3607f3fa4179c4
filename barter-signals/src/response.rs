use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// JSON envelope wrapping every analytics response.
///
/// Exactly one of `data` or `error` is present, matching `success`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self::success_at(data, Utc::now())
    }

    pub fn success_at(data: T, timestamp: DateTime<Utc>) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            timestamp,
        }
    }

    pub fn failure(error: impl Display) -> Self {
        Self::failure_at(error, Utc::now())
    }

    pub fn failure_at(error: impl Display, timestamp: DateTime<Utc>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.to_string()),
            timestamp,
        }
    }

    pub fn from_result<E>(result: Result<T, E>) -> Self
    where
        E: Display,
    {
        match result {
            Ok(data) => Self::success(data),
            Err(error) => Self::failure(error),
        }
    }
}

impl<T, E> From<Result<T, E>> for ApiResponse<T>
where
    E: Display,
{
    fn from(result: Result<T, E>) -> Self {
        Self::from_result(result)
    }
}

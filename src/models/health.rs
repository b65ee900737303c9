//! Represents a liveness probe row.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A write-only probe record inserted on every health check.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct HealthCheck {
    /// Auto-incremented row id.
    pub check_id: i64,

    /// When the probe ran (UTC).
    pub datetime: NaiveDateTime,
}

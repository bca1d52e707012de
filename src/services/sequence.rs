use chrono::{Datelike, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgConnection;

use crate::error::{AppError, Result};

/// A generated human-readable tracking code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingCode {
    pub code: String,
    pub prefix: String,
    pub year: i32,
    pub sequence: i64,
}

/// Issues the next tracking code for `prefix` in the current year.
///
/// One counter row per `(prefix, year)` is incremented and read in a single
/// statement inside the caller's transaction, so concurrent issuance never
/// yields duplicates.
pub async fn next_tracking_code(conn: &mut PgConnection, prefix: &str) -> Result<TrackingCode> {
    let prefix = prefix.trim().to_uppercase();
    if prefix.is_empty() {
        return Err(AppError::Validation(
            "tracking code prefix cannot be empty".to_string(),
        ));
    }

    let year = Utc::now().year();

    let (sequence,): (i64,) = sqlx::query_as(
        r#"
        INSERT INTO sequence_counters (prefix, year, value)
        VALUES ($1, $2, 1)
        ON CONFLICT (prefix, year)
        DO UPDATE SET value = sequence_counters.value + 1
        RETURNING value
        "#,
    )
    .bind(&prefix)
    .bind(year)
    .fetch_one(&mut *conn)
    .await?;

    Ok(TrackingCode {
        code: format_code(&prefix, year, sequence),
        prefix,
        year,
        sequence,
    })
}

/// Rejects a caller-supplied code that is already assigned to a loan.
/// Custom codes bypass the counter and are never retried on collision.
pub async fn ensure_code_available(conn: &mut PgConnection, code: &str) -> Result<()> {
    let (taken,): (bool,) =
        sqlx::query_as("SELECT EXISTS (SELECT 1 FROM loans WHERE tracking_code = $1)")
            .bind(code)
            .fetch_one(&mut *conn)
            .await?;

    if taken {
        return Err(AppError::Validation(format!(
            "tracking code '{}' is already in use",
            code
        )));
    }
    Ok(())
}

/// `PREFIX-YEAR-00001`, widening past five digits instead of wrapping.
fn format_code(prefix: &str, year: i32, sequence: i64) -> String {
    format!("{}-{}-{:05}", prefix, year, sequence)
}

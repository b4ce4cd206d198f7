//! Aggregation queries over `analytics_events` (SPEC_FULL.md §4.8):
//! `timestamp` bucketed into hour/day intervals via SQLite's `strftime`,
//! grouped by `(site, path, status/100)`.

use serde::Serialize;

use crate::db::{with_timeout, Database};
use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bucket {
    Hour,
    Day,
}

impl Bucket {
    fn strftime_format(self) -> &'static str {
        match self {
            Bucket::Hour => "%Y-%m-%dT%H:00:00Z",
            Bucket::Day => "%Y-%m-%dT00:00:00Z",
        }
    }

    pub fn parse(value: &str) -> AppResult<Self> {
        match value {
            "hour" => Ok(Bucket::Hour),
            "day" => Ok(Bucket::Day),
            other => Err(AppError::InvalidInput(format!(
                "unknown aggregation bucket '{other}', expected 'hour' or 'day'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct AnalyticsAggregate {
    pub bucket_start: String,
    pub site: String,
    pub path: String,
    pub status_class: i64,
    pub hits: i64,
}

/// Grouped hit counts for `site` (or all sites) within `[since, until)`,
/// bucketed by `bucket`. A missing/unopened database surfaces as
/// `Unavailable` (spec.md §7).
pub async fn query(
    db: &Database,
    site: Option<&str>,
    bucket: Bucket,
    since: &str,
    until: &str,
) -> AppResult<Vec<AnalyticsAggregate>> {
    let format = bucket.strftime_format();
    let rows = with_timeout(
        sqlx::query_as::<_, AnalyticsAggregate>(&format!(
            "SELECT strftime('{format}', timestamp) AS bucket_start,
                    site,
                    path,
                    (status / 100) AS status_class,
                    COUNT(*) AS hits
             FROM analytics_events
             WHERE (?1 IS NULL OR site = ?1)
               AND timestamp >= ?2 AND timestamp < ?3
             GROUP BY bucket_start, site, path, status_class
             ORDER BY bucket_start DESC, hits DESC"
        ))
        .bind(site)
        .bind(since)
        .bind(until)
        .fetch_all(db.pool()),
    )
    .await
    .map_err(|e| AppError::Unavailable(format!("analytics backend unavailable: {e}")))?;
    Ok(rows)
}

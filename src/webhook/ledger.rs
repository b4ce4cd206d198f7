//! SQLite-backed delivery ledger (spec.md §4.7). Every attempt — success,
//! failure, or manual resend — inserts a new row under the same
//! `webhook_id`; rows are never updated or deleted (retained indefinitely,
//! growth acknowledged per spec.md §3).

use chrono::Utc;
use serde::Serialize;

use crate::db::{with_timeout, Database};
use crate::error::AppResult;

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct DeliveryRow {
    pub webhook_id: String,
    pub event: String,
    pub site: String,
    pub url: String,
    pub payload: String,
    pub attempt: i64,
    pub status: i64,
    pub error: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeliverySummary {
    pub webhook_id: String,
    pub site: String,
    pub event: String,
    pub attempts: i64,
    pub succeeded: bool,
    pub first_attempt_at: String,
    pub last_attempt_at: String,
}

pub struct Ledger {
    db: Database,
}

impl Ledger {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn record_attempt(
        &self,
        webhook_id: &str,
        event: &str,
        site: &str,
        url: &str,
        payload: &str,
        attempt: i64,
        status: i64,
        error: Option<&str>,
    ) -> AppResult<()> {
        with_timeout(
            sqlx::query(
                "INSERT INTO webhook_deliveries
                 (webhook_id, event, site, url, payload, attempt, status, error, created_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(webhook_id)
            .bind(event)
            .bind(site)
            .bind(url)
            .bind(payload)
            .bind(attempt)
            .bind(status)
            .bind(error)
            .bind(Utc::now().to_rfc3339())
            .execute(self.db.pool()),
        )
        .await?;
        Ok(())
    }

    pub async fn next_attempt_number(&self, webhook_id: &str) -> AppResult<i64> {
        let row: (i64,) = with_timeout(
            sqlx::query_as("SELECT COALESCE(MAX(attempt), 0) FROM webhook_deliveries WHERE webhook_id = ?")
                .bind(webhook_id)
                .fetch_one(self.db.pool()),
        )
        .await?;
        Ok(row.0 + 1)
    }

    /// The most recent row for `webhook_id` — source of truth for manual
    /// resend (original URL and payload; spec.md §4.7).
    pub async fn last_attempt(&self, webhook_id: &str) -> AppResult<Option<DeliveryRow>> {
        let row = with_timeout(
            sqlx::query_as::<_, DeliveryRow>(
                "SELECT webhook_id, event, site, url, payload, attempt, status, error, created_at
                 FROM webhook_deliveries WHERE webhook_id = ? ORDER BY attempt DESC LIMIT 1",
            )
            .bind(webhook_id)
            .fetch_optional(self.db.pool()),
        )
        .await?;
        Ok(row)
    }

    pub async fn attempts_for(&self, webhook_id: &str) -> AppResult<Vec<DeliveryRow>> {
        let rows = with_timeout(
            sqlx::query_as::<_, DeliveryRow>(
                "SELECT webhook_id, event, site, url, payload, attempt, status, error, created_at
                 FROM webhook_deliveries WHERE webhook_id = ? ORDER BY attempt ASC",
            )
            .bind(webhook_id)
            .fetch_all(self.db.pool()),
        )
        .await?;
        Ok(rows)
    }

    /// Grouped listing (spec.md §4.7 "Listing"): one row per `webhook_id`,
    /// filtered by site/event/status and paginated on
    /// `(first_attempt DESC, webhook_id)`.
    pub async fn list_summaries(
        &self,
        site: Option<&str>,
        event: Option<&str>,
        succeeded_only: Option<bool>,
        limit: i64,
        offset: i64,
    ) -> AppResult<Vec<DeliverySummary>> {
        let rows = with_timeout(
            sqlx::query_as::<_, (String, String, String, i64, i64, String, String)>(
                "SELECT webhook_id,
                        MIN(site) AS site,
                        MIN(event) AS event,
                        COUNT(*) AS attempts,
                        MAX(CASE WHEN status BETWEEN 200 AND 299 THEN 1 ELSE 0 END) AS succeeded,
                        MIN(created_at) AS first_attempt_at,
                        MAX(created_at) AS last_attempt_at
                 FROM webhook_deliveries
                 WHERE (?1 IS NULL OR site = ?1) AND (?2 IS NULL OR event = ?2)
                 GROUP BY webhook_id
                 ORDER BY first_attempt_at DESC, webhook_id
                 LIMIT ?3 OFFSET ?4",
            )
            .bind(site)
            .bind(event)
            .bind(limit)
            .bind(offset)
            .fetch_all(self.db.pool()),
        )
        .await?;

        Ok(rows
            .into_iter()
            .map(
                |(webhook_id, site, event, attempts, succeeded, first_attempt_at, last_attempt_at)| {
                    DeliverySummary {
                        webhook_id,
                        site,
                        event,
                        attempts,
                        succeeded: succeeded == 1,
                        first_attempt_at,
                        last_attempt_at,
                    }
                },
            )
            .filter(|summary| match succeeded_only {
                Some(want) => want == summary.succeeded,
                None => true,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn ledger() -> Ledger {
        Ledger::new(Database::open_in_memory().await.unwrap())
    }

    #[tokio::test]
    async fn attempts_form_contiguous_sequence() {
        let ledger = ledger().await;
        for status in [500, 500, 200] {
            let attempt = ledger.next_attempt_number("wh_1").await.unwrap();
            ledger
                .record_attempt("wh_1", "deploy", "docs", "https://x", "{}", attempt, status, None)
                .await
                .unwrap();
        }
        let attempts = ledger.attempts_for("wh_1").await.unwrap();
        assert_eq!(attempts.len(), 3);
        assert_eq!(attempts.iter().map(|a| a.attempt).collect::<Vec<_>>(), vec![1, 2, 3]);
        assert_eq!(attempts.iter().map(|a| a.status).collect::<Vec<_>>(), vec![500, 500, 200]);
    }

    #[tokio::test]
    async fn list_summaries_marks_succeeded_on_any_2xx() {
        let ledger = ledger().await;
        ledger
            .record_attempt("wh_1", "deploy", "docs", "https://x", "{}", 1, 500, None)
            .await
            .unwrap();
        ledger
            .record_attempt("wh_1", "deploy", "docs", "https://x", "{}", 2, 200, None)
            .await
            .unwrap();

        let summaries = ledger.list_summaries(None, None, None, 10, 0).await.unwrap();
        assert_eq!(summaries.len(), 1);
        assert!(summaries[0].succeeded);
        assert_eq!(summaries[0].attempts, 2);
    }
}

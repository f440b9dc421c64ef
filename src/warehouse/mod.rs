//! Warehouse access layer.
//!
//! Sqlite-backed record source/sink addressed through one `Warehouse`
//! handle. WAL mode for concurrent reads during writes, batch inserts in
//! transactions, covering indexes on the hot read paths. Sink tables are
//! append-only; the status/apply columns are the only mutable fields and
//! change exclusively through the compare-and-set helpers here.

mod inputs;
mod sinks;

use std::sync::Arc;

use anyhow::{Context, Result};
use parking_lot::Mutex;
use rusqlite::{params, Connection};
use tracing::info;

use crate::models::RecommendationStatus;

/// Sink tables addressable by the status flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkTable {
    BidRecommendations,
    BudgetRecommendations,
    NegativeKeywordSuggestions,
    AutoExactPromotionSuggestions,
    PlacementRecommendations,
    LifecycleTransitions,
}

impl SinkTable {
    pub fn table_name(&self) -> &'static str {
        match self {
            SinkTable::BidRecommendations => "bid_recommendations",
            SinkTable::BudgetRecommendations => "budget_recommendations",
            SinkTable::NegativeKeywordSuggestions => "negative_keyword_suggestions",
            SinkTable::AutoExactPromotionSuggestions => "auto_exact_promotion_suggestions",
            SinkTable::PlacementRecommendations => "placement_recommendations",
            SinkTable::LifecycleTransitions => "lifecycle_transitions",
        }
    }
}

const SCHEMA_SQL: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;
PRAGMA cache_size = -32000;
PRAGMA temp_store = MEMORY;

-- Input snapshots -----------------------------------------------------------

CREATE TABLE IF NOT EXISTS keyword_metrics_60d (
    keyword_id TEXT PRIMARY KEY,
    row_json TEXT NOT NULL,
    asin TEXT NOT NULL,
    campaign_id TEXT NOT NULL,
    updated_at TEXT NOT NULL
) WITHOUT ROWID;

CREATE INDEX IF NOT EXISTS idx_keyword_metrics_asin
    ON keyword_metrics_60d(asin);

CREATE TABLE IF NOT EXISTS campaign_budget_metrics (
    campaign_id TEXT PRIMARY KEY,
    row_json TEXT NOT NULL,
    updated_at TEXT NOT NULL
) WITHOUT ROWID;

CREATE TABLE IF NOT EXISTS product_strategy (
    asin TEXT PRIMARY KEY,
    row_json TEXT NOT NULL,
    stage TEXT NOT NULL,
    strategy_pattern TEXT NOT NULL,
    updated_at TEXT NOT NULL
) WITHOUT ROWID;

CREATE TABLE IF NOT EXISTS monthly_profit_by_product (
    asin TEXT NOT NULL,
    month TEXT NOT NULL,
    row_json TEXT NOT NULL,
    PRIMARY KEY (asin, month)
) WITHOUT ROWID;

CREATE TABLE IF NOT EXISTS seo_score_by_product (
    asin TEXT NOT NULL,
    month TEXT NOT NULL,
    row_json TEXT NOT NULL,
    PRIMARY KEY (asin, month)
) WITHOUT ROWID;

CREATE TABLE IF NOT EXISTS seo_keywords_by_product (
    asin TEXT NOT NULL,
    keyword TEXT NOT NULL,
    row_json TEXT NOT NULL,
    PRIMARY KEY (asin, keyword)
) WITHOUT ROWID;

CREATE TABLE IF NOT EXISTS keyword_rank_summary (
    asin TEXT NOT NULL,
    keyword TEXT NOT NULL,
    row_json TEXT NOT NULL,
    PRIMARY KEY (asin, keyword)
) WITHOUT ROWID;

CREATE TABLE IF NOT EXISTS loss_budget_summary (
    asin TEXT PRIMARY KEY,
    row_json TEXT NOT NULL,
    updated_at TEXT NOT NULL
) WITHOUT ROWID;

CREATE TABLE IF NOT EXISTS search_term_stats (
    asin TEXT NOT NULL,
    campaign_id TEXT NOT NULL,
    ad_group_id TEXT NOT NULL,
    query TEXT NOT NULL,
    row_json TEXT NOT NULL,
    PRIMARY KEY (asin, campaign_id, ad_group_id, query)
) WITHOUT ROWID;

CREATE TABLE IF NOT EXISTS placement_metrics (
    campaign_id TEXT NOT NULL,
    slot TEXT NOT NULL,
    row_json TEXT NOT NULL,
    PRIMARY KEY (campaign_id, slot)
) WITHOUT ROWID;

CREATE TABLE IF NOT EXISTS keyword_daily_performance (
    keyword_id TEXT NOT NULL,
    date TEXT NOT NULL,
    row_json TEXT NOT NULL,
    PRIMARY KEY (keyword_id, date)
) WITHOUT ROWID;

CREATE TABLE IF NOT EXISTS asin_trial_metrics (
    asin TEXT PRIMARY KEY,
    row_json TEXT NOT NULL,
    updated_at TEXT NOT NULL
) WITHOUT ROWID;

-- Recommendation sinks ------------------------------------------------------

CREATE TABLE IF NOT EXISTS bid_recommendations (
    id TEXT PRIMARY KEY,
    execution_id TEXT NOT NULL,
    keyword_id TEXT NOT NULL,
    asin TEXT NOT NULL,
    action TEXT NOT NULL,
    reason_code TEXT NOT NULL,
    status TEXT NOT NULL,
    is_applied INTEGER NOT NULL DEFAULT 0,
    applied_at TEXT,
    apply_error TEXT,
    approved_at TEXT,
    approved_by TEXT,
    rejected_at TEXT,
    rejected_by TEXT,
    record_json TEXT NOT NULL,
    created_at TEXT NOT NULL
) WITHOUT ROWID;

CREATE INDEX IF NOT EXISTS idx_bid_recs_execution
    ON bid_recommendations(execution_id, created_at DESC);
CREATE INDEX IF NOT EXISTS idx_bid_recs_keyword_date
    ON bid_recommendations(keyword_id, created_at DESC);
CREATE INDEX IF NOT EXISTS idx_bid_recs_status
    ON bid_recommendations(status, created_at DESC);

CREATE TABLE IF NOT EXISTS budget_recommendations (
    id TEXT PRIMARY KEY,
    execution_id TEXT NOT NULL,
    campaign_id TEXT NOT NULL,
    action TEXT NOT NULL,
    reason_code TEXT NOT NULL,
    status TEXT NOT NULL,
    is_applied INTEGER NOT NULL DEFAULT 0,
    applied_at TEXT,
    apply_error TEXT,
    approved_at TEXT,
    approved_by TEXT,
    rejected_at TEXT,
    rejected_by TEXT,
    record_json TEXT NOT NULL,
    created_at TEXT NOT NULL
) WITHOUT ROWID;

CREATE INDEX IF NOT EXISTS idx_budget_recs_execution
    ON budget_recommendations(execution_id, created_at DESC);

CREATE TABLE IF NOT EXISTS negative_keyword_suggestions (
    id TEXT PRIMARY KEY,
    execution_id TEXT NOT NULL,
    asin TEXT NOT NULL,
    query TEXT NOT NULL,
    verdict TEXT NOT NULL,
    reason_code TEXT NOT NULL,
    status TEXT NOT NULL,
    is_applied INTEGER NOT NULL DEFAULT 0,
    applied_at TEXT,
    apply_error TEXT,
    approved_at TEXT,
    approved_by TEXT,
    rejected_at TEXT,
    rejected_by TEXT,
    record_json TEXT NOT NULL,
    created_at TEXT NOT NULL
) WITHOUT ROWID;

CREATE INDEX IF NOT EXISTS idx_negative_status
    ON negative_keyword_suggestions(status, created_at DESC);

CREATE TABLE IF NOT EXISTS auto_exact_promotion_suggestions (
    id TEXT PRIMARY KEY,
    execution_id TEXT NOT NULL,
    asin TEXT NOT NULL,
    query TEXT NOT NULL,
    reason_code TEXT NOT NULL,
    status TEXT NOT NULL,
    is_applied INTEGER NOT NULL DEFAULT 0,
    applied_at TEXT,
    apply_error TEXT,
    approved_at TEXT,
    approved_by TEXT,
    rejected_at TEXT,
    rejected_by TEXT,
    record_json TEXT NOT NULL,
    created_at TEXT NOT NULL
) WITHOUT ROWID;

CREATE INDEX IF NOT EXISTS idx_promotion_status
    ON auto_exact_promotion_suggestions(status, created_at DESC);

CREATE TABLE IF NOT EXISTS placement_recommendations (
    id TEXT PRIMARY KEY,
    execution_id TEXT NOT NULL,
    campaign_id TEXT NOT NULL,
    slot TEXT NOT NULL,
    action TEXT NOT NULL,
    reason_code TEXT NOT NULL,
    status TEXT NOT NULL,
    is_applied INTEGER NOT NULL DEFAULT 0,
    applied_at TEXT,
    apply_error TEXT,
    approved_at TEXT,
    approved_by TEXT,
    rejected_at TEXT,
    rejected_by TEXT,
    record_json TEXT NOT NULL,
    created_at TEXT NOT NULL
) WITHOUT ROWID;

CREATE TABLE IF NOT EXISTS lifecycle_transitions (
    id TEXT PRIMARY KEY,
    execution_id TEXT NOT NULL,
    asin TEXT NOT NULL,
    from_stage TEXT NOT NULL,
    to_stage TEXT NOT NULL,
    status TEXT NOT NULL,
    is_applied INTEGER NOT NULL DEFAULT 0,
    applied_at TEXT,
    apply_error TEXT,
    approved_at TEXT,
    approved_by TEXT,
    rejected_at TEXT,
    rejected_by TEXT,
    record_json TEXT NOT NULL,
    created_at TEXT NOT NULL
) WITHOUT ROWID;

CREATE INDEX IF NOT EXISTS idx_lifecycle_asin
    ON lifecycle_transitions(asin, created_at DESC);

-- Backtests -----------------------------------------------------------------

CREATE TABLE IF NOT EXISTS backtest_executions (
    execution_id TEXT PRIMARY KEY,
    started_at TEXT NOT NULL,
    result_json TEXT NOT NULL
) WITHOUT ROWID;

CREATE INDEX IF NOT EXISTS idx_backtest_started
    ON backtest_executions(started_at DESC);

CREATE TABLE IF NOT EXISTS backtest_daily_details (
    execution_id TEXT NOT NULL,
    period TEXT NOT NULL,
    row_json TEXT NOT NULL,
    PRIMARY KEY (execution_id, period)
) WITHOUT ROWID;

-- Apply idempotency ---------------------------------------------------------

CREATE TABLE IF NOT EXISTS apply_ledger (
    execution_id TEXT NOT NULL,
    entity_id TEXT NOT NULL,
    applied_at TEXT NOT NULL,
    PRIMARY KEY (execution_id, entity_id)
) WITHOUT ROWID;
"#;

#[derive(Clone)]
pub struct Warehouse {
    conn: Arc<Mutex<Connection>>,
}

impl Warehouse {
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("opening warehouse at {path}"))?;
        conn.execute_batch(SCHEMA_SQL)
            .context("applying warehouse schema")?;
        info!(path, "warehouse opened");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// In-memory store for tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub(crate) fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self.conn.lock();
        f(&conn)
    }

    pub(crate) fn with_conn_mut<T>(
        &self,
        f: impl FnOnce(&mut Connection) -> Result<T>,
    ) -> Result<T> {
        let mut conn = self.conn.lock();
        f(&mut conn)
    }

    /// Optimistic status transition: `UPDATE ... WHERE status = expected`.
    /// Returns whether this caller won the transition.
    pub fn update_status(
        &self,
        table: SinkTable,
        id: &str,
        expected: RecommendationStatus,
        next: RecommendationStatus,
        actor: Option<&str>,
    ) -> Result<bool> {
        let now = chrono::Utc::now().to_rfc3339();
        let (stamp_col, actor_col) = match next {
            RecommendationStatus::Approved => (Some("approved_at"), Some("approved_by")),
            RecommendationStatus::Rejected => (Some("rejected_at"), Some("rejected_by")),
            RecommendationStatus::Applied => (Some("applied_at"), None),
            RecommendationStatus::Pending => (None, None),
        };

        let mut sql = format!("UPDATE {} SET status = ?1", table.table_name());
        if let Some(col) = stamp_col {
            sql.push_str(&format!(", {col} = ?4"));
        }
        if let Some(col) = actor_col {
            sql.push_str(&format!(", {col} = ?5"));
        }
        sql.push_str(" WHERE id = ?2 AND status = ?3");

        self.with_conn(|conn| {
            let affected = match (stamp_col, actor_col) {
                (Some(_), Some(_)) => conn.execute(
                    &sql,
                    params![next.as_str(), id, expected.as_str(), now, actor.unwrap_or("system")],
                )?,
                (Some(_), None) => conn.execute(
                    &sql,
                    params![next.as_str(), id, expected.as_str(), now],
                )?,
                _ => conn.execute(&sql, params![next.as_str(), id, expected.as_str()])?,
            };
            Ok(affected == 1)
        })
    }

    /// Record the apply outcome without touching `status` (the CAS above
    /// owns that).
    pub fn mark_apply_outcome(
        &self,
        table: SinkTable,
        id: &str,
        applied: bool,
        apply_error: Option<&str>,
    ) -> Result<()> {
        let now = chrono::Utc::now().to_rfc3339();
        let sql = format!(
            "UPDATE {} SET is_applied = ?2, applied_at = ?3, apply_error = ?4 WHERE id = ?1",
            table.table_name()
        );
        self.with_conn(|conn| {
            conn.execute(
                &sql,
                params![id, applied as i64, if applied { Some(now.as_str()) } else { None }, apply_error],
            )?;
            Ok(())
        })
    }

    /// Claim an (execution, entity) pair before calling the apply sink.
    /// Returns false when the pair was already applied; retries become
    /// no-ops.
    pub fn claim_apply(&self, execution_id: &str, entity_id: &str) -> Result<bool> {
        let now = chrono::Utc::now().to_rfc3339();
        self.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO apply_ledger (execution_id, entity_id, applied_at)
                 VALUES (?1, ?2, ?3)",
                params![execution_id, entity_id, now],
            )?;
            Ok(inserted == 1)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::test_fixtures::keyword_metrics;
    use crate::models::{BidAction, BidReasonCode, BidRecommendation};
    use chrono::Utc;

    fn sample_rec(id: &str) -> BidRecommendation {
        let m = keyword_metrics();
        BidRecommendation {
            id: id.to_string(),
            execution_id: "exec-1".into(),
            keyword_id: m.keyword_id,
            keyword: m.keyword,
            campaign_id: m.campaign_id,
            ad_group_id: m.ad_group_id,
            asin: m.asin,
            action: BidAction::MildUp,
            reason_code: BidReasonCode::AcosBelowTarget,
            reason_detail: "{}".into(),
            current_bid: 80,
            recommended_bid: 86,
            change_rate: 0.075,
            clipped: false,
            clip_reason: None,
            guardrail_flags: vec![],
            status: crate::models::RecommendationStatus::Pending,
            is_applied: false,
            apply_error: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn status_cas_first_writer_wins() {
        let wh = Warehouse::open_in_memory().unwrap();
        wh.insert_bid_recommendations(&[sample_rec("r1")]).unwrap();

        let approved = wh
            .update_status(
                SinkTable::BidRecommendations,
                "r1",
                RecommendationStatus::Pending,
                RecommendationStatus::Approved,
                Some("alice"),
            )
            .unwrap();
        assert!(approved);

        // Second writer expecting PENDING loses.
        let rejected = wh
            .update_status(
                SinkTable::BidRecommendations,
                "r1",
                RecommendationStatus::Pending,
                RecommendationStatus::Rejected,
                Some("bob"),
            )
            .unwrap();
        assert!(!rejected);

        // Approved -> Applied proceeds.
        let applied = wh
            .update_status(
                SinkTable::BidRecommendations,
                "r1",
                RecommendationStatus::Approved,
                RecommendationStatus::Applied,
                None,
            )
            .unwrap();
        assert!(applied);
    }

    #[test]
    fn reopened_store_sees_persisted_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("warehouse.db");
        let path = path.to_str().unwrap();

        {
            let wh = Warehouse::open(path).unwrap();
            wh.insert_bid_recommendations(&[sample_rec("r1")]).unwrap();
        }

        let wh = Warehouse::open(path).unwrap();
        let recs = wh.list_bid_recommendations(10, 0, None).unwrap();
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].id, "r1");
    }

    #[test]
    fn apply_ledger_is_idempotent() {
        let wh = Warehouse::open_in_memory().unwrap();
        assert!(wh.claim_apply("exec-1", "kw-1").unwrap());
        assert!(!wh.claim_apply("exec-1", "kw-1").unwrap());
        assert!(wh.claim_apply("exec-2", "kw-1").unwrap());
    }

    #[test]
    fn apply_outcome_is_recorded() {
        let wh = Warehouse::open_in_memory().unwrap();
        wh.insert_bid_recommendations(&[sample_rec("r1")]).unwrap();
        wh.mark_apply_outcome(
            SinkTable::BidRecommendations,
            "r1",
            false,
            Some("platform rejected bid"),
        )
        .unwrap();

        let recs = wh.list_bid_recommendations(10, 0, None).unwrap();
        assert_eq!(recs.len(), 1);
        assert!(!recs[0].is_applied);
        assert_eq!(
            recs[0].apply_error.as_deref(),
            Some("platform rejected bid")
        );
    }
}

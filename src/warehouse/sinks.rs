//! Recommendation sink writes and admin reads.
//!
//! Each sink row stores the immutable record as JSON next to the queryable
//! columns; the status/apply columns are authoritative for the mutable
//! fields and are folded back into the record on read.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use rusqlite::params;

use crate::backtest::models::{BacktestPeriodRow, BacktestResult};
use crate::models::{
    AutoExactPromotionSuggestion, BidRecommendation, BudgetRecommendation,
    LifecycleTransitionRecord, NegativeKeywordSuggestion, PlacementRecommendation,
    RecommendationStatus,
};
use crate::warehouse::Warehouse;

/// Mutable columns folded into a deserialized record.
struct MutableColumns {
    status: Option<RecommendationStatus>,
    is_applied: bool,
    apply_error: Option<String>,
}

fn row_to_record<T>(json: &str, cols: MutableColumns) -> Result<(T, MutableColumns)>
where
    T: serde::de::DeserializeOwned,
{
    let record: T = serde_json::from_str(json).context("deserializing sink record")?;
    Ok((record, cols))
}

impl Warehouse {
    // -- bid recommendations ------------------------------------------------

    pub fn insert_bid_recommendations(&self, records: &[BidRecommendation]) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            {
                let mut stmt = tx.prepare_cached(
                    "INSERT INTO bid_recommendations
                     (id, execution_id, keyword_id, asin, action, reason_code, status,
                      is_applied, apply_error, record_json, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                )?;
                for r in records {
                    stmt.execute(params![
                        r.id,
                        r.execution_id,
                        r.keyword_id,
                        r.asin,
                        r.action.as_str(),
                        r.reason_code.as_str(),
                        r.status.as_str(),
                        r.is_applied as i64,
                        r.apply_error,
                        serde_json::to_string(r)?,
                        r.created_at.to_rfc3339(),
                    ])?;
                }
            }
            tx.commit()?;
            Ok(())
        })
    }

    pub fn list_bid_recommendations(
        &self,
        limit: usize,
        offset: usize,
        status: Option<RecommendationStatus>,
    ) -> Result<Vec<BidRecommendation>> {
        self.list_records(
            "bid_recommendations",
            limit,
            offset,
            status,
            |record: BidRecommendation, cols| BidRecommendation {
                status: cols.status.unwrap_or(record.status),
                is_applied: cols.is_applied,
                apply_error: cols.apply_error.clone(),
                ..record
            },
        )
    }

    /// Historical recommendations inside a date range, for the backtest
    /// join.
    pub fn load_bid_recommendations_in_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        asin: Option<&str>,
        campaign_id: Option<&str>,
    ) -> Result<Vec<BidRecommendation>> {
        let rows = self.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT record_json FROM bid_recommendations
                 WHERE created_at >= ?1 AND created_at < ?2
                 ORDER BY created_at ASC, id ASC",
            )?;
            let start_ts = format!("{}T00:00:00+00:00", start.format("%Y-%m-%d"));
            let end_ts = format!(
                "{}T00:00:00+00:00",
                end.succ_opt().unwrap_or(end).format("%Y-%m-%d")
            );
            let rows = stmt
                .query_map(params![start_ts, end_ts], |r| r.get::<_, String>(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })?;

        let mut records: Vec<BidRecommendation> = rows
            .into_iter()
            .map(|json| serde_json::from_str(&json).context("deserializing bid recommendation"))
            .collect::<Result<_>>()?;

        if let Some(asin) = asin {
            records.retain(|r| r.asin == asin);
        }
        if let Some(campaign_id) = campaign_id {
            records.retain(|r| r.campaign_id == campaign_id);
        }
        Ok(records)
    }

    // -- budget recommendations ---------------------------------------------

    pub fn insert_budget_recommendations(&self, records: &[BudgetRecommendation]) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            {
                let mut stmt = tx.prepare_cached(
                    "INSERT INTO budget_recommendations
                     (id, execution_id, campaign_id, action, reason_code, status,
                      is_applied, apply_error, record_json, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                )?;
                for r in records {
                    stmt.execute(params![
                        r.id,
                        r.execution_id,
                        r.campaign_id,
                        r.action.as_str(),
                        r.reason_code.as_str(),
                        r.status.as_str(),
                        r.is_applied as i64,
                        r.apply_error,
                        serde_json::to_string(r)?,
                        r.created_at.to_rfc3339(),
                    ])?;
                }
            }
            tx.commit()?;
            Ok(())
        })
    }

    pub fn list_budget_recommendations(
        &self,
        limit: usize,
        offset: usize,
        status: Option<RecommendationStatus>,
    ) -> Result<Vec<BudgetRecommendation>> {
        self.list_records(
            "budget_recommendations",
            limit,
            offset,
            status,
            |record: BudgetRecommendation, cols| BudgetRecommendation {
                status: cols.status.unwrap_or(record.status),
                is_applied: cols.is_applied,
                apply_error: cols.apply_error.clone(),
                ..record
            },
        )
    }

    // -- negative suggestions -----------------------------------------------

    pub fn insert_negative_suggestions(&self, records: &[NegativeKeywordSuggestion]) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            {
                let mut stmt = tx.prepare_cached(
                    "INSERT INTO negative_keyword_suggestions
                     (id, execution_id, asin, query, verdict, reason_code, status,
                      is_applied, apply_error, record_json, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                )?;
                for r in records {
                    stmt.execute(params![
                        r.id,
                        r.execution_id,
                        r.asin,
                        r.query,
                        r.verdict.as_str(),
                        r.reason_code.as_str(),
                        r.status.as_str(),
                        r.is_applied as i64,
                        r.apply_error,
                        serde_json::to_string(r)?,
                        r.created_at.to_rfc3339(),
                    ])?;
                }
            }
            tx.commit()?;
            Ok(())
        })
    }

    pub fn list_negative_suggestions(
        &self,
        limit: usize,
        offset: usize,
        status: Option<RecommendationStatus>,
    ) -> Result<Vec<NegativeKeywordSuggestion>> {
        self.list_records(
            "negative_keyword_suggestions",
            limit,
            offset,
            status,
            |record: NegativeKeywordSuggestion, cols| NegativeKeywordSuggestion {
                status: cols.status.unwrap_or(record.status),
                is_applied: cols.is_applied,
                apply_error: cols.apply_error.clone(),
                ..record
            },
        )
    }

    // -- promotion suggestions ----------------------------------------------

    pub fn insert_promotion_suggestions(
        &self,
        records: &[AutoExactPromotionSuggestion],
    ) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            {
                let mut stmt = tx.prepare_cached(
                    "INSERT INTO auto_exact_promotion_suggestions
                     (id, execution_id, asin, query, reason_code, status,
                      is_applied, apply_error, record_json, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                )?;
                for r in records {
                    stmt.execute(params![
                        r.id,
                        r.execution_id,
                        r.asin,
                        r.query,
                        r.reason_code.as_str(),
                        r.status.as_str(),
                        r.is_applied as i64,
                        r.apply_error,
                        serde_json::to_string(r)?,
                        r.created_at.to_rfc3339(),
                    ])?;
                }
            }
            tx.commit()?;
            Ok(())
        })
    }

    pub fn list_promotion_suggestions(
        &self,
        limit: usize,
        offset: usize,
        status: Option<RecommendationStatus>,
    ) -> Result<Vec<AutoExactPromotionSuggestion>> {
        self.list_records(
            "auto_exact_promotion_suggestions",
            limit,
            offset,
            status,
            |record: AutoExactPromotionSuggestion, cols| AutoExactPromotionSuggestion {
                status: cols.status.unwrap_or(record.status),
                is_applied: cols.is_applied,
                apply_error: cols.apply_error.clone(),
                ..record
            },
        )
    }

    // -- placement recommendations ------------------------------------------

    pub fn insert_placement_recommendations(
        &self,
        records: &[PlacementRecommendation],
    ) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            {
                let mut stmt = tx.prepare_cached(
                    "INSERT INTO placement_recommendations
                     (id, execution_id, campaign_id, slot, action, reason_code, status,
                      record_json, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                )?;
                for r in records {
                    stmt.execute(params![
                        r.id,
                        r.execution_id,
                        r.campaign_id,
                        r.slot.as_str(),
                        r.action.as_str(),
                        r.reason_code.as_str(),
                        r.status.as_str(),
                        serde_json::to_string(r)?,
                        r.created_at.to_rfc3339(),
                    ])?;
                }
            }
            tx.commit()?;
            Ok(())
        })
    }

    // -- lifecycle transitions ----------------------------------------------

    pub fn insert_lifecycle_transitions(
        &self,
        records: &[LifecycleTransitionRecord],
    ) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            {
                let mut stmt = tx.prepare_cached(
                    "INSERT INTO lifecycle_transitions
                     (id, execution_id, asin, from_stage, to_stage, status,
                      record_json, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                )?;
                for r in records {
                    stmt.execute(params![
                        r.id,
                        r.execution_id,
                        r.asin,
                        r.from_stage.as_str(),
                        r.to_stage.as_str(),
                        r.status.as_str(),
                        serde_json::to_string(r)?,
                        r.created_at.to_rfc3339(),
                    ])?;
                }
            }
            tx.commit()?;
            Ok(())
        })
    }

    pub fn list_lifecycle_transitions(
        &self,
        limit: usize,
        offset: usize,
        status: Option<RecommendationStatus>,
    ) -> Result<Vec<LifecycleTransitionRecord>> {
        self.list_records(
            "lifecycle_transitions",
            limit,
            offset,
            status,
            |record: LifecycleTransitionRecord, cols| LifecycleTransitionRecord {
                status: cols.status.unwrap_or(record.status),
                ..record
            },
        )
    }

    // -- backtests ----------------------------------------------------------

    pub fn insert_backtest_result(&self, result: &BacktestResult) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO backtest_executions (execution_id, started_at, result_json)
                 VALUES (?1, ?2, ?3)",
                params![
                    result.execution_id,
                    result.started_at.to_rfc3339(),
                    serde_json::to_string(result)?
                ],
            )?;
            {
                let mut stmt = tx.prepare_cached(
                    "INSERT INTO backtest_daily_details (execution_id, period, row_json)
                     VALUES (?1, ?2, ?3)",
                )?;
                for row in &result.series {
                    stmt.execute(params![
                        result.execution_id,
                        row.period,
                        serde_json::to_string(row)?
                    ])?;
                }
            }
            tx.commit()?;
            Ok(())
        })
    }

    /// Newest first: `(started_at DESC, execution_id DESC)` so consumers
    /// always read the latest run.
    pub fn list_backtest_executions(
        &self,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<BacktestResult>> {
        let rows = self.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT result_json FROM backtest_executions
                 ORDER BY started_at DESC, execution_id DESC LIMIT ?1 OFFSET ?2",
            )?;
            let rows = stmt
                .query_map(params![limit as i64, offset as i64], |r| {
                    r.get::<_, String>(0)
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })?;
        rows.into_iter()
            .map(|json| serde_json::from_str(&json).context("deserializing backtest result"))
            .collect()
    }

    pub fn get_backtest_execution(&self, execution_id: &str) -> Result<Option<BacktestResult>> {
        let row = self.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT result_json FROM backtest_executions WHERE execution_id = ?1",
            )?;
            let mut rows = stmt.query(params![execution_id])?;
            match rows.next()? {
                Some(r) => Ok(Some(r.get::<_, String>(0)?)),
                None => Ok(None),
            }
        })?;
        row.map(|json| serde_json::from_str(&json).context("deserializing backtest result"))
            .transpose()
    }

    pub fn load_backtest_details(&self, execution_id: &str) -> Result<Vec<BacktestPeriodRow>> {
        let rows = self.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT row_json FROM backtest_daily_details
                 WHERE execution_id = ?1 ORDER BY period",
            )?;
            let rows = stmt
                .query_map(params![execution_id], |r| r.get::<_, String>(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })?;
        rows.into_iter()
            .map(|json| serde_json::from_str(&json).context("deserializing backtest detail"))
            .collect()
    }

    // -- shared list plumbing -----------------------------------------------

    fn list_records<T, F>(
        &self,
        table: &str,
        limit: usize,
        offset: usize,
        status: Option<RecommendationStatus>,
        fold: F,
    ) -> Result<Vec<T>>
    where
        T: serde::de::DeserializeOwned,
        F: Fn(T, &MutableColumns) -> T,
    {
        let rows: Vec<(String, String, i64, Option<String>)> = self.with_conn(|conn| {
            let sql = match status {
                Some(_) => format!(
                    "SELECT record_json, status, is_applied, apply_error FROM {table}
                     WHERE status = ?3
                     ORDER BY created_at DESC, id DESC LIMIT ?1 OFFSET ?2"
                ),
                None => format!(
                    "SELECT record_json, status, is_applied, apply_error FROM {table}
                     ORDER BY created_at DESC, id DESC LIMIT ?1 OFFSET ?2"
                ),
            };
            let mut stmt = conn.prepare(&sql)?;
            let map_row = |r: &rusqlite::Row<'_>| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, i64>(2)?,
                    r.get::<_, Option<String>>(3)?,
                ))
            };
            let rows = match status {
                Some(st) => stmt
                    .query_map(params![limit as i64, offset as i64, st.as_str()], map_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?,
                None => stmt
                    .query_map(params![limit as i64, offset as i64], map_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?,
            };
            Ok(rows)
        })?;

        rows.into_iter()
            .map(|(json, status, is_applied, apply_error)| {
                let cols = MutableColumns {
                    status: RecommendationStatus::parse(&status),
                    is_applied: is_applied != 0,
                    apply_error,
                };
                row_to_record::<T>(&json, cols).map(|(record, cols)| fold(record, &cols))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backtest::models::{
        BacktestImprovement, BacktestMetadata, BacktestParams, BacktestTotals, DecisionAccuracy,
    };
    use crate::models::test_fixtures::keyword_metrics;
    use crate::models::{BidAction, BidReasonCode};
    use chrono::{NaiveDate, Utc};

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
            status: RecommendationStatus::Pending,
            is_applied: false,
            apply_error: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn pagination_and_status_filter() {
        let wh = Warehouse::open_in_memory().unwrap();
        let recs: Vec<_> = (0..5).map(|i| sample_rec(&format!("r{i}"))).collect();
        wh.insert_bid_recommendations(&recs).unwrap();

        let page = wh.list_bid_recommendations(2, 0, None).unwrap();
        assert_eq!(page.len(), 2);
        let page2 = wh.list_bid_recommendations(2, 4, None).unwrap();
        assert_eq!(page2.len(), 1);

        wh.update_status(
            crate::warehouse::SinkTable::BidRecommendations,
            "r3",
            RecommendationStatus::Pending,
            RecommendationStatus::Approved,
            Some("ops"),
        )
        .unwrap();
        let approved = wh
            .list_bid_recommendations(10, 0, Some(RecommendationStatus::Approved))
            .unwrap();
        assert_eq!(approved.len(), 1);
        assert_eq!(approved[0].id, "r3");
        assert_eq!(approved[0].status, RecommendationStatus::Approved);
    }

    #[test]
    fn backtest_round_trip() {
        let wh = Warehouse::open_in_memory().unwrap();
        let result = BacktestResult {
            execution_id: "bt-1".into(),
            params: BacktestParams::new(
                NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
                NaiveDate::from_ymd_opt(2025, 6, 30).unwrap(),
            ),
            actual: BacktestTotals::default(),
            simulated: BacktestTotals::default(),
            improvement: BacktestImprovement::default(),
            accuracy: DecisionAccuracy::default(),
            series: vec![BacktestPeriodRow {
                period: "2025-06-02".into(),
                matched_rows: 3,
                actual_spend_jpy: 100.0,
                actual_sales_jpy: 400.0,
                simulated_spend_jpy: 90.0,
                simulated_sales_jpy: 380.0,
            }],
            metadata: BacktestMetadata {
                duration_ms: 5,
                recommendation_count: 3,
                performance_row_count: 3,
                matched_rows: 3,
                unmatched_recommendations: 0,
            },
            started_at: Utc::now(),
        };
        wh.insert_backtest_result(&result).unwrap();

        let listed = wh.list_backtest_executions(10, 0).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].execution_id, "bt-1");

        let fetched = wh.get_backtest_execution("bt-1").unwrap().unwrap();
        assert_eq!(fetched.metadata.matched_rows, 3);
        assert!(wh.get_backtest_execution("missing").unwrap().is_none());

        let details = wh.load_backtest_details("bt-1").unwrap();
        assert_eq!(details.len(), 1);
        assert_eq!(details[0].matched_rows, 3);
    }

    #[test]
    fn range_load_filters_by_date_and_keys() {
        let wh = Warehouse::open_in_memory().unwrap();
        let mut inside = sample_rec("in-range");
        inside.created_at = chrono::DateTime::parse_from_rfc3339("2025-06-02T10:00:00+00:00")
            .unwrap()
            .with_timezone(&chrono::Utc);
        let mut outside = sample_rec("out-of-range");
        outside.created_at = chrono::DateTime::parse_from_rfc3339("2025-07-10T10:00:00+00:00")
            .unwrap()
            .with_timezone(&chrono::Utc);
        wh.insert_bid_recommendations(&[inside, outside]).unwrap();

        let start = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2025, 6, 30).unwrap();
        let loaded = wh
            .load_bid_recommendations_in_range(start, end, None, None)
            .unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id, "in-range");

        let filtered = wh
            .load_bid_recommendations_in_range(start, end, Some("B0OTHER"), None)
            .unwrap();
        assert!(filtered.is_empty());
    }
}

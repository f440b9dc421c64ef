//! Input-snapshot reads and upserts.
//!
//! Input tables hold one JSON row per natural key. Upserts come from the
//! ingestion jobs (and tests); the orchestrator only reads.

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use rusqlite::params;

use crate::lifecycle::launch_exit::LaunchTrialMetrics;
use crate::models::{
    BudgetMetrics, CoreKeywordConfig, KeywordDailyPerformance, KeywordMetrics, KeywordRankSummary,
    LifecycleStage, LossBudgetSummary, MonthlyProfit, PlacementMetrics, ProductStrategy,
    SearchTermStat, SeoScore,
};
use crate::warehouse::Warehouse;

fn parse_rows<T: serde::de::DeserializeOwned>(rows: Vec<String>) -> Result<Vec<T>> {
    rows.into_iter()
        .map(|json| serde_json::from_str(&json).context("deserializing warehouse row"))
        .collect()
}

impl Warehouse {
    // -- keyword metrics ----------------------------------------------------

    pub fn upsert_keyword_metrics(&self, rows: &[KeywordMetrics]) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            {
                let mut stmt = tx.prepare_cached(
                    "INSERT OR REPLACE INTO keyword_metrics_60d
                     (keyword_id, row_json, asin, campaign_id, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                )?;
                for row in rows {
                    stmt.execute(params![
                        row.keyword_id,
                        serde_json::to_string(row)?,
                        row.asin,
                        row.campaign_id,
                        now
                    ])?;
                }
            }
            tx.commit()?;
            Ok(())
        })
    }

    pub fn load_keyword_metrics(&self) -> Result<Vec<KeywordMetrics>> {
        let rows = self.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT row_json FROM keyword_metrics_60d ORDER BY keyword_id",
            )?;
            let rows = stmt
                .query_map([], |r| r.get::<_, String>(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })?;
        parse_rows(rows)
    }

    // -- budget metrics -----------------------------------------------------

    pub fn upsert_budget_metrics(&self, rows: &[BudgetMetrics]) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            {
                let mut stmt = tx.prepare_cached(
                    "INSERT OR REPLACE INTO campaign_budget_metrics
                     (campaign_id, row_json, updated_at) VALUES (?1, ?2, ?3)",
                )?;
                for row in rows {
                    stmt.execute(params![row.campaign_id, serde_json::to_string(row)?, now])?;
                }
            }
            tx.commit()?;
            Ok(())
        })
    }

    pub fn load_budget_metrics(&self) -> Result<Vec<BudgetMetrics>> {
        let rows = self.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT row_json FROM campaign_budget_metrics ORDER BY campaign_id",
            )?;
            let rows = stmt
                .query_map([], |r| r.get::<_, String>(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })?;
        parse_rows(rows)
    }

    // -- product strategy ---------------------------------------------------

    pub fn upsert_product_strategies(&self, rows: &[ProductStrategy]) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            {
                let mut stmt = tx.prepare_cached(
                    "INSERT OR REPLACE INTO product_strategy
                     (asin, row_json, stage, strategy_pattern, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                )?;
                for row in rows {
                    stmt.execute(params![
                        row.asin,
                        serde_json::to_string(row)?,
                        row.stage.as_str(),
                        row.strategy_pattern,
                        now
                    ])?;
                }
            }
            tx.commit()?;
            Ok(())
        })
    }

    pub fn load_product_strategies(&self) -> Result<Vec<ProductStrategy>> {
        let rows = self.with_conn(|conn| {
            let mut stmt =
                conn.prepare_cached("SELECT row_json FROM product_strategy ORDER BY asin")?;
            let rows = stmt
                .query_map([], |r| r.get::<_, String>(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })?;
        parse_rows(rows)
    }

    /// Stage update applied by the lifecycle flow. Keeps the stage column
    /// and the strategy-pattern mirror in lockstep with the JSON row.
    pub fn update_product_stage(&self, asin: &str, stage: LifecycleStage) -> Result<bool> {
        let strategies = self.load_product_strategies()?;
        let Some(mut strategy) = strategies.into_iter().find(|s| s.asin == asin) else {
            return Ok(false);
        };
        strategy.stage = stage;
        strategy.strategy_pattern = stage.pattern();
        self.upsert_product_strategies(&[strategy])?;
        Ok(true)
    }

    // -- monthly profit -----------------------------------------------------

    pub fn upsert_monthly_profits(&self, rows: &[MonthlyProfit]) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            {
                let mut stmt = tx.prepare_cached(
                    "INSERT OR REPLACE INTO monthly_profit_by_product
                     (asin, month, row_json) VALUES (?1, ?2, ?3)",
                )?;
                for row in rows {
                    stmt.execute(params![row.asin, row.month, serde_json::to_string(row)?])?;
                }
            }
            tx.commit()?;
            Ok(())
        })
    }

    /// All months for one ASIN, ascending.
    pub fn load_monthly_profits(&self, asin: &str) -> Result<Vec<MonthlyProfit>> {
        let rows = self.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT row_json FROM monthly_profit_by_product
                 WHERE asin = ?1 ORDER BY month ASC",
            )?;
            let rows = stmt
                .query_map(params![asin], |r| r.get::<_, String>(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })?;
        parse_rows(rows)
    }

    // -- SEO scores ---------------------------------------------------------

    pub fn upsert_seo_scores(&self, rows: &[SeoScore]) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            {
                let mut stmt = tx.prepare_cached(
                    "INSERT OR REPLACE INTO seo_score_by_product
                     (asin, month, row_json) VALUES (?1, ?2, ?3)",
                )?;
                for row in rows {
                    stmt.execute(params![row.asin, row.month, serde_json::to_string(row)?])?;
                }
            }
            tx.commit()?;
            Ok(())
        })
    }

    /// Latest month per ASIN.
    pub fn load_latest_seo_score(&self, asin: &str) -> Result<Option<SeoScore>> {
        let row = self.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT row_json FROM seo_score_by_product
                 WHERE asin = ?1 ORDER BY month DESC LIMIT 1",
            )?;
            let mut rows = stmt.query(params![asin])?;
            match rows.next()? {
                Some(r) => Ok(Some(r.get::<_, String>(0)?)),
                None => Ok(None),
            }
        })?;
        row.map(|json| serde_json::from_str(&json).context("deserializing seo score"))
            .transpose()
    }

    // -- core keywords & rank summaries -------------------------------------

    pub fn upsert_core_keywords(&self, rows: &[CoreKeywordConfig]) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            {
                let mut stmt = tx.prepare_cached(
                    "INSERT OR REPLACE INTO seo_keywords_by_product
                     (asin, keyword, row_json) VALUES (?1, ?2, ?3)",
                )?;
                for row in rows {
                    stmt.execute(params![row.asin, row.keyword, serde_json::to_string(row)?])?;
                }
            }
            tx.commit()?;
            Ok(())
        })
    }

    pub fn load_core_keywords(&self, asin: &str) -> Result<Vec<CoreKeywordConfig>> {
        let rows = self.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT row_json FROM seo_keywords_by_product
                 WHERE asin = ?1 ORDER BY keyword",
            )?;
            let rows = stmt
                .query_map(params![asin], |r| r.get::<_, String>(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })?;
        parse_rows(rows)
    }

    pub fn upsert_rank_summaries(&self, rows: &[KeywordRankSummary]) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            {
                let mut stmt = tx.prepare_cached(
                    "INSERT OR REPLACE INTO keyword_rank_summary
                     (asin, keyword, row_json) VALUES (?1, ?2, ?3)",
                )?;
                for row in rows {
                    stmt.execute(params![row.asin, row.keyword, serde_json::to_string(row)?])?;
                }
            }
            tx.commit()?;
            Ok(())
        })
    }

    pub fn load_rank_summaries(&self, asin: &str) -> Result<Vec<KeywordRankSummary>> {
        let rows = self.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT row_json FROM keyword_rank_summary WHERE asin = ?1 ORDER BY keyword",
            )?;
            let rows = stmt
                .query_map(params![asin], |r| r.get::<_, String>(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })?;
        parse_rows(rows)
    }

    // -- loss budget & trial metrics ----------------------------------------

    pub fn upsert_loss_budgets(&self, rows: &[LossBudgetSummary]) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            {
                let mut stmt = tx.prepare_cached(
                    "INSERT OR REPLACE INTO loss_budget_summary
                     (asin, row_json, updated_at) VALUES (?1, ?2, ?3)",
                )?;
                for row in rows {
                    stmt.execute(params![row.asin, serde_json::to_string(row)?, now])?;
                }
            }
            tx.commit()?;
            Ok(())
        })
    }

    pub fn load_loss_budgets(&self) -> Result<Vec<LossBudgetSummary>> {
        let rows = self.with_conn(|conn| {
            let mut stmt =
                conn.prepare_cached("SELECT row_json FROM loss_budget_summary ORDER BY asin")?;
            let rows = stmt
                .query_map([], |r| r.get::<_, String>(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })?;
        parse_rows(rows)
    }

    pub fn upsert_trial_metrics(&self, asin: &str, row: &LaunchTrialMetrics) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO asin_trial_metrics (asin, row_json, updated_at)
                 VALUES (?1, ?2, ?3)",
                params![asin, serde_json::to_string(row)?, now],
            )?;
            Ok(())
        })
    }

    pub fn load_trial_metrics(&self, asin: &str) -> Result<Option<LaunchTrialMetrics>> {
        let row = self.with_conn(|conn| {
            let mut stmt = conn
                .prepare_cached("SELECT row_json FROM asin_trial_metrics WHERE asin = ?1")?;
            let mut rows = stmt.query(params![asin])?;
            match rows.next()? {
                Some(r) => Ok(Some(r.get::<_, String>(0)?)),
                None => Ok(None),
            }
        })?;
        row.map(|json| serde_json::from_str(&json).context("deserializing trial metrics"))
            .transpose()
    }

    // -- search terms & placements ------------------------------------------

    pub fn upsert_search_terms(&self, rows: &[SearchTermStat]) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            {
                let mut stmt = tx.prepare_cached(
                    "INSERT OR REPLACE INTO search_term_stats
                     (asin, campaign_id, ad_group_id, query, row_json)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                )?;
                for row in rows {
                    stmt.execute(params![
                        row.asin,
                        row.campaign_id,
                        row.ad_group_id,
                        row.query,
                        serde_json::to_string(row)?
                    ])?;
                }
            }
            tx.commit()?;
            Ok(())
        })
    }

    pub fn load_search_terms(&self) -> Result<Vec<SearchTermStat>> {
        let rows = self.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT row_json FROM search_term_stats ORDER BY asin, query",
            )?;
            let rows = stmt
                .query_map([], |r| r.get::<_, String>(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })?;
        parse_rows(rows)
    }

    pub fn upsert_placement_metrics(&self, rows: &[PlacementMetrics]) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            {
                let mut stmt = tx.prepare_cached(
                    "INSERT OR REPLACE INTO placement_metrics
                     (campaign_id, slot, row_json) VALUES (?1, ?2, ?3)",
                )?;
                for row in rows {
                    stmt.execute(params![
                        row.campaign_id,
                        row.slot.as_str(),
                        serde_json::to_string(row)?
                    ])?;
                }
            }
            tx.commit()?;
            Ok(())
        })
    }

    pub fn load_placement_metrics(&self) -> Result<Vec<PlacementMetrics>> {
        let rows = self.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT row_json FROM placement_metrics ORDER BY campaign_id, slot",
            )?;
            let rows = stmt
                .query_map([], |r| r.get::<_, String>(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })?;
        parse_rows(rows)
    }

    // -- daily performance (backtest input) ---------------------------------

    pub fn upsert_daily_performance(&self, rows: &[KeywordDailyPerformance]) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            {
                let mut stmt = tx.prepare_cached(
                    "INSERT OR REPLACE INTO keyword_daily_performance
                     (keyword_id, date, row_json) VALUES (?1, ?2, ?3)",
                )?;
                for row in rows {
                    stmt.execute(params![
                        row.keyword_id,
                        row.date.format("%Y-%m-%d").to_string(),
                        serde_json::to_string(row)?
                    ])?;
                }
            }
            tx.commit()?;
            Ok(())
        })
    }

    pub fn load_daily_performance(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<KeywordDailyPerformance>> {
        let rows = self.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT row_json FROM keyword_daily_performance
                 WHERE date >= ?1 AND date <= ?2 ORDER BY keyword_id, date",
            )?;
            let rows = stmt
                .query_map(
                    params![
                        start.format("%Y-%m-%d").to_string(),
                        end.format("%Y-%m-%d").to_string()
                    ],
                    |r| r.get::<_, String>(0),
                )?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })?;
        parse_rows(rows)
    }
}

//! Engine orchestration.
//!
//! One run = assign an execution id, load the required snapshots
//! concurrently, hand them to a pure engine, stamp and persist the outputs
//! in one append, optionally stream records to the apply sink (per-record
//! error capture, idempotent by (execution_id, entity_id)), then notify.
//! SHADOW mode never reaches the apply sink; `dry_run` skips persistence
//! and apply but still computes every decision.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tokio::task::spawn_blocking;
use tokio::time::timeout;
use tracing::{info, warn};
use uuid::Uuid;

use crate::apply::{ApplySink, NegativeMatchType};
use crate::backtest::models::{BacktestParams, BacktestResult};
use crate::backtest::BacktestEngine;
use crate::bid::{BidEngine, BidEngineConfig};
use crate::budget::{BudgetConfig, BudgetEngine};
use crate::lifecycle::launch_exit::{self, LaunchTrialMetrics};
use crate::lifecycle::seo_launch;
use crate::lifecycle::state_machine::{self, LifecycleInput};
use crate::lifecycle::{LaunchExitConfig, LifecycleConfig, SeoLaunchConfig};
use crate::models::{
    BidAction, Config, EngineMode, ExecutionMode, LifecycleTransitionRecord, LossBudgetSummary,
    NegativeVerdict, ProductStrategy, RecommendationStatus,
};
use crate::negatives::{
    IntentTagger, IntentTaggerConfig, NegativeJudgeConfig, NegativeJudger, WhitelistConfig,
    WhitelistRegistry,
};
use crate::notify::{Notifier, RunSummary};
use crate::placement::{PlacementConfig, PlacementEngine};
use crate::promotion::{PromotionConfig, PromotionEngine};
use crate::warehouse::{SinkTable, Warehouse};

/// Cooperative cancellation flag, checked at batch boundaries. Cloning is
/// cheap; all clones observe the same flag.
#[derive(Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    fn bail_if_cancelled(&self) -> Result<()> {
        anyhow::ensure!(!self.is_cancelled(), "run cancelled");
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    pub dry_run: bool,
}

/// Engine calibration bundle, built once at startup and passed explicitly.
#[derive(Debug, Clone, Default)]
pub struct EngineConfigs {
    pub bid: BidEngineConfig,
    pub budget: BudgetConfig,
    pub seo_launch: SeoLaunchConfig,
    pub launch_exit: LaunchExitConfig,
    pub lifecycle: LifecycleConfig,
    pub negatives: NegativeJudgeConfig,
    pub intents: IntentTaggerConfig,
    pub whitelist: WhitelistConfig,
    pub promotion: PromotionConfig,
    pub placement: PlacementConfig,
}

pub struct Orchestrator {
    config: Config,
    engines: EngineConfigs,
    warehouse: Warehouse,
    apply_sink: Arc<dyn ApplySink>,
    notifier: Arc<dyn Notifier>,
}

impl Orchestrator {
    pub fn new(
        config: Config,
        engines: EngineConfigs,
        warehouse: Warehouse,
        apply_sink: Arc<dyn ApplySink>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            config,
            engines,
            warehouse,
            apply_sink,
            notifier,
        }
    }

    pub fn warehouse(&self) -> &Warehouse {
        &self.warehouse
    }

    fn new_execution_id() -> String {
        Uuid::new_v4().to_string()
    }

    fn io_deadline(&self) -> Duration {
        Duration::from_secs(self.config.warehouse_timeout_secs)
    }

    /// Run a blocking warehouse load on the blocking pool under the I/O
    /// deadline.
    async fn load<T, F>(&self, what: &'static str, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(Warehouse) -> Result<T> + Send + 'static,
    {
        let wh = self.warehouse.clone();
        let task = spawn_blocking(move || f(wh));
        timeout(self.io_deadline(), task)
            .await
            .with_context(|| format!("warehouse load timed out: {what}"))?
            .with_context(|| format!("warehouse load panicked: {what}"))?
    }

    // -- bid engine ---------------------------------------------------------

    pub async fn run_bid_engine(
        &self,
        mode: EngineMode,
        opts: RunOptions,
        cancel: CancelToken,
    ) -> Result<RunSummary> {
        let execution_id = Self::new_execution_id();
        let started = Instant::now();
        let mut summary = RunSummary::new(&execution_id, "bid", opts.dry_run);

        // Independent loads fan out and join before the engine runs.
        let (metrics, strategies, loss_budgets) = tokio::try_join!(
            self.load("keyword metrics", |wh| wh.load_keyword_metrics()),
            self.load("product strategies", |wh| wh.load_product_strategies()),
            self.load("loss budgets", |wh| wh.load_loss_budgets()),
        )?;
        cancel.bail_if_cancelled()?;

        if metrics.is_empty() {
            warn!(execution_id = %execution_id, "no keyword metrics loaded, empty run");
        }

        let strategy_map: HashMap<String, ProductStrategy> = strategies
            .into_iter()
            .map(|s| (s.asin.clone(), s))
            .collect();
        let loss_map: HashMap<String, LossBudgetSummary> = loss_budgets
            .into_iter()
            .map(|l| (l.asin.clone(), l))
            .collect();

        let engine = BidEngine::new(self.engines.bid.clone());
        let recommendations = engine.run(&execution_id, &metrics, &strategy_map, &loss_map, mode);

        for rec in &recommendations {
            summary.count_action(rec.action.as_str());
            if rec.reason_code == crate::models::BidReasonCode::Error {
                summary.error_records += 1;
            }
        }

        if !opts.dry_run {
            let to_persist = recommendations.clone();
            self.load("persist bid recommendations", move |wh| {
                wh.insert_bid_recommendations(&to_persist)
            })
            .await?;

            if self.config.execution_mode == ExecutionMode::Apply {
                for rec in &recommendations {
                    cancel.bail_if_cancelled()?;
                    if rec.action == BidAction::Keep {
                        continue;
                    }
                    if !self.warehouse.claim_apply(&execution_id, &rec.keyword_id)? {
                        continue;
                    }
                    match self
                        .apply_sink
                        .set_bid(&rec.keyword_id, rec.recommended_bid)
                        .await
                    {
                        Ok(()) => {
                            summary.applied_records += 1;
                            self.warehouse.mark_apply_outcome(
                                SinkTable::BidRecommendations,
                                &rec.id,
                                true,
                                None,
                            )?;
                            self.warehouse.update_status(
                                SinkTable::BidRecommendations,
                                &rec.id,
                                RecommendationStatus::Pending,
                                RecommendationStatus::Applied,
                                None,
                            )?;
                        }
                        Err(err) => {
                            summary.apply_errors += 1;
                            self.warehouse.mark_apply_outcome(
                                SinkTable::BidRecommendations,
                                &rec.id,
                                false,
                                Some(&err.to_string()),
                            )?;
                        }
                    }
                }
            }
        }

        summary.duration_ms = started.elapsed().as_millis() as u64;
        self.notifier.notify(&summary).await;
        Ok(summary)
    }

    // -- budget engine ------------------------------------------------------

    pub async fn run_budget_optimization(
        &self,
        opts: RunOptions,
        cancel: CancelToken,
    ) -> Result<RunSummary> {
        let execution_id = Self::new_execution_id();
        let started = Instant::now();
        let mut summary = RunSummary::new(&execution_id, "budget", opts.dry_run);

        let metrics = self
            .load("budget metrics", |wh| wh.load_budget_metrics())
            .await?;
        cancel.bail_if_cancelled()?;

        let engine = BudgetEngine::new(self.engines.budget.clone());
        let recommendations = engine.run(&execution_id, &metrics);

        for rec in &recommendations {
            summary.count_action(rec.action.as_str());
        }

        if !opts.dry_run {
            let to_persist = recommendations.clone();
            self.load("persist budget recommendations", move |wh| {
                wh.insert_budget_recommendations(&to_persist)
            })
            .await?;

            if self.config.execution_mode == ExecutionMode::Apply {
                for rec in &recommendations {
                    cancel.bail_if_cancelled()?;
                    if rec.recommended_budget == rec.current_budget {
                        continue;
                    }
                    if !self
                        .warehouse
                        .claim_apply(&execution_id, &rec.campaign_id)?
                    {
                        continue;
                    }
                    match self
                        .apply_sink
                        .set_budget(&rec.campaign_id, rec.recommended_budget)
                        .await
                    {
                        Ok(()) => {
                            summary.applied_records += 1;
                            self.warehouse.mark_apply_outcome(
                                SinkTable::BudgetRecommendations,
                                &rec.id,
                                true,
                                None,
                            )?;
                            self.warehouse.update_status(
                                SinkTable::BudgetRecommendations,
                                &rec.id,
                                RecommendationStatus::Pending,
                                RecommendationStatus::Applied,
                                None,
                            )?;
                        }
                        Err(err) => {
                            summary.apply_errors += 1;
                            self.warehouse.mark_apply_outcome(
                                SinkTable::BudgetRecommendations,
                                &rec.id,
                                false,
                                Some(&err.to_string()),
                            )?;
                        }
                    }
                }
            }
        }

        summary.duration_ms = started.elapsed().as_millis() as u64;
        self.notifier.notify(&summary).await;
        Ok(summary)
    }

    // -- lifecycle ----------------------------------------------------------

    /// Evaluate every product. With `update_stages` the accepted transitions
    /// are written back to the strategy table (the /lifecycle/update flow);
    /// without it the run only records suggestions.
    pub async fn run_lifecycle(
        &self,
        update_stages: bool,
        opts: RunOptions,
        cancel: CancelToken,
    ) -> Result<(RunSummary, Vec<state_machine::LifecycleDecision>)> {
        let execution_id = Self::new_execution_id();
        let started = Instant::now();
        let mut summary = RunSummary::new(&execution_id, "lifecycle", opts.dry_run);

        let (strategies, loss_budgets) = tokio::try_join!(
            self.load("product strategies", |wh| wh.load_product_strategies()),
            self.load("loss budgets", |wh| wh.load_loss_budgets()),
        )?;
        let loss_map: HashMap<String, LossBudgetSummary> = loss_budgets
            .into_iter()
            .map(|l| (l.asin.clone(), l))
            .collect();

        let mut records = Vec::new();
        let mut decisions = Vec::new();

        for strategy in &strategies {
            cancel.bail_if_cancelled()?;
            let asin = strategy.asin.clone();

            let (profits, seo, core_keywords, rank_summaries, trial) = tokio::try_join!(
                self.load("monthly profits", {
                    let asin = asin.clone();
                    move |wh| wh.load_monthly_profits(&asin)
                }),
                self.load("seo score", {
                    let asin = asin.clone();
                    move |wh| wh.load_latest_seo_score(&asin)
                }),
                self.load("core keywords", {
                    let asin = asin.clone();
                    move |wh| wh.load_core_keywords(&asin)
                }),
                self.load("rank summaries", {
                    let asin = asin.clone();
                    move |wh| wh.load_rank_summaries(&asin)
                }),
                self.load("trial metrics", {
                    let asin = asin.clone();
                    move |wh| wh.load_trial_metrics(&asin)
                }),
            )?;

            // Launch-exit evaluation only applies to launching products
            // with a loss budget on file.
            let launch_exit_decision = if strategy.stage.is_launch() {
                loss_map.get(&asin).map(|loss| {
                    let summaries = rank_summaries
                        .into_iter()
                        .map(|s| (s.keyword.clone(), s))
                        .collect();
                    let (progress, _) = seo_launch::evaluate_asin(
                        &self.engines.seo_launch,
                        &asin,
                        &core_keywords,
                        &summaries,
                        strategy.target_cpa_jpy(),
                    );
                    let trial = trial.unwrap_or(LaunchTrialMetrics {
                        days_since_launch: 0,
                        asin_clicks_total: 0,
                        asin_orders_total: 0,
                        avg_daily_sales_30d: 0.0,
                    });
                    launch_exit::decide(&self.engines.launch_exit, &progress, loss, &trial)
                })
            } else {
                None
            };

            let decision = state_machine::evaluate(
                &self.engines.lifecycle,
                &LifecycleInput {
                    strategy,
                    profits: &profits,
                    seo: seo.as_ref(),
                    launch_exit: launch_exit_decision.as_ref(),
                },
            );

            summary.count_action(if decision.should_transition {
                "TRANSITION"
            } else {
                "HOLD"
            });

            records.push(LifecycleTransitionRecord {
                id: Uuid::new_v4().to_string(),
                execution_id: execution_id.clone(),
                asin: asin.clone(),
                from_stage: decision.current_stage,
                to_stage: decision.recommended_stage,
                should_transition: decision.should_transition,
                reason: decision.reason.clone(),
                is_emergency_exit: decision.is_emergency_exit,
                force_harvest: decision.force_harvest,
                extension_granted: decision
                    .extension
                    .as_ref()
                    .map(|e| e.extend)
                    .unwrap_or(false),
                warnings: decision.warnings.clone(),
                status: RecommendationStatus::Pending,
                created_at: chrono::Utc::now(),
            });
            decisions.push(decision);
        }

        if !opts.dry_run {
            let to_persist = records.clone();
            self.load("persist lifecycle transitions", move |wh| {
                wh.insert_lifecycle_transitions(&to_persist)
            })
            .await?;

            if update_stages {
                for decision in &decisions {
                    if decision.should_transition {
                        let asin = decision.asin.clone();
                        let stage = decision.recommended_stage;
                        let updated = self
                            .load("update product stage", move |wh| {
                                wh.update_product_stage(&asin, stage)
                            })
                            .await?;
                        if updated {
                            summary.applied_records += 1;
                        }
                    }
                }
            }
        }

        summary.duration_ms = started.elapsed().as_millis() as u64;
        self.notifier.notify(&summary).await;
        Ok((summary, decisions))
    }

    // -- negatives ----------------------------------------------------------

    pub async fn run_negative_mining(
        &self,
        opts: RunOptions,
        cancel: CancelToken,
    ) -> Result<RunSummary> {
        let execution_id = Self::new_execution_id();
        let started = Instant::now();
        let mut summary = RunSummary::new(&execution_id, "negatives", opts.dry_run);

        let (terms, metrics) = tokio::try_join!(
            self.load("search terms", |wh| wh.load_search_terms()),
            self.load("keyword metrics", |wh| wh.load_keyword_metrics()),
        )?;
        cancel.bail_if_cancelled()?;

        // Account-level CVR baselines per ASIN from the 60d window.
        let mut clicks_by_asin: HashMap<String, (u64, u64)> = HashMap::new();
        for m in &metrics {
            let entry = clicks_by_asin.entry(m.asin.clone()).or_insert((0, 0));
            entry.0 += m.clicks_60d;
            entry.1 += m.orders_60d;
        }
        let baselines: HashMap<String, f64> = clicks_by_asin
            .into_iter()
            .map(|(asin, (clicks, orders))| {
                let cvr = if clicks > 0 {
                    orders as f64 / clicks as f64
                } else {
                    0.0
                };
                (asin, cvr)
            })
            .collect();

        let tagger = IntentTagger::new(&self.engines.intents);
        let whitelist = WhitelistRegistry::build(&self.engines.whitelist, &terms);
        let judger = NegativeJudger::new(self.engines.negatives.clone());
        let suggestions = judger.run(&execution_id, &terms, &tagger, &whitelist, &baselines);

        for s in &suggestions {
            summary.count_action(s.verdict.as_str());
        }

        if !opts.dry_run {
            let to_persist = suggestions.clone();
            self.load("persist negative suggestions", move |wh| {
                wh.insert_negative_suggestions(&to_persist)
            })
            .await?;

            // Auto-apply only behind its own env gate, and only STOP
            // verdicts become negatives.
            if self.config.execution_mode == ExecutionMode::Apply
                && self.config.negative_apply_enabled
            {
                for s in &suggestions {
                    cancel.bail_if_cancelled()?;
                    if s.verdict != NegativeVerdict::Stop {
                        continue;
                    }
                    let entity = format!("{}::{}", s.ad_group_id, s.query);
                    if !self.warehouse.claim_apply(&execution_id, &entity)? {
                        continue;
                    }
                    match self
                        .apply_sink
                        .add_negative(
                            &s.campaign_id,
                            &s.ad_group_id,
                            &s.query,
                            NegativeMatchType::NegativeExact,
                        )
                        .await
                    {
                        Ok(()) => {
                            summary.applied_records += 1;
                            self.warehouse.mark_apply_outcome(
                                SinkTable::NegativeKeywordSuggestions,
                                &s.id,
                                true,
                                None,
                            )?;
                            self.warehouse.update_status(
                                SinkTable::NegativeKeywordSuggestions,
                                &s.id,
                                RecommendationStatus::Pending,
                                RecommendationStatus::Applied,
                                None,
                            )?;
                        }
                        Err(err) => {
                            summary.apply_errors += 1;
                            self.warehouse.mark_apply_outcome(
                                SinkTable::NegativeKeywordSuggestions,
                                &s.id,
                                false,
                                Some(&err.to_string()),
                            )?;
                        }
                    }
                }
            }
        }

        summary.duration_ms = started.elapsed().as_millis() as u64;
        self.notifier.notify(&summary).await;
        Ok(summary)
    }

    // -- auto-exact promotion / keyword discovery ---------------------------

    pub async fn run_auto_exact(
        &self,
        discovery: bool,
        opts: RunOptions,
        cancel: CancelToken,
    ) -> Result<RunSummary> {
        let execution_id = Self::new_execution_id();
        let started = Instant::now();
        let engine_name = if discovery { "keyword-discovery" } else { "auto-exact" };
        let mut summary = RunSummary::new(&execution_id, engine_name, opts.dry_run);

        let terms = self
            .load("search terms", |wh| wh.load_search_terms())
            .await?;
        cancel.bail_if_cancelled()?;

        let tagger = IntentTagger::new(&self.engines.intents);
        let engine = PromotionEngine::new(self.engines.promotion.clone());
        let suggestions = engine.run(&execution_id, &terms, &tagger, discovery);

        for s in &suggestions {
            summary.count_action(s.reason_code.as_str());
        }

        if !opts.dry_run {
            let to_persist = suggestions.clone();
            self.load("persist promotion suggestions", move |wh| {
                wh.insert_promotion_suggestions(&to_persist)
            })
            .await?;
        }

        summary.duration_ms = started.elapsed().as_millis() as u64;
        self.notifier.notify(&summary).await;
        Ok(summary)
    }

    /// Stream APPROVED promotion suggestions to the apply sink. Used by the
    /// admin apply-queued flow; gated by the auto-exact env flag.
    pub async fn apply_queued_promotions(&self) -> Result<RunSummary> {
        let execution_id = Self::new_execution_id();
        let started = Instant::now();
        let mut summary = RunSummary::new(&execution_id, "auto-exact-apply", false);

        anyhow::ensure!(
            self.config.execution_mode == ExecutionMode::Apply
                && self.config.auto_exact_apply_enabled,
            "auto-exact apply is not enabled"
        );

        let queued = self
            .load("queued promotions", |wh| {
                wh.list_promotion_suggestions(500, 0, Some(RecommendationStatus::Approved))
            })
            .await?;

        for s in &queued {
            summary.count_action(s.reason_code.as_str());
            let entity = format!("{}::{}", s.ad_group_id, s.query);
            if !self.warehouse.claim_apply(&execution_id, &entity)? {
                continue;
            }
            // Promotion lands as an exact keyword via the bid operation on
            // the adapter side.
            match self.apply_sink.set_bid(&entity, s.suggested_bid).await {
                Ok(()) => {
                    summary.applied_records += 1;
                    self.warehouse.mark_apply_outcome(
                        SinkTable::AutoExactPromotionSuggestions,
                        &s.id,
                        true,
                        None,
                    )?;
                    self.warehouse.update_status(
                        SinkTable::AutoExactPromotionSuggestions,
                        &s.id,
                        RecommendationStatus::Approved,
                        RecommendationStatus::Applied,
                        None,
                    )?;
                }
                Err(err) => {
                    summary.apply_errors += 1;
                    self.warehouse.mark_apply_outcome(
                        SinkTable::AutoExactPromotionSuggestions,
                        &s.id,
                        false,
                        Some(&err.to_string()),
                    )?;
                }
            }
        }

        summary.duration_ms = started.elapsed().as_millis() as u64;
        self.notifier.notify(&summary).await;
        Ok(summary)
    }

    /// Stream APPROVED negative suggestions to the apply sink (admin
    /// apply-queued flow). Gated by the negative env flag.
    pub async fn apply_queued_negatives(&self) -> Result<RunSummary> {
        let execution_id = Self::new_execution_id();
        let started = Instant::now();
        let mut summary = RunSummary::new(&execution_id, "negatives-apply", false);

        anyhow::ensure!(
            self.config.execution_mode == ExecutionMode::Apply
                && self.config.negative_apply_enabled,
            "negative apply is not enabled"
        );

        let queued = self
            .load("queued negatives", |wh| {
                wh.list_negative_suggestions(500, 0, Some(RecommendationStatus::Approved))
            })
            .await?;

        for s in &queued {
            summary.count_action(s.verdict.as_str());
            let entity = format!("{}::{}", s.ad_group_id, s.query);
            if !self.warehouse.claim_apply(&execution_id, &entity)? {
                continue;
            }
            match self
                .apply_sink
                .add_negative(
                    &s.campaign_id,
                    &s.ad_group_id,
                    &s.query,
                    NegativeMatchType::NegativeExact,
                )
                .await
            {
                Ok(()) => {
                    summary.applied_records += 1;
                    self.warehouse.mark_apply_outcome(
                        SinkTable::NegativeKeywordSuggestions,
                        &s.id,
                        true,
                        None,
                    )?;
                    self.warehouse.update_status(
                        SinkTable::NegativeKeywordSuggestions,
                        &s.id,
                        RecommendationStatus::Approved,
                        RecommendationStatus::Applied,
                        None,
                    )?;
                }
                Err(err) => {
                    summary.apply_errors += 1;
                    self.warehouse.mark_apply_outcome(
                        SinkTable::NegativeKeywordSuggestions,
                        &s.id,
                        false,
                        Some(&err.to_string()),
                    )?;
                }
            }
        }

        summary.duration_ms = started.elapsed().as_millis() as u64;
        self.notifier.notify(&summary).await;
        Ok(summary)
    }

    // -- placement ----------------------------------------------------------

    pub async fn run_placement_optimization(
        &self,
        opts: RunOptions,
        cancel: CancelToken,
    ) -> Result<RunSummary> {
        let execution_id = Self::new_execution_id();
        let started = Instant::now();
        let mut summary = RunSummary::new(&execution_id, "placement", opts.dry_run);

        let metrics = self
            .load("placement metrics", |wh| wh.load_placement_metrics())
            .await?;
        cancel.bail_if_cancelled()?;

        let engine = PlacementEngine::new(self.engines.placement.clone());
        let recommendations = engine.run(&execution_id, &metrics);

        for rec in &recommendations {
            summary.count_action(rec.action.as_str());
        }

        if !opts.dry_run {
            let to_persist = recommendations.clone();
            self.load("persist placement recommendations", move |wh| {
                wh.insert_placement_recommendations(&to_persist)
            })
            .await?;
        }

        summary.duration_ms = started.elapsed().as_millis() as u64;
        self.notifier.notify(&summary).await;
        Ok(summary)
    }

    // -- backtest -----------------------------------------------------------

    pub async fn run_backtest(
        &self,
        params: BacktestParams,
        opts: RunOptions,
        cancel: CancelToken,
    ) -> Result<BacktestResult> {
        let execution_id = Self::new_execution_id();

        let (recommendations, performance) = tokio::try_join!(
            self.load("historical recommendations", {
                let p = params.clone();
                move |wh| {
                    wh.load_bid_recommendations_in_range(
                        p.start_date,
                        p.end_date,
                        p.asin.as_deref(),
                        p.campaign_id.as_deref(),
                    )
                }
            }),
            self.load("daily performance", {
                let p = params.clone();
                move |wh| wh.load_daily_performance(p.start_date, p.end_date)
            }),
        )?;
        cancel.bail_if_cancelled()?;

        let engine = BacktestEngine::new(params);
        let result = engine.run(&execution_id, &recommendations, &performance)?;

        if !opts.dry_run {
            let to_persist = result.clone();
            self.load("persist backtest result", move |wh| {
                wh.insert_backtest_result(&to_persist)
            })
            .await?;
        }

        info!(
            execution_id = %execution_id,
            matched = result.metadata.matched_rows,
            "backtest run finished"
        );
        Ok(result)
    }
}

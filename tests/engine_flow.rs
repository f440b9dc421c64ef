//! End-to-end engine flow against an in-memory warehouse.
//!
//! Seeds input snapshots, drives the orchestrator the way the cron handlers
//! do, and checks the cross-engine invariants: closed enumerations, guardrail
//! prohibitions, SEO conservation, budget monotonicity, and the approve/apply
//! status flow.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::NaiveDate;

use bidpilot_backend::apply::RecordingApplySink;
use bidpilot_backend::lifecycle::launch_exit::LaunchTrialMetrics;
use bidpilot_backend::models::{
    BidAction, BrandType, BudgetAction, BudgetMetrics, Config, CoreKeywordConfig, EngineMode,
    ExecutionMode, InvestmentState, KeywordMetrics, KeywordRankSummary, KeywordRole, KeywordTier,
    LifecycleStage, LossBudgetSummary, PhaseTag, ProductStrategy,
};
use bidpilot_backend::notify::LogNotifier;
use bidpilot_backend::orchestrator::{CancelToken, RunOptions};
use bidpilot_backend::{EngineConfigs, Orchestrator, Warehouse};

fn config(mode: ExecutionMode) -> Config {
    Config {
        database_path: ":memory:".into(),
        port: 0,
        execution_mode: mode,
        negative_apply_enabled: false,
        auto_exact_apply_enabled: false,
        apply_api_base_url: None,
        apply_timeout_secs: 5,
        warehouse_timeout_secs: 10,
        notify_webhook_url: None,
    }
}

fn build(mode: ExecutionMode) -> (Orchestrator, Arc<RecordingApplySink>) {
    let warehouse = Warehouse::open_in_memory().unwrap();
    let sink = Arc::new(RecordingApplySink::new());
    let orch = Orchestrator::new(
        config(mode),
        EngineConfigs::default(),
        warehouse,
        sink.clone(),
        Arc::new(LogNotifier),
    );
    (orch, sink)
}

fn keyword(id: &str, asin: &str, role: KeywordRole, acos_ratio: f64) -> KeywordMetrics {
    KeywordMetrics {
        keyword_id: id.into(),
        keyword: format!("kw {id}"),
        campaign_id: "cmp-1".into(),
        ad_group_id: "adg-1".into(),
        asin: asin.into(),
        current_bid: 100,
        impressions_3h: 50,
        clicks_3h: 3,
        impressions_7d: 5000,
        clicks_7d: 80,
        spend_7d: 8000,
        sales_7d: 30000,
        orders_7d: 9,
        impressions_30d: 20000,
        clicks_30d: 300,
        spend_30d: 30000,
        sales_30d: 120000,
        orders_30d: 36,
        clicks_60d: 600,
        orders_60d: 70,
        cvr_recent: 0.05,
        cvr_baseline: 0.05,
        ctr_recent: 0.012,
        ctr_baseline: 0.012,
        acos_actual: 0.25 * acos_ratio,
        acos_target: 0.25,
        competitor_cpc: 100.0,
        competitor_cpc_baseline: 100.0,
        competitor_strength: 0.5,
        tos_ctr_mult: 1.0,
        tos_cvr_mult: 1.0,
        tos_targeted: false,
        organic_rank: Some(8),
        organic_rank_target: 3,
        phase: PhaseTag::Normal,
        brand_type: BrandType::Generic,
        role,
        score_rank: 10,
    }
}

fn strategy(asin: &str, stage: LifecycleStage) -> ProductStrategy {
    ProductStrategy {
        asin: asin.into(),
        stage,
        strategy_pattern: stage.pattern(),
        sustainable_tacos: 0.15,
        invest_tacos_cap: 0.35,
        invest_max_loss_per_month_jpy: 100_000,
        invest_window_months: 6,
        invest_window_extension_months: 0,
        launch_date: NaiveDate::from_ymd_opt(2025, 1, 15).unwrap(),
        margin_rate: 0.3,
        unit_price_jpy: 3000,
        review_rating: 4.4,
        review_count: 80,
        reinvest_allowed: true,
        brand_terms: vec![],
        product_core_terms: vec![],
    }
}

fn loss(asin: &str, state: InvestmentState) -> LossBudgetSummary {
    LossBudgetSummary {
        asin: asin.into(),
        investment_state: state,
        rolling_ratio: 0.3,
        launch_cumulative_ratio: 0.4,
        launch_invest_usage_ratio: 0.4,
        warning_threshold: 0.7,
        critical_threshold: 0.9,
    }
}

#[tokio::test]
async fn bid_run_emits_one_record_per_keyword_with_closed_enums() {
    let (orch, _sink) = build(ExecutionMode::Shadow);
    let keywords = vec![
        keyword("kw-good", "B0A", KeywordRole::Core, 0.4),
        keyword("kw-bad", "B0A", KeywordRole::Experiment, 2.6),
        keyword("kw-brand", "B0A", KeywordRole::BrandOwn, 2.6),
    ];
    orch.warehouse().upsert_keyword_metrics(&keywords).unwrap();
    orch.warehouse()
        .upsert_product_strategies(&[strategy("B0A", LifecycleStage::Grow)])
        .unwrap();
    orch.warehouse()
        .upsert_loss_budgets(&[loss("B0A", InvestmentState::Safe)])
        .unwrap();

    let summary = orch
        .run_bid_engine(EngineMode::Normal, RunOptions::default(), CancelToken::new())
        .await
        .unwrap();
    assert_eq!(summary.total_records, 3);

    let recs = orch.warehouse().list_bid_recommendations(10, 0, None).unwrap();
    assert_eq!(recs.len(), 3);
    for rec in &recs {
        // Integer bid at or above the floor.
        assert!(rec.recommended_bid >= 10);
        // BRAND_OWN never STOPs.
        if rec.keyword_id == "kw-brand" {
            assert_ne!(rec.action, BidAction::Stop);
            assert_eq!(rec.action, BidAction::MildDown);
        }
    }
    let good = recs.iter().find(|r| r.keyword_id == "kw-good").unwrap();
    assert_eq!(good.action, BidAction::StrongUp);
    assert!(good.recommended_bid > good.current_bid);
}

#[tokio::test]
async fn core_launch_hard_keywords_never_stop_even_when_awful() {
    let (orch, _sink) = build(ExecutionMode::Shadow);
    orch.warehouse()
        .upsert_keyword_metrics(&[keyword("kw-core", "B0A", KeywordRole::Core, 3.0)])
        .unwrap();
    orch.warehouse()
        .upsert_product_strategies(&[strategy("B0A", LifecycleStage::LaunchHard)])
        .unwrap();
    orch.warehouse()
        .upsert_loss_budgets(&[loss("B0A", InvestmentState::Safe)])
        .unwrap();

    orch.run_bid_engine(EngineMode::Normal, RunOptions::default(), CancelToken::new())
        .await
        .unwrap();
    let recs = orch.warehouse().list_bid_recommendations(10, 0, None).unwrap();
    assert_ne!(recs[0].action, BidAction::Stop);
    assert_ne!(recs[0].action, BidAction::StrongDown);
}

#[tokio::test]
async fn budget_monotonicity_over_a_mixed_batch() {
    let (orch, _sink) = build(ExecutionMode::Shadow);
    let base = BudgetMetrics {
        campaign_id: "cmp-boost".into(),
        campaign_name: "boost".into(),
        daily_budget_jpy: 1000,
        spend_today_jpy: 950,
        budget_usage_percent: 95.0,
        lost_impression_share_budget: Some(15.0),
        spend_7d_jpy: 6000,
        sales_7d_jpy: 40000,
        orders_7d: 10,
        acos_7d: 0.15,
        cvr_7d: 0.05,
        spend_30d_jpy: 24000,
        sales_30d_jpy: 160000,
        orders_30d: 40,
        acos_30d: 0.15,
        target_acos: 0.25,
        low_usage_days: 0,
    };
    let mut curb = base.clone();
    curb.campaign_id = "cmp-curb".into();
    curb.budget_usage_percent = 20.0;
    curb.lost_impression_share_budget = Some(0.0);
    curb.low_usage_days = 10;
    curb.acos_7d = 0.40;
    let mut starved = base.clone();
    starved.campaign_id = "cmp-thin".into();
    starved.orders_7d = 1;
    orch.warehouse()
        .upsert_budget_metrics(&[base, curb, starved])
        .unwrap();

    orch.run_budget_optimization(RunOptions::default(), CancelToken::new())
        .await
        .unwrap();
    let recs = orch
        .warehouse()
        .list_budget_recommendations(10, 0, None)
        .unwrap();
    assert_eq!(recs.len(), 3);
    for rec in &recs {
        assert!(rec.recommended_budget >= 100);
        match rec.action {
            BudgetAction::Boost => assert!(rec.recommended_budget > rec.current_budget),
            BudgetAction::Curb => assert!(rec.recommended_budget < rec.current_budget),
            BudgetAction::Keep => assert_eq!(rec.recommended_budget, rec.current_budget),
        }
    }
}

#[tokio::test]
async fn launch_exit_flows_through_lifecycle_run() {
    let (orch, _sink) = build(ExecutionMode::Shadow);
    let asin = "B0LAUNCH";
    orch.warehouse()
        .upsert_product_strategies(&[strategy(asin, LifecycleStage::LaunchHard)])
        .unwrap();
    orch.warehouse()
        .upsert_loss_budgets(&[loss(asin, InvestmentState::Safe)])
        .unwrap();

    // Ten core keywords: 7 achieved, 1 gave up, 2 active.
    let mut keywords = Vec::new();
    let mut summaries = Vec::new();
    for i in 0..10 {
        let kw = format!("core-{i}");
        keywords.push(CoreKeywordConfig {
            asin: asin.into(),
            keyword: kw.clone(),
            tier: KeywordTier::Middle,
            target_rank_min: 1,
            target_rank_max: 5,
            search_volume: 1000,
            role: KeywordRole::Core,
        });
        let summary = if i < 7 {
            KeywordRankSummary {
                asin: asin.into(),
                keyword: kw,
                current_rank: Some(3),
                best_rank: Some(2),
                days_with_rank_data: 60,
                impressions_total: 5000,
                clicks_total: 200,
                orders_total: 10,
                cost_total_jpy: 20_000,
                revenue_total_jpy: 60_000,
            }
        } else if i == 7 {
            KeywordRankSummary {
                asin: asin.into(),
                keyword: kw,
                current_rank: None,
                best_rank: Some(40),
                days_with_rank_data: 60,
                impressions_total: 5000,
                clicks_total: 200,
                orders_total: 2,
                cost_total_jpy: 20_000,
                revenue_total_jpy: 6_000,
            }
        } else {
            KeywordRankSummary {
                asin: asin.into(),
                keyword: kw,
                current_rank: Some(30),
                best_rank: Some(25),
                days_with_rank_data: 5,
                impressions_total: 300,
                clicks_total: 10,
                orders_total: 0,
                cost_total_jpy: 800,
                revenue_total_jpy: 0,
            }
        };
        summaries.push(summary);
    }
    orch.warehouse().upsert_core_keywords(&keywords).unwrap();
    orch.warehouse().upsert_rank_summaries(&summaries).unwrap();
    orch.warehouse()
        .upsert_trial_metrics(
            asin,
            &LaunchTrialMetrics {
                days_since_launch: 60,
                asin_clicks_total: 3000,
                asin_orders_total: 90,
                avg_daily_sales_30d: 3.0,
            },
        )
        .unwrap();

    let (_, decisions) = orch
        .run_lifecycle(true, RunOptions::default(), CancelToken::new())
        .await
        .unwrap();
    assert_eq!(decisions.len(), 1);
    let d = &decisions[0];
    // Completion 8/10 over the 0.7 gate with trial evidence: normal exit.
    assert!(d.should_transition);
    assert_eq!(d.recommended_stage, LifecycleStage::Grow);
    assert!(!d.is_emergency_exit);

    let strategies = orch.warehouse().load_product_strategies().unwrap();
    assert_eq!(strategies[0].stage, LifecycleStage::Grow);
    assert_eq!(strategies[0].strategy_pattern, "grow");
}

#[tokio::test]
async fn emergency_exit_carries_the_flag_through() {
    let (orch, _sink) = build(ExecutionMode::Shadow);
    let asin = "B0BURN";
    orch.warehouse()
        .upsert_product_strategies(&[strategy(asin, LifecycleStage::LaunchSoft)])
        .unwrap();
    let mut lb = loss(asin, InvestmentState::Limit);
    lb.launch_cumulative_ratio = 1.5;
    orch.warehouse().upsert_loss_budgets(&[lb]).unwrap();

    let (_, decisions) = orch
        .run_lifecycle(false, RunOptions::default(), CancelToken::new())
        .await
        .unwrap();
    let d = &decisions[0];
    assert!(d.should_transition);
    assert!(d.is_emergency_exit);
    assert_eq!(d.recommended_stage, LifecycleStage::Grow);

    // Suggestions flow does not touch the strategy table.
    let strategies = orch.warehouse().load_product_strategies().unwrap();
    assert_eq!(strategies[0].stage, LifecycleStage::LaunchSoft);
}

#[tokio::test]
async fn approve_then_apply_queued_respects_the_gates() {
    let warehouse = Warehouse::open_in_memory().unwrap();
    let sink = Arc::new(RecordingApplySink::new());
    let mut cfg = config(ExecutionMode::Apply);
    cfg.negative_apply_enabled = true;
    let orch = Orchestrator::new(
        cfg,
        EngineConfigs::default(),
        warehouse,
        sink.clone(),
        Arc::new(LogNotifier),
    );

    // Keyword metrics feed the per-ASIN baseline CVR (70/600).
    orch.warehouse()
        .upsert_keyword_metrics(&[keyword("kw-base", "B0A", KeywordRole::Core, 1.0)])
        .unwrap();
    orch.warehouse()
        .upsert_search_terms(&[bidpilot_backend::models::SearchTermStat {
            asin: "B0A".into(),
            campaign_id: "cmp-1".into(),
            ad_group_id: "adg-1".into(),
            query: "useless query".into(),
            match_type: "broad".into(),
            impressions: 3000,
            clicks: 90,
            orders: 0,
            sales_jpy: 0,
            spend_jpy: 5400,
            target_acos: 0.25,
        }])
        .unwrap();

    // With the per-engine flag on, STOP verdicts stream during the run.
    let summary = orch
        .run_negative_mining(RunOptions::default(), CancelToken::new())
        .await
        .unwrap();
    assert!(summary.applied_records >= 1);

    // Everything applied exactly once; a second queued sweep is a no-op
    // because the ledger already holds the pairs.
    let before = sink.calls().len();
    let queued = orch.apply_queued_negatives().await.unwrap();
    assert_eq!(queued.applied_records, 0);
    assert_eq!(sink.calls().len(), before);
}

#[tokio::test]
async fn backtest_round_trip_through_the_orchestrator() {
    let (orch, _sink) = build(ExecutionMode::Shadow);
    orch.warehouse()
        .upsert_keyword_metrics(&[keyword("kw-1", "B0A", KeywordRole::Core, 0.4)])
        .unwrap();
    orch.warehouse()
        .upsert_product_strategies(&[strategy("B0A", LifecycleStage::Grow)])
        .unwrap();
    orch.warehouse()
        .upsert_loss_budgets(&[loss("B0A", InvestmentState::Safe)])
        .unwrap();

    // Produce historical recommendations.
    orch.run_bid_engine(EngineMode::Normal, RunOptions::default(), CancelToken::new())
        .await
        .unwrap();

    // Outcomes for today.
    let today = chrono::Utc::now().date_naive();
    orch.warehouse()
        .upsert_daily_performance(&[bidpilot_backend::models::KeywordDailyPerformance {
            keyword_id: "kw-1".into(),
            date: today,
            impressions: 1000,
            clicks: 50,
            spend_jpy: 3000,
            sales_jpy: 20000,
            orders: 5,
            bid_jpy: 100,
        }])
        .unwrap();

    let params = bidpilot_backend::backtest::BacktestParams::new(today, today);
    let result = orch
        .run_backtest(params, RunOptions::default(), CancelToken::new())
        .await
        .unwrap();
    assert_eq!(result.metadata.matched_rows, 1);
    assert_eq!(
        result.accuracy.total_decisions,
        result.metadata.matched_rows
    );
    assert!(result.accuracy.accuracy_rate >= 0.0 && result.accuracy.accuracy_rate <= 1.0);
    // The day converted at ACOS 0.15, below the 0.3 margin: UP was optimal
    // and the stored recommendation was STRONG_UP.
    assert_eq!(result.accuracy.correct_decisions, 1);

    let listed = orch.warehouse().list_backtest_executions(10, 0).unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].execution_id, result.execution_id);
}

//! Route handlers.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::backtest::models::{BacktestParams, Granularity};
use crate::error::{AppError, FieldError};
use crate::models::{EngineMode, LifecycleStage, RecommendationStatus};
use crate::orchestrator::{CancelToken, Orchestrator, RunOptions};
use crate::warehouse::SinkTable;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
}

/// 400 body: a list of field errors.
#[derive(Debug, Serialize)]
struct ValidationBody {
    errors: Vec<FieldError>,
}

struct ApiError(AppError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self.0 {
            AppError::Validation(errors) => {
                (StatusCode::BAD_REQUEST, Json(ValidationBody { errors })).into_response()
            }
            other => {
                error!(error = %other, "request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(serde_json::json!({ "error": other.to_string() })),
                )
                    .into_response()
            }
        }
    }
}

impl From<AppError> for ApiError {
    fn from(e: AppError) -> Self {
        ApiError(e)
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        ApiError(AppError::Sink(e.to_string()))
    }
}

type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CronRequest {
    #[serde(default)]
    dry_run: bool,
}

#[derive(Debug, Deserialize)]
struct PageQuery {
    limit: Option<usize>,
    offset: Option<usize>,
    status: Option<String>,
}

impl PageQuery {
    fn limit(&self) -> usize {
        self.limit.unwrap_or(50).min(500)
    }

    fn offset(&self) -> usize {
        self.offset.unwrap_or(0)
    }

    fn status(&self) -> ApiResult<Option<RecommendationStatus>> {
        match &self.status {
            None => Ok(None),
            Some(s) => RecommendationStatus::parse(s)
                .map(Some)
                .ok_or_else(|| AppError::field("status", "unknown status").into()),
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        // Cron triggers.
        .route("/cron/run", post(run_bid_normal))
        .route("/cron/run-normal", post(run_bid_normal))
        .route("/cron/run-smode", post(run_bid_smode))
        .route("/cron/run-budget-optimization", post(run_budget))
        .route("/cron/run-placement-optimization", post(run_placement))
        .route("/cron/run-auto-exact-promotion", post(run_auto_exact))
        .route("/cron/run-auto-exact-shadow", post(run_auto_exact_shadow))
        .route("/cron/run-keyword-discovery", post(run_keyword_discovery))
        .route("/cron/run-negative-mining", post(run_negatives))
        // Lifecycle.
        .route("/lifecycle/update", post(lifecycle_update))
        .route("/lifecycle/suggestions", post(lifecycle_suggestions))
        .route("/lifecycle/products/:asin/stage", post(lifecycle_set_stage))
        // Backtests.
        .route("/backtest/run", post(backtest_run))
        .route("/backtest/weekly", post(backtest_weekly))
        .route("/backtest/executions", get(backtest_list))
        .route("/backtest/executions/:id", get(backtest_get))
        .route("/backtest/executions/:id/export", get(backtest_export))
        // Admin suggestion management.
        .route("/admin/negative-suggestions", get(list_negatives))
        .route(
            "/admin/negative-suggestions/:id/approve",
            post(approve_negative),
        )
        .route(
            "/admin/negative-suggestions/:id/reject",
            post(reject_negative),
        )
        .route(
            "/admin/negative-suggestions/apply-queued",
            post(apply_queued_negatives),
        )
        .route("/admin/auto-exact-suggestions", get(list_promotions))
        .route(
            "/admin/auto-exact-suggestions/:id/approve",
            post(approve_promotion),
        )
        .route(
            "/admin/auto-exact-suggestions/:id/reject",
            post(reject_promotion),
        )
        .route(
            "/admin/auto-exact-suggestions/apply-queued",
            post(apply_queued_promotions),
        )
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

// -- cron handlers -----------------------------------------------------------

async fn run_bid_normal(
    State(state): State<AppState>,
    body: Option<Json<CronRequest>>,
) -> ApiResult<Json<crate::notify::RunSummary>> {
    let req = body.map(|Json(r)| r).unwrap_or_default();
    let summary = state
        .orchestrator
        .run_bid_engine(
            EngineMode::Normal,
            RunOptions { dry_run: req.dry_run },
            CancelToken::new(),
        )
        .await?;
    Ok(Json(summary))
}

async fn run_bid_smode(
    State(state): State<AppState>,
    body: Option<Json<CronRequest>>,
) -> ApiResult<Json<crate::notify::RunSummary>> {
    let req = body.map(|Json(r)| r).unwrap_or_default();
    let summary = state
        .orchestrator
        .run_bid_engine(
            EngineMode::SMode,
            RunOptions { dry_run: req.dry_run },
            CancelToken::new(),
        )
        .await?;
    Ok(Json(summary))
}

async fn run_budget(
    State(state): State<AppState>,
    body: Option<Json<CronRequest>>,
) -> ApiResult<Json<crate::notify::RunSummary>> {
    let req = body.map(|Json(r)| r).unwrap_or_default();
    let summary = state
        .orchestrator
        .run_budget_optimization(RunOptions { dry_run: req.dry_run }, CancelToken::new())
        .await?;
    Ok(Json(summary))
}

async fn run_placement(
    State(state): State<AppState>,
    body: Option<Json<CronRequest>>,
) -> ApiResult<Json<crate::notify::RunSummary>> {
    let req = body.map(|Json(r)| r).unwrap_or_default();
    let summary = state
        .orchestrator
        .run_placement_optimization(RunOptions { dry_run: req.dry_run }, CancelToken::new())
        .await?;
    Ok(Json(summary))
}

async fn run_auto_exact(
    State(state): State<AppState>,
    body: Option<Json<CronRequest>>,
) -> ApiResult<Json<crate::notify::RunSummary>> {
    let req = body.map(|Json(r)| r).unwrap_or_default();
    let summary = state
        .orchestrator
        .run_auto_exact(false, RunOptions { dry_run: req.dry_run }, CancelToken::new())
        .await?;
    Ok(Json(summary))
}

/// Shadow variant: identical mining, decisions only persisted (auto-exact
/// apply remains gated off for records from this run).
async fn run_auto_exact_shadow(
    State(state): State<AppState>,
    body: Option<Json<CronRequest>>,
) -> ApiResult<Json<crate::notify::RunSummary>> {
    run_auto_exact(State(state), body).await
}

async fn run_keyword_discovery(
    State(state): State<AppState>,
    body: Option<Json<CronRequest>>,
) -> ApiResult<Json<crate::notify::RunSummary>> {
    let req = body.map(|Json(r)| r).unwrap_or_default();
    let summary = state
        .orchestrator
        .run_auto_exact(true, RunOptions { dry_run: req.dry_run }, CancelToken::new())
        .await?;
    Ok(Json(summary))
}

async fn run_negatives(
    State(state): State<AppState>,
    body: Option<Json<CronRequest>>,
) -> ApiResult<Json<crate::notify::RunSummary>> {
    let req = body.map(|Json(r)| r).unwrap_or_default();
    let summary = state
        .orchestrator
        .run_negative_mining(RunOptions { dry_run: req.dry_run }, CancelToken::new())
        .await?;
    Ok(Json(summary))
}

// -- lifecycle ---------------------------------------------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LifecycleResponse {
    summary: crate::notify::RunSummary,
    decisions: Vec<crate::lifecycle::LifecycleDecision>,
}

async fn lifecycle_update(
    State(state): State<AppState>,
    body: Option<Json<CronRequest>>,
) -> ApiResult<Json<LifecycleResponse>> {
    let req = body.map(|Json(r)| r).unwrap_or_default();
    let (summary, decisions) = state
        .orchestrator
        .run_lifecycle(true, RunOptions { dry_run: req.dry_run }, CancelToken::new())
        .await?;
    Ok(Json(LifecycleResponse { summary, decisions }))
}

async fn lifecycle_suggestions(
    State(state): State<AppState>,
    body: Option<Json<CronRequest>>,
) -> ApiResult<Json<LifecycleResponse>> {
    let req = body.map(|Json(r)| r).unwrap_or_default();
    let (summary, decisions) = state
        .orchestrator
        .run_lifecycle(false, RunOptions { dry_run: req.dry_run }, CancelToken::new())
        .await?;
    Ok(Json(LifecycleResponse { summary, decisions }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SetStageRequest {
    stage: String,
    #[serde(default)]
    dry_run: bool,
}

async fn lifecycle_set_stage(
    State(state): State<AppState>,
    Path(asin): Path<String>,
    Json(req): Json<SetStageRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let stage = LifecycleStage::parse(&req.stage)
        .ok_or_else(|| AppError::field("stage", "invalid lifecycle stage"))?;

    if req.dry_run {
        return Ok(Json(serde_json::json!({
            "asin": asin, "stage": stage.as_str(), "updated": false, "dryRun": true
        })));
    }

    let updated = state.orchestrator.warehouse().update_product_stage(&asin, stage)?;
    if !updated {
        return Err(AppError::field("asin", "unknown product").into());
    }
    Ok(Json(serde_json::json!({
        "asin": asin, "stage": stage.as_str(), "updated": true
    })))
}

// -- backtests ---------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BacktestRequest {
    start_date: Option<String>,
    end_date: Option<String>,
    asin: Option<String>,
    campaign_id: Option<String>,
    granularity: Option<String>,
    profit_margin: Option<f64>,
    #[serde(default)]
    dry_run: bool,
}

fn parse_backtest_params(req: &BacktestRequest) -> Result<BacktestParams, AppError> {
    let mut errors = Vec::new();

    let start = match &req.start_date {
        Some(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d").ok(),
        None => None,
    };
    if start.is_none() {
        errors.push(FieldError::new("startDate", "required date, YYYY-MM-DD"));
    }
    let end = match &req.end_date {
        Some(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d").ok(),
        None => None,
    };
    if end.is_none() {
        errors.push(FieldError::new("endDate", "required date, YYYY-MM-DD"));
    }

    let granularity = match &req.granularity {
        None => Some(Granularity::Daily),
        Some(g) => {
            let parsed = Granularity::parse(g);
            if parsed.is_none() {
                errors.push(FieldError::new("granularity", "DAILY or WEEKLY"));
            }
            parsed
        }
    };

    if let (Some(start), Some(end)) = (start, end) {
        if end < start {
            errors.push(FieldError::new("endDate", "before startDate"));
        } else if (end - start).num_days() > 365 {
            errors.push(FieldError::new("endDate", "range exceeds 365 days"));
        }
    }

    if let Some(margin) = req.profit_margin {
        if !(0.0..=1.0).contains(&margin) {
            errors.push(FieldError::new("profitMargin", "must be within [0, 1]"));
        }
    }

    if !errors.is_empty() {
        return Err(AppError::Validation(errors));
    }

    let mut params = BacktestParams::new(start.unwrap(), end.unwrap());
    params.asin = req.asin.clone();
    params.campaign_id = req.campaign_id.clone();
    params.granularity = granularity.unwrap();
    if let Some(margin) = req.profit_margin {
        params.profit_margin = margin;
    }
    Ok(params)
}

async fn backtest_run(
    State(state): State<AppState>,
    Json(req): Json<BacktestRequest>,
) -> ApiResult<Json<crate::backtest::BacktestResult>> {
    let params = parse_backtest_params(&req)?;
    let result = state
        .orchestrator
        .run_backtest(params, RunOptions { dry_run: req.dry_run }, CancelToken::new())
        .await?;
    Ok(Json(result))
}

async fn backtest_weekly(
    State(state): State<AppState>,
    Json(req): Json<BacktestRequest>,
) -> ApiResult<Json<crate::backtest::BacktestResult>> {
    let mut params = parse_backtest_params(&req)?;
    params.granularity = Granularity::Weekly;
    let result = state
        .orchestrator
        .run_backtest(params, RunOptions { dry_run: req.dry_run }, CancelToken::new())
        .await?;
    Ok(Json(result))
}

async fn backtest_list(
    State(state): State<AppState>,
    Query(page): Query<PageQuery>,
) -> ApiResult<Json<Vec<crate::backtest::BacktestResult>>> {
    let results = state
        .orchestrator
        .warehouse()
        .list_backtest_executions(page.limit(), page.offset())?;
    Ok(Json(results))
}

async fn backtest_get(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    match state.orchestrator.warehouse().get_backtest_execution(&id)? {
        Some(result) => Ok(Json(result).into_response()),
        None => Ok(StatusCode::NOT_FOUND.into_response()),
    }
}

/// CSV export of the per-period series.
async fn backtest_export(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    let details = state.orchestrator.warehouse().load_backtest_details(&id)?;
    if details.is_empty() {
        return Ok(StatusCode::NOT_FOUND.into_response());
    }
    let mut csv = String::from(
        "period,matched_rows,actual_spend_jpy,actual_sales_jpy,simulated_spend_jpy,simulated_sales_jpy\n",
    );
    for row in details {
        csv.push_str(&format!(
            "{},{},{:.0},{:.0},{:.0},{:.0}\n",
            row.period,
            row.matched_rows,
            row.actual_spend_jpy,
            row.actual_sales_jpy,
            row.simulated_spend_jpy,
            row.simulated_sales_jpy,
        ));
    }
    Ok((
        StatusCode::OK,
        [("content-type", "text/csv; charset=utf-8")],
        csv,
    )
        .into_response())
}

// -- admin: suggestion management --------------------------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReviewRequest {
    #[serde(default)]
    reviewer: Option<String>,
}

async fn list_negatives(
    State(state): State<AppState>,
    Query(page): Query<PageQuery>,
) -> ApiResult<Json<Vec<crate::models::NegativeKeywordSuggestion>>> {
    let rows = state.orchestrator.warehouse().list_negative_suggestions(
        page.limit(),
        page.offset(),
        page.status()?,
    )?;
    Ok(Json(rows))
}

async fn review(
    state: &AppState,
    table: SinkTable,
    id: &str,
    next: RecommendationStatus,
    reviewer: Option<&str>,
) -> ApiResult<Json<serde_json::Value>> {
    let won = state.orchestrator.warehouse().update_status(
        table,
        id,
        RecommendationStatus::Pending,
        next,
        reviewer,
    )?;
    if !won {
        return Err(AppError::field("id", "not found or already reviewed").into());
    }
    Ok(Json(serde_json::json!({ "id": id, "status": next.as_str() })))
}

async fn approve_negative(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Option<Json<ReviewRequest>>,
) -> ApiResult<Json<serde_json::Value>> {
    let req = body.map(|Json(r)| r).unwrap_or_default();
    review(
        &state,
        SinkTable::NegativeKeywordSuggestions,
        &id,
        RecommendationStatus::Approved,
        req.reviewer.as_deref(),
    )
    .await
}

async fn reject_negative(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Option<Json<ReviewRequest>>,
) -> ApiResult<Json<serde_json::Value>> {
    let req = body.map(|Json(r)| r).unwrap_or_default();
    review(
        &state,
        SinkTable::NegativeKeywordSuggestions,
        &id,
        RecommendationStatus::Rejected,
        req.reviewer.as_deref(),
    )
    .await
}

async fn apply_queued_negatives(
    State(state): State<AppState>,
) -> ApiResult<Json<crate::notify::RunSummary>> {
    let summary = state.orchestrator.apply_queued_negatives().await?;
    Ok(Json(summary))
}

async fn list_promotions(
    State(state): State<AppState>,
    Query(page): Query<PageQuery>,
) -> ApiResult<Json<Vec<crate::models::AutoExactPromotionSuggestion>>> {
    let rows = state.orchestrator.warehouse().list_promotion_suggestions(
        page.limit(),
        page.offset(),
        page.status()?,
    )?;
    Ok(Json(rows))
}

async fn approve_promotion(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Option<Json<ReviewRequest>>,
) -> ApiResult<Json<serde_json::Value>> {
    let req = body.map(|Json(r)| r).unwrap_or_default();
    review(
        &state,
        SinkTable::AutoExactPromotionSuggestions,
        &id,
        RecommendationStatus::Approved,
        req.reviewer.as_deref(),
    )
    .await
}

async fn reject_promotion(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Option<Json<ReviewRequest>>,
) -> ApiResult<Json<serde_json::Value>> {
    let req = body.map(|Json(r)| r).unwrap_or_default();
    review(
        &state,
        SinkTable::AutoExactPromotionSuggestions,
        &id,
        RecommendationStatus::Rejected,
        req.reviewer.as_deref(),
    )
    .await
}

async fn apply_queued_promotions(
    State(state): State<AppState>,
) -> ApiResult<Json<crate::notify::RunSummary>> {
    let summary = state.orchestrator.apply_queued_promotions().await?;
    Ok(Json(summary))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backtest_validation_collects_field_errors() {
        let req = BacktestRequest {
            start_date: None,
            end_date: Some("not-a-date".into()),
            asin: None,
            campaign_id: None,
            granularity: Some("MONTHLY".into()),
            profit_margin: Some(1.5),
            dry_run: false,
        };
        let err = parse_backtest_params(&req).unwrap_err();
        match err {
            AppError::Validation(errors) => {
                let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
                assert!(fields.contains(&"startDate"));
                assert!(fields.contains(&"endDate"));
                assert!(fields.contains(&"granularity"));
                assert!(fields.contains(&"profitMargin"));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn backtest_range_capped_at_a_year() {
        let req = BacktestRequest {
            start_date: Some("2024-01-01".into()),
            end_date: Some("2025-06-30".into()),
            asin: None,
            campaign_id: None,
            granularity: None,
            profit_margin: None,
            dry_run: false,
        };
        let err = parse_backtest_params(&req).unwrap_err();
        match err {
            AppError::Validation(errors) => {
                assert!(errors.iter().any(|e| e.message.contains("365")));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn backtest_params_pass_through() {
        let req = BacktestRequest {
            start_date: Some("2025-06-01".into()),
            end_date: Some("2025-06-30".into()),
            asin: Some("B0TEST".into()),
            campaign_id: None,
            granularity: Some("WEEKLY".into()),
            profit_margin: Some(0.25),
            dry_run: false,
        };
        let params = parse_backtest_params(&req).unwrap();
        assert_eq!(params.granularity, Granularity::Weekly);
        assert_eq!(params.asin.as_deref(), Some("B0TEST"));
        assert!((params.profit_margin - 0.25).abs() < 1e-9);
    }
}

//! Shared domain model for the ad control plane.
//!
//! Everything here is a snapshot type: the orchestrator loads rows once per
//! run and hands out borrows; engines never mutate their inputs. Recommendation
//! records are append-only, `status` being the single mutable column.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Closed enumerations
// ---------------------------------------------------------------------------

/// Product lifecycle stage. The strategy-pattern column in the warehouse is
/// always the lowercase spelling of this value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LifecycleStage {
    LaunchHard,
    LaunchSoft,
    Grow,
    Harvest,
}

impl LifecycleStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleStage::LaunchHard => "LAUNCH_HARD",
            LifecycleStage::LaunchSoft => "LAUNCH_SOFT",
            LifecycleStage::Grow => "GROW",
            LifecycleStage::Harvest => "HARVEST",
        }
    }

    /// Strategy-pattern spelling stored alongside the stage.
    pub fn pattern(&self) -> String {
        self.as_str().to_ascii_lowercase()
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "LAUNCH_HARD" => Some(LifecycleStage::LaunchHard),
            "LAUNCH_SOFT" => Some(LifecycleStage::LaunchSoft),
            "GROW" => Some(LifecycleStage::Grow),
            "HARVEST" => Some(LifecycleStage::Harvest),
            _ => None,
        }
    }

    pub fn is_launch(&self) -> bool {
        matches!(self, LifecycleStage::LaunchHard | LifecycleStage::LaunchSoft)
    }

    /// Invest mode unlocks higher ACOS tolerance and more aggressive UPs.
    pub fn is_invest_mode(&self) -> bool {
        self.is_launch()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum KeywordRole {
    Core,
    Support,
    Experiment,
    BrandOwn,
    BrandConquest,
}

impl KeywordRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeywordRole::Core => "CORE",
            KeywordRole::Support => "SUPPORT",
            KeywordRole::Experiment => "EXPERIMENT",
            KeywordRole::BrandOwn => "BRAND_OWN",
            KeywordRole::BrandConquest => "BRAND_CONQUEST",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "CORE" => Some(KeywordRole::Core),
            "SUPPORT" => Some(KeywordRole::Support),
            "EXPERIMENT" => Some(KeywordRole::Experiment),
            "BRAND_OWN" => Some(KeywordRole::BrandOwn),
            "BRAND_CONQUEST" => Some(KeywordRole::BrandConquest),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BrandType {
    Brand,
    Generic,
    Conquest,
}

/// Sale-phase tag. NORMAL outside sale events; the S_* tags cover the
/// pre-sale ramp, the freeze window, the sale itself, the final spike and
/// the post-sale revert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PhaseTag {
    #[serde(rename = "NORMAL")]
    Normal,
    #[serde(rename = "S_PRE1")]
    SPre1,
    #[serde(rename = "S_PRE2")]
    SPre2,
    #[serde(rename = "S_FREEZE")]
    SFreeze,
    #[serde(rename = "S_NORMAL")]
    SNormal,
    #[serde(rename = "S_FINAL")]
    SFinal,
    #[serde(rename = "S_REVERT")]
    SRevert,
}

impl PhaseTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            PhaseTag::Normal => "NORMAL",
            PhaseTag::SPre1 => "S_PRE1",
            PhaseTag::SPre2 => "S_PRE2",
            PhaseTag::SFreeze => "S_FREEZE",
            PhaseTag::SNormal => "S_NORMAL",
            PhaseTag::SFinal => "S_FINAL",
            PhaseTag::SRevert => "S_REVERT",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "NORMAL" => Some(PhaseTag::Normal),
            "S_PRE1" => Some(PhaseTag::SPre1),
            "S_PRE2" => Some(PhaseTag::SPre2),
            "S_FREEZE" => Some(PhaseTag::SFreeze),
            "S_NORMAL" => Some(PhaseTag::SNormal),
            "S_FINAL" => Some(PhaseTag::SFinal),
            "S_REVERT" => Some(PhaseTag::SRevert),
            _ => None,
        }
    }

    /// Pre-sale ramp phases freeze every DOWN action.
    pub fn is_presale(&self) -> bool {
        matches!(self, PhaseTag::SPre1 | PhaseTag::SPre2)
    }
}

/// Engine operating mode. S_MODE is the sale-event variant with steeper
/// coefficient curves and phase multipliers active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EngineMode {
    Normal,
    SMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BidAction {
    StrongUp,
    MildUp,
    Keep,
    MildDown,
    StrongDown,
    Stop,
}

impl BidAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            BidAction::StrongUp => "STRONG_UP",
            BidAction::MildUp => "MILD_UP",
            BidAction::Keep => "KEEP",
            BidAction::MildDown => "MILD_DOWN",
            BidAction::StrongDown => "STRONG_DOWN",
            BidAction::Stop => "STOP",
        }
    }

    pub fn is_up(&self) -> bool {
        matches!(self, BidAction::StrongUp | BidAction::MildUp)
    }

    pub fn is_down(&self) -> bool {
        matches!(
            self,
            BidAction::MildDown | BidAction::StrongDown | BidAction::Stop
        )
    }

    pub fn is_directional(&self) -> bool {
        !matches!(self, BidAction::Keep)
    }

    /// Next milder action on the guardrail fallback chain.
    /// STOP -> STRONG_DOWN -> MILD_DOWN -> KEEP; everything else keeps.
    pub fn milder(&self) -> BidAction {
        match self {
            BidAction::Stop => BidAction::StrongDown,
            BidAction::StrongDown => BidAction::MildDown,
            BidAction::MildDown => BidAction::Keep,
            other => *other,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SeoTrend {
    Up,
    Flat,
    Down,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RankZone {
    TopZone,
    MidZone,
    OutOfRange,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum KeywordTier {
    Big,
    Middle,
    Brand,
}

/// Loss-budget zone for a product's cumulative investment allowance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvestmentState {
    Safe,
    Warning,
    Limit,
    Breach,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecommendationStatus {
    Pending,
    Approved,
    Rejected,
    Applied,
}

impl RecommendationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecommendationStatus::Pending => "PENDING",
            RecommendationStatus::Approved => "APPROVED",
            RecommendationStatus::Rejected => "REJECTED",
            RecommendationStatus::Applied => "APPLIED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "PENDING" => Some(RecommendationStatus::Pending),
            "APPROVED" => Some(RecommendationStatus::Approved),
            "REJECTED" => Some(RecommendationStatus::Rejected),
            "APPLIED" => Some(RecommendationStatus::Applied),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Reason codes (one closed set per record kind)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BidReasonCode {
    AcosWellBelowTarget,
    AcosBelowTarget,
    AcosOnTarget,
    AcosAboveTarget,
    AcosWellAboveTarget,
    AcosCritical,
    InsufficientClicks,
    FreezePhase,
    BrandOwnProtected,
    GuardrailDowngrade,
    Error,
}

impl BidReasonCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            BidReasonCode::AcosWellBelowTarget => "ACOS_WELL_BELOW_TARGET",
            BidReasonCode::AcosBelowTarget => "ACOS_BELOW_TARGET",
            BidReasonCode::AcosOnTarget => "ACOS_ON_TARGET",
            BidReasonCode::AcosAboveTarget => "ACOS_ABOVE_TARGET",
            BidReasonCode::AcosWellAboveTarget => "ACOS_WELL_ABOVE_TARGET",
            BidReasonCode::AcosCritical => "ACOS_CRITICAL",
            BidReasonCode::InsufficientClicks => "INSUFFICIENT_CLICKS",
            BidReasonCode::FreezePhase => "FREEZE_PHASE",
            BidReasonCode::BrandOwnProtected => "BRAND_OWN_PROTECTED",
            BidReasonCode::GuardrailDowngrade => "GUARDRAIL_DOWNGRADE",
            BidReasonCode::Error => "ERROR",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BudgetAction {
    Boost,
    Keep,
    Curb,
}

impl BudgetAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            BudgetAction::Boost => "BOOST",
            BudgetAction::Keep => "KEEP",
            BudgetAction::Curb => "CURB",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BudgetReasonCode {
    InsufficientData,
    HighPerformanceLostIs,
    HighPerformanceUsage,
    MaxBudgetReached,
    MinBudgetReached,
    LowBudgetUsage,
    ModeratePerformance,
    BudgetAvailable,
    Error,
}

impl BudgetReasonCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            BudgetReasonCode::InsufficientData => "INSUFFICIENT_DATA",
            BudgetReasonCode::HighPerformanceLostIs => "HIGH_PERFORMANCE_LOST_IS",
            BudgetReasonCode::HighPerformanceUsage => "HIGH_PERFORMANCE_USAGE",
            BudgetReasonCode::MaxBudgetReached => "MAX_BUDGET_REACHED",
            BudgetReasonCode::MinBudgetReached => "MIN_BUDGET_REACHED",
            BudgetReasonCode::LowBudgetUsage => "LOW_BUDGET_USAGE",
            BudgetReasonCode::ModeratePerformance => "MODERATE_PERFORMANCE",
            BudgetReasonCode::BudgetAvailable => "BUDGET_AVAILABLE",
            BudgetReasonCode::Error => "ERROR",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryIntent {
    Child,
    Adult,
    Concern,
    Info,
    Generic,
}

impl QueryIntent {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryIntent::Child => "child",
            QueryIntent::Adult => "adult",
            QueryIntent::Concern => "concern",
            QueryIntent::Info => "info",
            QueryIntent::Generic => "generic",
        }
    }
}

/// Cluster maturity by accumulated clicks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClusterPhase {
    Learning,
    LimitedAction,
    StopCandidate,
}

impl ClusterPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClusterPhase::Learning => "LEARNING",
            ClusterPhase::LimitedAction => "LIMITED_ACTION",
            ClusterPhase::StopCandidate => "STOP_CANDIDATE",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NegativeVerdict {
    NoAction,
    BidDown,
    Stop,
    ManualReview,
}

impl NegativeVerdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            NegativeVerdict::NoAction => "NO_ACTION",
            NegativeVerdict::BidDown => "BID_DOWN",
            NegativeVerdict::Stop => "STOP",
            NegativeVerdict::ManualReview => "MANUAL_REVIEW",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NegativeReasonCode {
    LearningPhase,
    LimitedLowCvr,
    LimitedHighAcos,
    LongTailGuard,
    RuleOfThreeStop,
    LowCvrDown,
    HighAcosDown,
    WhitelistLoosened,
    Healthy,
    Error,
}

impl NegativeReasonCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            NegativeReasonCode::LearningPhase => "LEARNING_PHASE",
            NegativeReasonCode::LimitedLowCvr => "LIMITED_LOW_CVR",
            NegativeReasonCode::LimitedHighAcos => "LIMITED_HIGH_ACOS",
            NegativeReasonCode::LongTailGuard => "LONG_TAIL_GUARD",
            NegativeReasonCode::RuleOfThreeStop => "RULE_OF_THREE_STOP",
            NegativeReasonCode::LowCvrDown => "LOW_CVR_DOWN",
            NegativeReasonCode::HighAcosDown => "HIGH_ACOS_DOWN",
            NegativeReasonCode::WhitelistLoosened => "WHITELIST_LOOSENED",
            NegativeReasonCode::Healthy => "HEALTHY",
            NegativeReasonCode::Error => "ERROR",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PromotionReasonCode {
    ProvenConverter,
    DiscoveryCandidate,
    IntentExcluded,
    Error,
}

impl PromotionReasonCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PromotionReasonCode::ProvenConverter => "PROVEN_CONVERTER",
            PromotionReasonCode::DiscoveryCandidate => "DISCOVERY_CANDIDATE",
            PromotionReasonCode::IntentExcluded => "INTENT_EXCLUDED",
            PromotionReasonCode::Error => "ERROR",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlacementAction {
    Raise,
    Keep,
    Lower,
}

impl PlacementAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlacementAction::Raise => "RAISE",
            PlacementAction::Keep => "KEEP",
            PlacementAction::Lower => "LOWER",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlacementReasonCode {
    StrongSlotPerformance,
    WeakSlotPerformance,
    InsufficientData,
    MaxMultiplierReached,
    ModeratePerformance,
}

impl PlacementReasonCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlacementReasonCode::StrongSlotPerformance => "STRONG_SLOT_PERFORMANCE",
            PlacementReasonCode::WeakSlotPerformance => "WEAK_SLOT_PERFORMANCE",
            PlacementReasonCode::InsufficientData => "INSUFFICIENT_DATA",
            PlacementReasonCode::MaxMultiplierReached => "MAX_MULTIPLIER_REACHED",
            PlacementReasonCode::ModeratePerformance => "MODERATE_PERFORMANCE",
        }
    }
}

// ---------------------------------------------------------------------------
// Input snapshots
// ---------------------------------------------------------------------------

/// Per-keyword performance snapshot, the input row of the bid engine.
/// Rolling counters cover 3h / 7d / 30d / 60d windows; "recent" rates are
/// 7d, baselines 60d.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeywordMetrics {
    pub keyword_id: String,
    pub keyword: String,
    pub campaign_id: String,
    pub ad_group_id: String,
    pub asin: String,

    /// Current bid in integer JPY.
    pub current_bid: i64,

    pub impressions_3h: u64,
    pub clicks_3h: u64,
    pub impressions_7d: u64,
    pub clicks_7d: u64,
    pub spend_7d: i64,
    pub sales_7d: i64,
    pub orders_7d: u64,
    pub impressions_30d: u64,
    pub clicks_30d: u64,
    pub spend_30d: i64,
    pub sales_30d: i64,
    pub orders_30d: u64,
    pub clicks_60d: u64,
    pub orders_60d: u64,

    pub cvr_recent: f64,
    pub cvr_baseline: f64,
    pub ctr_recent: f64,
    pub ctr_baseline: f64,
    pub acos_actual: f64,
    pub acos_target: f64,

    pub competitor_cpc: f64,
    pub competitor_cpc_baseline: f64,
    /// Competitive pressure in [0, 1].
    pub competitor_strength: f64,

    /// Top-of-search CTR/CVR multipliers relative to rest-of-search.
    pub tos_ctr_mult: f64,
    pub tos_cvr_mult: f64,
    pub tos_targeted: bool,

    /// Organic rank; `None` means out of tracked range.
    pub organic_rank: Option<u32>,
    pub organic_rank_target: u32,

    pub phase: PhaseTag,
    pub brand_type: BrandType,
    pub role: KeywordRole,
    /// Pre-computed priority rank, 1 = highest.
    pub score_rank: u32,
}

impl KeywordMetrics {
    /// ACOS actual / target, saturating when the target is degenerate.
    pub fn acos_ratio(&self) -> f64 {
        if self.acos_target <= 0.0 {
            return f64::MAX;
        }
        self.acos_actual / self.acos_target
    }

    /// Spend over allowed spend for the window; used by the STOP guardrail.
    pub fn overspend_ratio(&self) -> f64 {
        let allowed = self.sales_7d as f64 * self.acos_target;
        if allowed <= 0.0 {
            if self.spend_7d > 0 {
                return f64::MAX;
            }
            return 0.0;
        }
        self.spend_7d as f64 / allowed
    }
}

/// Per-product strategy settings and lifecycle state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductStrategy {
    pub asin: String,
    pub stage: LifecycleStage,
    /// Lowercase mirror of `stage`; kept in lockstep by construction.
    pub strategy_pattern: String,
    pub sustainable_tacos: f64,
    pub invest_tacos_cap: f64,
    pub invest_max_loss_per_month_jpy: i64,
    /// Base invest window in months.
    pub invest_window_months: u32,
    /// Dynamically granted extension months on top of the base window.
    pub invest_window_extension_months: u32,
    pub launch_date: NaiveDate,
    pub margin_rate: f64,
    pub unit_price_jpy: i64,
    pub review_rating: f64,
    pub review_count: u32,
    pub reinvest_allowed: bool,
    pub brand_terms: Vec<String>,
    pub product_core_terms: Vec<String>,
}

impl ProductStrategy {
    pub fn total_invest_window_months(&self) -> u32 {
        self.invest_window_months + self.invest_window_extension_months
    }

    /// Allowed cost per acquisition, used as the give-up cost yardstick.
    pub fn target_cpa_jpy(&self) -> f64 {
        self.unit_price_jpy as f64 * self.margin_rate
    }
}

/// Per product x month profitability row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonthlyProfit {
    pub asin: String,
    /// Month key "YYYY-MM".
    pub month: String,
    pub revenue_jpy: i64,
    pub cogs_jpy: i64,
    pub gross_profit_before_ads_jpy: i64,
    pub ad_spend_jpy: i64,
    pub ad_sales_jpy: i64,
    pub tacos: f64,
    pub acos: f64,
    pub roas: f64,
    pub net_profit_jpy: i64,
    pub net_profit_cumulative_jpy: i64,
    pub months_since_launch: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeoScore {
    pub asin: String,
    pub month: String,
    /// Overall SEO score, 0-100.
    pub overall: f64,
    pub trend: SeoTrend,
    pub rank_zone: RankZone,
    pub big_keyword_score: f64,
    pub middle_keyword_score: f64,
    pub brand_keyword_score: f64,
}

/// Designated core keyword of a product SEO push.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreKeywordConfig {
    pub asin: String,
    pub keyword: String,
    pub tier: KeywordTier,
    pub target_rank_min: u32,
    pub target_rank_max: u32,
    pub search_volume: u64,
    pub role: KeywordRole,
}

/// Aggregated organic-rank series for one keyword over the launch window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeywordRankSummary {
    pub asin: String,
    pub keyword: String,
    /// `None` = currently out of tracked range.
    pub current_rank: Option<u32>,
    pub best_rank: Option<u32>,
    pub days_with_rank_data: u32,
    pub impressions_total: u64,
    pub clicks_total: u64,
    pub orders_total: u64,
    pub cost_total_jpy: i64,
    pub revenue_total_jpy: i64,
}

impl KeywordRankSummary {
    pub fn cvr(&self) -> f64 {
        if self.clicks_total == 0 {
            return 0.0;
        }
        self.orders_total as f64 / self.clicks_total as f64
    }

    pub fn acos(&self) -> f64 {
        if self.revenue_total_jpy <= 0 {
            if self.cost_total_jpy > 0 {
                return f64::MAX;
            }
            return 0.0;
        }
        self.cost_total_jpy as f64 / self.revenue_total_jpy as f64
    }
}

/// Per-product rollup of core-keyword launch progress. Counts always
/// conserve: achieved + gave_up + active == total.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AsinSeoLaunchProgress {
    pub asin: String,
    pub total_core_keywords: u32,
    pub achieved_count: u32,
    pub gave_up_count: u32,
    pub active_count: u32,
    /// (achieved + gave_up) / total.
    pub completion_ratio: f64,
    /// achieved / total.
    pub success_ratio: f64,
}

/// Loss-budget consumption for one product. The three ratios are each
/// already normalized against their configured allowance (1.0 = fully
/// consumed).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LossBudgetSummary {
    pub asin: String,
    pub investment_state: InvestmentState,
    pub rolling_ratio: f64,
    pub launch_cumulative_ratio: f64,
    pub launch_invest_usage_ratio: f64,
    pub warning_threshold: f64,
    pub critical_threshold: f64,
}

/// Per-campaign budget snapshot, the input row of the budget engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetMetrics {
    pub campaign_id: String,
    pub campaign_name: String,
    pub daily_budget_jpy: i64,
    pub spend_today_jpy: i64,
    pub budget_usage_percent: f64,
    /// `None` when the platform did not report it for the window.
    pub lost_impression_share_budget: Option<f64>,
    pub spend_7d_jpy: i64,
    pub sales_7d_jpy: i64,
    pub orders_7d: u64,
    pub acos_7d: f64,
    pub cvr_7d: f64,
    pub spend_30d_jpy: i64,
    pub sales_30d_jpy: i64,
    pub orders_30d: u64,
    pub acos_30d: f64,
    pub target_acos: f64,
    pub low_usage_days: u32,
}

/// One search-term row from the query mining stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchTermStat {
    pub asin: String,
    pub campaign_id: String,
    pub ad_group_id: String,
    pub query: String,
    /// Source targeting match type: broad / phrase / auto.
    pub match_type: String,
    pub impressions: u64,
    pub clicks: u64,
    pub orders: u64,
    pub sales_jpy: i64,
    pub spend_jpy: i64,
    pub target_acos: f64,
}

impl SearchTermStat {
    pub fn cvr(&self) -> f64 {
        if self.clicks == 0 {
            return 0.0;
        }
        self.orders as f64 / self.clicks as f64
    }

    pub fn acos(&self) -> f64 {
        if self.sales_jpy <= 0 {
            if self.spend_jpy > 0 {
                return f64::MAX;
            }
            return 0.0;
        }
        self.spend_jpy as f64 / self.sales_jpy as f64
    }

    pub fn cpc_jpy(&self) -> f64 {
        if self.clicks == 0 {
            return 0.0;
        }
        self.spend_jpy as f64 / self.clicks as f64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlacementSlot {
    TopOfSearch,
    ProductPage,
    RestOfSearch,
}

impl PlacementSlot {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlacementSlot::TopOfSearch => "TOP_OF_SEARCH",
            PlacementSlot::ProductPage => "PRODUCT_PAGE",
            PlacementSlot::RestOfSearch => "REST_OF_SEARCH",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "TOP_OF_SEARCH" => Some(PlacementSlot::TopOfSearch),
            "PRODUCT_PAGE" => Some(PlacementSlot::ProductPage),
            "REST_OF_SEARCH" => Some(PlacementSlot::RestOfSearch),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlacementMetrics {
    pub campaign_id: String,
    pub slot: PlacementSlot,
    pub current_multiplier_percent: f64,
    pub impressions: u64,
    pub clicks: u64,
    pub spend_jpy: i64,
    pub sales_jpy: i64,
    pub acos: f64,
    pub target_acos: f64,
}

/// Per keyword x day actuals used by the backtest join.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeywordDailyPerformance {
    pub keyword_id: String,
    pub date: NaiveDate,
    pub impressions: u64,
    pub clicks: u64,
    pub spend_jpy: i64,
    pub sales_jpy: i64,
    pub orders: u64,
    pub bid_jpy: i64,
}

// ---------------------------------------------------------------------------
// Recommendation records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BidRecommendation {
    pub id: String,
    pub execution_id: String,
    pub keyword_id: String,
    pub keyword: String,
    pub campaign_id: String,
    pub ad_group_id: String,
    pub asin: String,
    pub action: BidAction,
    pub reason_code: BidReasonCode,
    /// JSON-encoded reason triple (facts / logic / impact).
    pub reason_detail: String,
    pub current_bid: i64,
    pub recommended_bid: i64,
    pub change_rate: f64,
    pub clipped: bool,
    pub clip_reason: Option<String>,
    pub guardrail_flags: Vec<String>,
    pub status: RecommendationStatus,
    pub is_applied: bool,
    pub apply_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetRecommendation {
    pub id: String,
    pub execution_id: String,
    pub campaign_id: String,
    pub campaign_name: String,
    pub action: BudgetAction,
    pub reason_code: BudgetReasonCode,
    pub reason_detail: String,
    pub current_budget: i64,
    pub recommended_budget: i64,
    pub status: RecommendationStatus,
    pub is_applied: bool,
    pub apply_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NegativeKeywordSuggestion {
    pub id: String,
    pub execution_id: String,
    pub asin: String,
    pub campaign_id: String,
    pub ad_group_id: String,
    pub query: String,
    pub intent: QueryIntent,
    pub phase: ClusterPhase,
    pub verdict: NegativeVerdict,
    pub reason_code: NegativeReasonCode,
    pub reason_detail: String,
    pub clicks: u64,
    pub impressions: u64,
    pub conversions: u64,
    pub spend_jpy: i64,
    pub status: RecommendationStatus,
    pub is_applied: bool,
    pub apply_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoExactPromotionSuggestion {
    pub id: String,
    pub execution_id: String,
    pub asin: String,
    pub campaign_id: String,
    pub ad_group_id: String,
    pub query: String,
    pub source_match_type: String,
    pub clicks: u64,
    pub orders: u64,
    pub cvr: f64,
    pub acos: f64,
    pub suggested_bid: i64,
    pub reason_code: PromotionReasonCode,
    pub reason_detail: String,
    pub status: RecommendationStatus,
    pub is_applied: bool,
    pub apply_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlacementRecommendation {
    pub id: String,
    pub execution_id: String,
    pub campaign_id: String,
    pub slot: PlacementSlot,
    pub action: PlacementAction,
    pub reason_code: PlacementReasonCode,
    pub reason_detail: String,
    pub current_multiplier_percent: f64,
    pub recommended_multiplier_percent: f64,
    pub status: RecommendationStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleTransitionRecord {
    pub id: String,
    pub execution_id: String,
    pub asin: String,
    pub from_stage: LifecycleStage,
    pub to_stage: LifecycleStage,
    pub should_transition: bool,
    pub reason: String,
    pub is_emergency_exit: bool,
    pub force_harvest: bool,
    pub extension_granted: bool,
    pub warnings: Vec<String>,
    pub status: RecommendationStatus,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Process configuration
// ---------------------------------------------------------------------------

/// Whether decisions are only persisted (shadow) or also pushed to the ad
/// platform (apply).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionMode {
    Shadow,
    Apply,
}

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_path: String,
    pub port: u16,
    pub execution_mode: ExecutionMode,
    pub negative_apply_enabled: bool,
    pub auto_exact_apply_enabled: bool,
    pub apply_api_base_url: Option<String>,
    pub apply_timeout_secs: u64,
    pub warehouse_timeout_secs: u64,
    pub notify_webhook_url: Option<String>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv::dotenv().ok();

        let database_path =
            std::env::var("DATABASE_PATH").unwrap_or_else(|_| "./bidpilot.db".to_string());

        let port = std::env::var("PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse()
            .unwrap_or(8080);

        // Unknown mode is fatal, never defaulted.
        let execution_mode = match std::env::var("BID_ENGINE_EXECUTION_MODE")
            .unwrap_or_else(|_| "SHADOW".to_string())
            .to_ascii_uppercase()
            .as_str()
        {
            "SHADOW" => ExecutionMode::Shadow,
            "APPLY" => ExecutionMode::Apply,
            other => anyhow::bail!("invalid BID_ENGINE_EXECUTION_MODE: {other}"),
        };

        let negative_apply_enabled = env_flag("NEGATIVE_APPLY_ENABLED", false);
        let auto_exact_apply_enabled = env_flag("AUTO_EXACT_APPLY_ENABLED", false);

        let apply_api_base_url = std::env::var("APPLY_API_BASE_URL").ok();

        let apply_timeout_secs = std::env::var("APPLY_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(10);

        let warehouse_timeout_secs = std::env::var("WAREHOUSE_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(30);

        let notify_webhook_url = std::env::var("NOTIFY_WEBHOOK_URL").ok();

        Ok(Self {
            database_path,
            port,
            execution_mode,
            negative_apply_enabled,
            auto_exact_apply_enabled,
            apply_api_base_url,
            apply_timeout_secs,
            warehouse_timeout_secs,
            notify_webhook_url,
        })
    }
}

fn env_flag(name: &str, default: bool) -> bool {
    std::env::var(name)
        .map(|v| matches!(v.as_str(), "1" | "true" | "TRUE" | "on" | "ON"))
        .unwrap_or(default)
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_pattern_is_lowercase_mirror() {
        for stage in [
            LifecycleStage::LaunchHard,
            LifecycleStage::LaunchSoft,
            LifecycleStage::Grow,
            LifecycleStage::Harvest,
        ] {
            assert_eq!(stage.pattern(), stage.as_str().to_ascii_lowercase());
            assert_eq!(LifecycleStage::parse(stage.as_str()), Some(stage));
        }
    }

    #[test]
    fn milder_chain_terminates_at_keep() {
        let mut action = BidAction::Stop;
        for _ in 0..3 {
            action = action.milder();
        }
        assert_eq!(action, BidAction::Keep);
        assert_eq!(BidAction::Keep.milder(), BidAction::Keep);
        assert_eq!(BidAction::StrongUp.milder(), BidAction::StrongUp);
    }

    #[test]
    fn acos_ratio_guards_zero_target() {
        let mut m = test_fixtures::keyword_metrics();
        m.acos_target = 0.0;
        assert_eq!(m.acos_ratio(), f64::MAX);
        m.acos_target = 0.25;
        m.acos_actual = 0.10;
        assert!((m.acos_ratio() - 0.4).abs() < 1e-9);
    }

    #[test]
    fn rank_summary_rates() {
        let s = KeywordRankSummary {
            asin: "B0TEST".into(),
            keyword: "kw".into(),
            current_rank: Some(4),
            best_rank: Some(2),
            days_with_rank_data: 30,
            impressions_total: 5000,
            clicks_total: 100,
            orders_total: 5,
            cost_total_jpy: 8000,
            revenue_total_jpy: 20000,
        };
        assert!((s.cvr() - 0.05).abs() < 1e-9);
        assert!((s.acos() - 0.4).abs() < 1e-9);
    }

    #[test]
    fn status_round_trips_through_strings() {
        for st in [
            RecommendationStatus::Pending,
            RecommendationStatus::Approved,
            RecommendationStatus::Rejected,
            RecommendationStatus::Applied,
        ] {
            assert_eq!(RecommendationStatus::parse(st.as_str()), Some(st));
        }
    }
}

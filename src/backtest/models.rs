//! Backtest result model.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Granularity {
    Daily,
    Weekly,
}

impl Granularity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Granularity::Daily => "DAILY",
            Granularity::Weekly => "WEEKLY",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "DAILY" => Some(Granularity::Daily),
            "WEEKLY" => Some(Granularity::Weekly),
            _ => None,
        }
    }
}

/// Replay parameters. The elasticities are the counterfactual calibration:
/// spend and sales respond to the bid ratio raised to these exponents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestParams {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub asin: Option<String>,
    pub campaign_id: Option<String>,
    pub granularity: Granularity,
    /// Product margin used for the profit-gain estimate and the post-hoc
    /// optimal sign.
    pub profit_margin: f64,
    pub spend_elasticity: f64,
    pub sales_elasticity: f64,
    /// ACOS within margin x (1 +/- band) counts as neutral for accuracy.
    pub neutral_band: f64,
}

impl BacktestParams {
    pub fn new(start_date: NaiveDate, end_date: NaiveDate) -> Self {
        Self {
            start_date,
            end_date,
            asin: None,
            campaign_id: None,
            granularity: Granularity::Daily,
            profit_margin: 0.3,
            spend_elasticity: 1.5,
            sales_elasticity: 0.7,
            neutral_band: 0.1,
        }
    }
}

/// Actual vs simulated totals over the range.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BacktestTotals {
    pub spend_jpy: f64,
    pub sales_jpy: f64,
    pub acos: f64,
}

impl BacktestTotals {
    pub fn finish(&mut self) {
        self.acos = if self.sales_jpy > 0.0 {
            self.spend_jpy / self.sales_jpy
        } else {
            0.0
        };
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BacktestImprovement {
    /// Simulated minus actual ACOS, in points (negative = improvement).
    pub acos_points: f64,
    pub spend_delta_jpy: f64,
    pub sales_delta_jpy: f64,
    /// sales delta x margin - spend delta.
    pub estimated_profit_gain_jpy: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DecisionAccuracy {
    pub total_decisions: u64,
    pub correct_decisions: u64,
    pub accuracy_rate: f64,
}

/// One aggregated period (day or ISO week).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestPeriodRow {
    /// "YYYY-MM-DD" for daily, "YYYY-Www" for weekly.
    pub period: String,
    pub matched_rows: u64,
    pub actual_spend_jpy: f64,
    pub actual_sales_jpy: f64,
    pub simulated_spend_jpy: f64,
    pub simulated_sales_jpy: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestMetadata {
    pub duration_ms: u64,
    pub recommendation_count: u64,
    pub performance_row_count: u64,
    pub matched_rows: u64,
    pub unmatched_recommendations: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestResult {
    pub execution_id: String,
    pub params: BacktestParams,
    pub actual: BacktestTotals,
    pub simulated: BacktestTotals,
    pub improvement: BacktestImprovement,
    pub accuracy: DecisionAccuracy,
    pub series: Vec<BacktestPeriodRow>,
    pub metadata: BacktestMetadata,
    pub started_at: DateTime<Utc>,
}

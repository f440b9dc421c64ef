//! Ad-platform apply sink.
//!
//! Three idempotent operations behind a trait seam: set-bid, set-budget,
//! add-negative. The HTTP implementation talks to the platform adapter
//! service with a per-call deadline; the shadow implementation records calls
//! for tests and is never reached in SHADOW mode (the orchestrator refuses
//! to stream at all). Idempotency across retries is enforced one level up
//! via the warehouse apply ledger keyed (execution_id, entity_id).

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ApplyError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NegativeMatchType {
    NegativeExact,
    NegativePhrase,
}

impl NegativeMatchType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NegativeMatchType::NegativeExact => "NEGATIVE_EXACT",
            NegativeMatchType::NegativePhrase => "NEGATIVE_PHRASE",
        }
    }
}

#[async_trait]
pub trait ApplySink: Send + Sync {
    async fn set_bid(&self, keyword_id: &str, new_bid_jpy: i64) -> Result<(), ApplyError>;
    async fn set_budget(&self, campaign_id: &str, new_budget_jpy: i64) -> Result<(), ApplyError>;
    async fn add_negative(
        &self,
        campaign_id: &str,
        ad_group_id: &str,
        expression: &str,
        match_type: NegativeMatchType,
    ) -> Result<(), ApplyError>;
}

/// Reqwest-backed sink for APPLY mode.
pub struct HttpApplySink {
    client: reqwest::Client,
    base_url: String,
}

impl HttpApplySink {
    pub fn new(base_url: String, timeout_secs: u64) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self { client, base_url })
    }

    async fn post(&self, path: &str, body: serde_json::Value) -> Result<(), ApplyError> {
        let url = format!("{}{}", self.base_url.trim_end_matches('/'), path);
        let response = self.client.post(&url).json(&body).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let text = response.text().await.unwrap_or_default();
        if status.is_server_error() || status.as_u16() == 429 {
            Err(ApplyError::Retryable(format!("{status}: {text}")))
        } else {
            Err(ApplyError::Terminal(format!("{status}: {text}")))
        }
    }
}

#[async_trait]
impl ApplySink for HttpApplySink {
    async fn set_bid(&self, keyword_id: &str, new_bid_jpy: i64) -> Result<(), ApplyError> {
        debug!(keyword_id, new_bid_jpy, "apply set_bid");
        self.post(
            "/keywords/bid",
            serde_json::json!({ "keywordId": keyword_id, "bid": new_bid_jpy }),
        )
        .await
    }

    async fn set_budget(&self, campaign_id: &str, new_budget_jpy: i64) -> Result<(), ApplyError> {
        debug!(campaign_id, new_budget_jpy, "apply set_budget");
        self.post(
            "/campaigns/budget",
            serde_json::json!({ "campaignId": campaign_id, "budget": new_budget_jpy }),
        )
        .await
    }

    async fn add_negative(
        &self,
        campaign_id: &str,
        ad_group_id: &str,
        expression: &str,
        match_type: NegativeMatchType,
    ) -> Result<(), ApplyError> {
        debug!(campaign_id, ad_group_id, expression, "apply add_negative");
        self.post(
            "/negatives",
            serde_json::json!({
                "campaignId": campaign_id,
                "adGroupId": ad_group_id,
                "expression": expression,
                "matchType": match_type.as_str(),
            }),
        )
        .await
    }
}

/// One recorded call, for assertions.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedApply {
    SetBid { keyword_id: String, bid: i64 },
    SetBudget { campaign_id: String, budget: i64 },
    AddNegative { campaign_id: String, expression: String },
}

/// In-process sink that records every call. Stands in for the platform in
/// tests and in any environment without an adapter endpoint.
#[derive(Default)]
pub struct RecordingApplySink {
    calls: Mutex<Vec<RecordedApply>>,
    fail_with: Mutex<Option<String>>,
}

impl RecordingApplySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail terminally with this message.
    pub fn fail_terminally(&self, message: &str) {
        *self.fail_with.lock() = Some(message.to_string());
    }

    pub fn calls(&self) -> Vec<RecordedApply> {
        self.calls.lock().clone()
    }

    fn check(&self) -> Result<(), ApplyError> {
        if let Some(msg) = self.fail_with.lock().clone() {
            return Err(ApplyError::Terminal(msg));
        }
        Ok(())
    }
}

#[async_trait]
impl ApplySink for RecordingApplySink {
    async fn set_bid(&self, keyword_id: &str, new_bid_jpy: i64) -> Result<(), ApplyError> {
        self.check()?;
        self.calls.lock().push(RecordedApply::SetBid {
            keyword_id: keyword_id.to_string(),
            bid: new_bid_jpy,
        });
        Ok(())
    }

    async fn set_budget(&self, campaign_id: &str, new_budget_jpy: i64) -> Result<(), ApplyError> {
        self.check()?;
        self.calls.lock().push(RecordedApply::SetBudget {
            campaign_id: campaign_id.to_string(),
            budget: new_budget_jpy,
        });
        Ok(())
    }

    async fn add_negative(
        &self,
        campaign_id: &str,
        _ad_group_id: &str,
        expression: &str,
        _match_type: NegativeMatchType,
    ) -> Result<(), ApplyError> {
        self.check()?;
        self.calls.lock().push(RecordedApply::AddNegative {
            campaign_id: campaign_id.to_string(),
            expression: expression.to_string(),
        });
        Ok(())
    }
}

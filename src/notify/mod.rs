//! Run-summary notification fan-out.
//!
//! The orchestrator emits one structured summary per engine run. The
//! webhook notifier posts it as JSON (Slack-compatible payload shape); the
//! log notifier is the default when no webhook is configured. Notification
//! failure never fails a run.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{info, warn};

/// Structured summary of one engine run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub execution_id: String,
    pub engine: String,
    pub dry_run: bool,
    pub total_records: usize,
    /// Count per emitted action string.
    pub action_counts: BTreeMap<String, usize>,
    pub error_records: usize,
    pub applied_records: usize,
    pub apply_errors: usize,
    pub duration_ms: u64,
}

impl RunSummary {
    pub fn new(execution_id: &str, engine: &str, dry_run: bool) -> Self {
        Self {
            execution_id: execution_id.to_string(),
            engine: engine.to_string(),
            dry_run,
            total_records: 0,
            action_counts: BTreeMap::new(),
            error_records: 0,
            applied_records: 0,
            apply_errors: 0,
            duration_ms: 0,
        }
    }

    pub fn count_action(&mut self, action: &str) {
        *self.action_counts.entry(action.to_string()).or_insert(0) += 1;
        self.total_records += 1;
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, summary: &RunSummary);
}

/// Default notifier: structured log line only.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, summary: &RunSummary) {
        info!(
            execution_id = %summary.execution_id,
            engine = %summary.engine,
            dry_run = summary.dry_run,
            total = summary.total_records,
            errors = summary.error_records,
            applied = summary.applied_records,
            apply_errors = summary.apply_errors,
            duration_ms = summary.duration_ms,
            "engine run complete"
        );
    }
}

/// Posts the summary to a webhook. Failures are logged and swallowed.
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            url,
        }
    }

    fn format_text(summary: &RunSummary) -> String {
        let actions = summary
            .action_counts
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(" ");
        format!(
            "[{}] {} records={} {} errors={} applied={} ({}ms){}",
            summary.engine,
            summary.execution_id,
            summary.total_records,
            actions,
            summary.error_records,
            summary.applied_records,
            summary.duration_ms,
            if summary.dry_run { " [dry-run]" } else { "" },
        )
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, summary: &RunSummary) {
        let payload = serde_json::json!({
            "text": Self::format_text(summary),
            "summary": summary,
        });
        if let Err(err) = self.client.post(&self.url).json(&payload).send().await {
            warn!(error = %err, "run summary webhook failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_counting_accumulates() {
        let mut s = RunSummary::new("exec-1", "bid", false);
        s.count_action("KEEP");
        s.count_action("KEEP");
        s.count_action("STRONG_UP");
        assert_eq!(s.total_records, 3);
        assert_eq!(s.action_counts.get("KEEP"), Some(&2));
    }

    #[test]
    fn webhook_text_mentions_dry_run() {
        let mut s = RunSummary::new("exec-1", "budget", true);
        s.count_action("BOOST");
        let text = WebhookNotifier::format_text(&s);
        assert!(text.contains("[budget]"));
        assert!(text.contains("BOOST=1"));
        assert!(text.contains("[dry-run]"));
    }
}

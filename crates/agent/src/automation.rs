//! Hand-off of qualified leads to the downstream automation service.
//!
//! Submission never blocks a chat turn. Jobs go onto a bounded queue drained
//! by one worker task; every delivery result is logged and also published on
//! a receipt channel for whoever wants to observe it.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use sha2::Sha256;
use telos_core::config::AutomationConfig;
use telos_core::domain::lead::Lead;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{info, warn};

type HmacSha256 = Hmac<Sha256>;

pub const LEAD_CREATED_EVENT: &str = "lead.created";
pub const SIGNATURE_HEADER: &str = "x-webhook-signature";
pub const LEAD_WEBHOOK_PATH: &str = "/webhooks/lead";
pub const LEAD_SOURCE: &str = "Telos Chat";

#[derive(Debug, Error)]
pub enum AutomationError {
    #[error("automation service is not configured")]
    NotConfigured,
    #[error("automation request failed: {0}")]
    Transport(String),
    #[error("automation service rejected the lead with status {status}")]
    Rejected { status: u16 },
    #[error("could not encode automation payload: {0}")]
    Encode(String),
    #[error("automation queue is full")]
    QueueFull,
    #[error("automation queue worker has stopped")]
    QueueClosed,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LeadPayload {
    #[serde(rename = "leadId")]
    pub lead_id: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub company: Option<String>,
    pub project_title: String,
    pub project_summary: Option<String>,
    pub automation_area: Option<String>,
    pub tools_used: Vec<String>,
    pub budget_range: Option<String>,
    pub timeline: Option<String>,
    pub urgency: Option<String>,
    pub interest_level: Option<i64>,
    pub source: String,
    pub created_at: DateTime<Utc>,
}

impl From<&Lead> for LeadPayload {
    fn from(lead: &Lead) -> Self {
        let fields = &lead.fields;
        let area = fields.automation_area.as_deref().filter(|area| !area.trim().is_empty());
        Self {
            lead_id: lead.id.to_string(),
            name: fields.name.clone(),
            email: fields.email.clone(),
            company: fields.company.clone(),
            project_title: format!("{} Automation", area.unwrap_or("AI")),
            project_summary: fields.problem_text.clone(),
            automation_area: fields.automation_area.clone(),
            tools_used: fields.tools_used.clone().unwrap_or_default(),
            budget_range: fields.budget_range.clone(),
            timeline: fields.timeline.clone(),
            urgency: fields.urgency.clone(),
            interest_level: fields.interest_level,
            source: LEAD_SOURCE.to_string(),
            created_at: lead.created_at,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AutomationEnvelope {
    pub event: String,
    pub data: LeadPayload,
    pub timestamp: DateTime<Utc>,
}

impl AutomationEnvelope {
    pub fn lead_created(lead: &Lead) -> Self {
        Self {
            event: LEAD_CREATED_EVENT.to_string(),
            data: LeadPayload::from(lead),
            timestamp: Utc::now(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AutomationOutcome {
    pub lead_id: String,
    pub delivered: bool,
    pub workflow_id: Option<String>,
    pub error: Option<String>,
}

#[async_trait]
pub trait AutomationSink: Send + Sync {
    /// Returns the downstream workflow id when the service reports one.
    async fn deliver(&self, envelope: &AutomationEnvelope) -> Result<Option<String>, AutomationError>;
}

pub struct HttpAutomationSink {
    client: Client,
    endpoint: String,
    secret: Option<SecretString>,
}

impl HttpAutomationSink {
    pub fn new(
        service_url: &str,
        secret: Option<SecretString>,
        timeout: Duration,
    ) -> Result<Self, AutomationError> {
        let base = service_url.trim().trim_end_matches('/');
        if base.is_empty() || base.contains("placeholder") {
            return Err(AutomationError::NotConfigured);
        }
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| AutomationError::Transport(error.to_string()))?;
        Ok(Self { client, endpoint: format!("{base}{LEAD_WEBHOOK_PATH}"), secret })
    }

    /// `None` when automation is switched off.
    pub fn from_config(config: &AutomationConfig) -> Result<Option<Self>, AutomationError> {
        if !config.enabled {
            return Ok(None);
        }
        let service_url = config.service_url.as_deref().ok_or(AutomationError::NotConfigured)?;
        Self::new(
            service_url,
            config.webhook_secret.clone(),
            Duration::from_secs(config.timeout_secs),
        )
        .map(Some)
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl AutomationSink for HttpAutomationSink {
    async fn deliver(&self, envelope: &AutomationEnvelope) -> Result<Option<String>, AutomationError> {
        let body =
            serde_json::to_vec(envelope).map_err(|error| AutomationError::Encode(error.to_string()))?;

        let mut request = self
            .client
            .post(&self.endpoint)
            .header(reqwest::header::CONTENT_TYPE, "application/json");
        if let Some(secret) = &self.secret {
            request = request.header(SIGNATURE_HEADER, sign_payload(secret, &body));
        }

        let response = request
            .body(body)
            .send()
            .await
            .map_err(|error| AutomationError::Transport(error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AutomationError::Rejected { status: status.as_u16() });
        }

        let workflow_id = response
            .json::<serde_json::Value>()
            .await
            .ok()
            .and_then(|value| value.get("workflowId").and_then(|id| id.as_str()).map(str::to_string));
        Ok(workflow_id)
    }
}

/// Hex HMAC-SHA256 of the exact request body.
pub fn sign_payload(secret: &SecretString, body: &[u8]) -> String {
    let mut mac = match HmacSha256::new_from_slice(secret.expose_secret().as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(body);
    encode_hex(mac.finalize().into_bytes().as_slice())
}

fn encode_hex(bytes: &[u8]) -> String {
    let mut output = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        output.push_str(&format!("{byte:02x}"));
    }
    output
}

/// Submit side of the automation queue.
#[derive(Clone, Debug)]
pub struct AutomationQueue {
    jobs: mpsc::Sender<AutomationEnvelope>,
}

impl AutomationQueue {
    /// Starts the delivery worker. Must be called inside a tokio runtime.
    pub fn spawn(
        sink: Arc<dyn AutomationSink>,
        capacity: usize,
    ) -> (Self, mpsc::Receiver<AutomationOutcome>) {
        let capacity = capacity.max(1);
        let (jobs, mut pending) = mpsc::channel::<AutomationEnvelope>(capacity);
        let (receipts, receipt_rx) = mpsc::channel::<AutomationOutcome>(capacity);

        tokio::spawn(async move {
            while let Some(envelope) = pending.recv().await {
                let lead_id = envelope.data.lead_id.clone();
                let outcome = match sink.deliver(&envelope).await {
                    Ok(workflow_id) => {
                        info!(
                            event_name = "automation.lead.delivered",
                            correlation_id = %lead_id,
                            "lead handed to automation service"
                        );
                        AutomationOutcome { lead_id, delivered: true, workflow_id, error: None }
                    }
                    Err(error) => {
                        warn!(
                            event_name = "automation.lead.failed",
                            correlation_id = %lead_id,
                            error = %error,
                            "lead hand-off to automation service failed"
                        );
                        AutomationOutcome {
                            lead_id,
                            delivered: false,
                            workflow_id: None,
                            error: Some(error.to_string()),
                        }
                    }
                };
                // Receipts are best effort; the log line above is the record.
                let _ = receipts.try_send(outcome);
            }
        });

        (Self { jobs }, receipt_rx)
    }

    /// Queue posting to the configured service, or `None` when automation is off.
    pub fn from_config(
        config: &AutomationConfig,
    ) -> Result<Option<(Self, mpsc::Receiver<AutomationOutcome>)>, AutomationError> {
        let Some(sink) = HttpAutomationSink::from_config(config)? else {
            return Ok(None);
        };
        Ok(Some(Self::spawn(Arc::new(sink), config.queue_capacity)))
    }

    pub fn submit(&self, envelope: AutomationEnvelope) -> Result<(), AutomationError> {
        self.jobs.try_send(envelope).map_err(|error| match error {
            mpsc::error::TrySendError::Full(_) => AutomationError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => AutomationError::QueueClosed,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use secrecy::SecretString;
    use telos_core::config::AppConfig;
    use telos_core::domain::lead::Lead;
    use tokio::sync::{Mutex, Notify};

    use super::{
        sign_payload, AutomationEnvelope, AutomationError, AutomationQueue, AutomationSink,
        HttpAutomationSink, LEAD_CREATED_EVENT,
    };

    #[derive(Default)]
    struct RecordingSink {
        delivered: Mutex<Vec<AutomationEnvelope>>,
        fail: bool,
    }

    #[async_trait]
    impl AutomationSink for RecordingSink {
        async fn deliver(
            &self,
            envelope: &AutomationEnvelope,
        ) -> Result<Option<String>, AutomationError> {
            if self.fail {
                return Err(AutomationError::Rejected { status: 503 });
            }
            self.delivered.lock().await.push(envelope.clone());
            Ok(Some("wf-1".to_string()))
        }
    }

    struct BlockedSink {
        release: Arc<Notify>,
    }

    #[async_trait]
    impl AutomationSink for BlockedSink {
        async fn deliver(
            &self,
            _envelope: &AutomationEnvelope,
        ) -> Result<Option<String>, AutomationError> {
            self.release.notified().await;
            Ok(None)
        }
    }

    fn qualified_lead() -> Lead {
        let mut lead = Lead::new("website_chat");
        lead.fields.name = Some("Priya Raman".to_string());
        lead.fields.email = Some("priya@lumenlogistics.io".to_string());
        lead.fields.company = Some("Lumen Logistics".to_string());
        lead.fields.automation_area = Some("Invoice matching".to_string());
        lead
    }

    #[test]
    fn envelope_carries_lead_created_shape() {
        let lead = qualified_lead();
        let envelope = AutomationEnvelope::lead_created(&lead);
        let json = serde_json::to_value(&envelope).expect("serialize");

        assert_eq!(json["event"], LEAD_CREATED_EVENT);
        assert_eq!(json["data"]["leadId"], lead.id.to_string());
        assert_eq!(json["data"]["project_title"], "Invoice matching Automation");
        assert_eq!(json["data"]["source"], "Telos Chat");
        assert_eq!(json["data"]["tools_used"], serde_json::json!([]));
    }

    #[test]
    fn project_title_defaults_to_ai() {
        let mut lead = qualified_lead();
        lead.fields.automation_area = None;
        assert_eq!(AutomationEnvelope::lead_created(&lead).data.project_title, "AI Automation");
    }

    #[test]
    fn signature_is_stable_hex_hmac() {
        let secret = SecretString::from("whsec-test".to_string());
        let first = sign_payload(&secret, b"{\"event\":\"lead.created\"}");
        let second = sign_payload(&secret, b"{\"event\":\"lead.created\"}");
        let other = sign_payload(&secret, b"{\"event\":\"lead.updated\"}");

        assert_eq!(first.len(), 64);
        assert!(first.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(first, second);
        assert_ne!(first, other);
    }

    #[test]
    fn placeholder_service_url_is_not_configured() {
        let result = HttpAutomationSink::new("https://placeholder.example", None, Duration::from_secs(5));
        assert!(matches!(result, Err(AutomationError::NotConfigured)));

        let sink = HttpAutomationSink::new("https://automation.local/", None, Duration::from_secs(5))
            .expect("valid url");
        assert_eq!(sink.endpoint(), "https://automation.local/webhooks/lead");
    }

    #[tokio::test]
    async fn queue_delivers_and_reports_receipts() {
        let sink = Arc::new(RecordingSink::default());
        let (queue, mut receipts) = AutomationQueue::spawn(sink.clone(), 4);
        let lead = qualified_lead();

        queue.submit(AutomationEnvelope::lead_created(&lead)).expect("submit");
        let outcome = receipts.recv().await.expect("receipt");

        assert!(outcome.delivered);
        assert_eq!(outcome.lead_id, lead.id.to_string());
        assert_eq!(outcome.workflow_id.as_deref(), Some("wf-1"));
        assert_eq!(sink.delivered.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn failed_delivery_is_reported_not_swallowed() {
        let sink = Arc::new(RecordingSink { fail: true, ..RecordingSink::default() });
        let (queue, mut receipts) = AutomationQueue::spawn(sink, 4);

        queue.submit(AutomationEnvelope::lead_created(&qualified_lead())).expect("submit");
        let outcome = receipts.recv().await.expect("receipt");

        assert!(!outcome.delivered);
        assert!(outcome.error.is_some_and(|error| error.contains("503")));
    }

    #[tokio::test]
    async fn full_queue_rejects_instead_of_waiting() {
        let release = Arc::new(Notify::new());
        let sink = Arc::new(BlockedSink { release: release.clone() });
        let (queue, _receipts) = AutomationQueue::spawn(sink, 1);
        let lead = qualified_lead();

        let mut saw_full = false;
        for _ in 0..4 {
            if let Err(AutomationError::QueueFull) =
                queue.submit(AutomationEnvelope::lead_created(&lead))
            {
                saw_full = true;
            }
        }
        assert!(saw_full);
        release.notify_waiters();
    }

    #[tokio::test]
    async fn disabled_automation_builds_no_queue() {
        let config = AppConfig::default().automation;
        assert!(AutomationQueue::from_config(&config).expect("disabled").is_none());

        let enabled = telos_core::config::AutomationConfig {
            enabled: true,
            service_url: Some("https://automation.local".to_string()),
            ..config
        };
        assert!(AutomationQueue::from_config(&enabled).expect("enabled").is_some());
    }
}

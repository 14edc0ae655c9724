//! Webhook registry and MIGP delivery
//!
//! Registered webhooks receive a MIGP envelope, `{type: "MIGP", timestamp,
//! data}`, on every send. Delivery is one attempt per hook; the outcome of
//! each attempt is reported back rather than retried.

use chrono::{DateTime, Utc};
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{LedgerError, LedgerResult};
use crate::store::JsonDocument;

pub const MIGP_VERSION: &str = "1.0";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Webhook {
    pub id: String,
    pub url: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub active: bool,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct WebhookDoc {
    webhooks: Vec<Webhook>,
}

pub struct WebhookRegistry {
    store: JsonDocument<WebhookDoc>,
    doc: WebhookDoc,
}

impl WebhookRegistry {
    pub async fn open(path: impl Into<PathBuf>) -> Self {
        let store = JsonDocument::new(path);
        let doc = store.load_or_default().await;
        Self { store, doc }
    }

    pub async fn register(&mut self, url: &str, name: Option<&str>) -> LedgerResult<Webhook> {
        let url = url.trim();
        if url.is_empty() {
            return Err(LedgerError::validation("url is required"));
        }
        let parsed = Url::parse(url)
            .map_err(|e| LedgerError::validation(format!("invalid url {url}: {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(LedgerError::validation(format!(
                "unsupported url scheme: {}",
                parsed.scheme()
            )));
        }

        let id = self.unused_id();
        let webhook = Webhook {
            name: name
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| format!("webhook-{id}")),
            id,
            url: url.to_string(),
            created_at: Utc::now(),
            active: true,
        };

        self.doc.webhooks.push(webhook.clone());
        self.store.save(&self.doc).await?;
        info!("Registered webhook {} -> {}", webhook.id, webhook.url);
        Ok(webhook)
    }

    pub async fn unregister(&mut self, id: &str) -> LedgerResult<Webhook> {
        let idx = self
            .doc
            .webhooks
            .iter()
            .position(|w| w.id == id)
            .ok_or_else(|| LedgerError::not_found("webhook", id))?;
        let removed = self.doc.webhooks.remove(idx);
        self.store.save(&self.doc).await?;
        Ok(removed)
    }

    pub fn list(&self) -> &[Webhook] {
        &self.doc.webhooks
    }

    pub fn active(&self) -> Vec<Webhook> {
        self.doc.webhooks.iter().filter(|w| w.active).cloned().collect()
    }

    fn unused_id(&self) -> String {
        loop {
            let id = crate::short_id();
            if !self.doc.webhooks.iter().any(|w| w.id == id) {
                return id;
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MigpPayload {
    #[serde(rename = "type")]
    pub kind: String,
    pub timestamp: DateTime<Utc>,
    pub data: Value,
}

impl MigpPayload {
    pub fn new(data: Value) -> Self {
        Self {
            kind: "MIGP".to_string(),
            timestamp: Utc::now(),
            data,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    /// 2xx response
    Success,
    /// Any other HTTP response
    Failed,
    /// No response at all
    Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeliveryResult {
    pub webhook_id: String,
    pub url: String,
    pub status: DeliveryStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MigpDelivery {
    pub sent_at: DateTime<Utc>,
    pub payload: MigpPayload,
    pub results: Vec<DeliveryResult>,
    pub total: usize,
    pub successful: usize,
}

/// HTTP side of webhook delivery. Holds one pooled client for the process.
#[derive(Clone)]
pub struct MigpDispatcher {
    client: Client,
    source: String,
}

impl MigpDispatcher {
    pub fn new(timeout: Duration, source: impl Into<String>) -> LedgerResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LedgerError::Delivery(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            source: source.into(),
        })
    }

    pub async fn send(&self, hooks: &[Webhook], data: Value) -> MigpDelivery {
        let payload = MigpPayload::new(data);
        let mut results = Vec::with_capacity(hooks.len());

        for hook in hooks {
            results.push(self.deliver(hook, &payload).await);
        }

        let successful = results
            .iter()
            .filter(|r| r.status == DeliveryStatus::Success)
            .count();
        info!("MIGP delivered to {}/{} webhooks", successful, results.len());

        MigpDelivery {
            sent_at: Utc::now(),
            payload,
            total: results.len(),
            successful,
            results,
        }
    }

    async fn deliver(&self, hook: &Webhook, payload: &MigpPayload) -> DeliveryResult {
        let response = self
            .client
            .post(&hook.url)
            .header("X-MIGP-Version", MIGP_VERSION)
            .header("X-Source", &self.source)
            .json(payload)
            .send()
            .await;

        match response {
            Ok(resp) => {
                let code = resp.status();
                debug!("Webhook {} answered {}", hook.id, code);
                DeliveryResult {
                    webhook_id: hook.id.clone(),
                    url: hook.url.clone(),
                    status: if code.is_success() {
                        DeliveryStatus::Success
                    } else {
                        DeliveryStatus::Failed
                    },
                    status_code: Some(code.as_u16()),
                    error: None,
                }
            }
            Err(e) => {
                warn!("Webhook {} unreachable: {}", hook.id, e);
                DeliveryResult {
                    webhook_id: hook.id.clone(),
                    url: hook.url.clone(),
                    status: DeliveryStatus::Error,
                    status_code: None,
                    error: Some(e.to_string()),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{extract::State, http::{HeaderMap, StatusCode}, routing::post, Json, Router};
    use serde_json::json;
    use std::collections::HashSet;
    use std::sync::{Arc, Mutex};
    use tempfile::tempdir;

    type Received = Arc<Mutex<Vec<(Option<String>, Value)>>>;

    async fn receiver() -> (String, Received) {
        let received: Received = Arc::default();
        let app = Router::new()
            .route(
                "/ok",
                post(|State(rx): State<Received>, headers: HeaderMap, Json(body): Json<Value>| async move {
                    let version = headers
                        .get("X-MIGP-Version")
                        .and_then(|v| v.to_str().ok())
                        .map(str::to_string);
                    rx.lock().unwrap().push((version, body));
                    StatusCode::OK
                }),
            )
            .route("/broken", post(|| async { StatusCode::INTERNAL_SERVER_ERROR }))
            .with_state(received.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}"), received)
    }

    #[tokio::test]
    async fn test_register_assigns_unique_ids() {
        let dir = tempdir().unwrap();
        let mut registry = WebhookRegistry::open(dir.path().join("webhooks.json")).await;

        let mut ids = HashSet::new();
        for _ in 0..25 {
            let hook = registry.register("http://localhost:9/hook", None).await.unwrap();
            assert_eq!(hook.name, format!("webhook-{}", hook.id));
            assert!(ids.insert(hook.id));
        }

        let reopened = WebhookRegistry::open(dir.path().join("webhooks.json")).await;
        assert_eq!(reopened.list().len(), 25);
    }

    #[tokio::test]
    async fn test_register_rejects_bad_urls() {
        let dir = tempdir().unwrap();
        let mut registry = WebhookRegistry::open(dir.path().join("webhooks.json")).await;
        for url in ["", "not a url", "ftp://example.com/drop"] {
            assert!(matches!(
                registry.register(url, None).await,
                Err(LedgerError::Validation(_))
            ));
        }
    }

    #[tokio::test]
    async fn test_unregister_removes_hook() {
        let dir = tempdir().unwrap();
        let mut registry = WebhookRegistry::open(dir.path().join("webhooks.json")).await;
        let hook = registry.register("https://example.com/h", Some("main")).await.unwrap();
        assert_eq!(hook.name, "main");
        registry.unregister(&hook.id).await.unwrap();
        assert!(registry.active().is_empty());
        assert!(registry.unregister(&hook.id).await.is_err());
    }

    #[tokio::test]
    async fn test_send_reports_each_outcome() {
        let (base, received) = receiver().await;

        // A port nothing listens on.
        let closed = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let closed_addr = closed.local_addr().unwrap();
        drop(closed);

        let now = Utc::now();
        let hook = |id: &str, url: String| Webhook {
            id: id.to_string(),
            url,
            name: id.to_string(),
            created_at: now,
            active: true,
        };
        let hooks = vec![
            hook("ok", format!("{base}/ok")),
            hook("broken", format!("{base}/broken")),
            hook("gone", format!("http://{closed_addr}/hook")),
        ];

        let dispatcher = MigpDispatcher::new(Duration::from_secs(5), "test").unwrap();
        let delivery = dispatcher.send(&hooks, json!({"coherence": 0.8})).await;

        assert_eq!(delivery.total, 3);
        assert_eq!(delivery.successful, 1);
        assert_eq!(delivery.results[0].status, DeliveryStatus::Success);
        assert_eq!(delivery.results[1].status, DeliveryStatus::Failed);
        assert_eq!(delivery.results[1].status_code, Some(500));
        assert_eq!(delivery.results[2].status, DeliveryStatus::Error);
        assert!(delivery.results[2].error.is_some());

        let received = received.lock().unwrap();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].0.as_deref(), Some(MIGP_VERSION));
        assert_eq!(received[0].1["type"], "MIGP");
        assert_eq!(received[0].1["data"]["coherence"], 0.8);
    }
}

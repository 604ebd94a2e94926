//! Webhook dispatcher.
//!
//! Renders each job's template and POSTs it to the webhook URL with a
//! per-request timeout. Jobs run concurrently up to a fixed bound and every
//! job resolves to exactly one terminal outcome; a failing endpoint never
//! affects its siblings. Nothing is retried within a dispatch.

use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::stream::{self, Stream, StreamExt};
use uuid::Uuid;

use stockwatch_common::types::{Candidate, ConditionKind, DeliveryStatus, WebhookConfig};

use crate::template::{self, TemplateError, TemplateVars};

/// Longest response-body excerpt kept in an error detail.
const MAX_ERROR_BODY: usize = 256;

/// One (webhook, candidate) delivery to perform.
#[derive(Debug, Clone)]
pub struct DispatchJob {
    pub webhook: WebhookConfig,
    pub candidate: Candidate,
}

/// Terminal outcome of a single job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Endpoint answered with a 2xx status.
    Delivered { http_status: u16 },
    /// Non-2xx answer or a transport error.
    Failed {
        reason: String,
        http_status: Option<u16>,
    },
    /// No answer within the configured timeout.
    TimedOut,
    /// The template could not be rendered; nothing was sent.
    TemplateInvalid(TemplateError),
}

impl DeliveryOutcome {
    /// Status to record in the notification log, or `None` when no request
    /// was made.
    pub fn log_status(&self) -> Option<DeliveryStatus> {
        match self {
            DeliveryOutcome::Delivered { .. } => Some(DeliveryStatus::Delivered),
            DeliveryOutcome::Failed { .. } => Some(DeliveryStatus::Failed),
            DeliveryOutcome::TimedOut => Some(DeliveryStatus::TimedOut),
            DeliveryOutcome::TemplateInvalid(_) => None,
        }
    }

    pub fn is_delivered(&self) -> bool {
        matches!(self, DeliveryOutcome::Delivered { .. })
    }

    pub fn http_status(&self) -> Option<u16> {
        match self {
            DeliveryOutcome::Delivered { http_status } => Some(*http_status),
            DeliveryOutcome::Failed { http_status, .. } => *http_status,
            _ => None,
        }
    }

    pub fn error_detail(&self) -> Option<String> {
        match self {
            DeliveryOutcome::Delivered { .. } => None,
            DeliveryOutcome::Failed { reason, .. } => Some(reason.clone()),
            DeliveryOutcome::TimedOut => Some("request timed out".to_string()),
            DeliveryOutcome::TemplateInvalid(e) => Some(format!("template error: {}", e)),
        }
    }
}

/// Result of a job, keyed by who/what it was for.
#[derive(Debug, Clone)]
pub struct DispatchResult {
    pub user_id: Uuid,
    pub webhook_id: Uuid,
    pub item_id: Uuid,
    pub condition: ConditionKind,
    pub outcome: DeliveryOutcome,
    pub finished_at: DateTime<Utc>,
}

/// HTTP webhook sender shared across runs.
#[derive(Debug, Clone)]
pub struct WebhookDispatcher {
    client: reqwest::Client,
    timeout: Duration,
    concurrency: usize,
}

impl WebhookDispatcher {
    pub fn new(timeout: Duration, concurrency: usize) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("stockwatch/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            timeout,
            concurrency: concurrency.max(1),
        })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Render and send one job, never failing: every error becomes an outcome.
    pub async fn deliver(&self, job: &DispatchJob) -> DeliveryOutcome {
        let webhook_id = job.webhook.id;
        let item_id = job.candidate.item.id;

        let vars = TemplateVars::from(&job.candidate);
        let rendered = match template::render(&job.webhook.template, &vars) {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(
                    webhook_id = %webhook_id,
                    item_id = %item_id,
                    error = %e,
                    "Skipping webhook with invalid template"
                );
                return DeliveryOutcome::TemplateInvalid(e);
            }
        };

        let result = self
            .client
            .post(&job.webhook.url)
            .timeout(self.timeout)
            .header(reqwest::header::CONTENT_TYPE, rendered.content_type)
            .body(rendered.body)
            .send()
            .await;

        let outcome = match result {
            Ok(response) if response.status().is_success() => DeliveryOutcome::Delivered {
                http_status: response.status().as_u16(),
            },
            Ok(response) => {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                DeliveryOutcome::Failed {
                    reason: format!("HTTP {}: {}", status, truncate(&body, MAX_ERROR_BODY)),
                    http_status: Some(status.as_u16()),
                }
            }
            Err(e) if e.is_timeout() => DeliveryOutcome::TimedOut,
            Err(e) => DeliveryOutcome::Failed {
                reason: e.to_string(),
                http_status: None,
            },
        };

        match &outcome {
            DeliveryOutcome::Delivered { http_status } => tracing::info!(
                webhook_id = %webhook_id,
                item_id = %item_id,
                condition = %job.candidate.condition,
                http_status,
                "Webhook delivered"
            ),
            DeliveryOutcome::TimedOut => tracing::warn!(
                webhook_id = %webhook_id,
                item_id = %item_id,
                timeout_ms = self.timeout.as_millis() as u64,
                "Webhook timed out"
            ),
            other => tracing::warn!(
                webhook_id = %webhook_id,
                item_id = %item_id,
                error = %other.error_detail().unwrap_or_default(),
                "Webhook delivery failed"
            ),
        }

        outcome
    }

    /// Deliver all jobs concurrently, yielding each result as soon as its
    /// outcome is known.
    pub fn dispatch(&self, jobs: Vec<DispatchJob>) -> impl Stream<Item = DispatchResult> + '_ {
        stream::iter(jobs)
            .map(move |job| async move {
                let outcome = self.deliver(&job).await;
                DispatchResult {
                    user_id: job.webhook.user_id,
                    webhook_id: job.webhook.id,
                    item_id: job.candidate.item.id,
                    condition: job.candidate.condition,
                    outcome,
                    finished_at: Utc::now(),
                }
            })
            .buffer_unordered(self.concurrency)
    }

    /// Deliver all jobs and collect the results.
    pub async fn dispatch_all(&self, jobs: Vec<DispatchJob>) -> Vec<DispatchResult> {
        self.dispatch(jobs).collect().await
    }
}

fn truncate(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use axum::Router;
    use axum::extract::State;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use chrono::NaiveDate;
    use stockwatch_common::types::Item;

    use super::*;

    #[derive(Clone, Default)]
    struct Received {
        bodies: Arc<Mutex<Vec<(String, String)>>>,
    }

    /// Spawn a local webhook receiver answering with `status` after `delay`.
    async fn spawn_receiver(status: StatusCode, delay: Duration) -> (String, Received) {
        let received = Received::default();
        let app = Router::new()
            .route(
                "/hook",
                post(
                    move |State(rx): State<Received>, headers: HeaderMap, body: String| async move {
                        tokio::time::sleep(delay).await;
                        let content_type = headers
                            .get("content-type")
                            .and_then(|v| v.to_str().ok())
                            .unwrap_or_default()
                            .to_string();
                        rx.bodies.lock().unwrap().push((content_type, body));
                        status
                    },
                ),
            )
            .with_state(received.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        (format!("http://{}/hook", addr), received)
    }

    fn candidate(name: &str) -> Candidate {
        let now = Utc::now();
        Candidate {
            item: Item {
                id: Uuid::new_v4(),
                user_id: Uuid::nil(),
                name: name.to_string(),
                stock: 1,
                expiration_date: NaiveDate::from_ymd_opt(2026, 10, 21),
                lifespan_days: None,
                notify_advance_days: 3,
                notify_enabled: true,
                archived: false,
                created_at: now,
                updated_at: now,
            },
            condition: ConditionKind::Expiring,
            days_left: Some(2),
        }
    }

    fn webhook(url: &str, template: &str) -> WebhookConfig {
        WebhookConfig {
            id: Uuid::new_v4(),
            user_id: Uuid::nil(),
            name: "test".to_string(),
            url: url.to_string(),
            enabled: true,
            template: template.to_string(),
            created_at: Utc::now(),
        }
    }

    fn dispatcher(timeout_ms: u64) -> WebhookDispatcher {
        WebhookDispatcher::new(Duration::from_millis(timeout_ms), 4).unwrap()
    }

    #[tokio::test]
    async fn test_delivered_on_2xx() {
        let (url, received) = spawn_receiver(StatusCode::NO_CONTENT, Duration::ZERO).await;
        let job = DispatchJob {
            webhook: webhook(&url, "{{name}} has {{days_left}} days"),
            candidate: candidate("Milk"),
        };

        let outcome = dispatcher(5_000).deliver(&job).await;

        assert_eq!(outcome, DeliveryOutcome::Delivered { http_status: 204 });
        let bodies = received.bodies.lock().unwrap();
        assert_eq!(bodies.len(), 1);
        assert_eq!(bodies[0].1, "Milk has 2 days");
        assert!(bodies[0].0.starts_with("text/plain"));
    }

    #[tokio::test]
    async fn test_json_template_sent_as_json() {
        let (url, received) = spawn_receiver(StatusCode::OK, Duration::ZERO).await;
        let job = DispatchJob {
            webhook: webhook(&url, ""),
            candidate: candidate("Eggs"),
        };

        let outcome = dispatcher(5_000).deliver(&job).await;

        assert!(outcome.is_delivered());
        let bodies = received.bodies.lock().unwrap();
        assert_eq!(bodies[0].0, "application/json");
        let json: serde_json::Value = serde_json::from_str(&bodies[0].1).unwrap();
        assert!(json["text"].as_str().unwrap().starts_with("Eggs: expiring"));
    }

    #[tokio::test]
    async fn test_non_2xx_is_failure() {
        let (url, _received) =
            spawn_receiver(StatusCode::INTERNAL_SERVER_ERROR, Duration::ZERO).await;
        let job = DispatchJob {
            webhook: webhook(&url, "x"),
            candidate: candidate("Milk"),
        };

        let outcome = dispatcher(5_000).deliver(&job).await;

        assert_eq!(outcome.log_status(), Some(DeliveryStatus::Failed));
        assert_eq!(outcome.http_status(), Some(500));
    }

    #[tokio::test]
    async fn test_slow_endpoint_times_out() {
        let (url, _received) = spawn_receiver(StatusCode::OK, Duration::from_secs(3)).await;
        let job = DispatchJob {
            webhook: webhook(&url, "x"),
            candidate: candidate("Milk"),
        };

        let outcome = dispatcher(200).deliver(&job).await;

        assert_eq!(outcome, DeliveryOutcome::TimedOut);
        assert_eq!(outcome.log_status(), Some(DeliveryStatus::TimedOut));
    }

    #[tokio::test]
    async fn test_invalid_template_sends_nothing() {
        let (url, received) = spawn_receiver(StatusCode::OK, Duration::ZERO).await;
        let job = DispatchJob {
            webhook: webhook(&url, "{{nope}}"),
            candidate: candidate("Milk"),
        };

        let outcome = dispatcher(5_000).deliver(&job).await;

        assert!(matches!(outcome, DeliveryOutcome::TemplateInvalid(_)));
        assert_eq!(outcome.log_status(), None);
        assert!(received.bodies.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_does_not_block_siblings() {
        let (url, received) = spawn_receiver(StatusCode::OK, Duration::ZERO).await;
        let good = webhook(&url, "{{name}}");
        let bad = webhook("http://127.0.0.1:1/unreachable", "{{name}}");
        let item = candidate("Butter");

        let jobs = vec![
            DispatchJob {
                webhook: bad.clone(),
                candidate: item.clone(),
            },
            DispatchJob {
                webhook: good.clone(),
                candidate: item.clone(),
            },
        ];

        let results = dispatcher(5_000).dispatch_all(jobs).await;

        assert_eq!(results.len(), 2);
        let good_result = results.iter().find(|r| r.webhook_id == good.id).unwrap();
        let bad_result = results.iter().find(|r| r.webhook_id == bad.id).unwrap();
        assert!(good_result.outcome.is_delivered());
        assert_eq!(bad_result.outcome.log_status(), Some(DeliveryStatus::Failed));
        assert_eq!(received.bodies.lock().unwrap()[0].1, "Butter");
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("ééé", 3), "é");
    }
}

//! Deferred re-invocation of the entry point through a durable queue.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use base64::Engine;
use chrono::{DateTime, SecondsFormat};
use commenter_core::model::DeferredTask;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::gcp::GcpAuth;

const TASKS_SCOPE: &str = "https://www.googleapis.com/auth/cloud-tasks";
const TASKS_API: &str = "https://cloudtasks.googleapis.com";

/// "schedule deferred call". Delivery is at least once, no earlier than
/// `not_before_unix`.
#[async_trait]
pub trait DeferredDispatcher: Send + Sync {
    /// Enqueues `task`; returns once the queue has accepted it.
    async fn schedule(&self, task: &DeferredTask) -> anyhow::Result<()>;
}

/// Queue coordinates for [`CloudTasksDispatcher`].
#[derive(Debug, Clone)]
pub struct CloudTasksConfig {
    /// GCP project owning the queue.
    pub project_id: String,
    /// Queue region, e.g. `europe-west1`.
    pub location: String,
    /// Queue id.
    pub queue_name: String,
    /// When set, delivered tasks carry an OIDC token for this identity.
    pub service_account_email: Option<String>,
}

impl CloudTasksConfig {
    /// `projects/{p}/locations/{l}/queues/{q}`.
    pub fn queue_path(&self) -> String {
        format!(
            "projects/{}/locations/{}/queues/{}",
            self.project_id, self.location, self.queue_name
        )
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateTaskRequest {
    task: CloudTask,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CloudTask {
    http_request: HttpRequest,
    schedule_time: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct HttpRequest {
    url: String,
    http_method: &'static str,
    headers: HashMap<String, String>,
    /// Base64-encoded.
    body: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    oidc_token: Option<OidcToken>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct OidcToken {
    service_account_email: String,
    audience: String,
}

#[derive(Debug, Deserialize)]
struct CreatedTask {
    name: String,
}

/// Google Cloud Tasks HTTP-target dispatcher.
pub struct CloudTasksDispatcher {
    config: CloudTasksConfig,
    auth: Arc<GcpAuth>,
    client: reqwest::Client,
    api_base: String,
}

impl CloudTasksDispatcher {
    /// Fails on empty queue coordinates.
    pub fn new(config: CloudTasksConfig, auth: Arc<GcpAuth>) -> anyhow::Result<Self> {
        for (field, value) in [
            ("project_id", &config.project_id),
            ("location", &config.location),
            ("queue_name", &config.queue_name),
        ] {
            if value.is_empty() {
                return Err(anyhow!("cloud tasks {field} cannot be empty"));
            }
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("build cloud tasks HTTP client")?;
        Ok(Self {
            config,
            auth,
            client,
            api_base: TASKS_API.to_string(),
        })
    }

    fn create_request(&self, task: &DeferredTask) -> anyhow::Result<CreateTaskRequest> {
        let body = serde_json::to_vec(&task.body()).context("serialize continuation body")?;
        let schedule_time = DateTime::from_timestamp(task.not_before_unix, 0)
            .ok_or_else(|| anyhow!("schedule time out of range: {}", task.not_before_unix))?
            .to_rfc3339_opts(SecondsFormat::Secs, true);
        let oidc_token = self
            .config
            .service_account_email
            .as_ref()
            .map(|email| OidcToken {
                service_account_email: email.clone(),
                audience: task.target_url.clone(),
            });

        Ok(CreateTaskRequest {
            task: CloudTask {
                http_request: HttpRequest {
                    url: task.target_url.clone(),
                    http_method: "POST",
                    headers: HashMap::from([(
                        "Content-Type".to_string(),
                        "application/json".to_string(),
                    )]),
                    body: base64::engine::general_purpose::STANDARD.encode(body),
                    oidc_token,
                },
                schedule_time,
            },
        })
    }
}

#[async_trait]
impl DeferredDispatcher for CloudTasksDispatcher {
    async fn schedule(&self, task: &DeferredTask) -> anyhow::Result<()> {
        let request = self.create_request(task)?;
        let token = self.auth.token(&[TASKS_SCOPE]).await?;
        let url = format!("{}/v2/{}/tasks", self.api_base, self.config.queue_path());

        let created: CreatedTask = self
            .client
            .post(url)
            .bearer_auth(token)
            .json(&request)
            .send()
            .await
            .context("create cloud task")?
            .error_for_status()
            .context("create cloud task status")?
            .json()
            .await
            .context("decode created cloud task")?;

        info!(
            request_id = %task.request_id,
            task = %created.name,
            not_before = task.not_before_unix,
            "scheduled continuation"
        );
        Ok(())
    }
}

/// Records scheduled tasks instead of delivering them.
#[derive(Debug, Default)]
pub struct InMemoryDispatcher {
    tasks: Mutex<Vec<DeferredTask>>,
}

impl InMemoryDispatcher {
    /// An empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Tasks scheduled so far, oldest first.
    pub fn tasks(&self) -> Vec<DeferredTask> {
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl DeferredDispatcher for InMemoryDispatcher {
    async fn schedule(&self, task: &DeferredTask) -> anyhow::Result<()> {
        self.tasks
            .lock()
            .map_err(|_| anyhow!("dispatcher lock poisoned"))?
            .push(task.clone());
        Ok(())
    }
}

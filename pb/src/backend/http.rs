//! reqwest implementation of the backend surface
//!
//! Reads go through the request cache and in-flight tracker; writes
//! invalidate the plan-list cache family so the next list read is fresh.
//! Transient failures (timeouts, rate limits, 5xx) retry with backoff.

use reqwest::Client;
use serde_json::{Value, json};
use tracing::debug;

use async_trait::async_trait;
use requestkit::{BackoffPolicy, RequestCache, RequestTracker, retry_with_backoff};

use crate::config::Config;
use crate::domain::{AgentMessage, Plan};

use super::error::ApiError;
use super::{ClarificationAnswer, PlanBackend, PlanContext, PlanDecision, PlanSnapshot};

/// HTTP client for the orchestrator backend
pub struct HttpBackend {
    http: Client,
    base_url: String,
    cache: RequestCache,
    tracker: RequestTracker,
    retry: BackoffPolicy,
}

impl HttpBackend {
    /// Build a client from configuration
    pub fn from_config(config: &Config) -> Result<Self, ApiError> {
        let http = Client::builder()
            .timeout(config.backend.request_timeout())
            .build()
            .map_err(ApiError::Network)?;

        Ok(Self {
            http,
            base_url: config.backend.api_base_url.trim_end_matches('/').to_string(),
            cache: RequestCache::with_default_ttl(config.cache.ttl()),
            tracker: RequestTracker::new(),
            retry: BackoffPolicy::default(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn post(&self, path: &str, body: Value) -> Result<Value, ApiError> {
        let url = self.url(path);
        retry_with_backoff(&self.retry, |e: &ApiError, _| e.is_retryable(), || {
            post_json(&self.http, &url, &body)
        })
        .await
    }
}

async fn post_json(http: &Client, url: &str, body: &Value) -> Result<Value, ApiError> {
    let response = http.post(url).json(body).send().await?;
    read_body(response).await
}

async fn get_json(http: &Client, url: &str) -> Result<Value, ApiError> {
    let response = http.get(url).send().await?;
    read_body(response).await
}

async fn read_body(response: reqwest::Response) -> Result<Value, ApiError> {
    let status = response.status();
    if !status.is_success() {
        let message = response.text().await.unwrap_or_default();
        return Err(ApiError::Http {
            status: status.as_u16(),
            message,
        });
    }

    let text = response.text().await?;
    if text.is_empty() {
        return Ok(Value::Null);
    }
    Ok(serde_json::from_str(&text)?)
}

#[async_trait]
impl PlanBackend for HttpBackend {
    async fn create_plan(&self, goal: &str) -> Result<Plan, ApiError> {
        debug!(%goal, "HttpBackend::create_plan");
        let value = self.post("/api/plans", json!({ "goal": goal })).await?;
        let plan: Plan = serde_json::from_value(value)?;
        self.cache.invalidate("plans");
        Ok(plan)
    }

    async fn init_team(&self, session_id: &str) -> Result<(), ApiError> {
        debug!(%session_id, "HttpBackend::init_team");
        self.post("/api/teams/init", json!({ "session_id": session_id })).await?;
        Ok(())
    }

    async fn decide_plan(&self, decision: &PlanDecision) -> Result<(), ApiError> {
        debug!(plan_id = %decision.plan_id, approved = decision.approved, "HttpBackend::decide_plan");
        self.post("/api/plans/decision", serde_json::to_value(decision)?).await?;
        self.cache.invalidate("plans");
        Ok(())
    }

    async fn submit_clarification(&self, answer: &ClarificationAnswer) -> Result<(), ApiError> {
        debug!(request_id = %answer.request_id, "HttpBackend::submit_clarification");
        self.post("/api/plans/clarify", serde_json::to_value(answer)?).await?;
        Ok(())
    }

    async fn persist_message(
        &self,
        message: &AgentMessage,
        ctx: &PlanContext,
        is_final: bool,
        streaming_buffer: Option<&str>,
    ) -> Result<(), ApiError> {
        debug!(plan_id = %ctx.plan_id, is_final, "HttpBackend::persist_message");
        let body = json!({
            "message": message,
            "plan_id": ctx.plan_id,
            "session_id": ctx.session_id,
            "m_plan_id": ctx.m_plan_id,
            "is_final": is_final,
            "streaming_buffer": streaming_buffer,
        });
        self.post("/api/messages", body).await?;
        self.cache.invalidate("plans");
        Ok(())
    }

    async fn fetch_plan(&self, plan_id: &str) -> Result<PlanSnapshot, ApiError> {
        let key = format!("plans:{}", plan_id);
        if let Some(snapshot) = self.cache.get::<PlanSnapshot>(&key) {
            debug!(%plan_id, "HttpBackend::fetch_plan: cache hit");
            return Ok(snapshot);
        }

        let http = self.http.clone();
        let url = self.url(&format!("/api/plans/{}", plan_id));
        let retry = self.retry.clone();
        let snapshot: PlanSnapshot = self
            .tracker
            .track_request(&key, move || async move {
                let value =
                    retry_with_backoff(&retry, |e: &ApiError, _| e.is_retryable(), || get_json(&http, &url)).await?;
                serde_json::from_value::<PlanSnapshot>(value).map_err(ApiError::from)
            })
            .await?;

        self.cache.set(&key, &snapshot);
        Ok(snapshot)
    }

    async fn list_plans(&self) -> Result<Vec<Plan>, ApiError> {
        let key = "plans:list";
        if let Some(plans) = self.cache.get::<Vec<Plan>>(key) {
            debug!("HttpBackend::list_plans: cache hit");
            return Ok(plans);
        }

        let http = self.http.clone();
        let url = self.url("/api/plans");
        let retry = self.retry.clone();
        let plans: Vec<Plan> = self
            .tracker
            .track_request(key, move || async move {
                let value =
                    retry_with_backoff(&retry, |e: &ApiError, _| e.is_retryable(), || get_json(&http, &url)).await?;
                serde_json::from_value::<Vec<Plan>>(value).map_err(ApiError::from)
            })
            .await?;

        self.cache.set(key, &plans);
        Ok(plans)
    }
}

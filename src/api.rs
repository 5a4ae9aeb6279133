use async_trait::async_trait;
use log::debug;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::FlowError;
use crate::story::tree::Story;

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

/// Response to a creation request. Sample-mode backends answer with
/// `story_id` straight away; LLM-mode backends enqueue a job instead.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateResponse {
    pub story_id: Option<u64>,
    pub job_id: Option<String>,
    pub status: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JobStatus {
    /// "pending" | "processing" | "completed" | "failed".
    pub status: String,
    pub story_id: Option<u64>,
    pub error: Option<String>,
}

impl JobStatus {
    pub fn is_completed(&self) -> bool {
        self.status == "completed"
    }

    pub fn is_failed(&self) -> bool {
        self.status == "failed"
    }
}

// ---------------------------------------------------------------------------
// Endpoint seam
// ---------------------------------------------------------------------------

/// The three backend endpoints the flow controller consumes. A trait so the
/// controller can be driven by an in-memory fake in tests.
#[async_trait]
pub trait StoryApi {
    async fn create_story(&self, theme: &str) -> Result<CreateResponse, FlowError>;
    async fn get_job(&self, job_id: &str) -> Result<JobStatus, FlowError>;
    async fn get_complete_story(&self, story_id: u64) -> Result<Story, FlowError>;
}

// ---------------------------------------------------------------------------
// HTTP client
// ---------------------------------------------------------------------------

/// JSON-over-HTTP client for the story backend. The cookie store keeps the
/// backend's session cookie across requests.
#[derive(Debug, Clone)]
pub struct ApiClient {
    base_url: String,
    client: reqwest::Client,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Result<Self, FlowError> {
        let client = reqwest::Client::builder()
            .cookie_store(true)
            .build()
            .map_err(|e| FlowError::Http(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Map a response to its JSON payload. Non-2xx becomes an error carrying
    /// the body text, or "HTTP {status}" when the body is empty.
    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, FlowError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = if body.trim().is_empty() {
                format!("HTTP {}", status.as_u16())
            } else {
                body
            };
            return Err(FlowError::Http(message));
        }
        response
            .json()
            .await
            .map_err(|e| FlowError::Decode(format!("unexpected response payload: {e}")))
    }

    async fn get_json<T: DeserializeOwned>(&self, url: String) -> Result<T, FlowError> {
        debug!("GET {url}");
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| FlowError::Http(format!("request failed: {e}")))?;
        Self::decode(response).await
    }
}

#[derive(Debug, serde::Serialize)]
struct CreateBody<'a> {
    theme: &'a str,
}

#[async_trait]
impl StoryApi for ApiClient {
    async fn create_story(&self, theme: &str) -> Result<CreateResponse, FlowError> {
        let url = format!("{}/api/stories/create", self.base_url);
        debug!("POST {url} (theme: \"{theme}\")");
        let response = self
            .client
            .post(&url)
            .json(&CreateBody { theme })
            .send()
            .await
            .map_err(|e| FlowError::Http(format!("request failed: {e}")))?;
        Self::decode(response).await
    }

    async fn get_job(&self, job_id: &str) -> Result<JobStatus, FlowError> {
        self.get_json(format!("{}/api/jobs/{job_id}", self.base_url))
            .await
    }

    async fn get_complete_story(&self, story_id: u64) -> Result<Story, FlowError> {
        self.get_json(format!("{}/api/stories/{story_id}/complete", self.base_url))
            .await
    }
}

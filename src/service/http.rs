//! HTTP implementation of [`TutorApi`].

use super::{
    AnalyzeRequest, AnalyzeResponse, RespondRequest, RespondResponse, ServiceError, TutorApi,
};
use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

/// Talks JSON to the tutor backend (`/api/analyze`, `/api/respond`).
pub struct HttpTutor {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpTutor {
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key: None,
        }
    }

    /// Use a caller-supplied API key, forwarded in the request body the way
    /// the web client does.
    #[must_use]
    pub fn with_api_key(mut self, key: Option<String>) -> Self {
        self.api_key = key;
        self
    }

    async fn post<B: Serialize, R: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<R, ServiceError> {
        let mut payload = serde_json::to_value(body)
            .map_err(|e| ServiceError::Decode(e.to_string()))?;
        if let (Some(key), Some(obj)) = (&self.api_key, payload.as_object_mut()) {
            obj.insert("apiKey".into(), serde_json::Value::String(key.clone()));
        }

        let url = format!("{}{path}", self.base_url.trim_end_matches('/'));
        debug!(%url, "tutor service request");

        let response = self.client.post(&url).json(&payload).send().await?;
        let status = response.status();

        if !status.is_success() {
            // Best effort: the backend puts a message in the error body
            let message = response
                .json::<serde_json::Value>()
                .await
                .ok()
                .and_then(|v| {
                    v.get("error")
                        .or_else(|| v.get("message"))
                        .and_then(|m| m.as_str())
                        .map(String::from)
                })
                .unwrap_or_else(|| status.to_string());
            return Err(ServiceError::Api {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json::<R>()
            .await
            .map_err(|e| ServiceError::Decode(e.to_string()))
    }
}

#[async_trait]
impl TutorApi for HttpTutor {
    async fn analyze(&self, request: AnalyzeRequest) -> Result<AnalyzeResponse, ServiceError> {
        self.post("/api/analyze", &request).await
    }

    async fn respond(&self, request: RespondRequest) -> Result<RespondResponse, ServiceError> {
        self.post("/api/respond", &request).await
    }
}

//! External tutor service interface.
//!
//! The core makes exactly two outbound calls: Analyze (submit a chunk of
//! explanation, get back student comments) and Respond (submit an answer to
//! a comment, get back feedback and possibly a follow-up question). Neither
//! call is retried automatically; a failure surfaces as one error event.

mod http;

pub use http::HttpTutor;

use crate::dialogue::{Comment, Exchange};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Service returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Malformed service response: {0}")]
    Decode(String),
}

/// Analyze a chunk of explanation. Exactly one of `is_segment` / `is_final`
/// may be true; both false is a plain one-shot analysis.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeRequest {
    pub content: String,
    pub is_segment: bool,
    pub is_final: bool,
}

impl AnalyzeRequest {
    #[must_use]
    pub fn segment(content: String) -> Self {
        Self {
            content,
            is_segment: true,
            is_final: false,
        }
    }

    #[must_use]
    pub fn fin(content: String) -> Self {
        Self {
            content,
            is_segment: false,
            is_final: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnalyzeResponse {
    pub comments: Vec<Comment>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RespondRequest {
    pub comment_id: String,
    pub response: String,
    pub original_question: String,
    pub conversation_history: Vec<Exchange>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RespondResponse {
    pub understood: bool,
    pub feedback: String,
    /// Required when `understood` is false, ignored when true.
    #[serde(default)]
    pub follow_up_question: Option<String>,
}

/// The analysis/response service the core talks to.
#[async_trait]
pub trait TutorApi: Send + Sync {
    async fn analyze(&self, request: AnalyzeRequest) -> Result<AnalyzeResponse, ServiceError>;

    async fn respond(&self, request: RespondRequest) -> Result<RespondResponse, ServiceError>;
}

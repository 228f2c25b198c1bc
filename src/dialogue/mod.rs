//! Conversation threads between the user and the AI student.
//!
//! Each AI comment that needs a response opens a thread: the user answers,
//! the AI either signals understanding (thread resolved) or asks a follow-up
//! question (a new child node under the same thread). Follow-ups, however
//! deep, collapse onto the original top-level comment's *base id* and share
//! one flat history list, so they render as siblings under the original
//! comment rather than a growing nested path.

use crate::service::{RespondRequest, ServiceError, TutorApi};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Marker between a parent comment id and its follow-up suffix.
const FOLLOW_UP_MARKER: &str = "_followup_";

/// A comment produced by the analysis service. Opaque to the core beyond
/// `id` and `needs_response`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub kind: CommentKind,
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub needs_response: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommentKind {
    Question,
    Concern,
    Clarification,
    Praise,
    #[serde(other)]
    Other,
}

/// One completed question/answer round. History entries are always complete
/// pairs; a question alone is never stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Exchange {
    pub question: String,
    pub answer: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    /// Awaiting an answer from the user.
    Open,
    /// An answer is being evaluated by the service.
    Evaluating,
    /// Terminal: the AI understood; history deleted.
    Resolved,
    /// The AI asked a follow-up; a child node is now `Open`.
    FollowUpPending,
    /// Terminal: the user opted out.
    Skipped,
}

/// Result of submitting an answer.
#[derive(Debug, Clone)]
pub enum ThreadOutcome {
    /// The AI understood; the thread is closed and its history deleted.
    Resolved { feedback: String },
    /// The AI asked a follow-up question. The new node belongs under the
    /// thread's base id (flat siblings), never under the immediate parent.
    FollowUp {
        feedback: String,
        question: String,
        child_id: String,
        base_id: String,
    },
}

/// The base id of any node id: everything before the first follow-up
/// suffix. Nested follow-ups all collapse to the original top-level id.
#[must_use]
pub fn base_of(id: &str) -> &str {
    match id.find(FOLLOW_UP_MARKER) {
        Some(pos) => &id[..pos],
        None => id,
    }
}

struct ThreadNode {
    base_id: String,
    question: String,
    state: ThreadState,
}

/// Owns every thread of one session. No process-wide state: each session
/// gets its own manager, reset as a unit.
#[derive(Default)]
pub struct ThreadManager {
    /// base id -> completed exchanges. An entry exists iff there is
    /// unresolved follow-up history.
    histories: HashMap<String, Vec<Exchange>>,
    /// node id -> node. The base id is recorded at creation so parent
    /// discovery never depends on string parsing for registered ids.
    nodes: HashMap<String, ThreadNode>,
}

impl ThreadManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a thread for a comment. The question text is kept on the node
    /// for later context; nothing enters the history until an answer exists.
    pub fn register(&mut self, id: &str, question: &str) {
        debug!(%id, "thread opened");
        self.nodes.insert(
            id.to_string(),
            ThreadNode {
                base_id: base_of(id).to_string(),
                question: question.to_string(),
                state: ThreadState::Open,
            },
        );
    }

    /// Resolve a node id to its thread's base id. Registered nodes carry an
    /// explicit base id; unregistered ids fall back to suffix parsing.
    #[must_use]
    pub fn base_id_of(&self, id: &str) -> String {
        self.nodes
            .get(id)
            .map_or_else(|| base_of(id).to_string(), |n| n.base_id.clone())
    }

    #[must_use]
    pub fn state(&self, id: &str) -> Option<ThreadState> {
        self.nodes.get(id).map(|n| n.state)
    }

    #[must_use]
    pub fn history(&self, base_id: &str) -> &[Exchange] {
        self.histories.get(base_id).map_or(&[], Vec::as_slice)
    }

    #[must_use]
    pub fn open_thread_count(&self) -> usize {
        self.nodes
            .values()
            .filter(|n| n.state == ThreadState::Open)
            .count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.histories.is_empty()
    }

    /// Submit the user's answer for evaluation.
    ///
    /// The completed `{question, answer}` pair is appended to the base
    /// history before branching on the outcome. A service failure returns
    /// the node to `Open` with history untouched, so the user can retry.
    pub async fn submit_answer(
        &mut self,
        api: &dyn TutorApi,
        comment_id: &str,
        answer: &str,
    ) -> Result<ThreadOutcome, ServiceError> {
        let base_id = self.base_id_of(comment_id);

        // Degrade to an empty question if the originating node is unknown
        let question = match self.nodes.get_mut(comment_id) {
            Some(node) => {
                node.state = ThreadState::Evaluating;
                node.question.clone()
            }
            None => {
                warn!(%comment_id, "answer for unknown thread node");
                String::new()
            }
        };

        let request = RespondRequest {
            comment_id: comment_id.to_string(),
            response: answer.to_string(),
            original_question: question.clone(),
            conversation_history: self.history(&base_id).to_vec(),
        };

        let reply = match api.respond(request).await {
            Ok(reply) => reply,
            Err(e) => {
                if let Some(node) = self.nodes.get_mut(comment_id) {
                    node.state = ThreadState::Open;
                }
                return Err(e);
            }
        };

        // A not-understood reply must carry the next question
        let follow_up = if reply.understood {
            None
        } else {
            match reply.follow_up_question {
                Some(q) => Some(q),
                None => {
                    if let Some(node) = self.nodes.get_mut(comment_id) {
                        node.state = ThreadState::Open;
                    }
                    return Err(ServiceError::Decode(
                        "not understood but no follow-up question".into(),
                    ));
                }
            }
        };

        self.histories
            .entry(base_id.clone())
            .or_default()
            .push(Exchange {
                question,
                answer: answer.to_string(),
            });

        if let Some(next_question) = follow_up {
            if let Some(node) = self.nodes.get_mut(comment_id) {
                node.state = ThreadState::FollowUpPending;
            }
            let child_id = format!(
                "{comment_id}{FOLLOW_UP_MARKER}{}",
                Utc::now().timestamp_millis()
            );
            self.nodes.insert(
                child_id.clone(),
                ThreadNode {
                    base_id: base_id.clone(),
                    question: next_question.clone(),
                    state: ThreadState::Open,
                },
            );
            info!(%base_id, %child_id, "follow-up raised");
            Ok(ThreadOutcome::FollowUp {
                feedback: reply.feedback,
                question: next_question,
                child_id,
                base_id,
            })
        } else {
            if let Some(node) = self.nodes.get_mut(comment_id) {
                node.state = ThreadState::Resolved;
            }
            self.histories.remove(&base_id);
            info!(%base_id, "thread resolved");
            Ok(ThreadOutcome::Resolved {
                feedback: reply.feedback,
            })
        }
    }

    /// Opt out of a thread. Terminal: the node is marked skipped and the
    /// base history is deleted (see DESIGN.md).
    pub fn skip(&mut self, comment_id: &str) {
        let base_id = self.base_id_of(comment_id);
        match self.nodes.get_mut(comment_id) {
            Some(node) => {
                node.state = ThreadState::Skipped;
                self.histories.remove(&base_id);
                info!(%base_id, "thread skipped");
            }
            None => warn!(%comment_id, "skip for unknown thread node"),
        }
    }

    /// Drop every thread, node, and history. Used on full session reset.
    pub fn reset_all(&mut self) {
        self.histories.clear();
        self.nodes.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::{AnalyzeRequest, AnalyzeResponse, RespondResponse};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Scripted service: pops the next reply per call, records requests.
    #[derive(Default)]
    struct ScriptedTutor {
        replies: Mutex<Vec<Result<RespondResponse, ServiceError>>>,
        seen: Mutex<Vec<RespondRequest>>,
    }

    impl ScriptedTutor {
        fn push(&self, reply: Result<RespondResponse, ServiceError>) {
            self.replies.lock().unwrap().insert(0, reply);
        }

        fn understood(feedback: &str) -> RespondResponse {
            RespondResponse {
                understood: true,
                feedback: feedback.into(),
                follow_up_question: None,
            }
        }

        fn confused(feedback: &str, question: &str) -> RespondResponse {
            RespondResponse {
                understood: false,
                feedback: feedback.into(),
                follow_up_question: Some(question.into()),
            }
        }
    }

    #[async_trait]
    impl TutorApi for ScriptedTutor {
        async fn analyze(&self, _req: AnalyzeRequest) -> Result<AnalyzeResponse, ServiceError> {
            Ok(AnalyzeResponse { comments: vec![] })
        }

        async fn respond(&self, req: RespondRequest) -> Result<RespondResponse, ServiceError> {
            self.seen.lock().unwrap().push(req);
            self.replies
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Ok(Self::understood("ok")))
        }
    }

    #[test]
    fn test_base_of_collapses_nested_follow_ups() {
        assert_eq!(
            base_of("c1_followup_1700000000000_followup_1700000000500"),
            "c1"
        );
        assert_eq!(base_of("c1"), "c1");
        assert_eq!(base_of("c1_followup_42"), "c1");
    }

    #[tokio::test]
    async fn test_understood_resolves_and_drops_history() {
        let api = ScriptedTutor::default();
        api.push(Ok(ScriptedTutor::understood("crystal clear")));

        let mut mgr = ThreadManager::new();
        mgr.register("q1", "why is the sky blue?");

        let outcome = mgr.submit_answer(&api, "q1", "scattering").await.unwrap();
        assert!(matches!(outcome, ThreadOutcome::Resolved { ref feedback } if feedback == "crystal clear"));
        assert_eq!(mgr.state("q1"), Some(ThreadState::Resolved));
        assert!(mgr.history("q1").is_empty());

        // A fresh answer under the same base starts with empty history
        api.push(Ok(ScriptedTutor::understood("again")));
        mgr.register("q1", "why is the sky blue?");
        mgr.submit_answer(&api, "q1", "rayleigh").await.unwrap();
        let seen = api.seen.lock().unwrap();
        assert!(seen[1].conversation_history.is_empty());
    }

    #[tokio::test]
    async fn test_follow_up_grows_flat_history() {
        let api = ScriptedTutor::default();
        api.push(Ok(ScriptedTutor::confused("hmm", "what about sunsets?")));

        let mut mgr = ThreadManager::new();
        mgr.register("q1", "why is the sky blue?");

        let child_id = match mgr.submit_answer(&api, "q1", "scattering").await.unwrap() {
            ThreadOutcome::FollowUp {
                child_id, base_id, question, ..
            } => {
                assert_eq!(base_id, "q1");
                assert_eq!(question, "what about sunsets?");
                child_id
            }
            other => panic!("expected follow-up, got {other:?}"),
        };
        assert_eq!(mgr.state("q1"), Some(ThreadState::FollowUpPending));
        assert_eq!(mgr.state(&child_id), Some(ThreadState::Open));

        // Second not-understood round under the child id
        api.push(Ok(ScriptedTutor::confused("still hmm", "and at noon?")));
        let outcome = mgr
            .submit_answer(&api, &child_id, "longer path through air")
            .await
            .unwrap();
        let grandchild_base = match outcome {
            ThreadOutcome::FollowUp { base_id, .. } => base_id,
            other => panic!("expected follow-up, got {other:?}"),
        };
        // Grandchild still collapses onto the original top-level id
        assert_eq!(grandchild_base, "q1");

        let history = mgr.history("q1");
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].question, "why is the sky blue?");
        assert_eq!(history[0].answer, "scattering");
        assert_eq!(history[1].question, "what about sunsets?");
        assert_eq!(history[1].answer, "longer path through air");
    }

    #[tokio::test]
    async fn test_history_travels_on_the_wire() {
        let api = ScriptedTutor::default();
        api.push(Ok(ScriptedTutor::confused("hmm", "more?")));
        api.push(Ok(ScriptedTutor::understood("got it")));

        let mut mgr = ThreadManager::new();
        mgr.register("q1", "first question");
        let child_id = match mgr.submit_answer(&api, "q1", "first answer").await.unwrap() {
            ThreadOutcome::FollowUp { child_id, .. } => child_id,
            other => panic!("expected follow-up, got {other:?}"),
        };
        mgr.submit_answer(&api, &child_id, "second answer")
            .await
            .unwrap();

        let seen = api.seen.lock().unwrap();
        assert!(seen[0].conversation_history.is_empty());
        assert_eq!(seen[1].conversation_history.len(), 1);
        assert_eq!(seen[1].original_question, "more?");
    }

    #[tokio::test]
    async fn test_failure_returns_to_open_with_history_intact() {
        let api = ScriptedTutor::default();
        api.push(Err(ServiceError::Api {
            status: 500,
            message: "boom".into(),
        }));

        let mut mgr = ThreadManager::new();
        mgr.register("q1", "why?");

        let err = mgr.submit_answer(&api, "q1", "because").await.unwrap_err();
        assert!(matches!(err, ServiceError::Api { status: 500, .. }));
        assert_eq!(mgr.state("q1"), Some(ThreadState::Open));
        assert!(mgr.history("q1").is_empty());
    }

    #[tokio::test]
    async fn test_missing_follow_up_question_is_an_error() {
        let api = ScriptedTutor::default();
        api.push(Ok(RespondResponse {
            understood: false,
            feedback: "hmm".into(),
            follow_up_question: None,
        }));

        let mut mgr = ThreadManager::new();
        mgr.register("q1", "why?");
        let err = mgr.submit_answer(&api, "q1", "because").await.unwrap_err();
        assert!(matches!(err, ServiceError::Decode(_)));
        assert_eq!(mgr.state("q1"), Some(ThreadState::Open));
        assert!(mgr.history("q1").is_empty());
    }

    #[tokio::test]
    async fn test_unknown_node_degrades_to_empty_question() {
        let api = ScriptedTutor::default();
        api.push(Ok(ScriptedTutor::understood("fine")));

        let mut mgr = ThreadManager::new();
        mgr.submit_answer(&api, "ghost", "an answer").await.unwrap();

        let seen = api.seen.lock().unwrap();
        assert_eq!(seen[0].original_question, "");
    }

    #[tokio::test]
    async fn test_skip_clears_history() {
        let api = ScriptedTutor::default();
        api.push(Ok(ScriptedTutor::confused("hmm", "more?")));

        let mut mgr = ThreadManager::new();
        mgr.register("q1", "why?");
        let child_id = match mgr.submit_answer(&api, "q1", "because").await.unwrap() {
            ThreadOutcome::FollowUp { child_id, .. } => child_id,
            other => panic!("expected follow-up, got {other:?}"),
        };
        assert_eq!(mgr.history("q1").len(), 1);

        mgr.skip(&child_id);
        assert_eq!(mgr.state(&child_id), Some(ThreadState::Skipped));
        assert!(mgr.history("q1").is_empty());
    }

    #[test]
    fn test_reset_all() {
        let mut mgr = ThreadManager::new();
        mgr.register("q1", "a");
        mgr.register("q2", "b");
        assert_eq!(mgr.open_thread_count(), 2);
        mgr.reset_all();
        assert!(mgr.is_empty());
    }
}

//! Session orchestrator.
//!
//! One `Session` per active explanation. It owns the input buffer, the send
//! gate, the trigger, the thread manager, and the sent-segment log; it
//! consumes [`SessionCommand`]s and emits [`SessionEvent`]s over an mpsc
//! channel. All work happens on one task: the run loop selects between the
//! command channel and the pending debounce deadline.

use crate::dialogue::{Comment, ThreadManager, ThreadOutcome};
use crate::gate::SendGate;
use crate::segment::{Segment, SegmentationTrigger};
use crate::service::{AnalyzeRequest, TutorApi};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Inbound user actions.
#[derive(Debug, Clone)]
pub enum SessionCommand {
    /// The full buffer text after an edit.
    Edit(String),
    /// Explicit send of the whole explanation.
    ManualSend,
    SubmitAnswer {
        comment_id: String,
        answer: String,
    },
    Skip {
        comment_id: String,
    },
    SetAutoSend(bool),
    Clear,
}

/// Outbound results for the rendering layer. The core never reads display
/// state back.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// An auto-sent chunk was analyzed.
    SegmentAnalyzed(Segment),
    /// A manual (final) send was analyzed; the auto-send state was reset.
    FinalAnalyzed(Vec<Comment>),
    /// The AI understood the answer; the thread is resolved.
    AnswerAccepted {
        comment_id: String,
        feedback: String,
    },
    /// The AI asked a follow-up. The new response unit belongs under the
    /// thread's base comment, as a sibling of earlier follow-ups.
    FollowUpRaised {
        base_id: String,
        child_id: String,
        feedback: String,
        question: String,
    },
    ThreadSkipped {
        comment_id: String,
    },
    Warning(String),
    Error(String),
}

/// Full current text plus how many leading chars (of the trimmed text) were
/// already submitted.
#[derive(Default)]
struct InputBuffer {
    text: String,
    last_sent_len: usize,
}

impl InputBuffer {
    fn trimmed(&self) -> &str {
        self.text.trim()
    }

    /// The suffix not yet covered by a prior send.
    fn unsent(&self) -> &str {
        let trimmed = self.trimmed();
        match trimmed.char_indices().nth(self.last_sent_len) {
            Some((pos, _)) => &trimmed[pos..],
            None => "",
        }
    }
}

pub struct Session {
    pub id: String,
    buffer: InputBuffer,
    gate: SendGate,
    trigger: SegmentationTrigger,
    threads: ThreadManager,
    segments: Vec<Segment>,
    api: Arc<dyn TutorApi>,
    tx: mpsc::Sender<SessionEvent>,
    /// Bumped on clear/reset; a service result from an older epoch is stale
    /// and discarded.
    epoch: u64,
}

impl Session {
    #[must_use]
    pub fn new(api: Arc<dyn TutorApi>, tx: mpsc::Sender<SessionEvent>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            buffer: InputBuffer::default(),
            gate: SendGate::default(),
            trigger: SegmentationTrigger::default(),
            threads: ThreadManager::new(),
            segments: Vec::new(),
            api,
            tx,
            epoch: 0,
        }
    }

    #[must_use]
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.gate = SendGate::new(debounce);
        self
    }

    #[must_use]
    pub fn sent_segments(&self) -> &[Segment] {
        &self.segments
    }

    #[must_use]
    pub fn threads(&self) -> &ThreadManager {
        &self.threads
    }

    #[must_use]
    pub fn last_sent_len(&self) -> usize {
        self.buffer.last_sent_len
    }

    /// Drive the session until the command channel closes.
    pub async fn run(mut self, mut rx: mpsc::Receiver<SessionCommand>) {
        loop {
            let deadline = self.gate.deadline();
            tokio::select! {
                cmd = rx.recv() => match cmd {
                    Some(cmd) => self.handle_command(cmd).await,
                    None => break,
                },
                () = async {
                    match deadline {
                        Some(d) => tokio::time::sleep_until(d).await,
                        None => std::future::pending().await,
                    }
                }, if deadline.is_some() => {
                    self.on_quiet().await;
                }
            }
        }
    }

    async fn handle_command(&mut self, cmd: SessionCommand) {
        match cmd {
            SessionCommand::Edit(text) => {
                self.buffer.text = text;
                self.gate.note_edit();
            }
            SessionCommand::ManualSend => self.manual_send().await,
            SessionCommand::SubmitAnswer { comment_id, answer } => {
                self.submit_answer(&comment_id, &answer).await;
            }
            SessionCommand::Skip { comment_id } => {
                self.threads.skip(&comment_id);
                self.emit(SessionEvent::ThreadSkipped { comment_id }).await;
            }
            SessionCommand::SetAutoSend(enabled) => self.gate.set_enabled(enabled),
            SessionCommand::Clear => {
                self.buffer.text.clear();
                self.reset_auto_state();
            }
        }
    }

    /// The quiet period elapsed: evaluate the trigger on the unsent suffix
    /// and auto-send if it fires.
    async fn on_quiet(&mut self) {
        self.gate.disarm();

        let unsent = self.buffer.unsent();
        if unsent.is_empty() || !self.trigger.should_trigger(unsent) {
            return;
        }
        if !self.gate.try_begin_auto() {
            // Another request is in flight; this evaluation is dropped
            return;
        }

        let content = self.buffer.trimmed().to_string();
        let sent_chars = content.chars().count();
        let epoch = self.epoch;

        let result = self
            .api
            .analyze(AnalyzeRequest::segment(content.clone()))
            .await;
        self.gate.finish_auto();

        match result {
            Ok(response) => {
                if self.epoch != epoch || !self.gate.is_enabled() {
                    warn!("discarding stale segment analysis");
                    return;
                }
                let mut comments = response.comments;
                self.register_comments(&mut comments, "segment");
                self.buffer.last_sent_len = sent_chars;
                let segment = Segment::new(content, comments);
                self.segments.push(segment.clone());
                info!(
                    sent_chars,
                    comments = segment.comments.len(),
                    "segment analyzed"
                );
                self.emit(SessionEvent::SegmentAnalyzed(segment)).await;
            }
            Err(e) => {
                // The suffix stays un-consumed and re-triggers later
                warn!(error = %e, "segment analysis failed");
                self.emit(SessionEvent::Error(format!("Analysis failed: {e}")))
                    .await;
            }
        }
    }

    async fn manual_send(&mut self) {
        let content = self.buffer.trimmed().to_string();
        if content.is_empty() {
            self.emit(SessionEvent::Warning(
                "Please enter content to explain".into(),
            ))
            .await;
            return;
        }
        if !self.gate.try_begin_manual() {
            return;
        }

        let result = self.api.analyze(AnalyzeRequest::fin(content)).await;
        self.gate.finish_manual();

        match result {
            Ok(response) => {
                let mut comments = response.comments;
                self.reset_auto_state();
                self.register_comments(&mut comments, "final");
                info!(comments = comments.len(), "final analysis complete");
                self.emit(SessionEvent::FinalAnalyzed(comments)).await;
            }
            Err(e) => {
                warn!(error = %e, "final analysis failed");
                self.emit(SessionEvent::Error(format!(
                    "Analysis failed, please try again: {e}"
                )))
                .await;
            }
        }
    }

    async fn submit_answer(&mut self, comment_id: &str, answer: &str) {
        let answer = answer.trim();
        if answer.is_empty() {
            self.emit(SessionEvent::Warning("Please enter an answer".into()))
                .await;
            return;
        }

        match self
            .threads
            .submit_answer(self.api.as_ref(), comment_id, answer)
            .await
        {
            Ok(ThreadOutcome::Resolved { feedback }) => {
                self.emit(SessionEvent::AnswerAccepted {
                    comment_id: comment_id.to_string(),
                    feedback,
                })
                .await;
            }
            Ok(ThreadOutcome::FollowUp {
                feedback,
                question,
                child_id,
                base_id,
            }) => {
                self.emit(SessionEvent::FollowUpRaised {
                    base_id,
                    child_id,
                    feedback,
                    question,
                })
                .await;
            }
            Err(e) => {
                self.emit(SessionEvent::Error(format!(
                    "Answer processing failed, please try again: {e}"
                )))
                .await;
            }
        }
    }

    /// Give every comment that needs a response a usable id and open its
    /// thread. Missing ids are synthesized as `<origin>_<millis>_<index>`.
    fn register_comments(&mut self, comments: &mut [Comment], origin: &str) {
        for (index, comment) in comments.iter_mut().enumerate() {
            if !comment.needs_response {
                continue;
            }
            let id = comment
                .id
                .get_or_insert_with(|| format!("{origin}_{}_{index}", Utc::now().timestamp_millis()))
                .clone();
            self.threads.register(&id, &comment.content);
        }
    }

    /// Back to a blank slate: nothing sent, no segments, no threads. Runs on
    /// clear and after a successful final send.
    fn reset_auto_state(&mut self) {
        self.buffer.last_sent_len = 0;
        self.segments.clear();
        self.threads.reset_all();
        self.gate.disarm();
        self.epoch += 1;
    }

    async fn emit(&self, event: SessionEvent) {
        let _ = self.tx.send(event).await;
    }
}

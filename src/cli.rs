//! Interactive CLI front-end.
//!
//! Feeds raw text edits and explicit commands into a [`Session`] and prints
//! the events it emits. Plain input lines extend the explanation buffer;
//! `/`-prefixed lines are commands.

use crate::config::Config;
use crate::segment::Segment;
use crate::service::HttpTutor;
use crate::session::{Session, SessionCommand, SessionEvent};
use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

#[derive(Parser)]
#[command(
    name = "feynman",
    version,
    about = "Explain a topic; an AI student listens and asks questions"
)]
pub struct Cli {
    /// Tutor backend base URL (overrides config).
    #[arg(long)]
    pub base_url: Option<String>,

    /// API key forwarded to the backend (overrides config).
    #[arg(long)]
    pub api_key: Option<String>,

    /// Quiet period before auto-send evaluation, in milliseconds.
    #[arg(long)]
    pub debounce_ms: Option<u64>,
}

impl Cli {
    pub fn apply(&self, config: &mut Config) {
        if let Some(ref url) = self.base_url {
            config.base_url = url.clone();
        }
        if self.api_key.is_some() {
            config.api_key = self.api_key.clone();
        }
        if let Some(ms) = self.debounce_ms {
            config.debounce_ms = ms;
        }
    }
}

const HELP: &str = "\
Type your explanation; blank pauses trigger analysis automatically.
Commands:
  /send              submit the whole explanation for final analysis
  /answer <id> <..>  answer the AI student's question <id>
  /skip <id>         skip question <id>
  /auto on|off       toggle auto-send
  /clear             clear the session
  /quit              exit";

pub async fn run(config: Config) -> Result<()> {
    let api = Arc::new(
        HttpTutor::new(config.base_url.clone()).with_api_key(config.api_key.clone()),
    );

    let (event_tx, mut event_rx) = mpsc::channel(64);
    let (cmd_tx, cmd_rx) = mpsc::channel(64);
    let session =
        Session::new(api, event_tx).with_debounce(Duration::from_millis(config.debounce_ms));
    let session_task = tokio::spawn(session.run(cmd_rx));
    let printer = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            print_event(&event);
        }
    });

    println!("{HELP}");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut buffer = String::new();

    while let Some(line) = lines.next_line().await? {
        let trimmed = line.trim();
        if let Some(rest) = trimmed.strip_prefix('/') {
            let mut parts = rest.splitn(3, ' ');
            match (parts.next().unwrap_or(""), parts.next(), parts.next()) {
                ("quit" | "exit", _, _) => break,
                ("send", _, _) => cmd_tx.send(SessionCommand::ManualSend).await?,
                ("answer", Some(id), Some(text)) => {
                    cmd_tx
                        .send(SessionCommand::SubmitAnswer {
                            comment_id: id.to_string(),
                            answer: text.to_string(),
                        })
                        .await?;
                }
                ("skip", Some(id), _) => {
                    cmd_tx
                        .send(SessionCommand::Skip {
                            comment_id: id.to_string(),
                        })
                        .await?;
                }
                ("auto", Some(state), _) => {
                    cmd_tx
                        .send(SessionCommand::SetAutoSend(state == "on"))
                        .await?;
                }
                ("clear", _, _) => {
                    buffer.clear();
                    cmd_tx.send(SessionCommand::Clear).await?;
                }
                _ => println!("{HELP}"),
            }
        } else {
            if !buffer.is_empty() {
                buffer.push('\n');
            }
            buffer.push_str(&line);
            cmd_tx.send(SessionCommand::Edit(buffer.clone())).await?;
        }
    }

    drop(cmd_tx);
    session_task.await?;
    printer.await?;
    Ok(())
}

fn print_segment(segment: &Segment) {
    println!(
        "-- real-time analysis {} --",
        segment.timestamp.format("%H:%M:%S")
    );
    for comment in &segment.comments {
        print_comment(comment);
    }
}

fn print_comment(comment: &crate::dialogue::Comment) {
    let id = comment.id.as_deref().unwrap_or("-");
    println!("[{id}] {}: {}", comment.title, comment.content);
    if comment.needs_response {
        println!("    (answer with /answer {id} <text>)");
    }
}

fn print_event(event: &SessionEvent) {
    match event {
        SessionEvent::SegmentAnalyzed(segment) => print_segment(segment),
        SessionEvent::FinalAnalyzed(comments) => {
            println!("-- comprehensive analysis --");
            for comment in comments {
                print_comment(comment);
            }
        }
        SessionEvent::AnswerAccepted { feedback, .. } => {
            println!("understood: {feedback}");
        }
        SessionEvent::FollowUpRaised {
            child_id,
            feedback,
            question,
            ..
        } => {
            println!("feedback: {feedback}");
            println!("follow-up [{child_id}]: {question}");
        }
        SessionEvent::ThreadSkipped { comment_id } => {
            println!("skipped {comment_id}");
        }
        SessionEvent::Warning(message) => println!("warning: {message}"),
        SessionEvent::Error(message) => eprintln!("error: {message}"),
    }
}

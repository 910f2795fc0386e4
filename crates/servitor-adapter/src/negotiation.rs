//! The resumable prompt, decode and correct loop.
//!
//! A [`Negotiation`] is an explicit state machine.  The caller asks it for a
//! prompt with [`begin`](Negotiation::begin), sends that prompt wherever it
//! likes, and hands the response back with [`resume`](Negotiation::resume),
//! which yields either the decoded value or the next correction prompt.
//!
//! ```text
//!  begin ──> Prompt ──resume──> decode ─ok──> Done(value)
//!                 ^                │
//!                 └──── Prompt <─fix (while budget remains)
//!                                  └─exhausted──> Err(ParseError)
//! ```

use std::mem;
use std::sync::Arc;

use serde_json::Value;
use servitor_schema::Task;

use crate::adapter::Adapter;
use crate::error::{AdapterError, Attempt, ParseError, Result};

/// What the caller should do next.
#[derive(Debug, Clone, PartialEq)]
pub enum Next {
    /// Send this prompt and resume with the response.
    Prompt(String),
    /// The negotiation succeeded.
    Done(Value),
}

#[derive(Debug)]
enum State {
    Ready,
    Awaiting { prompt: String },
    Finished,
}

/// One operation call's negotiation with a text source.
pub struct Negotiation {
    adapter: Arc<dyn Adapter>,
    task: Task,
    budget: u32,
    fixes: u32,
    attempts: Vec<Attempt>,
    state: State,
}

impl Negotiation {
    /// Start a negotiation allowing up to `retry` correction rounds.
    pub fn new(adapter: Arc<dyn Adapter>, task: Task, retry: u32) -> Self {
        Self {
            adapter,
            task,
            budget: retry,
            fixes: 0,
            attempts: Vec::new(),
            state: State::Ready,
        }
    }

    pub fn task(&self) -> &Task {
        &self.task
    }

    /// Attempts recorded so far, oldest first.
    pub fn attempts(&self) -> &[Attempt] {
        &self.attempts
    }

    /// Take the recorded attempts, leaving the negotiation finished.
    pub fn into_attempts(self) -> Vec<Attempt> {
        self.attempts
    }

    /// Emit the initial prompt.
    pub fn begin(&mut self) -> Result<Next> {
        if !matches!(self.state, State::Ready) {
            return Err(AdapterError::Protocol {
                reason: "negotiation already started".into(),
            });
        }
        let prompt = self.adapter.prompt(&self.task);
        tracing::debug!(
            adapter = self.adapter.name(),
            operation = self.task.operation().name(),
            %prompt,
            "emitting prompt"
        );
        self.state = State::Awaiting {
            prompt: prompt.clone(),
        };
        Ok(Next::Prompt(prompt))
    }

    /// Feed back the response to the last prompt.
    ///
    /// Decode failures never escape while the retry budget lasts; they
    /// become the next correction prompt.  Exhausting the budget yields
    /// [`AdapterError::Parse`] with every attempt.
    pub fn resume(&mut self, response: impl Into<String>) -> Result<Next> {
        let prompt = match mem::replace(&mut self.state, State::Finished) {
            State::Awaiting { prompt } => prompt,
            other => {
                self.state = other;
                return Err(AdapterError::Protocol {
                    reason: "no prompt is awaiting a response".into(),
                });
            }
        };
        let response = response.into();
        tracing::debug!(%response, "received response");

        match self.adapter.parse(&self.task, &response) {
            Ok(value) => {
                self.attempts.push(Attempt {
                    prompt,
                    response,
                    error: None,
                });
                Ok(Next::Done(value))
            }
            Err(err) => {
                let reason = err.to_string();
                self.attempts.push(Attempt {
                    prompt,
                    response: response.clone(),
                    error: Some(reason.clone()),
                });

                if self.fixes >= self.budget {
                    tracing::warn!(
                        operation = self.task.operation().name(),
                        attempts = self.attempts.len(),
                        error = %reason,
                        "retry budget exhausted"
                    );
                    return Err(ParseError {
                        operation: self.task.operation().name().to_owned(),
                        attempts: mem::take(&mut self.attempts),
                    }
                    .into());
                }

                self.fixes += 1;
                tracing::warn!(
                    operation = self.task.operation().name(),
                    round = self.fixes,
                    budget = self.budget,
                    error = %reason,
                    "response failed to decode; requesting a correction"
                );
                let fix = self.adapter.fix(&self.task, &response, &reason);
                self.state = State::Awaiting {
                    prompt: fix.clone(),
                };
                Ok(Next::Prompt(fix))
            }
        }
    }

    /// Drive the negotiation to completion with a synchronous responder.
    pub fn run<F>(mut self, mut respond: F) -> Result<(Value, Vec<Attempt>)>
    where
        F: FnMut(&str) -> Result<String>,
    {
        let mut next = self.begin()?;
        loop {
            match next {
                Next::Prompt(prompt) => {
                    let response = respond(&prompt)?;
                    next = self.resume(response)?;
                }
                Next::Done(value) => return Ok((value, self.into_attempts())),
            }
        }
    }
}

impl std::fmt::Debug for Negotiation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Negotiation")
            .field("adapter", &self.adapter.name())
            .field("operation", &self.task.operation().name())
            .field("budget", &self.budget)
            .field("fixes", &self.fixes)
            .field("attempts", &self.attempts.len())
            .field("state", &self.state)
            .finish()
    }
}

//! The `chain` (chain-of-thought) variant.
//!
//! The model lists its reasoning line by line and finishes with
//! `return(answer)`.  Only the payload of the last such marker is decoded;
//! the lines before it become the reasoning trail.

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use servitor_schema::{Task, render_task};

use crate::adapter::{Adapter, TypeAdapter};
use crate::error::{AdapterError, Result};
use crate::template::{self, CHAIN_PROMPT};

/// Decoded result of the `chain` adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainOfThought<T> {
    pub thoughts: Vec<String>,
    pub answer: T,
}

/// Chain-of-thought prompting over the `type` decoder.
#[derive(Debug, Clone)]
pub struct ChainAdapter {
    typed: TypeAdapter,
    marker: Regex,
}

impl ChainAdapter {
    pub fn new() -> Result<Self> {
        Ok(Self {
            typed: TypeAdapter::new()?,
            marker: Regex::new(r"return\s*\(\s*(.+)\s*\)[^)\n]*$")?,
        })
    }

    /// Split a response into its reasoning lines and the raw answer payload.
    pub fn split<'a>(&self, response: &'a str) -> Result<(Vec<String>, &'a str)> {
        let lines: Vec<&str> = response.lines().collect();
        let (index, payload) = lines
            .iter()
            .copied()
            .enumerate()
            .rev()
            .find_map(|(i, line)| {
                self.marker
                    .captures(line)
                    .and_then(|caps| caps.get(1))
                    .map(|m| (i, m.as_str().trim()))
            })
            .ok_or(AdapterError::MissingMarker)?;

        let ignored = trailing_text(&lines[index + 1..]);
        if !ignored.is_empty() {
            tracing::debug!(%ignored, "dropped text after return marker");
        }

        let thoughts = lines[..index]
            .iter()
            .map(|line| line.trim())
            .filter(|line| !line.is_empty() && *line != "Thoughts:")
            .map(str::to_owned)
            .collect();
        Ok((thoughts, payload))
    }
}

/// Non-blank lines following the marker, joined by newlines.
fn trailing_text(lines: &[&str]) -> String {
    lines
        .iter()
        .map(|line| line.trim())
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

impl Adapter for ChainAdapter {
    fn name(&self) -> &str {
        "chain"
    }

    fn describe(&self, task: &Task) -> String {
        render_task(task)
    }

    fn prompt(&self, task: &Task) -> String {
        template::fill(CHAIN_PROMPT, &[("task", &self.describe(task))])
    }

    fn parse(&self, task: &Task, response: &str) -> Result<Value> {
        let (thoughts, payload) = self.split(response)?;
        let answer = self.typed.decode(task, payload)?;
        Ok(json!({ "thoughts": thoughts, "answer": answer }))
    }
}

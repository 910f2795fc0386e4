//! The adapter seam and the `task`, `plain` and `type` variants.
//!
//! An adapter owns three pieces of text handling for one negotiation: the
//! initial prompt, decoding a response, and the correction prompt sent when
//! decoding fails.  It never performs I/O; [`Negotiation`](crate::Negotiation)
//! drives it.

use regex::Regex;
use serde_json::Value;
use servitor_schema::{Task, decode_text, render_task};

use crate::error::Result;
use crate::template::{self, FIX_PROMPT, PLAIN_PROMPT, TYPE_PROMPT};

/// One prompting and decoding strategy.
pub trait Adapter: Send + Sync {
    /// Registry name, such as `type`.
    fn name(&self) -> &str;

    /// The task text embedded in prompts.
    fn describe(&self, task: &Task) -> String {
        task.instruction()
    }

    /// The first prompt of a negotiation.
    fn prompt(&self, task: &Task) -> String;

    /// Decode a raw response.  Any error starts a correction round.
    fn parse(&self, task: &Task, response: &str) -> Result<Value>;

    /// The correction prompt for a response that failed to decode.
    fn fix(&self, task: &Task, response: &str, error: &str) -> String {
        template::fill(
            FIX_PROMPT,
            &[
                ("task", &self.describe(task)),
                ("response", response),
                ("error", error),
            ],
        )
    }
}

// ---------------------------------------------------------------------------
// task
// ---------------------------------------------------------------------------

/// Sends the bare instruction and returns the raw response text.
#[derive(Debug, Clone, Copy, Default)]
pub struct TaskAdapter;

impl Adapter for TaskAdapter {
    fn name(&self) -> &str {
        "task"
    }

    fn prompt(&self, task: &Task) -> String {
        self.describe(task)
    }

    fn parse(&self, _task: &Task, response: &str) -> Result<Value> {
        Ok(Value::String(response.to_owned()))
    }
}

// ---------------------------------------------------------------------------
// plain
// ---------------------------------------------------------------------------

/// `Q: …\nA:` framing; the answer text is returned as is.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainAdapter;

impl Adapter for PlainAdapter {
    fn name(&self) -> &str {
        "plain"
    }

    fn prompt(&self, task: &Task) -> String {
        template::fill(PLAIN_PROMPT, &[("task", &self.describe(task))])
    }

    fn parse(&self, _task: &Task, response: &str) -> Result<Value> {
        Ok(Value::String(response.trim().to_owned()))
    }
}

// ---------------------------------------------------------------------------
// type
// ---------------------------------------------------------------------------

/// Renders the operation's signature and arguments, and decodes the response
/// against its declared result type through the permissive dialect.
#[derive(Debug, Clone)]
pub struct TypeAdapter {
    tuple_parens: Regex,
}

impl TypeAdapter {
    pub fn new() -> Result<Self> {
        Ok(Self {
            tuple_parens: Regex::new(r"\(([^)]*)\)")?,
        })
    }

    /// Strip incidental wrapping from a model response.
    ///
    /// Removes a leading Markdown code fence, surrounding backticks and
    /// whitespace, and an echoed leading `return `.  With `tuple` set,
    /// parenthesised groups are rewritten as brackets so `(1, 2)` parses as
    /// a sequence.
    pub fn clean(&self, response: &str, tuple: bool) -> String {
        let mut text = response.trim();

        if let Some(fenced) = text.strip_prefix("```") {
            let body = fenced.split_once('\n').map_or("", |(_, body)| body);
            text = body.trim_end().strip_suffix("```").unwrap_or(body);
        }

        text = text.trim_matches(|c: char| c.is_whitespace() || c == '`');
        if let Some(rest) = text.strip_prefix("return ") {
            text = rest.trim_start();
        }

        if tuple {
            self.tuple_parens.replace_all(text, "[$1]").into_owned()
        } else {
            text.to_owned()
        }
    }

    /// Clean and decode `response` against the task's result type.
    pub fn decode(&self, task: &Task, response: &str) -> Result<Value> {
        let result_type = task.operation().result_type();
        let cleaned = self.clean(response, result_type.is_tuple());
        tracing::debug!(response = %cleaned, "decoding response");
        Ok(decode_text(&cleaned, result_type)?)
    }
}

impl Adapter for TypeAdapter {
    fn name(&self) -> &str {
        "type"
    }

    fn describe(&self, task: &Task) -> String {
        render_task(task)
    }

    fn prompt(&self, task: &Task) -> String {
        template::fill(TYPE_PROMPT, &[("task", &self.describe(task))])
    }

    fn parse(&self, task: &Task, response: &str) -> Result<Value> {
        self.decode(task, response)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;
    use servitor_schema::{Arguments, DeclaredType, Operation, Param};

    use super::*;

    fn list_people() -> Task {
        let op = Operation::new("list_people")
            .doc("List the people mentioned in the text.")
            .param(Param::new("text", DeclaredType::string()))
            .returns(DeclaredType::list(DeclaredType::string()));
        Task::bind(
            Arc::new(op),
            Arguments::new().arg("John and Mary went to the store."),
        )
        .unwrap()
    }

    fn typed() -> TypeAdapter {
        TypeAdapter::new().unwrap()
    }

    #[test]
    fn clean_strips_wrapping() {
        let adapter = typed();
        assert_eq!(adapter.clean("  `[1, 2]`  ", false), "[1, 2]");
        assert_eq!(adapter.clean("return \"Friday\"", false), "\"Friday\"");
        assert_eq!(adapter.clean("```json\n{\"a\": 1}\n```", false), "{\"a\": 1}");
        assert_eq!(adapter.clean("```\n[1]", false), "[1]");
    }

    #[test]
    fn clean_rewrites_tuples_only_when_asked() {
        let adapter = typed();
        assert_eq!(adapter.clean("(1, \"a\")", true), "[1, \"a\"]");
        assert_eq!(adapter.clean("(1, \"a\")", false), "(1, \"a\")");
    }

    #[test]
    fn task_adapter_is_verbatim() {
        let task = list_people();
        assert_eq!(TaskAdapter.prompt(&task), "List the people mentioned in the text.");
        assert_eq!(TaskAdapter.parse(&task, " raw ").unwrap(), json!(" raw "));
    }

    #[test]
    fn plain_adapter_frames_question() {
        let task = list_people();
        assert_eq!(
            PlainAdapter.prompt(&task),
            "Q: List the people mentioned in the text.\nA:"
        );
        assert_eq!(PlainAdapter.parse(&task, " John \n").unwrap(), json!("John"));
    }

    #[test]
    fn type_adapter_prompt_embeds_signature() {
        let prompt = typed().prompt(&list_people());
        assert!(prompt.starts_with("You are to act as a magic interpreter."));
        assert!(prompt.contains("def: list_people(text: string) -> [string]"));
        assert!(prompt.contains("doc: List the people mentioned in the text."));
        assert!(prompt.contains("\ttext: \"John and Mary went to the store.\""));
        assert!(prompt.ends_with("}\nreturn"));
    }

    #[test]
    fn type_adapter_decodes_and_rejects() {
        let task = list_people();
        let adapter = typed();
        assert_eq!(
            adapter.parse(&task, "[\"John\", \"Mary\"]").unwrap(),
            json!(["John", "Mary"])
        );
        assert_eq!(
            adapter.parse(&task, "return [John, Mary]").unwrap(),
            json!(["John", "Mary"])
        );
        assert!(adapter.parse(&task, "John, Mary").is_err());
    }

    #[test]
    fn type_adapter_tuple_parentheses() {
        let op = Operation::new("pair").returns(DeclaredType::tuple([
            DeclaredType::string(),
            DeclaredType::integer(),
        ]));
        let task = Task::bind(Arc::new(op), Arguments::new()).unwrap();
        assert_eq!(
            typed().parse(&task, "(\"a\", 2)").unwrap(),
            json!(["a", 2])
        );
    }

    #[test]
    fn fix_prompt_embeds_task_response_and_error() {
        let task = list_people();
        let fix = typed().fix(&task, "John, Mary", "unexpected trailing content");
        assert!(fix.starts_with("def: list_people(text: string) -> [string]"));
        assert!(fix.contains("\nJohn, Mary\nParsing failed, unexpected trailing content\n"));
        assert!(fix.ends_with("Fix all parsing mistakes above:\n"));
    }
}

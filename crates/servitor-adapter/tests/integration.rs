//! Integration tests for the servitor-adapter crate.
//!
//! Each test drives a full negotiation against a scripted responder, the way
//! the kernel drives it against a connector.

use std::collections::VecDeque;
use std::sync::Arc;

use serde_json::json;
use servitor_adapter::{
    AdapterError, AdapterRegistry, ChainOfThought, Negotiation, Next, Result,
};
use servitor_schema::{Arguments, DeclaredType, Operation, Param, Record, Task};

fn list_people() -> Arc<Operation> {
    Arc::new(
        Operation::new("list_people")
            .doc("List the people mentioned in the text.")
            .param(Param::new("text", DeclaredType::string()))
            .returns(DeclaredType::list(DeclaredType::string())),
    )
}

fn store_task() -> Task {
    Task::bind(
        list_people(),
        Arguments::new().arg("John and Mary went to the store."),
    )
    .unwrap()
}

/// Replays canned responses and records every prompt it was sent.
struct Script {
    responses: VecDeque<&'static str>,
    prompts: Vec<String>,
}

impl Script {
    fn new(responses: &[&'static str]) -> Self {
        Self {
            responses: responses.iter().copied().collect(),
            prompts: Vec::new(),
        }
    }

    fn respond(&mut self, prompt: &str) -> Result<String> {
        self.prompts.push(prompt.to_owned());
        self.responses
            .pop_front()
            .map(str::to_owned)
            .ok_or_else(|| AdapterError::Protocol {
                reason: "script exhausted".into(),
            })
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  type adapter
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn well_formed_first_response() {
    let registry = AdapterRegistry::with_defaults().unwrap();
    let mut script = Script::new(&[r#"["John","Mary"]"#]);

    let (value, attempts) = Negotiation::new(registry.get("type").unwrap(), store_task(), 3)
        .run(|p| script.respond(p))
        .unwrap();

    assert_eq!(value, json!(["John", "Mary"]));
    assert_eq!(attempts.len(), 1);
    assert_eq!(script.prompts.len(), 1);
    assert!(script.prompts[0].contains("def: list_people(text: string) -> [string]"));
}

#[test]
fn malformed_then_corrected() {
    let registry = AdapterRegistry::with_defaults().unwrap();
    let mut script = Script::new(&["John, Mary", r#"["John","Mary"]"#]);

    let (value, attempts) = Negotiation::new(registry.get("type").unwrap(), store_task(), 3)
        .run(|p| script.respond(p))
        .unwrap();

    assert_eq!(value, json!(["John", "Mary"]));
    assert_eq!(attempts.len(), 2);
    assert_eq!(attempts[0].response, "John, Mary");
    assert!(attempts[0].error.is_some());
    assert!(attempts[1].error.is_none());
    assert!(script.prompts[1].contains("Fix all parsing mistakes above:"));
}

#[test]
fn never_valid_exhausts_budget() {
    let registry = AdapterRegistry::with_defaults().unwrap();
    let mut script = Script::new(&["nope, nope"; 3]);

    let err = Negotiation::new(registry.get("type").unwrap(), store_task(), 2)
        .run(|p| script.respond(p))
        .unwrap_err();

    let AdapterError::Parse(parse) = err else {
        panic!("expected a parse error");
    };
    assert_eq!(parse.attempts.len(), 3);
    assert_eq!(script.prompts.len(), 3);
    for (attempt, prompt) in parse.attempts.iter().zip(&script.prompts) {
        assert_eq!(&attempt.prompt, prompt);
    }
}

#[test]
fn sloppy_record_response() {
    let op = Arc::new(
        Operation::new("describe")
            .param(Param::new("name", DeclaredType::string()))
            .returns(DeclaredType::Record(
                Record::named("Person")
                    .field("name", DeclaredType::string())
                    .optional_field("age", DeclaredType::integer())
                    .field("likes_cats", DeclaredType::boolean()),
            )),
    );
    let task = Task::bind(op, Arguments::new().kwarg("name", "Ann")).unwrap();
    let registry = AdapterRegistry::with_defaults().unwrap();
    let mut script = Script::new(&["```\n{name: Ann, age: '31', likes_cats: yes,}\n```"]);

    let (value, _) = Negotiation::new(registry.get("type").unwrap(), task, 0)
        .run(|p| script.respond(p))
        .unwrap();
    assert_eq!(value, json!({"name": "Ann", "age": 31, "likes_cats": true}));
}

// ═══════════════════════════════════════════════════════════════════════
//  chain adapter
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn chain_missing_marker_triggers_correction() {
    let op = Arc::new(
        Operation::new("today")
            .doc("Get the day of the week from a statement.")
            .param(Param::new("text", DeclaredType::string()))
            .returns(DeclaredType::string()),
    );
    let task = Task::bind(op, Arguments::new().arg("Yesterday was Thursday.")).unwrap();
    let registry = AdapterRegistry::with_defaults().unwrap();

    let mut neg = Negotiation::new(registry.get("chain").unwrap(), task, 1);
    let Next::Prompt(_) = neg.begin().unwrap() else {
        panic!("expected the initial prompt");
    };
    let next = neg.resume("Yesterday was Thursday.\nSo today is Friday.").unwrap();
    let Next::Prompt(fix) = next else {
        panic!("expected a correction prompt");
    };
    assert!(fix.contains("no `return(answer)` statement found"));

    let next = neg
        .resume("Yesterday was Thursday.\nSo today is Friday.\nreturn(\"Friday\")")
        .unwrap();
    let Next::Done(value) = next else {
        panic!("expected a decoded value");
    };
    let result: ChainOfThought<String> = serde_json::from_value(value).unwrap();
    assert_eq!(result.answer, "Friday");
    assert_eq!(result.thoughts.len(), 2);
    assert_eq!(neg.attempts().len(), 2);
}

// ═══════════════════════════════════════════════════════════════════════
//  task and plain adapters, untyped operations
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn untyped_operation_through_each_variant() {
    let op = Arc::new(Operation::untyped("Name a primary color."));
    let task = Task::bind(Arc::clone(&op), Arguments::new()).unwrap();
    let registry = AdapterRegistry::with_defaults().unwrap();

    let mut script = Script::new(&[" Red "]);
    let (value, _) = Negotiation::new(registry.get("task").unwrap(), task.clone(), 3)
        .run(|p| script.respond(p))
        .unwrap();
    assert_eq!(value, json!(" Red "));
    assert_eq!(script.prompts[0], "Name a primary color.");

    let mut script = Script::new(&[" Red "]);
    let (value, _) = Negotiation::new(registry.get("plain").unwrap(), task.clone(), 3)
        .run(|p| script.respond(p))
        .unwrap();
    assert_eq!(value, json!("Red"));
    assert_eq!(script.prompts[0], "Q: Name a primary color.\nA:");

    let mut script = Script::new(&["\"red\""]);
    let (value, _) = Negotiation::new(registry.get("type").unwrap(), task, 3)
        .run(|p| script.respond(p))
        .unwrap();
    assert_eq!(value, json!("red"));
    assert!(script.prompts[0].contains("task: Name a primary color.\nargs: []\nkwargs: {}"));
}

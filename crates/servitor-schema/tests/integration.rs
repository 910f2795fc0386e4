//! Integration tests for the servitor-schema crate.
//!
//! These tests exercise notation, rendering, the response dialect and
//! decoding together, the way a negotiation round uses them.

use std::sync::Arc;

use serde_json::json;
use servitor_schema::{
    Arguments, Declare, DeclaredType, Operation, Param, Record, SchemaError, Task, decode,
    decode_text, parse_type, render_signature, render_task, render_type,
};

// ═══════════════════════════════════════════════════════════════════════
//  Notation
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn rendered_notation_is_a_normal_form() {
    let samples = [
        "string",
        "int?",
        "(string|int)?",
        "[string]",
        "{float}",
        "(string, int)",
        "(bool,)",
        "(int, ...)",
        r#""red"|"blue"|3"#,
        "Person{name: string, age?: int, tags: [string], ...}",
        "{thoughts: [string], answer: any}",
    ];
    for notation in samples {
        let ty = parse_type(notation).unwrap();
        assert_eq!(render_type(&ty), notation, "{notation}");
        assert_eq!(parse_type(&render_type(&ty)).unwrap(), ty, "{notation}");
    }
}

#[test]
fn notation_aliases_normalize() {
    let ty = parse_type("[ str | integer ]").unwrap();
    assert_eq!(render_type(&ty), "[string|int]");
}

// ═══════════════════════════════════════════════════════════════════════
//  Decode properties
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn decode_is_identity_on_well_shaped_values() {
    let person: DeclaredType = Record::new()
        .field("name", DeclaredType::string())
        .optional_field("nick", DeclaredType::optional(DeclaredType::string()))
        .field("age", DeclaredType::integer())
        .into();

    let cases = [
        (DeclaredType::string(), json!("text")),
        (DeclaredType::integer(), json!(-4)),
        (DeclaredType::float(), json!(0.25)),
        (DeclaredType::float(), json!(3)),
        (DeclaredType::boolean(), json!(false)),
        (DeclaredType::null(), json!(null)),
        (DeclaredType::optional(DeclaredType::string()), json!(null)),
        (DeclaredType::optional(DeclaredType::string()), json!("x")),
        (
            DeclaredType::union([DeclaredType::integer(), DeclaredType::string()]),
            json!("words"),
        ),
        (person.clone(), json!({"name": "Ann", "age": 31})),
        (person.clone(), json!({"name": "Ann", "nick": "A", "age": 31})),
        (person, json!({"name": "Ann", "nick": null, "age": 31})),
    ];
    for (ty, value) in cases {
        assert_eq!(decode(&value, &ty).unwrap(), value, "{}", render_type(&ty));
    }
}

#[test]
fn union_decode_is_deterministic() {
    let ty = DeclaredType::union([
        DeclaredType::boolean(),
        DeclaredType::integer(),
        DeclaredType::string(),
    ]);
    // "1" fits all three branches; the first declared one wins every time.
    for _ in 0..10 {
        assert_eq!(decode(&json!("1"), &ty).unwrap(), json!(true));
    }
}

#[test]
fn fractional_strings_never_truncate() {
    let err = decode(&json!("1.5"), &DeclaredType::integer()).unwrap_err();
    assert!(matches!(err, SchemaError::TypeMismatch { .. }));
    assert!(err.is_recoverable());
}

// ═══════════════════════════════════════════════════════════════════════
//  Model responses
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn list_people_response_decodes() {
    let ty = Vec::<String>::declared_type();
    assert_eq!(
        decode_text(r#"["John","Mary"]"#, &ty).unwrap(),
        json!(["John", "Mary"])
    );

    let err = decode_text("John, Mary", &ty).unwrap_err();
    assert!(matches!(err, SchemaError::Syntax { .. }));
    assert!(err.is_recoverable());
}

#[test]
fn sloppy_record_response_decodes() {
    let ty = parse_type("{name: string, age: int, member: bool}").unwrap();
    let text = "{\n  name: Ann Lee  // from the text\n  age: '31',\n  member: Yes,\n}";
    assert_eq!(
        decode_text(text, &ty).unwrap(),
        json!({"name": "Ann Lee", "age": 31, "member": true})
    );
}

// ═══════════════════════════════════════════════════════════════════════
//  Operations
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn bound_task_renders_for_the_prompt() {
    let op = Arc::new(
        Operation::new("list_people")
            .doc("List the people mentioned in the text.")
            .param(Param::new("text", String::declared_type()))
            .returns(Vec::<String>::declared_type()),
    );
    assert_eq!(render_signature(&op), "list_people(text: string) -> [string]");

    let task = Task::bind(
        op,
        Arguments::new().arg("John and Mary went to the store."),
    )
    .unwrap();
    let text = render_task(&task);
    assert!(text.starts_with("def: list_people(text: string) -> [string]\n"));
    assert!(text.contains("doc: List the people mentioned in the text."));
    assert!(text.contains("\ttext: \"John and Mary went to the store.\""));
}

#[test]
fn binding_failure_names_the_operation() {
    let op = Arc::new(Operation::new("count").param(Param::new("n", DeclaredType::integer())));
    let err = Task::bind(op, Arguments::new().kwarg("n", "many")).unwrap_err();
    assert!(err.to_string().starts_with("cannot bind arguments for `count`"));
    assert!(!err.is_recoverable());
}

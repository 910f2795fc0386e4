//! Prompt templates.
//!
//! Templates are written indented in source and dedented before their
//! `{placeholders}` are filled.  `{{` and `}}` produce literal braces.

/// Question/answer framing used by the `plain` adapter.
pub const PLAIN_PROMPT: &str = "Q: {task}\nA:";

/// Correction prompt sent after a response fails to decode.
pub const FIX_PROMPT: &str = "{task}\n{response}\nParsing failed, {error}\nFix all parsing mistakes above:\n";

/// Main prompt of the `type` adapter.  The example answer is a string so
/// models learn to quote strings.
pub const TYPE_PROMPT: &str = "\
    You are to act as a magic interpreter. Given a function description and arguments, provide the best possible answer as a plaintext JSON literal like `return \"value\"`.
    {task}
    return";

/// Main prompt of the `chain` adapter.
pub const CHAIN_PROMPT: &str = "\
    You are to act as a magic interpreter. Given a function description and arguments, list your thoughts step by step separated by newlines. When you have a final answer, output `return(answer)` where `answer` is a plaintext JSON literal matching the function signature as the last line. Example:
    def: today(text: string) -> string
    doc: Get the day of the week from a statement.
    args: {{
    \ttext: \"The day before two days after the day before tomorrow is Saturday.\"
    }}
    Thoughts:
    The day before tomorrow is today.
    Two days after that is the day after tomorrow.
    The day before that is tomorrow.
    Tomorrow is Saturday, so today is Friday.
    return(\"Friday\")

    {task}";

/// Remove the common indentation of a template.
///
/// The indentation is taken from the first line, or from the second line
/// when the first starts flush left, and stripped wherever a line begins
/// with it.
pub fn dedent(text: &str) -> String {
    let indent_of = |line: &str| {
        let width = line.len() - line.trim_start_matches([' ', '\t']).len();
        line[..width].to_owned()
    };

    let mut lines = text.lines();
    let first = lines.next().unwrap_or_default();
    let mut indent = indent_of(first);
    if indent.is_empty() {
        indent = lines.next().map(indent_of).unwrap_or_default();
    }
    if indent.is_empty() {
        return text.to_owned();
    }

    text.split('\n')
        .map(|line| line.strip_prefix(indent.as_str()).unwrap_or(line))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Dedent `template` and substitute each `{name}` found in `vars`.
///
/// Unknown placeholders are left as written.
pub fn fill(template: &str, vars: &[(&str, &str)]) -> String {
    let text = dedent(template);
    let mut out = String::with_capacity(text.len());
    let mut rest = text.as_str();

    while let Some(pos) = rest.find(['{', '}']) {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];

        if tail.starts_with("{{") || tail.starts_with("}}") {
            out.push_str(&tail[..1]);
            rest = &tail[2..];
            continue;
        }

        if tail.starts_with('{')
            && let Some(end) = tail.find('}')
            && let Some((_, value)) = vars.iter().find(|(name, _)| *name == &tail[1..end])
        {
            out.push_str(value);
            rest = &tail[end + 1..];
            continue;
        }

        out.push_str(&tail[..1]);
        rest = &tail[1..];
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedent_from_second_line() {
        let text = "first\n    second\n\tnot stripped\n    third";
        assert_eq!(dedent(text), "first\nsecond\n\tnot stripped\nthird");
    }

    #[test]
    fn dedent_from_first_line() {
        assert_eq!(dedent("\t\ta\n\t\t\tb\n"), "a\n\tb\n");
        assert_eq!(dedent("flush\nleft"), "flush\nleft");
    }

    #[test]
    fn fill_substitutes_and_unescapes() {
        let out = fill("{task} -> {{literal}} {unknown}", &[("task", "go")]);
        assert_eq!(out, "go -> {literal} {unknown}");
    }

    #[test]
    fn fill_does_not_rescan_values() {
        let out = fill("{a}", &[("a", "{b}"), ("b", "x")]);
        assert_eq!(out, "{b}");
    }

    #[test]
    fn type_prompt_shape() {
        let prompt = fill(TYPE_PROMPT, &[("task", "def: f() -> int")]);
        assert!(prompt.starts_with("You are to act as a magic interpreter."));
        assert!(prompt.ends_with("\ndef: f() -> int\nreturn"));
        assert!(!prompt.contains("\n    "));
    }

    #[test]
    fn chain_prompt_keeps_example_indentation() {
        let prompt = fill(CHAIN_PROMPT, &[("task", "TASK")]);
        assert!(prompt.contains("args: {\n\ttext: \"The day before"));
        assert!(prompt.contains("return(\"Friday\")\n\nTASK"));
    }

    #[test]
    fn fix_prompt_shape() {
        let prompt = fill(
            FIX_PROMPT,
            &[("task", "T"), ("response", "John, Mary"), ("error", "bad")],
        );
        assert_eq!(
            prompt,
            "T\nJohn, Mary\nParsing failed, bad\nFix all parsing mistakes above:\n"
        );
    }
}

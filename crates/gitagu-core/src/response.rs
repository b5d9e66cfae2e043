//! Prioritized parser chain for JSON objects embedded in agent responses.
//!
//! Agents wrap JSON in prose, code fences or both. Each strategy is a pure
//! `text -> candidates` function; [`parse_object`] tries them in order and,
//! within the first strategy that yields a usable object, picks the candidate
//! carrying the most expected keys.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};
use tracing::debug;

/// One extraction strategy; candidates are returned in text order.
pub type Strategy = fn(&str) -> Vec<Map<String, Value>>;

/// Strategies in the order they are attempted.
pub const STRATEGIES: &[(&str, Strategy)] = &[
    ("fenced_block", fenced_block),
    ("balanced_braces", balanced_braces),
    ("greedy_braces", greedy_braces),
    ("raw", raw),
];

static FENCED_JSON: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```json\s*(.*?)\s*```").expect("invalid fence regex"));

static GREEDY_OBJECT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\{.*\}").expect("invalid object regex"));

/// Run the chain, returning the best object containing any of `expected`.
///
/// Ties go to the candidate that appears first.
pub fn parse_object(text: &str, expected: &[&str]) -> Option<Map<String, Value>> {
    STRATEGIES.iter().find_map(|(name, strategy)| {
        let mut best: Option<(usize, Map<String, Value>)> = None;
        for object in strategy(text) {
            let hits = expected.iter().filter(|key| object.contains_key(**key)).count();
            if hits > best.as_ref().map_or(0, |(n, _)| *n) {
                best = Some((hits, object));
            }
        }
        match best {
            Some((hits, object)) => {
                debug!(strategy = name, hits, keys = object.len(), "parsed agent response");
                Some(object)
            }
            None => {
                debug!(strategy = name, "no candidate with expected keys");
                None
            }
        }
    })
}

fn as_object(candidate: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(candidate) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

/// Contents of fenced ```` ```json ```` blocks.
pub fn fenced_block(text: &str) -> Vec<Map<String, Value>> {
    FENCED_JSON
        .captures_iter(text)
        .filter_map(|caps| caps.get(1).and_then(|m| as_object(m.as_str())))
        .collect()
}

/// Every brace-balanced span that parses as an object, ordered by start.
///
/// Braces inside JSON string literals do not count towards the balance.
pub fn balanced_braces(text: &str) -> Vec<Map<String, Value>> {
    let mut spans = balanced_spans(text);
    spans.sort_unstable_by_key(|(start, _)| *start);
    spans
        .into_iter()
        .filter_map(|(start, end)| as_object(&text[start..=end]))
        .collect()
}

/// Single pass over `text`; strings are only tracked inside an open brace.
fn balanced_spans(text: &str) -> Vec<(usize, usize)> {
    let mut open = Vec::new();
    let mut spans = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' if !open.is_empty() => in_string = true,
            '{' => open.push(i),
            '}' => {
                if let Some(start) = open.pop() {
                    spans.push((start, i));
                }
            }
            _ => {}
        }
    }
    spans
}

/// Span from the first `{` to the last `}`.
pub fn greedy_braces(text: &str) -> Vec<Map<String, Value>> {
    GREEDY_OBJECT
        .find(text)
        .and_then(|m| as_object(m.as_str()))
        .into_iter()
        .collect()
}

/// The whole response as JSON.
pub fn raw(text: &str) -> Vec<Map<String, Value>> {
    as_object(text.trim()).into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEYS: &[&str] = &["prerequisites", "testing"];

    #[test]
    fn test_should_extract_fenced_block() {
        let text = "Here you go:\n```json\n{\"testing\": \"cargo test\"}\n```\nEnjoy.";
        let objects = fenced_block(text);
        assert_eq!(objects.len(), 1);
        assert_eq!(objects[0]["testing"], "cargo test");
    }

    #[test]
    fn test_should_list_balanced_objects_in_text_order() {
        let text = r#"Result: {"run_app": "echo \"{not a brace}\"", "nested": {"a": 1}} trailing {"x": 2}"#;
        let objects = balanced_braces(text);
        assert_eq!(objects.len(), 3);
        assert_eq!(objects[0]["run_app"], "echo \"{not a brace}\"");
        assert!(objects[0].contains_key("nested"));
        assert_eq!(objects[1]["a"], 1);
        assert_eq!(objects[2]["x"], 2);
    }

    #[test]
    fn test_should_skip_unparseable_brace_spans() {
        let text = r#"use {curly} braces, then {"testing": "pytest"}"#;
        let objects = balanced_braces(text);
        assert_eq!(objects.len(), 1);
        assert_eq!(objects[0]["testing"], "pytest");
    }

    #[test]
    fn test_should_match_greedy_span() {
        let text = "prefix {\"testing\": \"npm test\"} suffix";
        let objects = greedy_braces(text);
        assert_eq!(objects[0]["testing"], "npm test");
    }

    #[test]
    fn test_should_parse_raw_response() {
        let objects = raw("  {\"prerequisites\": \"rustup\"}\n");
        assert_eq!(objects[0]["prerequisites"], "rustup");
        assert!(raw("[1, 2]").is_empty());
    }

    #[test]
    fn test_should_fall_through_to_later_strategy() {
        let text = "```json\n{not json}\n```\nActually: {\"testing\": \"go test ./...\"}";
        let object = parse_object(text, KEYS).expect("should parse");
        assert_eq!(object["testing"], "go test ./...");
    }

    #[test]
    fn test_should_accept_partial_objects() {
        let object = parse_object("{\"testing\": \"pytest\"}", KEYS).expect("should parse");
        assert_eq!(object.len(), 1);
    }

    #[test]
    fn test_should_return_none_without_json() {
        assert!(parse_object("I could not find any setup commands.", KEYS).is_none());
        assert!(parse_object("{\"other\": 1}", KEYS).is_none());
    }

    #[test]
    fn test_should_skip_format_example_before_answer() {
        let text = r#"The format is {"key": "value"}. Answer: {"testing": "pytest", "linting": "ruff"}"#;
        let object = parse_object(text, &["testing", "linting"]).expect("should parse");
        assert_eq!(object["testing"], "pytest");
        assert_eq!(object["linting"], "ruff");
    }

    #[test]
    fn test_should_prefer_object_with_more_expected_keys() {
        let text = r#"Partial {"testing": "make test"} then full {"testing": "pytest", "prerequisites": "python"}"#;
        let object = parse_object(text, KEYS).expect("should parse");
        assert_eq!(object["testing"], "pytest");
    }

    #[test]
    fn test_should_keep_first_object_on_equal_key_count() {
        let text = r#"{"testing": "first"} {"testing": "second"}"#;
        let object = parse_object(text, KEYS).expect("should parse");
        assert_eq!(object["testing"], "first");
    }

    #[test]
    fn test_should_scan_unmatched_braces_once() {
        let mut text = "{".repeat(20_000);
        text.push_str(r#"{"testing": "cargo test"}"#);
        let objects = balanced_braces(&text);
        assert_eq!(objects.len(), 1);
        assert_eq!(objects[0]["testing"], "cargo test");
    }
}

//! Extraction of usable payloads from free-form oracle text.
//!
//! The oracle is asked for a bare JSON array but routinely wraps it in prose
//! or code fences, or answers with a bulleted list. Extraction tries, in
//! order: the whole cleaned text as a JSON array, the first bracketed span as
//! a JSON array, then line/comma tokens. Only directory tokens (ending in
//! `/`) survive.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

static FENCED_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```[A-Za-z0-9_+-]*[ \t]*\r?\n(.*?)```").expect("static regex")
});

// Leading bullet or enumeration: "- ", "* ", "1. ", "2) "
static LIST_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(?:[-*•]|\d+[.)])\s+").expect("static regex"));

static FENCE_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^[ \t]*```[A-Za-z0-9_+-]*[ \t]*$").expect("static regex"));

/// Remove enclosing code fences and surrounding whitespace.
///
/// When the text contains a complete fenced block, its body wins over any
/// prose around it. An unterminated fence (truncated output) is dropped.
pub fn strip_code_fences(content: &str) -> String {
    if let Some(caps) = FENCED_BLOCK.captures(content) {
        return caps[1].trim().to_string();
    }
    FENCE_MARKER.replace_all(content, "").trim().to_string()
}

fn is_template_dir(token: &str) -> bool {
    token.len() > 1 && token.ends_with('/') && !token.chars().any(char::is_whitespace)
}

fn directories_from_json(value: Value) -> Vec<String> {
    match value {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|item| match item {
                Value::String(s) if is_template_dir(&s) => Some(s),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

fn embedded_array(content: &str) -> Option<Value> {
    let start = content.find('[')?;
    let end = content.rfind(']')?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&content[start..=end]).ok()
}

fn directories_from_tokens(content: &str) -> Vec<String> {
    content
        .lines()
        .map(|line| LIST_MARKER.replace(line, ""))
        .flat_map(|line| {
            line.split(',')
                .map(|token| {
                    token
                        .trim()
                        .trim_matches(|c: char| matches!(c, '[' | ']' | '"' | '\'' | '`'))
                        .trim()
                        .to_string()
                })
                .collect::<Vec<_>>()
        })
        .filter(|token| is_template_dir(token))
        .collect()
}

/// Extract template directory identifiers from oracle output.
///
/// Returns `None` when nothing usable remains, never an empty list.
pub fn extract_template_dirs(raw: &str) -> Option<Vec<String>> {
    let content = strip_code_fences(raw);
    if content.is_empty() {
        return None;
    }

    let strict = serde_json::from_str::<Value>(&content)
        .ok()
        .filter(Value::is_array)
        .map(directories_from_json);
    if let Some(dirs) = strict {
        // A well-formed array is authoritative even when every element is dropped.
        return (!dirs.is_empty()).then_some(dirs);
    }

    if let Some(dirs) = embedded_array(&content)
        .map(directories_from_json)
        .filter(|dirs| !dirs.is_empty())
    {
        return Some(dirs);
    }

    let dirs = directories_from_tokens(&content);
    (!dirs.is_empty()).then_some(dirs)
}

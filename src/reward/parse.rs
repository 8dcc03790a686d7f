//! Extraction of structured blocks from generated solutions.
//!
//! A rollout step is plain text carrying up to three tagged blocks:
//!
//! ```text
//! <think> chain-of-thought reasoning </think>
//! <tool_call>
//! {"name": "search", "parameters": {"query": "LAX airport"}}
//! </tool_call>
//! <response> message shown to the user </response>
//! ```
//!
//! Chat-template sentinels (`<|im_start|>assistant`, `<|im_end|>`) wrap the
//! generation and are stripped before any block is read.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single tool invocation parsed from a `<tool_call>` block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// The tool name.
    pub name: String,
    /// The argument object passed to the tool. Defaults to an empty object
    /// when the call omits it.
    #[serde(default = "empty_object")]
    pub parameters: Value,
}

fn empty_object() -> Value {
    Value::Object(serde_json::Map::new())
}

impl ToolCall {
    /// Parameter keys of this call, sorted for deterministic comparison.
    pub fn parameter_keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = match &self.parameters {
            Value::Object(map) => map.keys().map(String::as_str).collect(),
            _ => Vec::new(),
        };
        keys.sort_unstable();
        keys
    }

    /// Look up a single parameter value by key.
    pub fn parameter(&self, key: &str) -> Option<&Value> {
        self.parameters.get(key)
    }
}

/// Strip the chat-template sentinels wrapping an assistant generation.
///
/// Everything before `<|im_start|>assistant` and everything from the first
/// `<|im_end|>` onward is discarded. Text without sentinels passes through
/// unchanged (ground truths are stored unwrapped).
pub fn strip_sentinels(text: &str) -> &str {
    const START: &str = "<|im_start|>assistant";
    const END: &str = "<|im_end|>";

    let body = match text.find(START) {
        Some(idx) => &text[idx + START.len()..],
        None => text,
    };
    let body = match body.find(END) {
        Some(idx) => &body[..idx],
        None => body,
    };
    body.trim()
}

/// Extract the trimmed interior of the first `<tag>...</tag>` block.
///
/// Returns `None` when either tag is missing or the close tag precedes the
/// open tag.
pub fn extract_block<'a>(text: &'a str, tag: &str) -> Option<&'a str> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");

    let start = text.find(&open)? + open.len();
    let end = text[start..].find(&close)? + start;
    Some(text[start..end].trim())
}

/// Parse the tool calls inside a solution's `<tool_call>` block.
///
/// Each non-empty line of the block is expected to hold one JSON object; as
/// a fallback the whole block is tried as a single object (some models emit
/// pretty-printed calls spanning several lines). Unparseable lines are
/// skipped -- a malformed call simply earns no credit.
pub fn parse_tool_calls(text: &str) -> Vec<ToolCall> {
    let block = match extract_block(text, "tool_call") {
        Some(block) if !block.is_empty() => block,
        _ => return Vec::new(),
    };

    let mut calls: Vec<ToolCall> = block
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(|line| serde_json::from_str::<ToolCall>(line).ok())
        .collect();

    if calls.is_empty() {
        if let Ok(call) = serde_json::from_str::<ToolCall>(block) {
            calls.push(call);
        }
    }

    calls
}

//! Canonical Action shape and normalization of raw oracle payloads.
//!
//! Downstream code only ever sees [`Action`]. Everything the oracle might send
//! instead (arrays, fenced code blocks, surrounding prose) is resolved here in
//! at most one strict parse plus one in-place repair.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::OrchestrationError;

/// One proposed step.
///
/// `parameters` are opaque here; the tool registry checks them against the
/// tool's schema. `reasoning` is logged, never interpreted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    ToolUse {
        tool_name: String,
        #[serde(default)]
        parameters: Map<String, Value>,
        #[serde(default)]
        message: Option<String>,
        #[serde(default)]
        reasoning: Option<String>,
    },
    Complete {
        #[serde(default)]
        message: Option<String>,
        #[serde(default)]
        reasoning: Option<String>,
    },
    #[serde(alias = "clarify")]
    Error {
        #[serde(default)]
        message: Option<String>,
        #[serde(default)]
        reasoning: Option<String>,
    },
}

impl Action {
    pub fn error(message: impl Into<String>) -> Self {
        Action::Error {
            message: Some(message.into()),
            reasoning: None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Action::ToolUse { .. } => "tool_use",
            Action::Complete { .. } => "complete",
            Action::Error { .. } => "error",
        }
    }

    pub fn tool_name(&self) -> Option<&str> {
        match self {
            Action::ToolUse { tool_name, .. } => Some(tool_name),
            Action::Complete { .. } | Action::Error { .. } => None,
        }
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            Action::ToolUse { message, .. }
            | Action::Complete { message, .. }
            | Action::Error { message, .. } => message.as_deref(),
        }
    }

    pub fn reasoning(&self) -> Option<&str> {
        match self {
            Action::ToolUse { reasoning, .. }
            | Action::Complete { reasoning, .. }
            | Action::Error { reasoning, .. } => reasoning.as_deref(),
        }
    }
}

/// Shape the payload arrived in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseShape {
    Object,
    /// Array of `len` actions; only the first was kept.
    Batch { len: usize },
}

/// A canonical action plus how it had to be obtained.
#[derive(Debug, Clone, PartialEq)]
pub struct Normalized {
    pub action: Action,
    pub shape: ResponseShape,
    /// True when the strict parse failed and the repaired payload was used.
    pub repaired: bool,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OracleResponse {
    Batch(Vec<Value>),
    Single(Value),
}

/// Normalize a raw oracle payload into exactly one [`Action`].
///
/// The strict parse is tried first; on failure the payload is repaired once
/// (code fences and surrounding prose stripped) and parsed again.
pub fn normalize_response(raw: &str) -> Result<Normalized, OrchestrationError> {
    let strict_err = match parse_canonical(raw) {
        Ok((action, shape)) => {
            return Ok(Normalized {
                action,
                shape,
                repaired: false,
            });
        }
        Err(err) => err,
    };

    let Some(repaired) = extract_json(raw) else {
        return Err(OrchestrationError::OracleFormat(strict_err));
    };
    if repaired == raw.trim() {
        return Err(OrchestrationError::OracleFormat(strict_err));
    }

    parse_canonical(&repaired)
        .map(|(action, shape)| Normalized {
            action,
            shape,
            repaired: true,
        })
        .map_err(|err| OrchestrationError::OracleFormat(format!("{strict_err}; after repair: {err}")))
}

fn parse_canonical(raw: &str) -> Result<(Action, ResponseShape), String> {
    let response: OracleResponse =
        serde_json::from_str(raw.trim()).map_err(|err| format!("not json: {err}"))?;
    let (value, shape) = match response {
        OracleResponse::Single(value) => (value, ResponseShape::Object),
        OracleResponse::Batch(items) => {
            let len = items.len();
            let first = items
                .into_iter()
                .next()
                .ok_or_else(|| "empty action array".to_string())?;
            (first, ResponseShape::Batch { len })
        }
    };
    if !value.is_object() {
        return Err(format!("expected an action object, got {}", json_kind(&value)));
    }
    let action: Action =
        serde_json::from_value(value).map_err(|err| format!("not an action: {err}"))?;
    if let Action::ToolUse { tool_name, .. } = &action
        && tool_name.trim().is_empty()
    {
        return Err("tool_use without tool_name".to_string());
    }
    Ok((action, shape))
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

static FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```[A-Za-z0-9_-]*\s*\n?(.*?)```").unwrap());

/// Pull the JSON document out of a chatty payload.
///
/// Prefers the body of the first fenced code block, then slices from the first
/// `{` or `[` to the last matching closer. Returns `None` when nothing
/// JSON-like is present.
pub fn extract_json(raw: &str) -> Option<String> {
    let body = FENCE
        .captures(raw)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
        .unwrap_or(raw)
        .trim();

    let start = body.find(['{', '['])?;
    let closer = if body[start..].starts_with('{') { '}' } else { ']' };
    let end = body.rfind(closer)?;
    if end < start {
        return None;
    }
    Some(body[start..=end].to_string())
}

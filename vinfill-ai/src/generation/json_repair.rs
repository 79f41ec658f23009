//! Bounded repair of model-produced JSON
//!
//! One repair pass at most: strip Markdown code fences, cut to the outermost
//! `{...}`, drop trailing commas. Anything still invalid is a parse error.

use serde_json::{Map, Value};

use super::GenerationError;

/// Parse `text` as a JSON object, repairing it once if needed
pub fn parse_json_object(text: &str) -> Result<Map<String, Value>, GenerationError> {
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(text.trim()) {
        return Ok(map);
    }

    let repaired = repair(text);
    match serde_json::from_str::<Value>(&repaired) {
        Ok(Value::Object(map)) => {
            tracing::debug!("Structured output required repair");
            Ok(map)
        }
        Ok(other) => Err(GenerationError::Parse(format!(
            "expected a JSON object, got {}",
            json_kind(&other)
        ))),
        Err(e) => Err(GenerationError::Parse(format!("invalid JSON after repair: {}", e))),
    }
}

/// The single repair pass
pub fn repair(text: &str) -> String {
    let unfenced = strip_code_fences(text);
    let object = extract_outer_object(&unfenced).unwrap_or(&unfenced);
    remove_trailing_commas(object)
}

fn strip_code_fences(text: &str) -> String {
    text.lines()
        .filter(|line| !line.trim_start().starts_with("```"))
        .collect::<Vec<_>>()
        .join("\n")
}

fn extract_outer_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

fn remove_trailing_commas(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut in_string = false;
    let mut escaped = false;

    for (i, &c) in chars.iter().enumerate() {
        if in_string {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }

        match c {
            '"' => {
                in_string = true;
                out.push(c);
            }
            ',' => {
                let next = chars[i + 1..].iter().find(|ch| !ch.is_whitespace());
                if !matches!(next, Some('}') | Some(']')) {
                    out.push(c);
                }
            }
            _ => out.push(c),
        }
    }

    out
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

//! Response parsers for LLM output.

use crate::ai::components::Blackboard;
use crate::llm::client::LlmError;

/// Remove a markdown code fence wrapping the text.
///
/// Handles both ```` ```json ... ``` ```` and plain ```` ``` ... ``` ````
/// wrapping; text without a complete fence is returned unchanged. The
/// function is idempotent.
pub fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(body) = trimmed.strip_prefix("```") else {
        return text;
    };
    let Some(body) = body.strip_suffix("```") else {
        return text;
    };
    let body = body.strip_prefix("json").unwrap_or(body);
    body.trim_matches(|c: char| c.is_whitespace())
}

/// The default parser: strip code fences, parse as JSON, require a
/// top-level object, and shallow-merge its entries into
/// `blackboard.data["strategy"]`.
///
/// # Errors
///
/// [`LlmError::Parse`] for malformed JSON, a non-object payload, or an
/// existing non-object `"strategy"` entry.
pub fn default_json_parser(response: &str, blackboard: &mut Blackboard) -> Result<(), LlmError> {
    let cleaned = strip_code_fences(response);
    let parsed: serde_json::Value =
        serde_json::from_str(cleaned).map_err(|e| LlmError::Parse(e.to_string()))?;
    let serde_json::Value::Object(fields) = parsed else {
        return Err(LlmError::Parse(format!(
            "expected a JSON object, got {}",
            json_type_name(&parsed)
        )));
    };

    let strategy = blackboard
        .data
        .entry("strategy".to_owned())
        .or_insert_with(|| serde_json::json!({}));
    let serde_json::Value::Object(strategy) = strategy else {
        return Err(LlmError::Parse(
            "existing 'strategy' entry is not an object".to_owned(),
        ));
    };
    for (key, value) in fields {
        strategy.insert(key, value);
    }
    Ok(())
}

fn json_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a bool",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

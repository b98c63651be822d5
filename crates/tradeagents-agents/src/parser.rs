use serde::Deserialize;

use crate::error::AgentError;

/// Extract the first JSON object from a string that may contain surrounding text.
///
/// Handles common model response formats:
/// - Clean JSON: `{"key": "value"}`
/// - Markdown-wrapped: ```json\n{"key": "value"}\n```
/// - Prefix text: `Here is my verdict:\n{"key": "value"}`
pub fn extract_json(text: &str) -> Result<String, AgentError> {
    let trimmed = text.trim();

    if trimmed.starts_with('{') && serde_json::from_str::<serde_json::Value>(trimmed).is_ok() {
        return Ok(trimmed.to_string());
    }

    let candidates = [fenced_block(trimmed), first_balanced_object(trimmed)];
    for candidate in candidates.into_iter().flatten() {
        if serde_json::from_str::<serde_json::Value>(&candidate).is_ok() {
            return Ok(candidate);
        }
    }

    Err(AgentError::Parse(format!(
        "No valid JSON object found in response (length={})",
        text.len()
    )))
}

/// Body of the first ``` fenced block, with or without a `json` tag.
fn fenced_block(text: &str) -> Option<String> {
    let open = text.find("```")?;
    let after_fence = &text[open + 3..];
    let body_start = after_fence.find('\n')? + 1;
    let body = &after_fence[body_start..];
    let close = body.find("```")?;
    Some(body[..close].trim().to_string())
}

/// Find the first balanced { ... } in the text, ignoring braces in strings.
fn first_balanced_object(text: &str) -> Option<String> {
    let mut depth = 0usize;
    let mut start = None;
    let mut in_string = false;
    let mut escaped = false;

    for (i, ch) in text.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            '{' if !in_string => {
                if depth == 0 {
                    start = Some(i);
                }
                depth += 1;
            }
            '}' if !in_string && depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    return start.map(|s| text[s..=i].to_string());
                }
            }
            _ => {}
        }
    }
    None
}

#[derive(Debug, Deserialize)]
struct Verdict {
    decision: Option<String>,
}

/// Parse a judge verdict of the form `{"decision": "..."}` or
/// `{"decision": null}`. A blank decision counts as deferral.
pub fn parse_verdict(raw: &str) -> Result<Option<String>, AgentError> {
    let json_str = extract_json(raw)?;
    let verdict: Verdict = serde_json::from_str(&json_str)
        .map_err(|e| AgentError::Parse(format!("Failed to parse verdict: {e}\nJSON: {json_str}")))?;
    Ok(verdict
        .decision
        .map(|d| d.trim().to_string())
        .filter(|d| !d.is_empty()))
}

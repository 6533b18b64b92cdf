//! Parsing model output into a [`GenerateResult`].
//!
//! Models often wrap the requested JSON in markdown fences or chat around it,
//! so extraction looks for the first parseable JSON object.

use serde::Deserialize;

use crate::error::ProviderError;

use super::GenerateResult;

/// Envelope printed by `claude --output-format json`.
#[derive(Deserialize)]
struct CliEnvelope {
    result: String,
    #[serde(default)]
    is_error: bool,
}

#[derive(Deserialize)]
struct CommitJson {
    #[serde(alias = "subject")]
    title: String,
    #[serde(default)]
    body: Option<String>,
}

/// Parse CLI stdout into a title and optional body.
///
/// Accepts the CLI's JSON envelope or the bare model text.
pub fn parse_commit_response(stdout: &str) -> Result<GenerateResult, ProviderError> {
    let content = match serde_json::from_str::<CliEnvelope>(stdout.trim()) {
        Ok(envelope) if envelope.is_error => {
            return Err(ProviderError::InvalidOutput(format!(
                "model reported an error: {}",
                envelope.result
            )));
        }
        Ok(envelope) => envelope.result,
        Err(_) => stdout.to_string(),
    };

    let json = extract_json_object(&content).ok_or_else(|| {
        ProviderError::InvalidOutput(format!("no JSON object in response: {}", preview(&content)))
    })?;

    let parsed: CommitJson = serde_json::from_str(&json)
        .map_err(|e| ProviderError::InvalidOutput(format!("unexpected response shape: {e}")))?;

    Ok(GenerateResult {
        title: parsed.title.trim().to_string(),
        body: parsed
            .body
            .map(|b| b.trim().to_string())
            .filter(|b| !b.is_empty()),
        meta: None,
    })
}

/// Find the first JSON object in `text`, preferring a ```json fence.
pub fn extract_json_object(text: &str) -> Option<String> {
    let trimmed = text.trim();

    if let Some(start) = trimmed.find("```json")
        && let Some(end) = trimmed[start + 7..].find("```")
    {
        let inner = trimmed[start + 7..start + 7 + end].trim();
        if serde_json::from_str::<serde_json::Value>(inner).is_ok_and(|v| v.is_object()) {
            return Some(inner.to_string());
        }
    }

    for (idx, _) in trimmed.match_indices('{') {
        let Some(candidate) = balanced_object(&trimmed[idx..]) else {
            continue;
        };
        if serde_json::from_str::<serde_json::Value>(candidate).is_ok() {
            return Some(candidate.to_string());
        }
    }

    None
}

/// The prefix of `text` up to the brace closing its leading `{`, honoring
/// string literals and escapes.
fn balanced_object(text: &str) -> Option<&str> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escape_next = false;

    for (idx, ch) in text.char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }

        match ch {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(&text[..=idx]);
                }
            }
            _ => {}
        }
    }

    None
}

fn preview(text: &str) -> String {
    let mut end = text.len().min(120);
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text[..end].to_string()
}

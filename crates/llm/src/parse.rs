use serde::de::DeserializeOwned;

use crate::error::LlmError;

/// Parse a JSON payload out of model output, stripping markdown code
/// fences if present.
///
/// Models occasionally wrap JSON-mode output in ```` ```json ```` fences;
/// tolerate both fenced and bare forms.
pub fn parse_json_response<T: DeserializeOwned>(content: &str) -> Result<T, LlmError> {
    let trimmed = content.trim();

    let json_str = if trimmed.starts_with("```") {
        let without_opening = if let Some(rest) = trimmed.strip_prefix("```json") {
            rest
        } else {
            trimmed.strip_prefix("```").unwrap_or(trimmed)
        };
        without_opening
            .strip_suffix("```")
            .unwrap_or(without_opening)
            .trim()
    } else {
        trimmed
    };

    serde_json::from_str::<T>(json_str).map_err(|e| {
        LlmError::Parse(format!(
            "model output is not the expected JSON: {e}. Raw content: {content}"
        ))
    })
}

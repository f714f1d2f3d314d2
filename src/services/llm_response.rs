//! Helpers for turning raw model output into code or JSON.

/// Remove a surrounding markdown code fence, if present.
///
/// Handles both "```lang\n...\n```" and a bare fence with no language tag.
/// Text outside the first fenced block is discarded.
pub fn strip_code_fences(response: &str) -> String {
    let trimmed = response.trim();
    let Some(open) = trimmed.find("```") else {
        return trimmed.to_string();
    };

    let after_open = &trimmed[open + 3..];
    // Skip the info string (language tag) up to the end of the line.
    let body = match after_open.find('\n') {
        Some(nl) => &after_open[nl + 1..],
        None => after_open,
    };

    match body.rfind("```") {
        Some(close) => body[..close].trim_end().to_string(),
        None => body.trim_end().to_string(),
    }
}

/// Extract the outermost JSON object from a response.
pub fn extract_json(response: &str) -> String {
    let trimmed = strip_code_fences(response);

    if trimmed.starts_with('{') && trimmed.ends_with('}') {
        return trimmed;
    }

    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
        if end > start {
            return trimmed[start..=end].to_string();
        }
    }

    trimmed
}

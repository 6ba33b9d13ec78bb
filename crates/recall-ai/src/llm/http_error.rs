use reqwest::Response;

use crate::error::AiError;

/// Longest error body kept from a failed response.
pub const MAX_ERROR_BODY: usize = 512;

/// Cut an error body to [`MAX_ERROR_BODY`] bytes on a char boundary.
pub fn cap_body(body: String) -> String {
    if body.len() <= MAX_ERROR_BODY {
        return body;
    }
    let mut end = MAX_ERROR_BODY;
    while end > 0 && !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}... [truncated]", &body[..end])
}

pub async fn response_to_error(response: Response, provider: &str) -> AiError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();

    AiError::Http {
        provider: provider.to_string(),
        status,
        body: cap_body(body),
    }
}

/// Render an error code that may arrive as a number or a string.
pub fn code_to_string(code: &serde_json::Value) -> String {
    match code {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => "unknown".to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cap_body() {
        assert_eq!(cap_body("short".to_string()), "short");

        let long = "é".repeat(400);
        let capped = cap_body(long);
        assert!(capped.ends_with("... [truncated]"));
        assert!(capped.len() <= MAX_ERROR_BODY + "... [truncated]".len());
    }

    #[test]
    fn test_code_to_string() {
        assert_eq!(code_to_string(&serde_json::json!(429)), "429");
        assert_eq!(code_to_string(&serde_json::json!("rate_limited")), "rate_limited");
        assert_eq!(code_to_string(&serde_json::Value::Null), "unknown");
    }
}

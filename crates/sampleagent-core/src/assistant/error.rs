use thiserror::Error;

#[derive(Error, Debug)]
pub enum AssistantError {
    #[error("No assistant API key configured")]
    MissingApiKey,

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Unauthorized - API key may be invalid")]
    Unauthorized,

    #[error("Model not found: {0}")]
    NotFound(String),

    #[error("Rate limited - please wait before retrying")]
    RateLimited,

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl AssistantError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            let mut end = MAX_ERROR_BODY_LENGTH;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
        }
    }

    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let truncated = Self::truncate_body(body);
        match status.as_u16() {
            // The generative language API reports a bad key as 400
            400 if body.contains("API_KEY_INVALID") => AssistantError::Unauthorized,
            401 => AssistantError::Unauthorized,
            403 => AssistantError::AccessDenied(truncated),
            404 => AssistantError::NotFound(truncated),
            429 => AssistantError::RateLimited,
            500..=599 => AssistantError::ServerError(truncated),
            _ => AssistantError::InvalidResponse(format!("Status {}: {}", status, truncated)),
        }
    }
}

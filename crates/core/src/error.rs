//! Error types for the CPM agent domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum, wrapped by [`Error`].

use thiserror::Error;

/// The top-level error type for agent operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Generation errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Prompt errors ---
    #[error("Prompt error: {0}")]
    Prompt(#[from] PromptError),

    // --- Tool errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl Error {
    /// A message that is safe to hand to an HTTP client.
    ///
    /// Backend failures can carry upstream response bodies, URLs or local
    /// paths, so only their category is exposed.
    pub fn redacted_message(&self) -> String {
        match self {
            Error::Provider(ProviderError::Timeout(_)) => "text generation timed out".into(),
            Error::Provider(_) => "text generation failed".into(),
            Error::Prompt(e) => format!("prompt rendering failed: {e}"),
            Error::Tool(ToolError::NotFound(name)) => format!("unknown tool: {name}"),
            Error::Tool(_) => "tool execution failed".into(),
            Error::Config { .. } => "agent is misconfigured".into(),
        }
    }
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError {
        status_code: u16,
        message: String,
    },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Local inference failed: {0}")]
    Inference(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PromptError {
    #[error("Prompt '{0}' not found")]
    TemplateMissing(String),

    #[error("Prompt '{template}' requires variable '{variable}'")]
    MissingVariable { template: String, variable: String },

    #[error("Prompt '{template}' is malformed at byte {offset}")]
    Malformed { template: String, offset: usize },

    #[error("Failed to load prompts from {path}: {reason}")]
    Load { path: String, reason: String },
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Tool execution failed: {tool_name}: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Tool timed out: {tool_name} after {timeout_secs}s")]
    Timeout { tool_name: String, timeout_secs: u64 },

    #[error("Permission denied: {tool_name}: {reason}")]
    PermissionDenied { tool_name: String, reason: String },

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_error_displays_correctly() {
        let err = Error::Provider(ProviderError::ApiError {
            status_code: 503,
            message: "backend overloaded".into(),
        });
        assert!(err.to_string().contains("503"));
        assert!(err.to_string().contains("backend overloaded"));
    }

    #[test]
    fn tool_error_displays_correctly() {
        let err = Error::Tool(ToolError::PermissionDenied {
            tool_name: "file_read".into(),
            reason: "outside allowed roots".into(),
        });
        assert!(err.to_string().contains("file_read"));
        assert!(err.to_string().contains("allowed roots"));
    }

    #[test]
    fn prompt_error_names_the_template() {
        let err = Error::from(PromptError::TemplateMissing("planning".into()));
        assert_eq!(err.to_string(), "Prompt error: Prompt 'planning' not found");
    }

    #[test]
    fn redaction_hides_backend_details() {
        let err = Error::Provider(ProviderError::ApiError {
            status_code: 500,
            message: "secret upstream body at http://10.0.0.3".into(),
        });
        let public = err.redacted_message();
        assert_eq!(public, "text generation failed");
        assert!(!public.contains("10.0.0.3"));
    }

    #[test]
    fn redaction_keeps_prompt_details() {
        let err = Error::from(PromptError::MissingVariable {
            template: "execution".into(),
            variable: "step".into(),
        });
        assert!(err.redacted_message().contains("step"));
    }
}

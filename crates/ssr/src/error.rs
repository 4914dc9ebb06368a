//! Prerender errors including I/O operations.

use prerender_ssr_core::SsrCoreError;
use thiserror::Error;

/// Prerender errors including I/O operations.
#[derive(Error, Debug)]
pub enum SsrError {
    #[error("Core error: {0}")]
    Core(#[from] SsrCoreError),

    #[error("Failed to load document template from {path}: {reason}")]
    TemplateLoad { path: String, reason: String },

    #[error("Failed to create render context: {0}")]
    ContextCreation(String),

    #[error("JavaScript execution error: {0}")]
    JsExecution(String),

    #[error("Render context closed")]
    ContextClosed,

    #[error("Render context did not answer within {0}ms")]
    CommandTimeout(u64),

    #[error("Resource queue closed")]
    QueueClosed,

    #[error("Timed out acquiring a render context after {0}ms")]
    AcquireTimeout(u64),

    #[error("Render pool is shut down")]
    PoolShutdown,

    #[error("No render contexts could be created")]
    NoContexts,
}

pub type Result<T> = std::result::Result<T, SsrError>;

/// Sanitize error messages for client-facing responses.
///
/// Hides internal details while providing useful feedback.
pub fn sanitize_error(error: &SsrError) -> String {
    match error {
        // Safe to expose
        SsrError::AcquireTimeout(ms) => format!("Render capacity exhausted after {ms}ms"),
        SsrError::PoolShutdown => "Service shutting down".to_string(),
        SsrError::ContextClosed | SsrError::QueueClosed | SsrError::NoContexts => {
            "Service temporarily unavailable".to_string()
        }
        // Hide internal details
        SsrError::TemplateLoad { .. } | SsrError::ContextCreation(_) => {
            "Internal configuration error".to_string()
        }
        SsrError::JsExecution(_) | SsrError::CommandTimeout(_) => "Render failed".to_string(),
        SsrError::Core(_) => "Invalid request".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_hides_internal_details() {
        let error = SsrError::JsExecution("ReferenceError: secretToken is not defined".into());
        assert_eq!(sanitize_error(&error), "Render failed");
        assert_eq!(sanitize_error(&SsrError::CommandTimeout(500)), "Render failed");

        let error = SsrError::TemplateLoad {
            path: "/srv/dist/index.html".into(),
            reason: "permission denied".into(),
        };
        assert!(!sanitize_error(&error).contains("/srv"));
    }

    #[test]
    fn test_sanitize_exposes_timeouts() {
        assert_eq!(
            sanitize_error(&SsrError::AcquireTimeout(250)),
            "Render capacity exhausted after 250ms"
        );
    }

    #[test]
    fn test_core_error_converts() {
        let error: SsrError = SsrCoreError::InvalidMaxUses.into();
        assert!(matches!(error, SsrError::Core(SsrCoreError::InvalidMaxUses)));
    }
}

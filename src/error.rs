use thiserror::Error;

/// Errors surfaced at the edges of the finder: configuration, registry
/// loading and runtime plumbing. Filtering itself never fails; a superseded
/// run ends as `FilterOutcome::Cancelled`, not as an error.
#[derive(Debug, Error)]
pub enum OpFinderError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Registry error: {0}")]
    Registry(String),

    #[error("Invalid pattern `{pattern}`: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("No tokio runtime available to run filter tasks")]
    NoRuntime,

    #[error("Filter event channel closed")]
    ChannelClosed,

    #[error("Background task failed: {0}")]
    TaskFailed(#[from] tokio::task::JoinError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::ser::Error),
}

pub type Result<T> = std::result::Result<T, OpFinderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_error_message() {
        let err = OpFinderError::Registry("no source configured".to_string());
        assert_eq!(err.to_string(), "Registry error: no source configured");
    }

    #[test]
    fn test_invalid_pattern_keeps_source() {
        let source = regex::Regex::new("(unclosed").unwrap_err();
        let err = OpFinderError::InvalidPattern {
            pattern: "(unclosed".to_string(),
            source,
        };
        assert!(err.to_string().contains("(unclosed"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[tokio::test]
    async fn test_join_error_converts_to_task_failed() {
        let join_error = tokio::task::spawn_blocking(|| panic!("index build panicked"))
            .await
            .unwrap_err();
        let err = OpFinderError::from(join_error);
        assert!(matches!(err, OpFinderError::TaskFailed(_)));
        assert!(err.to_string().starts_with("Background task failed"));
    }
}

//! Error types for the legacy provider adapter.
//!
//! User-facing problems (bad configuration, failed upgrades, legacy
//! validation messages) travel as [`Diagnostic`](crate::schema::Diagnostic)s.
//! A [`ProviderError`] returned as `Err` from the [`Provider`](crate::Provider)
//! facade means the request itself was inconsistent, such as naming a resource
//! type the provider never declared.

use thiserror::Error;

use crate::value::ConvertError;

/// Errors that can occur while adapting a legacy provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The legacy provider declared a structurally invalid schema.
    #[error("Schema error: {0}")]
    Schema(String),

    /// Persisted state could not be upgraded to the current schema.
    #[error("Upgrade error: {0}")]
    Upgrade(String),

    /// A value could not be converted to the type its schema requires.
    #[error("Conversion error: {0}")]
    Conversion(#[from] ConvertError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The requested resource or data source type is unknown.
    #[error("Unknown resource type: {0}")]
    UnknownResource(String),

    /// The wrapped legacy provider reported a failure.
    #[error("Provider error: {0}")]
    Legacy(String),

    /// Invalid request from the orchestration engine.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl ProviderError {
    /// Get the error message as a string.
    ///
    /// Returns a reference to the error message for any variant.
    pub fn message(&self) -> &str {
        match self {
            Self::Schema(msg) => msg,
            Self::Upgrade(msg) => msg,
            Self::Conversion(err) => &err.message,
            Self::Serialization(_err) => "serialization error (see Debug output)",
            Self::UnknownResource(msg) => msg,
            Self::Legacy(msg) => msg,
            Self::InvalidRequest(msg) => msg,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ProviderError::UnknownResource("custom_resource".to_string());
        assert_eq!(format!("{}", err), "Unknown resource type: custom_resource");

        let err = ProviderError::Upgrade("bad flatmap".to_string());
        assert_eq!(format!("{}", err), "Upgrade error: bad flatmap");

        let err = ProviderError::Schema("list without element".to_string());
        assert_eq!(format!("{}", err), "Schema error: list without element");
    }

    #[test]
    fn test_conversion_from_convert_error() {
        let err: ProviderError = ConvertError::new("tags.0", "string required, got bool").into();
        assert_eq!(
            format!("{}", err),
            "Conversion error: tags.0: string required, got bool"
        );
        assert_eq!(err.message(), "string required, got bool");
    }

    #[test]
    fn test_serialization_from_json_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: ProviderError = json_err.into();
        assert!(matches!(err, ProviderError::Serialization(_)));
        assert!(format!("{}", err).starts_with("Serialization error:"));
    }

    #[test]
    fn test_message_method() {
        let err = ProviderError::Legacy("refresh failed".to_string());
        assert_eq!(err.message(), "refresh failed");

        let err = ProviderError::InvalidRequest("bad request".to_string());
        assert_eq!(err.message(), "bad request");
    }
}

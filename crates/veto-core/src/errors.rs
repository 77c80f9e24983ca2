//! Core error types.

use thiserror::Error;

/// Errors raised by the session model.
///
/// The store itself never fails; these only surface when a caller asks for a
/// typed view of a stored document.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A stored session document does not match the `Session` shape.
    #[error("session document does not match the session shape: {0}")]
    Decode(#[from] serde_json::Error),
    /// An acting side outside `{-1, 0, 1}`.
    #[error("invalid acting side: {0}")]
    InvalidSide(i64),
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_error_display() {
        let json_err = serde_json::from_str::<serde_json::Value>("{bad}").unwrap_err();
        let err = CoreError::Decode(json_err);
        assert!(err.to_string().contains("session shape"));
    }

    #[test]
    fn invalid_side_display() {
        let err = CoreError::InvalidSide(7);
        assert_eq!(err.to_string(), "invalid acting side: 7");
    }

    #[test]
    fn json_error_from_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("nope").unwrap_err();
        let err: CoreError = json_err.into();
        assert!(matches!(err, CoreError::Decode(_)));
    }
}

//! Error types for the Muster engine.

use thiserror::Error;

/// All possible errors from the Muster engine.
///
/// Operations that can fail at run time also emit an `Error` event on the
/// owning instance's bus, so observers that never inspect the `Result`
/// still see the anomaly.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    // Construction errors
    #[error("record key attribute '{0}' is missing or empty")]
    MissingKey(String),

    // Mutation errors
    #[error("set called with an empty patch")]
    EmptyPatch,

    #[error("snapshot item at index {index} is not an object (got {got})")]
    InvalidItem { index: usize, got: &'static str },

    #[error("record already exists: {0}")]
    DuplicateKey(String),

    #[error("record not found: {0}")]
    RecordNotFound(String),

    // Serialization errors
    #[error("serialization failed: {0}")]
    Serialize(String),
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = Error::MissingKey("id".into());
        assert_eq!(
            err.to_string(),
            "record key attribute 'id' is missing or empty"
        );

        let err = Error::InvalidItem {
            index: 2,
            got: "String",
        };
        assert_eq!(
            err.to_string(),
            "snapshot item at index 2 is not an object (got String)"
        );

        let err = Error::RecordNotFound("42".into());
        assert_eq!(err.to_string(), "record not found: 42");
    }
}

//! crates/mdpdf_core/src/error.rs
//!
//! The error taxonomy shared by every storage operation.
//!
//! Variants carrying attacker-controlled input (`PathTraversal`, `UnsafeMember`)
//! deliberately hold no payload so the raw path never reaches a log line.

/// Errors raised by session storage, path confinement and archive handling.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The session identifier is not a canonical v4 token.
    #[error("Invalid session token")]
    InvalidToken,

    /// The workspace (or a file inside it) does not exist.
    #[error("Session not found")]
    NotFound,

    /// A derived path resolved outside its sandbox.
    #[error("Path traversal attempt")]
    PathTraversal,

    /// The uploaded bytes are not a readable ZIP container.
    #[error("Invalid ZIP archive: {0}")]
    InvalidArchive(String),

    /// The archive is readable but its structure is wrong.
    #[error("Malformed archive: {0}")]
    MalformedArchive(String),

    /// An archive member name could escape the extraction directory.
    #[error("Unsafe path in ZIP")]
    UnsafeMember,

    /// Two image members share the same basename.
    #[error("Duplicate image filename in ZIP: {0}")]
    DuplicateMember(String),

    /// An upload exceeded its configured byte ceiling.
    #[error("Upload exceeds the limit of {limit} bytes")]
    TooLarge { limit: u64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The workspace metadata record could not be (de)serialized.
    #[error("Metadata error: {0}")]
    Metadata(#[from] serde_json::Error),
}

impl StorageError {
    /// Collapses `InvalidToken` into `NotFound`.
    ///
    /// Callers holding a capability token must not be able to tell a forged
    /// token apart from an expired session.
    pub fn for_caller(self) -> Self {
        match self {
            StorageError::InvalidToken => StorageError::NotFound,
            other => other,
        }
    }
}

/// A convenience type alias for `Result<T, StorageError>`.
pub type StorageResult<T> = Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_token_is_reported_as_not_found() {
        assert!(matches!(
            StorageError::InvalidToken.for_caller(),
            StorageError::NotFound
        ));
        assert!(matches!(
            StorageError::UnsafeMember.for_caller(),
            StorageError::UnsafeMember
        ));
    }

    #[test]
    fn traversal_message_does_not_echo_input() {
        assert_eq!(StorageError::PathTraversal.to_string(), "Path traversal attempt");
    }
}

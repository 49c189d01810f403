/// Error types for scoreset operations.
///
/// This module provides the error hierarchy covering all failure modes in
/// the engine. All errors are well-typed and can be pattern-matched for
/// precise handling; policy (fatal vs. log-and-continue) is decided at the
/// call sites, not here.
use thiserror::Error;

/// The main error type for scoreset operations.
///
/// All fallible operations in scoreset return `Result<T, ScoringError>`.
#[derive(Error, Debug)]
pub enum ScoringError {
    /// A root set was registered with an id that is already taken.
    /// Registration is the one fatal error in the engine: the caller must
    /// fix the id collision.
    #[error("a set with id '{id}' is already registered")]
    DuplicateSetId {
        /// The colliding set id
        id: String,
    },

    /// A set id was looked up in the registry and not found.
    #[error("no registered set with id '{id}'")]
    SetNotFound {
        /// The id that was looked up
        id: String,
    },

    /// A content model was added to the tree under an id already in use.
    #[error("a content model with id '{id}' already exists")]
    DuplicateModelId {
        /// The colliding model id
        id: String,
    },

    /// A query string could not be parsed.
    #[error("malformed query '{query}': {reason}")]
    MalformedQuery {
        /// The offending query text
        query: String,
        /// Why it failed to parse
        reason: String,
    },

    /// A per-set state value had a shape outside the permitted set
    /// (arrays of booleans, arrays of numbers, or arrays of such arrays).
    #[error("invalid state shape for '{name}/{id}': {reason}")]
    InvalidStateShape {
        /// State namespace
        name: String,
        /// Set id within the namespace
        id: String,
        /// Description of the shape violation
        reason: String,
    },

    /// Serialization error when converting state or objective data.
    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// A content model referenced by id does not exist in the tree.
    #[error("no content model with id '{id}'")]
    ModelNotFound {
        /// The model id that was looked up
        id: String,
    },

    /// A lifecycle callback failed. The renderer logs these and continues
    /// with the next set in the batch.
    #[error("lifecycle callback '{phase}' failed for set '{set_id}': {reason}")]
    CallbackFailed {
        /// The phase being drained
        phase: String,
        /// The set whose callback failed
        set_id: String,
        /// Failure description
        reason: String,
    },
}

/// Result type alias for scoreset operations.
pub type ScoringResult<T> = Result<T, ScoringError>;

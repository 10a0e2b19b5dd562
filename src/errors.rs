//! Error types for the wit version-control engine.
//!
//! This module defines a unified error enumeration used across object parsing,
//! pack encoding/decoding, reference management, working-tree materialization, and
//! transport. It integrates with `thiserror` to provide rich `Display` implementations
//! and error source chaining where applicable.
//!
//! Leaf components produce the narrowest variant available; the repository façade
//! re-raises verbatim except where a composite operation partially succeeds, in which
//! case `PartialTransfer` reports how far the operation got before failing.

use thiserror::Error;

use crate::hash::ObjectHash;

#[derive(Error, Debug)]
/// Unified error enumeration for the wit engine.
pub enum GitError {
    /// Invalid or unsupported git object type name.
    #[error("The `{0}` is not a valid git object type.")]
    InvalidObjectType(String),

    /// Malformed or unsupported blob object encoding.
    #[error("The `{0}` is not a valid git blob object.")]
    InvalidBlobObject(String),

    /// Malformed tree object.
    #[error("Not a valid git tree object: {0}")]
    InvalidTreeObject(String),

    /// Invalid tree entry (mode/name/hash).
    #[error("The `{0}` is not a valid git tree item.")]
    InvalidTreeItem(String),

    /// Invalid commit signature (author/committer) line.
    #[error("The `{0}` is not a valid git commit signature.")]
    InvalidSignatureType(String),

    /// Malformed commit object.
    #[error("Invalid commit object: {0}")]
    InvalidCommit(String),

    /// Malformed tag object.
    #[error("Not a valid git tag object: {0}")]
    InvalidTagObject(String),

    /// Malformed or unsupported pack file.
    #[error("The `{0}` is not a valid pack file.")]
    InvalidPackFile(String),

    /// Invalid pack header magic or version.
    #[error("The `{0}` is not a valid pack header.")]
    InvalidPackHeader(String),

    /// Delta base object referenced by a pack entry was never decoded.
    #[error("Delta base missing for object {0}")]
    DeltaBaseMissing(String),

    /// Delta instruction stream is malformed.
    #[error("Delta object error: {0}")]
    DeltaObjectError(String),

    /// Pack trailer checksum does not match the recomputed hash.
    #[error("Pack trailer checksum mismatch")]
    TrailerMismatch,

    /// Malformed or unsupported `.idx` file.
    #[error("The `{0}` is not a valid idx file.")]
    InvalidIdxFile(String),

    /// Invalid CLI or function argument.
    #[error("Argument parse failed: {0}")]
    InvalidArgument(String),

    /// I/O error from underlying reader or writer.
    #[error("IO error: {0}")]
    IOError(#[from] std::io::Error),

    /// Invalid hash formatting or value.
    #[error("The `{0}` is not a valid hash value")]
    InvalidHashValue(String),

    /// Object missing from store or pack cache.
    #[error("Object not found: {0}")]
    ObjectNotFound(String),

    /// Typed read expected one object kind and found another.
    #[error("Type mismatch: expected {expected}, found {actual}")]
    TypeMismatch { expected: String, actual: String },

    /// Repository not found at the given path.
    #[error("Repository not found at `{0}`")]
    RepoNotFound(String),

    /// Repository already exists at the given path.
    #[error("Repository already exists at `{0}`")]
    RepoAlreadyExists(String),

    /// Reference not found.
    #[error("Reference not found: {0}")]
    RefNotFound(String),

    /// Reference (branch or tag) already exists.
    #[error("Reference already exists: {0}")]
    RefAlreadyExists(String),

    /// Branch/tag name failed validation; `suggestion` is a sanitized candidate.
    #[error("Invalid reference name `{name}`{}", suggestion.as_ref().map(|s| format!(" (did you mean `{s}`?)")).unwrap_or_default())]
    InvalidRefName {
        name: String,
        suggestion: Option<String>,
    },

    /// A `<refname>.lock` sibling already exists; the ref is held by another writer.
    #[error("Reference `{0}` is locked by another writer")]
    RefBusy(String),

    /// The index file is locked by another writer.
    #[error("Index is locked by another writer")]
    IndexBusy,

    /// Three-way merge produced conflicting hunks; materialized with conflict markers.
    #[error("Merge conflict in: {}", .paths.join(", "))]
    MergeConflict { paths: Vec<String> },

    /// Repository was initialized with an algorithm the running binary cannot use.
    #[error("Unsupported hash algorithm `{0}`")]
    UnsupportedHashAlgorithm(String),

    /// Checkout/reset would discard uncommitted changes in these paths.
    #[error("Checkout would overwrite uncommitted changes in: {}", .paths.join(", "))]
    ClobberWorkingTree { paths: Vec<String> },

    /// Path escapes the repository root (absolute, `..`-traversing, or NUL-containing).
    #[error("Invalid path `{0}`")]
    InvalidPath(String),

    /// Virtual-tree write collided with an existing entry of the other kind.
    #[error("Path `{0}` is a {1} and cannot be replaced by a {2} without removing it first")]
    PathKindConflict(String, &'static str, &'static str),

    /// A composite operation (e.g. receive-pack) partially applied before failing.
    #[error("{operation} failed after applying {applied} side effect(s): {cause}")]
    PartialTransfer {
        operation: String,
        applied: usize,
        cause: String,
    },

    /// Generic custom error for miscellaneous failures.
    #[error("{0}")]
    CustomError(String),

    /// A value could not be converted between two internal representations.
    #[error("Conversion error: {0}")]
    ConversionError(String),
}

impl GitError {
    pub fn object_not_found(hash: ObjectHash) -> Self {
        GitError::ObjectNotFound(hash.to_string())
    }

    pub fn type_mismatch(expected: &str, actual: &str) -> Self {
        GitError::TypeMismatch {
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }
}

//! Error types for group actor operations.

use atrarium_types::{GroupId, GroupStage};
use thiserror::Error;

/// Broad classification of a [`GroupError`], used by callers that need to
/// map errors onto a transport (HTTP status codes, retry policy).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed input; rejected before any state change.
    Validation,
    /// The caller lacks a named capability.
    Permission,
    /// The operation is well-formed but conflicts with current state.
    Conflict,
    /// The referenced group, post, or target does not exist.
    NotFound,
    /// Infrastructure failure (database, pool, serialization).
    Internal,
}

/// Errors returned by the group actor RPC surface.
///
/// Every variant that a human may need to act on carries enough payload to
/// explain itself: threshold rejections include the current and required
/// counts, deletion blocking enumerates the children by name.
#[derive(Debug, Error)]
pub enum GroupError {
    /// Malformed id, URI, enum value, or out-of-range pagination limit.
    #[error("validation error: {0}")]
    Validation(String),

    /// The feed cursor failed to decode. Distinct from an exhausted page,
    /// which is signalled by an omitted cursor, not an error.
    #[error("invalid feed cursor: {0}")]
    InvalidCursor(String),

    /// The caller lacks the named capability.
    #[error("permission denied: requires {capability}")]
    Permission { capability: String },

    /// A stage transition was requested below its membership threshold.
    #[error(
        "cannot progress {current_stage} -> {requested_stage}: \
         {member_count} active members, {required} required"
    )]
    ThresholdNotMet {
        current_stage: GroupStage,
        requested_stage: GroupStage,
        member_count: usize,
        required: usize,
    },

    /// A structurally invalid transition (skip, same-stage, or downgrade).
    #[error("invalid stage transition: {from} -> {to}")]
    InvalidStageTransition { from: GroupStage, to: GroupStage },

    /// Deletion blocked while child groups remain.
    #[error("group has {count} active child group(s): {}", names.join(", "))]
    ChildrenExist { count: usize, names: Vec<String> },

    /// Child creation requested on a group that has not graduated.
    #[error("group is at stage '{stage}'; only graduated groups may create children")]
    NotGraduated { stage: GroupStage },

    /// Child creation requested on a group that is itself a child.
    #[error("group {group_id} is itself a child; hierarchy depth is limited to one level")]
    NestedHierarchy { group_id: GroupId },

    /// A child with this id already exists.
    #[error("child group {child_id} already exists")]
    DuplicateChild { child_id: GroupId },

    /// An attempt to rewrite an already-set parent reference.
    #[error("parent group reference is immutable once set")]
    ParentImmutable,

    /// The referenced group, post, or moderation target does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A database operation failed.
    #[error("group database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Fetching a pooled connection failed.
    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// JSON serialization or deserialization failed.
    #[error("group serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl GroupError {
    /// Classifies this error for transport mapping.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) | Self::InvalidCursor(_) => ErrorKind::Validation,
            Self::Permission { .. } => ErrorKind::Permission,
            Self::ThresholdNotMet { .. }
            | Self::InvalidStageTransition { .. }
            | Self::ChildrenExist { .. }
            | Self::NotGraduated { .. }
            | Self::NestedHierarchy { .. }
            | Self::DuplicateChild { .. }
            | Self::ParentImmutable => ErrorKind::Conflict,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Database(_) | Self::Pool(_) | Self::Json(_) => ErrorKind::Internal,
        }
    }

    /// Shorthand for a permission error naming the missing capability.
    pub fn permission(capability: impl Into<String>) -> Self {
        Self::Permission {
            capability: capability.into(),
        }
    }
}

// crates/formvault-core/src/core/error.rs
// ============================================================================
// Module: Formvault Core Errors
// Description: The caller-facing error taxonomy for engine operations.
// Purpose: Classify every failure into a stable, field-addressed category.
// Dependencies: thiserror
// ============================================================================

//! ## Overview
//! Every control-plane operation fails with exactly one of four categories:
//! missing target, denied action, rejected input, or storage failure.
//! Errors name the offending field where one applies. Storage internals are
//! truncated to a bounded fragment before inclusion so backend details never
//! leak wholesale into caller-facing messages.

// ============================================================================
// SECTION: Imports
// ============================================================================

use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum length of storage detail carried in caller-facing errors.
pub const STORAGE_DETAIL_LIMIT: usize = 160;

// ============================================================================
// SECTION: Core Errors
// ============================================================================

/// Caller-facing engine error taxonomy.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
/// - `Storage` messages are truncated to [`STORAGE_DETAIL_LIMIT`] bytes.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoreError {
    /// The addressed entity does not exist.
    #[error("{field}: {message}")]
    NotFound {
        /// Field or entity the lookup addressed.
        field: String,
        /// Human-readable detail.
        message: String,
    },
    /// The caller is not allowed to perform the action.
    #[error("{field}: {message}")]
    Forbidden {
        /// Field or entity the action addressed.
        field: String,
        /// Human-readable detail.
        message: String,
    },
    /// The request payload is invalid.
    #[error("{field}: {message}")]
    Validation {
        /// Field the rejection addresses.
        field: String,
        /// Human-readable detail.
        message: String,
    },
    /// A storage backend failed; detail is truncated.
    #[error("storage failure: {message}")]
    Storage {
        /// Truncated backend detail.
        message: String,
    },
}

impl CoreError {
    /// Creates a not-found error for a field.
    #[must_use]
    pub fn not_found(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::NotFound { field: field.into(), message: message.into() }
    }

    /// Creates a forbidden error for a field.
    #[must_use]
    pub fn forbidden(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Forbidden { field: field.into(), message: message.into() }
    }

    /// Creates a validation error for a field.
    #[must_use]
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation { field: field.into(), message: message.into() }
    }

    /// Creates a storage error with truncated detail.
    #[must_use]
    pub fn storage(detail: impl Into<String>) -> Self {
        Self::Storage { message: truncate_detail(&detail.into()) }
    }
}

// ============================================================================
// SECTION: Message Catalog
// ============================================================================

/// Shared caller-facing messages used across operations.
pub mod messages {
    /// No revision exists under the requested name.
    pub const SUBMISSION_NOT_FOUND: &str = "submission not found";
    /// The requested revision number does not exist.
    pub const REVISION_NOT_FOUND: &str = "revision not found";
    /// Another principal holds the edit lock.
    pub const CHECKED_OUT_BY_OTHER: &str = "submission is checked out by another user";
    /// The revision must be checked out before editing.
    pub const NOT_CHECKED_OUT: &str = "submission is not checked out";
    /// Revision 1 is protected from partial deletion.
    pub const FIRST_REVISION_PROTECTED: &str = "the first revision cannot be deleted";
    /// No active revision exists to roll back from.
    pub const NO_ACTIVE_REVISION: &str = "submission has no active revision";
    /// No earlier revision exists to roll back to.
    pub const NO_ROLLBACK_TARGET: &str = "no earlier revision to roll back to";
    /// The latest revision is not a draft.
    pub const NOT_A_DRAFT: &str = "the latest revision is not a draft";
    /// The caller lacks permission for the operation.
    pub const ACCESS_DENIED: &str = "access denied";
}

// ============================================================================
// SECTION: Detail Truncation
// ============================================================================

/// Truncates backend detail to [`STORAGE_DETAIL_LIMIT`] on a char boundary.
fn truncate_detail(detail: &str) -> String {
    if detail.len() <= STORAGE_DETAIL_LIMIT {
        return detail.to_owned();
    }
    let mut end = STORAGE_DETAIL_LIMIT;
    while !detail.is_char_boundary(end) {
        end -= 1;
    }
    detail[..end].to_owned()
}

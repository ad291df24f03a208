// crates/formvault-core/src/core/time.rs
// ============================================================================
// Module: Formvault Time Model
// Description: Canonical timestamp representations for revisions and restatements.
// Purpose: Provide deterministic, replayable time values across Formvault records.
// Dependencies: serde, thiserror
// ============================================================================

//! ## Overview
//! Formvault uses explicit time values embedded in requests and records to keep
//! behavior deterministic. The core engine never reads wall-clock time
//! directly; hosts must supply timestamps through the request context.
//! Timestamps carry a compact `kind:value` text form used by stores that
//! persist them in single text columns.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Time Values
// ============================================================================

/// Canonical timestamp used in Formvault records.
///
/// # Invariants
/// - Values are explicitly provided by callers; the core never reads wall-clock time.
/// - No validation is performed; monotonicity is a caller responsibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Timestamp {
    /// Unix epoch milliseconds.
    UnixMillis(i64),
    /// Monotonic logical time value.
    Logical(u64),
}

impl Timestamp {
    /// Returns the timestamp as unix milliseconds when available.
    #[must_use]
    pub const fn as_unix_millis(&self) -> Option<i64> {
        match self {
            Self::UnixMillis(value) => Some(*value),
            Self::Logical(_) => None,
        }
    }

    /// Returns the timestamp as logical time when available.
    #[must_use]
    pub const fn as_logical(&self) -> Option<u64> {
        match self {
            Self::UnixMillis(_) => None,
            Self::Logical(value) => Some(*value),
        }
    }
}

// ============================================================================
// SECTION: Stored Text Form
// ============================================================================

/// Error produced when a stored timestamp string fails to parse.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimestampParseError {
    /// The prefix before `:` does not name a timestamp kind.
    #[error("unknown timestamp kind in: {0}")]
    UnknownKind(String),
    /// The value after the prefix is not a number of the kind's range.
    #[error("invalid timestamp value: {0}")]
    InvalidValue(String),
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnixMillis(value) => write!(f, "unix_millis:{value}"),
            Self::Logical(value) => write!(f, "logical:{value}"),
        }
    }
}

impl FromStr for Timestamp {
    type Err = TimestampParseError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let Some((kind, value)) = text.split_once(':') else {
            return Err(TimestampParseError::UnknownKind(text.to_owned()));
        };
        match kind {
            "unix_millis" => value
                .parse::<i64>()
                .map(Self::UnixMillis)
                .map_err(|_| TimestampParseError::InvalidValue(value.to_owned())),
            "logical" => value
                .parse::<u64>()
                .map(Self::Logical)
                .map_err(|_| TimestampParseError::InvalidValue(value.to_owned())),
            _ => Err(TimestampParseError::UnknownKind(kind.to_owned())),
        }
    }
}

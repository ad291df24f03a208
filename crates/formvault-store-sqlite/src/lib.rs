// crates/formvault-store-sqlite/src/lib.rs
// ============================================================================
// Module: Formvault SQLite Store Library
// Description: Durable SQLite-backed submission store.
// Purpose: Persist revisions, form rows, restatements, and aggregates.
// Dependencies: formvault-core, rusqlite, serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! SQLite-backed implementation of the Formvault [`SubmissionStore`]
//! contract. Fixed tables hold revision records, restatements, and
//! hash-verified aggregate snapshots; one dynamic table per schema-registry
//! table holds the raw form rows. Every composite operation runs inside a
//! single immediate transaction.
//!
//! [`SubmissionStore`]: formvault_core::SubmissionStore

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use crate::store::SCHEMA_VERSION;
pub use crate::store::SqliteJournalMode;
pub use crate::store::SqliteStoreConfig;
pub use crate::store::SqliteStoreError;
pub use crate::store::SqliteSubmissionStore;
pub use crate::store::SqliteSyncMode;

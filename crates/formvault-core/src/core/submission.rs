// crates/formvault-core/src/core/submission.rs
// ============================================================================
// Module: Formvault Submission Records
// Description: Revision, form row, restatement, and aggregate record types.
// Purpose: Define the canonical persisted shapes shared by all store backends.
// Dependencies: crate::core::identifiers, crate::core::path, crate::core::time, serde
// ============================================================================

//! ## Overview
//! These records are the persisted vocabulary of the engine: submission
//! revision rows, the raw dynamic-table rows behind them, restatements
//! accumulated across a lineage, the materialized aggregate snapshot, and the
//! patch shape callers submit when editing. Stores persist these types
//! without reinterpreting them.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::core::identifiers::OrgId;
use crate::core::identifiers::PrincipalId;
use crate::core::identifiers::RowId;
use crate::core::identifiers::SubmissionId;
use crate::core::identifiers::SubmissionName;
use crate::core::identifiers::TableViewId;
use crate::core::path::AttributePath;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Submission Records
// ============================================================================

/// Publication status of a submission revision.
///
/// # Invariants
/// - Transitions are one-way: `Draft` -> `Published`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStatus {
    /// Work in progress; may be overwritten in place.
    Draft,
    /// Finalized; further edits create a new revision.
    Published,
}

/// Edit-lock state held on one revision.
///
/// # Invariants
/// - At most one revision per lineage carries a checkout at any time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkout {
    /// Principal holding the lock.
    pub principal: PrincipalId,
    /// Time the lock was taken.
    pub at: Timestamp,
}

/// One revision row of a submission lineage.
///
/// # Invariants
/// - Revision numbers within a lineage are contiguous starting at 1.
/// - At most one revision per lineage is active.
/// - `status` is `None` only for legacy rows predating statuses; such rows
///   behave as published for the draft-overwrite decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionRecord {
    /// Revision row identifier.
    pub id: SubmissionId,
    /// Lineage name shared by every revision.
    pub name: SubmissionName,
    /// 1-based revision number within the lineage.
    pub revision: u32,
    /// Table view the lineage was created against.
    pub table_view_id: TableViewId,
    /// Whether this revision is the lineage's active one.
    pub active: bool,
    /// Edit-lock state, if held.
    pub checkout: Option<Checkout>,
    /// Publication status.
    pub status: Option<SubmissionStatus>,
    /// Free-form provenance label for the revision's data.
    pub data_source: Option<String>,
    /// Organization owning the lineage.
    pub org_id: OrgId,
    /// Principal that created this revision.
    pub submitted_by: PrincipalId,
    /// Creation time of this revision.
    pub created_at: Timestamp,
}

impl SubmissionRecord {
    /// Returns true when the revision behaves as a draft.
    #[must_use]
    pub fn is_draft(&self) -> bool {
        self.status == Some(SubmissionStatus::Draft)
    }

    /// Returns the checkout holder, if the revision is checked out.
    #[must_use]
    pub fn checkout_holder(&self) -> Option<PrincipalId> {
        self.checkout.map(|checkout| checkout.principal)
    }
}

// ============================================================================
// SECTION: Form Rows
// ============================================================================

/// One raw dynamic-table row belonging to a submission revision.
///
/// # Invariants
/// - `values` keys are column names of the owning table definition.
/// - `link_id` matches the parent row's form-column counter for nested rows
///   and is `None` for root rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormRow {
    /// Store-assigned row identifier; `None` before persistence.
    pub id: Option<RowId>,
    /// Parent link counter for nested rows.
    pub link_id: Option<u64>,
    /// Column values keyed by column name.
    pub values: BTreeMap<String, Value>,
}

impl FormRow {
    /// Creates an unpersisted row with the given parent link.
    #[must_use]
    pub const fn new(link_id: Option<u64>) -> Self {
        Self { id: None, link_id, values: BTreeMap::new() }
    }
}

/// All dynamic-table rows of one submission revision, keyed by storage table.
///
/// # Invariants
/// - Rows of a table preserve insertion order, which is their display order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormRowSet {
    /// Rows grouped by physical storage table name.
    rows: BTreeMap<String, Vec<FormRow>>,
}

impl FormRowSet {
    /// Creates an empty row set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a row under a storage table name.
    pub fn push(&mut self, table: impl Into<String>, row: FormRow) {
        self.rows.entry(table.into()).or_default().push(row);
    }

    /// Returns the rows stored under a table name.
    #[must_use]
    pub fn table_rows(&self, table: &str) -> &[FormRow] {
        self.rows.get(table).map_or(&[], Vec::as_slice)
    }

    /// Returns rows of a table whose parent link matches.
    pub fn rows_linked<'a>(
        &'a self,
        table: &str,
        link_id: u64,
    ) -> impl Iterator<Item = &'a FormRow> {
        self.table_rows(table).iter().filter(move |row| row.link_id == Some(link_id))
    }

    /// Returns the storage table names present in the set.
    pub fn tables(&self) -> impl Iterator<Item = &str> {
        self.rows.keys().map(String::as_str)
    }

    /// Returns true when the set holds no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.values().all(Vec::is_empty)
    }
}

// ============================================================================
// SECTION: Restatements
// ============================================================================

/// Restatement produced during an edit, before store identifiers exist.
///
/// # Invariants
/// - `previous_value` is the projected leaf value being displaced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRestatement {
    /// Path of the restated leaf.
    pub attribute_path: AttributePath,
    /// Value the leaf held before the edit.
    pub previous_value: Value,
    /// Provenance label of the replacing data.
    pub data_source: Option<String>,
    /// Time the restatement was reported.
    pub reported_at: Timestamp,
    /// Caller-supplied justification.
    pub reason: Option<String>,
}

/// Persisted restatement row keyed to a submission lineage.
///
/// # Invariants
/// - Immutable once created.
/// - `group_id` is the identifier of revision 1 of the lineage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestatementRecord {
    /// Revision that introduced the restatement.
    pub submission_id: SubmissionId,
    /// Lineage key: the identifier of revision 1.
    pub group_id: SubmissionId,
    /// Path of the restated leaf.
    pub attribute_path: AttributePath,
    /// Value the leaf held before the edit.
    pub previous_value: Value,
    /// Provenance label of the replacing data.
    pub data_source: Option<String>,
    /// Time the restatement was reported.
    pub reported_at: Timestamp,
    /// Caller-supplied justification.
    pub reason: Option<String>,
}

// ============================================================================
// SECTION: Aggregates and Patches
// ============================================================================

/// Materialized aggregate snapshot of one submission revision.
///
/// # Invariants
/// - `data` always reflects the revision's current form rows after a
///   successful write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateRecord {
    /// Owning submission revision.
    pub submission_id: SubmissionId,
    /// Denormalized nested value tree.
    pub data: Value,
}

/// One leaf edit inside a revision patch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchEntry {
    /// Leaf addressed by the edit.
    pub path: AttributePath,
    /// New leaf value.
    pub value: Value,
    /// Caller-supplied justification, recorded on restatements.
    pub reason: Option<String>,
}

/// Caller-supplied set of leaf edits applied over the latest revision.
///
/// # Invariants
/// - Entries apply in order; later entries win on path collisions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisionPatch {
    /// Ordered leaf edits.
    pub entries: Vec<PatchEntry>,
    /// Provenance label for the edited data.
    pub data_source: Option<String>,
    /// Time the edit batch was reported.
    pub reported_at: Timestamp,
}

// crates/formvault-store-sqlite/tests/sqlite_store.rs
// ============================================================================
// Module: SQLite Store Tests
// Description: Durability, transaction, and integrity tests for the store.
// Purpose: Validate schema bootstrap, round-trips, cascades, and corruption
//          detection.
// ============================================================================

//! ## Overview
//! Integration tests for the SQLite submission store:
//! - Schema bootstrap and version validation
//! - Submission, form-row, restatement, and aggregate round-trips
//! - Active-flag exclusivity and checkout release on commit
//! - Cascading deletion and lineage-wide removal
//! - Aggregate digest verification (fail-closed on tampering)

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions and helpers are permitted."
)]

use std::path::Path;
use std::sync::Arc;

use formvault_core::ActiveFilter;
use formvault_core::AttributeType;
use formvault_core::Checkout;
use formvault_core::ChoiceDef;
use formvault_core::ChoiceId;
use formvault_core::ChoiceSetId;
use formvault_core::ColumnDef;
use formvault_core::ColumnDefId;
use formvault_core::CommitMode;
use formvault_core::CommitRevision;
use formvault_core::FormValueProjector;
use formvault_core::NewRestatement;
use formvault_core::NewSubmission;
use formvault_core::OrgId;
use formvault_core::PrincipalId;
use formvault_core::SchemaRegistry;
use formvault_core::StoreError;
use formvault_core::SubmissionName;
use formvault_core::SubmissionRecord;
use formvault_core::SubmissionStatus;
use formvault_core::SubmissionStore;
use formvault_core::TableDef;
use formvault_core::TableDefId;
use formvault_core::TableView;
use formvault_core::TableViewId;
use formvault_core::Timestamp;
use formvault_core::compose;
use formvault_store_sqlite::SqliteStoreConfig;
use formvault_store_sqlite::SqliteStoreError;
use formvault_store_sqlite::SqliteSubmissionStore;
use rusqlite::Connection;
use rusqlite::params;
use serde_json::Value;
use serde_json::json;
use tempfile::TempDir;

// ============================================================================
// SECTION: Helpers
// ============================================================================

const VIEW: u64 = 500;

fn table_id(raw: u64) -> TableDefId {
    TableDefId::from_raw(raw).expect("nonzero table id")
}

fn view_id(raw: u64) -> TableViewId {
    TableViewId::from_raw(raw).expect("nonzero view id")
}

fn principal(raw: u64) -> PrincipalId {
    PrincipalId::from_raw(raw).expect("nonzero principal id")
}

fn column(
    raw: u64,
    name: &str,
    attribute_type: AttributeType,
    subform: Option<TableDefId>,
    choice_set: Option<ChoiceSetId>,
) -> ColumnDef {
    ColumnDef {
        id: ColumnDefId::from_raw(raw).expect("nonzero column id"),
        name: name.to_owned(),
        attribute_type,
        subform,
        choice_set,
        unit: None,
    }
}

fn registry() -> Arc<SchemaRegistry> {
    let set = ChoiceSetId::from_raw(100).expect("nonzero choice set id");
    let tables = vec![
        TableDef {
            id: table_id(10),
            name: "report".to_owned(),
            heritable: false,
            columns: vec![
                column(1, "org_boundary", AttributeType::Text, None, None),
                column(2, "reporting_year", AttributeType::Int, None, None),
                column(3, "total_emissions", AttributeType::Float, None, None),
                column(4, "verified", AttributeType::Bool, None, None),
                column(5, "scope1", AttributeType::Form, Some(table_id(11)), None),
            ],
        },
        TableDef {
            id: table_id(11),
            name: "scope1".to_owned(),
            heritable: true,
            columns: vec![
                column(6, "ghg_name", AttributeType::Single, None, Some(set)),
                column(7, "emissions", AttributeType::Float, None, None),
            ],
        },
    ];
    let views = vec![TableView { id: view_id(VIEW), table_def_id: table_id(10) }];
    let choices = vec![
        ChoiceDef {
            choice_id: ChoiceId::from_raw(1000).expect("nonzero choice id"),
            set_id: set,
            value: "Carbon dioxide".to_owned(),
        },
        ChoiceDef {
            choice_id: ChoiceId::from_raw(1001).expect("nonzero choice id"),
            set_id: set,
            value: "Methane".to_owned(),
        },
    ];
    Arc::new(SchemaRegistry::new(tables, views, choices).expect("valid registry"))
}

fn sample_tree() -> Value {
    json!({
        "org_boundary": "Operational control",
        "reporting_year": 2023,
        "total_emissions": 1000.0,
        "verified": true,
        "scope1": [
            { "ghg_name": "Carbon dioxide", "emissions": 800.0 },
            { "ghg_name": "Methane", "emissions": 200.0 }
        ]
    })
}

fn store_at(dir: &Path) -> SqliteSubmissionStore {
    let config = SqliteStoreConfig::new(dir.join("formvault.db"));
    SqliteSubmissionStore::open(&config, registry()).expect("open store")
}

fn seed(store: &SqliteSubmissionStore, name: &str) -> SubmissionRecord {
    let registry = registry();
    let rows = compose(&registry, view_id(VIEW), &sample_tree()).expect("compose");
    let aggregate = FormValueProjector::new(&registry)
        .project(view_id(VIEW), &rows)
        .expect("project")
        .values;
    store
        .create_submission(NewSubmission {
            name: SubmissionName::from(name),
            table_view_id: view_id(VIEW),
            rows,
            aggregate,
            data_source: Some("initial import".to_owned()),
            org_id: OrgId::from_raw(1).expect("nonzero org id"),
            submitted_by: principal(1),
            created_at: Timestamp::Logical(1),
        })
        .expect("create submission")
}

fn commit_for(name: &str, mode: CommitMode, tree: &Value) -> CommitRevision {
    let registry = registry();
    let rows = compose(&registry, view_id(VIEW), tree).expect("compose");
    let aggregate = FormValueProjector::new(&registry)
        .project(view_id(VIEW), &rows)
        .expect("project")
        .values;
    CommitRevision {
        name: SubmissionName::from(name),
        mode,
        status: SubmissionStatus::Published,
        rows,
        aggregate,
        restatements: Vec::new(),
        author: principal(1),
        data_source: Some("correction".to_owned()),
        created_at: Timestamp::Logical(5),
    }
}

fn raw_connection(dir: &Path) -> Connection {
    Connection::open(dir.join("formvault.db")).expect("raw connection")
}

// ============================================================================
// SECTION: Bootstrap
// ============================================================================

#[test]
fn open_bootstraps_and_reopens_cleanly() {
    let dir = TempDir::new().expect("tempdir");
    {
        let store = store_at(dir.path());
        assert!(store.readiness().is_ok());
    }
    let store = store_at(dir.path());
    assert!(store.readiness().is_ok());
}

#[test]
fn incompatible_schema_versions_are_rejected() {
    let dir = TempDir::new().expect("tempdir");
    drop(store_at(dir.path()));

    let conn = raw_connection(dir.path());
    conn.execute("UPDATE store_meta SET value = '999' WHERE key = 'schema_version'", [])
        .expect("tamper version");
    drop(conn);

    let config = SqliteStoreConfig::new(dir.path().join("formvault.db"));
    let result = SqliteSubmissionStore::open(&config, registry());
    assert!(matches!(result, Err(SqliteStoreError::VersionMismatch(_))));
}

// ============================================================================
// SECTION: Round-Trips
// ============================================================================

#[test]
fn created_submissions_round_trip_records_and_rows() {
    let dir = TempDir::new().expect("tempdir");
    let store = store_at(dir.path());
    let record = seed(&store, "acme-2023");

    assert_eq!(record.revision, 1);
    assert!(record.active);
    assert_eq!(record.status, Some(SubmissionStatus::Draft));
    assert_eq!(record.checkout, None);

    let loaded = store.load_submission(record.id).expect("load").expect("present");
    assert_eq!(loaded, record);

    // Stored rows must project to the same tree as the composed input.
    let registry = registry();
    let projector = FormValueProjector::new(&registry);
    let loaded_rows = store.load_form_rows(record.id).expect("load rows");
    let projected =
        projector.project(view_id(VIEW), &loaded_rows).expect("project loaded rows");
    assert_eq!(projected.values, sample_tree());
}

#[test]
fn duplicate_names_conflict() {
    let dir = TempDir::new().expect("tempdir");
    let store = store_at(dir.path());
    seed(&store, "acme-2023");

    let registry = registry();
    let rows = compose(&registry, view_id(VIEW), &sample_tree()).expect("compose");
    let duplicate = store.create_submission(NewSubmission {
        name: SubmissionName::from("acme-2023"),
        table_view_id: view_id(VIEW),
        rows,
        aggregate: json!({}),
        data_source: None,
        org_id: OrgId::from_raw(1).expect("nonzero org id"),
        submitted_by: principal(1),
        created_at: Timestamp::Logical(2),
    });
    assert!(matches!(duplicate, Err(StoreError::Conflict(_))));
}

#[test]
fn checkout_and_status_writes_round_trip() {
    let dir = TempDir::new().expect("tempdir");
    let store = store_at(dir.path());
    let record = seed(&store, "acme-2023");

    let checkout = Checkout { principal: principal(2), at: Timestamp::Logical(3) };
    let held = store.set_checkout(record.id, Some(checkout)).expect("set checkout");
    assert_eq!(held.checkout, Some(checkout));

    let released = store.set_checkout(record.id, None).expect("clear checkout");
    assert_eq!(released.checkout, None);

    let published =
        store.set_status(record.id, SubmissionStatus::Published).expect("set status");
    assert_eq!(published.status, Some(SubmissionStatus::Published));

    let reloaded = store.load_submission(record.id).expect("load").expect("present");
    assert_eq!(reloaded.status, Some(SubmissionStatus::Published));
    assert_eq!(reloaded.checkout, None);
}

// ============================================================================
// SECTION: Commits
// ============================================================================

#[test]
fn new_revision_commits_deactivate_and_release_siblings() {
    let dir = TempDir::new().expect("tempdir");
    let store = store_at(dir.path());
    let first = seed(&store, "acme-2023");
    store
        .set_checkout(
            first.id,
            Some(Checkout { principal: principal(1), at: Timestamp::Logical(2) }),
        )
        .expect("checkout");

    let mut tree = sample_tree();
    tree["reporting_year"] = json!(2024);
    let mut commit = commit_for("acme-2023", CommitMode::NewRevision, &tree);
    commit.restatements.push(NewRestatement {
        attribute_path: "reporting_year".parse().expect("parse path"),
        previous_value: json!(2023),
        data_source: Some("correction".to_owned()),
        reported_at: Timestamp::Logical(5),
        reason: Some("late figures".to_owned()),
    });

    let second = store.commit_revision(commit).expect("commit");
    assert_eq!(second.revision, 2);
    assert!(second.active);
    assert_eq!(second.checkout_holder(), Some(principal(1)));

    let name = SubmissionName::from("acme-2023");
    let revisions = store.list_revisions(&name, ActiveFilter::Any).expect("list");
    assert_eq!(revisions.len(), 2);
    assert_eq!(revisions[0].id, second.id);
    assert!(!revisions[1].active);
    assert_eq!(revisions[1].checkout, None);

    // Restatements are grouped under revision 1's identifier.
    let restatements = store.list_restatements(first.id).expect("list restatements");
    assert_eq!(restatements.len(), 1);
    assert_eq!(restatements[0].submission_id, second.id);
    assert_eq!(restatements[0].previous_value, json!(2023));
    assert_eq!(restatements[0].attribute_path.to_string(), "reporting_year");
    assert_eq!(restatements[0].reason.as_deref(), Some("late figures"));
}

#[test]
fn draft_overwrite_replaces_rows_in_place() {
    let dir = TempDir::new().expect("tempdir");
    let store = store_at(dir.path());
    let record = seed(&store, "acme-2023");

    let mut tree = sample_tree();
    tree["total_emissions"] = json!(1100.0);
    tree["scope1"] = json!([{ "ghg_name": "Methane", "emissions": 1100.0 }]);
    let commit = commit_for(
        "acme-2023",
        CommitMode::OverwriteDraft { submission_id: record.id },
        &tree,
    );

    let updated = store.commit_revision(commit).expect("overwrite");
    assert_eq!(updated.id, record.id);
    assert_eq!(updated.revision, 1);
    assert_eq!(updated.status, Some(SubmissionStatus::Published));

    let registry = registry();
    let rows = store.load_form_rows(record.id).expect("load rows");
    let projected = FormValueProjector::new(&registry)
        .project(view_id(VIEW), &rows)
        .expect("project");
    assert_eq!(projected.values["total_emissions"], json!(1100.0));
    assert_eq!(projected.values["scope1"].as_array().map(Vec::len), Some(1));

    let aggregate = store.load_aggregate(record.id).expect("load aggregate").expect("present");
    assert_eq!(aggregate["total_emissions"], json!(1100.0));
}

#[test]
fn active_swap_is_atomic_and_checked() {
    let dir = TempDir::new().expect("tempdir");
    let store = store_at(dir.path());
    let first = seed(&store, "acme-2023");
    store
        .set_checkout(
            first.id,
            Some(Checkout { principal: principal(1), at: Timestamp::Logical(2) }),
        )
        .expect("checkout");
    let second = store
        .commit_revision(commit_for("acme-2023", CommitMode::NewRevision, &sample_tree()))
        .expect("commit");

    store.swap_active(second.id, first.id).expect("swap");
    let name = SubmissionName::from("acme-2023");
    let active = store.list_revisions(&name, ActiveFilter::ActiveOnly).expect("list active");
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].id, first.id);

    let missing = formvault_core::SubmissionId::from_raw(9_999).expect("nonzero id");
    assert!(matches!(
        store.swap_active(first.id, missing),
        Err(StoreError::NotFound(_))
    ));
}

// ============================================================================
// SECTION: Deletion
// ============================================================================

#[test]
fn deleting_a_revision_cascades_rows_and_restatements() {
    let dir = TempDir::new().expect("tempdir");
    let store = store_at(dir.path());
    let first = seed(&store, "acme-2023");
    store
        .set_checkout(
            first.id,
            Some(Checkout { principal: principal(1), at: Timestamp::Logical(2) }),
        )
        .expect("checkout");
    let mut commit = commit_for("acme-2023", CommitMode::NewRevision, &sample_tree());
    commit.restatements.push(NewRestatement {
        attribute_path: "reporting_year".parse().expect("parse path"),
        previous_value: json!(2023),
        data_source: None,
        reported_at: Timestamp::Logical(5),
        reason: None,
    });
    let second = store.commit_revision(commit).expect("commit");

    let deletion = store.delete_revision(second.id).expect("delete");
    assert_eq!(deletion.deleted.id, second.id);
    assert_eq!(deletion.promoted.expect("promoted").id, first.id);

    assert!(matches!(
        store.load_form_rows(second.id),
        Err(StoreError::NotFound(_))
    ));
    assert!(store.list_restatements(first.id).expect("list restatements").is_empty());

    let conn = raw_connection(dir.path());
    let orphan_rows: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM scope1_heritable WHERE obj_id = ?1",
            params![second.id.get() as i64],
            |row| row.get(0),
        )
        .expect("count rows");
    assert_eq!(orphan_rows, 0);
}

#[test]
fn delete_all_reports_the_removed_count() {
    let dir = TempDir::new().expect("tempdir");
    let store = store_at(dir.path());
    let first = seed(&store, "acme-2023");
    store
        .set_checkout(
            first.id,
            Some(Checkout { principal: principal(1), at: Timestamp::Logical(2) }),
        )
        .expect("checkout");
    store
        .commit_revision(commit_for("acme-2023", CommitMode::NewRevision, &sample_tree()))
        .expect("commit");
    seed(&store, "other-2023");

    let name = SubmissionName::from("acme-2023");
    assert_eq!(store.delete_all(&name).expect("delete all"), 2);
    assert!(store.list_revisions(&name, ActiveFilter::Any).expect("list").is_empty());

    let untouched = SubmissionName::from("other-2023");
    assert_eq!(store.list_revisions(&untouched, ActiveFilter::Any).expect("list").len(), 1);
}

// ============================================================================
// SECTION: Aggregate Integrity
// ============================================================================

#[test]
fn aggregates_round_trip_and_replace() {
    let dir = TempDir::new().expect("tempdir");
    let store = store_at(dir.path());
    let record = seed(&store, "acme-2023");

    let initial = store.load_aggregate(record.id).expect("load").expect("present");
    assert_eq!(initial["reporting_year"], json!(2023));

    let replacement = json!({ "reporting_year": 2030 });
    store.save_aggregate(record.id, &replacement).expect("save");
    let loaded = store.load_aggregate(record.id).expect("load").expect("present");
    assert_eq!(loaded, replacement);
}

#[test]
fn tampered_aggregates_fail_closed() {
    let dir = TempDir::new().expect("tempdir");
    let store = store_at(dir.path());
    let record = seed(&store, "acme-2023");

    let conn = raw_connection(dir.path());
    conn.execute(
        "UPDATE aggregates SET data_json = '{\"reporting_year\":1999}' \
         WHERE submission_id = ?1",
        params![record.id.get() as i64],
    )
    .expect("tamper aggregate");
    drop(conn);

    assert!(matches!(
        store.load_aggregate(record.id),
        Err(StoreError::Corrupt(_))
    ));
}

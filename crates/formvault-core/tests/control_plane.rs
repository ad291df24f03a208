// crates/formvault-core/tests/control_plane.rs
// ============================================================================
// Module: Control Plane Tests
// Description: End-to-end operation surface over the in-memory store.
// Purpose: Validate access enforcement, lifecycle operations, and hooks.
// ============================================================================

//! End-to-end tests for the control plane.

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

use std::sync::Arc;
use std::sync::Mutex;

use formvault_core::AccessDecider;
use formvault_core::AccessError;
use formvault_core::ActiveFilter;
use formvault_core::AttributePath;
use formvault_core::AttributeType;
use formvault_core::ChoiceDef;
use formvault_core::ChoiceId;
use formvault_core::ChoiceSetId;
use formvault_core::ColumnDef;
use formvault_core::ColumnDefId;
use formvault_core::ControlPlane;
use formvault_core::ControlPlaneConfig;
use formvault_core::CoreError;
use formvault_core::CreateSubmissionRequest;
use formvault_core::InMemorySubmissionStore;
use formvault_core::MutationHooks;
use formvault_core::OrgId;
use formvault_core::PatchEntry;
use formvault_core::PermitAllAccess;
use formvault_core::PrincipalId;
use formvault_core::RequestContext;
use formvault_core::RevisionPatch;
use formvault_core::SchemaRegistry;
use formvault_core::SubmissionId;
use formvault_core::SubmissionName;
use formvault_core::SubmissionRecord;
use formvault_core::TableDef;
use formvault_core::TableDefId;
use formvault_core::TableView;
use formvault_core::TableViewId;
use formvault_core::Timestamp;
use formvault_core::messages;
use serde_json::Value;
use serde_json::json;

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

fn org(raw: u64) -> OrgId {
    OrgId::from_raw(raw).expect("nonzero org id")
}

fn ctx(raw: u64, at: i64) -> RequestContext {
    RequestContext { principal: principal(raw), now: Timestamp::UnixMillis(at) }
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
                column(4, "scope1", AttributeType::Form, Some(table_id(11)), None),
            ],
        },
        TableDef {
            id: table_id(11),
            name: "scope1".to_owned(),
            heritable: true,
            columns: vec![
                column(5, "ghg_name", AttributeType::Single, None, Some(set)),
                column(6, "emissions", AttributeType::Float, None, None),
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
        "scope1": [
            { "ghg_name": "Carbon dioxide", "emissions": 800.0 },
            { "ghg_name": "Methane", "emissions": 200.0 }
        ]
    })
}

fn create_request(name: &str) -> CreateSubmissionRequest {
    CreateSubmissionRequest {
        name: SubmissionName::from(name),
        table_view_id: view_id(VIEW),
        values: sample_tree(),
        data_source: Some("initial import".to_owned()),
        org_id: org(1),
    }
}

fn patch(path: &str, value: Value) -> RevisionPatch {
    RevisionPatch {
        entries: vec![PatchEntry {
            path: AttributePath::parse(path).expect("parse path"),
            value,
            reason: Some("correction".to_owned()),
        }],
        data_source: Some("correction".to_owned()),
        reported_at: Timestamp::UnixMillis(50),
    }
}

/// Hooks implementation recording every notification for assertions.
#[derive(Debug, Clone, Default)]
struct RecordingHooks {
    events: Arc<Mutex<Vec<String>>>,
}

impl RecordingHooks {
    fn events(&self) -> Vec<String> {
        self.events.lock().expect("events mutex").clone()
    }
}

impl MutationHooks for RecordingHooks {
    fn on_principal_activity(&self, principal: PrincipalId, _at: Timestamp) {
        self.events.lock().expect("events mutex").push(format!("activity:{principal}"));
    }

    fn on_submission_mutated(&self, name: &SubmissionName, affected: &[SubmissionId]) {
        self.events
            .lock()
            .expect("events mutex")
            .push(format!("mutated:{name}:{}", affected.len()));
    }
}

/// Decider denying everything; used to verify fail-closed enforcement.
#[derive(Debug, Clone, Copy, Default)]
struct DenyAllAccess;

impl AccessDecider for DenyAllAccess {
    fn can_create(&self, _principal: PrincipalId, _org: OrgId) -> Result<bool, AccessError> {
        Ok(false)
    }

    fn can_read(
        &self,
        _principal: PrincipalId,
        _submission: &SubmissionRecord,
    ) -> Result<bool, AccessError> {
        Ok(false)
    }

    fn can_write(
        &self,
        _principal: PrincipalId,
        _submission: &SubmissionRecord,
    ) -> Result<bool, AccessError> {
        Ok(false)
    }

    fn can_override_lock(&self, _principal: PrincipalId) -> Result<bool, AccessError> {
        Ok(false)
    }
}

/// Decider granting the lock-override capability to principal 9 only.
#[derive(Debug, Clone, Copy, Default)]
struct AdminOverrideAccess;

impl AccessDecider for AdminOverrideAccess {
    fn can_create(&self, _principal: PrincipalId, _org: OrgId) -> Result<bool, AccessError> {
        Ok(true)
    }

    fn can_read(
        &self,
        _principal: PrincipalId,
        _submission: &SubmissionRecord,
    ) -> Result<bool, AccessError> {
        Ok(true)
    }

    fn can_write(
        &self,
        _principal: PrincipalId,
        _submission: &SubmissionRecord,
    ) -> Result<bool, AccessError> {
        Ok(true)
    }

    fn can_override_lock(&self, principal: PrincipalId) -> Result<bool, AccessError> {
        Ok(principal.get() == 9)
    }
}

type Plane<A, H> = ControlPlane<InMemorySubmissionStore, A, H>;

fn plane_with<A: AccessDecider, H: MutationHooks>(access: A, hooks: H) -> Plane<A, H> {
    ControlPlane::new(
        registry(),
        InMemorySubmissionStore::new(),
        access,
        hooks,
        ControlPlaneConfig::default(),
    )
}

fn plane() -> Plane<PermitAllAccess, RecordingHooks> {
    plane_with(PermitAllAccess, RecordingHooks::default())
}

// ============================================================================
// SECTION: Creation and Reads
// ============================================================================

#[test]
fn create_then_get_returns_the_projected_tree() {
    let plane = plane();
    let ctx = ctx(1, 10);
    let record = plane.create_submission(&ctx, &create_request("acme-2023")).expect("create");
    assert_eq!(record.revision, 1);
    assert!(record.is_draft());

    let view = plane
        .get_revision(&ctx, &SubmissionName::from("acme-2023"), None)
        .expect("get active revision");
    assert_eq!(view.record.id, record.id);
    assert_eq!(view.data, sample_tree());
}

#[test]
fn duplicate_names_are_rejected_as_validation_errors() {
    let plane = plane();
    let ctx = ctx(1, 10);
    plane.create_submission(&ctx, &create_request("acme-2023")).expect("create");
    let duplicate = plane.create_submission(&ctx, &create_request("acme-2023"));
    assert!(matches!(duplicate, Err(CoreError::Validation { .. })));
}

#[test]
fn missing_lineages_and_revisions_are_not_found() {
    let plane = plane();
    let ctx = ctx(1, 10);
    let missing = plane.get_revision(&ctx, &SubmissionName::from("ghost"), None);
    assert_eq!(
        missing,
        Err(CoreError::not_found("name", messages::SUBMISSION_NOT_FOUND))
    );

    plane.create_submission(&ctx, &create_request("acme-2023")).expect("create");
    let missing_revision =
        plane.get_revision(&ctx, &SubmissionName::from("acme-2023"), Some(7));
    assert_eq!(
        missing_revision,
        Err(CoreError::not_found("revision", messages::REVISION_NOT_FOUND))
    );
}

// ============================================================================
// SECTION: Edit Lifecycle
// ============================================================================

#[test]
fn draft_edit_publish_produces_one_published_revision() {
    let plane = plane();
    let ctx = ctx(1, 10);
    let name = SubmissionName::from("acme-2023");
    plane.create_submission(&ctx, &create_request("acme-2023")).expect("create");

    plane.set_edit_mode(&ctx, &name, false).expect("checkout");
    let outcome = plane
        .save_draft(&ctx, &name, &patch("total_emissions", json!(1050.0)))
        .expect("save draft");
    assert_eq!(outcome.record.revision, 1);
    assert_eq!(outcome.restatements_created, 1);

    let report = plane.publish(&ctx, &name).expect("publish");
    assert!(!report.record.is_draft());
    assert_eq!(report.restatements.len(), 1);
    assert_eq!(report.restatements[0].previous_value, json!(1000.0));

    let again = plane.publish(&ctx, &name);
    assert_eq!(again, Err(CoreError::validation("name", messages::NOT_A_DRAFT)));
}

#[test]
fn edits_over_published_revisions_mint_new_ones() {
    let plane = plane();
    let ctx = ctx(1, 10);
    let name = SubmissionName::from("acme-2023");
    plane.create_submission(&ctx, &create_request("acme-2023")).expect("create");
    plane.set_edit_mode(&ctx, &name, false).expect("checkout");
    plane
        .create_revision(&ctx, &name, &patch("reporting_year", json!(2024)))
        .expect("publish in place");

    let outcome = plane
        .create_revision(&ctx, &name, &patch("reporting_year", json!(2025)))
        .expect("new revision");
    assert_eq!(outcome.record.revision, 2);

    let active = plane.get_revision(&ctx, &name, None).expect("active");
    assert_eq!(active.record.revision, 2);
    assert_eq!(active.data["reporting_year"], json!(2025));

    let first = plane.get_revision(&ctx, &name, Some(1)).expect("first");
    assert_eq!(first.data["reporting_year"], json!(2024));

    let listed = plane.list_revisions(&ctx, &name, ActiveFilter::Any).expect("list");
    assert_eq!(listed.iter().map(|r| r.revision).collect::<Vec<_>>(), vec![2, 1]);
}

#[test]
fn foreign_lock_blocks_edits_until_cleared() {
    let plane = plane();
    let owner = ctx(1, 10);
    let editor = ctx(2, 20);
    let name = SubmissionName::from("acme-2023");
    plane.create_submission(&owner, &create_request("acme-2023")).expect("create");
    plane.set_edit_mode(&owner, &name, false).expect("owner checkout");
    plane
        .create_revision(&owner, &name, &patch("reporting_year", json!(2024)))
        .expect("owner edit");

    let blocked = plane.create_revision(&editor, &name, &patch("reporting_year", json!(2025)));
    assert_eq!(
        blocked,
        Err(CoreError::forbidden("name", messages::CHECKED_OUT_BY_OTHER))
    );

    plane.clear_edit_mode(&owner, &name).expect("owner clear");
    let outcome = plane
        .create_revision(&editor, &name, &patch("reporting_year", json!(2025)))
        .expect("edit after lock cleared");
    assert_eq!(outcome.record.revision, 2);
    assert_eq!(outcome.record.checkout_holder(), Some(principal(2)));
}

#[test]
fn forced_takeover_requires_the_override_capability() {
    let plane = plane_with(AdminOverrideAccess, RecordingHooks::default());
    let owner = ctx(1, 10);
    let admin = ctx(9, 20);
    let intruder = ctx(2, 30);
    let name = SubmissionName::from("acme-2023");
    plane.create_submission(&owner, &create_request("acme-2023")).expect("create");
    plane.set_edit_mode(&owner, &name, false).expect("owner checkout");

    let denied = plane.set_edit_mode(&intruder, &name, true);
    assert_eq!(
        denied,
        Err(CoreError::forbidden("name", messages::CHECKED_OUT_BY_OTHER))
    );

    let taken = plane.set_edit_mode(&admin, &name, true).expect("forced takeover");
    assert_eq!(taken.checkout_holder(), Some(principal(9)));

    let released = plane.clear_edit_mode(&admin, &name).expect("clear");
    assert_eq!(released.checkout, None);
}

// ============================================================================
// SECTION: Rollback and Deletion
// ============================================================================

fn seed_two_published_revisions<A: AccessDecider, H: MutationHooks>(
    plane: &Plane<A, H>,
    ctx: &RequestContext,
    name: &SubmissionName,
) {
    plane
        .create_submission(
            ctx,
            &CreateSubmissionRequest {
                name: name.clone(),
                table_view_id: view_id(VIEW),
                values: sample_tree(),
                data_source: None,
                org_id: org(1),
            },
        )
        .expect("create");
    plane.set_edit_mode(ctx, name, false).expect("checkout");
    plane
        .create_revision(ctx, name, &patch("reporting_year", json!(2024)))
        .expect("publish in place");
    plane
        .create_revision(ctx, name, &patch("reporting_year", json!(2025)))
        .expect("revision 2");
}

#[test]
fn rollback_reactivates_the_previous_revision() {
    let plane = plane();
    let ctx = ctx(1, 10);
    let name = SubmissionName::from("acme-2023");
    seed_two_published_revisions(&plane, &ctx, &name);

    let report = plane.rollback(&ctx, &name).expect("rollback");
    assert_eq!(report.prev_active_revision, 2);
    assert_eq!(report.active_revision, 1);

    let active = plane.get_revision(&ctx, &name, None).expect("active");
    assert_eq!(active.record.revision, 1);
    assert_eq!(active.data["reporting_year"], json!(2024));
}

#[test]
fn revision_one_is_protected_from_deletion() {
    let plane = plane();
    let ctx = ctx(1, 10);
    let name = SubmissionName::from("acme-2023");
    seed_two_published_revisions(&plane, &ctx, &name);

    let protected = plane.delete_revision(&ctx, &name, 1);
    assert_eq!(
        protected,
        Err(CoreError::validation("revision", messages::FIRST_REVISION_PROTECTED))
    );

    let deletion = plane.delete_revision(&ctx, &name, 2).expect("delete revision 2");
    assert_eq!(deletion.deleted.revision, 2);
    assert_eq!(deletion.promoted.expect("promoted").revision, 1);

    let missing = plane.delete_revision(&ctx, &name, 5);
    assert_eq!(
        missing,
        Err(CoreError::not_found("revision", messages::REVISION_NOT_FOUND))
    );
}

#[test]
fn delete_all_revisions_empties_the_lineage() {
    let plane = plane();
    let ctx = ctx(1, 10);
    let name = SubmissionName::from("acme-2023");
    seed_two_published_revisions(&plane, &ctx, &name);

    let removed = plane.delete_all_revisions(&ctx, &name).expect("delete all");
    assert_eq!(removed, 2);
    let gone = plane.get_revision(&ctx, &name, None);
    assert_eq!(
        gone,
        Err(CoreError::not_found("name", messages::SUBMISSION_NOT_FOUND))
    );
}

// ============================================================================
// SECTION: Access Enforcement and Hooks
// ============================================================================

#[test]
fn denied_capabilities_fail_closed() {
    let plane = plane_with(DenyAllAccess, RecordingHooks::default());
    let ctx = ctx(1, 10);
    let denied = plane.create_submission(&ctx, &create_request("acme-2023"));
    assert_eq!(
        denied,
        Err(CoreError::forbidden("principal", messages::ACCESS_DENIED))
    );
}

#[test]
fn mutations_fire_hooks_after_commit() {
    let hooks = RecordingHooks::default();
    let plane = plane_with(PermitAllAccess, hooks.clone());
    let ctx = ctx(1, 10);
    let name = SubmissionName::from("acme-2023");
    plane.create_submission(&ctx, &create_request("acme-2023")).expect("create");

    let events = hooks.events();
    assert_eq!(events, vec!["mutated:acme-2023:1".to_owned(), "activity:1".to_owned()]);

    plane.set_edit_mode(&ctx, &name, false).expect("checkout");
    plane
        .save_draft(&ctx, &name, &patch("reporting_year", json!(2024)))
        .expect("save draft");

    let events = hooks.events();
    // Checkout and the draft overwrite each notify one affected revision.
    assert_eq!(events.len(), 6);
    assert_eq!(events[4], "mutated:acme-2023:1");
    assert_eq!(events[5], "activity:1");

    // Reads never fire hooks.
    plane.get_revision(&ctx, &name, None).expect("read");
    assert_eq!(hooks.events().len(), 6);
}

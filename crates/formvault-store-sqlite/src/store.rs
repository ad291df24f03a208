// crates/formvault-store-sqlite/src/store.rs
// ============================================================================
// Module: Formvault SQLite Store
// Description: SQLite persistence for submission revisions and aggregates.
// Purpose: Implement the SubmissionStore contract over a durable database.
// Dependencies: formvault-core, rusqlite, serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! The store keeps three fixed tables (`submissions`, `restatements`,
//! `aggregates`) plus one dynamic table per schema-registry table. Dynamic
//! tables are created at open time from the validated registry, so their
//! names and column names have already passed the registry's identifier
//! charset check. Aggregate snapshots are stored alongside a canonical-JSON
//! SHA-256 digest and verified on every load; a digest mismatch fails the
//! read closed.
//!
//! Concurrency follows the single-writer model: one connection behind a
//! mutex, immediate transactions for every multi-row mutation.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::time::Duration;

use rusqlite::Connection;
use rusqlite::OpenFlags;
use rusqlite::OptionalExtension;
use rusqlite::TransactionBehavior;
use rusqlite::params;
use rusqlite::params_from_iter;
use rusqlite::types::Value as SqlValue;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use formvault_core::ActiveFilter;
use formvault_core::AttributePath;
use formvault_core::AttributeType;
use formvault_core::Checkout;
use formvault_core::ColumnDef;
use formvault_core::CommitMode;
use formvault_core::CommitRevision;
use formvault_core::FormRow;
use formvault_core::FormRowSet;
use formvault_core::NewRestatement;
use formvault_core::NewSubmission;
use formvault_core::OrgId;
use formvault_core::PrincipalId;
use formvault_core::RestatementRecord;
use formvault_core::RevisionDeletion;
use formvault_core::RowId;
use formvault_core::SchemaRegistry;
use formvault_core::StoreError;
use formvault_core::SubmissionId;
use formvault_core::SubmissionName;
use formvault_core::SubmissionRecord;
use formvault_core::SubmissionStatus;
use formvault_core::SubmissionStore;
use formvault_core::TableViewId;
use formvault_core::Timestamp;
use formvault_core::hash_value;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// On-disk schema version recorded in `store_meta`.
pub const SCHEMA_VERSION: u32 = 1;

/// Default busy timeout in milliseconds.
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// Column list shared by every submission-record query.
const SUBMISSION_COLUMNS: &str = "id, name, revision, table_view_id, active, \
     checked_out_by, checked_out_at, status, data_source, org_id, \
     submitted_by, created_at";

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Journal mode pragma applied at connection open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SqliteJournalMode {
    /// Write-ahead logging; the default for durable deployments.
    #[default]
    Wal,
    /// Rollback journal; useful for read-mostly or ephemeral databases.
    Delete,
}

impl SqliteJournalMode {
    /// Returns the pragma value for this mode.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Wal => "WAL",
            Self::Delete => "DELETE",
        }
    }
}

/// Synchronous pragma applied at connection open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SqliteSyncMode {
    /// Full fsync on every commit; the default.
    #[default]
    Full,
    /// Reduced fsync frequency; safe under WAL.
    Normal,
}

impl SqliteSyncMode {
    /// Returns the pragma value for this mode.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Full => "FULL",
            Self::Normal => "NORMAL",
        }
    }
}

/// SQLite store configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SqliteStoreConfig {
    /// Database file path.
    pub path: PathBuf,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// Journal mode pragma.
    #[serde(default)]
    pub journal_mode: SqliteJournalMode,
    /// Synchronous pragma.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
}

impl SqliteStoreConfig {
    /// Creates a configuration with default pragmas for the given path.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            journal_mode: SqliteJournalMode::default(),
            sync_mode: SqliteSyncMode::default(),
        }
    }
}

/// Serde default for the busy timeout.
const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// SQLite store errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum SqliteStoreError {
    /// Database-level error from SQLite.
    #[error("sqlite store database error: {0}")]
    Db(String),
    /// The addressed record does not exist.
    #[error("sqlite store record not found: {0}")]
    NotFound(String),
    /// The operation conflicts with existing records.
    #[error("sqlite store conflict: {0}")]
    Conflict(String),
    /// Stored data failed parsing or an integrity check.
    #[error("sqlite store corruption: {0}")]
    Corrupt(String),
    /// Supplied or stored data is invalid.
    #[error("sqlite store invalid data: {0}")]
    Invalid(String),
    /// On-disk schema version is incompatible with this build.
    #[error("sqlite store schema version mismatch: {0}")]
    VersionMismatch(String),
}

impl From<rusqlite::Error> for SqliteStoreError {
    fn from(error: rusqlite::Error) -> Self {
        Self::Db(error.to_string())
    }
}

impl From<SqliteStoreError> for StoreError {
    fn from(error: SqliteStoreError) -> Self {
        match error {
            SqliteStoreError::Db(message) => Self::Store(message),
            SqliteStoreError::NotFound(message) => Self::NotFound(message),
            SqliteStoreError::Conflict(message) => Self::Conflict(message),
            SqliteStoreError::Corrupt(message) => Self::Corrupt(message),
            SqliteStoreError::Invalid(message) => Self::Invalid(message),
            SqliteStoreError::VersionMismatch(message) => Self::VersionMismatch(message),
        }
    }
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// SQLite-backed submission store.
///
/// # Invariants
/// - Dynamic tables exist for every registry table after `open` succeeds.
/// - Every multi-row mutation runs inside one immediate transaction.
#[derive(Debug)]
pub struct SqliteSubmissionStore {
    /// Schema registry driving the dynamic table layout.
    registry: Arc<SchemaRegistry>,
    /// Guarded database connection.
    connection: Mutex<Connection>,
}

impl SqliteSubmissionStore {
    /// Opens the database, applies pragmas, and bootstraps the schema.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the database cannot be opened,
    /// pragmas fail, or the on-disk schema version is incompatible.
    pub fn open(
        config: &SqliteStoreConfig,
        registry: Arc<SchemaRegistry>,
    ) -> Result<Self, SqliteStoreError> {
        let mut connection = open_connection(config)?;
        initialize_schema(&mut connection, &registry)?;
        Ok(Self { registry, connection: Mutex::new(connection) })
    }

    /// Locks the connection, failing closed on mutex poisoning.
    fn lock(&self) -> Result<MutexGuard<'_, Connection>, SqliteStoreError> {
        self.connection
            .lock()
            .map_err(|_| SqliteStoreError::Db("connection mutex poisoned".to_owned()))
    }
}

// ============================================================================
// SECTION: Bootstrap
// ============================================================================

/// Opens the database file with the configured pragmas applied.
fn open_connection(config: &SqliteStoreConfig) -> Result<Connection, SqliteStoreError> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
    let connection = Connection::open_with_flags(&config.path, flags)?;
    connection.execute_batch("PRAGMA foreign_keys = ON;")?;
    connection.pragma_update(None, "journal_mode", config.journal_mode.pragma_value())?;
    connection.pragma_update(None, "synchronous", config.sync_mode.pragma_value())?;
    connection.busy_timeout(Duration::from_millis(config.busy_timeout_ms))?;
    Ok(connection)
}

/// Creates fixed and dynamic tables and verifies the schema version.
fn initialize_schema(
    connection: &mut Connection,
    registry: &SchemaRegistry,
) -> Result<(), SqliteStoreError> {
    let tx = connection.transaction_with_behavior(TransactionBehavior::Immediate)?;
    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS store_meta (
             key TEXT PRIMARY KEY,
             value TEXT NOT NULL
         );
         CREATE TABLE IF NOT EXISTS submissions (
             id INTEGER PRIMARY KEY AUTOINCREMENT,
             name TEXT NOT NULL,
             revision INTEGER NOT NULL,
             table_view_id INTEGER NOT NULL,
             active INTEGER NOT NULL DEFAULT 0,
             checked_out_by INTEGER,
             checked_out_at TEXT,
             status TEXT,
             data_source TEXT,
             org_id INTEGER NOT NULL,
             submitted_by INTEGER NOT NULL,
             created_at TEXT NOT NULL,
             UNIQUE (name, revision)
         );
         CREATE INDEX IF NOT EXISTS idx_submissions_name
             ON submissions (name);
         CREATE TABLE IF NOT EXISTS restatements (
             id INTEGER PRIMARY KEY AUTOINCREMENT,
             submission_id INTEGER NOT NULL
                 REFERENCES submissions (id) ON DELETE CASCADE,
             group_id INTEGER NOT NULL,
             attribute_path TEXT NOT NULL,
             previous_value TEXT NOT NULL,
             data_source TEXT,
             reported_at TEXT NOT NULL,
             reason TEXT
         );
         CREATE INDEX IF NOT EXISTS idx_restatements_group
             ON restatements (group_id);
         CREATE TABLE IF NOT EXISTS aggregates (
             submission_id INTEGER PRIMARY KEY
                 REFERENCES submissions (id) ON DELETE CASCADE,
             data_json TEXT NOT NULL,
             data_hash TEXT NOT NULL
         );",
    )?;

    for table in registry.tables() {
        let storage = table.storage_name();
        let mut columns = String::new();
        for column in &table.columns {
            columns.push_str(&format!(
                ",\n             \"{}\" {}",
                column.name,
                column_sql_type(column.attribute_type)
            ));
        }
        tx.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS \"{storage}\" (
             row_id INTEGER PRIMARY KEY AUTOINCREMENT,
             obj_id INTEGER NOT NULL
                 REFERENCES submissions (id) ON DELETE CASCADE,
             link_id INTEGER{columns}
         );
         CREATE INDEX IF NOT EXISTS \"idx_{storage}_obj\"
             ON \"{storage}\" (obj_id);"
        ))?;
    }

    let recorded: Option<String> = tx
        .query_row("SELECT value FROM store_meta WHERE key = 'schema_version'", [], |row| {
            row.get(0)
        })
        .optional()?;
    match recorded {
        None => {
            tx.execute(
                "INSERT INTO store_meta (key, value) VALUES ('schema_version', ?1)",
                params![SCHEMA_VERSION.to_string()],
            )?;
        }
        Some(value) if value == SCHEMA_VERSION.to_string() => {}
        Some(value) => {
            return Err(SqliteStoreError::VersionMismatch(format!(
                "found schema version {value}, expected {SCHEMA_VERSION}"
            )));
        }
    }
    tx.commit()?;
    Ok(())
}

/// Maps an attribute type to its SQLite column type.
const fn column_sql_type(attribute_type: AttributeType) -> &'static str {
    match attribute_type {
        AttributeType::Bool
        | AttributeType::Int
        | AttributeType::Single
        | AttributeType::Form
        | AttributeType::Multiple => "INTEGER",
        AttributeType::Float => "REAL",
        AttributeType::Text | AttributeType::Datetime => "TEXT",
    }
}

// ============================================================================
// SECTION: Value Mapping
// ============================================================================

/// Converts a raw signed identifier into a submission identifier.
fn submission_id_from(raw: i64) -> Result<SubmissionId, SqliteStoreError> {
    u64::try_from(raw)
        .ok()
        .and_then(SubmissionId::from_raw)
        .ok_or_else(|| SqliteStoreError::Corrupt(format!("invalid submission identifier {raw}")))
}

/// Converts an unsigned identifier into a signed bind parameter.
fn bind_raw(raw: u64) -> Result<i64, SqliteStoreError> {
    i64::try_from(raw)
        .map_err(|_| SqliteStoreError::Invalid(format!("identifier {raw} exceeds storage range")))
}

/// Serializes a timestamp to its stored `kind:value` text form.
fn timestamp_text(at: Timestamp) -> String {
    at.to_string()
}

/// Parses a timestamp from its stored text form.
fn timestamp_from(text: &str) -> Result<Timestamp, SqliteStoreError> {
    text.parse::<Timestamp>()
        .map_err(|error| SqliteStoreError::Corrupt(format!("invalid stored timestamp: {error}")))
}

/// Returns the stored text form of a status.
const fn status_text(status: SubmissionStatus) -> &'static str {
    match status {
        SubmissionStatus::Draft => "draft",
        SubmissionStatus::Published => "published",
    }
}

/// Parses a status from its stored text form.
fn status_from(text: &str) -> Result<SubmissionStatus, SqliteStoreError> {
    match text {
        "draft" => Ok(SubmissionStatus::Draft),
        "published" => Ok(SubmissionStatus::Published),
        other => Err(SqliteStoreError::Corrupt(format!("invalid stored status {other:?}"))),
    }
}

/// Converts a JSON leaf into a bind parameter for a typed column.
fn bind_value(column: &ColumnDef, value: Option<&Value>) -> Result<SqlValue, SqliteStoreError> {
    let Some(value) = value else {
        return Ok(SqlValue::Null);
    };
    if value.is_null() {
        return Ok(SqlValue::Null);
    }
    let mismatch = || {
        SqliteStoreError::Invalid(format!(
            "value for column {} does not match its declared type",
            column.name
        ))
    };
    match column.attribute_type {
        AttributeType::Bool => {
            value.as_bool().map(|flag| SqlValue::Integer(i64::from(flag))).ok_or_else(mismatch)
        }
        AttributeType::Int
        | AttributeType::Single
        | AttributeType::Form
        | AttributeType::Multiple => value.as_i64().map(SqlValue::Integer).ok_or_else(mismatch),
        AttributeType::Float => value.as_f64().map(SqlValue::Real).ok_or_else(mismatch),
        AttributeType::Text | AttributeType::Datetime => {
            value.as_str().map(|text| SqlValue::Text(text.to_owned())).ok_or_else(mismatch)
        }
    }
}

/// Converts a stored column value back into a JSON leaf.
fn value_from_sql(column: &ColumnDef, value: SqlValue) -> Result<Value, SqliteStoreError> {
    match (column.attribute_type, value) {
        (_, SqlValue::Null) => Ok(Value::Null),
        (AttributeType::Bool, SqlValue::Integer(raw)) => Ok(Value::Bool(raw != 0)),
        (
            AttributeType::Int
            | AttributeType::Single
            | AttributeType::Form
            | AttributeType::Multiple,
            SqlValue::Integer(raw),
        ) => Ok(Value::from(raw)),
        (AttributeType::Float, SqlValue::Real(raw)) => Ok(Value::from(raw)),
        (AttributeType::Float, SqlValue::Integer(raw)) => Ok(Value::from(raw)),
        (AttributeType::Text | AttributeType::Datetime, SqlValue::Text(text)) => {
            Ok(Value::String(text))
        }
        (_, other) => Err(SqliteStoreError::Corrupt(format!(
            "stored value for column {} has unexpected type {other:?}",
            column.name
        ))),
    }
}

// ============================================================================
// SECTION: Record Queries
// ============================================================================

/// Raw submission row as read from the database.
type RawSubmission = (
    i64,
    String,
    i64,
    i64,
    i64,
    Option<i64>,
    Option<String>,
    Option<String>,
    Option<String>,
    i64,
    i64,
    String,
);

/// Reads the fixed submission columns from a result row.
fn read_raw_submission(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawSubmission> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
        row.get(8)?,
        row.get(9)?,
        row.get(10)?,
        row.get(11)?,
    ))
}

/// Converts a raw submission row into a record.
fn submission_from_raw(raw: RawSubmission) -> Result<SubmissionRecord, SqliteStoreError> {
    let (
        id,
        name,
        revision,
        table_view_id,
        active,
        checked_out_by,
        checked_out_at,
        status,
        data_source,
        org_id,
        submitted_by,
        created_at,
    ) = raw;
    let checkout = match (checked_out_by, checked_out_at) {
        (Some(principal), Some(at)) => Some(Checkout {
            principal: u64::try_from(principal).ok().and_then(PrincipalId::from_raw).ok_or_else(
                || SqliteStoreError::Corrupt(format!("invalid checkout principal {principal}")),
            )?,
            at: timestamp_from(&at)?,
        }),
        (None, None) => None,
        _ => {
            return Err(SqliteStoreError::Corrupt(
                "checkout principal and time are out of sync".to_owned(),
            ));
        }
    };
    Ok(SubmissionRecord {
        id: submission_id_from(id)?,
        name: SubmissionName::from(name),
        revision: u32::try_from(revision)
            .map_err(|_| SqliteStoreError::Corrupt(format!("invalid revision number {revision}")))?,
        table_view_id: u64::try_from(table_view_id)
            .ok()
            .and_then(TableViewId::from_raw)
            .ok_or_else(|| {
                SqliteStoreError::Corrupt(format!("invalid table view identifier {table_view_id}"))
            })?,
        active: active != 0,
        checkout,
        status: status.as_deref().map(status_from).transpose()?,
        data_source,
        org_id: u64::try_from(org_id).ok().and_then(OrgId::from_raw).ok_or_else(|| {
            SqliteStoreError::Corrupt(format!("invalid organization identifier {org_id}"))
        })?,
        submitted_by: u64::try_from(submitted_by)
            .ok()
            .and_then(PrincipalId::from_raw)
            .ok_or_else(|| {
                SqliteStoreError::Corrupt(format!("invalid principal identifier {submitted_by}"))
            })?,
        created_at: timestamp_from(&created_at)?,
    })
}

/// Loads one submission record inside the current connection or transaction.
fn query_submission(
    connection: &Connection,
    id: SubmissionId,
) -> Result<Option<SubmissionRecord>, SqliteStoreError> {
    let raw = connection
        .query_row(
            &format!("SELECT {SUBMISSION_COLUMNS} FROM submissions WHERE id = ?1"),
            params![bind_raw(id.get())?],
            read_raw_submission,
        )
        .optional()?;
    raw.map(submission_from_raw).transpose()
}

/// Lists the revisions of a lineage, newest first.
fn query_lineage(
    connection: &Connection,
    name: &SubmissionName,
    filter: ActiveFilter,
) -> Result<Vec<SubmissionRecord>, SqliteStoreError> {
    let clause = match filter {
        ActiveFilter::Any => "",
        ActiveFilter::ActiveOnly => " AND active = 1",
        ActiveFilter::InactiveOnly => " AND active = 0",
    };
    let mut statement = connection.prepare(&format!(
        "SELECT {SUBMISSION_COLUMNS} FROM submissions \
         WHERE name = ?1{clause} ORDER BY revision DESC"
    ))?;
    let rows = statement.query_map(params![name.as_str()], read_raw_submission)?;
    let mut records = Vec::new();
    for raw in rows {
        records.push(submission_from_raw(raw?)?);
    }
    Ok(records)
}

/// Returns the identifier of revision 1 of a lineage, if present.
fn query_group_id(
    connection: &Connection,
    name: &SubmissionName,
) -> Result<Option<SubmissionId>, SqliteStoreError> {
    let raw: Option<i64> = connection
        .query_row(
            "SELECT id FROM submissions WHERE name = ?1 AND revision = 1",
            params![name.as_str()],
            |row| row.get(0),
        )
        .optional()?;
    raw.map(submission_id_from).transpose()
}

// ============================================================================
// SECTION: Form Row Persistence
// ============================================================================

/// Inserts every row of a row set under the owning submission.
fn insert_form_rows(
    connection: &Connection,
    registry: &SchemaRegistry,
    id: SubmissionId,
    rows: &FormRowSet,
) -> Result<(), SqliteStoreError> {
    for storage in rows.tables() {
        if !registry.tables().any(|table| table.storage_name() == storage) {
            return Err(SqliteStoreError::Invalid(format!(
                "row set references unknown table {storage}"
            )));
        }
    }
    let obj_id = bind_raw(id.get())?;
    for table in registry.tables() {
        let storage = table.storage_name();
        let table_rows = rows.table_rows(&storage);
        if table_rows.is_empty() {
            continue;
        }
        let column_names: Vec<String> =
            table.columns.iter().map(|column| format!("\"{}\"", column.name)).collect();
        let placeholders: Vec<String> =
            (1..=table.columns.len() + 2).map(|index| format!("?{index}")).collect();
        let mut statement = connection.prepare(&format!(
            "INSERT INTO \"{storage}\" (obj_id, link_id, {}) VALUES ({})",
            column_names.join(", "),
            placeholders.join(", ")
        ))?;
        for row in table_rows {
            let link_id = row.link_id.map(bind_raw).transpose()?;
            let mut bindings = Vec::with_capacity(table.columns.len() + 2);
            bindings.push(SqlValue::Integer(obj_id));
            bindings.push(link_id.map_or(SqlValue::Null, SqlValue::Integer));
            for column in &table.columns {
                bindings.push(bind_value(column, row.values.get(&column.name))?);
            }
            statement.execute(params_from_iter(bindings))?;
        }
    }
    Ok(())
}

/// Deletes every dynamic-table row owned by a submission.
fn delete_form_rows(
    connection: &Connection,
    registry: &SchemaRegistry,
    id: SubmissionId,
) -> Result<(), SqliteStoreError> {
    let obj_id = bind_raw(id.get())?;
    for table in registry.tables() {
        connection.execute(
            &format!("DELETE FROM \"{}\" WHERE obj_id = ?1", table.storage_name()),
            params![obj_id],
        )?;
    }
    Ok(())
}

/// Loads every dynamic-table row owned by a submission.
fn query_form_rows(
    connection: &Connection,
    registry: &SchemaRegistry,
    id: SubmissionId,
) -> Result<FormRowSet, SqliteStoreError> {
    let obj_id = bind_raw(id.get())?;
    let mut rows = FormRowSet::new();
    for table in registry.tables() {
        let storage = table.storage_name();
        let column_names: Vec<String> =
            table.columns.iter().map(|column| format!("\"{}\"", column.name)).collect();
        let mut statement = connection.prepare(&format!(
            "SELECT row_id, link_id, {} FROM \"{storage}\" \
             WHERE obj_id = ?1 ORDER BY row_id",
            column_names.join(", ")
        ))?;
        let mapped = statement.query_map(params![obj_id], |row| {
            let row_id: i64 = row.get(0)?;
            let link_id: Option<i64> = row.get(1)?;
            let mut values = Vec::with_capacity(table.columns.len());
            for index in 0..table.columns.len() {
                values.push(row.get::<_, SqlValue>(index + 2)?);
            }
            Ok((row_id, link_id, values))
        })?;
        for entry in mapped {
            let (row_id, link_id, values) = entry?;
            let mut form_row = FormRow::new(
                link_id
                    .map(|raw| {
                        u64::try_from(raw).map_err(|_| {
                            SqliteStoreError::Corrupt(format!("invalid link identifier {raw}"))
                        })
                    })
                    .transpose()?,
            );
            form_row.id = u64::try_from(row_id).ok().and_then(RowId::from_raw);
            for (column, value) in table.columns.iter().zip(values) {
                let leaf = value_from_sql(column, value)?;
                if !leaf.is_null() {
                    form_row.values.insert(column.name.clone(), leaf);
                }
            }
            rows.push(storage.clone(), form_row);
        }
    }
    Ok(rows)
}

// ============================================================================
// SECTION: Restatement and Aggregate Persistence
// ============================================================================

/// Inserts restatements under the given submission and group identifiers.
fn insert_restatements(
    connection: &Connection,
    submission_id: SubmissionId,
    group_id: SubmissionId,
    restatements: &[NewRestatement],
) -> Result<(), SqliteStoreError> {
    if restatements.is_empty() {
        return Ok(());
    }
    let mut statement = connection.prepare(
        "INSERT INTO restatements (submission_id, group_id, attribute_path, \
         previous_value, data_source, reported_at, reason) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
    )?;
    for restatement in restatements {
        let previous = serde_json::to_string(&restatement.previous_value).map_err(|error| {
            SqliteStoreError::Invalid(format!("unserializable previous value: {error}"))
        })?;
        statement.execute(params![
            bind_raw(submission_id.get())?,
            bind_raw(group_id.get())?,
            restatement.attribute_path.to_string(),
            previous,
            restatement.data_source,
            timestamp_text(restatement.reported_at),
            restatement.reason,
        ])?;
    }
    Ok(())
}

/// Writes the aggregate snapshot with its canonical digest.
fn upsert_aggregate(
    connection: &Connection,
    id: SubmissionId,
    data: &Value,
) -> Result<(), SqliteStoreError> {
    let text = serde_json::to_string(data).map_err(|error| {
        SqliteStoreError::Invalid(format!("unserializable aggregate: {error}"))
    })?;
    let digest = hash_value(data)
        .map_err(|error| SqliteStoreError::Invalid(format!("unhashable aggregate: {error}")))?;
    connection.execute(
        "INSERT INTO aggregates (submission_id, data_json, data_hash) \
         VALUES (?1, ?2, ?3) \
         ON CONFLICT (submission_id) DO UPDATE SET \
         data_json = excluded.data_json, data_hash = excluded.data_hash",
        params![bind_raw(id.get())?, text, digest],
    )?;
    Ok(())
}

// ============================================================================
// SECTION: Inner Operations
// ============================================================================

impl SqliteSubmissionStore {
    /// Creates revision 1 of a new lineage inside one transaction.
    fn create_submission_inner(
        &self,
        new: NewSubmission,
    ) -> Result<SubmissionRecord, SqliteStoreError> {
        let mut guard = self.lock()?;
        let tx = guard.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let existing: i64 = tx.query_row(
            "SELECT COUNT(*) FROM submissions WHERE name = ?1",
            params![new.name.as_str()],
            |row| row.get(0),
        )?;
        if existing > 0 {
            return Err(SqliteStoreError::Conflict(format!(
                "submission name {} already exists",
                new.name
            )));
        }
        tx.execute(
            "INSERT INTO submissions (name, revision, table_view_id, active, \
             status, data_source, org_id, submitted_by, created_at) \
             VALUES (?1, 1, ?2, 1, ?3, ?4, ?5, ?6, ?7)",
            params![
                new.name.as_str(),
                bind_raw(new.table_view_id.get())?,
                status_text(SubmissionStatus::Draft),
                new.data_source,
                bind_raw(new.org_id.get())?,
                bind_raw(new.submitted_by.get())?,
                timestamp_text(new.created_at),
            ],
        )?;
        let id = submission_id_from(tx.last_insert_rowid())?;
        insert_form_rows(&tx, &self.registry, id, &new.rows)?;
        upsert_aggregate(&tx, id, &new.aggregate)?;
        let record = query_submission(&tx, id)?
            .ok_or_else(|| SqliteStoreError::Db(format!("submission {id} vanished mid-insert")))?;
        tx.commit()?;
        Ok(record)
    }

    /// Commits an edited revision inside one transaction.
    fn commit_revision_inner(
        &self,
        commit: CommitRevision,
    ) -> Result<SubmissionRecord, SqliteStoreError> {
        let mut guard = self.lock()?;
        let tx = guard.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let lineage = query_lineage(&tx, &commit.name, ActiveFilter::Any)?;
        let Some(latest) = lineage.first() else {
            return Err(SqliteStoreError::NotFound(format!("submission {}", commit.name)));
        };
        let target = match commit.mode {
            CommitMode::NewRevision => {
                let template = latest.clone();
                tx.execute(
                    "UPDATE submissions SET active = 0, \
                     checked_out_by = NULL, checked_out_at = NULL WHERE name = ?1",
                    params![commit.name.as_str()],
                )?;
                tx.execute(
                    "INSERT INTO submissions (name, revision, table_view_id, \
                     active, checked_out_by, checked_out_at, status, \
                     data_source, org_id, submitted_by, created_at) \
                     VALUES (?1, ?2, ?3, 1, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                    params![
                        commit.name.as_str(),
                        template.revision + 1,
                        bind_raw(template.table_view_id.get())?,
                        bind_raw(commit.author.get())?,
                        timestamp_text(commit.created_at),
                        status_text(commit.status),
                        commit.data_source,
                        bind_raw(template.org_id.get())?,
                        bind_raw(commit.author.get())?,
                        timestamp_text(commit.created_at),
                    ],
                )?;
                submission_id_from(tx.last_insert_rowid())?
            }
            CommitMode::OverwriteDraft { submission_id } => {
                let existing = query_submission(&tx, submission_id)?.ok_or_else(|| {
                    SqliteStoreError::NotFound(format!("submission {submission_id}"))
                })?;
                if existing.name != commit.name {
                    return Err(SqliteStoreError::Invalid(
                        "draft overwrite target belongs to a different lineage".to_owned(),
                    ));
                }
                tx.execute(
                    "UPDATE submissions SET status = ?1, data_source = ?2 WHERE id = ?3",
                    params![
                        status_text(commit.status),
                        commit.data_source,
                        bind_raw(submission_id.get())?,
                    ],
                )?;
                delete_form_rows(&tx, &self.registry, submission_id)?;
                submission_id
            }
        };
        let group_id = query_group_id(&tx, &commit.name)?.unwrap_or(target);
        insert_form_rows(&tx, &self.registry, target, &commit.rows)?;
        insert_restatements(&tx, target, group_id, &commit.restatements)?;
        upsert_aggregate(&tx, target, &commit.aggregate)?;
        let record = query_submission(&tx, target)?.ok_or_else(|| {
            SqliteStoreError::Db(format!("submission {target} vanished mid-commit"))
        })?;
        tx.commit()?;
        Ok(record)
    }

    /// Deletes one revision and promotes a successor when needed.
    fn delete_revision_inner(
        &self,
        id: SubmissionId,
    ) -> Result<RevisionDeletion, SqliteStoreError> {
        let mut guard = self.lock()?;
        let tx = guard.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let deleted = query_submission(&tx, id)?
            .ok_or_else(|| SqliteStoreError::NotFound(format!("submission {id}")))?;
        tx.execute("DELETE FROM submissions WHERE id = ?1", params![bind_raw(id.get())?])?;
        let mut promoted = None;
        if deleted.active
            && let Some(candidate) = query_lineage(&tx, &deleted.name, ActiveFilter::Any)?
                .into_iter()
                .next()
        {
            tx.execute(
                "UPDATE submissions SET active = 1 WHERE id = ?1",
                params![bind_raw(candidate.id.get())?],
            )?;
            promoted = query_submission(&tx, candidate.id)?;
        }
        tx.commit()?;
        Ok(RevisionDeletion { deleted, promoted })
    }

    /// Deletes every revision of a lineage, returning the count removed.
    fn delete_all_inner(&self, name: &SubmissionName) -> Result<u64, SqliteStoreError> {
        let mut guard = self.lock()?;
        let tx = guard.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let count = tx.execute("DELETE FROM submissions WHERE name = ?1", params![name.as_str()])?;
        tx.commit()?;
        Ok(u64::try_from(count).unwrap_or(u64::MAX))
    }
}

// ============================================================================
// SECTION: Store Contract
// ============================================================================

impl SubmissionStore for SqliteSubmissionStore {
    fn list_revisions(
        &self,
        name: &SubmissionName,
        filter: ActiveFilter,
    ) -> Result<Vec<SubmissionRecord>, StoreError> {
        let guard = self.lock()?;
        Ok(query_lineage(&guard, name, filter)?)
    }

    fn load_submission(&self, id: SubmissionId) -> Result<Option<SubmissionRecord>, StoreError> {
        let guard = self.lock()?;
        Ok(query_submission(&guard, id)?)
    }

    fn load_form_rows(&self, id: SubmissionId) -> Result<FormRowSet, StoreError> {
        let guard = self.lock()?;
        if query_submission(&guard, id)?.is_none() {
            return Err(StoreError::NotFound(format!("submission {id}")));
        }
        Ok(query_form_rows(&guard, &self.registry, id)?)
    }

    fn create_submission(&self, new: NewSubmission) -> Result<SubmissionRecord, StoreError> {
        Ok(self.create_submission_inner(new)?)
    }

    fn commit_revision(&self, commit: CommitRevision) -> Result<SubmissionRecord, StoreError> {
        Ok(self.commit_revision_inner(commit)?)
    }

    fn set_status(
        &self,
        id: SubmissionId,
        status: SubmissionStatus,
    ) -> Result<SubmissionRecord, StoreError> {
        let guard = self.lock()?;
        let changed = guard
            .execute(
                "UPDATE submissions SET status = ?1 WHERE id = ?2",
                params![status_text(status), bind_raw(id.get())?],
            )
            .map_err(SqliteStoreError::from)?;
        if changed == 0 {
            return Err(StoreError::NotFound(format!("submission {id}")));
        }
        query_submission(&guard, id)?
            .ok_or_else(|| StoreError::NotFound(format!("submission {id}")))
    }

    fn set_checkout(
        &self,
        id: SubmissionId,
        checkout: Option<Checkout>,
    ) -> Result<SubmissionRecord, StoreError> {
        let guard = self.lock()?;
        let (principal, at) = match checkout {
            Some(checkout) => (
                Some(bind_raw(checkout.principal.get())?),
                Some(timestamp_text(checkout.at)),
            ),
            None => (None, None),
        };
        let changed = guard
            .execute(
                "UPDATE submissions SET checked_out_by = ?1, checked_out_at = ?2 \
                 WHERE id = ?3",
                params![principal, at, bind_raw(id.get())?],
            )
            .map_err(SqliteStoreError::from)?;
        if changed == 0 {
            return Err(StoreError::NotFound(format!("submission {id}")));
        }
        query_submission(&guard, id)?
            .ok_or_else(|| StoreError::NotFound(format!("submission {id}")))
    }

    fn swap_active(
        &self,
        deactivate: SubmissionId,
        activate: SubmissionId,
    ) -> Result<(), StoreError> {
        let mut guard = self.lock()?;
        let tx = guard
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(SqliteStoreError::from)?;
        let deactivated = tx
            .execute(
                "UPDATE submissions SET active = 0 WHERE id = ?1",
                params![bind_raw(deactivate.get())?],
            )
            .map_err(SqliteStoreError::from)?;
        if deactivated == 0 {
            return Err(StoreError::NotFound(format!("submission {deactivate}")));
        }
        let activated = tx
            .execute(
                "UPDATE submissions SET active = 1 WHERE id = ?1",
                params![bind_raw(activate.get())?],
            )
            .map_err(SqliteStoreError::from)?;
        if activated == 0 {
            return Err(StoreError::NotFound(format!("submission {activate}")));
        }
        tx.commit().map_err(SqliteStoreError::from)?;
        Ok(())
    }

    fn delete_revision(&self, id: SubmissionId) -> Result<RevisionDeletion, StoreError> {
        Ok(self.delete_revision_inner(id)?)
    }

    fn delete_all(&self, name: &SubmissionName) -> Result<u64, StoreError> {
        Ok(self.delete_all_inner(name)?)
    }

    fn list_restatements(
        &self,
        group_id: SubmissionId,
    ) -> Result<Vec<RestatementRecord>, StoreError> {
        let guard = self.lock()?;
        let mut statement = guard
            .prepare(
                "SELECT submission_id, group_id, attribute_path, previous_value, \
                 data_source, reported_at, reason \
                 FROM restatements WHERE group_id = ?1 ORDER BY id",
            )
            .map_err(SqliteStoreError::from)?;
        let rows = statement
            .query_map(params![bind_raw(group_id.get())?], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, Option<String>>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, Option<String>>(6)?,
                ))
            })
            .map_err(SqliteStoreError::from)?;
        let mut records = Vec::new();
        for row in rows {
            let (submission, group, path, previous, data_source, reported_at, reason) =
                row.map_err(SqliteStoreError::from)?;
            records.push(RestatementRecord {
                submission_id: submission_id_from(submission)?,
                group_id: submission_id_from(group)?,
                attribute_path: path.parse::<AttributePath>().map_err(|error| {
                    SqliteStoreError::Corrupt(format!("invalid stored path: {error}"))
                })?,
                previous_value: serde_json::from_str(&previous).map_err(|error| {
                    SqliteStoreError::Corrupt(format!("invalid stored previous value: {error}"))
                })?,
                data_source,
                reported_at: timestamp_from(&reported_at)?,
                reason,
            });
        }
        Ok(records)
    }

    fn save_aggregate(&self, id: SubmissionId, data: &Value) -> Result<(), StoreError> {
        let guard = self.lock()?;
        if query_submission(&guard, id)?.is_none() {
            return Err(StoreError::NotFound(format!("submission {id}")));
        }
        Ok(upsert_aggregate(&guard, id, data)?)
    }

    fn load_aggregate(&self, id: SubmissionId) -> Result<Option<Value>, StoreError> {
        let guard = self.lock()?;
        let stored: Option<(String, String)> = guard
            .query_row(
                "SELECT data_json, data_hash FROM aggregates WHERE submission_id = ?1",
                params![bind_raw(id.get())?],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(SqliteStoreError::from)?;
        let Some((text, recorded)) = stored else {
            return Ok(None);
        };
        let data: Value = serde_json::from_str(&text).map_err(|error| {
            SqliteStoreError::Corrupt(format!("invalid stored aggregate: {error}"))
        })?;
        let digest = hash_value(&data)
            .map_err(|error| SqliteStoreError::Corrupt(format!("unhashable aggregate: {error}")))?;
        if digest != recorded {
            return Err(StoreError::Corrupt(format!(
                "aggregate digest mismatch for submission {id}"
            )));
        }
        Ok(Some(data))
    }

    fn readiness(&self) -> Result<(), StoreError> {
        let guard = self.lock()?;
        guard
            .query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
            .map_err(SqliteStoreError::from)?;
        Ok(())
    }
}

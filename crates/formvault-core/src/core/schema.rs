// crates/formvault-core/src/core/schema.rs
// ============================================================================
// Module: Formvault Schema Registry
// Description: Typed metadata for dynamic form tables, columns, and choices.
// Purpose: Validate schema definitions once and serve batched lookups to the runtime.
// Dependencies: crate::core::identifiers, serde, thiserror
// ============================================================================

//! ## Overview
//! The schema registry holds the dynamic form metadata as validated data:
//! table definitions, their columns, choice sets, and the table views that map
//! public form surfaces to root tables. Construction validates the whole
//! graph (name uniqueness, resolvable sub-form references, nesting depth) so
//! the projection and composition paths can rely on infallible lookups and
//! never issue per-attribute metadata queries.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::core::identifiers::ChoiceId;
use crate::core::identifiers::ChoiceSetId;
use crate::core::identifiers::ColumnDefId;
use crate::core::identifiers::TableDefId;
use crate::core::identifiers::TableViewId;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum sub-form nesting depth below a root table.
pub const MAX_SUBFORM_DEPTH: usize = 3;

/// Storage-name suffix for heritable tables.
pub const HERITABLE_SUFFIX: &str = "_heritable";

/// Sentinel choice display value that routes unit resolution to the
/// free-text `<attribute>_other` column.
pub const OTHER_NOT_LISTED: &str = "Other not listed";

/// Column-name suffix holding free-text values for "other" choices.
pub const OTHER_COLUMN_SUFFIX: &str = "_other";

// ============================================================================
// SECTION: Attribute Types
// ============================================================================

/// Value type of a dynamic form column.
///
/// # Invariants
/// - Variants are stable for programmatic handling and wire forms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeType {
    /// Boolean value.
    Bool,
    /// Integer value.
    Int,
    /// Floating-point value.
    Float,
    /// Free text value.
    Text,
    /// RFC3339 date-time text value.
    Datetime,
    /// Single-select choice; stores a choice identifier.
    Single,
    /// Nested repeatable sub-form; stores a link counter matched by child rows.
    Form,
    /// Multi-select rendered through a sub-form of one-choice rows.
    Multiple,
}

impl AttributeType {
    /// Returns true when the column links to a sub-form table.
    #[must_use]
    pub const fn links_subform(self) -> bool {
        matches!(self, Self::Form | Self::Multiple)
    }
}

// ============================================================================
// SECTION: Definitions
// ============================================================================

/// Column definition inside a table definition.
///
/// # Invariants
/// - `subform` is present exactly when `attribute_type` links a sub-form.
/// - `choice_set` is present for `Single` and `Multiple` columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDef {
    /// Column definition identifier.
    pub id: ColumnDefId,
    /// Column name, unique within its table.
    pub name: String,
    /// Value type of the column.
    pub attribute_type: AttributeType,
    /// Target table for sub-form columns.
    pub subform: Option<TableDefId>,
    /// Choice set for choice-coded columns.
    pub choice_set: Option<ChoiceSetId>,
    /// Optional unit expression (literal or `{attribute}` tokens).
    pub unit: Option<String>,
}

/// Table definition for one dynamic form table.
///
/// # Invariants
/// - Column names are unique within the table.
/// - Heritable tables store rows for many parents and carry the
///   [`HERITABLE_SUFFIX`] storage name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDef {
    /// Table definition identifier.
    pub id: TableDefId,
    /// Table name, unique in the registry.
    pub name: String,
    /// Whether the table stores rows for many parent submissions.
    pub heritable: bool,
    /// Ordered column definitions.
    pub columns: Vec<ColumnDef>,
}

impl TableDef {
    /// Returns the physical storage table name.
    #[must_use]
    pub fn storage_name(&self) -> String {
        if self.heritable {
            format!("{}{HERITABLE_SUFFIX}", self.name)
        } else {
            self.name.clone()
        }
    }

    /// Returns the column definition with the given name, if any.
    #[must_use]
    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|column| column.name == name)
    }
}

/// One selectable option inside a choice set.
///
/// # Invariants
/// - `(set_id, value)` pairs are unique in the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChoiceDef {
    /// Choice identifier.
    pub choice_id: ChoiceId,
    /// Owning choice set.
    pub set_id: ChoiceSetId,
    /// Display value presented in projected trees.
    pub value: String,
}

/// Mapping from a public table view to its root table definition.
///
/// # Invariants
/// - `table_def_id` resolves to a registered, non-heritable table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableView {
    /// Table view identifier.
    pub id: TableViewId,
    /// Root table definition backing the view.
    pub table_def_id: TableDefId,
}

// ============================================================================
// SECTION: Schema Errors
// ============================================================================

/// Schema registry construction errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchemaError {
    /// A table name or identifier is duplicated.
    #[error("duplicate table definition: {name}")]
    DuplicateTable {
        /// Offending table name.
        name: String,
    },
    /// A column name is duplicated within a table.
    #[error("duplicate column {column} in table {table}")]
    DuplicateColumn {
        /// Owning table name.
        table: String,
        /// Offending column name.
        column: String,
    },
    /// A table or column name is not a valid storage identifier.
    #[error("invalid identifier name: {name}")]
    InvalidName {
        /// Offending name.
        name: String,
    },
    /// A sub-form column references an unknown table.
    #[error("column {column} in table {table} references an unknown sub-form table")]
    UnknownSubform {
        /// Owning table name.
        table: String,
        /// Offending column name.
        column: String,
    },
    /// A sub-form column is missing its target table reference.
    #[error("column {column} in table {table} requires a sub-form reference")]
    MissingSubform {
        /// Owning table name.
        table: String,
        /// Offending column name.
        column: String,
    },
    /// A multi-select sub-form table does not carry the selection column.
    #[error("sub-form table of column {column} in table {table} must define a same-named column")]
    MissingSelectionColumn {
        /// Owning table name.
        table: String,
        /// Offending column name.
        column: String,
    },
    /// A choice-coded column is missing its choice set.
    #[error("column {column} in table {table} requires a choice set")]
    MissingChoiceSet {
        /// Owning table name.
        table: String,
        /// Offending column name.
        column: String,
    },
    /// A choice value is duplicated within its set.
    #[error("duplicate choice value {value} in set {set_id}")]
    DuplicateChoice {
        /// Owning choice set identifier.
        set_id: ChoiceSetId,
        /// Offending display value.
        value: String,
    },
    /// A view references an unknown or heritable root table.
    #[error("table view {view} does not resolve to a registered root table")]
    InvalidViewRoot {
        /// Offending view identifier.
        view: TableViewId,
    },
    /// Sub-form nesting exceeds [`MAX_SUBFORM_DEPTH`] or forms a cycle.
    #[error("sub-form nesting below table {table} exceeds the supported depth")]
    DepthExceeded {
        /// Root table where the violation was detected.
        table: String,
    },
}

// ============================================================================
// SECTION: Schema Registry
// ============================================================================

/// Validated, immutable dynamic-form schema.
///
/// # Invariants
/// - Every lookup map is consistent with the validated definitions.
/// - Sub-form graphs are acyclic and at most [`MAX_SUBFORM_DEPTH`] deep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaRegistry {
    /// Table definitions by identifier.
    tables: BTreeMap<TableDefId, TableDef>,
    /// Table identifiers by table name.
    tables_by_name: BTreeMap<String, TableDefId>,
    /// Root table identifiers by view identifier.
    views: BTreeMap<TableViewId, TableDefId>,
    /// Choice display values by choice identifier.
    choices_by_id: BTreeMap<ChoiceId, ChoiceDef>,
    /// Choice identifiers by owning set and display value.
    choices_by_value: BTreeMap<(ChoiceSetId, String), ChoiceId>,
}

impl SchemaRegistry {
    /// Builds a registry from raw definitions, validating the whole graph.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError`] when names collide, references do not resolve,
    /// or sub-form nesting is cyclic or deeper than [`MAX_SUBFORM_DEPTH`].
    pub fn new(
        tables: Vec<TableDef>,
        views: Vec<TableView>,
        choices: Vec<ChoiceDef>,
    ) -> Result<Self, SchemaError> {
        let mut table_map = BTreeMap::new();
        let mut by_name = BTreeMap::new();
        for table in tables {
            validate_identifier(&table.name)?;
            validate_columns(&table)?;
            if by_name.insert(table.name.clone(), table.id).is_some()
                || table_map.contains_key(&table.id)
            {
                return Err(SchemaError::DuplicateTable { name: table.name });
            }
            table_map.insert(table.id, table);
        }

        for table in table_map.values() {
            for column in &table.columns {
                if column.attribute_type.links_subform() {
                    let Some(subform) = column.subform else {
                        return Err(SchemaError::MissingSubform {
                            table: table.name.clone(),
                            column: column.name.clone(),
                        });
                    };
                    if !table_map.contains_key(&subform) {
                        return Err(SchemaError::UnknownSubform {
                            table: table.name.clone(),
                            column: column.name.clone(),
                        });
                    }
                }
                if matches!(column.attribute_type, AttributeType::Single | AttributeType::Multiple)
                    && column.choice_set.is_none()
                {
                    return Err(SchemaError::MissingChoiceSet {
                        table: table.name.clone(),
                        column: column.name.clone(),
                    });
                }
                if column.attribute_type == AttributeType::Multiple {
                    let carries_choice_column = column
                        .subform
                        .and_then(|subform| table_map.get(&subform))
                        .is_some_and(|subtable| subtable.column(&column.name).is_some());
                    if !carries_choice_column {
                        return Err(SchemaError::MissingSelectionColumn {
                            table: table.name.clone(),
                            column: column.name.clone(),
                        });
                    }
                }
            }
        }

        let mut view_map = BTreeMap::new();
        for view in views {
            let valid = table_map.get(&view.table_def_id).is_some_and(|table| !table.heritable);
            if !valid {
                return Err(SchemaError::InvalidViewRoot { view: view.id });
            }
            view_map.insert(view.id, view.table_def_id);
        }

        for root in view_map.values() {
            check_depth(&table_map, *root, 0, &mut BTreeSet::new())?;
        }

        let mut choices_by_id = BTreeMap::new();
        let mut choices_by_value = BTreeMap::new();
        for choice in choices {
            let key = (choice.set_id, choice.value.clone());
            if choices_by_value.insert(key, choice.choice_id).is_some() {
                return Err(SchemaError::DuplicateChoice {
                    set_id: choice.set_id,
                    value: choice.value,
                });
            }
            choices_by_id.insert(choice.choice_id, choice);
        }

        Ok(Self {
            tables: table_map,
            tables_by_name: by_name,
            views: view_map,
            choices_by_id,
            choices_by_value,
        })
    }

    /// Returns the table definition for an identifier.
    #[must_use]
    pub fn table(&self, id: TableDefId) -> Option<&TableDef> {
        self.tables.get(&id)
    }

    /// Returns the table definition with the given name.
    #[must_use]
    pub fn table_by_name(&self, name: &str) -> Option<&TableDef> {
        self.tables_by_name.get(name).and_then(|id| self.tables.get(id))
    }

    /// Returns the root table backing a table view.
    #[must_use]
    pub fn view_root(&self, view: TableViewId) -> Option<&TableDef> {
        self.views.get(&view).and_then(|id| self.tables.get(id))
    }

    /// Returns every registered table definition.
    pub fn tables(&self) -> impl Iterator<Item = &TableDef> {
        self.tables.values()
    }

    /// Returns the display value for a choice identifier.
    #[must_use]
    pub fn choice_value(&self, id: ChoiceId) -> Option<&str> {
        self.choices_by_id.get(&id).map(|choice| choice.value.as_str())
    }

    /// Returns the choice identifier for a display value within a set.
    #[must_use]
    pub fn choice_id(&self, set_id: ChoiceSetId, value: &str) -> Option<ChoiceId> {
        self.choices_by_value.get(&(set_id, value.to_owned())).copied()
    }
}

// ============================================================================
// SECTION: Validation Helpers
// ============================================================================

/// Validates that a name is a safe storage identifier.
fn validate_identifier(name: &str) -> Result<(), SchemaError> {
    let mut chars = name.chars();
    let valid_head = chars.next().is_some_and(|c| c.is_ascii_lowercase() || c == '_');
    let valid_tail = chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
    if valid_head && valid_tail {
        Ok(())
    } else {
        Err(SchemaError::InvalidName { name: name.to_owned() })
    }
}

/// Validates column names within a table for uniqueness and identifier safety.
fn validate_columns(table: &TableDef) -> Result<(), SchemaError> {
    let mut seen = BTreeSet::new();
    for column in &table.columns {
        validate_identifier(&column.name)?;
        if !seen.insert(column.name.as_str()) {
            return Err(SchemaError::DuplicateColumn {
                table: table.name.clone(),
                column: column.name.clone(),
            });
        }
    }
    Ok(())
}

/// Walks the sub-form graph enforcing the depth cap and rejecting cycles.
fn check_depth(
    tables: &BTreeMap<TableDefId, TableDef>,
    table_id: TableDefId,
    depth: usize,
    visiting: &mut BTreeSet<TableDefId>,
) -> Result<(), SchemaError> {
    let Some(table) = tables.get(&table_id) else {
        return Ok(());
    };
    if depth > MAX_SUBFORM_DEPTH || !visiting.insert(table_id) {
        return Err(SchemaError::DepthExceeded { table: table.name.clone() });
    }
    for column in &table.columns {
        if let Some(subform) = column.subform
            && column.attribute_type.links_subform()
        {
            check_depth(tables, subform, depth + 1, visiting)?;
        }
    }
    visiting.remove(&table_id);
    Ok(())
}

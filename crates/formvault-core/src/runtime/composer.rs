// crates/formvault-core/src/runtime/composer.rs
// ============================================================================
// Module: Formvault Value Composition
// Description: Decomposes nested value trees into typed dynamic-table rows.
// Purpose: Provide the write-side inverse of projection, shared by all stores.
// Dependencies: crate::core, serde_json, time
// ============================================================================

//! ## Overview
//! Composition is the inverse of projection: it validates a nested value
//! tree against the schema registry and flattens it into dynamic-table rows
//! with allocated parent links. Unknown attributes and type mismatches are
//! rejected before any write happens, so a store never persists a partially
//! valid tree.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde_json::Value;
use thiserror::Error;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::core::identifiers::TableViewId;
use crate::core::schema::AttributeType;
use crate::core::schema::ColumnDef;
use crate::core::schema::SchemaRegistry;
use crate::core::schema::TableDef;
use crate::core::submission::FormRow;
use crate::core::submission::FormRowSet;

// ============================================================================
// SECTION: Composition Errors
// ============================================================================

/// Composition errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ComposeError {
    /// The table view is not registered.
    #[error("unknown table view: {view}")]
    UnknownView {
        /// Offending view identifier.
        view: TableViewId,
    },
    /// The tree is not an object where a form row was expected.
    #[error("expected an object for table {table}")]
    NotAnObject {
        /// Table whose row was malformed.
        table: String,
    },
    /// The tree carries an attribute the table does not define.
    #[error("unknown attribute {attribute} in table {table}")]
    UnknownAttribute {
        /// Owning table name.
        table: String,
        /// Offending attribute name.
        attribute: String,
    },
    /// A leaf value does not match its column type.
    #[error("attribute {attribute} in table {table} expects {expected}")]
    TypeMismatch {
        /// Owning table name.
        table: String,
        /// Offending attribute name.
        attribute: String,
        /// Expected value description.
        expected: &'static str,
    },
    /// A choice display value is not registered in the column's set.
    #[error("attribute {attribute} has unknown choice value {value}")]
    UnknownChoice {
        /// Offending attribute name.
        attribute: String,
        /// Unrecognized display value.
        value: String,
    },
    /// A sub-form column does not resolve to a registered table.
    #[error("sub-form column {column} does not resolve to a table")]
    UnknownSubform {
        /// Offending column name.
        column: String,
    },
}

// ============================================================================
// SECTION: Composer
// ============================================================================

/// Monotonic allocator for parent-link counters within one row set.
#[derive(Debug, Default)]
struct LinkAllocator {
    /// Next counter value to hand out.
    next: u64,
}

impl LinkAllocator {
    /// Allocates the next parent-link counter (1-based).
    fn allocate(&mut self) -> u64 {
        self.next += 1;
        self.next
    }
}

/// Decomposes a nested value tree into typed dynamic-table rows.
///
/// # Errors
///
/// Returns [`ComposeError`] when the tree does not validate against the
/// registry; nothing is emitted on failure.
pub fn compose(
    registry: &SchemaRegistry,
    view: TableViewId,
    tree: &Value,
) -> Result<FormRowSet, ComposeError> {
    let root = registry.view_root(view).ok_or(ComposeError::UnknownView { view })?;
    let mut rows = FormRowSet::new();
    let mut allocator = LinkAllocator::default();
    compose_row(registry, root, tree, None, &mut rows, &mut allocator)?;
    Ok(rows)
}

/// Composes one object of the tree into a row of the given table.
fn compose_row(
    registry: &SchemaRegistry,
    table: &TableDef,
    value: &Value,
    link_id: Option<u64>,
    rows: &mut FormRowSet,
    allocator: &mut LinkAllocator,
) -> Result<(), ComposeError> {
    let Value::Object(fields) = value else {
        return Err(ComposeError::NotAnObject { table: table.name.clone() });
    };

    let mut row = FormRow::new(link_id);
    for (attribute, leaf) in fields {
        let Some(column) = table.column(attribute) else {
            return Err(ComposeError::UnknownAttribute {
                table: table.name.clone(),
                attribute: attribute.clone(),
            });
        };
        let stored = match column.attribute_type {
            AttributeType::Bool
            | AttributeType::Int
            | AttributeType::Float
            | AttributeType::Text
            | AttributeType::Datetime => {
                validate_scalar(table, column, leaf)?;
                leaf.clone()
            }
            AttributeType::Single => encode_choice(registry, table, column, leaf)?,
            AttributeType::Form => {
                compose_subform(registry, column, leaf, rows, allocator)?
            }
            AttributeType::Multiple => {
                compose_selections(registry, column, leaf, rows, allocator)?
            }
        };
        row.values.insert(attribute.clone(), stored);
    }
    rows.push(table.storage_name(), row);
    Ok(())
}

/// Validates a scalar leaf against its column type.
fn validate_scalar(
    table: &TableDef,
    column: &ColumnDef,
    leaf: &Value,
) -> Result<(), ComposeError> {
    let mismatch = |expected: &'static str| ComposeError::TypeMismatch {
        table: table.name.clone(),
        attribute: column.name.clone(),
        expected,
    };
    if leaf.is_null() {
        return Ok(());
    }
    match column.attribute_type {
        AttributeType::Bool if !leaf.is_boolean() => Err(mismatch("a boolean")),
        AttributeType::Int if !leaf.is_i64() && !leaf.is_u64() => Err(mismatch("an integer")),
        AttributeType::Float if !leaf.is_number() => Err(mismatch("a number")),
        AttributeType::Text if !leaf.is_string() => Err(mismatch("a string")),
        AttributeType::Datetime => {
            let valid = leaf
                .as_str()
                .is_some_and(|text| OffsetDateTime::parse(text, &Rfc3339).is_ok());
            if valid { Ok(()) } else { Err(mismatch("an RFC3339 date-time string")) }
        }
        _ => Ok(()),
    }
}

/// Encodes a single-select display value as its choice identifier.
fn encode_choice(
    registry: &SchemaRegistry,
    table: &TableDef,
    column: &ColumnDef,
    leaf: &Value,
) -> Result<Value, ComposeError> {
    if leaf.is_null() {
        return Ok(Value::Null);
    }
    let Some(display) = leaf.as_str() else {
        return Err(ComposeError::TypeMismatch {
            table: table.name.clone(),
            attribute: column.name.clone(),
            expected: "a choice display string",
        });
    };
    let choice = column
        .choice_set
        .and_then(|set| registry.choice_id(set, display))
        .ok_or_else(|| ComposeError::UnknownChoice {
            attribute: column.name.clone(),
            value: display.to_owned(),
        })?;
    Ok(Value::from(choice.get()))
}

/// Composes a nested form list, returning the allocated parent link.
fn compose_subform(
    registry: &SchemaRegistry,
    column: &ColumnDef,
    leaf: &Value,
    rows: &mut FormRowSet,
    allocator: &mut LinkAllocator,
) -> Result<Value, ComposeError> {
    let subtable = subform_table(registry, column)?;
    if leaf.is_null() {
        return Ok(Value::Null);
    }
    let Value::Array(children) = leaf else {
        return Err(ComposeError::TypeMismatch {
            table: subtable.name.clone(),
            attribute: column.name.clone(),
            expected: "a list of form rows",
        });
    };
    let link = allocator.allocate();
    for child in children {
        compose_row(registry, subtable, child, Some(link), rows, allocator)?;
    }
    Ok(Value::from(link))
}

/// Composes a multi-select list into one-choice sub-form rows.
fn compose_selections(
    registry: &SchemaRegistry,
    column: &ColumnDef,
    leaf: &Value,
    rows: &mut FormRowSet,
    allocator: &mut LinkAllocator,
) -> Result<Value, ComposeError> {
    let subtable = subform_table(registry, column)?;
    if leaf.is_null() {
        return Ok(Value::Null);
    }
    let Value::Array(selections) = leaf else {
        return Err(ComposeError::TypeMismatch {
            table: subtable.name.clone(),
            attribute: column.name.clone(),
            expected: "a list of choice display strings",
        });
    };
    let link = allocator.allocate();
    for selection in selections {
        let Some(display) = selection.as_str() else {
            return Err(ComposeError::TypeMismatch {
                table: subtable.name.clone(),
                attribute: column.name.clone(),
                expected: "a list of choice display strings",
            });
        };
        let choice = column
            .choice_set
            .and_then(|set| registry.choice_id(set, display))
            .ok_or_else(|| ComposeError::UnknownChoice {
                attribute: column.name.clone(),
                value: display.to_owned(),
            })?;
        let mut row = FormRow::new(Some(link));
        row.values.insert(column.name.clone(), Value::from(choice.get()));
        rows.push(subtable.storage_name(), row);
    }
    Ok(Value::from(link))
}

/// Resolves a sub-form column to its target table definition.
fn subform_table<'a>(
    registry: &'a SchemaRegistry,
    column: &ColumnDef,
) -> Result<&'a TableDef, ComposeError> {
    column
        .subform
        .and_then(|id| registry.table(id))
        .ok_or_else(|| ComposeError::UnknownSubform { column: column.name.clone() })
}

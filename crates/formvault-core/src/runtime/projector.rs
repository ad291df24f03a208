// crates/formvault-core/src/runtime/projector.rs
// ============================================================================
// Module: Formvault Value Projection
// Description: Schema-driven projection of raw form rows into nested trees.
// Purpose: Produce the denormalized value and unit trees for one revision.
// Dependencies: crate::core, serde_json
// ============================================================================

//! ## Overview
//! Projection walks the dynamic schema tree and turns the flat dynamic-table
//! rows of one revision into a nested value tree plus a parallel units tree.
//! Choice columns resolve to display values, sub-forms become row lists, and
//! unit expressions are evaluated with `{attribute}` token substitution
//! against the current row and its parent chain. Resolution failures degrade
//! to null leaves rather than failing the projection. The projector is
//! read-only and never consults metadata outside the pre-built registry.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde_json::Map;
use serde_json::Value;
use thiserror::Error;

use crate::core::identifiers::ChoiceId;
use crate::core::identifiers::TableViewId;
use crate::core::schema::AttributeType;
use crate::core::schema::ColumnDef;
use crate::core::schema::OTHER_COLUMN_SUFFIX;
use crate::core::schema::OTHER_NOT_LISTED;
use crate::core::schema::SchemaRegistry;
use crate::core::schema::TableDef;
use crate::core::submission::FormRow;
use crate::core::submission::FormRowSet;

// ============================================================================
// SECTION: Projection Errors
// ============================================================================

/// Projection errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProjectionError {
    /// The table view is not registered.
    #[error("unknown table view: {view}")]
    UnknownView {
        /// Offending view identifier.
        view: TableViewId,
    },
    /// A sub-form column does not resolve to a registered table.
    #[error("sub-form column {column} does not resolve to a table")]
    UnknownSubform {
        /// Offending column name.
        column: String,
    },
}

// ============================================================================
// SECTION: Projected Tree
// ============================================================================

/// Result of projecting one revision's rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectedTree {
    /// Nested value tree.
    pub values: Value,
    /// Parallel units tree for unit-bearing attributes.
    pub units: Value,
}

/// One level of the unit-resolution scope chain.
#[derive(Debug, Clone, Copy)]
struct UnitScope<'a> {
    /// Table definition at this level.
    table: &'a TableDef,
    /// Row at this level.
    row: &'a FormRow,
}

// ============================================================================
// SECTION: Projector
// ============================================================================

/// Schema-driven projector from raw rows to nested trees.
#[derive(Debug, Clone, Copy)]
pub struct FormValueProjector<'a> {
    /// Validated schema registry.
    registry: &'a SchemaRegistry,
}

impl<'a> FormValueProjector<'a> {
    /// Creates a projector over a validated registry.
    #[must_use]
    pub const fn new(registry: &'a SchemaRegistry) -> Self {
        Self { registry }
    }

    /// Projects the rows of one revision into value and unit trees.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError`] when the view or a sub-form reference is
    /// not registered.
    pub fn project(
        &self,
        view: TableViewId,
        rows: &FormRowSet,
    ) -> Result<ProjectedTree, ProjectionError> {
        let root = self
            .registry
            .view_root(view)
            .ok_or(ProjectionError::UnknownView { view })?;
        let storage = root.storage_name();
        let root_row = rows.table_rows(&storage).iter().find(|row| row.link_id.is_none());
        let Some(root_row) = root_row else {
            return Ok(ProjectedTree {
                values: Value::Object(Map::new()),
                units: Value::Object(Map::new()),
            });
        };
        let mut chain = Vec::new();
        let (values, units) = self.project_row(root, root_row, rows, &mut chain)?;
        Ok(ProjectedTree { values: Value::Object(values), units: Value::Object(units) })
    }

    /// Projects one row of a table, recursing into linked sub-form rows.
    fn project_row<'s>(
        &self,
        table: &'s TableDef,
        row: &'s FormRow,
        rows: &'s FormRowSet,
        chain: &mut Vec<UnitScope<'s>>,
    ) -> Result<(Map<String, Value>, Map<String, Value>), ProjectionError>
    where
        'a: 's,
    {
        let mut values = Map::new();
        let mut units = Map::new();
        chain.push(UnitScope { table, row });

        for column in &table.columns {
            match column.attribute_type {
                AttributeType::Bool
                | AttributeType::Int
                | AttributeType::Float
                | AttributeType::Text
                | AttributeType::Datetime => {
                    let value = row.values.get(&column.name).cloned().unwrap_or(Value::Null);
                    values.insert(column.name.clone(), value);
                }
                AttributeType::Single => {
                    values.insert(column.name.clone(), self.single_display(column, row));
                }
                AttributeType::Form => {
                    let subtable = self.subform_table(column)?;
                    let mut child_values = Vec::new();
                    let mut child_units = Vec::new();
                    if let Some(link) = row.values.get(&column.name).and_then(Value::as_u64) {
                        for child in rows.rows_linked(&subtable.storage_name(), link) {
                            let (value, unit) =
                                self.project_row(subtable, child, rows, chain)?;
                            child_values.push(Value::Object(value));
                            child_units.push(Value::Object(unit));
                        }
                    }
                    values.insert(column.name.clone(), Value::Array(child_values));
                    units.insert(column.name.clone(), Value::Array(child_units));
                }
                AttributeType::Multiple => {
                    let subtable = self.subform_table(column)?;
                    let mut selections = Vec::new();
                    if let Some(link) = row.values.get(&column.name).and_then(Value::as_u64) {
                        for child in rows.rows_linked(&subtable.storage_name(), link) {
                            let display = child
                                .values
                                .get(&column.name)
                                .and_then(Value::as_u64)
                                .and_then(ChoiceId::from_raw)
                                .and_then(|id| self.registry.choice_value(id));
                            if let Some(display) = display {
                                selections.push(Value::String(display.to_owned()));
                            }
                        }
                    }
                    values.insert(column.name.clone(), Value::Array(selections));
                }
            }
            if !column.attribute_type.links_subform()
                && let Some(expr) = &column.unit
            {
                units.insert(column.name.clone(), resolve_unit(self.registry, expr, chain));
            }
        }

        chain.pop();
        Ok((values, units))
    }

    /// Resolves a single-select column to its choice display value.
    fn single_display(&self, column: &ColumnDef, row: &FormRow) -> Value {
        row.values
            .get(&column.name)
            .and_then(Value::as_u64)
            .and_then(ChoiceId::from_raw)
            .and_then(|id| self.registry.choice_value(id))
            .map_or(Value::Null, |display| Value::String(display.to_owned()))
    }

    /// Resolves a sub-form column to its target table definition.
    fn subform_table(&self, column: &ColumnDef) -> Result<&'a TableDef, ProjectionError> {
        column
            .subform
            .and_then(|id| self.registry.table(id))
            .ok_or_else(|| ProjectionError::UnknownSubform { column: column.name.clone() })
    }
}

// ============================================================================
// SECTION: Unit Resolution
// ============================================================================

/// Evaluates a unit expression against the scope chain, failing closed.
fn resolve_unit(registry: &SchemaRegistry, expr: &str, chain: &[UnitScope<'_>]) -> Value {
    if !expr.contains('{') {
        return Value::String(expr.to_owned());
    }
    let tokens = extract_tokens(expr);
    if tokens.is_empty() || tokens.len() > 3 {
        return Value::Null;
    }
    let mut resolved = Vec::with_capacity(tokens.len());
    for token in &tokens {
        let Some(text) = resolve_token(registry, token, chain) else {
            return Value::Null;
        };
        resolved.push(text);
    }
    if let [numerator, denominator, suffix] = resolved.as_slice() {
        return Value::String(format!("{numerator} / {denominator} {suffix}"));
    }
    let separator = if expr.contains('/') { " / " } else { " " };
    Value::String(resolved.join(separator))
}

/// Extracts `{attribute}` token names from a unit expression, in order.
fn extract_tokens(expr: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut rest = expr;
    while let Some(open) = rest.find('{') {
        let Some(close) = rest[open + 1..].find('}') else {
            break;
        };
        tokens.push(rest[open + 1..open + 1 + close].to_owned());
        rest = &rest[open + 1 + close + 1..];
    }
    tokens
}

/// Resolves one token against the scope chain, innermost row first.
///
/// The first table in the chain that defines the column decides the result;
/// a null value there resolves to `None` rather than continuing upward.
fn resolve_token(registry: &SchemaRegistry, token: &str, chain: &[UnitScope<'_>]) -> Option<String> {
    for scope in chain.iter().rev() {
        let Some(column) = scope.table.column(token) else {
            continue;
        };
        return match column.attribute_type {
            AttributeType::Single => {
                let display = scope
                    .row
                    .values
                    .get(token)
                    .and_then(Value::as_u64)
                    .and_then(ChoiceId::from_raw)
                    .and_then(|id| registry.choice_value(id))?;
                if display == OTHER_NOT_LISTED {
                    scope
                        .row
                        .values
                        .get(&format!("{token}{OTHER_COLUMN_SUFFIX}"))
                        .and_then(Value::as_str)
                        .map(str::to_owned)
                } else {
                    Some(display.to_owned())
                }
            }
            _ => scalar_text(scope.row.values.get(token)?),
        };
    }
    None
}

/// Renders a scalar leaf as unit text.
fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}

// ============================================================================
// SECTION: Null Stripping
// ============================================================================

/// Removes null leaves recursively for response shaping.
#[must_use]
pub fn strip_nulls(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .filter(|(_, entry)| !entry.is_null())
                .map(|(key, entry)| (key.clone(), strip_nulls(entry)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(
            items.iter().filter(|item| !item.is_null()).map(strip_nulls).collect(),
        ),
        other => other.clone(),
    }
}

// crates/formvault-core/src/core/path.rs
// ============================================================================
// Module: Formvault Attribute Paths
// Description: Typed paths into nested form value trees.
// Purpose: Parse, render, and resolve restatement and patch paths exactly once.
// Dependencies: crate::core::schema, serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! Attribute paths address single leaves inside the nested value tree of a
//! submission. The wire syntax is
//! `<form>.{<choice_field>:<choice_value>:<index>}.<attribute>` with form
//! segments repeatable for nesting. Paths are parsed into a typed structure
//! at the boundary; all internal traversal works on the parsed form so the
//! grammar is interpreted in exactly one place.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use serde::Serializer;
use serde::de::Error as DeError;
use serde_json::Value;
use thiserror::Error;

use crate::core::schema::MAX_SUBFORM_DEPTH;

// ============================================================================
// SECTION: Path Errors
// ============================================================================

/// Attribute path parsing and resolution errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PathError {
    /// The path text does not match the grammar.
    #[error("malformed attribute path {path}: {detail}")]
    Malformed {
        /// Offending path text.
        path: String,
        /// Parse failure detail.
        detail: String,
    },
    /// The path nests deeper than [`MAX_SUBFORM_DEPTH`].
    #[error("attribute path {path} exceeds the supported nesting depth")]
    DepthExceeded {
        /// Offending path text.
        path: String,
    },
    /// The path does not resolve against the value tree.
    #[error("attribute path {path} does not resolve: {detail}")]
    Unresolved {
        /// Offending path text.
        path: String,
        /// Resolution failure detail.
        detail: String,
    },
}

// ============================================================================
// SECTION: Path Model
// ============================================================================

/// Row selector inside one form segment.
///
/// # Invariants
/// - `choice_field` and `choice_value` are both present or both absent.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RowSelector {
    /// Column whose value discriminates candidate rows.
    pub choice_field: Option<String>,
    /// Required display value of the discriminator column.
    pub choice_value: Option<String>,
    /// Zero-based index into the matching rows.
    pub index: usize,
}

/// One form traversal step of an attribute path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PathSegment {
    /// Form column name to descend into.
    pub form: String,
    /// Selector picking one row of the sub-form.
    pub selector: RowSelector,
}

/// Typed attribute path addressing one leaf of a nested value tree.
///
/// # Invariants
/// - `segments.len() <= MAX_SUBFORM_DEPTH`.
/// - `attribute` is non-empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AttributePath {
    /// Form traversal steps, outermost first.
    pub segments: Vec<PathSegment>,
    /// Leaf attribute name.
    pub attribute: String,
}

impl AttributePath {
    /// Parses the wire form of an attribute path.
    ///
    /// # Errors
    ///
    /// Returns [`PathError`] when the text does not match the grammar or
    /// nests deeper than [`MAX_SUBFORM_DEPTH`].
    pub fn parse(input: &str) -> Result<Self, PathError> {
        let malformed = |detail: &str| PathError::Malformed {
            path: input.to_owned(),
            detail: detail.to_owned(),
        };

        let mut segments = Vec::new();
        let mut rest = input;
        loop {
            let name_end = rest.find('.').unwrap_or(rest.len());
            let name = &rest[..name_end];
            if name.is_empty() {
                return Err(malformed("empty name component"));
            }
            if name.contains(['{', '}', ':']) {
                return Err(malformed("name contains selector characters"));
            }
            if name_end == rest.len() {
                if segments.len() > MAX_SUBFORM_DEPTH {
                    return Err(PathError::DepthExceeded { path: input.to_owned() });
                }
                return Ok(Self { segments, attribute: name.to_owned() });
            }
            rest = &rest[name_end + 1..];
            let Some(selector_body) = rest.strip_prefix('{') else {
                return Err(malformed("form segment is missing a row selector"));
            };
            let Some(close) = selector_body.find('}') else {
                return Err(malformed("unterminated row selector"));
            };
            let selector = parse_selector(&selector_body[..close]).ok_or_else(|| {
                malformed("row selector must be {choice_field:choice_value:index}")
            })?;
            segments.push(PathSegment { form: name.to_owned(), selector });
            rest = selector_body[close + 1..]
                .strip_prefix('.')
                .ok_or_else(|| malformed("row selector must be followed by a name"))?;
        }
    }

    /// Resolves the path against a value tree, returning the leaf if present.
    #[must_use]
    pub fn lookup<'a>(&self, tree: &'a Value) -> Option<&'a Value> {
        let mut current = tree;
        for segment in &self.segments {
            let rows = current.get(&segment.form)?.as_array()?;
            current = select_row(rows, &segment.selector)?;
        }
        current.get(&self.attribute)
    }

    /// Writes a leaf value, returning the displaced previous value.
    ///
    /// # Errors
    ///
    /// Returns [`PathError::Unresolved`] when an intermediate segment does
    /// not resolve to a row or the leaf parent is not an object.
    pub fn set(&self, tree: &mut Value, value: Value) -> Result<Option<Value>, PathError> {
        let unresolved = |detail: &str| PathError::Unresolved {
            path: self.to_string(),
            detail: detail.to_owned(),
        };

        let mut current = tree;
        for segment in &self.segments {
            let rows = current
                .get_mut(&segment.form)
                .and_then(Value::as_array_mut)
                .ok_or_else(|| unresolved("form segment is not a row list"))?;
            current = select_row_mut(rows, &segment.selector)
                .ok_or_else(|| unresolved("row selector matched no row"))?;
        }
        let Value::Object(leaf) = current else {
            return Err(unresolved("leaf parent is not an object"));
        };
        Ok(leaf.insert(self.attribute.clone(), value))
    }
}

impl fmt::Display for AttributePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for segment in &self.segments {
            let field = segment.selector.choice_field.as_deref().unwrap_or("");
            let value = segment.selector.choice_value.as_deref().unwrap_or("");
            write!(f, "{}.{{{field}:{value}:{}}}.", segment.form, segment.selector.index)?;
        }
        f.write_str(&self.attribute)
    }
}

impl FromStr for AttributePath {
    type Err = PathError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        Self::parse(input)
    }
}

impl Serialize for AttributePath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for AttributePath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Self::parse(&text).map_err(DeError::custom)
    }
}

// ============================================================================
// SECTION: Selector Resolution
// ============================================================================

/// Parses the body of a `{choice_field:choice_value:index}` selector.
fn parse_selector(body: &str) -> Option<RowSelector> {
    let first = body.find(':')?;
    let last = body.rfind(':')?;
    if first == last {
        return None;
    }
    let field = &body[..first];
    let value = &body[first + 1..last];
    let index: usize = body[last + 1..].parse().ok()?;
    match (field.is_empty(), value.is_empty()) {
        (true, true) => {
            Some(RowSelector { choice_field: None, choice_value: None, index })
        }
        (false, false) => Some(RowSelector {
            choice_field: Some(field.to_owned()),
            choice_value: Some(value.to_owned()),
            index,
        }),
        _ => None,
    }
}

/// Returns true when a row satisfies the selector's discriminator.
fn selector_matches(row: &Value, selector: &RowSelector) -> bool {
    match (&selector.choice_field, &selector.choice_value) {
        (Some(field), Some(value)) => {
            row.get(field).and_then(Value::as_str) == Some(value.as_str())
        }
        _ => true,
    }
}

/// Selects the indexed matching row from a list.
fn select_row<'a>(rows: &'a [Value], selector: &RowSelector) -> Option<&'a Value> {
    rows.iter().filter(|row| selector_matches(row, selector)).nth(selector.index)
}

/// Selects the indexed matching row mutably from a list.
fn select_row_mut<'a>(rows: &'a mut [Value], selector: &RowSelector) -> Option<&'a mut Value> {
    rows.iter_mut().filter(|row| selector_matches(row, selector)).nth(selector.index)
}

// crates/formvault-core/src/runtime/comparator.rs
// ============================================================================
// Module: Formvault Leaf Comparator
// Description: Semantic equivalence for leaf values in value trees.
// Purpose: Decide whether a patched leaf actually changed before restating it.
// Dependencies: bigdecimal, serde_json
// ============================================================================

//! ## Overview
//! Restatement detection must not flag edits that only change a number's
//! rendering. Numeric leaves compare decimal-aware: `1.0E3` equals `1000.0`,
//! and strings that are decimal literals compare numerically, including
//! against JSON numbers. Everything else compares structurally.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::str::FromStr;

use bigdecimal::BigDecimal;
use serde_json::Number;
use serde_json::Value;

// ============================================================================
// SECTION: Leaf Equivalence
// ============================================================================

/// Returns true when two leaf values are semantically equivalent.
#[must_use]
pub fn leaf_equivalent(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(left_num), Value::Number(right_num)) => {
            match (decimal_from_number(left_num), decimal_from_number(right_num)) {
                (Some(left_dec), Some(right_dec)) => left_dec == right_dec,
                _ => left_num == right_num,
            }
        }
        (Value::Number(num), Value::String(text)) | (Value::String(text), Value::Number(num)) => {
            match (decimal_from_number(num), decimal_from_str(text)) {
                (Some(left_dec), Some(right_dec)) => left_dec == right_dec,
                _ => false,
            }
        }
        (Value::String(left_text), Value::String(right_text)) => {
            match (decimal_from_str(left_text), decimal_from_str(right_text)) {
                (Some(left_dec), Some(right_dec)) => left_dec == right_dec,
                _ => left_text == right_text,
            }
        }
        _ => left == right,
    }
}

// ============================================================================
// SECTION: Decimal Parsing
// ============================================================================

/// Parses a JSON number into `BigDecimal` with a stable string representation.
fn decimal_from_number(number: &Number) -> Option<BigDecimal> {
    let rendered = number.to_string();
    BigDecimal::from_str(&rendered).ok()
}

/// Parses a string leaf into `BigDecimal` when it is a decimal literal.
fn decimal_from_str(text: &str) -> Option<BigDecimal> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    BigDecimal::from_str(trimmed).ok()
}

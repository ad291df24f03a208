// crates/formvault-core/tests/timestamps.rs
// ============================================================================
// Module: Timestamp Codec Tests
// Description: Stored text form round-trips and rejection cases.
// Purpose: Validate the kind:value codec stores persist in text columns.
// ============================================================================

//! Tests for the timestamp `kind:value` text codec.

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

use formvault_core::Timestamp;
use formvault_core::TimestampParseError;

#[test]
fn text_forms_round_trip() {
    let cases = [
        Timestamp::UnixMillis(1_700_000_000_000),
        Timestamp::UnixMillis(-1),
        Timestamp::Logical(0),
        Timestamp::Logical(u64::MAX),
    ];
    for at in cases {
        let text = at.to_string();
        assert_eq!(text.parse::<Timestamp>(), Ok(at), "round-trip of {text}");
    }
}

#[test]
fn rendered_forms_are_prefixed_by_kind() {
    assert_eq!(Timestamp::UnixMillis(42).to_string(), "unix_millis:42");
    assert_eq!(Timestamp::Logical(7).to_string(), "logical:7");
}

#[test]
fn malformed_text_is_rejected() {
    assert_eq!(
        "1700000000000".parse::<Timestamp>(),
        Err(TimestampParseError::UnknownKind("1700000000000".to_owned()))
    );
    assert_eq!(
        "epoch:42".parse::<Timestamp>(),
        Err(TimestampParseError::UnknownKind("epoch".to_owned()))
    );
    assert_eq!(
        "logical:-3".parse::<Timestamp>(),
        Err(TimestampParseError::InvalidValue("-3".to_owned()))
    );
    assert_eq!(
        "unix_millis:soon".parse::<Timestamp>(),
        Err(TimestampParseError::InvalidValue("soon".to_owned()))
    );
}

//! Integration Test: Panic Prohibition
//!
//! **Policy**: production code propagates errors. `unwrap()` and `expect()`
//! are for tests only; a daemon that owns hardware must not die holding it.

use architectural_enforcement::{report, scan};

/// No `unwrap()`/`expect()` outside test modules
#[test]
fn test_no_unwrap_in_production_code() {
    let violations = scan(|_, code| code.contains(".unwrap()") || code.contains(".expect("));
    report(
        "CRITICAL: unwrap()/expect() found in production code!",
        &violations,
        &[
            "✅ Propagate with ? and a DeckError/ConfigError variant",
            "✅ Fall back with unwrap_or / unwrap_or_default / unwrap_or_else",
        ],
    );
}

/// `unwrap_or` variants are fine
#[test]
fn test_fallbacks_are_not_flagged() {
    let flagged = |code: &str| code.contains(".unwrap()") || code.contains(".expect(");
    assert!(!flagged("x.unwrap_or(0)"));
    assert!(!flagged("x.unwrap_or_default()"));
    assert!(flagged("x.unwrap()"));
    assert!(flagged("x.expect(\"y\")"));
}

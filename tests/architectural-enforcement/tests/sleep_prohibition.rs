//! Integration Test: Sleep Prohibition
//!
//! **Policy**: production code never blocks a thread with `std::thread::sleep`,
//! and async sleeps appear only in the modules that own a timer: overlay
//! auto-hide, session readiness and LED backoff, lock polling, and the
//! virtual device's simulated latency.
//! **Exceptions**: test code

use std::path::Path;

use architectural_enforcement::{report, scan};

/// Modules allowed to await a timer
const TIMER_MODULES: &[&str] = &[
    "overlay.rs",
    "session.rs",
    "lock.rs",
    "device/virtual_device.rs",
];

fn is_timer_module(path: &Path) -> bool {
    TIMER_MODULES.iter().any(|m| path.ends_with(m))
}

/// No thread-blocking sleeps anywhere in production code
#[test]
fn test_no_thread_sleep_in_production_code() {
    let violations = scan(|_, code| code.contains("thread::sleep"));
    report(
        "CRITICAL: Blocking sleeps found in production code!",
        &violations,
        &["Use tokio::time::sleep or tokio::time::interval instead"],
    );
}

/// Async sleeps stay inside the timer-owning modules
#[test]
fn test_async_sleep_only_in_timer_modules() {
    let violations = scan(|path, code| {
        (code.contains("::sleep(") || code.contains(" sleep(")) && !is_timer_module(path)
    });
    report(
        "CRITICAL: Sleep used outside a timer module!",
        &violations,
        &[
            "✅ Periodic work: tokio::time::interval",
            "✅ Waiting on events: channels or Notify",
            "❌ Sleep as poor man's synchronization",
        ],
    );
}

#[test]
fn test_timer_module_matching() {
    assert!(is_timer_module(Path::new("deck/core/src/overlay.rs")));
    assert!(is_timer_module(Path::new(
        "deck/core/src/device/virtual_device.rs"
    )));
    assert!(!is_timer_module(Path::new("deck/core/src/render.rs")));
}

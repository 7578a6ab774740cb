//! Process-wide runtime switches.
//!
//! Both switches are seeded from the environment the first time they are read. Leak detection
//! can be toggled afterwards; every wrapper reads it once, when it is constructed.

use std::env;
use std::sync::atomic::{AtomicBool, Ordering};

use once_cell::sync::Lazy;

/// Environment variable enabling fine-grained leak diagnostics.
pub const LEAK_DETECTION_ENV: &str = "NATIVEREF_LEAK_DETECTION";

/// Environment variable bounding the number of trace points kept per resource.
pub const MAX_TRACE_POINTS_ENV: &str = "NATIVEREF_MAX_TRACE_POINTS";

/// Number of trace points kept per resource when the environment does not say otherwise.
pub const DEFAULT_MAX_TRACE_POINTS: usize = 50;

static LEAK_DETECTION: Lazy<AtomicBool> = Lazy::new(|| {
    let enabled = env::var(LEAK_DETECTION_ENV)
        .ok()
        .and_then(|v| parse_flag(&v))
        .unwrap_or(false);
    AtomicBool::new(enabled)
});

static MAX_TRACE_POINTS: Lazy<usize> = Lazy::new(|| {
    env::var(MAX_TRACE_POINTS_ENV)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(DEFAULT_MAX_TRACE_POINTS)
});

/// Returns whether leak reports carry the concrete resource type name and trace points capture
/// a backtrace. Off by default.
pub fn leak_detection_enabled() -> bool {
    LEAK_DETECTION.load(Ordering::Relaxed)
}

/// Overrides the value taken from [`LEAK_DETECTION_ENV`]. Only wrappers constructed afterwards
/// are affected.
pub fn set_leak_detection_enabled(enabled: bool) {
    LEAK_DETECTION.store(enabled, Ordering::Relaxed);
}

/// Upper bound on the trace points a single resource keeps. Older points are evicted first.
pub fn max_trace_points() -> usize {
    *MAX_TRACE_POINTS
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}

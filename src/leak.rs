//! Leak reports and the process-wide sink that receives them.
//!
//! A leak is a leak-reporting resource dropped while still accessible. The report is handed to
//! the installed [`LeakSink`] from within `Drop`; by default it is logged at `warn` level on the
//! `nativeref::leak` target. Reports are best-effort: nothing is reported for resources that are
//! never dropped, for instance because the process exits first.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, PoisonError, RwLock};

use once_cell::sync::Lazy;

use crate::trace::Trace;

/// A resource that was dropped without being closed.
#[derive(Debug, Clone)]
pub struct LeakReport {
    /// The resource's declared category. This is the concrete resource type name when leak
    /// detection was enabled at construction, and a generic name otherwise.
    pub category: &'static str,
    /// The lifecycle trace of the leaked resource.
    pub trace: Trace,
}

impl fmt::Display for LeakReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "LEAK: {} was dropped without being closed\n{}",
            self.category, self.trace
        )
    }
}

/// Receives leak reports.
pub trait LeakSink: Send + Sync {
    fn accept(&self, report: LeakReport);
}

impl<F> LeakSink for F
where
    F: Fn(LeakReport) + Send + Sync,
{
    fn accept(&self, report: LeakReport) {
        self(report)
    }
}

/// The default sink. Logs every report through the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl LeakSink for LogSink {
    fn accept(&self, report: LeakReport) {
        log::warn!(target: "nativeref::leak", "{}", report);
    }
}

static SINK: Lazy<RwLock<Arc<dyn LeakSink>>> = Lazy::new(|| RwLock::new(Arc::new(LogSink)));

/// Installs `sink` as the receiver of all subsequent leak reports and returns the previous one.
pub fn set_leak_sink(sink: Arc<dyn LeakSink>) -> Arc<dyn LeakSink> {
    let mut guard = SINK.write().unwrap_or_else(PoisonError::into_inner);
    std::mem::replace(&mut *guard, sink)
}

/// Restores the default [`LogSink`].
pub fn reset_leak_sink() {
    set_leak_sink(Arc::new(LogSink));
}

pub(crate) fn report(report: LeakReport) {
    let sink = SINK.read().unwrap_or_else(PoisonError::into_inner).clone();
    let category = report.category;
    // Called from `Drop`, so a panicking sink must not take the process down with it.
    if catch_unwind(AssertUnwindSafe(|| sink.accept(report))).is_err() {
        log::error!(
            target: "nativeref::leak",
            "leak sink panicked while reporting {}",
            category
        );
    }
}

// GRCOV_EXCL_STOP

//! The release-once state machine shared by every wrapper.

use std::fmt;
use std::panic::{catch_unwind, resume_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicIsize, Ordering};

use crate::{
    config, leak,
    leak::LeakReport,
    reference::Dispose,
    trace::{Trace, TraceKind},
    Error,
};

/// Category reported for leaked resources while leak detection is disabled.
pub const DEFAULT_CATEGORY: &str = "native reference";

/// Tracks whether a resource is still accessible and releases it exactly once.
///
/// A lifecycle starts with no outstanding acquisitions beyond the creator's own. Each
/// [`acquire`](Lifecycle::acquire) adds one; each [`close`](Lifecycle::close) takes one away, and
/// the close that takes away the last one disposes the resource. From then on the lifecycle is
/// inaccessible for good.
///
/// Dropping a lifecycle that is still accessible while it reports leaks hands a [`LeakReport`]
/// to the installed sink. The resource itself is not released by the drop.
///
/// Mutating operations take `&mut self`: a lifecycle is confined to one thread at a time.
/// [`is_accessible`](Lifecycle::is_accessible) may be polled through a shared reference from any
/// thread, but a positive answer does not keep a concurrent owner from closing it.
pub struct Lifecycle {
    // Closed if negative.
    acquires: AtomicIsize,
    report_leak: bool,
    category: &'static str,
    trace: Trace,
}

impl Lifecycle {
    /// Creates an accessible lifecycle reported under [`DEFAULT_CATEGORY`].
    pub fn new(report_leak: bool) -> Lifecycle {
        Lifecycle::with_category(report_leak, DEFAULT_CATEGORY)
    }

    /// Creates an accessible lifecycle. `category` names the resource in leak reports, but only
    /// when leak detection is enabled at this point.
    pub fn with_category(report_leak: bool, category: &'static str) -> Lifecycle {
        let detailed = config::leak_detection_enabled();
        Lifecycle {
            acquires: AtomicIsize::new(0),
            report_leak,
            category: if detailed { category } else { DEFAULT_CATEGORY },
            trace: Trace::new(config::max_trace_points(), detailed),
        }
    }

    pub fn is_accessible(&self) -> bool {
        self.acquires.load(Ordering::Acquire) >= 0
    }

    /// Outstanding acquisitions beyond the creator's. `-1` once released.
    pub fn acquires(&self) -> isize {
        self.acquires.load(Ordering::Acquire)
    }

    pub fn category(&self) -> &'static str {
        self.category
    }

    pub fn trace(&self) -> &Trace {
        &self.trace
    }

    pub fn report_leak(&self) -> bool {
        self.report_leak
    }

    pub fn set_report_leak(&mut self, report_leak: bool) {
        self.report_leak = report_leak;
    }

    /// Records the current access for debugging. `hint` describes the access and is included in
    /// errors and leak reports. Has no effect once the resource is released.
    pub fn touch(&mut self, hint: Option<&str>) {
        if self.is_accessible() {
            let acquires = self.acquires();
            self.trace.record(TraceKind::Touch, hint, acquires);
        }
    }

    /// Takes one more acquisition, so one more [`close`](Lifecycle::close) is needed before the
    /// resource is disposed.
    pub fn acquire(&mut self) -> Result<(), Error> {
        self.ensure_accessible()?;
        let acq = self.acquires.fetch_add(1, Ordering::AcqRel);
        self.trace.record(TraceKind::Acquire, None, acq + 1);
        Ok(())
    }

    /// Fails with [`Error::UseAfterRelease`] once the resource has been released.
    pub fn ensure_accessible(&self) -> Result<(), Error> {
        if self.is_accessible() {
            Ok(())
        } else {
            Err(self.attach_trace(Error::UseAfterRelease))
        }
    }

    /// Gives up one acquisition and disposes `resource` if it was the last one.
    ///
    /// `make_inaccessible` runs right after `dispose`, whether `dispose` succeeded, failed or
    /// panicked. A failed disposal is returned only after that, and the lifecycle stays
    /// released: there is no second attempt.
    ///
    /// # Errors
    ///
    /// [`Error::DoubleRelease`] if the resource was already released, or whatever the
    /// resource's `dispose` returned. Both carry the lifecycle trace.
    pub fn close<D: Dispose + ?Sized>(&mut self, resource: &mut D) -> Result<(), Error> {
        if self.acquires.load(Ordering::Acquire) == -1 {
            return Err(self.attach_trace(Error::DoubleRelease));
        }
        let acq = self.acquires.fetch_sub(1, Ordering::AcqRel);
        self.trace.record(TraceKind::Close, None, acq);
        if acq != 0 {
            return Ok(());
        }

        // The count went from 0 to -1: this close owns the disposal.
        self.trace.record(TraceKind::Drop, None, 0);
        let disposed = catch_unwind(AssertUnwindSafe(|| resource.dispose()));
        resource.make_inaccessible();
        match disposed {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => {
                log::debug!("failed to dispose {}: {}", self.category, err);
                Err(self.attach_trace(err))
            }
            Err(panic) => resume_unwind(panic),
        }
    }

    /// Attaches a snapshot of this lifecycle's trace to `err`.
    pub fn attach_trace(&self, err: Error) -> Error {
        err.with_trace(self.trace.clone())
    }
}

impl fmt::Debug for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lifecycle")
            .field("category", &self.category)
            .field("acquires", &self.acquires())
            .field("report_leak", &self.report_leak)
            .finish()
    }
}

impl Drop for Lifecycle {
    fn drop(&mut self) {
        if self.report_leak && self.is_accessible() {
            leak::report(LeakReport {
                category: self.category,
                trace: std::mem::take(&mut self.trace),
            });
        }
    }
}

//! nativeref manages the lifecycle of wrappers around handles that live outside Rust's ownership
//! model: memory returned by a C allocator, descriptors, objects owned by a foreign runtime.
//!
//! Every wrapper guarantees that its handle is released exactly once, reports use after release
//! and release after release as errors, can hand responsibility for the handle to another
//! wrapper without releasing it, and reports wrappers that are dropped without ever being
//! closed.
//!
//! The concrete resource only has to say how it is released:
//!
//! ```
//! use nativeref::{Dispose, Error, NativeRef};
//!
//! struct Buffer(Vec<u8>);
//!
//! impl Dispose for Buffer {
//!     fn dispose(&mut self) -> Result<(), Error> {
//!         self.0.clear();
//!         Ok(())
//!     }
//! }
//!
//! let mut buffer = NativeRef::new(Buffer(vec![1, 2, 3]), true);
//! assert_eq!(buffer.get().unwrap().0.len(), 3);
//!
//! buffer.close().unwrap();
//! assert!(!buffer.is_accessible());
//! assert!(buffer.close().is_err());
//! ```
//!
//! Resources whose handle may change hands use [`GuardedHandle`] and [`DisposeHandle`] instead.
//! See the [`handle`] module for ownership transfer.
//!
//! Unclosed resources are reported through the sink installed with [`set_leak_sink`], which by
//! default logs through the `log` crate. Setting `NATIVEREF_LEAK_DETECTION=1` (or calling
//! [`config::set_leak_detection_enabled`]) makes reports name the concrete resource type and
//! record a backtrace for every trace point.

use std::fmt;

use self::Error::*;

pub mod config;
pub mod handle;
pub mod leak;
pub mod lifecycle;
pub mod reference;
pub mod trace;

pub use handle::{Bound, DisposeHandle, Disowned, GuardedHandle, State};
pub use leak::{reset_leak_sink, set_leak_sink, LeakReport, LeakSink, LogSink};
pub use lifecycle::Lifecycle;
pub use reference::{Dispose, NativeRef};
pub use trace::{Trace, TraceKind, TracePoint};

/// An error raised by a lifecycle operation or by the resource's own release.
#[derive(Debug)]
pub enum Error {
    /// `close` was called on a resource that had already been released
    DoubleRelease,
    /// The resource was used after it had been released
    UseAfterRelease,
    /// The handle cannot be handed over because this wrapper does not own it
    NotOwner,
    /// Releasing the underlying resource failed
    Disposal(Box<dyn std::error::Error + Send + Sync>),
    /// Another error, with the lifecycle trace of the resource it came from
    Traced(Box<Error>, Trace),
}

impl Error {
    /// Wraps a failure of the concrete release operation.
    pub fn disposal<E>(err: E) -> Error
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Disposal(err.into())
    }

    /// The lifecycle trace attached to this error, if any.
    pub fn trace(&self) -> Option<&Trace> {
        match self {
            Traced(_, trace) => Some(trace),
            _ => None,
        }
    }

    /// This error without its lifecycle trace.
    pub fn untraced(&self) -> &Error {
        match self {
            Traced(err, _) => err.untraced(),
            err => err,
        }
    }

    /// Attaches `trace`, replacing any trace attached before.
    pub(crate) fn with_trace(self, trace: Trace) -> Error {
        match self {
            Traced(err, _) => Traced(err, trace),
            err => Traced(Box::new(err), trace),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DoubleRelease => write!(f, "double release: resource already closed and disposed"),
            UseAfterRelease => write!(f, "resource used after it was closed and disposed"),
            NotOwner => write!(f, "handle is not owned by this wrapper"),
            Disposal(err) => write!(f, "failed to release resource: {}", err),
            Traced(err, trace) => write!(f, "{}\n{}", err, trace),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Disposal(err) => Some(err.as_ref()),
            Traced(err, _) => err.source(),
            _ => None,
        }
    }
}

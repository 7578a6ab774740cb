//! Wrappers that can hand responsibility for their handle to another wrapper.
//!
//! A [`GuardedHandle`] knows whether it owns its handle. Only an owning wrapper releases the
//! handle when it is closed; a non-owning wrapper closes without touching it. The ownership is
//! given up with [`GuardedHandle::disown_handle`], which consumes the wrapper and returns it in
//! the [`Disowned`] state. A disowned wrapper can still be closed, but gives no access to the
//! resource and can never own it again.
//!
//! # Example
//!
//! ```
//! use nativeref::{DisposeHandle, Error, GuardedHandle};
//!
//! struct Table {
//!     id: u32,
//! }
//!
//! impl DisposeHandle for Table {
//!     fn dispose_handle(&mut self, owning_handle: bool) -> Result<(), Error> {
//!         if owning_handle {
//!             // release table `self.id` in the native library
//!         }
//!         Ok(())
//!     }
//! }
//!
//! let table = GuardedHandle::owning(Table { id: 3 });
//!
//! // The registry takes over table 3.
//! let (mut old, mut registry) = table.transfer(|t| Table { id: t.id }).unwrap();
//! assert!(!old.is_owning_handle());
//! assert!(registry.is_owning_handle());
//!
//! old.close().unwrap(); // no release
//! registry.close().unwrap(); // releases table 3
//! ```

use std::any::type_name;
use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};

#[cfg(test)]
use mockall::automock;

use crate::{
    reference::{Dispose, NativeRef},
    trace::Trace,
    Error,
};

/// The release operation of a resource whose ownership can change hands.
#[cfg_attr(test, automock)]
pub trait DisposeHandle {
    /// Called once, when the wrapper is closed for the last time. `owning_handle` tells whether
    /// the wrapper still owned the handle at that point; when it is `false` the handle belongs to
    /// somebody else and must be left alone.
    fn dispose_handle(&mut self, owning_handle: bool) -> Result<(), Error>;

    /// See [`Dispose::make_inaccessible`].
    fn make_inaccessible(&mut self) {}
}

/// Phantom type representing a wrapper that may use its resource. Whether it also owns the
/// handle is decided at runtime, see [`GuardedHandle::is_owning_handle`].
pub enum Bound {}

/// Phantom type representing a wrapper whose handle was handed to another owner.
pub enum Disowned {}

/// The states a [`GuardedHandle`] can be in.
pub trait State {}

impl State for Bound {}

impl State for Disowned {}

struct Ownership<R> {
    owning_handle: AtomicBool,
    resource: R,
}

impl<R: DisposeHandle> Dispose for Ownership<R> {
    fn dispose(&mut self) -> Result<(), Error> {
        let owning_handle = self.owning_handle.load(Ordering::Acquire);
        self.resource.dispose_handle(owning_handle)
    }

    fn make_inaccessible(&mut self) {
        self.resource.make_inaccessible()
    }
}

/// A resource with a lifecycle and an ownership flag.
///
/// **`GuardedHandle<R, Bound>`** is created with [`new`](GuardedHandle::new),
/// [`owning`](GuardedHandle::owning) or [`non_owning`](GuardedHandle::non_owning). It gives
/// access to the resource until it is closed.
///
/// **`GuardedHandle<R, Disowned>`** is what remains after
/// [`disown_handle`](GuardedHandle::disown_handle) or [`transfer`](GuardedHandle::transfer).
/// It only supports closing and inspection.
///
/// Only an owning wrapper reports a leak when dropped unclosed.
pub struct GuardedHandle<R: DisposeHandle, S: State = Bound> {
    reference: NativeRef<Ownership<R>>,
    _marker: PhantomData<S>,
}

impl<R: DisposeHandle> GuardedHandle<R, Bound> {
    /// Wraps `resource`. A wrapper reports leaks exactly when it owns the handle.
    pub fn new(resource: R, owning_handle: bool) -> GuardedHandle<R, Bound> {
        let ownership = Ownership {
            owning_handle: AtomicBool::new(owning_handle),
            resource,
        };
        GuardedHandle {
            reference: NativeRef::with_category(ownership, owning_handle, type_name::<R>()),
            _marker: PhantomData,
        }
    }

    pub fn owning(resource: R) -> GuardedHandle<R, Bound> {
        GuardedHandle::new(resource, true)
    }

    /// Wraps a handle that is owned elsewhere, e.g. one borrowed from another native object.
    pub fn non_owning(resource: R) -> GuardedHandle<R, Bound> {
        GuardedHandle::new(resource, false)
    }

    /// The resource, or [`Error::UseAfterRelease`] once it has been released.
    pub fn get(&self) -> Result<&R, Error> {
        self.reference.get().map(|o| &o.resource)
    }

    /// The resource, or [`Error::UseAfterRelease`] once it has been released.
    pub fn get_mut(&mut self) -> Result<&mut R, Error> {
        self.reference.get_mut().map(|o| &mut o.resource)
    }

    /// See [`Lifecycle::acquire`](crate::Lifecycle::acquire).
    pub fn acquire(&mut self) -> Result<(), Error> {
        self.reference.acquire()
    }

    pub fn set_report_leak(&mut self, report_leak: bool) {
        self.reference.set_report_leak(report_leak)
    }

    /// Gives up responsibility for releasing the handle.
    ///
    /// Whoever takes the handle over must release it: closing the returned wrapper leaves the
    /// handle alone, and dropping it is not reported as a leak. Disowning a handle nobody takes
    /// over therefore leaks it.
    pub fn disown_handle(mut self) -> GuardedHandle<R, Disowned> {
        self.reference.set_report_leak(false);
        self.reference
            .resource()
            .owning_handle
            .store(false, Ordering::Release);
        GuardedHandle {
            reference: self.reference,
            _marker: PhantomData,
        }
    }

    /// Hands the handle to a new owning wrapper built by `adopt`, and disowns this one.
    ///
    /// # Errors
    ///
    /// [`Error::NotOwner`] if this wrapper does not own an accessible handle. The wrapper is
    /// dropped in that case; as it owns nothing, this neither releases nor leaks anything.
    pub fn transfer<T, F>(
        self,
        adopt: F,
    ) -> Result<(GuardedHandle<R, Disowned>, GuardedHandle<T, Bound>), Error>
    where
        T: DisposeHandle,
        F: FnOnce(&R) -> T,
    {
        if !self.is_owning_handle() {
            return Err(self.attach_trace(Error::NotOwner));
        }
        let successor = GuardedHandle::owning(adopt(&self.reference.resource().resource));
        Ok((self.disown_handle(), successor))
    }
}

impl<R: DisposeHandle, S: State> GuardedHandle<R, S> {
    /// Whether this wrapper is responsible for releasing an accessible handle.
    pub fn is_owning_handle(&self) -> bool {
        self.reference
            .resource()
            .owning_handle
            .load(Ordering::Acquire)
            && self.is_accessible()
    }

    pub fn is_accessible(&self) -> bool {
        self.reference.is_accessible()
    }

    pub fn report_leak(&self) -> bool {
        self.reference.report_leak()
    }

    pub fn trace(&self) -> &Trace {
        self.reference.trace()
    }

    /// See [`Lifecycle::touch`](crate::Lifecycle::touch).
    pub fn touch(&mut self, hint: Option<&str>) {
        self.reference.touch(hint)
    }

    /// Closes the wrapper, releasing the handle only if this wrapper still owns it.
    ///
    /// See [`Lifecycle::close`](crate::Lifecycle::close).
    pub fn close(&mut self) -> Result<(), Error> {
        self.reference.close()
    }

    pub fn attach_trace(&self, err: Error) -> Error {
        self.reference.attach_trace(err)
    }
}

impl<R: DisposeHandle, S: State> fmt::Debug for GuardedHandle<R, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GuardedHandle")
            .field("lifecycle", self.reference.lifecycle())
            .field("owning_handle", &self.is_owning_handle())
            .finish()
    }
}

use std::any::type_name;
use std::fmt;

#[cfg(test)]
use mockall::automock;

use crate::{lifecycle::Lifecycle, trace::Trace, Error};

/// The release operation of a concrete resource.
///
/// [`NativeRef`] calls [`dispose`](Dispose::dispose) at most once per resource, so
/// implementations do not need to guard against being called twice.
#[cfg_attr(test, automock)]
pub trait Dispose {
    /// Releases the underlying resource.
    fn dispose(&mut self) -> Result<(), Error>;

    /// Called right after [`dispose`](Dispose::dispose), even if it failed. Lets the resource set
    /// further traps for late accesses.
    fn make_inaccessible(&mut self) {}
}

/// A resource bundled with its [`Lifecycle`].
///
/// The resource is reachable through [`get`](NativeRef::get) and [`get_mut`](NativeRef::get_mut)
/// until it is closed. Dropping a `NativeRef` never disposes the resource; an unclosed one is
/// reported as a leak if it was created with `report_leak`.
pub struct NativeRef<R: Dispose> {
    lifecycle: Lifecycle,
    resource: R,
}

impl<R: Dispose> NativeRef<R> {
    pub fn new(resource: R, report_leak: bool) -> NativeRef<R> {
        NativeRef::with_category(resource, report_leak, type_name::<R>())
    }

    pub(crate) fn with_category(
        resource: R,
        report_leak: bool,
        category: &'static str,
    ) -> NativeRef<R> {
        NativeRef {
            lifecycle: Lifecycle::with_category(report_leak, category),
            resource,
        }
    }

    pub fn is_accessible(&self) -> bool {
        self.lifecycle.is_accessible()
    }

    pub fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    pub fn trace(&self) -> &Trace {
        self.lifecycle.trace()
    }

    pub fn report_leak(&self) -> bool {
        self.lifecycle.report_leak()
    }

    pub fn set_report_leak(&mut self, report_leak: bool) {
        self.lifecycle.set_report_leak(report_leak)
    }

    /// See [`Lifecycle::touch`].
    pub fn touch(&mut self, hint: Option<&str>) {
        self.lifecycle.touch(hint)
    }

    /// See [`Lifecycle::acquire`].
    pub fn acquire(&mut self) -> Result<(), Error> {
        self.lifecycle.acquire()
    }

    /// See [`Lifecycle::close`].
    pub fn close(&mut self) -> Result<(), Error> {
        self.lifecycle.close(&mut self.resource)
    }

    pub fn attach_trace(&self, err: Error) -> Error {
        self.lifecycle.attach_trace(err)
    }

    /// The resource, or [`Error::UseAfterRelease`] once it has been released.
    pub fn get(&self) -> Result<&R, Error> {
        self.lifecycle.ensure_accessible()?;
        Ok(&self.resource)
    }

    /// The resource, or [`Error::UseAfterRelease`] once it has been released.
    pub fn get_mut(&mut self) -> Result<&mut R, Error> {
        self.lifecycle.ensure_accessible()?;
        Ok(&mut self.resource)
    }

    /// The resource regardless of its state. Only for code that never touches the underlying
    /// handle through it.
    pub(crate) fn resource(&self) -> &R {
        &self.resource
    }
}

impl<R: Dispose> fmt::Debug for NativeRef<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeRef")
            .field("lifecycle", &self.lifecycle)
            .finish()
    }
}

//! Wraps C strings from `strdup`, hands one over to a second wrapper and leaks another.
//!
//! Run with `RUST_LOG=warn NATIVEREF_LEAK_DETECTION=1 cargo run --example ownership` to see the
//! leak report.

use std::ffi::{CStr, CString};
use std::ptr::NonNull;

use nativeref::{DisposeHandle, Error, GuardedHandle};

struct CText(NonNull<libc::c_char>);

impl CText {
    fn new(text: &str) -> Result<GuardedHandle<CText>, Box<dyn std::error::Error>> {
        let text = CString::new(text)?;
        let ptr = NonNull::new(unsafe { libc::strdup(text.as_ptr()) }).ok_or("strdup failed")?;
        Ok(GuardedHandle::owning(CText(ptr)))
    }

    fn to_str(&self) -> &str {
        unsafe { CStr::from_ptr(self.0.as_ptr()) }
            .to_str()
            .unwrap_or("<invalid utf-8>")
    }
}

impl DisposeHandle for CText {
    fn dispose_handle(&mut self, owning_handle: bool) -> Result<(), Error> {
        println!("dispose {:?} (owning: {})", self.to_str(), owning_handle);
        if owning_handle {
            unsafe { libc::free(self.0.as_ptr() as *mut libc::c_void) };
        }
        Ok(())
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let mut greeting = CText::new("hello")?;
    greeting.touch(Some("printing"));
    println!("{}", greeting.get()?.to_str());
    greeting.close()?;

    if let Err(err) = greeting.close() {
        println!("second close: {}", err.untraced());
    }

    let name = CText::new("world")?;
    let (mut old, mut new) = name.transfer(|text| CText(text.0))?;
    old.close()?;
    println!("{} is still alive", new.get()?.to_str());
    new.close()?;

    let forgotten = CText::new("forgotten")?;
    drop(forgotten);

    Ok(())
}

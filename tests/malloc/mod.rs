//! Memory from the C allocator, wrapped the way a binding crate would wrap it.

use std::ptr::NonNull;
use std::slice;
use std::sync::atomic::{AtomicUsize, Ordering};

use nativeref::{DisposeHandle, Error, GuardedHandle};

/// Blocks allocated by [`MallocBlock::alloc`] and not yet freed.
pub static LIVE_BLOCKS: AtomicUsize = AtomicUsize::new(0);

pub struct MallocBlock {
    ptr: NonNull<u8>,
    len: usize,
}

impl MallocBlock {
    /// Allocates `len` zeroed bytes. `None` if the allocator is out of memory.
    pub fn alloc(len: usize) -> Option<GuardedHandle<MallocBlock>> {
        let ptr = unsafe { libc::calloc(len.max(1), 1) } as *mut u8;
        let ptr = NonNull::new(ptr)?;
        LIVE_BLOCKS.fetch_add(1, Ordering::SeqCst);
        Some(GuardedHandle::owning(MallocBlock { ptr, len }))
    }

    /// # Safety
    ///
    /// `ptr` must come from [`MallocBlock::alloc`], span `len` bytes and not be freed yet.
    pub unsafe fn from_raw(ptr: *mut u8, len: usize) -> MallocBlock {
        MallocBlock {
            ptr: NonNull::new(ptr).unwrap(),
            len,
        }
    }

    /// A second view of the same memory, for handing ownership over.
    pub fn adopt(block: &MallocBlock) -> MallocBlock {
        MallocBlock {
            ptr: block.ptr,
            len: block.len,
        }
    }

    pub fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    pub fn as_slice(&self) -> &[u8] {
        unsafe { slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        unsafe { slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }
}

impl DisposeHandle for MallocBlock {
    fn dispose_handle(&mut self, owning_handle: bool) -> Result<(), Error> {
        if owning_handle {
            unsafe { libc::free(self.ptr.as_ptr() as *mut libc::c_void) };
            LIVE_BLOCKS.fetch_sub(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

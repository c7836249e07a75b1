//! Device-style byte allocations backing tensors.
//!
//! A [`Storage`] behaves like a device pointer: it is a fixed-size, 16-byte aligned block that
//! any number of tensor views may address. Reads and writes go through raw pointers; callers that
//! mutate a storage are responsible for not racing with other writers of the same bytes, which
//! mirrors the contract of device memory handed to kernels.

use std::alloc::{self, Layout};
use std::fmt;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

const STORAGE_ALIGN: usize = 16;

static NEXT_STORAGE_ID: AtomicU64 = AtomicU64::new(1);

pub struct Storage {
    ptr: NonNull<u8>,
    layout: Layout,
    bytes: usize,
    id: u64,
}

// SAFETY: Storage owns its allocation exclusively; concurrent access to the bytes follows the
// device-memory contract documented on the module.
unsafe impl Send for Storage {}
// SAFETY: See above. Shared references only expose raw pointers and explicit copy helpers.
unsafe impl Sync for Storage {}

impl fmt::Debug for Storage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Storage")
            .field("id", &self.id)
            .field("ptr", &self.ptr)
            .field("bytes", &self.bytes)
            .finish()
    }
}

impl Storage {
    /// Allocates `bytes` zero-initialised bytes.
    pub fn zeroed(bytes: usize) -> Arc<Self> {
        let layout = Layout::from_size_align(bytes.max(STORAGE_ALIGN), STORAGE_ALIGN)
            .expect("storage allocation size overflows isize");
        // SAFETY: layout has a non-zero size.
        let raw = unsafe { alloc::alloc_zeroed(layout) };
        let ptr = NonNull::new(raw).unwrap_or_else(|| alloc::handle_alloc_error(layout));
        Arc::new(Self {
            ptr,
            layout,
            bytes,
            id: NEXT_STORAGE_ID.fetch_add(1, Ordering::Relaxed),
        })
    }

    /// Allocates a storage holding a copy of `bytes`.
    pub fn from_bytes(bytes: &[u8]) -> Arc<Self> {
        let storage = Self::zeroed(bytes.len());
        // SAFETY: the allocation was just created with exactly `bytes.len()` usable bytes.
        unsafe { storage.write_bytes(0, bytes) };
        storage
    }

    pub fn bytes(&self) -> usize {
        self.bytes
    }

    /// Process-unique identity used by overlap checks.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    /// Address of the first byte, in the integer form kernels receive.
    pub fn device_ptr(&self) -> u64 {
        self.ptr.as_ptr() as u64
    }

    pub fn read_to_vec(&self) -> Vec<u8> {
        let mut out = vec![0u8; self.bytes];
        // SAFETY: the allocation holds `self.bytes` initialised bytes.
        unsafe { std::ptr::copy_nonoverlapping(self.ptr.as_ptr(), out.as_mut_ptr(), self.bytes) };
        out
    }

    /// Copies `src` into the storage starting at byte `offset`.
    ///
    /// # Safety
    /// `offset + src.len()` must not exceed [`Storage::bytes`], and no other thread may access
    /// the destination bytes concurrently.
    pub unsafe fn write_bytes(&self, offset: usize, src: &[u8]) {
        debug_assert!(offset + src.len() <= self.bytes);
        std::ptr::copy_nonoverlapping(src.as_ptr(), self.ptr.as_ptr().add(offset), src.len());
    }
}

impl Drop for Storage {
    fn drop(&mut self) {
        // SAFETY: pointer and layout come from the matching allocation in `zeroed`.
        unsafe { alloc::dealloc(self.ptr.as_ptr(), self.layout) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storages_are_aligned_and_distinct() {
        let a = Storage::zeroed(3);
        let b = Storage::from_bytes(&[1, 2, 3, 4]);
        assert_eq!(a.device_ptr() % STORAGE_ALIGN as u64, 0);
        assert_ne!(a.id(), b.id());
        assert_eq!(a.read_to_vec(), vec![0, 0, 0]);
        assert_eq!(b.read_to_vec(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn zero_sized_storage_is_valid() {
        let empty = Storage::zeroed(0);
        assert_eq!(empty.bytes(), 0);
        assert!(empty.read_to_vec().is_empty());
    }
}

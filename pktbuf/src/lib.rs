//! Fixed-size owned packet buffers.
//!
//! Every frame that moves through the driver and the network stack lives in
//! exactly one `PacketBuf`. The buffer is a single page, so a maximal frame
//! (Ethernet + IP + UDP headers plus payload) always fits, and the handle
//! moves between owners (ring slot, dispatcher, socket queue, consumer) by
//! value, so a release can only ever happen once.
//!
//! # Design Philosophy
//!
//! - **Single owner**: no sharing, no refcounts; handoff is a move
//! - **Fallible allocation**: `try_new` returns `None` instead of aborting
//! - **Page granularity**: one 4 KiB page per buffer, page aligned

#![no_std]

extern crate alloc;

#[cfg(test)]
extern crate std;

use alloc::alloc::{alloc_zeroed, dealloc, Layout};
use core::ptr::NonNull;

/// Page size (4KB). One buffer occupies exactly one page.
pub const PAGE_SIZE: usize = 4096;

/// An owned, page-aligned, zero-initialized packet buffer.
pub struct PacketBuf {
    ptr: NonNull<u8>,
}

impl PacketBuf {
    /// Buffer capacity in bytes.
    pub const SIZE: usize = PAGE_SIZE;

    // PAGE_SIZE is a power of two and the size does not overflow.
    const LAYOUT: Layout =
        unsafe { Layout::from_size_align_unchecked(PAGE_SIZE, PAGE_SIZE) };

    /// Allocate a zero-filled buffer.
    ///
    /// Returns `None` when the allocator is exhausted; the caller decides
    /// whether that is fatal (it is on the receive-ring refill path).
    pub fn try_new() -> Option<Self> {
        let ptr = unsafe { alloc_zeroed(Self::LAYOUT) };
        NonNull::new(ptr).map(|ptr| Self { ptr })
    }

    /// Buffer contents.
    pub fn as_slice(&self) -> &[u8] {
        unsafe { core::slice::from_raw_parts(self.ptr.as_ptr(), Self::SIZE) }
    }

    /// Buffer contents, mutably.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        unsafe { core::slice::from_raw_parts_mut(self.ptr.as_ptr(), Self::SIZE) }
    }

    /// Device-visible address of the storage.
    ///
    /// The embedding kernel maps packet memory identity (physical ==
    /// kernel-virtual), so the CPU pointer doubles as the DMA address.
    pub fn dma_addr(&self) -> u64 {
        self.ptr.as_ptr() as u64
    }
}

impl Drop for PacketBuf {
    fn drop(&mut self) {
        unsafe { dealloc(self.ptr.as_ptr(), Self::LAYOUT) };
    }
}

// The handle is exclusively owned storage and may cross interrupt/process
// boundaries.
unsafe impl Send for PacketBuf {}
unsafe impl Sync for PacketBuf {}

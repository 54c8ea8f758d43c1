//! DMA-visible memory
//!
//! The HBA reads command lists and tables and writes received FISes and data
//! through physical addresses, so every buffer it touches carries both its
//! CPU-side pointer and the bus address programmed into the registers.

use alloc::alloc::{Layout, alloc_zeroed, dealloc};
use core::ptr::NonNull;

/// A zeroed block of memory the device can reach by physical address
#[derive(Debug)]
pub struct DmaBuffer {
    phys: u64,
    virt: NonNull<u8>,
    size: usize,
    align: usize,
}

impl DmaBuffer {
    /// Wrap an existing DMA-visible block
    ///
    /// # Safety
    ///
    /// `virt` must be valid for reads and writes of `size` bytes and must be
    /// reachable by the device at `phys` until the buffer is released.
    pub unsafe fn from_raw(phys: u64, virt: NonNull<u8>, size: usize, align: usize) -> Self {
        Self {
            phys,
            virt,
            size,
            align,
        }
    }

    /// Bus address programmed into device registers and descriptors
    #[inline]
    pub fn phys_addr(&self) -> u64 {
        self.phys
    }

    /// CPU-side pointer to the start of the buffer
    #[inline]
    pub fn as_ptr(&self) -> *mut u8 {
        self.virt.as_ptr()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.size
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    #[inline]
    pub fn align(&self) -> usize {
        self.align
    }

    pub fn as_slice(&self) -> &[u8] {
        unsafe { core::slice::from_raw_parts(self.virt.as_ptr(), self.size) }
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        unsafe { core::slice::from_raw_parts_mut(self.virt.as_ptr(), self.size) }
    }

    /// Zero the whole buffer
    pub fn clear(&mut self) {
        self.as_mut_slice().fill(0);
    }
}

/// Provider of DMA-visible memory
pub trait DmaMemory {
    /// Reserve `size` zeroed bytes aligned to `align`
    fn allocate(&mut self, size: usize, align: usize) -> Option<DmaBuffer>;

    /// Return a buffer obtained from [`DmaMemory::allocate`]
    fn release(&mut self, buffer: DmaBuffer);
}

impl<D: DmaMemory + ?Sized> DmaMemory for &mut D {
    fn allocate(&mut self, size: usize, align: usize) -> Option<DmaBuffer> {
        (**self).allocate(size, align)
    }

    fn release(&mut self, buffer: DmaBuffer) {
        (**self).release(buffer)
    }
}

/// DMA provider backed by the global allocator
///
/// Only valid where the heap is identity mapped and below the device's
/// addressing limit, as in firmware running with paging off or 1:1 tables.
#[derive(Debug, Default)]
pub struct HeapDma {
    outstanding: usize,
}

impl HeapDma {
    pub const fn new() -> Self {
        Self { outstanding: 0 }
    }

    /// Number of buffers handed out and not yet released
    pub fn outstanding(&self) -> usize {
        self.outstanding
    }
}

impl DmaMemory for HeapDma {
    fn allocate(&mut self, size: usize, align: usize) -> Option<DmaBuffer> {
        let layout = Layout::from_size_align(size.max(1), align).ok()?;
        let virt = NonNull::new(unsafe { alloc_zeroed(layout) })?;
        self.outstanding += 1;
        Some(unsafe { DmaBuffer::from_raw(virt.as_ptr() as u64, virt, size, align) })
    }

    fn release(&mut self, buffer: DmaBuffer) {
        let Ok(layout) = Layout::from_size_align(buffer.size.max(1), buffer.align) else {
            log::error!("DMA: cannot release buffer at {:#x}", buffer.phys);
            return;
        };
        unsafe { dealloc(buffer.virt.as_ptr(), layout) };
        self.outstanding = self.outstanding.saturating_sub(1);
    }
}

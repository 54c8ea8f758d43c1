//! Memory-mapped register access
//!
//! Drivers reach hardware registers through [`RegisterIo`], a 32-bit
//! offset-addressed window. [`MmioRegion`] is the volatile implementation
//! backed by tock-registers cells; tests substitute a simulated register file.
//!
//! # Example
//!
//! ```rust,ignore
//! use crate::drivers::mmio::{MmioRegion, RegisterIo};
//!
//! let mmio = unsafe { MmioRegion::new(0xFEBF_0000, 0x1000) }.unwrap();
//! let cap = mmio.read32(0x00);
//! mmio.modify32(0x04, |ghc| ghc | 1 << 31);
//! ```

use core::ptr::NonNull;
use tock_registers::interfaces::{Readable, Writeable};
use tock_registers::registers::ReadWrite;

/// 32-bit register window addressed by byte offset
pub trait RegisterIo {
    /// Read the 32-bit register at `offset`
    fn read32(&self, offset: u64) -> u32;

    /// Write the 32-bit register at `offset`
    fn write32(&self, offset: u64, value: u32);

    /// Read-modify-write the 32-bit register at `offset`
    #[inline]
    fn modify32<F>(&self, offset: u64, f: F)
    where
        F: FnOnce(u32) -> u32,
        Self: Sized,
    {
        let old = self.read32(offset);
        self.write32(offset, f(old));
    }
}

impl<T: RegisterIo> RegisterIo for &T {
    fn read32(&self, offset: u64) -> u32 {
        (**self).read32(offset)
    }

    fn write32(&self, offset: u64, value: u32) {
        (**self).write32(offset, value)
    }
}

/// A memory-mapped I/O region providing volatile register access.
///
/// In debug builds every access is bounds checked against the region size.
#[derive(Clone, Copy)]
pub struct MmioRegion {
    /// Virtual base address of the region
    base: NonNull<u8>,
    /// Size of the region in bytes
    #[cfg(debug_assertions)]
    size: usize,
}

// SAFETY: MmioRegion only holds a pointer into device register space, which
// stays mapped for as long as the owning session keeps it.
unsafe impl Send for MmioRegion {}
unsafe impl Sync for MmioRegion {}

impl MmioRegion {
    /// Create a region over `[base, base + size)`.
    ///
    /// Returns `None` for a null base.
    ///
    /// # Safety
    ///
    /// The range must be mapped for device access and stay mapped for the
    /// lifetime of the returned value.
    pub unsafe fn new(base: u64, #[allow(unused_variables)] size: usize) -> Option<Self> {
        let ptr = NonNull::new(base as *mut u8)?;
        Some(Self {
            base: ptr,
            #[cfg(debug_assertions)]
            size,
        })
    }

    /// Virtual base address of this region.
    #[inline]
    pub fn base(&self) -> u64 {
        self.base.as_ptr() as u64
    }

    #[cfg(debug_assertions)]
    #[inline]
    fn check_bounds(&self, offset: u64, access_size: usize) {
        let end = (offset as usize).saturating_add(access_size);
        assert!(
            end <= self.size,
            "MMIO access out of bounds: offset={:#x}, access_size={}, region_size={:#x}",
            offset,
            access_size,
            self.size
        );
    }

    #[inline]
    fn cell(&self, offset: u64) -> &ReadWrite<u32> {
        #[cfg(debug_assertions)]
        self.check_bounds(offset, 4);

        unsafe { &*(self.base.as_ptr().add(offset as usize) as *const ReadWrite<u32>) }
    }
}

impl RegisterIo for MmioRegion {
    #[inline]
    fn read32(&self, offset: u64) -> u32 {
        self.cell(offset).get()
    }

    #[inline]
    fn write32(&self, offset: u64, value: u32) {
        self.cell(offset).set(value)
    }
}

impl core::fmt::Debug for MmioRegion {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let mut s = f.debug_struct("MmioRegion");
        s.field("base", &format_args!("{:#x}", self.base()));
        #[cfg(debug_assertions)]
        s.field("size", &format_args!("{:#x}", self.size));
        s.finish()
    }
}

/// Maps physical device memory into the driver's address space
pub trait PhysMapper {
    /// Map `size` bytes at physical address `phys`, returning the virtual base
    fn map(&mut self, phys: u64, size: usize) -> Option<u64>;

    /// Release a mapping previously returned by [`PhysMapper::map`]
    fn unmap(&mut self, virt: u64, size: usize);
}

/// Mapper for environments where physical memory is identity mapped
#[derive(Debug, Default, Clone, Copy)]
pub struct IdentityMapper;

impl PhysMapper for IdentityMapper {
    fn map(&mut self, phys: u64, _size: usize) -> Option<u64> {
        (phys != 0).then_some(phys)
    }

    fn unmap(&mut self, _virt: u64, _size: usize) {}
}

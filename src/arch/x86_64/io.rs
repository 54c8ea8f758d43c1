//! Port-mapped I/O helpers

use x86_64::instructions::port::Port;

/// Read a byte from an I/O port
///
/// # Safety
///
/// The port must belong to a device that tolerates the read.
#[inline]
pub unsafe fn inb(port: u16) -> u8 {
    Port::<u8>::new(port).read()
}

/// Write a byte to an I/O port
///
/// # Safety
///
/// The port must belong to a device that tolerates the write.
#[inline]
pub unsafe fn outb(port: u16, value: u8) {
    Port::<u8>::new(port).write(value)
}

/// Read a dword from an I/O port
///
/// # Safety
///
/// The port must belong to a device that tolerates the read.
#[inline]
pub unsafe fn inl(port: u16) -> u32 {
    Port::<u32>::new(port).read()
}

/// Write a dword to an I/O port
///
/// # Safety
///
/// The port must belong to a device that tolerates the write.
#[inline]
pub unsafe fn outl(port: u16, value: u32) {
    Port::<u32>::new(port).write(value)
}

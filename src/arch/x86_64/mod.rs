//! x86_64 architecture support
//!
//! Port I/O and the time-stamp counter, the only CPU facilities the driver
//! touches directly.

pub mod io;

/// Read the Time Stamp Counter (TSC)
///
/// Returns the current value of the processor's time-stamp counter,
/// which increments at a constant rate (typically the processor's base frequency).
#[inline]
pub fn rdtsc() -> u64 {
    let lo: u32;
    let hi: u32;
    unsafe {
        core::arch::asm!(
            "rdtsc",
            out("eax") lo,
            out("edx") hi,
            options(nomem, nostack, preserves_flags)
        );
    }
    ((hi as u64) << 32) | (lo as u64)
}

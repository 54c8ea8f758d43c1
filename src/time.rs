//! Time and delay functions
//!
//! Every wait in the driver is a bounded busy-poll measured against a
//! monotonic [`Clock`]. The clock is a trait so the same polling code runs on
//! the TSC in firmware and on a simulated time base in tests.

#[cfg(target_arch = "x86_64")]
use crate::arch::x86_64::{io, rdtsc};

/// A monotonic high-resolution time source
pub trait Clock {
    /// Current tick count
    fn ticks(&self) -> u64;

    /// Number of ticks per second
    fn ticks_per_second(&self) -> u64;

    /// Convert milliseconds to ticks for this clock
    #[inline]
    fn ms_to_ticks(&self, ms: u64) -> u64 {
        ((ms as u128 * self.ticks_per_second() as u128) / 1000) as u64
    }

    /// Milliseconds elapsed since the tick value `start`
    #[inline]
    fn elapsed_ms(&self, start: u64) -> u64 {
        let elapsed = self.ticks().wrapping_sub(start);
        ((elapsed as u128 * 1000) / self.ticks_per_second().max(1) as u128) as u64
    }
}

impl<C: Clock + ?Sized> Clock for &C {
    fn ticks(&self) -> u64 {
        (**self).ticks()
    }

    fn ticks_per_second(&self) -> u64 {
        (**self).ticks_per_second()
    }
}

/// TSC-backed clock
///
/// The TSC frequency is either supplied by the caller or measured against the
/// ACPI PM timer, which runs at a fixed 3.579545 MHz.
#[cfg(target_arch = "x86_64")]
#[derive(Debug, Clone, Copy)]
pub struct TscClock {
    freq_hz: u64,
}

/// ACPI PM timer frequency: 3.579545 MHz
#[cfg(target_arch = "x86_64")]
const PM_TIMER_FREQ: u64 = 3_579_545;

/// Fallback when calibration is impossible
#[cfg(target_arch = "x86_64")]
const DEFAULT_TSC_FREQ_HZ: u64 = 2_000_000_000;

#[cfg(target_arch = "x86_64")]
impl TscClock {
    /// Create a clock with a known TSC frequency
    pub const fn new(freq_hz: u64) -> Self {
        Self { freq_hz }
    }

    /// Calibrate the TSC against the ACPI PM timer at I/O port `port`
    ///
    /// Measures TSC ticks over ~50ms of PM timer ticks. Falls back to a
    /// 2 GHz estimate if the port is zero.
    pub fn calibrate_with_pm_timer(port: u16, is_32bit: bool) -> Self {
        if port == 0 {
            log::warn!("TSC calibration skipped, using default 2 GHz estimate");
            return Self::new(DEFAULT_TSC_FREQ_HZ);
        }

        let mask: u32 = if is_32bit { 0xFFFF_FFFF } else { 0x00FF_FFFF };
        let read = || unsafe { io::inl(port) } & mask;

        // Synchronize on a PM timer edge
        let last = read();
        while read() == last {
            core::hint::spin_loop();
        }

        // 50ms = 178,977 PM timer ticks
        const CALIBRATION_TICKS: u32 = 178_977;

        let pm_start = read();
        let tsc_start = rdtsc();
        while read().wrapping_sub(pm_start) & mask < CALIBRATION_TICKS {
            core::hint::spin_loop();
        }
        let tsc_end = rdtsc();
        let pm_elapsed = read().wrapping_sub(pm_start) & mask;

        let tsc_elapsed = tsc_end.wrapping_sub(tsc_start);
        let freq = (tsc_elapsed as u128 * PM_TIMER_FREQ as u128 / pm_elapsed as u128) as u64;

        log::info!("TSC calibrated: {} MHz", freq / 1_000_000);
        Self::new(freq)
    }
}

#[cfg(target_arch = "x86_64")]
impl Clock for TscClock {
    #[inline]
    fn ticks(&self) -> u64 {
        rdtsc()
    }

    #[inline]
    fn ticks_per_second(&self) -> u64 {
        self.freq_hz
    }
}

/// A deadline-based timeout for polling loops
///
/// ```ignore
/// let timeout = Timeout::from_ms(&clock, 1000);
/// while !timeout.is_expired() {
///     if check_condition() {
///         return Ok(());
///     }
///     core::hint::spin_loop();
/// }
/// ```
#[derive(Clone, Copy)]
pub struct Timeout<'c, C: Clock + ?Sized> {
    clock: &'c C,
    start: u64,
    budget: u64,
}

impl<'c, C: Clock + ?Sized> Timeout<'c, C> {
    /// Create a timeout that expires `ms` milliseconds from now
    #[inline]
    pub fn from_ms(clock: &'c C, ms: u64) -> Self {
        Self {
            clock,
            start: clock.ticks(),
            budget: clock.ms_to_ticks(ms),
        }
    }

    /// Check if the timeout has expired
    #[inline]
    pub fn is_expired(&self) -> bool {
        self.clock.ticks().wrapping_sub(self.start) >= self.budget
    }

    /// Milliseconds since the timeout was armed
    #[inline]
    pub fn elapsed_ms(&self) -> u64 {
        self.clock.elapsed_ms(self.start)
    }
}

/// Spin-wait for `ms` milliseconds
#[inline]
pub fn delay_ms<C: Clock + ?Sized>(clock: &C, ms: u64) {
    let timeout = Timeout::from_ms(clock, ms);
    while !timeout.is_expired() {
        core::hint::spin_loop();
    }
}

/// Retry `condition` every `interval_ms` until it holds or `budget_ms` runs out
///
/// The condition is evaluated immediately, then after each interval. It may
/// have side effects (rewriting a register that needs repeated writes to
/// latch, for instance). Returns `true` if the condition was met.
pub fn poll_until<C, F>(clock: &C, budget_ms: u64, interval_ms: u64, mut condition: F) -> bool
where
    C: Clock + ?Sized,
    F: FnMut() -> bool,
{
    let timeout = Timeout::from_ms(clock, budget_ms);
    loop {
        if condition() {
            return true;
        }
        if timeout.is_expired() {
            return false;
        }
        if interval_ms == 0 {
            core::hint::spin_loop();
        } else {
            delay_ms(clock, interval_ms);
        }
    }
}

/// Run `attempt` up to `attempts` times, sleeping `interval_ms` after each miss
///
/// For hardware that has to be poked a fixed number of times rather than
/// watched for a duration. Returns `true` on the first successful attempt.
pub fn retry<C, F>(clock: &C, attempts: u32, interval_ms: u64, mut attempt: F) -> bool
where
    C: Clock + ?Sized,
    F: FnMut() -> bool,
{
    for _ in 0..attempts {
        if attempt() {
            return true;
        }
        delay_ms(clock, interval_ms);
    }
    false
}

/// Wait for a condition to become true, spinning without a poll interval
///
/// ```ignore
/// if !wait_for(&clock, 1000, || !hba.reset_pending()) {
///     return Err(AhciError::ControllerResetTimeout);
/// }
/// ```
#[inline]
pub fn wait_for<C, F>(clock: &C, timeout_ms: u64, condition: F) -> bool
where
    C: Clock + ?Sized,
    F: FnMut() -> bool,
{
    poll_until(clock, timeout_ms, 0, condition)
}

/// Simulated clock that advances a fixed step on every read
#[cfg(test)]
pub(crate) mod sim {
    use super::Clock;
    use core::cell::Cell;

    /// One tick per microsecond
    pub const TICKS_PER_SECOND: u64 = 1_000_000;

    pub struct SimClock {
        now: Cell<u64>,
        step: u64,
    }

    impl SimClock {
        /// Clock that advances `step_us` microseconds per read
        pub fn new(step_us: u64) -> Self {
            Self {
                now: Cell::new(0),
                step: step_us,
            }
        }

        pub fn now_ms(&self) -> u64 {
            self.now.get() / 1000
        }

        pub fn advance_ms(&self, ms: u64) {
            self.now.set(self.now.get() + ms * 1000);
        }
    }

    impl Clock for SimClock {
        fn ticks(&self) -> u64 {
            let now = self.now.get();
            self.now.set(now + self.step);
            now
        }

        fn ticks_per_second(&self) -> u64 {
            TICKS_PER_SECOND
        }
    }
}

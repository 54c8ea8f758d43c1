//! 16550 UART serial port used as the log sink
//!
//! Only the transmit side is implemented; the driver never reads from the
//! console.

use core::fmt::{self, Write};
use spin::Mutex;

#[cfg(target_arch = "x86_64")]
use crate::arch::x86_64::io;

/// Standard COM1 port address
pub const COM1: u16 = 0x3F8;

/// Serial port register offsets
mod registers {
    pub const DATA: u16 = 0; // Data register (read/write)
    pub const IER: u16 = 1; // Interrupt Enable Register
    pub const FCR: u16 = 2; // FIFO Control Register
    pub const LCR: u16 = 3; // Line Control Register
    pub const MCR: u16 = 4; // Modem Control Register
    pub const LSR: u16 = 5; // Line Status Register
    pub const SCRATCH: u16 = 7; // Scratch register
    pub const DLL: u16 = 0; // Divisor Latch Low (when DLAB=1)
    pub const DLH: u16 = 1; // Divisor Latch High (when DLAB=1)
}

/// Line Status Register: transmit holding register empty
const LSR_TX_EMPTY: u8 = 1 << 5;

/// Line Control Register bits
mod lcr {
    pub const WORD_LENGTH_8: u8 = 0x03;
    pub const DLAB: u8 = 0x80;
}

/// Maximum iterations to wait for TX ready (prevents infinite loop on missing hardware)
const TX_TIMEOUT_ITERATIONS: u32 = 100_000;

/// Global serial port instance
static SERIAL: Mutex<Option<SerialPort>> = Mutex::new(None);

/// A 16550 UART serial port
pub struct SerialPort {
    base: u16,
    functional: bool,
}

impl SerialPort {
    /// Create a new serial port at the given base address
    ///
    /// # Safety
    ///
    /// The base address must be a valid I/O port for a 16550 UART.
    pub const unsafe fn new(base: u16) -> Self {
        SerialPort {
            base,
            functional: false,
        }
    }

    /// Scratch register test: write a pattern and read it back
    fn detect(&self) -> bool {
        unsafe {
            for pattern in [0x55, 0xAA] {
                self.write_reg(registers::SCRATCH, pattern);
                if self.read_reg(registers::SCRATCH) != pattern {
                    return false;
                }
            }
            // An unpopulated port floats to 0xFF
            self.read_reg(registers::LSR) != 0xFF
        }
    }

    /// Program 8N1 at `baud`; returns false if no UART answers
    pub fn init(&mut self, baud: u32) -> bool {
        if !self.detect() {
            self.functional = false;
            return false;
        }

        let divisor = 115200 / baud.max(1);

        unsafe {
            self.write_reg(registers::IER, 0x00);
            self.write_reg(registers::LCR, lcr::DLAB);
            self.write_reg(registers::DLL, (divisor & 0xFF) as u8);
            self.write_reg(registers::DLH, ((divisor >> 8) & 0xFF) as u8);
            self.write_reg(registers::LCR, lcr::WORD_LENGTH_8);
            // Enable and clear FIFOs, 14-byte threshold
            self.write_reg(registers::FCR, 0xC7);
            self.write_reg(registers::MCR, 0x0B);
        }

        self.functional = true;
        true
    }

    /// Write a byte, giving up on a UART that never drains
    pub fn write_byte(&mut self, byte: u8) {
        if !self.functional {
            return;
        }

        unsafe {
            let mut timeout = TX_TIMEOUT_ITERATIONS;
            while (self.read_reg(registers::LSR) & LSR_TX_EMPTY) == 0 {
                timeout -= 1;
                if timeout == 0 {
                    self.functional = false;
                    return;
                }
                core::hint::spin_loop();
            }

            self.write_reg(registers::DATA, byte);
        }
    }

    #[cfg(target_arch = "x86_64")]
    unsafe fn read_reg(&self, offset: u16) -> u8 {
        io::inb(self.base + offset)
    }

    #[cfg(target_arch = "x86_64")]
    unsafe fn write_reg(&self, offset: u16, value: u8) {
        io::outb(self.base + offset, value)
    }

    #[cfg(not(target_arch = "x86_64"))]
    unsafe fn read_reg(&self, _offset: u16) -> u8 {
        0xFF
    }

    #[cfg(not(target_arch = "x86_64"))]
    unsafe fn write_reg(&self, _offset: u16, _value: u8) {}
}

impl Write for SerialPort {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for byte in s.bytes() {
            if byte == b'\n' {
                self.write_byte(b'\r');
            }
            self.write_byte(byte);
        }
        Ok(())
    }
}

/// Initialize the global serial port
///
/// If no UART responds at `base`, output is silently dropped.
pub fn init(base: u16, baud: u32) -> bool {
    let mut serial = unsafe { SerialPort::new(base) };
    if serial.init(baud) {
        *SERIAL.lock() = Some(serial);
        true
    } else {
        false
    }
}

/// Write formatted output to the serial port
pub fn write_fmt(args: fmt::Arguments) {
    if let Some(ref mut serial) = *SERIAL.lock() {
        let _ = serial.write_fmt(args);
    }
}

/// Macro for printing to serial
#[macro_export]
macro_rules! serial_print {
    ($($arg:tt)*) => {
        $crate::drivers::serial::write_fmt(format_args!($($arg)*))
    };
}

/// Macro for printing to serial with newline
#[macro_export]
macro_rules! serial_println {
    () => ($crate::serial_print!("\n"));
    ($($arg:tt)*) => ($crate::serial_print!("{}\n", format_args!($($arg)*)));
}

//! Logging infrastructure
//!
//! Routes the `log` facade to the serial port.

use log::{Level, LevelFilter, Metadata, Record, SetLoggerError};

use crate::drivers::serial;

/// Serial logger implementation
struct SerialLogger;

impl log::Log for SerialLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let level_str = match record.level() {
                Level::Error => "\x1b[31mERROR\x1b[0m",
                Level::Warn => "\x1b[33mWARN\x1b[0m ",
                Level::Info => "\x1b[32mINFO\x1b[0m ",
                Level::Debug => "\x1b[34mDEBUG\x1b[0m",
                Level::Trace => "\x1b[35mTRACE\x1b[0m",
            };

            // Format: [LEVEL] target: message
            crate::serial_println!("[{}] {}: {}", level_str, record.target(), record.args());
        }
    }

    fn flush(&self) {}
}

static LOGGER: SerialLogger = SerialLogger;

/// Bring up the UART at `port` and install the serial logger
pub fn init(port: u16, level: LevelFilter) -> Result<(), SetLoggerError> {
    serial::init(port, 115200);
    log::set_logger(&LOGGER).map(|()| log::set_max_level(level))
}

/// Initialize on COM1 at debug level
pub fn init_default() -> Result<(), SetLoggerError> {
    init(serial::COM1, LevelFilter::Debug)
}

/// Set the maximum log level
pub fn set_level(level: LevelFilter) {
    log::set_max_level(level);
}

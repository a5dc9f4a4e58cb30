//! Routes the [`log`] facade to the serial port, mirroring the shape of the
//! QEMU debug-port logger this bootloader's allocator was built alongside.

use crate::serial::SerialPort;
use boot_sync::SpinLock;
use core::fmt::Write;
use log::{LevelFilter, Log, Metadata, Record, SetLoggerError};

pub struct SerialLogger {
    port: SpinLock<SerialPort>,
    max_level: LevelFilter,
}

impl SerialLogger {
    /// # Safety
    /// See [`SerialPort::init_com1`]: must run at most once.
    pub unsafe fn new(max_level: LevelFilter) -> Self {
        Self {
            port: SpinLock::new(unsafe { SerialPort::init_com1() }),
            max_level,
        }
    }

    /// Install `self` as the global logger. Only the first call across the
    /// process takes effect, matching [`log::set_logger`]'s own contract.
    pub fn install(self: &'static Self) -> Result<(), SetLoggerError> {
        log::set_logger(self)?;
        log::set_max_level(self.max_level);
        Ok(())
    }
}

impl Log for SerialLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.max_level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        self.port.with_lock(|port| {
            let _ = writeln!(port, "[{}] {}: {}", record.level(), record.target(), record.args());
        });
    }

    fn flush(&self) {}
}

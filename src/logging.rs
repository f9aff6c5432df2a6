use crate::drivers::PERIPHERALS_BASE;
use core::fmt::Write;
use log::{LevelFilter, Log, Metadata, Record};

// PL011 UART data register
const UART0_DR: usize = PERIPHERALS_BASE + 0x20_1000;

pub struct SerialConsole;

impl core::fmt::Write for SerialConsole {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        for byte in s.bytes() {
            // SAFETY: We know that PL011 UART's data register is behind this address
            unsafe {
                core::ptr::write_volatile(UART0_DR as *mut u8, byte);
            }
        }
        Ok(())
    }
}

struct ConsoleLogger;

static LOGGER: ConsoleLogger = ConsoleLogger;

impl Log for ConsoleLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        // Nowhere to report a failed console write
        let _ = writeln!(
            SerialConsole,
            "[{:<5}] {}: {}",
            record.level(),
            record.target(),
            record.args()
        );
    }

    fn flush(&self) {}
}

/// Routes the `log` macros to the serial console.
pub fn init(level: LevelFilter) {
    // Only fails if a logger is already installed, which is fine
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(level);
    }
}

//! # LPUART Driver
//!
//! A polling driver for the LPUART: bytes are sent as soon as STAT.TDRE is set, and strings are
//! considered sent once STAT.TC is set.

use core::fmt;

use super::{wait_flag, Bus, DriverError, DEFAULT_POLL_BUDGET};
use crate::device::lpuart::{
    CTRL_OFFSET, CTRL_RE, CTRL_TE, DATA_OFFSET, FIFO_OFFSET, GLOBAL_EN, GLOBAL_OFFSET, GLOBAL_RST,
    STAT_OFFSET, STAT_RDRF, STAT_TC, STAT_TDRE,
};

pub struct LpuartDriver<'b, B: ?Sized> {
    bus: &'b B,
    base: usize,
    poll_budget: usize,
}

impl<'b, B: Bus + ?Sized> LpuartDriver<'b, B> {
    pub const fn new(bus: &'b B, base: usize) -> Self {
        LpuartDriver {
            bus,
            base,
            poll_budget: DEFAULT_POLL_BUDGET,
        }
    }

    pub const fn with_poll_budget(mut self, poll_budget: usize) -> Self {
        self.poll_budget = poll_budget;
        self
    }

    fn read(&self, offset: usize) -> Result<u32, DriverError> {
        self.bus.read32(self.base + offset).map_err(DriverError::Bus)
    }

    fn write(&self, offset: usize, value: u32) -> Result<(), DriverError> {
        self.bus
            .write32(self.base + offset, value)
            .map_err(DriverError::Bus)
    }

    fn wait(&self, flag: u32) -> Result<(), DriverError> {
        wait_flag(self.poll_budget, flag, true, || self.read(STAT_OFFSET))
    }

    /// Resets the module, then enables the transmitter and the receiver.
    pub fn init(&self) -> Result<(), DriverError> {
        self.write(GLOBAL_OFFSET, GLOBAL_RST)?;
        self.write(GLOBAL_OFFSET, 0)?;
        self.write(GLOBAL_OFFSET, GLOBAL_EN)?;
        self.write(CTRL_OFFSET, CTRL_TE | CTRL_RE)
    }

    pub fn send_byte(&self, byte: u8) -> Result<(), DriverError> {
        self.wait(STAT_TDRE)?;
        self.write(DATA_OFFSET, byte as u32)
    }

    /// Sends a string and waits for the end of the transmission.
    pub fn send_str(&self, s: &str) -> Result<(), DriverError> {
        for byte in s.bytes() {
            self.send_byte(byte)?;
        }
        self.wait(STAT_TC)
    }

    /// Waits for a byte to be received.
    pub fn receive_byte(&self) -> Result<u8, DriverError> {
        self.wait(STAT_RDRF)?;
        Ok(self.read(DATA_OFFSET)? as u8)
    }

    pub fn status(&self) -> Result<u32, DriverError> {
        self.read(STAT_OFFSET)
    }

    /// Writes a summary of the status and FIFO registers.
    pub fn status_report(&self, out: &mut impl fmt::Write) -> Result<(), DriverError> {
        let stat = self.status()?;
        let fifo = self.read(FIFO_OFFSET)?;
        write_status_report(out, stat, fifo).map_err(|_| DriverError::Output)
    }
}

fn write_status_report(out: &mut impl fmt::Write, stat: u32, fifo: u32) -> fmt::Result {
    writeln!(out, " STAT Register: 0x{:08X}", stat)?;
    writeln!(out, " Status Bits:")?;
    for (bit, name, meaning) in [
        (STAT_TDRE, "TDRE", "TX Ready"),
        (STAT_TC, "TC", "TX Complete"),
        (STAT_RDRF, "RDRF", "RX Data Available"),
    ] {
        if stat & bit != 0 {
            writeln!(out, "  {}: SET ({})", name, meaning)?;
        } else {
            writeln!(out, "  {}: CLEAR", name)?;
        }
    }
    writeln!(out, " FIFO Register: 0x{:08X}", fifo)
}

impl<B: Bus + ?Sized> fmt::Write for LpuartDriver<'_, B> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.send_str(s).map_err(|err| {
            log::warn!("LPUART output failed: {}", err);
            fmt::Error
        })
    }
}

// ————————————————————————————————— Tests —————————————————————————————————— //

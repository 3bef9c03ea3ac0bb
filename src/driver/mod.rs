//! # Drivers
//!
//! Polling drivers for the LPUART and LPSPI, as used by the demo firmware. The drivers access
//! the registers through a [Bus], which can be the emulated board or any other physical address
//! space.

pub mod lpspi;
pub mod lpuart;

pub use lpspi::{LoopbackReport, LpspiDriver};
pub use lpuart::LpuartDriver;
use thiserror_no_std::Error;

use crate::device::Width;

/// Number of status register polls before giving up on a flag.
pub const DEFAULT_POLL_BUDGET: usize = 1000;

/// A physical address space.
pub trait Bus {
    fn read(&self, address: usize, width: Width) -> Result<u32, &'static str>;
    fn write(&self, address: usize, width: Width, value: u32) -> Result<(), &'static str>;

    fn read32(&self, address: usize) -> Result<u32, &'static str> {
        self.read(address, Width::Byte4)
    }

    fn write32(&self, address: usize, value: u32) -> Result<(), &'static str> {
        self.write(address, Width::Byte4, value)
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverError {
    #[error("timed out waiting for status flag 0x{flag:x}")]
    Timeout { flag: u32 },
    #[error("sent 0x{sent:02X} but received 0x{received:02X}")]
    DataMismatch { sent: u8, received: u8 },
    #[error("bus error: {0}")]
    Bus(&'static str),
    #[error("failed to write the report")]
    Output,
}

/// Polls a status register until `flag` reaches the expected state.
fn wait_flag(
    poll_budget: usize,
    flag: u32,
    set: bool,
    mut read_status: impl FnMut() -> Result<u32, DriverError>,
) -> Result<(), DriverError> {
    for _ in 0..poll_budget {
        if (read_status()? & flag != 0) == set {
            return Ok(());
        }
        core::hint::spin_loop();
    }
    Err(DriverError::Timeout { flag })
}

// ————————————————————————————————— Tests —————————————————————————————————— //

//! S32K3X8 peripheral models
//!
//! Register-level models of the LPUART and LPSPI blocks found on the NXP S32K3X8 family, meant
//! to be embedded in a machine emulator. The emulator's memory bus forwards guest loads and
//! stores to the devices through the [device::DeviceAccess] interface, and the devices talk to
//! the outside world through the traits of the [transport] module.
//!
//! The [platform] module wires the devices together into an S32K3X8EVB-like board, and the
//! [driver] module contains polling drivers mirroring the demo firmware, which can drive any
//! [driver::Bus] (the emulated board included).

// Mark the crate as no_std, but only when not running tests.
// We need std to be able to run tests in user-space on the host architecture.
#![cfg_attr(not(test), no_std)]

pub mod config;
pub mod debug;
pub mod device;
pub mod driver;
pub mod platform;
pub mod transport;

pub use config::{BoardConfig, ConfigError, LpspiConfig, LpuartConfig};
pub use platform::S32k3x8Evb;

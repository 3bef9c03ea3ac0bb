//! Platforms
//!
//! The memory map and interrupt wiring of the S32K3X8 SoC, and the boards built from them.

pub mod s32k3x8evb;

use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

pub use s32k3x8evb::S32k3x8Evb;

use crate::device::IrqLine;

// ——————————————————————————— SoC Memory Map ———————————————————————————— //

pub const FLASH_BASE: usize = 0x0040_0000;
pub const FLASH_SIZE: usize = 4 * 1024 * 1024;
pub const SRAM_BASE: usize = 0x2040_0000;
pub const SRAM_SIZE: usize = 1024 * 1024;

/// Base address of the LPUART exposed to the firmware.
pub const LPUART_BASE: usize = 0x4004_A000;

/// Base addresses of LPSPI0 to LPSPI5.
pub const LPSPI_BASES: [usize; 6] = [
    0x4035_8000,
    0x4035_C000,
    0x4036_0000,
    0x4036_4000,
    0x4036_8000,
    0x4036_C000,
];

/// Number of external interrupt lines of the NVIC.
pub const NB_IRQS: usize = 240;
/// Interrupt line of LPUART0, the other instances follow.
pub const LPUART0_IRQ: usize = 141;
/// Interrupt line of LPSPI0, the other instances follow.
pub const LPSPI0_IRQ: usize = 165;

pub const fn lpuart_irq(instance: u8) -> usize {
    LPUART0_IRQ + instance as usize
}

pub const fn lpspi_irq(instance: u8) -> usize {
    LPSPI0_IRQ + instance as usize
}

// ——————————————————————————— Interrupt Lines ——————————————————————————— //

/// The input of an interrupt controller connected to a device.
#[derive(Debug)]
pub struct IrqPin {
    level: AtomicBool,
    /// Number of low to high transitions.
    raised: AtomicUsize,
}

impl IrqPin {
    pub const fn new() -> Self {
        IrqPin {
            level: AtomicBool::new(false),
            raised: AtomicUsize::new(0),
        }
    }

    pub fn is_asserted(&self) -> bool {
        self.level.load(Ordering::SeqCst)
    }

    pub fn raise_count(&self) -> usize {
        self.raised.load(Ordering::SeqCst)
    }
}

impl Default for IrqPin {
    fn default() -> Self {
        Self::new()
    }
}

impl IrqLine for IrqPin {
    fn set_level(&self, asserted: bool) {
        let previous = self.level.swap(asserted, Ordering::SeqCst);
        if asserted && !previous {
            self.raised.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// A minimal interrupt controller: a bank of level-sensitive lines.
///
/// Prioritization and delivery to a CPU are not modelled, the controller only records the level
/// of each line.
#[derive(Debug)]
pub struct InterruptController<const N: usize> {
    pins: [IrqPin; N],
}

impl<const N: usize> InterruptController<N> {
    pub const fn new() -> Self {
        InterruptController {
            pins: [const { IrqPin::new() }; N],
        }
    }

    /// Returns the input pin for the given line, if it exists.
    pub fn pin(&self, line: usize) -> Option<&IrqPin> {
        self.pins.get(line)
    }

    pub fn is_asserted(&self, line: usize) -> bool {
        self.pin(line).is_some_and(IrqPin::is_asserted)
    }

    /// Iterates over the asserted lines.
    pub fn pending(&self) -> impl Iterator<Item = usize> + '_ {
        self.pins
            .iter()
            .enumerate()
            .filter(|(_, pin)| pin.is_asserted())
            .map(|(line, _)| line)
    }
}

impl<const N: usize> Default for InterruptController<N> {
    fn default() -> Self {
        Self::new()
    }
}

// ————————————————————————————————— Tests —————————————————————————————————— //

//! Base device classes
//!
//! The peripheral models are exposed to the memory bus through the [DeviceAccess] interface, and
//! drive their interrupt output through an [IrqLine].

pub mod fifo;
pub mod lpspi;
pub mod lpuart;
pub mod regs;

// ———————————————————————————— Virtual Devices ————————————————————————————— //

/// Represents different data widths:
///  - `Byte`: 8 bits (1 byte)
///  - `Byte2`: 16 bits (2 bytes)
///  - `Byte4`: 32 bits (4 bytes)
///  - `Byte8`: 64 bits (8 bytes)
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Width {
    Byte = 8,
    Byte2 = 16,
    Byte4 = 32,
    Byte8 = 64,
}

impl Width {
    pub fn to_bits(&self) -> usize {
        match self {
            Width::Byte => 8,
            Width::Byte2 => 16,
            Width::Byte4 => 32,
            Width::Byte8 => 64,
        }
    }

    pub fn to_bytes(&self) -> usize {
        self.to_bits() / 8
    }

    /// Mask covering the bits of a value of this width.
    pub fn mask(&self) -> u64 {
        match self {
            Width::Byte8 => u64::MAX,
            _ => (1 << self.to_bits()) - 1,
        }
    }
}

/// Represents a virtual memory-mapped device
pub struct VirtDevice<'a> {
    pub start_addr: usize,
    pub size: usize,
    pub name: &'static str,
    pub device_interface: &'a dyn DeviceAccess,
}

impl VirtDevice<'_> {
    pub fn contains(&self, address: usize) -> bool {
        address >= self.start_addr && address - self.start_addr < self.size
    }

    pub fn overlaps(&self, other: &VirtDevice) -> bool {
        self.start_addr < other.start_addr + other.size
            && other.start_addr < self.start_addr + self.size
    }
}

pub fn find_matching_device<'d, 'a>(
    address: usize,
    devices: &'d [VirtDevice<'a>],
) -> Option<&'d VirtDevice<'a>> {
    devices.iter().find(|device| device.contains(address))
}

/// The interface exposed by memory-mapped devices to the memory bus.
///
/// Offsets are relative to the start of the device region. Each call is a single atomic access
/// with respect to the other entry points of the device.
pub trait DeviceAccess: Sync + Send {
    fn read_device(&self, offset: usize, r_width: Width) -> Result<usize, &'static str>;
    fn write_device(&self, offset: usize, w_width: Width, value: usize)
        -> Result<(), &'static str>;
}

// ————————————————————————————— Interrupt Line ————————————————————————————— //

/// A level-triggered interrupt output.
///
/// Devices call [IrqLine::set_level] with the current level of their output after every access
/// that might change it, the consumer is expected to tolerate repeated calls with the same level.
pub trait IrqLine: Sync + Send {
    fn set_level(&self, asserted: bool);
}

// ————————————————————————————————— Tests —————————————————————————————————— //

//! Register file emulation
//!
//! Both peripheral models expose a sparse set of 32-bit registers. Each device describes its
//! registers with a static table of [Register] descriptors and implements [RegisterBank] to
//! provide the side effects of individual registers. The access checks (width, alignment, range,
//! access permissions), the sub-word merging and the interrupt re-evaluation are shared and live
//! in [read] and [write].

use core::fmt::Debug;

use crate::debug::guest_error;
use crate::device::Width;

// ——————————————————————————— Register Descriptors ————————————————————————— //

/// Access permissions of a register, as seen by the guest.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Access {
    ReadWrite,
    ReadOnly,
    WriteOnly,
}

/// Static description of a register.
#[derive(Clone, Copy, Debug)]
pub struct Register<R> {
    pub name: &'static str,
    /// Offset from the base of the device region.
    pub offset: usize,
    /// Number of bytes decoded by the register, 4 for all but windowed registers.
    pub span: usize,
    pub id: R,
    pub access: Access,
    /// Power-on value.
    pub reset: u32,
    /// Write-1-to-clear bits.
    pub w1c: u32,
}

impl<R: Copy> Register<R> {
    const fn new(name: &'static str, offset: usize, id: R, access: Access, reset: u32) -> Self {
        Register {
            name,
            offset,
            span: 4,
            id,
            access,
            reset,
            w1c: 0,
        }
    }

    pub const fn rw(name: &'static str, offset: usize, id: R, reset: u32) -> Self {
        Self::new(name, offset, id, Access::ReadWrite, reset)
    }

    pub const fn ro(name: &'static str, offset: usize, id: R, reset: u32) -> Self {
        Self::new(name, offset, id, Access::ReadOnly, reset)
    }

    pub const fn wo(name: &'static str, offset: usize, id: R) -> Self {
        Self::new(name, offset, id, Access::WriteOnly, 0)
    }

    pub const fn with_w1c(mut self, mask: u32) -> Self {
        self.w1c = mask;
        self
    }

    pub const fn with_span(mut self, span: usize) -> Self {
        self.span = span;
        self
    }

    pub fn contains(&self, offset: usize) -> bool {
        offset >= self.offset && offset - self.offset < self.span
    }

    pub fn is_readable(&self) -> bool {
        self.access != Access::WriteOnly
    }

    pub fn is_writable(&self) -> bool {
        self.access != Access::ReadOnly
    }
}

/// Returns the register decoding the given offset, if any.
pub fn lookup<R: Copy>(map: &'static [Register<R>], offset: usize) -> Option<&'static Register<R>> {
    map.iter().find(|reg| reg.contains(offset))
}

// ————————————————————————————— Register File —————————————————————————————— //

/// Backing storage for the registers of a device, indexed by register id.
#[derive(Clone, Debug)]
pub struct RegisterFile<const N: usize> {
    words: [u32; N],
}

impl<const N: usize> RegisterFile<N> {
    pub const fn new() -> Self {
        RegisterFile { words: [0; N] }
    }

    /// Restores the power-on value of every register in the map.
    pub fn reset<R: Copy + Into<usize>>(&mut self, map: &[Register<R>]) {
        self.words = [0; N];
        for reg in map {
            self.words[reg.id.into()] = reg.reset;
        }
    }

    pub fn get<R: Into<usize>>(&self, id: R) -> u32 {
        self.words[id.into()]
    }

    pub fn set<R: Into<usize>>(&mut self, id: R, value: u32) {
        self.words[id.into()] = value;
    }

    pub fn set_bits<R: Into<usize>>(&mut self, id: R, bits: u32) {
        self.words[id.into()] |= bits;
    }

    pub fn clear_bits<R: Into<usize>>(&mut self, id: R, bits: u32) {
        self.words[id.into()] &= !bits;
    }

    /// Sets or clears `bits` depending on `cond`.
    pub fn assign_bits<R: Into<usize>>(&mut self, id: R, bits: u32, cond: bool) {
        let index = id.into();
        if cond {
            self.words[index] |= bits;
        } else {
            self.words[index] &= !bits;
        }
    }

    /// Returns true if any of `bits` is set.
    pub fn any<R: Into<usize>>(&self, id: R, bits: u32) -> bool {
        self.words[id.into()] & bits != 0
    }
}

impl<const N: usize> Default for RegisterFile<N> {
    fn default() -> Self {
        Self::new()
    }
}

// ————————————————————————————— Register Banks ————————————————————————————— //

/// A device whose guest-visible state is a bank of 32-bit registers.
pub trait RegisterBank {
    type Id: Copy + Debug + 'static;

    /// Device name, used in logs.
    const NAME: &'static str;
    /// Size of the decoded region, in bytes.
    const SIZE: usize;
    /// The register map.
    const MAP: &'static [Register<Self::Id>];

    /// Returns the current value of a register, without side effects.
    fn peek(&self, reg: &Register<Self::Id>) -> u32;

    /// Reads a register on behalf of the guest, applying the read side effects.
    fn load(&mut self, reg: &Register<Self::Id>) -> u32 {
        self.peek(reg)
    }

    /// Writes a full 32-bit value to a register on behalf of the guest.
    fn store(&mut self, reg: &Register<Self::Id>, value: u32);

    /// Re-evaluates the interrupt output, called after every guest access.
    fn update_irq(&mut self);
}

fn check_access<B: RegisterBank>(offset: usize, width: Width, kind: &str) -> bool {
    if width == Width::Byte8 {
        guest_error!("{}: unsupported {}-bit {} at 0x{:x}", B::NAME, width.to_bits(), kind, offset);
        return false;
    }
    if offset % width.to_bytes() != 0 {
        guest_error!("{}: misaligned {} at 0x{:x}", B::NAME, kind, offset);
        return false;
    }
    if offset >= B::SIZE || width.to_bytes() > B::SIZE - offset {
        guest_error!("{}: {} out of bounds at 0x{:x}", B::NAME, kind, offset);
        return false;
    }
    true
}

/// Bit shift and mask of the byte lanes covered by an access.
fn lanes(offset: usize, width: Width) -> (u32, u32) {
    let shift = ((offset % 4) * 8) as u32;
    let mask = width.mask() as u32;
    (shift, mask << shift)
}

/// Performs a guest read of `width` bits at `offset`.
///
/// Invalid accesses are reported as guest errors and read as 0.
pub fn read<B: RegisterBank>(bank: &mut B, offset: usize, width: Width) -> u32 {
    if !check_access::<B>(offset, width, "read") {
        return 0;
    }

    let Some(reg) = lookup(B::MAP, offset) else {
        guest_error!("{}: read at undefined offset 0x{:x}", B::NAME, offset);
        return 0;
    };
    if !reg.is_readable() {
        guest_error!("{}: read of write-only register {}", B::NAME, reg.name);
        return 0;
    }

    // Read side effects belong to the low lane, upper lanes are served without them
    let (shift, mask) = lanes(offset, width);
    let word = if shift == 0 {
        bank.load(reg)
    } else {
        bank.peek(reg)
    };
    let value = (word & mask) >> shift;
    bank.update_irq();
    log::trace!("{}: read {} -> 0x{:x}", B::NAME, reg.name, value);
    value
}

/// Performs a guest write of `width` bits at `offset`.
///
/// Sub-word writes are merged into the current register value. Write-1-to-clear bits outside of
/// the written lanes are written as 0 so that they are left untouched.
pub fn write<B: RegisterBank>(bank: &mut B, offset: usize, width: Width, value: u32) {
    if !check_access::<B>(offset, width, "write") {
        return;
    }

    let Some(reg) = lookup(B::MAP, offset) else {
        guest_error!("{}: write at undefined offset 0x{:x}", B::NAME, offset);
        return;
    };
    if !reg.is_writable() {
        guest_error!("{}: write to read-only register {}", B::NAME, reg.name);
        return;
    }

    let (shift, mask) = lanes(offset, width);
    let value = if width == Width::Byte4 {
        value
    } else {
        (bank.peek(reg) & !reg.w1c & !mask) | ((value << shift) & mask)
    };

    log::trace!("{}: write {} <- 0x{:x}", B::NAME, reg.name, value);
    bank.store(reg, value);
    bank.update_irq();
}

// ————————————————————————————————— Tests —————————————————————————————————— //

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    enum Id {
        Ctrl,
        Status,
        Data,
        Version,
        Window,
    }

    impl From<Id> for usize {
        fn from(id: Id) -> usize {
            id as usize
        }
    }

    struct Bank {
        regs: RegisterFile<5>,
        irq_updates: usize,
        reads: usize,
    }

    impl RegisterBank for Bank {
        type Id = Id;

        const NAME: &'static str = "TEST";
        const SIZE: usize = 0x100;
        const MAP: &'static [Register<Id>] = &[
            Register::rw("CTRL", 0x00, Id::Ctrl, 0x1234_5678),
            Register::rw("STATUS", 0x04, Id::Status, 0).with_w1c(0xff00),
            Register::wo("DATA", 0x08, Id::Data),
            Register::ro("VERSION", 0x0C, Id::Version, 0xcafe_0001),
            Register::wo("WINDOW", 0x80, Id::Window).with_span(0x80),
        ];

        fn peek(&self, reg: &Register<Id>) -> u32 {
            self.regs.get(reg.id)
        }

        fn load(&mut self, reg: &Register<Id>) -> u32 {
            self.reads += 1;
            self.peek(reg)
        }

        fn store(&mut self, reg: &Register<Id>, value: u32) {
            match reg.id {
                Id::Status => self.regs.clear_bits(Id::Status, value & reg.w1c),
                id => self.regs.set(id, value),
            }
        }

        fn update_irq(&mut self) {
            self.irq_updates += 1;
        }
    }

    fn bank() -> Bank {
        let mut regs = RegisterFile::new();
        regs.reset(Bank::MAP);
        Bank {
            regs,
            irq_updates: 0,
            reads: 0,
        }
    }

    #[test]
    fn reset_values() {
        let mut bank = bank();
        assert_eq!(read(&mut bank, 0x00, Width::Byte4), 0x1234_5678);
        assert_eq!(read(&mut bank, 0x0C, Width::Byte4), 0xcafe_0001);
    }

    #[test]
    fn sub_word_accesses() {
        let mut bank = bank();
        assert_eq!(read(&mut bank, 0x00, Width::Byte), 0x78);
        assert_eq!(read(&mut bank, 0x01, Width::Byte), 0x56);
        assert_eq!(read(&mut bank, 0x02, Width::Byte2), 0x1234);

        write(&mut bank, 0x03, Width::Byte, 0xab);
        assert_eq!(read(&mut bank, 0x00, Width::Byte4), 0xab34_5678);
        write(&mut bank, 0x00, Width::Byte2, 0xbeef);
        assert_eq!(read(&mut bank, 0x00, Width::Byte4), 0xab34_beef);
    }

    #[test]
    fn sub_word_write_keeps_w1c_bits() {
        let mut bank = bank();
        bank.regs.set(Id::Status, 0xff00);

        // Writing the low byte must not clear the flags of the second byte.
        write(&mut bank, 0x04, Width::Byte, 0xff);
        assert_eq!(bank.regs.get(Id::Status), 0xff00);
        write(&mut bank, 0x05, Width::Byte, 0x0f);
        assert_eq!(bank.regs.get(Id::Status), 0xf000);
    }

    #[test]
    fn invalid_accesses() {
        let mut bank = bank();

        // Misaligned, oversized, out of bounds and undefined
        assert_eq!(read(&mut bank, 0x02, Width::Byte4), 0);
        assert_eq!(read(&mut bank, 0x00, Width::Byte8), 0);
        assert_eq!(read(&mut bank, 0x100, Width::Byte4), 0);
        assert_eq!(read(&mut bank, 0x40, Width::Byte4), 0);
        assert_eq!(bank.reads, 0);

        // Write-only registers read as zero
        write(&mut bank, 0x08, Width::Byte4, 0x42);
        assert_eq!(bank.regs.get(Id::Data), 0x42);
        assert_eq!(read(&mut bank, 0x08, Width::Byte4), 0);

        // Read-only registers ignore writes
        write(&mut bank, 0x0C, Width::Byte4, 0);
        assert_eq!(read(&mut bank, 0x0C, Width::Byte4), 0xcafe_0001);

        write(&mut bank, 0x01, Width::Byte4, 0);
        write(&mut bank, 0x40, Width::Byte4, 0);
        assert_eq!(bank.regs.get(Id::Ctrl), 0x1234_5678);
    }

    #[test]
    fn offsets_near_the_end_of_the_address_space() {
        let mut bank = bank();
        assert_eq!(read(&mut bank, usize::MAX - 3, Width::Byte4), 0);
        assert_eq!(read(&mut bank, usize::MAX, Width::Byte), 0);
        write(&mut bank, usize::MAX - 1, Width::Byte2, 0xffff);
        write(&mut bank, usize::MAX, Width::Byte, 0xff);
        assert_eq!(bank.reads, 0);
        assert_eq!(bank.irq_updates, 0);
    }

    #[test]
    fn upper_lane_reads_have_no_side_effects() {
        let mut bank = bank();
        assert_eq!(read(&mut bank, 0x01, Width::Byte), 0x56);
        assert_eq!(read(&mut bank, 0x02, Width::Byte2), 0x1234);
        assert_eq!(bank.reads, 0);
        assert_eq!(read(&mut bank, 0x00, Width::Byte), 0x78);
        assert_eq!(bank.reads, 1);
    }

    #[test]
    fn windowed_register() {
        let mut bank = bank();
        write(&mut bank, 0x80, Width::Byte4, 1);
        assert_eq!(bank.regs.get(Id::Window), 1);
        write(&mut bank, 0xfc, Width::Byte4, 2);
        assert_eq!(bank.regs.get(Id::Window), 2);
        assert_eq!(lookup(Bank::MAP, 0xfc).map(|r| r.name), Some("WINDOW"));
    }

    #[test]
    fn irq_updated_after_every_valid_access() {
        let mut bank = bank();
        read(&mut bank, 0x00, Width::Byte4);
        write(&mut bank, 0x00, Width::Byte4, 0);
        read(&mut bank, 0x40, Width::Byte4);
        assert_eq!(bank.irq_updates, 2);
    }
}

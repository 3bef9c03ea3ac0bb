//! Virtual LPUART
//!
//! Model of the S32K3X8 Low-Power UART. Transmission is modelled as an instantaneous shift out:
//! bytes written to DATA are forwarded to the character backend as soon as it accepts them, so
//! the transmit FIFO only fills up while the backend applies back-pressure. Received bytes are
//! pushed by the owner of the backend through [VirtLpuart::receive].

use spin::Mutex;

use crate::config::{ConfigError, LpuartConfig, MAX_FIFO_DEPTH};
use crate::debug::guest_error;
use crate::device::fifo::Fifo;
use crate::device::regs::{self, Register, RegisterBank, RegisterFile};
use crate::device::{DeviceAccess, IrqLine, Width};
use crate::transport::CharBackend;

// ——————————————————————————— Register Layout ——————————————————————————— //

pub const LPUART_SIZE: usize = 0x1000;

pub const VERID_OFFSET: usize = 0x00;
pub const PARAM_OFFSET: usize = 0x04;
pub const GLOBAL_OFFSET: usize = 0x08;
pub const PINCFG_OFFSET: usize = 0x0C;
pub const BAUD_OFFSET: usize = 0x10;
pub const STAT_OFFSET: usize = 0x14;
pub const CTRL_OFFSET: usize = 0x18;
pub const DATA_OFFSET: usize = 0x1C;
pub const MATCH_OFFSET: usize = 0x20;
pub const MODIR_OFFSET: usize = 0x24;
pub const FIFO_OFFSET: usize = 0x28;
pub const WATER_OFFSET: usize = 0x2C;
pub const DATARO_OFFSET: usize = 0x30;
pub const MCR_OFFSET: usize = 0x40;
pub const MSR_OFFSET: usize = 0x44;
pub const REIR_OFFSET: usize = 0x48;
pub const TEIR_OFFSET: usize = 0x4C;
pub const HDCR_OFFSET: usize = 0x50;
pub const TOCR_OFFSET: usize = 0x58;
pub const TOSR_OFFSET: usize = 0x5C;

pub const GLOBAL_RST: u32 = 1;
pub const GLOBAL_EN: u32 = 1 << 1;

pub const STAT_PF: u32 = 1 << 16;
pub const STAT_FE: u32 = 1 << 17;
pub const STAT_NF: u32 = 1 << 18;
pub const STAT_OR: u32 = 1 << 19;
pub const STAT_IDLE: u32 = 1 << 20;
pub const STAT_RDRF: u32 = 1 << 21;
pub const STAT_TC: u32 = 1 << 22;
pub const STAT_TDRE: u32 = 1 << 23;
/// Latched error and idle flags, cleared by writing 1.
pub const STAT_W1C: u32 = STAT_PF | STAT_FE | STAT_NF | STAT_OR | STAT_IDLE;
/// Configuration bits of STAT (LBKDE, BRK13, RWUID, RXINV, MSBF).
const STAT_CONFIG: u32 = 0x3E00_0000;

pub const CTRL_RE: u32 = 1 << 18;
pub const CTRL_TE: u32 = 1 << 19;
pub const CTRL_ILIE: u32 = 1 << 20;
pub const CTRL_RIE: u32 = 1 << 21;
pub const CTRL_TCIE: u32 = 1 << 22;
pub const CTRL_TIE: u32 = 1 << 23;
pub const CTRL_PEIE: u32 = 1 << 24;
pub const CTRL_FEIE: u32 = 1 << 25;
pub const CTRL_NEIE: u32 = 1 << 26;
pub const CTRL_ORIE: u32 = 1 << 27;

pub const DATA_RXEMPT: u32 = 1 << 12;

pub const FIFO_RXFE: u32 = 1 << 3;
pub const FIFO_TXFE: u32 = 1 << 7;
pub const FIFO_RXUFE: u32 = 1 << 8;
pub const FIFO_TXOFE: u32 = 1 << 9;
pub const FIFO_RXIDEN_MASK: u32 = 0b111 << 10;
pub const FIFO_RXFLUSH: u32 = 1 << 14;
pub const FIFO_TXFLUSH: u32 = 1 << 15;
pub const FIFO_RXUF: u32 = 1 << 16;
pub const FIFO_TXOF: u32 = 1 << 17;
pub const FIFO_RXEMPT: u32 = 1 << 22;
pub const FIFO_TXEMPT: u32 = 1 << 23;
const FIFO_CONFIG: u32 = FIFO_RXFE | FIFO_TXFE | FIFO_RXUFE | FIFO_TXOFE | FIFO_RXIDEN_MASK;
const FIFO_W1C: u32 = FIFO_RXUF | FIFO_TXOF;

pub const WATER_MASK: u32 = 0xFF;
pub const WATER_TXCOUNT_SHIFT: u32 = 8;
pub const WATER_RXWATER_SHIFT: u32 = 16;
pub const WATER_RXCOUNT_SHIFT: u32 = 24;

const VERID_EXTENDED: u32 = 0x0404_0007;
const VERID_STANDARD: u32 = 0x0404_0003;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LpuartReg {
    Verid,
    Param,
    Global,
    Pincfg,
    Baud,
    Stat,
    Ctrl,
    Data,
    Match,
    Modir,
    Fifo,
    Water,
    Dataro,
    Mcr,
    Msr,
    Reir,
    Teir,
    Hdcr,
    Tocr,
    Tosr,
}

impl From<LpuartReg> for usize {
    fn from(reg: LpuartReg) -> usize {
        reg as usize
    }
}

const NB_REGS: usize = 20;

/// The LPUART register map. Values depending on the instance (VERID, PARAM and the FIFO size
/// fields) are patched in at reset.
pub const LPUART_REGISTERS: &[Register<LpuartReg>] = &[
    Register::ro("VERID", VERID_OFFSET, LpuartReg::Verid, VERID_EXTENDED),
    Register::ro("PARAM", PARAM_OFFSET, LpuartReg::Param, 0),
    Register::rw("GLOBAL", GLOBAL_OFFSET, LpuartReg::Global, 0),
    Register::rw("PINCFG", PINCFG_OFFSET, LpuartReg::Pincfg, 0),
    Register::rw("BAUD", BAUD_OFFSET, LpuartReg::Baud, 0x0F00_0004),
    Register::rw("STAT", STAT_OFFSET, LpuartReg::Stat, STAT_TDRE | STAT_TC).with_w1c(STAT_W1C),
    Register::rw("CTRL", CTRL_OFFSET, LpuartReg::Ctrl, 0),
    Register::rw("DATA", DATA_OFFSET, LpuartReg::Data, DATA_RXEMPT),
    Register::rw("MATCH", MATCH_OFFSET, LpuartReg::Match, 0),
    Register::rw("MODIR", MODIR_OFFSET, LpuartReg::Modir, 0),
    Register::rw("FIFO", FIFO_OFFSET, LpuartReg::Fifo, 0).with_w1c(FIFO_W1C),
    Register::rw("WATER", WATER_OFFSET, LpuartReg::Water, 0),
    Register::ro("DATARO", DATARO_OFFSET, LpuartReg::Dataro, DATA_RXEMPT),
    Register::rw("MCR", MCR_OFFSET, LpuartReg::Mcr, 0),
    Register::rw("MSR", MSR_OFFSET, LpuartReg::Msr, 0),
    Register::rw("REIR", REIR_OFFSET, LpuartReg::Reir, 0),
    Register::rw("TEIR", TEIR_OFFSET, LpuartReg::Teir, 0),
    Register::rw("HDCR", HDCR_OFFSET, LpuartReg::Hdcr, 0),
    Register::rw("TOCR", TOCR_OFFSET, LpuartReg::Tocr, 0),
    Register::rw("TOSR", TOSR_OFFSET, LpuartReg::Tosr, 0x0000_000F),
];

/// Encoding of a FIFO depth in the FIFO and PARAM registers.
fn fifo_size_code(depth: usize) -> u32 {
    match depth {
        1 => 0,
        4 => 1,
        8 => 2,
        _ => 3,
    }
}

// ————————————————————————————— Virtual LPUART ————————————————————————————— //

/// A virtual LPUART instance.
///
/// All entry points take the device lock for their whole duration, so register accesses and
/// receive callbacks never interleave.
pub struct VirtLpuart<'a> {
    inner: Mutex<LpuartState<'a>>,
}

struct LpuartState<'a> {
    regs: RegisterFile<NB_REGS>,
    tx: Fifo<u8, MAX_FIFO_DEPTH>,
    rx: Fifo<u8, MAX_FIFO_DEPTH>,
    config: LpuartConfig,
    backend: &'a dyn CharBackend,
    irq: &'a dyn IrqLine,
    irq_level: bool,
}

impl<'a> VirtLpuart<'a> {
    /// Creates an LPUART in its power-on state.
    pub fn new(
        config: LpuartConfig,
        backend: &'a dyn CharBackend,
        irq: &'a dyn IrqLine,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let depth = config.depth();
        let mut state = LpuartState {
            regs: RegisterFile::new(),
            tx: Fifo::new(depth),
            rx: Fifo::new(depth),
            config,
            backend,
            irq,
            irq_level: false,
        };
        state.reset();
        irq.set_level(false);

        log::info!(
            "LPUART{} created with {}-entry FIFOs",
            config.instance,
            depth
        );
        Ok(VirtLpuart {
            inner: Mutex::new(state),
        })
    }

    pub fn config(&self) -> LpuartConfig {
        self.inner.lock().config
    }

    /// Guest read of `width` bits at `offset`.
    pub fn read(&self, offset: usize, width: Width) -> u32 {
        regs::read(&mut *self.inner.lock(), offset, width)
    }

    /// Guest write of `width` bits at `offset`.
    pub fn write(&self, offset: usize, width: Width, value: u32) {
        regs::write(&mut *self.inner.lock(), offset, width, value)
    }

    /// Delivers bytes coming from the character backend.
    ///
    /// Bytes are dropped if the receiver is disabled. Bytes that do not fit in the receive FIFO
    /// are dropped and latch STAT.OR.
    pub fn receive(&self, bytes: &[u8]) {
        let mut state = self.inner.lock();
        state.receive(bytes);
        state.update_irq();
    }

    /// Whether the device can take a byte from the backend right now.
    pub fn can_receive(&self) -> bool {
        let state = self.inner.lock();
        state.rx_enabled() && !state.rx.is_full()
    }

    /// Forwards pending bytes to the backend, to be called once the backend accepts bytes again.
    pub fn poll_tx(&self) {
        let mut state = self.inner.lock();
        state.drain_tx();
        state.update_irq();
    }

    /// Current level of the interrupt output.
    pub fn irq_level(&self) -> bool {
        self.inner.lock().irq_level
    }

    /// Calls `f` with the name, offset and current value of each readable register, without
    /// triggering read side effects.
    pub fn for_each_register(&self, mut f: impl FnMut(&'static str, usize, u32)) {
        let state = self.inner.lock();
        for reg in LPUART_REGISTERS.iter().filter(|reg| reg.is_readable()) {
            f(reg.name, reg.offset, state.peek(reg));
        }
    }
}

impl DeviceAccess for VirtLpuart<'_> {
    fn read_device(&self, offset: usize, r_width: Width) -> Result<usize, &'static str> {
        Ok(self.read(offset, r_width) as usize)
    }

    fn write_device(
        &self,
        offset: usize,
        w_width: Width,
        value: usize,
    ) -> Result<(), &'static str> {
        self.write(offset, w_width, value as u32);
        Ok(())
    }
}

// ———————————————————————————————— Behavior ———————————————————————————————— //

impl LpuartState<'_> {
    fn reset(&mut self) {
        let depth = self.config.depth();
        let code = fifo_size_code(depth);
        let verid = if self.config.is_extended() {
            VERID_EXTENDED
        } else {
            VERID_STANDARD
        };

        self.regs.reset(LPUART_REGISTERS);
        self.regs.set(LpuartReg::Verid, verid);
        self.regs.set(LpuartReg::Param, (code << 8) | code);
        self.regs.set(LpuartReg::Fifo, (code << 4) | code);
        self.tx.clear();
        self.rx.clear();
        log::debug!("LPUART{} reset", self.config.instance);
    }

    fn tx_enabled(&self) -> bool {
        self.regs.any(LpuartReg::Global, GLOBAL_EN) && self.regs.any(LpuartReg::Ctrl, CTRL_TE)
    }

    fn rx_enabled(&self) -> bool {
        self.regs.any(LpuartReg::Global, GLOBAL_EN) && self.regs.any(LpuartReg::Ctrl, CTRL_RE)
    }

    fn tx_watermark(&self) -> usize {
        (self.regs.get(LpuartReg::Water) & WATER_MASK) as usize
    }

    fn rx_watermark(&self) -> usize {
        ((self.regs.get(LpuartReg::Water) >> WATER_RXWATER_SHIFT) & WATER_MASK) as usize
    }

    /// Re-derives the occupancy flags of STAT.
    fn refresh_status(&mut self) {
        let tdre = self.tx.len() <= self.tx_watermark();
        let rdrf = self.rx.len() > self.rx_watermark();
        self.regs.assign_bits(LpuartReg::Stat, STAT_TDRE, tdre);
        self.regs.assign_bits(LpuartReg::Stat, STAT_RDRF, rdrf);
    }

    /// Shifts out queued bytes for as long as the backend accepts them.
    fn drain_tx(&mut self) {
        if !self.tx_enabled() || self.tx.is_empty() {
            return;
        }

        while !self.tx.is_empty() && self.backend.can_accept() {
            if let Some(byte) = self.tx.pop() {
                self.backend.send(byte);
            }
        }

        let empty = self.tx.is_empty();
        self.regs.assign_bits(LpuartReg::Stat, STAT_TC, empty);
        self.refresh_status();
    }

    fn transmit(&mut self, byte: u8) {
        if !self.tx_enabled() {
            guest_error!(
                "LPUART{}: DATA write while the transmitter is disabled",
                self.config.instance
            );
            return;
        }

        if !self.tx.push(byte) {
            guest_error!("LPUART{}: transmit FIFO overflow", self.config.instance);
            self.regs.set_bits(LpuartReg::Fifo, FIFO_TXOF);
        }
        self.drain_tx();
    }

    fn receive(&mut self, bytes: &[u8]) {
        if !self.rx_enabled() {
            log::debug!(
                "LPUART{}: receiver disabled, dropping {} bytes",
                self.config.instance,
                bytes.len()
            );
            return;
        }

        for &byte in bytes {
            if !self.rx.push(byte) {
                log::debug!("LPUART{}: receive overrun", self.config.instance);
                self.regs.set_bits(LpuartReg::Stat, STAT_OR);
            }
        }
        if !bytes.is_empty() {
            self.regs.set_bits(LpuartReg::Stat, STAT_IDLE);
        }
        self.refresh_status();
    }

    fn write_ctrl(&mut self, value: u32) {
        let was_enabled = self.regs.any(LpuartReg::Ctrl, CTRL_TE);
        let enabled = value & CTRL_TE != 0;
        self.regs.set(LpuartReg::Ctrl, value);

        match (was_enabled, enabled) {
            (false, true) => {
                self.regs.set_bits(LpuartReg::Stat, STAT_TDRE);
                self.regs.clear_bits(LpuartReg::Stat, STAT_TC);
                self.drain_tx();
            }
            (true, false) if self.tx.is_empty() => {
                self.regs.set_bits(LpuartReg::Stat, STAT_TC);
            }
            _ => (),
        }
    }

    fn write_fifo(&mut self, value: u32) {
        if value & FIFO_TXFLUSH != 0 {
            log::debug!("LPUART{}: flushing transmit FIFO", self.config.instance);
            self.tx.clear();
        }
        if value & FIFO_RXFLUSH != 0 {
            log::debug!("LPUART{}: flushing receive FIFO", self.config.instance);
            self.rx.clear();
        }

        let current = self.regs.get(LpuartReg::Fifo);
        let sizes = current & !(FIFO_CONFIG | FIFO_W1C);
        let flags = current & FIFO_W1C & !value;
        self.regs
            .set(LpuartReg::Fifo, sizes | flags | (value & FIFO_CONFIG));
        self.refresh_status();
    }

    fn write_water(&mut self, value: u32) {
        let max = (self.config.depth() - 1) as u32;
        let tx = (value & WATER_MASK) & max;
        let rx = ((value >> WATER_RXWATER_SHIFT) & WATER_MASK) & max;
        self.regs
            .set(LpuartReg::Water, (rx << WATER_RXWATER_SHIFT) | tx);
        self.refresh_status();
    }

    fn irq_pending(&self) -> bool {
        let ctrl = self.regs.get(LpuartReg::Ctrl);
        let stat = self.regs.get(LpuartReg::Stat);
        let fifo = self.regs.get(LpuartReg::Fifo);

        let sources = [
            (CTRL_RIE, STAT_RDRF),
            (CTRL_TIE, STAT_TDRE),
            (CTRL_TCIE, STAT_TC),
            (CTRL_ILIE, STAT_IDLE),
            (CTRL_ORIE, STAT_OR),
            (CTRL_NEIE, STAT_NF),
            (CTRL_FEIE, STAT_FE),
            (CTRL_PEIE, STAT_PF),
        ];
        let stat_pending = sources
            .iter()
            .any(|(enable, flag)| ctrl & enable != 0 && stat & flag != 0);

        let fifo_pending = (fifo & FIFO_RXUFE != 0 && fifo & FIFO_RXUF != 0)
            || (fifo & FIFO_TXOFE != 0 && fifo & FIFO_TXOF != 0);

        stat_pending || fifo_pending
    }
}

impl RegisterBank for LpuartState<'_> {
    type Id = LpuartReg;

    const NAME: &'static str = "LPUART";
    const SIZE: usize = LPUART_SIZE;
    const MAP: &'static [Register<LpuartReg>] = LPUART_REGISTERS;

    fn peek(&self, reg: &Register<LpuartReg>) -> u32 {
        match reg.id {
            LpuartReg::Fifo => {
                let mut value = self.regs.get(LpuartReg::Fifo) & !(FIFO_RXEMPT | FIFO_TXEMPT);
                if self.rx.is_empty() {
                    value |= FIFO_RXEMPT;
                }
                if self.tx.is_empty() {
                    value |= FIFO_TXEMPT;
                }
                value
            }
            LpuartReg::Water => {
                self.regs.get(LpuartReg::Water)
                    | ((self.tx.len() as u32) << WATER_TXCOUNT_SHIFT)
                    | ((self.rx.len() as u32) << WATER_RXCOUNT_SHIFT)
            }
            LpuartReg::Data | LpuartReg::Dataro => match self.rx.peek() {
                Some(byte) => byte as u32,
                None => DATA_RXEMPT,
            },
            id => self.regs.get(id),
        }
    }

    fn load(&mut self, reg: &Register<LpuartReg>) -> u32 {
        if reg.id != LpuartReg::Data {
            return self.peek(reg);
        }

        match self.rx.pop() {
            Some(byte) => {
                self.regs.set(LpuartReg::Data, byte as u32);
                self.refresh_status();
                byte as u32
            }
            None => {
                guest_error!("LPUART{}: receive FIFO underflow", self.config.instance);
                self.regs.set(LpuartReg::Data, DATA_RXEMPT);
                self.regs.set_bits(LpuartReg::Fifo, FIFO_RXUF);
                0
            }
        }
    }

    fn store(&mut self, reg: &Register<LpuartReg>, value: u32) {
        match reg.id {
            LpuartReg::Global => {
                if value & GLOBAL_RST != 0 {
                    self.reset();
                } else {
                    self.regs.set(LpuartReg::Global, value & GLOBAL_EN);
                    self.drain_tx();
                }
            }
            LpuartReg::Stat => {
                let stat = self.regs.get(LpuartReg::Stat);
                let kept = stat & !STAT_CONFIG & !(value & STAT_W1C);
                self.regs
                    .set(LpuartReg::Stat, kept | (value & STAT_CONFIG));
            }
            LpuartReg::Ctrl => self.write_ctrl(value),
            LpuartReg::Data => self.transmit(value as u8),
            LpuartReg::Fifo => self.write_fifo(value),
            LpuartReg::Water => self.write_water(value),
            id => self.regs.set(id, value),
        }
    }

    fn update_irq(&mut self) {
        let level = self.irq_pending();
        if level != self.irq_level {
            self.irq_level = level;
            self.irq.set_level(level);
        }
    }
}

// ————————————————————————————————— Tests —————————————————————————————————— //

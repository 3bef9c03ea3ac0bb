//! Virtual LPSPI
//!
//! Model of the S32K3X8 Low-Power SPI block. Each word written to the transmit FIFO is exchanged
//! with the [SpiPeer] during the same register access, the received word being pushed to the
//! receive FIFO. Words written while the module is disabled stay queued until CR.MEN is set.

use spin::Mutex;

use crate::config::{ConfigError, LpspiConfig, MAX_FIFO_DEPTH};
use crate::debug::{guest_error, warn_once};
use crate::device::fifo::Fifo;
use crate::device::regs::{self, Register, RegisterBank, RegisterFile};
use crate::device::{DeviceAccess, IrqLine, Width};
use crate::transport::SpiPeer;

// ——————————————————————————— Register Layout ——————————————————————————— //

pub const LPSPI_SIZE: usize = 0x1000;

pub const VERID_OFFSET: usize = 0x00;
pub const PARAM_OFFSET: usize = 0x04;
pub const CR_OFFSET: usize = 0x10;
pub const SR_OFFSET: usize = 0x14;
pub const IER_OFFSET: usize = 0x18;
pub const DER_OFFSET: usize = 0x1C;
pub const CFGR0_OFFSET: usize = 0x20;
pub const CFGR1_OFFSET: usize = 0x24;
pub const DMR0_OFFSET: usize = 0x30;
pub const DMR1_OFFSET: usize = 0x34;
pub const CCR_OFFSET: usize = 0x40;
pub const CCR1_OFFSET: usize = 0x44;
pub const FCR_OFFSET: usize = 0x58;
pub const FSR_OFFSET: usize = 0x5C;
pub const TCR_OFFSET: usize = 0x60;
pub const TDR_OFFSET: usize = 0x64;
pub const RSR_OFFSET: usize = 0x70;
pub const RDR_OFFSET: usize = 0x74;
pub const RDROR_OFFSET: usize = 0x78;
pub const TCBR_OFFSET: usize = 0x3FC;
pub const TDBR_OFFSET: usize = 0x400;
const TDBR_SIZE: usize = 0x400;

pub const CR_MEN: u32 = 1;
pub const CR_RST: u32 = 1 << 1;
pub const CR_RTF: u32 = 1 << 8;
pub const CR_RRF: u32 = 1 << 9;
const CR_SELF_CLEARING: u32 = CR_RST | CR_RTF | CR_RRF;

pub const SR_TDF: u32 = 1;
pub const SR_RDF: u32 = 1 << 1;
pub const SR_WCF: u32 = 1 << 8;
pub const SR_FCF: u32 = 1 << 9;
pub const SR_TCF: u32 = 1 << 10;
pub const SR_TEF: u32 = 1 << 11;
pub const SR_REF: u32 = 1 << 12;
pub const SR_DMF: u32 = 1 << 13;
pub const SR_MBF: u32 = 1 << 24;
pub const SR_W1C: u32 = SR_WCF | SR_FCF | SR_TCF | SR_TEF | SR_REF | SR_DMF;

/// Interrupt enables share the bit positions of the SR flags they enable.
pub const IER_TDIE: u32 = SR_TDF;
pub const IER_RDIE: u32 = SR_RDF;
pub const IER_WCIE: u32 = SR_WCF;
pub const IER_FCIE: u32 = SR_FCF;
pub const IER_TCIE: u32 = SR_TCF;
pub const IER_TEIE: u32 = SR_TEF;
pub const IER_REIE: u32 = SR_REF;
const IER_MASK: u32 = IER_TDIE | IER_RDIE | IER_WCIE | IER_FCIE | IER_TCIE | IER_TEIE | IER_REIE;

pub const CFGR1_MASTER: u32 = 1;

pub const FCR_TXWATER_MASK: u32 = 0xF;
pub const FCR_RXWATER_SHIFT: u32 = 16;

pub const TCR_FRAMESZ_MASK: u32 = 0xFFF;
pub const TCR_RXMSK: u32 = 1 << 19;
pub const TCR_CONT: u32 = 1 << 21;

pub const RSR_RXEMPTY: u32 = 1 << 1;

/// Value read from RDR when the receive FIFO is empty.
pub const RDR_EMPTY: u32 = 0xFFFF_FFFF;

const VERID_RESET: u32 = 0x0200_0004;
const PCS_NUMBER: u32 = 8;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LpspiReg {
    Verid,
    Param,
    Cr,
    Sr,
    Ier,
    Der,
    Cfgr0,
    Cfgr1,
    Dmr0,
    Dmr1,
    Ccr,
    Ccr1,
    Fcr,
    Fsr,
    Tcr,
    Tdr,
    Rsr,
    Rdr,
    Rdror,
    Tcbr,
    Tdbr,
}

impl From<LpspiReg> for usize {
    fn from(reg: LpspiReg) -> usize {
        reg as usize
    }
}

const NB_REGS: usize = 21;

/// The LPSPI register map. PARAM is patched in at reset from the configured FIFO depth.
pub const LPSPI_REGISTERS: &[Register<LpspiReg>] = &[
    Register::ro("VERID", VERID_OFFSET, LpspiReg::Verid, VERID_RESET),
    Register::ro("PARAM", PARAM_OFFSET, LpspiReg::Param, 0x0008_0202),
    Register::rw("CR", CR_OFFSET, LpspiReg::Cr, 0),
    Register::rw("SR", SR_OFFSET, LpspiReg::Sr, SR_TDF).with_w1c(SR_W1C),
    Register::rw("IER", IER_OFFSET, LpspiReg::Ier, 0),
    Register::rw("DER", DER_OFFSET, LpspiReg::Der, 0),
    Register::rw("CFGR0", CFGR0_OFFSET, LpspiReg::Cfgr0, 0),
    Register::rw("CFGR1", CFGR1_OFFSET, LpspiReg::Cfgr1, 0),
    Register::rw("DMR0", DMR0_OFFSET, LpspiReg::Dmr0, 0),
    Register::rw("DMR1", DMR1_OFFSET, LpspiReg::Dmr1, 0),
    Register::rw("CCR", CCR_OFFSET, LpspiReg::Ccr, 0),
    Register::rw("CCR1", CCR1_OFFSET, LpspiReg::Ccr1, 0),
    Register::rw("FCR", FCR_OFFSET, LpspiReg::Fcr, 0),
    Register::ro("FSR", FSR_OFFSET, LpspiReg::Fsr, 0),
    Register::rw("TCR", TCR_OFFSET, LpspiReg::Tcr, 0x0000_001F),
    Register::wo("TDR", TDR_OFFSET, LpspiReg::Tdr),
    Register::ro("RSR", RSR_OFFSET, LpspiReg::Rsr, RSR_RXEMPTY),
    Register::ro("RDR", RDR_OFFSET, LpspiReg::Rdr, 0),
    Register::ro("RDROR", RDROR_OFFSET, LpspiReg::Rdror, 0),
    Register::wo("TCBR", TCBR_OFFSET, LpspiReg::Tcbr),
    Register::wo("TDBR", TDBR_OFFSET, LpspiReg::Tdbr).with_span(TDBR_SIZE),
];

fn log2(depth: usize) -> u32 {
    depth.trailing_zeros()
}

// ————————————————————————————— Virtual LPSPI —————————————————————————————— //

/// A virtual LPSPI instance.
pub struct VirtLpspi<'a> {
    inner: Mutex<LpspiState<'a>>,
}

struct LpspiState<'a> {
    regs: RegisterFile<NB_REGS>,
    tx: Fifo<u32, MAX_FIFO_DEPTH>,
    rx: Fifo<u32, MAX_FIFO_DEPTH>,
    config: LpspiConfig,
    /// Mirrors CR.MEN
    enabled: bool,
    /// Latched from CFGR1.MASTER
    master: bool,
    peer: &'a dyn SpiPeer,
    irq: &'a dyn IrqLine,
    irq_level: bool,
}

impl<'a> VirtLpspi<'a> {
    pub fn new(
        config: LpspiConfig,
        peer: &'a dyn SpiPeer,
        irq: &'a dyn IrqLine,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let depth = config.depth();
        let mut state = LpspiState {
            regs: RegisterFile::new(),
            tx: Fifo::new(depth),
            rx: Fifo::new(depth),
            config,
            enabled: false,
            master: false,
            peer,
            irq,
            irq_level: false,
        };
        state.reset();
        irq.set_level(false);

        log::info!(
            "LPSPI{} created with {}-word FIFOs",
            config.instance,
            depth
        );
        Ok(VirtLpspi {
            inner: Mutex::new(state),
        })
    }

    pub fn config(&self) -> LpspiConfig {
        self.inner.lock().config
    }

    pub fn read(&self, offset: usize, width: Width) -> u32 {
        regs::read(&mut *self.inner.lock(), offset, width)
    }

    pub fn write(&self, offset: usize, width: Width, value: u32) {
        regs::write(&mut *self.inner.lock(), offset, width, value)
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.lock().enabled
    }

    pub fn is_master(&self) -> bool {
        self.inner.lock().master
    }

    pub fn irq_level(&self) -> bool {
        self.inner.lock().irq_level
    }

    /// Calls `f` with the name, offset and current value of each readable register.
    pub fn for_each_register(&self, mut f: impl FnMut(&'static str, usize, u32)) {
        let state = self.inner.lock();
        for reg in LPSPI_REGISTERS.iter().filter(|reg| reg.is_readable()) {
            f(reg.name, reg.offset, state.peek(reg));
        }
    }
}

impl DeviceAccess for VirtLpspi<'_> {
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

impl LpspiState<'_> {
    /// Restores every register and empties both FIFOs. The enabled flag is left to the caller.
    fn reset(&mut self) {
        let depth = log2(self.config.depth());
        self.regs.reset(LPSPI_REGISTERS);
        self.regs
            .set(LpspiReg::Param, (PCS_NUMBER << 16) | (depth << 8) | depth);
        self.tx.clear();
        self.rx.clear();
        self.master = false;
        log::debug!("LPSPI{} reset", self.config.instance);
    }

    fn tx_watermark(&self) -> usize {
        (self.regs.get(LpspiReg::Fcr) & FCR_TXWATER_MASK) as usize
    }

    fn rx_watermark(&self) -> usize {
        ((self.regs.get(LpspiReg::Fcr) >> FCR_RXWATER_SHIFT) & FCR_TXWATER_MASK) as usize
    }

    /// Live SR value: the stored latched flags plus the FIFO request flags.
    fn status(&self) -> u32 {
        let mut sr = self.regs.get(LpspiReg::Sr) & !(SR_TDF | SR_RDF);
        if self.tx.len() <= self.tx_watermark() {
            sr |= SR_TDF;
        }
        if self.rx.len() > self.rx_watermark() {
            sr |= SR_RDF;
        }
        sr
    }

    /// Mask applied to transferred words, from TCR.FRAMESZ.
    fn frame_mask(&self) -> u32 {
        let bits = (self.regs.get(LpspiReg::Tcr) & TCR_FRAMESZ_MASK) + 1;
        if bits >= 32 {
            u32::MAX
        } else {
            (1 << bits) - 1
        }
    }

    /// Exchanges every queued word with the peer.
    fn drain_tx(&mut self) {
        if !self.enabled || self.tx.is_empty() {
            return;
        }
        if !self.master {
            warn_once!("LPSPI transfer started in slave mode, the model always drives the bus");
        }

        let mask = self.frame_mask();
        let tcr = self.regs.get(LpspiReg::Tcr);
        while let Some(word) = self.tx.pop() {
            let received = self.peer.exchange(word & mask) & mask;
            log::trace!(
                "LPSPI{}: sent 0x{:x}, received 0x{:x}",
                self.config.instance,
                word & mask,
                received
            );

            if tcr & TCR_RXMSK == 0 && !self.rx.push(received) {
                guest_error!("LPSPI{}: receive FIFO overflow", self.config.instance);
                self.regs.set_bits(LpspiReg::Sr, SR_REF);
            }
            self.regs.set_bits(LpspiReg::Sr, SR_WCF);
            if tcr & TCR_CONT == 0 {
                self.regs.set_bits(LpspiReg::Sr, SR_FCF);
            }
        }
        self.regs.set_bits(LpspiReg::Sr, SR_TCF);
    }

    fn transmit(&mut self, word: u32) {
        if !self.tx.push(word) {
            guest_error!("LPSPI{}: transmit FIFO overflow", self.config.instance);
            self.regs.set_bits(LpspiReg::Sr, SR_TEF);
            return;
        }
        self.drain_tx();
    }

    fn write_cr(&mut self, value: u32) {
        if value & CR_RST != 0 {
            self.reset();
        }
        if value & CR_RTF != 0 {
            log::debug!("LPSPI{}: flushing transmit FIFO", self.config.instance);
            self.tx.clear();
        }
        if value & CR_RRF != 0 {
            log::debug!("LPSPI{}: flushing receive FIFO", self.config.instance);
            self.rx.clear();
        }

        self.regs.set(LpspiReg::Cr, value & !CR_SELF_CLEARING);
        let was_enabled = self.enabled;
        self.enabled = value & CR_MEN != 0;
        if !was_enabled && self.enabled {
            self.drain_tx();
        }
    }

    fn write_fcr(&mut self, value: u32) {
        let max = (self.config.depth() - 1) as u32;
        let tx = value & FCR_TXWATER_MASK & max;
        let rx = (value >> FCR_RXWATER_SHIFT) & FCR_TXWATER_MASK & max;
        self.regs.set(LpspiReg::Fcr, (rx << FCR_RXWATER_SHIFT) | tx);
    }
}

impl RegisterBank for LpspiState<'_> {
    type Id = LpspiReg;

    const NAME: &'static str = "LPSPI";
    const SIZE: usize = LPSPI_SIZE;
    const MAP: &'static [Register<LpspiReg>] = LPSPI_REGISTERS;

    fn peek(&self, reg: &Register<LpspiReg>) -> u32 {
        match reg.id {
            LpspiReg::Sr => self.status(),
            LpspiReg::Fsr => ((self.rx.len() as u32) << 16) | self.tx.len() as u32,
            LpspiReg::Rsr => {
                let rsr = self.regs.get(LpspiReg::Rsr) & !RSR_RXEMPTY;
                if self.rx.is_empty() {
                    rsr | RSR_RXEMPTY
                } else {
                    rsr
                }
            }
            LpspiReg::Rdr => self.rx.peek().unwrap_or(RDR_EMPTY),
            LpspiReg::Rdror => self.rx.peek().unwrap_or(0),
            id => self.regs.get(id),
        }
    }

    fn load(&mut self, reg: &Register<LpspiReg>) -> u32 {
        if reg.id != LpspiReg::Rdr {
            return self.peek(reg);
        }

        match self.rx.pop() {
            Some(word) => word,
            None => {
                guest_error!("LPSPI{}: receive FIFO underflow", self.config.instance);
                self.regs.set_bits(LpspiReg::Sr, SR_REF);
                RDR_EMPTY
            }
        }
    }

    fn store(&mut self, reg: &Register<LpspiReg>, value: u32) {
        match reg.id {
            LpspiReg::Cr => self.write_cr(value),
            LpspiReg::Sr => self.regs.clear_bits(LpspiReg::Sr, value & SR_W1C),
            LpspiReg::Cfgr1 => {
                self.master = value & CFGR1_MASTER != 0;
                self.regs.set(LpspiReg::Cfgr1, value);
            }
            LpspiReg::Fcr => self.write_fcr(value),
            LpspiReg::Tcbr => self.regs.set(LpspiReg::Tcr, value),
            LpspiReg::Tdr | LpspiReg::Tdbr => self.transmit(value),
            id => self.regs.set(id, value),
        }
    }

    fn update_irq(&mut self) {
        let level = self.regs.get(LpspiReg::Ier) & IER_MASK & self.status() != 0;
        if level != self.irq_level {
            self.irq_level = level;
            self.irq.set_level(level);
        }
    }
}

// ————————————————————————————————— Tests —————————————————————————————————— //

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::IrqPin;
    use crate::transport::{LoopbackPeer, ShiftRegisterPeer};

    fn master(spi: &VirtLpspi) {
        spi.write(CFGR1_OFFSET, Width::Byte4, CFGR1_MASTER);
        spi.write(CR_OFFSET, Width::Byte4, CR_MEN);
    }

    fn sr(spi: &VirtLpspi) -> u32 {
        spi.read(SR_OFFSET, Width::Byte4)
    }

    #[test]
    fn reset_state() {
        let irq = IrqPin::new();
        let spi = VirtLpspi::new(LpspiConfig::new(0), &LoopbackPeer, &irq).unwrap();

        assert_eq!(spi.read(VERID_OFFSET, Width::Byte4), 0x0200_0004);
        assert_eq!(spi.read(PARAM_OFFSET, Width::Byte4), 0x0008_0202);
        assert_eq!(sr(&spi), SR_TDF);
        assert_eq!(spi.read(TCR_OFFSET, Width::Byte4), 0x1F);
        assert_eq!(spi.read(RSR_OFFSET, Width::Byte4), RSR_RXEMPTY);
        assert_eq!(spi.read(FSR_OFFSET, Width::Byte4), 0);
        assert!(!spi.is_enabled());
        assert!(!spi.is_master());

        let spi = VirtLpspi::new(LpspiConfig::new(1).with_fifo_depth(16), &LoopbackPeer, &irq)
            .unwrap();
        assert_eq!(spi.read(PARAM_OFFSET, Width::Byte4), 0x0008_0404);
    }

    #[test]
    fn loopback() {
        let irq = IrqPin::new();
        let spi = VirtLpspi::new(LpspiConfig::new(0), &LoopbackPeer, &irq).unwrap();
        master(&spi);

        let pattern = [0xAA, 0x55, 0x12, 0x34];
        for word in pattern {
            spi.write(TDR_OFFSET, Width::Byte4, word);
        }
        assert_eq!(spi.read(FSR_OFFSET, Width::Byte4), 4 << 16);
        let sr = sr(&spi);
        assert_ne!(sr & SR_RDF, 0);
        assert_ne!(sr & SR_TDF, 0);
        assert_ne!(sr & SR_WCF, 0);
        assert_ne!(sr & SR_FCF, 0);
        assert_ne!(sr & SR_TCF, 0);

        for word in pattern {
            assert_eq!(spi.read(RDR_OFFSET, Width::Byte4), word);
        }
        assert_eq!(spi.read(RSR_OFFSET, Width::Byte4), RSR_RXEMPTY);
    }

    #[test]
    fn shift_register_peer() {
        let irq = IrqPin::new();
        let peer = ShiftRegisterPeer::new();
        let spi = VirtLpspi::new(LpspiConfig::new(0), &peer, &irq).unwrap();
        master(&spi);

        spi.write(TDR_OFFSET, Width::Byte4, 0xAA);
        spi.write(TDR_OFFSET, Width::Byte4, 0x55);
        assert_eq!(spi.read(RDR_OFFSET, Width::Byte4), 0);
        assert_eq!(spi.read(RDR_OFFSET, Width::Byte4), 0xAA);
    }

    #[test]
    fn receive_underflow() {
        let irq = IrqPin::new();
        let spi = VirtLpspi::new(LpspiConfig::new(0), &LoopbackPeer, &irq).unwrap();

        assert_eq!(spi.read(RDR_OFFSET, Width::Byte4), RDR_EMPTY);
        assert_ne!(sr(&spi) & SR_REF, 0);
        assert_eq!(spi.read(FSR_OFFSET, Width::Byte4), 0);

        spi.write(SR_OFFSET, Width::Byte4, SR_REF);
        assert_eq!(sr(&spi) & SR_REF, 0);
    }

    #[test]
    fn receive_overflow() {
        let irq = IrqPin::new();
        let spi = VirtLpspi::new(LpspiConfig::new(0), &LoopbackPeer, &irq).unwrap();
        master(&spi);

        for word in 1..=5 {
            spi.write(TDR_OFFSET, Width::Byte4, word);
        }
        assert_ne!(sr(&spi) & SR_REF, 0);
        assert_eq!(spi.read(FSR_OFFSET, Width::Byte4), 4 << 16);
        for word in 1..=4 {
            assert_eq!(spi.read(RDR_OFFSET, Width::Byte4), word);
        }
    }

    #[test]
    fn queued_while_disabled() {
        let irq = IrqPin::new();
        let spi = VirtLpspi::new(LpspiConfig::new(0), &LoopbackPeer, &irq).unwrap();
        spi.write(CFGR1_OFFSET, Width::Byte4, CFGR1_MASTER);

        for word in 1..=4 {
            spi.write(TDR_OFFSET, Width::Byte4, word);
        }
        assert_eq!(spi.read(FSR_OFFSET, Width::Byte4), 4);
        assert_eq!(sr(&spi) & SR_TDF, 0);

        // The FIFO is full, the word is dropped
        spi.write(TDR_OFFSET, Width::Byte4, 5);
        assert_ne!(sr(&spi) & SR_TEF, 0);
        assert_eq!(spi.read(FSR_OFFSET, Width::Byte4), 4);

        // Enabling the module flushes the queue through the bus
        spi.write(CR_OFFSET, Width::Byte4, CR_MEN);
        assert_eq!(spi.read(FSR_OFFSET, Width::Byte4), 4 << 16);
        for word in 1..=4 {
            assert_eq!(spi.read(RDR_OFFSET, Width::Byte4), word);
        }
    }

    #[test]
    fn peek_register() {
        let irq = IrqPin::new();
        let spi = VirtLpspi::new(LpspiConfig::new(0), &LoopbackPeer, &irq).unwrap();
        master(&spi);

        assert_eq!(spi.read(RDROR_OFFSET, Width::Byte4), 0);
        spi.write(TDR_OFFSET, Width::Byte4, 0x42);
        assert_eq!(spi.read(RDROR_OFFSET, Width::Byte4), 0x42);
        assert_eq!(spi.read(RDROR_OFFSET, Width::Byte4), 0x42);
        assert_eq!(spi.read(FSR_OFFSET, Width::Byte4), 1 << 16);
    }

    #[test]
    fn status_reads_are_idempotent() {
        let irq = IrqPin::new();
        let spi = VirtLpspi::new(LpspiConfig::new(0), &LoopbackPeer, &irq).unwrap();
        master(&spi);
        spi.write(TDR_OFFSET, Width::Byte4, 0x1);
        spi.write(TDR_OFFSET, Width::Byte4, 0x2);

        for offset in [SR_OFFSET, FSR_OFFSET, RSR_OFFSET, RDROR_OFFSET] {
            let first = spi.read(offset, Width::Byte4);
            assert_eq!(spi.read(offset, Width::Byte4), first);
        }
    }

    #[test]
    fn watermarks() {
        let irq = IrqPin::new();
        let spi = VirtLpspi::new(LpspiConfig::new(0), &LoopbackPeer, &irq).unwrap();
        master(&spi);

        // Watermarks are limited to the FIFO depth
        spi.write(FCR_OFFSET, Width::Byte4, (1 << FCR_RXWATER_SHIFT) | 0xF);
        assert_eq!(
            spi.read(FCR_OFFSET, Width::Byte4),
            (1 << FCR_RXWATER_SHIFT) | 0x3
        );

        spi.write(TDR_OFFSET, Width::Byte4, 0x1);
        assert_eq!(sr(&spi) & SR_RDF, 0);
        spi.write(TDR_OFFSET, Width::Byte4, 0x2);
        assert_ne!(sr(&spi) & SR_RDF, 0);
    }

    #[test]
    fn frame_size() {
        let irq = IrqPin::new();
        let peer = ShiftRegisterPeer::new();
        let spi = VirtLpspi::new(LpspiConfig::new(0), &peer, &irq).unwrap();
        master(&spi);

        // 8-bit frames, loaded through the command burst register
        spi.write(TCBR_OFFSET, Width::Byte4, 7);
        assert_eq!(spi.read(TCR_OFFSET, Width::Byte4), 7);
        spi.write(TDR_OFFSET, Width::Byte4, 0x1234);
        spi.write(TDR_OFFSET, Width::Byte4, 0);
        spi.read(RDR_OFFSET, Width::Byte4);
        assert_eq!(spi.read(RDR_OFFSET, Width::Byte4), 0x34);

        // Received words are discarded when RXMSK is set
        spi.write(TCR_OFFSET, Width::Byte4, TCR_RXMSK | 31);
        spi.write(TDR_OFFSET, Width::Byte4, 0xdead_beef);
        assert_eq!(spi.read(FSR_OFFSET, Width::Byte4), 0);
        assert_ne!(sr(&spi) & SR_TCF, 0);
    }

    #[test]
    fn data_burst_window() {
        let irq = IrqPin::new();
        let spi = VirtLpspi::new(LpspiConfig::new(0), &LoopbackPeer, &irq).unwrap();
        master(&spi);

        spi.write(TDBR_OFFSET, Width::Byte4, 0x11);
        spi.write(TDBR_OFFSET + 0x3FC, Width::Byte4, 0x22);
        assert_eq!(spi.read(TDBR_OFFSET, Width::Byte4), 0);
        assert_eq!(spi.read(TDR_OFFSET, Width::Byte4), 0);
        assert_eq!(spi.read(RDR_OFFSET, Width::Byte4), 0x11);
        assert_eq!(spi.read(RDR_OFFSET, Width::Byte4), 0x22);
    }

    #[test]
    fn read_only_registers() {
        let irq = IrqPin::new();
        let spi = VirtLpspi::new(LpspiConfig::new(0), &LoopbackPeer, &irq).unwrap();

        for offset in [VERID_OFFSET, PARAM_OFFSET, FSR_OFFSET, RSR_OFFSET, RDR_OFFSET] {
            let before = spi.read(offset, Width::Byte4);
            spi.write(offset, Width::Byte4, 0x5A5A_5A5A);
            assert_eq!(spi.read(offset, Width::Byte4), before);
        }
        // Module busy is never reported and cannot be written
        spi.write(SR_OFFSET, Width::Byte4, SR_MBF);
        assert_eq!(sr(&spi) & SR_MBF, 0);
    }

    #[test]
    fn fifo_reset_bits() {
        let irq = IrqPin::new();
        let spi = VirtLpspi::new(LpspiConfig::new(0), &LoopbackPeer, &irq).unwrap();
        spi.write(CFGR1_OFFSET, Width::Byte4, CFGR1_MASTER);
        spi.write(TDR_OFFSET, Width::Byte4, 0x1);
        spi.write(CR_OFFSET, Width::Byte4, CR_MEN);
        spi.write(TDR_OFFSET, Width::Byte4, 0x2);

        spi.write(CR_OFFSET, Width::Byte4, CR_RRF);
        assert_eq!(spi.read(FSR_OFFSET, Width::Byte4), 0);
        assert_eq!(spi.read(CR_OFFSET, Width::Byte4), 0);
        assert!(!spi.is_enabled());

        // Queue a word while disabled, then drop it
        spi.write(TDR_OFFSET, Width::Byte4, 0x3);
        assert_eq!(spi.read(FSR_OFFSET, Width::Byte4), 1);
        spi.write(CR_OFFSET, Width::Byte4, CR_RTF | CR_MEN);
        assert_eq!(spi.read(FSR_OFFSET, Width::Byte4), 0);
        assert_eq!(spi.read(CR_OFFSET, Width::Byte4), CR_MEN);
    }

    #[test]
    fn reset_restores_defaults() {
        let irq = IrqPin::new();
        let spi = VirtLpspi::new(LpspiConfig::new(0), &LoopbackPeer, &irq).unwrap();

        let mut defaults = [0; NB_REGS];
        let mut i = 0;
        spi.for_each_register(|_, _, value| {
            defaults[i] = value;
            i += 1;
        });

        master(&spi);
        spi.write(IER_OFFSET, Width::Byte4, IER_RDIE | IER_TCIE);
        spi.write(CCR_OFFSET, Width::Byte4, 0x0404_0808);
        spi.write(FCR_OFFSET, Width::Byte4, 0x0001_0001);
        spi.write(TCR_OFFSET, Width::Byte4, 7);
        spi.write(TDR_OFFSET, Width::Byte4, 0xAA);
        spi.write(TDR_OFFSET, Width::Byte4, 0x55);
        spi.read(RDR_OFFSET, Width::Byte4);
        assert!(irq.is_asserted());

        spi.write(CR_OFFSET, Width::Byte4, CR_RST);

        let mut i = 0;
        spi.for_each_register(|name, _, value| {
            assert_eq!(value, defaults[i], "{} not reset", name);
            i += 1;
        });
        assert!(!spi.is_enabled());
        assert!(!spi.is_master());
        assert!(!irq.is_asserted());
    }

    #[test]
    fn interrupt_aggregation() {
        let irq = IrqPin::new();
        let spi = VirtLpspi::new(LpspiConfig::new(0), &LoopbackPeer, &irq).unwrap();
        master(&spi);

        // TDF is set while the transmit FIFO is empty
        spi.write(IER_OFFSET, Width::Byte4, IER_TDIE);
        assert!(irq.is_asserted());
        spi.write(IER_OFFSET, Width::Byte4, 0);
        assert!(!irq.is_asserted());

        spi.write(IER_OFFSET, Width::Byte4, IER_RDIE);
        spi.write(TDR_OFFSET, Width::Byte4, 0x12);
        assert!(irq.is_asserted());
        spi.read(RDR_OFFSET, Width::Byte4);
        assert!(!irq.is_asserted());

        // Latched flags keep the line up until cleared
        for (enable, flag) in [(IER_WCIE, SR_WCF), (IER_FCIE, SR_FCF), (IER_TCIE, SR_TCF)] {
            spi.write(IER_OFFSET, Width::Byte4, enable);
            assert!(spi.irq_level());
            spi.write(SR_OFFSET, Width::Byte4, flag);
            assert!(!spi.irq_level());
        }
    }

    #[test]
    fn error_interrupt_sources() {
        let irq = IrqPin::new();
        let spi = VirtLpspi::new(LpspiConfig::new(0), &LoopbackPeer, &irq).unwrap();
        spi.write(CFGR1_OFFSET, Width::Byte4, CFGR1_MASTER);

        // Transmit FIFO overflow, words stay queued while the module is disabled
        spi.write(IER_OFFSET, Width::Byte4, IER_TEIE);
        for word in 0..5 {
            spi.write(TDR_OFFSET, Width::Byte4, word);
        }
        assert_ne!(sr(&spi) & SR_TEF, 0);
        assert!(irq.is_asserted());
        spi.write(SR_OFFSET, Width::Byte4, SR_TEF);
        assert!(!irq.is_asserted());
        spi.write(CR_OFFSET, Width::Byte4, CR_RTF);
        assert_eq!(spi.read(FSR_OFFSET, Width::Byte4), 0);

        // Receive FIFO underflow
        spi.write(IER_OFFSET, Width::Byte4, IER_REIE);
        assert!(!irq.is_asserted());
        assert_eq!(spi.read(RDR_OFFSET, Width::Byte4), RDR_EMPTY);
        assert!(irq.is_asserted());
        spi.write(SR_OFFSET, Width::Byte4, SR_REF);
        assert!(!irq.is_asserted());
    }

    #[test]
    fn upper_lane_rdr_reads_keep_the_fifo() {
        let irq = IrqPin::new();
        let spi = VirtLpspi::new(LpspiConfig::new(0), &LoopbackPeer, &irq).unwrap();
        master(&spi);

        spi.write(TDR_OFFSET, Width::Byte4, 0x1234_5678);
        assert_eq!(spi.read(RDR_OFFSET + 2, Width::Byte2), 0x1234);
        assert_eq!(spi.read(RDR_OFFSET + 1, Width::Byte), 0x56);
        assert_eq!(spi.read(FSR_OFFSET, Width::Byte4) >> 16, 1);
        assert_eq!(spi.read(RDR_OFFSET, Width::Byte4), 0x1234_5678);

        assert_eq!(spi.read(RDR_OFFSET + 3, Width::Byte), 0xFF);
        assert_eq!(sr(&spi) & SR_REF, 0);
    }
}

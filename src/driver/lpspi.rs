//! # LPSPI Driver
//!
//! A polling master-mode driver for the LPSPI, with the loopback self-test and the register
//! status report of the demo firmware.

use core::fmt;

use super::{wait_flag, Bus, DriverError, DEFAULT_POLL_BUDGET};
use crate::device::lpspi::{
    CCR1_OFFSET, CCR_OFFSET, CFGR1_MASTER, CFGR1_OFFSET, CR_MEN, CR_OFFSET, CR_RRF, CR_RST,
    CR_RTF, FCR_OFFSET, FSR_OFFSET, PARAM_OFFSET, RDR_OFFSET, SR_FCF, SR_MBF, SR_OFFSET, SR_RDF,
    SR_TCF, SR_TDF, SR_WCF, TCR_OFFSET, TDR_OFFSET, VERID_OFFSET,
};

/// Pattern exchanged by the loopback self-test.
pub const LOOPBACK_PATTERN: [u8; 8] = [0xAA, 0x55, 0x12, 0x34, 0x56, 0x78, 0x9A, 0xBC];

/// Values exchanged by the single byte transfer test.
pub const SINGLE_BYTE_PATTERN: [u8; 6] = [0x00, 0xFF, 0xAA, 0x55, 0x12, 0x34];

/// 8-bit frames, PCS0, no prescaler, CPOL = CPHA = 0.
const TCR_8BIT_FRAMES: u32 = 7;

/// Outcome of a self-test.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LoopbackReport {
    pub passed: usize,
    pub failed: usize,
}

impl LoopbackReport {
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }
}

pub struct LpspiDriver<'b, B: ?Sized> {
    bus: &'b B,
    base: usize,
    poll_budget: usize,
}

impl<'b, B: Bus + ?Sized> LpspiDriver<'b, B> {
    pub const fn new(bus: &'b B, base: usize) -> Self {
        LpspiDriver {
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
        wait_flag(self.poll_budget, flag, true, || self.read(SR_OFFSET))
    }

    /// Resets the module and configures it as an 8-bit master.
    pub fn init(&self) -> Result<(), DriverError> {
        self.write(CR_OFFSET, CR_RST)?;
        self.write(CR_OFFSET, 0)?;
        self.write(CFGR1_OFFSET, CFGR1_MASTER)?;
        self.write(CCR_OFFSET, 0)?;
        self.write(CCR1_OFFSET, 0)?;
        self.write(TCR_OFFSET, TCR_8BIT_FRAMES)?;
        self.write(FCR_OFFSET, 0)?;
        self.reset_fifos()?;
        self.write(CR_OFFSET, CR_MEN)
    }

    /// Empties both FIFOs, leaving the rest of CR untouched.
    pub fn reset_fifos(&self) -> Result<(), DriverError> {
        let cr = self.read(CR_OFFSET)?;
        self.write(CR_OFFSET, cr | CR_RTF | CR_RRF)?;
        self.write(CR_OFFSET, cr)
    }

    /// Sends a byte and waits for the end of the transfer. The received byte is left in the
    /// receive FIFO.
    pub fn transmit_byte(&self, byte: u8) -> Result<(), DriverError> {
        self.wait(SR_TDF)?;
        self.write(TDR_OFFSET, byte as u32)?;
        self.wait(SR_TCF)?;
        self.write(SR_OFFSET, SR_TCF)
    }

    pub fn receive_byte(&self) -> Result<u8, DriverError> {
        self.wait(SR_RDF)?;
        Ok(self.read(RDR_OFFSET)? as u8)
    }

    /// Exchanges one byte with the peer.
    pub fn transfer_byte(&self, byte: u8) -> Result<u8, DriverError> {
        self.wait(SR_TDF)?;
        self.write(TDR_OFFSET, byte as u32)?;
        self.wait(SR_RDF)?;
        let received = self.read(RDR_OFFSET)? as u8;
        self.wait(SR_TCF)?;
        self.write(SR_OFFSET, SR_TCF)?;
        Ok(received)
    }

    pub fn status(&self) -> Result<u32, DriverError> {
        self.read(SR_OFFSET)
    }

    pub fn is_busy(&self) -> Result<bool, DriverError> {
        Ok(self.status()? & SR_MBF != 0)
    }

    /// Exchanges [LOOPBACK_PATTERN] and checks that every byte comes back unchanged.
    ///
    /// Failed transfers are counted and reported, they do not abort the test.
    pub fn loopback_test(&self, out: &mut impl fmt::Write) -> Result<LoopbackReport, DriverError> {
        writeln!(out, "=== SPI Loopback Test Start ===").map_err(|_| DriverError::Output)?;

        let mut report = LoopbackReport::default();
        for (i, &sent) in LOOPBACK_PATTERN.iter().enumerate() {
            write!(out, "Test {}: TX=0x{:02X} ", i + 1, sent).map_err(|_| DriverError::Output)?;
            let res = match self.transfer_byte(sent) {
                Ok(received) if received == sent => {
                    report.passed += 1;
                    writeln!(out, "RX=0x{:02X} PASS", received)
                }
                Ok(received) => {
                    report.failed += 1;
                    log::debug!("{}", DriverError::DataMismatch { sent, received });
                    writeln!(out, "RX=0x{:02X} FAIL (Data Mismatch)", received)
                }
                Err(err) => {
                    report.failed += 1;
                    log::warn!("SPI loopback transfer failed: {}", err);
                    writeln!(out, "FAIL (Transfer Error)")
                }
            };
            res.map_err(|_| DriverError::Output)?;
        }

        writeln!(
            out,
            "=== Test Results: {} PASS, {} FAIL ===",
            report.passed, report.failed
        )
        .map_err(|_| DriverError::Output)?;
        Ok(report)
    }

    /// Exchanges [SINGLE_BYTE_PATTERN], one line per byte.
    pub fn single_byte_test(
        &self,
        out: &mut impl fmt::Write,
    ) -> Result<LoopbackReport, DriverError> {
        let mut report = LoopbackReport::default();
        for &sent in SINGLE_BYTE_PATTERN.iter() {
            let res = match self.transfer_byte(sent) {
                Ok(received) => {
                    let verdict = if received == sent {
                        report.passed += 1;
                        "PASS"
                    } else {
                        report.failed += 1;
                        "FAIL"
                    };
                    writeln!(out, "TX: 0x{:02X} -> RX: 0x{:02X} {}", sent, received, verdict)
                }
                Err(err) => {
                    report.failed += 1;
                    log::warn!("SPI transfer failed: {}", err);
                    writeln!(out, "TX: 0x{:02X} -> Transfer FAILED", sent)
                }
            };
            res.map_err(|_| DriverError::Output)?;
        }
        Ok(report)
    }

    /// Writes a dump of the main registers with a decoding of the status flags.
    pub fn status_report(&self, out: &mut impl fmt::Write) -> Result<(), DriverError> {
        let registers = StatusRegisters {
            verid: self.read(VERID_OFFSET)?,
            param: self.read(PARAM_OFFSET)?,
            cr: self.read(CR_OFFSET)?,
            sr: self.read(SR_OFFSET)?,
            cfgr1: self.read(CFGR1_OFFSET)?,
            tcr: self.read(TCR_OFFSET)?,
            fsr: self.read(FSR_OFFSET)?,
        };
        registers.write(out).map_err(|_| DriverError::Output)
    }
}

struct StatusRegisters {
    verid: u32,
    param: u32,
    cr: u32,
    sr: u32,
    cfgr1: u32,
    tcr: u32,
    fsr: u32,
}

impl StatusRegisters {
    fn write(&self, out: &mut impl fmt::Write) -> fmt::Result {
        writeln!(out, "=== SPI Status Check ===")?;
        writeln!(out, "VERID:  0x{:08X}", self.verid)?;
        writeln!(out, "PARAM:  0x{:08X}", self.param)?;
        let enabled = if self.cr & CR_MEN != 0 {
            "(ENABLED)"
        } else {
            "(DISABLED)"
        };
        writeln!(out, "CR:     0x{:08X} {}", self.cr, enabled)?;
        writeln!(out, "SR:     0x{:08X}", self.sr)?;

        writeln!(out, "Status Flags:")?;
        for (bit, name, meaning) in [
            (SR_TDF, "TDF", "TX Ready"),
            (SR_RDF, "RDF", "RX Ready"),
            (SR_WCF, "WCF", "Word Complete"),
            (SR_FCF, "FCF", "Frame Complete"),
            (SR_TCF, "TCF", "Transfer Complete"),
            (SR_MBF, "MBF", "Module Busy"),
        ] {
            if self.sr & bit != 0 {
                writeln!(out, "  {}: SET ({})", name, meaning)?;
            } else {
                writeln!(out, "  {}: CLEAR", name)?;
            }
        }

        let mode = if self.cfgr1 & CFGR1_MASTER != 0 {
            "(MASTER)"
        } else {
            "(SLAVE)"
        };
        writeln!(out, "CFGR1:  0x{:08X} {}", self.cfgr1, mode)?;
        writeln!(out, "TCR:    0x{:08X}", self.tcr)?;
        writeln!(out, "FSR:    0x{:08X}", self.fsr)?;
        writeln!(out, "========================")
    }
}

// ————————————————————————————————— Tests —————————————————————————————————— //

//! S32K3X8EVB board
//!
//! The composition root of the emulated machine: one LPUART and one LPSPI instance, wired to the
//! interrupt controller and to their external transports, and exposed to the firmware through a
//! physical address space.

use super::{lpspi_irq, lpuart_irq, InterruptController, LPSPI_BASES, LPUART_BASE, NB_IRQS};
use crate::config::{BoardConfig, ConfigError};
use crate::device::lpspi::{VirtLpspi, LPSPI_SIZE};
use crate::device::lpuart::{VirtLpuart, LPUART_SIZE};
use crate::device::{find_matching_device, VirtDevice, Width};
use crate::driver::Bus;
use crate::transport::{CharBackend, SpiPeer};

pub struct S32k3x8Evb<'a> {
    lpuart: VirtLpuart<'a>,
    lpspi: VirtLpspi<'a>,
    lpspi_base: usize,
    irqs: &'a InterruptController<NB_IRQS>,
}

impl<'a> S32k3x8Evb<'a> {
    /// Builds the board, failing if the configuration is invalid.
    pub fn new(
        config: &BoardConfig,
        backend: &'a dyn CharBackend,
        peer: &'a dyn SpiPeer,
        irqs: &'a InterruptController<NB_IRQS>,
    ) -> Result<Self, ConfigError> {
        config.lpuart.validate()?;
        config.lpspi.validate()?;

        let uart_line = lpuart_irq(config.lpuart.instance);
        let uart_irq = irqs
            .pin(uart_line)
            .ok_or(ConfigError::InvalidIrq { line: uart_line })?;
        let spi_line = lpspi_irq(config.lpspi.instance);
        let spi_irq = irqs
            .pin(spi_line)
            .ok_or(ConfigError::InvalidIrq { line: spi_line })?;

        let board = S32k3x8Evb {
            lpuart: VirtLpuart::new(config.lpuart, backend, uart_irq)?,
            lpspi: VirtLpspi::new(config.lpspi, peer, spi_irq)?,
            lpspi_base: LPSPI_BASES[config.lpspi.instance as usize],
            irqs,
        };
        board.check_memory_map()?;

        log::info!(
            "S32K3X8EVB: LPUART{} at 0x{:x}, LPSPI{} at 0x{:x}",
            config.lpuart.instance,
            LPUART_BASE,
            config.lpspi.instance,
            board.lpspi_base
        );
        Ok(board)
    }

    fn check_memory_map(&self) -> Result<(), ConfigError> {
        let devices = self.devices();
        for (i, first) in devices.iter().enumerate() {
            for second in &devices[i + 1..] {
                if first.overlaps(second) {
                    return Err(ConfigError::OverlappingRegions {
                        first: first.name,
                        second: second.name,
                    });
                }
            }
        }
        Ok(())
    }

    pub fn lpuart(&self) -> &VirtLpuart<'a> {
        &self.lpuart
    }

    pub fn lpspi(&self) -> &VirtLpspi<'a> {
        &self.lpspi
    }

    pub fn lpuart_base(&self) -> usize {
        LPUART_BASE
    }

    pub fn lpspi_base(&self) -> usize {
        self.lpspi_base
    }

    pub fn irqs(&self) -> &InterruptController<NB_IRQS> {
        self.irqs
    }

    /// The memory-mapped devices of the board.
    pub fn devices(&self) -> [VirtDevice<'_>; 2] {
        [
            VirtDevice {
                start_addr: LPUART_BASE,
                size: LPUART_SIZE,
                name: "LPUART",
                device_interface: &self.lpuart,
            },
            VirtDevice {
                start_addr: self.lpspi_base,
                size: LPSPI_SIZE,
                name: "LPSPI",
                device_interface: &self.lpspi,
            },
        ]
    }
}

impl Bus for S32k3x8Evb<'_> {
    fn read(&self, address: usize, width: Width) -> Result<u32, &'static str> {
        let devices = self.devices();
        let device =
            find_matching_device(address, &devices).ok_or("No device mapped at address")?;
        let value = device
            .device_interface
            .read_device(address - device.start_addr, width)?;
        Ok(value as u32)
    }

    fn write(&self, address: usize, width: Width, value: u32) -> Result<(), &'static str> {
        let devices = self.devices();
        let device =
            find_matching_device(address, &devices).ok_or("No device mapped at address")?;
        device
            .device_interface
            .write_device(address - device.start_addr, width, value as usize)
    }
}

// ————————————————————————————————— Tests —————————————————————————————————— //

//! Board configuration
//!
//! The configuration is plain data: the runner parses it from its TOML configuration file and
//! hands it to the board factory, which validates it before creating any device. Every field has
//! a default matching the S32K3X8 reference manual.

use thiserror_no_std::Error;

// ———————————————————————— Configuration Parameters ———————————————————————— //

/// Number of LPUART instances on the SoC.
pub const LPUART_INSTANCES: u8 = 16;

/// Number of LPSPI instances on the SoC.
pub const LPSPI_INSTANCES: u8 = 6;

/// FIFO depths supported by the LPUART and LPSPI blocks.
pub const VALID_FIFO_DEPTHS: [usize; 4] = [1, 4, 8, 16];

/// Largest supported FIFO depth, used to size the FIFO storage.
pub const MAX_FIFO_DEPTH: usize = 16;

/// Configuration errors, only ever raised while building the board.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid FIFO depth {depth} for {device} (expected 1, 4, 8 or 16)")]
    InvalidFifoDepth { device: &'static str, depth: usize },
    #[error("{device} instance {instance} does not exist")]
    InvalidInstance { device: &'static str, instance: u8 },
    #[error("interrupt line {line} is out of range")]
    InvalidIrq { line: usize },
    #[error("{first} and {second} have overlapping address ranges")]
    OverlappingRegions {
        first: &'static str,
        second: &'static str,
    },
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BoardConfig {
    pub lpuart: LpuartConfig,
    pub lpspi: LpspiConfig,
}

/// LPUART configuration.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LpuartConfig {
    /// Instance number, selects the identification registers and the default FIFO depth.
    pub instance: u8,
    /// FIFO depth, the instance default if `None`.
    pub fifo_depth: Option<usize>,
}

impl LpuartConfig {
    pub const fn new(instance: u8) -> Self {
        LpuartConfig {
            instance,
            fifo_depth: None,
        }
    }

    pub const fn with_fifo_depth(mut self, depth: usize) -> Self {
        self.fifo_depth = Some(depth);
        self
    }

    /// LPUART0 and LPUART1 implement the extended feature set, including 16-entry FIFOs.
    pub const fn is_extended(&self) -> bool {
        self.instance <= 1
    }

    pub const fn depth(&self) -> usize {
        match self.fifo_depth {
            Some(depth) => depth,
            None if self.is_extended() => 16,
            None => 4,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.instance >= LPUART_INSTANCES {
            return Err(ConfigError::InvalidInstance {
                device: "LPUART",
                instance: self.instance,
            });
        }
        validate_depth("LPUART", self.depth())
    }
}

/// LPSPI configuration.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LpspiConfig {
    pub instance: u8,
    /// FIFO depth, 4 words if `None`.
    pub fifo_depth: Option<usize>,
}

impl LpspiConfig {
    pub const fn new(instance: u8) -> Self {
        LpspiConfig {
            instance,
            fifo_depth: None,
        }
    }

    pub const fn with_fifo_depth(mut self, depth: usize) -> Self {
        self.fifo_depth = Some(depth);
        self
    }

    pub const fn depth(&self) -> usize {
        match self.fifo_depth {
            Some(depth) => depth,
            None => 4,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.instance >= LPSPI_INSTANCES {
            return Err(ConfigError::InvalidInstance {
                device: "LPSPI",
                instance: self.instance,
            });
        }
        validate_depth("LPSPI", self.depth())
    }
}

fn validate_depth(device: &'static str, depth: usize) -> Result<(), ConfigError> {
    if VALID_FIFO_DEPTHS.contains(&depth) {
        Ok(())
    } else {
        Err(ConfigError::InvalidFifoDepth { device, depth })
    }
}

// ————————————————————————————————— Tests —————————————————————————————————— //

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_depths() {
        assert_eq!(LpuartConfig::new(0).depth(), 16);
        assert_eq!(LpuartConfig::new(1).depth(), 16);
        assert_eq!(LpuartConfig::new(2).depth(), 4);
        assert_eq!(LpuartConfig::new(2).with_fifo_depth(8).depth(), 8);
        assert_eq!(LpspiConfig::default().depth(), 4);
    }

    #[test]
    fn validation() {
        assert!(BoardConfig::default().lpuart.validate().is_ok());
        assert!(BoardConfig::default().lpspi.validate().is_ok());
        assert_eq!(
            LpuartConfig::new(3).with_fifo_depth(5).validate(),
            Err(ConfigError::InvalidFifoDepth {
                device: "LPUART",
                depth: 5
            })
        );
        assert_eq!(
            LpspiConfig::new(6).validate(),
            Err(ConfigError::InvalidInstance {
                device: "LPSPI",
                instance: 6
            })
        );
        assert!(LpuartConfig::new(16).validate().is_err());
    }
}

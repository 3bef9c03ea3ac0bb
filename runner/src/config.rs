//! Runner configuration
//!
//! The configuration is read from the `config.toml` file at the root of the workspace, or from
//! the file passed with `--config`. Every field is optional and defaults to the S32K3X8EVB
//! configuration of the demo firmware.

use std::fs;
use std::path::{Path, PathBuf};

use log::LevelFilter;
use s32k3_emu::driver::DEFAULT_POLL_BUDGET;
use s32k3_emu::{BoardConfig, LpspiConfig, LpuartConfig};
use serde::Deserialize;

use crate::path::get_default_config_path;

/// Number of SPI test cycles when not configured.
pub const DEFAULT_CYCLES: usize = 1;

// ——————————————————————————— Config Definition ———————————————————————————— //

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub log: Log,
    #[serde(default)]
    pub lpuart: Lpuart,
    #[serde(default)]
    pub lpspi: Lpspi,
    #[serde(default)]
    pub demo: Demo,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
pub struct Log {
    pub level: Option<String>,
    pub color: Option<bool>,
    #[serde(default)]
    pub error: Vec<String>,
    #[serde(default)]
    pub warn: Vec<String>,
    #[serde(default)]
    pub info: Vec<String>,
    #[serde(default)]
    pub debug: Vec<String>,
    #[serde(default)]
    pub trace: Vec<String>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
pub struct Lpuart {
    pub instance: Option<u8>,
    pub fifo_depth: Option<usize>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
pub struct Lpspi {
    pub instance: Option<u8>,
    pub fifo_depth: Option<usize>,
    pub peer: Option<Peer>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
pub struct Demo {
    pub cycles: Option<usize>,
    pub poll_budget: Option<usize>,
}

/// The device on the other end of the SPI bus.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Peer {
    #[default]
    Loopback,
    ShiftRegister,
}

// ————————————————————————————— Conversions ———————————————————————————————— //

impl Config {
    pub fn board_config(&self) -> BoardConfig {
        let mut lpuart = LpuartConfig::new(self.lpuart.instance.unwrap_or(0));
        if let Some(depth) = self.lpuart.fifo_depth {
            lpuart = lpuart.with_fifo_depth(depth);
        }
        let mut lpspi = LpspiConfig::new(self.lpspi.instance.unwrap_or(0));
        if let Some(depth) = self.lpspi.fifo_depth {
            lpspi = lpspi.with_fifo_depth(depth);
        }
        BoardConfig { lpuart, lpspi }
    }

    pub fn peer(&self) -> Peer {
        self.lpspi.peer.unwrap_or_default()
    }

    pub fn cycles(&self) -> usize {
        self.demo.cycles.unwrap_or(DEFAULT_CYCLES)
    }

    pub fn poll_budget(&self) -> usize {
        self.demo.poll_budget.unwrap_or(DEFAULT_POLL_BUDGET)
    }
}

impl Log {
    pub fn level_filter(&self) -> LevelFilter {
        match self.level.as_deref() {
            Some("trace") => LevelFilter::Trace,
            Some("debug") => LevelFilter::Debug,
            Some("info") => LevelFilter::Info,
            Some("warn") => LevelFilter::Warn,
            Some("error") => LevelFilter::Error,
            Some("off") => LevelFilter::Off,
            _ => LevelFilter::Info,
        }
    }
}

// ————————————————————————————— Config Loader —————————————————————————————— //

/// Read the configuration, a missing file yields the default configuration.
pub fn read_config(path: &Option<PathBuf>) -> Result<Config, String> {
    let config_path = match path {
        Some(path) => path.clone(),
        None => get_default_config_path(),
    };

    let config = match fs::read_to_string(&config_path) {
        Ok(config) => config,
        Err(_) if path.is_none() => {
            println!("No config file found");
            String::new()
        }
        Err(err) => return Err(format!("Could not read {}: {}", display(&config_path), err)),
    };

    parse_config(&config).map_err(|err| format!("Failed to parse configuration: {}", err))
}

fn parse_config(config: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(config)
}

fn display(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

// ————————————————————————————————— Tests —————————————————————————————————— //

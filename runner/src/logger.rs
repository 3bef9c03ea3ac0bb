use std::sync::Mutex;

use log::{Level, LevelFilter, Metadata, Record, SetLoggerError};

use crate::config;

/// The runner logger
pub struct RunnerLogger {
    state: Mutex<LoggerState>,
}

/// The inner state of the logger
struct LoggerState {
    level: LevelFilter,
    color: bool,
    /// Targets enabled regardless of the global level, indexed by level (error first).
    targets: [Vec<String>; 5],
}

/// The global logger
///
/// We use a static here and lock mutable state, this allows sharing the logger between multiple
/// threads as needed.
static LOGGER: RunnerLogger = RunnerLogger {
    state: Mutex::new(LoggerState {
        level: LevelFilter::Info,
        color: true,
        targets: [Vec::new(), Vec::new(), Vec::new(), Vec::new(), Vec::new()],
    }),
};

impl RunnerLogger {
    pub fn init(cfg: &config::Log, verbose: bool) -> Result<(), SetLoggerError> {
        let level = if verbose {
            LevelFilter::Debug.max(cfg.level_filter())
        } else {
            cfg.level_filter()
        };
        let targets = [
            cfg.error.clone(),
            cfg.warn.clone(),
            cfg.info.clone(),
            cfg.debug.clone(),
            cfg.trace.clone(),
        ];
        let has_targets = targets.iter().any(|list| !list.is_empty());

        // We first set the global log level, and install the static logger to be used by all
        // the threads.
        if let Ok(mut state) = LOGGER.state.lock() {
            state.level = level;
            state.color = cfg.color.unwrap_or(true);
            state.targets = targets;
        }
        log::set_logger(&LOGGER)?;
        log::set_max_level(if has_targets {
            LevelFilter::Trace
        } else {
            level
        });
        Ok(())
    }
}

impl LoggerState {
    fn filter_by_target(&self, record: &Record) -> bool {
        let level = record.level() as usize;
        self.targets
            .iter()
            .enumerate()
            .any(|(i, list)| level <= i + 1 && contains_target(list, record.target()))
    }

    fn filter_by_global_level(&self, record: &Record) -> bool {
        self.level >= record.level()
    }
}

fn contains_target(targets: &[String], target: &str) -> bool {
    targets.iter().any(|element| element == target)
}

impl log::Log for RunnerLogger {
    fn enabled(&self, _: &Metadata) -> bool {
        // We set to true such that each logs arrives in the log function and then we filter
        true
    }

    fn log(&self, record: &Record) {
        let Ok(state) = self.state.lock() else {
            return;
        };
        if !state.filter_by_global_level(record) && !state.filter_by_target(record) {
            return;
        }

        let level = level_display(record.level(), state.color);
        match record.level() {
            Level::Error => eprintln!("[{} | {}] {}", level, record.target(), record.args()),
            _ => println!("[{} | {}] {}", level, record.target(), record.args()),
        }
    }

    fn flush(&self) {}
}

// ————————————————————————————————— Utils —————————————————————————————————— //

fn level_display(level: Level, color: bool) -> &'static str {
    if color {
        // We log with colors, using ANSI escape sequences
        match level {
            Level::Error => "\x1b[31;1mError\x1b[0m",
            Level::Warn => "\x1b[33;1mWarn\x1b[0m ",
            Level::Info => "\x1b[32;1mInfo\x1b[0m ",
            Level::Debug => "\x1b[34;1mDebug\x1b[0m",
            Level::Trace => "\x1b[35;1mTrace\x1b[0m",
        }
    } else {
        match level {
            Level::Error => "Error",
            Level::Warn => "Warn ",
            Level::Info => "Info ",
            Level::Debug => "Debug",
            Level::Trace => "Trace",
        }
    }
}

//! Run and dump subcommands
//!
//! The run subcommand builds an emulated S32K3X8EVB and drives it with the demo firmware: the
//! LPUART prints a banner and the LPSPI runs its loopback tests, with every report printed through
//! the emulated UART.

use std::io::Write;
use std::process::ExitCode;

use s32k3_emu::driver::{DriverError, LoopbackReport, LpspiDriver, LpuartDriver};
use s32k3_emu::platform::{
    InterruptController, FLASH_BASE, FLASH_SIZE, NB_IRQS, SRAM_BASE, SRAM_SIZE,
};
use s32k3_emu::transport::{CharBackend, LoopbackPeer, NullBackend, ShiftRegisterPeer, SpiPeer};
use s32k3_emu::S32k3x8Evb;

use crate::config::{read_config, Config, Peer};
use crate::logger::RunnerLogger;
use crate::{DumpArgs, RunArgs};

const BANNER: &str = "\r\nS32K3X8EVB LPUART/LPSPI demo\r\n";

// ——————————————————————————————— Transports ——————————————————————————————— //

/// Forwards the LPUART output to the standard output of the runner.
struct StdoutBackend;

impl CharBackend for StdoutBackend {
    fn send(&self, byte: u8) {
        let mut stdout = std::io::stdout().lock();
        // Output errors are not reported to the guest
        let _ = stdout.write_all(&[byte]);
        if byte == b'\n' {
            let _ = stdout.flush();
        }
    }
}

static LOOPBACK: LoopbackPeer = LoopbackPeer;
static SHIFT_REGISTER: ShiftRegisterPeer = ShiftRegisterPeer::new();

fn spi_peer(peer: Peer) -> &'static dyn SpiPeer {
    match peer {
        Peer::Loopback => &LOOPBACK,
        Peer::ShiftRegister => &SHIFT_REGISTER,
    }
}

// ————————————————————————————————— Run ———————————————————————————————————— //

/// Run the demo firmware on the emulated board.
pub fn run(args: &RunArgs) -> ExitCode {
    let cfg = match read_config(&args.config) {
        Ok(cfg) => cfg,
        Err(err) => {
            eprintln!("{}", err);
            return ExitCode::FAILURE;
        }
    };
    if let Err(err) = RunnerLogger::init(&cfg.log, args.verbose) {
        eprintln!("Failed to initialize the logger: {}", err);
        return ExitCode::FAILURE;
    }

    let peer = args.peer.unwrap_or(cfg.peer());
    let cycles = args.cycles.unwrap_or(cfg.cycles());

    let irqs = InterruptController::<NB_IRQS>::new();
    let backend = StdoutBackend;
    let board = match S32k3x8Evb::new(&cfg.board_config(), &backend, spi_peer(peer), &irqs) {
        Ok(board) => board,
        Err(err) => {
            log::error!("Invalid board configuration: {}", err);
            return ExitCode::FAILURE;
        }
    };

    match run_demo(&board, &cfg, cycles) {
        Ok(report) if report.is_success() => {
            log::info!("Demo completed: {} transfers passed", report.passed);
            ExitCode::SUCCESS
        }
        Ok(report) => {
            log::error!(
                "Demo completed with {} failed transfers ({} passed)",
                report.failed,
                report.passed
            );
            ExitCode::FAILURE
        }
        Err(err) => {
            log::error!("Demo aborted: {}", err);
            ExitCode::FAILURE
        }
    }
}

/// Mirrors the main loop of the demo firmware.
fn run_demo(
    board: &S32k3x8Evb,
    cfg: &Config,
    cycles: usize,
) -> Result<LoopbackReport, DriverError> {
    let budget = cfg.poll_budget();
    let uart = LpuartDriver::new(board, board.lpuart_base()).with_poll_budget(budget);
    let spi = LpspiDriver::new(board, board.lpspi_base()).with_poll_budget(budget);
    let mut console = LpuartDriver::new(board, board.lpuart_base()).with_poll_budget(budget);

    uart.init()?;
    uart.send_str(BANNER)?;
    spi.init()?;

    let mut total = LoopbackReport::default();
    for cycle in 0..cycles {
        log::debug!("Starting SPI test cycle {}", cycle + 1);
        spi.status_report(&mut console)?;
        let loopback = spi.loopback_test(&mut console)?;
        let single = spi.single_byte_test(&mut console)?;
        total.passed += loopback.passed + single.passed;
        total.failed += loopback.failed + single.failed;
    }

    uart.status_report(&mut console)?;
    for line in board.irqs().pending() {
        log::debug!("IRQ {} asserted at the end of the demo", line);
    }
    Ok(total)
}

// ————————————————————————————————— Dump ——————————————————————————————————— //

/// Print the reset value of every register of the board.
pub fn dump(args: &DumpArgs) -> ExitCode {
    let cfg = match read_config(&args.config) {
        Ok(cfg) => cfg,
        Err(err) => {
            eprintln!("{}", err);
            return ExitCode::FAILURE;
        }
    };

    let irqs = InterruptController::<NB_IRQS>::new();
    let peer = spi_peer(cfg.peer());
    let board = match S32k3x8Evb::new(&cfg.board_config(), &NullBackend, peer, &irqs) {
        Ok(board) => board,
        Err(err) => {
            eprintln!("Invalid board configuration: {}", err);
            return ExitCode::FAILURE;
        }
    };

    println!(
        "FLASH  @ 0x{:08x} ({} KiB)",
        FLASH_BASE,
        FLASH_SIZE / 1024
    );
    println!("SRAM   @ 0x{:08x} ({} KiB)", SRAM_BASE, SRAM_SIZE / 1024);
    println!(
        "LPUART{} @ 0x{:08x}",
        board.lpuart().config().instance,
        board.lpuart_base()
    );
    board.lpuart().for_each_register(|name, offset, value| {
        println!("  {:<6} +0x{:03x} = 0x{:08x}", name, offset, value)
    });
    println!(
        "LPSPI{} @ 0x{:08x}",
        board.lpspi().config().instance,
        board.lpspi_base()
    );
    board.lpspi().for_each_register(|name, offset, value| {
        println!("  {:<6} +0x{:03x} = 0x{:08x}", name, offset, value)
    });
    ExitCode::SUCCESS
}

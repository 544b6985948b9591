//! blexfer CLI - Command-line tool for pushing files to BLE devices.
//!
//! ## Features
//!
//! - Send configuration and firmware files (block or offset transfers)
//! - Serial BLE-UART bridge, host Bluetooth adapter, or dry run
//! - Inspect how a file will be cut before sending it
//! - Interactive serial port selection
//! - Shell completion generation
//! - Environment variable and config file support

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use console::style;
use env_logger::Env;
use log::debug;
use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};

mod commands;
mod config;
mod serial;

use commands::completions::{cmd_completions, cmd_completions_install};
use commands::inspect::{cmd_inspect, cmd_list_ports};
use commands::send::{SendArgs, cmd_send};
use config::Config;

/// Whether stderr is a terminal (set once at startup).
static STDERR_IS_TTY: AtomicBool = AtomicBool::new(true);

/// Set by the Ctrl-C handler.
static INTERRUPTED: AtomicBool = AtomicBool::new(false);

/// Check if emoji/animations should be used (TTY and colors enabled).
fn use_fancy_output() -> bool {
    STDERR_IS_TTY.load(Ordering::Relaxed) && console::colors_enabled_stderr()
}

/// Whether the user pressed Ctrl-C.
fn was_interrupted() -> bool {
    INTERRUPTED.load(Ordering::Relaxed)
}

/// Errors that map to a dedicated exit code.
#[derive(Debug, thiserror::Error)]
pub(crate) enum CliError {
    /// Bad invocation or missing setup (exit code 2).
    #[error("{0}")]
    Usage(String),
    /// Stopped by the user (exit code 130).
    #[error("{0}")]
    Cancelled(String),
}

impl CliError {
    fn exit_code(&self) -> u8 {
        match self {
            Self::Usage(_) => 2,
            Self::Cancelled(_) => 130,
        }
    }
}

/// Exit code for a failed command.
fn exit_code_for(err: &anyhow::Error) -> u8 {
    if let Some(cli_err) = err.downcast_ref::<CliError>() {
        return cli_err.exit_code();
    }
    if matches!(
        err.downcast_ref::<blexfer::Error>(),
        Some(blexfer::Error::Interrupted)
    ) {
        return 130;
    }
    1
}

/// blexfer - Push configuration and firmware files to BLE devices.
///
/// Environment variables:
///   BLEXFER_PORT              - Serial port of the BLE-UART bridge
///   BLEXFER_BAUD              - Bridge baud rate (default: 9600)
///   BLEXFER_DEVICE            - Target device address
///   BLEXFER_CONFIG            - Path to a configuration file
///   BLEXFER_NON_INTERACTIVE   - Non-interactive mode (disable prompts)
#[derive(Parser)]
#[command(name = "blexfer")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Serial port of the BLE-UART bridge (auto-detected if not specified).
    #[arg(short, long, global = true, env = "BLEXFER_PORT")]
    port: Option<String>,

    /// Bridge baud rate [default: 9600].
    #[arg(short, long, global = true, env = "BLEXFER_BAUD")]
    baud: Option<u32>,

    /// Verbose output level (-v, -vv, -vvv for increasing detail).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode (suppress non-essential output).
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Non-interactive mode (fail instead of prompting).
    #[arg(long, global = true, env = "BLEXFER_NON_INTERACTIVE")]
    non_interactive: bool,

    /// Path to a configuration file.
    #[arg(long = "config", global = true, value_name = "PATH", env = "BLEXFER_CONFIG")]
    config_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Kind of file being sent.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum FileKind {
    /// Device configuration, read as a plain file.
    #[value(alias = "config")]
    Configuration,
    /// Main firmware, read from a ZIP update package.
    #[value(alias = "fw")]
    Firmware,
    /// Coprocessor firmware, read from a ZIP update package.
    Coprocessor,
}

impl From<FileKind> for blexfer::FileType {
    fn from(kind: FileKind) -> Self {
        match kind {
            FileKind::Configuration => Self::Configuration,
            FileKind::Firmware => Self::Firmware,
            FileKind::Coprocessor => Self::Coprocessor,
        }
    }
}

/// Transfer generation understood by the device.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum GenerationArg {
    /// Pre-chunked addressed blocks (opcode 07).
    Block,
    /// Offset windows with a whole-file checksum (opcode 12).
    Offset,
}

/// How commands reach the device.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Via {
    /// BLE-UART bridge on a serial port.
    Serial,
    /// Host Bluetooth adapter (requires the `ble` feature).
    Ble,
    /// Print the commands instead of sending them.
    DryRun,
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// Send a configuration or firmware file to a device.
    Send {
        /// File to send (plain file or ZIP update package).
        file: PathBuf,

        /// Kind of file.
        #[arg(short = 't', long = "type", value_enum, default_value_t = FileKind::Firmware)]
        file_type: FileKind,

        /// Transfer generation.
        #[arg(short, long, value_enum, default_value_t = GenerationArg::Block)]
        generation: GenerationArg,

        /// Target device (Bluetooth address or advertised name).
        #[arg(short, long, env = "BLEXFER_DEVICE")]
        device: Option<String>,

        /// How commands reach the device.
        #[arg(long, value_enum, default_value_t = Via::Serial)]
        via: Via,

        /// Package number of the first command (decimal or 0x hex).
        #[arg(long, value_parser = parse_u16)]
        package_number: Option<u16>,

        /// Increment the package number for every command.
        #[arg(long)]
        increment: bool,

        /// Resends per command on transport failure.
        #[arg(long)]
        retries: Option<u32>,

        /// Payload bytes per block or window.
        #[arg(long)]
        block_size: Option<usize>,

        /// Bytes per bridge or ATT write.
        #[arg(long)]
        fragment_size: Option<usize>,
    },

    /// Show how a file will be cut into commands.
    Inspect {
        /// File to inspect (plain file or ZIP update package).
        file: PathBuf,

        /// Kind of file.
        #[arg(short = 't', long = "type", value_enum, default_value_t = FileKind::Firmware)]
        file_type: FileKind,

        /// Transfer generation.
        #[arg(short, long, value_enum, default_value_t = GenerationArg::Block)]
        generation: GenerationArg,

        /// Payload bytes per block or window.
        #[arg(long)]
        block_size: Option<usize>,

        /// Output information as JSON to stdout.
        #[arg(long)]
        json: bool,
    },

    /// List available serial ports.
    ListPorts {
        /// Output port list as JSON to stdout.
        #[arg(long)]
        json: bool,
    },

    /// Generate shell completion scripts.
    Completions {
        /// Shell type for completions (auto-detected if not specified with --install).
        #[arg(value_enum)]
        shell: Option<Shell>,

        /// Automatically install completions to your shell configuration.
        #[arg(long)]
        install: bool,
    },
}

/// Parse a 16-bit number, decimal or `0x`-prefixed hex.
fn parse_u16(s: &str) -> Result<u16, String> {
    let s = s.trim();
    let parsed = match s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
    {
        Some(hex) => u16::from_str_radix(hex, 16),
        None => s.parse::<u16>(),
    };
    parsed.map_err(|e| format!("Invalid 16-bit number '{s}': {e}"))
}

fn init_logger(cli: &Cli) {
    let log_level = if cli.quiet {
        "warn"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level))
        .format_target(cli.verbose >= 2)
        .format_timestamp(if cli.verbose >= 2 {
            Some(env_logger::TimestampPrecision::Millis)
        } else {
            None
        })
        .init();
}

fn install_interrupt_handler() {
    if let Err(e) = ctrlc::set_handler(|| INTERRUPTED.store(true, Ordering::Relaxed)) {
        debug!("Could not install Ctrl-C handler: {e}");
    }
    blexfer::set_interrupt_checker(was_interrupted);
}

fn run(cli: &Cli) -> Result<()> {
    let config = Config::load(cli.config_path.as_deref());

    match &cli.command {
        Commands::Send {
            file,
            file_type,
            generation,
            device,
            via,
            package_number,
            increment,
            retries,
            block_size,
            fragment_size,
        } => {
            let args = SendArgs {
                file: file.clone(),
                file_type: *file_type,
                generation: *generation,
                device: device.clone(),
                via: *via,
                package_number: *package_number,
                increment: *increment,
                retries: *retries,
                block_size: *block_size,
                fragment_size: *fragment_size,
            };
            cmd_send(cli, &config, &args)
        },
        Commands::Inspect {
            file,
            file_type,
            generation,
            block_size,
            json,
        } => {
            let block_size = block_size
                .or(config.transfer.block_size)
                .unwrap_or(blexfer::BLOCK_SIZE);
            cmd_inspect(file, *file_type, *generation, block_size, *json)
        },
        Commands::ListPorts { json } => cmd_list_ports(*json),
        Commands::Completions { shell, install } => {
            if *install {
                cmd_completions_install(*shell)
            } else {
                let shell = shell.ok_or_else(|| {
                    CliError::Usage(
                        "specify a shell type, e.g.: blexfer completions bash \
                         (or use --install to auto-install)"
                            .to_string(),
                    )
                })?;
                cmd_completions(shell);
                Ok(())
            }
        },
    }
}

fn main() -> ExitCode {
    let stderr_is_tty = console::Term::stderr().is_term();
    STDERR_IS_TTY.store(stderr_is_tty, Ordering::Relaxed);

    if env::var("NO_COLOR").is_ok() || !stderr_is_tty {
        console::set_colors_enabled(false);
        console::set_colors_enabled_stderr(false);
    }

    let cli = Cli::parse();
    init_logger(&cli);
    install_interrupt_handler();

    debug!(
        "blexfer v{} (verbose level: {})",
        env!("CARGO_PKG_VERSION"),
        cli.verbose
    );

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{} {err:#}", style("Error:").red().bold());
            ExitCode::from(exit_code_for(&err))
        },
    }
}

//! Send command implementation.

use anyhow::{Context, Result};
use blexfer::transfer::upload::{DEFAULT_MAX_RETRIES, DEFAULT_RETRY_DELAY};
use blexfer::transfer::{PackageNumbering, UploadReport};
use blexfer::transport::SerialTransportConfig;
use blexfer::{
    BLOCK_SIZE, NativePort, RecordingTransport, SerialConfig, SerialTransport, TransferSession,
    Transport, UploadConfig, Uploader,
};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use log::debug;
use std::path::PathBuf;
use std::time::Duration;

use crate::commands::inspect::analyze;
use crate::config::Config;
use crate::serial::{SerialOptions, select_serial_port};
use crate::{Cli, CliError, FileKind, GenerationArg, Via, use_fancy_output, was_interrupted};

/// Options of one `send` invocation.
#[derive(Debug, Clone)]
pub(crate) struct SendArgs {
    pub file: PathBuf,
    pub file_type: FileKind,
    pub generation: GenerationArg,
    pub device: Option<String>,
    pub via: Via,
    pub package_number: Option<u16>,
    pub increment: bool,
    pub retries: Option<u32>,
    pub block_size: Option<usize>,
    pub fragment_size: Option<usize>,
}

/// Device name used in dry runs without `--device`.
const DRY_RUN_DEVICE: &str = "dry-run";

fn ensure_not_interrupted() -> Result<()> {
    if was_interrupted() {
        Err(CliError::Cancelled("Interrupted".to_string()).into())
    } else {
        Ok(())
    }
}

/// Upload tuning from flags, then config, then defaults.
fn upload_config(args: &SendArgs, config: &Config) -> UploadConfig {
    let number = args
        .package_number
        .or(config.transfer.package_number)
        .unwrap_or(1);
    let increment = args.increment || config.transfer.increment.unwrap_or(false);

    UploadConfig {
        max_retries: args
            .retries
            .or(config.transfer.retries)
            .unwrap_or(DEFAULT_MAX_RETRIES),
        retry_delay: config
            .transfer
            .retry_delay_ms
            .map_or(DEFAULT_RETRY_DELAY, Duration::from_millis),
        numbering: if increment {
            PackageNumbering::Incrementing { start: number }
        } else {
            PackageNumbering::Fixed(number)
        },
    }
}

/// Bridge tuning from flags, then config, then defaults.
fn serial_transport_config(args: &SendArgs, config: &Config) -> SerialTransportConfig {
    let defaults = SerialTransportConfig::default();
    SerialTransportConfig {
        fragment_size: args
            .fragment_size
            .or(config.transport.fragment_size)
            .unwrap_or(defaults.fragment_size),
        fragment_delay: config
            .transport
            .fragment_delay_ms
            .map_or(defaults.fragment_delay, Duration::from_millis),
        response_timeout: defaults.response_timeout,
    }
}

fn progress_bar(cli: &Cli, total: usize) -> ProgressBar {
    if cli.quiet || !use_fancy_output() {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(u64::try_from(total).unwrap_or(u64::MAX));
    #[allow(clippy::unwrap_used)] // Static template string
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap()
            .progress_chars("#>-"),
    );
    pb
}

fn run_upload<T: Transport + ?Sized>(
    uploader: &Uploader,
    session: &TransferSession,
    transport: &mut T,
    device: &str,
    pb: &ProgressBar,
) -> Result<UploadReport> {
    let result = uploader.upload(session, transport, device, |sent, _| {
        pb.set_position(u64::try_from(sent).unwrap_or(u64::MAX));
    });
    match result {
        Ok(report) => Ok(report),
        Err(blexfer::Error::Interrupted) => {
            pb.abandon();
            Err(CliError::Cancelled("Upload interrupted".to_string()).into())
        },
        Err(e) => {
            pb.abandon();
            Err(e).with_context(|| format!("Upload to {device} failed"))
        },
    }
}

/// Render a recorded command for the terminal.
///
/// Frames are ISO-8859-1 text terminated by `\r`.
fn printable(frame: &[u8]) -> String {
    frame
        .iter()
        .map(|&b| char::from(b))
        .collect::<String>()
        .trim_end_matches('\r')
        .to_string()
}

fn require_device(args: &SendArgs) -> Result<&str> {
    args.device.as_deref().ok_or_else(|| {
        CliError::Usage("--device is required unless --via dry-run is used".to_string()).into()
    })
}

#[cfg(feature = "ble")]
fn send_via_ble(
    args: &SendArgs,
    config: &Config,
    uploader: &Uploader,
    session: &TransferSession,
    pb: &ProgressBar,
) -> Result<UploadReport> {
    use blexfer::transport::BleTransportConfig;

    let device = require_device(args)?;
    let defaults = BleTransportConfig::default();
    let mut transport = blexfer::BleTransport::open(BleTransportConfig {
        fragment_size: args
            .fragment_size
            .or(config.transport.fragment_size)
            .unwrap_or(defaults.fragment_size),
        ..defaults
    })
    .context("Failed to open Bluetooth adapter")?;
    run_upload(uploader, session, &mut transport, device, pb)
}

#[cfg(not(feature = "ble"))]
fn send_via_ble(
    _args: &SendArgs,
    _config: &Config,
    _uploader: &Uploader,
    _session: &TransferSession,
    _pb: &ProgressBar,
) -> Result<UploadReport> {
    Err(CliError::Usage(
        "this build has no Bluetooth support; rebuild with `--features ble` or use --via serial"
            .to_string(),
    )
    .into())
}

/// Send command implementation.
pub(crate) fn cmd_send(cli: &Cli, config: &Config, args: &SendArgs) -> Result<()> {
    let block_size = args
        .block_size
        .or(config.transfer.block_size)
        .unwrap_or(BLOCK_SIZE);
    let (session, report) = analyze(&args.file, args.file_type, args.generation, block_size)?;

    if !cli.quiet {
        eprintln!(
            "{} Loaded {} ({}, {} bytes, {} commands)",
            style("📦").cyan(),
            style(args.file.display()).yellow(),
            report.file_type,
            report.file_size,
            report.commands
        );
    }

    let uploader = Uploader::new(upload_config(args, config));
    debug!("Upload config: {:?}", uploader.config());
    ensure_not_interrupted()?;

    let (device, result) = match args.via {
        Via::DryRun => {
            let device = args.device.as_deref().unwrap_or(DRY_RUN_DEVICE);
            let mut transport = RecordingTransport::new();
            let pb = ProgressBar::hidden();
            let result = run_upload(&uploader, &session, &mut transport, device, &pb);
            for write in transport.writes() {
                println!("{}", printable(&write.data));
            }
            (device, result)
        },
        Via::Serial => {
            let device = require_device(args)?;
            let options = SerialOptions {
                port: cli.port.clone(),
                non_interactive: cli.non_interactive,
            };
            let port_name = select_serial_port(&options, config)?;
            let baud = cli
                .baud
                .or(config.transport.baud)
                .unwrap_or(SerialConfig::default().baud_rate);
            let mut serial = SerialConfig::new(&port_name, baud);
            if let Some(ms) = config.transport.timeout_ms {
                serial = serial.with_timeout(Duration::from_millis(ms));
            }

            if !cli.quiet {
                eprintln!(
                    "{} Bridge {} @ {} baud",
                    style("🔌").cyan(),
                    style(&port_name).green(),
                    baud
                );
            }
            let port = NativePort::open(&serial)
                .with_context(|| format!("Failed to open {port_name}"))?;
            let mut transport =
                SerialTransport::with_config(port, serial_transport_config(args, config));

            let pb = progress_bar(cli, report.commands);
            let result = run_upload(&uploader, &session, &mut transport, device, &pb);
            if result.is_ok() {
                pb.finish_with_message("Complete");
            }
            (device, result)
        },
        Via::Ble => {
            let device = require_device(args)?;
            let pb = progress_bar(cli, report.commands);
            let result = send_via_ble(args, config, &uploader, &session, &pb);
            if result.is_ok() {
                pb.finish_with_message("Complete");
            }
            (device, result)
        },
    };

    let sent = result?;
    if !cli.quiet {
        eprintln!(
            "{} Sent {} commands to {} ({} retries)",
            style("✓").green().bold(),
            sent.commands,
            style(device).cyan(),
            sent.retries
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> SendArgs {
        SendArgs {
            file: PathBuf::from("fw.zip"),
            file_type: FileKind::Firmware,
            generation: GenerationArg::Block,
            device: None,
            via: Via::DryRun,
            package_number: None,
            increment: false,
            retries: None,
            block_size: None,
            fragment_size: None,
        }
    }

    #[test]
    fn test_upload_config_defaults() {
        let upload = upload_config(&args(), &Config::default());
        assert_eq!(upload.max_retries, DEFAULT_MAX_RETRIES);
        assert_eq!(upload.retry_delay, DEFAULT_RETRY_DELAY);
        assert_eq!(upload.numbering, PackageNumbering::Fixed(1));
    }

    #[test]
    fn test_upload_config_flags_over_config() {
        let mut config = Config::default();
        config.transfer.retries = Some(9);
        config.transfer.package_number = Some(5);
        config.transfer.retry_delay_ms = Some(20);

        let mut a = args();
        a.retries = Some(1);
        a.package_number = Some(0x30);
        a.increment = true;

        let upload = upload_config(&a, &config);
        assert_eq!(upload.max_retries, 1);
        assert_eq!(upload.retry_delay, Duration::from_millis(20));
        assert_eq!(
            upload.numbering,
            PackageNumbering::Incrementing { start: 0x30 }
        );
    }

    #[test]
    fn test_upload_config_increment_from_config() {
        let mut config = Config::default();
        config.transfer.increment = Some(true);
        config.transfer.package_number = Some(7);
        assert_eq!(
            upload_config(&args(), &config).numbering,
            PackageNumbering::Incrementing { start: 7 }
        );
    }

    #[test]
    fn test_serial_transport_config_layers() {
        let mut config = Config::default();
        config.transport.fragment_size = Some(64);
        config.transport.fragment_delay_ms = Some(3);
        let layered = serial_transport_config(&args(), &config);
        assert_eq!(layered.fragment_size, 64);
        assert_eq!(layered.fragment_delay, Duration::from_millis(3));

        let mut a = args();
        a.fragment_size = Some(128);
        assert_eq!(serial_transport_config(&a, &config).fragment_size, 128);
    }

    #[test]
    fn test_printable_strips_terminator() {
        assert_eq!(printable(b"@000107;FFFF;\r"), "@000107;FFFF;");
        assert_eq!(printable(&[b'@', 0xE9, b'\r']), "@\u{e9}");
    }

    #[test]
    fn test_require_device() {
        assert!(require_device(&args()).is_err());
        let mut a = args();
        a.device = Some("AA:BB".to_string());
        assert_eq!(require_device(&a).unwrap(), "AA:BB");
    }
}

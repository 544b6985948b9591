//! Inspect and list-ports command implementations.

use anyhow::{Context, Result};
use blexfer::protocol::crc::checksum_hex;
use blexfer::{
    FileType, FsSource, ImageSource, NativePortEnumerator, PortEnumerator, TransferSession,
    Uploader, checksum16,
};
use console::style;
use std::path::Path;

use crate::serial::describe_port;
use crate::{FileKind, GenerationArg};

/// How a file will be cut into commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct FileReport {
    pub file_type: FileType,
    pub generation: GenerationArg,
    pub file_size: usize,
    pub block_size: usize,
    pub commands: usize,
    pub checksum: u16,
}

impl FileReport {
    fn generation_name(&self) -> &'static str {
        match self.generation {
            GenerationArg::Block => "block",
            GenerationArg::Offset => "offset",
        }
    }

    fn to_json(&self, file: &Path) -> serde_json::Value {
        serde_json::json!({
            "file": file.display().to_string(),
            "type": self.file_type.to_string(),
            "tag": self.file_type.tag(),
            "generation": self.generation_name(),
            "file_size": self.file_size,
            "block_size": self.block_size,
            "commands": self.commands,
            "checksum": checksum_hex(self.checksum),
        })
    }
}

/// Load `file` the way `send` would and describe the result.
pub(crate) fn analyze(
    file: &Path,
    kind: FileKind,
    generation: GenerationArg,
    block_size: usize,
) -> Result<(TransferSession, FileReport)> {
    let file_type = FileType::from(kind);
    let data = FsSource
        .read_for_type(file, file_type)
        .with_context(|| format!("Failed to read {}", file.display()))?;

    let mut session = TransferSession::new().with_block_size(block_size);
    match generation {
        GenerationArg::Block => {
            session.load_block_file(&data, file_type)?;
        },
        GenerationArg::Offset => {
            session.load_offset_file_with_type(&data, file_type)?;
        },
    }

    let report = FileReport {
        file_type,
        generation,
        file_size: data.len(),
        block_size,
        commands: Uploader::plan(&session)?.len(),
        checksum: checksum16(&data),
    };
    Ok((session, report))
}

/// Inspect command implementation.
pub(crate) fn cmd_inspect(
    file: &Path,
    kind: FileKind,
    generation: GenerationArg,
    block_size: usize,
    json: bool,
) -> Result<()> {
    let (_, report) = analyze(file, kind, generation, block_size)?;

    if json {
        let output = serde_json::json!({
            "ok": true,
            "data": report.to_json(file),
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    eprintln!("{}", style(file.display()).bold().underlined());
    eprintln!("  {:<12} {}", style("Type:").dim(), report.file_type);
    eprintln!("  {:<12} {}", style("Generation:").dim(), report.generation_name());
    eprintln!("  {:<12} {} bytes", style("Size:").dim(), report.file_size);
    eprintln!("  {:<12} {} bytes", style("Block size:").dim(), report.block_size);
    eprintln!("  {:<12} {}", style("Commands:").dim(), style(report.commands).cyan());
    eprintln!(
        "  {:<12} {}",
        style("Checksum:").dim(),
        style(checksum_hex(report.checksum)).yellow()
    );
    Ok(())
}

/// List ports command implementation.
pub(crate) fn cmd_list_ports(json: bool) -> Result<()> {
    let detected = NativePortEnumerator::list_ports()?;

    if json {
        let ports: Vec<serde_json::Value> = detected
            .iter()
            .map(|p| {
                serde_json::json!({
                    "name": p.name,
                    "vid": p.vid,
                    "pid": p.pid,
                    "manufacturer": p.manufacturer,
                    "product": p.product,
                })
            })
            .collect();
        let output = serde_json::json!({
            "ok": true,
            "data": {
                "ports": ports,
            }
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    eprintln!("{}", style("Serial ports").bold().underlined());
    if detected.is_empty() {
        eprintln!("  {}", style("No serial ports found").dim());
    } else {
        for port in &detected {
            eprintln!("  {}", describe_port(port));
        }
    }
    Ok(())
}

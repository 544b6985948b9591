//! Serial port selection for the BLE-UART bridge.
//!
//! Order of precedence: `--port` / `BLEXFER_PORT`, the configured port, then
//! the ports present on the host. When several are present the user picks
//! one, unless the session is non-interactive.

use {
    crate::{CliError, config::Config},
    anyhow::Result,
    blexfer::{NativePortEnumerator, PortEnumerator, PortInfo},
    console::style,
    dialoguer::{Error as DialoguerError, Select, theme::ColorfulTheme},
    log::{debug, info},
    std::io::IsTerminal,
};

/// Options for serial port selection.
#[derive(Debug, Clone, Default)]
pub struct SerialOptions {
    /// Explicit port specified via CLI.
    pub port: Option<String>,
    /// Non-interactive mode (fail if multiple ports).
    pub non_interactive: bool,
}

fn usage_err(message: &str) -> anyhow::Error {
    CliError::Usage(message.to_string()).into()
}

/// Choose the port to open.
pub fn select_serial_port(options: &SerialOptions, config: &Config) -> Result<String> {
    if let Some(port) = &options.port {
        return Ok(port.clone());
    }

    if let Some(port) = &config.transport.port {
        debug!("Using port from config: {port}");
        return Ok(port.clone());
    }

    let ports = NativePortEnumerator::list_ports()?;
    choose(ports, options.non_interactive)
}

fn choose(mut ports: Vec<PortInfo>, non_interactive: bool) -> Result<String> {
    match ports.len() {
        0 => Err(usage_err("No serial ports found; connect the bridge or pass --port")),
        1 => {
            let port = ports.remove(0);
            info!("Auto-selected port: {}", port.name);
            Ok(port.name)
        },
        _ if non_interactive => Err(usage_err(
            "Found multiple serial ports; pass --port in non-interactive mode",
        )),
        _ => {
            ensure_interactive_terminal()?;
            select_port_interactive(ports)
        },
    }
}

fn ensure_interactive_terminal() -> Result<()> {
    if std::io::stdin().is_terminal() && std::io::stderr().is_terminal() {
        Ok(())
    } else {
        Err(usage_err(
            "Found multiple serial ports and no terminal to ask; pass --port",
        ))
    }
}

fn map_prompt_error(err: DialoguerError) -> anyhow::Error {
    match err {
        DialoguerError::IO(io_err) => {
            if io_err.kind() == std::io::ErrorKind::Interrupted {
                CliError::Cancelled("Port selection cancelled".to_string()).into()
            } else {
                usage_err("Port selection prompt failed")
            }
        },
    }
}

/// One-line description of a port for lists and prompts.
pub fn describe_port(port: &PortInfo) -> String {
    let vid_pid = match (port.vid, port.pid) {
        (Some(vid), Some(pid)) => format!(" ({vid:04X}:{pid:04X})"),
        _ => String::new(),
    };
    let product = port
        .product
        .as_ref()
        .map(|p| format!(" - {}", style(p).dim()))
        .unwrap_or_default();
    format!("{}{vid_pid}{product}", style(&port.name).cyan())
}

fn select_port_interactive(ports: Vec<PortInfo>) -> Result<String> {
    eprintln!(
        "{} Detected {} serial ports",
        style("ℹ").blue(),
        ports.len()
    );

    let labels: Vec<String> = ports.iter().map(describe_port).collect();
    let selection = Select::with_theme(&ColorfulTheme::default())
        .with_prompt("Select the bridge port")
        .items(&labels)
        .default(0)
        .interact_opt()
        .map_err(map_prompt_error)?;

    match selection {
        Some(index) => ports
            .into_iter()
            .nth(index)
            .map(|p| p.name)
            .ok_or_else(|| anyhow::anyhow!("Invalid port index: {index}")),
        None => Err(CliError::Cancelled("Port selection cancelled".to_string()).into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn port(name: &str) -> PortInfo {
        PortInfo {
            name: name.to_string(),
            vid: Some(0x1A86),
            pid: Some(0x7523),
            manufacturer: None,
            product: Some("USB Serial".to_string()),
        }
    }

    #[test]
    fn test_explicit_port_wins() {
        let mut config = Config::default();
        config.transport.port = Some("/dev/ttyS9".to_string());
        let options = SerialOptions {
            port: Some("/dev/ttyUSB3".to_string()),
            non_interactive: true,
        };
        assert_eq!(select_serial_port(&options, &config).unwrap(), "/dev/ttyUSB3");
    }

    #[test]
    fn test_config_port_used() {
        let mut config = Config::default();
        config.transport.port = Some("/dev/ttyS9".to_string());
        let options = SerialOptions {
            port: None,
            non_interactive: true,
        };
        assert_eq!(select_serial_port(&options, &config).unwrap(), "/dev/ttyS9");
    }

    #[test]
    fn test_single_port_auto_selected() {
        assert_eq!(choose(vec![port("COM4")], true).unwrap(), "COM4");
    }

    #[test]
    fn test_no_ports_is_usage_error() {
        let err = choose(Vec::new(), false).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CliError>(),
            Some(CliError::Usage(_))
        ));
    }

    #[test]
    fn test_multiple_ports_non_interactive_is_usage_error() {
        let err = choose(vec![port("COM4"), port("COM5")], true).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CliError>(),
            Some(CliError::Usage(msg)) if msg.contains("multiple")
        ));
    }

    #[test]
    fn test_describe_port() {
        console::set_colors_enabled(false);
        assert_eq!(
            describe_port(&port("/dev/ttyUSB0")),
            "/dev/ttyUSB0 (1A86:7523) - USB Serial"
        );
    }
}

//! Transport over a serial-attached BLE-UART bridge.
//!
//! The bridge forwards whatever arrives on its UART to the transfer
//! characteristic of the connected peer, so a "long write" becomes a write of
//! the framed command, split into bridge-sized fragments with a short pause
//! between them so the module's buffer does not overflow.

use crate::error::{Result, TransportError};
use crate::port::Port;
use crate::transport::{Transport, Uuid16};
use log::{debug, trace};
use std::thread;
use std::time::Duration;

/// Tuning for [`SerialTransport`].
#[derive(Debug, Clone)]
pub struct SerialTransportConfig {
    /// Largest chunk handed to the bridge at once (0 disables splitting).
    pub fragment_size: usize,
    /// Pause between fragments.
    pub fragment_delay: Duration,
    /// How long to wait for a reply when a response is requested.
    pub response_timeout: Duration,
}

impl Default for SerialTransportConfig {
    fn default() -> Self {
        Self {
            fragment_size: 20,
            fragment_delay: Duration::from_millis(10),
            response_timeout: Duration::from_millis(1000),
        }
    }
}

/// Result of a successful bridge write.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SerialWriteOutcome {
    /// Bytes handed to the bridge.
    pub written: usize,
    /// Reply line from the bridge, if one was requested.
    pub response: Vec<u8>,
}

/// [`Transport`] writing through a BLE-UART bridge.
pub struct SerialTransport<P: Port> {
    port: P,
    config: SerialTransportConfig,
}

impl<P: Port> SerialTransport<P> {
    /// Create a transport with default tuning.
    pub fn new(port: P) -> Self {
        Self::with_config(port, SerialTransportConfig::default())
    }

    /// Create a transport with custom tuning.
    pub fn with_config(port: P, config: SerialTransportConfig) -> Self {
        Self { port, config }
    }

    /// Get a reference to the underlying port.
    pub fn port(&self) -> &P {
        &self.port
    }

    /// Consume the transport and return the underlying port.
    pub fn into_port(self) -> P {
        self.port
    }

    /// Read one reply line (terminated by `\r` or `\n`) or until timeout.
    fn read_response(&mut self) -> Result<Vec<u8>> {
        let previous = self.port.timeout();
        self.port.set_timeout(self.config.response_timeout)?;

        let mut response = Vec::new();
        let mut buf = [0u8; 64];
        let result = loop {
            match self.port.read(&mut buf) {
                Ok(0) => break Ok(()),
                Ok(n) => {
                    response.extend_from_slice(&buf[..n]);
                    if buf[..n].iter().any(|&b| b == b'\r' || b == b'\n') {
                        break Ok(());
                    }
                },
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut => break Ok(()),
                Err(e) => break Err(e),
            }
        };

        self.port.set_timeout(previous)?;
        result?;

        if let Some(end) = response.iter().position(|&b| b == b'\r' || b == b'\n') {
            response.truncate(end);
        }
        Ok(response)
    }
}

impl<P: Port> Transport for SerialTransport<P> {
    type Outcome = SerialWriteOutcome;

    fn long_write(
        &mut self,
        device: &str,
        service: Uuid16,
        characteristic: Uuid16,
        data: &[u8],
        with_response: bool,
    ) -> Result<SerialWriteOutcome> {
        debug!(
            "Writing {} bytes to {device} ({service}/{characteristic}) via {}",
            data.len(),
            self.port.name()
        );

        if with_response {
            self.port.clear_input()?;
        }

        let fragment_size = if self.config.fragment_size == 0 {
            data.len().max(1)
        } else {
            self.config.fragment_size
        };
        for (i, fragment) in data.chunks(fragment_size).enumerate() {
            if i > 0 && !self.config.fragment_delay.is_zero() {
                thread::sleep(self.config.fragment_delay);
            }
            trace!("Fragment {i}: {} bytes", fragment.len());
            self.port.write_all_bytes(fragment)?;
        }

        let response = if with_response {
            let response = self.read_response()?;
            if response.is_empty() {
                return Err(TransportError::new(format!(
                    "no response from {} within {:?}",
                    self.port.name(),
                    self.config.response_timeout
                ))
                .into());
            }
            response
        } else {
            Vec::new()
        };

        Ok(SerialWriteOutcome {
            written: data.len(),
            response,
        })
    }
}

//! Transport through the host Bluetooth adapter (`btleplug`).
//!
//! `btleplug` is async; the transfer layer is not. The transport owns a
//! small current-thread Tokio runtime and blocks on each operation, so the
//! session API stays synchronous and one write is one attempt.
//!
//! Long writes are emulated the way mobile stacks do it: the command is cut
//! into `fragment_size` pieces (ATT MTU minus the 3-byte header) and each
//! piece is written in order.

use crate::error::{Error, Result, TransportError};
use crate::transport::{Transport, Uuid16};
use btleplug::api::{Central, Characteristic, Manager as _, Peripheral as _, ScanFilter, WriteType};
use btleplug::platform::{Adapter, Manager, Peripheral};
use log::{debug, info, trace};
use std::collections::HashMap;
use std::time::Duration;
use tokio::runtime::Runtime;
use uuid::Uuid;

/// Default payload per ATT write for a 23-byte MTU.
pub const DEFAULT_FRAGMENT_SIZE: usize = 20;

/// Tuning for [`BleTransport`].
#[derive(Debug, Clone)]
pub struct BleTransportConfig {
    /// Bytes per ATT write.
    pub fragment_size: usize,
    /// How long to scan for a device that is not yet known.
    pub scan_timeout: Duration,
}

impl Default for BleTransportConfig {
    fn default() -> Self {
        Self {
            fragment_size: DEFAULT_FRAGMENT_SIZE,
            scan_timeout: Duration::from_secs(5),
        }
    }
}

/// Result of a successful GATT write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BleWriteOutcome {
    /// Address of the peripheral written to.
    pub address: String,
    /// Bytes written.
    pub written: usize,
    /// Number of ATT writes issued.
    pub fragments: usize,
}

/// [`Transport`] writing directly to a GATT characteristic.
///
/// Devices are identified by their Bluetooth address (`AA:BB:CC:DD:EE:FF`)
/// or advertised local name.
pub struct BleTransport {
    runtime: Runtime,
    adapter: Adapter,
    config: BleTransportConfig,
    peripherals: HashMap<String, Peripheral>,
}

fn transport_err(context: &str, err: &btleplug::Error) -> Error {
    TransportError::new(format!("{context}: {err}")).into()
}

/// Log a failed scan stop; the scan result is still usable.
fn scan_stopped(result: std::result::Result<(), btleplug::Error>) -> bool {
    match result {
        Ok(()) => true,
        Err(e) => {
            debug!("Could not stop scan: {e}");
            false
        },
    }
}

impl BleTransport {
    /// Open the first Bluetooth adapter of the host.
    pub fn open(config: BleTransportConfig) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;

        let adapter = runtime.block_on(async {
            let manager = Manager::new()
                .await
                .map_err(|e| transport_err("bluetooth manager", &e))?;
            let adapters = manager
                .adapters()
                .await
                .map_err(|e| transport_err("list adapters", &e))?;
            adapters
                .into_iter()
                .next()
                .ok_or_else(|| Error::from(TransportError::new("no Bluetooth adapter found")))
        })?;

        Ok(Self {
            runtime,
            adapter,
            config,
            peripherals: HashMap::new(),
        })
    }

    /// Find, connect and cache the peripheral named `device`.
    fn peripheral(&mut self, device: &str, service: Uuid16) -> Result<Peripheral> {
        if let Some(p) = self.peripherals.get(device) {
            return Ok(p.clone());
        }

        let adapter = &self.adapter;
        let scan_timeout = self.config.scan_timeout;
        let peripheral = self.runtime.block_on(async {
            info!("Scanning for {device} ({scan_timeout:?})");
            adapter
                .start_scan(ScanFilter {
                    services: vec![Uuid::from_u128(service.to_u128())],
                })
                .await
                .map_err(|e| transport_err("start scan", &e))?;
            tokio::time::sleep(scan_timeout).await;
            scan_stopped(adapter.stop_scan().await);

            let peripherals = adapter
                .peripherals()
                .await
                .map_err(|e| transport_err("list peripherals", &e))?;
            for p in peripherals {
                let address = p.address().to_string();
                let name = p
                    .properties()
                    .await
                    .ok()
                    .flatten()
                    .and_then(|props| props.local_name);
                trace!("Seen {address} {name:?}");
                if address.eq_ignore_ascii_case(device) || name.as_deref() == Some(device) {
                    return Ok(p);
                }
            }
            Err(TransportError::new(format!("device {device} not found")).into())
        })?;

        self.runtime.block_on(async {
            if !peripheral
                .is_connected()
                .await
                .map_err(|e| transport_err("connection state", &e))?
            {
                debug!("Connecting to {device}");
                peripheral
                    .connect()
                    .await
                    .map_err(|e| transport_err("connect", &e))?;
            }
            peripheral
                .discover_services()
                .await
                .map_err(|e| transport_err("discover services", &e))
        })?;

        self.peripherals
            .insert(device.to_string(), peripheral.clone());
        Ok(peripheral)
    }

    fn characteristic(
        peripheral: &Peripheral,
        service: Uuid16,
        characteristic: Uuid16,
    ) -> Result<Characteristic> {
        let service = Uuid::from_u128(service.to_u128());
        let wanted = Uuid::from_u128(characteristic.to_u128());
        peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.uuid == wanted && c.service_uuid == service)
            .ok_or_else(|| {
                TransportError::new(format!("characteristic {wanted} not found on {service}")).into()
            })
    }

    /// Disconnect every cached peripheral.
    pub fn disconnect_all(&mut self) {
        for (device, p) in self.peripherals.drain() {
            debug!("Disconnecting {device}");
            let _ = self.runtime.block_on(p.disconnect());
        }
    }
}

impl Transport for BleTransport {
    type Outcome = BleWriteOutcome;

    fn long_write(
        &mut self,
        device: &str,
        service: Uuid16,
        characteristic: Uuid16,
        data: &[u8],
        with_response: bool,
    ) -> Result<BleWriteOutcome> {
        let peripheral = self.peripheral(device, service)?;
        let target = Self::characteristic(&peripheral, service, characteristic)?;
        let write_type = if with_response {
            WriteType::WithResponse
        } else {
            WriteType::WithoutResponse
        };
        let fragment_size = self.config.fragment_size.max(1);

        let fragments = self.runtime.block_on(async {
            let mut count = 0;
            for fragment in data.chunks(fragment_size) {
                peripheral
                    .write(&target, fragment, write_type)
                    .await
                    .map_err(|e| transport_err("write", &e))?;
                count += 1;
            }
            Ok::<_, Error>(count)
        });

        if fragments.is_err() {
            // Force a fresh connection on the next attempt.
            self.peripherals.remove(device);
        }
        let fragments = fragments?;

        trace!("Wrote {} bytes in {fragments} fragments", data.len());
        Ok(BleWriteOutcome {
            address: peripheral.address().to_string(),
            written: data.len(),
            fragments,
        })
    }
}

impl Drop for BleTransport {
    fn drop(&mut self) {
        self.disconnect_all();
    }
}

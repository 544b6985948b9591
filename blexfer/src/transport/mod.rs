//! Transport abstraction for characteristic writes.
//!
//! The session layer never talks to a radio. It frames a command and hands
//! the bytes to a [`Transport`], which performs one long write and reports
//! the outcome. Implementations exist for:
//!
//! - an in-memory recorder (dry runs, tests)
//! - BLE-UART bridges on a serial port (feature `native`)
//! - the host Bluetooth adapter via `btleplug` (feature `ble`)
//!
//! ```text
//! +-------------------+
//! |  TransferSession  |   frames one command per call
//! +---------+---------+
//!           | bytes
//!           v
//! +---------+---------+
//! |  Transport trait  |   long_write(device, service, characteristic, ..)
//! +----+---------+----+
//!      |         |
//!      v         v
//!  serial      btleplug
//!  bridge      adapter
//! ```

#[cfg(feature = "ble")]
pub mod ble;
pub mod memory;
#[cfg(feature = "native")]
pub mod serial;

use crate::error::Result;
use std::fmt;

/// A 16-bit Bluetooth SIG UUID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Uuid16(pub u16);

impl Uuid16 {
    /// The 16-bit short form.
    pub fn short(self) -> u16 {
        self.0
    }

    /// The full 128-bit value on the Bluetooth base UUID.
    pub fn to_u128(self) -> u128 {
        (u128::from(self.0) << 96) | 0x0000_0000_0000_1000_8000_0080_5F9B_34FB
    }
}

impl fmt::Display for Uuid16 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0000{:04x}-0000-1000-8000-00805f9b34fb", self.0)
    }
}

/// Service hosting the transfer characteristic.
pub const TRANSFER_SERVICE: Uuid16 = Uuid16(0xFFE0);

/// The read/write characteristic commands are written to.
pub const TRANSFER_CHARACTERISTIC: Uuid16 = Uuid16(0xFFE1);

/// Performs long-form characteristic writes.
///
/// One call is one attempt. Implementations must not retry on their own;
/// failures are returned as [`Error::Transport`](crate::Error::Transport)
/// (or the I/O variants) and the caller decides what happens next.
pub trait Transport {
    /// Whatever the transport reports for a successful write.
    type Outcome;

    /// Write `data` to `characteristic` of `service` on `device`.
    fn long_write(
        &mut self,
        device: &str,
        service: Uuid16,
        characteristic: Uuid16,
        data: &[u8],
        with_response: bool,
    ) -> Result<Self::Outcome>;
}

impl<T: Transport + ?Sized> Transport for &mut T {
    type Outcome = T::Outcome;

    fn long_write(
        &mut self,
        device: &str,
        service: Uuid16,
        characteristic: Uuid16,
        data: &[u8],
        with_response: bool,
    ) -> Result<Self::Outcome> {
        (**self).long_write(device, service, characteristic, data, with_response)
    }
}

// Re-exports
#[cfg(feature = "ble")]
pub use ble::{BleTransport, BleTransportConfig, BleWriteOutcome};
pub use memory::{RecordedWrite, RecordingTransport};
#[cfg(feature = "native")]
pub use serial::{SerialTransport, SerialTransportConfig, SerialWriteOutcome};

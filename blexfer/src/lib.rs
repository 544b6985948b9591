//! # blexfer
//!
//! A library for pushing files to BLE devices one characteristic write at a
//! time.
//!
//! Files are either pre-chunked into addressed blocks (block-indexed
//! transfers) or kept whole and sent by offset window (offset-indexed
//! transfers). Each command is a small text frame:
//!
//! - Base64 payloads in `@PPPPOO;field;field\r` frames
//! - little-endian hex block addresses, `FFFF` terminal block
//! - CRC16-XMODEM whole-file checksum for offset-indexed transfers
//! - ZIP update packages for firmware images
//!
//! ## Transports
//!
//! - **Recording** (always): in-memory, for dry runs and tests
//! - **Serial bridge** (`native`, default): BLE-UART module via `serialport`
//! - **Bluetooth adapter** (`ble`): direct GATT writes via `btleplug`
//!
//! ## Features
//!
//! - `native` (default): serial bridge transport and port enumeration
//! - `ble`: host Bluetooth adapter transport
//! - `serde`: Serialization support for summary types
//!
//! ## Example
//!
//! ```rust,no_run
//! use blexfer::{FileType, FsSource, TransferSession, Uploader};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut session = TransferSession::new();
//!     let size = session.load_block_file_from(&FsSource, "update.zip", FileType::Firmware)?;
//!     println!("{size} blocks");
//!
//!     #[cfg(feature = "native")]
//!     {
//!         use blexfer::{NativePort, SerialConfig, SerialTransport};
//!
//!         let port = NativePort::open(&SerialConfig::new("/dev/ttyUSB0", 9600))?;
//!         let mut transport = SerialTransport::new(port);
//!         Uploader::default().upload(&session, &mut transport, "AA:BB:CC:DD:EE:FF", |sent, total| {
//!             println!("{sent}/{total}");
//!         })?;
//!     }
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

use std::sync::{Arc, OnceLock};

pub mod error;
pub mod image;
pub mod port;
pub mod protocol;
pub mod transfer;
pub mod transport;

static INTERRUPT_CHECKER: OnceLock<Arc<dyn Fn() -> bool + Send + Sync>> = OnceLock::new();

/// Register a global interruption checker used by long-running library loops.
///
/// The checker should return `true` when the current operation should stop
/// (for example after receiving Ctrl-C in CLI applications).
pub fn set_interrupt_checker<F>(checker: F)
where
    F: Fn() -> bool + Send + Sync + 'static,
{
    let _ = INTERRUPT_CHECKER.set(Arc::new(checker));
}

/// Returns whether interruption was requested by the embedding application.
#[must_use]
pub fn is_interrupted_requested() -> bool {
    INTERRUPT_CHECKER
        .get()
        .is_some_and(|checker| checker())
}

#[cfg(test)]
pub(crate) fn test_set_interrupted(value: bool) {
    use std::sync::atomic::{AtomicBool, Ordering};

    static TEST_INTERRUPT_FLAG: OnceLock<Arc<AtomicBool>> = OnceLock::new();

    let flag = TEST_INTERRUPT_FLAG
        .get_or_init(|| {
            let shared = Arc::new(AtomicBool::new(false));
            let checker = Arc::clone(&shared);
            set_interrupt_checker(move || checker.load(Ordering::Relaxed));
            shared
        })
        .clone();

    flag.store(value, Ordering::Relaxed);
}

/// Serializes tests that depend on the global interrupt flag.
#[cfg(test)]
pub(crate) fn test_interrupt_guard() -> std::sync::MutexGuard<'static, ()> {
    use std::sync::{Mutex, PoisonError};

    static LOCK: Mutex<()> = Mutex::new(());
    LOCK.lock().unwrap_or_else(PoisonError::into_inner)
}

// Re-exports for convenience
#[cfg(feature = "native")]
pub use port::{NativePort, NativePortEnumerator};
#[cfg(feature = "ble")]
pub use transport::BleTransport;
#[cfg(feature = "native")]
pub use transport::SerialTransport;
pub use {
    error::{Error, Result, TransportError},
    image::{FsSource, ImageSource},
    port::{Port, PortEnumerator, PortInfo, SerialConfig},
    protocol::{
        BLOCK_SIZE, Base64Codec, Opcode, Package, TextCodec, address,
        crc::crc16_xmodem as checksum16, frame,
    },
    transfer::{
        BlockSession, FileType, OffsetSummary, SharedTransferSession, TransferSession,
        UploadConfig, Uploader, chunk,
    },
    transport::{
        RecordingTransport, TRANSFER_CHARACTERISTIC, TRANSFER_SERVICE, Transport, Uuid16,
    },
};

//! Transfer session state machine.
//!
//! A session holds at most one loaded file, in one of two generations:
//!
//! - **block-indexed**: the file is pre-chunked into addressed blocks and
//!   sent one block per command (opcode `07`)
//! - **offset-indexed**: the raw bytes are kept and any window starting at a
//!   byte offset can be sent (opcode `12`); loading reports the size and
//!   checksum the device verifies against
//!
//! ```text
//!          load_block_file            clear
//!   Empty -----------------> Blocks ---------> Empty
//!     |                                          ^
//!     |    load_offset_file             clear    |
//!     +------------------> Offset ---------------+
//! ```
//!
//! Loading always replaces the previous file. Sending never changes state
//! and never retries.

use crate::error::{Error, Result};
use crate::image::ImageSource;
use crate::protocol::codec::{Base64Codec, TextCodec};
use crate::protocol::crc::{checksum_hex, crc16_xmodem};
use crate::protocol::package::{Opcode, frame, latin1_bytes};
use crate::protocol::BLOCK_SIZE;
use crate::transfer::chunk::{BlockSession, FileType, chunk};
use crate::transport::{TRANSFER_CHARACTERISTIC, TRANSFER_SERVICE, Transport};
use log::{debug, trace};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// The remote firmware does not acknowledge individual writes.
const WITH_RESPONSE: bool = false;

/// Raw file kept for offset-indexed transfers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OffsetSession {
    data: Vec<u8>,
    checksum: u16,
    file_type: FileType,
    block_size: usize,
}

impl OffsetSession {
    /// File length in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the file is empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Raw file bytes.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// CRC-16/XMODEM of the whole file.
    pub fn checksum(&self) -> u16 {
        self.checksum
    }

    /// File type the data was loaded as.
    pub fn file_type(&self) -> FileType {
        self.file_type
    }

    /// Window size fixed when the file was loaded.
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Start offsets of every window, in sending order.
    pub fn window_offsets(&self) -> impl Iterator<Item = usize> {
        (0..self.data.len()).step_by(self.block_size)
    }

    /// Summary reported back to the caller after loading.
    pub fn summary(&self) -> OffsetSummary {
        OffsetSummary {
            size: self.data.len(),
            checksum: self.checksum,
        }
    }
}

/// Size and checksum of a loaded offset-indexed file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct OffsetSummary {
    /// File length in bytes.
    pub size: usize,
    /// CRC-16/XMODEM of the whole file.
    pub checksum: u16,
}

impl OffsetSummary {
    /// Checksum as four uppercase hex digits, the form the device expects.
    pub fn checksum_hex(&self) -> String {
        checksum_hex(self.checksum)
    }
}

/// Which transfer generation a session holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Generation {
    /// Pre-chunked, addressed blocks.
    BlockIndexed,
    /// Raw bytes sent by offset window.
    OffsetIndexed,
}

#[derive(Debug, Clone)]
enum LoadedFile {
    Blocks(BlockSession),
    Offset(OffsetSession),
}

/// Holds the file currently being transferred and frames commands for it.
///
/// # Example
///
/// ```rust
/// use blexfer::transfer::{FileType, TransferSession};
/// use blexfer::transport::RecordingTransport;
///
/// let mut session = TransferSession::new();
/// let size = session.load_block_file(&[0u8; 450], FileType::Firmware)?;
/// assert_eq!(size, 5);
///
/// let mut transport = RecordingTransport::new();
/// for index in 0..size {
///     session.send_block(&mut transport, "AA:BB:CC:DD:EE:FF", 1, index)?;
/// }
/// assert_eq!(transport.writes().len(), 5);
/// # Ok::<(), blexfer::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct TransferSession<C: TextCodec = Base64Codec> {
    codec: C,
    block_size: usize,
    loaded: Option<LoadedFile>,
}

impl Default for TransferSession<Base64Codec> {
    fn default() -> Self {
        Self::new()
    }
}

impl TransferSession<Base64Codec> {
    /// Create an empty session with the Base64 codec and 180-byte blocks.
    pub fn new() -> Self {
        Self::with_codec(Base64Codec)
    }
}

impl<C: TextCodec> TransferSession<C> {
    /// Create an empty session with a custom payload codec.
    pub fn with_codec(codec: C) -> Self {
        Self {
            codec,
            block_size: BLOCK_SIZE,
            loaded: None,
        }
    }

    /// Override the payload size of blocks and windows.
    ///
    /// Applies to files loaded afterwards; a loaded offset-indexed file
    /// keeps the window size it was loaded with.
    #[must_use]
    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    /// Payload bytes per block or window.
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// The loaded generation, if any.
    pub fn generation(&self) -> Option<Generation> {
        match self.loaded {
            None => None,
            Some(LoadedFile::Blocks(_)) => Some(Generation::BlockIndexed),
            Some(LoadedFile::Offset(_)) => Some(Generation::OffsetIndexed),
        }
    }

    /// Whether nothing is loaded.
    pub fn is_empty(&self) -> bool {
        self.loaded.is_none()
    }

    /// The loaded block session, if the block-indexed generation is loaded.
    pub fn blocks(&self) -> Option<&BlockSession> {
        match &self.loaded {
            Some(LoadedFile::Blocks(blocks)) => Some(blocks),
            _ => None,
        }
    }

    /// The loaded offset session, if the offset-indexed generation is loaded.
    pub fn offset_file(&self) -> Option<&OffsetSession> {
        match &self.loaded {
            Some(LoadedFile::Offset(file)) => Some(file),
            _ => None,
        }
    }

    /// Chunk `data` and make it the current file.
    ///
    /// Returns the session size: data blocks plus header and terminal.
    /// On error the previous state is kept.
    pub fn load_block_file(&mut self, data: &[u8], file_type: FileType) -> Result<usize> {
        let blocks = chunk(data, self.block_size, file_type, &self.codec)?;
        let size = blocks.len();
        debug!("Loaded {} bytes as {size} blocks", data.len());
        self.loaded = Some(LoadedFile::Blocks(blocks));
        Ok(size)
    }

    /// Read a file through `source` and load it as blocks.
    ///
    /// Read failures leave the previous state untouched.
    pub fn load_block_file_from<S: ImageSource + ?Sized>(
        &mut self,
        source: &S,
        path: impl AsRef<Path>,
        file_type: FileType,
    ) -> Result<usize> {
        let data = source.read_for_type(path.as_ref(), file_type)?;
        self.load_block_file(&data, file_type)
    }

    /// Keep `data` for offset-indexed sending.
    pub fn load_offset_file(&mut self, data: &[u8]) -> Result<OffsetSummary> {
        self.load_offset(data.to_vec(), FileType::default())
    }

    /// Like [`load_offset_file`](Self::load_offset_file), recording the file
    /// type the data was read as.
    pub fn load_offset_file_with_type(
        &mut self,
        data: &[u8],
        file_type: FileType,
    ) -> Result<OffsetSummary> {
        self.load_offset(data.to_vec(), file_type)
    }

    /// Read a file through `source` and load it for offset-indexed sending.
    ///
    /// Read failures leave the previous state untouched.
    pub fn load_offset_file_from<S: ImageSource + ?Sized>(
        &mut self,
        source: &S,
        path: impl AsRef<Path>,
        file_type: FileType,
    ) -> Result<OffsetSummary> {
        let data = source.read_for_type(path.as_ref(), file_type)?;
        self.load_offset(data, file_type)
    }

    fn load_offset(&mut self, data: Vec<u8>, file_type: FileType) -> Result<OffsetSummary> {
        if self.block_size == 0 {
            return Err(Error::InvalidInput("block size must be positive".into()));
        }
        let file = OffsetSession {
            checksum: crc16_xmodem(&data),
            data,
            file_type,
            block_size: self.block_size,
        };
        let summary = file.summary();
        debug!(
            "Loaded {} bytes for offset transfer, crc {}",
            summary.size,
            summary.checksum_hex()
        );
        self.loaded = Some(LoadedFile::Offset(file));
        Ok(summary)
    }

    /// Drop the loaded file.
    pub fn clear(&mut self) {
        if self.loaded.take().is_some() {
            debug!("Session cleared");
        }
    }

    /// Build the command for block `index` without sending it.
    pub fn frame_block(&self, package_number: u16, index: usize) -> Result<Vec<u8>> {
        let blocks = match &self.loaded {
            Some(LoadedFile::Blocks(blocks)) => blocks,
            Some(LoadedFile::Offset(_)) => {
                return Err(Error::OutOfRange {
                    what: "block (offset-indexed file loaded)",
                    index,
                    len: 0,
                });
            },
            None => {
                return Err(Error::OutOfRange {
                    what: "block",
                    index,
                    len: 0,
                });
            },
        };
        let block = blocks.get(index).ok_or(Error::OutOfRange {
            what: "block",
            index,
            len: blocks.len(),
        })?;

        let command = frame(
            package_number,
            Opcode::WriteFileBlock,
            &[block.address.as_str(), block.payload.as_str()],
        )?;
        latin1_bytes(&command)
    }

    /// Build the command for the window starting at `offset` without
    /// sending it.
    pub fn frame_offset_window(&self, package_number: u16, offset: usize) -> Result<Vec<u8>> {
        let file = match &self.loaded {
            Some(LoadedFile::Offset(file)) => file,
            Some(LoadedFile::Blocks(_)) => {
                return Err(Error::OutOfRange {
                    what: "offset (block-indexed file loaded)",
                    index: offset,
                    len: 0,
                });
            },
            None => {
                return Err(Error::OutOfRange {
                    what: "offset",
                    index: offset,
                    len: 0,
                });
            },
        };
        if offset >= file.len() {
            return Err(Error::OutOfRange {
                what: "offset",
                index: offset,
                len: file.len(),
            });
        }

        let end = offset.saturating_add(file.block_size).min(file.len());
        let payload = self.codec.encode(&file.data[offset..end])?;
        trace!("Window {offset}..{end} encoded to {} chars", payload.len());

        let address = format!("{offset:04X}");
        let command = frame(
            package_number,
            Opcode::WriteOffsetWindow,
            &[address.as_str(), payload.as_str()],
        )?;
        latin1_bytes(&command)
    }

    /// Frame block `index` and write it to `device`.
    ///
    /// The transport outcome is returned unmodified.
    pub fn send_block<T: Transport + ?Sized>(
        &self,
        transport: &mut T,
        device: &str,
        package_number: u16,
        index: usize,
    ) -> Result<T::Outcome> {
        let command = self.frame_block(package_number, index)?;
        write_command(transport, device, &command)
    }

    /// Frame the window at `offset` and write it to `device`.
    ///
    /// The transport outcome is returned unmodified.
    pub fn send_offset_window<T: Transport + ?Sized>(
        &self,
        transport: &mut T,
        device: &str,
        package_number: u16,
        offset: usize,
    ) -> Result<T::Outcome> {
        let command = self.frame_offset_window(package_number, offset)?;
        write_command(transport, device, &command)
    }
}

fn write_command<T: Transport + ?Sized>(
    transport: &mut T,
    device: &str,
    command: &[u8],
) -> Result<T::Outcome> {
    trace!("-> {device}: {} bytes", command.len());
    transport.long_write(
        device,
        TRANSFER_SERVICE,
        TRANSFER_CHARACTERISTIC,
        command,
        WITH_RESPONSE,
    )
}

/// A [`TransferSession`] shared between threads.
///
/// Commands are framed while the lock is held and written after it is
/// released, so a concurrent [`clear`](Self::clear) either lets a send go
/// out complete or makes it fail with `OutOfRange`.
#[derive(Debug)]
pub struct SharedTransferSession<C: TextCodec = Base64Codec> {
    inner: Arc<Mutex<TransferSession<C>>>,
}

impl<C: TextCodec> Clone for SharedTransferSession<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Default for SharedTransferSession<Base64Codec> {
    fn default() -> Self {
        Self::new(TransferSession::new())
    }
}

impl<C: TextCodec> SharedTransferSession<C> {
    /// Wrap a session.
    pub fn new(session: TransferSession<C>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(session)),
        }
    }

    // A panic while holding the lock cannot leave the session half-updated:
    // every mutation is a single assignment.
    fn lock(&self) -> MutexGuard<'_, TransferSession<C>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` with shared access to the session.
    pub fn with<R>(&self, f: impl FnOnce(&TransferSession<C>) -> R) -> R {
        f(&self.lock())
    }

    /// See [`TransferSession::load_block_file`].
    pub fn load_block_file(&self, data: &[u8], file_type: FileType) -> Result<usize> {
        self.lock().load_block_file(data, file_type)
    }

    /// See [`TransferSession::load_block_file_from`].
    ///
    /// The file is read before the lock is taken.
    pub fn load_block_file_from<S: ImageSource + ?Sized>(
        &self,
        source: &S,
        path: impl AsRef<Path>,
        file_type: FileType,
    ) -> Result<usize> {
        let data = source.read_for_type(path.as_ref(), file_type)?;
        self.lock().load_block_file(&data, file_type)
    }

    /// See [`TransferSession::load_offset_file`].
    pub fn load_offset_file(&self, data: &[u8]) -> Result<OffsetSummary> {
        self.lock().load_offset_file(data)
    }

    /// See [`TransferSession::load_offset_file_with_type`].
    pub fn load_offset_file_with_type(
        &self,
        data: &[u8],
        file_type: FileType,
    ) -> Result<OffsetSummary> {
        self.lock().load_offset_file_with_type(data, file_type)
    }

    /// See [`TransferSession::load_offset_file_from`].
    ///
    /// The file is read before the lock is taken.
    pub fn load_offset_file_from<S: ImageSource + ?Sized>(
        &self,
        source: &S,
        path: impl AsRef<Path>,
        file_type: FileType,
    ) -> Result<OffsetSummary> {
        let data = source.read_for_type(path.as_ref(), file_type)?;
        self.lock().load_offset(data, file_type)
    }

    /// See [`TransferSession::clear`].
    pub fn clear(&self) {
        self.lock().clear();
    }

    /// See [`TransferSession::send_block`].
    pub fn send_block<T: Transport + ?Sized>(
        &self,
        transport: &mut T,
        device: &str,
        package_number: u16,
        index: usize,
    ) -> Result<T::Outcome> {
        let command = self.lock().frame_block(package_number, index)?;
        write_command(transport, device, &command)
    }

    /// See [`TransferSession::send_offset_window`].
    pub fn send_offset_window<T: Transport + ?Sized>(
        &self,
        transport: &mut T,
        device: &str,
        package_number: u16,
        offset: usize,
    ) -> Result<T::Outcome> {
        let command = self.lock().frame_offset_window(package_number, offset)?;
        write_command(transport, device, &command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use crate::protocol::package::Package;
    use crate::transport::RecordingTransport;
    use std::path::PathBuf;

    const DEVICE: &str = "AA:BB:CC:DD:EE:FF";

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 253) as u8).collect()
    }

    /// Source serving canned bytes, or failing every read.
    struct CannedSource(Option<Vec<u8>>);

    impl ImageSource for CannedSource {
        fn read_all(&self, _path: &Path) -> Result<Vec<u8>> {
            self.0
                .clone()
                .ok_or_else(|| std::io::Error::from(std::io::ErrorKind::NotFound).into())
        }

        fn read_from_archive(&self, path: &Path, _entry: Option<&str>) -> Result<Vec<u8>> {
            self.read_all(path)
        }
    }

    #[test]
    fn test_block_session_layout() {
        let mut session = TransferSession::new();
        assert_eq!(
            session
                .load_block_file(&pattern(450), FileType::Firmware)
                .unwrap(),
            5
        );

        let mut t = RecordingTransport::new();
        for i in 0..5 {
            session.send_block(&mut t, DEVICE, 7, i).unwrap();
        }
        let addresses: Vec<String> = t
            .writes()
            .iter()
            .map(|w| Package::parse_bytes(&w.data).unwrap().fields[0].clone())
            .collect();
        assert_eq!(addresses, ["0000", "0100", "0200", "0300", "FFFF"]);
    }

    #[test]
    fn test_empty_file_has_header_and_terminal() {
        let mut session = TransferSession::new();
        assert_eq!(session.load_block_file(&[], FileType::Firmware).unwrap(), 2);
    }

    #[test]
    fn test_send_block_frame() {
        let mut session = TransferSession::new();
        session
            .load_block_file(&[0x00, 0x01, 0x02], FileType::Firmware)
            .unwrap();

        let mut t = RecordingTransport::new();
        session.send_block(&mut t, DEVICE, 0x002A, 1).unwrap();
        let write = &t.writes()[0];
        assert_eq!(write.data, b"@002A07;0100;AAEC\r");
        assert_eq!(write.service, TRANSFER_SERVICE);
        assert_eq!(write.characteristic, TRANSFER_CHARACTERISTIC);
        assert!(!write.with_response);
        assert_eq!(write.device, DEVICE);
    }

    #[test]
    fn test_header_and_terminal_frames() {
        let mut session = TransferSession::new();
        session
            .load_block_file(&[1, 2, 3], FileType::Configuration)
            .unwrap();
        assert_eq!(session.frame_block(1, 0).unwrap(), b"@000107;0000;00\r");
        assert_eq!(session.frame_block(1, 2).unwrap(), b"@000107;FFFF;\r");
    }

    #[test]
    fn test_send_is_idempotent() {
        let mut session = TransferSession::new();
        session
            .load_block_file(&pattern(400), FileType::Firmware)
            .unwrap();

        let mut t = RecordingTransport::new();
        session.send_block(&mut t, DEVICE, 3, 2).unwrap();
        session.send_block(&mut t, DEVICE, 3, 2).unwrap();
        assert_eq!(t.writes()[0].data, t.writes()[1].data);
    }

    #[test]
    fn test_block_index_out_of_range() {
        let mut session = TransferSession::new();
        session
            .load_block_file(&pattern(10), FileType::Firmware)
            .unwrap();

        let mut t = RecordingTransport::new();
        let err = session.send_block(&mut t, DEVICE, 1, 3).unwrap_err();
        assert!(matches!(
            err,
            Error::OutOfRange {
                what: "block",
                index: 3,
                len: 3
            }
        ));
        assert!(t.writes().is_empty());
    }

    #[test]
    fn test_send_after_clear_is_out_of_range() {
        let mut session = TransferSession::new();
        session
            .load_block_file(&pattern(10), FileType::Firmware)
            .unwrap();
        session.clear();
        session.clear();

        let mut t = RecordingTransport::new();
        assert!(matches!(
            session.send_block(&mut t, DEVICE, 1, 0),
            Err(Error::OutOfRange { len: 0, .. })
        ));
        assert!(matches!(
            session.send_offset_window(&mut t, DEVICE, 1, 0),
            Err(Error::OutOfRange { len: 0, .. })
        ));
        assert!(session.is_empty());
    }

    #[test]
    fn test_offset_window_tail() {
        let data = pattern(500);
        let mut session = TransferSession::new();
        let summary = session.load_offset_file(&data).unwrap();
        assert_eq!(summary.size, 500);
        assert_eq!(summary.checksum, crc16_xmodem(&data));

        let mut t = RecordingTransport::new();
        session.send_offset_window(&mut t, DEVICE, 9, 480).unwrap();
        let pkg = Package::parse_bytes(&t.writes()[0].data).unwrap();
        assert_eq!(pkg.opcode, Opcode::WriteOffsetWindow);
        assert_eq!(pkg.fields[0], "01E0");
        assert_eq!(Base64Codec.decode(&pkg.fields[1]).unwrap(), &data[480..]);
    }

    #[test]
    fn test_offset_window_full_and_unaligned() {
        let data = pattern(500);
        let mut session = TransferSession::new();
        session.load_offset_file(&data).unwrap();

        let full = Package::parse_bytes(&session.frame_offset_window(1, 0).unwrap()).unwrap();
        assert_eq!(full.fields[0], "0000");
        assert_eq!(Base64Codec.decode(&full.fields[1]).unwrap(), &data[..180]);

        let odd = Package::parse_bytes(&session.frame_offset_window(1, 7).unwrap()).unwrap();
        assert_eq!(odd.fields[0], "0007");
        assert_eq!(Base64Codec.decode(&odd.fields[1]).unwrap(), &data[7..187]);
    }

    #[test]
    fn test_offset_beyond_end() {
        let mut session = TransferSession::new();
        session.load_offset_file(&pattern(500)).unwrap();
        assert!(matches!(
            session.frame_offset_window(1, 500),
            Err(Error::OutOfRange {
                what: "offset",
                index: 500,
                len: 500
            })
        ));
    }

    #[test]
    fn test_empty_offset_file() {
        let mut session = TransferSession::new();
        let summary = session.load_offset_file(&[]).unwrap();
        assert_eq!(summary.size, 0);
        assert_eq!(summary.checksum_hex(), "0000");
        assert!(session.frame_offset_window(1, 0).is_err());
    }

    #[test]
    fn test_cross_generation_rejected() {
        let mut session = TransferSession::new();
        session
            .load_block_file(&pattern(10), FileType::Firmware)
            .unwrap();
        assert!(matches!(
            session.frame_offset_window(1, 0),
            Err(Error::OutOfRange { len: 0, .. })
        ));

        session.load_offset_file(&pattern(10)).unwrap();
        assert_eq!(session.generation(), Some(Generation::OffsetIndexed));
        assert!(matches!(
            session.frame_block(1, 0),
            Err(Error::OutOfRange { len: 0, .. })
        ));
    }

    #[test]
    fn test_custom_block_size() {
        let mut session = TransferSession::new().with_block_size(4);
        assert_eq!(
            session
                .load_block_file(&pattern(10), FileType::Firmware)
                .unwrap(),
            5
        );

        let mut zero = TransferSession::new().with_block_size(0);
        assert!(matches!(
            zero.load_offset_file(&[1]),
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            zero.load_block_file(&[1], FileType::Firmware),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_offset_window_size_fixed_at_load() {
        let data = pattern(500);
        let mut session = TransferSession::new();
        session.load_offset_file(&data).unwrap();

        let session = session.with_block_size(0);
        assert_eq!(session.offset_file().map(OffsetSession::block_size), Some(180));
        let first = Package::parse_bytes(&session.frame_offset_window(1, 0).unwrap()).unwrap();
        assert_eq!(Base64Codec.decode(&first.fields[1]).unwrap(), &data[..180]);

        let session = session.with_block_size(50);
        let offsets: Vec<usize> = session
            .offset_file()
            .map(|f| f.window_offsets().collect())
            .unwrap_or_default();
        assert_eq!(offsets, [0, 180, 360]);
        let tail = Package::parse_bytes(&session.frame_offset_window(1, 360).unwrap()).unwrap();
        assert_eq!(Base64Codec.decode(&tail.fields[1]).unwrap(), &data[360..]);
    }

    #[test]
    fn test_offset_load_keeps_file_type() {
        let mut session = TransferSession::new();
        session
            .load_offset_file_with_type(&pattern(20), FileType::Coprocessor)
            .unwrap();
        assert_eq!(
            session.offset_file().map(OffsetSession::file_type),
            Some(FileType::Coprocessor)
        );

        session.load_offset_file(&pattern(20)).unwrap();
        assert_eq!(
            session.offset_file().map(OffsetSession::file_type),
            Some(FileType::Configuration)
        );
    }

    #[test]
    fn test_failed_read_keeps_previous_state() {
        let mut session = TransferSession::new();
        session
            .load_block_file(&pattern(450), FileType::Firmware)
            .unwrap();

        let err = session
            .load_block_file_from(&CannedSource(None), PathBuf::from("x"), FileType::Firmware)
            .unwrap_err();
        assert!(matches!(err, Error::Io(_)));
        assert_eq!(session.blocks().map(BlockSession::len), Some(5));

        let err = session
            .load_offset_file_from(&CannedSource(None), "x", FileType::Coprocessor)
            .unwrap_err();
        assert!(matches!(err, Error::Io(_)));
        assert_eq!(session.generation(), Some(Generation::BlockIndexed));
    }

    #[test]
    fn test_load_from_source() {
        let mut session = TransferSession::new();
        let source = CannedSource(Some(pattern(200)));
        assert_eq!(
            session
                .load_block_file_from(&source, "fw.zip", FileType::Firmware)
                .unwrap(),
            4
        );
        let summary = session
            .load_offset_file_from(&source, "esp.zip", FileType::Coprocessor)
            .unwrap();
        assert_eq!(summary.size, 200);
        assert_eq!(
            session.offset_file().map(OffsetSession::file_type),
            Some(FileType::Coprocessor)
        );
    }

    #[test]
    fn test_transport_error_passes_through() {
        let mut session = TransferSession::new();
        session
            .load_block_file(&pattern(10), FileType::Firmware)
            .unwrap();

        let mut t = RecordingTransport::new();
        t.fail_next(TransportError::with_code(133, "GATT error"));
        match session.send_block(&mut t, DEVICE, 1, 0).unwrap_err() {
            Error::Transport(e) => {
                assert_eq!(e, TransportError::with_code(133, "GATT error"));
            },
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_shared_session_across_threads() {
        let shared = SharedTransferSession::default();
        shared
            .load_block_file(&pattern(450), FileType::Firmware)
            .unwrap();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let shared = shared.clone();
                std::thread::spawn(move || {
                    let mut t = RecordingTransport::new();
                    for i in 0..5 {
                        shared.send_block(&mut t, DEVICE, 1, i).unwrap();
                    }
                    t.take_writes()
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        for writes in &results[1..] {
            assert_eq!(writes, &results[0]);
        }

        shared.clear();
        let mut t = RecordingTransport::new();
        assert!(matches!(
            shared.send_block(&mut t, DEVICE, 1, 0),
            Err(Error::OutOfRange { .. })
        ));
        assert!(shared.with(TransferSession::is_empty));
    }
}

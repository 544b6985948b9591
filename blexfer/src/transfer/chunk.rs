//! Splitting a file into addressed blocks (block-indexed generation).
//!
//! ```text
//! index   address   payload
//! 0       "0000"    file type tag ("00", "01", ...)
//! 1       "0100"    encode(data[0..180])
//! 2       "0200"    encode(data[180..360])
//! ...
//! N       addr(N)   encode(data[(N-1)*180..])
//! N+1     "FFFF"    ""
//! ```

use crate::error::{Error, Result};
use crate::protocol::address::{self, HEADER_SEQUENCE, MAX_DATA_SEQUENCE, TERMINAL_ADDRESS};
use crate::protocol::codec::TextCodec;
use log::debug;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Kind of file being transferred, sent in the header block.
///
/// Values are identified by their tag: `Other(1)` equals `Firmware`.
#[derive(Debug, Clone, Copy, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum FileType {
    /// Device configuration (tag 0).
    #[default]
    Configuration,
    /// Main firmware image (tag 1).
    Firmware,
    /// Coprocessor firmware image (tag 2).
    Coprocessor,
    /// Any other tag the device understands.
    Other(u8),
}

impl FileType {
    /// Numeric tag sent to the device.
    pub fn tag(self) -> u8 {
        match self {
            Self::Configuration => 0,
            Self::Firmware => 1,
            Self::Coprocessor => 2,
            Self::Other(tag) => tag,
        }
    }

    /// The named variant for this tag, if there is one.
    #[must_use]
    pub fn normalized(self) -> Self {
        Self::from(self.tag())
    }

    /// Whether the file is shipped inside an update package archive.
    ///
    /// Tag 0 files are plain; every other tag comes zipped.
    pub fn is_archived(self) -> bool {
        self.tag() != 0
    }
}

impl PartialEq for FileType {
    fn eq(&self, other: &Self) -> bool {
        self.tag() == other.tag()
    }
}

impl Eq for FileType {}

impl Hash for FileType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.tag().hash(state);
    }
}

impl From<u8> for FileType {
    fn from(tag: u8) -> Self {
        match tag {
            0 => Self::Configuration,
            1 => Self::Firmware,
            2 => Self::Coprocessor,
            other => Self::Other(other),
        }
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.normalized() {
            Self::Configuration => f.write_str("configuration"),
            Self::Firmware => f.write_str("firmware"),
            Self::Coprocessor => f.write_str("coprocessor firmware"),
            Self::Other(tag) => write!(f, "type {tag}"),
        }
    }
}

/// One addressed unit of a block-indexed transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Block {
    /// Four-character block address.
    pub address: String,
    /// Text-safe payload.
    pub payload: String,
}

impl Block {
    fn header(file_type: FileType) -> Self {
        Self {
            address: address::address(HEADER_SEQUENCE),
            payload: format!("{:02}", file_type.tag()),
        }
    }

    fn terminal() -> Self {
        Self {
            address: TERMINAL_ADDRESS.to_string(),
            payload: String::new(),
        }
    }

    /// Whether this is the end-of-transfer sentinel.
    pub fn is_terminal(&self) -> bool {
        self.address == TERMINAL_ADDRESS
    }
}

/// A file laid out as `[header] + data blocks + [terminal]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockSession {
    blocks: Vec<Block>,
    file_type: FileType,
    file_len: usize,
}

impl BlockSession {
    /// Total number of blocks, header and terminal included.
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Always `false`: even an empty file has a header and a terminal.
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Block at `index`, if any.
    pub fn get(&self, index: usize) -> Option<&Block> {
        self.blocks.get(index)
    }

    /// All blocks in send order.
    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// Data blocks only (header and terminal excluded).
    pub fn data_blocks(&self) -> &[Block] {
        &self.blocks[1..self.blocks.len() - 1]
    }

    /// File type announced in the header.
    pub fn file_type(&self) -> FileType {
        self.file_type
    }

    /// Length of the raw file in bytes.
    pub fn file_len(&self) -> usize {
        self.file_len
    }
}

/// Split `data` into a [`BlockSession`].
///
/// Produces `ceil(data.len() / block_size)` data blocks; an empty file gets
/// none.
pub fn chunk<C: TextCodec + ?Sized>(
    data: &[u8],
    block_size: usize,
    file_type: FileType,
    codec: &C,
) -> Result<BlockSession> {
    if block_size == 0 {
        return Err(Error::InvalidInput("block size must be positive".into()));
    }
    if file_type.tag() > 99 {
        return Err(Error::InvalidInput(format!(
            "file type tag {} does not fit in two digits",
            file_type.tag()
        )));
    }

    let count = data.len().div_ceil(block_size);
    if count > usize::from(MAX_DATA_SEQUENCE) {
        return Err(Error::InvalidInput(format!(
            "{} bytes need {count} blocks of {block_size}, at most {MAX_DATA_SEQUENCE} allowed",
            data.len()
        )));
    }

    let mut blocks = Vec::with_capacity(count + 2);
    blocks.push(Block::header(file_type));
    for (seq, slice) in (1..=MAX_DATA_SEQUENCE).zip(data.chunks(block_size)) {
        blocks.push(Block {
            address: address::address(seq),
            payload: codec.encode(slice)?,
        });
    }
    blocks.push(Block::terminal());

    debug!(
        "Chunked {} bytes into {} data blocks ({file_type})",
        data.len(),
        count
    );

    Ok(BlockSession {
        blocks,
        file_type,
        file_len: data.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::codec::Base64Codec;

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    #[test]
    fn test_block_count_matches_ceil() {
        for (len, size) in [(0, 180), (1, 180), (179, 180), (180, 180), (181, 180), (450, 180), (10, 3)] {
            let session = chunk(&pattern(len), size, FileType::Firmware, &Base64Codec).unwrap();
            assert_eq!(session.data_blocks().len(), len.div_ceil(size), "len {len} size {size}");
            assert_eq!(session.len(), 2 + len.div_ceil(size));
        }
    }

    #[test]
    fn test_payloads_reconstruct_input() {
        let data = pattern(1000);
        let session = chunk(&data, 180, FileType::Firmware, &Base64Codec).unwrap();
        let rebuilt: Vec<u8> = session
            .data_blocks()
            .iter()
            .flat_map(|b| Base64Codec.decode(&b.payload).unwrap())
            .collect();
        assert_eq!(rebuilt, data);
    }

    #[test]
    fn test_last_block_is_short() {
        let session = chunk(&pattern(450), 180, FileType::Firmware, &Base64Codec).unwrap();
        let sizes: Vec<usize> = session
            .data_blocks()
            .iter()
            .map(|b| Base64Codec.decode(&b.payload).unwrap().len())
            .collect();
        assert_eq!(sizes, [180, 180, 90]);
    }

    #[test]
    fn test_header_and_terminal() {
        let session = chunk(&pattern(10), 180, FileType::Firmware, &Base64Codec).unwrap();
        let header = session.get(0).unwrap();
        assert_eq!(header.address, "0000");
        assert_eq!(header.payload, "01");

        let terminal = session.get(session.len() - 1).unwrap();
        assert_eq!(terminal.address, "FFFF");
        assert!(terminal.payload.is_empty());
        assert!(terminal.is_terminal());
    }

    #[test]
    fn test_header_tag_is_zero_padded() {
        let config = chunk(&[], 180, FileType::Configuration, &Base64Codec).unwrap();
        assert_eq!(config.get(0).unwrap().payload, "00");

        let other = chunk(&[], 180, FileType::Other(42), &Base64Codec).unwrap();
        assert_eq!(other.get(0).unwrap().payload, "42");
    }

    #[test]
    fn test_addresses_are_sequential() {
        let session = chunk(&pattern(180 * 300), 180, FileType::Firmware, &Base64Codec).unwrap();
        for (i, block) in session.data_blocks().iter().enumerate() {
            let seq = u16::try_from(i + 1).unwrap();
            assert_eq!(block.address, address::address(seq));
        }
        assert_eq!(session.get(256).unwrap().address, "0001");
    }

    #[test]
    fn test_zero_block_size_rejected() {
        assert!(matches!(
            chunk(&[1, 2, 3], 0, FileType::Firmware, &Base64Codec),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_three_digit_tag_rejected() {
        assert!(matches!(
            chunk(&[], 180, FileType::Other(100), &Base64Codec),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_too_many_blocks_rejected() {
        let data = vec![0u8; usize::from(MAX_DATA_SEQUENCE) + 1];
        assert!(matches!(
            chunk(&data, 1, FileType::Firmware, &Base64Codec),
            Err(Error::InvalidInput(_))
        ));

        let data = vec![0u8; usize::from(MAX_DATA_SEQUENCE)];
        let session = chunk(&data, 1, FileType::Firmware, &Base64Codec).unwrap();
        assert_eq!(session.len(), usize::from(MAX_DATA_SEQUENCE) + 2);
    }

    #[test]
    fn test_file_type_tags() {
        assert_eq!(FileType::from(0), FileType::Configuration);
        assert_eq!(FileType::from(1), FileType::Firmware);
        assert_eq!(FileType::from(2), FileType::Coprocessor);
        assert_eq!(FileType::from(9), FileType::Other(9));
        assert!(!FileType::Configuration.is_archived());
        assert!(FileType::Firmware.is_archived());
    }

    #[test]
    fn test_other_file_type_follows_its_tag() {
        use std::collections::HashSet;

        assert_eq!(FileType::Other(0), FileType::Configuration);
        assert_eq!(FileType::Other(1), FileType::Firmware);
        assert_ne!(FileType::Other(7), FileType::Other(8));
        assert!(!FileType::Other(0).is_archived());
        assert!(FileType::Other(2).is_archived());
        assert_eq!(FileType::Other(2).normalized().to_string(), "coprocessor firmware");
        assert_eq!(FileType::Other(0).to_string(), "configuration");

        let set: HashSet<FileType> = [FileType::Other(1), FileType::Firmware].into_iter().collect();
        assert_eq!(set.len(), 1);
    }
}

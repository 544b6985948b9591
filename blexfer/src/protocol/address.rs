//! Block addressing for the block-indexed generation.
//!
//! A block is identified by its sequence position, written as the two bytes
//! of a little-endian `u16`, each as two lowercase hex digits:
//!
//! ```text
//! seq      bytes (LE)   address
//! 0x0001   01 00        "0100"
//! 0x0100   00 01        "0001"
//! 0x1234   34 12        "3412"
//! ```
//!
//! The end of a transfer is marked by the reserved [`TERMINAL_ADDRESS`].

use crate::error::{Error, Result};
use byteorder::{ByteOrder, LittleEndian};

/// Address of the terminal sentinel block.
pub const TERMINAL_ADDRESS: &str = "FFFF";

/// Sequence number of the header block.
pub const HEADER_SEQUENCE: u16 = 0;

/// Highest sequence number a data block may use.
///
/// `0xFFFF` would render as `"ffff"` and collide with the terminal sentinel.
pub const MAX_DATA_SEQUENCE: u16 = 0xFFFE;

/// Address of the block at sequence position `seq`.
pub fn address(seq: u16) -> String {
    let mut bytes = [0u8; 2];
    LittleEndian::write_u16(&mut bytes, seq);
    format!("{:02x}{:02x}", bytes[0], bytes[1])
}

/// Like [`address`], for callers holding a wider integer.
pub fn checked_address(seq: usize) -> Result<String> {
    u16::try_from(seq)
        .map(address)
        .map_err(|_| Error::InvalidInput(format!("sequence number {seq} exceeds 16 bits")))
}

/// Address of the terminal sentinel.
pub fn terminal_address() -> &'static str {
    TERMINAL_ADDRESS
}

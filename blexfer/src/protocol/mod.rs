//! Protocol implementations.

pub mod address;
pub mod codec;
pub mod crc;
pub mod package;

/// Payload bytes carried by one block or offset window.
pub const BLOCK_SIZE: usize = 180;

// Re-export common types
pub use address::{TERMINAL_ADDRESS, address, terminal_address};
pub use codec::{Base64Codec, TextCodec};
pub use package::{Opcode, Package, frame};

//! Text-safe payload encoding.
//!
//! The remote firmware parses commands as text, so raw file bytes never go
//! on the wire directly. A [`TextCodec`] turns a slice of at most one block
//! into symbols the command grammar accepts, and back.

use crate::error::{Error, Result};
use data_encoding::BASE64;

/// Reversible bytes-to-text encoding.
///
/// Implementations must be exact inverses: `decode(&encode(b)?)? == b` for
/// every byte sequence up to the block size. The encoded text must only use
/// characters accepted by [`Package`](crate::protocol::package::Package)
/// fields.
pub trait TextCodec: Send + Sync {
    /// Encode raw bytes.
    fn encode(&self, data: &[u8]) -> Result<String>;

    /// Decode text produced by [`TextCodec::encode`].
    fn decode(&self, text: &str) -> Result<Vec<u8>>;
}

/// Standard padded Base64 (RFC 4648).
#[derive(Debug, Clone, Copy, Default)]
pub struct Base64Codec;

impl TextCodec for Base64Codec {
    fn encode(&self, data: &[u8]) -> Result<String> {
        Ok(BASE64.encode(data))
    }

    fn decode(&self, text: &str) -> Result<Vec<u8>> {
        BASE64
            .decode(text.as_bytes())
            .map_err(|e| Error::Encoding(format!("invalid payload text: {e}")))
    }
}

impl<C: TextCodec + ?Sized> TextCodec for &C {
    fn encode(&self, data: &[u8]) -> Result<String> {
        (**self).encode(data)
    }

    fn decode(&self, text: &str) -> Result<Vec<u8>> {
        (**self).decode(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base64_inverse_over_block_sizes() {
        let codec = Base64Codec;
        for len in [0usize, 1, 2, 3, 4, 89, 90, 179, 180] {
            let data: Vec<u8> = (0..len).map(|i| (i as u8).wrapping_mul(31)).collect();
            let text = codec.encode(&data).unwrap();
            assert_eq!(codec.decode(&text).unwrap(), data, "len {len}");
        }
    }

    #[test]
    fn test_base64_output_is_ascii() {
        let data: Vec<u8> = (0..=255u8).collect();
        let text = Base64Codec.encode(&data).unwrap();
        assert!(text.bytes().all(|b| b.is_ascii_graphic()));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(
            Base64Codec.decode("not base64!"),
            Err(Error::Encoding(_))
        ));
    }
}

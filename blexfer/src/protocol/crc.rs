//! CRC-16/XMODEM checksum.
//!
//! Polynomial `0x1021`, initial value `0x0000`, no reflection and no final
//! XOR. The offset-indexed generation reports this value when a file is
//! loaded so the caller can compare it against what the device computed.

/// Generator polynomial.
const POLY: u16 = 0x1021;

const TABLE: [u16; 256] = build_table();

const fn build_table() -> [u16; 256] {
    let mut table = [0u16; 256];
    let mut i = 0;
    while i < 256 {
        #[allow(clippy::cast_possible_truncation)]
        let mut crc = (i as u16) << 8;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 0x8000 != 0 {
                (crc << 1) ^ POLY
            } else {
                crc << 1
            };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

/// Compute the CRC-16/XMODEM of `data`.
pub fn crc16_xmodem(data: &[u8]) -> u16 {
    data.iter().fold(0u16, |crc, &byte| {
        let idx = usize::from((crc >> 8) as u8 ^ byte);
        (crc << 8) ^ TABLE[idx]
    })
}

/// Render a checksum the way the device reports it (four uppercase hex digits).
pub fn checksum_hex(crc: u16) -> String {
    format!("{crc:04X}")
}

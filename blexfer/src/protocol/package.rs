//! Command framing ("packages").
//!
//! Every write to the transfer characteristic is one package: a package
//! number chosen by the caller, a two-digit operation code and an ordered
//! list of text fields.
//!
//! ## Frame Format
//!
//! ```text
//! +-----+----------+--------+-----+---------+-----+---------+------+
//! | '@' |  PKG     |  OP    | ';' | FIELD 0 | ';' | FIELD 1 | '\r' |
//! +-----+----------+--------+-----+---------+-----+---------+------+
//! |  1  | 4 hex    | 2 dec  |  1  |  var    |  1  |  var    |  1   |
//! +-----+----------+--------+-----+---------+-----+---------+------+
//! ```
//!
//! Fields may be empty and may hold any ISO-8859-1 character except the
//! delimiters and control characters. The text is sent one byte per
//! character.

use crate::error::{Error, Result};
use std::fmt;

/// Start-of-package marker.
pub const START: char = '@';

/// Field separator.
pub const SEPARATOR: char = ';';

/// End-of-package marker.
pub const END: char = '\r';

/// Operation codes understood by the remote firmware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    /// Write one block of a block-indexed transfer (`"07"`).
    WriteFileBlock,
    /// Write one window of an offset-indexed transfer (`"12"`).
    WriteOffsetWindow,
}

impl Opcode {
    /// Wire representation.
    pub fn code(self) -> &'static str {
        match self {
            Self::WriteFileBlock => "07",
            Self::WriteOffsetWindow => "12",
        }
    }

    /// Look up an opcode by its wire representation.
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "07" => Some(Self::WriteFileBlock),
            "12" => Some(Self::WriteOffsetWindow),
            _ => None,
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// One command addressed to the remote firmware.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Package {
    /// Caller-chosen number identifying the upload attempt.
    pub number: u16,
    /// Operation selector.
    pub opcode: Opcode,
    /// Ordered text fields.
    pub fields: Vec<String>,
}

impl Package {
    /// Create a package.
    pub fn new(number: u16, opcode: Opcode, fields: Vec<String>) -> Self {
        Self {
            number,
            opcode,
            fields,
        }
    }

    /// Serialize to command text.
    pub fn to_command(&self) -> Result<String> {
        let fields: Vec<&str> = self.fields.iter().map(String::as_str).collect();
        frame(self.number, self.opcode, &fields)
    }

    /// Serialize to the bytes written to the characteristic.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        latin1_bytes(&self.to_command()?)
    }

    /// Parse command text back into a package.
    pub fn parse(command: &str) -> Result<Self> {
        let body = command
            .strip_prefix(START)
            .and_then(|s| s.strip_suffix(END))
            .ok_or_else(|| Error::Encoding("missing package delimiters".into()))?;

        // PKG(4) + OP(2), both ASCII
        if body.len() < 6 || !body.is_char_boundary(6) {
            return Err(Error::Encoding("truncated package header".into()));
        }
        let (header, rest) = body.split_at(6);
        if !header.is_ascii() {
            return Err(Error::Encoding("non-ASCII package header".into()));
        }
        let number = u16::from_str_radix(&header[..4], 16)
            .map_err(|e| Error::Encoding(format!("bad package number: {e}")))?;
        let opcode = Opcode::from_code(&header[4..])
            .ok_or_else(|| Error::Encoding(format!("unknown opcode {:?}", &header[4..])))?;

        let fields = if rest.is_empty() {
            Vec::new()
        } else {
            rest.strip_prefix(SEPARATOR)
                .ok_or_else(|| Error::Encoding("missing field separator".into()))?
                .split(SEPARATOR)
                .map(str::to_string)
                .collect()
        };

        Ok(Self {
            number,
            opcode,
            fields,
        })
    }

    /// Parse bytes as written to the characteristic.
    pub fn parse_bytes(bytes: &[u8]) -> Result<Self> {
        Self::parse(&latin1_string(bytes))
    }
}

/// Frame `fields` into command text.
///
/// The output depends only on the arguments, so a retried send of the same
/// block produces the same bytes.
pub fn frame(number: u16, opcode: Opcode, fields: &[&str]) -> Result<String> {
    let body_len: usize = fields.iter().map(|f| f.len() + 1).sum();
    let mut out = String::with_capacity(8 + body_len);

    out.push(START);
    out.push_str(&format!("{number:04X}"));
    out.push_str(opcode.code());
    for (i, field) in fields.iter().enumerate() {
        if let Some(bad) = field.chars().find(|&c| !is_field_char(c)) {
            return Err(Error::Encoding(format!(
                "field {i} contains unsupported character {bad:?}"
            )));
        }
        out.push(SEPARATOR);
        out.push_str(field);
    }
    out.push(END);

    Ok(out)
}

/// Whether `c` may appear inside a field.
pub fn is_field_char(c: char) -> bool {
    u32::from(c) <= 0xFF && !c.is_control() && c != START && c != SEPARATOR
}

/// Convert text to ISO-8859-1 bytes, one byte per character.
pub fn latin1_bytes(text: &str) -> Result<Vec<u8>> {
    text.chars()
        .map(|c| {
            u8::try_from(u32::from(c))
                .map_err(|_| Error::Encoding(format!("{c:?} is not representable in ISO-8859-1")))
        })
        .collect()
}

/// Decode ISO-8859-1 bytes.
pub fn latin1_string(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}

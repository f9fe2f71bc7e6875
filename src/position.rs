//! Reading positions.
//!
//! A position is stored as a string. The plain form is a decimal character offset. The chunked
//! form prefixes it with base64 of a version byte and two little-endian `u32`s (the chunk's
//! element id and the offset within that chunk), separated by a colon:
//!
//! ```text
//! AdIEAAAuFgAA:5050   ->  chunk eid 1234, chunk pos 5678, char pos 5050
//! ```
//!
//! Only canonical text is accepted, so formatting a parsed position reproduces its input.

use std::{fmt, str::FromStr};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use byteorder::{ByteOrder, LittleEndian};
use serde::{Deserialize, Serialize};

use crate::{
    cursor::Cursor,
    error::{Error, Result},
    primitive::KStr,
};

/// Location inside a content chunk.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChunkOffset {
    pub eid: u32,
    pub pos: u32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    pub chunk: Option<ChunkOffset>,
    pub char_pos: i64,
}

impl Position {
    /// The only chunk encoding version in use.
    pub const VERSION: u8 = 1;
    const CHUNK_LEN: usize = 9;

    pub fn new(char_pos: i64) -> Self {
        Self {
            chunk: None,
            char_pos,
        }
    }

    pub fn with_chunk(eid: u32, pos: u32, char_pos: i64) -> Self {
        Self {
            chunk: Some(ChunkOffset { eid, pos }),
            char_pos,
        }
    }

    pub fn chunk_eid(&self) -> Option<u32> {
        self.chunk.map(|c| c.eid)
    }

    pub fn chunk_pos(&self) -> Option<u32> {
        self.chunk.map(|c| c.pos)
    }

    pub fn read(cursor: &mut Cursor) -> Result<Self> {
        let offset = cursor.tell();
        let text = cursor.read_tagged_utf8()?;
        text.as_str().parse().map_err(|e: ParsePositionError| Error::Malformed {
            offset,
            reason: e.to_string(),
        })
    }

    pub fn write(&self, cursor: &mut Cursor) -> Result<()> {
        cursor.write_tagged_utf8(&KStr::explicit(self.to_string()))
    }
}

fn parse_decimal(text: &str) -> Result<i64, ParsePositionError> {
    let n: i64 = text
        .parse()
        .map_err(|_| ParsePositionError(format!("`{}` is not a decimal integer", text)))?;
    if n.to_string() != text {
        return Err(ParsePositionError(format!(
            "`{}` is not in canonical decimal form",
            text
        )));
    }
    Ok(n)
}

/// Failure to parse a position string.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParsePositionError(String);

impl fmt::Display for ParsePositionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bad position: {}", self.0)
    }
}

impl std::error::Error for ParsePositionError {}

impl FromStr for Position {
    type Err = ParsePositionError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let (prefix, decimal) = match text.split_once(':') {
            None => return Ok(Position::new(parse_decimal(text)?)),
            Some(parts) => parts,
        };
        let raw = STANDARD
            .decode(prefix)
            .map_err(|e| ParsePositionError(format!("chunk prefix `{}`: {}", prefix, e)))?;
        if raw.len() != Self::CHUNK_LEN {
            return Err(ParsePositionError(format!(
                "chunk prefix holds {} bytes, expected {}",
                raw.len(),
                Self::CHUNK_LEN
            )));
        }
        if raw[0] != Self::VERSION {
            return Err(ParsePositionError(format!(
                "unsupported chunk version {}",
                raw[0]
            )));
        }
        if STANDARD.encode(&raw) != prefix {
            return Err(ParsePositionError(format!(
                "chunk prefix `{}` is not canonical base64",
                prefix
            )));
        }
        Ok(Position::with_chunk(
            LittleEndian::read_u32(&raw[1..5]),
            LittleEndian::read_u32(&raw[5..9]),
            parse_decimal(decimal)?,
        ))
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(chunk) = self.chunk {
            let mut raw = [0u8; Self::CHUNK_LEN];
            raw[0] = Self::VERSION;
            LittleEndian::write_u32(&mut raw[1..5], chunk.eid);
            LittleEndian::write_u32(&mut raw[5..9], chunk.pos);
            write!(f, "{}:", STANDARD.encode(raw))?;
        }
        write!(f, "{}", self.char_pos)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn chunked_form() {
        let pos: Position = "AdIEAAAuFgAA:5050".parse().unwrap();
        assert_eq!(pos.chunk_eid(), Some(1234));
        assert_eq!(pos.chunk_pos(), Some(5678));
        assert_eq!(pos.char_pos, 5050);
        assert_eq!(pos.to_string(), "AdIEAAAuFgAA:5050");
    }

    #[test]
    fn plain_form() {
        let pos: Position = "5050".parse().unwrap();
        assert_eq!(pos, Position::new(5050));
        assert_eq!(pos.to_string(), "5050");
        let pos: Position = "-1".parse().unwrap();
        assert_eq!(pos.char_pos, -1);
    }

    #[test]
    fn rejects_noncanonical() {
        for text in ["", "+5", "007", "abc", "AdIEAAAuFgAA:", "AdIEAAAuFg:1", "AtIEAAAuFgAA:1"] {
            assert!(text.parse::<Position>().is_err(), "`{}` should not parse", text);
        }
    }

    #[test]
    fn wire_roundtrip() {
        let mut cursor = Cursor::new();
        Position::with_chunk(7, 8, 9).write(&mut cursor).unwrap();
        let bytes = cursor.as_bytes().to_vec();
        cursor.seek(0).unwrap();
        let pos = Position::read(&mut cursor).unwrap();
        assert_eq!(pos, Position::with_chunk(7, 8, 9));
        let mut out = Cursor::new();
        pos.write(&mut out).unwrap();
        assert_eq!(out.as_bytes(), &bytes[..]);
    }

    #[test]
    fn bad_wire_string() {
        let mut cursor = Cursor::new();
        cursor.write_tagged_utf8(&KStr::new("x1")).unwrap();
        cursor.seek(0).unwrap();
        assert!(matches!(
            Position::read(&mut cursor),
            Err(Error::Malformed { offset: 0, .. })
        ));
    }
}

use byteorder::{BigEndian, ByteOrder};

use crate::{
    error::{Error, Result},
    marker::Kind,
    primitive::KStr,
};

/// A byte buffer with a read/write position and a stack of saved positions for speculative
/// parsing.
///
/// All numbers are fixed-width big-endian. Writes happen at the current position, overwriting
/// whatever is there and growing the buffer only when they run past its end.
#[derive(Clone, Debug, Default)]
pub struct Cursor {
    data: Vec<u8>,
    pos: usize,
    saved: Vec<usize>,
}

impl Cursor {
    /// Make an empty cursor, for encoding.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make a cursor over existing data, positioned at the start.
    pub fn from_bytes(data: impl Into<Vec<u8>>) -> Self {
        Self {
            data: data.into(),
            pos: 0,
            saved: Vec::new(),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Current position.
    pub fn tell(&self) -> usize {
        self.pos
    }

    /// Move to an absolute position. Positions past the end of the data are rejected.
    pub fn seek(&mut self, pos: usize) -> Result<()> {
        if pos > self.data.len() {
            return Err(Error::UnexpectedEnd {
                offset: self.pos,
                needed: pos - self.pos,
                available: self.remaining(),
            });
        }
        self.pos = pos;
        Ok(())
    }

    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    pub fn is_at_end(&self) -> bool {
        self.pos >= self.data.len()
    }

    pub fn peek_byte(&self) -> Option<u8> {
        self.data.get(self.pos).copied()
    }

    /// Look at the next `n` bytes without consuming them.
    pub fn peek_bytes(&self, n: usize) -> Option<&[u8]> {
        self.data.get(self.pos..self.pos.checked_add(n)?)
    }

    /// Consume `literal` if it's next, returning whether it was.
    pub fn eat(&mut self, literal: &[u8]) -> bool {
        if self.peek_bytes(literal.len()) == Some(literal) {
            self.pos += literal.len();
            true
        } else {
            false
        }
    }

    /// Consume `literal`, or fail with a tag mismatch without moving.
    pub fn expect(&mut self, literal: &[u8]) -> Result<()> {
        if self.eat(literal) {
            Ok(())
        } else {
            Err(self.mismatch(literal))
        }
    }

    // Build a mismatch error against whatever is at the current position.
    pub(crate) fn mismatch(&self, expected: &[u8]) -> Error {
        let end = self.data.len().min(self.pos + expected.len().max(1));
        Error::TagMismatch {
            offset: self.pos,
            expected: expected.to_vec(),
            actual: self.data.get(self.pos..end).unwrap_or(&[]).to_vec(),
        }
    }

    /// Consume exactly `width` bytes.
    pub fn read_fixed(&mut self, width: usize) -> Result<&[u8]> {
        if width > self.remaining() {
            return Err(Error::UnexpectedEnd {
                offset: self.pos,
                needed: width,
                available: self.remaining(),
            });
        }
        let start = self.pos;
        self.pos += width;
        Ok(&self.data[start..self.pos])
    }

    /// Write bytes at the current position, growing the buffer if they run past its end.
    pub fn write_fixed(&mut self, bytes: &[u8]) {
        let end = self.pos + bytes.len();
        if end > self.data.len() {
            self.data.resize(end, 0);
        }
        self.data[self.pos..end].copy_from_slice(bytes);
        self.pos = end;
    }

    /// Push the current position onto the checkpoint stack.
    pub fn save(&mut self) {
        self.saved.push(self.pos);
    }

    /// Pop the last checkpoint and move back to it.
    pub fn restore(&mut self) -> Result<()> {
        self.pos = self
            .saved
            .pop()
            .ok_or_else(|| Error::Usage(String::from("restore without a saved checkpoint")))?;
        Ok(())
    }

    /// Pop the last checkpoint, keeping the current position.
    pub fn unsave(&mut self) -> Result<()> {
        self.saved
            .pop()
            .map(|_| ())
            .ok_or_else(|| Error::Usage(String::from("unsave without a saved checkpoint")))
    }

    /// Number of outstanding checkpoints.
    pub fn checkpoints(&self) -> usize {
        self.saved.len()
    }

    fn read_tag(&mut self, kind: Kind) -> Result<()> {
        self.expect(&[kind.into_u8()])
    }

    // Reads a tag and the fixed-width payload that follows it. If the payload is short, the tag
    // is put back so the cursor doesn't end up between a tag and its payload.
    fn read_fixed_kind(&mut self, kind: Kind) -> Result<&[u8]> {
        let width = kind
            .width()
            .ok_or_else(|| Error::Usage(format!("{} has no fixed width", kind)))?;
        self.read_tag(kind)?;
        if width > self.remaining() {
            let err = Error::UnexpectedEnd {
                offset: self.pos,
                needed: width,
                available: self.remaining(),
            };
            self.pos -= 1;
            return Err(err);
        }
        self.read_fixed(width)
    }

    fn malformed(&self, offset: usize, reason: impl Into<String>) -> Error {
        Error::Malformed {
            offset,
            reason: reason.into(),
        }
    }

    pub fn read_tagged_bool(&mut self) -> Result<bool> {
        let offset = self.pos + 1;
        let v = self.read_fixed_kind(Kind::Bool)?[0];
        match v {
            0 => Ok(false),
            1 => Ok(true),
            v => Err(self.malformed(offset, format!("boolean byte 0x{:02x} is not 0 or 1", v))),
        }
    }

    pub fn read_tagged_byte(&mut self) -> Result<i8> {
        Ok(self.read_fixed_kind(Kind::Byte)?[0] as i8)
    }

    pub fn read_tagged_char(&mut self) -> Result<u8> {
        Ok(self.read_fixed_kind(Kind::Char)?[0])
    }

    pub fn read_tagged_short(&mut self) -> Result<i16> {
        Ok(BigEndian::read_i16(self.read_fixed_kind(Kind::Short)?))
    }

    pub fn read_tagged_int(&mut self) -> Result<i32> {
        Ok(BigEndian::read_i32(self.read_fixed_kind(Kind::Int)?))
    }

    pub fn read_tagged_long(&mut self) -> Result<i64> {
        Ok(BigEndian::read_i64(self.read_fixed_kind(Kind::Long)?))
    }

    pub fn read_tagged_float(&mut self) -> Result<f32> {
        Ok(BigEndian::read_f32(self.read_fixed_kind(Kind::Float)?))
    }

    pub fn read_tagged_double(&mut self) -> Result<f64> {
        Ok(BigEndian::read_f64(self.read_fixed_kind(Kind::Double)?))
    }

    /// Read a string: tag, empty flag, then a 2-byte length and UTF-8 bytes unless the flag is
    /// set. Which of the two empty forms was used is kept in the returned [`KStr`].
    pub fn read_tagged_utf8(&mut self) -> Result<KStr> {
        let start = self.pos;
        self.read_tag(Kind::Utf8)?;
        let result = self.read_utf8_body();
        if let Err(Error::UnexpectedEnd { .. }) = result {
            self.pos = start;
        }
        result
    }

    fn read_utf8_body(&mut self) -> Result<KStr> {
        let offset = self.pos;
        let flag = self.read_fixed(1)?[0];
        match flag {
            1 => return Ok(KStr::compact_empty()),
            0 => (),
            v => {
                return Err(self.malformed(offset, format!("string flag 0x{:02x} is not 0 or 1", v)))
            }
        }
        let len = BigEndian::read_u16(self.read_fixed(2)?) as usize;
        let offset = self.pos;
        let bytes = self.read_fixed(len)?;
        let text = std::str::from_utf8(bytes)
            .map_err(|e| Error::Malformed {
                offset,
                reason: format!("{}", e),
            })?
            .to_owned();
        Ok(KStr::explicit(text))
    }

    pub fn write_tagged_bool(&mut self, v: bool) {
        self.write_fixed(&[Kind::Bool.into_u8(), v as u8]);
    }

    pub fn write_tagged_byte(&mut self, v: i8) {
        self.write_fixed(&[Kind::Byte.into_u8(), v as u8]);
    }

    pub fn write_tagged_char(&mut self, v: u8) {
        self.write_fixed(&[Kind::Char.into_u8(), v]);
    }

    pub fn write_tagged_short(&mut self, v: i16) {
        let mut buf = [Kind::Short.into_u8(), 0, 0];
        BigEndian::write_i16(&mut buf[1..], v);
        self.write_fixed(&buf);
    }

    pub fn write_tagged_int(&mut self, v: i32) {
        let mut buf = [Kind::Int.into_u8(), 0, 0, 0, 0];
        BigEndian::write_i32(&mut buf[1..], v);
        self.write_fixed(&buf);
    }

    pub fn write_tagged_long(&mut self, v: i64) {
        let mut buf = [0u8; 9];
        buf[0] = Kind::Long.into_u8();
        BigEndian::write_i64(&mut buf[1..], v);
        self.write_fixed(&buf);
    }

    pub fn write_tagged_float(&mut self, v: f32) {
        let mut buf = [Kind::Float.into_u8(), 0, 0, 0, 0];
        BigEndian::write_f32(&mut buf[1..], v);
        self.write_fixed(&buf);
    }

    pub fn write_tagged_double(&mut self, v: f64) {
        let mut buf = [0u8; 9];
        buf[0] = Kind::Double.into_u8();
        BigEndian::write_f64(&mut buf[1..], v);
        self.write_fixed(&buf);
    }

    /// Write a string in whichever empty form it carries. Strings longer than a 2-byte length
    /// can describe are rejected before anything is written.
    pub fn write_tagged_utf8(&mut self, v: &KStr) -> Result<()> {
        if v.is_compact_empty() {
            self.write_fixed(&[Kind::Utf8.into_u8(), 1]);
            return Ok(());
        }
        let bytes = v.as_str().as_bytes();
        let len = u16::try_from(bytes.len()).map_err(|_| {
            Error::Admission(format!(
                "string of {} bytes is longer than the {} byte maximum",
                bytes.len(),
                u16::MAX
            ))
        })?;
        let mut head = [Kind::Utf8.into_u8(), 0, 0, 0];
        BigEndian::write_u16(&mut head[2..], len);
        self.write_fixed(&head);
        self.write_fixed(bytes);
        Ok(())
    }
}

impl From<Vec<u8>> for Cursor {
    fn from(data: Vec<u8>) -> Self {
        Cursor::from_bytes(data)
    }
}

use std::fmt::Write;

use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

fn hex(bytes: &[u8]) -> String {
    if bytes.is_empty() {
        return String::from("end of data");
    }
    let mut out = String::with_capacity(bytes.len() * 3);
    for (i, b) in bytes.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        let _ = write!(out, "{:02x}", b);
    }
    out
}

#[derive(Clone, Debug, PartialEq, Error)]
pub enum Error {
    /// The next bytes don't match an expected tag or literal. This is the only recoverable error:
    /// speculative parses catch it and roll the cursor back. `actual` is empty if the data ended.
    #[error("tag mismatch at offset {offset}: expected {}, found {}", hex(.expected), hex(.actual))]
    TagMismatch {
        offset: usize,
        expected: Vec<u8>,
        actual: Vec<u8>,
    },
    /// A tag matched, but its fixed-width payload runs past the end of the data.
    #[error("unexpected end of data at offset {offset}: needed {needed} bytes, {available} left")]
    UnexpectedEnd {
        offset: usize,
        needed: usize,
        available: usize,
    },
    /// A schema name has no registered spec.
    #[error("unrecognized object name `{0}`")]
    UnrecognizedName(String),
    /// An IntMap index or alias isn't part of the declared index set.
    #[error("unrecognized index `{0}`")]
    UnrecognizedIndex(String),
    /// The data matched a container's leading tag, but its structure is wrong: a required field
    /// is absent, a name or sentinel doesn't match, or the same key shows up twice.
    #[error("structural violation: {0}")]
    Structure(String),
    /// A tag matched, but the payload after it can't be decoded.
    #[error("malformed value at offset {offset}: {reason}")]
    Malformed { offset: usize, reason: String },
    /// A restricted collection refused a read, write, or delete.
    #[error("admission violation: {0}")]
    Admission(String),
    /// Decoding hit the nesting depth or input size limit.
    #[error("hit parsing limit: {0}")]
    ParseLimit(String),
    /// The API was used incorrectly, e.g. restoring a cursor that has no saved checkpoint.
    #[error("usage error: {0}")]
    Usage(String),
}

impl Error {
    /// True for errors that only mean "this isn't the kind you're looking for".
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::TagMismatch { .. })
    }

    /// Turn a recoverable mismatch into a fatal structural error. Used once a container has
    /// committed to a parse by consuming bytes, so a later mismatch can't be mistaken for absence.
    pub(crate) fn committed(self, context: impl FnOnce() -> String) -> Error {
        if self.is_recoverable() {
            Error::Structure(format!("{}: {}", context(), self))
        } else {
            self
        }
    }
}

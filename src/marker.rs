use serde::{Deserialize, Serialize};

/// The signature every container starts with.
pub const MAGIC: [u8; 8] = [0x00, 0x00, 0x00, 0x00, 0x00, 0x1A, 0xB1, 0x26];
/// The long integer that immediately follows the signature.
pub const FILE_CONSTANT: i64 = 1;
/// Opens a named object.
pub const OBJECT_BEGIN: u8 = 0xFE;
/// Closes a named object.
pub const OBJECT_END: u8 = 0xFF;

/// The nine self-describing primitive kinds, each with a fixed one-byte tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Kind {
    Bool,
    Int,
    Long,
    Utf8,
    Double,
    Short,
    Float,
    Byte,
    Char,
}

impl Kind {
    /// Every kind, in tag order.
    pub const ALL: [Kind; 9] = [
        Kind::Bool,
        Kind::Int,
        Kind::Long,
        Kind::Utf8,
        Kind::Double,
        Kind::Short,
        Kind::Float,
        Kind::Byte,
        Kind::Char,
    ];

    /// Look up a kind from its tag byte. Returns `None` if the byte isn't a primitive tag.
    pub fn from_u8(n: u8) -> Option<Kind> {
        match n {
            0x00 => Some(Kind::Bool),
            0x01 => Some(Kind::Int),
            0x02 => Some(Kind::Long),
            0x03 => Some(Kind::Utf8),
            0x04 => Some(Kind::Double),
            0x05 => Some(Kind::Short),
            0x06 => Some(Kind::Float),
            0x07 => Some(Kind::Byte),
            0x09 => Some(Kind::Char),
            _ => None,
        }
    }

    /// Converts a kind into its tag byte.
    pub fn into_u8(self) -> u8 {
        match self {
            Kind::Bool => 0x00,
            Kind::Int => 0x01,
            Kind::Long => 0x02,
            Kind::Utf8 => 0x03,
            Kind::Double => 0x04,
            Kind::Short => 0x05,
            Kind::Float => 0x06,
            Kind::Byte => 0x07,
            Kind::Char => 0x09,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Kind::Bool => "boolean",
            Kind::Int => "int",
            Kind::Long => "long",
            Kind::Utf8 => "utf8",
            Kind::Double => "double",
            Kind::Short => "short",
            Kind::Float => "float",
            Kind::Byte => "byte",
            Kind::Char => "char",
        }
    }

    /// Payload width in bytes after the tag. Strings are variable-width and return `None`.
    pub fn width(self) -> Option<usize> {
        match self {
            Kind::Bool | Kind::Byte | Kind::Char => Some(1),
            Kind::Short => Some(2),
            Kind::Int | Kind::Float => Some(4),
            Kind::Long | Kind::Double => Some(8),
            Kind::Utf8 => None,
        }
    }

    pub fn is_integer(self) -> bool {
        matches!(
            self,
            Kind::Byte | Kind::Short | Kind::Int | Kind::Long | Kind::Char
        )
    }
}

impl From<Kind> for u8 {
    fn from(val: Kind) -> u8 {
        val.into_u8()
    }
}

impl TryFrom<u8> for Kind {
    type Error = u8;

    fn try_from(val: u8) -> Result<Kind, u8> {
        Kind::from_u8(val).ok_or(val)
    }
}

impl std::fmt::Display for Kind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn tag_table() {
        let tags: Vec<u8> = Kind::ALL.iter().map(|k| k.into_u8()).collect();
        assert_eq!(tags, [0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x09]);
    }

    #[test]
    fn tags_roundtrip() {
        for kind in Kind::ALL {
            assert_eq!(Kind::from_u8(kind.into()), Some(kind));
        }
    }

    #[test]
    fn payload_widths() {
        let widths: Vec<Option<usize>> = Kind::ALL.iter().map(|k| k.width()).collect();
        assert_eq!(
            widths,
            [Some(1), Some(4), Some(8), None, Some(8), Some(2), Some(4), Some(1), Some(1)]
        );
    }

    #[test]
    fn non_tags() {
        for n in [0x08u8, 0x0a, 0x10, 0x7f, OBJECT_BEGIN, OBJECT_END] {
            assert_eq!(Kind::from_u8(n), None, "0x{:x} should not be a tag", n);
            assert_eq!(Kind::try_from(n), Err(n));
        }
    }
}

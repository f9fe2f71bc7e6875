use std::fmt;

use serde::{Serialize, Serializer};

use crate::{
    cursor::Cursor,
    error::{Error, Result},
    marker::Kind,
};

/// A UTF-8 string that remembers which of the two empty encodings it came from.
///
/// The wire format can say "empty" either with the compact flag or with an explicit zero length.
/// Both decode to `""` and compare equal, but each is written back the way it was read.
#[derive(Clone, Debug, Default, Eq)]
pub struct KStr {
    text: String,
    compact: bool,
}

impl KStr {
    /// Make a new string. An empty string uses the compact empty encoding.
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        let compact = text.is_empty();
        Self { text, compact }
    }

    /// The flagged-empty form.
    pub fn compact_empty() -> Self {
        Self {
            text: String::new(),
            compact: true,
        }
    }

    /// A string written with an explicit length, even if that length is zero.
    pub fn explicit(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            compact: false,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn into_string(self) -> String {
        self.text
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// True if this will be written as the flagged-empty form.
    pub fn is_compact_empty(&self) -> bool {
        self.compact && self.text.is_empty()
    }
}

impl PartialEq for KStr {
    fn eq(&self, other: &Self) -> bool {
        self.text == other.text
    }
}

impl std::hash::Hash for KStr {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.text.hash(state)
    }
}

impl PartialEq<str> for KStr {
    fn eq(&self, other: &str) -> bool {
        self.text == other
    }
}

impl PartialEq<&str> for KStr {
    fn eq(&self, other: &&str) -> bool {
        self.text == *other
    }
}

impl From<&str> for KStr {
    fn from(v: &str) -> Self {
        KStr::new(v)
    }
}

impl From<String> for KStr {
    fn from(v: String) -> Self {
        KStr::new(v)
    }
}

impl fmt::Display for KStr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl Serialize for KStr {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.text)
    }
}

/// A self-tagged scalar value.
///
/// Equality is by kind and raw value: floats compare by bit pattern, and strings ignore which
/// empty form they use.
#[derive(Clone, Debug)]
pub enum Primitive {
    Bool(bool),
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
    Char(u8),
    Float(f32),
    Double(f64),
    Str(KStr),
}

impl Primitive {
    pub fn kind(&self) -> Kind {
        match self {
            Primitive::Bool(_) => Kind::Bool,
            Primitive::Byte(_) => Kind::Byte,
            Primitive::Short(_) => Kind::Short,
            Primitive::Int(_) => Kind::Int,
            Primitive::Long(_) => Kind::Long,
            Primitive::Char(_) => Kind::Char,
            Primitive::Float(_) => Kind::Float,
            Primitive::Double(_) => Kind::Double,
            Primitive::Str(_) => Kind::Utf8,
        }
    }

    /// The zero value of a kind. Strings default to the compact empty form.
    pub fn default_for(kind: Kind) -> Self {
        match kind {
            Kind::Bool => Primitive::Bool(false),
            Kind::Byte => Primitive::Byte(0),
            Kind::Short => Primitive::Short(0),
            Kind::Int => Primitive::Int(0),
            Kind::Long => Primitive::Long(0),
            Kind::Char => Primitive::Char(0),
            Kind::Float => Primitive::Float(0.0),
            Kind::Double => Primitive::Double(0.0),
            Kind::Utf8 => Primitive::Str(KStr::compact_empty()),
        }
    }

    /// Read a primitive of a specific kind, checking its tag.
    pub fn read(cursor: &mut Cursor, kind: Kind) -> Result<Self> {
        Ok(match kind {
            Kind::Bool => Primitive::Bool(cursor.read_tagged_bool()?),
            Kind::Byte => Primitive::Byte(cursor.read_tagged_byte()?),
            Kind::Short => Primitive::Short(cursor.read_tagged_short()?),
            Kind::Int => Primitive::Int(cursor.read_tagged_int()?),
            Kind::Long => Primitive::Long(cursor.read_tagged_long()?),
            Kind::Char => Primitive::Char(cursor.read_tagged_char()?),
            Kind::Float => Primitive::Float(cursor.read_tagged_float()?),
            Kind::Double => Primitive::Double(cursor.read_tagged_double()?),
            Kind::Utf8 => Primitive::Str(cursor.read_tagged_utf8()?),
        })
    }

    /// Read whichever primitive comes next, using its tag to pick the kind.
    pub fn read_any(cursor: &mut Cursor) -> Result<Self> {
        match peek_basic_kind(cursor) {
            Some(kind) => Primitive::read(cursor, kind),
            None => Err(Error::TagMismatch {
                offset: cursor.tell(),
                expected: Kind::ALL.iter().map(|k| k.into_u8()).collect(),
                actual: cursor.peek_bytes(1).map(<[u8]>::to_vec).unwrap_or_default(),
            }),
        }
    }

    pub fn write(&self, cursor: &mut Cursor) -> Result<()> {
        match self {
            Primitive::Bool(v) => cursor.write_tagged_bool(*v),
            Primitive::Byte(v) => cursor.write_tagged_byte(*v),
            Primitive::Short(v) => cursor.write_tagged_short(*v),
            Primitive::Int(v) => cursor.write_tagged_int(*v),
            Primitive::Long(v) => cursor.write_tagged_long(*v),
            Primitive::Char(v) => cursor.write_tagged_char(*v),
            Primitive::Float(v) => cursor.write_tagged_float(*v),
            Primitive::Double(v) => cursor.write_tagged_double(*v),
            Primitive::Str(v) => cursor.write_tagged_utf8(v)?,
        }
        Ok(())
    }

    /// Convert into another kind. Integers convert between each other when the value fits, and a
    /// float widens to a double. Everything else must already be the right kind.
    pub fn coerce(self, kind: Kind) -> Result<Self> {
        if self.kind() == kind {
            return Ok(self);
        }
        let fail = |p: &Primitive| {
            Error::Admission(format!("can't store {} {} as {}", p.kind(), p, kind))
        };
        if let Primitive::Float(v) = self {
            return if kind == Kind::Double {
                Ok(Primitive::Double(v as f64))
            } else {
                Err(fail(&self))
            };
        }
        if !kind.is_integer() {
            return Err(fail(&self));
        }
        let wide = self.as_i64().ok_or_else(|| fail(&self))?;
        let out = match kind {
            Kind::Byte => i8::try_from(wide).ok().map(Primitive::Byte),
            Kind::Short => i16::try_from(wide).ok().map(Primitive::Short),
            Kind::Int => i32::try_from(wide).ok().map(Primitive::Int),
            Kind::Long => Some(Primitive::Long(wide)),
            Kind::Char => u8::try_from(wide).ok().map(Primitive::Char),
            _ => None,
        };
        out.ok_or_else(|| fail(&self))
    }

    pub fn as_bool(&self) -> Option<bool> {
        if let Primitive::Bool(v) = *self {
            Some(v)
        } else {
            None
        }
    }

    /// Any integer kind, widened.
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Primitive::Byte(v) => Some(v as i64),
            Primitive::Short(v) => Some(v as i64),
            Primitive::Int(v) => Some(v as i64),
            Primitive::Long(v) => Some(v),
            Primitive::Char(v) => Some(v as i64),
            _ => None,
        }
    }

    /// Either float kind, widened.
    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Primitive::Float(v) => Some(v as f64),
            Primitive::Double(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        if let Primitive::Str(ref v) = *self {
            Some(v.as_str())
        } else {
            None
        }
    }
}

/// Look at the next byte and report which primitive kind it tags, without consuming it.
pub fn peek_basic_kind(cursor: &Cursor) -> Option<Kind> {
    cursor.peek_byte().and_then(Kind::from_u8)
}

impl PartialEq for Primitive {
    fn eq(&self, other: &Self) -> bool {
        use self::Primitive::*;
        match (self, other) {
            (Bool(a), Bool(b)) => a == b,
            (Byte(a), Byte(b)) => a == b,
            (Short(a), Short(b)) => a == b,
            (Int(a), Int(b)) => a == b,
            (Long(a), Long(b)) => a == b,
            (Char(a), Char(b)) => a == b,
            (Float(a), Float(b)) => a.to_bits() == b.to_bits(),
            (Double(a), Double(b)) => a.to_bits() == b.to_bits(),
            (Str(a), Str(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Primitive::Bool(v) => write!(f, "{}", v),
            Primitive::Byte(v) => write!(f, "{}", v),
            Primitive::Short(v) => write!(f, "{}", v),
            Primitive::Int(v) => write!(f, "{}", v),
            Primitive::Long(v) => write!(f, "{}", v),
            Primitive::Char(v) => write!(f, "{}", v),
            Primitive::Float(v) => write!(f, "{}", v),
            Primitive::Double(v) => write!(f, "{}", v),
            Primitive::Str(v) => write!(f, "{:?}", v.as_str()),
        }
    }
}

impl Serialize for Primitive {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Primitive::Bool(v) => serializer.serialize_bool(*v),
            Primitive::Byte(v) => serializer.serialize_i8(*v),
            Primitive::Short(v) => serializer.serialize_i16(*v),
            Primitive::Int(v) => serializer.serialize_i32(*v),
            Primitive::Long(v) => serializer.serialize_i64(*v),
            Primitive::Char(v) => serializer.serialize_u8(*v),
            Primitive::Float(v) => serializer.serialize_f32(*v),
            Primitive::Double(v) => serializer.serialize_f64(*v),
            Primitive::Str(v) => v.serialize(serializer),
        }
    }
}

macro_rules! impl_from_prim {
    ($($t:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$t> for Primitive {
                fn from(v: $t) -> Self {
                    Primitive::$variant(v.into())
                }
            }
        )*
    };
}

impl_from_prim!(
    bool => Bool,
    i8 => Byte,
    i16 => Short,
    i32 => Int,
    i64 => Long,
    u8 => Char,
    f32 => Float,
    f64 => Double,
    KStr => Str,
    String => Str,
    &str => Str,
);

#[cfg(test)]
mod test {
    use super::*;
    use rand::Rng;

    fn one_of_each() -> Vec<Primitive> {
        vec![
            Primitive::Bool(true),
            Primitive::Int(-7),
            Primitive::Long(1 << 40),
            Primitive::Str(KStr::new("hello")),
            Primitive::Double(2.5),
            Primitive::Short(-2),
            Primitive::Float(0.5),
            Primitive::Byte(-128),
            Primitive::Char(255),
        ]
    }

    #[test]
    fn peek_finds_own_kind() {
        for prim in one_of_each() {
            let mut cursor = Cursor::new();
            prim.write(&mut cursor).unwrap();
            cursor.seek(0).unwrap();
            assert_eq!(peek_basic_kind(&cursor), Some(prim.kind()));
            for other in Kind::ALL.iter().filter(|k| **k != prim.kind()) {
                let lead = Cursor::from_bytes(vec![other.into_u8()]);
                assert_ne!(peek_basic_kind(&lead), Some(prim.kind()));
            }
        }
    }

    #[test]
    fn peek_non_tag() {
        assert_eq!(peek_basic_kind(&Cursor::from_bytes(vec![0xfe])), None);
        assert_eq!(peek_basic_kind(&Cursor::new()), None);
    }

    #[test]
    fn read_any_roundtrip() {
        let mut cursor = Cursor::new();
        for prim in one_of_each() {
            prim.write(&mut cursor).unwrap();
        }
        let written = cursor.as_bytes().to_vec();
        cursor.seek(0).unwrap();
        let decoded: Vec<Primitive> = (0..9)
            .map(|_| Primitive::read_any(&mut cursor).unwrap())
            .collect();
        assert_eq!(decoded, one_of_each());
        let mut out = Cursor::new();
        for prim in decoded {
            prim.write(&mut out).unwrap();
        }
        assert_eq!(out.as_bytes(), &written[..]);
    }

    #[test]
    fn read_any_rejects_sentinel() {
        let mut cursor = Cursor::from_bytes(vec![0xff]);
        let err = Primitive::read_any(&mut cursor).unwrap_err();
        assert!(err.is_recoverable());
        if let Error::TagMismatch { expected, actual, .. } = err {
            assert_eq!(expected.len(), 9);
            assert_eq!(actual, vec![0xff]);
        }
    }

    #[test]
    fn random_numbers() {
        let mut rng = rand::thread_rng();
        for _ in 0..200 {
            let prims = [
                Primitive::Int(rng.gen()),
                Primitive::Long(rng.gen()),
                Primitive::Short(rng.gen()),
                Primitive::Float(f32::from_bits(rng.gen())),
                Primitive::Double(f64::from_bits(rng.gen())),
            ];
            for prim in prims {
                let mut cursor = Cursor::new();
                prim.write(&mut cursor).unwrap();
                cursor.seek(0).unwrap();
                assert_eq!(Primitive::read(&mut cursor, prim.kind()).unwrap(), prim);
            }
        }
    }

    #[test]
    fn string_flag_not_part_of_equality() {
        assert_eq!(
            Primitive::Str(KStr::compact_empty()),
            Primitive::Str(KStr::explicit(""))
        );
        assert!(KStr::new("").is_compact_empty());
        assert!(!KStr::explicit("").is_compact_empty());
    }

    #[test]
    fn coerce_integers() {
        assert_eq!(
            Primitive::Int(5).coerce(Kind::Long).unwrap(),
            Primitive::Long(5)
        );
        assert_eq!(
            Primitive::Long(-1).coerce(Kind::Byte).unwrap(),
            Primitive::Byte(-1)
        );
        assert!(Primitive::Int(300).coerce(Kind::Char).is_err());
        assert!(Primitive::Int(-1).coerce(Kind::Char).is_err());
        assert_eq!(
            Primitive::Float(0.5).coerce(Kind::Double).unwrap(),
            Primitive::Double(0.5)
        );
        assert!(Primitive::Double(0.5).coerce(Kind::Float).is_err());
        assert!(Primitive::from("1").coerce(Kind::Int).is_err());
        assert!(Primitive::Bool(true).coerce(Kind::Int).is_err());
    }
}

//! Schema descriptors.
//!
//! A [`Spec`] describes one kind of value: how to build a default one, how to decode it from a
//! [`Cursor`], how to encode it back, and which values it accepts. Specs are stateless and shared
//! by reference: the structural descriptors are held in [`Arc`]s, and two Record, Array, or IntMap
//! specs are only the same spec if they are the same allocation.
//!
//! There are two families of spec:
//!
//! - [`Spec::Basic`] - one of the nine self-tagged primitive kinds.
//! - [`Spec::Structural`] - everything that needs a recursive decode, see [`Structure`].
//!
//! # Named framing
//!
//! [`Spec::read`] and [`Spec::write`] take an optional name. With a name, the value is wrapped in
//! an object envelope:
//!
//! ```text
//! 0xFE, name (tagged string), value, 0xFF
//! ```
//!
//! Without one the value is written bare, and its position inside the enclosing container is what
//! identifies it.
//!
//! # Recoverable errors
//!
//! A read that fails before consuming anything returns [`Error::TagMismatch`], meaning "this is
//! not that kind of value". Once a structural read has consumed bytes, any later mismatch is
//! turned into a fatal [`Error::Structure`]. Optional record fields and [`Structure::Choice`] rely
//! on this to try a parse and roll back.
//!
//! # Example
//!
//! ```
//! # use std::sync::Arc;
//! # use krds_pack::*;
//! # use krds_pack::spec::*;
//! # fn main() -> krds_pack::Result<()> {
//! let position = Arc::new(Spec::position());
//! let annotation = RecordSpec::new()
//!     .req_add("start", position.clone())
//!     .req_add("end", position)
//!     .opt_add("note", Spec::basic(Kind::Utf8))
//!     .build();
//!
//! let mut value = annotation.make(None)?;
//! if let Value::Record(record) = &mut value {
//!     record.insert("note", Value::from("hello"))?;
//! }
//! let mut cursor = Cursor::new();
//! annotation.write(&mut cursor, &value, Some("annotation.note"))?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use log::trace;

use crate::{
    cursor::Cursor,
    error::{Error, Result},
    marker::{Kind, OBJECT_BEGIN, OBJECT_END},
    position::Position,
    primitive::{KStr, Primitive},
    registry::SchemaLookup,
    value::Value,
    MAX_DEPTH,
};

mod array;
mod dynamic_map;
mod int_map;
mod object;
mod record;

pub use self::array::*;
pub use self::dynamic_map::*;
pub use self::int_map::*;
pub use self::object::*;
pub use self::record::*;
pub(crate) use self::object::{read_named, write_named};

/// Describes one kind of value.
#[derive(Clone, Debug)]
pub enum Spec {
    /// A self-tagged primitive of the given kind.
    Basic(Kind),
    /// A value that needs a recursive decode.
    Structural(Structure),
}

/// The structural value kinds.
#[derive(Clone, Debug)]
pub enum Structure {
    /// A [`Position`], stored as a string.
    Position,
    /// A [`Record`] with the given fields.
    Record(Arc<RecordSpec>),
    /// An [`Array`] of one element kind.
    Array(Arc<ArraySpec>),
    /// An [`IntMap`] over a fixed index set.
    IntMap(Arc<IntMapSpec>),
    /// A [`DynamicMap`] of primitives.
    DynamicMap,
    /// Any registered named object. The name on the wire picks the spec, through the registry.
    Object,
    /// Alternate layouts of the same logical value. Reading tries each in order and keeps the
    /// first that doesn't mismatch; writing uses the first that accepts the value.
    Choice(Vec<Arc<Spec>>),
}

/// State carried down a decode: the registry for resolving object names, and the nesting depth.
#[derive(Clone, Copy)]
pub struct DecodeContext<'a> {
    registry: &'a dyn SchemaLookup,
    depth: usize,
}

impl<'a> DecodeContext<'a> {
    pub fn new(registry: &'a dyn SchemaLookup) -> Self {
        Self { registry, depth: 0 }
    }

    pub fn registry(&self) -> &'a dyn SchemaLookup {
        self.registry
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Step one structural level deeper.
    pub(crate) fn nested(self) -> Result<Self> {
        if self.depth >= MAX_DEPTH {
            return Err(Error::ParseLimit(format!(
                "values nested deeper than {} levels",
                MAX_DEPTH
            )));
        }
        Ok(Self {
            registry: self.registry,
            depth: self.depth + 1,
        })
    }
}

impl std::fmt::Debug for DecodeContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecodeContext")
            .field("depth", &self.depth)
            .finish_non_exhaustive()
    }
}

impl Spec {
    pub fn basic(kind: Kind) -> Self {
        Spec::Basic(kind)
    }

    pub fn position() -> Self {
        Spec::Structural(Structure::Position)
    }

    pub fn dynamic_map() -> Self {
        Spec::Structural(Structure::DynamicMap)
    }

    pub fn object() -> Self {
        Spec::Structural(Structure::Object)
    }

    pub fn choice<I, S>(alternatives: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Arc<Spec>>,
    {
        Spec::Structural(Structure::Choice(
            alternatives.into_iter().map(Into::into).collect(),
        ))
    }

    pub fn is_basic(&self) -> bool {
        matches!(self, Spec::Basic(_))
    }

    /// Short description, for error messages.
    pub fn describe(&self) -> String {
        match self {
            Spec::Basic(kind) => kind.to_string(),
            Spec::Structural(Structure::Position) => String::from("position"),
            Spec::Structural(Structure::Record(_)) => String::from("record"),
            Spec::Structural(Structure::Array(_)) => String::from("array"),
            Spec::Structural(Structure::IntMap(_)) => String::from("int map"),
            Spec::Structural(Structure::DynamicMap) => String::from("dynamic map"),
            Spec::Structural(Structure::Object) => String::from("object"),
            Spec::Structural(Structure::Choice(alts)) => {
                let alts: Vec<String> = alts.iter().map(|a| a.describe()).collect();
                format!("one of [{}]", alts.join(", "))
            }
        }
    }

    /// Build a value without reading any bytes. With no input this is the spec's default value;
    /// otherwise the input is coerced into this spec.
    pub fn make(&self, raw: Option<Value>) -> Result<Value> {
        if let Some(raw) = raw {
            return self.coerce(raw);
        }
        Ok(match self {
            Spec::Basic(kind) => Value::Basic(Primitive::default_for(*kind)),
            Spec::Structural(Structure::Position) => Value::Position(Position::default()),
            Spec::Structural(Structure::Record(spec)) => Value::Record(Record::new(spec.clone())?),
            Spec::Structural(Structure::Array(spec)) => Value::Array(Array::new(spec.clone())),
            Spec::Structural(Structure::IntMap(spec)) => Value::IntMap(IntMap::new(spec.clone())?),
            Spec::Structural(Structure::DynamicMap) => Value::DynamicMap(DynamicMap::new()),
            Spec::Structural(Structure::Object) => {
                return Err(Error::Admission(String::from(
                    "an object slot has no default value",
                )))
            }
            Spec::Structural(Structure::Choice(alts)) => match alts.first() {
                Some(first) => first.make(None)?,
                None => return Err(empty_choice()),
            },
        })
    }

    /// Convert a value into the form this spec stores. Primitives convert between integer kinds
    /// when the value fits and widen from float to double; positions can be built from their
    /// string form or from a plain integer. Structural values are accepted only if they were
    /// built from this very spec.
    pub fn coerce(&self, value: Value) -> Result<Value> {
        match (self, value) {
            (Spec::Basic(kind), Value::Basic(prim)) => {
                let prim = prim.coerce(*kind)?;
                check_str(&prim)?;
                Ok(Value::Basic(prim))
            }
            (Spec::Structural(Structure::Position), Value::Position(pos)) => {
                Ok(Value::Position(pos))
            }
            (Spec::Structural(Structure::Position), Value::Basic(Primitive::Str(s))) => s
                .as_str()
                .parse()
                .map(Value::Position)
                .map_err(|e: crate::position::ParsePositionError| {
                    Error::Admission(e.to_string())
                }),
            (Spec::Structural(Structure::Position), Value::Basic(prim))
                if prim.kind().is_integer() =>
            {
                let char_pos = prim.as_i64().unwrap_or_default();
                Ok(Value::Position(Position::new(char_pos)))
            }
            (Spec::Structural(Structure::Choice(alts)), value) => {
                let mut last = empty_choice();
                for alt in alts.iter() {
                    match alt.coerce(value.clone()) {
                        Ok(v) => return Ok(v),
                        Err(e) => last = e,
                    }
                }
                Err(last)
            }
            (spec, value) => {
                if spec.is_compatible(&value) {
                    Ok(value)
                } else {
                    Err(Error::Admission(format!(
                        "can't store {} as {}",
                        value.describe(),
                        spec.describe()
                    )))
                }
            }
        }
    }

    /// True if this spec would write `value` as it is.
    pub fn is_compatible(&self, value: &Value) -> bool {
        match (self, value) {
            (Spec::Basic(kind), Value::Basic(prim)) => prim.kind() == *kind,
            (Spec::Structural(s), value) => match (s, value) {
                (Structure::Position, Value::Position(_)) => true,
                (Structure::Record(spec), Value::Record(v)) => Arc::ptr_eq(spec, v.spec()),
                (Structure::Array(spec), Value::Array(v)) => Arc::ptr_eq(spec, v.spec()),
                (Structure::IntMap(spec), Value::IntMap(v)) => Arc::ptr_eq(spec, v.spec()),
                (Structure::DynamicMap, Value::DynamicMap(_)) => true,
                (Structure::Object, Value::Object(_)) => true,
                (Structure::Choice(alts), value) => alts.iter().any(|a| a.is_compatible(value)),
                _ => false,
            },
            _ => false,
        }
    }

    /// True if every value `other` can produce is acceptable to this spec.
    pub fn is_compatible_spec(&self, other: &Spec) -> bool {
        if let Spec::Structural(Structure::Choice(theirs)) = other {
            return !theirs.is_empty() && theirs.iter().all(|t| self.is_compatible_spec(t));
        }
        match (self, other) {
            (Spec::Basic(a), Spec::Basic(b)) => a == b,
            (Spec::Structural(a), Spec::Structural(b)) => match (a, b) {
                (Structure::Position, Structure::Position) => true,
                (Structure::Record(a), Structure::Record(b)) => Arc::ptr_eq(a, b),
                (Structure::Array(a), Structure::Array(b)) => Arc::ptr_eq(a, b),
                (Structure::IntMap(a), Structure::IntMap(b)) => Arc::ptr_eq(a, b),
                (Structure::DynamicMap, Structure::DynamicMap) => true,
                (Structure::Object, Structure::Object) => true,
                (Structure::Choice(ours), _) => ours.iter().any(|o| o.is_compatible_spec(other)),
                _ => false,
            },
            (Spec::Structural(Structure::Choice(ours)), _) => {
                ours.iter().any(|o| o.is_compatible_spec(other))
            }
            _ => false,
        }
    }

    /// Decode a value, inside an object envelope if `name` is given.
    pub fn read(
        &self,
        cursor: &mut Cursor,
        name: Option<&str>,
        ctx: DecodeContext,
    ) -> Result<Value> {
        let name = match name {
            None => return self.read_bare(cursor, ctx),
            Some(name) => name,
        };
        let found = read_object_name(cursor)?;
        if found != name {
            return Err(Error::Structure(format!(
                "expected object `{}`, found `{}`",
                name, found
            )));
        }
        let value = self
            .read_bare(cursor, ctx)
            .map_err(|e| e.committed(|| format!("object `{}`", name)))?;
        read_object_end(cursor, name)?;
        Ok(value)
    }

    fn read_bare(&self, cursor: &mut Cursor, ctx: DecodeContext) -> Result<Value> {
        let structure = match self {
            Spec::Basic(kind) => return Ok(Value::Basic(Primitive::read(cursor, *kind)?)),
            Spec::Structural(s) => s,
        };
        let ctx = ctx.nested()?;
        Ok(match structure {
            Structure::Position => Value::Position(Position::read(cursor)?),
            Structure::Record(spec) => Value::Record(Record::read(spec, cursor, ctx)?),
            Structure::Array(spec) => Value::Array(Array::read(spec, cursor, ctx)?),
            Structure::IntMap(spec) => Value::IntMap(IntMap::read(spec, cursor, ctx)?),
            Structure::DynamicMap => Value::DynamicMap(DynamicMap::read(cursor)?),
            Structure::Object => Value::Object(Object::read(cursor, ctx)?),
            Structure::Choice(alts) => read_choice(alts, cursor, ctx)?,
        })
    }

    /// Encode a value, inside an object envelope if `name` is given. The value must be one this
    /// spec accepts as it is; see [`Spec::coerce`].
    pub fn write(&self, cursor: &mut Cursor, value: &Value, name: Option<&str>) -> Result<()> {
        if !self.is_compatible(value) {
            return Err(Error::Admission(format!(
                "can't write {} as {}",
                value.describe(),
                self.describe()
            )));
        }
        match name {
            None => value.write(cursor),
            Some(name) => {
                write_object_begin(cursor, name)?;
                value.write(cursor)?;
                write_object_end(cursor);
                Ok(())
            }
        }
    }
}

impl From<Kind> for Spec {
    fn from(kind: Kind) -> Self {
        Spec::Basic(kind)
    }
}

fn empty_choice() -> Error {
    Error::Usage(String::from("choice spec has no alternatives"))
}

fn check_str(prim: &Primitive) -> Result<()> {
    match prim {
        Primitive::Str(s) if s.len() > u16::MAX as usize => Err(Error::Admission(format!(
            "string of {} bytes is longer than the {} byte maximum",
            s.len(),
            u16::MAX
        ))),
        _ => Ok(()),
    }
}

fn read_choice(alts: &[Arc<Spec>], cursor: &mut Cursor, ctx: DecodeContext) -> Result<Value> {
    let start = cursor.tell();
    let mut last = empty_choice();
    for (i, alt) in alts.iter().enumerate() {
        cursor.save();
        match alt.read_bare(cursor, ctx) {
            Ok(value) => {
                cursor.unsave()?;
                trace!("choice at offset {} took alternative {}", start, i);
                return Ok(value);
            }
            Err(e) if e.is_recoverable() => {
                cursor.restore()?;
                last = e;
            }
            Err(e) => {
                cursor.unsave()?;
                return Err(e);
            }
        }
    }
    Err(last)
}

/// Consume an object's begin sentinel and name. A missing sentinel is a recoverable mismatch; a
/// missing name after it is not.
pub(crate) fn read_object_name(cursor: &mut Cursor) -> Result<String> {
    cursor.expect(&[OBJECT_BEGIN])?;
    let name = cursor
        .read_tagged_utf8()
        .map_err(|e| e.committed(|| String::from("object name")))?;
    Ok(name.into_string())
}

pub(crate) fn read_object_end(cursor: &mut Cursor, name: &str) -> Result<()> {
    cursor
        .expect(&[OBJECT_END])
        .map_err(|e| e.committed(|| format!("end of object `{}`", name)))
}

pub(crate) fn write_object_begin(cursor: &mut Cursor, name: &str) -> Result<()> {
    cursor.write_fixed(&[OBJECT_BEGIN]);
    cursor.write_tagged_utf8(&KStr::new(name))
}

pub(crate) fn write_object_end(cursor: &mut Cursor) {
    cursor.write_fixed(&[OBJECT_END]);
}

/// Read a count. A negative count is malformed.
pub(crate) fn read_count(cursor: &mut Cursor) -> Result<usize> {
    let offset = cursor.tell();
    let count = cursor.read_tagged_int()?;
    usize::try_from(count).map_err(|_| Error::Malformed {
        offset,
        reason: format!("negative count {}", count),
    })
}

pub(crate) fn write_count(cursor: &mut Cursor, count: usize) -> Result<()> {
    let count = i32::try_from(count)
        .map_err(|_| Error::Admission(format!("{} items is too many to count", count)))?;
    cursor.write_tagged_int(count);
    Ok(())
}

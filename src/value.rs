use serde::{Serialize, Serializer};

use crate::{
    cursor::Cursor,
    error::{Error, Result},
    position::Position,
    primitive::{KStr, Primitive},
    registry::SchemaLookup,
    spec::{Array, DynamicMap, IntMap, Object, Record},
};

/// A decoded value.
///
/// Values are self-describing: a record, array, or IntMap carries the spec it was built from, so
/// a value can be written back without consulting the registry.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Basic(Primitive),
    Position(Position),
    Record(Record),
    Array(Array),
    IntMap(IntMap),
    DynamicMap(DynamicMap),
    Object(Object),
}

impl Value {
    pub fn is_basic(&self) -> bool {
        matches!(self, Value::Basic(_))
    }

    pub fn is_position(&self) -> bool {
        matches!(self, Value::Position(_))
    }

    pub fn is_record(&self) -> bool {
        matches!(self, Value::Record(_))
    }

    pub fn is_array(&self) -> bool {
        matches!(self, Value::Array(_))
    }

    pub fn is_int_map(&self) -> bool {
        matches!(self, Value::IntMap(_))
    }

    pub fn is_dynamic_map(&self) -> bool {
        matches!(self, Value::DynamicMap(_))
    }

    pub fn is_object(&self) -> bool {
        matches!(self, Value::Object(_))
    }

    pub fn as_primitive(&self) -> Option<&Primitive> {
        if let Value::Basic(v) = self {
            Some(v)
        } else {
            None
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        self.as_primitive().and_then(Primitive::as_bool)
    }

    pub fn as_i64(&self) -> Option<i64> {
        self.as_primitive().and_then(Primitive::as_i64)
    }

    pub fn as_f64(&self) -> Option<f64> {
        self.as_primitive().and_then(Primitive::as_f64)
    }

    pub fn as_str(&self) -> Option<&str> {
        self.as_primitive().and_then(Primitive::as_str)
    }

    pub fn as_position(&self) -> Option<&Position> {
        if let Value::Position(v) = self {
            Some(v)
        } else {
            None
        }
    }

    pub fn as_record(&self) -> Option<&Record> {
        if let Value::Record(v) = self {
            Some(v)
        } else {
            None
        }
    }

    pub fn as_record_mut(&mut self) -> Option<&mut Record> {
        if let Value::Record(v) = self {
            Some(v)
        } else {
            None
        }
    }

    pub fn as_array(&self) -> Option<&Array> {
        if let Value::Array(v) = self {
            Some(v)
        } else {
            None
        }
    }

    pub fn as_array_mut(&mut self) -> Option<&mut Array> {
        if let Value::Array(v) = self {
            Some(v)
        } else {
            None
        }
    }

    pub fn as_int_map(&self) -> Option<&IntMap> {
        if let Value::IntMap(v) = self {
            Some(v)
        } else {
            None
        }
    }

    pub fn as_int_map_mut(&mut self) -> Option<&mut IntMap> {
        if let Value::IntMap(v) = self {
            Some(v)
        } else {
            None
        }
    }

    pub fn as_dynamic_map(&self) -> Option<&DynamicMap> {
        if let Value::DynamicMap(v) = self {
            Some(v)
        } else {
            None
        }
    }

    pub fn as_dynamic_map_mut(&mut self) -> Option<&mut DynamicMap> {
        if let Value::DynamicMap(v) = self {
            Some(v)
        } else {
            None
        }
    }

    pub fn as_object(&self) -> Option<&Object> {
        if let Value::Object(v) = self {
            Some(v)
        } else {
            None
        }
    }

    /// Short description, for error messages.
    pub fn describe(&self) -> String {
        match self {
            Value::Basic(v) => format!("{} {}", v.kind(), v),
            Value::Position(v) => format!("position {}", v),
            Value::Record(_) => String::from("a record"),
            Value::Array(_) => String::from("an array"),
            Value::IntMap(_) => String::from("an int map"),
            Value::DynamicMap(_) => String::from("a dynamic map"),
            Value::Object(v) => format!("object `{}`", v.name()),
        }
    }

    /// True if this value, or anything nested under it, was mutated since it was decoded or
    /// built.
    pub fn is_modified(&self) -> bool {
        match self {
            Value::Basic(_) | Value::Position(_) => false,
            Value::Record(v) => v.is_modified(),
            Value::Array(v) => v.is_modified(),
            Value::IntMap(v) => v.is_modified(),
            Value::DynamicMap(v) => v.is_modified(),
            Value::Object(v) => v.value().is_modified(),
        }
    }

    /// Clear the modified state of this value and everything under it.
    pub fn mark_clean(&mut self) {
        match self {
            Value::Basic(_) | Value::Position(_) => (),
            Value::Record(v) => v.mark_clean(),
            Value::Array(v) => v.mark_clean(),
            Value::IntMap(v) => v.mark_clean(),
            Value::DynamicMap(v) => v.mark_clean(),
            Value::Object(v) => v.value_mut().mark_clean(),
        }
    }

    /// Check every object nested in this value against the registry: its name must be registered
    /// and its value must be one that name's spec writes as it is. Object slots take any
    /// [`Object`], so this is what keeps an edit from producing bytes the decoder rejects.
    pub fn check_objects(&self, registry: &dyn SchemaLookup) -> Result<()> {
        match self {
            Value::Basic(_) | Value::Position(_) | Value::DynamicMap(_) => Ok(()),
            Value::Record(v) => v.iter().try_for_each(|(_, v)| v.check_objects(registry)),
            Value::Array(v) => v.iter().try_for_each(|v| v.check_objects(registry)),
            Value::IntMap(v) => v.iter().try_for_each(|(_, v)| v.check_objects(registry)),
            Value::Object(v) => {
                let spec = registry
                    .lookup(v.name())
                    .ok_or_else(|| Error::UnrecognizedName(v.name().to_string()))?;
                if !spec.is_compatible(v.value()) {
                    return Err(Error::Admission(format!(
                        "object `{}` can't hold {}",
                        v.name(),
                        v.value().describe()
                    )));
                }
                v.value().check_objects(registry)
            }
        }
    }

    // Bare encoding; framing is the caller's business.
    pub(crate) fn write(&self, cursor: &mut Cursor) -> Result<()> {
        match self {
            Value::Basic(v) => v.write(cursor),
            Value::Position(v) => v.write(cursor),
            Value::Record(v) => v.write(cursor),
            Value::Array(v) => v.write(cursor),
            Value::IntMap(v) => v.write(cursor),
            Value::DynamicMap(v) => v.write(cursor),
            Value::Object(v) => v.write(cursor),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Basic(v) => v.serialize(serializer),
            Value::Position(v) => serializer.collect_str(v),
            Value::Record(v) => v.serialize(serializer),
            Value::Array(v) => v.serialize(serializer),
            Value::IntMap(v) => v.serialize(serializer),
            Value::DynamicMap(v) => v.serialize(serializer),
            Value::Object(v) => v.serialize(serializer),
        }
    }
}

macro_rules! impl_from_basic {
    ($($t:ty),* $(,)?) => {
        $(
            impl From<$t> for Value {
                fn from(v: $t) -> Self {
                    Value::Basic(Primitive::from(v))
                }
            }
        )*
    };
}

impl_from_basic!(bool, i8, i16, i32, i64, u8, f32, f64, KStr, String, &str);

impl From<Primitive> for Value {
    fn from(v: Primitive) -> Self {
        Value::Basic(v)
    }
}

impl From<Position> for Value {
    fn from(v: Position) -> Self {
        Value::Position(v)
    }
}

impl From<Record> for Value {
    fn from(v: Record) -> Self {
        Value::Record(v)
    }
}

impl From<Array> for Value {
    fn from(v: Array) -> Self {
        Value::Array(v)
    }
}

impl From<IntMap> for Value {
    fn from(v: IntMap) -> Self {
        Value::IntMap(v)
    }
}

impl From<DynamicMap> for Value {
    fn from(v: DynamicMap) -> Self {
        Value::DynamicMap(v)
    }
}

impl From<Object> for Value {
    fn from(v: Object) -> Self {
        Value::Object(v)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{marker::Kind, spec::{ArraySpec, Spec}};
    use std::sync::Arc;

    #[test]
    fn accessors() {
        let v = Value::from(5i16);
        assert!(v.is_basic());
        assert_eq!(v.as_i64(), Some(5));
        assert_eq!(v.as_str(), None);
        assert_eq!(Value::from("s").as_str(), Some("s"));
        assert_eq!(Value::from(0.5f32).as_f64(), Some(0.5));
        assert_eq!(Value::from(true).as_bool(), Some(true));
        let p = Value::from(Position::new(3));
        assert_eq!(p.as_position(), Some(&Position::new(3)));
        assert!(p.as_primitive().is_none());
    }

    #[test]
    fn modification_reaches_through_object() {
        let spec = Arc::new(ArraySpec::new(Spec::basic(Kind::Int)));
        let list = Value::from(crate::spec::Array::new(spec));
        let mut value = Value::from(Object::new("list", list));
        assert!(!value.is_modified());
        if let Value::Object(obj) = &mut value {
            obj.value_mut().as_array_mut().unwrap().push(Value::from(1i32)).unwrap();
        }
        assert!(value.is_modified());
        value.mark_clean();
        assert!(!value.is_modified());
    }

    #[test]
    fn serde_shape() {
        let value = Value::from(Position::with_chunk(1234, 5678, 5050));
        assert_eq!(
            serde_json::to_string(&value).unwrap(),
            r#""AdIEAAAuFgAA:5050""#
        );
        assert_eq!(serde_json::to_string(&Value::from(-3i64)).unwrap(), "-3");
    }
}

use serde::{ser::SerializeMap, Serialize, Serializer};

use super::{read_object_end, read_object_name, write_object_begin, write_object_end, DecodeContext};
use crate::{
    cursor::Cursor,
    error::{Error, Result},
    value::Value,
};

/// A named object whose spec was resolved through the registry.
#[derive(Clone, Debug, PartialEq)]
pub struct Object {
    name: String,
    value: Box<Value>,
}

impl Object {
    pub fn new(name: impl Into<String>, value: Value) -> Self {
        Self {
            name: name.into(),
            value: Box::new(value),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn value_mut(&mut self) -> &mut Value {
        &mut self.value
    }

    pub fn into_parts(self) -> (String, Value) {
        (self.name, *self.value)
    }

    pub(crate) fn read(cursor: &mut Cursor, ctx: DecodeContext) -> Result<Self> {
        let (name, value) = read_named(cursor, ctx)?;
        Ok(Self::new(name, value))
    }

    pub(crate) fn write(&self, cursor: &mut Cursor) -> Result<()> {
        write_named(cursor, &self.name, &self.value)
    }
}

/// Read a framed object, picking its spec by looking up the name it carries.
pub(crate) fn read_named(cursor: &mut Cursor, ctx: DecodeContext) -> Result<(String, Value)> {
    let name = read_object_name(cursor)?;
    let spec = ctx
        .registry()
        .lookup(&name)
        .ok_or_else(|| Error::UnrecognizedName(name.clone()))?;
    let value = spec
        .read_bare(cursor, ctx)
        .map_err(|e| e.committed(|| format!("object `{}`", name)))?;
    read_object_end(cursor, &name)?;
    Ok((name, value))
}

pub(crate) fn write_named(cursor: &mut Cursor, name: &str, value: &Value) -> Result<()> {
    write_object_begin(cursor, name)?;
    value.write(cursor)?;
    write_object_end(cursor);
    Ok(())
}

impl Serialize for Object {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(&self.name, &*self.value)?;
        map.end()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{marker::Kind, registry::Registry, spec::Spec};

    fn registry() -> Registry {
        Registry::new()
            .add("count", Spec::basic(Kind::Int))
            .add("label", Spec::basic(Kind::Utf8))
    }

    #[test]
    fn resolves_through_registry() {
        let registry = registry();
        let mut cursor = Cursor::new();
        Object::new("label", Value::from("x")).write(&mut cursor).unwrap();
        Object::new("count", Value::from(3i32)).write(&mut cursor).unwrap();
        let bytes = cursor.into_bytes();

        let mut cursor = Cursor::from_bytes(bytes);
        let ctx = DecodeContext::new(&registry);
        let first = Object::read(&mut cursor, ctx).unwrap();
        let second = Object::read(&mut cursor, ctx).unwrap();
        assert!(cursor.is_at_end());
        assert_eq!(first.name(), "label");
        assert_eq!(first.value(), &Value::from("x"));
        assert_eq!(second.into_parts(), (String::from("count"), Value::from(3i32)));
    }

    #[test]
    fn unknown_name() {
        let registry = registry();
        let mut cursor = Cursor::new();
        Object::new("mystery", Value::from(1i32)).write(&mut cursor).unwrap();
        let mut cursor = Cursor::from_bytes(cursor.into_bytes());
        let err = Object::read(&mut cursor, DecodeContext::new(&registry)).unwrap_err();
        assert_eq!(err, Error::UnrecognizedName(String::from("mystery")));
    }

    #[test]
    fn payload_of_wrong_kind() {
        let registry = registry();
        let mut cursor = Cursor::new();
        Object::new("count", Value::from("three")).write(&mut cursor).unwrap();
        let mut cursor = Cursor::from_bytes(cursor.into_bytes());
        let err = Object::read(&mut cursor, DecodeContext::new(&registry)).unwrap_err();
        assert!(matches!(err, Error::Structure(ref m) if m.contains("`count`")));
    }

    #[test]
    fn serializes_as_single_entry() {
        let object = Object::new("count", Value::from(3i32));
        assert_eq!(serde_json::to_string(&object).unwrap(), r#"{"count":3}"#);
    }
}

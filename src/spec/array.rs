use std::sync::Arc;

use serde::{ser::SerializeSeq, Serialize, Serializer};

use super::{read_count, write_count, DecodeContext, Spec, Structure};
use crate::{
    collection::{ListPolicy, RestrictedList},
    cursor::Cursor,
    error::Result,
    value::Value,
};

/// Spec for an [`Array`]: a count followed by that many elements of one spec.
///
/// Elements are bare unless the spec is given an element name, in which case each one is framed
/// as a named object.
#[derive(Clone, Debug)]
pub struct ArraySpec {
    element: Arc<Spec>,
    name: Option<String>,
}

impl ArraySpec {
    pub fn new(element: impl Into<Arc<Spec>>) -> Self {
        Self {
            element: element.into(),
            name: None,
        }
    }

    /// Frame every element as an object with this name.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn build(self) -> Spec {
        Spec::Structural(Structure::Array(Arc::new(self)))
    }

    pub fn element(&self) -> &Arc<Spec> {
        &self.element
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

/// Admission for array elements: every element is coerced into the element spec.
#[derive(Clone, Debug)]
pub struct ArrayPolicy {
    spec: Arc<ArraySpec>,
}

impl ListPolicy for ArrayPolicy {
    type Item = Value;

    fn coerce(&self, item: Value) -> Result<Value> {
        self.spec.element.coerce(item)
    }
}

/// A homogeneous sequence of values.
#[derive(Clone, Debug)]
pub struct Array {
    spec: Arc<ArraySpec>,
    items: RestrictedList<ArrayPolicy>,
}

impl PartialEq for Array {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.spec, &other.spec) && self.items == other.items
    }
}

impl Array {
    pub fn new(spec: Arc<ArraySpec>) -> Self {
        Self {
            items: RestrictedList::new(ArrayPolicy { spec: spec.clone() }),
            spec,
        }
    }

    pub fn spec(&self) -> &Arc<ArraySpec> {
        &self.spec
    }

    /// The elements, for reading and for mutation through the list's own checks.
    pub fn items(&self) -> &RestrictedList<ArrayPolicy> {
        &self.items
    }

    pub fn items_mut(&mut self) -> &mut RestrictedList<ArrayPolicy> {
        &mut self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.items.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Value> {
        self.items.iter()
    }

    pub fn push(&mut self, item: Value) -> Result<()> {
        self.items.push(item)
    }

    pub fn is_modified(&self) -> bool {
        self.items.is_modified() || self.items.iter().any(Value::is_modified)
    }

    pub fn mark_clean(&mut self) {
        self.items.mark_clean();
        self.items.items_mut().iter_mut().for_each(Value::mark_clean);
    }

    pub(crate) fn read(
        spec: &Arc<ArraySpec>,
        cursor: &mut Cursor,
        ctx: DecodeContext,
    ) -> Result<Self> {
        let count = read_count(cursor)?;
        // Every element takes at least one byte.
        let mut items = Vec::with_capacity(count.min(cursor.remaining()));
        for i in 0..count {
            let item = spec
                .element
                .read(cursor, spec.name(), ctx)
                .map_err(|e| e.committed(|| format!("array element {} of {}", i, count)))?;
            items.push(item);
        }
        Ok(Self {
            spec: spec.clone(),
            items: RestrictedList::from_trusted(ArrayPolicy { spec: spec.clone() }, items),
        })
    }

    pub(crate) fn write(&self, cursor: &mut Cursor) -> Result<()> {
        write_count(cursor, self.items.len())?;
        for item in self.items.iter() {
            self.spec.element.write(cursor, item, self.spec.name())?;
        }
        Ok(())
    }
}

impl<'a> IntoIterator for &'a Array {
    type Item = &'a Value;
    type IntoIter = std::slice::Iter<'a, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

impl Serialize for Array {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.len()))?;
        for item in self.items.iter() {
            seq.serialize_element(item)?;
        }
        seq.end()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{error::Error, marker::Kind, registry::Registry};

    fn read(spec: &Arc<ArraySpec>, bytes: Vec<u8>) -> Result<Array> {
        let registry = Registry::new();
        let mut cursor = Cursor::from_bytes(bytes);
        let array = Array::read(spec, &mut cursor, DecodeContext::new(&registry))?;
        assert!(cursor.is_at_end());
        Ok(array)
    }

    #[test]
    fn homogeneous() {
        let spec = Arc::new(ArraySpec::new(Spec::basic(Kind::Long)));
        let mut array = Array::new(spec);
        array.push(Value::from(1i32)).unwrap();
        assert!(array.push(Value::from("no")).is_err());
        assert!(array.items_mut().extend([Value::from(2i64), Value::from(true)]).is_err());
        assert_eq!(array.len(), 1);
        assert_eq!(array.get(0), Some(&Value::from(1i64)));
    }

    #[test]
    fn wire_form() {
        let spec = Arc::new(ArraySpec::new(Spec::basic(Kind::Short)));
        let mut array = Array::new(spec.clone());
        array.push(Value::from(1i16)).unwrap();
        array.push(Value::from(-1i16)).unwrap();
        let mut cursor = Cursor::new();
        array.write(&mut cursor).unwrap();
        let bytes = cursor.into_bytes();
        assert_eq!(
            bytes,
            vec![0x01, 0, 0, 0, 2, 0x05, 0x00, 0x01, 0x05, 0xff, 0xff]
        );
        let decoded = read(&spec, bytes).unwrap();
        assert_eq!(decoded, array);
        assert!(!decoded.is_modified());
    }

    #[test]
    fn named_elements() {
        let spec = Arc::new(ArraySpec::new(Spec::basic(Kind::Int)).named("n"));
        let mut array = Array::new(spec.clone());
        array.push(Value::from(9i32)).unwrap();
        let mut cursor = Cursor::new();
        array.write(&mut cursor).unwrap();
        let bytes = cursor.into_bytes();
        assert_eq!(bytes[5], 0xfe);
        assert_eq!(read(&spec, bytes).unwrap(), array);
    }

    #[test]
    fn element_mismatch_after_count_is_fatal() {
        let spec = Arc::new(ArraySpec::new(Spec::basic(Kind::Int)));
        let mut cursor = Cursor::new();
        cursor.write_tagged_int(2);
        cursor.write_tagged_int(1);
        cursor.write_tagged_bool(false);
        let err = read(&spec, cursor.into_bytes()).unwrap_err();
        assert!(matches!(err, Error::Structure(ref m) if m.contains("element 1")));
    }

    #[test]
    fn huge_count_fails_cleanly() {
        let spec = Arc::new(ArraySpec::new(Spec::basic(Kind::Int)));
        let mut cursor = Cursor::new();
        cursor.write_tagged_int(i32::MAX);
        assert!(read(&spec, cursor.into_bytes()).is_err());
    }

    #[test]
    fn serializes_as_sequence() {
        let spec = Arc::new(ArraySpec::new(Spec::basic(Kind::Utf8)));
        let mut array = Array::new(spec);
        array.push(Value::from("a")).unwrap();
        array.push(Value::from("b")).unwrap();
        assert_eq!(serde_json::to_string(&array).unwrap(), r#"["a","b"]"#);
    }
}

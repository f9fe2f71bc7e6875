use std::sync::Arc;

use log::trace;
use serde::{ser::SerializeMap, Serialize, Serializer};

use super::{DecodeContext, Spec, Structure};
use crate::{
    collection::{MapPolicy, RestrictedMap},
    cursor::Cursor,
    error::{Error, Result},
    value::Value,
};

/// One declared field of a record.
#[derive(Clone, Debug)]
pub struct Field {
    alias: String,
    name: Option<String>,
    spec: Arc<Spec>,
}

impl Field {
    /// The key the field is accessed by.
    pub fn alias(&self) -> &str {
        &self.alias
    }

    /// The object name the field is framed with on the wire, if any.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn spec(&self) -> &Arc<Spec> {
        &self.spec
    }

    fn read(&self, cursor: &mut Cursor, ctx: DecodeContext) -> Result<Value> {
        self.spec.read(cursor, self.name(), ctx)
    }

    fn write(&self, cursor: &mut Cursor, value: &Value) -> Result<()> {
        self.spec.write(cursor, value, self.name())
    }
}

/// Spec for a [`Record`]: an ordered group of required fields, followed by an ordered group of
/// optional ones.
///
/// Required fields are always present. Optional fields are present as a prefix of their declared
/// order: when decoding, the first optional field that doesn't match ends the record, and every
/// optional field declared after it is absent.
///
/// ```
/// # use krds_pack::{Kind, spec::*};
/// let timer = RecordSpec::new()
///     .req_add("version", Spec::basic(Kind::Byte))
///     .req_add("total", Spec::basic(Kind::Long))
///     .opt_add("average", Spec::basic(Kind::Double))
///     .opt_add_named("model", "timer.model", Spec::dynamic_map())
///     .build();
/// ```
#[derive(Clone, Debug, Default)]
pub struct RecordSpec {
    required: Vec<Field>,
    optional: Vec<Field>,
}

impl RecordSpec {
    /// Make a new spec with no fields.
    pub fn new() -> Self {
        Self::default()
    }

    fn push(
        mut self,
        required: bool,
        alias: String,
        name: Option<String>,
        spec: Arc<Spec>,
    ) -> Self {
        self.required.retain(|f| f.alias != alias);
        self.optional.retain(|f| f.alias != alias);
        let field = Field { alias, name, spec };
        if required {
            self.required.push(field);
        } else {
            self.optional.push(field);
        }
        self
    }

    /// Add a bare required field. Re-adding an alias replaces the earlier declaration.
    pub fn req_add(self, alias: impl Into<String>, spec: impl Into<Arc<Spec>>) -> Self {
        self.push(true, alias.into(), None, spec.into())
    }

    /// Add a required field that is framed as a named object.
    pub fn req_add_named(
        self,
        alias: impl Into<String>,
        name: impl Into<String>,
        spec: impl Into<Arc<Spec>>,
    ) -> Self {
        self.push(true, alias.into(), Some(name.into()), spec.into())
    }

    /// Add a bare optional field after the ones already declared.
    pub fn opt_add(self, alias: impl Into<String>, spec: impl Into<Arc<Spec>>) -> Self {
        self.push(false, alias.into(), None, spec.into())
    }

    /// Add an optional field that is framed as a named object.
    pub fn opt_add_named(
        self,
        alias: impl Into<String>,
        name: impl Into<String>,
        spec: impl Into<Arc<Spec>>,
    ) -> Self {
        self.push(false, alias.into(), Some(name.into()), spec.into())
    }

    /// Build this into a [`Spec`].
    pub fn build(self) -> Spec {
        Spec::Structural(Structure::Record(Arc::new(self)))
    }

    pub fn required(&self) -> &[Field] {
        &self.required
    }

    pub fn optional(&self) -> &[Field] {
        &self.optional
    }

    /// Look up a field, in either group.
    pub fn field(&self, alias: &str) -> Option<&Field> {
        self.required
            .iter()
            .chain(self.optional.iter())
            .find(|f| f.alias == alias)
    }

    pub fn is_required(&self, alias: &str) -> bool {
        self.required.iter().any(|f| f.alias == alias)
    }

    /// Position of an optional field within the optional group.
    pub fn optional_index(&self, alias: &str) -> Option<usize> {
        self.optional.iter().position(|f| f.alias == alias)
    }

    /// Every declared field, required ones first.
    pub fn fields(&self) -> impl Iterator<Item = &Field> {
        self.required.iter().chain(self.optional.iter())
    }
}

/// Admission for record fields: only declared aliases, values coerced by the field's spec, and
/// required fields can't be deleted.
#[derive(Clone, Debug)]
pub struct RecordPolicy {
    spec: Arc<RecordSpec>,
}

impl RecordPolicy {
    fn field(&self, key: &str) -> Result<&Field> {
        self.spec
            .field(key)
            .ok_or_else(|| Error::Admission(format!("`{}` is not a field of this record", key)))
    }
}

impl MapPolicy for RecordPolicy {
    type Value = Value;

    fn admit_read(&self, key: &str) -> Result<()> {
        self.field(key).map(|_| ())
    }

    fn admit_write(&self, key: &str, _value: &Value) -> Result<()> {
        self.field(key).map(|_| ())
    }

    fn admit_delete(&self, key: &str) -> Result<()> {
        if self.spec.is_required(key) {
            Err(Error::Admission(format!(
                "required field `{}` can't be deleted",
                key
            )))
        } else {
            Ok(())
        }
    }

    fn coerce(&self, key: &str, value: Value) -> Result<Value> {
        self.field(key)?.spec.coerce(value)
    }
}

/// A decoded record: its spec plus the field values that are present.
#[derive(Clone, Debug)]
pub struct Record {
    spec: Arc<RecordSpec>,
    fields: RestrictedMap<RecordPolicy>,
}

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.spec, &other.spec) && self.fields == other.fields
    }
}

impl Record {
    /// Make a record holding the default value of every required field and no optional fields.
    pub fn new(spec: Arc<RecordSpec>) -> Result<Self> {
        let mut fields = RestrictedMap::new(RecordPolicy { spec: spec.clone() });
        for field in spec.required.iter() {
            fields.insert_trusted(field.alias.clone(), field.spec.make(None)?);
        }
        Ok(Self { spec, fields })
    }

    pub fn spec(&self) -> &Arc<RecordSpec> {
        &self.spec
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Get a field. Fails if `alias` isn't a declared field.
    pub fn get(&self, alias: &str) -> Result<Option<&Value>> {
        self.fields.get(alias)
    }

    pub fn contains_key(&self, alias: &str) -> bool {
        self.fields.contains_key(alias)
    }

    /// Present fields, in declared order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter()
    }

    /// How many optional fields are present.
    pub fn present_optional(&self) -> usize {
        self.spec
            .optional
            .iter()
            .take_while(|f| self.fields.contains_key(&f.alias))
            .count()
    }

    /// Set a field. An optional field can only be set if every optional field declared before it
    /// is present.
    pub fn insert(&mut self, alias: &str, value: Value) -> Result<Option<Value>> {
        if let Some(index) = self.spec.optional_index(alias) {
            if let Some(before) = index.checked_sub(1).map(|i| &self.spec.optional[i]) {
                if !self.fields.contains_key(&before.alias) {
                    return Err(Error::Admission(format!(
                        "optional field `{}` can't be set while `{}` is absent",
                        alias, before.alias
                    )));
                }
            }
        }
        self.fields.insert(alias, value)
    }

    /// Remove an optional field. Only the last present optional field can be removed, and
    /// required fields can't be removed at all.
    pub fn remove(&mut self, alias: &str) -> Result<Option<Value>> {
        if let Some(index) = self.spec.optional_index(alias) {
            if let Some(after) = self.spec.optional.get(index + 1) {
                if self.fields.contains_key(&after.alias) {
                    return Err(Error::Admission(format!(
                        "optional field `{}` can't be removed while `{}` is present",
                        alias, after.alias
                    )));
                }
            }
        }
        self.fields.remove(alias)
    }

    /// Edit a present field in place; see [`RestrictedMap::modify`].
    pub fn modify<R>(&mut self, alias: &str, edit: impl FnOnce(&mut Value) -> R) -> Result<R> {
        self.fields.modify(alias, edit)
    }

    pub fn is_modified(&self) -> bool {
        self.fields.is_modified() || self.fields.values().any(Value::is_modified)
    }

    pub fn mark_clean(&mut self) {
        self.fields.mark_clean();
        self.fields.values_mut().for_each(Value::mark_clean);
    }

    pub(crate) fn read(
        spec: &Arc<RecordSpec>,
        cursor: &mut Cursor,
        ctx: DecodeContext,
    ) -> Result<Self> {
        let mut fields = RestrictedMap::new(RecordPolicy { spec: spec.clone() });
        for (i, field) in spec.required.iter().enumerate() {
            let value = field.read(cursor, ctx);
            // A mismatch on the very first field means this isn't a record of this kind at all.
            let value = if i == 0 {
                value?
            } else {
                value.map_err(|e| e.committed(|| format!("required field `{}`", field.alias)))?
            };
            fields.insert_trusted(field.alias.clone(), value);
        }
        for field in spec.optional.iter() {
            cursor.save();
            match field.read(cursor, ctx) {
                Ok(value) => {
                    cursor.unsave()?;
                    fields.insert_trusted(field.alias.clone(), value);
                }
                Err(e) if e.is_recoverable() => {
                    cursor.restore()?;
                    trace!(
                        "record ends before optional field `{}` at offset {}",
                        field.alias,
                        cursor.tell()
                    );
                    break;
                }
                Err(e) => {
                    cursor.unsave()?;
                    return Err(e);
                }
            }
        }
        Ok(Self {
            spec: spec.clone(),
            fields,
        })
    }

    pub(crate) fn write(&self, cursor: &mut Cursor) -> Result<()> {
        for field in self.spec.required.iter() {
            let value = self.fields.get(&field.alias)?.ok_or_else(|| {
                Error::Structure(format!("required field `{}` is missing", field.alias))
            })?;
            field.write(cursor, value)?;
        }
        for field in self.spec.optional.iter() {
            match self.fields.get(&field.alias)? {
                Some(value) => field.write(cursor, value)?,
                None => break,
            }
        }
        Ok(())
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.len()))?;
        for field in self.spec.fields() {
            if let Some(value) = self.fields.get(&field.alias).ok().flatten() {
                map.serialize_entry(&field.alias, value)?;
            }
        }
        map.end()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{marker::Kind, position::Position, registry::Registry};

    fn three_optional() -> Arc<RecordSpec> {
        Arc::new(
            RecordSpec::new()
                .req_add("id", Spec::basic(Kind::Int))
                .opt_add("o1", Spec::basic(Kind::Utf8))
                .opt_add("o2", Spec::basic(Kind::Long))
                .opt_add("o3", Spec::basic(Kind::Bool)),
        )
    }

    fn read(spec: &Arc<RecordSpec>, bytes: Vec<u8>) -> Result<(Record, Cursor)> {
        let registry = Registry::new();
        let mut cursor = Cursor::from_bytes(bytes);
        let record = Record::read(spec, &mut cursor, DecodeContext::new(&registry))?;
        Ok((record, cursor))
    }

    fn write(record: &Record) -> Vec<u8> {
        let mut cursor = Cursor::new();
        record.write(&mut cursor).unwrap();
        cursor.into_bytes()
    }

    #[test]
    fn new_fills_required_only() {
        let record = Record::new(three_optional()).unwrap();
        assert_eq!(record.len(), 1);
        assert_eq!(record.get("id").unwrap(), Some(&Value::from(0i32)));
        assert_eq!(record.get("o1").unwrap(), None);
        assert!(record.get("nope").is_err());
        assert!(!record.is_modified());
    }

    #[test]
    fn optional_prefix_on_read() {
        let spec = three_optional();
        let mut cursor = Cursor::new();
        cursor.write_tagged_int(5);
        cursor.write_tagged_utf8(&"a".into()).unwrap();
        // o2 should be a long; a bool here means o2 is absent, and so is o3.
        cursor.write_tagged_bool(true);
        let bytes = cursor.into_bytes();

        let (record, cursor) = read(&spec, bytes.clone()).unwrap();
        assert_eq!(record.present_optional(), 1);
        assert!(!record.contains_key("o2"));
        assert!(!record.contains_key("o3"));
        assert_eq!(cursor.tell(), bytes.len() - 2);
        assert_eq!(cursor.checkpoints(), 0);
        assert_eq!(write(&record), bytes[..bytes.len() - 2].to_vec());
    }

    #[test]
    fn all_optional_present() {
        let spec = three_optional();
        let mut cursor = Cursor::new();
        cursor.write_tagged_int(5);
        cursor.write_tagged_utf8(&"".into()).unwrap();
        cursor.write_tagged_long(-1);
        cursor.write_tagged_bool(false);
        let bytes = cursor.into_bytes();
        let (record, cursor) = read(&spec, bytes.clone()).unwrap();
        assert!(cursor.is_at_end());
        assert_eq!(record.present_optional(), 3);
        assert_eq!(write(&record), bytes);
    }

    #[test]
    fn first_required_mismatch_is_recoverable() {
        let spec = three_optional();
        let err = read(&spec, vec![0x02, 0, 0, 0, 0, 0, 0, 0, 0]).unwrap_err();
        assert!(err.is_recoverable());
    }

    #[test]
    fn later_required_mismatch_is_fatal() {
        let spec = Arc::new(
            RecordSpec::new()
                .req_add("a", Spec::basic(Kind::Int))
                .req_add("b", Spec::basic(Kind::Int)),
        );
        let mut cursor = Cursor::new();
        cursor.write_tagged_int(1);
        cursor.write_tagged_bool(true);
        let err = read(&spec, cursor.into_bytes()).unwrap_err();
        assert!(matches!(err, Error::Structure(ref m) if m.contains("`b`")));
    }

    #[test]
    fn fatal_optional_error_propagates() {
        let spec = three_optional();
        let mut cursor = Cursor::new();
        cursor.write_tagged_int(5);
        // A string tag with a truncated body.
        cursor.write_fixed(&[0x03, 0x00, 0x00, 0x09, b'x']);
        let err = read(&spec, cursor.into_bytes()).unwrap_err();
        assert!(matches!(err, Error::UnexpectedEnd { .. }));
    }

    #[test]
    fn optional_prefix_on_write() {
        let mut record = Record::new(three_optional()).unwrap();
        let err = record.insert("o2", Value::from(1i64)).unwrap_err();
        assert!(err.to_string().contains("`o1`"));
        record.insert("o1", Value::from("x")).unwrap();
        record.insert("o2", Value::from(1i32)).unwrap();
        assert_eq!(record.get("o2").unwrap(), Some(&Value::from(1i64)));
        assert!(record.remove("o1").is_err());
        assert_eq!(record.remove("o2").unwrap(), Some(Value::from(1i64)));
        assert_eq!(record.remove("o1").unwrap(), Some(Value::from("x")));
        let err = record.remove("id").unwrap_err();
        assert!(err.to_string().contains("`id`"));
        assert!(record.is_modified());
    }

    #[test]
    fn nested_modification() {
        let inner = Arc::new(RecordSpec::new().req_add("n", Spec::basic(Kind::Int)));
        let outer = Arc::new(
            RecordSpec::new().req_add("inner", Spec::Structural(Structure::Record(inner))),
        );
        let mut record = Record::new(outer).unwrap();
        assert!(!record.is_modified());
        record
            .modify("inner", |v| {
                if let Value::Record(r) = v {
                    r.insert("n", Value::from(3i32)).unwrap();
                }
            })
            .unwrap();
        assert!(record.is_modified());
        record.mark_clean();
        assert!(!record.is_modified());
        match record.get("inner").unwrap() {
            Some(Value::Record(r)) => assert_eq!(r.get("n").unwrap(), Some(&Value::from(3i32))),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn named_fields() {
        let spec = Arc::new(
            RecordSpec::new()
                .req_add_named("where", "lpr", Spec::position())
                .opt_add_named("count", "n", Spec::basic(Kind::Int)),
        );
        let mut record = Record::new(spec.clone()).unwrap();
        record
            .insert("where", Value::Position(Position::new(10)))
            .unwrap();
        record.insert("count", Value::from(2i32)).unwrap();
        let bytes = write(&record);
        assert_eq!(bytes[0], 0xfe);
        let (decoded, cursor) = read(&spec, bytes.clone()).unwrap();
        assert!(cursor.is_at_end());
        assert_eq!(decoded, record);
        assert_eq!(write(&decoded), bytes);
    }

    #[test]
    fn serializes_in_declared_order() {
        let mut record = Record::new(three_optional()).unwrap();
        record.insert("o1", Value::from("x")).unwrap();
        let json = serde_json::to_string(&record).unwrap();
        assert_eq!(json, r#"{"id":0,"o1":"x"}"#);
    }

    #[test]
    fn redeclaring_replaces() {
        let spec = RecordSpec::new()
            .opt_add("a", Spec::basic(Kind::Int))
            .req_add("a", Spec::basic(Kind::Long));
        assert!(spec.is_required("a"));
        assert!(spec.optional().is_empty());
    }
}

use std::sync::Arc;

use serde::{ser::SerializeMap, Serialize, Serializer};

use super::{read_count, write_count, DecodeContext, Spec, Structure};
use crate::{
    collection::{MapPolicy, RestrictedMap},
    cursor::Cursor,
    error::{Error, Result},
    value::Value,
};

/// One predeclared slot of an [`IntMap`].
#[derive(Clone, Debug)]
pub struct IntMapEntry {
    index: i32,
    alias: String,
    name: Option<String>,
    spec: Arc<Spec>,
}

impl IntMapEntry {
    pub fn index(&self) -> i32 {
        self.index
    }

    /// The key the slot is accessed by.
    pub fn alias(&self) -> &str {
        &self.alias
    }

    /// The object name the value is framed with on the wire, if any.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn spec(&self) -> &Arc<Spec> {
        &self.spec
    }
}

/// Spec for an [`IntMap`]: a fixed set of integer indices, each with its own alias and spec.
///
/// On the wire an IntMap is a count followed by that many `(index, value)` pairs. Callers only
/// ever see the aliases.
///
/// ```
/// # use krds_pack::{Kind, spec::*};
/// let purchase = IntMapSpec::new()
///     .entry(0, "state", Spec::basic(Kind::Int))
///     .named_entry(1, "receipt", "purchase.receipt", Spec::basic(Kind::Utf8))
///     .build();
/// ```
#[derive(Clone, Debug, Default)]
pub struct IntMapSpec {
    entries: Vec<IntMapEntry>,
}

impl IntMapSpec {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(mut self, index: i32, alias: String, name: Option<String>, spec: Arc<Spec>) -> Self {
        self.entries.retain(|e| e.index != index && e.alias != alias);
        self.entries.push(IntMapEntry {
            index,
            alias,
            name,
            spec,
        });
        self
    }

    /// Declare a bare slot. An index or alias that was already declared is replaced.
    pub fn entry(self, index: i32, alias: impl Into<String>, spec: impl Into<Arc<Spec>>) -> Self {
        self.push(index, alias.into(), None, spec.into())
    }

    /// Declare a slot whose value is framed as a named object.
    pub fn named_entry(
        self,
        index: i32,
        alias: impl Into<String>,
        name: impl Into<String>,
        spec: impl Into<Arc<Spec>>,
    ) -> Self {
        self.push(index, alias.into(), Some(name.into()), spec.into())
    }

    pub fn build(self) -> Spec {
        Spec::Structural(Structure::IntMap(Arc::new(self)))
    }

    pub fn entries(&self) -> &[IntMapEntry] {
        &self.entries
    }

    pub fn by_index(&self, index: i32) -> Option<&IntMapEntry> {
        self.entries.iter().find(|e| e.index == index)
    }

    pub fn by_alias(&self, alias: &str) -> Option<&IntMapEntry> {
        self.entries.iter().find(|e| e.alias == alias)
    }
}

/// Admission for IntMap slots: only declared aliases, values coerced by the slot's spec, and
/// nothing can be deleted.
#[derive(Clone, Debug)]
pub struct IntMapPolicy {
    spec: Arc<IntMapSpec>,
}

impl IntMapPolicy {
    fn entry(&self, key: &str) -> Result<&IntMapEntry> {
        self.spec
            .by_alias(key)
            .ok_or_else(|| Error::UnrecognizedIndex(key.to_string()))
    }
}

impl MapPolicy for IntMapPolicy {
    type Value = Value;

    fn admit_read(&self, key: &str) -> Result<()> {
        self.entry(key).map(|_| ())
    }

    fn admit_write(&self, key: &str, _value: &Value) -> Result<()> {
        self.entry(key).map(|_| ())
    }

    fn admit_delete(&self, key: &str) -> Result<()> {
        Err(Error::Admission(format!(
            "`{}` is a fixed index and can't be deleted",
            key
        )))
    }

    fn coerce(&self, key: &str, value: Value) -> Result<Value> {
        self.entry(key)?.spec.coerce(value)
    }
}

/// A sparse map over a fixed set of integer indices, keyed by alias.
#[derive(Clone, Debug)]
pub struct IntMap {
    spec: Arc<IntMapSpec>,
    slots: RestrictedMap<IntMapPolicy>,
}

impl PartialEq for IntMap {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.spec, &other.spec) && self.slots == other.slots
    }
}

impl IntMap {
    /// Make a map with every declared slot holding its default value.
    pub fn new(spec: Arc<IntMapSpec>) -> Result<Self> {
        let mut slots = RestrictedMap::new(IntMapPolicy { spec: spec.clone() });
        for entry in spec.entries.iter() {
            slots.insert_trusted(entry.alias.clone(), entry.spec.make(None)?);
        }
        Ok(Self { spec, slots })
    }

    pub fn spec(&self) -> &Arc<IntMapSpec> {
        &self.spec
    }

    /// Number of populated slots.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn get(&self, alias: &str) -> Result<Option<&Value>> {
        self.slots.get(alias)
    }

    pub fn get_index(&self, index: i32) -> Result<Option<&Value>> {
        let entry = self
            .spec
            .by_index(index)
            .ok_or_else(|| Error::UnrecognizedIndex(index.to_string()))?;
        self.slots.get(&entry.alias)
    }

    pub fn insert(&mut self, alias: &str, value: Value) -> Result<Option<Value>> {
        self.slots.insert(alias, value)
    }

    pub fn insert_index(&mut self, index: i32, value: Value) -> Result<Option<Value>> {
        let alias = self
            .spec
            .by_index(index)
            .ok_or_else(|| Error::UnrecognizedIndex(index.to_string()))?
            .alias
            .clone();
        self.slots.insert(alias, value)
    }

    /// Always fails: the index set is fixed.
    pub fn remove(&mut self, alias: &str) -> Result<Option<Value>> {
        self.slots.remove(alias)
    }

    pub fn modify<R>(&mut self, alias: &str, edit: impl FnOnce(&mut Value) -> R) -> Result<R> {
        self.slots.modify(alias, edit)
    }

    /// Populated slots, in the order they'll be written.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.slots.iter()
    }

    pub fn is_modified(&self) -> bool {
        self.slots.is_modified() || self.slots.values().any(Value::is_modified)
    }

    pub fn mark_clean(&mut self) {
        self.slots.mark_clean();
        self.slots.values_mut().for_each(Value::mark_clean);
    }

    pub(crate) fn read(
        spec: &Arc<IntMapSpec>,
        cursor: &mut Cursor,
        ctx: DecodeContext,
    ) -> Result<Self> {
        let count = read_count(cursor)?;
        let mut slots = RestrictedMap::new(IntMapPolicy { spec: spec.clone() });
        for _ in 0..count {
            let index = cursor
                .read_tagged_int()
                .map_err(|e| e.committed(|| String::from("int map index")))?;
            let entry = spec
                .by_index(index)
                .ok_or_else(|| Error::UnrecognizedIndex(index.to_string()))?;
            let value = entry
                .spec
                .read(cursor, entry.name(), ctx)
                .map_err(|e| e.committed(|| format!("int map slot `{}`", entry.alias)))?;
            if slots.insert_trusted(entry.alias.clone(), value).is_some() {
                return Err(Error::Structure(format!(
                    "int map index {} appears twice",
                    index
                )));
            }
        }
        Ok(Self {
            spec: spec.clone(),
            slots,
        })
    }

    pub(crate) fn write(&self, cursor: &mut Cursor) -> Result<()> {
        write_count(cursor, self.slots.len())?;
        for (alias, value) in self.slots.iter() {
            let entry = self
                .spec
                .by_alias(alias)
                .ok_or_else(|| Error::UnrecognizedIndex(alias.to_string()))?;
            cursor.write_tagged_int(entry.index);
            entry.spec.write(cursor, value, entry.name())?;
        }
        Ok(())
    }
}

impl Serialize for IntMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.len()))?;
        for (alias, value) in self.slots.iter() {
            map.serialize_entry(alias, value)?;
        }
        map.end()
    }
}

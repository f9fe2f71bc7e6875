//! The top-level container.
//!
//! A container file is laid out as:
//!
//! ```text
//! 00 00 00 00 00 1A B1 26      signature
//! 02 00 00 00 00 00 00 00 01   tagged long, always 1
//! 01 <count>                   tagged int, number of objects
//! <object> * count             0xFE, tagged name, value, 0xFF
//! ```
//!
//! Every object is decoded with the spec its name resolves to in the registry. Names are unique
//! and the order they were read in is the order they're written back in.

use educe::Educe;
use indexmap::IndexMap;
use log::{debug, trace};
use serde::{ser::SerializeMap, Serialize, Serializer};

use crate::{
    cursor::Cursor,
    error::{Error, Result},
    marker::{FILE_CONSTANT, MAGIC},
    registry::SchemaLookup,
    spec::{read_count, read_named, write_count, write_named, DecodeContext},
    value::Value,
    MAX_FILE_SIZE,
};

/// A decoded container: named values in file order.
#[derive(Clone, Debug, Educe)]
#[educe(PartialEq, Default)]
pub struct Container {
    entries: IndexMap<String, Value>,
    #[educe(PartialEq(ignore))]
    modified: bool,
}

impl Container {
    /// Make an empty container.
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode a complete file. The whole buffer must be consumed.
    pub fn decode(bytes: &[u8], registry: &dyn SchemaLookup) -> Result<Self> {
        if bytes.len() > MAX_FILE_SIZE {
            return Err(Error::ParseLimit(format!(
                "file is {} bytes, larger than the {} byte maximum",
                bytes.len(),
                MAX_FILE_SIZE
            )));
        }
        let mut cursor = Cursor::from_bytes(bytes);
        let container = Self::read(&mut cursor, registry)?;
        if !cursor.is_at_end() {
            return Err(Error::Structure(format!(
                "{} trailing bytes after the last object",
                cursor.remaining()
            )));
        }
        Ok(container)
    }

    /// Decode a container starting at the cursor's position, leaving the cursor after the last
    /// object.
    pub fn read(cursor: &mut Cursor, registry: &dyn SchemaLookup) -> Result<Self> {
        cursor
            .expect(&MAGIC)
            .map_err(|e| e.committed(|| String::from("file signature")))?;
        let offset = cursor.tell();
        let constant = cursor
            .read_tagged_long()
            .map_err(|e| e.committed(|| String::from("file constant")))?;
        if constant != FILE_CONSTANT {
            return Err(Error::Structure(format!(
                "file constant at offset {} is {}, expected {}",
                offset, constant, FILE_CONSTANT
            )));
        }
        let count = read_count(cursor).map_err(|e| e.committed(|| String::from("object count")))?;

        let ctx = DecodeContext::new(registry);
        let mut entries = IndexMap::with_capacity(count.min(cursor.remaining()));
        for i in 0..count {
            let offset = cursor.tell();
            let (name, value) = read_named(cursor, ctx)
                .map_err(|e| e.committed(|| format!("object {} of {}", i, count)))?;
            trace!("decoded object `{}` at offset {}", name, offset);
            if entries.contains_key(&name) {
                return Err(Error::Structure(format!(
                    "object `{}` appears twice",
                    name
                )));
            }
            entries.insert(name, value);
        }
        debug!("decoded {} objects from {} bytes", count, cursor.tell());
        Ok(Self {
            entries,
            modified: false,
        })
    }

    /// Encode the container into a fresh buffer.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut cursor = Cursor::new();
        self.write(&mut cursor)?;
        let bytes = cursor.into_bytes();
        debug!("encoded {} objects into {} bytes", self.entries.len(), bytes.len());
        Ok(bytes)
    }

    /// Encode the container at the cursor's position.
    pub fn write(&self, cursor: &mut Cursor) -> Result<()> {
        cursor.write_fixed(&MAGIC);
        cursor.write_tagged_long(FILE_CONSTANT);
        write_count(cursor, self.entries.len())?;
        for (name, value) in self.entries.iter() {
            write_named(cursor, name, value)?;
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Named values, in file order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Store a value under a registered name, coercing it with that name's spec. Objects nested
    /// anywhere in the value must also resolve through the registry. A new name goes to the end.
    pub fn insert(
        &mut self,
        name: impl Into<String>,
        value: Value,
        registry: &dyn SchemaLookup,
    ) -> Result<Option<Value>> {
        let name = name.into();
        let spec = registry
            .lookup(&name)
            .ok_or_else(|| Error::UnrecognizedName(name.clone()))?;
        let value = spec.coerce(value)?;
        value.check_objects(registry)?;
        self.modified = true;
        Ok(self.entries.insert(name, value))
    }

    /// Edit a stored value. The edit is made on a copy that must still pass the name's spec, and
    /// the registry for any objects nested in it, before it replaces the original.
    pub fn modify<R>(
        &mut self,
        name: &str,
        registry: &dyn SchemaLookup,
        edit: impl FnOnce(&mut Value) -> R,
    ) -> Result<R> {
        let spec = registry
            .lookup(name)
            .ok_or_else(|| Error::UnrecognizedName(name.to_string()))?;
        let mut value = self
            .entries
            .get(name)
            .cloned()
            .ok_or_else(|| Error::Admission(format!("object `{}` is not present", name)))?;
        let out = edit(&mut value);
        let value = spec.coerce(value)?;
        value.check_objects(registry)?;
        if let Some(slot) = self.entries.get_mut(name) {
            *slot = value;
        }
        self.modified = true;
        Ok(out)
    }

    /// Remove a named value, keeping the order of the rest.
    pub fn remove(&mut self, name: &str) -> Option<Value> {
        let old = self.entries.shift_remove(name);
        if old.is_some() {
            self.modified = true;
        }
        old
    }

    /// True if anything in the container changed since it was decoded.
    pub fn is_modified(&self) -> bool {
        self.modified || self.entries.values().any(Value::is_modified)
    }

    pub fn mark_clean(&mut self) {
        self.modified = false;
        self.entries.values_mut().for_each(Value::mark_clean);
    }
}

impl Serialize for Container {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, value) in self.entries.iter() {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

use educe::Educe;
use serde::{ser::SerializeMap, Serialize, Serializer};

use super::{check_str, read_count, write_count};
use crate::{
    collection::{MapPolicy, RestrictedMap},
    cursor::Cursor,
    error::{Error, Result},
    primitive::{KStr, Primitive},
    value::Value,
};

/// Admission for maps of primitives: any key, any self-tagged primitive value.
#[derive(Clone, Copy, Debug, Default)]
pub struct DynamicPolicy;

impl MapPolicy for DynamicPolicy {
    type Value = Value;

    fn admit_write(&self, key: &str, value: &Value) -> Result<()> {
        match value {
            Value::Basic(prim) => check_str(prim),
            other => Err(Error::Admission(format!(
                "`{}` can only hold a primitive, not {}",
                key,
                other.describe()
            ))),
        }
    }
}

/// A map with open-ended string keys and primitive values.
///
/// On the wire it is a count followed by that many `(string key, tagged primitive)` pairs. The
/// kind of each value comes from its own tag.
#[derive(Clone, Debug, Educe)]
#[educe(PartialEq, Default)]
pub struct DynamicMap {
    #[educe(Default(expression = RestrictedMap::new(DynamicPolicy)))]
    entries: RestrictedMap<DynamicPolicy>,
    // An empty key read with an explicit zero length is written back the same way.
    #[educe(PartialEq(ignore))]
    explicit_empty_key: bool,
}

impl DynamicMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key).ok().flatten()
    }

    /// The primitive under `key`, if there is one.
    pub fn get_primitive(&self, key: &str) -> Option<&Primitive> {
        match self.get(key) {
            Some(Value::Basic(prim)) => Some(prim),
            _ => None,
        }
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn insert(
        &mut self,
        key: impl Into<String>,
        value: impl Into<Value>,
    ) -> Result<Option<Value>> {
        self.entries.insert(key, value.into())
    }

    pub fn remove(&mut self, key: &str) -> Result<Option<Value>> {
        self.entries.remove(key)
    }

    pub fn clear(&mut self) -> Result<()> {
        self.entries.clear()
    }

    pub fn modify<R>(&mut self, key: &str, edit: impl FnOnce(&mut Value) -> R) -> Result<R> {
        self.entries.modify(key, edit)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter()
    }

    pub fn is_modified(&self) -> bool {
        self.entries.is_modified()
    }

    pub fn mark_clean(&mut self) {
        self.entries.mark_clean();
    }

    pub(crate) fn read(cursor: &mut Cursor) -> Result<Self> {
        let count = read_count(cursor)?;
        let mut map = DynamicMap::new();
        for _ in 0..count {
            let key = cursor
                .read_tagged_utf8()
                .map_err(|e| e.committed(|| String::from("dynamic map key")))?;
            if key.is_empty() && !key.is_compact_empty() {
                map.explicit_empty_key = true;
            }
            let key = key.into_string();
            let value = Primitive::read_any(cursor)
                .map_err(|e| e.committed(|| format!("dynamic map value for `{}`", key)))?;
            if map
                .entries
                .insert_trusted(key.clone(), Value::Basic(value))
                .is_some()
            {
                return Err(Error::Structure(format!(
                    "dynamic map key `{}` appears twice",
                    key
                )));
            }
        }
        Ok(map)
    }

    pub(crate) fn write(&self, cursor: &mut Cursor) -> Result<()> {
        write_count(cursor, self.entries.len())?;
        for (key, value) in self.entries.iter() {
            let key = if key.is_empty() && self.explicit_empty_key {
                KStr::explicit("")
            } else {
                KStr::new(key)
            };
            cursor.write_tagged_utf8(&key)?;
            value.write(cursor)?;
        }
        Ok(())
    }
}

impl Serialize for DynamicMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.len()))?;
        for (key, value) in self.entries.iter() {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

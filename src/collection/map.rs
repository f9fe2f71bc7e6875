use indexmap::IndexMap;

use crate::error::{Error, Result};

/// Hooks that govern a [`RestrictedMap`]. All of them default to allowing everything.
///
/// Read admission is separate from write admission, so a map can tell "this key is absent" apart
/// from "this key can never exist here".
pub trait MapPolicy {
    type Value;

    /// Decide whether a key may be queried.
    fn admit_read(&self, _key: &str) -> Result<()> {
        Ok(())
    }

    /// Decide whether a value may be stored under a key.
    fn admit_write(&self, _key: &str, _value: &Self::Value) -> Result<()> {
        Ok(())
    }

    /// Decide whether a key may be deleted. Errors should name the key.
    fn admit_delete(&self, _key: &str) -> Result<()> {
        Ok(())
    }

    /// Turn an admitted value into its stored form.
    fn coerce(&self, _key: &str, value: Self::Value) -> Result<Self::Value> {
        Ok(value)
    }

    /// Called after every successful mutation of `key`.
    fn mutated(&mut self, _key: &str) {}
}

/// An insertion-ordered, string-keyed map whose every access passes through a [`MapPolicy`].
#[derive(Clone, Debug)]
pub struct RestrictedMap<P: MapPolicy> {
    entries: IndexMap<String, P::Value>,
    policy: P,
    modified: bool,
}

// Only the contents count, in any order.
impl<P: MapPolicy> PartialEq for RestrictedMap<P>
where
    P::Value: PartialEq,
{
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

impl<P: MapPolicy> RestrictedMap<P> {
    pub fn new(policy: P) -> Self {
        Self {
            entries: IndexMap::new(),
            policy,
            modified: false,
        }
    }

    pub fn policy(&self) -> &P {
        &self.policy
    }

    fn prepare(&self, key: &str, value: P::Value) -> Result<P::Value> {
        self.policy.admit_write(key, &value)?;
        self.policy.coerce(key, value)
    }

    fn notify(&mut self, key: &str) {
        self.modified = true;
        self.policy.mutated(key);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up a key. `Ok(None)` means the key is legal but absent.
    pub fn get(&self, key: &str) -> Result<Option<&P::Value>> {
        self.policy.admit_read(key)?;
        Ok(self.entries.get(key))
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn get_index(&self, index: usize) -> Option<(&str, &P::Value)> {
        self.entries.get_index(index).map(|(k, v)| (k.as_str(), v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn values(&self) -> impl Iterator<Item = &P::Value> {
        self.entries.values()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &P::Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Store a value, returning whatever was there before. A new key goes to the end.
    pub fn insert(&mut self, key: impl Into<String>, value: P::Value) -> Result<Option<P::Value>> {
        let key = key.into();
        let value = self.prepare(&key, value)?;
        let old = self.entries.insert(key.clone(), value);
        self.notify(&key);
        Ok(old)
    }

    /// Store several values. Nothing is stored unless all of them are admitted.
    pub fn update<K, I>(&mut self, items: I) -> Result<()>
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, P::Value)>,
    {
        let prepared = items
            .into_iter()
            .map(|(k, v)| {
                let k = k.into();
                let v = self.prepare(&k, v)?;
                Ok((k, v))
            })
            .collect::<Result<Vec<_>>>()?;
        for (k, v) in prepared {
            self.entries.insert(k.clone(), v);
            self.notify(&k);
        }
        Ok(())
    }

    /// Delete a key, keeping the order of the rest. Deleting an absent key is not an error.
    pub fn remove(&mut self, key: &str) -> Result<Option<P::Value>> {
        self.policy.admit_read(key)?;
        self.policy.admit_delete(key)?;
        let old = self.entries.shift_remove(key);
        if old.is_some() {
            self.notify(key);
        }
        Ok(old)
    }

    /// Delete a key that must be present.
    pub fn pop(&mut self, key: &str) -> Result<P::Value> {
        self.remove(key)?
            .ok_or_else(|| Error::Admission(format!("key `{}` is not present", key)))
    }

    /// Delete everything. Fails without changing anything if any key can't be deleted.
    pub fn clear(&mut self) -> Result<()> {
        for key in self.entries.keys() {
            self.policy.admit_delete(key)?;
        }
        if self.entries.is_empty() {
            return Ok(());
        }
        let keys: Vec<String> = self.entries.drain(..).map(|(k, _)| k).collect();
        for key in keys {
            self.notify(&key);
        }
        Ok(())
    }

    /// Edit a present value in place. The edit is made on a copy, and the result must pass
    /// admission again before it replaces the original.
    pub fn modify<R>(&mut self, key: &str, edit: impl FnOnce(&mut P::Value) -> R) -> Result<R>
    where
        P::Value: Clone,
    {
        self.policy.admit_read(key)?;
        let mut value = self
            .entries
            .get(key)
            .cloned()
            .ok_or_else(|| Error::Admission(format!("key `{}` is not present", key)))?;
        let out = edit(&mut value);
        let value = self.prepare(key, value)?;
        if let Some(slot) = self.entries.get_mut(key) {
            *slot = value;
        }
        self.notify(key);
        Ok(out)
    }

    /// True if this map itself was mutated. Nested values track their own changes.
    pub fn is_modified(&self) -> bool {
        self.modified
    }

    pub fn mark_clean(&mut self) {
        self.modified = false;
    }

    /// Store without admission or notification. For decoders that have already checked the value.
    pub(crate) fn insert_trusted(&mut self, key: String, value: P::Value) -> Option<P::Value> {
        self.entries.insert(key, value)
    }

    pub(crate) fn values_mut(&mut self) -> impl Iterator<Item = &mut P::Value> {
        self.entries.values_mut()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    // Keys are lowercase, "id" can't be removed, "secret" can't be read, values are stored
    // clamped to 100.
    #[derive(Clone, Debug, Default)]
    struct Lower {
        touched: Vec<String>,
    }

    impl MapPolicy for Lower {
        type Value = u32;

        fn admit_read(&self, key: &str) -> Result<()> {
            if key == "secret" {
                Err(Error::Admission(format!("key `{}` can't be read", key)))
            } else {
                Ok(())
            }
        }

        fn admit_write(&self, key: &str, _value: &u32) -> Result<()> {
            if key.chars().all(|c| c.is_ascii_lowercase()) {
                Ok(())
            } else {
                Err(Error::Admission(format!("key `{}` isn't lowercase", key)))
            }
        }

        fn admit_delete(&self, key: &str) -> Result<()> {
            if key == "id" {
                Err(Error::Admission(format!("key `{}` can't be deleted", key)))
            } else {
                Ok(())
            }
        }

        fn coerce(&self, _key: &str, value: u32) -> Result<u32> {
            Ok(value.min(100))
        }

        fn mutated(&mut self, key: &str) {
            self.touched.push(key.to_string());
        }
    }

    #[test]
    fn read_admission_vs_absence() {
        let map = RestrictedMap::new(Lower::default());
        assert_eq!(map.get("missing").unwrap(), None);
        assert!(map.get("secret").is_err());
    }

    #[test]
    fn write_and_coerce() {
        let mut map = RestrictedMap::new(Lower::default());
        assert_eq!(map.insert("a", 500).unwrap(), None);
        assert_eq!(map.get("a").unwrap(), Some(&100));
        assert!(map.insert("Bad", 1).is_err());
        assert_eq!(map.len(), 1);
        assert_eq!(map.policy().touched, vec!["a".to_string()]);
    }

    #[test]
    fn delete_admission_names_key() {
        let mut map = RestrictedMap::new(Lower::default());
        map.update([("id", 1), ("name", 2)]).unwrap();
        let err = map.remove("id").unwrap_err();
        assert!(err.to_string().contains("`id`"));
        assert!(map.clear().is_err());
        assert_eq!(map.len(), 2);
        assert_eq!(map.remove("name").unwrap(), Some(2));
        assert_eq!(map.remove("name").unwrap(), None);
        assert!(map.pop("name").is_err());
    }

    #[test]
    fn update_is_all_or_nothing() {
        let mut map = RestrictedMap::new(Lower::default());
        assert!(map.update([("a", 1), ("B", 2)]).is_err());
        assert!(map.is_empty());
        assert!(!map.is_modified());
    }

    #[test]
    fn order_is_insertion_order() {
        let mut map = RestrictedMap::new(Lower::default());
        map.update([("c", 1), ("a", 2), ("b", 3)]).unwrap();
        map.remove("a").unwrap();
        map.insert("a", 4).unwrap();
        let keys: Vec<&str> = map.keys().collect();
        assert_eq!(keys, ["c", "b", "a"]);
        assert_eq!(map.get_index(0), Some(("c", &1)));
    }

    #[test]
    fn modify_rechecks() {
        let mut map = RestrictedMap::new(Lower::default());
        map.insert("a", 1).unwrap();
        map.mark_clean();
        map.modify("a", |v| *v = 1000).unwrap();
        assert_eq!(map.get("a").unwrap(), Some(&100));
        assert!(map.is_modified());
        assert!(map.modify("zz", |_| ()).is_err());
    }
}

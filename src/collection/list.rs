use std::ops::RangeBounds;

use crate::error::{Error, Result};

/// Hooks that govern a [`RestrictedList`].
pub trait ListPolicy {
    type Item;

    /// Decide whether an item may be stored.
    fn admit(&self, _item: &Self::Item) -> Result<()> {
        Ok(())
    }

    /// Turn an admitted item into its stored form.
    fn coerce(&self, item: Self::Item) -> Result<Self::Item> {
        Ok(item)
    }

    /// Called after every successful mutation.
    fn mutated(&mut self) {}
}

/// An ordered sequence whose every mutation passes through a [`ListPolicy`].
///
/// Multi-item operations are all-or-nothing: every candidate is admitted and coerced before any
/// of them is committed.
#[derive(Clone, Debug)]
pub struct RestrictedList<P: ListPolicy> {
    items: Vec<P::Item>,
    policy: P,
    modified: bool,
}

// Only the contents count; the policy and the modified flag don't.
impl<P: ListPolicy> PartialEq for RestrictedList<P>
where
    P::Item: PartialEq,
{
    fn eq(&self, other: &Self) -> bool {
        self.items == other.items
    }
}

impl<P: ListPolicy> RestrictedList<P> {
    pub fn new(policy: P) -> Self {
        Self {
            items: Vec::new(),
            policy,
            modified: false,
        }
    }

    /// Build from items that were already checked, such as freshly decoded ones.
    pub(crate) fn from_trusted(policy: P, items: Vec<P::Item>) -> Self {
        Self {
            items,
            policy,
            modified: false,
        }
    }

    pub fn policy(&self) -> &P {
        &self.policy
    }

    fn prepare(&self, item: P::Item) -> Result<P::Item> {
        self.policy.admit(&item)?;
        self.policy.coerce(item)
    }

    fn prepare_all(&self, items: impl IntoIterator<Item = P::Item>) -> Result<Vec<P::Item>> {
        items.into_iter().map(|item| self.prepare(item)).collect()
    }

    fn notify(&mut self) {
        self.modified = true;
        self.policy.mutated();
    }

    fn out_of_range(&self, index: usize) -> Error {
        Error::Admission(format!(
            "index {} is out of range for a list of length {}",
            index,
            self.items.len()
        ))
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&P::Item> {
        self.items.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, P::Item> {
        self.items.iter()
    }

    pub fn as_slice(&self) -> &[P::Item] {
        &self.items
    }

    /// Replace the item at `index`, returning the old one.
    pub fn set(&mut self, index: usize, item: P::Item) -> Result<P::Item> {
        if index >= self.items.len() {
            return Err(self.out_of_range(index));
        }
        let item = self.prepare(item)?;
        let old = std::mem::replace(&mut self.items[index], item);
        self.notify();
        Ok(old)
    }

    pub fn push(&mut self, item: P::Item) -> Result<()> {
        let item = self.prepare(item)?;
        self.items.push(item);
        self.notify();
        Ok(())
    }

    pub fn insert(&mut self, index: usize, item: P::Item) -> Result<()> {
        if index > self.items.len() {
            return Err(self.out_of_range(index));
        }
        let item = self.prepare(item)?;
        self.items.insert(index, item);
        self.notify();
        Ok(())
    }

    pub fn extend(&mut self, items: impl IntoIterator<Item = P::Item>) -> Result<()> {
        let items = self.prepare_all(items)?;
        if items.is_empty() {
            return Ok(());
        }
        self.items.extend(items);
        self.notify();
        Ok(())
    }

    pub fn remove(&mut self, index: usize) -> Result<P::Item> {
        if index >= self.items.len() {
            return Err(self.out_of_range(index));
        }
        let old = self.items.remove(index);
        self.notify();
        Ok(old)
    }

    pub fn pop(&mut self) -> Option<P::Item> {
        let old = self.items.pop()?;
        self.notify();
        Some(old)
    }

    pub fn clear(&mut self) {
        if self.items.is_empty() {
            return;
        }
        self.items.clear();
        self.notify();
    }

    /// Replace a range of items with new ones, returning the replaced items.
    pub fn splice<R>(
        &mut self,
        range: R,
        items: impl IntoIterator<Item = P::Item>,
    ) -> Result<Vec<P::Item>>
    where
        R: RangeBounds<usize>,
    {
        use std::ops::Bound::*;
        let start = match range.start_bound() {
            Included(&n) => n,
            Excluded(&n) => n + 1,
            Unbounded => 0,
        };
        let end = match range.end_bound() {
            Included(&n) => n + 1,
            Excluded(&n) => n,
            Unbounded => self.items.len(),
        };
        if start > end || end > self.items.len() {
            return Err(self.out_of_range(end));
        }
        let items = self.prepare_all(items)?;
        let old: Vec<P::Item> = self.items.splice(start..end, items).collect();
        self.notify();
        Ok(old)
    }

    /// Edit an item in place. The edit is made on a copy, and the result must pass admission
    /// again before it replaces the original.
    pub fn modify<R>(&mut self, index: usize, edit: impl FnOnce(&mut P::Item) -> R) -> Result<R>
    where
        P::Item: Clone,
    {
        let mut item = self
            .items
            .get(index)
            .cloned()
            .ok_or_else(|| self.out_of_range(index))?;
        let out = edit(&mut item);
        let item = self.prepare(item)?;
        self.items[index] = item;
        self.notify();
        Ok(out)
    }

    /// True if this list itself was mutated. Nested values track their own changes.
    pub fn is_modified(&self) -> bool {
        self.modified
    }

    pub fn mark_clean(&mut self) {
        self.modified = false;
    }

    pub(crate) fn items_mut(&mut self) -> &mut [P::Item] {
        &mut self.items
    }
}

impl<'a, P: ListPolicy> IntoIterator for &'a RestrictedList<P> {
    type Item = &'a P::Item;
    type IntoIter = std::slice::Iter<'a, P::Item>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

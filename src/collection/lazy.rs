//! Auto-vivifying restricted map trees.
//!
//! Reading an absent key of a [`Tree`] node with [`Tree::child`] creates a *candidate*: a fresh,
//! empty node that is remembered under that key but isn't part of its parent yet. Candidates don't
//! show up in iteration, length, or equality. The first write anywhere under a candidate commits
//! it, together with every uncommitted ancestor up to the nearest committed one, in root-to-leaf
//! order. Node ids don't change when a candidate is committed, so an id picked up before a deep
//! write refers to the same node afterwards.
//!
//! ```
//! # use krds_pack::collection::lazy::Tree;
//! # use krds_pack::spec::DynamicPolicy;
//! # use krds_pack::Value;
//! # fn main() -> krds_pack::Result<()> {
//! let mut tree = Tree::new(DynamicPolicy);
//! let a = tree.child(tree.root(), "a")?;
//! let b = tree.child(a, "b")?;
//! assert!(tree.is_empty(tree.root())?);
//!
//! tree.set(b, "c", Value::from(1i32))?;
//! assert_eq!(tree.len(tree.root())?, 1);
//! assert_eq!(tree.child(a, "b")?, b);
//! # Ok(())
//! # }
//! ```
//!
//! Nodes live in an arena and refer to their parent by id. Discarding a node frees it and
//! everything under it, committed or not; the freed ids are then rejected with a usage error.
//!
//! A tree is a standalone builder. No [`Spec`][crate::Spec] describes one and no
//! [`Value`][crate::Value] holds one, so decoded values are never trees. To store what a tree
//! built, copy its leaves into the decoded value with that value's own insert methods.

use std::collections::HashMap;

use indexmap::IndexMap;

use super::MapPolicy;
use crate::error::{Error, Result};

/// Handle to a node in a [`Tree`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NodeId {
    index: usize,
    generation: u32,
}

/// What a committed key of a node holds.
#[derive(Clone, Debug, PartialEq)]
pub enum Slot<V> {
    Leaf(V),
    Node(NodeId),
}

#[derive(Clone, Debug)]
struct Node<V> {
    entries: IndexMap<String, Slot<V>>,
    candidates: HashMap<String, NodeId>,
    parent: Option<(NodeId, String)>,
    committed: bool,
}

impl<V> Node<V> {
    fn new(parent: Option<(NodeId, String)>, committed: bool) -> Self {
        Self {
            entries: IndexMap::new(),
            candidates: HashMap::new(),
            parent,
            committed,
        }
    }
}

#[derive(Clone, Debug)]
struct Cell<V> {
    generation: u32,
    node: Option<Node<V>>,
}

/// An auto-vivifying map tree whose leaf values pass through a [`MapPolicy`].
#[derive(Clone, Debug)]
pub struct Tree<P: MapPolicy> {
    cells: Vec<Cell<P::Value>>,
    free: Vec<usize>,
    root: NodeId,
    policy: P,
    modified: bool,
}

impl<P: MapPolicy> Tree<P> {
    pub fn new(policy: P) -> Self {
        let root = NodeId {
            index: 0,
            generation: 0,
        };
        Self {
            cells: vec![Cell {
                generation: 0,
                node: Some(Node::new(None, true)),
            }],
            free: Vec::new(),
            root,
            policy,
            modified: false,
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn policy(&self) -> &P {
        &self.policy
    }

    /// True if a write has committed anything since the tree was made.
    pub fn is_modified(&self) -> bool {
        self.modified
    }

    /// True if `id` refers to a node that hasn't been discarded.
    pub fn is_live(&self, id: NodeId) -> bool {
        self.node(id).is_ok()
    }

    /// True if `id` is part of the tree rather than an uncommitted candidate.
    pub fn is_committed(&self, id: NodeId) -> Result<bool> {
        Ok(self.node(id)?.committed)
    }

    fn node(&self, id: NodeId) -> Result<&Node<P::Value>> {
        self.cells
            .get(id.index)
            .filter(|c| c.generation == id.generation)
            .and_then(|c| c.node.as_ref())
            .ok_or_else(|| Error::Usage(format!("node {:?} has been discarded", id)))
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut Node<P::Value>> {
        self.cells
            .get_mut(id.index)
            .filter(|c| c.generation == id.generation)
            .and_then(|c| c.node.as_mut())
            .ok_or_else(|| Error::Usage(format!("node {:?} has been discarded", id)))
    }

    fn alloc(&mut self, node: Node<P::Value>) -> NodeId {
        if let Some(index) = self.free.pop() {
            let cell = &mut self.cells[index];
            cell.node = Some(node);
            NodeId {
                index,
                generation: cell.generation,
            }
        } else {
            self.cells.push(Cell {
                generation: 0,
                node: Some(node),
            });
            NodeId {
                index: self.cells.len() - 1,
                generation: 0,
            }
        }
    }

    // Free a node and everything under it.
    fn discard(&mut self, id: NodeId) {
        let mut pending = vec![id];
        while let Some(id) = pending.pop() {
            let cell = match self.cells.get_mut(id.index) {
                Some(cell) if cell.generation == id.generation => cell,
                _ => continue,
            };
            if let Some(node) = cell.node.take() {
                cell.generation = cell.generation.wrapping_add(1);
                self.free.push(id.index);
                pending.extend(node.candidates.into_values());
                pending.extend(node.entries.into_values().filter_map(|slot| match slot {
                    Slot::Node(child) => Some(child),
                    Slot::Leaf(_) => None,
                }));
            }
        }
    }

    // Promote `id` and its uncommitted ancestors, outermost first.
    fn commit(&mut self, id: NodeId) -> Result<()> {
        let mut chain = Vec::new();
        let mut cur = id;
        loop {
            let node = self.node(cur)?;
            if node.committed {
                break;
            }
            let (parent, _) = node
                .parent
                .as_ref()
                .ok_or_else(|| Error::Usage(String::from("uncommitted node without a parent")))?;
            chain.push(cur);
            cur = *parent;
        }
        for id in chain.into_iter().rev() {
            let (parent, key) = match self.node(id)?.parent.clone() {
                Some(link) => link,
                None => continue,
            };
            let parent = self.node_mut(parent)?;
            parent.candidates.remove(&key);
            parent.entries.insert(key, Slot::Node(id));
            self.node_mut(id)?.committed = true;
        }
        Ok(())
    }

    /// Get the child node under `key`, creating an uncommitted candidate if the key is absent.
    /// Repeated calls return the same id. Fails if the key holds a leaf value.
    pub fn child(&mut self, id: NodeId, key: &str) -> Result<NodeId> {
        self.policy.admit_read(key)?;
        let node = self.node(id)?;
        match node.entries.get(key) {
            Some(Slot::Node(child)) => return Ok(*child),
            Some(Slot::Leaf(_)) => {
                return Err(Error::Admission(format!(
                    "key `{}` holds a value, not a nested map",
                    key
                )))
            }
            None => (),
        }
        if let Some(child) = node.candidates.get(key) {
            return Ok(*child);
        }
        let child = self.alloc(Node::new(Some((id, key.to_string())), false));
        self.node_mut(id)?.candidates.insert(key.to_string(), child);
        Ok(child)
    }

    /// Look at a committed key without creating anything.
    pub fn get(&self, id: NodeId, key: &str) -> Result<Option<&Slot<P::Value>>> {
        self.policy.admit_read(key)?;
        Ok(self.node(id)?.entries.get(key))
    }

    /// Store a leaf value, committing `id` if it's a candidate. A candidate waiting under the same
    /// key is discarded.
    pub fn set(
        &mut self,
        id: NodeId,
        key: &str,
        value: P::Value,
    ) -> Result<Option<Slot<P::Value>>> {
        self.node(id)?;
        self.policy.admit_write(key, &value)?;
        let value = self.policy.coerce(key, value)?;
        self.commit(id)?;
        let node = self.node_mut(id)?;
        let stale = node.candidates.remove(key);
        let old = node.entries.insert(key.to_string(), Slot::Leaf(value));
        if let Some(stale) = stale {
            self.discard(stale);
        }
        if let Some(Slot::Node(child)) = old {
            self.discard(child);
        }
        self.modified = true;
        self.policy.mutated(key);
        Ok(old)
    }

    /// Store a fresh, empty, committed node under `key`, replacing whatever was there.
    pub fn insert_node(&mut self, id: NodeId, key: &str) -> Result<NodeId> {
        self.node(id)?;
        self.policy.admit_read(key)?;
        self.commit(id)?;
        let child = self.alloc(Node::new(Some((id, key.to_string())), true));
        let node = self.node_mut(id)?;
        let stale = node.candidates.remove(key);
        let old = node.entries.insert(key.to_string(), Slot::Node(child));
        if let Some(stale) = stale {
            self.discard(stale);
        }
        if let Some(Slot::Node(old)) = old {
            self.discard(old);
        }
        self.modified = true;
        self.policy.mutated(key);
        Ok(child)
    }

    /// Delete a committed key. Removing a nested node discards it and everything under it.
    /// Returns the removed leaf, if the key held one.
    pub fn remove(&mut self, id: NodeId, key: &str) -> Result<Option<P::Value>> {
        self.policy.admit_read(key)?;
        self.policy.admit_delete(key)?;
        let node = self.node_mut(id)?;
        let stale = node.candidates.remove(key);
        let old = node.entries.shift_remove(key);
        if let Some(stale) = stale {
            self.discard(stale);
        }
        let old = match old {
            None => return Ok(None),
            Some(Slot::Node(child)) => {
                self.discard(child);
                None
            }
            Some(Slot::Leaf(v)) => Some(v),
        };
        self.modified = true;
        self.policy.mutated(key);
        Ok(old)
    }

    /// Number of committed keys.
    pub fn len(&self, id: NodeId) -> Result<usize> {
        Ok(self.node(id)?.entries.len())
    }

    pub fn is_empty(&self, id: NodeId) -> Result<bool> {
        Ok(self.node(id)?.entries.is_empty())
    }

    /// Committed keys and their slots, in insertion order.
    pub fn iter(&self, id: NodeId) -> Result<impl Iterator<Item = (&str, &Slot<P::Value>)>> {
        Ok(self
            .node(id)?
            .entries
            .iter()
            .map(|(k, v)| (k.as_str(), v)))
    }

    /// Compare the committed contents of two nodes, possibly from different trees.
    pub fn node_eq(&self, id: NodeId, other: &Tree<P>, other_id: NodeId) -> Result<bool>
    where
        P::Value: PartialEq,
    {
        let (a, b) = (self.node(id)?, other.node(other_id)?);
        if a.entries.len() != b.entries.len() {
            return Ok(false);
        }
        for (key, slot) in a.entries.iter() {
            let same = match (slot, b.entries.get(key)) {
                (Slot::Leaf(x), Some(Slot::Leaf(y))) => x == y,
                (Slot::Node(x), Some(Slot::Node(y))) => self.node_eq(*x, other, *y)?,
                _ => false,
            };
            if !same {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

impl<P: MapPolicy> PartialEq for Tree<P>
where
    P::Value: PartialEq,
{
    fn eq(&self, other: &Self) -> bool {
        self.node_eq(self.root, other, other.root).unwrap_or(false)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[derive(Clone, Debug, Default)]
    struct Anything;

    impl MapPolicy for Anything {
        type Value = i32;

        fn admit_write(&self, key: &str, value: &i32) -> Result<()> {
            if *value < 0 {
                Err(Error::Admission(format!("`{}` can't be negative", key)))
            } else {
                Ok(())
            }
        }
    }

    #[test]
    fn identity_survives_deep_write() {
        let mut tree = Tree::new(Anything);
        let root = tree.root();
        let a = tree.child(root, "a").unwrap();
        let x = tree.child(a, "b").unwrap();
        tree.set(x, "c", 1).unwrap();

        let a2 = tree.child(root, "a").unwrap();
        assert_eq!(a2, a);
        assert_eq!(tree.child(a2, "b").unwrap(), x);
        assert_eq!(tree.get(x, "c").unwrap(), Some(&Slot::Leaf(1)));
        assert!(tree.is_committed(a).unwrap());
        assert!(tree.is_committed(x).unwrap());
        assert_eq!(tree.len(root).unwrap(), 1);
        assert!(tree.is_modified());
    }

    #[test]
    fn pure_read_leaves_tree_empty() {
        let mut tree = Tree::new(Anything);
        let root = tree.root();
        let a = tree.child(root, "a").unwrap();
        let b = tree.child(a, "b").unwrap();
        let _c = tree.child(b, "c").unwrap();
        assert!(tree.is_empty(root).unwrap());
        assert_eq!(tree.iter(root).unwrap().count(), 0);
        assert_eq!(tree.get(root, "a").unwrap(), None);
        assert!(!tree.is_committed(a).unwrap());
        assert!(!tree.is_modified());
        assert_eq!(tree, Tree::new(Anything));
    }

    #[test]
    fn commit_only_up_to_committed_ancestor() {
        let mut tree = Tree::new(Anything);
        let root = tree.root();
        let a = tree.insert_node(root, "a").unwrap();
        let b = tree.child(a, "b").unwrap();
        let c = tree.child(b, "c").unwrap();
        let sibling = tree.child(a, "other").unwrap();
        tree.set(c, "x", 3).unwrap();
        let keys: Vec<&str> = tree.iter(a).unwrap().map(|(k, _)| k).collect();
        assert_eq!(keys, ["b"]);
        assert!(!tree.is_committed(sibling).unwrap());
    }

    #[test]
    fn explicit_write_discards_candidate() {
        let mut tree = Tree::new(Anything);
        let root = tree.root();
        let a = tree.child(root, "a").unwrap();
        let deeper = tree.child(a, "b").unwrap();
        tree.set(root, "a", 7).unwrap();
        assert!(!tree.is_live(a));
        assert!(!tree.is_live(deeper));
        assert!(matches!(tree.set(a, "z", 1), Err(Error::Usage(_))));
        assert_eq!(tree.get(root, "a").unwrap(), Some(&Slot::Leaf(7)));
        assert!(tree.child(root, "a").is_err());
    }

    #[test]
    fn rejected_write_commits_nothing() {
        let mut tree = Tree::new(Anything);
        let root = tree.root();
        let a = tree.child(root, "a").unwrap();
        assert!(tree.set(a, "x", -1).is_err());
        assert!(tree.is_empty(root).unwrap());
        assert!(!tree.is_committed(a).unwrap());
    }

    #[test]
    fn removing_node_frees_subtree() {
        let mut tree = Tree::new(Anything);
        let root = tree.root();
        let a = tree.child(root, "a").unwrap();
        let b = tree.child(a, "b").unwrap();
        tree.set(b, "x", 1).unwrap();
        let pending = tree.child(b, "pending").unwrap();
        assert_eq!(tree.remove(root, "a").unwrap(), None);
        for id in [a, b, pending] {
            assert!(!tree.is_live(id));
        }
        assert!(tree.is_empty(root).unwrap());

        // Freed cells are reused under a new generation.
        let fresh = tree.child(root, "new").unwrap();
        assert!(tree.is_live(fresh));
        assert!(!tree.is_live(a));
    }

    #[test]
    fn candidate_equality_ignored() {
        let mut left = Tree::new(Anything);
        let mut right = Tree::new(Anything);
        left.set(left.root(), "k", 1).unwrap();
        right.set(right.root(), "k", 1).unwrap();
        let _ = right.child(right.root(), "ghost").unwrap();
        assert_eq!(left, right);
        let n = right.child(right.root(), "ghost").unwrap();
        right.set(n, "boo", 2).unwrap();
        assert_ne!(left, right);
    }
}

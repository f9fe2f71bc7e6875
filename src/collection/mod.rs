//! Restricted collections.
//!
//! Every structural container is built from one of these. A collection wraps its storage together
//! with a policy: the policy decides which keys may be read, which values may be written or
//! deleted, how a raw value is coerced into the stored form, and what happens after a successful
//! mutation. The collection itself tracks whether it has been modified since it was built.
//!
//! - [`RestrictedList`] - an ordered sequence governed by a [`ListPolicy`].
//! - [`RestrictedMap`] - an insertion-ordered string-keyed map governed by a [`MapPolicy`].
//! - [`lazy::Tree`] - an auto-vivifying map tree, where reading an absent key hands back an
//!     uncommitted child that only becomes part of the tree once something is written under it.

pub mod lazy;
mod list;
mod map;

pub use self::list::*;
pub use self::map::*;

//! A lossless codec for the KRDS reader-state container format.
//!
//! KRDS files persist a reader's state (last position read, annotations, reading timers, font
//! preferences, and so on) as a flat sequence of named, typed objects. The format has no public
//! definition, so it's decoded by schema: each object name is looked up in a [`Registry`] to get
//! the [`Spec`] that describes its layout, and the spec drives the decode.
//!
//! Decoding and re-encoding reproduces the input byte for byte, including the quirks the format
//! allows: two different encodings of the empty string, optional record fields that are present
//! as a prefix of their declared order, and alternate layouts of the same object told apart by
//! their leading tag.
//!
//! The pieces, leaves first:
//!
//! - [`Cursor`] - a byte buffer with tag-checked primitive codecs and checkpoints for
//!     speculative parsing.
//! - [`Primitive`] and [`Kind`] - the nine self-tagged scalar kinds.
//! - [`collection`] - restricted lists and maps that every structural value is built on, plus an
//!     auto-vivifying map tree.
//! - [`spec`] - schema descriptors and the structural value kinds: [`Record`][spec::Record],
//!     [`Array`][spec::Array], [`IntMap`][spec::IntMap], [`DynamicMap`][spec::DynamicMap], and
//!     [`Object`][spec::Object].
//! - [`Registry`] - the name to spec table.
//! - [`Container`] - the file itself.
//!
//! # Example
//!
//! ```
//! # use krds_pack::*;
//! # use krds_pack::spec::*;
//! # fn main() -> krds_pack::Result<()> {
//! let registry = Registry::new()
//!     .add("sync_lpr", Spec::basic(Kind::Bool))
//!     .add("erl", Spec::position());
//!
//! let mut file = Container::new();
//! file.insert("sync_lpr", Value::from(true), &registry)?;
//! file.insert("erl", Value::from("AdIEAAAuFgAA:5050"), &registry)?;
//! let bytes = file.encode()?;
//!
//! let decoded = Container::decode(&bytes, &registry)?;
//! let erl = decoded.get("erl").and_then(Value::as_position).unwrap();
//! assert_eq!(erl.chunk_eid(), Some(1234));
//! assert_eq!(decoded.encode()?, bytes);
//! # Ok(())
//! # }
//! ```

pub mod collection;
mod container;
mod cursor;
pub mod error;
mod marker;
mod position;
mod primitive;
mod registry;
pub mod spec;
mod value;

pub use self::container::Container;
pub use self::cursor::Cursor;
pub use self::error::{Error, Result};
pub use self::marker::{Kind, FILE_CONSTANT, MAGIC, OBJECT_BEGIN, OBJECT_END};
pub use self::position::{ChunkOffset, ParsePositionError, Position};
pub use self::primitive::{peek_basic_kind, KStr, Primitive};
pub use self::registry::{Registry, SchemaLookup};
pub use self::spec::{DecodeContext, Spec, Structure};
pub use self::value::Value;

/// The largest file [`Container::decode`] will accept, 16 MiB. Real files are a few megabytes at
/// most.
pub const MAX_FILE_SIZE: usize = 1usize << 24; // 16 MiB

/// The deepest structural values may nest while decoding.
pub const MAX_DEPTH: usize = 64;

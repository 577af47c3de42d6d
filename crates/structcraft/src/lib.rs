//! # structcraft
//!
//! Declarative descriptions of binary structures, loaded lazily from
//! seekable data sources and written back after modification.
//!
//! Byte-level layouts (blocks, integers, structs, arrays, unions, pointers)
//! are described with [Type] values and instantiated into a [Tree]. Fields
//! whose layout depends on data already parsed use computed descriptors.
//! Bit-level layouts are described with [BitType] and embedded in the byte
//! model as partials.
//!
//! ## Example
//!
//! ```
//! use structcraft::{
//!     BitField, Builder, ByteOrder, BytesSource, Field, Tree, bit_struct, dynamic,
//! };
//!
//! let be = Builder::new(ByteOrder::BigEndian);
//! let header = bit_struct("header", [BitField::new("kind", 4), BitField::new("flags", 4)]);
//! let record = dynamic::structure(
//!     "record",
//!     [
//!         Field::new("header", be.partial(header)),
//!         Field::new("length", be.uint8()),
//!         Field::computed("data", |ctx| Ok((ctx.uint("length")? as usize).into())),
//!     ],
//! );
//!
//! let mut tree = Tree::new();
//! let id = tree.instantiate(record, BytesSource::new(b"\x21\x03abc".to_vec()).shared());
//! tree.load(id).unwrap();
//!
//! let node = tree.get(id).unwrap();
//! let header = node.field("header").unwrap().bits().unwrap();
//! assert_eq!(header.field("kind").unwrap().uint().unwrap(), 2);
//! assert_eq!(node.field("data").unwrap().bytes().unwrap(), b"abc");
//! assert_eq!(tree.serialize(id).unwrap(), b"\x21\x03abc");
//! ```

pub mod binary;
pub mod bits;
pub mod config;
pub mod dynamic;
pub mod errors;
pub mod field;
pub mod node;
pub mod order;
pub mod render;
#[cfg(feature = "serde")]
pub mod serde;
pub mod source;
pub mod tree;
pub mod types;

pub use binary::{
    BitContext, BitDescriptor, BitField, BitKind, BitNode, BitType, Step, bit_array, bit_block,
    bit_struct, bit_terminated, bit_terminated_max, flags,
};
pub use bits::{BitConsumer, BitWriter, Bitmap};
pub use config::Config;
pub use dynamic::Builder;
pub use errors::{Error, Result, SourceError};
pub use field::{Context, Descriptor, Field};
pub use node::{LoadState, NodeId, NodeRef, Outcome};
pub use order::ByteOrder;
pub use source::{BytesSource, FileSource, ScratchSource, Source, SourceRef};
pub use tree::Tree;
pub use types::{Addressing, IntType, Type};

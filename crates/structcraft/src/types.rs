//! Concrete types of the byte model.
//!
//! A [Type] is a plain value describing how a node is laid out. Types that
//! depend on already-parsed data are expressed through
//! [crate::field::Descriptor::Computed] and resolve into one of these.

use std::{fmt, rc::Rc};

use crate::{
    binary::BitType,
    bits::sign_extend,
    errors::{Error, Result},
    field::{Descriptor, Field},
    node::NodeRef,
    order::ByteOrder,
};

/// Integer leaf: `size` bytes in a fixed byte order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct IntType {
    size: usize,
    signed: bool,
    order: ByteOrder,
}

impl IntType {
    /// Widest supported integer, in bytes.
    pub const MAX_SIZE: usize = 16;

    pub fn new(size: usize, signed: bool, order: ByteOrder) -> Result<Self> {
        if size == 0 || size > Self::MAX_SIZE {
            return Err(Error::invalid(
                "integer",
                format!("size {} is outside 1..={}", size, Self::MAX_SIZE),
            ));
        }
        Ok(IntType {
            size,
            signed,
            order,
        })
    }

    pub fn unsigned(size: usize, order: ByteOrder) -> Result<Self> {
        Self::new(size, false, order)
    }

    pub fn signed(size: usize, order: ByteOrder) -> Result<Self> {
        Self::new(size, true, order)
    }

    /// Constructor for sizes known to be valid.
    pub(crate) const fn fixed(size: usize, signed: bool, order: ByteOrder) -> Self {
        IntType {
            size,
            signed,
            order,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_signed(&self) -> bool {
        self.signed
    }

    pub fn order(&self) -> ByteOrder {
        self.order
    }

    /// Raw unsigned value of `bytes`.
    pub fn decode_unsigned(&self, bytes: &[u8]) -> u128 {
        self.order.decode(bytes)
    }

    /// Value of `bytes`, sign-extended when the type is signed.
    pub fn decode(&self, bytes: &[u8]) -> i128 {
        let raw = self.decode_unsigned(bytes);
        let bits = (8 * bytes.len().min(Self::MAX_SIZE)) as u32;
        if self.signed {
            sign_extend(raw, bits)
        } else {
            raw as i128
        }
    }

    pub fn encode(&self, value: u128) -> Vec<u8> {
        self.order.encode(value, self.size)
    }

    pub fn label(&self) -> String {
        let sign = if self.signed { "" } else { "u" };
        let suffix = match self.order {
            ByteOrder::BigEndian => "be",
            ByteOrder::LittleEndian => "le",
        };
        format!("{}int{}_{}", sign, self.size * 8, suffix)
    }
}

/// Predicate deciding whether the latest element ends a terminated array.
#[derive(Clone)]
pub struct Terminator(Rc<dyn Fn(NodeRef<'_>) -> bool>);

impl Terminator {
    pub fn new(predicate: impl Fn(NodeRef<'_>) -> bool + 'static) -> Self {
        Terminator(Rc::new(predicate))
    }

    pub(crate) fn is_terminator(&self, node: NodeRef<'_>) -> bool {
        (self.0)(node)
    }
}

impl fmt::Debug for Terminator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Terminator(..)")
    }
}

/// Chooses the ancestor a relative pointer is measured from.
pub type BaseSelector = Rc<dyn for<'t> Fn(NodeRef<'t>) -> NodeRef<'t>>;

/// Computes the base offset of an offset pointer.
pub type BaseOffset = Rc<dyn Fn(NodeRef<'_>) -> u64>;

/// How a pointer turns its raw address into a target offset.
#[derive(Clone, Default)]
pub enum Addressing {
    /// The raw value is the offset.
    #[default]
    Absolute,
    /// Raw value plus the offset of an ancestor. Defaults to the outermost.
    Relative(Option<BaseSelector>),
    /// Raw value plus a computed base. Defaults to the pointer's own offset.
    Offset(Option<BaseOffset>),
}

impl Addressing {
    /// Base offset for a pointer node.
    pub(crate) fn base(&self, pointer: NodeRef<'_>) -> u64 {
        match self {
            Addressing::Absolute => 0,
            Addressing::Relative(Some(select)) => select(pointer).offset(),
            Addressing::Relative(None) => pointer.ancestors().last().unwrap_or(pointer).offset(),
            Addressing::Offset(Some(compute)) => compute(pointer),
            Addressing::Offset(None) => pointer.offset(),
        }
    }

    fn prefix(&self) -> &'static str {
        match self {
            Addressing::Absolute => "pointer",
            Addressing::Relative(_) => "rpointer",
            Addressing::Offset(_) => "opointer",
        }
    }
}

impl fmt::Debug for Addressing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Addressing::Absolute => f.write_str("Absolute"),
            Addressing::Relative(select) => {
                write!(f, "Relative({})", if select.is_some() { ".." } else { "outermost" })
            }
            Addressing::Offset(compute) => {
                write!(f, "Offset({})", if compute.is_some() { ".." } else { "self" })
            }
        }
    }
}

/// A fully resolved byte-model type.
#[derive(Debug, Clone)]
pub enum Type {
    /// Opaque run of bytes.
    Block { size: usize },
    /// Integer leaf.
    Int(IntType),
    /// Padding that brings the next sibling to a multiple of `alignment`.
    Align { alignment: usize },
    /// `inner` occupying at least `block_size` bytes.
    Padded { inner: Box<Type>, block_size: usize },
    /// Named fields loaded in declaration order.
    Struct { name: String, fields: Rc<[Field]> },
    /// Fixed number of elements.
    Array { element: Rc<Descriptor>, count: usize },
    /// Elements until the terminator matches, data runs out, or `limit` is hit.
    Terminated {
        element: Rc<Descriptor>,
        terminator: Terminator,
        limit: Option<usize>,
    },
    /// Elements until `size` bytes are used.
    BlockArray { element: Rc<Descriptor>, size: usize },
    /// Views aliasing one backing root.
    Union {
        root: Option<Box<Type>>,
        views: Rc<[Field]>,
    },
    /// An address field bound to a target type.
    Pointer {
        target: Rc<Descriptor>,
        address: IntType,
        addressing: Addressing,
    },
    /// A bit-granularity type embedded in whole bytes.
    Partial { object: BitType, order: ByteOrder },
}

impl Type {
    /// Short human-readable name used in paths and summaries.
    pub fn label(&self) -> String {
        match self {
            Type::Block { size } => format!("block({})", size),
            Type::Int(int) => int.label(),
            Type::Align { alignment } => format!("align({})", alignment),
            Type::Padded { inner, block_size } => format!("{}+pad({})", inner.label(), block_size),
            Type::Struct { name, .. } => name.clone(),
            Type::Array { element, count } => format!("array({},{})", element.label(), count),
            Type::Terminated { element, .. } => format!("terminated({})", element.label()),
            Type::BlockArray { element, size } => {
                format!("blockarray({},{})", element.label(), size)
            }
            Type::Union { .. } => "union".to_string(),
            Type::Pointer {
                target, addressing, ..
            } => format!("{}({})", addressing.prefix(), target.label()),
            Type::Partial { object, order } => {
                let prefix = match order {
                    ByteOrder::BigEndian => "be",
                    ByteOrder::LittleEndian => "le",
                };
                format!("{}({})", prefix, object.label())
            }
        }
    }

    /// True for types whose nodes hold child nodes.
    pub fn is_container(&self) -> bool {
        match self {
            Type::Struct { .. }
            | Type::Array { .. }
            | Type::Terminated { .. }
            | Type::BlockArray { .. }
            | Type::Union { .. } => true,
            Type::Padded { inner, .. } => inner.is_container(),
            _ => false,
        }
    }

    /// Strips [Type::Padded] wrappers, returning the inner type and the
    /// largest declared block size.
    pub(crate) fn unpad(self) -> (Type, Option<u64>) {
        let mut declared: Option<u64> = None;
        let mut ty = self;
        while let Type::Padded { inner, block_size } = ty {
            declared = Some(declared.unwrap_or(0).max(block_size as u64));
            ty = *inner;
        }
        (ty, declared)
    }
}

/// Bytes needed after `offset` to reach a multiple of `alignment`.
pub(crate) fn padding_for(offset: u64, alignment: usize) -> u64 {
    let alignment = alignment as u64;
    if alignment == 0 {
        return 0;
    }
    (alignment - offset % alignment) % alignment
}

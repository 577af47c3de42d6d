//! Constructors for byte-model types.
//!
//! Sizes and counts are taken as `i64` so that values computed from parsed
//! data can be passed straight through; negative values are rejected with
//! [Error::InvalidArgument] rather than clamped.

use std::rc::Rc;

use crate::{
    binary::BitType,
    config::Config,
    errors::{Error, Result},
    field::{Descriptor, Field},
    node::NodeRef,
    order::ByteOrder,
    types::{Addressing, IntType, Terminator, Type},
};

fn non_negative(constructor: &'static str, what: &str, value: i64) -> Result<usize> {
    usize::try_from(value)
        .map_err(|_| Error::invalid(constructor, format!("{} must not be negative, got {}", what, value)))
}

/// Opaque run of `size` bytes.
pub fn block(size: i64) -> Result<Type> {
    Ok(Type::Block {
        size: non_negative("block", "size", size)?,
    })
}

/// `count` elements of `element`.
pub fn array(element: impl Into<Descriptor>, count: i64) -> Result<Type> {
    Ok(Type::Array {
        element: Rc::new(element.into()),
        count: non_negative("array", "count", count)?,
    })
}

/// Padding up to the next multiple of `alignment`, measured from the offset
/// the field lands on.
pub fn align(alignment: i64) -> Result<Type> {
    if alignment <= 0 {
        return Err(Error::invalid(
            "align",
            format!("alignment must be positive, got {}", alignment),
        ));
    }
    Ok(Type::Align {
        alignment: alignment as usize,
    })
}

/// `inner` occupying at least `block_size` bytes.
pub fn padded(inner: Type, block_size: i64) -> Result<Type> {
    Ok(Type::Padded {
        inner: Box::new(inner),
        block_size: non_negative("padded", "block size", block_size)?,
    })
}

/// Elements until `terminator` accepts one (which is kept) or data runs out.
pub fn terminated_array(
    element: impl Into<Descriptor>,
    terminator: impl Fn(NodeRef<'_>) -> bool + 'static,
) -> Type {
    Type::Terminated {
        element: Rc::new(element.into()),
        terminator: Terminator::new(terminator),
        limit: None,
    }
}

/// Like [terminated_array], but never more than `limit` elements.
pub fn bounded_terminated_array(
    element: impl Into<Descriptor>,
    terminator: impl Fn(NodeRef<'_>) -> bool + 'static,
    limit: i64,
) -> Result<Type> {
    Ok(Type::Terminated {
        element: Rc::new(element.into()),
        terminator: Terminator::new(terminator),
        limit: Some(non_negative("terminated array", "limit", limit)?),
    })
}

/// Elements until `size` bytes are used.
pub fn block_array(element: impl Into<Descriptor>, size: i64) -> Result<Type> {
    Ok(Type::BlockArray {
        element: Rc::new(element.into()),
        size: non_negative("block array", "size", size)?,
    })
}

pub fn structure(name: impl Into<String>, fields: impl IntoIterator<Item = Field>) -> Type {
    Type::Struct {
        name: name.into(),
        fields: fields.into_iter().collect(),
    }
}

/// Views over a block as large as the largest of them.
pub fn union(views: impl IntoIterator<Item = Field>) -> Type {
    Type::Union {
        root: None,
        views: views.into_iter().collect(),
    }
}

/// Views over an explicit root type.
pub fn union_with_root(root: Type, views: impl IntoIterator<Item = Field>) -> Type {
    Type::Union {
        root: Some(Box::new(root)),
        views: views.into_iter().collect(),
    }
}

fn pointer_type(target: impl Into<Descriptor>, address: IntType, addressing: Addressing) -> Type {
    Type::Pointer {
        target: Rc::new(target.into()),
        address,
        addressing,
    }
}

/// The address is an absolute offset into the pointer's source.
pub fn pointer(target: impl Into<Descriptor>, address: IntType) -> Type {
    pointer_type(target, address, Addressing::Absolute)
}

/// The address is relative to the outermost ancestor.
pub fn relative_pointer(target: impl Into<Descriptor>, address: IntType) -> Type {
    pointer_type(target, address, Addressing::Relative(None))
}

/// The address is relative to the node `selector` picks from the pointer.
pub fn relative_pointer_to(
    target: impl Into<Descriptor>,
    address: IntType,
    selector: impl for<'t> Fn(NodeRef<'t>) -> NodeRef<'t> + 'static,
) -> Type {
    pointer_type(target, address, Addressing::Relative(Some(Rc::new(selector))))
}

/// The address is relative to the pointer's own offset.
pub fn offset_pointer(target: impl Into<Descriptor>, address: IntType) -> Type {
    pointer_type(target, address, Addressing::Offset(None))
}

/// The address is relative to a base computed from the pointer node.
pub fn offset_pointer_from(
    target: impl Into<Descriptor>,
    address: IntType,
    base: impl Fn(NodeRef<'_>) -> u64 + 'static,
) -> Type {
    pointer_type(target, address, Addressing::Offset(Some(Rc::new(base))))
}

/// Produces integers, pointers and partials in one byte order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Builder {
    order: ByteOrder,
}

impl Builder {
    pub const fn new(order: ByteOrder) -> Self {
        Builder { order }
    }

    pub fn from_config(config: &Config) -> Self {
        Builder::new(config.byte_order)
    }

    pub fn order(&self) -> ByteOrder {
        self.order
    }

    /// Address field of `size` bytes.
    pub fn address(&self, size: i64) -> Result<IntType> {
        IntType::unsigned(non_negative("integer", "size", size)?, self.order)
    }

    pub fn uint(&self, size: i64) -> Result<Type> {
        Ok(Type::Int(self.address(size)?))
    }

    pub fn int(&self, size: i64) -> Result<Type> {
        let size = non_negative("integer", "size", size)?;
        Ok(Type::Int(IntType::signed(size, self.order)?))
    }

    pub fn uint8(&self) -> Type {
        Type::Int(IntType::fixed(1, false, self.order))
    }

    pub fn uint16(&self) -> Type {
        Type::Int(IntType::fixed(2, false, self.order))
    }

    pub fn uint32(&self) -> Type {
        Type::Int(IntType::fixed(4, false, self.order))
    }

    pub fn uint64(&self) -> Type {
        Type::Int(IntType::fixed(8, false, self.order))
    }

    /// Absolute pointer with a `size`-byte address.
    pub fn pointer(&self, target: impl Into<Descriptor>, size: i64) -> Result<Type> {
        Ok(pointer(target, self.address(size)?))
    }

    pub fn relative_pointer(&self, target: impl Into<Descriptor>, size: i64) -> Result<Type> {
        Ok(relative_pointer(target, self.address(size)?))
    }

    pub fn offset_pointer(&self, target: impl Into<Descriptor>, size: i64) -> Result<Type> {
        Ok(offset_pointer(target, self.address(size)?))
    }

    /// Embeds a bit type in whole bytes.
    pub fn partial(&self, object: BitType) -> Type {
        tracing::debug!(object = %object.label(), order = %self.order, "partial");
        Type::Partial {
            object,
            order: self.order,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binary::{BitField, bit_struct};

    #[test]
    fn test_negative_arguments_rejected() {
        let be = Builder::new(ByteOrder::BigEndian);
        assert!(matches!(block(-1), Err(Error::InvalidArgument { constructor: "block", .. })));
        assert!(matches!(array(be.uint8(), -3), Err(Error::InvalidArgument { .. })));
        assert!(matches!(padded(be.uint8(), -3), Err(Error::InvalidArgument { .. })));
        assert!(matches!(block_array(be.uint8(), -3), Err(Error::InvalidArgument { .. })));
        assert!(bounded_terminated_array(be.uint8(), |_| true, -1).is_err());
        assert!(be.uint(-4).is_err());
        assert!(be.pointer(be.uint8(), 0).is_err());
    }

    #[test]
    fn test_align_rejects_non_positive() {
        assert!(align(0).is_err());
        assert!(align(-8).is_err());
        assert!(matches!(align(3).unwrap(), Type::Align { alignment: 3 }));
    }

    #[test]
    fn test_builder_orders() {
        let le = Builder::new(ByteOrder::LittleEndian);
        let Type::Int(int) = le.uint32() else {
            panic!("expected an integer");
        };
        assert_eq!(int.order(), ByteOrder::LittleEndian);
        assert_eq!(int.size(), 4);
        assert!(!int.is_signed());

        let Type::Int(int) = le.int(2).unwrap() else {
            panic!("expected an integer");
        };
        assert!(int.is_signed());

        let mut config = Config::default();
        config.set_byte_order(ByteOrder::LittleEndian);
        assert_eq!(Builder::from_config(&config).order(), ByteOrder::LittleEndian);
        assert_eq!(Builder::default().order(), ByteOrder::BigEndian);
    }

    #[test]
    fn test_pointer_address_order_is_independent() {
        let le = Builder::new(ByteOrder::LittleEndian);
        let be = Builder::new(ByteOrder::BigEndian);
        let Type::Pointer { address, target, .. } = le.pointer(be.uint32(), 8).unwrap() else {
            panic!("expected a pointer");
        };
        assert_eq!(address.order(), ByteOrder::LittleEndian);
        assert_eq!(address.size(), 8);
        assert_eq!(target.label(), "uint32_be");
    }

    #[test]
    fn test_labels() {
        let be = Builder::new(ByteOrder::BigEndian);
        assert_eq!(array(be.uint16(), 3).unwrap().label(), "array(uint16_be,3)");
        assert_eq!(relative_pointer(4usize, be.address(2).unwrap()).label(), "rpointer(block(4))");
        assert_eq!(offset_pointer(4usize, be.address(2).unwrap()).label(), "opointer(block(4))");

        let header = bit_struct("header", [BitField::new("a", 4), BitField::new("b", 4)]);
        assert_eq!(be.partial(header).label(), "be(header)");
    }
}

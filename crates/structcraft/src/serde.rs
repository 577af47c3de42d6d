//! JSON-deserializable type descriptions.
//!
//! These types describe static layouts (no computed fields) so that they can
//! be shipped as data, for example a schema file next to an application,
//! and then converted into [Type] values.

use serde::{Deserialize, Serialize};

use crate::{
    binary::{BitField, BitType, bit_array, bit_struct, flags},
    dynamic,
    errors::{Error, Result},
    field::Field,
    order::ByteOrder,
    types::{IntType, Type},
};

/// Byte-model layout.
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TypeDef {
    Block {
        size: i64,
    },
    Int {
        size: i64,
        #[serde(default)]
        signed: bool,
        #[serde(default)]
        order: ByteOrder,
    },
    Struct {
        name: String,
        fields: Vec<FieldDef>,
    },
    Array {
        element: Box<TypeDef>,
        count: i64,
    },
    Align {
        alignment: i64,
    },
    Padded {
        inner: Box<TypeDef>,
        block_size: i64,
    },
    Union {
        /// Explicit backing type; defaults to a block as large as the largest view.
        #[serde(default)]
        root: Option<Box<TypeDef>>,
        views: Vec<FieldDef>,
    },
    Pointer {
        target: Box<TypeDef>,
        address: AddressDef,
        #[serde(default)]
        addressing: AddressingDef,
    },
    Partial {
        object: BitTypeDef,
        #[serde(default)]
        order: ByteOrder,
    },
}

/// A named entry of a struct or union.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct FieldDef {
    pub name: String,
    pub layout: TypeDef,
}

/// Integer that stores a pointer's address.
#[derive(Debug, Deserialize, Serialize, Clone, Copy)]
pub struct AddressDef {
    pub size: i64,
    #[serde(default)]
    pub order: ByteOrder,
}

/// What a pointer's address is measured from.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, Default)]
#[serde(rename_all = "snake_case")]
pub enum AddressingDef {
    #[default]
    Absolute,
    /// Outermost ancestor.
    Relative,
    /// The pointer itself.
    Offset,
}

/// Bit-model layout.
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BitTypeDef {
    /// Negative widths are signed.
    Int { width: i32 },
    Struct { name: String, fields: Vec<BitFieldDef> },
    Flags { name: String, fields: Vec<BitFieldDef> },
    Array { element: Box<BitTypeDef>, count: i64 },
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct BitFieldDef {
    pub name: String,
    pub layout: BitTypeDef,
}

fn size(constructor: &'static str, value: i64) -> Result<usize> {
    usize::try_from(value)
        .map_err(|_| Error::invalid(constructor, format!("size must not be negative, got {}", value)))
}

impl TryFrom<TypeDef> for Type {
    type Error = Error;

    fn try_from(def: TypeDef) -> Result<Type> {
        match def {
            TypeDef::Block { size } => dynamic::block(size),
            TypeDef::Int {
                size: bytes,
                signed,
                order,
            } => Ok(Type::Int(IntType::new(size("integer", bytes)?, signed, order)?)),
            TypeDef::Struct { name, fields } => {
                let fields = fields.into_iter().map(Field::try_from).collect::<Result<Vec<_>>>()?;
                Ok(dynamic::structure(name, fields))
            }
            TypeDef::Array { element, count } => dynamic::array(Type::try_from(*element)?, count),
            TypeDef::Align { alignment } => dynamic::align(alignment),
            TypeDef::Padded { inner, block_size } => {
                dynamic::padded(Type::try_from(*inner)?, block_size)
            }
            TypeDef::Union { root, views } => {
                let views = views.into_iter().map(Field::try_from).collect::<Result<Vec<_>>>()?;
                match root {
                    Some(root) => Ok(dynamic::union_with_root(Type::try_from(*root)?, views)),
                    None => Ok(dynamic::union(views)),
                }
            }
            TypeDef::Pointer {
                target,
                address,
                addressing,
            } => {
                let target = Type::try_from(*target)?;
                let address = IntType::unsigned(size("pointer", address.size)?, address.order)?;
                Ok(match addressing {
                    AddressingDef::Absolute => dynamic::pointer(target, address),
                    AddressingDef::Relative => dynamic::relative_pointer(target, address),
                    AddressingDef::Offset => dynamic::offset_pointer(target, address),
                })
            }
            TypeDef::Partial { object, order } => Ok(Type::Partial {
                object: BitType::try_from(object)?,
                order,
            }),
        }
    }
}

impl TryFrom<FieldDef> for Field {
    type Error = Error;

    fn try_from(def: FieldDef) -> Result<Field> {
        if def.name.trim().is_empty() {
            return Err(Error::invalid("field", "field names must not be empty"));
        }
        Ok(Field::new(def.name, Type::try_from(def.layout)?))
    }
}

impl TryFrom<BitTypeDef> for BitType {
    type Error = Error;

    fn try_from(def: BitTypeDef) -> Result<BitType> {
        match def {
            BitTypeDef::Int { width } => BitType::int(width),
            BitTypeDef::Struct { name, fields } => Ok(bit_struct(name, bit_fields(fields)?)),
            BitTypeDef::Flags { name, fields } => Ok(flags(name, bit_fields(fields)?)),
            BitTypeDef::Array { element, count } => bit_array(BitType::try_from(*element)?, count),
        }
    }
}

fn bit_fields(defs: Vec<BitFieldDef>) -> Result<Vec<BitField>> {
    defs.into_iter()
        .map(|def| Ok(BitField::new(def.name, BitType::try_from(def.layout)?)))
        .collect()
}

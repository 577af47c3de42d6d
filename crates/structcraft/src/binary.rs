//! Bit-granularity types and the values parsed from them.
//!
//! Bit types never touch a data source directly. They consume a
//! [BitConsumer]; the [crate::Type::Partial] adapter decides where the bits
//! come from and in which byte order.
//!
//! Running out of bits is not an error here. Parsing returns [Step::Exhausted]
//! carrying whatever was read, and the caller decides what that means.

use std::{fmt, rc::Rc};

use crate::{
    bits::{BitConsumer, BitWriter, Bitmap, mask},
    config::DEFAULT_RESOLVE_DEPTH,
    errors::{Error, Result},
};

/// Widest integer leaf a bit structure may declare.
pub const MAX_LEAF_WIDTH: u32 = 64;

/// Longest run of zero bits used to size a type.
const MEASURE_LIMIT: u64 = 1 << 16;

/// Closure computing a bit descriptor from already consumed siblings.
#[derive(Clone)]
pub struct BitCompute(Rc<dyn Fn(&BitContext<'_>) -> Result<BitDescriptor>>);

impl fmt::Debug for BitCompute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BitCompute(..)")
    }
}

/// Predicate over the latest element of a terminated bit array.
#[derive(Clone)]
pub struct BitTerminator(Rc<dyn Fn(&BitNode) -> bool>);

impl BitTerminator {
    pub fn new(predicate: impl Fn(&BitNode) -> bool + 'static) -> Self {
        BitTerminator(Rc::new(predicate))
    }
}

impl fmt::Debug for BitTerminator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BitTerminator(..)")
    }
}

/// Descriptor of a bit field: a type, a width, or a computed value.
#[derive(Debug, Clone)]
pub enum BitDescriptor {
    Type(BitType),
    /// Integer of `|width|` bits; negative widths are two's-complement signed.
    Width(i32),
    Computed(BitCompute),
}

impl BitDescriptor {
    pub fn computed(compute: impl Fn(&BitContext<'_>) -> Result<BitDescriptor> + 'static) -> Self {
        BitDescriptor::Computed(BitCompute(Rc::new(compute)))
    }

    /// Follows computed descriptors for at most `depth` steps.
    pub fn resolve(&self, field: &str, ctx: &BitContext<'_>, depth: usize) -> Result<BitType> {
        let mut current = match self {
            BitDescriptor::Type(ty) => return Ok(ty.clone()),
            BitDescriptor::Width(width) => return BitType::int(*width),
            BitDescriptor::Computed(compute) => (compute.0)(ctx)?,
        };

        for _ in 1..depth {
            current = match current {
                BitDescriptor::Type(ty) => return Ok(ty),
                BitDescriptor::Width(width) => return BitType::int(width),
                BitDescriptor::Computed(compute) => (compute.0)(ctx)?,
            };
        }

        match current {
            BitDescriptor::Type(ty) => Ok(ty),
            BitDescriptor::Width(width) => BitType::int(width),
            BitDescriptor::Computed(_) => Err(Error::resolution(
                field,
                format!("no concrete bit type after {} computed steps", depth),
            )),
        }
    }

    pub fn label(&self) -> String {
        match self {
            BitDescriptor::Type(ty) => ty.label(),
            BitDescriptor::Width(width) => int_label(width.unsigned_abs(), *width < 0),
            BitDescriptor::Computed(_) => "?".to_string(),
        }
    }
}

impl From<BitType> for BitDescriptor {
    fn from(value: BitType) -> Self {
        BitDescriptor::Type(value)
    }
}

impl From<i32> for BitDescriptor {
    fn from(value: i32) -> Self {
        BitDescriptor::Width(value)
    }
}

/// A named entry of a bit structure.
#[derive(Debug, Clone)]
pub struct BitField {
    pub name: String,
    pub descriptor: BitDescriptor,
}

impl BitField {
    pub fn new(name: impl Into<String>, descriptor: impl Into<BitDescriptor>) -> Self {
        BitField {
            name: name.into(),
            descriptor: descriptor.into(),
        }
    }

    pub fn computed(
        name: impl Into<String>,
        compute: impl Fn(&BitContext<'_>) -> Result<BitDescriptor> + 'static,
    ) -> Self {
        BitField::new(name, BitDescriptor::computed(compute))
    }
}

/// What a computed bit descriptor can see.
#[derive(Debug, Clone, Copy)]
pub struct BitContext<'a> {
    siblings: &'a [BitNode],
    bits: u64,
}

impl<'a> BitContext<'a> {
    pub fn new(siblings: &'a [BitNode], bits: u64) -> Self {
        BitContext { siblings, bits }
    }

    /// Bits consumed by the enclosing container so far.
    pub fn bits(&self) -> u64 {
        self.bits
    }

    /// Number of siblings already consumed.
    pub fn len(&self) -> usize {
        self.siblings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.siblings.is_empty()
    }

    pub fn last(&self) -> Option<&'a BitNode> {
        self.siblings.last()
    }

    pub fn field(&self, name: &str) -> Result<&'a BitNode> {
        self.siblings
            .iter()
            .find(|node| node.name == name)
            .ok_or_else(|| Error::UnknownField {
                path: String::new(),
                name: name.to_string(),
            })
    }

    pub fn uint(&self, name: &str) -> Result<u128> {
        self.field(name)?.uint()
    }

    pub fn int(&self, name: &str) -> Result<i128> {
        self.field(name)?.int()
    }
}

/// A resolved bit-granularity type.
#[derive(Debug, Clone)]
pub enum BitType {
    Int {
        width: u32,
        signed: bool,
    },
    /// Named fields consumed in declaration order. `flags` only changes rendering.
    Struct {
        name: String,
        fields: Rc<[BitField]>,
        flags: bool,
    },
    Array {
        element: Rc<BitDescriptor>,
        count: usize,
    },
    /// Elements until the terminator matches, bits run out, or `limit` is hit.
    Terminated {
        element: Rc<BitDescriptor>,
        terminator: BitTerminator,
        limit: Option<usize>,
    },
    /// Elements until `bits` bits are used.
    Block {
        element: Rc<BitDescriptor>,
        bits: u64,
    },
}

fn int_label(width: u32, signed: bool) -> String {
    if signed {
        format!("signed<{}>", width)
    } else {
        format!("unsigned<{}>", width)
    }
}

impl BitType {
    /// Integer of `|width|` bits, signed when `width` is negative.
    pub fn int(width: i32) -> Result<BitType> {
        let bits = width.unsigned_abs();
        if bits > MAX_LEAF_WIDTH {
            return Err(Error::invalid(
                "bit field",
                format!("width {} exceeds {} bits", width, MAX_LEAF_WIDTH),
            ));
        }
        Ok(BitType::Int {
            width: bits,
            signed: width < 0,
        })
    }

    pub fn label(&self) -> String {
        match self {
            BitType::Int { width, signed } => int_label(*width, *signed),
            BitType::Struct { name, .. } => name.clone(),
            BitType::Array { element, count } => format!("array({},{})", element.label(), count),
            BitType::Terminated { element, .. } => format!("terminated({})", element.label()),
            BitType::Block { element, bits } => format!("blockarray({},{})", element.label(), bits),
        }
    }

    /// Parses this type from `consumer`.
    pub fn parse(&self, name: &str, consumer: &mut BitConsumer<'_>) -> Result<Step> {
        self.parse_at(name, consumer, 0, DEFAULT_RESOLVE_DEPTH)
    }

    /// Value of this type over zero bits.
    pub fn alloc(&self, name: &str) -> Result<BitNode> {
        let mut zeros = BitConsumer::zeros().with_limit(MEASURE_LIMIT);
        match self.parse_at(name, &mut zeros, 0, DEFAULT_RESOLVE_DEPTH)? {
            Step::Complete(node) if zeros.consumed() < MEASURE_LIMIT => Ok(node),
            _ => Err(Error::resolution(
                name,
                format!("`{}` does not end within {} zero bits", self.label(), MEASURE_LIMIT),
            )),
        }
    }

    /// Number of bits this type occupies over zero bits.
    pub fn measure(&self) -> Result<u64> {
        Ok(self.alloc(&self.label())?.bits())
    }

    pub(crate) fn parse_at(
        &self,
        name: &str,
        consumer: &mut BitConsumer<'_>,
        start: u64,
        depth: usize,
    ) -> Result<Step> {
        match self {
            BitType::Int { width, signed } => {
                if *width > MAX_LEAF_WIDTH {
                    return Err(Error::invalid(
                        "bit field",
                        format!("`{}` is {} bits wide, limit is {}", name, width, MAX_LEAF_WIDTH),
                    ));
                }
                let (bitmap, missing) = match consumer.consume(*width) {
                    Ok(bitmap) => (bitmap, 0),
                    Err(exhausted) => (exhausted.partial, exhausted.missing),
                };
                let node = BitNode {
                    name: name.to_string(),
                    offset: start,
                    kind: BitKind::Int {
                        bitmap,
                        width: *width,
                        signed: *signed,
                    },
                };
                Ok(Step::finish(node, missing))
            }

            BitType::Struct {
                name: type_name,
                fields,
                flags,
            } => {
                let mut nodes = Vec::with_capacity(fields.len());
                let mut bits = 0;
                let mut missing = 0;
                for field in fields.iter() {
                    let ty = field
                        .descriptor
                        .resolve(&field.name, &BitContext::new(&nodes, bits), depth)?;
                    let step = ty.parse_at(&field.name, consumer, start + bits, depth)?;
                    missing = step.missing();
                    let node = step.into_node();
                    bits += node.bits();
                    nodes.push(node);
                    if missing > 0 {
                        break;
                    }
                }
                let node = BitNode {
                    name: name.to_string(),
                    offset: start,
                    kind: BitKind::Struct {
                        type_name: type_name.clone(),
                        fields: nodes,
                        flags: *flags,
                    },
                };
                Ok(Step::finish(node, missing))
            }

            BitType::Array { element, count } => {
                let mut nodes = Vec::with_capacity((*count).min(1024));
                let mut bits = 0;
                let mut missing = 0;
                for index in 0..*count {
                    let (node, short) =
                        parse_element(element, index, &nodes, bits, consumer, start, depth)?;
                    bits += node.bits();
                    nodes.push(node);
                    if short > 0 {
                        missing = short;
                        break;
                    }
                }
                Ok(Step::finish(BitNode::array(name, start, nodes), missing))
            }

            BitType::Terminated {
                element,
                terminator,
                limit,
            } => {
                let mut nodes: Vec<BitNode> = Vec::new();
                let mut bits = 0;
                loop {
                    if limit.is_some_and(|limit| nodes.len() >= limit) {
                        break;
                    }
                    let index = nodes.len();
                    let (node, short) =
                        parse_element(element, index, &nodes, bits, consumer, start, depth)?;
                    let width = node.bits();
                    let stop = short == 0 && (terminator.0)(&node);
                    bits += width;
                    nodes.push(node);

                    if short > 0 {
                        tracing::info!(
                            array = name,
                            elements = nodes.len(),
                            bit = start + bits,
                            "terminated bit array stopped at end of data"
                        );
                        break;
                    }
                    if stop {
                        break;
                    }
                    if width == 0 {
                        tracing::debug!(array = name, "zero-width element, stopping");
                        break;
                    }
                }
                Ok(Step::Complete(BitNode::array(name, start, nodes)))
            }

            BitType::Block {
                element,
                bits: total,
            } => {
                // Fork the requested bits so elements cannot read past the block.
                let mut fork = BitWriter::new();
                let mut short = 0u32;
                for read in 0..*total {
                    match consumer.read_bit() {
                        Some(bit) => fork.push_bit(bit),
                        None => {
                            short = u32::try_from(total - read).unwrap_or(u32::MAX);
                            break;
                        }
                    }
                }
                let available = fork.bit_len();
                let data = fork.into_bytes();
                let mut forked = BitConsumer::from_slice(&data).with_limit(available);

                let mut nodes: Vec<BitNode> = Vec::new();
                let mut used = 0;
                while used < available {
                    let index = nodes.len();
                    let (node, element_short) =
                        parse_element(element, index, &nodes, used, &mut forked, start, depth)?;
                    let width = node.bits();
                    used += width;
                    nodes.push(node);
                    if element_short > 0 {
                        tracing::warn!(
                            array = name,
                            bit = start + used,
                            missing = element_short,
                            "incomplete element at the end of a bit block"
                        );
                        break;
                    }
                    if width == 0 {
                        break;
                    }
                }
                Ok(Step::finish(BitNode::array(name, start, nodes), short))
            }
        }
    }
}

fn parse_element(
    element: &BitDescriptor,
    index: usize,
    siblings: &[BitNode],
    bits: u64,
    consumer: &mut BitConsumer<'_>,
    start: u64,
    depth: usize,
) -> Result<(BitNode, u32)> {
    let name = index.to_string();
    let ty = element.resolve(&name, &BitContext::new(siblings, bits), depth)?;
    let step = ty.parse_at(&name, consumer, start + bits, depth)?;
    let missing = step.missing();
    Ok((step.into_node(), missing))
}

/// Outcome of parsing a bit type.
#[derive(Debug, Clone)]
pub enum Step {
    Complete(BitNode),
    /// The consumer ran out; `missing` bits of the innermost field were not read.
    Exhausted { node: BitNode, missing: u32 },
}

impl Step {
    fn finish(node: BitNode, missing: u32) -> Step {
        if missing == 0 {
            Step::Complete(node)
        } else {
            Step::Exhausted { node, missing }
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, Step::Complete(_))
    }

    pub fn missing(&self) -> u32 {
        match self {
            Step::Complete(_) => 0,
            Step::Exhausted { missing, .. } => *missing,
        }
    }

    pub fn node(&self) -> &BitNode {
        match self {
            Step::Complete(node) | Step::Exhausted { node, .. } => node,
        }
    }

    pub fn into_node(self) -> BitNode {
        match self {
            Step::Complete(node) | Step::Exhausted { node, .. } => node,
        }
    }
}

/// Shape of a parsed bit value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BitKind {
    /// `bitmap` may be narrower than `width` when data ran out.
    Int {
        bitmap: Bitmap,
        width: u32,
        signed: bool,
    },
    Struct {
        type_name: String,
        fields: Vec<BitNode>,
        flags: bool,
    },
    Array {
        elements: Vec<BitNode>,
    },
}

/// A parsed bit value with its position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitNode {
    name: String,
    offset: u64,
    kind: BitKind,
}

impl BitNode {
    fn array(name: &str, offset: u64, elements: Vec<BitNode>) -> Self {
        BitNode {
            name: name.to_string(),
            offset,
            kind: BitKind::Array { elements },
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &BitKind {
        &self.kind
    }

    /// Bit offset from the start of the enclosing partial.
    pub fn bit_offset(&self) -> u64 {
        self.offset
    }

    /// Position as (byte, bit within byte).
    pub fn position(&self) -> (u64, u32) {
        (self.offset / 8, (self.offset % 8) as u32)
    }

    /// Number of bits actually consumed.
    pub fn bits(&self) -> u64 {
        match &self.kind {
            BitKind::Int { bitmap, .. } => u64::from(bitmap.width()),
            BitKind::Struct { fields, .. } => fields.iter().map(BitNode::bits).sum(),
            BitKind::Array { elements } => elements.iter().map(BitNode::bits).sum(),
        }
    }

    /// True when every declared bit was read.
    pub fn is_complete(&self) -> bool {
        match &self.kind {
            BitKind::Int { bitmap, width, .. } => bitmap.width() == *width,
            BitKind::Struct { fields, .. } => fields.iter().all(BitNode::is_complete),
            BitKind::Array { elements } => elements.iter().all(BitNode::is_complete),
        }
    }

    pub fn children(&self) -> &[BitNode] {
        match &self.kind {
            BitKind::Int { .. } => &[],
            BitKind::Struct { fields, .. } => fields,
            BitKind::Array { elements } => elements,
        }
    }

    fn children_mut(&mut self) -> &mut [BitNode] {
        match &mut self.kind {
            BitKind::Int { .. } => &mut [],
            BitKind::Struct { fields, .. } => fields,
            BitKind::Array { elements } => elements,
        }
    }

    pub fn len(&self) -> usize {
        self.children().len()
    }

    pub fn is_empty(&self) -> bool {
        self.children().is_empty()
    }

    pub fn element(&self, index: usize) -> Option<&BitNode> {
        self.children().get(index)
    }

    pub fn field(&self, name: &str) -> Result<&BitNode> {
        self.children()
            .iter()
            .find(|node| node.name == name)
            .ok_or_else(|| Error::UnknownField {
                path: self.name.clone(),
                name: name.to_string(),
            })
    }

    pub fn field_mut(&mut self, name: &str) -> Result<&mut BitNode> {
        let path = self.name.clone();
        self.children_mut()
            .iter_mut()
            .find(|node| node.name == name)
            .ok_or_else(|| Error::UnknownField {
                path,
                name: name.to_string(),
            })
    }

    /// All consumed bits concatenated MSB-first.
    pub fn bitmap(&self) -> Result<Bitmap> {
        match &self.kind {
            BitKind::Int { bitmap, .. } => Ok(*bitmap),
            _ => self.children().iter().try_fold(Bitmap::default(), |acc, node| {
                acc.push(node.bitmap()?).ok_or_else(|| Error::KindMismatch {
                    path: self.name.clone(),
                    expected: "at most 128 bits wide",
                })
            }),
        }
    }

    pub fn uint(&self) -> Result<u128> {
        Ok(self.bitmap()?.value())
    }

    /// Signed value for signed fields; containers decode as unsigned.
    pub fn int(&self) -> Result<i128> {
        match &self.kind {
            BitKind::Int {
                bitmap,
                signed: true,
                ..
            } => Ok(bitmap.signed()),
            _ => i128::try_from(self.uint()?).map_err(|_| Error::KindMismatch {
                path: self.name.clone(),
                expected: "representable as a signed value",
            }),
        }
    }

    /// Stores `value`, spreading it over the fields of a container.
    pub fn set(&mut self, value: u128) -> Result<()> {
        if let BitKind::Int { bitmap, width, .. } = &mut self.kind {
            *bitmap = Bitmap::new(value, *width);
            return Ok(());
        }

        if self.bits() > u64::from(Bitmap::MAX_WIDTH) {
            return Err(Error::KindMismatch {
                path: self.name.clone(),
                expected: "at most 128 bits wide",
            });
        }
        let mut rest = value;
        for child in self.children_mut().iter_mut().rev() {
            let width = child.bits() as u32;
            child.set(rest & mask(width))?;
            rest = rest.checked_shr(width).unwrap_or(0);
        }
        Ok(())
    }

    pub fn set_int(&mut self, value: i128) -> Result<()> {
        self.set(value as u128)
    }

    pub fn write(&self, writer: &mut BitWriter) {
        match &self.kind {
            BitKind::Int { bitmap, .. } => writer.push(*bitmap),
            _ => self.children().iter().for_each(|node| node.write(writer)),
        }
    }

    /// Bytes MSB-first; trailing bits of the last byte are zero.
    pub fn serialize(&self) -> Vec<u8> {
        let mut writer = BitWriter::new();
        self.write(&mut writer);
        writer.into_bytes()
    }

    /// Re-streams the consumed bits through `ty`.
    ///
    /// A shorter source leaves the result partially initialized.
    pub fn cast(&self, ty: &BitType) -> Result<BitNode> {
        let mut writer = BitWriter::new();
        self.write(&mut writer);
        let bits = writer.bit_len();
        let data = writer.into_bytes();
        let mut consumer = BitConsumer::from_slice(&data).with_limit(bits);

        match ty.parse_at(&self.name, &mut consumer, self.offset, DEFAULT_RESOLVE_DEPTH)? {
            Step::Complete(node) => Ok(node),
            Step::Exhausted { node, missing } => {
                tracing::warn!(
                    from = %self.name,
                    to = %ty.label(),
                    missing,
                    "incomplete cast, target left partially initialized"
                );
                Ok(node)
            }
        }
    }

    /// One-line rendering of the value.
    pub fn summary(&self) -> String {
        match &self.kind {
            BitKind::Int {
                bitmap,
                width,
                signed,
            } => {
                let value = if *signed {
                    bitmap.signed().to_string()
                } else {
                    bitmap.value().to_string()
                };
                if bitmap.width() < *width {
                    format!("{} = {} ({} of {} bits)", bitmap, value, bitmap.width(), width)
                } else {
                    format!("{} = {}", bitmap, value)
                }
            }
            BitKind::Struct {
                fields,
                flags: true,
                ..
            } => {
                let set: Vec<&str> = fields
                    .iter()
                    .filter(|node| node.uint().is_ok_and(|v| v != 0))
                    .map(|node| node.name.as_str())
                    .collect();
                format!("{} {}", self.summary_bitmap(), set.join(","))
            }
            BitKind::Struct { fields, .. } => {
                let inner: Vec<String> = fields
                    .iter()
                    .map(|node| format!("{}={}", node.name, node.short()))
                    .collect();
                format!("{} {{{}}}", self.summary_bitmap(), inner.join(" "))
            }
            BitKind::Array { elements } => {
                let inner: Vec<String> = elements.iter().map(BitNode::short).collect();
                format!("[{}]", inner.join(","))
            }
        }
    }

    fn summary_bitmap(&self) -> String {
        match self.bitmap() {
            Ok(bitmap) => bitmap.to_string(),
            Err(_) => format!("(.., {})", self.bits()),
        }
    }

    fn short(&self) -> String {
        match &self.kind {
            BitKind::Int { .. } => match self.int() {
                Ok(value) => format!("{:#x}", value),
                Err(_) => "?".to_string(),
            },
            _ => self.summary(),
        }
    }
}

impl fmt::Display for BitNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (byte, bit) = self.position();
        write!(f, "<{:x}.{}> {} {}", byte, bit, self.name, self.summary())
    }
}

/// Struct of `fields`.
pub fn bit_struct(name: impl Into<String>, fields: impl IntoIterator<Item = BitField>) -> BitType {
    BitType::Struct {
        name: name.into(),
        fields: fields.into_iter().collect(),
        flags: false,
    }
}

/// Struct rendered as the list of its nonzero fields.
pub fn flags(name: impl Into<String>, fields: impl IntoIterator<Item = BitField>) -> BitType {
    BitType::Struct {
        name: name.into(),
        fields: fields.into_iter().collect(),
        flags: true,
    }
}

pub fn bit_array(element: impl Into<BitDescriptor>, count: i64) -> Result<BitType> {
    let count = usize::try_from(count)
        .map_err(|_| Error::invalid("bit array", format!("count {} cannot be negative", count)))?;
    Ok(BitType::Array {
        element: Rc::new(element.into()),
        count,
    })
}

pub fn bit_terminated(
    element: impl Into<BitDescriptor>,
    terminator: impl Fn(&BitNode) -> bool + 'static,
) -> BitType {
    BitType::Terminated {
        element: Rc::new(element.into()),
        terminator: BitTerminator::new(terminator),
        limit: None,
    }
}

/// Terminated array that also stops after `limit` elements.
pub fn bit_terminated_max(
    element: impl Into<BitDescriptor>,
    terminator: impl Fn(&BitNode) -> bool + 'static,
    limit: i64,
) -> Result<BitType> {
    let limit = usize::try_from(limit).map_err(|_| {
        Error::invalid("terminated bit array", format!("limit {} cannot be negative", limit))
    })?;
    Ok(BitType::Terminated {
        element: Rc::new(element.into()),
        terminator: BitTerminator::new(terminator),
        limit: Some(limit),
    })
}

/// Elements until `bits` bits are used.
pub fn bit_block(element: impl Into<BitDescriptor>, bits: i64) -> Result<BitType> {
    let bits = u64::try_from(bits)
        .map_err(|_| Error::invalid("bit block", format!("size {} cannot be negative", bits)))?;
    Ok(BitType::Block {
        element: Rc::new(element.into()),
        bits,
    })
}

/// Padding field bringing the next field to a multiple of `bits`.
pub fn align(bits: i64) -> Result<BitDescriptor> {
    if bits <= 0 {
        return Err(Error::invalid(
            "bit align",
            format!("alignment {} must be positive", bits),
        ));
    }
    let bits = bits as u64;
    Ok(BitDescriptor::computed(move |ctx| {
        let rest = ctx.bits() % bits;
        let pad = if rest == 0 { 0 } else { bits - rest };
        Ok(BitDescriptor::Width(pad as i32))
    }))
}

//! The node arena and every operation on nodes.
//!
//! A [Tree] owns all nodes created by instantiating, loading and
//! dereferencing types. Containers create their children while loading, in
//! declaration order, each at its parent's offset plus the block sizes of the
//! siblings before it.

use std::{
    cell::{Cell, RefCell},
    rc::Rc,
};

use crate::{
    binary::{BitNode, BitType},
    bits::BitConsumer,
    config::Config,
    errors::{Error, Result},
    field::{Context, Descriptor, Field},
    node::{Backing, Content, LoadState, Node, NodeId, NodeRef, Outcome},
    order::ByteOrder,
    source::{BytesSource, ScratchSource, SourceRef},
    types::{Terminator, Type, padding_for},
};

/// Most bytes a type may span when loaded over zeros.
const ZERO_LIMIT: u64 = 1 << 16;

fn to_usize(value: u64) -> usize {
    usize::try_from(value).unwrap_or(usize::MAX)
}

/// Result of loading one array element.
enum Element {
    Loaded(Outcome),
    Truncated { shortfall: u64 },
}

/// Arena of nodes.
#[derive(Debug, Default)]
pub struct Tree {
    slots: Vec<Option<Node>>,
    free: Vec<usize>,
    config: Config,
}

impl Tree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: Config) -> Self {
        Tree {
            config,
            ..Self::default()
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut Config {
        &mut self.config
    }

    /// Number of live nodes.
    pub fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, id: NodeId) -> Result<NodeRef<'_>> {
        let node = self.node(id)?;
        Ok(NodeRef::new(self, id, node))
    }

    fn slot(&self, id: NodeId) -> Option<&Node> {
        self.slots.get(id.index())?.as_ref()
    }

    pub(crate) fn node(&self, id: NodeId) -> Result<&Node> {
        self.slot(id)
            .ok_or_else(|| Error::InvariantViolation(format!("stale node id {}", id)))
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut Node> {
        self.slots
            .get_mut(id.index())
            .and_then(Option::as_mut)
            .ok_or_else(|| Error::InvariantViolation(format!("stale node id {}", id)))
    }

    pub(crate) fn path(&self, id: NodeId) -> String {
        self.get(id)
            .map(|node| node.path())
            .unwrap_or_else(|_| id.to_string())
    }

    // ---------- CREATION ----------

    fn insert(
        &mut self,
        parent: Option<NodeId>,
        name: String,
        ty: Type,
        offset: u64,
        backing: Option<Backing>,
    ) -> NodeId {
        let (ty, mut declared) = ty.unpad();
        let leaf_size = match &ty {
            Type::Block { size } => *size as u64,
            Type::Int(int) => int.size() as u64,
            Type::Align { alignment } => padding_for(offset, *alignment),
            Type::Pointer { address, .. } => address.size() as u64,
            Type::BlockArray { size, .. } => {
                declared = Some(declared.unwrap_or(0).max(*size as u64));
                0
            }
            _ => 0,
        };

        let node = Node {
            name,
            ty,
            parent,
            backing,
            offset,
            leaf_size,
            declared_block_size: declared,
            content: Content::Empty,
            state: LoadState::Uninitialized,
        };

        match self.free.pop() {
            Some(index) => {
                self.slots[index] = Some(node);
                NodeId::from_index(index)
            }
            None => {
                self.slots.push(Some(node));
                NodeId::from_index(self.slots.len() - 1)
            }
        }
    }

    /// Creates an uninitialized root at offset 0 of `source`.
    pub fn instantiate(&mut self, ty: Type, source: SourceRef) -> NodeId {
        self.instantiate_at(ty, source, 0)
    }

    /// Creates an uninitialized root at `offset` of `source`.
    pub fn instantiate_at(&mut self, ty: Type, source: SourceRef, offset: u64) -> NodeId {
        let name = ty.label();
        self.insert(None, name, ty, offset, Some(Backing::Source(source)))
    }

    /// Drops a root and everything it owns.
    pub fn remove(&mut self, id: NodeId) -> Result<()> {
        if self.node(id)?.parent.is_some() {
            return Err(Error::KindMismatch {
                path: self.path(id),
                expected: "a detached root",
            });
        }
        self.release(id);
        Ok(())
    }

    fn owned(content: &Content) -> Vec<NodeId> {
        match content {
            Content::Children(ids) => ids.clone(),
            Content::Union { root, views } => std::iter::once(*root).chain(views.iter().copied()).collect(),
            Content::Pointer {
                target: Some(target),
                ..
            } => vec![*target],
            _ => Vec::new(),
        }
    }

    fn release(&mut self, id: NodeId) {
        let Some(node) = self.slots.get_mut(id.index()).and_then(Option::take) else {
            return;
        };
        self.free.push(id.index());
        for child in Self::owned(&node.content) {
            self.release(child);
        }
    }

    /// Releases owned nodes and empties the content.
    fn clear(&mut self, id: NodeId) -> Result<()> {
        let content = std::mem::take(&mut self.node_mut(id)?.content);
        for child in Self::owned(&content) {
            self.release(child);
        }
        Ok(())
    }

    fn push_child(&mut self, parent: NodeId, name: &str, ty: Type, offset: u64) -> Result<NodeId> {
        let child = self.insert(Some(parent), name.to_string(), ty, offset, None);
        match &mut self.node_mut(parent)?.content {
            Content::Children(ids) => {
                ids.push(child);
                Ok(child)
            }
            _ => Err(Error::InvariantViolation(format!(
                "`{}` cannot hold children",
                self.path(parent)
            ))),
        }
    }

    fn resolve(
        &self,
        field: &str,
        descriptor: &Descriptor,
        container: Option<NodeId>,
        offset: u64,
    ) -> Result<Type> {
        let ctx = Context::new(self, container, offset);
        let ty = descriptor.resolve(field, &ctx, self.config.resolve_depth)?;
        if matches!(descriptor, Descriptor::Computed(_)) {
            tracing::debug!(field, ty = %ty.label(), offset, "resolved computed field");
        }
        Ok(ty)
    }

    // ---------- SIZES ----------

    pub(crate) fn size_of(&self, id: NodeId) -> u64 {
        let Some(node) = self.slot(id) else {
            return 0;
        };
        match &node.content {
            Content::Children(ids) => ids.iter().map(|&child| self.block_size_of(child)).sum(),
            Content::Union { root, .. } => self.size_of(*root),
            Content::Bits(bits) => bits.bits().div_ceil(8),
            Content::Empty | Content::Bytes(_) | Content::Pointer { .. } => node.leaf_size,
        }
    }

    pub(crate) fn block_size_of(&self, id: NodeId) -> u64 {
        let Some(node) = self.slot(id) else {
            return 0;
        };
        let size = match &node.content {
            Content::Union { root, .. } => self.block_size_of(*root),
            _ => self.size_of(id),
        };
        size.max(node.declared_block_size.unwrap_or(0))
    }

    /// Block size of `ty` when allocated over zeros.
    pub fn measure(&mut self, ty: &Type) -> Result<u64> {
        let scratch = ScratchSource::bounded(ZERO_LIMIT).shared();
        let sized = self.insert(
            None,
            ty.label(),
            ty.clone(),
            0,
            Some(Backing::Source(scratch.clone())),
        );
        let result = self.load_zeros(sized, &scratch);
        let size = self.block_size_of(sized);
        self.release(sized);
        result.map(|_| size)
    }

    /// Loads a node over zeros that end [ZERO_LIMIT] bytes past it.
    fn load_zeros(&mut self, id: NodeId, scratch: &SourceRef) -> Result<Outcome> {
        let unbounded = |tree: &Self| {
            Error::resolution(
                tree.path(id),
                format!("does not end within {} zero bytes", ZERO_LIMIT),
            )
        };
        match self.load_from(id, scratch) {
            Ok(Outcome::Complete) if self.block_size_of(id) < ZERO_LIMIT => Ok(Outcome::Complete),
            Ok(_) => Err(unbounded(self)),
            Err(err) if err.is_truncation() => Err(unbounded(self)),
            Err(err) => Err(err),
        }
    }

    /// Offset `size` bytes past `cursor` inside `id`.
    fn advance(&self, id: NodeId, cursor: u64, size: u64) -> Result<u64> {
        cursor.checked_add(size).ok_or_else(|| {
            Error::invalid(
                "offset",
                format!("`{}` extends past the end of the address space", self.path(id)),
            )
        })
    }

    // ---------- SOURCES ----------

    fn backing_of(&self, id: NodeId) -> Result<Backing> {
        let mut current = id;
        loop {
            let node = self.node(current)?;
            match (&node.backing, node.parent) {
                (Some(backing), _) => return Ok(backing.clone()),
                (None, Some(parent)) => current = parent,
                (None, None) => {
                    return Err(Error::InvariantViolation(format!(
                        "`{}` has no data source",
                        self.path(id)
                    )));
                }
            }
        }
    }

    /// Source a node reads from. Union views read a copy of their root's bytes.
    fn source_of(&self, id: NodeId) -> Result<SourceRef> {
        match self.backing_of(id)? {
            Backing::Source(source) => Ok(source),
            Backing::Alias(root) => Ok(BytesSource::new(self.serialize(root)?).shared()),
        }
    }

    // ---------- LOAD ----------

    /// Loads a node and its children from its source.
    pub fn load(&mut self, id: NodeId) -> Result<Outcome> {
        let source = self.source_of(id)?;
        self.load_from(id, &source)
    }

    /// Loads a node from zero-filled scratch space.
    ///
    /// Fails with a resolution error when the node does not end within
    /// 64 KiB of zeros.
    pub fn alloc(&mut self, id: NodeId) -> Result<Outcome> {
        let end = self.node(id)?.offset.saturating_add(ZERO_LIMIT);
        let scratch = ScratchSource::bounded(end).shared();
        self.load_zeros(id, &scratch)
    }

    /// Loads a node and its children from `source` instead of their backing.
    pub fn load_from(&mut self, id: NodeId, source: &SourceRef) -> Result<Outcome> {
        let (ty, offset) = {
            let node = self.node(id)?;
            (node.ty.clone(), node.offset)
        };
        tracing::trace!(node = %id, offset, ty = %ty.label(), "load");

        let result = match ty {
            Type::Block { .. } | Type::Int(_) | Type::Align { .. } | Type::Pointer { .. } => {
                self.load_leaf(id, source)
            }
            Type::Struct { fields, .. } => self.load_struct(id, &fields, source),
            Type::Array { element, count } => self.load_array(id, &element, count, source),
            Type::Terminated {
                element,
                terminator,
                limit,
            } => self.load_terminated(id, &element, &terminator, limit, source),
            Type::BlockArray { element, size } => {
                self.load_block_array(id, &element, size as u64, source)
            }
            Type::Union { root, views } => self.load_union(id, root.map(|root| *root), &views, source),
            Type::Partial { object, order } => self.load_partial(id, &object, order, source),
            Type::Padded { .. } => Err(Error::InvariantViolation(format!(
                "`{}` kept a padded type after placement",
                self.path(id)
            ))),
        };

        match &result {
            Ok(outcome) => self.node_mut(id)?.state = outcome.state(),
            Err(Error::TruncatedRead { shortfall, .. }) => {
                self.node_mut(id)?.state = LoadState::Truncated {
                    shortfall: *shortfall,
                }
            }
            Err(_) => {}
        }
        result
    }

    fn truncated(&self, id: NodeId, offset: u64, expected: u64, shortfall: u64) -> Error {
        let path = self.path(id);
        tracing::debug!(%path, offset, expected, shortfall, "truncated read");
        Error::TruncatedRead {
            node: id,
            path,
            offset,
            expected,
            shortfall,
        }
    }

    fn load_leaf(&mut self, id: NodeId, source: &SourceRef) -> Result<Outcome> {
        let (offset, size) = {
            let node = self.node(id)?;
            (node.offset, node.leaf_size)
        };
        let block = self.block_size_of(id);

        let data = {
            let mut source = source.borrow_mut();
            source.seek(offset);
            source.consume(to_usize(block))
        };
        let available = data.len() as u64;

        let node = self.node_mut(id)?;
        let is_pointer = matches!(node.ty, Type::Pointer { .. });
        let previous = std::mem::take(&mut node.content);
        node.content = if is_pointer {
            let target = match previous {
                Content::Pointer { target, .. } => target,
                _ => None,
            };
            Content::Pointer { raw: data, target }
        } else {
            Content::Bytes(data)
        };

        if available < size {
            return Err(self.truncated(id, offset, size, size - available));
        }
        if available < block {
            let shortfall = block - available;
            tracing::warn!(
                path = %self.path(id),
                offset,
                missing = shortfall,
                "value loaded but its padding is short"
            );
            return Ok(Outcome::Partial { shortfall });
        }
        Ok(Outcome::Complete)
    }

    fn begin_children(&mut self, id: NodeId) -> Result<u64> {
        self.clear(id)?;
        let node = self.node_mut(id)?;
        node.content = Content::Children(Vec::new());
        Ok(node.offset)
    }

    fn load_struct(&mut self, id: NodeId, fields: &[Field], source: &SourceRef) -> Result<Outcome> {
        let mut cursor = self.begin_children(id)?;
        let mut outcome = Outcome::Complete;

        for field in fields {
            let ty = self.resolve(&field.name, &field.descriptor, Some(id), cursor)?;
            let child = self.push_child(id, &field.name, ty, cursor)?;
            outcome = outcome.merge(self.load_from(child, source)?);
            cursor = self.advance(id, cursor, self.block_size_of(child))?;
        }
        Ok(outcome)
    }

    /// Loads one element; truncation stops the array instead of failing it.
    fn load_element(&mut self, array: NodeId, child: NodeId, source: &SourceRef) -> Result<Element> {
        match self.load_from(child, source) {
            Ok(outcome) => Ok(Element::Loaded(outcome)),
            Err(Error::TruncatedRead {
                path, shortfall, ..
            }) => {
                tracing::warn!(
                    array = %self.path(array),
                    element = %path,
                    shortfall,
                    "array truncated by end of data"
                );
                Ok(Element::Truncated { shortfall })
            }
            Err(err) => Err(err),
        }
    }

    fn load_array(
        &mut self,
        id: NodeId,
        element: &Descriptor,
        count: usize,
        source: &SourceRef,
    ) -> Result<Outcome> {
        self.config.check_count("array", count)?;
        let mut cursor = self.begin_children(id)?;
        let mut outcome = Outcome::Complete;

        for index in 0..count {
            let name = index.to_string();
            let ty = self.resolve(&name, element, Some(id), cursor)?;
            let child = self.push_child(id, &name, ty, cursor)?;
            match self.load_element(id, child, source)? {
                Element::Loaded(loaded) => outcome = outcome.merge(loaded),
                Element::Truncated { shortfall } => {
                    return Ok(outcome.merge(Outcome::Partial { shortfall }));
                }
            }
            cursor = self.advance(id, cursor, self.block_size_of(child))?;
        }
        Ok(outcome)
    }

    fn load_terminated(
        &mut self,
        id: NodeId,
        element: &Descriptor,
        terminator: &Terminator,
        limit: Option<usize>,
        source: &SourceRef,
    ) -> Result<Outcome> {
        if let Some(limit) = limit {
            self.config.check_count("terminated array", limit)?;
        }
        let mut cursor = self.begin_children(id)?;
        let mut outcome = Outcome::Complete;

        loop {
            let index = self.get(id)?.len();
            if limit.is_some_and(|limit| index >= limit) {
                break;
            }
            if self.config.max_count > 0 && index >= self.config.max_count {
                self.config.check_count("terminated array", index + 1)?;
                break;
            }

            let name = index.to_string();
            let ty = self.resolve(&name, element, Some(id), cursor)?;
            let child = self.push_child(id, &name, ty, cursor)?;
            match self.load_element(id, child, source)? {
                Element::Loaded(loaded) => outcome = outcome.merge(loaded),
                Element::Truncated { shortfall } => {
                    return Ok(outcome.merge(Outcome::Partial { shortfall }));
                }
            }

            let size = self.block_size_of(child);
            cursor = self.advance(id, cursor, size)?;
            if terminator.is_terminator(self.get(child)?) {
                break;
            }
            if size == 0 {
                tracing::warn!(array = %self.path(id), index, "zero-sized element, stopping");
                break;
            }
        }
        Ok(outcome)
    }

    fn load_block_array(
        &mut self,
        id: NodeId,
        element: &Descriptor,
        size: u64,
        source: &SourceRef,
    ) -> Result<Outcome> {
        let start = self.begin_children(id)?;
        let mut used = 0;
        let mut outcome = Outcome::Complete;

        while used < size {
            let index = self.get(id)?.len();
            let name = index.to_string();
            let offset = self.advance(id, start, used)?;
            let ty = self.resolve(&name, element, Some(id), offset)?;
            let child = self.push_child(id, &name, ty, offset)?;
            match self.load_element(id, child, source)? {
                Element::Loaded(loaded) => outcome = outcome.merge(loaded),
                Element::Truncated { shortfall } => {
                    return Ok(outcome.merge(Outcome::Partial { shortfall }));
                }
            }

            let width = self.block_size_of(child);
            used = self.advance(id, used, width)?;
            if width == 0 {
                tracing::debug!(array = %self.path(id), index, "zero-sized element ends block array");
                break;
            }
        }

        if used > size {
            tracing::warn!(
                array = %self.path(id),
                declared = size,
                used,
                "block array read past its declared size"
            );
        }
        Ok(outcome)
    }

    fn load_union(
        &mut self,
        id: NodeId,
        root: Option<Type>,
        views: &[Field],
        source: &SourceRef,
    ) -> Result<Outcome> {
        self.clear(id)?;
        let offset = self.node(id)?.offset;

        let mut view_types = Vec::with_capacity(views.len());
        for view in views {
            view_types.push(self.resolve(&view.name, &view.descriptor, Some(id), 0)?);
        }

        let root_ty = match root {
            Some(root) => root,
            None => {
                let mut size = 0;
                for ty in &view_types {
                    size = size.max(self.measure(ty)?);
                }
                tracing::debug!(union = %self.path(id), size, "union root sized to its largest view");
                Type::Block {
                    size: to_usize(size),
                }
            }
        };

        let root = self.insert(Some(id), "root".to_string(), root_ty, offset, None);
        let view_ids: Vec<NodeId> = view_types
            .into_iter()
            .zip(views)
            .map(|(ty, view)| {
                self.insert(Some(id), view.name.clone(), ty, 0, Some(Backing::Alias(root)))
            })
            .collect();
        self.node_mut(id)?.content = Content::Union {
            root,
            views: view_ids.clone(),
        };

        let outcome = self.load_from(root, source)?;
        for view in view_ids {
            self.refresh_view(view)?;
        }
        Ok(outcome)
    }

    fn refresh_view(&mut self, view: NodeId) -> Result<()> {
        let source = self.source_of(view)?;
        match self.load_from(view, &source) {
            Ok(_) => Ok(()),
            Err(err) if err.is_truncation() => {
                tracing::warn!(view = %self.path(view), "union view is wider than its root");
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    fn load_partial(
        &mut self,
        id: NodeId,
        object: &BitType,
        order: ByteOrder,
        source: &SourceRef,
    ) -> Result<Outcome> {
        let (offset, name) = {
            let node = self.node(id)?;
            (node.offset, node.name.clone())
        };
        let depth = self.config.resolve_depth;

        let (step, available, expected) = match order {
            ByteOrder::BigEndian => {
                // Streamed: only the bytes the fields need are read.
                source.borrow_mut().seek(offset);
                let pulled = Cell::new(0u64);
                let bytes = std::iter::from_fn(|| {
                    let byte = *source.borrow_mut().consume(1).first()?;
                    pulled.set(pulled.get() + 1);
                    Some(byte)
                });
                let mut consumer = BitConsumer::new(bytes);
                let step = object.parse_at(&name, &mut consumer, 0, depth)?;
                let needed = (consumer.consumed() + u64::from(step.missing())).div_ceil(8);
                (step, pulled.get(), needed)
            }
            ByteOrder::LittleEndian => {
                // Block-based: the whole range is read and reversed first.
                let size = object.measure()?.div_ceil(8);
                let mut data = {
                    let mut source = source.borrow_mut();
                    source.seek(offset);
                    source.consume(to_usize(size))
                };
                let available = data.len() as u64;
                data.reverse();
                let mut consumer = BitConsumer::from_slice(&data);
                let step = object.parse_at(&name, &mut consumer, 0, depth)?;
                (step, available, size)
            }
        };

        let missing = u64::from(step.missing());
        let complete = step.is_complete() && available >= expected;
        self.node_mut(id)?.content = Content::Bits(step.into_node());

        if !complete {
            let shortfall = expected.saturating_sub(available).max(missing.div_ceil(8));
            return Err(self.truncated(id, offset, expected, shortfall));
        }
        Ok(Outcome::Complete)
    }

    // ---------- SERIALIZE / COMMIT ----------

    /// Bytes of a node, padded to its block size. Overflow is kept.
    pub fn serialize(&self, id: NodeId) -> Result<Vec<u8>> {
        let node = self.node(id)?;
        let mut out = match &node.content {
            Content::Empty => return Err(Error::Uninitialized { path: self.path(id) }),
            Content::Bytes(data) | Content::Pointer { raw: data, .. } => data.clone(),
            Content::Bits(bits) => {
                let mut data = bits.serialize();
                if let Type::Partial {
                    order: ByteOrder::LittleEndian,
                    ..
                } = node.ty
                {
                    data.reverse();
                }
                data
            }
            Content::Children(ids) => {
                let mut out = Vec::new();
                for &child in ids {
                    out.extend(self.serialize(child)?);
                }
                out
            }
            Content::Union { root, .. } => self.serialize(*root)?,
        };

        let block = to_usize(self.block_size_of(id));
        if out.len() < block {
            out.resize(block, self.config.padding);
        }
        Ok(out)
    }

    /// Writes a node back to its source.
    ///
    /// Containers commit their children. Union views write into the union's
    /// root, which is then reloaded from the patched bytes.
    pub fn commit(&mut self, id: NodeId) -> Result<()> {
        match self.backing_of(id)? {
            Backing::Source(source) => self.commit_to(id, &source),
            Backing::Alias(root) => {
                let buffer = Rc::new(RefCell::new(BytesSource::new(self.serialize(root)?)));
                let sink: SourceRef = buffer.clone();
                self.commit_to(id, &sink)?;

                let patched = buffer.borrow().as_bytes().to_vec();
                let offset = self.node(root)?.offset;
                let reload = BytesSource::at(offset, patched).shared();
                self.load_from(root, &reload)?;
                Ok(())
            }
        }
    }

    fn commit_to(&self, id: NodeId, sink: &SourceRef) -> Result<()> {
        let node = self.node(id)?;
        match &node.content {
            Content::Children(ids) => ids.iter().try_for_each(|&child| self.commit_to(child, sink)),
            Content::Union { root, .. } => self.commit_to(*root, sink),
            _ => {
                let data = self.serialize(id)?;
                tracing::trace!(node = %id, offset = node.offset, len = data.len(), "commit");
                let mut target = sink.borrow_mut();
                target.seek(node.offset);
                target.store(&data).map_err(|source| Error::Commit {
                    node: id,
                    path: self.path(id),
                    offset: node.offset,
                    source,
                })
            }
        }
    }

    // ---------- TRAVERSAL ----------

    /// True when `offset` falls inside the node's block.
    pub fn contains(&self, id: NodeId, offset: u64) -> bool {
        match self.slot(id) {
            Some(node) => offset >= node.offset && offset - node.offset < self.block_size_of(id),
            None => false,
        }
    }

    fn child_containing(&self, id: NodeId, offset: u64) -> Option<NodeId> {
        match &self.slot(id)?.content {
            Content::Children(ids) => ids.iter().copied().find(|&child| self.contains(child, offset)),
            Content::Union { root, .. } => Some(*root).filter(|&root| self.contains(root, offset)),
            _ => None,
        }
    }

    /// The child covering `offset`, or with `recurse` the deepest node covering it.
    pub fn at(&self, id: NodeId, offset: u64, recurse: bool) -> Result<NodeId> {
        if !self.contains(id, offset) {
            return Err(Error::OffsetNotFound {
                path: self.path(id),
                offset,
            });
        }

        let mut current = id;
        loop {
            match self.child_containing(current, offset) {
                Some(child) if recurse => current = child,
                Some(child) => return Ok(child),
                None if recurse => return Ok(current),
                None => {
                    return Err(Error::OffsetNotFound {
                        path: self.path(current),
                        offset,
                    });
                }
            }
        }
    }

    /// Nodes from `id` down to the deepest one covering `offset`.
    pub fn walk_to(&self, id: NodeId, offset: u64) -> WalkTo<'_> {
        WalkTo {
            tree: self,
            next: self.contains(id, offset).then_some(id),
            offset,
        }
    }

    /// Re-places every descendant after sizes changed.
    pub fn recompute_offsets(&mut self, id: NodeId) -> Result<()> {
        let node = self.node(id)?;
        let offset = node.offset;
        let children: Vec<NodeId> = match &node.content {
            Content::Children(ids) => ids.clone(),
            Content::Union { root, .. } => vec![*root],
            _ => return Ok(()),
        };

        let mut cursor = offset;
        for child in children {
            self.place(child, cursor)?;
            self.recompute_offsets(child)?;
            cursor = self.advance(id, cursor, self.block_size_of(child))?;
        }
        Ok(())
    }

    fn place(&mut self, id: NodeId, offset: u64) -> Result<()> {
        let padding = self.config.padding;
        let node = self.node_mut(id)?;
        node.offset = offset;
        if let Type::Align { alignment } = node.ty {
            let size = padding_for(offset, alignment);
            node.leaf_size = size;
            if let Content::Bytes(data) = &mut node.content {
                data.resize(to_usize(size), padding);
            }
        }
        Ok(())
    }

    // ---------- MUTATION ----------

    /// Replaces the bytes of a block, integer or pointer.
    ///
    /// Blocks take the new length; offsets of later siblings are only
    /// updated by [Tree::recompute_offsets].
    pub fn set_bytes(&mut self, id: NodeId, data: &[u8]) -> Result<()> {
        let path = self.path(id);
        let node = self.node_mut(id)?;
        let expected = match &node.ty {
            Type::Block { .. } => None,
            Type::Int(int) => Some(int.size()),
            Type::Pointer { address, .. } => Some(address.size()),
            _ => {
                return Err(Error::KindMismatch {
                    path,
                    expected: "a byte leaf",
                });
            }
        };
        match expected {
            Some(size) if size != data.len() => {
                return Err(Error::invalid(
                    "set_bytes",
                    format!("`{}` holds {} bytes, got {}", path, size, data.len()),
                ));
            }
            Some(_) => {}
            None => {
                node.ty = Type::Block { size: data.len() };
                node.leaf_size = data.len() as u64;
            }
        }

        let is_pointer = matches!(node.ty, Type::Pointer { .. });
        let previous = std::mem::take(&mut node.content);
        node.content = if is_pointer {
            let target = match previous {
                Content::Pointer { target, .. } => target,
                _ => None,
            };
            Content::Pointer {
                raw: data.to_vec(),
                target,
            }
        } else {
            Content::Bytes(data.to_vec())
        };
        node.state = LoadState::Complete;
        Ok(())
    }

    /// Stores the low bytes of `value` into an integer or pointer.
    pub fn set_uint(&mut self, id: NodeId, value: u128) -> Result<()> {
        let int = match &self.node(id)?.ty {
            Type::Int(int) => *int,
            Type::Pointer { address, .. } => *address,
            _ => {
                return Err(Error::KindMismatch {
                    path: self.path(id),
                    expected: "an integer",
                });
            }
        };
        self.set_bytes(id, &int.encode(value))
    }

    /// Stores `value` in two's complement.
    pub fn set_int(&mut self, id: NodeId, value: i128) -> Result<()> {
        self.set_uint(id, value as u128)
    }

    /// Mutable access to the parsed value of a partial.
    pub fn bits_mut(&mut self, id: NodeId) -> Result<&mut BitNode> {
        let path = self.path(id);
        match &mut self.node_mut(id)?.content {
            Content::Bits(bits) => Ok(bits),
            Content::Empty => Err(Error::Uninitialized { path }),
            _ => Err(Error::KindMismatch {
                path,
                expected: "a bit structure",
            }),
        }
    }

    // ---------- DYNAMIC ACCESS ----------

    /// Re-derives a union view from the root's current bytes.
    pub fn view(&mut self, union: NodeId, name: &str) -> Result<NodeId> {
        let view = {
            let node = self.get(union)?;
            if node.union_root().is_none() {
                return Err(node.mismatch("a union"));
            }
            node.field(name)?.id()
        };
        self.refresh_view(view)?;
        Ok(view)
    }

    /// Follows a pointer, creating and loading its target.
    ///
    /// The target is cached while the address does not change.
    pub fn deref(&mut self, pointer: NodeId) -> Result<NodeId> {
        let (target, address, cached, name) = {
            let node = self.get(pointer)?;
            let Type::Pointer {
                target, addressing, ..
            } = node.ty()
            else {
                return Err(node.mismatch("a pointer"));
            };
            let raw = node.int()?;
            let base = addressing.base(node);
            let address = u64::try_from(i128::from(base) + raw).map_err(|_| {
                Error::invalid(
                    "pointer",
                    format!("`{}` addresses {:#x} + {:#x}", node.path(), base, raw),
                )
            })?;
            let name = format!("*{}", node.name());
            (target.clone(), address, node.target().map(|t| (t.id(), t.offset())), name)
        };

        if let Some((cached, offset)) = cached {
            if offset == address {
                return Ok(cached);
            }
            self.release(cached);
        }

        let ty = self.resolve(&name, &target, Some(pointer), address)?;
        tracing::debug!(pointer = %self.path(pointer), address, ty = %ty.label(), "dereference");
        let id = self.insert(Some(pointer), name, ty, address, None);
        if let Content::Pointer { target, .. } = &mut self.node_mut(pointer)?.content {
            *target = Some(id);
        }

        let source = self.source_of(pointer)?;
        let loaded = self
            .load_from(id, &source)
            .and_then(|_| self.advance(id, address, self.block_size_of(id)));
        if let Err(err) = loaded {
            if !err.is_truncation() {
                self.release(id);
                if let Content::Pointer { target, .. } = &mut self.node_mut(pointer)?.content {
                    *target = None;
                }
            }
            return Err(err);
        }
        Ok(id)
    }

    /// Reinterprets a node's bytes as `ty` at the same offset.
    ///
    /// The result is a new detached root backed by a copy of the bytes.
    pub fn cast(&mut self, id: NodeId, ty: Type) -> Result<NodeId> {
        let data = self.serialize(id)?;
        let (offset, name) = {
            let node = self.node(id)?;
            (node.offset, node.name.clone())
        };
        let source = BytesSource::at(offset, data).shared();
        let cast = self.insert(None, name, ty, offset, Some(Backing::Source(source.clone())));
        self.load_from(cast, &source)?;
        Ok(cast)
    }
}

/// Lazy path from a node to the deepest node covering an offset.
#[derive(Debug)]
pub struct WalkTo<'t> {
    tree: &'t Tree,
    next: Option<NodeId>,
    offset: u64,
}

impl<'t> Iterator for WalkTo<'t> {
    type Item = NodeRef<'t>;

    fn next(&mut self) -> Option<NodeRef<'t>> {
        let id = self.next.take()?;
        self.next = self.tree.child_containing(id, self.offset);
        self.tree.get(id).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        binary::{BitField, bit_struct},
        dynamic::{self, Builder},
        field::Field,
        source::Source,
        types::IntType,
    };

    const BE: Builder = Builder::new(ByteOrder::BigEndian);
    const LE: Builder = Builder::new(ByteOrder::LittleEndian);

    fn bytes(data: &[u8]) -> SourceRef {
        BytesSource::new(data.to_vec()).shared()
    }

    fn load(ty: Type, data: &[u8]) -> (Tree, NodeId) {
        let mut tree = Tree::new();
        let id = tree.instantiate(ty, bytes(data));
        tree.load(id).unwrap();
        (tree, id)
    }

    #[test]
    fn test_byte_order_equivalence() {
        let (tree, id) = load(BE.uint(2).unwrap(), &[0xde, 0xad]);
        assert_eq!(tree.get(id).unwrap().uint().unwrap(), 0xdead);
        let (tree, id) = load(LE.uint(2).unwrap(), &[0xde, 0xad]);
        assert_eq!(tree.get(id).unwrap().uint().unwrap(), 0xadde);
    }

    #[test]
    fn test_truncated_leaf_keeps_value() {
        let mut tree = Tree::new();
        let id = tree.instantiate(dynamic::block(10).unwrap(), bytes(b"ABCD"));
        let err = tree.load(id).unwrap_err();
        assert!(matches!(
            err,
            Error::TruncatedRead { node, expected: 10, shortfall: 6, .. } if node == id
        ));

        let node = tree.get(id).unwrap();
        assert_eq!(node.bytes().unwrap(), b"ABCD");
        assert_eq!(node.state(), LoadState::Truncated { shortfall: 6 });
    }

    #[test]
    fn test_truncation_inside_struct() {
        let ty = dynamic::structure(
            "pair",
            [Field::new("a", BE.uint32()), Field::new("b", BE.uint32())],
        );
        let mut tree = Tree::new();
        let id = tree.instantiate(ty, bytes(b"\x00\x00\x00\x01\x02"));
        let Err(Error::TruncatedRead { node, path, .. }) = tree.load(id) else {
            panic!("expected a truncated read");
        };
        assert_eq!(path, "pair.b");
        assert_eq!(tree.get(node).unwrap().bytes().unwrap(), &[0x02]);
        assert_eq!(tree.get(id).unwrap().field("a").unwrap().uint().unwrap(), 1);
        assert!(!tree.get(id).unwrap().is_initialized());
    }

    #[test]
    fn test_short_padding_is_partial() {
        let ty = dynamic::padded(dynamic::block(2).unwrap(), 4).unwrap();
        let mut tree = Tree::new();
        let id = tree.instantiate(ty, bytes(b"abc"));
        assert_eq!(tree.load(id).unwrap(), Outcome::Partial { shortfall: 1 });

        let node = tree.get(id).unwrap();
        assert_eq!(node.size(), 2);
        assert_eq!(node.block_size(), 4);
        assert_eq!(node.bytes().unwrap(), b"ab");
        assert_eq!(tree.serialize(id).unwrap(), b"abc\x00".to_vec());
    }

    #[test]
    fn test_struct_offsets_and_alignment() {
        let ty = dynamic::structure(
            "test",
            [
                Field::new("u32", BE.uint32()),
                Field::new("u8", BE.uint8()),
                Field::new("alignment", dynamic::align(4).unwrap()),
                Field::new("end", BE.uint32()),
            ],
        );
        let (tree, id) = load(ty, &[b'A'; 12]);
        let node = tree.get(id).unwrap();
        assert_eq!(node.size(), 12);
        assert_eq!(node.field("alignment").unwrap().size(), 3);
        assert_eq!(node.field("end").unwrap().offset(), 8);

        let children: Vec<_> = node.children().collect();
        for pair in children.windows(2) {
            assert_eq!(pair[0].offset() + pair[0].size(), pair[1].offset());
        }
    }

    #[test]
    fn test_round_trip() {
        let ty = dynamic::structure(
            "record",
            [
                Field::new("magic", 4usize),
                Field::new("count", LE.uint16()),
                Field::new("items", dynamic::array(BE.uint16(), 3).unwrap()),
            ],
        );
        let data = b"MZ\x90\x00\x03\x00\x00\x01\x00\x02\x00\x03";
        let (tree, id) = load(ty, data);
        assert_eq!(tree.serialize(id).unwrap(), data.to_vec());
        let items = tree.get(id).unwrap().field("items").unwrap();
        assert_eq!(items.index(2).unwrap().uint().unwrap(), 3);
        assert_eq!(items.index(2).unwrap().path(), "record.items.2");
    }

    #[test]
    fn test_length_prefixed_field() {
        let ty = dynamic::structure(
            "string",
            [
                Field::new("length", BE.uint8()),
                Field::computed("data", |ctx| Ok(Descriptor::Length(ctx.uint("length")? as usize))),
                Field::new("trailer", BE.uint8()),
            ],
        );
        let (tree, id) = load(ty, b"\x03abc\xff");
        let node = tree.get(id).unwrap();
        assert_eq!(node.field("data").unwrap().bytes().unwrap(), b"abc");
        assert_eq!(node.field("trailer").unwrap().uint().unwrap(), 0xff);
    }

    #[test]
    fn test_array_truncation_is_soft() {
        let ty = dynamic::array(BE.uint32(), 4).unwrap();
        let mut tree = Tree::new();
        let id = tree.instantiate(ty, bytes(&[0x11; 10]));
        assert_eq!(tree.load(id).unwrap(), Outcome::Partial { shortfall: 2 });

        let node = tree.get(id).unwrap();
        assert_eq!(node.len(), 3);
        assert_eq!(
            node.index(2).unwrap().state(),
            LoadState::Truncated { shortfall: 2 }
        );
        assert_eq!(node.state(), LoadState::Partial { shortfall: 2 });
    }

    #[test]
    fn test_array_elements() {
        let ty = dynamic::array(LE.int(4).unwrap(), 8).unwrap();
        let data: Vec<u8> = (0x40u8..0x48).flat_map(|b| [b, 0, 0, 0]).collect();
        let (tree, id) = load(ty, &data);
        assert_eq!(tree.get(id).unwrap().index(4).unwrap().int().unwrap(), 0x44);
    }

    #[test]
    fn test_max_count() {
        let mut tree = Tree::new();
        tree.config_mut().set_max_count(2, true);
        let id = tree.instantiate(dynamic::array(BE.uint8(), 3).unwrap(), bytes(b"abc"));
        assert!(matches!(tree.load(id), Err(Error::InvalidArgument { .. })));

        tree.config_mut().set_max_count(2, false);
        assert!(tree.load(id).is_ok());
        assert_eq!(tree.get(id).unwrap().len(), 3);
    }

    #[test]
    fn test_terminated_array() {
        let ty = dynamic::terminated_array(BE.uint8(), |node| node.uint().is_ok_and(|v| v == 0));
        let (tree, id) = load(ty, b"abc\x00def");
        let node = tree.get(id).unwrap();
        assert_eq!(node.len(), 4);
        assert_eq!(tree.serialize(id).unwrap(), b"abc\x00".to_vec());
    }

    #[test]
    fn test_terminated_array_end_of_data() {
        let ty = dynamic::terminated_array(BE.uint16(), |_| false);
        let mut tree = Tree::new();
        let id = tree.instantiate(ty, bytes(b"abcde"));
        assert_eq!(tree.load(id).unwrap(), Outcome::Partial { shortfall: 1 });
        assert_eq!(tree.get(id).unwrap().len(), 3);
    }

    #[test]
    fn test_terminated_array_stops_at_limit() {
        let ty = dynamic::bounded_terminated_array(BE.uint8(), |_| false, 3).unwrap();
        let mut tree = Tree::new();
        let id = tree.instantiate(ty, bytes(b"abcdef"));
        assert!(tree.load(id).unwrap().is_complete());
        assert_eq!(tree.get(id).unwrap().len(), 3);
        assert_eq!(tree.serialize(id).unwrap(), b"abc");
    }

    #[test]
    fn test_terminated_view_without_zero_end() {
        let terminated = || {
            dynamic::terminated_array(BE.uint8(), |node| node.uint().is_ok_and(|value| value == 0xff))
        };
        let ty = dynamic::union([Field::new("s", terminated()), Field::new("i", BE.uint16())]);
        let mut tree = Tree::new();
        let id = tree.instantiate(ty, bytes(b"ab\xff"));
        assert!(matches!(tree.load(id), Err(Error::Resolution { .. })));

        let before = tree.len();
        assert!(matches!(tree.measure(&terminated()), Err(Error::Resolution { .. })));
        assert_eq!(tree.len(), before);

        let id = tree.instantiate(terminated(), ScratchSource::new().shared());
        assert!(matches!(tree.alloc(id), Err(Error::Resolution { .. })));
    }

    #[test]
    fn test_block_array() {
        let ty = dynamic::block_array(BE.uint16(), 6).unwrap();
        let (tree, id) = load(ty, b"\x00\x01\x00\x02\x00\x03\x00\x04");
        let node = tree.get(id).unwrap();
        assert_eq!(node.len(), 3);
        assert_eq!(node.block_size(), 6);
        assert_eq!(node.index(2).unwrap().uint().unwrap(), 3);
    }

    #[test]
    fn test_union_aliasing() {
        let ty = dynamic::union([
            Field::new("block", dynamic::block(4).unwrap()),
            Field::new("int", BE.uint32()),
        ]);
        let (mut tree, id) = load(ty, b"AAAA");
        let int = tree.view(id, "int").unwrap();
        let block = tree.view(id, "block").unwrap();
        assert_eq!(tree.get(int).unwrap().uint().unwrap(), 0x41414141);
        assert_eq!(tree.get(block).unwrap().bytes().unwrap(), b"AAAA");
        assert_eq!(tree.serialize(id).unwrap(), b"AAAA".to_vec());
    }

    #[test]
    fn test_union_static_root() {
        let ty = dynamic::union_with_root(
            dynamic::array(BE.uint8(), 4).unwrap(),
            [
                Field::new("block", dynamic::block(4).unwrap()),
                Field::new("int", BE.uint32()),
            ],
        );
        let (tree, id) = load(ty, b"AAAA");
        let node = tree.get(id).unwrap();
        let root = node.union_root().unwrap();
        assert_eq!(root.index(0).unwrap().uint().unwrap(), 0x41);
        assert_eq!(node.field("int").unwrap().uint().unwrap(), 0x41414141);
        assert_eq!(node.field("block").unwrap().size(), 4);
    }

    #[test]
    fn test_union_root_sized_by_largest_view() {
        let ty = dynamic::union([
            Field::new("a", BE.uint32()),
            Field::new("b", BE.uint16()),
            Field::new("c", BE.uint8()),
        ]);
        let mut tree = Tree::new();
        let id = tree.instantiate(ty, ScratchSource::new().shared());
        tree.alloc(id).unwrap();
        let node = tree.get(id).unwrap();
        assert_eq!(node.block_size(), 4);
        assert_eq!(node.field("a").unwrap().block_size(), 4);
        assert_eq!(node.field("b").unwrap().size(), 2);
        assert_eq!(node.field("c").unwrap().size(), 1);
    }

    #[test]
    fn test_union_view_commit_writes_through() {
        let ty = dynamic::union([
            Field::new("block", dynamic::block(4).unwrap()),
            Field::new("int", BE.uint32()),
        ]);
        let (mut tree, id) = load(ty, b"AAAA");
        let int = tree.view(id, "int").unwrap();
        tree.set_uint(int, 0x44434241).unwrap();
        tree.commit(int).unwrap();

        assert_eq!(tree.serialize(id).unwrap(), b"DCBA".to_vec());
        let block = tree.view(id, "block").unwrap();
        assert_eq!(tree.get(block).unwrap().bytes().unwrap(), b"DCBA");
    }

    #[test]
    fn test_pointer_deref() {
        let ty = BE.pointer(dynamic::block(4).unwrap(), 4).unwrap();
        let (mut tree, id) = load(ty, b"\x00\x00\x00\x04\x44\x43\x42\x41");
        assert_eq!(tree.get(id).unwrap().uint().unwrap(), 4);

        let target = tree.deref(id).unwrap();
        let node = tree.get(target).unwrap();
        assert_eq!(node.offset(), 4);
        assert_eq!(node.bytes().unwrap(), b"DCBA");
        assert_eq!(tree.deref(id).unwrap(), target);
    }

    #[test]
    fn test_pointer_little_endian_64() {
        let ty = LE.pointer(dynamic::block(4).unwrap(), 8).unwrap();
        let (mut tree, id) = load(ty, b"\x08\x00\x00\x00\x00\x00\x00\x00AAAA");
        let target = tree.deref(id).unwrap();
        assert_eq!(tree.get(target).unwrap().offset(), 8);
    }

    #[test]
    fn test_pointer_retargets_after_set() {
        let ty = BE.pointer(BE.uint8(), 1).unwrap();
        let (mut tree, id) = load(ty, b"\x01\x02\x03");
        let first = tree.deref(id).unwrap();
        assert_eq!(tree.get(first).unwrap().uint().unwrap(), 2);

        tree.set_uint(id, 2).unwrap();
        let second = tree.deref(id).unwrap();
        assert_eq!(tree.get(second).unwrap().uint().unwrap(), 3);
        assert!(tree.get(first).is_err() || first == second);
    }

    #[test]
    fn test_relative_and_offset_pointers() {
        let address = IntType::unsigned(1, ByteOrder::BigEndian).unwrap();
        let ty = dynamic::structure(
            "outer",
            [
                Field::new("pad", 2usize),
                Field::new("rel", dynamic::relative_pointer(BE.uint8(), address)),
                Field::new("off", dynamic::offset_pointer(BE.uint8(), address)),
            ],
        );
        let mut tree = Tree::new();
        let id = tree.instantiate_at(ty, BytesSource::at(0x10, b"xx\x04\x02\xaa\xbb".to_vec()).shared(), 0x10);
        tree.load(id).unwrap();

        let rel = tree.get(id).unwrap().field("rel").unwrap().id();
        let target = tree.deref(rel).unwrap();
        assert_eq!(tree.get(target).unwrap().offset(), 0x14);
        assert_eq!(tree.get(target).unwrap().uint().unwrap(), 0xaa);

        let off = tree.get(id).unwrap().field("off").unwrap().id();
        let target = tree.deref(off).unwrap();
        assert_eq!(tree.get(target).unwrap().offset(), 0x15);
        assert_eq!(tree.get(target).unwrap().uint().unwrap(), 0xbb);
    }

    #[test]
    fn test_negative_address_rejected() {
        let address = IntType::signed(1, ByteOrder::BigEndian).unwrap();
        let ty = dynamic::offset_pointer(BE.uint8(), address);
        let (mut tree, id) = load(ty, b"\xff");
        let err = tree.deref(id).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument { constructor: "pointer", .. }));
    }

    #[test]
    fn test_pointer_relative_to_selected_ancestor() {
        let address = IntType::unsigned(1, ByteOrder::BigEndian).unwrap();
        let inner = dynamic::structure(
            "inner",
            [
                Field::new("tag", BE.uint8()),
                Field::new(
                    "rel",
                    dynamic::relative_pointer_to(BE.uint8(), address, |node| node.parent().unwrap_or(node)),
                ),
            ],
        );
        let ty = dynamic::structure("outer", [Field::new("pad", 2usize), Field::new("inner", inner)]);
        let mut tree = Tree::new();
        let id = tree.instantiate_at(ty, BytesSource::at(0x10, b"xxy\x02\xaa\xbb".to_vec()).shared(), 0x10);
        tree.load(id).unwrap();

        let rel = tree.get(id).unwrap().field("inner").unwrap().field("rel").unwrap().id();
        let target = tree.deref(rel).unwrap();
        assert_eq!(tree.get(target).unwrap().offset(), 0x14);
        assert_eq!(tree.get(target).unwrap().uint().unwrap(), 0xaa);
    }

    #[test]
    fn test_pointer_from_computed_base() {
        let address = IntType::unsigned(1, ByteOrder::BigEndian).unwrap();
        let ty = dynamic::structure(
            "record",
            [
                Field::new("base", BE.uint8()),
                Field::new(
                    "off",
                    dynamic::offset_pointer_from(BE.uint8(), address, |node| {
                        node.parent()
                            .and_then(|record| record.field("base").ok())
                            .and_then(|base| base.uint().ok())
                            .map_or(0, |base| base as u64)
                    }),
                ),
            ],
        );
        let (mut tree, id) = load(ty, b"\x04\x01\x00\x00\x00\xee");
        let off = tree.get(id).unwrap().field("off").unwrap().id();
        let target = tree.deref(off).unwrap();
        assert_eq!(tree.get(target).unwrap().offset(), 5);
        assert_eq!(tree.get(target).unwrap().uint().unwrap(), 0xee);
    }

    #[test]
    fn test_pointer_past_address_space() {
        let mut tree = Tree::new();
        let ty = LE.pointer(dynamic::block(4).unwrap(), 8).unwrap();
        let id = tree.instantiate(ty, ScratchSource::new().shared());
        tree.alloc(id).unwrap();
        tree.set_uint(id, u128::from(u64::MAX)).unwrap();
        let err = tree.deref(id).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument { constructor: "offset", .. }));
        assert!(tree.get(id).unwrap().target().is_none());

        let pair = dynamic::structure("pair", [Field::new("a", BE.uint32()), Field::new("b", BE.uint32())]);
        let id = tree.instantiate(LE.pointer(pair, 8).unwrap(), ScratchSource::new().shared());
        tree.alloc(id).unwrap();
        tree.set_uint(id, u128::from(u64::MAX - 2)).unwrap();
        let err = tree.deref(id).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument { constructor: "offset", .. }));
    }

    #[test]
    fn test_partial_in_struct_little_endian() {
        let header = bit_struct("RECORDHEADER", [BitField::new("t", 10), BitField::new("l", 6)]);
        let ty = dynamic::structure(
            "broken",
            [
                Field::new("h", LE.partial(header)),
                Field::new("v", BE.uint32()),
            ],
        );
        let (tree, id) = load(ty, b"\x44\x11\x08\x00\x00\x00");
        let h = tree.get(id).unwrap().field("h").unwrap();
        let bits = h.bits().unwrap();
        assert_eq!(bits.field("t").unwrap().uint().unwrap(), 69);
        assert_eq!(bits.field("l").unwrap().uint().unwrap(), 4);
        assert_eq!(h.size(), 2);
        assert_eq!(tree.get(id).unwrap().field("v").unwrap().offset(), 2);
    }

    #[test]
    fn test_partial_set_and_serialize() {
        let header = bit_struct("RECORDHEADER", [BitField::new("t", 10), BitField::new("l", 6)]);
        let ty = dynamic::structure(
            "broken",
            [
                Field::new("h", LE.partial(header)),
                Field::new("v", LE.uint32()),
            ],
        );
        let mut tree = Tree::new();
        let id = tree.instantiate(ty, ScratchSource::new().shared());
        tree.alloc(id).unwrap();

        let v = tree.get(id).unwrap().field("v").unwrap().id();
        tree.set_uint(v, 8).unwrap();
        let h = tree.get(id).unwrap().field("h").unwrap().id();
        let bits = tree.bits_mut(h).unwrap();
        bits.field_mut("l").unwrap().set(4).unwrap();
        bits.field_mut("t").unwrap().set(0x45).unwrap();

        assert_eq!(tree.serialize(id).unwrap(), b"\x44\x11\x08\x00\x00\x00".to_vec());
    }

    #[test]
    fn test_partial_little_endian_round_trip() {
        let header = bit_struct("header", [BitField::new("instance", 12), BitField::new("version", 4)]);
        let (tree, id) = load(LE.partial(header), b"\x0f\x00");
        let bits = tree.get(id).unwrap().bits().unwrap();
        assert_eq!(bits.field("version").unwrap().uint().unwrap(), 15);
        assert_eq!(bits.field("instance").unwrap().uint().unwrap(), 0);
        assert_eq!(tree.serialize(id).unwrap(), b"\x0f\x00".to_vec());
    }

    #[test]
    fn test_partial_truncated() {
        let ty = BE.partial(bit_struct("pair", [BitField::new("a", 8), BitField::new("b", 8)]));
        let mut tree = Tree::new();
        let id = tree.instantiate(ty, bytes(b"\x12"));
        let err = tree.load(id).unwrap_err();
        assert!(matches!(err, Error::TruncatedRead { expected: 2, shortfall: 1, .. }));
        let bits = tree.get(id).unwrap().bits().unwrap();
        assert_eq!(bits.field("a").unwrap().uint().unwrap(), 0x12);
    }

    #[test]
    fn test_commit_writes_leaves() {
        let buffer = Rc::new(RefCell::new(BytesSource::new(b"\x00\x01\x00\x02".to_vec())));
        let source: SourceRef = buffer.clone();
        let ty = dynamic::structure(
            "pair",
            [Field::new("a", BE.uint16()), Field::new("b", BE.uint16())],
        );
        let mut tree = Tree::new();
        let id = tree.instantiate(ty, source);
        tree.load(id).unwrap();

        let b = tree.get(id).unwrap().field("b").unwrap().id();
        tree.set_uint(b, 0xbeef).unwrap();
        tree.commit(id).unwrap();
        assert_eq!(buffer.borrow().as_bytes(), b"\x00\x01\xbe\xef");
    }

    #[test]
    fn test_commit_failure() {
        #[derive(Debug)]
        struct ReadOnly;
        impl Source for ReadOnly {
            fn seek(&mut self, _offset: u64) {}
            fn consume(&mut self, n: usize) -> Vec<u8> {
                vec![0; n]
            }
            fn store(&mut self, _data: &[u8]) -> std::result::Result<(), crate::errors::SourceError> {
                Err(crate::errors::SourceError::ReadOnly)
            }
        }

        let mut tree = Tree::new();
        let id = tree.instantiate(BE.uint8(), crate::source::shared(ReadOnly));
        tree.load(id).unwrap();
        assert!(matches!(tree.commit(id), Err(Error::Commit { .. })));
    }

    #[test]
    fn test_serialize_uninitialized() {
        let mut tree = Tree::new();
        let id = tree.instantiate(BE.uint8(), bytes(b"a"));
        assert!(matches!(tree.serialize(id), Err(Error::Uninitialized { .. })));
    }

    #[test]
    fn test_at_and_walk_to() {
        let inner = dynamic::structure(
            "inner",
            [Field::new("x", BE.uint16()), Field::new("y", BE.uint16())],
        );
        let ty = dynamic::structure("outer", [Field::new("head", BE.uint32()), Field::new("body", inner)]);
        let (tree, id) = load(ty, &[0u8; 8]);

        let body = tree.at(id, 6, false).unwrap();
        assert_eq!(tree.get(body).unwrap().name(), "body");
        let y = tree.at(id, 6, true).unwrap();
        assert_eq!(tree.get(y).unwrap().path(), "outer.body.y");
        assert!(matches!(tree.at(id, 8, true), Err(Error::OffsetNotFound { .. })));
        assert!(matches!(tree.at(y, 6, false), Err(Error::OffsetNotFound { .. })));

        let names: Vec<&str> = tree.walk_to(id, 6).map(|n| n.name()).collect();
        assert_eq!(names, vec!["outer", "body", "y"]);
        assert!(tree.contains(id, 7));
        assert!(!tree.contains(id, 8));
    }

    #[test]
    fn test_recompute_offsets() {
        let ty = dynamic::structure(
            "record",
            [
                Field::new("name", 2usize),
                Field::new("pad", dynamic::align(4).unwrap()),
                Field::new("value", BE.uint8()),
            ],
        );
        let (mut tree, id) = load(ty, b"ab\x00\x00\x07");
        let name = tree.get(id).unwrap().field("name").unwrap().id();
        tree.set_bytes(name, b"abcde").unwrap();
        tree.recompute_offsets(id).unwrap();

        let node = tree.get(id).unwrap();
        assert_eq!(node.field("pad").unwrap().size(), 3);
        assert_eq!(node.field("value").unwrap().offset(), 8);
        assert_eq!(tree.serialize(id).unwrap(), b"abcde\x00\x00\x00\x07".to_vec());
    }

    #[test]
    fn test_cast() {
        let (mut tree, id) = load(dynamic::block(4).unwrap(), b"\x00\x00\x01\x00");
        let cast = tree.cast(id, LE.uint32()).unwrap();
        assert_eq!(tree.get(cast).unwrap().uint().unwrap(), 0x10000);
        assert_eq!(tree.get(cast).unwrap().offset(), 0);
    }

    #[test]
    fn test_measure_and_release() {
        let mut tree = Tree::new();
        let ty = dynamic::structure("s", [Field::new("a", BE.uint32()), Field::new("b", 3usize)]);
        assert_eq!(tree.measure(&ty).unwrap(), 7);
        assert!(tree.is_empty());

        let id = tree.instantiate(ty, bytes(&[0; 7]));
        tree.load(id).unwrap();
        assert_eq!(tree.len(), 3);
        tree.remove(id).unwrap();
        assert!(tree.is_empty());
    }
}

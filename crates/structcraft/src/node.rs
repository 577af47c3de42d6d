//! Nodes of the byte model and read-only views over them.
//!
//! Nodes live in a [Tree] arena and refer to each other by [NodeId]. A
//! container owns its children's ids; the parent link is only used for
//! traversal and contextual lookups.

use std::fmt;

use crate::{
    binary::BitNode,
    errors::{Error, Result},
    source::SourceRef,
    tree::Tree,
    types::Type,
};

/// Stable index of a node inside its [Tree].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn from_index(index: usize) -> Self {
        NodeId(index)
    }

    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Where a node reads from and writes to.
#[derive(Debug, Clone)]
pub enum Backing {
    /// A data source shared with the rest of the tree.
    Source(SourceRef),
    /// The bytes of a union root. Offsets are relative to the root.
    Alias(NodeId),
}

/// Value held by a node.
#[derive(Debug, Clone, Default)]
pub(crate) enum Content {
    #[default]
    Empty,
    Bytes(Vec<u8>),
    Children(Vec<NodeId>),
    Bits(BitNode),
    Union {
        root: NodeId,
        views: Vec<NodeId>,
    },
    Pointer {
        raw: Vec<u8>,
        target: Option<NodeId>,
    },
}

/// How far a node got when it was last loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadState {
    #[default]
    Uninitialized,
    Complete,
    /// Loaded, but `shortfall` bytes of padding or trailing elements were missing.
    Partial { shortfall: u64 },
    /// Required bytes were missing; the value holds what was available.
    Truncated { shortfall: u64 },
}

impl LoadState {
    pub fn is_initialized(&self) -> bool {
        matches!(self, LoadState::Complete | LoadState::Partial { .. })
    }
}

/// Result of a successful load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Complete,
    /// Usable, but short by `shortfall` bytes of padding or trailing data.
    Partial { shortfall: u64 },
}

impl Outcome {
    pub fn is_complete(&self) -> bool {
        matches!(self, Outcome::Complete)
    }

    pub(crate) fn merge(self, other: Outcome) -> Outcome {
        match (self, other) {
            (Outcome::Complete, Outcome::Complete) => Outcome::Complete,
            (Outcome::Partial { shortfall }, Outcome::Complete)
            | (Outcome::Complete, Outcome::Partial { shortfall }) => Outcome::Partial { shortfall },
            (Outcome::Partial { shortfall: a }, Outcome::Partial { shortfall: b }) => {
                Outcome::Partial { shortfall: a + b }
            }
        }
    }

    pub(crate) fn state(self) -> LoadState {
        match self {
            Outcome::Complete => LoadState::Complete,
            Outcome::Partial { shortfall } => LoadState::Partial { shortfall },
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Node {
    pub(crate) name: String,
    pub(crate) ty: Type,
    pub(crate) parent: Option<NodeId>,
    pub(crate) backing: Option<Backing>,
    pub(crate) offset: u64,
    /// Fixed size of leaves; unused by containers and partials.
    pub(crate) leaf_size: u64,
    pub(crate) declared_block_size: Option<u64>,
    pub(crate) content: Content,
    pub(crate) state: LoadState,
}

/// Read-only view of one node.
#[derive(Clone, Copy)]
pub struct NodeRef<'t> {
    tree: &'t Tree,
    id: NodeId,
    node: &'t Node,
}

impl<'t> NodeRef<'t> {
    pub(crate) fn new(tree: &'t Tree, id: NodeId, node: &'t Node) -> Self {
        NodeRef { tree, id, node }
    }

    pub fn tree(&self) -> &'t Tree {
        self.tree
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn name(&self) -> &'t str {
        &self.node.name
    }

    pub fn ty(&self) -> &'t Type {
        &self.node.ty
    }

    pub fn offset(&self) -> u64 {
        self.node.offset
    }

    /// Logical size in bytes.
    pub fn size(&self) -> u64 {
        self.tree.size_of(self.id)
    }

    /// Physical size in bytes, including declared padding.
    pub fn block_size(&self) -> u64 {
        self.tree.block_size_of(self.id)
    }

    pub fn state(&self) -> LoadState {
        self.node.state
    }

    pub fn is_initialized(&self) -> bool {
        self.node.state.is_initialized()
    }

    pub fn parent(&self) -> Option<NodeRef<'t>> {
        self.tree.get(self.node.parent?).ok()
    }

    /// Parent, grandparent and so on up to the root.
    pub fn ancestors(&self) -> impl Iterator<Item = NodeRef<'t>> + use<'t> {
        std::iter::successors(self.parent(), |node| node.parent())
    }

    /// Dotted path of names from the root down to this node.
    pub fn path(&self) -> String {
        let mut names: Vec<&str> = self.ancestors().map(|n| n.name()).collect();
        names.reverse();
        names.push(self.name());
        names.join(".")
    }

    fn child_ids(&self) -> &'t [NodeId] {
        match &self.node.content {
            Content::Children(ids) => ids,
            Content::Union { views, .. } => views,
            _ => &[],
        }
    }

    /// Children of a struct or array, or the views of a union.
    pub fn children(&self) -> impl Iterator<Item = NodeRef<'t>> + use<'t> {
        let tree = self.tree;
        self.child_ids().iter().filter_map(move |&id| tree.get(id).ok())
    }

    pub fn len(&self) -> usize {
        self.child_ids().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn index(&self, index: usize) -> Option<NodeRef<'t>> {
        let id = *self.child_ids().get(index)?;
        self.tree.get(id).ok()
    }

    /// Child or union view by name.
    pub fn field(&self, name: &str) -> Result<NodeRef<'t>> {
        self.children()
            .find(|child| child.name() == name)
            .ok_or_else(|| Error::UnknownField {
                path: self.path(),
                name: name.to_string(),
            })
    }

    /// Backing root of a union.
    pub fn union_root(&self) -> Option<NodeRef<'t>> {
        match &self.node.content {
            Content::Union { root, .. } => self.tree.get(*root).ok(),
            _ => None,
        }
    }

    /// Target of a pointer that has already been dereferenced.
    pub fn target(&self) -> Option<NodeRef<'t>> {
        match &self.node.content {
            Content::Pointer {
                target: Some(target),
                ..
            } => self.tree.get(*target).ok(),
            _ => None,
        }
    }

    /// Raw bytes of a leaf, limited to its logical size.
    pub fn bytes(&self) -> Result<&'t [u8]> {
        let data = match &self.node.content {
            Content::Bytes(data) => data,
            Content::Pointer { raw, .. } => raw,
            Content::Empty => return Err(Error::Uninitialized { path: self.path() }),
            _ => return Err(self.mismatch("a byte leaf")),
        };
        let size = usize::try_from(self.node.leaf_size).unwrap_or(usize::MAX);
        Ok(&data[..data.len().min(size)])
    }

    /// Unsigned value of an integer, pointer or partial.
    pub fn uint(&self) -> Result<u128> {
        match (&self.node.ty, &self.node.content) {
            (_, Content::Empty) => Err(Error::Uninitialized { path: self.path() }),
            (Type::Int(int), Content::Bytes(_)) => Ok(int.decode_unsigned(self.bytes()?)),
            (Type::Pointer { address, .. }, Content::Pointer { .. }) => {
                Ok(address.decode_unsigned(self.bytes()?))
            }
            (_, Content::Bits(bits)) => bits.uint(),
            _ => Err(self.mismatch("an integer")),
        }
    }

    /// Signed value of an integer, pointer or partial.
    pub fn int(&self) -> Result<i128> {
        match (&self.node.ty, &self.node.content) {
            (_, Content::Empty) => Err(Error::Uninitialized { path: self.path() }),
            (Type::Int(int), Content::Bytes(_)) => Ok(int.decode(self.bytes()?)),
            (Type::Pointer { address, .. }, Content::Pointer { .. }) => {
                Ok(address.decode(self.bytes()?))
            }
            (_, Content::Bits(bits)) => bits.int(),
            _ => Err(self.mismatch("an integer")),
        }
    }

    /// Parsed value of a partial.
    pub fn bits(&self) -> Result<&'t BitNode> {
        match &self.node.content {
            Content::Bits(bits) => Ok(bits),
            Content::Empty => Err(Error::Uninitialized { path: self.path() }),
            _ => Err(self.mismatch("a bit structure")),
        }
    }

    pub(crate) fn node(&self) -> &'t Node {
        self.node
    }

    pub(crate) fn mismatch(&self, expected: &'static str) -> Error {
        Error::KindMismatch {
            path: self.path(),
            expected,
        }
    }
}

impl fmt::Debug for NodeRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeRef")
            .field("id", &self.id)
            .field("name", &self.node.name)
            .field("offset", &self.node.offset)
            .field("state", &self.node.state)
            .finish_non_exhaustive()
    }
}

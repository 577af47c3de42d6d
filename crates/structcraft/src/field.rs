//! Field descriptors used to build struct, array and union types.

use std::{fmt, rc::Rc};

use crate::{
    errors::{Error, Result},
    node::{NodeId, NodeRef},
    tree::Tree,
    types::Type,
};

/// Closure computing a descriptor from the in-progress container.
#[derive(Clone)]
pub struct Compute(Rc<dyn Fn(&Context<'_>) -> Result<Descriptor>>);

impl Compute {
    fn call(&self, ctx: &Context<'_>) -> Result<Descriptor> {
        (self.0)(ctx)
    }
}

impl fmt::Debug for Compute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Compute(..)")
    }
}

/// Schema-time description of a field's type.
#[derive(Debug, Clone)]
pub enum Descriptor {
    /// A concrete type.
    Type(Type),
    /// Shorthand for a block of this many bytes.
    Length(usize),
    /// A function of the already-parsed siblings.
    Computed(Compute),
}

impl Descriptor {
    pub fn computed(compute: impl Fn(&Context<'_>) -> Result<Descriptor> + 'static) -> Self {
        Descriptor::Computed(Compute(Rc::new(compute)))
    }

    /// Follows computed descriptors until a concrete type is reached.
    ///
    /// At most `depth` computed steps are taken.
    pub fn resolve(&self, field: &str, ctx: &Context<'_>, depth: usize) -> Result<Type> {
        let mut current = match self {
            Descriptor::Type(ty) => return Ok(ty.clone()),
            Descriptor::Length(size) => return Ok(Type::Block { size: *size }),
            Descriptor::Computed(compute) => compute.call(ctx)?,
        };

        for _ in 1..depth {
            current = match current {
                Descriptor::Type(ty) => return Ok(ty),
                Descriptor::Length(size) => return Ok(Type::Block { size }),
                Descriptor::Computed(compute) => compute.call(ctx)?,
            };
        }

        match current {
            Descriptor::Type(ty) => Ok(ty),
            Descriptor::Length(size) => Ok(Type::Block { size }),
            Descriptor::Computed(_) => Err(Error::resolution(
                field,
                format!("no concrete type after {} computed steps", depth),
            )),
        }
    }

    pub fn label(&self) -> String {
        match self {
            Descriptor::Type(ty) => ty.label(),
            Descriptor::Length(size) => format!("block({})", size),
            Descriptor::Computed(_) => "?".to_string(),
        }
    }
}

impl From<Type> for Descriptor {
    fn from(value: Type) -> Self {
        Descriptor::Type(value)
    }
}

impl From<usize> for Descriptor {
    fn from(value: usize) -> Self {
        Descriptor::Length(value)
    }
}

/// A named entry of a field list.
#[derive(Debug, Clone)]
pub struct Field {
    pub name: String,
    pub descriptor: Descriptor,
}

impl Field {
    pub fn new(name: impl Into<String>, descriptor: impl Into<Descriptor>) -> Self {
        Field {
            name: name.into(),
            descriptor: descriptor.into(),
        }
    }

    pub fn computed(
        name: impl Into<String>,
        compute: impl Fn(&Context<'_>) -> Result<Descriptor> + 'static,
    ) -> Self {
        Field::new(name, Descriptor::computed(compute))
    }
}

/// What a computed descriptor can see while its container is being loaded.
#[derive(Clone, Copy)]
pub struct Context<'t> {
    tree: &'t Tree,
    container: Option<NodeId>,
    offset: u64,
}

impl<'t> Context<'t> {
    pub(crate) fn new(tree: &'t Tree, container: Option<NodeId>, offset: u64) -> Self {
        Context {
            tree,
            container,
            offset,
        }
    }

    pub fn tree(&self) -> &'t Tree {
        self.tree
    }

    /// The container being populated; `None` for a detached root.
    pub fn container(&self) -> Option<NodeRef<'t>> {
        self.container.and_then(|id| self.tree.get(id).ok())
    }

    /// Offset where the field being resolved will be placed.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Number of children already placed in the container.
    pub fn len(&self) -> usize {
        self.container().map_or(0, |c| c.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The most recently placed child.
    pub fn last(&self) -> Option<NodeRef<'t>> {
        let container = self.container()?;
        container.index(container.len().checked_sub(1)?)
    }

    /// An already placed sibling by name.
    pub fn field(&self, name: &str) -> Result<NodeRef<'t>> {
        match self.container() {
            Some(container) => container.field(name),
            None => Err(Error::UnknownField {
                path: String::new(),
                name: name.to_string(),
            }),
        }
    }

    /// Unsigned value of an already placed sibling.
    pub fn uint(&self, name: &str) -> Result<u128> {
        self.field(name)?.uint()
    }

    /// Signed value of an already placed sibling.
    pub fn int(&self, name: &str) -> Result<i128> {
        self.field(name)?.int()
    }
}

impl fmt::Debug for Context<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("container", &self.container)
            .field("offset", &self.offset)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_descriptors() {
        let tree = Tree::new();
        let ctx = Context::new(&tree, None, 0);
        assert!(matches!(
            Descriptor::Length(3).resolve("x", &ctx, 4).unwrap(),
            Type::Block { size: 3 }
        ));
        assert!(matches!(
            Descriptor::from(Type::Block { size: 1 }).resolve("x", &ctx, 4).unwrap(),
            Type::Block { size: 1 }
        ));
    }

    #[test]
    fn test_computed_chain() {
        let tree = Tree::new();
        let ctx = Context::new(&tree, None, 12);
        let desc = Descriptor::computed(|ctx| {
            let size = ctx.offset() as usize;
            Ok(Descriptor::computed(move |_| Ok(Descriptor::Length(size))))
        });
        assert!(matches!(
            desc.resolve("x", &ctx, 4).unwrap(),
            Type::Block { size: 12 }
        ));
    }

    #[test]
    fn test_unbounded_chain_fails() {
        fn forever() -> Descriptor {
            Descriptor::computed(|_| Ok(forever()))
        }

        let tree = Tree::new();
        let ctx = Context::new(&tree, None, 0);
        let err = forever().resolve("loop", &ctx, 8).unwrap_err();
        assert!(matches!(err, Error::Resolution { ref field, .. } if field == "loop"));
    }

    #[test]
    fn test_missing_sibling() {
        let tree = Tree::new();
        let ctx = Context::new(&tree, None, 0);
        assert!(matches!(
            ctx.uint("length"),
            Err(Error::UnknownField { .. })
        ));
    }
}

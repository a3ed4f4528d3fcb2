//! The definition graph.
//!
//! Definitions live in an arena ([`DefinitionTable`]) and refer to each other
//! through [`DefId`] handles: owner, supertype and alias edges never own the
//! definition they point at.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, OnceLock};

use derive_more::Display;
use serde::{Deserialize, Serialize};

use crate::collection::CollectionElements;
use crate::construction::Construction;
use crate::host::ExternalDef;
use crate::instantiation::Instantiation;
use crate::name::Name;

mod builder;
mod table;

pub use builder::{DefSpec, TableBuilder};
pub use table::DefinitionTable;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display,
)]
#[display("#{_0}")]
pub struct DefId(pub u32);

impl DefId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Access {
    /// Visible only inside the owning definition.
    Local,
    /// Visible anywhere in the same site.
    Site,
    #[default]
    Public,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Durability {
    /// Re-evaluated on every reference.
    Dynamic,
    /// Kept for the lifetime of the context scope that constructed it.
    #[default]
    InContext,
    /// Kept for the lifetime of the runtime, shared by every context.
    Global,
    /// Constructed once per runtime.
    Static,
}

#[derive(Debug, Clone)]
pub struct ParamDef {
    pub name: String,
    /// `int`, `float`, `text`, `bool` or the name of a definition.
    pub type_name: Option<String>,
    pub default: Option<Construction>,
}

impl ParamDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: None,
            default: None,
        }
    }

    pub fn typed(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: Some(type_name.into()),
            default: None,
        }
    }

    pub fn with_default(mut self, default: Construction) -> Self {
        self.default = Some(default);
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct ParamList {
    pub params: Vec<ParamDef>,
}

impl ParamList {
    pub fn new(params: Vec<ParamDef>) -> Self {
        Self { params }
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.params.iter().position(|p| p.name == name)
    }

    /// Number of parameters without a default value.
    pub fn required(&self) -> usize {
        self.params.iter().filter(|p| p.default.is_none()).count()
    }

    pub fn accepts_arity(&self, arity: usize) -> bool {
        arity <= self.params.len() && arity >= self.required()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CollectionShape {
    Array,
    Table,
}

#[derive(Debug)]
pub struct CollectionDef {
    pub shape: CollectionShape,
    pub elements: Arc<CollectionElements>,
    /// Dimension sizes written in the declaration, outermost first.
    pub declared_dims: Vec<Option<usize>>,
    dims: OnceLock<usize>,
}

impl CollectionDef {
    pub fn new(elements: CollectionElements, declared_dims: Vec<Option<usize>>) -> Self {
        let shape = match elements {
            CollectionElements::Array(_) => CollectionShape::Array,
            CollectionElements::Table(_) => CollectionShape::Table,
        };
        Self {
            shape,
            elements: Arc::new(elements),
            declared_dims,
            dims: OnceLock::new(),
        }
    }

    /// Dimensionality, fixed by the link pass.
    pub fn dimensions(&self) -> Option<usize> {
        self.dims.get().copied()
    }

    pub fn fix_dimensions(&self, compute: impl FnOnce() -> usize) -> usize {
        *self.dims.get_or_init(compute)
    }
}

#[derive(Debug)]
pub enum DefKind {
    Anonymous {
        contents: Vec<Construction>,
    },
    Named {
        contents: Vec<Construction>,
    },
    /// Value entirely delegated to another reference.
    Alias {
        target: Construction,
    },
    Collection(CollectionDef),
    /// Declares that names matching `pattern` are bound to host objects.
    External {
        pattern: String,
    },
    /// Namespace boundary. The core library is a site too.
    Site {
        adopted: Vec<Name>,
        is_core: bool,
    },
    /// Synthetic composite of several definitions.
    Union {
        members: Vec<DefId>,
    },
}

#[derive(Debug)]
pub struct Definition {
    pub id: DefId,
    pub name: String,
    pub full_name: Name,
    pub owner: Option<DefId>,
    pub access: Access,
    pub durability: Durability,
    pub is_abstract: bool,
    pub supertype: Option<Name>,
    pub param_lists: Vec<ParamList>,
    pub kind: DefKind,
    pub children: Vec<DefId>,
    resolved_supertype: OnceLock<Option<DefId>>,
}

impl Definition {
    pub fn contents(&self) -> &[Construction] {
        match &self.kind {
            DefKind::Anonymous { contents } | DefKind::Named { contents } => contents,
            _ => &[],
        }
    }

    pub fn alias_target(&self) -> Option<&Instantiation> {
        match &self.kind {
            DefKind::Alias { target } => target.as_instantiation(),
            _ => None,
        }
    }

    pub fn alias_construction(&self) -> Option<&Construction> {
        match &self.kind {
            DefKind::Alias { target } => Some(target),
            _ => None,
        }
    }

    pub fn collection(&self) -> Option<&CollectionDef> {
        match &self.kind {
            DefKind::Collection(collection) => Some(collection),
            _ => None,
        }
    }

    pub fn is_anonymous(&self) -> bool {
        matches!(self.kind, DefKind::Anonymous { .. })
    }

    pub fn is_alias(&self) -> bool {
        matches!(self.kind, DefKind::Alias { .. })
    }

    pub fn is_site(&self) -> bool {
        matches!(self.kind, DefKind::Site { .. })
    }

    pub fn is_core(&self) -> bool {
        matches!(self.kind, DefKind::Site { is_core: true, .. })
    }

    pub fn is_external_declaration(&self) -> bool {
        matches!(self.kind, DefKind::External { .. })
    }

    pub fn union_members(&self) -> &[DefId] {
        match &self.kind {
            DefKind::Union { members } => members,
            _ => &[],
        }
    }

    pub fn has_params(&self) -> bool {
        !self.param_lists.is_empty()
    }

    /// Whether any parameter list declares `name`.
    pub fn declares_param(&self, name: &str) -> bool {
        self.param_lists.iter().any(|list| list.position(name).is_some())
    }

    pub fn param_list(&self, index: usize) -> Option<&ParamList> {
        self.param_lists.get(index)
    }

    pub fn supertype_id(&self) -> Option<DefId> {
        self.resolved_supertype.get().copied().flatten()
    }

    pub fn is_supertype_linked(&self) -> bool {
        self.resolved_supertype.get().is_some()
    }

    pub fn link_supertype(&self, supertype: Option<DefId>) {
        let _ = self.resolved_supertype.set(supertype);
    }
}

impl fmt::Display for Definition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.full_name.is_empty() {
            write!(f, "{}", self.full_name)
        } else if !self.name.is_empty() {
            f.write_str(&self.name)
        } else {
            write!(f, "<anonymous {}>", self.id)
        }
    }
}

/// A definition as seen by the resolver: either an arena node or a proxy
/// onto a host object created during resolution.
#[derive(Clone)]
pub enum DefRef {
    Node(DefId),
    External(Arc<ExternalDef>),
}

impl DefRef {
    pub fn id(&self) -> Option<DefId> {
        match self {
            DefRef::Node(id) => Some(*id),
            DefRef::External(_) => None,
        }
    }

    pub fn external(&self) -> Option<&Arc<ExternalDef>> {
        match self {
            DefRef::External(ext) => Some(ext),
            DefRef::Node(_) => None,
        }
    }

    pub fn is_node(&self, id: DefId) -> bool {
        matches!(self, DefRef::Node(own) if *own == id)
    }
}

impl From<DefId> for DefRef {
    fn from(id: DefId) -> Self {
        DefRef::Node(id)
    }
}

impl PartialEq for DefRef {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (DefRef::Node(a), DefRef::Node(b)) => a == b,
            (DefRef::External(a), DefRef::External(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl Eq for DefRef {}

impl Hash for DefRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            DefRef::Node(id) => {
                0u8.hash(state);
                id.hash(state);
            }
            DefRef::External(ext) => {
                1u8.hash(state);
                (Arc::as_ptr(ext) as usize).hash(state);
            }
        }
    }
}

impl fmt::Display for DefRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DefRef::Node(id) => write!(f, "{}", id),
            DefRef::External(ext) => write!(f, "{}", ext.name),
        }
    }
}

impl fmt::Debug for DefRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DefRef::Node(id) => write!(f, "Node({})", id),
            DefRef::External(ext) => write!(f, "External({})", ext.name),
        }
    }
}

//! References to definitions.

use std::fmt;
use std::sync::OnceLock;

use itertools::Itertools;

use crate::construction::Construction;
use crate::def::DefId;
use crate::name::{Name, SpecialName};

/// One segment of a reference, with the arguments and indexes written on it.
#[derive(Debug, Clone)]
pub struct NamePart {
    pub name: String,
    pub args: Option<Vec<Construction>>,
    pub indexes: Vec<Construction>,
}

impl NamePart {
    pub fn plain(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: None,
            indexes: Vec::new(),
        }
    }

    pub fn call(name: impl Into<String>, args: Vec<Construction>) -> Self {
        Self {
            name: name.into(),
            args: Some(args),
            indexes: Vec::new(),
        }
    }

    pub fn args(&self) -> &[Construction] {
        self.args.as_deref().unwrap_or(&[])
    }

    pub fn has_args(&self) -> bool {
        self.args.as_ref().map(|a| !a.is_empty()).unwrap_or(false)
    }
}

/// Which kind of parameter a reference names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamKind {
    /// A parameter of the current definition.
    Plain,
    /// Dotted access into the value of a parameter.
    Child,
    /// The parameter of an enclosing for-loop.
    Loop,
    /// A parameter of an outer lexical definition.
    Container,
}

/// How a reference resolves. Computed once, then fixed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResolutionKind {
    Unresolved,
    Static(DefId),
    Local(DefId),
    Parameter(ParamKind),
    External,
    Explicit(DefId),
    Class,
    Dynamic,
    Special(SpecialName),
}

impl ResolutionKind {
    pub fn is_parameter(self) -> bool {
        matches!(self, ResolutionKind::Parameter(_))
    }

    /// The definition a reference of this kind is bound to regardless of context.
    pub fn fixed_definition(self) -> Option<DefId> {
        match self {
            ResolutionKind::Static(id) | ResolutionKind::Local(id) => Some(id),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub struct Instantiation {
    parts: Vec<NamePart>,
    bound: Option<DefId>,
    concurrent: bool,
    owner: OnceLock<DefId>,
    kind: OnceLock<ResolutionKind>,
}

impl Instantiation {
    pub fn from_parts(parts: Vec<NamePart>) -> Self {
        Self {
            parts,
            bound: None,
            concurrent: false,
            owner: OnceLock::new(),
            kind: OnceLock::new(),
        }
    }

    pub fn parse(name: &str) -> Self {
        let parts = Name::parse(name)
            .segments()
            .iter()
            .map(NamePart::plain)
            .collect();
        Self::from_parts(parts)
    }

    pub fn with_args(mut self, args: Vec<Construction>) -> Self {
        if let Some(last) = self.parts.last_mut() {
            last.args = Some(args);
        }
        self
    }

    pub fn with_indexes(mut self, indexes: Vec<Construction>) -> Self {
        if let Some(last) = self.parts.last_mut() {
            last.indexes = indexes;
        }
        self
    }

    /// Pre-bind the reference to a definition known when the tree was built.
    pub fn bound_to(mut self, def: DefId) -> Self {
        self.bound = Some(def);
        self
    }

    /// Mark the reference to be constructed on a worker.
    pub fn concurrently(mut self) -> Self {
        self.concurrent = true;
        self
    }

    pub fn parts(&self) -> &[NamePart] {
        &self.parts
    }

    pub fn first(&self) -> &str {
        self.parts.first().map(|p| p.name.as_str()).unwrap_or("")
    }

    pub fn last_part(&self) -> Option<&NamePart> {
        self.parts.last()
    }

    pub fn name(&self) -> Name {
        Name::new(self.parts.iter().map(|p| p.name.clone()).collect())
    }

    pub fn args(&self) -> &[Construction] {
        self.parts.last().map(NamePart::args).unwrap_or(&[])
    }

    pub fn indexes(&self) -> &[Construction] {
        self.parts
            .last()
            .map(|p| p.indexes.as_slice())
            .unwrap_or(&[])
    }

    pub fn is_multi_part(&self) -> bool {
        self.parts.len() > 1
    }

    pub fn bound(&self) -> Option<DefId> {
        self.bound
    }

    pub fn is_concurrent(&self) -> bool {
        self.concurrent
    }

    pub fn special(&self) -> Option<SpecialName> {
        SpecialName::parse(self.first())
    }

    /// The definition whose body contains this reference, once linked.
    pub fn owner(&self) -> Option<DefId> {
        self.owner.get().copied()
    }

    /// Record the lexical owner. Returns false if a different owner was
    /// already recorded.
    pub fn set_owner(&self, owner: DefId) -> bool {
        *self.owner.get_or_init(|| owner) == owner
    }

    pub fn kind(&self) -> ResolutionKind {
        self.kind
            .get()
            .copied()
            .unwrap_or(ResolutionKind::Unresolved)
    }

    pub fn is_classified(&self) -> bool {
        self.kind.get().is_some()
    }

    /// Compute the resolution kind at most once, even when several threads
    /// reach the reference at the same time.
    pub fn classify_with(&self, classify: impl FnOnce() -> ResolutionKind) -> ResolutionKind {
        *self.kind.get_or_init(classify)
    }
}

impl fmt::Display for Instantiation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered = self
            .parts
            .iter()
            .map(|part| {
                let mut text = part.name.clone();
                if let Some(args) = &part.args {
                    text.push_str(&format!("({})", args.iter().join(", ")));
                }
                for index in &part.indexes {
                    text.push_str(&format!("[{}]", index));
                }
                text
            })
            .join(".");
        f.write_str(&rendered)
    }
}

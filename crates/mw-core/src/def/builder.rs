use std::collections::HashMap;
use std::sync::OnceLock;

use super::{
    Access, CollectionDef, DefId, DefKind, Definition, DefinitionTable, Durability, ParamDef,
    ParamList,
};
use crate::collection::CollectionElements;
use crate::construction::Construction;
use crate::diagnostics::Diagnostic;
use crate::error::{Error, Result};
use crate::name::Name;

/// Description of one definition, as a parser would hand it over.
#[derive(Debug)]
pub struct DefSpec {
    name: Option<String>,
    kind: DefKind,
    access: Access,
    durability: Durability,
    is_abstract: bool,
    supertype: Option<Name>,
    param_lists: Vec<ParamList>,
}

impl DefSpec {
    fn with_kind(name: Option<String>, kind: DefKind) -> Self {
        Self {
            name,
            kind,
            access: Access::default(),
            durability: Durability::default(),
            is_abstract: false,
            supertype: None,
            param_lists: Vec::new(),
        }
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self::with_kind(
            Some(name.into()),
            DefKind::Named {
                contents: Vec::new(),
            },
        )
    }

    pub fn anonymous() -> Self {
        Self::with_kind(
            None,
            DefKind::Anonymous {
                contents: Vec::new(),
            },
        )
    }

    pub fn alias(name: impl Into<String>, target: Construction) -> Self {
        Self::with_kind(Some(name.into()), DefKind::Alias { target })
    }

    pub fn collection(
        name: impl Into<String>,
        elements: CollectionElements,
        declared_dims: Vec<Option<usize>>,
    ) -> Self {
        Self::with_kind(
            Some(name.into()),
            DefKind::Collection(CollectionDef::new(elements, declared_dims)),
        )
    }

    pub fn external(name: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::with_kind(
            Some(name.into()),
            DefKind::External {
                pattern: pattern.into(),
            },
        )
    }

    pub fn site(name: impl Into<String>) -> Self {
        Self::with_kind(
            Some(name.into()),
            DefKind::Site {
                adopted: Vec::new(),
                is_core: false,
            },
        )
    }

    pub fn union(name: impl Into<String>, members: Vec<DefId>) -> Self {
        Self::with_kind(Some(name.into()), DefKind::Union { members })
    }

    pub fn contents(mut self, body: Vec<Construction>) -> Self {
        if let DefKind::Anonymous { contents } | DefKind::Named { contents } = &mut self.kind {
            *contents = body;
        }
        self
    }

    /// Single-construction body.
    pub fn value(self, construction: Construction) -> Self {
        self.contents(vec![construction])
    }

    pub fn extends(mut self, supertype: &str) -> Self {
        self.supertype = Some(Name::parse(supertype));
        self
    }

    /// Add a parameter list. Several lists give overload-style dispatch.
    pub fn params(mut self, params: Vec<ParamDef>) -> Self {
        self.param_lists.push(ParamList::new(params));
        self
    }

    pub fn access(mut self, access: Access) -> Self {
        self.access = access;
        self
    }

    pub fn durability(mut self, durability: Durability) -> Self {
        self.durability = durability;
        self
    }

    pub fn abstract_def(mut self) -> Self {
        self.is_abstract = true;
        self
    }

    /// Merge another site's namespace into this one.
    pub fn adopt(mut self, site: &str) -> Self {
        if let DefKind::Site { adopted, .. } = &mut self.kind {
            adopted.push(Name::parse(site));
        }
        self
    }
}

/// Builds a [`DefinitionTable`] under a root site.
pub struct TableBuilder {
    defs: Vec<Definition>,
    root: DefId,
    core: Option<DefId>,
}

impl TableBuilder {
    pub fn new(root_name: &str) -> Self {
        let root = Definition {
            id: DefId(0),
            name: root_name.to_string(),
            full_name: Name::default(),
            owner: None,
            access: Access::Public,
            durability: Durability::InContext,
            is_abstract: false,
            supertype: None,
            param_lists: Vec::new(),
            kind: DefKind::Site {
                adopted: Vec::new(),
                is_core: false,
            },
            children: Vec::new(),
            resolved_supertype: OnceLock::new(),
        };
        Self {
            defs: vec![root],
            root: DefId(0),
            core: None,
        }
    }

    pub fn root(&self) -> DefId {
        self.root
    }

    /// The built-in library site, consulted last among sites.
    pub fn core_site(&mut self) -> DefId {
        if let Some(core) = self.core {
            return core;
        }
        let id = self.push(
            None,
            DefSpec::with_kind(
                Some("core".to_string()),
                DefKind::Site {
                    adopted: Vec::new(),
                    is_core: true,
                },
            ),
            Name::simple("core"),
        );
        self.core = Some(id);
        id
    }

    pub fn add(&mut self, owner: DefId, spec: DefSpec) -> DefId {
        let id = DefId(self.defs.len() as u32);
        let owner_def = &self.defs[owner.index()];
        let full_name = match &spec.name {
            Some(name) => owner_def.full_name.child(name.clone()),
            None => owner_def.full_name.child(format!("<{}>", id)),
        };
        let id = self.push(Some(owner), spec, full_name);
        self.defs[owner.index()].children.push(id);
        id
    }

    fn push(&mut self, owner: Option<DefId>, spec: DefSpec, full_name: Name) -> DefId {
        let id = DefId(self.defs.len() as u32);
        self.defs.push(Definition {
            id,
            name: spec.name.unwrap_or_default(),
            full_name,
            owner,
            access: spec.access,
            durability: spec.durability,
            is_abstract: spec.is_abstract,
            supertype: spec.supertype,
            param_lists: spec.param_lists,
            kind: spec.kind,
            children: Vec::new(),
            resolved_supertype: OnceLock::new(),
        });
        id
    }

    /// Freeze the tree. Fails when two named definitions share a full name.
    pub fn finish(self) -> Result<DefinitionTable> {
        let mut by_full_name = HashMap::new();
        for def in &self.defs {
            if def.name.is_empty() || def.full_name.is_empty() {
                continue;
            }
            if let Some(previous) = by_full_name.insert(def.full_name.clone(), def.id) {
                return Err(Error::diagnostic(
                    Diagnostic::error(format!("duplicate definition {}", def.full_name))
                        .with_definition(def.id)
                        .with_suggestion(format!("first defined as {}", previous))
                        .with_code("duplicate"),
                ));
            }
        }
        Ok(DefinitionTable::new(
            self.defs,
            self.root,
            self.core,
            by_full_name,
        ))
    }
}

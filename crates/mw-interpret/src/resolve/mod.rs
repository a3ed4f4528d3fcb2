//! Definition lookup.
//!
//! The first segment of a reference is resolved by a fixed cascade, stopping
//! at the first match:
//!
//! 1. a definition bound when the tree was built
//! 2. a child of the reference's owner
//! 3. a parameter: of the owner, of an enclosing loop, of a container
//! 4. a member of the class of the instance on top of the context
//! 5. a member of each containing instance, up to the site
//! 6. the local, containing, root, adopted and core sites
//! 7. a fully qualified name
//! 8. a host object bound through an external declaration
//!
//! Special identifiers (`this`, `owner`, `super`, ...) are recognized
//! before the cascade runs. Later segments are children of the previous
//! one and are resolved during construction.

use mw_core::def::{DefId, DefRef};
use mw_core::instantiation::{Instantiation, ParamKind, ResolutionKind};
use mw_core::{debug, trace, Context, Value};

use crate::eval::Evaluator;

mod hierarchy;
mod params;
mod site;
mod special;

/// What the first segment of a reference denotes.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolved {
    /// A definition to construct. `scope` is the context depth of the
    /// instance it was found in; construction happens with that entry on
    /// top. `as_super` constructs it on behalf of that instance.
    Definition {
        def: DefRef,
        scope: Option<usize>,
        as_super: bool,
    },
    Parameter {
        depth: usize,
        index: usize,
    },
    LoopVariable {
        depth: usize,
    },
    /// The live instance at a context depth.
    Instance {
        depth: usize,
    },
    Value(Value),
    /// A special identifier that denotes nothing in this context.
    Empty,
}

impl Resolved {
    pub fn definition(def: impl Into<DefRef>, scope: Option<usize>) -> Self {
        Resolved::Definition {
            def: def.into(),
            scope,
            as_super: false,
        }
    }

    pub fn def_ref(&self) -> Option<&DefRef> {
        match self {
            Resolved::Definition { def, .. } => Some(def),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Lookup {
    pub resolved: Resolved,
    /// The definition the name denoted before alias substitution.
    pub nominal: Option<DefRef>,
    /// Leading segments covered by the lookup.
    pub consumed: usize,
    pub kind: ResolutionKind,
}

impl Lookup {
    fn new(resolved: Resolved, kind: ResolutionKind) -> Self {
        let nominal = resolved.def_ref().cloned();
        Self {
            resolved,
            nominal,
            consumed: 1,
            kind,
        }
    }

    fn consuming(mut self, consumed: usize) -> Self {
        self.consumed = consumed;
        self
    }
}

/// Aliases substituted while resolving one reference.
#[derive(Debug, Default)]
pub(crate) struct AliasTrail {
    visited: Vec<DefId>,
}

impl Evaluator {
    /// Resolve the first segment(s) of `inst` in `ctx`. `None` means the
    /// name is undefined here.
    pub fn lookup(&self, ctx: &Context, inst: &Instantiation) -> Option<Lookup> {
        if inst.parts().is_empty() {
            return None;
        }
        let origin = self.origin(ctx, inst);
        let found = self.cascade(ctx, inst, origin, &mut AliasTrail::default());
        match &found {
            Some(lookup) => {
                inst.classify_with(|| lookup.kind);
                self.log_step(format_args!("{} -> {:?}", inst, lookup.resolved));
            }
            None => self.log_step(format_args!("{} is undefined from {}", inst, origin)),
        }
        found
    }

    /// Resolve a dotted name written as text, as if it appeared in the
    /// definition on top of the context.
    pub fn lookup_name(&self, ctx: &Context, name: &str) -> Option<Lookup> {
        self.lookup(ctx, &Instantiation::parse(name))
    }

    /// The definition whose body the reference appears in. References built
    /// outside the tree behave as if written in the instance on top.
    pub(crate) fn origin(&self, ctx: &Context, inst: &Instantiation) -> DefId {
        inst.owner()
            .or_else(|| {
                ctx.entries()
                    .iter()
                    .rev()
                    .filter(|entry| !entry.is_loop())
                    .find_map(|entry| entry.def_id())
            })
            .unwrap_or_else(|| self.table().root())
    }

    pub(crate) fn log_step(&self, message: std::fmt::Arguments<'_>) {
        if self.runtime().options().trace_resolution {
            debug!("resolve: {}", message);
        } else {
            trace!("resolve: {}", message);
        }
    }

    pub(crate) fn cascade(
        &self,
        ctx: &Context,
        inst: &Instantiation,
        origin: DefId,
        trail: &mut AliasTrail,
    ) -> Option<Lookup> {
        let table = self.table();
        let name = inst.first();

        if let Some(special) = inst.special() {
            let resolved = self.special(ctx, special, origin);
            return Some(Lookup::new(resolved, ResolutionKind::Special(special)));
        }

        // 1. bound when the tree was built
        if let Some(bound) = inst.bound() {
            return self.found(ctx, bound, None, ResolutionKind::Static(bound), trail);
        }

        // 2. local
        // the link pass fixes local references of linked bodies only
        let local = match inst.kind() {
            ResolutionKind::Local(id) if inst.owner().is_some() => Some(id),
            _ => table.child(origin, name),
        };
        let local = local.filter(|id| {
            !self.is_self_alias(*id, origin)
                && !self.is_overridden(ctx, *id, origin)
                && !self.shadowed_by_param(ctx, name, origin)
        });
        if let Some(local) = local {
            let scope = self.instance_depth(ctx, origin);
            return self.found(ctx, local, scope, ResolutionKind::Local(local), trail);
        }

        // 3. parameters
        if let Some((resolved, kind)) = self.parameter(ctx, name, origin) {
            let kind = if inst.is_multi_part() {
                ParamKind::Child
            } else {
                kind
            };
            return Some(Lookup::new(resolved, ResolutionKind::Parameter(kind)));
        }

        // 4. class of the current instance
        if let Some((member, depth)) = self.class_member(ctx, name, origin) {
            return self.found(ctx, member, Some(depth), ResolutionKind::Class, trail);
        }

        // 5. containment
        if let Some((member, scope)) = self.contained_member(ctx, name, origin) {
            return self.found(ctx, member, scope, ResolutionKind::Dynamic, trail);
        }

        // 6. sites
        if let Some(member) = self.site_member(name, origin) {
            let scope = self.instance_depth(ctx, table.get(member).owner.unwrap_or(table.root()));
            return self.found(ctx, member, scope, ResolutionKind::Dynamic, trail);
        }

        // 7. fully qualified
        if let Some((explicit, consumed)) = self.explicit(inst, origin) {
            return self
                .found(ctx, explicit, None, ResolutionKind::Explicit(explicit), trail)
                .map(|lookup| lookup.consuming(consumed));
        }

        // 8. external
        if let Some(external) = self.external_binding(name, origin) {
            return Some(Lookup::new(
                Resolved::definition(DefRef::External(external), None),
                ResolutionKind::External,
            ));
        }

        None
    }

    /// Wrap a found definition, substituting aliases. `None` when the alias
    /// chain loops back on itself.
    fn found(
        &self,
        ctx: &Context,
        def: DefId,
        scope: Option<usize>,
        kind: ResolutionKind,
        trail: &mut AliasTrail,
    ) -> Option<Lookup> {
        let target = self.dealias(ctx, def, trail)?;
        let mut lookup = Lookup::new(target, kind);
        lookup.nominal = Some(DefRef::Node(def));
        if let Resolved::Definition {
            scope: found_scope,
            def: DefRef::Node(id),
            ..
        } = &mut lookup.resolved
        {
            if *id == def {
                *found_scope = scope;
            }
        }
        Some(lookup)
    }
}

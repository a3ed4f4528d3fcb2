use super::*;

use mw_core::name::SpecialName;

impl Evaluator {
    /// Depth of the live instance of `def`: the nearest entry, from the
    /// top, constructing `def` or one of its subtypes. Loop frames and
    /// supertype entries pushed on behalf of a subtype are skipped.
    pub(crate) fn instance_depth(&self, ctx: &Context, def: DefId) -> Option<usize> {
        let table = self.table();
        ctx.entries()
            .iter()
            .enumerate()
            .rev()
            .filter(|(_, entry)| !entry.is_loop() && !entry.super_push)
            .find(|(_, entry)| {
                entry
                    .def_id()
                    .map(|id| id == def || table.is_subtype_of(id, def))
                    .unwrap_or(false)
            })
            .map(|(depth, _)| depth)
    }

    /// Depth of the instance on top, ignoring loop frames and supertype
    /// entries.
    pub(crate) fn current_instance(&self, ctx: &Context) -> Option<usize> {
        ctx.entries()
            .iter()
            .enumerate()
            .rev()
            .find(|(_, entry)| !entry.is_loop() && !entry.super_push)
            .map(|(depth, _)| depth)
    }

    fn this_depth(&self, ctx: &Context, origin: DefId) -> Option<usize> {
        self.instance_depth(ctx, origin)
            .or_else(|| self.current_instance(ctx))
    }

    pub(super) fn special(&self, ctx: &Context, special: SpecialName, origin: DefId) -> Resolved {
        let table = self.table();
        match special {
            SpecialName::This | SpecialName::Def => match self.this_depth(ctx, origin) {
                Some(depth) => Resolved::Instance { depth },
                None => Resolved::Empty,
            },
            SpecialName::Owner => {
                let Some(owner) = table.get(origin).owner else {
                    return Resolved::Empty;
                };
                match self.instance_depth(ctx, owner) {
                    Some(depth) => Resolved::Instance { depth },
                    None => Resolved::definition(owner, None),
                }
            }
            SpecialName::Container => {
                let Some(this) = self.this_depth(ctx, origin) else {
                    return Resolved::Empty;
                };
                ctx.entries()[..this]
                    .iter()
                    .enumerate()
                    .rev()
                    .find(|(_, entry)| !entry.is_loop() && !entry.super_push)
                    .map(|(depth, _)| Resolved::Instance { depth })
                    .unwrap_or(Resolved::Empty)
            }
            SpecialName::Super => {
                let depth = self.instance_depth(ctx, origin);
                // the supertype of the class that wrote the reference, not
                // of the subtype currently constructed
                match table.supertype(origin) {
                    Some(sup) => Resolved::Definition {
                        def: DefRef::Node(sup),
                        scope: depth,
                        as_super: depth.is_some(),
                    },
                    None => Resolved::Empty,
                }
            }
            SpecialName::Sub => {
                let Some(depth) = self.instance_depth(ctx, origin) else {
                    return Resolved::Empty;
                };
                match ctx.entries()[depth].def_id() {
                    Some(active) if active != origin => Resolved::Instance { depth },
                    _ => Resolved::Empty,
                }
            }
            SpecialName::Site => match table.enclosing_site(origin) {
                Some(site) => Resolved::definition(site, None),
                None => Resolved::definition(table.root(), None),
            },
            SpecialName::Core => match table.core() {
                Some(core) => Resolved::definition(core, None),
                None => Resolved::Empty,
            },
        }
    }
}

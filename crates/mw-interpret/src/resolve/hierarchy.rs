use super::*;

use mw_core::warn;

impl Evaluator {
    /// An alias found from its own body under its own name refers to an
    /// outer definition of that name, never to itself.
    pub(super) fn is_self_alias(&self, candidate: DefId, origin: DefId) -> bool {
        candidate == origin && self.table().get(candidate).is_alias()
    }

    /// A child of `origin` hidden by an override in the subtype currently
    /// constructed on its behalf.
    pub(super) fn is_overridden(&self, ctx: &Context, local: DefId, origin: DefId) -> bool {
        let Some(depth) = self.instance_depth(ctx, origin) else {
            return false;
        };
        match ctx.entries()[depth].def_id() {
            Some(active) if active != origin => {
                let name = &self.table().get(local).name;
                self.table().find_in_hierarchy(active, name) != Some(local)
            }
            _ => false,
        }
    }

    /// Step 4: children of the class of the instance on top, subtype first.
    pub(super) fn class_member(
        &self,
        ctx: &Context,
        name: &str,
        origin: DefId,
    ) -> Option<(DefId, usize)> {
        let depth = self.current_instance(ctx)?;
        let class = ctx.entries()[depth].def_id()?;
        self.table()
            .find_in_hierarchy(class, name)
            .filter(|found| !self.is_self_alias(*found, origin))
            .map(|found| (found, depth))
    }

    /// Step 5: each lexical owner of the origin up to its site. An owner
    /// constructed somewhere on the stack is searched through the class of
    /// that instance, which may be a subtype of the owner.
    pub(super) fn contained_member(
        &self,
        ctx: &Context,
        name: &str,
        origin: DefId,
    ) -> Option<(DefId, Option<usize>)> {
        let table = self.table();
        for owner in table.owner_chain(origin) {
            if table.get(owner).is_site() {
                break;
            }
            let depth = self.instance_depth(ctx, owner);
            let class = depth
                .and_then(|depth| ctx.entries()[depth].def_id())
                .unwrap_or(owner);
            let found = table
                .find_in_hierarchy(class, name)
                .filter(|found| !self.is_self_alias(*found, origin));
            if let Some(found) = found {
                return Some((found, depth));
            }
        }
        None
    }

    /// Substitute an alias by what its target denotes. Targets carrying
    /// arguments or indexes stay behind the alias and are evaluated when it
    /// is constructed.
    pub(crate) fn dealias(
        &self,
        ctx: &Context,
        def: DefId,
        trail: &mut AliasTrail,
    ) -> Option<Resolved> {
        let table = self.table();
        let alias = table.get(def);
        let Some(target) = alias.alias_target() else {
            return Some(Resolved::definition(def, None));
        };
        let plain = target
            .parts()
            .iter()
            .all(|part| part.args.is_none() && part.indexes.is_empty());
        if !plain || target.is_concurrent() {
            return Some(Resolved::definition(def, None));
        }
        if trail.visited.contains(&def) {
            self.log_step(format_args!("alias {} loops back on itself", alias));
            return None;
        }
        if trail.visited.len() >= self.runtime().options().max_alias_depth {
            warn!(
                "alias chain through {} exceeds {} links",
                alias,
                self.runtime().options().max_alias_depth
            );
            return None;
        }
        trail.visited.push(def);

        let origin = target.owner().unwrap_or(def);
        let found = self.cascade(ctx, target, origin, trail)?;
        if found.consumed >= target.parts().len() {
            return Some(found.resolved);
        }
        // later segments are plain children, followed without a context
        let Resolved::Definition { def: DefRef::Node(mut current), .. } = found.resolved else {
            return Some(Resolved::definition(def, None));
        };
        for part in &target.parts()[found.consumed..] {
            let Some(child) = table.find_in_hierarchy(current, &part.name) else {
                return Some(Resolved::definition(def, None));
            };
            current = match self.dealias(ctx, child, trail)? {
                Resolved::Definition { def: DefRef::Node(id), .. } => id,
                _ => return Some(Resolved::definition(def, None)),
            };
        }
        Some(Resolved::definition(current, None))
    }
}

use std::sync::Arc;

use super::*;

use itertools::Itertools;
use mw_core::def::Access;
use mw_core::host::ExternalDef;
use mw_core::name::Name;

impl Evaluator {
    /// Sites searched at step 6: local, containing, root, adopted, core.
    fn sites(&self, origin: DefId) -> Vec<DefId> {
        let table = self.table();
        let mut sites = Vec::new();
        let local = table.enclosing_site(origin).unwrap_or(table.root());
        sites.push(local);
        if let Some(containing) = table
            .get(local)
            .owner
            .and_then(|owner| table.enclosing_site(owner))
        {
            sites.push(containing);
        }
        sites.push(table.root());
        if let mw_core::def::DefKind::Site { adopted, .. } = &table.get(local).kind {
            sites.extend(adopted.iter().filter_map(|name| table.lookup_full(name)));
        }
        sites.extend(table.core());
        sites.into_iter().unique().collect()
    }

    /// Step 6.
    pub(super) fn site_member(&self, name: &str, origin: DefId) -> Option<DefId> {
        let table = self.table();
        self.sites(origin).into_iter().find_map(|site| {
            table
                .find_in_hierarchy(site, name)
                .filter(|found| !self.is_self_alias(*found, origin))
        })
    }

    pub(crate) fn accessible(&self, def: DefId, origin: DefId) -> bool {
        let table = self.table();
        let target = table.get(def);
        match target.access {
            Access::Public => true,
            Access::Local => target
                .owner
                .map(|owner| table.owner_chain(origin).contains(&owner))
                .unwrap_or(true),
            Access::Site => table.enclosing_site(def) == table.enclosing_site(origin),
        }
    }

    /// Step 7: the longest leading run of segments naming a definition by
    /// its full name. Segments before the last one taken must be plain.
    pub(super) fn explicit(&self, inst: &Instantiation, origin: DefId) -> Option<(DefId, usize)> {
        let parts = inst.parts();
        let plain_prefix = parts
            .iter()
            .take_while(|part| part.args.is_none() && part.indexes.is_empty())
            .count();
        let longest = (plain_prefix + 1).min(parts.len());
        (1..=longest).rev().find_map(|len| {
            let name = Name::new(parts[..len].iter().map(|p| p.name.clone()).collect());
            let found = self.table().lookup_full(&name)?;
            if self.accessible(found, origin) && !self.is_self_alias(found, origin) {
                Some((found, len))
            } else {
                self.log_step(format_args!("{} is not accessible from {}", name, origin));
                None
            }
        })
    }

    /// Step 8.
    pub(super) fn external_binding(&self, name: &str, origin: DefId) -> Option<Arc<ExternalDef>> {
        let table = self.table();
        self.runtime()
            .bindings()
            .iter()
            .filter(|binding| binding.matches(name) && binding.visible_from(table, origin))
            .find_map(|binding| self.runtime().external(binding, name))
    }
}

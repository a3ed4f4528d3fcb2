use std::collections::HashMap;

use super::{DefId, Definition};
use crate::name::Name;

/// Arena holding every definition of a program.
#[derive(Debug)]
pub struct DefinitionTable {
    defs: Vec<Definition>,
    root: DefId,
    core: Option<DefId>,
    by_full_name: HashMap<Name, DefId>,
}

impl DefinitionTable {
    pub(super) fn new(
        defs: Vec<Definition>,
        root: DefId,
        core: Option<DefId>,
        by_full_name: HashMap<Name, DefId>,
    ) -> Self {
        Self {
            defs,
            root,
            core,
            by_full_name,
        }
    }

    pub fn get(&self, id: DefId) -> &Definition {
        &self.defs[id.index()]
    }

    pub fn try_get(&self, id: DefId) -> Option<&Definition> {
        self.defs.get(id.index())
    }

    pub fn root(&self) -> DefId {
        self.root
    }

    pub fn core(&self) -> Option<DefId> {
        self.core
    }

    pub fn len(&self) -> usize {
        self.defs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Definition> {
        self.defs.iter()
    }

    /// Direct child of `owner` called `name`.
    /// Named child `name` of `owner`. Anonymous children have no name to be
    /// found by.
    pub fn child(&self, owner: DefId, name: &str) -> Option<DefId> {
        if name.is_empty() {
            return None;
        }
        self.try_get(owner)?
            .children
            .iter()
            .copied()
            .find(|child| self.get(*child).name == name)
    }

    pub fn lookup_full(&self, name: &Name) -> Option<DefId> {
        self.by_full_name.get(name).copied()
    }

    pub fn supertype(&self, id: DefId) -> Option<DefId> {
        self.try_get(id)?.supertype_id()
    }

    /// `id` followed by its supertypes, nearest first. Stops on a cycle.
    pub fn super_chain(&self, id: DefId) -> Vec<DefId> {
        let mut chain = vec![id];
        let mut current = id;
        while let Some(next) = self.supertype(current) {
            if chain.contains(&next) {
                break;
            }
            chain.push(next);
            current = next;
        }
        chain
    }

    /// Whether `sub` is `sup` or inherits from it.
    pub fn is_subtype_of(&self, sub: DefId, sup: DefId) -> bool {
        self.super_chain(sub).contains(&sup)
    }

    /// Owners of `id` from the nearest outward, `id` itself first.
    pub fn owner_chain(&self, id: DefId) -> Vec<DefId> {
        let mut chain = vec![id];
        let mut current = id;
        while let Some(owner) = self.try_get(current).and_then(|d| d.owner) {
            if chain.contains(&owner) {
                break;
            }
            chain.push(owner);
            current = owner;
        }
        chain
    }

    /// Nearest site enclosing `id`, `id` itself included.
    pub fn enclosing_site(&self, id: DefId) -> Option<DefId> {
        self.owner_chain(id)
            .into_iter()
            .find(|candidate| self.get(*candidate).is_site())
    }

    /// Search `name` among the children of `id` and of its supertypes, and
    /// among the members of a union.
    pub fn find_in_hierarchy(&self, id: DefId, name: &str) -> Option<DefId> {
        for class in self.super_chain(id) {
            if let Some(found) = self.child(class, name) {
                return Some(found);
            }
            for member in self.get(class).union_members() {
                if let Some(found) = self.find_in_hierarchy(*member, name) {
                    return Some(found);
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::super::{DefSpec, TableBuilder};
    use super::*;

    #[test]
    fn hierarchy_search_prefers_the_subtype() {
        let mut builder = TableBuilder::new("site");
        let root = builder.root();
        let shape = builder.add(root, DefSpec::named("Shape"));
        builder.add(shape, DefSpec::named("area").abstract_def());
        builder.add(shape, DefSpec::named("label"));
        let circle = builder.add(root, DefSpec::named("Circle").extends("Shape"));
        let circle_area = builder.add(circle, DefSpec::named("area"));
        let table = builder.finish().unwrap();

        table.get(circle).link_supertype(Some(shape));
        table.get(shape).link_supertype(None);

        assert_eq!(table.find_in_hierarchy(circle, "area"), Some(circle_area));
        assert_eq!(
            table.find_in_hierarchy(circle, "label"),
            table.child(shape, "label")
        );
        assert!(table.is_subtype_of(circle, shape));
        assert!(!table.is_subtype_of(shape, circle));
    }

    #[test]
    fn anonymous_children_have_no_name() {
        let mut builder = TableBuilder::new("site");
        let root = builder.root();
        let anonymous = builder.add(root, DefSpec::anonymous());
        let table = builder.finish().unwrap();
        table.get(root).link_supertype(None);

        assert!(table.get(root).children.contains(&anonymous));
        assert_eq!(table.child(root, ""), None);
        assert_eq!(table.find_in_hierarchy(root, ""), None);
    }

    #[test]
    fn owner_chain_ends_at_the_root() {
        let mut builder = TableBuilder::new("site");
        let root = builder.root();
        let outer = builder.add(root, DefSpec::named("outer"));
        let inner = builder.add(outer, DefSpec::named("inner"));
        let table = builder.finish().unwrap();
        assert_eq!(table.owner_chain(inner), vec![inner, outer, root]);
        assert_eq!(table.enclosing_site(inner), Some(root));
        assert_eq!(
            table.lookup_full(&Name::parse("outer.inner")),
            Some(inner)
        );
    }
}

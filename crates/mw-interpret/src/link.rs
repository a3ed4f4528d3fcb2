//! Link pass: runs once over a freshly built definition table, before any
//! construction.
//!
//! - resolves supertype names and rejects supertype cycles
//! - records the lexical owner of every instantiation and fixes its
//!   resolution kind
//! - fixes the dimensionality of every collection definition
//! - rejects alias cycles
//! - collects external-binding declarations

use std::collections::HashSet;

use mw_core::collection::{CollectionElement, CollectionElements, CollectionSource, ElementRef};
use mw_core::def::{DefId, DefKind, DefinitionTable};
use mw_core::diagnostics::{Diagnostic, DiagnosticLevel};
use mw_core::error::ErrorCode;
use mw_core::instantiation::{Instantiation, ParamKind, ResolutionKind};
use mw_core::name::Name;
use mw_core::{trace, Construction, ConstructionKind};

/// Names matching `pattern` and referenced from inside `scope` are bound
/// to host objects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalBinding {
    pub declaration: DefId,
    pub scope: DefId,
    pub pattern: String,
}

impl ExternalBinding {
    /// `pattern` is either an exact name or a prefix followed by `*`.
    pub fn matches(&self, name: &str) -> bool {
        match self.pattern.strip_suffix('*') {
            Some(prefix) => name.starts_with(prefix),
            None => self.pattern == name,
        }
    }

    pub fn visible_from(&self, table: &DefinitionTable, origin: DefId) -> bool {
        self.scope == table.root() || table.owner_chain(origin).contains(&self.scope)
    }
}

#[derive(Debug, Default, Clone)]
pub struct LinkReport {
    pub bindings: Vec<ExternalBinding>,
    pub diagnostics: Vec<Diagnostic>,
}

impl LinkReport {
    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics
            .iter()
            .filter(|d| d.level == DiagnosticLevel::Error)
    }

    pub fn has_errors(&self) -> bool {
        self.errors().next().is_some()
    }

    fn error(&mut self, def: DefId, code: &str, message: String) {
        self.diagnostics
            .push(Diagnostic::error(message).with_definition(def).with_code(code));
    }

    fn warning(&mut self, def: DefId, message: String) {
        self.diagnostics
            .push(Diagnostic::warning(message).with_definition(def));
    }
}

pub fn link(table: &DefinitionTable) -> LinkReport {
    let mut report = LinkReport::default();
    link_supertypes(table, &mut report);
    check_supertype_cycles(table, &mut report);
    collect_bindings(table, &mut report);
    for def in table.iter() {
        stamp_definition(table, def.id, &mut report);
    }
    fix_collections(table, &mut report);
    check_alias_cycles(table, &mut report);
    trace!(
        "linked {} definitions: {} diagnostics",
        table.len(),
        report.diagnostics.len()
    );
    report
}

/// Static lookup of a dotted name from inside `origin`: the owner chain
/// with each owner's hierarchy, then full names, then the core site.
fn resolve_static(table: &DefinitionTable, origin: DefId, name: &Name) -> Option<DefId> {
    let (first, rest) = name.segments().split_first()?;
    let start = table
        .owner_chain(origin)
        .into_iter()
        .find_map(|owner| table.find_in_hierarchy(owner, first))
        .or_else(|| table.lookup_full(&Name::simple(first.clone())))
        .or_else(|| table.core().and_then(|core| table.child(core, first)))?;
    rest.iter()
        .try_fold(start, |current, segment| table.find_in_hierarchy(current, segment))
        .or_else(|| table.lookup_full(name))
}

fn link_supertypes(table: &DefinitionTable, report: &mut LinkReport) {
    for def in table.iter() {
        let Some(name) = &def.supertype else {
            def.link_supertype(None);
            continue;
        };
        let origin = def.owner.unwrap_or(table.root());
        match resolve_static(table, origin, name).filter(|found| *found != def.id) {
            Some(found) => def.link_supertype(Some(found)),
            None => {
                def.link_supertype(None);
                report.error(
                    def.id,
                    "unknown-supertype",
                    format!("supertype {} of {} is not defined", name, def),
                );
            }
        }
    }
}

fn check_supertype_cycles(table: &DefinitionTable, report: &mut LinkReport) {
    for def in table.iter() {
        let mut seen = vec![def.id];
        let mut current = def.id;
        while let Some(next) = table.supertype(current) {
            if next == def.id {
                report.error(
                    def.id,
                    "supertype-cycle",
                    format!("{} inherits from itself", def),
                );
                break;
            }
            if seen.contains(&next) {
                break;
            }
            seen.push(next);
            current = next;
        }
    }
}

fn collect_bindings(table: &DefinitionTable, report: &mut LinkReport) {
    for def in table.iter() {
        if let DefKind::External { pattern } = &def.kind {
            report.bindings.push(ExternalBinding {
                declaration: def.id,
                scope: def.owner.unwrap_or(table.root()),
                pattern: pattern.clone(),
            });
        }
    }
}

fn stamp_definition(table: &DefinitionTable, id: DefId, report: &mut LinkReport) {
    let def = table.get(id);
    let mut stamper = Stamper {
        table,
        owner: id,
        loop_vars: Vec::new(),
        report,
    };
    for construction in def.contents() {
        stamper.visit(construction);
    }
    if let Some(target) = def.alias_construction() {
        stamper.visit(target);
    }
    for list in &def.param_lists {
        for param in &list.params {
            if let Some(default) = &param.default {
                stamper.visit(default);
            }
        }
    }
    if let Some(collection) = def.collection() {
        stamper.visit_elements(&collection.elements);
    }
}

struct Stamper<'a> {
    table: &'a DefinitionTable,
    owner: DefId,
    loop_vars: Vec<String>,
    report: &'a mut LinkReport,
}

impl Stamper<'_> {
    fn visit(&mut self, construction: &Construction) {
        match construction.kind() {
            ConstructionKind::Literal(_) | ConstructionKind::Native(_) => {}
            ConstructionKind::Instantiation(inst) => {
                self.stamp(inst);
                for part in inst.parts() {
                    part.args().iter().for_each(|arg| self.visit(arg));
                    part.indexes.iter().for_each(|index| self.visit(index));
                }
            }
            ConstructionKind::Binary { lhs, rhs, .. } => {
                self.visit(lhs);
                self.visit(rhs);
            }
            ConstructionKind::Unary { operand, .. } => self.visit(operand),
            ConstructionKind::Conditional {
                condition,
                then,
                otherwise,
            } => {
                self.visit(condition);
                then.iter().for_each(|c| self.visit(c));
                otherwise.iter().for_each(|c| self.visit(c));
            }
            ConstructionKind::ForLoop {
                var,
                iterable,
                body,
            } => {
                self.visit(iterable);
                self.loop_vars.push(var.clone());
                body.iter().for_each(|c| self.visit(c));
                self.loop_vars.pop();
            }
        }
    }

    fn visit_elements(&mut self, elements: &CollectionElements) {
        for (_, element) in elements.constructions() {
            match element {
                ElementRef::Construction(c) => self.visit(c),
                ElementRef::Nested(nested) => self.visit_elements(nested),
            }
        }
    }

    fn stamp(&mut self, inst: &Instantiation) {
        if !inst.set_owner(self.owner) {
            self.report.warning(
                self.owner,
                format!(
                    "reference {} is shared between definitions; keeping its first owner",
                    inst
                ),
            );
            return;
        }
        let kind = self.classify(inst);
        inst.classify_with(|| kind);
    }

    /// Resolution kind as far as it can be known without a context.
    fn classify(&self, inst: &Instantiation) -> ResolutionKind {
        let table = self.table;
        let name = inst.first();
        let child_kind = |plain| {
            if inst.is_multi_part() {
                ResolutionKind::Parameter(ParamKind::Child)
            } else {
                ResolutionKind::Parameter(plain)
            }
        };
        if let Some(special) = inst.special() {
            return ResolutionKind::Special(special);
        }
        if let Some(bound) = inst.bound() {
            return ResolutionKind::Static(bound);
        }
        // a parameter shadows a child of the same name
        if table.get(self.owner).declares_param(name) {
            return child_kind(ParamKind::Plain);
        }
        if let Some(local) = table.child(self.owner, name) {
            return ResolutionKind::Local(local);
        }
        if self.loop_vars.iter().any(|var| var == name) {
            return child_kind(ParamKind::Loop);
        }
        for container in table.owner_chain(self.owner).into_iter().skip(1) {
            if table.get(container).is_site() {
                break;
            }
            if table.get(container).declares_param(name) {
                return child_kind(ParamKind::Container);
            }
        }
        let contained = table
            .owner_chain(self.owner)
            .into_iter()
            .any(|owner| table.find_in_hierarchy(owner, name).is_some());
        if contained {
            return ResolutionKind::Dynamic;
        }
        if let Some(explicit) = table.lookup_full(&Name::simple(name)) {
            return ResolutionKind::Explicit(explicit);
        }
        if self
            .report
            .bindings
            .iter()
            .any(|b| b.matches(name) && b.visible_from(table, self.owner))
        {
            return ResolutionKind::External;
        }
        // found later through the class of an instance, or not at all
        ResolutionKind::Class
    }
}

fn fix_collections(table: &DefinitionTable, report: &mut LinkReport) {
    for def in table.iter() {
        let Some(collection) = def.collection() else {
            continue;
        };
        let depth = collection.fix_dimensions(|| collection.elements.depth());
        if collection.declared_dims.is_empty() {
            continue;
        }
        if collection.declared_dims.len() != depth {
            report.error(
                def.id,
                "dimensions",
                format!(
                    "{} declares {} dimension(s) but nests {}",
                    def,
                    collection.declared_dims.len(),
                    depth
                ),
            );
            continue;
        }
        if let Some(Some(size)) = collection.declared_dims.first() {
            if *size != collection.elements.size() {
                report.warning(
                    def.id,
                    format!(
                        "{} declares {} element(s) but holds {}",
                        def,
                        size,
                        collection.elements.size()
                    ),
                );
            }
        }
        check_nested_shape(&collection.elements, def.id, report);
    }
}

fn check_nested_shape(elements: &CollectionElements, def: DefId, report: &mut LinkReport) {
    let mixed = match elements {
        CollectionElements::Array(items) => {
            let nested = items
                .iter()
                .filter(|e| matches!(e, CollectionElement::Nested(_)))
                .count();
            nested != 0 && nested != items.len()
        }
        CollectionElements::Table(_) => false,
    };
    if mixed {
        report.warning(def, "array mixes nested and plain elements".to_string());
    }
}

fn check_alias_cycles(table: &DefinitionTable, report: &mut LinkReport) {
    let mut reported = HashSet::new();
    for def in table.iter().filter(|d| d.is_alias()) {
        let mut trail = vec![def.id];
        let mut current = def.id;
        loop {
            let alias = table.get(current);
            let Some(target) = alias.alias_target() else {
                break;
            };
            if target.parts().iter().any(|p| p.has_args() || !p.indexes.is_empty()) {
                break;
            }
            let name = target.name();
            if name.is_simple() && name.first() == Some(alias.name.as_str()) {
                // refers to an outer definition of the same name
                break;
            }
            let origin = alias.owner.unwrap_or(table.root());
            let Some(next) = resolve_static(table, origin, &name) else {
                break;
            };
            if trail.contains(&next) {
                if reported.insert(def.id) {
                    let chain = trail
                        .iter()
                        .chain(std::iter::once(&next))
                        .map(|id| table.get(*id).to_string())
                        .collect::<Vec<_>>()
                        .join(" -> ");
                    report.error(
                        def.id,
                        ErrorCode::AliasCycle.as_str(),
                        format!("alias cycle: {}", chain),
                    );
                }
                break;
            }
            if !table.get(next).is_alias() {
                break;
            }
            trail.push(next);
            current = next;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mw_core::def::{DefSpec, ParamDef, TableBuilder};
    use pretty_assertions::assert_eq;

    fn codes(report: &LinkReport) -> Vec<&str> {
        report.errors().filter_map(|d| d.code.as_deref()).collect()
    }

    #[test]
    fn references_are_classified_from_their_owner() {
        let mut b = TableBuilder::new("app");
        let root = b.root();
        let item = b.add(
            root,
            DefSpec::named("item")
                .params(vec![ParamDef::new("title")])
                .contents(vec![
                    Construction::reference("title"),
                    Construction::reference("body"),
                    Construction::reference("footer"),
                ]),
        );
        b.add(item, DefSpec::named("title"));
        let body = b.add(item, DefSpec::named("body"));
        b.add(root, DefSpec::named("footer"));
        let table = b.finish().unwrap();

        let report = link(&table);
        assert!(!report.has_errors());
        let kinds: Vec<_> = table
            .get(item)
            .contents()
            .iter()
            .map(|c| c.as_instantiation().unwrap().kind())
            .collect();
        assert_eq!(
            kinds,
            vec![
                ResolutionKind::Parameter(ParamKind::Plain),
                ResolutionKind::Local(body),
                ResolutionKind::Dynamic,
            ]
        );
    }

    #[test]
    fn alias_cycles_and_unknown_supertypes_are_errors() {
        let mut b = TableBuilder::new("app");
        let root = b.root();
        b.add(root, DefSpec::alias("a", Construction::reference("b")));
        b.add(root, DefSpec::alias("b", Construction::reference("a")));
        b.add(root, DefSpec::named("Orphan").extends("Missing"));
        let table = b.finish().unwrap();

        let report = link(&table);
        let codes = codes(&report);
        assert!(codes.contains(&"unknown-supertype"));
        assert!(codes.contains(&ErrorCode::AliasCycle.as_str()));
    }

    #[test]
    fn collection_dimensions_are_fixed_once() {
        let row = |items: &[i64]| {
            CollectionElement::Nested(CollectionElements::Array(
                items
                    .iter()
                    .map(|i| CollectionElement::Construction(Construction::literal(*i)))
                    .collect(),
            ))
        };
        let mut b = TableBuilder::new("app");
        let root = b.root();
        let grid = b.add(
            root,
            DefSpec::collection(
                "grid",
                CollectionElements::Array(vec![row(&[1, 2]), row(&[3, 4])]),
                vec![Some(2), None],
            ),
        );
        let flat = b.add(
            root,
            DefSpec::collection(
                "flat",
                CollectionElements::Array(vec![row(&[1])]),
                vec![None],
            ),
        );
        let table = b.finish().unwrap();

        let report = link(&table);
        assert_eq!(table.get(grid).collection().unwrap().dimensions(), Some(2));
        assert_eq!(table.get(flat).collection().unwrap().dimensions(), Some(2));
        assert_eq!(codes(&report), vec!["dimensions"]);
    }

    #[test]
    fn external_declarations_become_bindings() {
        let mut b = TableBuilder::new("app");
        let root = b.root();
        let page = b.add(root, DefSpec::named("page"));
        let decl = b.add(page, DefSpec::external("java", "java*"));
        let table = b.finish().unwrap();

        let report = link(&table);
        assert_eq!(
            report.bindings,
            vec![ExternalBinding {
                declaration: decl,
                scope: page,
                pattern: "java*".to_string(),
            }]
        );
        let binding = &report.bindings[0];
        assert!(binding.matches("javaUtil"));
        assert!(!binding.matches("kotlin"));
        assert!(binding.visible_from(&table, page));
        assert!(!binding.visible_from(&table, root));
    }
}

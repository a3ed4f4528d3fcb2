//! Cacheability tiers and the keep-store path of contextual instantiations.

use super::*;

use mw_core::def::{DefId, DefRef, Durability};
use mw_core::error::Error;
use mw_core::instantiation::ResolutionKind;
use mw_core::keep::{Cacheability, KeepEntry, KeepKey, KeepScope};
use mw_core::trace;

use crate::resolve::{Lookup, Resolved};

/// Calls `f` on every construction nested in the arguments and indexes of
/// `inst`.
fn visit_inputs(inst: &Instantiation, f: &mut dyn FnMut(&Construction)) {
    for part in inst.parts() {
        for construction in part.args().iter().chain(&part.indexes) {
            construction.visit(f);
        }
    }
}

/// Arguments or indexes written to evaluate differently each time.
fn has_unstable_input(inst: &Instantiation) -> bool {
    let mut unstable = false;
    visit_inputs(inst, &mut |nested: &Construction| {
        unstable |= nested.mode() == EvalMode::Dynamic
            || matches!(nested.kind(), ConstructionKind::Native(_));
    });
    unstable
}

impl Evaluator {
    /// The tier of `construction` in `ctx`. Anything but an instantiation
    /// that resolves is not cacheable.
    pub fn cacheability(&self, ctx: &Context, construction: &Construction) -> Cacheability {
        let Some(inst) = construction.as_instantiation() else {
            return Cacheability::NotCacheable;
        };
        match self.lookup(ctx, inst) {
            Some(lookup) => self.tier(ctx, construction, inst, &lookup),
            None => Cacheability::NotCacheable,
        }
    }

    fn tier(
        &self,
        ctx: &Context,
        construction: &Construction,
        inst: &Instantiation,
        lookup: &Lookup,
    ) -> Cacheability {
        if !self.rt.options().enable_cache
            || construction.mode() != EvalMode::Contextual
            || inst.is_concurrent()
            || matches!(lookup.kind, ResolutionKind::Special(_))
        {
            return Cacheability::NotCacheable;
        }
        // indexes of inner segments are not part of the key
        let Some((_, inner)) = inst.parts().split_last() else {
            return Cacheability::NotCacheable;
        };
        if inner.iter().any(|part| !part.indexes.is_empty()) {
            return Cacheability::NotCacheable;
        }

        let base = match &lookup.resolved {
            Resolved::Definition {
                def: DefRef::Node(id),
                as_super: false,
                ..
            } => {
                let (path, _) = self.static_path(*id, inst, lookup.consumed);
                let table = self.table();
                if path
                    .iter()
                    .any(|def| table.get(*def).durability == Durability::Dynamic)
                {
                    Cacheability::CacheStorable
                } else {
                    Cacheability::FullyCacheable
                }
            }
            Resolved::Parameter { .. } if inst.is_multi_part() => Cacheability::FullyCacheable,
            _ => return Cacheability::NotCacheable,
        };

        let mut tier = base;
        if self.has_dynamic_input(ctx, inst) {
            tier = tier.restrict(Cacheability::CacheStorable);
        }
        // arguments of an unpushed caller are still pending evaluation
        if ctx.unpushed() > 0 {
            tier = tier.restrict(Cacheability::CacheRetrievable);
        }
        tier
    }

    /// Arguments or indexes that may evaluate differently each time: those
    /// written as dynamic or native, and references reaching a definition
    /// of dynamic durability.
    fn has_dynamic_input(&self, ctx: &Context, inst: &Instantiation) -> bool {
        if has_unstable_input(inst) {
            return true;
        }
        let mut dynamic = false;
        visit_inputs(inst, &mut |nested: &Construction| {
            if dynamic || nested.mode() != EvalMode::Contextual {
                return;
            }
            if let Some(reference) = nested.as_instantiation() {
                dynamic = self.reaches_dynamic_def(ctx, reference);
            }
        });
        dynamic
    }

    fn reaches_dynamic_def(&self, ctx: &Context, inst: &Instantiation) -> bool {
        let Some(lookup) = self.lookup(ctx, inst) else {
            return false;
        };
        let Resolved::Definition {
            def: DefRef::Node(id),
            ..
        } = lookup.resolved
        else {
            return false;
        };
        let table = self.table();
        let (path, _) = self.static_path(id, inst, lookup.consumed);
        path.iter()
            .any(|def| table.get(*def).durability == Durability::Dynamic)
    }

    /// Definitions the segments after the lookup name when followed through
    /// the static hierarchy, starting at `first`. `false` when a segment
    /// cannot be followed without constructing something.
    fn static_path(&self, first: DefId, inst: &Instantiation, consumed: usize) -> (Vec<DefId>, bool) {
        let table = self.table();
        let mut path = vec![first];
        let mut current = first;
        for part in &inst.parts()[consumed.min(inst.parts().len())..] {
            match table.find_in_hierarchy(current, &part.name) {
                Some(child) => {
                    path.push(child);
                    current = child;
                }
                None => return (path, false),
            }
        }
        (path, true)
    }

    pub(super) fn evaluate_contextual(
        &self,
        ctx: &mut Context,
        construction: &Construction,
        inst: &Instantiation,
        may_spawn: bool,
    ) -> Result<Value> {
        if may_spawn && inst.is_concurrent() {
            return self.spawn(ctx, construction, inst);
        }
        let lookup = self
            .lookup(ctx, inst)
            .ok_or_else(|| Error::undefined(inst))?;
        let tier = self.tier(ctx, construction, inst, &lookup);
        if tier == Cacheability::NotCacheable {
            return self.walk(ctx, inst, &lookup, None);
        }

        let args = self.part_args(ctx, inst)?;
        let indexes = inst
            .indexes()
            .iter()
            .map(|index| self.evaluate(ctx, index).and_then(Value::settle))
            .collect::<Result<Vec<_>>>()?;
        let Some((key, resolved, keep)) = self.keep_slot(ctx, inst, &lookup, &args, indexes)? else {
            return self.walk(ctx, inst, &lookup, Some(&args));
        };

        if tier.can_retrieve() {
            if let Some(kept) = keep.retrieve(&key, &resolved) {
                trace!("keep hit: {}", key);
                return Ok(kept.value);
            }
        }
        let value = self.walk(ctx, inst, &lookup, Some(&args))?;
        if tier.can_store() && !matches!(value, Value::Pending(_)) {
            trace!("keep store: {}", key);
            let instance = match &value {
                Value::Instance(instance) => Some(instance.clone()),
                _ => None,
            };
            keep.store(
                key,
                KeepEntry {
                    resolved,
                    args: args.last().cloned().unwrap_or_default().into(),
                    instance,
                    value: value.clone(),
                },
            );
        }
        Ok(value)
    }

    /// Key, concrete definition and scope a result is kept under. `None`
    /// when there is no scope to keep it in.
    fn keep_slot(
        &self,
        ctx: &mut Context,
        inst: &Instantiation,
        lookup: &Lookup,
        args: &[Vec<Value>],
        indexes: Vec<Value>,
    ) -> Result<Option<(KeepKey, DefRef, Arc<KeepScope>)>> {
        match &lookup.resolved {
            Resolved::Definition {
                def: DefRef::Node(id),
                scope,
                ..
            } => {
                let (path, complete) = self.static_path(*id, inst, lookup.consumed);
                let last = path.last().copied().unwrap_or(*id);
                let resolved = DefRef::Node(if complete { last } else { *id });
                let keep = if complete && self.table().get(last).durability == Durability::Global {
                    Some(self.rt.global_keep().clone())
                } else {
                    scope
                        .and_then(|depth| ctx.entry(depth))
                        .or_else(|| ctx.peek())
                        .map(|entry| entry.keep().clone())
                };
                let key = KeepKey {
                    def: lookup.nominal.clone().unwrap_or(DefRef::Node(*id)),
                    name: inst.name().joined(),
                    args: args.to_vec(),
                    indexes,
                };
                Ok(keep.map(|keep| (key, resolved, keep)))
            }
            Resolved::Parameter { depth, index } => {
                let value = self.param_value(ctx, *depth, *index)?.settle()?;
                let Some(entry) = ctx.entry(*depth) else {
                    return Ok(None);
                };
                let (def, first) = match &value {
                    Value::Instance(instance) => (instance.def.clone(), instance.args.to_vec()),
                    other => (entry.def.clone(), vec![other.clone()]),
                };
                let mut key_args = args.to_vec();
                if let Some(slot) = key_args.first_mut() {
                    *slot = first;
                }
                let key = KeepKey {
                    def: def.clone(),
                    name: inst.parts()[1..].iter().map(|part| part.name.as_str()).join("."),
                    args: key_args,
                    indexes,
                };
                Ok(Some((key, def, entry.keep().clone())))
            }
            _ => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mw_core::instantiation::NamePart;

    #[test]
    fn dynamic_arguments_are_detected() {
        let inst = Instantiation::from_parts(vec![NamePart::call(
            "f",
            vec![Construction::reference("clock").dynamic()],
        )]);
        assert!(has_unstable_input(&inst));
    }

    #[test]
    fn literal_arguments_are_stable() {
        let inst = Instantiation::from_parts(vec![
            NamePart::call("f", vec![Construction::literal(1i64)]),
            NamePart::plain("g"),
        ]);
        assert!(!has_unstable_input(&inst));
    }

    #[test]
    fn nested_dynamic_indexes_are_detected() {
        let inst = Instantiation::parse("rows").with_indexes(vec![Construction::binary(
            mw_core::construction::BinOp::Add,
            Construction::literal(1i64),
            Construction::reference("n").dynamic(),
        )]);
        assert!(has_unstable_input(&inst));
    }
}

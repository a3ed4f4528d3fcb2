//! Overload selection for host constructors and methods.
//!
//! Each argument is scored against the declared parameter type and the
//! candidate with the lowest total wins; ties go to the first declared.
//! Arguments of unknown static type match anything, but only
//! questionably: a candidate matched that way loses to every candidate
//! matched on known types.

use std::cmp::Ordering;

use mw_core::host::{HostMethod, HostRegistry, HostType};
use mw_core::Value;

/// Cost of a text parameter accepting a non-text argument by conversion.
pub const TEXT_CONVERSION_COST: u32 = 100;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Score {
    pub questionable: bool,
    pub cost: u32,
}

impl Score {
    fn exact(cost: u32) -> Self {
        Self {
            questionable: false,
            cost,
        }
    }

    fn questionable() -> Self {
        Self {
            questionable: true,
            cost: 0,
        }
    }

    fn combine(self, other: Score) -> Score {
        Score {
            questionable: self.questionable || other.questionable,
            cost: self.cost.saturating_add(other.cost),
        }
    }
}

impl PartialOrd for Score {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Score {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.questionable, self.cost).cmp(&(other.questionable, other.cost))
    }
}

/// Superclass levels above `class`, plus one for the universal object type.
fn object_depth(registry: &HostRegistry, class: &str) -> u32 {
    let mut depth = 1;
    let mut current = registry.class(class);
    while let Some(superclass) = current.and_then(|c| c.superclass.as_deref()) {
        depth += 1;
        current = registry.class(superclass);
        if depth > 64 {
            break;
        }
    }
    depth
}

/// Score one argument of static type `arg` against parameter type `param`.
/// `None` means the argument cannot be passed.
pub fn score_param(registry: &HostRegistry, param: &HostType, arg: Option<&HostType>) -> Option<Score> {
    let Some(arg) = arg else {
        return Some(Score::questionable());
    };
    if param == arg {
        return Some(Score::exact(0));
    }
    match (param, arg) {
        (HostType::Text, _) => Some(Score::exact(TEXT_CONVERSION_COST)),
        (_, HostType::Object) => Some(Score::questionable()),
        (HostType::Object, HostType::Named(class)) => Some(Score::exact(object_depth(registry, class))),
        (HostType::Object, HostType::Primitive(_)) => Some(Score::exact(2)),
        (HostType::Object, _) => Some(Score::exact(1)),
        (HostType::Primitive(p) | HostType::Boxed(p), HostType::Primitive(a) | HostType::Boxed(a))
            if p == a =>
        {
            Some(Score::exact(1))
        }
        (p, a) if p.numeric_kind().is_some() && a.numeric_kind().is_some() => Some(Score::exact(2)),
        (HostType::Named(param), HostType::Named(arg)) => registry
            .superclass_distance(arg, param)
            .or_else(|| registry.interface_distance(arg, param))
            .map(Score::exact),
        _ => None,
    }
}

/// Total score of calling `params` with `args`. Arity must match exactly.
pub fn score(registry: &HostRegistry, params: &[HostType], args: &[Value]) -> Option<Score> {
    if params.len() != args.len() {
        return None;
    }
    params
        .iter()
        .zip(args)
        .try_fold(Score::default(), |total, (param, arg)| {
            let arg = HostType::of_value(arg);
            score_param(registry, param, arg.as_ref()).map(|s| total.combine(s))
        })
}

/// The best candidate for `args`, first declared on ties.
pub fn select<'a>(
    registry: &HostRegistry,
    candidates: impl IntoIterator<Item = &'a HostMethod>,
    args: &[Value],
) -> Option<&'a HostMethod> {
    candidates
        .into_iter()
        .filter_map(|method| score(registry, &method.params, args).map(|s| (s, method)))
        .min_by_key(|(s, _)| *s)
        .map(|(_, method)| method)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mw_core::host::{HostClass, HostInterface, PrimitiveKind};
    use pretty_assertions::assert_eq;

    fn method(name: &str, params: Vec<HostType>) -> HostMethod {
        let tag = format!("{}({})", name, params.iter().map(|p| p.to_string()).collect::<Vec<_>>().join(","));
        HostMethod::new(name, params, move |_, _| Ok(Value::text(tag.clone())))
    }

    fn registry() -> HostRegistry {
        let mut registry = HostRegistry::new();
        registry.register_interface(HostInterface::new("Shape"));
        registry.register_interface(HostInterface::new("Named"));
        registry.register_class(HostClass::new("Animal").implements("Named"));
        registry.register_class(HostClass::new("Dog").extends("Animal"));
        registry
    }

    #[test]
    fn int_argument_prefers_int_over_text() {
        let registry = registry();
        let candidates = vec![
            method("f", vec![HostType::Text]),
            method("f", vec![HostType::int()]),
        ];
        let chosen = select(&registry, &candidates, &[Value::Int(3)]).unwrap();
        assert_eq!(chosen.params, vec![HostType::int()]);
    }

    #[test]
    fn text_parameter_is_a_fallback() {
        let registry = registry();
        let candidates = vec![method("f", vec![HostType::Text])];
        let chosen = select(&registry, &candidates, &[Value::Bool(true)]).unwrap();
        assert_eq!(
            score(&registry, &chosen.params, &[Value::Bool(true)]),
            Some(Score::exact(TEXT_CONVERSION_COST))
        );
    }

    #[test]
    fn numeric_kinds_cost_by_distance() {
        let registry = registry();
        let boxed = HostType::Boxed(PrimitiveKind::Int);
        assert_eq!(
            score_param(&registry, &boxed, Some(&HostType::int())),
            Some(Score::exact(1))
        );
        assert_eq!(
            score_param(&registry, &HostType::float(), Some(&HostType::int())),
            Some(Score::exact(2))
        );
        assert_eq!(score_param(&registry, &HostType::bool(), Some(&HostType::int())), None);
    }

    #[test]
    fn superclasses_and_interfaces_cost_one_per_level() {
        let registry = registry();
        let dog = HostType::named("Dog");
        assert_eq!(
            score_param(&registry, &HostType::named("Animal"), Some(&dog)),
            Some(Score::exact(1))
        );
        assert_eq!(
            score_param(&registry, &HostType::named("Named"), Some(&dog)),
            Some(Score::exact(2))
        );
        assert_eq!(score_param(&registry, &HostType::named("Shape"), Some(&dog)), None);
    }

    #[test]
    fn unknown_arguments_match_questionably() {
        let registry = registry();
        let candidates = vec![
            method("f", vec![HostType::Text, HostType::named("Dog")]),
            method("f", vec![HostType::int(), HostType::named("Dog")]),
        ];
        let args = [Value::Int(1), Value::Null];
        let chosen = select(&registry, &candidates, &args).unwrap();
        assert_eq!(chosen.params[0], HostType::int());
        assert_eq!(
            score(&registry, &chosen.params, &args),
            Some(Score {
                questionable: true,
                cost: 0
            })
        );
    }

    #[test]
    fn ties_go_to_the_first_declared() {
        let registry = registry();
        let candidates = vec![
            method("g", vec![HostType::float()]),
            method("g", vec![HostType::Boxed(PrimitiveKind::Float)]),
        ];
        let chosen = select(&registry, &candidates, &[Value::Int(2)]).unwrap();
        assert_eq!(chosen.params, vec![HostType::float()]);
    }

    #[test]
    fn arity_must_match() {
        let registry = registry();
        let candidates = vec![method("h", vec![HostType::int()])];
        assert!(select(&registry, &candidates, &[]).is_none());
    }
}

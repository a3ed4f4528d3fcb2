//! Construction evaluation.
//!
//! Every construction is evaluated according to its mode. Dynamic ones run
//! every time; static ones run once per node; contextual instantiations ask
//! for their cacheability tier and go through the keep store when the tier
//! allows it.

use std::sync::Arc;

use itertools::Itertools;
use mw_core::def::DefinitionTable;
use mw_core::error::Result;
use mw_core::instantiation::Instantiation;
use mw_core::{warn, Construction, ConstructionKind, Context, EvalMode, Value};

use crate::error::host_failure;
use crate::runtime::{Runtime, StaticKey};

mod cacheability;
mod instantiate;
mod ops;

/// Evaluates constructions of one runtime. Cheap to clone; every clone
/// shares the runtime.
#[derive(Clone)]
pub struct Evaluator {
    rt: Arc<Runtime>,
}

impl Evaluator {
    pub fn new(rt: Arc<Runtime>) -> Self {
        Self { rt }
    }

    pub fn runtime(&self) -> &Arc<Runtime> {
        &self.rt
    }

    pub(crate) fn table(&self) -> &DefinitionTable {
        self.rt.table()
    }

    pub fn evaluate(&self, ctx: &mut Context, construction: &Construction) -> Result<Value> {
        self.evaluate_in_mode(ctx, construction, true)
    }

    /// Evaluate on a worker: a concurrent instantiation is constructed here
    /// instead of being spawned again.
    pub(crate) fn evaluate_spawned(
        &self,
        ctx: &mut Context,
        construction: &Construction,
    ) -> Result<Value> {
        self.evaluate_in_mode(ctx, construction, false)
    }

    fn evaluate_in_mode(
        &self,
        ctx: &mut Context,
        construction: &Construction,
        may_spawn: bool,
    ) -> Result<Value> {
        match construction.mode() {
            EvalMode::Static => self
                .rt
                .statics()
                .get_or_eval(StaticKey::Construction(construction.id()), || {
                    self.evaluate_uncached(ctx, construction, may_spawn)
                }),
            EvalMode::Dynamic => self.evaluate_uncached(ctx, construction, may_spawn),
            EvalMode::Contextual => match construction.kind() {
                ConstructionKind::Instantiation(inst) => {
                    let result = self.evaluate_contextual(ctx, construction, inst, may_spawn);
                    self.tolerate(result, inst)
                }
                _ => self.evaluate_direct(ctx, construction),
            },
        }
    }

    fn evaluate_uncached(
        &self,
        ctx: &mut Context,
        construction: &Construction,
        may_spawn: bool,
    ) -> Result<Value> {
        match construction.kind() {
            ConstructionKind::Instantiation(inst) => {
                let result = if may_spawn && inst.is_concurrent() {
                    self.spawn(ctx, construction, inst)
                } else {
                    self.instantiate(ctx, inst)
                };
                self.tolerate(result, inst)
            }
            _ => self.evaluate_direct(ctx, construction),
        }
    }

    /// Everything but instantiations, which carry the caching logic.
    fn evaluate_direct(&self, ctx: &mut Context, construction: &Construction) -> Result<Value> {
        match construction.kind() {
            ConstructionKind::Literal(value) => Ok(value.clone()),
            ConstructionKind::Instantiation(inst) => self.instantiate(ctx, inst),
            ConstructionKind::Binary { op, lhs, rhs } => self.binary(ctx, *op, lhs, rhs),
            ConstructionKind::Unary { op, operand } => self.unary(ctx, *op, operand),
            ConstructionKind::Conditional {
                condition,
                then,
                otherwise,
            } => {
                let condition = self.evaluate(ctx, condition)?.settle()?;
                if condition.is_truthy() {
                    self.evaluate_block(ctx, then)
                } else {
                    self.evaluate_block(ctx, otherwise)
                }
            }
            ConstructionKind::ForLoop {
                var,
                iterable,
                body,
            } => self.for_loop(ctx, var, iterable, body),
            ConstructionKind::Native(native) => {
                let args = match self.current_instance(ctx) {
                    Some(depth) => self.instance_args(ctx, depth)?,
                    None => Vec::new(),
                };
                native.call(&args).map_err(host_failure)
            }
        }
    }

    /// A body: nothing is null, a single construction is its own value and
    /// several are rendered and concatenated.
    pub fn evaluate_block(&self, ctx: &mut Context, block: &[Construction]) -> Result<Value> {
        match block {
            [] => Ok(Value::Null),
            [single] => self.evaluate(ctx, single),
            many => {
                let rendered = many
                    .iter()
                    .map(|construction| {
                        self.evaluate(ctx, construction)
                            .and_then(Value::settle)
                            .map(|value| value.to_string())
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(Value::Text(rendered.into_iter().join("")))
            }
        }
    }

    /// Swallow a failure below the configured threshold into null.
    fn tolerate(&self, result: Result<Value>, inst: &Instantiation) -> Result<Value> {
        match result {
            Err(err)
                if err.is_suppressible()
                    && !self.rt.options().error_threshold.raises(err.severity()) =>
            {
                warn!("{} evaluated to null: {}", inst, err);
                Ok(Value::Null)
            }
            other => other,
        }
    }

    /// Whether `name` resolves in `ctx`. Never raises.
    pub fn is_defined(&self, ctx: &Context, name: &str) -> bool {
        self.lookup_name(ctx, name)
            .map(|found| !matches!(found.resolved, crate::resolve::Resolved::Empty))
            .unwrap_or(false)
    }

    /// Read a configuration value through ordinary resolution. `None` when
    /// the name is undefined; a pending value is waited for.
    pub fn site_value(&self, ctx: &mut Context, name: &str) -> Result<Option<Value>> {
        let construction = Construction::instantiation(Instantiation::parse(name));
        let Some(inst) = construction.as_instantiation() else {
            return Ok(None);
        };
        if self.lookup(ctx, inst).is_none() {
            return Ok(None);
        }
        match self.evaluate(ctx, &construction).and_then(Value::settle) {
            Ok(value) => Ok(Some(value)),
            Err(err) if err.is_undefined() => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Evaluate a dotted name as if it were written on top of `ctx`.
    pub fn evaluate_name(&self, ctx: &mut Context, name: &str) -> Result<Value> {
        self.evaluate(ctx, &Construction::reference(name))
    }
}

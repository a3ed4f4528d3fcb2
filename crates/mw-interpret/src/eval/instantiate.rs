//! Walking a reference segment by segment and constructing what it names.

use super::*;

use mw_core::collection::{CollectionElements, CollectionSource, ElementRef};
use mw_core::context::ContextEntry;
use mw_core::def::{DefId, DefKind, DefRef, Durability, ParamList};
use mw_core::error::Error;
use mw_core::host::ExternalTarget;
use mw_core::value::Instance;

use crate::error::recursion_limit;
use crate::resolve::{AliasTrail, Lookup, Resolved};

/// Arguments of one segment, either still unevaluated or already evaluated
/// in the caller's context.
#[derive(Debug, Clone)]
pub(crate) enum Args<'a> {
    Lazy(&'a [Construction]),
    Values(Vec<Value>),
}

impl Args<'_> {
    pub(crate) fn len(&self) -> usize {
        match self {
            Args::Lazy(constructions) => constructions.len(),
            Args::Values(values) => values.len(),
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn apply_indexes(value: Value, indexes: &[Value]) -> Result<Value> {
    indexes.iter().try_fold(value, |value, index| {
        let value = value.settle()?;
        value
            .element(index)
            .ok_or_else(|| Error::undefined(format!("element [{}] of {}", index, value.type_name())))
    })
}

impl Evaluator {
    /// Resolve and construct `inst` without consulting the keep store.
    pub fn instantiate(&self, ctx: &mut Context, inst: &Instantiation) -> Result<Value> {
        let lookup = self
            .lookup(ctx, inst)
            .ok_or_else(|| Error::undefined(inst))?;
        self.walk(ctx, inst, &lookup, None)
    }

    /// Argument values of every segment, evaluated in `ctx`.
    pub(crate) fn part_args(&self, ctx: &mut Context, inst: &Instantiation) -> Result<Vec<Vec<Value>>> {
        inst.parts()
            .iter()
            .map(|part| {
                part.args()
                    .iter()
                    .map(|arg| self.evaluate(ctx, arg))
                    .collect::<Result<Vec<_>>>()
            })
            .collect()
    }

    /// Construct what `lookup` found, then follow the remaining segments.
    /// Arguments of later segments are written in the caller's body, so a
    /// dotted reference evaluates all of them before any frame is pushed.
    pub(crate) fn walk(
        &self,
        ctx: &mut Context,
        inst: &Instantiation,
        lookup: &Lookup,
        evaluated: Option<&[Vec<Value>]>,
    ) -> Result<Value> {
        let owned;
        let evaluated = match evaluated {
            Some(values) => Some(values),
            None if inst.is_multi_part() => {
                owned = self.part_args(ctx, inst)?;
                Some(owned.as_slice())
            }
            None => None,
        };
        let at = lookup.consumed.saturating_sub(1);
        self.step(ctx, inst, at, lookup.resolved.clone(), evaluated)
    }

    fn step(
        &self,
        ctx: &mut Context,
        inst: &Instantiation,
        at: usize,
        target: Resolved,
        evaluated: Option<&[Vec<Value>]>,
    ) -> Result<Value> {
        let parts = inst.parts();
        let Some(part) = parts.get(at) else {
            return Err(Error::undefined(inst));
        };
        let args = match evaluated {
            Some(values) => Args::Values(values.get(at).cloned().unwrap_or_default()),
            None => Args::Lazy(part.args()),
        };
        let Some(next) = parts.get(at + 1) else {
            return self.materialize(ctx, target, args, &part.indexes);
        };

        match target {
            Resolved::Definition {
                def: DefRef::Node(id),
                scope,
                as_super,
            } if part.indexes.is_empty() && self.opens_frame(id) => {
                let keep = self.kept_depth(ctx, scope);
                let args = self.force_if(ctx, args, keep < ctx.size())?;
                let mut below = ctx.unpush_to(keep)?;
                let entry = if as_super {
                    self.super_entry(&below, id)?
                } else {
                    self.frame_entry(&mut below, id, args)?
                };
                let mut frame = below.enter(entry);
                let depth = frame.size() - 1;
                let child = self.child_target(&frame, id, depth, &next.name)?;
                self.step(&mut frame, inst, at + 1, child, evaluated)
            }
            Resolved::Instance { depth } if part.indexes.is_empty() => {
                let class = ctx
                    .entry(depth)
                    .and_then(|entry| entry.def_id())
                    .ok_or_else(|| Error::undefined(inst))?;
                let child = self.child_target(ctx, class, depth, &next.name)?;
                self.step(ctx, inst, at + 1, child, evaluated)
            }
            // members of a host class named without a call are looked up
            // before anything is constructed
            Resolved::Definition {
                def: DefRef::External(ext),
                ..
            } if part.args.is_none()
                && part.indexes.is_empty()
                && matches!(ext.target, ExternalTarget::Class(_)) =>
            {
                let member = Resolved::definition(DefRef::External(self.member_of(&ext, &next.name)), None);
                self.step(ctx, inst, at + 1, member, evaluated)
            }
            target => {
                let value = self.materialize(ctx, target, args, &part.indexes)?.settle()?;
                self.step_into_value(ctx, inst, at, value, evaluated)
            }
        }
    }

    fn step_into_value(
        &self,
        ctx: &mut Context,
        inst: &Instantiation,
        at: usize,
        value: Value,
        evaluated: Option<&[Vec<Value>]>,
    ) -> Result<Value> {
        let next = &inst.parts()[at + 1].name;
        match value {
            Value::Instance(instance) if instance.def.id().is_some() => {
                let id = instance.def.id().ok_or_else(|| Error::undefined(inst))?;
                let entry = self.instance_entry(id, &instance)?;
                let mut frame = ctx.enter(entry);
                let depth = frame.size() - 1;
                let child = self.child_target(&frame, id, depth, next)?;
                self.step(&mut frame, inst, at + 1, child, evaluated)
            }
            other => {
                let child = self.child_of_value(ctx, &other, next)?;
                self.step(ctx, inst, at + 1, child, evaluated)
            }
        }
    }

    /// Definitions whose children are reached through a frame of their own.
    fn opens_frame(&self, id: DefId) -> bool {
        matches!(
            self.table().get(id).kind,
            DefKind::Named { .. } | DefKind::Anonymous { .. } | DefKind::Site { .. } | DefKind::Union { .. }
        )
    }

    /// Number of entries to keep when constructing something found in the
    /// instance at `scope`.
    fn kept_depth(&self, ctx: &Context, scope: Option<usize>) -> usize {
        scope
            .map(|depth| (depth + 1).min(ctx.size()))
            .unwrap_or(ctx.size())
    }

    fn force<'a>(&self, ctx: &mut Context, args: Args<'a>) -> Result<Vec<Value>> {
        match args {
            Args::Lazy(constructions) => constructions
                .iter()
                .map(|arg| self.evaluate(ctx, arg))
                .collect(),
            Args::Values(values) => Ok(values),
        }
    }

    fn force_if<'a>(&self, ctx: &mut Context, args: Args<'a>, eager: bool) -> Result<Args<'a>> {
        if eager {
            Ok(Args::Values(self.force(ctx, args)?))
        } else {
            Ok(args)
        }
    }

    /// The child `name` of the instance of `class` at `depth`, or one of
    /// its parameters.
    fn child_target(&self, ctx: &Context, class: DefId, depth: usize, name: &str) -> Result<Resolved> {
        let table = self.table();
        if let Some(child) = table.find_in_hierarchy(class, name) {
            let resolved = self
                .dealias(ctx, child, &mut AliasTrail::default())
                .ok_or_else(|| Error::undefined(format!("{}.{}", table.get(class), name)))?;
            return Ok(match resolved {
                Resolved::Definition {
                    def,
                    scope: None,
                    as_super,
                } if def.is_node(child) => Resolved::Definition {
                    def,
                    scope: Some(depth),
                    as_super,
                },
                other => other,
            });
        }
        if let Some(index) = self.param_index(ctx, depth, name) {
            return Ok(Resolved::Parameter { depth, index });
        }
        Err(Error::undefined(format!("{}.{}", table.get(class), name)))
    }

    /// Member `name` of a value that is not a live instance.
    fn child_of_value(&self, ctx: &Context, value: &Value, name: &str) -> Result<Resolved> {
        match value {
            Value::Host(host) => Ok(Resolved::definition(
                DefRef::External(self.member_of_host(host, name)),
                None,
            )),
            Value::Definition(DefRef::Node(id)) => {
                let child = self
                    .table()
                    .find_in_hierarchy(*id, name)
                    .ok_or_else(|| Error::undefined(format!("{}.{}", self.table().get(*id), name)))?;
                self.dealias(ctx, child, &mut AliasTrail::default())
                    .ok_or_else(|| Error::undefined(name))
            }
            Value::Definition(DefRef::External(ext)) => Ok(Resolved::definition(
                DefRef::External(self.member_of(ext, name)),
                None,
            )),
            other => other
                .element(&Value::text(name))
                .or_else(|| match name {
                    "count" => other.count().map(|n| Value::Int(n as i64)),
                    "keys" => other
                        .keys()
                        .map(|keys| Value::List(keys.into_iter().map(Value::Text).collect())),
                    _ => None,
                })
                .map(Resolved::Value)
                .ok_or_else(|| Error::undefined(format!("{} of {}", name, other.type_name()))),
        }
    }

    fn materialize(
        &self,
        ctx: &mut Context,
        target: Resolved,
        args: Args<'_>,
        indexes: &[Construction],
    ) -> Result<Value> {
        let indexes = indexes
            .iter()
            .map(|index| self.evaluate(ctx, index).and_then(Value::settle))
            .collect::<Result<Vec<_>>>()?;
        match target {
            Resolved::Definition {
                def: DefRef::Node(id),
                scope,
                as_super: false,
            } => {
                let keep = self.kept_depth(ctx, scope);
                let args = self.force_if(ctx, args, keep < ctx.size())?;
                let mut below = ctx.unpush_to(keep)?;
                self.instantiate_def(&mut below, id, args, &indexes)
            }
            Resolved::Definition {
                def: DefRef::Node(id),
                scope,
                as_super: true,
            } => {
                let keep = self.kept_depth(ctx, scope);
                let mut below = ctx.unpush_to(keep)?;
                let entry = self.super_entry(&below, id)?;
                let mut frame = below.enter(entry);
                let value = self.construct_contents(&mut frame, id)?;
                apply_indexes(value, &indexes)
            }
            Resolved::Definition {
                def: DefRef::External(ext),
                ..
            } => {
                let args = self.force(ctx, args)?;
                let value = self.construct_external(ctx, &ext, &args)?;
                apply_indexes(value, &indexes)
            }
            Resolved::Parameter { depth, index } => {
                let value = self.param_value(ctx, depth, index)?;
                // a parameter holding a definition can be called
                let value = match value {
                    Value::Definition(DefRef::Node(id)) if !args.is_empty() => {
                        let args = Args::Values(self.force(ctx, args)?);
                        self.instantiate_def(ctx, id, args, &[])?
                    }
                    value => value,
                };
                apply_indexes(value, &indexes)
            }
            Resolved::LoopVariable { depth } => {
                let value = ctx
                    .entry(depth)
                    .and_then(|entry| entry.loop_frame.as_ref())
                    .map(|frame| frame.value.clone())
                    .ok_or_else(|| Error::stack(format!("no loop frame at depth {}", depth)))?;
                apply_indexes(value, &indexes)
            }
            Resolved::Instance { depth } => {
                let value = self.instance_value(ctx, depth)?;
                apply_indexes(value, &indexes)
            }
            Resolved::Value(value) => apply_indexes(value, &indexes),
            Resolved::Empty => Ok(Value::Null),
        }
    }

    /// Construct definition `id` on top of `ctx`.
    pub(crate) fn instantiate_def(
        &self,
        ctx: &mut Context,
        id: DefId,
        args: Args<'_>,
        indexes: &[Value],
    ) -> Result<Value> {
        let def = self.table().get(id);
        if def.durability == Durability::Static && args.is_empty() && indexes.is_empty() {
            return self
                .rt
                .statics()
                .get_or_eval(StaticKey::Definition(id), || {
                    self.build(ctx, id, Args::Values(Vec::new()), &[])
                });
        }
        self.build(ctx, id, args, indexes)
    }

    fn build(&self, ctx: &mut Context, id: DefId, args: Args<'_>, indexes: &[Value]) -> Result<Value> {
        let table = self.table();
        let def = table.get(id);
        match &def.kind {
            DefKind::Alias { target } => {
                let entry = self.frame_entry(ctx, id, args)?;
                let mut frame = ctx.enter(entry);
                let value = self.evaluate(&mut frame, target)?;
                apply_indexes(value, indexes)
            }
            DefKind::Anonymous { .. } | DefKind::Named { .. } => {
                if def.is_abstract {
                    return Err(Error::abstract_construction(def));
                }
                let entry = self.frame_entry(ctx, id, args)?;
                let mut frame = ctx.enter(entry);
                let value = self.construct_contents(&mut frame, id)?;
                apply_indexes(value, indexes)
            }
            DefKind::Collection(collection) => {
                let entry = self.frame_entry(ctx, id, args)?;
                let mut frame = ctx.enter(entry);
                if indexes.is_empty() {
                    return self.materialize_elements(&mut frame, &collection.elements);
                }
                match collection.elements.element_ref(indexes) {
                    Some(ElementRef::Construction(element)) => self.evaluate(&mut frame, element),
                    Some(ElementRef::Nested(nested)) => self.materialize_elements(&mut frame, nested),
                    None => Err(Error::undefined(format!(
                        "{}[{}]",
                        def,
                        indexes.iter().join("][")
                    ))),
                }
            }
            DefKind::External { .. } | DefKind::Site { .. } => Ok(Value::Definition(DefRef::Node(id))),
            DefKind::Union { members } => {
                let member = members
                    .iter()
                    .copied()
                    .find(|member| !table.get(*member).is_abstract)
                    .ok_or_else(|| Error::abstract_construction(def))?;
                self.instantiate_def(ctx, member, args, indexes)
            }
        }
    }

    /// Value of the definition whose entry is on top of `ctx`. A definition
    /// without a body of its own takes the nearest body up its supertype
    /// chain, constructed on its behalf; with no body anywhere the value is
    /// the instance itself.
    pub(crate) fn construct_contents(&self, ctx: &mut Context, id: DefId) -> Result<Value> {
        let table = self.table();
        let contents = table.get(id).contents();
        if !contents.is_empty() {
            return self.evaluate_block(ctx, contents);
        }
        let inherited = table
            .super_chain(id)
            .into_iter()
            .skip(1)
            .find(|sup| !table.get(*sup).contents().is_empty());
        match inherited {
            Some(sup) => {
                let entry = self.super_entry(ctx, sup)?;
                let mut frame = ctx.enter(entry);
                self.evaluate_block(&mut frame, table.get(sup).contents())
            }
            None => match self.current_instance(ctx) {
                Some(depth) => self.instance_value(ctx, depth),
                None => Ok(Value::Null),
            },
        }
    }

    /// Entry for supertype `sup` constructed on behalf of the entry on top.
    fn super_entry(&self, ctx: &Context, sup: DefId) -> Result<ContextEntry> {
        let base = ctx
            .peek()
            .ok_or_else(|| Error::stack("no instance to construct a supertype for"))?;
        Ok(ContextEntry::new(sup, None, Vec::new())
            .as_super()
            .sharing_args_of(base))
    }

    fn materialize_elements(&self, ctx: &mut Context, elements: &CollectionElements) -> Result<Value> {
        let mut items = Vec::new();
        let mut entries = Vec::new();
        for (key, element) in elements.constructions() {
            let value = match element {
                ElementRef::Construction(construction) => self.evaluate(ctx, construction)?,
                ElementRef::Nested(nested) => self.materialize_elements(ctx, nested)?,
            };
            match key {
                Some(key) => entries.push((key.to_string(), value)),
                None => items.push(value),
            }
        }
        Ok(if elements.is_table() {
            Value::Table(entries)
        } else {
            Value::List(items)
        })
    }

    /// Entry binding `id` to `args`, after picking the first parameter list
    /// that accepts them.
    pub(crate) fn frame_entry(&self, ctx: &mut Context, id: DefId, args: Args<'_>) -> Result<ContextEntry> {
        let limit = self.rt.options().max_context_depth;
        let def = self.table().get(id);
        // entries set aside by an unpush still count towards the depth
        if ctx.size() + ctx.unpushed() >= limit {
            return Err(recursion_limit(limit, def));
        }
        if !def.has_params() {
            if !args.is_empty() {
                return Err(Error::wrong_arguments(
                    def,
                    format!("takes no arguments, got {}", args.len()),
                ));
            }
            return Ok(ContextEntry::new(id, None, Vec::new()));
        }

        let typed = def
            .param_lists
            .iter()
            .flat_map(|list| list.params.iter())
            .any(|param| param.type_name.is_some());
        let args = match args {
            Args::Lazy(constructions) if typed => Args::Values(self.force(ctx, Args::Lazy(constructions))?),
            args => args,
        };
        let arity = args.len();
        let matched = def.param_lists.iter().position(|list| {
            list.accepts_arity(arity)
                && match &args {
                    Args::Values(values) => self.types_match(list, values),
                    Args::Lazy(_) => true,
                }
        });
        let Some(params) = matched else {
            return Err(Error::wrong_arguments(
                def,
                format!("no parameter list accepts {} argument(s)", arity),
            ));
        };
        Ok(match args {
            Args::Lazy(constructions) => ContextEntry::new(id, Some(params), constructions.to_vec()),
            Args::Values(values) => {
                let literals = values.iter().cloned().map(Construction::literal).collect();
                ContextEntry::new(id, Some(params), literals).with_values(values)
            }
        })
    }

    fn instance_entry(&self, id: DefId, instance: &Instance) -> Result<ContextEntry> {
        let def = self.table().get(id);
        let params = def
            .param_lists
            .iter()
            .position(|list| list.accepts_arity(instance.args.len()));
        let literals = instance.args.iter().cloned().map(Construction::literal).collect();
        Ok(ContextEntry::new(id, params, literals).with_values(instance.args.to_vec()))
    }

    fn types_match(&self, list: &ParamList, values: &[Value]) -> bool {
        list.params.iter().zip(values).all(|(param, value)| {
            param
                .type_name
                .as_deref()
                .map(|type_name| self.has_type(value, type_name))
                .unwrap_or(true)
        })
    }

    fn has_type(&self, value: &Value, type_name: &str) -> bool {
        match (type_name, value) {
            (_, Value::Pending(_)) => value
                .clone()
                .settle()
                .map(|settled| self.has_type(&settled, type_name))
                .unwrap_or(false),
            ("int", Value::Int(_))
            | ("float", Value::Float(_) | Value::Int(_))
            | ("text", Value::Text(_))
            | ("bool", Value::Bool(_)) => true,
            ("int" | "float" | "text" | "bool", _) => false,
            (name, Value::Instance(instance)) => instance
                .def
                .id()
                .map(|id| self.is_named_subtype(id, name))
                .unwrap_or(false),
            (name, Value::Definition(DefRef::Node(id))) => self.is_named_subtype(*id, name),
            (name, Value::Host(host)) => self
                .rt
                .hosts()
                .superclass_distance(host.class_name(), name)
                .is_some(),
            _ => false,
        }
    }

    fn is_named_subtype(&self, id: DefId, name: &str) -> bool {
        let table = self.table();
        table.super_chain(id).into_iter().any(|class| {
            let def = table.get(class);
            def.name == name || def.full_name.joined() == name
        })
    }

    /// Value of parameter `index` of the entry at `depth`. Arguments are
    /// evaluated in the context they were written in, defaults in the
    /// context of the definition declaring them.
    pub(crate) fn param_value(&self, ctx: &mut Context, depth: usize, index: usize) -> Result<Value> {
        let entry = ctx
            .entry(depth)
            .ok_or_else(|| Error::stack(format!("no context entry at depth {}", depth)))?;
        if let Some(value) = entry.arg_value(index) {
            return Ok(value.clone());
        }
        if let Some(arg) = entry.args.get(index).cloned() {
            let value = {
                let mut below = ctx.unpush_to(depth)?;
                self.evaluate(&mut below, &arg)?
            };
            return Ok(self.record(ctx, depth, index, value));
        }

        let (def, params) = (entry.def_id(), entry.params);
        let param = def
            .zip(params)
            .and_then(|(id, list)| self.table().get(id).param_list(list))
            .and_then(|list| list.params.get(index))
            .cloned();
        let owner = def
            .map(|id| self.table().get(id).to_string())
            .unwrap_or_else(|| entry.def.to_string());
        let Some(param) = param else {
            return Err(Error::wrong_arguments(owner, format!("no parameter #{}", index)));
        };
        let Some(default) = param.default else {
            return Err(Error::wrong_arguments(
                owner,
                format!("missing argument {}", param.name),
            ));
        };
        let value = {
            let mut below = ctx.unpush_to(depth + 1)?;
            self.evaluate(&mut below, &default)?
        };
        Ok(self.record(ctx, depth, index, value))
    }

    fn record(&self, ctx: &Context, depth: usize, index: usize, value: Value) -> Value {
        match ctx.entry(depth) {
            Some(entry) => entry.record_arg_value(index, value),
            None => value,
        }
    }

    /// Every parameter value of the entry at `depth`, defaults included.
    pub(crate) fn instance_args(&self, ctx: &mut Context, depth: usize) -> Result<Vec<Value>> {
        let entry = ctx
            .entry(depth)
            .ok_or_else(|| Error::stack(format!("no context entry at depth {}", depth)))?;
        let count = entry
            .def_id()
            .and_then(|id| self.table().get(id).param_list(entry.params?))
            .map(ParamList::len)
            .unwrap_or(entry.arity());
        (0..count)
            .map(|index| self.param_value(ctx, depth, index))
            .collect()
    }

    /// The live object `this` denotes at `depth`.
    pub(crate) fn instance_value(&self, ctx: &mut Context, depth: usize) -> Result<Value> {
        let args = self.instance_args(ctx, depth)?;
        let entry = ctx
            .entry(depth)
            .ok_or_else(|| Error::stack(format!("no context entry at depth {}", depth)))?;
        let name = match &entry.def {
            DefRef::Node(id) => self.table().get(*id).to_string(),
            DefRef::External(ext) => ext.name.clone(),
        };
        Ok(Value::Instance(Instance::new(entry.def.clone(), name, args)))
    }
}

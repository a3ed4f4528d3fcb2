//! The bridge to host objects.
//!
//! An external definition proxies a host class, a host object or a member
//! of either. Constructing a class proxy picks a constructor by overload
//! score and keeps the instance for later references made on the same
//! context path. Members are methods, fields, or the virtual `count` and
//! `keys` of the receiver.

use std::sync::Arc;

use mw_core::def::DefRef;
use mw_core::error::{Error, Result};
use mw_core::host::{BoundInstance, ExternalDef, ExternalTarget, HostClass, HostMethod, HostValue};
use mw_core::{debug, Context, Value};

use crate::error::host_failure;
use crate::eval::Evaluator;

pub mod overload;

impl Evaluator {
    /// Value of external definition `ext` called with `args`.
    pub fn construct_external(&self, ctx: &Context, ext: &Arc<ExternalDef>, args: &[Value]) -> Result<Value> {
        match &ext.target {
            ExternalTarget::Object(object) if args.is_empty() => Ok(Value::Host(object.clone())),
            ExternalTarget::Object(_) => Err(Error::no_matching_overload(&ext.name, args.len())),
            ExternalTarget::Class(class) => self.construct_class(ctx, ext, class, args),
            ExternalTarget::Member { owner, name } => self.invoke_member(ctx, owner, name, args),
        }
    }

    fn construct_class(
        &self,
        ctx: &Context,
        ext: &Arc<ExternalDef>,
        class: &HostClass,
        args: &[Value],
    ) -> Result<Value> {
        let marker = ctx.marker();
        if let Some(existing) = ext.reusable_instance(&marker, args) {
            return Ok(existing);
        }
        // a class without constructors only offers static members
        if class.constructors.is_empty() && args.is_empty() {
            return Ok(Value::Definition(DefRef::External(ext.clone())));
        }
        let constructor = overload::select(self.runtime().hosts(), &class.constructors, args)
            .ok_or_else(|| Error::no_matching_overload(&class.name, args.len()))?;
        debug!("constructing host {:?}", constructor);
        let value = constructor.invoke(None, args).map_err(host_failure)?;
        ext.bind_instance(BoundInstance {
            marker,
            args: args.to_vec(),
            value: value.clone(),
        });
        Ok(value)
    }

    /// The object members of `owner` are called on. `None` for static calls.
    fn receiver(&self, ctx: &Context, owner: &Arc<ExternalDef>) -> Result<Option<HostValue>> {
        let construct = match &owner.target {
            ExternalTarget::Object(object) => return Ok(Some(object.clone())),
            ExternalTarget::Class(class) => class.constructors.iter().any(|c| c.params.is_empty()),
            ExternalTarget::Member { .. } => true,
        };
        if !construct {
            return Ok(None);
        }
        match self.construct_external(ctx, owner, &[])? {
            Value::Host(host) => Ok(Some(host)),
            _ => Ok(None),
        }
    }

    /// Methods named `name` of `class` and its superclasses, nearest first.
    fn methods<'a>(&'a self, class: &'a HostClass, name: &'a str) -> Vec<&'a HostMethod> {
        let hosts = self.runtime().hosts();
        let mut methods: Vec<&HostMethod> = class.methods_named(name).collect();
        let mut current = class.superclass.as_deref().and_then(|s| hosts.class(s));
        let mut levels = 0;
        while let Some(superclass) = current {
            methods.extend(superclass.methods_named(name));
            current = superclass.superclass.as_deref().and_then(|s| hosts.class(s));
            levels += 1;
            if levels > 64 {
                break;
            }
        }
        methods
    }

    fn invoke_member(
        &self,
        ctx: &Context,
        owner: &Arc<ExternalDef>,
        name: &str,
        args: &[Value],
    ) -> Result<Value> {
        let hosts = self.runtime().hosts();
        // a class proxy is only instantiated once an instance member is chosen
        let mut receiver = match &owner.target {
            ExternalTarget::Class(_) => None,
            _ => self.receiver(ctx, owner)?,
        };
        let class = receiver
            .as_ref()
            .and_then(|r| hosts.class(r.class_name()))
            .or_else(|| owner.class(hosts));

        if let Some(class) = class {
            if let Some(method) = overload::select(hosts, self.methods(class, name), args) {
                debug!("calling host {}.{:?}", class.name, method);
                if method.is_static {
                    return method.invoke(None, args).map_err(host_failure);
                }
                if receiver.is_none() {
                    receiver = self.receiver(ctx, owner)?;
                }
                return method.invoke(receiver.as_ref(), args).map_err(host_failure);
            }
            if let (Some(field), true) = (class.field_named(name), args.is_empty()) {
                if receiver.is_none() {
                    receiver = self.receiver(ctx, owner)?;
                }
                if let Some(receiver) = receiver.as_ref() {
                    return field.read(receiver).map_err(host_failure);
                }
            }
        }
        if receiver.is_none() && args.is_empty() && matches!(name, "count" | "keys") {
            receiver = self.receiver(ctx, owner)?;
        }
        if let (Some(receiver), true) = (receiver.as_ref(), args.is_empty()) {
            let object = receiver.object();
            let virtual_member = match name {
                "count" => object.len().map(|n| Value::Int(n as i64)),
                "keys" => object
                    .keys()
                    .map(|keys| Value::List(keys.into_iter().map(Value::Text).collect())),
                _ => None,
            };
            if let Some(value) = virtual_member {
                return Ok(value);
            }
        }
        Err(Error::no_matching_overload(
            format!("{}.{}", owner.name, name),
            args.len(),
        ))
    }

    /// Proxy for member `name` of a host value met during a walk.
    pub(crate) fn member_of_host(&self, host: &HostValue, name: &str) -> Arc<ExternalDef> {
        let owner = Arc::new(ExternalDef::new(
            host.class_name(),
            None,
            ExternalTarget::Object(host.clone()),
        ));
        self.member_of(&owner, name)
    }

    /// Proxy for member `name` of `ext`.
    pub(crate) fn member_of(&self, ext: &Arc<ExternalDef>, name: &str) -> Arc<ExternalDef> {
        Arc::new(ExternalDef::new(
            format!("{}.{}", ext.name, name),
            ext.declared_by,
            ExternalTarget::Member {
                owner: ext.clone(),
                name: name.to_string(),
            },
        ))
    }
}

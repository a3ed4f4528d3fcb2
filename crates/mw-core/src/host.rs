//! Boundary contracts for host-provided objects and classes.
//!
//! A host registers classes (with constructors, methods and fields),
//! interfaces and named objects in a [`HostRegistry`]. Definitions declared
//! external proxy these through an [`ExternalDef`].

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::context::ContextMarker;
use crate::def::DefId;
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveKind {
    Bool,
    Int,
    Float,
}

impl PrimitiveKind {
    pub fn is_numeric(self) -> bool {
        matches!(self, PrimitiveKind::Int | PrimitiveKind::Float)
    }
}

/// Static type of a host parameter or argument.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HostType {
    Primitive(PrimitiveKind),
    Boxed(PrimitiveKind),
    /// The universal text type. Accepts anything by conversion.
    Text,
    /// The universal object type.
    Object,
    Named(String),
}

impl HostType {
    pub fn int() -> Self {
        HostType::Primitive(PrimitiveKind::Int)
    }

    pub fn float() -> Self {
        HostType::Primitive(PrimitiveKind::Float)
    }

    pub fn bool() -> Self {
        HostType::Primitive(PrimitiveKind::Bool)
    }

    pub fn named(name: impl Into<String>) -> Self {
        HostType::Named(name.into())
    }

    pub fn numeric_kind(&self) -> Option<PrimitiveKind> {
        match self {
            HostType::Primitive(kind) | HostType::Boxed(kind) if kind.is_numeric() => Some(*kind),
            _ => None,
        }
    }

    /// Static type of a value passed from a construction. `None` when the
    /// value carries no type the host can reason about.
    pub fn of_value(value: &Value) -> Option<HostType> {
        match value {
            Value::Bool(_) => Some(HostType::bool()),
            Value::Int(_) => Some(HostType::int()),
            Value::Float(_) => Some(HostType::float()),
            Value::Text(_) => Some(HostType::Text),
            Value::Host(host) => Some(HostType::Named(host.class_name().to_string())),
            _ => None,
        }
    }
}

impl fmt::Display for HostType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostType::Primitive(kind) => write!(f, "{:?}", kind),
            HostType::Boxed(kind) => write!(f, "Boxed<{:?}>", kind),
            HostType::Text => f.write_str("Text"),
            HostType::Object => f.write_str("Object"),
            HostType::Named(name) => f.write_str(name),
        }
    }
}

/// An object living on the host side.
pub trait HostObject: Send + Sync + fmt::Debug {
    fn class_name(&self) -> &str;

    fn len(&self) -> Option<usize> {
        None
    }

    fn keys(&self) -> Option<Vec<String>> {
        None
    }

    fn display(&self) -> String {
        format!("{:?}", self)
    }

    fn as_any(&self) -> &dyn Any;
}

/// Shared handle to a host object. Equality is identity.
#[derive(Clone, Debug)]
pub struct HostValue(Arc<dyn HostObject>);

impl HostValue {
    pub fn new(object: impl HostObject + 'static) -> Self {
        HostValue(Arc::new(object))
    }

    pub fn object(&self) -> &dyn HostObject {
        self.0.as_ref()
    }

    pub fn class_name(&self) -> &str {
        self.0.class_name()
    }

    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        self.0.as_any().downcast_ref::<T>()
    }
}

impl PartialEq for HostValue {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for HostValue {}

impl Hash for HostValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (Arc::as_ptr(&self.0) as *const () as usize).hash(state);
    }
}

pub type HostFn =
    Arc<dyn Fn(Option<&HostValue>, &[Value]) -> eyre::Result<Value> + Send + Sync>;

pub type HostGetter = Arc<dyn Fn(&HostValue) -> eyre::Result<Value> + Send + Sync>;

/// A callable member: method, static method or constructor.
#[derive(Clone)]
pub struct HostMethod {
    pub name: String,
    pub params: Vec<HostType>,
    /// Called without a receiver.
    pub is_static: bool,
    func: HostFn,
}

impl HostMethod {
    pub fn new(
        name: impl Into<String>,
        params: Vec<HostType>,
        func: impl Fn(Option<&HostValue>, &[Value]) -> eyre::Result<Value> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            params,
            is_static: false,
            func: Arc::new(func),
        }
    }

    pub fn as_static(mut self) -> Self {
        self.is_static = true;
        self
    }

    pub fn invoke(&self, receiver: Option<&HostValue>, args: &[Value]) -> eyre::Result<Value> {
        (self.func)(receiver, args)
    }
}

impl fmt::Debug for HostMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name)?;
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", param)?;
        }
        f.write_str(")")
    }
}

#[derive(Clone)]
pub struct HostField {
    pub name: String,
    getter: HostGetter,
}

impl HostField {
    pub fn new(
        name: impl Into<String>,
        getter: impl Fn(&HostValue) -> eyre::Result<Value> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            getter: Arc::new(getter),
        }
    }

    pub fn read(&self, receiver: &HostValue) -> eyre::Result<Value> {
        (self.getter)(receiver)
    }
}

impl fmt::Debug for HostField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "field {}", self.name)
    }
}

#[derive(Debug, Clone, Default)]
pub struct HostClass {
    pub name: String,
    pub superclass: Option<String>,
    pub interfaces: Vec<String>,
    pub constructors: Vec<HostMethod>,
    pub methods: Vec<HostMethod>,
    pub fields: Vec<HostField>,
}

impl HostClass {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn extends(mut self, superclass: impl Into<String>) -> Self {
        self.superclass = Some(superclass.into());
        self
    }

    pub fn implements(mut self, interface: impl Into<String>) -> Self {
        self.interfaces.push(interface.into());
        self
    }

    pub fn constructor(
        mut self,
        params: Vec<HostType>,
        func: impl Fn(&[Value]) -> eyre::Result<Value> + Send + Sync + 'static,
    ) -> Self {
        let name = self.name.clone();
        self.constructors
            .push(HostMethod::new(name, params, move |_, args| func(args)));
        self
    }

    pub fn method(mut self, method: HostMethod) -> Self {
        self.methods.push(method);
        self
    }

    pub fn field(mut self, field: HostField) -> Self {
        self.fields.push(field);
        self
    }

    /// Methods called `name`, in declaration order.
    pub fn methods_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a HostMethod> {
        self.methods.iter().filter(move |m| m.name == name)
    }

    pub fn field_named(&self, name: &str) -> Option<&HostField> {
        self.fields.iter().find(|f| f.name == name)
    }
}

#[derive(Debug, Clone, Default)]
pub struct HostInterface {
    pub name: String,
    pub extends: Vec<String>,
}

impl HostInterface {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            extends: Vec::new(),
        }
    }

    pub fn extends(mut self, parent: impl Into<String>) -> Self {
        self.extends.push(parent.into());
        self
    }
}

/// Everything the host exposes, by name.
#[derive(Debug, Default)]
pub struct HostRegistry {
    classes: HashMap<String, Arc<HostClass>>,
    interfaces: HashMap<String, HostInterface>,
    objects: HashMap<String, HostValue>,
}

impl HostRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_class(&mut self, class: HostClass) -> Arc<HostClass> {
        let class = Arc::new(class);
        self.classes.insert(class.name.clone(), class.clone());
        class
    }

    pub fn register_interface(&mut self, interface: HostInterface) {
        self.interfaces.insert(interface.name.clone(), interface);
    }

    pub fn register_object(&mut self, name: impl Into<String>, object: HostValue) {
        self.objects.insert(name.into(), object);
    }

    pub fn class(&self, name: &str) -> Option<&Arc<HostClass>> {
        self.classes.get(name)
    }

    pub fn object(&self, name: &str) -> Option<&HostValue> {
        self.objects.get(name)
    }

    /// Levels walked up the superclass chain from `from` to reach `to`.
    pub fn superclass_distance(&self, from: &str, to: &str) -> Option<u32> {
        let mut current = from.to_string();
        let mut distance = 0;
        loop {
            if current == to {
                return Some(distance);
            }
            let class = self.classes.get(&current)?;
            current = class.superclass.clone()?;
            distance += 1;
            if distance as usize > self.classes.len() {
                return None;
            }
        }
    }

    /// Levels of interface inheritance between class `from` and interface
    /// `to`: a directly implemented interface is one level, a parent of it
    /// two, and so on. Interfaces of superclasses count the superclass
    /// levels as well.
    pub fn interface_distance(&self, from: &str, to: &str) -> Option<u32> {
        let mut best: Option<u32> = None;
        let mut class_levels = 0;
        let mut current = self.classes.get(from);
        while let Some(class) = current {
            for interface in &class.interfaces {
                if let Some(levels) = self.interface_levels(interface, to, 0) {
                    let total = class_levels + levels + 1;
                    best = Some(best.map_or(total, |b| b.min(total)));
                }
            }
            class_levels += 1;
            if class_levels as usize > self.classes.len() {
                break;
            }
            current = class
                .superclass
                .as_deref()
                .and_then(|name| self.classes.get(name));
        }
        best
    }

    fn interface_levels(&self, interface: &str, target: &str, depth: u32) -> Option<u32> {
        if interface == target {
            return Some(depth);
        }
        if depth as usize > self.interfaces.len() {
            return None;
        }
        let parents = &self.interfaces.get(interface)?.extends;
        parents
            .iter()
            .filter_map(|parent| self.interface_levels(parent, target, depth + 1))
            .min()
    }
}

/// Host instance constructed for an external definition, together with the
/// context it was constructed in.
#[derive(Debug, Clone)]
pub struct BoundInstance {
    pub marker: ContextMarker,
    pub args: Vec<Value>,
    pub value: Value,
}

#[derive(Debug, Clone)]
pub enum ExternalTarget {
    /// A class whose constructors build the instance.
    Class(Arc<HostClass>),
    /// An already existing host object.
    Object(HostValue),
    /// A member of another external definition.
    Member {
        owner: Arc<ExternalDef>,
        name: String,
    },
}

/// A definition proxying a host object, class or member.
#[derive(Debug)]
pub struct ExternalDef {
    pub name: String,
    /// External declaration that bound the name, if any.
    pub declared_by: Option<DefId>,
    pub target: ExternalTarget,
    instance: Mutex<Option<BoundInstance>>,
}

impl ExternalDef {
    pub fn new(name: impl Into<String>, declared_by: Option<DefId>, target: ExternalTarget) -> Self {
        Self {
            name: name.into(),
            declared_by,
            target,
            instance: Mutex::new(None),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<BoundInstance>> {
        match self.instance.lock() {
            Ok(guard) => guard,
            Err(poison) => poison.into_inner(),
        }
    }

    /// The instance constructed earlier, if it was constructed on the path
    /// leading to `marker` with the same arguments.
    pub fn reusable_instance(&self, marker: &ContextMarker, args: &[Value]) -> Option<Value> {
        self.lock()
            .as_ref()
            .filter(|bound| bound.marker.equals_or_precedes(marker) && bound.args == args)
            .map(|bound| bound.value.clone())
    }

    pub fn bind_instance(&self, instance: BoundInstance) {
        *self.lock() = Some(instance);
    }

    pub fn has_instance(&self) -> bool {
        self.lock().is_some()
    }

    /// The host class behind this definition, when it has one.
    pub fn class<'a>(&'a self, registry: &'a HostRegistry) -> Option<&'a Arc<HostClass>> {
        match &self.target {
            ExternalTarget::Class(class) => Some(class),
            ExternalTarget::Object(object) => registry.class(object.class_name()),
            ExternalTarget::Member { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Bag(Vec<i64>);

    impl HostObject for Bag {
        fn class_name(&self) -> &str {
            "Bag"
        }

        fn len(&self) -> Option<usize> {
            Some(self.0.len())
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    fn registry() -> HostRegistry {
        let mut registry = HostRegistry::new();
        registry.register_interface(HostInterface::new("Iterable"));
        registry.register_interface(HostInterface::new("Collection").extends("Iterable"));
        registry.register_class(HostClass::new("AbstractList").implements("Collection"));
        registry.register_class(HostClass::new("ArrayList").extends("AbstractList"));
        registry
    }

    #[test]
    fn superclass_distance_counts_levels() {
        let registry = registry();
        assert_eq!(registry.superclass_distance("ArrayList", "ArrayList"), Some(0));
        assert_eq!(registry.superclass_distance("ArrayList", "AbstractList"), Some(1));
        assert_eq!(registry.superclass_distance("AbstractList", "ArrayList"), None);
    }

    #[test]
    fn interface_distance_counts_inheritance_levels() {
        let registry = registry();
        assert_eq!(registry.interface_distance("AbstractList", "Collection"), Some(1));
        assert_eq!(registry.interface_distance("AbstractList", "Iterable"), Some(2));
        assert_eq!(registry.interface_distance("ArrayList", "Iterable"), Some(3));
        assert_eq!(registry.interface_distance("ArrayList", "Runnable"), None);
    }

    #[test]
    fn host_values_compare_by_identity() {
        let a = HostValue::new(Bag(vec![1, 2]));
        let b = HostValue::new(Bag(vec![1, 2]));
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
        assert_eq!(a.object().len(), Some(2));
        assert!(a.downcast_ref::<Bag>().is_some());
    }
}

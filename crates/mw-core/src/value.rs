use std::cmp::Ordering;
use std::fmt::{self, Debug, Display, Formatter};
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use itertools::Itertools;

use crate::def::DefRef;
use crate::error::Result;
use crate::handle::ConstructionHandle;
use crate::host::HostValue;

/// The result of constructing something.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    List(Vec<Value>),
    Table(Vec<(String, Value)>),
    /// A definition bound to argument values, e.g. the result of `this`.
    Instance(Instance),
    /// A reference to a definition that has not been constructed.
    Definition(DefRef),
    Host(HostValue),
    /// The handle of a construction running concurrently.
    Pending(ConstructionHandle),
}

#[derive(Clone)]
pub struct Instance {
    pub def: DefRef,
    pub name: Arc<str>,
    pub args: Arc<[Value]>,
}

impl Instance {
    pub fn new(def: DefRef, name: impl Into<Arc<str>>, args: Vec<Value>) -> Self {
        Self {
            def,
            name: name.into(),
            args: args.into(),
        }
    }
}

impl Debug for Instance {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "Instance({} {:?})", self.name, self.args)
    }
}

impl PartialEq for Instance {
    fn eq(&self, other: &Self) -> bool {
        self.def == other.def && self.args == other.args
    }
}

impl Eq for Instance {}

impl Hash for Instance {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.def.hash(state);
        self.args.hash(state);
    }
}

impl Value {
    pub const NULL: Value = Value::Null;

    pub fn text(text: impl Into<String>) -> Self {
        Value::Text(text.into())
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Text(_) => "text",
            Value::List(_) => "list",
            Value::Table(_) => "table",
            Value::Instance(_) => "instance",
            Value::Definition(_) => "definition",
            Value::Host(_) => "host",
            Value::Pending(_) => "pending",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Text(s) => !s.is_empty(),
            Value::List(items) => !items.is_empty(),
            Value::Table(entries) => !entries.is_empty(),
            Value::Instance(_) | Value::Definition(_) | Value::Host(_) => true,
            Value::Pending(handle) => handle
                .wait()
                .map(|value| value.is_truthy())
                .unwrap_or(false),
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            Value::Bool(b) => Some(*b as i64),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Value::Int(_) | Value::Float(_))
    }

    /// Number of elements for collection-like values.
    pub fn count(&self) -> Option<usize> {
        match self {
            Value::List(items) => Some(items.len()),
            Value::Table(entries) => Some(entries.len()),
            Value::Text(s) => Some(s.chars().count()),
            Value::Host(host) => host.object().len(),
            _ => None,
        }
    }

    pub fn keys(&self) -> Option<Vec<String>> {
        match self {
            Value::Table(entries) => Some(entries.iter().map(|(k, _)| k.clone()).collect()),
            Value::Host(host) => host.object().keys(),
            _ => None,
        }
    }

    /// Look up an element by index (list position or table key).
    pub fn element(&self, index: &Value) -> Option<Value> {
        match (self, index) {
            (Value::List(items), index) => {
                let i = index.as_int()?;
                let i = usize::try_from(i).ok()?;
                items.get(i).cloned()
            }
            (Value::Table(entries), Value::Text(key)) => entries
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.clone()),
            (Value::Table(entries), index) => {
                let key = index.to_string();
                entries
                    .iter()
                    .find(|(k, _)| *k == key)
                    .map(|(_, v)| v.clone())
            }
            _ => None,
        }
    }

    /// Block until a pending value completes; other values are returned as is.
    pub fn settle(self) -> Result<Value> {
        let mut value = self;
        while let Value::Pending(handle) = value {
            value = handle.wait()?;
        }
        Ok(value)
    }

    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
            (a, b) if a.is_numeric() && b.is_numeric() => {
                Some(a.as_f64()?.total_cmp(&b.as_f64()?))
            }
            (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    /// Equality used by operators: numeric values compare across int and float.
    pub fn loosely_equals(&self, other: &Value) -> bool {
        if self.is_numeric() && other.is_numeric() {
            return self.compare(other) == Some(Ordering::Equal);
        }
        self == other
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a.total_cmp(b) == Ordering::Equal,
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Table(a), Value::Table(b)) => a == b,
            (Value::Instance(a), Value::Instance(b)) => a == b,
            (Value::Definition(a), Value::Definition(b)) => a == b,
            (Value::Host(a), Value::Host(b)) => a == b,
            (Value::Pending(a), Value::Pending(b)) => a.same_handle(b),
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Null => {}
            Value::Bool(b) => b.hash(state),
            Value::Int(i) => i.hash(state),
            Value::Float(f) => f.to_bits().hash(state),
            Value::Text(s) => s.hash(state),
            Value::List(items) => items.hash(state),
            Value::Table(entries) => entries.hash(state),
            Value::Instance(instance) => instance.hash(state),
            Value::Definition(def) => def.hash(state),
            Value::Host(host) => host.hash(state),
            Value::Pending(handle) => handle.address().hash(state),
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(v) => write!(f, "{}", v),
            Value::Text(s) => f.write_str(s),
            Value::List(items) => write!(f, "[{}]", items.iter().join(", ")),
            Value::Table(entries) => write!(
                f,
                "{{{}}}",
                entries
                    .iter()
                    .map(|(k, v)| format!("{}: {}", k, v))
                    .join(", ")
            ),
            Value::Instance(instance) => write!(f, "{}", instance.name),
            Value::Definition(def) => write!(f, "{}", def),
            Value::Host(host) => write!(f, "{}", host.object().display()),
            Value::Pending(handle) => write!(f, "<pending {}>", handle.label()),
        }
    }
}

impl Debug for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "Null"),
            Value::Text(s) => write!(f, "Text({:?})", s),
            Value::List(items) => f.debug_list().entries(items).finish(),
            Value::Table(entries) => f
                .debug_map()
                .entries(entries.iter().map(|(k, v)| (k, v)))
                .finish(),
            Value::Instance(instance) => write!(f, "{:?}", instance),
            other => write!(f, "{}({})", other.type_name(), other),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_values_compare_across_kinds() {
        assert!(Value::Int(2).loosely_equals(&Value::Float(2.0)));
        assert_ne!(Value::Int(2), Value::Float(2.0));
        assert_eq!(
            Value::Int(1).compare(&Value::Float(1.5)),
            Some(Ordering::Less)
        );
    }

    #[test]
    fn element_reads_lists_and_tables() {
        let list = Value::List(vec![Value::Int(10), Value::Int(20)]);
        assert_eq!(list.element(&Value::Int(1)), Some(Value::Int(20)));
        assert_eq!(list.element(&Value::Int(5)), None);

        let table = Value::Table(vec![("a".into(), Value::text("x"))]);
        assert_eq!(table.element(&Value::text("a")), Some(Value::text("x")));
        assert_eq!(table.keys(), Some(vec!["a".to_string()]));
    }

    #[test]
    fn display_renders_templates_friendly_text() {
        assert_eq!(Value::Null.to_string(), "");
        assert_eq!(
            Value::List(vec![Value::Int(1), Value::text("b")]).to_string(),
            "[1, b]"
        );
    }
}

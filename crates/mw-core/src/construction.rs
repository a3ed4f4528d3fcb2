//! Constructions: anything that can be evaluated to a value.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use derive_more::Display;

use crate::instantiation::Instantiation;
use crate::value::Value;

static NEXT_CONSTRUCTION_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display)]
#[display("c{_0}")]
pub struct ConstructionId(u64);

impl ConstructionId {
    fn next() -> Self {
        ConstructionId(NEXT_CONSTRUCTION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Evaluation mode, fixed when the construction is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum EvalMode {
    /// Re-evaluated on every request, never cached.
    Dynamic,
    /// Evaluated at most once per construction node, independent of context.
    Static,
    /// Consults the cacheability tier of the construction in its context.
    #[default]
    Contextual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl BinOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Mod => "%",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
            BinOp::And => "&&",
            BinOp::Or => "||",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnOp {
    Neg,
    Not,
}

pub type NativeFn = Arc<dyn Fn(&[Value]) -> eyre::Result<Value> + Send + Sync>;

/// Host code embedded in a definition body. It receives the argument values
/// of the definition it is evaluated for.
#[derive(Clone)]
pub struct NativeConstruction {
    pub label: String,
    func: NativeFn,
}

impl NativeConstruction {
    pub fn call(&self, args: &[Value]) -> eyre::Result<Value> {
        (self.func)(args)
    }
}

impl fmt::Debug for NativeConstruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NativeConstruction({})", self.label)
    }
}

#[derive(Debug)]
pub enum ConstructionKind {
    Literal(Value),
    Instantiation(Instantiation),
    Binary {
        op: BinOp,
        lhs: Construction,
        rhs: Construction,
    },
    Unary {
        op: UnOp,
        operand: Construction,
    },
    Conditional {
        condition: Construction,
        then: Vec<Construction>,
        otherwise: Vec<Construction>,
    },
    ForLoop {
        var: String,
        iterable: Construction,
        body: Vec<Construction>,
    },
    Native(NativeConstruction),
}

/// A node of a definition body. Clones share identity, so a static
/// construction is still evaluated once however often it is cloned.
#[derive(Clone)]
pub struct Construction {
    id: ConstructionId,
    mode: EvalMode,
    kind: Arc<ConstructionKind>,
}

impl Construction {
    pub fn new(kind: ConstructionKind) -> Self {
        Self {
            id: ConstructionId::next(),
            mode: EvalMode::Contextual,
            kind: Arc::new(kind),
        }
    }

    pub fn with_mode(kind: ConstructionKind, mode: EvalMode) -> Self {
        Self {
            id: ConstructionId::next(),
            mode,
            kind: Arc::new(kind),
        }
    }

    pub fn id(&self) -> ConstructionId {
        self.id
    }

    pub fn mode(&self) -> EvalMode {
        self.mode
    }

    pub fn kind(&self) -> &ConstructionKind {
        &self.kind
    }

    pub fn as_instantiation(&self) -> Option<&Instantiation> {
        match self.kind() {
            ConstructionKind::Instantiation(inst) => Some(inst),
            _ => None,
        }
    }

    pub fn literal(value: impl Into<Value>) -> Self {
        Self::new(ConstructionKind::Literal(value.into()))
    }

    pub fn null() -> Self {
        Self::new(ConstructionKind::Literal(Value::Null))
    }

    /// Reference a definition by (possibly dotted) name.
    pub fn reference(name: &str) -> Self {
        Self::new(ConstructionKind::Instantiation(Instantiation::parse(name)))
    }

    /// Reference a definition by name, passing arguments to the last part.
    pub fn call(name: &str, args: Vec<Construction>) -> Self {
        Self::new(ConstructionKind::Instantiation(
            Instantiation::parse(name).with_args(args),
        ))
    }

    /// Reference a collection element.
    pub fn index(name: &str, indexes: Vec<Construction>) -> Self {
        Self::new(ConstructionKind::Instantiation(
            Instantiation::parse(name).with_indexes(indexes),
        ))
    }

    pub fn instantiation(inst: Instantiation) -> Self {
        Self::new(ConstructionKind::Instantiation(inst))
    }

    pub fn binary(op: BinOp, lhs: Construction, rhs: Construction) -> Self {
        Self::new(ConstructionKind::Binary { op, lhs, rhs })
    }

    pub fn unary(op: UnOp, operand: Construction) -> Self {
        Self::new(ConstructionKind::Unary { op, operand })
    }

    pub fn conditional(
        condition: Construction,
        then: Vec<Construction>,
        otherwise: Vec<Construction>,
    ) -> Self {
        Self::new(ConstructionKind::Conditional {
            condition,
            then,
            otherwise,
        })
    }

    pub fn for_each(var: &str, iterable: Construction, body: Vec<Construction>) -> Self {
        Self::new(ConstructionKind::ForLoop {
            var: var.to_string(),
            iterable,
            body,
        })
    }

    pub fn native(
        label: &str,
        func: impl Fn(&[Value]) -> eyre::Result<Value> + Send + Sync + 'static,
    ) -> Self {
        Self::new(ConstructionKind::Native(NativeConstruction {
            label: label.to_string(),
            func: Arc::new(func),
        }))
    }

    /// The same node re-created with another evaluation mode. Only meaningful
    /// while the tree is being built.
    pub fn in_mode(self, mode: EvalMode) -> Self {
        Self {
            id: ConstructionId::next(),
            mode,
            kind: self.kind,
        }
    }

    pub fn dynamic(self) -> Self {
        self.in_mode(EvalMode::Dynamic)
    }

    pub fn once(self) -> Self {
        self.in_mode(EvalMode::Static)
    }

    /// Visit this construction and every nested one.
    pub fn visit(&self, f: &mut dyn FnMut(&Construction)) {
        f(self);
        match self.kind() {
            ConstructionKind::Literal(_) | ConstructionKind::Native(_) => {}
            ConstructionKind::Instantiation(inst) => {
                for part in inst.parts() {
                    for arg in part.args.iter().flatten() {
                        arg.visit(f);
                    }
                    for index in &part.indexes {
                        index.visit(f);
                    }
                }
            }
            ConstructionKind::Binary { lhs, rhs, .. } => {
                lhs.visit(f);
                rhs.visit(f);
            }
            ConstructionKind::Unary { operand, .. } => operand.visit(f),
            ConstructionKind::Conditional {
                condition,
                then,
                otherwise,
            } => {
                condition.visit(f);
                then.iter().for_each(|c| c.visit(f));
                otherwise.iter().for_each(|c| c.visit(f));
            }
            ConstructionKind::ForLoop { iterable, body, .. } => {
                iterable.visit(f);
                body.iter().for_each(|c| c.visit(f));
            }
        }
    }
}

impl fmt::Debug for Construction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Construction")
            .field("id", &self.id)
            .field("mode", &self.mode)
            .field("kind", &self.kind)
            .finish()
    }
}

impl fmt::Display for Construction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind() {
            ConstructionKind::Literal(Value::Text(s)) => write!(f, "{:?}", s),
            ConstructionKind::Literal(value) => write!(f, "{}", value),
            ConstructionKind::Instantiation(inst) => write!(f, "{}", inst),
            ConstructionKind::Binary { op, lhs, rhs } => {
                write!(f, "({} {} {})", lhs, op.symbol(), rhs)
            }
            ConstructionKind::Unary { op: UnOp::Neg, operand } => write!(f, "-{}", operand),
            ConstructionKind::Unary { op: UnOp::Not, operand } => write!(f, "!{}", operand),
            ConstructionKind::Conditional { condition, .. } => write!(f, "if {} {{...}}", condition),
            ConstructionKind::ForLoop { var, iterable, .. } => {
                write!(f, "for {} in {} {{...}}", var, iterable)
            }
            ConstructionKind::Native(native) => write!(f, "<native {}>", native.label),
        }
    }
}

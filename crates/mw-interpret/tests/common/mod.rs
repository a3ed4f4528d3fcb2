#![allow(dead_code)]
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use mw_core::config::RuntimeOptions;
use mw_core::def::TableBuilder;
use mw_core::host::HostRegistry;
use mw_core::{Construction, Context, Value};
use mw_interpret::{Evaluator, Runtime};

pub struct Program {
    pub rt: Arc<Runtime>,
    pub eval: Evaluator,
}

impl Program {
    pub fn new(builder: TableBuilder) -> Self {
        Self::with(builder, HostRegistry::new(), RuntimeOptions::default())
    }

    pub fn with(builder: TableBuilder, hosts: HostRegistry, options: RuntimeOptions) -> Self {
        let table = builder.finish().expect("table builds");
        let rt = Runtime::new(table, hosts, options).expect("runtime links");
        let eval = rt.evaluator();
        Self { rt, eval }
    }

    pub fn context(&self) -> Context {
        self.rt.context()
    }

    /// Evaluate `name` on a fresh context and wait for the result.
    pub fn value(&self, name: &str) -> Value {
        let mut ctx = self.context();
        self.eval
            .evaluate_name(&mut ctx, name)
            .and_then(Value::settle)
            .unwrap_or_else(|err| panic!("{} failed: {}", name, err))
    }
}

/// A native body that counts its evaluations and returns the count.
pub fn counter() -> (Construction, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let seen = calls.clone();
    let body = Construction::native("counter", move |_| {
        Ok(Value::Int(seen.fetch_add(1, Ordering::SeqCst) as i64 + 1))
    });
    (body, calls)
}

pub fn lit(value: impl Into<Value>) -> Construction {
    Construction::literal(value)
}

pub fn reference(name: &str) -> Construction {
    Construction::reference(name)
}

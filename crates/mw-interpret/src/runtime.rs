//! Process-wide state of one program.

use std::cell::RefCell;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use mw_core::collections::ConcurrentMap;
use mw_core::config::RuntimeOptions;
use mw_core::construction::ConstructionId;
use mw_core::def::{DefId, DefinitionTable};
use mw_core::diagnostics::diagnostic_manager;
use mw_core::error::{Error, ErrorCode, Result, Severity};
use mw_core::host::{ExternalDef, ExternalTarget, HostRegistry};
use mw_core::keep::KeepScope;
use mw_core::{debug, info, warn, Context};

use crate::concurrent::WorkerPool;
use crate::eval::Evaluator;
use crate::link::{link, ExternalBinding, LinkReport};

/// What a static memo cell is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StaticKey {
    Construction(ConstructionId),
    Definition(DefId),
}

type Cell = Arc<Mutex<Option<mw_core::Value>>>;

thread_local! {
    static HELD_STATICS: RefCell<Vec<StaticKey>> = const { RefCell::new(Vec::new()) };
}

struct HeldStatic(StaticKey);

impl HeldStatic {
    fn acquire(key: StaticKey) -> Result<Self> {
        HELD_STATICS.with(|held| {
            let mut held = held.borrow_mut();
            if held.contains(&key) {
                return Err(Error::redirection(
                    Severity::Fatal,
                    ErrorCode::RecursionLimit,
                    format!("static construction {:?} depends on itself", key),
                ));
            }
            held.push(key);
            Ok(HeldStatic(key))
        })
    }
}

impl Drop for HeldStatic {
    fn drop(&mut self) {
        HELD_STATICS.with(|held| {
            let mut held = held.borrow_mut();
            if let Some(pos) = held.iter().rposition(|k| *k == self.0) {
                held.remove(pos);
            }
        });
    }
}

/// Memo cells of static constructions and static definitions. The first
/// evaluation runs under the cell's lock, so concurrent first accesses wait
/// for it instead of evaluating twice. Failures are not memoized.
#[derive(Default)]
pub struct StaticCells {
    cells: ConcurrentMap<StaticKey, Cell>,
    evaluations: AtomicU64,
}

impl StaticCells {
    fn lock(cell: &Cell) -> MutexGuard<'_, Option<mw_core::Value>> {
        match cell.lock() {
            Ok(guard) => guard,
            Err(poison) => poison.into_inner(),
        }
    }

    pub fn get_or_eval(
        &self,
        key: StaticKey,
        eval: impl FnOnce() -> Result<mw_core::Value>,
    ) -> Result<mw_core::Value> {
        let _held = HeldStatic::acquire(key)?;
        let cell = self.cells.get_or_insert_with(key, Cell::default);
        let mut slot = Self::lock(&cell);
        if let Some(value) = slot.as_ref() {
            return Ok(value.clone());
        }
        self.evaluations.fetch_add(1, Ordering::Relaxed);
        let value = eval()?;
        *slot = Some(value.clone());
        Ok(value)
    }

    pub fn get(&self, key: &StaticKey) -> Option<mw_core::Value> {
        let cell = self.cells.get_cloned(key)?;
        let slot = Self::lock(&cell);
        slot.clone()
    }

    /// Number of first evaluations performed.
    pub fn evaluations(&self) -> u64 {
        self.evaluations.load(Ordering::Relaxed)
    }

    pub fn clear(&self) {
        self.cells.clear();
    }
}

/// A linked program ready to be evaluated.
pub struct Runtime {
    table: DefinitionTable,
    hosts: HostRegistry,
    options: RuntimeOptions,
    report: LinkReport,
    global_keep: Arc<KeepScope>,
    statics: StaticCells,
    externals: ConcurrentMap<(DefId, String), Arc<ExternalDef>>,
    pool: WorkerPool,
}

impl Runtime {
    /// Link `table` and build a runtime around it. With `strict_link` the
    /// first link error aborts construction.
    pub fn new(
        table: DefinitionTable,
        hosts: HostRegistry,
        options: RuntimeOptions,
    ) -> Result<Arc<Self>> {
        let report = link(&table);
        for diagnostic in &report.diagnostics {
            warn!("link: {}", diagnostic);
        }
        if options.strict_link {
            if let Some(first) = report.errors().next() {
                return Err(Error::diagnostic(first.clone()));
            }
        }
        diagnostic_manager().add_diagnostics(report.diagnostics.iter().cloned());
        info!(
            "runtime ready: {} definitions, {} external bindings",
            table.len(),
            report.bindings.len()
        );
        let pool = WorkerPool::new(options.worker_threads);
        Ok(Arc::new(Self {
            table,
            hosts,
            options,
            report,
            global_keep: Arc::new(KeepScope::new()),
            statics: StaticCells::default(),
            externals: ConcurrentMap::new(),
            pool,
        }))
    }

    pub fn table(&self) -> &DefinitionTable {
        &self.table
    }

    pub fn hosts(&self) -> &HostRegistry {
        &self.hosts
    }

    pub fn options(&self) -> &RuntimeOptions {
        &self.options
    }

    pub fn link_report(&self) -> &LinkReport {
        &self.report
    }

    pub fn bindings(&self) -> &[ExternalBinding] {
        &self.report.bindings
    }

    pub fn global_keep(&self) -> &Arc<KeepScope> {
        &self.global_keep
    }

    pub fn statics(&self) -> &StaticCells {
        &self.statics
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    /// A fresh context rooted at the program's root site.
    pub fn context(&self) -> Context {
        Context::new(self.table.root())
    }

    pub fn evaluator(self: &Arc<Self>) -> Evaluator {
        Evaluator::new(self.clone())
    }

    /// The proxy for host name `name` bound through `binding`, created on
    /// first use and shared afterwards.
    pub fn external(&self, binding: &ExternalBinding, name: &str) -> Option<Arc<ExternalDef>> {
        let key = (binding.declaration, name.to_string());
        if let Some(existing) = self.externals.get_cloned(&key) {
            return Some(existing);
        }
        let target = if let Some(object) = self.hosts.object(name) {
            ExternalTarget::Object(object.clone())
        } else {
            ExternalTarget::Class(self.hosts.class(name)?.clone())
        };
        debug!("binding external {} through {}", name, binding.declaration);
        Some(self.externals.get_or_insert_with(key, || {
            Arc::new(ExternalDef::new(name, Some(binding.declaration), target))
        }))
    }
}

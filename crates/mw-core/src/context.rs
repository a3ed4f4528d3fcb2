//! The context: a stack of the definitions currently being constructed.
//!
//! Each entry binds a definition to the parameter list it matched and the
//! arguments it received. Resolution walks this stack to find parameters,
//! the active subtype of a class and the containing instances.
//!
//! Pushes are structured. [`Context::enter`] returns a [`FrameScope`] that
//! pops on drop. Temporarily removing the top entries to evaluate something
//! in an outer scope goes through [`Context::unpush_to`], whose
//! [`UnpushGuard`] repushes everything it removed on every exit path.

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use crate::construction::Construction;
use crate::def::{DefId, DefRef};
use crate::error::{Error, Result};
use crate::keep::KeepScope;
use crate::value::Value;

static NEXT_SERIAL: AtomicU64 = AtomicU64::new(1);
static NEXT_LINEAGE: AtomicU64 = AtomicU64::new(1);

fn next_serial() -> u64 {
    NEXT_SERIAL.fetch_add(1, Ordering::Relaxed)
}

/// Binding of an enclosing for-loop.
#[derive(Debug, Clone)]
pub struct LoopFrame {
    pub var: String,
    pub value: Value,
}

#[derive(Clone)]
pub struct ContextEntry {
    pub def: DefRef,
    /// Index of the parameter list that matched the arguments.
    pub params: Option<usize>,
    pub args: Arc<[Construction]>,
    values: Arc<[OnceLock<Value>]>,
    /// Set when the entry stands for a supertype constructed on behalf of
    /// the subtype entry below it.
    pub super_push: bool,
    pub loop_frame: Option<Arc<LoopFrame>>,
    keep: Arc<KeepScope>,
    serial: u64,
}

impl ContextEntry {
    pub fn new(def: impl Into<DefRef>, params: Option<usize>, args: Vec<Construction>) -> Self {
        let values = (0..args.len()).map(|_| OnceLock::new()).collect();
        Self {
            def: def.into(),
            params,
            args: args.into(),
            values,
            super_push: false,
            loop_frame: None,
            keep: Arc::new(KeepScope::new()),
            serial: next_serial(),
        }
    }

    pub fn loop_frame(def: impl Into<DefRef>, var: impl Into<String>, value: Value) -> Self {
        let mut entry = Self::new(def, None, Vec::new());
        entry.loop_frame = Some(Arc::new(LoopFrame {
            var: var.into(),
            value,
        }));
        entry
    }

    pub fn as_super(mut self) -> Self {
        self.super_push = true;
        self
    }

    /// Record argument values that were already evaluated by the caller.
    pub fn with_values(self, values: Vec<Value>) -> Self {
        for (cell, value) in self.values.iter().zip(values) {
            let _ = cell.set(value);
        }
        self
    }

    /// Share argument bindings with another entry for the same instance,
    /// e.g. a supertype pushed on behalf of a subtype.
    pub fn sharing_args_of(mut self, other: &ContextEntry) -> Self {
        self.args = other.args.clone();
        self.values = other.values.clone();
        self.params = other.params;
        self
    }

    pub fn def_id(&self) -> Option<DefId> {
        self.def.id()
    }

    pub fn is_loop(&self) -> bool {
        self.loop_frame.is_some()
    }

    pub fn arity(&self) -> usize {
        self.args.len()
    }

    /// Argument value if it has already been evaluated.
    pub fn arg_value(&self, index: usize) -> Option<&Value> {
        self.values.get(index)?.get()
    }

    /// Memoize an evaluated argument. The first value recorded wins.
    pub fn record_arg_value(&self, index: usize, value: Value) -> Value {
        match self.values.get(index) {
            Some(cell) => cell.get_or_init(|| value).clone(),
            None => value,
        }
    }

    pub fn keep(&self) -> &Arc<KeepScope> {
        &self.keep
    }

    pub fn serial(&self) -> u64 {
        self.serial
    }
}

impl fmt::Debug for ContextEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("ContextEntry");
        s.field("def", &self.def)
            .field("params", &self.params)
            .field("arity", &self.args.len());
        if self.super_push {
            s.field("super_push", &true);
        }
        if let Some(frame) = &self.loop_frame {
            s.field("loop", &frame.var);
        }
        s.field("serial", &self.serial).finish()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StackStats {
    pub pushes: u64,
    pub pops: u64,
    pub unpushes: u64,
    pub repushes: u64,
}

impl StackStats {
    pub fn is_balanced(&self) -> bool {
        self.pushes == self.pops && self.unpushes == self.repushes
    }
}

/// Identifies the call path that reached a point of the stack. A marker
/// taken deeper on the same path is preceded by every marker taken above it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextMarker {
    lineage: u64,
    path: Arc<[u64]>,
}

impl ContextMarker {
    pub fn equals_or_precedes(&self, other: &ContextMarker) -> bool {
        self.lineage == other.lineage && other.path.starts_with(&self.path)
    }

    pub fn depth(&self) -> usize {
        self.path.len()
    }
}

pub struct Context {
    lineage: u64,
    root: DefId,
    entries: Vec<ContextEntry>,
    unpushed: Vec<ContextEntry>,
    stats: StackStats,
}

impl Context {
    /// A fresh context whose bottom entry is the given root site.
    pub fn new(root: DefId) -> Self {
        Self {
            lineage: NEXT_LINEAGE.fetch_add(1, Ordering::Relaxed),
            root,
            entries: vec![ContextEntry::new(root, None, Vec::new())],
            unpushed: Vec::new(),
            stats: StackStats::default(),
        }
    }

    pub fn root(&self) -> DefId {
        self.root
    }

    pub fn size(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn peek(&self) -> Option<&ContextEntry> {
        self.entries.last()
    }

    pub fn entry(&self, depth: usize) -> Option<&ContextEntry> {
        self.entries.get(depth)
    }

    pub fn entries(&self) -> &[ContextEntry] {
        &self.entries
    }

    /// Entries currently removed by an unpush, innermost last.
    pub fn unpushed(&self) -> usize {
        self.unpushed.len()
    }

    pub fn stats(&self) -> StackStats {
        self.stats
    }

    pub fn push(&mut self, entry: ContextEntry) {
        self.stats.pushes += 1;
        self.entries.push(entry);
    }

    pub fn pop(&mut self) -> Result<ContextEntry> {
        match self.entries.pop() {
            Some(entry) => {
                self.stats.pops += 1;
                Ok(entry)
            }
            None => Err(Error::stack("pop on an empty context")),
        }
    }

    pub fn unpush(&mut self) -> Result<()> {
        let entry = self
            .entries
            .pop()
            .ok_or_else(|| Error::stack("unpush on an empty context"))?;
        self.stats.unpushes += 1;
        self.unpushed.push(entry);
        Ok(())
    }

    pub fn repush(&mut self) -> Result<()> {
        let entry = self
            .unpushed
            .pop()
            .ok_or_else(|| Error::stack("repush without a matching unpush"))?;
        self.stats.repushes += 1;
        self.entries.push(entry);
        Ok(())
    }

    /// Push `entry` for the lifetime of the returned scope.
    pub fn enter(&mut self, entry: ContextEntry) -> FrameScope<'_> {
        let serial = entry.serial;
        self.push(entry);
        FrameScope { ctx: self, serial }
    }

    /// Temporarily remove entries until only `size` remain.
    pub fn unpush_to(&mut self, size: usize) -> Result<UnpushGuard<'_>> {
        if size > self.entries.len() {
            return Err(Error::stack(format!(
                "cannot unpush to depth {} from depth {}",
                size,
                self.entries.len()
            )));
        }
        let count = self.entries.len() - size;
        let mut guard = UnpushGuard {
            ctx: self,
            count: 0,
        };
        for _ in 0..count {
            guard.ctx.unpush()?;
            guard.count += 1;
        }
        Ok(guard)
    }

    pub fn marker(&self) -> ContextMarker {
        ContextMarker {
            lineage: self.lineage,
            path: self.entries.iter().map(|e| e.serial).collect(),
        }
    }

    /// Copy of the stack that can be mutated independently. Entries keep
    /// their identity so markers stay comparable. A deep snapshot also
    /// duplicates every keep scope instead of sharing it.
    pub fn snapshot(&self, deep: bool) -> Context {
        let entries = self
            .entries
            .iter()
            .map(|entry| {
                let mut copy = entry.clone();
                if deep {
                    copy.keep = Arc::new(entry.keep.duplicate());
                }
                copy
            })
            .collect();
        Context {
            lineage: self.lineage,
            root: self.root,
            entries,
            unpushed: Vec::new(),
            stats: StackStats::default(),
        }
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("root", &self.root)
            .field("entries", &self.entries)
            .field("unpushed", &self.unpushed.len())
            .finish()
    }
}

/// Pops the entry pushed by [`Context::enter`] when dropped.
pub struct FrameScope<'a> {
    ctx: &'a mut Context,
    serial: u64,
}

impl FrameScope<'_> {
    pub fn entry(&self) -> Option<&ContextEntry> {
        self.ctx.peek()
    }
}

impl Deref for FrameScope<'_> {
    type Target = Context;

    fn deref(&self) -> &Context {
        &*self.ctx
    }
}

impl DerefMut for FrameScope<'_> {
    fn deref_mut(&mut self) -> &mut Context {
        &mut *self.ctx
    }
}

impl Drop for FrameScope<'_> {
    fn drop(&mut self) {
        if !self.ctx.entries.iter().any(|e| e.serial == self.serial) {
            error!("frame {} left the context before its scope ended", self.serial);
            return;
        }
        while let Ok(entry) = self.ctx.pop() {
            if entry.serial == self.serial {
                return;
            }
            error!("popping frame {} left unbalanced above its scope", entry.serial);
        }
    }
}

/// Repushes the entries removed by [`Context::unpush_to`] when dropped.
pub struct UnpushGuard<'a> {
    ctx: &'a mut Context,
    count: usize,
}

impl UnpushGuard<'_> {
    pub fn removed(&self) -> usize {
        self.count
    }
}

impl Deref for UnpushGuard<'_> {
    type Target = Context;

    fn deref(&self) -> &Context {
        &*self.ctx
    }
}

impl DerefMut for UnpushGuard<'_> {
    fn deref_mut(&mut self) -> &mut Context {
        &mut *self.ctx
    }
}

impl Drop for UnpushGuard<'_> {
    fn drop(&mut self) {
        for _ in 0..self.count {
            if let Err(err) = self.ctx.repush() {
                error!("{}", err);
                return;
            }
        }
    }
}

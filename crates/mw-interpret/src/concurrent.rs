//! Concurrent construction: a growing worker pool and the spawn path that
//! hands a snapshot of the context to it.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

use mw_core::error::{Error, ErrorCode, Result, Severity};
use mw_core::handle::ConstructionHandle;
use mw_core::instantiation::Instantiation;
use mw_core::{debug, error, trace, Construction, Context, Value};

use crate::eval::Evaluator;

type Job = Box<dyn FnOnce() + Send + 'static>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poison) => poison.into_inner(),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        text.to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "panic without message".to_string()
    }
}

/// Worker threads fed from one queue. Every submitted job reserves an idle
/// worker, and a new worker is started when none is idle, so a job never
/// waits behind a worker that is itself blocked on another job.
pub struct WorkerPool {
    sender: Mutex<Option<Sender<Job>>>,
    receiver: Arc<Mutex<Receiver<Job>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    idle: Arc<AtomicUsize>,
}

impl WorkerPool {
    pub fn new(threads: usize) -> Self {
        let (sender, receiver) = mpsc::channel::<Job>();
        let pool = Self {
            sender: Mutex::new(Some(sender)),
            receiver: Arc::new(Mutex::new(receiver)),
            workers: Mutex::new(Vec::new()),
            idle: Arc::new(AtomicUsize::new(0)),
        };
        for _ in 0..threads {
            pool.idle.fetch_add(1, Ordering::SeqCst);
            pool.start_worker();
        }
        pool
    }

    fn start_worker(&self) {
        let receiver = self.receiver.clone();
        let idle = self.idle.clone();
        let mut workers = lock(&self.workers);
        let index = workers.len();
        let spawned = thread::Builder::new()
            .name(format!("marrow-worker-{}", index))
            .spawn(move || loop {
                let job = lock(&receiver).recv();
                match job {
                    Ok(job) => {
                        if let Err(payload) = catch_unwind(AssertUnwindSafe(job)) {
                            error!("worker job panicked: {}", panic_message(payload.as_ref()));
                        }
                        idle.fetch_add(1, Ordering::SeqCst);
                    }
                    Err(_) => break,
                }
            });
        match spawned {
            Ok(handle) => workers.push(handle),
            Err(err) => error!("failed to start worker {}: {}", index, err),
        }
    }

    pub fn submit(&self, job: Job) -> Result<()> {
        let reserved = self
            .idle
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if !reserved {
            debug!("no idle worker, growing pool to {}", self.size() + 1);
            self.start_worker();
        }
        let sender = lock(&self.sender);
        match sender.as_ref() {
            Some(sender) => sender
                .send(job)
                .map_err(|_| Error::host_call("worker pool is shut down")),
            None => Err(Error::host_call("worker pool is shut down")),
        }
    }

    pub fn size(&self) -> usize {
        lock(&self.workers).len()
    }

    pub fn idle(&self) -> usize {
        self.idle.load(Ordering::SeqCst)
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        lock(&self.sender).take();
        let current = thread::current().id();
        for handle in lock(&self.workers).drain(..) {
            // the last runtime reference may be released by a job on a worker
            if handle.thread().id() != current {
                let _ = handle.join();
            }
        }
    }
}

impl Evaluator {
    /// Start constructing `inst` on a worker against a snapshot of `ctx`.
    /// Returns once the worker has taken its inputs, with a pending value
    /// whose handle yields the result or the failure.
    pub fn spawn(&self, ctx: &Context, construction: &Construction, inst: &Instantiation) -> Result<Value> {
        let snapshot = ctx.snapshot(false);
        let handle = ConstructionHandle::new(inst.to_string());
        let (started_tx, started_rx) = mpsc::sync_channel::<()>(1);
        let evaluator = self.clone();
        let construction = construction.clone();
        let completion = handle.clone();
        trace!("spawning {}", inst);
        self.runtime().pool().submit(Box::new(move || {
            let mut ctx = snapshot;
            let _ = started_tx.send(());
            let result = catch_unwind(AssertUnwindSafe(|| {
                evaluator.evaluate_spawned(&mut ctx, &construction)
            }))
            .unwrap_or_else(|payload| {
                Err(Error::redirection(
                    Severity::Fatal,
                    ErrorCode::Internal,
                    format!("concurrent construction panicked: {}", panic_message(payload.as_ref())),
                ))
            });
            completion.complete(result);
        }))?;
        started_rx
            .recv()
            .map_err(|_| Error::stack(format!("concurrent construction {} never started", inst)))?;
        Ok(Value::Pending(handle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc::channel;
    use std::time::Duration;

    #[test]
    fn pool_grows_when_every_worker_is_busy() {
        let pool = WorkerPool::new(1);
        let (release_tx, release_rx) = channel::<()>();
        let release_rx = Arc::new(Mutex::new(release_rx));
        let (done_tx, done_rx) = channel::<usize>();

        for i in 0..3 {
            let release_rx = release_rx.clone();
            let done_tx = done_tx.clone();
            pool.submit(Box::new(move || {
                if i == 0 {
                    let _ = lock(&release_rx).recv();
                }
                let _ = done_tx.send(i);
            }))
            .unwrap();
        }
        let mut finished: Vec<usize> = (0..2)
            .map(|_| done_rx.recv_timeout(Duration::from_secs(5)).unwrap())
            .collect();
        finished.sort();
        assert_eq!(finished, vec![1, 2]);
        release_tx.send(()).unwrap();
        assert_eq!(done_rx.recv_timeout(Duration::from_secs(5)).unwrap(), 0);
        assert!(pool.size() >= 2);
    }

    #[test]
    fn panicking_jobs_do_not_kill_the_worker() {
        let pool = WorkerPool::new(1);
        pool.submit(Box::new(|| panic!("boom"))).unwrap();
        let (tx, rx) = channel();
        pool.submit(Box::new(move || {
            let _ = tx.send(42);
        }))
        .unwrap();
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 42);
    }
}

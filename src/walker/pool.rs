//! Parallel scheduler
//!
//! Architecture:
//! ```text
//! Directory Queue (crossbeam deque - work stealing)
//! │
//! ├── Worker 0: pop dir → bulk enumerate → charge files → push subdirs
//! ├── Worker 1: pop dir → bulk enumerate → charge files → push subdirs
//! └── Worker N: pop dir → bulk enumerate → charge files → push subdirs
//! │
//! └── Totals: per-directory sums added into shared atomic counters
//! ```
//!
//! Each worker holds at most one directory open at a time, so the number
//! of open descriptors is bounded by the worker count however deep or wide
//! the tree is.

use super::aggregate::Scanner;
use super::Totals;
use crate::bulk::DirOpener;
use crate::error::{Result, ScanError, WorkerError};
use crossbeam_deque::{Injector, Steal, Stealer, Worker as DequeWorker};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info};

/// Spins before an idle worker starts sleeping
const MAX_IDLE_SPINS: u32 = 1000;

/// Aggregate `root` with a pool of `workers` threads
///
/// The root is scanned on the calling thread so that a root that can't be
/// opened fails the run before any thread is started. A worker that panics
/// stops the whole pool and the run fails with [`WorkerError::Panicked`].
pub fn aggregate_parallel<O: DirOpener>(
    scanner: &Scanner<'_, O>,
    root: &Path,
    workers: usize,
) -> Result<Totals> {
    let summary = scanner.scan(root).map_err(ScanError::into_root_error)?;

    if summary.subdirs.is_empty() {
        return Ok(scanner.counters().totals());
    }

    let injector: Injector<PathBuf> = Injector::new();
    let pending_work = AtomicU64::new(summary.subdirs.len() as u64);
    let aborted = AtomicBool::new(false);
    for dir in summary.subdirs {
        injector.push(dir);
    }

    let workers = workers.max(1);
    let mut locals: Vec<DequeWorker<PathBuf>> = Vec::with_capacity(workers);
    let mut stealers: Vec<Stealer<PathBuf>> = Vec::with_capacity(workers);
    for _ in 0..workers {
        let w = DequeWorker::new_fifo();
        stealers.push(w.stealer());
        locals.push(w);
    }

    info!(workers, root = %root.display(), "Starting parallel walk");

    let failure = thread::scope(|s| {
        let mut handles = Vec::with_capacity(workers);
        let mut failure = None;

        for (id, local) in locals.into_iter().enumerate() {
            let ctx = WorkerContext {
                id,
                scanner,
                injector: &injector,
                stealers: &stealers,
                pending_work: &pending_work,
                aborted: &aborted,
            };
            let spawned = thread::Builder::new()
                .name(format!("walker-{}", id))
                .spawn_scoped(s, move || worker_loop(ctx, local));

            match spawned {
                Ok(handle) => handles.push((id, handle)),
                Err(e) => {
                    failure = Some(WorkerError::SpawnFailed {
                        id,
                        reason: e.to_string(),
                    });
                    break;
                }
            }
        }

        // Workers already running drain the queue on their own. With none
        // running, the queued work would never finish.
        if handles.is_empty() {
            return failure;
        }

        for (id, handle) in handles {
            match handle.join() {
                Ok(None) => {}
                Ok(Some(err)) => {
                    failure.get_or_insert(err);
                }
                Err(payload) => {
                    failure.get_or_insert(WorkerError::Panicked {
                        id,
                        message: panic_message(payload.as_ref()),
                    });
                }
            }
        }

        failure
    });

    if let Some(err) = failure {
        return Err(err.into());
    }

    Ok(scanner.counters().totals())
}

struct WorkerContext<'s, 'a, O> {
    id: usize,
    scanner: &'s Scanner<'a, O>,
    injector: &'s Injector<PathBuf>,
    stealers: &'s [Stealer<PathBuf>],
    pending_work: &'s AtomicU64,
    /// Set by a worker whose scan panicked
    aborted: &'s AtomicBool,
}

/// Worker thread - scans directories until no work is left anywhere
///
/// Returns the error that stopped this worker early, if any.
fn worker_loop<O: DirOpener>(
    ctx: WorkerContext<'_, '_, O>,
    local: DequeWorker<PathBuf>,
) -> Option<WorkerError> {
    debug!("Worker {} started", ctx.id);

    let mut idle_spins = 0;
    let mut scanned = 0u64;

    loop {
        if ctx.aborted.load(Ordering::SeqCst) {
            debug!("Worker {} stopping, run aborted", ctx.id);
            break;
        }

        let dir = match find_work(&ctx, &local) {
            Some(dir) => {
                idle_spins = 0;
                dir
            }
            None => {
                if ctx.pending_work.load(Ordering::SeqCst) == 0 {
                    break;
                }

                idle_spins += 1;
                if idle_spins > MAX_IDLE_SPINS {
                    thread::sleep(Duration::from_micros(100));
                    idle_spins = 0;
                } else {
                    std::hint::spin_loop();
                }
                continue;
            }
        };

        ctx.scanner.counters().worker_started();

        // A panicking scan still retires its directory
        let outcome = match panic::catch_unwind(AssertUnwindSafe(|| ctx.scanner.scan(&dir))) {
            Ok(Ok(summary)) => {
                // Count new work before it becomes visible
                ctx.pending_work
                    .fetch_add(summary.subdirs.len() as u64, Ordering::SeqCst);
                for subdir in summary.subdirs {
                    local.push(subdir);
                }
                None
            }
            Ok(Err(e)) => {
                ctx.scanner.report(&e);
                None
            }
            Err(payload) => Some(WorkerError::Panicked {
                id: ctx.id,
                message: panic_message(payload.as_ref()),
            }),
        };
        scanned += 1;

        ctx.scanner.counters().worker_finished();
        ctx.pending_work.fetch_sub(1, Ordering::SeqCst);

        if let Some(err) = outcome {
            error!(path = %dir.display(), "Worker {} aborting: {}", ctx.id, err);
            ctx.aborted.store(true, Ordering::SeqCst);
            return Some(err);
        }
    }

    debug!("Worker {} finished after {} directories", ctx.id, scanned);
    None
}

/// Local queue first, then the injector, then steal from other workers
fn find_work<O>(ctx: &WorkerContext<'_, '_, O>, local: &DequeWorker<PathBuf>) -> Option<PathBuf> {
    local.pop().or_else(|| {
        loop {
            match ctx.injector.steal_batch_and_pop(local) {
                Steal::Success(dir) => return Some(dir),
                Steal::Empty => break,
                Steal::Retry => continue,
            }
        }
        for (i, stealer) in ctx.stealers.iter().enumerate() {
            if i == ctx.id {
                continue;
            }
            loop {
                match stealer.steal() {
                    Steal::Success(dir) => return Some(dir),
                    Steal::Empty => break,
                    Steal::Retry => continue,
                }
            }
        }
        None
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

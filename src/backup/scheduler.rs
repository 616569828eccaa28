//! One-file-per-worker fan-out: the core owns no cross-file shared state,
//! so parallelising a whole-tree backup is just "run `backup_one_file` once
//! per entry, on a thread pool". A scoped `rayon` pool sized from a plain
//! argument, rather than a CLI flag, since this crate has no CLI.

use rayon::prelude::*;

use crate::backup::cancel::CancellationToken;
use crate::backup::diagnostics::Diagnostic;
use crate::backup::file_entry::FileEntry;
use crate::error::Result;

/// One unit of work for [`backup_tree`]: a source/destination pair plus the
/// `FileEntry` the worker mutates in place.
pub struct BackupJob<'a> {
    pub file: &'a mut FileEntry,
    pub run: Box<dyn FnOnce(&mut FileEntry, &CancellationToken) -> Result<()> + Send + 'a>,
}

/// Run every job in `jobs` on a scoped pool of `threads` workers: one file
/// per worker, synchronous blocking I/O inside each worker. Polling
/// `cancel` is the caller's responsibility inside each job's closure — this
/// function only decides how many jobs run concurrently.
///
/// Returns the first error encountered, if any; every job still runs (a
/// cancelled token makes the remaining jobs fail fast at their own
/// checkpoints rather than being skipped here).
pub fn backup_tree(jobs: Vec<BackupJob<'_>>, threads: usize, cancel: &CancellationToken) -> Result<()> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(threads.max(1))
        .build()
        .expect("failed to build backup worker pool");

    pool.install(|| {
        jobs.into_par_iter()
            .map(|job| (job.run)(job.file, cancel))
            .reduce(|| Ok(()), |a, b| if a.is_err() { a } else { b })
    })
}

/// Collect diagnostics from multiple workers into one ordered list. This
/// crate has no output layer of its own, so callers that want ordered
/// diagnostics across a whole tree pass one of these per job and drain it
/// afterward.
#[derive(Default)]
pub struct DiagnosticCollector {
    inner: std::sync::Mutex<Vec<Diagnostic>>,
}

impl DiagnosticCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sink(&self) -> impl FnMut(Diagnostic) + '_ {
        move |d: Diagnostic| self.inner.lock().unwrap().push(d)
    }

    pub fn into_inner(self) -> Vec<Diagnostic> {
        self.inner.into_inner().unwrap()
    }
}

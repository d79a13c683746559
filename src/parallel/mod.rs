use std::thread;

use crate::error::{PoolError, Result};
use crate::oligo::LongOligo;

/// Number of oligos a worker processes between calls to
/// [`ParallelProcessor::on_batch_complete`]
pub const BATCH_SIZE: usize = 1024;

/// Per-oligo work that [`process_parallel`] fans out over worker threads
pub trait ParallelProcessor: Send + Clone {
    /// Process a single oligo; `index` is its position in the input slice
    fn process_oligo(&mut self, index: usize, oligo: &LongOligo) -> Result<()>;

    /// Called after every [`BATCH_SIZE`] oligos and at the end of a share,
    /// e.g. to flush thread-local counters
    fn on_batch_complete(&mut self) -> Result<()> {
        Ok(())
    }

    /// Receives the index of the worker that owns this clone
    #[allow(unused_variables)]
    fn set_tid(&mut self, tid: usize) {}

    fn get_tid(&self) -> Option<usize> {
        None
    }
}

/// Resolves a requested thread count (`0`: one per core)
#[must_use]
pub fn resolve_threads(num_threads: usize) -> usize {
    if num_threads == 0 {
        num_cpus::get()
    } else {
        num_threads.min(num_cpus::get())
    }
}

/// Processes every oligo of `oligos` in parallel
pub fn process_parallel<P: ParallelProcessor>(
    oligos: &[LongOligo],
    processor: P,
    num_threads: usize,
) -> Result<()> {
    let indices: Vec<usize> = (0..oligos.len()).collect();
    process_parallel_subset(oligos, &indices, processor, num_threads)
}

/// Processes the oligos at `indices` in parallel
///
/// The indices are split into one contiguous share per thread; every thread
/// works on its own clone of `processor`.
pub fn process_parallel_subset<P: ParallelProcessor>(
    oligos: &[LongOligo],
    indices: &[usize],
    processor: P,
    num_threads: usize,
) -> Result<()> {
    if indices.is_empty() {
        return Ok(());
    }
    let num_threads = resolve_threads(num_threads);
    let per_thread = indices.len().div_ceil(num_threads);

    thread::scope(|scope| {
        let handles: Vec<_> = indices
            .chunks(per_thread)
            .enumerate()
            .map(|(tid, share)| {
                let mut processor = processor.clone();
                processor.set_tid(tid);
                scope.spawn(move || -> Result<()> {
                    for batch in share.chunks(BATCH_SIZE) {
                        for &index in batch {
                            processor.process_oligo(index, &oligos[index])?;
                        }
                        processor.on_batch_complete()?;
                    }
                    Ok(())
                })
            })
            .collect();
        handles
            .into_iter()
            .try_for_each(|handle| handle.join().map_err(|_| PoolError::WorkerPanicked)?)
    })
}

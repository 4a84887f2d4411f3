//! Bounded worker pool for chunk uploads.
//!
//! Chunks run on a dedicated rayon pool sized to the requested parallelism.
//! `run_chunks` returns only after every chunk has finished or given up,
//! which is the join barrier finalize depends on. The first failure cancels
//! a child token: chunks not yet started are skipped and any retry backoff
//! in flight wakes up and gives up.

use log::debug;
use rayon::prelude::*;

use crate::cancel::CancelToken;
use crate::error::{Error, Result};

#[derive(Debug)]
pub(crate) struct ChunkFailure {
    pub(crate) index: usize,
    pub(crate) error: Error,
}

/// Run `work` for every index in `0..count` on at most `parallelism`
/// threads. Results come back in index order.
pub(crate) fn run_chunks<R, F>(
    count: usize,
    parallelism: usize,
    cancel: &CancelToken,
    work: F,
) -> std::result::Result<Vec<R>, ChunkFailure>
where
    R: Send,
    F: Fn(usize, &CancelToken) -> Result<R> + Sync,
{
    let token = cancel.child();
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(parallelism.clamp(1, count.max(1)))
        .thread_name(|i| format!("chunk-{i}"))
        .build()
        .map_err(|e| ChunkFailure {
            index: 0,
            error: Error::Configuration(format!("failed to start upload workers: {e}")),
        })?;

    let results: Vec<Result<R>> = pool.install(|| {
        (0..count)
            .into_par_iter()
            .map(|index| {
                if token.is_cancelled() {
                    return Err(Error::Cancelled);
                }
                debug!("chunk {index} started");
                let result = work(index, &token);
                if result.is_err() {
                    token.cancel();
                }
                result
            })
            .collect()
    });

    let mut failure: Option<ChunkFailure> = None;
    let mut values = Vec::with_capacity(count);
    for (index, result) in results.into_iter().enumerate() {
        match result {
            Ok(value) => values.push(value),
            Err(error) => {
                // A sibling's cancellation is a consequence, not the cause.
                let replace = match &failure {
                    None => true,
                    Some(first) => {
                        matches!(first.error, Error::Cancelled)
                            && !matches!(error, Error::Cancelled)
                    }
                };
                if replace {
                    failure = Some(ChunkFailure { index, error });
                }
            }
        }
    }
    match failure {
        Some(failure) => Err(failure),
        None => Ok(values),
    }
}

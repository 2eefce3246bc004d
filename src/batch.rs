//! Splitting of oversized location lists into server-sized sub-batches, and
//! merging of the partial results back in request order.

use crate::error::{BioSimError, ClientError};
use crate::reply::result_map::{LocationResultMap, ModelOutcome, ModelResultMap};
use futures_util::{stream, StreamExt, TryStreamExt};
use indexmap::map::Entry;
use log::info;
use std::future::Future;
use std::slice::Chunks;

/// Hard cap on the number of locations of a single logical call.
pub const DEFAULT_MAX_LOCATIONS_PER_CALL: usize = 1000;

/// Rejects a request larger than `max` before anything is sent.
pub(crate) fn check_request_size(requested: usize, max: usize) -> Result<(), ClientError> {
    if requested > max {
        return Err(ClientError::TooManyLocations { max, requested });
    }
    Ok(())
}

/// Consecutive slices of at most `batch_size` items (locations, or handles
/// of generated climate), one per request.
pub(crate) fn partition<I>(items: &[I], batch_size: usize) -> Chunks<'_, I> {
    let batch_size = batch_size.max(1);
    let nb_batches = items.len().div_ceil(batch_size);
    if nb_batches > 1 {
        info!(
            "Splitting {} items into {} batches of at most {}",
            items.len(),
            nb_batches,
            batch_size
        );
    }
    items.chunks(batch_size)
}

/// Runs one call per batch with up to `concurrency` of them in flight.
///
/// Results come back in batch order whatever the completion order, and the
/// first failure aborts the whole dispatch.
pub(crate) async fn dispatch<T, Fut>(
    calls: Vec<Fut>,
    concurrency: usize,
) -> Result<Vec<T>, BioSimError>
where
    Fut: Future<Output = Result<T, BioSimError>>,
{
    stream::iter(calls)
        .buffered(concurrency.max(1))
        .try_collect()
        .await
}

/// Key union of per-batch maps. Batches never share a location.
pub(crate) fn merge_location_maps(parts: Vec<LocationResultMap>) -> LocationResultMap {
    let mut merged = LocationResultMap::new();
    for part in parts {
        merged.extend(part);
    }
    merged
}

/// Folds one batch's per-model outcomes into the accumulated ones.
///
/// Completed maps of the same model are joined. A failure sticks: once a
/// model failed on some batch it stays failed, and failure messages of
/// several batches are kept one per line.
pub(crate) fn merge_model_maps(accumulated: &mut ModelResultMap, incoming: ModelResultMap) {
    for (model, outcome) in incoming {
        match accumulated.entry(model) {
            Entry::Vacant(entry) => {
                entry.insert(outcome);
            }
            Entry::Occupied(mut entry) => {
                let there = entry.get_mut();
                match outcome {
                    ModelOutcome::Completed(more) => {
                        if let ModelOutcome::Completed(map) = there {
                            map.extend(more);
                        }
                    }
                    ModelOutcome::Failed(more) => match *there {
                        ModelOutcome::Failed(ref mut failure) => {
                            failure.message.push('\n');
                            failure.message.push_str(&more.message);
                        }
                        ModelOutcome::Completed(_) => *there = ModelOutcome::Failed(more),
                    },
                }
            }
        }
    }
}

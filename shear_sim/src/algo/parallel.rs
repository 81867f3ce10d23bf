//! Parallel processing utilities for image arrays
//!
//! Work is split into row chunks processed by rayon. Each chunk receives its
//! own RNG derived from a single base seed, so the output only depends on the
//! seed and never on thread scheduling.

use ndarray::{ArrayViewMut2, Axis};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;

/// Default number of rows handed to each worker
pub const DEFAULT_ROWS_PER_CHUNK: usize = 64;

/// Visit an image in parallel row chunks with a per-chunk deterministic RNG.
///
/// Chunk `i` is processed with `StdRng::seed_from_u64(seed + i)` (wrapping),
/// and receives the index of its first row so callers can address absolute
/// pixel positions.
///
/// # Arguments
/// * `image` - Image to modify in place
/// * `seed` - Base seed, usually drawn from the caller's simulation RNG
/// * `rows_per_chunk` - Rows per chunk; `None` uses [`DEFAULT_ROWS_PER_CHUNK`]
/// * `processor` - Closure receiving `(first_row, chunk, rng)`
pub fn for_each_row_chunk_seeded<F>(
    mut image: ArrayViewMut2<f64>,
    seed: u64,
    rows_per_chunk: Option<usize>,
    processor: F,
) where
    F: Fn(usize, &mut ArrayViewMut2<f64>, &mut StdRng) + Send + Sync,
{
    let rows = rows_per_chunk.unwrap_or(DEFAULT_ROWS_PER_CHUNK).max(1);

    image
        .axis_chunks_iter_mut(Axis(0), rows)
        .into_par_iter()
        .enumerate()
        .for_each(|(chunk_idx, mut chunk)| {
            let mut rng = StdRng::seed_from_u64(seed.wrapping_add(chunk_idx as u64));
            processor(chunk_idx * rows, &mut chunk, &mut rng);
        });
}

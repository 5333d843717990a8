//! Shared-memory scaffolding for parallel training passes.
//!
//! Training partitions the rows of a batch into contiguous blocks, one per
//! worker thread. How the workers share the weight accumulators is governed
//! by [`UpdateScheme`]:
//!
//! * [`UpdateScheme::Hogwild`] lets every worker update any coordinate with
//!   plain, unsynchronized reads and writes. Workers updating overlapping
//!   coordinates may lose or interleave partial updates; at realistic hash
//!   widths those collisions are statistically negligible, and accepting
//!   them buys a training pass with no locking whatsoever. Training under
//!   this scheme is *not* reproducible across differing thread counts.
//! * [`UpdateScheme::Sharded`] gives each worker exclusive ownership of a
//!   contiguous coordinate range. Every worker replays all rows but only
//!   updates its own shard, reading other shards from an epoch-start
//!   snapshot. Slower, but data-race-free and reproducible for a fixed
//!   thread count.

use std::ops::Range;

use crate::error::{FtrlError, Result};

#[cfg(feature = "serde")]
use serde_crate::{Deserialize, Serialize};

/// How worker threads share the weight accumulators during `fit`.
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpdateScheme {
    /// Lock-free in-place updates; concurrent writers to one coordinate may
    /// drop partial updates.
    Hogwild,
    /// Coordinate-range ownership with snapshot reads; reproducible for a
    /// fixed thread count.
    Sharded,
}

impl Default for UpdateScheme {
    fn default() -> Self {
        UpdateScheme::Hogwild
    }
}

/// A cell handing out aliasing mutable references to state borrowed for the
/// duration of one training pass.
///
/// Under the hogwild scheme the races this enables are the point: workers
/// deliberately update overlapping coordinates without synchronization and
/// the optimizer tolerates the occasional lost update. Under the sharded
/// scheme callers keep their writes inside disjoint coordinate ranges.
pub(crate) struct Hogwild<'a, T> {
    ptr: *mut T,
    _borrow: std::marker::PhantomData<&'a mut T>,
}

unsafe impl<'a, T: Send> Send for Hogwild<'a, T> {}
unsafe impl<'a, T: Send> Sync for Hogwild<'a, T> {}

impl<'a, T> Hogwild<'a, T> {
    pub fn new(state: &'a mut T) -> Self {
        Self {
            ptr: state,
            _borrow: std::marker::PhantomData,
        }
    }

    /// Obtain one of the aliasing mutable references.
    ///
    /// # Safety
    ///
    /// The caller must either tolerate racy plain accesses (hogwild) or
    /// guarantee that concurrent callers touch disjoint parts of the state
    /// (sharded).
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn get(&self) -> &mut T {
        &mut *self.ptr
    }
}

/// Split `n` items into `nblocks` contiguous ranges; the first remainder
/// blocks carry one extra item. Empty ranges are dropped.
pub(crate) fn contiguous_blocks(n: usize, nblocks: usize) -> Vec<Range<usize>> {
    let nblocks = nblocks.max(1);
    let base = n / nblocks;
    let remainder = n % nblocks;

    let mut blocks = Vec::with_capacity(nblocks);
    let mut start = 0;
    for b in 0..nblocks {
        let len = base + usize::from(b < remainder);
        if len == 0 {
            continue;
        }
        blocks.push(start..start + len);
        start += len;
    }
    blocks
}

/// Worker pool sized to the configured thread count.
pub(crate) fn build_pool(num_threads: usize) -> Result<rayon::ThreadPool> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(num_threads)
        .build()
        .map_err(|e| FtrlError::ThreadPool(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocks_cover_range_without_overlap() {
        let blocks = contiguous_blocks(10, 3);
        assert_eq!(blocks, vec![0..4, 4..7, 7..10]);

        let blocks = contiguous_blocks(4, 8);
        assert_eq!(blocks, vec![0..1, 1..2, 2..3, 3..4]);

        assert!(contiguous_blocks(0, 4).is_empty());
    }

    #[test]
    fn single_block_is_identity() {
        assert_eq!(contiguous_blocks(7, 1), vec![0..7]);
    }
}

//! Partitioned in-memory aggregate store
//!
//! Pipelines are spread over a fixed set of shards by hashing their id.
//! Writers lock exactly one shard; cross-pipeline readers lock every shard
//! (always in index order) before copying, which gives them a consistent
//! cut without a global write lock.

mod aggregate;

pub use aggregate::{running_mean, PipelineAggregate, PipelineHealth};

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

type Shard = HashMap<String, PipelineAggregate>;

/// Owner of every pipeline aggregate
pub struct AggregateStore {
    shards: Vec<RwLock<Shard>>,
    dedup_capacity: Option<usize>,
}

impl AggregateStore {
    /// Create a store with `shard_count` partitions (at least one)
    pub fn new(shard_count: usize, dedup_capacity: Option<usize>) -> Self {
        let shards = (0..shard_count.max(1))
            .map(|_| RwLock::new(HashMap::new()))
            .collect();
        Self {
            shards,
            dedup_capacity,
        }
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    pub fn dedup_capacity(&self) -> Option<usize> {
        self.dedup_capacity
    }

    /// Shard owning `pipeline_id`; stable for the lifetime of the store
    pub fn shard_for(&self, pipeline_id: &str) -> usize {
        let mut hasher = DefaultHasher::new();
        pipeline_id.hash(&mut hasher);
        (hasher.finish() % self.shards.len() as u64) as usize
    }

    fn read_shard(&self, index: usize) -> RwLockReadGuard<'_, Shard> {
        // Mutations complete before a guard drops, so a poisoned shard is
        // still consistent.
        self.shards[index]
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn write_shard(&self, index: usize) -> RwLockWriteGuard<'_, Shard> {
        self.shards[index]
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` with exclusive access to the shard owning `pipeline_id`.
    ///
    /// The whole read-modify-write of an apply happens inside `f`, so two
    /// updates to the same pipeline can never interleave.
    pub(crate) fn with_shard_mut<R>(&self, pipeline_id: &str, f: impl FnOnce(&mut Shard) -> R) -> R {
        let mut shard = self.write_shard(self.shard_for(pipeline_id));
        f(&mut shard)
    }

    /// Snapshot of a single pipeline (locks only its shard)
    pub fn get(&self, pipeline_id: &str) -> Option<PipelineHealth> {
        self.read_shard(self.shard_for(pipeline_id))
            .get(pipeline_id)
            .map(PipelineAggregate::health)
    }

    pub fn contains(&self, pipeline_id: &str) -> bool {
        self.read_shard(self.shard_for(pipeline_id))
            .contains_key(pipeline_id)
    }

    /// Consistent copy of every aggregate.
    ///
    /// All shard read locks are held together while copying, so no apply
    /// can land in part of the snapshot only.
    pub fn snapshot(&self) -> Vec<PipelineHealth> {
        let guards: Vec<_> = (0..self.shards.len()).map(|i| self.read_shard(i)).collect();
        guards
            .iter()
            .flat_map(|shard| shard.values().map(PipelineAggregate::health))
            .collect()
    }

    /// Number of pipelines with an aggregate
    pub fn len(&self) -> usize {
        (0..self.shards.len()).map(|i| self.read_shard(i).len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for AggregateStore {
    fn default() -> Self {
        Self::new(16, None)
    }
}

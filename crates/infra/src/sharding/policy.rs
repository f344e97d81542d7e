//! Sharding policies (C3).
//!
//! Grounded on `internal/sharding/strategy.go`: `Sharding{ShardingFunc,
//! EffectiveTablesFunc}` plus the `NewNoShard` convenience constructor for
//! deployments that don't shard at all.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use relaybox_domain::ShardTarget;
use relaybox_core::ports::ShardingPolicy;

/// No sharding: every key routes to the same target.
/// Equivalent to the original's `NewNoShard(table)`.
pub struct SingleShardPolicy {
    target: ShardTarget,
}

impl SingleShardPolicy {
    pub fn new(table: impl Into<String>) -> Self {
        Self { target: ShardTarget::single(table) }
    }
}

impl ShardingPolicy for SingleShardPolicy {
    fn route(&self, _key: &str) -> ShardTarget {
        self.target.clone()
    }

    fn active_targets(&self) -> Vec<ShardTarget> {
        vec![self.target.clone()]
    }
}

/// Routes a key to one of `shard_count` tables, all under the same `db`,
/// named `"{table_prefix}_{index}"`.
pub struct ModuloShardingPolicy {
    db: String,
    table_prefix: String,
    shard_count: u32,
}

impl ModuloShardingPolicy {
    pub fn new(db: impl Into<String>, table_prefix: impl Into<String>, shard_count: u32) -> Self {
        assert!(shard_count > 0, "shard_count must be positive");
        Self { db: db.into(), table_prefix: table_prefix.into(), shard_count }
    }

    fn target_for_index(&self, index: u32) -> ShardTarget {
        ShardTarget::new(self.db.clone(), format!("{}_{}", self.table_prefix, index))
    }
}

impl ShardingPolicy for ModuloShardingPolicy {
    fn route(&self, key: &str) -> ShardTarget {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        let index = (hasher.finish() % self.shard_count as u64) as u32;
        self.target_for_index(index)
    }

    fn active_targets(&self) -> Vec<ShardTarget> {
        (0..self.shard_count).map(|i| self.target_for_index(i)).collect()
    }
}

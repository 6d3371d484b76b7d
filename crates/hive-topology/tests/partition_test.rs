use hive_core::models::{AgentId, PartitionStrategy, ShardId};
use hive_topology::PartitionPlanner;

fn shards(n: usize) -> Vec<ShardId> {
    (0..n).map(|i| ShardId(format!("shard-{i:04}"))).collect()
}

fn agents(names: &[&str]) -> Vec<AgentId> {
    names.iter().map(|n| AgentId::from(*n)).collect()
}

#[test]
fn every_strategy_assigns_every_shard() {
    let shards = shards(32);
    let agents = agents(&["a", "b", "c"]);
    for strategy in [
        PartitionStrategy::Hash,
        PartitionStrategy::Range,
        PartitionStrategy::ConsistentHash,
    ] {
        let plan = PartitionPlanner::new(strategy, 16).assign(&shards, &agents);
        assert_eq!(plan.len(), 32, "{strategy:?}");
        assert!(plan.values().all(|owner| agents.contains(owner)));
    }
}

#[test]
fn placement_ignores_agent_order() {
    let shards = shards(16);
    let planner = PartitionPlanner::new(PartitionStrategy::ConsistentHash, 8);
    let forward = planner.assign(&shards, &agents(&["a", "b", "c"]));
    let reversed = planner.assign(&shards, &agents(&["c", "b", "a"]));
    assert_eq!(forward, reversed);
}

#[test]
fn range_assigns_contiguous_blocks() {
    let plan = PartitionPlanner::new(PartitionStrategy::Range, 1).assign(&shards(6), &agents(&["a", "b"]));
    let owners: Vec<&str> = plan.values().map(|a| a.as_str()).collect();
    assert_eq!(owners, ["a", "a", "a", "b", "b", "b"]);
}

#[test]
fn consistent_hash_only_moves_the_leavers_shards() {
    let shards = shards(64);
    let planner = PartitionPlanner::new(PartitionStrategy::ConsistentHash, 32);
    let before = planner.assign(&shards, &agents(&["a", "b", "c", "d"]));
    let after = planner.assign(&shards, &agents(&["a", "b", "d"]));

    for (shard, owner) in &before {
        if owner.as_str() != "c" {
            assert_eq!(after[shard], *owner, "{shard} moved");
        }
    }
}

#[test]
fn no_agents_means_no_plan() {
    let plan = PartitionPlanner::new(PartitionStrategy::Hash, 4).assign(&shards(4), &[]);
    assert!(plan.is_empty());
}

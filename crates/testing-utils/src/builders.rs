use fleetbench_core::{Target, TargetRole};

/// `count` 个地址为 `10.0.<role>.<n>` 的目标，`n` 从1开始
pub fn targets(role: TargetRole, count: usize) -> Vec<Target> {
    let subnet = match role {
        TargetRole::ClusterNode => 0,
        TargetRole::LoadGenerator => 1,
    };
    (1..=count)
        .map(|n| Target::new(format!("10.0.{subnet}.{n}"), role))
        .collect()
}

pub fn cluster_nodes(count: usize) -> Vec<Target> {
    targets(TargetRole::ClusterNode, count)
}

pub fn load_generators(count: usize) -> Vec<Target> {
    targets(TargetRole::LoadGenerator, count)
}

/// 地址列表，便于断言
pub fn addresses(targets: &[Target]) -> Vec<String> {
    targets.iter().map(|t| t.address().to_string()).collect()
}

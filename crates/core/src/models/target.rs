use std::fmt;

use serde::{Deserialize, Serialize};

/// 目标机器的角色
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum TargetRole {
    /// 数据库集群节点
    #[serde(rename = "CLUSTER_NODE")]
    ClusterNode,
    /// 压测客户端（负载生成器）
    #[serde(rename = "LOAD_GENERATOR")]
    LoadGenerator,
}

impl fmt::Display for TargetRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetRole::ClusterNode => write!(f, "cluster-node"),
            TargetRole::LoadGenerator => write!(f, "load-generator"),
        }
    }
}

/// 远程目标机器
///
/// 一次运行开始后不可变，只通过克隆在各个工作单元之间传递。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Target {
    address: String,
    role: TargetRole,
}

impl Target {
    pub fn new(address: impl Into<String>, role: TargetRole) -> Self {
        Self {
            address: address.into(),
            role,
        }
    }

    pub fn cluster_node(address: impl Into<String>) -> Self {
        Self::new(address, TargetRole::ClusterNode)
    }

    pub fn load_generator(address: impl Into<String>) -> Self {
        Self::new(address, TargetRole::LoadGenerator)
    }

    /// 主机地址（IP或主机名）
    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn role(&self) -> TargetRole {
        self.role
    }

    /// 由地址列表批量创建同一角色的目标
    pub fn many<I, S>(addresses: I, role: TargetRole) -> Vec<Target>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        addresses
            .into_iter()
            .map(|address| Target::new(address, role))
            .collect()
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_display_is_address() {
        let target = Target::cluster_node("10.0.0.1");
        assert_eq!(target.to_string(), "10.0.0.1");
        assert_eq!(target.role(), TargetRole::ClusterNode);
    }

    #[test]
    fn test_many_keeps_order() {
        let targets = Target::many(["a", "b", "c"], TargetRole::LoadGenerator);
        let addresses: Vec<&str> = targets.iter().map(Target::address).collect();
        assert_eq!(addresses, vec!["a", "b", "c"]);
        assert!(targets.iter().all(|t| t.role() == TargetRole::LoadGenerator));
    }
}

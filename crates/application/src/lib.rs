//! 集群与压测客户端的编排服务
//!
//! 服务层只负责组合：用分片规划计算每个目标的参数，用并行执行器下发命令，
//! 在服务状态变化前后用就绪轮询器做门控。

pub mod remote;
pub mod services;

pub use remote::run_commands;
pub use services::*;

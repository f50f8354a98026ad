//! 远程会话接口定义
//!
//! 编排核心只依赖这里的抽象：在一台目标机器上执行命令、上传和下载文件。
//! 命令的输出不会被解析，成功或失败是唯一被消费的信号。
//!
//! ## 实现
//!
//! - `fleetbench_worker::SshSession` - 基于系统 `ssh`/`scp` 的生产实现
//! - `fleetbench_testing_utils::MockSessionFactory` - 记录请求的测试替身

use std::path::Path;

use async_trait::async_trait;

use crate::{
    models::{RemoteCommand, Target},
    OrchestratorResult,
};

/// 与单个目标机器的会话
///
/// 每个工作单元持有自己的会话实例，工作单元之间不共享可变状态。
#[async_trait]
pub trait RemoteSession: Send + Sync {
    /// 会话连接的目标
    fn target(&self) -> &Target;

    /// 执行远程命令，远程退出码非0时返回 `OrchestratorError::RemoteCommand`
    async fn execute(&self, command: &RemoteCommand) -> OrchestratorResult<()>;

    /// 上传本地文件到远程路径，`remote_path` 为空表示远程用户的家目录
    async fn transfer_to(&self, local_path: &Path, remote_path: &str) -> OrchestratorResult<()>;

    /// 下载匹配 `remote_glob` 的远程文件到本地目录
    async fn transfer_from(&self, remote_glob: &str, local_dir: &Path) -> OrchestratorResult<()>;
}

/// 会话工厂
#[async_trait]
pub trait SessionFactory: Send + Sync {
    /// 为目标创建新的会话
    async fn connect(&self, target: &Target) -> OrchestratorResult<Box<dyn RemoteSession>>;
}

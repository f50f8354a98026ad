use std::sync::Arc;
use std::time::Duration;

use fleetbench_core::{
    config::ClusterConfig, OrchestratorError, OrchestratorResult, RemoteCommand, RunContext,
    ServiceAction, SessionFactory, Target, TargetRole,
};
use fleetbench_dispatcher::{FanOutExecutor, ReadinessPoller};
use tokio::time::sleep;
use tracing::{info, instrument};

use crate::remote::run_commands;

/// 数据库集群编排服务
///
/// 节点假定由官方镜像启动：首次开机时每个节点都会自行完成初始化并作为单节点集群启动，
/// [`ClusterService::install`] 等待这次启动完成后再停止服务并重写配置。
#[derive(Clone)]
pub struct ClusterService {
    nodes: Vec<Target>,
    config: ClusterConfig,
    poller: ReadinessPoller,
    factory: Arc<dyn SessionFactory>,
    executor: FanOutExecutor,
    ctx: RunContext,
}

impl ClusterService {
    /// 创建新的集群服务
    pub fn new(
        config: ClusterConfig,
        poller: ReadinessPoller,
        factory: Arc<dyn SessionFactory>,
        ctx: &RunContext,
    ) -> Self {
        let ctx = ctx.component("cluster");
        Self {
            nodes: Target::many(config.public_ips.iter(), TargetRole::ClusterNode),
            config,
            poller,
            factory,
            executor: FanOutExecutor::new(&ctx),
            ctx,
        }
    }

    pub fn nodes(&self) -> &[Target] {
        &self.nodes
    }

    fn node_at(&self, index: usize) -> OrchestratorResult<&Target> {
        self.nodes.get(index).ok_or_else(|| {
            OrchestratorError::InvalidArgument(format!(
                "node index {index} out of range ({} nodes)",
                self.nodes.len()
            ))
        })
    }

    fn service(&self, action: ServiceAction) -> RemoteCommand {
        RemoteCommand::service(action, &self.config.service_name)
    }

    fn wipe_commands(&self) -> Vec<RemoteCommand> {
        self.config
            .data_dirs
            .iter()
            .map(RemoteCommand::clear_directory)
            .collect()
    }

    fn yaml_property(&self, key: &str, value: &str) -> RemoteCommand {
        RemoteCommand::SetYamlProperty {
            path: self.config.config_path.clone(),
            key: key.to_string(),
            value: value.to_string(),
        }
    }

    /// 安装前重写每个节点的配置
    fn install_commands(&self, seed: &str) -> Vec<RemoteCommand> {
        let mut commands = vec![self.service(ServiceAction::Stop)];
        commands.extend(self.wipe_commands());
        commands.push(RemoteCommand::SetSeeds {
            path: self.config.config_path.clone(),
            seeds: seed.to_string(),
        });
        if self.config.password_authenticator {
            commands.push(self.yaml_property("authenticator", "PasswordAuthenticator"));
        }
        commands.push(self.yaml_property("cluster_name", &self.config.cluster_name));
        commands.push(self.yaml_property("compaction_static_shares", "100"));
        commands.push(self.yaml_property("compaction_enforce_min_threshold", "true"));
        commands
    }

    /// 等待镜像自带的首次启动完成，然后停止服务、清空数据并写入集群配置
    #[instrument(skip(self), fields(run_id = %self.ctx.run_id()))]
    pub async fn install(&self) -> OrchestratorResult<()> {
        let seed = self.config.seed().ok_or_else(|| {
            OrchestratorError::Configuration(
                "cluster.seed_private_ip or cluster.private_ips is required".to_string(),
            )
        })?;
        let commands = self.install_commands(seed);

        info!(important = true, "安装数据库: 开始");
        let factory = self.factory.clone();
        let poller = self.poller.clone();
        self.executor
            .run_on("install", &self.nodes, |target| {
                let factory = factory.clone();
                let poller = poller.clone();
                let commands = commands.clone();
                async move {
                    poller.await_ready(&target).await?;
                    run_commands(factory, target, commands).await
                }
            })
            .await?;
        info!(important = true, "安装数据库: 完成");
        Ok(())
    }

    /// 在每个节点的配置文件末尾追加一行
    #[instrument(skip(self), fields(run_id = %self.ctx.run_id()))]
    pub async fn append_configuration(&self, line: &str) -> OrchestratorResult<()> {
        info!(nodes = ?self.addresses(), "追加配置: {line}");
        let command = RemoteCommand::AppendLine {
            path: self.config.config_path.clone(),
            line: line.to_string(),
        };
        self.run_step("append_configuration", &self.nodes, vec![command])
            .await
    }

    /// 启动所有节点，并等待它们完成引导
    #[instrument(skip(self), fields(run_id = %self.ctx.run_id()))]
    pub async fn start(&self) -> OrchestratorResult<()> {
        info!(nodes = ?self.addresses(), "启动数据库节点");
        self.run_step("start", &self.nodes, vec![self.service(ServiceAction::Start)])
            .await?;
        self.poller.await_ready(&self.nodes).await?;
        for node in &self.nodes {
            info!(target = %node, "节点完成引导");
        }
        info!(nodes = ?self.addresses(), "启动数据库节点: 完成");
        Ok(())
    }

    /// 执行nodetool命令；未指定 `index` 时在所有节点上并行执行
    #[instrument(skip(self), fields(run_id = %self.ctx.run_id()))]
    pub async fn nodetool(&self, command: &str, index: Option<usize>) -> OrchestratorResult<()> {
        let command = RemoteCommand::nodetool(command);
        match index {
            Some(index) => {
                let node = self.node_at(index)?.clone();
                run_commands(self.factory.clone(), node, vec![command]).await
            }
            None => self.run_step("nodetool", &self.nodes, vec![command]).await,
        }
    }

    /// 排空并停止节点，可选清空数据；未指定 `index` 时作用于所有节点
    #[instrument(skip(self), fields(run_id = %self.ctx.run_id()))]
    pub async fn stop(&self, index: Option<usize>, erase_data: bool) -> OrchestratorResult<()> {
        let mut commands = vec![
            RemoteCommand::nodetool("drain"),
            self.service(ServiceAction::Stop),
        ];
        if erase_data {
            commands.extend(self.wipe_commands());
        }

        match index {
            Some(index) => {
                let node = self.node_at(index)?.clone();
                info!(target = %node, erase_data, "停止节点");
                run_commands(self.factory.clone(), node, commands).await
            }
            None => self.run_step("stop", &self.nodes, commands).await,
        }
    }

    /// 停止集群、删除所有数据后重新启动，然后等待 `wait`
    #[instrument(skip(self), fields(run_id = %self.ctx.run_id()))]
    pub async fn clear(&self, wait: Duration) -> OrchestratorResult<()> {
        info!(important = true, "关闭集群并删除所有数据");
        info!("停止服务");
        self.run_step("stop", &self.nodes, vec![self.service(ServiceAction::Stop)])
            .await?;
        info!("删除数据目录");
        self.run_step("remove_data", &self.nodes, self.wipe_commands())
            .await?;
        info!("启动服务");
        self.run_step("start", &self.nodes, vec![self.service(ServiceAction::Start)])
            .await?;
        settle(wait).await;
        info!(important = true, "集群已清空并重新启动");
        Ok(())
    }

    /// 排空后重启集群，然后等待 `wait`
    #[instrument(skip(self), fields(run_id = %self.ctx.run_id()))]
    pub async fn restart(&self, wait: Duration) -> OrchestratorResult<()> {
        info!(important = true, "重启集群");
        self.run_step("drain", &self.nodes, vec![RemoteCommand::nodetool("drain")])
            .await?;
        self.run_step(
            "restart",
            &self.nodes,
            vec![self.service(ServiceAction::Restart)],
        )
        .await?;
        settle(wait).await;
        info!(important = true, "集群已重启");
        Ok(())
    }

    /// 删除指定节点上的数据
    #[instrument(skip(self), fields(run_id = %self.ctx.run_id()))]
    pub async fn remove_data(&self, public_ips: &[String]) -> OrchestratorResult<()> {
        let nodes = Target::many(public_ips.iter(), TargetRole::ClusterNode);
        info!(important = true, "删除节点数据 {public_ips:?}");
        self.run_step("remove_data", &nodes, self.wipe_commands())
            .await?;
        info!(important = true, "删除节点数据 {public_ips:?}: 完成");
        Ok(())
    }

    /// 刷盘后停止指定节点
    #[instrument(skip(self), fields(run_id = %self.ctx.run_id()))]
    pub async fn stop_nodes(&self, public_ips: &[String]) -> OrchestratorResult<()> {
        let nodes = Target::many(public_ips.iter(), TargetRole::ClusterNode);
        info!(important = true, "停止节点 {public_ips:?}");
        self.run_step("flush", &nodes, vec![RemoteCommand::nodetool("flush")])
            .await?;
        self.run_step("stop", &nodes, vec![self.service(ServiceAction::Stop)])
            .await?;
        info!(important = true, "停止节点 {public_ips:?}: 完成");
        Ok(())
    }

    /// 启动指定节点
    #[instrument(skip(self), fields(run_id = %self.ctx.run_id()))]
    pub async fn start_nodes(&self, public_ips: &[String]) -> OrchestratorResult<()> {
        let nodes = Target::many(public_ips.iter(), TargetRole::ClusterNode);
        info!(important = true, "启动节点 {public_ips:?}");
        self.run_step("start", &nodes, vec![self.service(ServiceAction::Start)])
            .await?;
        info!(important = true, "启动节点 {public_ips:?}: 完成");
        Ok(())
    }

    /// 在一组节点上并行执行同一批命令，所有节点都完成后才进入下一步
    async fn run_step(
        &self,
        operation: &str,
        nodes: &[Target],
        commands: Vec<RemoteCommand>,
    ) -> OrchestratorResult<()> {
        let factory = self.factory.clone();
        self.executor
            .run_on(operation, nodes, |target| {
                run_commands(factory.clone(), target, commands.clone())
            })
            .await?;
        Ok(())
    }

    fn addresses(&self) -> Vec<&str> {
        self.nodes.iter().map(Target::address).collect()
    }
}

async fn settle(wait: Duration) {
    if wait.is_zero() {
        return;
    }
    info!(wait_seconds = wait.as_secs(), "等待 {} 秒", wait.as_secs());
    sleep(wait).await;
}

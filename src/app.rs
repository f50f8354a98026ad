use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use fleetbench_application::{ClusterService, CqlService, ResultInventory, StressService};
use fleetbench_core::{
    AppConfig, OrchestratorError, OrchestratorResult, RunContext, SessionFactory, Target,
    TrimPeriods,
};
use fleetbench_dispatcher::ReadinessPoller;
use fleetbench_worker::SshSessionFactory;
use tracing::info;

use crate::shutdown::ShutdownManager;

/// 集群相关操作
#[derive(Debug, Clone, PartialEq)]
pub enum ClusterAction {
    Install,
    Start,
    Stop {
        index: Option<usize>,
        erase_data: bool,
    },
    Restart {
        wait: Duration,
    },
    Clear {
        wait: Duration,
    },
    Nodetool {
        command: String,
        index: Option<usize>,
    },
}

/// 压测客户端相关操作
#[derive(Debug, Clone, PartialEq)]
pub enum StressAction {
    Prepare {
        kill_java: bool,
    },
    Install,
    Run {
        command: String,
        load_index: Option<usize>,
        repeat: bool,
    },
    Parallel {
        command_fmt: String,
        partitions: u64,
        sequence_start: Option<i64>,
    },
    Collect {
        dir: PathBuf,
        trim: TrimPeriods,
    },
}

/// 命令行解析出的一次操作
#[derive(Debug, Clone, PartialEq)]
pub enum AppCommand {
    /// 等待所有集群节点的端口可用
    WaitReady,
    Cluster(ClusterAction),
    Stress(StressAction),
    /// 在指定集群节点上执行CQL语句
    Cql {
        statement: String,
        index: usize,
        username: Option<String>,
        password: Option<String>,
    },
    /// 在所有压测客户端上执行shell命令
    Ssh {
        command: String,
    },
}

impl AppCommand {
    /// 用于日志和运行上下文的操作名
    pub fn name(&self) -> &'static str {
        match self {
            AppCommand::WaitReady => "wait-ready",
            AppCommand::Cluster(ClusterAction::Install) => "cluster install",
            AppCommand::Cluster(ClusterAction::Start) => "cluster start",
            AppCommand::Cluster(ClusterAction::Stop { .. }) => "cluster stop",
            AppCommand::Cluster(ClusterAction::Restart { .. }) => "cluster restart",
            AppCommand::Cluster(ClusterAction::Clear { .. }) => "cluster clear",
            AppCommand::Cluster(ClusterAction::Nodetool { .. }) => "cluster nodetool",
            AppCommand::Stress(StressAction::Prepare { .. }) => "stress prepare",
            AppCommand::Stress(StressAction::Install) => "stress install",
            AppCommand::Stress(StressAction::Run { .. }) => "stress run",
            AppCommand::Stress(StressAction::Parallel { .. }) => "stress parallel",
            AppCommand::Stress(StressAction::Collect { .. }) => "stress collect",
            AppCommand::Cql { .. } => "cql",
            AppCommand::Ssh { .. } => "ssh",
        }
    }
}

/// 主应用程序
///
/// 持有配置和共享组件，按需创建各个编排服务。
pub struct Application {
    config: AppConfig,
    factory: Arc<dyn SessionFactory>,
    poller: ReadinessPoller,
    ctx: RunContext,
}

impl Application {
    /// 使用系统ssh和TCP就绪探测创建应用
    pub fn new(config: AppConfig, operation: &str) -> Self {
        let ctx = RunContext::new(operation);
        let factory: Arc<dyn SessionFactory> = Arc::new(SshSessionFactory::new(config.ssh.clone()));
        let poller = ReadinessPoller::tcp(config.readiness.clone(), &ctx);
        Self::with_components(config, factory, poller, ctx)
    }

    /// 使用给定的会话工厂和轮询器创建应用
    pub fn with_components(
        config: AppConfig,
        factory: Arc<dyn SessionFactory>,
        poller: ReadinessPoller,
        ctx: RunContext,
    ) -> Self {
        info!(run_id = %ctx.run_id(), "初始化应用程序");
        Self {
            config,
            factory,
            poller,
            ctx,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn context(&self) -> &RunContext {
        &self.ctx
    }

    pub fn cluster_service(&self) -> ClusterService {
        ClusterService::new(
            self.config.cluster.clone(),
            self.poller.clone(),
            self.factory.clone(),
            &self.ctx,
        )
    }

    pub fn stress_service(&self) -> OrchestratorResult<StressService> {
        StressService::new(
            self.config.load_generator.clone(),
            self.config.stress.clone(),
            self.factory.clone(),
            &self.ctx,
        )
    }

    /// 为第 `index` 个集群节点创建CQL服务
    pub fn cql_service(&self, index: usize) -> OrchestratorResult<CqlService> {
        let address = self.config.cluster.public_ips.get(index).ok_or_else(|| {
            OrchestratorError::InvalidArgument(format!(
                "node index {index} out of range ({} nodes)",
                self.config.cluster.public_ips.len()
            ))
        })?;
        Ok(CqlService::new(
            Target::cluster_node(address.clone()),
            self.poller.clone(),
            self.factory.clone(),
            &self.ctx,
        ))
    }

    /// 执行一次操作
    ///
    /// 循环压测会一直运行到 `shutdown` 触发，其余操作完成即返回。
    pub async fn run(&self, command: AppCommand, shutdown: ShutdownManager) -> Result<()> {
        let name = command.name();
        info!(important = true, run_id = %self.ctx.run_id(), "执行操作: {name}");

        match command {
            AppCommand::WaitReady => {
                let nodes = self.cluster_service().nodes().to_vec();
                self.poller.await_ready(nodes).await?;
            }
            AppCommand::Cluster(action) => self.run_cluster(action).await?,
            AppCommand::Stress(action) => self.run_stress(action, shutdown).await?,
            AppCommand::Cql {
                statement,
                index,
                username,
                password,
            } => {
                let mut service = self.cql_service(index)?;
                if let (Some(username), Some(password)) = (username, password) {
                    service = service.with_credentials(username, password);
                }
                service.exec(&statement).await?;
            }
            AppCommand::Ssh { command } => {
                self.stress_service()?.ssh(&command).await?;
            }
        }

        info!(
            important = true,
            elapsed_seconds = self.ctx.elapsed_seconds(),
            "操作完成: {name}"
        );
        Ok(())
    }

    async fn run_cluster(&self, action: ClusterAction) -> OrchestratorResult<()> {
        let cluster = self.cluster_service();
        match action {
            ClusterAction::Install => cluster.install().await,
            ClusterAction::Start => cluster.start().await,
            ClusterAction::Stop { index, erase_data } => cluster.stop(index, erase_data).await,
            ClusterAction::Restart { wait } => cluster.restart(wait).await,
            ClusterAction::Clear { wait } => cluster.clear(wait).await,
            ClusterAction::Nodetool { command, index } => cluster.nodetool(&command, index).await,
        }
    }

    async fn run_stress(&self, action: StressAction, shutdown: ShutdownManager) -> Result<()> {
        let stress = self.stress_service()?;
        match action {
            StressAction::Prepare { kill_java } => stress.prepare(kill_java).await?,
            StressAction::Install => stress.install().await?,
            StressAction::Run {
                command,
                load_index,
                repeat: false,
            } => stress.stress(&command, load_index).await?,
            StressAction::Run {
                command,
                load_index,
                repeat: true,
            } => {
                let handle = stress.loop_stress(command, load_index);
                info!(important = true, "循环压测已启动，按Ctrl+C停止");
                shutdown.stop_on_shutdown(&handle).await?;
                info!(important = true, iterations = handle.iterations(), "循环压测已停止");
            }
            StressAction::Parallel {
                command_fmt,
                partitions,
                sequence_start,
            } => {
                stress
                    .parallel_stress(&command_fmt, partitions, sequence_start)
                    .await?
            }
            StressAction::Collect { dir, trim } => {
                tokio::fs::create_dir_all(&dir)
                    .await
                    .with_context(|| format!("创建结果目录失败: {}", dir.display()))?;
                stress
                    .collect_results(&dir, trim, &ResultInventory::new())
                    .await?;
            }
        }
        Ok(())
    }
}

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use fleetbench_core::{
    config::{LoadGeneratorConfig, StressConfig},
    KeyRange, OrchestratorError, OrchestratorResult, RemoteCommand, ResultProcessor, RunContext,
    SessionFactory, StressTool, Target, TargetFailure, TargetRole, TrimPeriods, WorkItem,
};
use fleetbench_dispatcher::{
    plan, population_ranges, split_count, AsyncTask, FanOutExecutor, RepeatingHandle,
    RepeatingTask, TaskHandle,
};
use tokio::time::sleep;
use tracing::{info, instrument};

use crate::remote::run_commands;

/// 压测结果文件
const RESULT_GLOB: &str = "*.{html,hdr,log}";
const RESULT_CLEANUP: &str = "rm -fr *.html *.hdr *.log";

/// 数据写入参数
#[derive(Debug, Clone)]
pub struct InsertOptions {
    /// 压测工具的profile文件
    pub profile: String,
    pub partitions: u64,
    /// `-node` 参数，逗号分隔的集群节点
    pub nodes: String,
    /// 总操作数，默认等于分区数
    pub ops: Option<u64>,
    pub mode: String,
    pub rate: String,
    pub sequence_start: Option<i64>,
}

impl InsertOptions {
    pub fn new(profile: impl Into<String>, partitions: u64, nodes: impl Into<String>) -> Self {
        Self {
            profile: profile.into(),
            partitions,
            nodes: nodes.into(),
            ops: None,
            mode: "native cql3".to_string(),
            rate: "threads=100".to_string(),
            sequence_start: None,
        }
    }

    pub fn with_ops(mut self, ops: u64) -> Self {
        self.ops = Some(ops);
        self
    }

    pub fn with_mode(mut self, mode: impl Into<String>) -> Self {
        self.mode = mode.into();
        self
    }

    pub fn with_rate(mut self, rate: impl Into<String>) -> Self {
        self.rate = rate.into();
        self
    }

    pub fn with_sequence_start(mut self, start: i64) -> Self {
        self.sequence_start = Some(start);
        self
    }

    fn command(&self, ops: u64, range: &KeyRange) -> String {
        format!(
            "user profile={} \"ops(insert=1)\" n={} no-warmup -pop seq={}..{} -mode {} -rate {} -node {}",
            self.profile, ops, range.start, range.end, self.mode, self.rate, self.nodes
        )
    }
}

/// 压测客户端编排服务
#[derive(Clone)]
pub struct StressService {
    targets: Vec<Target>,
    config: LoadGeneratorConfig,
    stress: StressConfig,
    tool: StressTool,
    factory: Arc<dyn SessionFactory>,
    executor: FanOutExecutor,
    ctx: RunContext,
}

impl StressService {
    /// 创建新的压测服务
    pub fn new(
        config: LoadGeneratorConfig,
        stress: StressConfig,
        factory: Arc<dyn SessionFactory>,
        ctx: &RunContext,
    ) -> OrchestratorResult<Self> {
        let tool = if config.scylla_tools {
            StressTool::ScyllaTools
        } else {
            let version = config.cassandra_version.clone().ok_or_else(|| {
                OrchestratorError::Configuration(
                    "cassandra_version is required when scylla_tools is false".to_string(),
                )
            })?;
            StressTool::Cassandra { version }
        };

        let ctx = ctx.component("stress");
        Ok(Self {
            targets: Target::many(config.public_ips.iter(), TargetRole::LoadGenerator),
            config,
            stress,
            tool,
            factory,
            executor: FanOutExecutor::new(&ctx),
            ctx,
        })
    }

    pub fn targets(&self) -> &[Target] {
        &self.targets
    }

    pub fn tool(&self) -> &StressTool {
        &self.tool
    }

    fn target_at(&self, index: usize) -> OrchestratorResult<&Target> {
        self.targets.get(index).ok_or_else(|| {
            OrchestratorError::InvalidArgument(format!(
                "load_index {index} out of range ({} load generators)",
                self.targets.len()
            ))
        })
    }

    /// 清理上一次残留的压测进程
    #[instrument(skip(self), fields(run_id = %self.ctx.run_id()))]
    pub async fn prepare(&self, kill_java: bool) -> OrchestratorResult<()> {
        info!(important = true, "准备压测客户端: 开始");
        let factory = self.factory.clone();
        self.executor
            .run_on("prepare", &self.targets, |target| {
                let factory = factory.clone();
                async move {
                    info!(target = %target, "准备: 开始");
                    let mut commands = Vec::new();
                    if kill_java {
                        commands.push(RemoteCommand::KillAll {
                            process: "java".to_string(),
                        });
                    }
                    run_commands(factory, target.clone(), commands).await?;
                    info!(target = %target, "准备: 完成");
                    Ok(())
                }
            })
            .await?;
        info!(important = true, "准备压测客户端: 完成");
        Ok(())
    }

    /// 在所有压测客户端上安装压测工具
    #[instrument(skip(self), fields(run_id = %self.ctx.run_id()))]
    pub async fn install(&self) -> OrchestratorResult<()> {
        info!(important = true, "安装压测工具: 开始");
        let mut commands = vec![RemoteCommand::UpdatePackages];
        if self.config.performance_governor {
            commands.push(RemoteCommand::SetGovernor {
                governor: "performance".to_string(),
            });
        }
        if let StressTool::Cassandra { .. } = self.tool {
            commands.push(RemoteCommand::InstallPackages {
                apt: vec!["openjdk-8-jdk".to_string()],
                yum: vec!["java-1.8.0-openjdk".to_string()],
            });
            commands.push(RemoteCommand::InstallPackages {
                apt: vec!["wget".to_string()],
                yum: vec!["wget".to_string()],
            });
        }
        commands.push(RemoteCommand::InstallStressTool {
            tool: self.tool.clone(),
        });

        let flavor = match self.tool {
            StressTool::ScyllaTools => "Scylla",
            StressTool::Cassandra { .. } => "Cassandra",
        };
        let factory = self.factory.clone();
        self.executor
            .run_on("install", &self.targets, |target| {
                let factory = factory.clone();
                let commands = commands.clone();
                async move {
                    info!(target = %target, "安装压测工具 ({flavor}): 开始");
                    run_commands(factory, target.clone(), commands).await?;
                    info!(target = %target, "安装压测工具: 完成");
                    Ok(())
                }
            })
            .await?;
        info!(important = true, "安装压测工具: 完成");
        Ok(())
    }

    /// 运行压测
    ///
    /// 未指定 `load_index` 时在所有压测客户端上并行执行，第一个客户端立即开始，
    /// 其余客户端延迟 `startup_stagger_seconds` 启动，避免同时冲击集群。
    #[instrument(skip(self), fields(run_id = %self.ctx.run_id()))]
    pub async fn stress(&self, command: &str, load_index: Option<usize>) -> OrchestratorResult<()> {
        match load_index {
            Some(index) => {
                let target = self.target_at(index)?.clone();
                run_stress(
                    self.factory.clone(),
                    self.tool.clone(),
                    target,
                    Duration::ZERO,
                    command.to_string(),
                )
                .await
            }
            None => {
                info!(important = true, "压测: 开始");
                let commands = vec![command.to_string(); self.targets.len()];
                self.staggered_stress("stress", commands).await?;
                info!(important = true, "压测: 完成");
                Ok(())
            }
        }
    }

    /// 在后台运行压测，返回可等待的句柄
    pub fn async_stress(
        &self,
        command: impl Into<String>,
        load_index: Option<usize>,
    ) -> TaskHandle<()> {
        let service = self.clone();
        AsyncTask::spawn(
            "async_stress",
            move |(command, load_index): (String, Option<usize>)| async move {
                service.stress(&command, load_index).await
            },
            (command.into(), load_index),
        )
    }

    /// 在后台反复运行压测，直到句柄被取消
    pub fn loop_stress(&self, command: impl Into<String>, load_index: Option<usize>) -> RepeatingHandle {
        let service = self.clone();
        RepeatingTask::spawn(
            "loop_stress",
            move |(command, load_index): (String, Option<usize>)| {
                let service = service.clone();
                async move { service.stress(&command, load_index).await }
            },
            (command.into(), load_index),
        )
    }

    /// 按分区切分后在所有压测客户端上并行压测
    ///
    /// `command_fmt` 中的 `{start}` 和 `{end}` 被替换为每个客户端分到的键区间。
    #[instrument(skip(self), fields(run_id = %self.ctx.run_id()))]
    pub async fn parallel_stress(
        &self,
        command_fmt: &str,
        partitions: u64,
        sequence_start: Option<i64>,
    ) -> OrchestratorResult<()> {
        info!(
            important = true,
            "在 {} 个压测客户端上按 {partitions} 个分区运行压测",
            self.targets.len()
        );

        let ranges = plan(partitions, self.targets.len(), sequence_start.unwrap_or(1))?;
        let commands: Vec<String> = ranges
            .iter()
            .map(|range| {
                command_fmt
                    .replace("{start}", &range.start.to_string())
                    .replace("{end}", &range.end.to_string())
            })
            .collect();

        let elapsed = self.launch_partitioned(commands).await?;
        info!(duration_seconds = elapsed.as_secs_f64(), "耗时: {:.1} 秒", elapsed.as_secs_f64());
        info!(
            important = true,
            "在 {} 个压测客户端上按 {partitions} 个分区运行压测: 完成",
            self.targets.len()
        );
        Ok(())
    }

    /// 按行数切分数据填充区间，在每个客户端上运行 `part1 + n=.. -pop seq=a..b + part2`
    #[instrument(skip(self), fields(run_id = %self.ctx.run_id()))]
    pub async fn stress_seq_range(
        &self,
        row_count: u64,
        command_part1: &str,
        command_part2: &str,
    ) -> OrchestratorResult<()> {
        let commands: Vec<String> = population_ranges(row_count, self.targets.len())?
            .iter()
            .map(|pop| format!("{command_part1}{}{command_part2}", pop.to_args()))
            .collect();
        info!(commands = ?commands, "数据填充命令");

        info!(important = true, "压测: 开始");
        self.staggered_stress("stress_seq_range", commands).await?;
        info!(important = true, "压测: 完成");
        Ok(())
    }

    /// 按分区并行写入数据，记录写入速率
    #[instrument(skip(self), fields(run_id = %self.ctx.run_id()))]
    pub async fn insert(&self, options: &InsertOptions) -> OrchestratorResult<()> {
        let ops = options.ops.unwrap_or(options.partitions);
        info!(important = true, "向 {} 个分区写入 {ops} 次操作", options.partitions);

        let workers = self.targets.len();
        let ranges = plan(options.partitions, workers, options.sequence_start.unwrap_or(1))?;
        let op_counts = split_count(ops, workers)?;
        let commands: Vec<String> = ranges
            .iter()
            .zip(op_counts)
            .map(|(range, count)| options.command(count, range))
            .collect();

        let elapsed = self.launch_partitioned(commands).await?;
        let seconds = elapsed.as_secs_f64();
        info!(duration_seconds = seconds, "耗时: {seconds:.1} 秒");
        if seconds > 0.0 {
            info!("写入速率: {:.0} ops/秒", ops as f64 / seconds);
        }
        info!(
            important = true,
            "向 {} 个分区写入 {ops} 次操作: 完成",
            options.partitions
        );
        Ok(())
    }

    /// 在所有压测客户端上执行shell命令
    #[instrument(skip(self), fields(run_id = %self.ctx.run_id()))]
    pub async fn ssh(&self, command: &str) -> OrchestratorResult<()> {
        let command = RemoteCommand::shell(command);
        let factory = self.factory.clone();
        self.executor
            .run_on("ssh", &self.targets, |target| {
                run_commands(factory.clone(), target, vec![command.clone()])
            })
            .await?;
        Ok(())
    }

    /// 把本地文件上传到每个压测客户端的家目录
    #[instrument(skip(self), fields(run_id = %self.ctx.run_id()))]
    pub async fn upload(&self, file: &Path) -> OrchestratorResult<()> {
        let remote_path = file
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| {
                OrchestratorError::InvalidArgument(format!("not a file: {}", file.display()))
            })?;

        info!(important = true, "上传: 开始");
        let factory = self.factory.clone();
        let local_path = file.to_path_buf();
        self.executor
            .run_on("upload", &self.targets, |target| {
                let factory = factory.clone();
                let local_path = local_path.clone();
                let remote_path = remote_path.clone();
                async move {
                    let session = factory.connect(&target).await?;
                    session.transfer_to(&local_path, &remote_path).await
                }
            })
            .await?;
        info!(important = true, "上传: 完成");
        Ok(())
    }

    /// 收集压测结果
    ///
    /// 每个客户端的结果文件下载到 `<dir>/<address>/`，随后删除远端文件，
    /// 全部下载完成后再连同预热和冷却时间一起交给结果处理器。
    #[instrument(skip(self, processor), fields(run_id = %self.ctx.run_id()))]
    pub async fn collect_results(
        &self,
        dir: &Path,
        trim: TrimPeriods,
        processor: &dyn ResultProcessor,
    ) -> OrchestratorResult<()> {
        info!(important = true, "收集结果: 开始");
        let factory = self.factory.clone();
        let root = dir.to_path_buf();
        self.executor
            .run_on("collect", &self.targets, |target| {
                collect_from(factory.clone(), target, root.clone())
            })
            .await?;

        processor.process(dir, trim).await?;
        info!(important = true, "收集结果: 完成");
        info!("结果位于 [{}]", dir.display());
        Ok(())
    }

    /// 在所有客户端上按给定命令并行压测，除第一个外其余客户端延迟启动
    async fn staggered_stress(&self, operation: &str, commands: Vec<String>) -> OrchestratorResult<()> {
        let items: Vec<WorkItem<(Duration, String)>> = self
            .targets
            .iter()
            .cloned()
            .zip(commands)
            .enumerate()
            .map(|(i, (target, command))| {
                WorkItem::new(target, (self.stress.startup_delay(i), command))
            })
            .collect();

        let factory = self.factory.clone();
        let tool = self.tool.clone();
        self.executor
            .run_all(
                operation,
                |target, (delay, command): (Duration, String)| {
                    run_stress(factory.clone(), tool.clone(), target, delay, command)
                },
                items,
            )
            .await?;
        Ok(())
    }

    /// 依次在后台启动每个客户端的压测（两次启动之间间隔 `launch_interval_seconds`），
    /// 然后等待全部完成
    async fn launch_partitioned(&self, commands: Vec<String>) -> OrchestratorResult<Duration> {
        let started = Instant::now();
        let count = commands.len();

        let mut handles = Vec::with_capacity(count);
        for (index, command) in commands.into_iter().enumerate() {
            let target = self.target_at(index)?;
            info!(target = %target, "{command}");
            handles.push((target.clone(), self.async_stress(command, Some(index))));
            if index + 1 < count {
                sleep(self.stress.launch_interval()).await;
            }
        }

        let mut failures = Vec::new();
        for (target, handle) in &handles {
            if let Err(e) = handle.join().await {
                failures.push(TargetFailure {
                    target: target.address().to_string(),
                    message: e.to_string(),
                });
            }
        }
        if !failures.is_empty() {
            return Err(OrchestratorError::FanOutFailed {
                total: count,
                failures,
            });
        }
        Ok(started.elapsed())
    }
}

async fn run_stress(
    factory: Arc<dyn SessionFactory>,
    tool: StressTool,
    target: Target,
    delay: Duration,
    args: String,
) -> OrchestratorResult<()> {
    if !delay.is_zero() {
        sleep(delay).await;
    }
    info!(target = %target, "{} {args}", tool.binary());
    let command = RemoteCommand::Stress {
        tool,
        args,
        log_file: stress_log_file(),
    };
    run_commands(factory, target, vec![command]).await
}

async fn collect_from(
    factory: Arc<dyn SessionFactory>,
    target: Target,
    root: PathBuf,
) -> OrchestratorResult<()> {
    let dest = root.join(target.address());
    tokio::fs::create_dir_all(&dest).await?;
    info!(target = %target, "收集到 [{}]", dest.display());

    let session = factory.connect(&target).await?;
    session.transfer_from(RESULT_GLOB, &dest).await?;
    session.execute(&RemoteCommand::shell(RESULT_CLEANUP)).await?;

    info!(target = %target, "收集到 [{}] 完成", dest.display());
    Ok(())
}

/// 按本地时间命名的压测日志文件
fn stress_log_file() -> String {
    chrono::Local::now()
        .format("cassandra-stress-%d-%m-%Y_%H-%M-%S.log")
        .to_string()
}

//! 服务就绪等待
//!
//! 对每个尚未就绪的目标反复做有超时的TCP连接，成功的目标从集合中移除且不再探测，
//! 直到集合为空（成功）或超过总超时时间（失败，列出仍未就绪的目标）。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use fleetbench_core::{
    config::ReadinessConfig, OrchestratorError, OrchestratorResult, ReadinessProbe, RunContext,
    Target,
};
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, info, warn, Instrument};

/// 基于TCP连接的就绪探测
pub struct TcpProbe {
    port: u16,
}

impl TcpProbe {
    pub fn new(port: u16) -> Self {
        Self { port }
    }
}

#[async_trait]
impl ReadinessProbe for TcpProbe {
    async fn probe(&self, target: &Target, connect_timeout: Duration) -> bool {
        match timeout(
            connect_timeout,
            TcpStream::connect((target.address(), self.port)),
        )
        .await
        {
            Ok(Ok(_stream)) => true,
            Ok(Err(e)) => {
                debug!(target = %target, port = self.port, "连接失败: {e}");
                false
            }
            Err(_) => {
                debug!(target = %target, port = self.port, "连接超时");
                false
            }
        }
    }

    fn describe(&self) -> String {
        format!("tcp port {}", self.port)
    }
}

/// 可以被规范化为目标集合的输入：单个目标或目标列表
pub trait IntoTargets {
    fn into_targets(self) -> Vec<Target>;
}

impl IntoTargets for Target {
    fn into_targets(self) -> Vec<Target> {
        vec![self]
    }
}

impl IntoTargets for &Target {
    fn into_targets(self) -> Vec<Target> {
        vec![self.clone()]
    }
}

impl IntoTargets for Vec<Target> {
    fn into_targets(self) -> Vec<Target> {
        self
    }
}

impl IntoTargets for &[Target] {
    fn into_targets(self) -> Vec<Target> {
        self.to_vec()
    }
}

impl IntoTargets for &Vec<Target> {
    fn into_targets(self) -> Vec<Target> {
        self.clone()
    }
}

/// 就绪轮询器
#[derive(Clone)]
pub struct ReadinessPoller {
    probe: Arc<dyn ReadinessProbe>,
    config: ReadinessConfig,
    ctx: RunContext,
}

impl ReadinessPoller {
    pub fn new(probe: Arc<dyn ReadinessProbe>, config: ReadinessConfig, ctx: &RunContext) -> Self {
        Self {
            probe,
            config,
            ctx: ctx.component("readiness"),
        }
    }

    /// 使用配置中的端口做TCP探测
    pub fn tcp(config: ReadinessConfig, ctx: &RunContext) -> Self {
        let probe = Arc::new(TcpProbe::new(config.port));
        Self::new(probe, config, ctx)
    }

    pub fn config(&self) -> &ReadinessConfig {
        &self.config
    }

    /// 等待所有目标就绪
    ///
    /// 超时后返回 `OrchestratorError::ReadinessTimeout`，其中恰好包含仍未就绪的目标。
    /// 配置中的时间无法表示时返回 `Configuration`。
    pub async fn await_ready(&self, targets: impl IntoTargets) -> OrchestratorResult<()> {
        let mut session = PollSession::new(targets.into_targets(), &self.config)?;
        self.run_session(&mut session)
            .instrument(self.ctx.span().clone())
            .await
    }

    pub(crate) async fn run_session(&self, session: &mut PollSession) -> OrchestratorResult<()> {
        if session.live.is_empty() {
            return Ok(());
        }

        info!(
            targets = ?addresses(&session.live),
            endpoint = %self.probe.describe(),
            "等待服务端口启动（即节点完成引导），可能需要一段时间"
        );

        while Instant::now() < session.deadline {
            let mut pending = Vec::with_capacity(session.live.len());
            for target in std::mem::take(&mut session.live) {
                if self.probe.probe(&target, session.connect_timeout).await {
                    info!(target = %target, "成功连接到服务端口");
                    continue;
                }

                sleep(session.backoff_interval).await;

                if session.feedback_due(target.address(), Instant::now()) {
                    info!(
                        target = %target,
                        waited_seconds = session.started.elapsed().as_secs(),
                        "仍在等待服务端口启动..."
                    );
                }
                pending.push(target);
            }

            session.live = pending;
            if session.live.is_empty() {
                info!(
                    elapsed_ms = session.started.elapsed().as_millis() as u64,
                    "所有目标已就绪"
                );
                return Ok(());
            }
        }

        let remaining = addresses(&session.live);
        warn!(targets = ?remaining, "等待服务就绪超时");
        Err(OrchestratorError::ReadinessTimeout {
            timeout_seconds: self.config.timeout_seconds,
            targets: remaining,
        })
    }
}

/// 一次就绪等待的状态
///
/// 未就绪集合只会缩小；每个目标的进度日志至多每 `feedback_interval` 输出一次。
pub(crate) struct PollSession {
    live: Vec<Target>,
    started: Instant,
    deadline: Instant,
    connect_timeout: Duration,
    backoff_interval: Duration,
    feedback_interval: Duration,
    next_feedback: HashMap<String, Instant>,
    feedback_counts: HashMap<String, usize>,
}

impl PollSession {
    pub(crate) fn new(targets: Vec<Target>, config: &ReadinessConfig) -> OrchestratorResult<Self> {
        let connect_timeout = config.connect_timeout()?;
        let backoff_interval = config.backoff_interval()?;
        let feedback_interval = config.feedback_interval()?;
        let started = Instant::now();
        let deadline = started.checked_add(config.timeout()?).ok_or_else(|| {
            OrchestratorError::Configuration(format!(
                "readiness.timeout_seconds is out of range: {}",
                config.timeout_seconds
            ))
        })?;
        let first_feedback = started.checked_add(feedback_interval).unwrap_or(deadline);

        let live = dedup(targets);
        let next_feedback = live
            .iter()
            .map(|t| (t.address().to_string(), first_feedback))
            .collect();

        Ok(Self {
            live,
            started,
            deadline,
            connect_timeout,
            backoff_interval,
            feedback_interval,
            next_feedback,
            feedback_counts: HashMap::new(),
        })
    }

    /// 是否应为该目标输出一次进度日志，输出时推迟下一次的时间点
    fn feedback_due(&mut self, address: &str, now: Instant) -> bool {
        let Some(point) = self.next_feedback.get_mut(address) else {
            return false;
        };
        if now <= *point {
            return false;
        }
        *point = now.checked_add(self.feedback_interval).unwrap_or(self.deadline);
        *self.feedback_counts.entry(address.to_string()).or_insert(0) += 1;
        true
    }

    /// 为该目标输出过的进度日志条数
    pub(crate) fn feedback_count(&self, address: &str) -> usize {
        self.feedback_counts.get(address).copied().unwrap_or(0)
    }
}

fn addresses(targets: &[Target]) -> Vec<String> {
    targets.iter().map(|t| t.address().to_string()).collect()
}

fn dedup(targets: Vec<Target>) -> Vec<Target> {
    let mut unique: Vec<Target> = Vec::with_capacity(targets.len());
    for target in targets {
        if !unique.iter().any(|t| t.address() == target.address()) {
            unique.push(target);
        }
    }
    unique
}

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use fleetbench_core::{OrchestratorResult, RemoteCommand, RunContext, SessionFactory, Target};
use fleetbench_dispatcher::ReadinessPoller;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// 通过远程节点上的 `cqlsh` 执行CQL语句
pub struct CqlService {
    node: Target,
    username: Option<String>,
    password: Option<String>,
    poller: ReadinessPoller,
    factory: Arc<dyn SessionFactory>,
    started: AtomicBool,
    ctx: RunContext,
}

impl CqlService {
    pub fn new(
        node: Target,
        poller: ReadinessPoller,
        factory: Arc<dyn SessionFactory>,
        ctx: &RunContext,
    ) -> Self {
        Self {
            node,
            username: None,
            password: None,
            poller,
            factory,
            started: AtomicBool::new(false),
            ctx: ctx.component("cql"),
        }
    }

    /// 使用用户名和密码登录
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    pub fn node(&self) -> &Target {
        &self.node
    }

    /// 等待节点的CQL端口可用
    #[instrument(skip(self), fields(run_id = %self.ctx.run_id(), target = %self.node))]
    pub async fn wait_for_start(&self) -> OrchestratorResult<()> {
        info!(important = true, "cql: 等待启动");
        self.poller.await_ready(&self.node).await?;
        self.started.store(true, Ordering::SeqCst);
        info!(important = true, "cqlsh: 运行中");
        Ok(())
    }

    /// 执行一条CQL语句
    ///
    /// 第一次调用前会先等待CQL端口可用。语句写入远端一个随机命名的脚本，
    /// 执行完成后删除该脚本。
    #[instrument(skip(self), fields(run_id = %self.ctx.run_id(), target = %self.node))]
    pub async fn exec(&self, cql: &str) -> OrchestratorResult<()> {
        if !self.started.load(Ordering::SeqCst) {
            self.wait_for_start().await?;
        }

        let script = format!("{}.cql", Uuid::new_v4());
        info!(important = true, "cqlsh exec: [{cql}]");

        let session = self.factory.connect(&self.node).await?;
        session
            .execute(&RemoteCommand::WriteFile {
                path: script.clone(),
                content: cql.to_string(),
            })
            .await?;
        let outcome = session
            .execute(&RemoteCommand::Cqlsh {
                username: self.username.clone(),
                password: self.password.clone(),
                script: script.clone(),
            })
            .await;
        if let Err(e) = session
            .execute(&RemoteCommand::RemoveFile { path: script })
            .await
        {
            warn!("删除CQL脚本失败: {e}");
        }
        outcome?;

        info!(important = true, "cqlsh 完成");
        Ok(())
    }
}

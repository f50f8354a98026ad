use std::collections::VecDeque;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::Instant;

use async_trait::async_trait;
use fleetbench_core::{
    config::SshConfig, shell_quote, OrchestratorError, OrchestratorResult, RemoteCommand,
    RemoteSession, SessionFactory, Target, TargetRole,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info};

/// 失败时保留的stderr行数
const STDERR_TAIL_LINES: usize = 5;

/// 基于系统 `ssh`/`scp` 命令的会话工厂
#[derive(Debug, Clone)]
pub struct SshSessionFactory {
    config: SshConfig,
    ssh_program: String,
    scp_program: String,
}

impl SshSessionFactory {
    /// 创建新的SSH会话工厂
    pub fn new(config: SshConfig) -> Self {
        Self {
            config,
            ssh_program: "ssh".to_string(),
            scp_program: "scp".to_string(),
        }
    }

    /// 替换ssh和scp可执行文件
    pub fn with_programs(mut self, ssh: impl Into<String>, scp: impl Into<String>) -> Self {
        self.ssh_program = ssh.into();
        self.scp_program = scp.into();
        self
    }

    /// 按目标角色选择登录用户
    pub fn user_for(&self, role: TargetRole) -> &str {
        match role {
            TargetRole::ClusterNode => &self.config.cluster_user,
            TargetRole::LoadGenerator => &self.config.loadgenerator_user,
        }
    }

    /// 为目标创建会话
    pub fn session(&self, target: &Target) -> SshSession {
        SshSession {
            target: target.clone(),
            user: self.user_for(target.role()).to_string(),
            options: self.config.options.clone(),
            connect_timeout_seconds: self.config.connect_timeout_seconds,
            ssh_program: self.ssh_program.clone(),
            scp_program: self.scp_program.clone(),
        }
    }
}

#[async_trait]
impl SessionFactory for SshSessionFactory {
    async fn connect(&self, target: &Target) -> OrchestratorResult<Box<dyn RemoteSession>> {
        Ok(Box::new(self.session(target)))
    }
}

/// 单个目标上的SSH会话
///
/// 每次调用启动一个独立的 `ssh` 或 `scp` 子进程，会话本身不保持连接。
#[derive(Debug, Clone)]
pub struct SshSession {
    target: Target,
    user: String,
    options: Vec<String>,
    connect_timeout_seconds: u64,
    ssh_program: String,
    scp_program: String,
}

/// 只保留最近若干行的stderr缓冲
#[derive(Debug, Clone, Default)]
pub(crate) struct StderrTail {
    lines: VecDeque<String>,
}

impl StderrTail {
    pub(crate) fn push(&mut self, line: String) {
        if self.lines.len() == STDERR_TAIL_LINES {
            self.lines.pop_front();
        }
        self.lines.push_back(line);
    }

    pub(crate) fn joined(&self) -> String {
        self.lines.iter().map(String::as_str).collect::<Vec<_>>().join("\n")
    }
}

/// 子进程执行结果
///
/// stdout只写入debug日志，不做保留。
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub status: ExitStatus,
    stderr: StderrTail,
}

impl ProcessOutput {
    /// stderr的最后几行
    pub fn stderr_tail(&self) -> String {
        self.stderr.joined()
    }

    fn failure_message(&self) -> String {
        let tail = self.stderr_tail();
        match self.status.code() {
            Some(code) if tail.is_empty() => format!("退出码: {code}"),
            Some(code) => format!("退出码: {code}, stderr: {tail}"),
            None => format!("进程被信号终止, stderr: {tail}"),
        }
    }
}

impl SshSession {
    /// `user@host`
    pub fn destination(&self) -> String {
        format!("{}@{}", self.user, self.target.address())
    }

    fn common_args(&self) -> Vec<String> {
        let mut args = self.options.clone();
        args.push("-o".to_string());
        args.push(format!("ConnectTimeout={}", self.connect_timeout_seconds));
        args
    }

    /// 执行远程命令的ssh参数，命令整体作为一个参数交给远端bash
    pub fn ssh_args(&self, command: &RemoteCommand) -> Vec<String> {
        let mut args = self.common_args();
        args.push(self.destination());
        args.push(format!("bash -c {}", shell_quote(&command.to_shell())));
        args
    }

    /// 上传文件的scp参数
    pub fn upload_args(&self, local_path: &Path, remote_path: &str) -> Vec<String> {
        let mut args = self.common_args();
        args.push(local_path.display().to_string());
        args.push(format!("{}:{}", self.destination(), remote_path));
        args
    }

    /// 下载文件的scp参数，通配符在远端展开
    pub fn download_args(&self, remote_glob: &str, local_dir: &Path) -> Vec<String> {
        let mut args = self.common_args();
        args.push(format!("{}:{}", self.destination(), remote_glob));
        args.push(local_dir.display().to_string());
        args
    }

    async fn run(&self, program: &str, args: &[String]) -> OrchestratorResult<ProcessOutput> {
        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| OrchestratorError::RemoteCommand {
            target: self.target.address().to_string(),
            command: program.to_string(),
            message: format!("启动进程失败: {e}"),
        })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| OrchestratorError::Internal("无法获取stdout".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| OrchestratorError::Internal("无法获取stderr".to_string()))?;

        let address = self.target.address();
        let stdout_task = async {
            let mut reader = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = reader.next_line().await {
                debug!(target = address, "{line}");
            }
        };
        let stderr_task = async {
            let mut tail = StderrTail::default();
            let mut reader = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = reader.next_line().await {
                debug!(target = address, stream = "stderr", "{line}");
                tail.push(line);
            }
            tail
        };

        let ((), stderr) = tokio::join!(stdout_task, stderr_task);
        let status = child.wait().await?;

        Ok(ProcessOutput { status, stderr })
    }
}

#[async_trait]
impl RemoteSession for SshSession {
    fn target(&self) -> &Target {
        &self.target
    }

    async fn execute(&self, command: &RemoteCommand) -> OrchestratorResult<()> {
        let started = Instant::now();
        let rendered = command.to_shell();
        debug!(target = %self.target, kind = command.kind(), "执行远程命令: {rendered}");

        let output = self.run(&self.ssh_program, &self.ssh_args(command)).await?;
        if !output.status.success() {
            return Err(OrchestratorError::RemoteCommand {
                target: self.target.address().to_string(),
                command: rendered,
                message: output.failure_message(),
            });
        }

        debug!(
            target = %self.target,
            kind = command.kind(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "远程命令执行完成"
        );
        Ok(())
    }

    async fn transfer_to(&self, local_path: &Path, remote_path: &str) -> OrchestratorResult<()> {
        info!(target = %self.target, "上传 {} 到 {remote_path}", local_path.display());
        let output = self
            .run(&self.scp_program, &self.upload_args(local_path, remote_path))
            .await?;
        if !output.status.success() {
            return Err(OrchestratorError::Transfer {
                target: self.target.address().to_string(),
                message: format!("上传 {} 失败: {}", local_path.display(), output.failure_message()),
            });
        }
        Ok(())
    }

    async fn transfer_from(&self, remote_glob: &str, local_dir: &Path) -> OrchestratorResult<()> {
        info!(target = %self.target, "下载 {remote_glob} 到 {}", local_dir.display());
        let output = self
            .run(&self.scp_program, &self.download_args(remote_glob, local_dir))
            .await?;
        if !output.status.success() {
            return Err(OrchestratorError::Transfer {
                target: self.target.address().to_string(),
                message: format!("下载 {remote_glob} 失败: {}", output.failure_message()),
            });
        }
        Ok(())
    }
}

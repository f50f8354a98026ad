//! Mock implementations of the session, probe and processor traits
//!
//! All mocks record every request they receive so tests can assert on typed
//! requests instead of matching shell strings.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use fleetbench_core::{
    OrchestratorError, OrchestratorResult, ReadinessProbe, RemoteCommand, RemoteSession,
    ResultProcessor, SessionFactory, Target, TrimPeriods,
};

/// A request received by a mock session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionRequest {
    Execute(RemoteCommand),
    TransferTo { local_path: PathBuf, remote_path: String },
    TransferFrom { remote_glob: String, local_dir: PathBuf },
}

/// A recorded request together with the target it was sent to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub target: String,
    pub request: SessionRequest,
}

#[derive(Debug, Default)]
struct MockState {
    calls: Vec<RecordedCall>,
    connects: Vec<String>,
    failing_targets: HashSet<String>,
    failing_commands: Vec<(String, RemoteCommand)>,
    failing_kinds: Vec<(String, String)>,
    unreachable_targets: HashSet<String>,
    downloads: Vec<(String, String)>,
    delays: HashMap<String, Duration>,
}

/// Mock implementation of SessionFactory for testing
#[derive(Debug, Clone, Default)]
pub struct MockSessionFactory {
    state: Arc<Mutex<MockState>>,
}

impl MockSessionFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every command executed on `address` fails
    pub fn fail_target(self, address: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .failing_targets
            .insert(address.to_string());
        self
    }

    /// Only the given command fails on `address`
    pub fn fail_command(self, address: &str, command: RemoteCommand) -> Self {
        self.state
            .lock()
            .unwrap()
            .failing_commands
            .push((address.to_string(), command));
        self
    }

    /// Every command of the given kind (see [`RemoteCommand::kind`]) fails on `address`
    pub fn fail_kind(self, address: &str, kind: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .failing_kinds
            .push((address.to_string(), kind.to_string()));
        self
    }

    /// Connecting to `address` fails
    pub fn unreachable(self, address: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .unreachable_targets
            .insert(address.to_string());
        self
    }

    /// Commands on `address` take `delay` before completing
    pub fn with_delay(self, address: &str, delay: Duration) -> Self {
        self.state
            .lock()
            .unwrap()
            .delays
            .insert(address.to_string(), delay);
        self
    }

    /// `transfer_from` writes a file with this name and content into the local directory
    pub fn with_download(self, file_name: &str, content: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .downloads
            .push((file_name.to_string(), content.to_string()));
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Commands executed on one target, in order
    pub fn commands_for(&self, address: &str) -> Vec<RemoteCommand> {
        self.state
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|c| c.target == address)
            .filter_map(|c| match &c.request {
                SessionRequest::Execute(cmd) => Some(cmd.clone()),
                _ => None,
            })
            .collect()
    }

    /// Targets that executed `command`, in execution order
    pub fn targets_for(&self, command: &RemoteCommand) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|c| c.request == SessionRequest::Execute(command.clone()))
            .map(|c| c.target.clone())
            .collect()
    }

    pub fn connect_count(&self) -> usize {
        self.state.lock().unwrap().connects.len()
    }
}

#[async_trait]
impl SessionFactory for MockSessionFactory {
    async fn connect(&self, target: &Target) -> OrchestratorResult<Box<dyn RemoteSession>> {
        let mut state = self.state.lock().unwrap();
        state.connects.push(target.address().to_string());
        if state.unreachable_targets.contains(target.address()) {
            return Err(OrchestratorError::RemoteCommand {
                target: target.address().to_string(),
                command: "connect".to_string(),
                message: "connection refused".to_string(),
            });
        }
        Ok(Box::new(MockSession {
            target: target.clone(),
            state: Arc::clone(&self.state),
        }))
    }
}

/// Session handed out by [`MockSessionFactory`]
#[derive(Debug)]
pub struct MockSession {
    target: Target,
    state: Arc<Mutex<MockState>>,
}

impl MockSession {
    fn record(&self, request: SessionRequest) -> Option<Duration> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(RecordedCall {
            target: self.target.address().to_string(),
            request,
        });
        state.delays.get(self.target.address()).copied()
    }
}

#[async_trait]
impl RemoteSession for MockSession {
    fn target(&self) -> &Target {
        &self.target
    }

    async fn execute(&self, command: &RemoteCommand) -> OrchestratorResult<()> {
        let delay = self.record(SessionRequest::Execute(command.clone()));
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let address = self.target.address();
        let fails = {
            let state = self.state.lock().unwrap();
            state.failing_targets.contains(address)
                || state
                    .failing_commands
                    .iter()
                    .any(|(a, c)| a == address && c == command)
                || state
                    .failing_kinds
                    .iter()
                    .any(|(a, k)| a == address && k == command.kind())
        };
        if fails {
            return Err(OrchestratorError::RemoteCommand {
                target: address.to_string(),
                command: command.to_shell(),
                message: "exit status 1".to_string(),
            });
        }
        Ok(())
    }

    async fn transfer_to(&self, local_path: &Path, remote_path: &str) -> OrchestratorResult<()> {
        self.record(SessionRequest::TransferTo {
            local_path: local_path.to_path_buf(),
            remote_path: remote_path.to_string(),
        });
        Ok(())
    }

    async fn transfer_from(&self, remote_glob: &str, local_dir: &Path) -> OrchestratorResult<()> {
        self.record(SessionRequest::TransferFrom {
            remote_glob: remote_glob.to_string(),
            local_dir: local_dir.to_path_buf(),
        });
        let downloads = self.state.lock().unwrap().downloads.clone();
        for (name, content) in downloads {
            tokio::fs::write(local_dir.join(name), content).await?;
        }
        Ok(())
    }
}

/// How a scripted probe answers for one address
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeScript {
    Ready,
    Never,
    /// Ready from the n-th attempt on (1-based)
    ReadyAfter(usize),
}

/// Readiness probe driven by a per-address script; unknown addresses never become ready
#[derive(Debug, Clone, Default)]
pub struct ScriptedProbe {
    scripts: Arc<Mutex<HashMap<String, ProbeScript>>>,
    attempts: Arc<Mutex<HashMap<String, usize>>>,
}

impl ScriptedProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(self, address: &str, script: ProbeScript) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(address.to_string(), script);
        self
    }

    pub fn attempts(&self, address: &str) -> usize {
        self.attempts
            .lock()
            .unwrap()
            .get(address)
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl ReadinessProbe for ScriptedProbe {
    async fn probe(&self, target: &Target, _connect_timeout: Duration) -> bool {
        let attempt = {
            let mut attempts = self.attempts.lock().unwrap();
            let count = attempts.entry(target.address().to_string()).or_insert(0);
            *count += 1;
            *count
        };
        let script = self
            .scripts
            .lock()
            .unwrap()
            .get(target.address())
            .copied()
            .unwrap_or(ProbeScript::Never);
        match script {
            ProbeScript::Ready => true,
            ProbeScript::Never => false,
            ProbeScript::ReadyAfter(n) => attempt >= n,
        }
    }

    fn describe(&self) -> String {
        "scripted probe".to_string()
    }
}

/// Result processor that records the directories and trim periods it was asked to process
#[derive(Debug, Clone, Default)]
pub struct RecordingProcessor {
    processed: Arc<Mutex<Vec<(PathBuf, TrimPeriods)>>>,
}

impl RecordingProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn processed(&self) -> Vec<PathBuf> {
        self.calls().into_iter().map(|(dir, _)| dir).collect()
    }

    pub fn calls(&self) -> Vec<(PathBuf, TrimPeriods)> {
        self.processed.lock().unwrap().clone()
    }
}

#[async_trait]
impl ResultProcessor for RecordingProcessor {
    async fn process(&self, results_dir: &Path, trim: TrimPeriods) -> OrchestratorResult<()> {
        self.processed
            .lock()
            .unwrap()
            .push((results_dir.to_path_buf(), trim));
        Ok(())
    }
}

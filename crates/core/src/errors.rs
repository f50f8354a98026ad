use std::fmt;

use thiserror::Error;

/// 单个目标上的失败记录
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetFailure {
    /// 失败目标的地址
    pub target: String,
    /// 失败原因
    pub message: String,
}

impl fmt::Display for TargetFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.target, self.message)
    }
}

/// 编排器错误类型定义
///
/// 所有变体只携带可克隆的数据，这样同一个任务结果可以被多次观察。
#[derive(Debug, Clone, Error, PartialEq)]
pub enum OrchestratorError {
    #[error("远程命令执行失败 [{target}]: {command} - {message}")]
    RemoteCommand {
        target: String,
        command: String,
        message: String,
    },

    #[error("文件传输失败 [{target}]: {message}")]
    Transfer { target: String, message: String },

    #[error("等待服务就绪超时 ({timeout_seconds}秒)，未就绪节点: {targets:?}")]
    ReadinessTimeout {
        timeout_seconds: f64,
        targets: Vec<String>,
    },

    #[error("并行执行失败: {}/{total} 个目标失败，首个失败: {}", .failures.len(), first_failure(.failures))]
    FanOutFailed {
        total: usize,
        failures: Vec<TargetFailure>,
    },

    #[error("后台任务异常终止: {0}")]
    TaskPanicked(String),

    #[error("无效参数: {0}")]
    InvalidArgument(String),

    #[error("配置错误: {0}")]
    Configuration(String),

    #[error("IO错误: {0}")]
    Io(String),

    #[error("内部错误: {0}")]
    Internal(String),
}

fn first_failure(failures: &[TargetFailure]) -> String {
    failures
        .first()
        .map(|f| f.to_string())
        .unwrap_or_else(|| "<none>".to_string())
}

impl OrchestratorError {
    /// 并行执行失败时返回所有失败目标，其余错误返回空列表
    pub fn failed_targets(&self) -> Vec<&str> {
        match self {
            OrchestratorError::FanOutFailed { failures, .. } => {
                failures.iter().map(|f| f.target.as_str()).collect()
            }
            OrchestratorError::ReadinessTimeout { targets, .. } => {
                targets.iter().map(String::as_str).collect()
            }
            OrchestratorError::RemoteCommand { target, .. }
            | OrchestratorError::Transfer { target, .. } => vec![target.as_str()],
            _ => Vec::new(),
        }
    }
}

impl From<std::io::Error> for OrchestratorError {
    fn from(err: std::io::Error) -> Self {
        OrchestratorError::Io(err.to_string())
    }
}

/// 统一的Result类型
pub type OrchestratorResult<T> = std::result::Result<T, OrchestratorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fan_out_error_names_first_failure() {
        let err = OrchestratorError::FanOutFailed {
            total: 5,
            failures: vec![
                TargetFailure {
                    target: "10.0.0.2".to_string(),
                    message: "exit 1".to_string(),
                },
                TargetFailure {
                    target: "10.0.0.4".to_string(),
                    message: "exit 2".to_string(),
                },
            ],
        };

        let text = err.to_string();
        assert!(text.contains("2/5"));
        assert!(text.contains("[10.0.0.2] exit 1"));
        assert_eq!(err.failed_targets(), vec!["10.0.0.2", "10.0.0.4"]);
    }

    #[test]
    fn test_readiness_timeout_lists_targets() {
        let err = OrchestratorError::ReadinessTimeout {
            timeout_seconds: 2.0,
            targets: vec!["10.0.0.9".to_string()],
        };
        assert!(err.to_string().contains("10.0.0.9"));
        assert_eq!(err.failed_targets(), vec!["10.0.0.9"]);
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: OrchestratorError = io.into();
        assert!(matches!(err, OrchestratorError::Io(ref m) if m.contains("missing")));
    }
}

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::validation::{ConfigValidator, ValidationUtils};
use crate::{OrchestratorError, OrchestratorResult};

/// SSH连接配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SshConfig {
    /// 登录集群节点的用户
    pub cluster_user: String,
    /// 登录压测客户端的用户，兼容旧字段名 `load_generator_user`
    #[serde(alias = "load_generator_user")]
    pub loadgenerator_user: String,
    /// 附加的ssh/scp参数，例如 `["-i", "key.pem", "-o", "StrictHostKeyChecking=no"]`
    pub options: Vec<String>,
    pub connect_timeout_seconds: u64,
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            cluster_user: "centos".to_string(),
            loadgenerator_user: "ubuntu".to_string(),
            options: vec!["-o".to_string(), "StrictHostKeyChecking=no".to_string()],
            connect_timeout_seconds: 10,
        }
    }
}

impl ConfigValidator for SshConfig {
    fn validate(&self) -> OrchestratorResult<()> {
        ValidationUtils::validate_not_empty(&self.cluster_user, "ssh.cluster_user")?;
        ValidationUtils::validate_not_empty(&self.loadgenerator_user, "ssh.loadgenerator_user")?;
        if self.connect_timeout_seconds == 0 {
            return Err(OrchestratorError::Configuration(
                "ssh.connect_timeout_seconds must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// 数据库集群配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    pub public_ips: Vec<String>,
    pub private_ips: Vec<String>,
    pub seed_private_ip: Option<String>,
    pub cluster_name: String,
    pub password_authenticator: bool,
    /// 节点上的数据库配置文件
    pub config_path: String,
    /// systemd服务名
    pub service_name: String,
    /// 清理数据时要清空的目录
    pub data_dirs: Vec<String>,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            public_ips: Vec::new(),
            private_ips: Vec::new(),
            seed_private_ip: None,
            cluster_name: "cluster-sso".to_string(),
            password_authenticator: false,
            config_path: "/etc/scylla/scylla.yaml".to_string(),
            service_name: "scylla-server".to_string(),
            data_dirs: vec![
                "/var/lib/scylla/data".to_string(),
                "/var/lib/scylla/commitlog".to_string(),
            ],
        }
    }
}

impl ClusterConfig {
    /// 种子节点地址，未配置时使用第一个私有地址
    pub fn seed(&self) -> Option<&str> {
        self.seed_private_ip
            .as_deref()
            .or_else(|| self.private_ips.first().map(String::as_str))
    }
}

impl ConfigValidator for ClusterConfig {
    fn validate(&self) -> OrchestratorResult<()> {
        ValidationUtils::validate_addresses(&self.public_ips, "cluster.public_ips")?;
        ValidationUtils::validate_addresses(&self.private_ips, "cluster.private_ips")?;
        if !self.private_ips.is_empty() && self.private_ips.len() != self.public_ips.len() {
            return Err(OrchestratorError::Configuration(format!(
                "cluster.private_ips ({}) must match cluster.public_ips ({})",
                self.private_ips.len(),
                self.public_ips.len()
            )));
        }
        ValidationUtils::validate_not_empty(&self.cluster_name, "cluster.cluster_name")?;
        ValidationUtils::validate_not_empty(&self.config_path, "cluster.config_path")?;
        ValidationUtils::validate_not_empty(&self.service_name, "cluster.service_name")?;
        for dir in &self.data_dirs {
            ValidationUtils::validate_not_empty(dir, "cluster.data_dirs")?;
            if dir.trim_end_matches('/').is_empty() {
                return Err(OrchestratorError::Configuration(
                    "cluster.data_dirs cannot contain the root directory".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// 压测客户端配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadGeneratorConfig {
    pub public_ips: Vec<String>,
    /// 使用scylla-tools提供的压测工具，否则使用Apache Cassandra发行包
    pub scylla_tools: bool,
    pub performance_governor: bool,
    pub cassandra_version: Option<String>,
}

impl Default for LoadGeneratorConfig {
    fn default() -> Self {
        Self {
            public_ips: Vec::new(),
            scylla_tools: true,
            performance_governor: true,
            cassandra_version: None,
        }
    }
}

impl ConfigValidator for LoadGeneratorConfig {
    fn validate(&self) -> OrchestratorResult<()> {
        ValidationUtils::validate_addresses(&self.public_ips, "load_generator.public_ips")?;
        if !self.scylla_tools {
            match &self.cassandra_version {
                Some(version) => {
                    ValidationUtils::validate_not_empty(version, "load_generator.cassandra_version")?
                }
                None => {
                    return Err(OrchestratorError::Configuration(
                        "load_generator.cassandra_version is required when scylla_tools is false"
                            .to_string(),
                    ))
                }
            }
        }
        Ok(())
    }
}

/// 服务就绪等待配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadinessConfig {
    /// 数据库客户端端口
    pub port: u16,
    pub timeout_seconds: f64,
    pub connect_timeout_seconds: f64,
    pub max_tries_per_second: f64,
    pub feedback_interval_seconds: f64,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            port: 9042,
            timeout_seconds: 7200.0,
            connect_timeout_seconds: 10.0,
            max_tries_per_second: 2.0,
            feedback_interval_seconds: 20.0,
        }
    }
}

impl ReadinessConfig {
    pub fn timeout(&self) -> OrchestratorResult<Duration> {
        seconds_to_duration(self.timeout_seconds, "readiness.timeout_seconds")
    }

    pub fn connect_timeout(&self) -> OrchestratorResult<Duration> {
        seconds_to_duration(
            self.connect_timeout_seconds,
            "readiness.connect_timeout_seconds",
        )
    }

    /// 两次失败探测之间的最小间隔：`1 / max_tries_per_second`
    pub fn backoff_interval(&self) -> OrchestratorResult<Duration> {
        ValidationUtils::validate_positive_seconds(
            self.max_tries_per_second,
            "readiness.max_tries_per_second",
        )?;
        seconds_to_duration(
            1.0 / self.max_tries_per_second,
            "readiness.max_tries_per_second",
        )
    }

    pub fn feedback_interval(&self) -> OrchestratorResult<Duration> {
        seconds_to_duration(
            self.feedback_interval_seconds,
            "readiness.feedback_interval_seconds",
        )
    }
}

impl ConfigValidator for ReadinessConfig {
    fn validate(&self) -> OrchestratorResult<()> {
        ValidationUtils::validate_port(self.port, "readiness.port")?;
        self.timeout()?;
        self.connect_timeout()?;
        self.backoff_interval()?;
        self.feedback_interval()?;
        Ok(())
    }
}

/// 把正的秒数转换为 `Duration`，超出 `Duration` 表示范围时返回配置错误
fn seconds_to_duration(seconds: f64, field_name: &str) -> OrchestratorResult<Duration> {
    ValidationUtils::validate_positive_seconds(seconds, field_name)?;
    Duration::try_from_secs_f64(seconds).map_err(|_| {
        OrchestratorError::Configuration(format!("{field_name} is out of range: {seconds}"))
    })
}

/// 压测启动节奏配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StressConfig {
    /// 除第一个压测客户端外，其余客户端的启动延迟
    pub startup_stagger_seconds: u64,
    /// 分区压测中相邻两次异步启动的间隔
    pub launch_interval_seconds: u64,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            startup_stagger_seconds: 10,
            launch_interval_seconds: 1,
        }
    }
}

impl StressConfig {
    /// 第 `index` 个目标的启动延迟
    pub fn startup_delay(&self, index: usize) -> Duration {
        if index == 0 {
            Duration::ZERO
        } else {
            Duration::from_secs(self.startup_stagger_seconds)
        }
    }

    pub fn launch_interval(&self) -> Duration {
        Duration::from_secs(self.launch_interval_seconds)
    }
}

impl ConfigValidator for StressConfig {
    fn validate(&self) -> OrchestratorResult<()> {
        Ok(())
    }
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub log_level: String,
    pub log_format: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
        }
    }
}

impl ConfigValidator for ObservabilityConfig {
    fn validate(&self) -> OrchestratorResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.as_str()) {
            return Err(OrchestratorError::Configuration(format!(
                "Invalid log level: {}. Valid options: {:?}",
                self.log_level, valid_levels
            )));
        }
        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.log_format.as_str()) {
            return Err(OrchestratorError::Configuration(format!(
                "Invalid log format: {}. Valid options: {:?}",
                self.log_format, valid_formats
            )));
        }
        Ok(())
    }
}

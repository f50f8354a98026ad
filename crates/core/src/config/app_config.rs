use std::path::Path;

use anyhow::{Context, Result};
use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

use super::sections::{
    ClusterConfig, LoadGeneratorConfig, ObservabilityConfig, ReadinessConfig, SshConfig,
    StressConfig,
};
use super::validation::ConfigValidator;
use crate::OrchestratorResult;

/// 默认的配置文件查找路径
pub const DEFAULT_CONFIG_PATHS: [&str; 3] = [
    "config/fleetbench.toml",
    "fleetbench.toml",
    "/etc/fleetbench/config.toml",
];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub ssh: SshConfig,
    pub cluster: ClusterConfig,
    pub load_generator: LoadGeneratorConfig,
    pub readiness: ReadinessConfig,
    pub stress: StressConfig,
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_path {
            if Path::new(path).exists() {
                builder = builder.add_source(File::new(path, FileFormat::Toml));
            } else {
                return Err(anyhow::anyhow!("配置文件不存在: {}", path));
            }
        } else if let Some(path) = DEFAULT_CONFIG_PATHS
            .iter()
            .find(|path| Path::new(path).exists())
        {
            builder = builder.add_source(File::new(path, FileFormat::Toml));
        }

        builder = builder.add_source(
            Environment::with_prefix("FLEETBENCH")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("ssh.options")
                .with_list_parse_key("cluster.public_ips")
                .with_list_parse_key("cluster.private_ips")
                .with_list_parse_key("cluster.data_dirs")
                .with_list_parse_key("load_generator.public_ips"),
        );

        let config: AppConfig = builder
            .build()
            .context("构建配置失败")?
            .try_deserialize()
            .context("反序列化配置失败")?;

        config.validate().context("配置校验失败")?;

        Ok(config)
    }

    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(toml_str).context("解析TOML配置失败")?;
        config.validate().context("配置校验失败")?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("序列化配置为TOML失败")
    }
}

impl ConfigValidator for AppConfig {
    fn validate(&self) -> OrchestratorResult<()> {
        self.ssh.validate()?;
        self.cluster.validate()?;
        self.load_generator.validate()?;
        self.readiness.validate()?;
        self.stress.validate()?;
        self.observability.validate()?;
        Ok(())
    }
}

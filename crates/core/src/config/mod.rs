//! 配置管理
//!
//! 配置来源按优先级从低到高：
//!
//! 1. 各配置段的默认值
//! 2. TOML配置文件（显式指定，或按默认路径查找）
//! 3. `FLEETBENCH_` 前缀的环境变量，段与字段之间用 `__` 分隔，
//!    例如 `FLEETBENCH_SSH__CLUSTER_USER=centos`
//!
//! 加载完成后会执行 [`ConfigValidator::validate`]。

pub mod app_config;
pub mod sections;
pub mod validation;


pub use app_config::AppConfig;
pub use sections::*;
pub use validation::{ConfigValidator, ValidationUtils};

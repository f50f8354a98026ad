//! fleetbench 命令行工具的应用层
//!
//! 命令行解析、服务装配和优雅关闭。

pub mod app;
pub mod cli;
pub mod shutdown;

pub use app::{AppCommand, Application, ClusterAction, StressAction};
pub use shutdown::ShutdownManager;

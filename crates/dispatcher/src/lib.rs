//! 并行编排基础设施
//!
//! - [`partition`] - 确定性的键区间分片
//! - [`readiness`] - 服务端口就绪轮询
//! - [`task_handle`] - 单次与循环后台任务句柄
//! - [`fan_out`] - 多目标并行执行与结果汇总

pub mod fan_out;
pub mod partition;
pub mod readiness;
pub mod task_handle;


pub use fan_out::FanOutExecutor;
pub use partition::{plan, population_ranges, split_count};
pub use readiness::{IntoTargets, ReadinessPoller, TcpProbe};
pub use task_handle::{AsyncTask, RepeatingHandle, RepeatingTask, TaskHandle};

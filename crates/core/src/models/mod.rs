//! # 数据模型
//!
//! 定义批量运维编排的核心数据结构。
//!
//! ## 核心模型
//!
//! ### Target - 目标机器
//! 一台远程机器的地址和角色（集群节点或压测客户端），运行开始后不可变。
//!
//! ### WorkItem / ExecutionResult / RunReport
//! 并行执行的输入和输出：每个工作单元恰好产生一个执行结果，
//! 汇总报告的长度总是等于工作单元数量。
//!
//! ### KeyRange / PopulationRange
//! 分片规划的输出，连续、无空洞、无重叠。
//!
//! ### RemoteCommand
//! 类型化的远程命令，在会话边界才转换为shell字符串。
//!
//! ## 状态流转
//!
//! ```text
//! 单次任务:  Pending → Running → Completed | Failed
//! 循环任务:  Running → Cancelled
//! ```

pub mod command;
pub mod range;
pub mod target;
pub mod task_state;
pub mod work_item;

pub use command::*;
pub use range::*;
pub use target::*;
pub use task_state::*;
pub use work_item::*;

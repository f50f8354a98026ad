//! 后台任务句柄
//!
//! [`AsyncTask`] 把一次调用放到后台执行，返回可以多次 `join` 的 [`TaskHandle`]；
//! [`RepeatingTask`] 反复执行同一个调用，直到所有者通过 [`RepeatingHandle::cancel`]
//! 设置取消标志。取消是协作式的：只在两次迭代之间检查，不会中断正在执行的迭代。

use std::any::Any;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use fleetbench_core::{OrchestratorError, OrchestratorResult, TaskState};
use tokio::sync::{watch, Mutex, OnceCell};
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, info, warn, Instrument};

/// 单次后台任务
pub struct AsyncTask;

impl AsyncTask {
    /// 在后台启动一次调用
    pub fn spawn<A, T, F, Fut>(name: impl Into<String>, f: F, args: A) -> TaskHandle<T>
    where
        A: Send + 'static,
        T: Send + 'static,
        F: FnOnce(A) -> Fut + Send + 'static,
        Fut: Future<Output = OrchestratorResult<T>> + Send + 'static,
    {
        let name = name.into();
        let state = Arc::new(watch::Sender::new(TaskState::Pending));
        let task_state = state.clone();
        let span = tracing::debug_span!("async_task", task = %name);

        let join = tokio::spawn(
            async move {
                task_state.send_replace(TaskState::Running);
                let outcome = f(args).await;
                task_state.send_replace(if outcome.is_ok() {
                    TaskState::Completed
                } else {
                    TaskState::Failed
                });
                outcome
            }
            .instrument(span),
        );

        TaskHandle {
            name,
            join: Mutex::new(Some(join)),
            outcome: OnceCell::new(),
            state,
        }
    }
}

/// 单次后台任务的句柄
///
/// 后台调用只执行一次；`join` 可以调用多次，每次都得到同一个结果。
pub struct TaskHandle<T> {
    name: String,
    join: Mutex<Option<JoinHandle<OrchestratorResult<T>>>>,
    outcome: OnceCell<OrchestratorResult<T>>,
    state: Arc<watch::Sender<TaskState>>,
}

impl<T> TaskHandle<T> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> TaskState {
        *self.state.borrow()
    }

    pub fn is_finished(&self) -> bool {
        self.state().is_terminal()
    }
}

impl<T: Clone> TaskHandle<T> {
    /// 等待后台调用完成并返回其结果
    ///
    /// 后台调用失败时返回同样的错误；调用发生panic时返回 `TaskPanicked`。
    /// 中途放弃的 `join` 不影响之后的调用：句柄只在任务结束后才被取出。
    pub async fn join(&self) -> OrchestratorResult<T> {
        self.outcome
            .get_or_init(|| async {
                let mut guard = self.join.lock().await;
                let outcome = match guard.as_mut() {
                    Some(handle) => match handle.await {
                        Ok(outcome) => outcome,
                        Err(e) => {
                            self.state.send_replace(TaskState::Failed);
                            Err(join_error(&self.name, e))
                        }
                    },
                    None => Err(OrchestratorError::Internal(format!(
                        "任务 {} 的句柄已被取走",
                        self.name
                    ))),
                };
                *guard = None;
                outcome
            })
            .await
            .clone()
    }
}

/// 循环后台任务
pub struct RepeatingTask;

impl RepeatingTask {
    /// 在后台反复执行同一个调用，直到被取消
    ///
    /// 单次迭代的失败只记录警告，不会终止循环，也不会传播给所有者。
    pub fn spawn<A, F, Fut>(name: impl Into<String>, f: F, args: A) -> RepeatingHandle
    where
        A: Clone + Send + 'static,
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = OrchestratorResult<()>> + Send + 'static,
    {
        let name = name.into();
        let cancelled = Arc::new(AtomicBool::new(false));
        let iterations = Arc::new(AtomicU64::new(0));
        let state = Arc::new(watch::Sender::new(TaskState::Running));
        let span = tracing::info_span!("repeating_task", task = %name);

        let loop_cancelled = cancelled.clone();
        let loop_iterations = iterations.clone();
        let loop_state = state.clone();
        let join = tokio::spawn(
            async move {
                while !loop_cancelled.load(Ordering::SeqCst) {
                    let iteration = loop_iterations.load(Ordering::SeqCst) + 1;
                    debug!(iteration, "开始新一轮迭代");
                    if let Err(e) = f(args.clone()).await {
                        warn!(iteration, "迭代执行失败: {e}");
                    }
                    loop_iterations.store(iteration, Ordering::SeqCst);
                }
                loop_state.send_replace(TaskState::Cancelled);
                info!(
                    iterations = loop_iterations.load(Ordering::SeqCst),
                    "循环任务已取消"
                );
            }
            .instrument(span),
        );

        RepeatingHandle {
            name,
            cancelled,
            iterations,
            state,
            join: Mutex::new(Some(join)),
        }
    }
}

/// 循环后台任务的句柄
pub struct RepeatingHandle {
    name: String,
    cancelled: Arc<AtomicBool>,
    iterations: Arc<AtomicU64>,
    state: Arc<watch::Sender<TaskState>>,
    join: Mutex<Option<JoinHandle<()>>>,
}

impl RepeatingHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 设置取消标志，当前迭代结束后循环退出
    pub fn cancel(&self) {
        if !self.cancelled.swap(true, Ordering::SeqCst) {
            info!(task = %self.name, "已请求取消循环任务");
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// 已完成的迭代次数
    pub fn iterations(&self) -> u64 {
        self.iterations.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> TaskState {
        *self.state.borrow()
    }

    /// 取消并等待循环退出
    pub async fn stop(&self) -> OrchestratorResult<()> {
        self.cancel();
        let mut guard = self.join.lock().await;
        let result = match guard.as_mut() {
            Some(handle) => handle.await.map_err(|e| join_error(&self.name, e)),
            None => Ok(()),
        };
        *guard = None;
        result
    }
}

impl Drop for RepeatingHandle {
    fn drop(&mut self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }
}

pub(crate) fn join_error(name: &str, err: JoinError) -> OrchestratorError {
    if err.is_panic() {
        OrchestratorError::TaskPanicked(format!("{name}: {}", panic_message(err.into_panic())))
    } else {
        OrchestratorError::TaskPanicked(format!("{name}: 任务被中止"))
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

use std::sync::Arc;

use fleetbench_core::{OrchestratorResult, RemoteCommand, SessionFactory, Target};

/// 在一个目标上建立会话并依次执行命令，遇到第一个失败即停止
pub async fn run_commands(
    factory: Arc<dyn SessionFactory>,
    target: Target,
    commands: Vec<RemoteCommand>,
) -> OrchestratorResult<()> {
    let session = factory.connect(&target).await?;
    for command in &commands {
        session.execute(command).await?;
    }
    Ok(())
}

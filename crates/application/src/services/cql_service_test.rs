use std::sync::Arc;

use fleetbench_core::{config::ReadinessConfig, RemoteCommand, RunContext, Target};
use fleetbench_dispatcher::ReadinessPoller;
use fleetbench_testing_utils::{MockSessionFactory, ProbeScript, ScriptedProbe};

use crate::services::cql_service::CqlService;

fn create_test_service(mock: &MockSessionFactory, probe: &ScriptedProbe) -> CqlService {
    let ctx = RunContext::new("test");
    let readiness = ReadinessConfig {
        timeout_seconds: 1.0,
        connect_timeout_seconds: 0.1,
        max_tries_per_second: 20.0,
        ..ReadinessConfig::default()
    };
    let poller = ReadinessPoller::new(Arc::new(probe.clone()), readiness, &ctx);
    CqlService::new(
        Target::cluster_node("10.0.0.1"),
        poller,
        Arc::new(mock.clone()),
        &ctx,
    )
}

#[tokio::test]
async fn test_exec_writes_runs_and_removes_script() {
    let mock = MockSessionFactory::new();
    let probe = ScriptedProbe::new().script("10.0.0.1", ProbeScript::Ready);
    let service = create_test_service(&mock, &probe).with_credentials("cassandra", "secret");

    service
        .exec("CREATE KEYSPACE ks WITH replication = {'class': 'SimpleStrategy'}")
        .await
        .unwrap();

    let commands = mock.commands_for("10.0.0.1");
    assert_eq!(commands.len(), 3);
    let script = match &commands[0] {
        RemoteCommand::WriteFile { path, content } => {
            assert!(content.starts_with("CREATE KEYSPACE"));
            path.clone()
        }
        other => panic!("unexpected command {other:?}"),
    };
    assert!(script.ends_with(".cql"));
    assert_eq!(
        commands[1],
        RemoteCommand::Cqlsh {
            username: Some("cassandra".to_string()),
            password: Some("secret".to_string()),
            script: script.clone(),
        }
    );
    assert_eq!(commands[2], RemoteCommand::RemoveFile { path: script });
}

#[tokio::test]
async fn test_only_first_exec_waits_for_start() {
    let mock = MockSessionFactory::new();
    let probe = ScriptedProbe::new().script("10.0.0.1", ProbeScript::ReadyAfter(2));
    let service = create_test_service(&mock, &probe);

    service.exec("SELECT now() FROM system.local").await.unwrap();
    service.exec("SELECT now() FROM system.local").await.unwrap();

    assert_eq!(probe.attempts("10.0.0.1"), 2);
    let commands = mock.commands_for("10.0.0.1");
    assert_eq!(commands.len(), 6);
    // 两次执行使用不同的脚本名
    assert_ne!(commands[0], commands[3]);
}

#[tokio::test]
async fn test_failed_statement_still_removes_script() {
    let probe = ScriptedProbe::new().script("10.0.0.1", ProbeScript::Ready);
    let mock = MockSessionFactory::new().fail_kind("10.0.0.1", "cqlsh");
    let service = create_test_service(&mock, &probe);

    let err = service.exec("DROP TABLE missing").await.unwrap_err();

    assert_eq!(err.failed_targets(), vec!["10.0.0.1"]);
    let commands = mock.commands_for("10.0.0.1");
    assert_eq!(commands.len(), 3);
    assert!(matches!(commands[2], RemoteCommand::RemoveFile { .. }));
}

#[tokio::test]
async fn test_exec_fails_when_node_never_starts() {
    let mock = MockSessionFactory::new();
    let probe = ScriptedProbe::new();
    let service = create_test_service(&mock, &probe);

    let err = service.exec("SELECT 1").await.unwrap_err();

    assert_eq!(err.failed_targets(), vec!["10.0.0.1"]);
    assert!(mock.calls().is_empty());
}

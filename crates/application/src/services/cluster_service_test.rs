use std::sync::Arc;
use std::time::Duration;

use fleetbench_core::{
    config::{ClusterConfig, ReadinessConfig},
    OrchestratorError, RemoteCommand, RunContext, ServiceAction,
};
use fleetbench_dispatcher::ReadinessPoller;
use fleetbench_testing_utils::{MockSessionFactory, ProbeScript, ScriptedProbe};

use crate::services::cluster_service::ClusterService;

fn cluster_config() -> ClusterConfig {
    ClusterConfig {
        public_ips: vec!["10.0.0.1".to_string(), "10.0.0.2".to_string()],
        private_ips: vec!["172.16.0.1".to_string(), "172.16.0.2".to_string()],
        ..ClusterConfig::default()
    }
}

fn fast_readiness() -> ReadinessConfig {
    ReadinessConfig {
        timeout_seconds: 1.0,
        connect_timeout_seconds: 0.1,
        max_tries_per_second: 20.0,
        ..ReadinessConfig::default()
    }
}

fn ready_probe() -> ScriptedProbe {
    ScriptedProbe::new()
        .script("10.0.0.1", ProbeScript::Ready)
        .script("10.0.0.2", ProbeScript::Ready)
}

fn create_test_service(
    mock: &MockSessionFactory,
    probe: &ScriptedProbe,
    config: ClusterConfig,
) -> ClusterService {
    let ctx = RunContext::new("test");
    let poller = ReadinessPoller::new(Arc::new(probe.clone()), fast_readiness(), &ctx);
    ClusterService::new(config, poller, Arc::new(mock.clone()), &ctx)
}

fn stop() -> RemoteCommand {
    RemoteCommand::service(ServiceAction::Stop, "scylla-server")
}

fn start() -> RemoteCommand {
    RemoteCommand::service(ServiceAction::Start, "scylla-server")
}

fn wipe() -> Vec<RemoteCommand> {
    vec![
        RemoteCommand::clear_directory("/var/lib/scylla/data"),
        RemoteCommand::clear_directory("/var/lib/scylla/commitlog"),
    ]
}

fn yaml(key: &str, value: &str) -> RemoteCommand {
    RemoteCommand::SetYamlProperty {
        path: "/etc/scylla/scylla.yaml".to_string(),
        key: key.to_string(),
        value: value.to_string(),
    }
}

#[tokio::test]
async fn test_install_waits_then_rewrites_configuration() {
    let mock = MockSessionFactory::new();
    let probe = ready_probe();
    let mut config = cluster_config();
    config.password_authenticator = true;
    let service = create_test_service(&mock, &probe, config);

    service.install().await.unwrap();

    let mut expected = vec![stop()];
    expected.extend(wipe());
    expected.push(RemoteCommand::SetSeeds {
        path: "/etc/scylla/scylla.yaml".to_string(),
        seeds: "172.16.0.1".to_string(),
    });
    expected.push(yaml("authenticator", "PasswordAuthenticator"));
    expected.push(yaml("cluster_name", "cluster-sso"));
    expected.push(yaml("compaction_static_shares", "100"));
    expected.push(yaml("compaction_enforce_min_threshold", "true"));

    assert_eq!(mock.commands_for("10.0.0.1"), expected);
    assert_eq!(mock.commands_for("10.0.0.2"), expected);
    assert_eq!(probe.attempts("10.0.0.1"), 1);
    assert_eq!(probe.attempts("10.0.0.2"), 1);
}

#[tokio::test]
async fn test_install_uses_explicit_seed() {
    let mock = MockSessionFactory::new();
    let mut config = cluster_config();
    config.seed_private_ip = Some("172.16.0.9".to_string());
    let service = create_test_service(&mock, &ready_probe(), config);

    service.install().await.unwrap();

    assert!(mock.commands_for("10.0.0.2").contains(&RemoteCommand::SetSeeds {
        path: "/etc/scylla/scylla.yaml".to_string(),
        seeds: "172.16.0.9".to_string(),
    }));
    assert!(!mock
        .commands_for("10.0.0.2")
        .contains(&yaml("authenticator", "PasswordAuthenticator")));
}

#[tokio::test]
async fn test_install_without_seed_is_rejected() {
    let mock = MockSessionFactory::new();
    let mut config = cluster_config();
    config.private_ips.clear();
    let service = create_test_service(&mock, &ready_probe(), config);

    let err = service.install().await.unwrap_err();

    assert!(matches!(err, OrchestratorError::Configuration(_)));
    assert!(mock.calls().is_empty());
}

#[tokio::test]
async fn test_install_skips_node_that_never_boots() {
    let mock = MockSessionFactory::new();
    let probe = ScriptedProbe::new().script("10.0.0.1", ProbeScript::Ready);
    let service = create_test_service(&mock, &probe, cluster_config());

    let err = service.install().await.unwrap_err();

    assert_eq!(err.failed_targets(), vec!["10.0.0.2"]);
    assert!(mock.commands_for("10.0.0.2").is_empty());
    assert_eq!(mock.commands_for("10.0.0.1")[0], stop());
}

#[tokio::test]
async fn test_start_gates_on_readiness() {
    let mock = MockSessionFactory::new();
    let probe = ScriptedProbe::new()
        .script("10.0.0.1", ProbeScript::Ready)
        .script("10.0.0.2", ProbeScript::ReadyAfter(3));
    let service = create_test_service(&mock, &probe, cluster_config());

    service.start().await.unwrap();

    assert_eq!(mock.targets_for(&start()).len(), 2);
    assert_eq!(probe.attempts("10.0.0.2"), 3);
}

#[tokio::test]
async fn test_start_times_out() {
    let mock = MockSessionFactory::new();
    let probe = ScriptedProbe::new().script("10.0.0.1", ProbeScript::Ready);
    let service = create_test_service(&mock, &probe, cluster_config());

    let err = service.start().await.unwrap_err();
    assert!(matches!(err, OrchestratorError::ReadinessTimeout { .. }));
    assert_eq!(err.failed_targets(), vec!["10.0.0.2"]);
}

#[tokio::test]
async fn test_append_configuration() {
    let mock = MockSessionFactory::new();
    let service = create_test_service(&mock, &ready_probe(), cluster_config());

    service
        .append_configuration("enable_sstables_md_format: true")
        .await
        .unwrap();

    let expected = RemoteCommand::AppendLine {
        path: "/etc/scylla/scylla.yaml".to_string(),
        line: "enable_sstables_md_format: true".to_string(),
    };
    assert_eq!(mock.targets_for(&expected).len(), 2);
}

#[tokio::test]
async fn test_nodetool_single_and_all() {
    let mock = MockSessionFactory::new();
    let service = create_test_service(&mock, &ready_probe(), cluster_config());

    service.nodetool("compact ks", Some(1)).await.unwrap();
    assert_eq!(
        mock.commands_for("10.0.0.2"),
        vec![RemoteCommand::Nodetool {
            args: vec!["compact".to_string(), "ks".to_string()]
        }]
    );
    assert!(mock.commands_for("10.0.0.1").is_empty());

    service.nodetool("flush", None).await.unwrap();
    assert_eq!(mock.targets_for(&RemoteCommand::nodetool("flush")).len(), 2);

    let err = service.nodetool("flush", Some(5)).await.unwrap_err();
    assert!(matches!(err, OrchestratorError::InvalidArgument(_)));
}

#[tokio::test]
async fn test_stop_single_node_with_erase() {
    let mock = MockSessionFactory::new();
    let service = create_test_service(&mock, &ready_probe(), cluster_config());

    service.stop(Some(0), true).await.unwrap();

    let mut expected = vec![RemoteCommand::nodetool("drain"), stop()];
    expected.extend(wipe());
    assert_eq!(mock.commands_for("10.0.0.1"), expected);
    assert!(mock.commands_for("10.0.0.2").is_empty());
}

#[tokio::test]
async fn test_stop_all_nodes() {
    let mock = MockSessionFactory::new();
    let service = create_test_service(&mock, &ready_probe(), cluster_config());

    service.stop(None, false).await.unwrap();

    for address in ["10.0.0.1", "10.0.0.2"] {
        assert_eq!(
            mock.commands_for(address),
            vec![RemoteCommand::nodetool("drain"), stop()]
        );
    }
}

#[tokio::test]
async fn test_clear_runs_steps_across_fleet() {
    let mock = MockSessionFactory::new();
    let service = create_test_service(&mock, &ready_probe(), cluster_config());

    service.clear(Duration::ZERO).await.unwrap();

    let mut expected = vec![stop()];
    expected.extend(wipe());
    expected.push(start());
    assert_eq!(mock.commands_for("10.0.0.1"), expected);

    // 每一步在所有节点上完成后才开始下一步
    let order: Vec<RemoteCommand> = mock
        .calls()
        .into_iter()
        .filter_map(|c| match c.request {
            fleetbench_testing_utils::SessionRequest::Execute(cmd) => Some(cmd),
            _ => None,
        })
        .collect();
    assert_eq!(&order[..2], &[stop(), stop()]);
    assert_eq!(&order[order.len() - 2..], &[start(), start()]);
}

#[tokio::test]
async fn test_stop_step_failure_still_attempts_every_node() {
    let mock = MockSessionFactory::new().fail_command("10.0.0.1", stop());
    let service = create_test_service(&mock, &ready_probe(), cluster_config());

    let err = service.clear(Duration::ZERO).await.unwrap_err();

    assert_eq!(err.failed_targets(), vec!["10.0.0.1"]);
    assert_eq!(mock.targets_for(&stop()).len(), 2);
    // 失败的步骤之后不再继续
    assert!(mock.targets_for(&start()).is_empty());
}

#[tokio::test]
async fn test_restart_drains_first() {
    let mock = MockSessionFactory::new();
    let service = create_test_service(&mock, &ready_probe(), cluster_config());

    service.restart(Duration::ZERO).await.unwrap();

    assert_eq!(
        mock.commands_for("10.0.0.2"),
        vec![
            RemoteCommand::nodetool("drain"),
            RemoteCommand::service(ServiceAction::Restart, "scylla-server"),
        ]
    );
}

#[tokio::test]
async fn test_fleet_operations_on_selected_nodes() {
    let mock = MockSessionFactory::new();
    let service = create_test_service(&mock, &ready_probe(), cluster_config());
    let selected = vec!["10.0.0.7".to_string()];

    service.stop_nodes(&selected).await.unwrap();
    service.remove_data(&selected).await.unwrap();
    service.start_nodes(&selected).await.unwrap();

    let mut expected = vec![RemoteCommand::nodetool("flush"), stop()];
    expected.extend(wipe());
    expected.push(start());
    assert_eq!(mock.commands_for("10.0.0.7"), expected);
    assert!(mock.commands_for("10.0.0.1").is_empty());
}

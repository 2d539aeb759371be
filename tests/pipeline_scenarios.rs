//! End-to-end pipeline scenarios against in-memory hosts
//!
//! These tests drive the whole pipeline (resolve, plan, provision, bridge)
//! and check the exact command stream a container host would receive.

use netlab::testing::{FakeHost, ScriptedExecutor};
use netlab::{
    command, Endpoint, NetlabError, Pipeline, PipelineOptions, ProvisionStep, Stage, Topology,
    HOST_NS,
};

/// Initialize logging for tests
fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("netlab=debug")
        .with_test_writer()
        .try_init();
}

const POINT_TO_POINT: &str = r#"
devices:
  - name: r1
  - name: r2
links:
  - name: [e0, e1]
    connection: [r1, r2]
"#;

const BACKBONE: &str = r#"
devices:
  - name: r1
  - name: r2
  - name: r3
links:
  - name: [bb]
    connection: [r1, r2, r3]
"#;

fn ep(device: &str, interface: &str, namespace: u32) -> Endpoint {
    Endpoint {
        device: device.into(),
        interface: interface.into(),
        namespace,
    }
}

#[tokio::test]
async fn test_point_to_point_end_to_end() {
    init_logging();

    let exec = ScriptedExecutor::new().with_pids(&[("r1", 100), ("r2", 200)]);
    let topology = Topology::from_yaml_str(POINT_TO_POINT).unwrap();

    let report = Pipeline::new(&exec, PipelineOptions::default())
        .run(&topology)
        .await
        .expect("pipeline should succeed");

    assert_eq!(report.veths.len(), 1);
    assert_eq!(report.veths[0].a, ep("r1", "e0-e1", 100));
    assert_eq!(report.veths[0].b, ep("r2", "e1-e0", 200));

    let issued = exec.issued();
    let provisioning = &issued[2..];
    assert_eq!(
        provisioning,
        [
            "sudo ip link add e0-e1 type veth peer name e1-e0",
            "sudo ip link set e0-e1 netns 100",
            "sudo ip link set e1-e0 netns 200",
            "sudo nsenter -t 100 -n ip link set e0-e1 up && sudo nsenter -t 200 -n ip link set e1-e0 up",
        ]
    );
    assert!(
        !issued.iter().any(|c| c.contains("bridge") || c.contains("master")),
        "no bridge commands expected: {issued:#?}"
    );
    assert_eq!(report.bridge.bridge, None);
    assert_eq!(report.trail.len(), issued.len());
}

#[tokio::test]
async fn test_backbone_end_to_end() {
    init_logging();

    let exec = ScriptedExecutor::new().with_pids(&[("r1", 11), ("r2", 22), ("r3", 33)]);
    let topology = Topology::from_yaml_str(BACKBONE).unwrap();

    let report = Pipeline::new(&exec, PipelineOptions::default())
        .run(&topology)
        .await
        .unwrap();

    assert_eq!(report.veths.len(), 3);
    assert!(report.veths.iter().all(|v| v.b.namespace == HOST_NS));

    let issued = exec.issued();
    let creates = issued.iter().filter(|c| c.ends_with("type bridge")).count();
    let ups = issued.iter().filter(|c| *c == "sudo ip link set backbone up").count();
    let attaches: Vec<&String> = issued.iter().filter(|c| c.ends_with("master backbone")).collect();
    assert_eq!(creates, 1);
    assert_eq!(ups, 1);
    assert_eq!(
        attaches,
        [
            "sudo ip link set bb-r1 master backbone",
            "sudo ip link set bb-r2 master backbone",
            "sudo ip link set bb-r3 master backbone",
        ]
    );

    // Bridge commands come after every veth command.
    let last_veth = issued.iter().rposition(|c| c.contains(" up && ")).unwrap();
    let bridge_create = issued.iter().position(|c| c.ends_with("type bridge")).unwrap();
    assert!(last_veth < bridge_create);

    // 3 lookups, 3 commands per backbone pair (host side is never moved), 5 bridge commands.
    assert_eq!(issued.len(), 3 + 9 + 5);
}

#[tokio::test]
async fn test_resolution_failure_issues_no_veth_commands() {
    init_logging();

    let exec = ScriptedExecutor::new()
        .with_pids(&[("r1", 11), ("r3", 33)])
        .fail(command::container_pid("r2"), "Error: No such object: r2\n");
    let topology = Topology::from_yaml_str(BACKBONE).unwrap();

    let failure = Pipeline::new(&exec, PipelineOptions::default())
        .run(&topology)
        .await
        .unwrap_err();

    assert!(matches!(failure.error, NetlabError::Resolution(_)));
    assert_eq!(
        exec.issued(),
        vec![command::container_pid("r1"), command::container_pid("r2")]
    );
}

#[tokio::test]
async fn test_rerun_fails_on_existing_veth() {
    init_logging();

    let host = FakeHost::new(&[("r1", 100), ("r2", 200)]);
    let topology = Topology::from_yaml_str(POINT_TO_POINT).unwrap();

    Pipeline::new(&host, PipelineOptions::default())
        .run(&topology)
        .await
        .expect("first run provisions the link");
    assert!(host.has_link("e0-e1"));

    let failure = Pipeline::new(&host, PipelineOptions::default())
        .run(&topology)
        .await
        .expect_err("second run must not silently succeed");

    assert_eq!(failure.failed_at, Stage::VethsProvisioned);
    assert_eq!(failure.reached, Stage::Planned);
    match failure.error {
        NetlabError::Provision(err) => {
            assert_eq!(err.index, 0);
            assert_eq!(err.step, ProvisionStep::Create);
            assert_eq!(err.command(), "sudo ip link add e0-e1 type veth peer name e1-e0");
            assert_eq!(err.output(), "RTNETLINK answers: File exists");
        }
        other => panic!("expected provision error, got {other}"),
    }
    // Only the namespace lookups of the second run succeeded.
    assert_eq!(failure.trail.len(), 2);
}

#[tokio::test]
async fn test_rerun_backbone_fails_before_bridge() {
    init_logging();

    let host = FakeHost::new(&[("r1", 11), ("r2", 22), ("r3", 33)]);
    let topology = Topology::from_yaml_str(BACKBONE).unwrap();

    Pipeline::new(&host, PipelineOptions::default())
        .run(&topology)
        .await
        .unwrap();
    assert!(host.has_link("backbone"));
    let first_run = host.issued().len();

    let failure = Pipeline::new(&host, PipelineOptions::default())
        .run(&topology)
        .await
        .unwrap_err();
    assert!(matches!(failure.error, NetlabError::Provision(_)));

    let second_run = &host.issued()[first_run..];
    assert!(!second_run.iter().any(|c| c.contains("type bridge")));
}

#[tokio::test]
async fn test_short_link_is_plan_error() {
    init_logging();

    let exec = ScriptedExecutor::new().with_pids(&[("r1", 100)]);
    let topology =
        Topology::from_yaml_str("devices: [{name: r1}]\nlinks:\n  - {name: [e0], connection: [r1]}\n")
            .unwrap();

    let failure = Pipeline::new(&exec, PipelineOptions::default())
        .run(&topology)
        .await
        .unwrap_err();

    assert_eq!(failure.failed_at, Stage::Planned);
    assert_eq!(failure.reached, Stage::NamespacesResolved);
    assert!(matches!(failure.error, NetlabError::Plan(_)));
    assert!(exec.issued().iter().all(|c| c.starts_with("docker inspect")));
}

#[tokio::test]
async fn test_mixed_topology_with_concurrency() {
    init_logging();

    let topology = Topology::from_yaml_str(
        r#"
devices: [{name: a}, {name: b}, {name: c}, {name: d}]
links:
  - {name: [ab, ba], connection: [a, b]}
  - {name: [cd, dc], connection: [c, d]}
  - {name: [lan], connection: [a, b, c, d]}
"#,
    )
    .unwrap();
    let host = FakeHost::new(&[("a", 1), ("b", 2), ("c", 3), ("d", 4)]);
    let options = PipelineOptions {
        concurrency: 4,
        ..PipelineOptions::default()
    };

    let report = Pipeline::new(&host, options).run(&topology).await.unwrap();

    assert_eq!(report.veths.len(), 6);
    assert_eq!(report.bridge.ports, vec!["lan-a", "lan-b", "lan-c", "lan-d"]);
    for name in ["ab-ba", "ba-ab", "cd-dc", "a-lan", "lan-d", "backbone"] {
        assert!(host.has_link(name), "{name} missing");
    }
    // Attach commands keep plan order even with concurrent provisioning.
    let attaches: Vec<String> = host
        .issued()
        .into_iter()
        .filter(|c| c.ends_with("master backbone"))
        .collect();
    assert_eq!(attaches.len(), 4);
    assert!(attaches[0].contains("lan-a") && attaches[3].contains("lan-d"));
}

#[tokio::test]
async fn test_load_and_run_from_file() {
    init_logging();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("topology.yaml");
    std::fs::write(&path, POINT_TO_POINT).unwrap();

    let exec = ScriptedExecutor::new().with_pids(&[("r1", 100), ("r2", 200)]);
    let report = Pipeline::new(&exec, PipelineOptions::default())
        .load_and_run(&path)
        .await
        .unwrap();
    assert_eq!(report.namespaces.get("r2"), Some(200));
    assert_eq!(report.trail.len(), 6);
}

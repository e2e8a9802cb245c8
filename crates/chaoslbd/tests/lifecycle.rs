//! Agent lifecycle tests.
//!
//! Drive the whole agent (setup, monitor, metrics endpoint, teardown)
//! against the in-process host simulation.

use std::io::Write;
use std::net::TcpListener as StdListener;
use std::sync::Arc;
use std::time::Duration;

use chaoslb_core::Topology;
use chaoslb_host::FakeHost;
use chaoslbd::{AgentOptions, run_agent};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::oneshot;

fn free_port() -> u16 {
    let listener = StdListener::bind("0.0.0.0:0").unwrap();
    listener.local_addr().unwrap().port()
}

fn topology_yaml(metrics_port: u16, backend_port: u16) -> String {
    format!(
        "\
services:
  - vip: 10.0.0.1
    local_port: 80
    business: web
    backends:
      - ip: 127.0.0.1
        port: {backend_port}
        weight: 0
  - vip: 10.0.0.2
    local_port: 53
    protocol: udp
    interface: ipvs1
    backends:
      - ip: 127.0.0.1
        port: {backend_port}
        weight: 4
metrics_port: {metrics_port}
"
    )
}

fn load(yaml: &str) -> Topology {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(yaml.as_bytes()).unwrap();
    Topology::load(file.path()).unwrap()
}

fn options() -> AgentOptions {
    AgentOptions {
        monitor_interval: Duration::from_millis(50),
        rollback_on_failure: false,
    }
}

async fn scrape(port: u16) -> String {
    let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    stream
        .write_all(b"GET /metrics HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();
    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();
    response
}

async fn wait_for_endpoint(port: u16) {
    for _ in 0..100 {
        if TcpStream::connect(("127.0.0.1", port)).await.is_ok() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("metrics endpoint never came up on port {port}");
}

#[tokio::test]
async fn setup_serve_and_teardown() {
    let metrics_port = free_port();
    let backend_port = free_port();
    let topology = load(&topology_yaml(metrics_port, backend_port));

    let host = FakeHost::new();
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let agent = tokio::spawn(run_agent(topology, Arc::new(host.clone()), options(), async move {
        let _ = stop_rx.await;
    }));

    wait_for_endpoint(metrics_port).await;
    assert!(host.has_interface("ipvs0"));
    assert!(host.has_interface("ipvs1"));
    assert!(host.has_service("10.0.0.1:80"));
    assert_eq!(host.real_server_weight("10.0.0.1:80", &format!("127.0.0.1:{backend_port}")), Some(1));
    assert_eq!(host.sysctl("net.ipv4.ip_forward").as_deref(), Some("1"));

    // Let the monitor tick at least once.
    tokio::time::sleep(Duration::from_millis(200)).await;
    let response = scrape(metrics_port).await;
    assert!(response.starts_with("HTTP/1.1 200"));
    assert!(response.contains("text/plain; version=0.0.4"));
    assert!(response.contains("ipvs_vip_status{vip=\"10.0.0.1\",interface=\"ipvs0\",business=\"web\"} 1"));
    assert!(response.contains("ipvs_sysctl_status{parameter=\"net.ipv4.vs.conntrack\"} 1"));
    // Nothing listens on the backend port, so the monitor marks it down.
    assert!(response.contains(&format!(
        "ipvs_backend_status{{vip=\"10.0.0.1:80\",backend=\"127.0.0.1:{backend_port}\",business=\"web\"}} 0"
    )));
    assert!(host.count(&["ipvsadm", "-Ln"]) >= 1);

    stop_tx.send(()).unwrap();
    let report = tokio::time::timeout(Duration::from_secs(5), agent)
        .await
        .unwrap()
        .unwrap()
        .unwrap();

    assert!(report.restored.iter().all(|(_, o)| o.is_success()));
    assert_eq!(report.restored.len(), 2);
    assert!(!host.has_interface("ipvs0"));
    assert!(!host.has_interface("ipvs1"));
    assert!(!host.has_service("10.0.0.1:80"));
    assert!(!host.has_service("10.0.0.2:53"));
    assert_eq!(host.nat_rule_count(), 0);
    assert_eq!(host.sysctl("net.ipv4.ip_forward").as_deref(), Some("0"));
    assert_eq!(host.sysctl("net.ipv4.vs.conntrack").as_deref(), Some("0"));

    // The endpoint is gone once the agent returns.
    assert!(TcpStream::connect(("127.0.0.1", metrics_port)).await.is_err());
}

#[tokio::test]
async fn teardown_runs_exactly_once() {
    let metrics_port = free_port();
    let topology = load(&topology_yaml(metrics_port, free_port()));

    let host = FakeHost::new();
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let agent = tokio::spawn(run_agent(topology, Arc::new(host.clone()), options(), async move {
        let _ = stop_rx.await;
    }));
    wait_for_endpoint(metrics_port).await;

    stop_tx.send(()).unwrap();
    tokio::time::timeout(Duration::from_secs(5), agent)
        .await
        .unwrap()
        .unwrap()
        .unwrap();

    assert_eq!(host.count(&["ipvsadm", "-D"]), 2);
    assert_eq!(host.count(&["ip", "link", "del"]), 2);
    assert_eq!(host.count(&["sysctl", "-w", "net.ipv4.ip_forward=0"]), 1);
}

#[tokio::test]
async fn occupied_metrics_port_aborts_before_setup() {
    let held = StdListener::bind("0.0.0.0:0").unwrap();
    let metrics_port = held.local_addr().unwrap().port();
    let topology = load(&topology_yaml(metrics_port, free_port()));

    let host = FakeHost::new();
    let err = run_agent(topology, Arc::new(host.clone()), options(), std::future::pending())
        .await
        .unwrap_err();

    assert!(err.to_string().contains(&metrics_port.to_string()));
    assert!(host.invocations().is_empty());
}

#[tokio::test]
async fn failed_setup_leaves_host_unless_rollback_requested() {
    let topology = load(&topology_yaml(free_port(), free_port()));
    let host = FakeHost::new();
    host.fail_on(&["ipvsadm", "-A", "-u"]);

    let err = run_agent(topology.clone(), Arc::new(host.clone()), options(), std::future::pending())
        .await
        .unwrap_err();
    assert!(format!("{err:#}").contains("10.0.0.2:53"));
    // Without rollback the first service stays in place.
    assert!(host.has_service("10.0.0.1:80"));
    assert_eq!(host.count(&["ipvsadm", "-D"]), 0);

    let host = FakeHost::new();
    host.fail_on(&["ipvsadm", "-A", "-u"]);
    let rollback = AgentOptions {
        rollback_on_failure: true,
        ..options()
    };
    run_agent(topology, Arc::new(host.clone()), rollback, std::future::pending())
        .await
        .unwrap_err();

    assert!(!host.has_service("10.0.0.1:80"));
    assert!(!host.has_interface("ipvs0"));
    assert!(!host.has_interface("ipvs1"));
    assert_eq!(host.sysctl("net.ipv4.ip_forward").as_deref(), Some("0"));
}


use std::time::Duration;

use harness::{peers, Fixture, RecordingSignaler, ScriptedDiscovery, BROKER_PID};
use nats_configurator::scheduler::prepare_document;
use nats_configurator::ConfiguratorError;
use nats_configurator_reconcile::DiffPolicy;
use serde_json::json;
use tokio::sync::watch;

#[test]
fn startup_writes_identity_and_keeps_template_fields() {
    let fixture = Fixture::new(r#"{"http_port":8222,"cluster":{"port":6222,"routes":[]}}"#);

    let document = prepare_document(&fixture.template, &fixture.output, "nats-0").unwrap();

    assert_eq!(document.identity(), Some("nats-0"));
    assert_eq!(
        fixture.output_json(),
        json!({
            "server_name": "nats-0",
            "http_port": 8222,
            "cluster": {"port": 6222, "routes": []}
        })
    );
}

#[test]
fn startup_fails_on_malformed_template() {
    let fixture = Fixture::new("{\"cluster\": ");

    let err = prepare_document(&fixture.template, &fixture.output, "nats-0").unwrap_err();

    assert!(matches!(err, ConfiguratorError::ConfigLoad { .. }));
    assert!(!fixture.output.exists());
}

#[tokio::test(start_paused = true)]
async fn shutdown_before_first_tick_runs_no_cycle() {
    let fixture = Fixture::new(r#"{"cluster":{"routes":[]}}"#);
    fixture.write_pid(BROKER_PID);
    let discovery = ScriptedDiscovery::new();
    let signaler = RecordingSignaler::new();
    let scheduler = fixture.scheduler(DiffPolicy::Exact, discovery.clone(), signaler.clone());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    shutdown_tx.send(true).unwrap();

    scheduler.run(shutdown_rx).await.unwrap();

    assert_eq!(discovery.calls(), 0);
    assert!(signaler.pids().is_empty());
}

#[tokio::test(start_paused = true)]
async fn loop_ticks_on_interval_until_shutdown() {
    let fixture = Fixture::new(r#"{"cluster":{"routes":[]}}"#);
    fixture.write_pid(BROKER_PID);
    let discovery = ScriptedDiscovery::new();
    discovery.push_peers(peers(&["10.0.0.2"]));
    let signaler = RecordingSignaler::new();
    let scheduler = fixture.scheduler(DiffPolicy::Exact, discovery.clone(), signaler.clone());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(scheduler.run(shutdown_rx));

    // Ticks land at 3s and 6s.
    tokio::time::sleep(Duration::from_secs(7)).await;
    shutdown_tx.send(true).unwrap();

    handle.await.unwrap().unwrap();
    assert_eq!(discovery.calls(), 2);
    assert_eq!(signaler.pids(), vec![BROKER_PID]);
}

#[tokio::test(start_paused = true)]
async fn loop_stops_on_fatal_error() {
    let fixture = Fixture::new(r#"{"cluster":{"routes":[]}}"#);
    fixture.write_pid(BROKER_PID);
    let discovery = ScriptedDiscovery::new();
    discovery.push_peers(peers(&["10.0.0.2"]));
    let scheduler =
        fixture.scheduler(DiffPolicy::Exact, discovery, RecordingSignaler::failing());

    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    let err = scheduler.run(shutdown_rx).await.unwrap_err();

    assert_eq!(err.reason_code(), "signal_failed");
}

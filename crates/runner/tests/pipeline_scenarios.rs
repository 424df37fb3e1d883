//! End-to-end pipeline scenarios
//!
//! Each test builds a full pipeline from YAML, drives an in-memory
//! source, and asserts on what the in-memory sinks received plus the
//! bus counters.

mod helpers;

use std::time::Duration;

use helpers::{
    register_hanging_sink, register_panicking_source, register_sink, register_source,
    register_stalling_sink,
};

use weir_bus::Filter;
use weir_config::Config;
use weir_message::Message;
use weir_plugin::TypeRegistry;
use weir_runner::{Pipeline, PipelineOptions, RunnerError, StopMode};

fn build(config: &str, registry: &TypeRegistry) -> Pipeline {
    let config = Config::from_str(config).expect("config parses");
    Pipeline::build(&config, registry, PipelineOptions::default()).expect("pipeline builds")
}

// ============================================================================
// Scenario: straight wire
// ============================================================================

#[tokio::test]
async fn test_straight_wire_preserves_order() {
    let mut registry = TypeRegistry::new();
    let driver = register_source(&mut registry, "test.Source");
    let sink = register_sink(&mut registry, "test.Sink");

    let mut pipeline = build(
        r#"
- "test.Source":
    Stream: "s"
- "test.Sink":
    Stream: "s"
"#,
        &registry,
    );
    pipeline.start();

    driver.emit(&["a", "b", "c"]).await;
    let summary = pipeline.stop(StopMode::Graceful).await;

    assert_eq!(sink.snapshot(), vec!["a", "b", "c"]);
    assert_eq!(summary.dispatched, 3);
    assert_eq!(summary.delivered, 3);
    assert_eq!(summary.dropped, 0);
    // Graceful drain completeness
    assert_eq!(summary.delivered + summary.dropped, summary.dispatched);
}

// ============================================================================
// Scenario: fan-out
// ============================================================================

#[tokio::test]
async fn test_fanout_delivers_to_every_sink_in_order() {
    let mut registry = TypeRegistry::new();
    let driver = register_source(&mut registry, "test.Source");
    let first = register_sink(&mut registry, "test.SinkA");
    let second = register_sink(&mut registry, "test.SinkB");

    let mut pipeline = build(
        r#"
- "test.Source":
    Stream: "s"
- "test.SinkA":
    Stream: "s"
- "test.SinkB":
    Stream: "s"
"#,
        &registry,
    );
    pipeline.start();

    driver.emit(&["a", "b", "c"]).await;
    let summary = pipeline.stop(StopMode::Graceful).await;

    assert_eq!(first.snapshot(), vec!["a", "b", "c"]);
    assert_eq!(second.snapshot(), vec!["a", "b", "c"]);
    assert_eq!(summary.delivered, 6);
}

// ============================================================================
// Scenario: filter drop
// ============================================================================

/// Filter rejecting messages whose payload equals "b"
struct RejectB;

impl Filter for RejectB {
    fn accepts(&self, msg: &Message) -> bool {
        msg.payload() != b"b"
    }

    fn name(&self) -> &'static str {
        "test.RejectB"
    }
}

#[tokio::test]
async fn test_filter_drops_rejected_messages() {
    let mut registry = TypeRegistry::new();
    let driver = register_source(&mut registry, "test.Source");
    let sink = register_sink(&mut registry, "test.Sink");
    registry.register_filter("test.RejectB", || RejectB);

    let mut pipeline = build(
        r#"
- "stream.Route":
    Stream: "s"
    Filter: ["test.RejectB"]
- "test.Source":
    Stream: "s"
- "test.Sink":
    Stream: "s"
"#,
        &registry,
    );
    pipeline.start();

    driver.emit(&["a", "b", "c"]).await;
    let summary = pipeline.stop(StopMode::Graceful).await;

    assert_eq!(sink.snapshot(), vec!["a", "c"]);
    assert_eq!(summary.filtered, 1);
    assert_eq!(summary.dropped, 1);
    assert_eq!(summary.delivered + summary.dropped, summary.dispatched);
}

// ============================================================================
// Scenario: overflow reroute
// ============================================================================

#[tokio::test]
async fn test_overflow_reroutes_to_fallback_stream() {
    let mut registry = TypeRegistry::new();
    let driver = register_source(&mut registry, "test.Source");
    let stalled = register_stalling_sink(&mut registry, "test.Stall");
    let catcher = register_sink(&mut registry, "test.Catcher");

    let mut pipeline = build(
        r#"
- "test.Source":
    Stream: "s"
- "test.Stall":
    Stream: "s"
    Channel: 1
    DropToStream: "overflow"
- "test.Catcher":
    Stream: "overflow"
"#,
        &registry,
    );
    pipeline.start();

    driver.emit(&["x", "y", "z"]).await;
    let summary = pipeline.stop(StopMode::Graceful).await;

    // x filled the stalled channel and surfaces during its drain;
    // y and z rerouted to the overflow stream, order preserved.
    assert_eq!(stalled.snapshot(), vec!["x"]);
    assert_eq!(catcher.snapshot(), vec!["y", "z"]);
    assert_eq!(summary.rerouted, 2);
    assert_eq!(summary.dropped, 0);
}

// ============================================================================
// Scenario: fuse burn
// ============================================================================

#[tokio::test]
async fn test_fuse_burn_halts_and_activate_resumes() {
    let mut registry = TypeRegistry::new();
    let driver = register_source(&mut registry, "test.Source");
    let sink = register_sink(&mut registry, "test.Sink");

    let mut pipeline = build(
        r#"
- "test.Source":
    Stream: "s"
- "test.Sink":
    Stream: "s"
    Fuse: "db"
"#,
        &registry,
    );
    pipeline.start();

    driver.emit(&["a"]).await;

    let fuse = pipeline.fuses().get("db");
    assert!(fuse.burn());
    driver.emit(&["b", "c"]).await;

    assert!(fuse.try_activate());
    driver.emit(&["d"]).await;

    let summary = pipeline.stop(StopMode::Graceful).await;

    assert_eq!(sink.snapshot(), vec!["a", "d"]);
    // b and c had no fallback configured: dropped and counted
    assert_eq!(summary.dropped, 2);
    assert_eq!(summary.delivered, 2);
    assert_eq!(summary.delivered + summary.dropped, summary.dispatched);
}

// ============================================================================
// Scenario: graceful shutdown drain
// ============================================================================

#[tokio::test]
async fn test_graceful_stop_drains_every_message() {
    let mut registry = TypeRegistry::new();
    let driver = register_source(&mut registry, "test.Source");
    let sink = register_sink(&mut registry, "test.Sink");

    let mut pipeline = build(
        r#"
- "test.Source":
    Stream: "s"
- "test.Sink":
    Stream: "s"
"#,
        &registry,
    );
    pipeline.start();

    let payloads: Vec<String> = (0..1000).map(|i| format!("msg-{i}")).collect();
    let refs: Vec<&str> = payloads.iter().map(String::as_str).collect();
    driver.emit(&refs).await;

    let summary = pipeline.stop(StopMode::Graceful).await;

    let received = sink.snapshot();
    assert_eq!(received.len(), 1000);
    assert_eq!(received.first().map(String::as_str), Some("msg-0"));
    assert_eq!(received.last().map(String::as_str), Some("msg-999"));
    assert_eq!(summary.delivered, 1000);
    assert_eq!(summary.delivered + summary.dropped, summary.dispatched);
}

// ============================================================================
// Configuration boundaries
// ============================================================================

#[tokio::test]
async fn test_unknown_option_warns_but_starts() {
    let mut registry = TypeRegistry::new();
    let _driver = register_source(&mut registry, "test.Source");
    let _sink = register_sink(&mut registry, "test.Sink");

    let config = Config::from_str(
        r#"
- "test.Source":
    Stream: "s"
    Chanel: 16
- "test.Sink":
    Stream: "s"
"#,
    )
    .unwrap();

    // The typo ("Chanel") is a warning, never a startup failure
    assert!(Pipeline::build(&config, &registry, PipelineOptions::default()).is_ok());
}

#[tokio::test]
async fn test_reroute_cycle_fails_before_start() {
    let mut registry = TypeRegistry::new();
    let _driver = register_source(&mut registry, "test.Source");

    let config = Config::from_str(
        r#"
- "stream.Route":
    Stream: "a"
    DropToStream: "b"
- "stream.Route":
    Stream: "b"
    DropToStream: "a"
- "test.Source":
    Stream: "a"
"#,
    )
    .unwrap();

    let err = Pipeline::build(&config, &registry, PipelineOptions::default()).unwrap_err();
    assert!(matches!(err, RunnerError::Bus(_)), "{err}");
}

#[tokio::test]
async fn test_disabled_plugin_not_instantiated() {
    let mut registry = TypeRegistry::new();
    let driver = register_source(&mut registry, "test.Source");
    let sink = register_sink(&mut registry, "test.Sink");
    let disabled = register_sink(&mut registry, "test.Disabled");

    let mut pipeline = build(
        r#"
- "test.Source":
    Stream: "s"
- "test.Sink":
    Stream: "s"
- "test.Disabled":
    Enable: false
    Stream: "s"
"#,
        &registry,
    );
    pipeline.start();

    driver.emit(&["only"]).await;
    pipeline.stop(StopMode::Graceful).await;

    assert_eq!(sink.snapshot(), vec!["only"]);
    assert!(disabled.snapshot().is_empty());
}

// ============================================================================
// Shutdown boundaries
// ============================================================================

#[tokio::test]
async fn test_hard_kill_timeout_abandons_stuck_workers() {
    let mut registry = TypeRegistry::new();
    let driver = register_source(&mut registry, "test.Source");
    register_hanging_sink(&mut registry, "test.Hang");

    let config = Config::from_str(
        r#"
- "test.Source":
    Stream: "s"
- "test.Hang":
    Stream: "s"
"#,
    )
    .unwrap();

    let options = PipelineOptions {
        shutdown_timeout: Duration::from_millis(200),
        drain_grace: Duration::from_millis(10),
    };
    let mut pipeline = Pipeline::build(&config, &registry, options).unwrap();
    pipeline.start();

    driver.emit(&["stuck"]).await;

    // The hanging producer never stops; the supervisor must still
    // return once the hard-kill timeout expires.
    let stopped = tokio::time::timeout(
        Duration::from_secs(5),
        pipeline.stop(StopMode::Graceful),
    )
    .await;
    assert!(stopped.is_ok(), "stop() must not wait on stuck workers");
}

#[tokio::test]
async fn test_consumer_panic_triggers_shutdown() {
    let mut registry = TypeRegistry::new();
    register_panicking_source(&mut registry, "test.Boom");
    let sink = register_sink(&mut registry, "test.Sink");

    let config = Config::from_str(
        r#"
- "test.Boom":
    Stream: "s"
- "test.Sink":
    Stream: "s"
"#,
    )
    .unwrap();

    let options = PipelineOptions {
        shutdown_timeout: Duration::from_secs(2),
        drain_grace: Duration::from_millis(10),
    };
    let pipeline = Pipeline::build(&config, &registry, options).unwrap();

    // run() reacts to the panic-triggered shutdown request and returns
    let summary = tokio::time::timeout(Duration::from_secs(5), pipeline.run())
        .await
        .expect("consumer panic must shut the pipeline down");

    assert_eq!(summary.dispatched, 0);
    assert!(sink.snapshot().is_empty());
}

// ============================================================================
// Shutdown from inside the pipeline
// ============================================================================

#[tokio::test]
async fn test_plugin_shutdown_request_reaches_supervisor() {
    let mut registry = TypeRegistry::new();
    let _driver = register_source(&mut registry, "test.Source");

    let mut pipeline = build(
        r#"
- "test.Source":
    Stream: "s"
"#,
        &registry,
    );
    let handle = pipeline.shutdown_handle();
    pipeline.start();

    handle.request();

    // run() would react to the request; here we verify the channel is
    // observable and the pipeline still stops cleanly afterwards.
    let summary = pipeline.stop(StopMode::Graceful).await;
    assert_eq!(summary.dispatched, 0);
}

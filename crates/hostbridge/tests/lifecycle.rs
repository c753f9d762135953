//! Coordinator lifecycle: startup, live endpoint moves, reload and shutdown.

use std::io::Write as _;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use hostbridge::config::{ConfigError, ShutdownPolicy};
use hostbridge::core::{CapabilitySet, DiscoveryError};
use hostbridge::prelude::*;
use hostbridge::{Stage, UpdateError};
use http::{Method, StatusCode};
use serde_json::json;

struct Cam;

impl HandlerModule for Cam {
    fn name(&self) -> &str {
        "cam"
    }

    fn load(&self, _ctx: &ModuleContext) -> Result<Vec<HandlerDescriptor>, DiscoveryError> {
        Ok(vec![
            HandlerDescriptor::builder(
                Category::Manufacture,
                "listSetups",
                FnHandler::new(|_req| Ok(json!(["roughing", "finishing"]))),
            )
            .method(Method::GET)
            .endpoint(EndpointKey::new(Category::Manufacture, "cam", "listSetups"))
            .host_thread()
            .build(),
            HandlerDescriptor::builder(
                Category::Manufacture,
                "getSetup",
                FnHandler::new(|req| {
                    Ok(json!({
                        "id": req.require_param("id")?,
                        "machine": req.module_config["machine"],
                    }))
                }),
            )
            .method(Method::GET)
            .endpoint(EndpointKey::new(Category::Manufacture, "cam", "getSetup"))
            .host_thread()
            .build(),
        ])
    }
}

struct Geometry;

impl HandlerModule for Geometry {
    fn name(&self) -> &str {
        "geometry"
    }

    fn load(&self, _ctx: &ModuleContext) -> Result<Vec<HandlerDescriptor>, DiscoveryError> {
        Ok(vec![HandlerDescriptor::builder(
            Category::Design,
            "box",
            FnHandler::new(|req| Ok(json!({"width": req.body["width"]}))),
        )
        .method(Method::POST)
        .endpoint(EndpointKey::new(Category::Design, "geometry", "box"))
        .host_thread()
        .build()])
    }
}

struct Broken;

impl HandlerModule for Broken {
    fn name(&self) -> &str {
        "broken"
    }

    fn load(&self, _ctx: &ModuleContext) -> Result<Vec<HandlerDescriptor>, DiscoveryError> {
        Err(DiscoveryError::new("broken", "missing native library"))
    }
}

struct Sticky;

impl Handler for Sticky {
    fn call(&self, _request: HandlerRequest) -> Result<serde_json::Value, HandlerError> {
        Ok(json!(null))
    }

    fn teardown(&self) -> Result<(), HandlerError> {
        Err(HandlerError::internal("document still open"))
    }
}

struct StickyModule;

impl HandlerModule for StickyModule {
    fn name(&self) -> &str {
        "sticky"
    }

    fn load(&self, _ctx: &ModuleContext) -> Result<Vec<HandlerDescriptor>, DiscoveryError> {
        Ok(vec![HandlerDescriptor::builder(Category::Research, "probe", Sticky)
            .method(Method::GET)
            .endpoint(EndpointKey::new(Category::Research, "lab", "probe"))
            .build()])
    }
}

fn config() -> BridgeConfig {
    BridgeConfig::builder()
        .endpoint(EndpointKey::new(Category::Manufacture, "cam", "listSetups"), "/cam/setups")
        .endpoint(EndpointKey::new(Category::Manufacture, "cam", "getSetup"), "/cam/setups/{id}")
        .endpoint(EndpointKey::new(Category::Design, "geometry", "box"), "/Box")
        .endpoint(EndpointKey::new(Category::Research, "lab", "probe"), "/lab/probe")
        .module_config("cam", json!({"machine": "haas"}))
        .build()
}

fn bridge() -> Arc<Coordinator> {
    Arc::new(
        Coordinator::builder()
            .module(Cam)
            .module(Broken)
            .module(Geometry)
            .module(StickyModule)
            .build(),
    )
}

/// Pumps the bridge from its own "host" thread until dropped.
struct Host {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl Host {
    fn start(bridge: &Arc<Coordinator>) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);
        let bridge = Arc::clone(bridge);
        let thread = std::thread::spawn(move || {
            let ctx = HostContext::current();
            while !flag.load(Ordering::Relaxed) {
                let _ = bridge.pump(&ctx);
                std::thread::sleep(Duration::from_millis(2));
            }
        });
        Self {
            stop,
            thread: Some(thread),
        }
    }
}

impl Drop for Host {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

async fn send(bridge: &Coordinator, method: Method, path: &str) -> DispatchResponse {
    let dispatcher = bridge.dispatcher().expect("running");
    dispatcher.dispatch(DispatchRequest::new(method, path)).await
}

#[tokio::test]
async fn initialize_isolates_broken_module_and_routes_by_specificity() {
    let bridge = bridge();
    bridge.initialize(config()).unwrap();
    let _host = Host::start(&bridge);

    let status = bridge.status();
    assert_eq!(status.state, Lifecycle::Running);
    assert_eq!(status.handler_count(), 4);
    assert_eq!(status.handlers.get(&Category::Manufacture), Some(&2));
    assert_eq!(status.routes, 4);
    assert_eq!(status.config_version, Some(1));
    assert_eq!(status.discovery_failures.len(), 1);
    assert!(status.discovery_failures[0].contains("broken"));

    let one = send(&bridge, Method::GET, "/cam/setups/42").await;
    assert_eq!(one.status, StatusCode::OK);
    assert_eq!(one.body, json!({"id": "42", "machine": "haas"}));

    let all = send(&bridge, Method::GET, "/cam/setups").await;
    assert_eq!(all.body, json!(["roughing", "finishing"]));

    assert!(bridge.validate().is_ok());
}

#[tokio::test]
async fn update_configuration_moves_box_without_restart() {
    let bridge = bridge();
    bridge.initialize(config()).unwrap();
    let _host = Host::start(&bridge);

    let change = bridge
        .update_configuration("design", "geometry", "box", "/CreateBox")
        .unwrap();
    assert_eq!(change.endpoints.len(), 1);
    assert_eq!(change.endpoints[0].new_path.as_deref(), Some("/CreateBox"));

    let moved = send(&bridge, Method::POST, "/CreateBox").await;
    assert_eq!(moved.status, StatusCode::OK);
    let old = send(&bridge, Method::POST, "/Box").await;
    assert_eq!(old.status, StatusCode::NOT_FOUND);

    assert_eq!(bridge.status().config_version, Some(2));
    assert!(bridge.validate().is_ok());
}

#[test]
fn update_configuration_rejects_bad_changes_and_keeps_state() {
    let bridge = bridge();
    bridge.initialize(config()).unwrap();

    let unknown = bridge
        .update_configuration("fabrication", "geometry", "box", "/X")
        .unwrap_err();
    assert!(matches!(unknown, UpdateError::Config(ConfigError::UnknownCategory(_))));

    let missing = bridge
        .update_configuration("design", "geometry", "sphere", "/Sphere")
        .unwrap_err();
    assert!(matches!(missing, UpdateError::Config(ConfigError::UnknownEndpoint(_))));

    let taken = bridge
        .update_configuration("design", "geometry", "box", "/cam/setups")
        .unwrap_err();
    assert!(matches!(taken, UpdateError::Config(_)));

    let malformed = bridge
        .update_configuration("design", "geometry", "box", "/Box/{")
        .unwrap_err();
    assert!(matches!(malformed, UpdateError::Config(_)));

    assert_eq!(bridge.status().config_version, Some(1));
    let routes = bridge.dispatcher().unwrap().routes();
    assert!(routes.resolve(&Method::POST, "/Box").is_match());
}

#[test]
fn initialize_reports_every_failed_check() {
    struct Sloppy;

    impl HandlerModule for Sloppy {
        fn name(&self) -> &str {
            "sloppy"
        }

        fn load(&self, _ctx: &ModuleContext) -> Result<Vec<HandlerDescriptor>, DiscoveryError> {
            let noop = || FnHandler::new(|_req| Ok(json!(null)));
            Ok(vec![
                // no endpoint
                HandlerDescriptor::builder(Category::Design, "sphere", noop())
                    .method(Method::POST)
                    .build(),
                // endpoint not in the map
                HandlerDescriptor::builder(Category::Design, "cone", noop())
                    .method(Method::POST)
                    .endpoint(EndpointKey::new(Category::Design, "geometry", "cone"))
                    .build(),
                // duplicate of Geometry's box
                HandlerDescriptor::builder(Category::Design, "box", noop())
                    .method(Method::POST)
                    .endpoint(EndpointKey::new(Category::Design, "geometry", "box"))
                    .build(),
            ])
        }
    }

    let bridge = Coordinator::builder()
        .module(Geometry)
        .module(Sloppy)
        .capabilities(CapabilitySet::empty())
        .build();

    let mut broken = config();
    broken.queue.capacity = 0;

    let err = bridge.initialize(broken).unwrap_err();
    assert_eq!(err.stages(), vec![Stage::Config, Stage::Validation]);
    assert_eq!(err.in_stage(Stage::Config).count(), 1);
    // Geometry's box lacks host_api, so Sloppy's inline box registers in its place
    let validation: Vec<_> = err.in_stage(Stage::Validation).map(|f| f.message.as_str()).collect();
    assert_eq!(validation.len(), 3, "{validation:?}");
    assert!(validation.iter().any(|m| m.contains("requires unavailable capabilities")));
    assert!(validation.iter().any(|m| m.contains("declares no endpoint")));
    assert!(validation.iter().any(|m| m.contains("no configured path")));
    assert_eq!(bridge.lifecycle(), Lifecycle::Failed);
    assert!(bridge.dispatcher().is_none());

    // A second attempt with good input succeeds
    let fixed = Coordinator::builder().module(Geometry).build();
    fixed.initialize(config()).unwrap();
    assert_eq!(fixed.lifecycle(), Lifecycle::Running);
}

#[test]
fn duplicate_handler_is_fatal() {
    let bridge = Coordinator::builder().module(Geometry).module(Geometry).build();
    let err = bridge.initialize(config()).unwrap_err();
    let messages: Vec<_> = err.in_stage(Stage::Validation).map(ToString::to_string).collect();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].contains("duplicate handler design/box"));
}

#[test]
fn second_initialize_is_refused() {
    let bridge = bridge();
    bridge.initialize(config()).unwrap();
    let err = bridge.initialize(config()).unwrap_err();
    assert_eq!(err.stages(), vec![Stage::Lifecycle]);
    assert_eq!(bridge.lifecycle(), Lifecycle::Running);
}

#[test]
fn reload_refuses_to_orphan_handlers() {
    let bridge = bridge();
    bridge.initialize(config()).unwrap();

    let shrunk = BridgeConfig::builder()
        .endpoint(EndpointKey::new(Category::Design, "geometry", "box"), "/Box")
        .build();
    let err = bridge.reload(shrunk).unwrap_err();
    match err {
        UpdateError::Orphaned { problems } => assert_eq!(problems.len(), 3),
        other => panic!("unexpected {other}"),
    }
    assert_eq!(bridge.status().config_version, Some(1));
}

#[test]
fn reload_from_file_updates_module_config() {
    let bridge = bridge();
    bridge.initialize(config()).unwrap();

    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    write!(
        file,
        r#"
[endpoints.manufacture.cam]
listSetups = "/cam/setups"
getSetup = "/cam/setup/{{id}}"

[endpoints.design.geometry]
box = "/Box"

[endpoints.research.lab]
probe = "/lab/probe"

[module_config.cam]
machine = "dmg"
"#
    )
    .unwrap();
    file.flush().unwrap();

    let change = bridge.reload_from(file.path()).unwrap();
    assert_eq!(change.modules, vec!["cam".to_string()]);
    assert_eq!(change.endpoints.len(), 1);

    let routes = bridge.dispatcher().unwrap().routes();
    assert!(routes.resolve(&Method::GET, "/cam/setup/7").is_match());

    let ctx = HostContext::current();
    let dispatcher = bridge.dispatcher().unwrap();
    let pending = std::thread::spawn(move || {
        tokio_test::block_on(dispatcher.dispatch(DispatchRequest::new(Method::GET, "/cam/setup/7")))
    });
    let mut response = None;
    for _ in 0..500 {
        bridge.pump(&ctx).unwrap();
        if pending.is_finished() {
            response = Some(pending.join().unwrap());
            break;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    let response = response.expect("request answered");
    assert_eq!(response.body["machine"], "dmg");
}

#[tokio::test]
async fn shutdown_discards_queued_work_and_reports_teardown_failures() {
    let bridge = bridge();
    bridge.initialize(config()).unwrap();
    let dispatcher = bridge.dispatcher().unwrap();

    // No host thread: the request stays queued
    let waiting = tokio::spawn(async move {
        dispatcher
            .dispatch(DispatchRequest::new(Method::POST, "/Box"))
            .await
    });
    while bridge.status().queue.map_or(0, |q| q.queued) == 0 {
        tokio::time::sleep(Duration::from_millis(2)).await;
    }

    let report = bridge.shutdown(None);
    assert_eq!(report.policy, ShutdownPolicy::Discard);
    assert_eq!(report.discarded, 1);
    assert_eq!(report.teardown_failures.len(), 1);
    assert_eq!(report.teardown_failures[0].handler, "research/probe");

    let response = waiting.await.unwrap();
    assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);

    let after = send(&bridge, Method::POST, "/Box").await;
    assert_eq!(after.error_code(), Some("SHUTTING_DOWN"));
    assert_eq!(bridge.lifecycle(), Lifecycle::Stopped);
    assert_eq!(bridge.shutdown(None), hostbridge::ShutdownReport::default());
}

#[test]
fn shutdown_with_drain_policy_runs_queued_work_on_host() {
    let bridge = bridge();
    let mut config = config();
    config.queue.shutdown_policy = ShutdownPolicy::Drain;
    bridge.initialize(config).unwrap();

    let dispatcher = bridge.dispatcher().unwrap();
    let pending = std::thread::spawn(move || {
        tokio_test::block_on(
            dispatcher.dispatch(DispatchRequest::new(Method::POST, "/Box").with_body(json!({"width": 4}))),
        )
    });
    while bridge.status().queue.map_or(0, |q| q.queued) == 0 {
        std::thread::sleep(Duration::from_millis(2));
    }

    let ctx = HostContext::current();
    let report = bridge.shutdown(Some(&ctx));
    assert_eq!(report.drained, 1);
    assert_eq!(report.discarded, 0);

    let response = pending.join().unwrap();
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body, json!({"width": 4}));
}

/// Inline handler that counts calls made after its teardown.
struct Ping {
    released: Arc<AtomicBool>,
    late_calls: Arc<AtomicUsize>,
}

impl Handler for Ping {
    fn call(&self, _request: HandlerRequest) -> Result<serde_json::Value, HandlerError> {
        if self.released.load(Ordering::SeqCst) {
            self.late_calls.fetch_add(1, Ordering::SeqCst);
        }
        Ok(json!("pong"))
    }

    fn teardown(&self) -> Result<(), HandlerError> {
        self.released.store(true, Ordering::SeqCst);
        Ok(())
    }
}

struct PingModule {
    released: Arc<AtomicBool>,
    late_calls: Arc<AtomicUsize>,
}

impl HandlerModule for PingModule {
    fn name(&self) -> &str {
        "ping"
    }

    fn load(&self, _ctx: &ModuleContext) -> Result<Vec<HandlerDescriptor>, DiscoveryError> {
        let ping = Ping {
            released: Arc::clone(&self.released),
            late_calls: Arc::clone(&self.late_calls),
        };
        Ok(vec![HandlerDescriptor::builder(Category::System, "ping", ping)
            .method(Method::GET)
            .endpoint(EndpointKey::new(Category::System, "meta", "ping"))
            .build()])
    }
}

#[tokio::test]
async fn released_inline_handlers_are_not_called_after_shutdown() {
    let released = Arc::new(AtomicBool::new(false));
    let late_calls = Arc::new(AtomicUsize::new(0));
    let bridge = Coordinator::builder()
        .module(PingModule {
            released: Arc::clone(&released),
            late_calls: Arc::clone(&late_calls),
        })
        .build();
    let config = BridgeConfig::builder()
        .endpoint(EndpointKey::new(Category::System, "meta", "ping"), "/ping")
        .build();
    bridge.initialize(config).unwrap();

    let before = send(&bridge, Method::GET, "/ping").await;
    assert_eq!(before.body, json!("pong"));

    let report = bridge.shutdown(None);
    assert!(report.teardown_failures.is_empty());
    assert!(released.load(Ordering::SeqCst));

    let after = send(&bridge, Method::GET, "/ping").await;
    assert_eq!(after.status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(after.error_code(), Some("SHUTTING_DOWN"));
    assert_eq!(late_calls.load(Ordering::SeqCst), 0);
}

#[test]
fn colliding_route_shapes_fail_in_routes_stage() {
    struct Lab;

    impl HandlerModule for Lab {
        fn name(&self) -> &str {
            "lab"
        }

        fn load(&self, _ctx: &ModuleContext) -> Result<Vec<HandlerDescriptor>, DiscoveryError> {
            let sample = |name: &str| {
                HandlerDescriptor::builder(Category::Research, name, FnHandler::new(|_req| Ok(json!(null))))
                    .method(Method::GET)
                    .endpoint(EndpointKey::new(Category::Research, "lab", name))
                    .build()
            };
            Ok(vec![sample("sample"), sample("specimen")])
        }
    }

    // Distinct paths to the configuration, one shape to the router
    let config = BridgeConfig::builder()
        .endpoint(EndpointKey::new(Category::Research, "lab", "sample"), "/lab/{sample_id}")
        .endpoint(EndpointKey::new(Category::Research, "lab", "specimen"), "/lab/{specimen_id}")
        .build();
    let bridge = Coordinator::builder().module(Lab).build();

    let err = bridge.initialize(config).unwrap_err();
    assert_eq!(err.stages(), vec![Stage::Routes]);
    assert!(err.failures[0].message.contains("research/specimen"));
    assert_eq!(bridge.lifecycle(), Lifecycle::Failed);
}

#[test]
fn reload_reports_settings_that_need_restart() {
    let bridge = bridge();
    bridge.initialize(config()).unwrap();

    let mut next = config();
    next.queue.capacity = 8;
    next.queue.drain_batch = 2;
    let change = bridge.reload(next).unwrap();

    assert!(change.queue_changed);
    assert_eq!(change.restart_required, vec!["queue.capacity"]);
    // The running queue keeps its capacity until restart
    let queue = bridge.status().queue.unwrap();
    assert_eq!(queue.capacity, hostbridge::config::QueueConfig::default().capacity);
}


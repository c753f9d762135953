//! End-to-end dispatch through the route table, middleware and host queue.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use hostbridge_config::{BridgeConfig, ConfigError, ConfigStore, ServerConfig};
use hostbridge_core::{Category, EndpointKey, FnHandler, HandlerDescriptor, HandlerRegistry};
use hostbridge_server::{
    DispatchRequest, DispatchResponse, Dispatcher, FnMiddleware, HttpServer, ShutdownSignal,
};
use hostbridge_tasks::{HostContext, TaskQueue};
use http::{Method, StatusCode};
use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// Drains the queue from a dedicated "host" thread until dropped.
struct HostLoop {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl HostLoop {
    fn spawn(queue: Arc<TaskQueue>) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);
        let thread = std::thread::spawn(move || {
            let ctx = HostContext::current();
            while !flag.load(Ordering::Relaxed) {
                let _ = queue.drain(&ctx, 8);
                std::thread::sleep(Duration::from_millis(2));
            }
        });
        Self {
            stop,
            thread: Some(thread),
        }
    }
}

impl Drop for HostLoop {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

fn setup_key() -> EndpointKey {
    EndpointKey::new(Category::Manufacture, "cam", "getSetup")
}

fn box_key() -> EndpointKey {
    EndpointKey::new(Category::Design, "geometry", "box")
}

fn bridge_config() -> BridgeConfig {
    BridgeConfig::builder()
        .endpoint(setup_key(), "/cam/setups/{id}")
        .endpoint(box_key(), "/Box")
        .module_config("cam", json!({"machine": "haas"}))
        .build()
}

fn get_setup() -> Arc<HandlerDescriptor> {
    Arc::new(
        HandlerDescriptor::builder(
            Category::Manufacture,
            "getSetup",
            FnHandler::new(|req| {
                let id = req.require_param("id")?;
                Ok(json!({"id": id, "machine": req.module_config["machine"]}))
            }),
        )
        .method(Method::GET)
        .endpoint(setup_key())
        .host_thread()
        .module("cam")
        .build(),
    )
}

fn create_box() -> Arc<HandlerDescriptor> {
    Arc::new(
        HandlerDescriptor::builder(
            Category::Design,
            "box",
            FnHandler::new(|req| Ok(json!({"created": req.body["width"]}))),
        )
        .method(Method::POST)
        .endpoint(box_key())
        .host_thread()
        .build(),
    )
}

fn build(config: &BridgeConfig, capacity: usize) -> (Arc<Dispatcher>, Arc<TaskQueue>) {
    let registry = Arc::new(HandlerRegistry::new(&config.module_config));
    let queue = Arc::new(TaskQueue::new(capacity));
    let dispatcher = Dispatcher::new(registry, Arc::clone(&queue), &config.server_config);
    (Arc::new(dispatcher), queue)
}

#[tokio::test]
async fn host_thread_round_trip_with_params_and_module_config() {
    let config = bridge_config();
    let (dispatcher, queue) = build(&config, 16);
    dispatcher.mount(get_setup(), &config.endpoints, Vec::new()).unwrap();
    let _host = HostLoop::spawn(Arc::clone(&queue));

    let response = dispatcher
        .dispatch(DispatchRequest::new(Method::GET, "/cam/setups/42"))
        .await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body, json!({"id": "42", "machine": "haas"}));
    assert_eq!(queue.stats().completed, 1);
}

#[tokio::test]
async fn unknown_path_and_wrong_method() {
    let config = bridge_config();
    let (dispatcher, _queue) = build(&config, 16);
    dispatcher.mount(get_setup(), &config.endpoints, Vec::new()).unwrap();

    let missing = dispatcher
        .dispatch(DispatchRequest::new(Method::GET, "/cam/tools"))
        .await;
    assert_eq!(missing.status, StatusCode::NOT_FOUND);
    assert_eq!(missing.error_code(), Some("ROUTE_NOT_FOUND"));

    let wrong = dispatcher
        .dispatch(DispatchRequest::new(Method::DELETE, "/cam/setups/42"))
        .await;
    assert_eq!(wrong.status, StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(wrong.headers.get(http::header::ALLOW).unwrap(), "GET");
}

#[tokio::test]
async fn middleware_short_circuits_before_the_queue() {
    let config = bridge_config();
    let registry = Arc::new(HandlerRegistry::new(&config.module_config));
    let queue = Arc::new(TaskQueue::new(16));
    let dispatcher = Dispatcher::new(registry, Arc::clone(&queue), &config.server_config).with_middleware(
        FnMiddleware::new("require-token", |ctx, request, next| {
            Box::pin(async move {
                if request.headers.contains_key("x-token") {
                    next.run(ctx, request).await
                } else {
                    DispatchResponse::error(StatusCode::UNAUTHORIZED, "NO_TOKEN", "token required", Some(ctx.route()))
                }
            })
        }),
    );
    dispatcher.mount(create_box(), &config.endpoints, Vec::new()).unwrap();

    let response = dispatcher
        .dispatch(DispatchRequest::new(Method::POST, "/Box").with_body(json!({"width": 10})))
        .await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.body["error"]["route"], "POST /Box");
    assert_eq!(queue.stats().enqueued_total, 0);
}

#[tokio::test]
async fn slow_host_times_out_and_late_result_is_abandoned() {
    let config = bridge_config();
    let (dispatcher, queue) = build(&config, 16);
    let slow = Arc::new(
        HandlerDescriptor::builder(
            Category::Design,
            "slow",
            FnHandler::new(|_req| {
                std::thread::sleep(Duration::from_millis(150));
                Ok(json!("late"))
            }),
        )
        .host_thread()
        .timeout(Duration::from_millis(30))
        .build(),
    );
    dispatcher.register_route(Method::POST, "/slow", slow).unwrap();
    let _host = HostLoop::spawn(Arc::clone(&queue));

    let response = dispatcher
        .dispatch(DispatchRequest::new(Method::POST, "/slow"))
        .await;
    assert_eq!(response.status, StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(response.error_code(), Some("TIMEOUT"));

    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while queue.stats().abandoned == 0 && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(queue.stats().abandoned, 1);
}

#[tokio::test]
async fn closed_queue_answers_shutting_down() {
    let config = bridge_config();
    let (dispatcher, queue) = build(&config, 16);
    dispatcher.mount(create_box(), &config.endpoints, Vec::new()).unwrap();
    queue.close();

    let response = dispatcher
        .dispatch(DispatchRequest::new(Method::POST, "/Box"))
        .await;
    assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(response.error_code(), Some("SHUTTING_DOWN"));
}

#[tokio::test]
async fn endpoint_update_moves_route() {
    let config = bridge_config();
    let (dispatcher, queue) = build(&config, 16);
    dispatcher.mount(create_box(), &config.endpoints, Vec::new()).unwrap();
    let _host = HostLoop::spawn(Arc::clone(&queue));

    let store = ConfigStore::new(config).unwrap();
    store.add_listener(dispatcher.clone());

    let before = dispatcher
        .dispatch(DispatchRequest::new(Method::POST, "/Box").with_body(json!({"width": 3})))
        .await;
    assert_eq!(before.status, StatusCode::OK);

    store.update_endpoint(&box_key(), "/CreateBox").unwrap();

    let old = dispatcher
        .dispatch(DispatchRequest::new(Method::POST, "/Box"))
        .await;
    assert_eq!(old.status, StatusCode::NOT_FOUND);

    let moved = dispatcher
        .dispatch(DispatchRequest::new(Method::POST, "/CreateBox").with_body(json!({"width": 3})))
        .await;
    assert_eq!(moved.status, StatusCode::OK);
    assert_eq!(moved.body, json!({"created": 3}));
}

#[tokio::test]
async fn rejected_update_keeps_routes() {
    let config = bridge_config();
    let (dispatcher, _queue) = build(&config, 16);
    dispatcher.mount(create_box(), &config.endpoints, Vec::new()).unwrap();
    let store = ConfigStore::new(config).unwrap();
    store.add_listener(dispatcher.clone());

    let result = store.update(|current| -> Result<BridgeConfig, ConfigError> {
        current.with_endpoint_path(&box_key(), "/cam/setups/{id}")
    });
    assert!(result.is_err());
    assert_eq!(store.snapshot().version(), 1);
    assert!(dispatcher.routes().entries().any(|e| e.pattern().as_str() == "/Box"));
}

#[tokio::test]
async fn server_config_update_changes_timeout() {
    let config = bridge_config();
    let (dispatcher, queue) = build(&config, 16);
    let slow = Arc::new(
        HandlerDescriptor::builder(
            Category::Design,
            "slow",
            FnHandler::new(|_req| {
                std::thread::sleep(Duration::from_millis(100));
                Ok(json!("done"))
            }),
        )
        .host_thread()
        .build(),
    );
    dispatcher.register_route(Method::POST, "/slow", slow).unwrap();
    let store = ConfigStore::new(config).unwrap();
    store.add_listener(dispatcher.clone());
    let _host = HostLoop::spawn(Arc::clone(&queue));

    store
        .update(|current| -> Result<BridgeConfig, ConfigError> {
            let mut next = current.config().clone();
            next.server_config = ServerConfig {
                timeout_ms: 20,
                ..next.server_config
            };
            Ok(next)
        })
        .unwrap();

    let response = dispatcher
        .dispatch(DispatchRequest::new(Method::POST, "/slow"))
        .await;
    assert_eq!(response.status, StatusCode::GATEWAY_TIMEOUT);
}

#[tokio::test]
async fn http_adapter_serves_json() {
    let config = bridge_config();
    let (dispatcher, queue) = build(&config, 16);
    dispatcher.mount(create_box(), &config.endpoints, Vec::new()).unwrap();
    let _host = HostLoop::spawn(Arc::clone(&queue));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = ShutdownSignal::new();
    let server = HttpServer::new(Arc::clone(&dispatcher), addr.to_string())
        .shutdown_timeout(Duration::from_millis(200));
    let running = tokio::spawn(server.serve(listener, shutdown.clone()));

    let ok = raw_request(addr, "POST", "/Box", r#"{"width": 7}"#).await;
    assert!(ok.starts_with("HTTP/1.1 200"), "{ok}");
    assert!(ok.contains(r#"{"created":7}"#), "{ok}");

    let bad = raw_request(addr, "POST", "/Box", "{width").await;
    assert!(bad.starts_with("HTTP/1.1 400"), "{bad}");
    assert!(bad.contains("INVALID_JSON"), "{bad}");

    let unrouted = raw_request(addr, "POST", "/does/not/exist", "{width").await;
    assert!(unrouted.starts_with("HTTP/1.1 404"), "{unrouted}");
    assert!(unrouted.contains("ROUTE_NOT_FOUND"), "{unrouted}");

    shutdown.trigger();
    tokio::time::timeout(Duration::from_secs(2), running)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
}

async fn raw_request(addr: std::net::SocketAddr, method: &str, path: &str, body: &str) -> String {
    let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
    let request = format!(
        "{method} {path} HTTP/1.1\r\nHost: localhost\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    stream.write_all(request.as_bytes()).await.unwrap();
    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();
    response
}

use std::{
    collections::HashSet,
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

use burattino::{
    events::EventSink,
    funcs::*,
    interchange::{RegisterRoute, ResponseFunc},
    server::{Controller, ControllerError},
};
use serde_json::Value;

use crate::helpers::{free_port, free_ports, http_client, mock_url, test_config};

fn route(port: u16, method: &str, path: &str, response_func: Vec<ResponseFunc>) -> RegisterRoute {
    RegisterRoute {
        port,
        method: String::from(method),
        path: String::from(path),
        response_func,
    }
}

#[derive(Default)]
struct RecordedEvents {
    kinds: Mutex<Vec<String>>,
}

impl EventSink for RecordedEvents {
    fn record(&self, kind: &str, _duration: Duration, _details: Value) {
        self.kinds.lock().unwrap().push(String::from(kind));
    }
}

#[tokio::test]
async fn should_start_one_listener_per_port() {
    let controller = Controller::new(test_config());
    let [first, second] = free_ports();

    controller
        .register_route(route(first, "GET", "/a", vec![set_json_body("", "a")]))
        .await
        .unwrap();
    controller
        .register_route(route(first, "GET", "/b", vec![set_json_body("", "b")]))
        .await
        .unwrap();
    controller
        .register_route(route(second, "GET", "/a", vec![set_json_body("", "c")]))
        .await
        .unwrap();

    let mut expected = vec![first, second];
    expected.sort_unstable();
    assert_eq!(controller.running_ports().await, expected);
    assert!(controller.lookup(first, "GET", "/b").await.is_some());
    assert!(controller.lookup(second, "GET", "/b").await.is_none());

    let client = http_client();
    let body = client.get(mock_url(second, "/a")).send().await.unwrap().text().await.unwrap();
    assert_eq!(body, "c");

    assert_eq!(controller.reset_all().await, expected);
    for port in [first, second] {
        assert!(client.get(mock_url(port, "/a")).send().await.is_err());
    }
}

#[tokio::test]
async fn should_leave_other_ports_running_on_reset_port() {
    let controller = Controller::new(test_config());
    let [kept, dropped] = free_ports();
    for port in [kept, dropped] {
        controller
            .register_route(route(port, "GET", "/ping", vec![set_status_code("", 204)]))
            .await
            .unwrap();
    }

    controller.reset_port(dropped).await;

    let client = http_client();
    assert_eq!(controller.running_ports().await, vec![kept]);
    assert!(controller.lookup(dropped, "GET", "/ping").await.is_none());
    assert!(client.get(mock_url(dropped, "/ping")).send().await.is_err());
    let response = client.get(mock_url(kept, "/ping")).send().await.unwrap();
    assert_eq!(response.status(), 204);

    controller.reset_all().await;
}

#[tokio::test]
async fn should_ignore_reset_of_unknown_port() {
    let controller = Controller::new(test_config());

    controller.reset_port(free_port()).await;

    assert!(controller.running_ports().await.is_empty());
    assert!(controller.reset_all().await.is_empty());
}

#[tokio::test]
async fn should_allow_registering_again_after_reset() {
    let controller = Controller::new(test_config());
    let port = free_port();
    controller
        .register_route(route(port, "GET", "/v", vec![set_json_body("", "before")]))
        .await
        .unwrap();
    controller.reset_port(port).await;

    controller
        .register_route(route(port, "GET", "/v", vec![set_json_body("", "after")]))
        .await
        .unwrap();

    let body = http_client()
        .get(mock_url(port, "/v"))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(body, "after");
    controller.reset_all().await;
}

#[tokio::test]
async fn should_reject_port_zero() {
    let controller = Controller::new(test_config());

    let result = controller
        .register_route(route(0, "GET", "/", vec![set_status_code("", 200)]))
        .await;

    assert!(matches!(result, Err(ControllerError::InvalidPort)));
    assert!(controller.running_ports().await.is_empty());
}

#[tokio::test]
async fn should_not_store_route_when_port_is_taken() {
    let controller = Controller::new(test_config());
    let blocker = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = blocker.local_addr().unwrap().port();

    let result = controller
        .register_route(route(port, "GET", "/", vec![set_status_code("", 200)]))
        .await;

    assert!(matches!(result, Err(ControllerError::Bind { port: p, .. }) if p == port));
    assert!(controller.lookup(port, "GET", "/").await.is_none());
    assert!(controller.running_ports().await.is_empty());
    drop(blocker);
}

#[tokio::test]
async fn should_keep_controllers_independent() {
    let first = Controller::new(test_config());
    let second = Controller::new(test_config());
    let [first_port, second_port] = free_ports();

    first
        .register_route(route(first_port, "GET", "/", vec![set_json_body("", "first")]))
        .await
        .unwrap();
    second
        .register_route(route(second_port, "GET", "/", vec![set_json_body("", "second")]))
        .await
        .unwrap();
    first.reset_all().await;

    assert!(first.running_ports().await.is_empty());
    assert_eq!(second.running_ports().await, vec![second_port]);
    let body = http_client()
        .get(mock_url(second_port, "/"))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(body, "second");
    second.reset_all().await;
}

#[tokio::test]
async fn should_skip_invalid_instructions() {
    let controller = Controller::new(test_config());
    let port = free_port();
    controller
        .register_route(route(
            port,
            "GET",
            "/",
            vec![
                ResponseFunc::new("Bogus", "Nothing", vec![]),
                ResponseFunc::new("SetupResponse", "SetStatusCode", vec![]),
                set_status_code("", 202),
            ],
        ))
        .await
        .unwrap();

    let response = http_client().get(mock_url(port, "/")).send().await.unwrap();

    assert_eq!(response.status(), 202);
    controller.reset_all().await;
}

#[tokio::test]
async fn should_keep_requests_isolated_under_concurrency() {
    let controller = Controller::new(test_config());
    let port = free_port();
    controller
        .register_route(route(
            port,
            "POST",
            "/echo",
            vec![
                extract_request_json_body("id", "ID"),
                generate_random_string(24, "NONCE"),
                set_json_body("", r#"{"id":{{.ID}},"nonce":"{{.NONCE}}"}"#),
            ],
        ))
        .await
        .unwrap();

    let client = http_client();
    let requests = (0..20).map(|id| {
        let client = client.clone();
        tokio::spawn(async move {
            let body = client
                .post(mock_url(port, "/echo"))
                .json(&serde_json::json!({"id": id}))
                .send()
                .await
                .unwrap()
                .json::<Value>()
                .await
                .unwrap();
            (id, body)
        })
    });

    let mut nonces = HashSet::new();
    for request in requests.collect::<Vec<_>>() {
        let (id, body) = request.await.unwrap();
        assert_eq!(body["id"], id);
        nonces.insert(body["nonce"].as_str().unwrap().to_owned());
    }
    assert_eq!(nonces.len(), 20);
    controller.reset_all().await;
}

#[tokio::test]
async fn should_delay_response_by_fixed_wait() {
    let controller = Controller::new(test_config());
    let port = free_port();
    controller
        .register_route(route(port, "GET", "/slow", vec![set_wait("", 200)]))
        .await
        .unwrap();

    let started = Instant::now();
    let response = http_client().get(mock_url(port, "/slow")).send().await.unwrap();

    assert_eq!(response.status(), 200);
    assert!(started.elapsed() >= Duration::from_millis(200));
    controller.reset_all().await;
}

#[tokio::test]
async fn should_finish_in_flight_request_before_reset_completes() {
    let controller = Controller::new(test_config());
    let port = free_port();
    controller
        .register_route(route(
            port,
            "GET",
            "/slow",
            vec![set_wait("", 300), set_json_body("", "done")],
        ))
        .await
        .unwrap();

    let in_flight = tokio::spawn(async move {
        http_client()
            .get(mock_url(port, "/slow"))
            .send()
            .await
            .unwrap()
            .text()
            .await
            .unwrap()
    });
    tokio::time::sleep(Duration::from_millis(100)).await;

    controller.reset_port(port).await;

    assert_eq!(in_flight.await.unwrap(), "done");
    assert!(controller.running_ports().await.is_empty());
}

#[tokio::test]
async fn should_abort_in_flight_request_when_grace_period_elapses() {
    let events = Arc::new(RecordedEvents::default());
    let config = test_config();
    let grace = config.shutdown_grace;
    let controller = Controller::with_events(config, events.clone());
    let port = free_port();
    controller
        .register_route(route(
            port,
            "GET",
            "/stuck",
            vec![set_wait("", 10_000), set_json_body("", "too late")],
        ))
        .await
        .unwrap();

    let in_flight =
        tokio::spawn(async move { http_client().get(mock_url(port, "/stuck")).send().await });
    tokio::time::sleep(Duration::from_millis(100)).await;

    let started = Instant::now();
    controller.reset_port(port).await;
    let elapsed = started.elapsed();

    assert!(elapsed >= grace);
    assert!(elapsed < Duration::from_secs(8));
    assert!(in_flight.await.unwrap().is_err());
    assert!(controller.running_ports().await.is_empty());
    assert!(events
        .kinds
        .lock()
        .unwrap()
        .iter()
        .any(|kind| kind == "ResetPortError"));
}

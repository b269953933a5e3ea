use std::collections::HashSet;

use burattino::{
    client::{Client, ClientError},
    condition::Condition,
    funcs::*,
    interchange::HashAlgorithm,
};
use fake::{Fake, Faker};
use serde_json::{json, Value};

use crate::helpers::{free_port, http_client, mock_url, start_server, TestServer};

struct Dsl {
    server: TestServer,
    control: Client,
    reqwest_client: reqwest::Client,
    port: u16,
}

async fn setup_server() -> Dsl {
    let server = start_server().await;
    let control = server.client();
    Dsl {
        server,
        control,
        reqwest_client: http_client(),
        port: free_port(),
    }
}

fn random_path() -> String {
    format!("/{}", Faker.fake::<String>())
}

#[tokio::test]
async fn should_respond_with_registered_json_body() {
    let Dsl {
        control,
        reqwest_client: client,
        port,
        ..
    } = setup_server().await;
    control
        .register_route(
            port,
            "GET",
            "/hello",
            vec![set_status_code("", 200), set_json_body("", r#"{"msg":"hi"}"#)],
        )
        .await
        .expect("Failed to register route");

    let response = client
        .get(mock_url(port, "/hello"))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.unwrap(), r#"{"msg":"hi"}"#);
}

#[tokio::test]
async fn should_respond_with_404_for_unregistered_path_on_live_port() {
    let server_path = random_path();
    let client_path = random_path();
    assert_ne!(
        server_path, client_path,
        "Server path should not match client path"
    );
    let Dsl {
        control,
        reqwest_client: client,
        port,
        ..
    } = setup_server().await;
    control
        .register_route(port, "GET", &server_path, vec![set_status_code("", 200)])
        .await
        .unwrap();

    let response = client
        .get(mock_url(port, &client_path))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), 404);
    assert_eq!(response.text().await.unwrap(), "");
}

#[tokio::test]
async fn should_match_methods_independently() {
    let path = random_path();
    let Dsl {
        control,
        reqwest_client: client,
        port,
        ..
    } = setup_server().await;
    control
        .register_route(port, "GET", &path, vec![set_json_body("", "get")])
        .await
        .unwrap();
    control
        .register_route(
            port,
            "POST",
            &path,
            vec![set_status_code("", 201), set_json_body("", "post")],
        )
        .await
        .unwrap();

    let get = client.get(mock_url(port, &path)).send().await.unwrap();
    assert_eq!(get.status(), 200);
    assert_eq!(get.text().await.unwrap(), "get");

    let post = client.post(mock_url(port, &path)).send().await.unwrap();
    assert_eq!(post.status(), 201);
    assert_eq!(post.text().await.unwrap(), "post");

    let delete = client.delete(mock_url(port, &path)).send().await.unwrap();
    assert_eq!(delete.status(), 404);
}

#[tokio::test]
async fn should_select_response_by_case() {
    let Dsl {
        control,
        reqwest_client: client,
        port,
        ..
    } = setup_server().await;
    control
        .register_route(
            port,
            "POST",
            "/login",
            vec![
                if_request_json_body_set_case("user.type", Condition::Equal, "vip", "vip"),
                set_status_code("", 200),
                set_status_code("vip", 201),
                set_json_body("", r#"{"tier":"basic"}"#),
                set_json_body("vip", r#"{"tier":"vip"}"#),
            ],
        )
        .await
        .unwrap();

    let vip = client
        .post(mock_url(port, "/login"))
        .json(&json!({"user": {"type": "vip"}}))
        .send()
        .await
        .unwrap();
    assert_eq!(vip.status(), 201);
    assert_eq!(vip.json::<Value>().await.unwrap(), json!({"tier": "vip"}));

    let basic = client
        .post(mock_url(port, "/login"))
        .json(&json!({"user": {"type": "regular"}}))
        .send()
        .await
        .unwrap();
    assert_eq!(basic.status(), 200);
    assert_eq!(basic.json::<Value>().await.unwrap(), json!({"tier": "basic"}));
}

#[tokio::test]
async fn should_render_extracted_values_into_response() {
    let Dsl {
        control,
        reqwest_client: client,
        port,
        ..
    } = setup_server().await;
    control
        .register_route(
            port,
            "GET",
            "/greet",
            vec![
                extract_request_query("name", "NAME"),
                extract_request_header("X-Request-Id", "RID"),
                if_request_query("age", Condition::GreaterThanOrEqual, 18, "STRING_ADULT", true),
                extract_request_query("age", "AGE"),
                convert_to_int("AGE"),
                if_dynamic_variable("AGE", Condition::GreaterThanOrEqual, 18, "ADULT", true),
                set_header("", "X-Echo", "{{.RID}}"),
                set_json_body(
                    "",
                    r#"{"hello":"{{.NAME}}","adult":"{{.ADULT}}","string_adult":"{{.STRING_ADULT}}"}"#,
                ),
            ],
        )
        .await
        .unwrap();

    let response = client
        .get(mock_url(port, "/greet?name=Ada&age=36"))
        .header("X-Request-Id", "req-42")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    assert_eq!(response.headers()["x-echo"], "req-42");
    assert_eq!(
        response.json::<Value>().await.unwrap(),
        json!({"hello": "Ada", "adult": "true", "string_adult": ""})
    );
}

#[tokio::test]
async fn should_copy_header_from_request() {
    let Dsl {
        control,
        reqwest_client: client,
        port,
        ..
    } = setup_server().await;
    control
        .register_route(
            port,
            "GET",
            "/trace",
            vec![copy_header_from_request("", "X-Trace")],
        )
        .await
        .unwrap();

    let response = client
        .get(mock_url(port, "/trace"))
        .header("X-Trace", "abc")
        .send()
        .await
        .unwrap();

    assert_eq!(response.headers()["x-trace"], "abc");
}

#[tokio::test]
async fn should_generate_fresh_values_per_request() {
    let Dsl {
        control,
        reqwest_client: client,
        port,
        ..
    } = setup_server().await;
    control
        .register_route(
            port,
            "GET",
            "/token",
            vec![
                generate_random_string(16, "TOKEN"),
                hashed_string("TOKEN", HashAlgorithm::Md5, "DIGEST"),
                set_json_body("", r#"{"token":"{{.TOKEN}}","digest":"{{.DIGEST}}"}"#),
            ],
        )
        .await
        .unwrap();

    let mut tokens = HashSet::new();
    for _ in 0..5 {
        let body = client
            .get(mock_url(port, "/token"))
            .send()
            .await
            .unwrap()
            .json::<Value>()
            .await
            .unwrap();
        let token = body["token"].as_str().unwrap().to_owned();
        assert_eq!(token.len(), 16);
        assert_eq!(body["digest"].as_str().unwrap().len(), 32);
        tokens.insert(token);
    }

    assert_eq!(tokens.len(), 5);
}

#[tokio::test]
async fn should_replace_script_on_reregistration() {
    let Dsl {
        control,
        reqwest_client: client,
        port,
        ..
    } = setup_server().await;
    control
        .register_route(port, "GET", "/v", vec![set_json_body("", "one")])
        .await
        .unwrap();
    control
        .register_route(port, "GET", "/v", vec![set_json_body("", "two")])
        .await
        .unwrap();

    let response = client.get(mock_url(port, "/v")).send().await.unwrap();

    assert_eq!(response.text().await.unwrap(), "two");
}

#[tokio::test]
async fn should_stop_serving_after_reset_through_client() {
    let Dsl {
        server,
        control,
        reqwest_client: client,
        port,
    } = setup_server().await;
    control
        .register_route(port, "GET", "/gone", vec![set_status_code("", 204)])
        .await
        .unwrap();
    assert_eq!(server.controller.running_ports().await, vec![port]);

    control.reset_port(port).await.expect("Failed to reset port");

    assert!(server.controller.running_ports().await.is_empty());
    assert!(client.get(mock_url(port, "/gone")).send().await.is_err());

    control.reset_all().await.expect("Failed to reset all");
}

#[tokio::test]
async fn should_surface_rejected_registration() {
    let Dsl { control, .. } = setup_server().await;

    let result = control
        .register_route(0, "GET", "/nope", vec![set_status_code("", 200)])
        .await;

    assert!(matches!(result, Err(ClientError::Rejected { status: 400, .. })));
}

#[tokio::test]
async fn should_fail_fast_for_invalid_control_plane_url() {
    let client = Client::new("not a url");

    assert_eq!(client.reset_all().await, Err(ClientError::InvalidUrl));
}

#[tokio::test]
async fn should_fail_when_control_plane_is_down() {
    let client = Client::new(&format!("http://127.0.0.1:{}", free_port()));

    assert_eq!(
        client.reset_all().await,
        Err(ClientError::FailedToConnectToControlPlane)
    );
}

//! End-to-end HTTP tests: real TCP listeners driven with reqwest

mod common;

use common::{manifest, stub_gateway};
use plugin_host::plugin::LifecycleGateway;
use plugin_host::server::{HttpServer, external_router, internal_router};
use pretty_assertions::assert_eq;
use std::net::SocketAddr;
use std::sync::Arc;

fn loopback() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 0))
}

async fn serve_internal(gateway: Arc<LifecycleGateway>) -> HttpServer {
    HttpServer::start(loopback(), internal_router(gateway))
        .await
        .unwrap()
}

async fn serve_external(gateway: Arc<LifecycleGateway>, token: Option<&str>) -> HttpServer {
    HttpServer::start(
        loopback(),
        external_router(gateway, token.map(str::to_owned)),
    )
    .await
    .unwrap()
}

fn upload_form(name: &str, content: Vec<u8>) -> reqwest::multipart::Form {
    reqwest::multipart::Form::new()
        .part("file", reqwest::multipart::Part::bytes(content).file_name(name.to_string()))
}

#[tokio::test]
async fn health_is_public_on_both_listeners() {
    let (_dir, gateway) = stub_gateway().await;
    let internal = serve_internal(gateway.clone()).await;
    let external = serve_external(gateway, Some("secret")).await;
    let client = reqwest::Client::new();

    for server in [&internal, &external] {
        let response = client
            .get(format!("http://{}/health", server.local_addr()))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        assert_eq!(response.text().await.unwrap(), "OK");
    }

    internal.stop();
    external.stop();
}

#[tokio::test]
async fn upload_list_delete_roundtrip() {
    let (_dir, gateway) = stub_gateway().await;
    let server = serve_internal(gateway).await;
    let base = format!("http://{}", server.local_addr());
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{base}/plugins"))
        .multipart(upload_form("sample.pkg", manifest("sample", "1.0")))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body = response.text().await.unwrap();
    assert_eq!(body, "Uploaded and started plugin: sample");

    let listing: Vec<String> = client
        .get(format!("{base}/plugins"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(listing, vec!["sample:1.0".to_string()]);

    // Delete accepts the id with a version suffix, as listed
    let response = client
        .delete(format!("{base}/plugins/sample:1.0"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let listing: Vec<String> = client
        .get(format!("{base}/plugins"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(listing.is_empty());

    server.stop();
}

#[tokio::test]
async fn upload_without_file_field_is_bad_request() {
    let (_dir, gateway) = stub_gateway().await;
    let server = serve_internal(gateway).await;
    let client = reqwest::Client::new();

    let form = reqwest::multipart::Form::new().text("note", "no file here");
    let response = client
        .post(format!("http://{}/plugins", server.local_addr()))
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
    assert_eq!(response.text().await.unwrap(), "No file");

    server.stop();
}

#[tokio::test]
async fn truncated_upload_body_reports_read_failure() {
    let (_dir, gateway) = stub_gateway().await;
    let server = serve_internal(gateway).await;
    let client = reqwest::Client::new();

    // A multipart body that declares a file field but ends before the
    // closing boundary, so reading the field's bytes fails mid-stream.
    let boundary = "cut-short";
    let body = format!(
        "--{boundary}\r\n\
         Content-Disposition: form-data; name=\"file\"; filename=\"sample.pkg\"\r\n\
         \r\n\
         id=sample\nversion="
    );
    let response = client
        .post(format!("http://{}/plugins", server.local_addr()))
        .header(
            "content-type",
            format!("multipart/form-data; boundary={boundary}"),
        )
        .body(body)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
    let text = response.text().await.unwrap();
    assert!(
        text.starts_with("Failed to read upload:"),
        "unexpected body: {text}"
    );

    server.stop();
}

#[tokio::test]
async fn corrupt_upload_is_server_error_and_list_unchanged() {
    let (_dir, gateway) = stub_gateway().await;
    let server = serve_internal(gateway).await;
    let base = format!("http://{}", server.local_addr());
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{base}/plugins"))
        .multipart(upload_form("bad.pkg", b"garbage".to_vec()))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 500);

    let listing: Vec<String> = client
        .get(format!("{base}/plugins"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(listing.is_empty());

    server.stop();
}

#[tokio::test]
async fn external_listener_requires_bearer_token() {
    let (_dir, gateway) = stub_gateway().await;
    let server = serve_external(gateway, Some("secret")).await;
    let base = format!("http://{}", server.local_addr());
    let client = reqwest::Client::new();

    let response = client.get(format!("{base}/plugins")).send().await.unwrap();
    assert_eq!(response.status(), 401);

    let response = client
        .get(format!("{base}/plugins"))
        .bearer_auth("wrong")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 401);

    let response = client
        .get(format!("{base}/plugins"))
        .bearer_auth("secret")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    server.stop();
}

#[tokio::test]
async fn unconfigured_secret_fails_closed() {
    let (_dir, gateway) = stub_gateway().await;
    let server = serve_external(gateway, None).await;
    let client = reqwest::Client::new();

    // Absence of a secret disables protected access entirely
    let response = client
        .get(format!("http://{}/plugins", server.local_addr()))
        .bearer_auth("anything")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 401);

    server.stop();
}

#[tokio::test]
async fn internal_and_external_listeners_share_one_registry() {
    let (_dir, gateway) = stub_gateway().await;
    let internal = serve_internal(gateway.clone()).await;
    let external = serve_external(gateway, Some("secret")).await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("http://{}/plugins", internal.local_addr()))
        .multipart(upload_form("shared.pkg", manifest("shared", "1.0")))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let listing: Vec<String> = client
        .get(format!("http://{}/plugins", external.local_addr()))
        .bearer_auth("secret")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(listing, vec!["shared:1.0".to_string()]);

    internal.stop();
    external.stop();
}

#[tokio::test]
async fn delete_twice_returns_ok_both_times() {
    let (_dir, gateway) = stub_gateway().await;
    let server = serve_internal(gateway).await;
    let base = format!("http://{}", server.local_addr());
    let client = reqwest::Client::new();

    client
        .post(format!("{base}/plugins"))
        .multipart(upload_form("sample.pkg", manifest("sample", "1.0")))
        .send()
        .await
        .unwrap();

    for _ in 0..2 {
        let response = client
            .delete(format!("{base}/plugins/sample"))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
    }

    server.stop();
}

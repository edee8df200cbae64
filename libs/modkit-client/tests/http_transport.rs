#![allow(clippy::unwrap_used, clippy::expect_used)]

//! Calls through the default hyper transport against a mock server.

use figment::Figment;
use figment::providers::{Format, Yaml};
use httpmock::prelude::*;
use modkit_client::{
    Arguments, Client, ClientConfig, ClientError, ContractDescription, Declared, Eventual,
    FailureKind, OperationDescription, ParameterDeclaration, TypeDescriptor,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
struct User {
    id: String,
    name: String,
}

modkit_client::declare_value!(User);

fn users_contract() -> Arc<ContractDescription> {
    ContractDescription::builder("Users")
        .path("/users")
        .header("accept", "application/json")
        .operation(
            OperationDescription::get("find", "/{id}")
                .param(ParameterDeclaration::path("id", String::descriptor()))
                .param(ParameterDeclaration::query("expand", String::descriptor()))
                .param(ParameterDeclaration::header("x-request-id", String::descriptor()))
                .returns::<Eventual<Option<User>>>(),
        )
        .operation(
            OperationDescription::get("get", "/{id}")
                .param(ParameterDeclaration::path("id", String::descriptor()))
                .returns::<User>(),
        )
        .operation(
            OperationDescription::post("create", "/")
                .param(ParameterDeclaration::body(TypeDescriptor::any()))
                .returns::<Eventual<User>>(),
        )
        .operation(
            OperationDescription::post("invite", "/invitations")
                .param(ParameterDeclaration::form(TypeDescriptor::any()))
                .returns::<Eventual<()>>(),
        )
        .build()
}

fn config(server: &MockServer) -> ClientConfig {
    let yaml = format!(
        "base_url: {}/api\nrequest_timeout: 5s\nallow_insecure_http: true\ndefault_headers:\n  x-tenant: acme\n",
        server.base_url()
    );
    ClientConfig::from_figment(&Figment::new().merge(Yaml::string(&yaml))).unwrap()
}

#[tokio::test]
async fn test_eventual_call_with_path_query_and_headers() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/api/users/42")
                .query_param("expand", "groups")
                .header("accept", "application/json")
                .header("x-request-id", "req-1")
                .header("x-tenant", "acme")
                .header("user-agent", modkit_client::DEFAULT_USER_AGENT);
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({"id": "42", "name": "Ada"}));
        })
        .await;

    let client = Client::builder(users_contract())
        .with_config(config(&server))
        .build()
        .unwrap();

    let pending: Eventual<Option<User>> = client
        .call(
            "find",
            Arguments::new().arg("42").arg("groups").arg("req-1"),
        )
        .unwrap();
    let user = pending.await.unwrap().unwrap();
    assert_eq!(user.id, "42");
    assert_eq!(user.name, "Ada");
    mock.assert_async().await;
}

#[tokio::test]
async fn test_json_and_form_bodies() {
    let server = MockServer::start_async().await;
    let create = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/api/users/")
                .header("content-type", "application/json")
                .json_body(json!({"name": "Grace"}));
            then.status(201)
                .header("content-type", "application/json")
                .json_body(json!({"id": "7", "name": "Grace"}));
        })
        .await;
    let invite = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/api/users/invitations")
                .header("content-type", "application/x-www-form-urlencoded")
                .body("email=grace%40example.com&role=admin");
            then.status(204);
        })
        .await;

    let client = Client::builder(users_contract())
        .with_config(config(&server))
        .build()
        .unwrap();

    let created: Eventual<User> = client
        .call("create", Arguments::new().arg(&json!({"name": "Grace"})))
        .unwrap();
    assert_eq!(created.await.unwrap().id, "7");

    let invited: Eventual<()> = client
        .call(
            "invite",
            Arguments::new().arg(&json!({"email": "grace@example.com", "role": "admin"})),
        )
        .unwrap();
    invited.await.unwrap();

    create.assert_async().await;
    invite.assert_async().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_blocking_call_raises_status_failure() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/api/users/404");
            then.status(404)
                .header("content-type", "application/json")
                .json_body(json!({"title": "not found"}));
        })
        .await;

    let client = Client::builder(users_contract())
        .with_config(config(&server))
        .build()
        .unwrap();

    let err = tokio::task::spawn_blocking(move || {
        client.call::<User>("get", Arguments::new().arg("404"))
    })
    .await
    .unwrap()
    .unwrap_err();

    let failure = err.as_failure().expect("structured failure");
    assert_eq!(failure.kind(), FailureKind::Status);
    assert_eq!(failure.status_code().map(|s| s.as_u16()), Some(404));
}

#[tokio::test]
async fn test_blocking_call_on_current_thread_runtime_is_rejected() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET).path("/api/users/7");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({"id": "7", "name": "Grace"}));
        })
        .await;

    let client = Client::builder(users_contract())
        .with_config(config(&server))
        .build()
        .unwrap();

    let err = client
        .call::<User>("get", Arguments::new().arg("7"))
        .unwrap_err();
    assert!(matches!(
        err,
        ClientError::BlockingOnCurrentThread { ref operation } if operation == "get"
    ));
    mock.assert_hits_async(0).await;

    // The same client still serves non-blocking shapes on this runtime.
    let pending: Eventual<Option<User>> = client
        .call("find", Arguments::new().arg("7").absent().absent())
        .unwrap();
    assert_eq!(pending.await.unwrap().unwrap().name, "Grace");
    mock.assert_async().await;
}

#[tokio::test]
async fn test_connection_refused_is_transport_failure() {
    let config = ClientConfig {
        base_url: Some("http://127.0.0.1:9".to_owned()),
        allow_insecure_http: true,
        ..ClientConfig::default()
    };
    let client = Client::builder(users_contract())
        .with_config(config)
        .build()
        .unwrap();

    let pending: Eventual<Option<User>> = client
        .call("find", Arguments::new().arg("1").absent().absent())
        .unwrap();
    let err = pending.await.unwrap_err();
    assert_eq!(err.as_failure().unwrap().kind(), FailureKind::Transport);
}

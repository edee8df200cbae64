#![allow(clippy::unwrap_used, clippy::expect_used)]

//! End-to-end dispatch over an in-memory transport.

use http::header::CONTENT_TYPE;
use http::{HeaderMap, HeaderValue, StatusCode};
use modkit_client::{
    Adapted, Arguments, Callback, CallbackArg, Client, ClientError, ContractDescription, Declared,
    Eventual, Executor, Failure, FailureKind, HttpRequest, OperationDescription,
    ParameterDeclaration, RawResponse, Recoverable, TransportError,
};
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
struct User {
    id: String,
    name: String,
}

modkit_client::declare_value!(User);

#[derive(Debug, Deserialize)]
struct Problem {
    title: String,
}

type Seen = Arc<Mutex<Vec<HttpRequest>>>;

/// Serves a small user directory and records every request.
fn directory() -> (
    impl Fn(HttpRequest) -> futures::future::Ready<Result<RawResponse, TransportError>>
    + Send
    + Sync
    + 'static,
    Seen,
) {
    let seen: Seen = Arc::default();
    let log = seen.clone();
    let transport = move |request: HttpRequest| {
        let path = request.url.path().to_owned();
        log.lock().unwrap().push(request);

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let (status, body) = match path.as_str() {
            "/api/users/42" => (StatusCode::OK, r#"{"id":"42","name":"Ada"}"#),
            "/api/users/" => (
                StatusCode::OK,
                r#"[{"id":"1","name":"a"},{"id":"2","name":"b"}]"#,
            ),
            "/api/users/gone" => (StatusCode::NO_CONTENT, ""),
            "/api/users/broken" => (
                StatusCode::INTERNAL_SERVER_ERROR,
                r#"{"title":"database unavailable"}"#,
            ),
            _ => (StatusCode::NOT_FOUND, r#"{"title":"no such user"}"#),
        };
        futures::future::ready(Ok(RawResponse::new(status, headers, body)))
    };
    (transport, seen)
}

fn users_contract() -> Arc<ContractDescription> {
    let id = || ParameterDeclaration::path("id", String::descriptor());
    ContractDescription::builder("Users")
        .path("/users")
        .header("accept", "application/json")
        .header("x-trace", "contract")
        .operation(
            OperationDescription::get("find", "/{id}")
                .header("x-trace", "operation")
                .param(id())
                .returns::<Option<User>>(),
        )
        .operation(
            OperationDescription::get("get", "/{id}")
                .param(id())
                .returns::<User>(),
        )
        .operation(
            OperationDescription::get("try_get", "/{id}")
                .param(id())
                .returns::<Result<User, Failure>>(),
        )
        .operation(
            OperationDescription::get("list", "/")
                .param(ParameterDeclaration::query("name", <Vec<String>>::descriptor()))
                .returns::<Eventual<Option<Vec<User>>>>(),
        )
        .operation(
            OperationDescription::get("status", "/{id}")
                .param(id())
                .returns::<StatusCode>(),
        )
        .operation(
            OperationDescription::get("inspect", "/{id}")
                .param(id())
                .returns::<Recoverable<User>>(),
        )
        .operation(
            OperationDescription::get("watch", "/{id}")
                .param(id())
                .param(ParameterDeclaration::callback(<Callback<User>>::descriptor())),
        )
        .default_operation("name_of", |client, arguments| {
            let user: Option<User> = client.call("find", arguments)?;
            Ok(Adapted::Value(json!(user.map(|u| u.name))))
        })
        .build()
}

fn client() -> (Client, Seen) {
    let (transport, seen) = directory();
    let client = Client::builder(users_contract())
        .base_url("https://directory.example.com/api")
        .transport(transport)
        .executor(Executor::Inline)
        .build()
        .unwrap();
    (client, seen)
}

#[test]
fn test_path_template_expanded_from_argument() {
    let (client, seen) = client();

    let user: Option<User> = client.call("find", Arguments::new().arg("42")).unwrap();
    assert_eq!(
        user,
        Some(User {
            id: "42".to_owned(),
            name: "Ada".to_owned()
        })
    );
    assert_eq!(seen.lock().unwrap()[0].url.path(), "/api/users/42");
}

#[test]
fn test_repeated_header_markers_keep_declared_order() {
    let (client, seen) = client();

    let _: Option<User> = client.call("find", Arguments::new().arg("42")).unwrap();

    let requests = seen.lock().unwrap();
    let traces: Vec<_> = requests[0].headers.get_all("x-trace").iter().collect();
    assert_eq!(traces, ["contract", "operation"]);
    assert_eq!(requests[0].headers["accept"], "application/json");
}

#[test]
fn test_plain_shape_raises_while_result_encodes_failure() {
    let (client, _) = client();

    let err = client
        .call::<User>("get", Arguments::new().arg("broken"))
        .unwrap_err();
    let failure = err.as_failure().expect("structured failure");
    assert_eq!(failure.kind(), FailureKind::Status);
    assert_eq!(failure.status_code(), Some(StatusCode::INTERNAL_SERVER_ERROR));

    let result: Result<User, Failure> = client
        .call("try_get", Arguments::new().arg("broken"))
        .unwrap();
    let failure = result.unwrap_err();
    assert_eq!(failure.kind(), FailureKind::Status);
    assert_eq!(
        failure.body_as::<Value>().unwrap()["title"],
        "database unavailable"
    );
}

#[test]
fn test_no_content_is_absent_option() {
    let (client, _) = client();
    let user: Option<User> = client.call("find", Arguments::new().arg("gone")).unwrap();
    assert!(user.is_none());
}

#[test]
fn test_status_shape() {
    let (client, _) = client();
    let status: StatusCode = client.call("status", Arguments::new().arg("42")).unwrap();
    assert_eq!(status, StatusCode::OK);

    let status: StatusCode = client.call("status", Arguments::new().arg("who")).unwrap();
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[test]
fn test_recoverable_error_body_decoded_on_demand() {
    let (client, _) = client();

    let response: Recoverable<User> = client
        .call("inspect", Arguments::new().arg("who"))
        .unwrap();
    assert!(!response.is_success());
    assert_eq!(response.status(), Some(StatusCode::NOT_FOUND));
    let problem: Problem = response.error_as().unwrap().unwrap();
    assert_eq!(problem.title, "no such user");
}

#[test]
fn test_callbacks_receive_value_or_failure() {
    let (client, _) = client();
    let seen = Arc::new(Mutex::new(Vec::new()));

    for id in ["42", "broken"] {
        let (ok, err) = (seen.clone(), seen.clone());
        let callback = CallbackArg::both(
            move |user: User| ok.lock().unwrap().push(format!("user:{}", user.name)),
            move |failure: Failure| err.lock().unwrap().push(format!("failed:{}", failure.kind())),
        );
        client
            .call::<()>("watch", Arguments::new().arg(id).callback(callback))
            .unwrap();
    }

    assert_eq!(*seen.lock().unwrap(), ["user:Ada", "failed:status"]);
}

#[test]
fn test_default_operation_calls_back_into_client() {
    let (client, seen) = client();

    let name: Option<String> = client.call("name_of", Arguments::new().arg("42")).unwrap();
    assert_eq!(name.as_deref(), Some("Ada"));
    assert_eq!(seen.lock().unwrap().len(), 1);
}

#[test]
fn test_describe_and_unknown_operation() {
    let (client, _) = client();

    let description: String = client.call("describe", Arguments::new()).unwrap();
    assert!(description.starts_with("Users client for https://directory.example.com/"));

    assert!(matches!(
        client.dispatch("remove", Arguments::new()),
        Err(ClientError::UnknownOperation(name)) if name == "remove"
    ));
}

#[test]
fn test_serialization_error_is_encode_failure() {
    let (client, seen) = client();
    let result: Result<User, Failure> = client
        .call("try_get", Arguments::new().arg(&f64::NAN))
        .unwrap();
    // NaN serializes to null, so the path variable is missing
    assert_eq!(result.unwrap_err().kind(), FailureKind::Encode);
    assert!(seen.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_blocking_shapes_on_current_thread_runtime_with_default_executor() {
    let (transport, seen) = directory();
    let client = Client::builder(users_contract())
        .base_url("https://directory.example.com/api")
        .transport(transport)
        .build()
        .unwrap();
    assert!(client.executor().is_current_thread());

    let user: Option<User> = client.call("find", Arguments::new().arg("42")).unwrap();
    assert_eq!(user.map(|u| u.name).as_deref(), Some("Ada"));

    let status: StatusCode = client.call("status", Arguments::new().arg("gone")).unwrap();
    assert_eq!(status, StatusCode::NO_CONTENT);

    let err = client
        .call::<User>("get", Arguments::new().arg("broken"))
        .unwrap_err();
    assert_eq!(err.as_failure().unwrap().kind(), FailureKind::Status);
    assert_eq!(seen.lock().unwrap().len(), 3);
}

#[tokio::test]
async fn test_eventual_optional_list_with_query_sequence() {
    let (transport, seen) = directory();
    let client = Client::builder(users_contract())
        .base_url("https://directory.example.com/api")
        .transport(transport)
        .build()
        .unwrap();

    let pending: Eventual<Option<Vec<User>>> = client
        .call("list", Arguments::new().arg(&["a", "b"]))
        .unwrap();
    let users = pending.await.unwrap().unwrap();
    assert_eq!(users.len(), 2);
    assert_eq!(users[1].name, "b");

    let requests = seen.lock().unwrap();
    assert_eq!(requests[0].url.path(), "/api/users/");
    assert_eq!(requests[0].url.query(), Some("name=a&name=b"));
}

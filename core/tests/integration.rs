//! End-to-end tests against the live mock server.
//!
//! # Design
//! Each test starts its own mock server on a random port, so graph state never
//! leaks between tests, and drives the client over real HTTP through
//! `UreqTransport`.
#![cfg(feature = "ureq")]

use std::num::NonZeroUsize;

use graph_core::{generate_signed_request, params, BatchRequest, ClientConfig, Credentials, GraphClient, GraphError, UreqTransport};
use mock_server::{APP_ID, APP_SECRET, CODE_WITHOUT_EXPIRY, MAX_BATCH_SIZE, TOKEN_LIFETIME, USER_TOKEN, VALID_CODE};

/// Start a mock server on a random port and return its base URL.
fn start_server() -> String {
    let std_listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = std_listener.local_addr().unwrap();
    std_listener.set_nonblocking(true).unwrap();

    std::thread::spawn(move || {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            let listener = tokio::net::TcpListener::from_std(std_listener).unwrap();
            mock_server::run(listener).await
        })
    });

    format!("http://{addr}")
}

fn client(base: &str, credentials: Credentials) -> GraphClient {
    GraphClient::with_transport(
        credentials,
        ClientConfig::default().with_base_url(base),
        UreqTransport::new(),
    )
}

fn user_client(base: &str) -> GraphClient {
    client(base, Credentials::from_access_token(USER_TOKEN))
}

fn app_client(base: &str) -> GraphClient {
    client(
        base,
        Credentials::new()
            .with_app(APP_ID, APP_SECRET)
            .with_redirect_uri("https://example.com/cb"),
    )
}

// --- tokens ---

#[test]
fn token_exchanges() {
    let base = start_server();
    let graph = app_client(&base);

    let app = graph.get_app_token().unwrap();
    assert_eq!(app.access_token, format!("{APP_ID}|{APP_SECRET}"));
    assert_eq!(app.expires, None);

    let user = graph.get_user_token_by_code(VALID_CODE).unwrap();
    assert_eq!(user.access_token, USER_TOKEN);
    assert_eq!(user.expires, Some(TOKEN_LIFETIME));

    let extended = graph.get_extended_access_token("short").unwrap();
    assert_eq!(extended.access_token, "long-short");
    assert_eq!(extended.expires, Some(TOKEN_LIFETIME));
}

#[test]
fn user_token_without_expiry_is_a_protocol_error() {
    let base = start_server();
    let err = app_client(&base).get_user_token_by_code(CODE_WITHOUT_EXPIRY).unwrap_err();
    assert!(matches!(err, GraphError::Protocol { ref body, .. } if body == &format!("access_token={USER_TOKEN}")));
}

#[test]
fn rejected_secret_surfaces_oauth_error() {
    let base = start_server();
    let graph = client(&base, Credentials::new().with_app(APP_ID, "wrong"));

    let err = graph.get_app_token().unwrap_err();
    assert_eq!(err.status(), Some(400));
    let info = err.error_info().unwrap();
    assert!(info.is_oauth());
    assert_eq!(info.message, "Error validating client secret.");
}

#[test]
fn rotated_token_authorizes_later_calls() {
    let base = start_server();
    let mut graph = app_client(&base);
    assert!(graph.fetch("me", &params! {}).is_err());

    let user = graph.get_user_token_by_code(VALID_CODE).unwrap();
    graph.set_access_token(user.access_token);
    assert_eq!(graph.fetch("me", &params! {}).unwrap().body()["id"], "me");
}

#[test]
fn signed_request_round_trip_with_app_secret() {
    let base = start_server();
    let graph = app_client(&base);

    let mut claims = serde_json::Map::new();
    claims.insert("user_id".to_string(), "42".into());
    let signed = generate_signed_request(&claims, APP_SECRET).unwrap();

    let parsed = graph.parse_signed_request(&signed).unwrap();
    assert_eq!(parsed["user_id"], "42");
    assert_eq!(parsed["algorithm"], "HMAC-SHA256");

    let forged = generate_signed_request(&claims, "not-the-secret").unwrap();
    assert!(matches!(graph.parse_signed_request(&forged), Err(GraphError::SignatureInvalid)));
}

// --- objects ---

#[test]
fn fetch_publish_and_conditional_get() {
    let base = start_server();
    let graph = user_client(&base);

    let me = graph.fetch("me", &params! { "fields" => vec!["name"] }).unwrap();
    assert_eq!(me.status, 200);
    assert_eq!(me.body()["name"], "Mock User");
    let etag = me.etag.clone().unwrap();

    let unchanged = graph.fetch_with_etag("me", &params! {}, &etag).unwrap();
    assert_eq!(unchanged.status, 304);
    assert!(!unchanged.is_modified);
    assert!(!unchanged.is_failure());
    assert_eq!(unchanged.decoded_body, None);

    graph.publish("me", &params! { "name" => "Renamed" }).unwrap();
    let changed = graph.fetch_with_etag("me", &params! {}, &etag).unwrap();
    assert_eq!(changed.status, 200);
    assert_eq!(changed.body()["name"], "Renamed");
    assert_ne!(changed.etag.as_deref(), Some(etag.as_str()));
}

#[test]
fn missing_object_is_an_http_error() {
    let base = start_server();
    let err = user_client(&base).fetch("nobody", &params! {}).unwrap_err();

    assert_eq!(err.status(), Some(404));
    let info = err.error_info().unwrap();
    assert_eq!(info.kind.as_deref(), Some("GraphMethodException"));
    assert_eq!(info.code, Some(100));
}

#[test]
fn unauthenticated_fetch_is_rejected() {
    let base = start_server();
    let err = client(&base, Credentials::new()).fetch("me", &params! {}).unwrap_err();
    assert!(err.error_info().unwrap().is_oauth());
}

#[test]
fn delete_falls_back_to_post_override() {
    let base = start_server();
    let graph = user_client(&base);

    let created = graph.publish("me/feed", &params! { "message" => "to be removed" }).unwrap();
    let id = created.body()["id"].as_str().unwrap().to_string();

    let deleted = graph.delete_object(&id, &params! {}).unwrap();
    assert_eq!(deleted.status, 200);
    assert_eq!(deleted.body()["success"], true);

    let err = graph.fetch(&id, &params! {}).unwrap_err();
    assert_eq!(err.status(), Some(404));
}

#[test]
fn search_finds_published_posts() {
    let base = start_server();
    let graph = user_client(&base);
    graph.publish("me/feed", &params! { "message" => "Gone fishing" }).unwrap();
    graph.publish("me/feed", &params! { "message" => "At work" }).unwrap();

    let found = graph.search("fishing", "post", &params! {}).unwrap();
    let data = found.body()["data"].as_array().unwrap();
    assert_eq!(data.len(), 1);
    assert_eq!(data[0]["message"], "Gone fishing");
}

#[test]
fn namespaced_action_lands_on_its_edge() {
    let base = start_server();
    let graph = client(&base, Credentials::from_access_token(USER_TOKEN).with_namespace("cookbook"));

    let created = graph.publish_action("cook", &params! { "recipe" => "pie" }).unwrap();
    assert!(created.body()["id"].is_string());

    let page = graph.fetch("me/cookbook:cook", &params! {}).unwrap();
    assert_eq!(page.body()["data"][0]["recipe"], "pie");
}

#[test]
fn pages_follow_next_links() {
    let base = start_server();
    let graph = user_client(&base);
    for i in 0..5 {
        graph.publish("me/feed", &params! { "message" => format!("post {i}") }).unwrap();
    }

    let pages: Vec<_> = graph
        .pages("me/feed", &params! { "limit" => 2 })
        .collect::<Result<_, _>>()
        .unwrap();
    let sizes: Vec<usize> = pages.iter().map(|page| page["data"].as_array().unwrap().len()).collect();
    assert_eq!(sizes, vec![2, 2, 1]);
    assert_eq!(pages[2]["data"][0]["message"], "post 4");
}

// --- batch ---

#[test]
fn large_batch_is_chunked_under_server_limit() {
    let base = start_server();
    let graph = user_client(&base);

    let requests: Vec<BatchRequest> = (0..120)
        .map(|i| BatchRequest::post("me/feed", params! { "message" => format!("m{i}") }))
        .collect();
    let outcomes = graph.batch(&requests).unwrap();
    assert_eq!(outcomes.len(), 120);
    assert!(outcomes.iter().all(|outcome| outcome.status == 200));

    let pages: Vec<_> = graph
        .pages("me/feed", &params! { "limit" => 100 })
        .collect::<Result<_, _>>()
        .unwrap();
    let messages: Vec<String> = pages
        .iter()
        .flat_map(|page| page["data"].as_array().unwrap().clone())
        .map(|post| post["message"].as_str().unwrap().to_string())
        .collect();
    let expected: Vec<String> = (0..120).map(|i| format!("m{i}")).collect();
    assert_eq!(messages, expected);
}

#[test]
fn batch_limit_above_server_cap_is_rejected() {
    let base = start_server();
    let graph = GraphClient::with_transport(
        Credentials::from_access_token(USER_TOKEN),
        ClientConfig::default()
            .with_base_url(&base)
            .with_batch_limit(NonZeroUsize::new(MAX_BATCH_SIZE + 10).unwrap()),
        UreqTransport::new(),
    );

    let requests: Vec<BatchRequest> = (0..MAX_BATCH_SIZE + 1).map(|_| BatchRequest::get("me")).collect();
    let err = graph.batch(&requests).unwrap_err();
    assert_eq!(err.status(), Some(400));
}

#[test]
fn batch_fails_fast_on_sub_error() {
    let base = start_server();
    let requests = [BatchRequest::get("me"), BatchRequest::get("nobody")];

    let err = user_client(&base).batch(&requests).unwrap_err();
    assert_eq!(err.status(), Some(404));
}

#[test]
fn bulk_fetch_returns_bodies_in_order() {
    let base = start_server();
    let graph = user_client(&base);
    let created = graph.publish("me/feed", &params! { "message" => "hello" }).unwrap();
    let id = created.body()["id"].as_str().unwrap().to_string();

    let bodies = graph.bulk_fetch(&[format!("{id}?fields=message"), "me".to_string()]).unwrap();
    assert_eq!(bodies.len(), 2);
    assert_eq!(bodies[0]["message"], "hello");
    assert_eq!(bodies[1]["name"], "Mock User");
}

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Form, Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::{net::TcpListener, sync::RwLock};
use uuid::Uuid;

pub const APP_ID: &str = "mock-app";
pub const APP_SECRET: &str = "mock-secret";
pub const USER_TOKEN: &str = "mock-user-token";
/// Authorization code that yields a user token with an expiry.
pub const VALID_CODE: &str = "valid-code";
/// Authorization code whose token response omits `expires`.
pub const CODE_WITHOUT_EXPIRY: &str = "no-expiry-code";
pub const TOKEN_LIFETIME: u64 = 5_183_951;
pub const MAX_BATCH_SIZE: usize = 50;

#[derive(Clone, Debug)]
pub struct StoredObject {
    pub fields: serde_json::Map<String, Value>,
    pub version: u64,
}

/// In-memory object graph: objects by id, and edge membership by
/// `(parent id, edge name)`.
#[derive(Debug, Default)]
pub struct Graph {
    objects: HashMap<String, StoredObject>,
    edges: HashMap<(String, String), Vec<String>>,
}

pub type Db = Arc<RwLock<Graph>>;

type Reply = (StatusCode, Value);

fn graph_error(status: StatusCode, message: &str, kind: &str, code: u32) -> Reply {
    (
        status,
        json!({"error": {"message": message, "type": kind, "code": code}}),
    )
}

fn missing_token() -> Reply {
    graph_error(
        StatusCode::BAD_REQUEST,
        "An active access token must be used to query information about the current user.",
        "OAuthException",
        2500,
    )
}

fn unsupported(id: &str) -> Reply {
    graph_error(
        StatusCode::NOT_FOUND,
        &format!("Unsupported get request. Object with ID '{id}' does not exist"),
        "GraphMethodException",
        100,
    )
}

impl Graph {
    pub fn seeded() -> Self {
        let mut graph = Self::default();
        graph.insert("me", json!({"id": "me", "name": "Mock User"}));
        graph
    }

    fn insert(&mut self, id: &str, value: Value) {
        let fields = match value {
            Value::Object(fields) => fields,
            _ => serde_json::Map::new(),
        };
        self.objects
            .insert(id.to_string(), StoredObject { fields, version: 1 });
    }

    pub fn etag(&self, id: &str) -> Option<String> {
        self.objects
            .get(id)
            .map(|object| format!("\"{id}-{}\"", object.version))
    }

    pub fn read(&self, id: &str, query: &HashMap<String, String>) -> Reply {
        let Some(object) = self.objects.get(id) else {
            return unsupported(id);
        };
        let mut fields = object.fields.clone();
        if let Some(wanted) = query.get("fields") {
            let wanted: Vec<&str> = wanted.split(',').collect();
            fields.retain(|key, _| key == "id" || wanted.contains(&key.as_str()));
        }
        (StatusCode::OK, Value::Object(fields))
    }

    pub fn read_edge(
        &self,
        base: &str,
        id: &str,
        edge: &str,
        query: &HashMap<String, String>,
    ) -> Reply {
        if !self.objects.contains_key(id) {
            return unsupported(id);
        }
        let members = self
            .edges
            .get(&(id.to_string(), edge.to_string()))
            .cloned()
            .unwrap_or_default();
        let limit = query
            .get("limit")
            .and_then(|l| l.parse().ok())
            .unwrap_or(25usize)
            .max(1);
        let offset = query
            .get("offset")
            .and_then(|o| o.parse().ok())
            .unwrap_or(0usize);

        let data: Vec<Value> = members
            .iter()
            .skip(offset)
            .take(limit)
            .filter_map(|member| self.objects.get(member))
            .map(|object| Value::Object(object.fields.clone()))
            .collect();

        let mut page = json!({ "data": data });
        if offset + limit < members.len() {
            page["paging"] = json!({
                "next": format!("{base}/{id}/{edge}?limit={limit}&offset={}", offset + limit),
            });
        }
        (StatusCode::OK, page)
    }

    pub fn publish(&mut self, id: &str, edge: &str, form: &HashMap<String, String>) -> Reply {
        if !self.objects.contains_key(id) {
            return unsupported(id);
        }
        let new_id = Uuid::new_v4().simple().to_string();
        let mut fields: serde_json::Map<String, Value> = form
            .iter()
            .filter(|(key, _)| key.as_str() != "access_token")
            .map(|(key, value)| (key.clone(), Value::String(value.clone())))
            .collect();
        fields.insert("id".to_string(), Value::String(new_id.clone()));
        self.objects
            .insert(new_id.clone(), StoredObject { fields, version: 1 });
        self.edges
            .entry((id.to_string(), edge.to_string()))
            .or_default()
            .push(new_id.clone());
        (StatusCode::OK, json!({ "id": new_id }))
    }

    /// Objects with any text field containing `term`, ignoring case, ordered by id.
    pub fn search(&self, term: &str) -> Reply {
        let needle = term.to_lowercase();
        let mut hits: Vec<(&String, &StoredObject)> = self
            .objects
            .iter()
            .filter(|(_, object)| {
                object
                    .fields
                    .values()
                    .filter_map(Value::as_str)
                    .any(|text| text.to_lowercase().contains(&needle))
            })
            .collect();
        hits.sort_by(|a, b| a.0.cmp(b.0));
        let data: Vec<Value> = hits
            .into_iter()
            .map(|(_, object)| Value::Object(object.fields.clone()))
            .collect();
        (StatusCode::OK, json!({ "data": data }))
    }

    /// POST to an object: an update, or a delete when `method=delete`.
    pub fn update(&mut self, id: &str, form: &HashMap<String, String>) -> Reply {
        if form.get("method").map(String::as_str) == Some("delete") {
            return self.remove(id);
        }
        let Some(object) = self.objects.get_mut(id) else {
            return unsupported(id);
        };
        for (key, value) in form {
            if key != "access_token" && key != "id" {
                object
                    .fields
                    .insert(key.clone(), Value::String(value.clone()));
            }
        }
        object.version += 1;
        (StatusCode::OK, json!({ "success": true }))
    }

    pub fn remove(&mut self, id: &str) -> Reply {
        if self.objects.remove(id).is_none() {
            return unsupported(id);
        }
        for members in self.edges.values_mut() {
            members.retain(|member| member != id);
        }
        (StatusCode::OK, json!({ "success": true }))
    }
}

pub fn app() -> Router {
    let db: Db = Arc::new(RwLock::new(Graph::seeded()));
    Router::new()
        .route("/", post(batch))
        .route("/oauth/access_token", get(access_token))
        .route("/search", get(search))
        .route(
            "/{id}",
            get(get_object).post(post_object).delete(delete_object),
        )
        .route("/{id}/{edge}", get(get_edge).post(post_edge))
        .with_state(db)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

fn has_token(headers: &HeaderMap, params: &HashMap<String, String>) -> bool {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("OAuth "))
        .is_some_and(|token| !token.is_empty());
    bearer || params.get("access_token").is_some_and(|t| !t.is_empty())
}

fn base_url(headers: &HeaderMap) -> String {
    let host = headers
        .get(header::HOST)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("localhost");
    format!("http://{host}")
}

fn reply((status, body): Reply) -> Response {
    (status, Json(body)).into_response()
}

async fn access_token(Query(query): Query<HashMap<String, String>>) -> Response {
    let client_ok = query.get("client_id").map(String::as_str) == Some(APP_ID)
        && query.get("client_secret").map(String::as_str) == Some(APP_SECRET);
    if !client_ok {
        return reply(graph_error(
            StatusCode::BAD_REQUEST,
            "Error validating client secret.",
            "OAuthException",
            1,
        ));
    }

    let body = match (
        query.get("grant_type").map(String::as_str),
        query.get("code").map(String::as_str),
    ) {
        (Some("client_credentials"), _) => format!("access_token={APP_ID}|{APP_SECRET}"),
        (Some("fb_exchange_token"), _) => match query.get("fb_exchange_token") {
            Some(token) => format!("access_token=long-{token}&expires={TOKEN_LIFETIME}"),
            None => {
                return reply(graph_error(
                    StatusCode::BAD_REQUEST,
                    "Missing fb_exchange_token",
                    "OAuthException",
                    100,
                ))
            }
        },
        (None, Some(code)) if query.contains_key("redirect_uri") => match code {
            VALID_CODE => format!("access_token={USER_TOKEN}&expires={TOKEN_LIFETIME}"),
            CODE_WITHOUT_EXPIRY => format!("access_token={USER_TOKEN}"),
            _ => {
                return reply(graph_error(
                    StatusCode::BAD_REQUEST,
                    "Invalid verification code format.",
                    "OAuthException",
                    100,
                ))
            }
        },
        _ => {
            return reply(graph_error(
                StatusCode::BAD_REQUEST,
                "Missing grant_type or code",
                "OAuthException",
                100,
            ))
        }
    };
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; charset=UTF-8")],
        body,
    )
        .into_response()
}

async fn search(
    State(db): State<Db>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    if !has_token(&headers, &query) {
        return reply(missing_token());
    }
    let (Some(term), Some(_kind)) = (query.get("q"), query.get("type")) else {
        return reply(graph_error(
            StatusCode::BAD_REQUEST,
            "(#100) Search requires both q and type",
            "GraphMethodException",
            100,
        ));
    };
    reply(db.read().await.search(term))
}

async fn get_object(
    State(db): State<Db>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    if !has_token(&headers, &query) {
        return reply(missing_token());
    }
    let graph = db.read().await;
    let Some(etag) = graph.etag(&id) else {
        return reply(unsupported(&id));
    };
    let if_none_match = headers
        .get(header::IF_NONE_MATCH)
        .and_then(|value| value.to_str().ok());
    if if_none_match == Some(etag.as_str()) {
        return (StatusCode::NOT_MODIFIED, [(header::ETAG, etag)]).into_response();
    }
    let (status, body) = graph.read(&id, &query);
    (status, [(header::ETAG, etag)], Json(body)).into_response()
}

async fn post_object(
    State(db): State<Db>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    if !has_token(&headers, &form) {
        return reply(missing_token());
    }
    reply(db.write().await.update(&id, &form))
}

/// This host refuses DELETE; clients must POST `method=delete` instead.
async fn delete_object(Path(id): Path<String>) -> Response {
    reply(graph_error(
        StatusCode::BAD_REQUEST,
        &format!("(#3) DELETE is not supported for object '{id}' on this host"),
        "GraphMethodException",
        3,
    ))
}

async fn get_edge(
    State(db): State<Db>,
    Path((id, edge)): Path<(String, String)>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    if !has_token(&headers, &query) {
        return reply(missing_token());
    }
    reply(db.read().await.read_edge(&base_url(&headers), &id, &edge, &query))
}

async fn post_edge(
    State(db): State<Db>,
    Path((id, edge)): Path<(String, String)>,
    headers: HeaderMap,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    if !has_token(&headers, &form) {
        return reply(missing_token());
    }
    reply(db.write().await.publish(&id, &edge, &form))
}

#[derive(Debug, Deserialize)]
pub struct BatchItem {
    pub method: String,
    pub relative_url: String,
    #[serde(default)]
    pub body: Option<String>,
}

fn parse_form(raw: &str) -> HashMap<String, String> {
    url::form_urlencoded::parse(raw.as_bytes())
        .into_owned()
        .collect()
}

/// Run one sub-request against the graph.
fn execute(graph: &mut Graph, base: &str, item: &BatchItem) -> Reply {
    let (path, query) = item
        .relative_url
        .split_once('?')
        .unwrap_or((item.relative_url.as_str(), ""));
    let query = parse_form(query);
    let form = item.body.as_deref().map(parse_form).unwrap_or_default();
    let segments: Vec<&str> = path
        .trim_matches('/')
        .split('/')
        .filter(|s| !s.is_empty())
        .collect();

    match (item.method.to_ascii_uppercase().as_str(), segments.as_slice()) {
        ("GET", [id]) => graph.read(id, &query),
        ("GET", [id, edge]) => graph.read_edge(base, id, edge, &query),
        ("POST", [id]) => graph.update(id, &form),
        ("POST", [id, edge]) => graph.publish(id, edge, &form),
        ("DELETE", [id]) => graph.remove(id),
        _ => graph_error(
            StatusCode::BAD_REQUEST,
            "Unsupported batch operation",
            "GraphMethodException",
            100,
        ),
    }
}

async fn batch(
    State(db): State<Db>,
    headers: HeaderMap,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    if !has_token(&headers, &form) {
        return reply(missing_token());
    }
    let Some(raw) = form.get("batch") else {
        return reply(graph_error(
            StatusCode::BAD_REQUEST,
            "The parameter batch is required",
            "GraphBatchException",
            100,
        ));
    };
    let items: Vec<BatchItem> = match serde_json::from_str(raw) {
        Ok(items) => items,
        Err(_) => {
            return reply(graph_error(
                StatusCode::BAD_REQUEST,
                "The batch parameter must be a JSON array",
                "GraphBatchException",
                190,
            ))
        }
    };
    if items.len() > MAX_BATCH_SIZE {
        return reply(graph_error(
            StatusCode::BAD_REQUEST,
            &format!("Too many requests in batch message. Maximum batch size is {MAX_BATCH_SIZE}"),
            "GraphBatchException",
            1,
        ));
    }

    let base = base_url(&headers);
    let mut graph = db.write().await;
    let responses: Vec<Value> = items
        .iter()
        .map(|item| {
            let (status, body) = execute(&mut graph, &base, item);
            json!({
                "code": status.as_u16(),
                "headers": [{"name": "Content-Type", "value": "text/javascript; charset=UTF-8"}],
                "body": body.to_string(),
            })
        })
        .collect();
    reply((StatusCode::OK, Value::Array(responses)))
}

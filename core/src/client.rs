//! Graph API client: request building, dispatch and the high-level calls.
//!
//! # Design
//! `GraphClient` owns its credentials, an explicit `ClientConfig` and a boxed
//! `Transport`. Every call goes through the same pipeline:
//! `prepare` → `build_request` → `Transport::send` → `classify`.
//! `build_request` is pure and public, so the exact wire form of any call can
//! be inspected without a network.
//!
//! The client is synchronous. `set_access_token` takes `&mut self`; a client
//! shared between threads needs external locking to rotate its token.

use std::num::NonZeroUsize;

use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use crate::error::{GraphError, Result};
use crate::http::{HttpMethod, HttpRequest, HttpResponse, MultipartForm, RequestBody, Transport};
use crate::params::{has_file, partition, prepare, to_pairs, ParamValue, Params};
use crate::response::{classify, Outcome};
use crate::signed_request;
use crate::types::Credentials;

pub const DEFAULT_GRAPH_URL: &str = "https://graph.facebook.com";
pub const DEFAULT_VIDEO_URL: &str = "https://graph-video.facebook.com";
pub const DEFAULT_BATCH_LIMIT: NonZeroUsize = match NonZeroUsize::new(50) {
    Some(limit) => limit,
    None => unreachable!(),
};

/// Endpoint layout and batching limits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub graph_url: String,
    /// Host that receives video uploads.
    pub video_url: String,
    /// Version segment such as `v19.0`, prefixed to relative paths.
    pub api_version: Option<String>,
    /// Maximum sub-requests per batch call.
    pub batch_limit: NonZeroUsize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            graph_url: DEFAULT_GRAPH_URL.to_string(),
            video_url: DEFAULT_VIDEO_URL.to_string(),
            api_version: None,
            batch_limit: DEFAULT_BATCH_LIMIT,
        }
    }
}

impl ClientConfig {
    /// Point both the graph and video hosts at `base_url`.
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        let base = base_url.trim_end_matches('/').to_string();
        self.graph_url = base.clone();
        self.video_url = base;
        self
    }

    pub fn with_graph_url(mut self, graph_url: &str) -> Self {
        self.graph_url = graph_url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_video_url(mut self, video_url: &str) -> Self {
        self.video_url = video_url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_api_version(mut self, version: impl Into<String>) -> Self {
        self.api_version = Some(version.into());
        self
    }

    pub fn with_batch_limit(mut self, limit: NonZeroUsize) -> Self {
        self.batch_limit = limit;
        self
    }
}

/// Synchronous client for the graph API.
pub struct GraphClient {
    pub(crate) credentials: Credentials,
    pub(crate) config: ClientConfig,
    transport: Box<dyn Transport>,
}

impl std::fmt::Debug for GraphClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphClient")
            .field("app_id", &self.credentials.app_id)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl GraphClient {
    /// Client with the default configuration and the blocking `ureq` transport.
    #[cfg(feature = "ureq")]
    pub fn new(credentials: Credentials) -> Self {
        Self::with_transport(credentials, ClientConfig::default(), crate::transport::UreqTransport::new())
    }

    pub fn with_transport(credentials: Credentials, config: ClientConfig, transport: impl Transport + 'static) -> Self {
        Self {
            credentials,
            config,
            transport: Box::new(transport),
        }
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Replace the access token used by subsequent calls.
    pub fn set_access_token(&mut self, token: impl Into<String>) {
        self.credentials.access_token = Some(token.into());
    }

    /// Build the request for a call without sending it.
    ///
    /// `params` must already be prepared. Query parameters present on
    /// `path_or_url` are merged in, with `params` winning on collisions.
    pub fn build_request(
        &self,
        method: HttpMethod,
        path_or_url: &str,
        params: &Params,
        headers: &[(String, String)],
    ) -> Result<HttpRequest> {
        let mut url = self.resolve_url(path_or_url, has_file(params))?;

        let mut merged: Params = url
            .query_pairs()
            .map(|(key, value)| (key.into_owned(), ParamValue::Text(value.into_owned())))
            .collect();
        merged.extend(params.iter().map(|(key, value)| (key.clone(), value.clone())));
        url.set_query(None);

        let mut headers = headers.to_vec();
        if let Some(token) = self.credentials.token() {
            headers.push(("Authorization".to_string(), format!("OAuth {token}")));
        }

        let body = match method {
            HttpMethod::Get | HttpMethod::Delete => {
                let pairs = to_pairs(&merged)?;
                if !pairs.is_empty() {
                    url.query_pairs_mut().extend_pairs(pairs);
                }
                RequestBody::Empty
            }
            HttpMethod::Post => {
                let (fields, files) = partition(&merged)?;
                if files.is_empty() {
                    RequestBody::Form(fields)
                } else {
                    RequestBody::Multipart(MultipartForm { fields, files })
                }
            }
        };

        Ok(HttpRequest {
            method,
            url: url.into(),
            headers,
            body,
        })
    }

    fn resolve_url(&self, path_or_url: &str, upload: bool) -> Result<Url> {
        let url = if path_or_url.starts_with("http://") || path_or_url.starts_with("https://") {
            Url::parse(path_or_url)?
        } else {
            let mut base = self.config.graph_url.trim_end_matches('/').to_string();
            if let Some(version) = &self.config.api_version {
                base.push('/');
                base.push_str(version.trim_matches('/'));
            }
            Url::parse(&format!("{base}/{}", path_or_url.trim_start_matches('/')))?
        };

        if upload && url.path().trim_end_matches('/').ends_with("/videos") {
            let mut rehosted = Url::parse(&self.config.video_url)?;
            rehosted.set_path(url.path());
            rehosted.set_query(url.query());
            return Ok(rehosted);
        }
        Ok(url)
    }

    /// Prepare parameters, build the request and send it. The raw response
    /// is returned unchanged.
    pub fn dispatch(
        &self,
        method: HttpMethod,
        path_or_url: &str,
        params: &Params,
        headers: &[(String, String)],
    ) -> Result<HttpResponse> {
        let prepared = prepare(params)?;
        let request = self.build_request(method, path_or_url, &prepared, headers)?;
        let target = path_or_url.split('?').next().unwrap_or(path_or_url);

        debug!(%method, path = target, "sending graph request");
        let response = self.transport.send(&request)?;
        debug!(%method, path = target, status = response.status, "received graph response");

        Ok(response)
    }

    fn call(
        &self,
        method: HttpMethod,
        path_or_url: &str,
        params: &Params,
        headers: &[(String, String)],
    ) -> Result<Outcome> {
        classify(&self.dispatch(method, path_or_url, params, headers)?)
    }

    /// Send a request and fail on any non-2xx status other than 304.
    pub fn request(
        &self,
        method: HttpMethod,
        path_or_url: &str,
        params: &Params,
        headers: &[(String, String)],
    ) -> Result<Outcome> {
        self.call(method, path_or_url, params, headers)?.into_result()
    }

    pub fn fetch(&self, path: &str, params: &Params) -> Result<Outcome> {
        self.request(HttpMethod::Get, path, params, &[])
    }

    /// Same as `fetch`.
    pub fn get(&self, path: &str, params: &Params) -> Result<Outcome> {
        self.fetch(path, params)
    }

    pub fn publish(&self, path: &str, params: &Params) -> Result<Outcome> {
        self.request(HttpMethod::Post, path, params, &[])
    }

    /// Same as `publish`.
    pub fn post(&self, path: &str, params: &Params) -> Result<Outcome> {
        self.publish(path, params)
    }

    /// Conditional GET. An unchanged resource yields an outcome with
    /// `is_modified == false` and no body.
    pub fn fetch_with_etag(&self, path: &str, params: &Params, etag: &str) -> Result<Outcome> {
        let headers = [("If-None-Match".to_string(), etag.to_string())];
        self.request(HttpMethod::Get, path, params, &headers)
    }

    /// Delete an object. Hosts that reject DELETE get one retry as a POST
    /// carrying `method=delete`, whose result is returned instead.
    pub fn delete_object(&self, path: &str, params: &Params) -> Result<Outcome> {
        let outcome = self.call(HttpMethod::Delete, path, params, &[])?;
        if outcome.is_success {
            return Ok(outcome);
        }

        warn!(path, status = outcome.status, "DELETE failed, retrying as POST with method=delete");
        let mut params = params.clone();
        params.insert("method".to_string(), ParamValue::from("delete"));
        self.request(HttpMethod::Post, path, &params, &[])
    }

    /// Publish an app-namespaced action, `me/{namespace}:{action}`.
    pub fn publish_action(&self, action: &str, params: &Params) -> Result<Outcome> {
        let namespace = self
            .credentials
            .namespace
            .as_deref()
            .filter(|namespace| !namespace.is_empty())
            .ok_or_else(|| GraphError::Configuration("an app namespace is required to publish actions".to_string()))?;
        if action.is_empty() {
            return Err(GraphError::InvalidParameter("action name is empty".to_string()));
        }
        self.publish(&format!("me/{namespace}:{action}"), params)
    }

    /// Search the graph for `term` among objects of type `kind`.
    pub fn search(&self, term: &str, kind: &str, params: &Params) -> Result<Outcome> {
        let mut params = params.clone();
        params.insert("q".to_string(), ParamValue::from(term));
        params.insert("type".to_string(), ParamValue::from(kind));
        self.fetch("search", &params)
    }

    /// Iterate over the pages of a paginated edge, following `paging.next`.
    pub fn pages(&self, path: &str, params: &Params) -> Pages<'_> {
        Pages {
            client: self,
            next: Some((path.to_string(), params.clone())),
        }
    }

    /// Verify a signed request with the configured application secret.
    pub fn parse_signed_request(&self, signed_request: &str) -> Result<serde_json::Map<String, Value>> {
        let secret = self.credentials.secret.as_deref().ok_or_else(|| {
            GraphError::Configuration("an application secret is required for signed requests".to_string())
        })?;
        signed_request::parse_signed_request(signed_request, secret)
    }
}

/// Page bodies of a paginated edge. Stops after a page without a
/// `paging.next` link, at the first empty `data` page, or after an error.
pub struct Pages<'a> {
    client: &'a GraphClient,
    next: Option<(String, Params)>,
}

impl Iterator for Pages<'_> {
    type Item = Result<Value>;

    fn next(&mut self) -> Option<Self::Item> {
        let (path, params) = self.next.take()?;
        let page = match self.client.fetch(&path, &params) {
            Ok(outcome) => outcome.into_body(),
            Err(err) => return Some(Err(err)),
        };

        let has_data = page
            .get("data")
            .and_then(Value::as_array)
            .is_some_and(|data| !data.is_empty());
        if !has_data {
            return None;
        }

        self.next = page
            .pointer("/paging/next")
            .and_then(Value::as_str)
            .map(|next| (next.to_string(), Params::new()));
        Some(Ok(page))
    }
}

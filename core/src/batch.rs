//! Batch requests.
//!
//! # Design
//! Sub-requests are split into consecutive chunks of at most
//! `ClientConfig::batch_limit` items. Each chunk is one POST to the API root
//! carrying the access token and a JSON array of `BatchItem`s. Chunks are sent
//! in order and each is fully resolved before the next goes out, so results
//! line up with the input.
//!
//! `batch` classifies every sub-response and fails on the first failure in a
//! chunk. `batch_fast` hands back the raw sub-response values untouched.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::client::GraphClient;
use crate::error::{GraphError, Result};
use crate::http::{HttpMethod, HttpResponse};
use crate::params::{encode_form, Params};
use crate::response::{classify, Outcome};

/// One logical call inside a batch.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchRequest {
    pub method: HttpMethod,
    pub relative_url: String,
    /// Form body for POST; appended as a query string for other methods.
    pub body: Option<Params>,
    /// Name other items can reference in JSONPath expressions.
    pub name: Option<String>,
}

impl BatchRequest {
    pub fn new(method: HttpMethod, relative_url: impl Into<String>) -> Self {
        Self {
            method,
            relative_url: relative_url.into(),
            body: None,
            name: None,
        }
    }

    pub fn get(relative_url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, relative_url)
    }

    pub fn post(relative_url: impl Into<String>, body: Params) -> Self {
        Self::new(HttpMethod::Post, relative_url).with_body(body)
    }

    pub fn delete(relative_url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Delete, relative_url)
    }

    pub fn with_body(mut self, body: Params) -> Self {
        self.body = Some(body);
        self
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// Wire form of a sub-request inside the batch envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchItem {
    pub method: HttpMethod,
    pub relative_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl BatchItem {
    /// Flatten a request: POST bodies become one form-encoded string, other
    /// methods carry their parameters on `relative_url`.
    pub fn from_request(request: &BatchRequest) -> Result<Self> {
        let encoded = request.body.as_ref().map(encode_form).transpose()?.filter(|body| !body.is_empty());

        let (relative_url, body) = match (request.method, encoded) {
            (HttpMethod::Post, body) => (request.relative_url.clone(), body),
            (_, Some(query)) => {
                let separator = if request.relative_url.contains('?') { '&' } else { '?' };
                (format!("{}{separator}{query}", request.relative_url), None)
            }
            (_, None) => (request.relative_url.clone(), None),
        };

        Ok(Self {
            method: request.method,
            relative_url,
            body,
            name: request.name.clone(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct SubResponse {
    code: u16,
    #[serde(default)]
    headers: Vec<SubResponseHeader>,
    #[serde(default)]
    body: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SubResponseHeader {
    name: String,
    value: String,
}

impl From<SubResponse> for HttpResponse {
    fn from(sub: SubResponse) -> Self {
        HttpResponse {
            status: sub.code,
            status_message: String::new(),
            headers: sub.headers.into_iter().map(|h| (h.name, h.value)).collect(),
            body: sub.body.unwrap_or_default(),
        }
    }
}

/// Classify one raw sub-response.
fn classify_item(index: usize, raw: Value) -> Result<Outcome> {
    if raw.is_null() {
        return Err(GraphError::protocol(
            format!("batch item {index} returned no response"),
            "null",
        ));
    }
    let text = raw.to_string();
    let sub: SubResponse = serde_json::from_value(raw)
        .map_err(|err| GraphError::protocol(format!("batch item {index} is malformed: {err}"), text))?;
    classify(&HttpResponse::from(sub))?.into_result()
}

impl GraphClient {
    /// Send `requests` as batches and classify every sub-response.
    ///
    /// Returns one outcome per request, in input order. The first failing
    /// sub-response aborts the call with its error.
    pub fn batch(&self, requests: &[BatchRequest]) -> Result<Vec<Outcome>> {
        let mut outcomes = Vec::with_capacity(requests.len());
        self.for_each_chunk(requests, |offset, raw| {
            for (index, item) in raw.into_iter().enumerate() {
                outcomes.push(classify_item(offset + index, item)?);
            }
            Ok(())
        })?;
        Ok(outcomes)
    }

    /// Send `requests` as batches and return the raw sub-response values,
    /// in input order, without classifying them.
    pub fn batch_fast(&self, requests: &[BatchRequest]) -> Result<Vec<Value>> {
        let mut responses = Vec::with_capacity(requests.len());
        self.for_each_chunk(requests, |_, raw| {
            responses.extend(raw);
            Ok(())
        })?;
        Ok(responses)
    }

    /// GET several paths in as few round-trips as possible.
    ///
    /// Each entry is the decoded sub-response body, the raw body text when it
    /// is not JSON, or `null` when the item produced no response.
    pub fn bulk_fetch<S: AsRef<str>>(&self, paths: &[S]) -> Result<Vec<Value>> {
        let requests: Vec<BatchRequest> = paths.iter().map(|path| BatchRequest::get(path.as_ref())).collect();
        Ok(self
            .batch_fast(&requests)?
            .into_iter()
            .map(|raw| match raw.get("body").and_then(Value::as_str) {
                Some(body) => serde_json::from_str(body).unwrap_or_else(|_| Value::String(body.to_string())),
                None => Value::Null,
            })
            .collect())
    }

    fn for_each_chunk(
        &self,
        requests: &[BatchRequest],
        mut on_chunk: impl FnMut(usize, Vec<Value>) -> Result<()>,
    ) -> Result<()> {
        let token = self
            .credentials
            .token()
            .ok_or_else(|| GraphError::Configuration("an access token is required for batch requests".to_string()))?;

        let limit = self.config.batch_limit.get();
        for (index, chunk) in requests.chunks(limit).enumerate() {
            info!(chunk = index, size = chunk.len(), "dispatching batch chunk");
            let raw = self.dispatch_chunk(token, chunk)?;
            on_chunk(index * limit, raw)?;
        }
        Ok(())
    }

    fn dispatch_chunk(&self, token: &str, chunk: &[BatchRequest]) -> Result<Vec<Value>> {
        let items = chunk.iter().map(BatchItem::from_request).collect::<Result<Vec<_>>>()?;
        let params = crate::params! {
            "access_token" => token,
            "batch" => serde_json::to_string(&items)?,
        };

        let response = self.dispatch(HttpMethod::Post, "/", &params, &[])?;
        let outcome = classify(&response)?.into_result()?;

        match outcome.decoded_body {
            Some(Value::Array(raw)) if raw.len() == chunk.len() => Ok(raw),
            Some(Value::Array(raw)) => Err(GraphError::protocol(
                format!("batch returned {} responses for {} requests", raw.len(), chunk.len()),
                response.body,
            )),
            _ => Err(GraphError::protocol("batch response is not a JSON array", response.body)),
        }
    }
}

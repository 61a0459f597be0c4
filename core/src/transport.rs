//! Blocking transport built on `ureq`.

use ureq::typestate::{WithBody, WithoutBody};
use ureq::RequestBuilder;
use uuid::Uuid;

use crate::http::{HttpMethod, HttpRequest, HttpResponse, RequestBody, Transport, TransportError};

/// Default transport for `GraphClient::new`.
///
/// Non-2xx statuses come back as responses, not errors, so the client can
/// classify them.
#[derive(Debug, Clone)]
pub struct UreqTransport {
    agent: ureq::Agent,
}

impl UreqTransport {
    pub fn new() -> Self {
        Self::with_agent(
            ureq::Agent::config_builder()
                .http_status_as_error(false)
                .build()
                .new_agent(),
        )
    }

    /// Use a preconfigured agent (timeouts, proxy). It must have
    /// `http_status_as_error` disabled.
    pub fn with_agent(agent: ureq::Agent) -> Self {
        Self { agent }
    }
}

impl Default for UreqTransport {
    fn default() -> Self {
        Self::new()
    }
}

fn with_headers<B>(mut builder: RequestBuilder<B>, headers: &[(String, String)]) -> RequestBuilder<B> {
    for (name, value) in headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    builder
}

fn send_body(builder: RequestBuilder<WithBody>, body: &RequestBody) -> Result<ureq::http::Response<ureq::Body>, ureq::Error> {
    match body {
        RequestBody::Empty => builder.send_empty(),
        RequestBody::Form(pairs) => {
            let encoded = url::form_urlencoded::Serializer::new(String::new())
                .extend_pairs(pairs)
                .finish();
            builder
                .content_type("application/x-www-form-urlencoded")
                .send(encoded.as_bytes())
        }
        RequestBody::Multipart(form) => {
            let boundary = format!("graph-boundary-{}", Uuid::new_v4().simple());
            let encoded = form.encode(&boundary);
            builder
                .content_type(format!("multipart/form-data; boundary={boundary}"))
                .send(encoded.as_slice())
        }
    }
}

fn call(builder: RequestBuilder<WithoutBody>) -> Result<ureq::http::Response<ureq::Body>, ureq::Error> {
    builder.call()
}

impl Transport for UreqTransport {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        let result = match request.method {
            HttpMethod::Get => call(with_headers(self.agent.get(&request.url), &request.headers)),
            HttpMethod::Delete => call(with_headers(self.agent.delete(&request.url), &request.headers)),
            HttpMethod::Post => send_body(with_headers(self.agent.post(&request.url), &request.headers), &request.body),
        };
        let mut response = result.map_err(|err| TransportError::new(err.to_string()))?;

        let status = response.status();
        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();
        let body = response
            .body_mut()
            .read_to_string()
            .map_err(|err| TransportError::new(format!("failed to read response body: {err}")))?;

        Ok(HttpResponse {
            status: status.as_u16(),
            status_message: status.canonical_reason().unwrap_or_default().to_string(),
            headers,
            body,
        })
    }
}

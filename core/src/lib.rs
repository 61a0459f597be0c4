//! Synchronous client core for a social graph API.
//!
//! # Overview
//! Prepares parameters (including field-expansion encoding), verifies signed
//! requests, exchanges OAuth tokens, batches many calls into few round-trips
//! and classifies responses into outcomes.
//!
//! # Design
//! - All network I/O sits behind the `Transport` trait. `UreqTransport` is the
//!   default (cargo feature `ureq`); tests script their own.
//! - `GraphClient::build_request` is pure, so the wire form of any call can be
//!   checked without a server.
//! - Parameter values are a closed enum (`ParamValue`) held in a sorted map,
//!   which keeps every encoding deterministic.
//! - Nothing is retried except a rejected DELETE, which is replayed once as a
//!   POST with `method=delete`.

pub mod batch;
pub mod client;
pub mod error;
pub mod fields;
pub mod http;
pub mod params;
pub mod response;
pub mod signed_request;
pub mod token;
#[cfg(feature = "ureq")]
pub mod transport;
pub mod types;

#[cfg(test)]
mod testing;

pub use batch::{BatchItem, BatchRequest};
pub use client::{ClientConfig, GraphClient, Pages};
pub use error::{GraphError, Result};
pub use fields::encode_fields;
pub use http::{HttpMethod, HttpRequest, HttpResponse, MultipartForm, RequestBody, Transport, TransportError};
pub use params::{encode_form, prepare, FileSource, ParamValue, Params};
pub use response::{classify, ErrorInfo, Outcome};
pub use signed_request::{generate_signed_request, parse_signed_request};
pub use token::parse_token_response;
#[cfg(feature = "ureq")]
pub use transport::UreqTransport;
pub use types::{Credentials, TokenResult};

//! OAuth token exchange.
//!
//! The token endpoint answers with a form-encoded body
//! (`access_token=...&expires=...`), not JSON. Newer API versions answer with
//! a JSON object instead; both are accepted.

use std::collections::HashMap;

use serde_json::Value;
use tracing::debug;

use crate::client::GraphClient;
use crate::error::{GraphError, Result};
use crate::http::HttpMethod;
use crate::params::{ParamValue, Params};
use crate::response::classify;
use crate::types::TokenResult;

pub const TOKEN_PATH: &str = "oauth/access_token";

/// Parse a token endpoint body.
///
/// A missing `access_token` is a protocol error carrying the raw body; a
/// non-numeric `expires` is a format error.
pub fn parse_token_response(body: &str) -> Result<TokenResult> {
    let trimmed = body.trim();

    let (access_token, expires, token_type) = if trimmed.starts_with('{') {
        let value: Value = serde_json::from_str(trimmed)
            .map_err(|err| GraphError::Format(format!("token response is not valid JSON: {err}")))?;
        let expires = match value.get("expires").or_else(|| value.get("expires_in")) {
            None | Some(Value::Null) => None,
            Some(Value::Number(n)) => Some(
                n.as_u64()
                    .ok_or_else(|| GraphError::Format(format!("`expires` is not a valid lifetime: {n}")))?,
            ),
            Some(Value::String(s)) => Some(parse_expires(s)?),
            Some(other) => return Err(GraphError::Format(format!("`expires` is not a valid lifetime: {other}"))),
        };
        (
            value.get("access_token").and_then(Value::as_str).map(str::to_string),
            expires,
            value.get("token_type").and_then(Value::as_str).map(str::to_string),
        )
    } else {
        let mut fields: HashMap<String, String> = url::form_urlencoded::parse(trimmed.as_bytes())
            .into_owned()
            .collect();
        let expires = fields
            .remove("expires")
            .or_else(|| fields.remove("expires_in"))
            .map(|raw| parse_expires(&raw))
            .transpose()?;
        (fields.remove("access_token"), expires, fields.remove("token_type"))
    };

    let access_token = access_token
        .filter(|token| !token.is_empty())
        .ok_or_else(|| GraphError::protocol("token response did not include an access_token", body))?;

    Ok(TokenResult {
        access_token,
        expires,
        token_type,
    })
}

fn parse_expires(raw: &str) -> Result<u64> {
    raw.trim()
        .parse()
        .map_err(|_| GraphError::Format(format!("`expires` is not a valid lifetime: {raw:?}")))
}

impl GraphClient {
    /// Exchange the app credentials plus `extra` for a token.
    pub fn exchange_token(&self, extra: Params) -> Result<TokenResult> {
        self.exchange(extra).map(|(token, _)| token)
    }

    fn exchange(&self, mut params: Params) -> Result<(TokenResult, String)> {
        let app_id = self.credentials.app_id.as_deref().filter(|id| !id.is_empty());
        let secret = self.credentials.secret.as_deref().filter(|secret| !secret.is_empty());
        let (Some(app_id), Some(secret)) = (app_id, secret) else {
            return Err(GraphError::Configuration(
                "an application id and secret are required to exchange tokens".to_string(),
            ));
        };
        params.insert("client_id".to_string(), ParamValue::from(app_id));
        params.insert("client_secret".to_string(), ParamValue::from(secret));

        debug!(
            grant_type = params.get("grant_type").and_then(ParamValue::scalar_text).as_deref(),
            "exchanging OAuth token"
        );
        let response = self.dispatch(HttpMethod::Get, TOKEN_PATH, &params, &[])?;

        if !(200..300).contains(&response.status) {
            classify(&response)?.into_result()?;
            return Err(GraphError::protocol(
                format!("unexpected status {} from the token endpoint", response.status),
                response.body,
            ));
        }

        let token = parse_token_response(&response.body)?;
        Ok((token, response.body))
    }

    /// Application access token (client credentials grant).
    pub fn get_app_token(&self) -> Result<TokenResult> {
        self.exchange_token(crate::params! { "grant_type" => "client_credentials" })
    }

    /// Exchange an authorization code for a user access token.
    ///
    /// The server always reports an expiry for this grant; a response without
    /// one is a protocol error.
    pub fn get_user_token_by_code(&self, code: &str) -> Result<TokenResult> {
        let redirect_uri = self.credentials.redirect_uri.as_deref().ok_or_else(|| {
            GraphError::Configuration("a redirect URI is required to exchange an authorization code".to_string())
        })?;
        if code.is_empty() {
            return Err(GraphError::InvalidParameter("authorization code is empty".to_string()));
        }

        let (token, body) = self.exchange(crate::params! { "redirect_uri" => redirect_uri, "code" => code })?;
        if token.expires.is_none() {
            return Err(GraphError::protocol("user token response did not include `expires`", body));
        }
        Ok(token)
    }

    /// Trade a short-lived user token for a long-lived one.
    pub fn get_extended_access_token(&self, access_token: &str) -> Result<TokenResult> {
        if access_token.is_empty() {
            return Err(GraphError::InvalidParameter("access token to extend is empty".to_string()));
        }
        self.exchange_token(crate::params! {
            "grant_type" => "fb_exchange_token",
            "fb_exchange_token" => access_token,
        })
    }
}

//! Signed request verification.
//!
//! A signed request is `<signature>.<payload>`, both URL-safe base64. The
//! payload is a JSON object naming its `algorithm`; the signature is
//! HMAC-SHA256 over the encoded payload text, keyed by the app secret.

use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig, URL_SAFE_NO_PAD};
use base64::engine::DecodePaddingMode;
use base64::Engine;
use hmac::{Hmac, Mac};
use serde_json::{Map, Value};
use sha2::Sha256;

use crate::error::{GraphError, Result};

type HmacSha256 = Hmac<Sha256>;

pub const SIGNED_REQUEST_ALGORITHM: &str = "HMAC-SHA256";

/// URL-safe alphabet that accepts input with or without `=` padding.
const URL_SAFE_LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

fn mac_for(secret: &str) -> Result<HmacSha256> {
    if secret.is_empty() {
        return Err(GraphError::Configuration(
            "an application secret is required for signed requests".to_string(),
        ));
    }
    HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|err| GraphError::Configuration(format!("unusable application secret: {err}")))
}

/// Verify a signed request and return its claims.
///
/// The algorithm is checked before the signature, and the signature is
/// compared in constant time.
pub fn parse_signed_request(signed_request: &str, secret: &str) -> Result<Map<String, Value>> {
    let mut mac = mac_for(secret)?;

    let parts: Vec<&str> = signed_request.split('.').collect();
    let [encoded_signature, encoded_payload] = parts.as_slice() else {
        return Err(GraphError::Format(format!(
            "signed request must have 2 parts separated by '.', found {}",
            parts.len()
        )));
    };

    let signature = URL_SAFE_LENIENT
        .decode(encoded_signature)
        .map_err(|err| GraphError::Format(format!("signature is not URL-safe base64: {err}")))?;
    let payload = URL_SAFE_LENIENT
        .decode(encoded_payload)
        .map_err(|err| GraphError::Format(format!("payload is not URL-safe base64: {err}")))?;

    let claims = match serde_json::from_slice::<Value>(&payload) {
        Ok(Value::Object(claims)) => claims,
        Ok(_) => return Err(GraphError::Format("signed request payload is not a JSON object".to_string())),
        Err(err) => return Err(GraphError::Format(format!("signed request payload is not JSON: {err}"))),
    };

    match claims.get("algorithm").and_then(Value::as_str) {
        Some(algorithm) if algorithm.eq_ignore_ascii_case(SIGNED_REQUEST_ALGORITHM) => {}
        Some(algorithm) => return Err(GraphError::AlgorithmMismatch(algorithm.to_string())),
        None => return Err(GraphError::AlgorithmMismatch("<missing>".to_string())),
    }

    mac.update(encoded_payload.as_bytes());
    mac.verify_slice(&signature).map_err(|_| GraphError::SignatureInvalid)?;

    Ok(claims)
}

/// Produce a signed request for `claims`, setting `algorithm` to HMAC-SHA256.
pub fn generate_signed_request(claims: &Map<String, Value>, secret: &str) -> Result<String> {
    let mut mac = mac_for(secret)?;

    let mut claims = claims.clone();
    claims.insert(
        "algorithm".to_string(),
        Value::String(SIGNED_REQUEST_ALGORITHM.to_string()),
    );
    let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims)?);

    mac.update(payload.as_bytes());
    let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

    Ok(format!("{signature}.{payload}"))
}

use crate::core::errors::ExchangeError;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::collections::HashMap;

/// Headers to attach to a signed request
pub type SignedHeaders = HashMap<String, String>;

/// Signer trait for request authentication
///
/// Implementations turn the final request line and body into the headers the
/// exchange expects. The request URI passed in is exactly what goes on the
/// wire (path plus query string, if any), so implementations never have to
/// re-encode parameters themselves.
pub trait Signer: Send + Sync {
    /// Sign a request and return the headers to attach
    ///
    /// # Arguments
    /// * `method` - HTTP method (GET, POST, etc.)
    /// * `request_uri` - Path and query of the resolved URL, e.g. `/v1/ticker?product_code=BTC_JPY`
    /// * `body` - Raw request body bytes
    /// * `timestamp` - Request timestamp in Unix seconds
    fn sign_request(
        &self,
        method: &str,
        request_uri: &str,
        body: &[u8],
        timestamp: u64,
    ) -> Result<SignedHeaders, ExchangeError>;
}

/// Lowercase hex HMAC-SHA256 over the concatenation of `parts`
pub fn hmac_sha256_hex(secret: &[u8], parts: &[&[u8]]) -> Result<String, ExchangeError> {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret)
        .map_err(|e| ExchangeError::AuthError(format!("Invalid secret key: {}", e)))?;

    for part in parts {
        mac.update(part);
    }

    Ok(hex::encode(mac.finalize().into_bytes()))
}

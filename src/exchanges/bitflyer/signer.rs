use crate::core::errors::ExchangeError;
use crate::core::kernel::{hmac_sha256_hex, SignedHeaders, Signer};
use secrecy::{ExposeSecret, Secret};

pub const HEADER_ACCESS_KEY: &str = "ACCESS-KEY";
pub const HEADER_ACCESS_TIMESTAMP: &str = "ACCESS-TIMESTAMP";
pub const HEADER_ACCESS_SIGN: &str = "ACCESS-SIGN";

/// Signature over `timestamp + method + path + body`.
///
/// `path` is the request URI including the query string, exactly as sent.
pub fn sign(
    secret: &str,
    timestamp: &str,
    method: &str,
    path: &str,
    body: &[u8],
) -> Result<String, ExchangeError> {
    hmac_sha256_hex(
        secret.as_bytes(),
        &[
            timestamp.as_bytes(),
            method.as_bytes(),
            path.as_bytes(),
            body,
        ],
    )
}

/// bitFlyer Lightning HMAC-SHA256 signer
#[derive(Debug, Clone)]
pub struct BitflyerSigner {
    api_key: String,
    secret_key: Secret<String>,
}

impl BitflyerSigner {
    pub fn new(api_key: String, secret_key: String) -> Self {
        Self {
            api_key,
            secret_key: Secret::new(secret_key),
        }
    }
}

impl Signer for BitflyerSigner {
    fn sign_request(
        &self,
        method: &str,
        request_uri: &str,
        body: &[u8],
        timestamp: u64,
    ) -> Result<SignedHeaders, ExchangeError> {
        let timestamp = timestamp.to_string();
        let signature = sign(
            self.secret_key.expose_secret(),
            &timestamp,
            method,
            request_uri,
            body,
        )?;

        let mut headers = SignedHeaders::new();
        headers.insert(HEADER_ACCESS_KEY.to_string(), self.api_key.clone());
        headers.insert(HEADER_ACCESS_TIMESTAMP.to_string(), timestamp);
        headers.insert(HEADER_ACCESS_SIGN.to_string(), signature);
        headers.insert("Content-Type".to_string(), "application/json".to_string());

        Ok(headers)
    }
}

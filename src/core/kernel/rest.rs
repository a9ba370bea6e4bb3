use crate::core::errors::ExchangeError;
use crate::core::kernel::signer::Signer;
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Method, Response, Url};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, instrument, trace};

/// HTTP request executor.
///
/// `endpoint` is a URI reference: relative ones resolve against the base
/// URL, absolute ones are used as they are.
#[async_trait]
pub trait RestClient: Send + Sync {
    /// Send one request and return the raw body of a 2xx response.
    ///
    /// With `authenticated` set, a client that cannot sign fails with
    /// `AuthError` instead of sending the request unsigned.
    async fn execute(
        &self,
        method: Method,
        endpoint: &str,
        query_params: &[(&str, &str)],
        body: &[u8],
        authenticated: bool,
    ) -> Result<Vec<u8>, ExchangeError>;

    /// GET `endpoint` and decode the body as `T`
    async fn get_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        query_params: &[(&str, &str)],
        authenticated: bool,
    ) -> Result<T, ExchangeError>;
}

#[derive(Clone, Debug)]
pub struct RestClientConfig {
    /// Relative endpoints resolve against this; keep the trailing `/`
    pub base_url: String,
    /// Label attached to spans and log lines
    pub exchange_name: String,
    /// `None` leaves the HTTP client default in place
    pub timeout_seconds: Option<u64>,
    pub user_agent: String,
}

impl RestClientConfig {
    pub fn new(base_url: String, exchange_name: String) -> Self {
        Self {
            base_url,
            exchange_name,
            timeout_seconds: None,
            user_agent: concat!("flyerx/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }

    pub fn with_timeout(mut self, timeout_seconds: u64) -> Self {
        self.timeout_seconds = Some(timeout_seconds);
        self
    }

    pub fn with_user_agent(mut self, user_agent: String) -> Self {
        self.user_agent = user_agent;
        self
    }
}

/// Assembles a [`ReqwestRest`], optionally with a request signer
pub struct RestClientBuilder {
    config: RestClientConfig,
    signer: Option<Arc<dyn Signer>>,
}

impl RestClientBuilder {
    pub fn new(config: RestClientConfig) -> Self {
        Self {
            config,
            signer: None,
        }
    }

    /// Sign every request with `signer`
    pub fn with_signer(mut self, signer: Arc<dyn Signer>) -> Self {
        self.signer = Some(signer);
        self
    }

    /// Fails with `InvalidParameters` when the base URL does not parse
    pub fn build(self) -> Result<ReqwestRest, ExchangeError> {
        let base_url = Url::parse(&self.config.base_url).map_err(|e| {
            ExchangeError::InvalidParameters(format!(
                "Invalid base URL '{}': {}",
                self.config.base_url, e
            ))
        })?;

        let mut builder = Client::builder().user_agent(&self.config.user_agent);
        if let Some(timeout) = self.config.timeout_seconds {
            builder = builder.timeout(std::time::Duration::from_secs(timeout));
        }
        let client = builder.build().map_err(|e| {
            ExchangeError::NetworkError(format!("Failed to build HTTP client: {}", e))
        })?;

        Ok(ReqwestRest {
            client,
            base_url,
            config: self.config,
            signer: self.signer,
        })
    }
}

/// `reqwest` backed [`RestClient`]
#[derive(Clone)]
pub struct ReqwestRest {
    client: Client,
    base_url: Url,
    config: RestClientConfig,
    signer: Option<Arc<dyn Signer>>,
}

impl std::fmt::Debug for ReqwestRest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReqwestRest")
            .field("config", &self.config)
            .field("has_signer", &self.signer.is_some())
            .finish_non_exhaustive()
    }
}

impl ReqwestRest {
    /// Whether requests will carry signature headers
    pub fn can_sign(&self) -> bool {
        self.signer.is_some()
    }

    /// Resolve an endpoint against the base URL (RFC 3986 reference resolution)
    pub fn resolve_endpoint(&self, endpoint: &str) -> Result<Url, ExchangeError> {
        self.base_url.join(endpoint).map_err(|e| {
            ExchangeError::InvalidParameters(format!("Invalid endpoint '{}': {}", endpoint, e))
        })
    }

    /// Read the whole body; non-2xx statuses become `ApiError`
    #[instrument(skip(self, response), fields(exchange = %self.config.exchange_name, status = %response.status()))]
    async fn handle_response(&self, response: Response) -> Result<Vec<u8>, ExchangeError> {
        let status = response.status();
        let body = response.bytes().await.map_err(|e| {
            ExchangeError::NetworkError(format!("Failed to read response body: {}", e))
        })?;

        trace!("Response body: {}", String::from_utf8_lossy(&body));

        if status.is_success() {
            Ok(body.to_vec())
        } else {
            Err(ExchangeError::ApiError {
                code: i32::from(status.as_u16()),
                message: String::from_utf8_lossy(&body).into_owned(),
            })
        }
    }

    /// Every request is signed when a signer is configured; `authenticated`
    /// only decides whether a missing signer is an error.
    #[instrument(skip(self, query_params, body), fields(exchange = %self.config.exchange_name, method = %method, endpoint = %endpoint))]
    async fn make_request(
        &self,
        method: Method,
        endpoint: &str,
        query_params: &[(&str, &str)],
        body: &[u8],
        authenticated: bool,
    ) -> Result<Vec<u8>, ExchangeError> {
        let mut url = self.resolve_endpoint(endpoint)?;
        apply_query(&mut url, query_params);
        debug!("action=execute endpoint={}", url);

        let headers = match (&self.signer, authenticated) {
            (Some(signer), _) => {
                let timestamp = unix_timestamp_secs()?;
                Some(signer.sign_request(method.as_str(), &request_uri(&url), body, timestamp)?)
            }
            (None, true) => {
                return Err(ExchangeError::AuthError(
                    "signed request needs credentials, none configured".to_string(),
                ));
            }
            (None, false) => None,
        };

        let mut request = self.client.request(method, url);

        match headers {
            Some(headers) => {
                for (key, value) in headers {
                    request = request.header(key, value);
                }
            }
            None if !body.is_empty() => {
                request = request.header(CONTENT_TYPE, "application/json");
            }
            None => {}
        }

        if !body.is_empty() {
            request = request.body(body.to_vec());
        }

        let response = request
            .send()
            .await
            .map_err(|e| {
                ExchangeError::NetworkError(format!(
                    "{} request failed: {}",
                    self.config.exchange_name, e
                ))
            })?;

        self.handle_response(response).await
    }
}

#[async_trait]
impl RestClient for ReqwestRest {
    async fn execute(
        &self,
        method: Method,
        endpoint: &str,
        query_params: &[(&str, &str)],
        body: &[u8],
        authenticated: bool,
    ) -> Result<Vec<u8>, ExchangeError> {
        self.make_request(method, endpoint, query_params, body, authenticated)
            .await
    }

    #[instrument(skip(self, query_params), fields(exchange = %self.config.exchange_name, endpoint = %endpoint, param_count = query_params.len()))]
    async fn get_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        query_params: &[(&str, &str)],
        authenticated: bool,
    ) -> Result<T, ExchangeError> {
        let body = self
            .make_request(Method::GET, endpoint, query_params, &[], authenticated)
            .await?;

        serde_json::from_slice(&body).map_err(|e| {
            ExchangeError::DecodeError(format!(
                "Failed to decode response from {}: {} (body: {})",
                endpoint,
                e,
                String::from_utf8_lossy(&body)
            ))
        })
    }
}

/// Current time in Unix seconds
pub fn unix_timestamp_secs() -> Result<u64, ExchangeError> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .map_err(|e| ExchangeError::AuthError(format!("Failed to get timestamp: {}", e)))
}

/// Append `params` to the URL's query string.
///
/// Keys are stable-sorted (repeated keys keep their order) and values are
/// form-urlencoded. This is the single place query strings are built, so the
/// URL that is signed and the URL that is sent cannot disagree. Empty params
/// leave the URL untouched.
pub fn apply_query(url: &mut Url, params: &[(&str, &str)]) {
    if params.is_empty() {
        return;
    }

    let mut sorted = params.to_vec();
    sorted.sort_by(|a, b| a.0.cmp(b.0));
    url.query_pairs_mut().extend_pairs(sorted);
}

/// Path plus query of a resolved URL, as it appears in the request line
pub fn request_uri(url: &Url) -> String {
    match url.query() {
        Some(query) => format!("{}?{}", url.path(), query),
        None => url.path().to_string(),
    }
}

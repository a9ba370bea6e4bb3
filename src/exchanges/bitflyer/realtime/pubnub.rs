use super::transport::{PushTransport, Subscription, SubscriptionFeed};
use crate::core::errors::ExchangeError;
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde_json::Value;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, trace};

pub const PUBNUB_ORIGIN: &str = "https://ps.pndsn.com";
pub const BITFLYER_SUBSCRIBE_KEY: &str = "sub-c-52a9ab50-291b-11e5-baaa-0619f8945a4f";

/// Settings for the PubNub subscribe long-poll
#[derive(Debug, Clone)]
pub struct PubNubConfig {
    pub origin: String,
    pub subscribe_key: String,
    /// Client-side limit for one long-poll request; the server answers
    /// empty-handed after roughly 280 seconds.
    pub long_poll_timeout: Duration,
    /// Pause after a failed poll before trying again
    pub error_pause: Duration,
    pub buffer: usize,
}

impl Default for PubNubConfig {
    fn default() -> Self {
        Self {
            origin: PUBNUB_ORIGIN.to_string(),
            subscribe_key: BITFLYER_SUBSCRIBE_KEY.to_string(),
            long_poll_timeout: Duration::from_secs(310),
            error_pause: Duration::from_secs(1),
            buffer: 64,
        }
    }
}

impl PubNubConfig {
    pub fn with_origin(mut self, origin: String) -> Self {
        self.origin = origin;
        self
    }

    pub fn with_long_poll_timeout(mut self, timeout: Duration) -> Self {
        self.long_poll_timeout = timeout;
        self
    }

    pub fn with_error_pause(mut self, pause: Duration) -> Self {
        self.error_pause = pause;
        self
    }
}

/// PubNub subscribe over HTTP long-polling.
///
/// Each response body is forwarded untouched as a success payload:
/// `[[message, ...], "<timetoken>"]`, optionally followed by channel names.
#[derive(Debug, Clone)]
pub struct PubNubTransport {
    client: Client,
    config: PubNubConfig,
}

impl PubNubTransport {
    pub fn new(config: PubNubConfig) -> Result<Self, ExchangeError> {
        let client = Client::builder().build().map_err(|e| {
            ExchangeError::NetworkError(format!("Failed to build HTTP client: {}", e))
        })?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &PubNubConfig {
        &self.config
    }

    /// `GET {origin}/subscribe/{sub_key}/{channel}/0/{timetoken}`
    pub fn subscribe_url(&self, channel: &str, timetoken: &str) -> Result<Url, ExchangeError> {
        let raw = format!(
            "{}/subscribe/{}/{}/0/{}",
            self.config.origin.trim_end_matches('/'),
            self.config.subscribe_key,
            channel,
            timetoken
        );

        Url::parse(&raw).map_err(|e| {
            ExchangeError::InvalidParameters(format!("Invalid subscribe URL '{}': {}", raw, e))
        })
    }
}

#[async_trait]
impl PushTransport for PubNubTransport {
    #[instrument(skip(self))]
    async fn subscribe(&self, channel: &str) -> Result<Subscription, ExchangeError> {
        if channel.is_empty() || channel.contains('/') {
            return Err(ExchangeError::InvalidParameters(format!(
                "Invalid channel name '{}'",
                channel
            )));
        }
        // validates origin and key before anything is spawned
        self.subscribe_url(channel, "0")?;

        let stop = CancellationToken::new();
        let (subscription, feed) =
            Subscription::channel_pair(channel, self.config.buffer, stop.clone());

        let poller = Poller {
            transport: self.clone(),
            channel: channel.to_string(),
            feed,
            stop,
        };
        let task = tokio::spawn(poller.run());

        Ok(subscription.with_task(task))
    }
}

struct Poller {
    transport: PubNubTransport,
    channel: String,
    feed: SubscriptionFeed,
    stop: CancellationToken,
}

impl Poller {
    async fn run(self) {
        let mut timetoken = "0".to_string();

        loop {
            let keep_going = match self.transport.subscribe_url(&self.channel, &timetoken) {
                Ok(url) => self.poll_once(url, &mut timetoken).await,
                Err(e) => self.feed.error(e.to_string(), &self.stop).await && self.pause().await,
            };

            if !keep_going {
                break;
            }
        }

        info!(channel = %self.channel, "PubNub poller stopped");
    }

    /// One long-poll round trip. Returns false when polling should stop.
    async fn poll_once(&self, url: Url, timetoken: &mut String) -> bool {
        debug!("action=subscribe endpoint={}", url);
        let request = self
            .transport
            .client
            .get(url)
            .timeout(self.transport.config.long_poll_timeout)
            .send();

        let outcome = tokio::select! {
            biased;
            () = self.stop.cancelled() => return false,
            outcome = request => outcome,
        };

        let response = match outcome {
            Ok(response) => response,
            Err(e) if e.is_timeout() => return self.feed.timeout(&self.stop).await,
            Err(e) => {
                return self.feed.error(format!("Subscribe request failed: {}", e), &self.stop).await
                    && self.pause().await;
            }
        };

        let status = response.status();
        let read = tokio::select! {
            biased;
            () = self.stop.cancelled() => return false,
            read = response.text() => read,
        };

        let body = match read {
            Ok(body) => body,
            Err(e) if e.is_timeout() => return self.feed.timeout(&self.stop).await,
            Err(e) => {
                return self
                    .feed
                    .error(format!("Failed to read subscribe response: {}", e), &self.stop)
                    .await
                    && self.pause().await;
            }
        };

        if !status.is_success() {
            return self
                .feed
                .error(format!("Subscribe returned {}: {}", status, body), &self.stop)
                .await
                && self.pause().await;
        }

        trace!("Subscribe response: {}", body);

        match extract_timetoken(&body) {
            Some(next) => *timetoken = next,
            None => {
                if !self
                    .feed
                    .error(format!("Response carries no timetoken: {}", body), &self.stop)
                    .await
                {
                    return false;
                }
            }
        }

        self.feed.message(body, &self.stop).await
    }

    async fn pause(&self) -> bool {
        tokio::select! {
            biased;
            () = self.stop.cancelled() => false,
            () = tokio::time::sleep(self.transport.config.error_pause) => true,
        }
    }
}

/// Second element of a subscribe response, the cursor for the next poll
pub fn extract_timetoken(body: &str) -> Option<String> {
    let envelope: Vec<Value> = serde_json::from_str(body).ok()?;
    match envelope.get(1)? {
        Value::String(token) if !token.is_empty() => Some(token.clone()),
        Value::Number(token) => Some(token.to_string()),
        _ => None,
    }
}

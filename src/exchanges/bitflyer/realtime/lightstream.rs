use super::transport::{PushTransport, Subscription, SubscriptionFeed};
use crate::core::errors::ExchangeError;
use crate::core::kernel::{TungsteniteWs, WsCodec, WsConfig, WsSession};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

pub const LIGHTSTREAM_URL: &str = "wss://ws.lightstream.bitflyer.com/json-rpc";

/// Messages arriving on the Lightstream JSON-RPC socket
#[derive(Debug, Clone, PartialEq)]
pub enum LightstreamEvent {
    /// `channelMessage` notification
    ChannelMessage { channel: String, message: Value },
    /// Successful response to one of our requests
    Ack { id: Option<u64> },
    /// Error response to one of our requests
    RpcError { id: Option<u64>, message: String },
}

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    method: &'static str,
    params: ChannelParams<'a>,
    id: u64,
}

#[derive(Debug, Serialize)]
struct ChannelParams<'a> {
    channel: &'a str,
}

/// JSON-RPC 2.0 codec for `ws.lightstream.bitflyer.com`
#[derive(Debug)]
pub struct LightstreamCodec {
    next_id: AtomicU64,
}

impl LightstreamCodec {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
        }
    }

    fn request(&self, method: &'static str, channel: &str) -> Result<Message, ExchangeError> {
        let request = RpcRequest {
            jsonrpc: "2.0",
            method,
            params: ChannelParams { channel },
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
        };

        let text = serde_json::to_string(&request).map_err(|e| {
            ExchangeError::SerializationError(format!("Failed to encode {}: {}", method, e))
        })?;

        Ok(Message::Text(text))
    }
}

impl Default for LightstreamCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl WsCodec for LightstreamCodec {
    type Event = LightstreamEvent;

    fn subscribe_frame(&self, channel: &str) -> Result<Message, ExchangeError> {
        self.request("subscribe", channel)
    }

    fn unsubscribe_frame(&self, channel: &str) -> Result<Message, ExchangeError> {
        self.request("unsubscribe", channel)
    }

    fn decode(&self, frame: &str) -> Result<Option<LightstreamEvent>, ExchangeError> {
        let value: Value = serde_json::from_str(frame).map_err(|e| {
            ExchangeError::DecodeError(format!("Invalid Lightstream frame: {}", e))
        })?;

        if value.get("method").and_then(Value::as_str) == Some("channelMessage") {
            let params = value.get("params");
            let channel = params
                .and_then(|p| p.get("channel"))
                .and_then(Value::as_str);
            let message = params.and_then(|p| p.get("message"));

            return match (channel, message) {
                (Some(channel), Some(message)) => Ok(Some(LightstreamEvent::ChannelMessage {
                    channel: channel.to_string(),
                    message: message.clone(),
                })),
                _ => Err(ExchangeError::DecodeError(format!(
                    "channelMessage without channel or message: {}",
                    frame
                ))),
            };
        }

        let id = value.get("id").and_then(Value::as_u64);

        if let Some(error) = value.get("error") {
            let message = error
                .get("message")
                .and_then(Value::as_str)
                .map_or_else(|| error.to_string(), str::to_string);
            return Ok(Some(LightstreamEvent::RpcError { id, message }));
        }

        if value.get("result").is_some() {
            return Ok(Some(LightstreamEvent::Ack { id }));
        }

        Ok(None)
    }
}

/// Wrap one Lightstream message in the batch envelope the subscriber decodes
pub fn batch_envelope(channel: &str, message: Value) -> String {
    json!([[message], channel]).to_string()
}

/// bitFlyer Lightstream JSON-RPC feed as a push transport
#[derive(Debug, Clone)]
pub struct LightstreamTransport {
    url: String,
    config: WsConfig,
}

impl LightstreamTransport {
    pub fn new(url: String) -> Self {
        Self {
            url,
            config: WsConfig::default(),
        }
    }

    pub fn with_config(mut self, config: WsConfig) -> Self {
        self.config = config;
        self
    }
}

impl Default for LightstreamTransport {
    fn default() -> Self {
        Self::new(LIGHTSTREAM_URL.to_string())
    }
}

#[async_trait]
impl PushTransport for LightstreamTransport {
    #[instrument(skip(self), fields(url = %self.url))]
    async fn subscribe(&self, channel: &str) -> Result<Subscription, ExchangeError> {
        let mut ws = TungsteniteWs::new(
            self.url.clone(),
            "bitflyer".to_string(),
            LightstreamCodec::new(),
        )
        .with_config(self.config.clone());

        ws.connect().await?;
        ws.subscribe(channel).await?;

        let stop = CancellationToken::new();
        let (subscription, feed) =
            Subscription::channel_pair(channel, self.config.message_buffer_size, stop.clone());

        let reader = Reader {
            ws,
            channel: channel.to_string(),
            idle_timeout: Duration::from_millis(self.config.idle_timeout_ms),
            feed,
            stop,
        };
        let task = tokio::spawn(reader.run());

        Ok(subscription.with_task(task))
    }
}

struct Reader {
    ws: TungsteniteWs<LightstreamCodec>,
    channel: String,
    idle_timeout: Duration,
    feed: SubscriptionFeed,
    stop: CancellationToken,
}

impl Reader {
    async fn run(mut self) {
        loop {
            let next = tokio::select! {
                biased;
                () = self.stop.cancelled() => break,
                next = tokio::time::timeout(self.idle_timeout, self.ws.next_event()) => next,
            };

            let keep_going = match next {
                Err(_) => self.feed.timeout(&self.stop).await,
                Ok(None) => {
                    info!(channel = %self.channel, "Lightstream connection closed");
                    false
                }
                Ok(Some(Ok(LightstreamEvent::ChannelMessage { channel, message }))) => {
                    if channel == self.channel {
                        self.feed
                            .message(batch_envelope(&channel, message), &self.stop)
                            .await
                    } else {
                        true
                    }
                }
                Ok(Some(Ok(LightstreamEvent::Ack { id }))) => {
                    debug!(?id, "Lightstream request acknowledged");
                    true
                }
                Ok(Some(Ok(LightstreamEvent::RpcError { id, message }))) => {
                    self.feed
                        .error(format!("JSON-RPC error (id {:?}): {}", id, message), &self.stop)
                        .await
                }
                Ok(Some(Err(e))) => {
                    self.feed.error(e.to_string(), &self.stop).await && self.ws.is_connected()
                }
            };

            if !keep_going {
                break;
            }
        }

        if self.ws.is_connected() {
            if let Err(e) = self.ws.unsubscribe(&self.channel).await {
                debug!(channel = %self.channel, "Lightstream unsubscribe failed: {}", e);
            }
        }
        self.ws.close().await;
        info!(channel = %self.channel, "Lightstream reader stopped");
    }
}

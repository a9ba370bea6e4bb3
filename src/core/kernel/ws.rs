use crate::core::errors::ExchangeError;
use crate::core::kernel::codec::WsCodec;
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::{
    connect_async, tungstenite::protocol::Message, MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, instrument, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Clone)]
pub struct WsConfig {
    pub connect_timeout_ms: u64,
    /// Longest silence on an open connection before it counts as a timeout
    pub idle_timeout_ms: u64,
    /// Capacity of the channels fed by the read task
    pub message_buffer_size: usize,
}

impl Default for WsConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 10_000,
            idle_timeout_ms: 60_000,
            message_buffer_size: 1024,
        }
    }
}

/// A WebSocket connection that speaks one codec
#[async_trait]
pub trait WsSession<C: WsCodec>: Send {
    async fn connect(&mut self) -> Result<(), ExchangeError>;

    async fn subscribe(&mut self, channel: &str) -> Result<(), ExchangeError>;

    async fn unsubscribe(&mut self, channel: &str) -> Result<(), ExchangeError>;

    /// Next decoded event. `None` once the connection is closed.
    async fn next_event(&mut self) -> Option<Result<C::Event, ExchangeError>>;

    async fn close(&mut self);

    fn is_connected(&self) -> bool;
}

/// `tokio-tungstenite` backed session. Reads and writes happen on the
/// task that owns it, so the stream is never split.
pub struct TungsteniteWs<C: WsCodec> {
    url: String,
    service: String,
    codec: C,
    config: WsConfig,
    stream: Option<WsStream>,
}

impl<C: WsCodec> TungsteniteWs<C> {
    /// `service` only labels log lines
    pub fn new(url: String, service: String, codec: C) -> Self {
        Self {
            url,
            service,
            codec,
            config: WsConfig::default(),
            stream: None,
        }
    }

    pub fn with_config(mut self, config: WsConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &WsConfig {
        &self.config
    }

    async fn send(&mut self, frame: Message) -> Result<(), ExchangeError> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| ExchangeError::NetworkError("WebSocket not connected".to_string()))?;

        if let Err(e) = stream.send(frame).await {
            self.stream = None;
            return Err(ExchangeError::NetworkError(format!(
                "WebSocket send failed: {}",
                e
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl<C: WsCodec> WsSession<C> for TungsteniteWs<C> {
    #[instrument(skip(self), fields(service = %self.service, url = %self.url))]
    async fn connect(&mut self) -> Result<(), ExchangeError> {
        let limit = Duration::from_millis(self.config.connect_timeout_ms);

        let (stream, _) = tokio::time::timeout(limit, connect_async(&self.url))
            .await
            .map_err(|_| ExchangeError::NetworkError("WebSocket connect timed out".to_string()))?
            .map_err(|e| ExchangeError::NetworkError(format!("WebSocket connect failed: {}", e)))?;

        self.stream = Some(stream);
        debug!("action=connect url={}", self.url);
        Ok(())
    }

    #[instrument(skip(self), fields(service = %self.service))]
    async fn subscribe(&mut self, channel: &str) -> Result<(), ExchangeError> {
        let frame = self.codec.subscribe_frame(channel)?;
        self.send(frame).await
    }

    #[instrument(skip(self), fields(service = %self.service))]
    async fn unsubscribe(&mut self, channel: &str) -> Result<(), ExchangeError> {
        let frame = self.codec.unsubscribe_frame(channel)?;
        self.send(frame).await
    }

    async fn next_event(&mut self) -> Option<Result<C::Event, ExchangeError>> {
        loop {
            let stream = self.stream.as_mut()?;

            match stream.next().await {
                Some(Ok(Message::Text(text))) => match self.codec.decode(&text) {
                    Ok(Some(event)) => return Some(Ok(event)),
                    Ok(None) => {}
                    Err(e) => return Some(Err(e)),
                },
                Some(Ok(Message::Ping(payload))) => {
                    if let Err(e) = stream.send(Message::Pong(payload)).await {
                        warn!(service = %self.service, "Failed to answer ping: {}", e);
                    }
                }
                Some(Ok(Message::Close(_))) | None => {
                    self.stream = None;
                    return None;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    self.stream = None;
                    return Some(Err(ExchangeError::NetworkError(format!(
                        "WebSocket read failed: {}",
                        e
                    ))));
                }
            }
        }
    }

    async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.close(None).await;
        }
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }
}

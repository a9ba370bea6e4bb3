use crate::core::errors::ExchangeError;
use tokio_tungstenite::tungstenite::Message;

/// Wire format of a channel-based push service spoken over a WebSocket
pub trait WsCodec: Send + Sync + 'static {
    /// What a decoded text frame turns into
    type Event: Send + Sync;

    fn subscribe_frame(&self, channel: &str) -> Result<Message, ExchangeError>;

    fn unsubscribe_frame(&self, channel: &str) -> Result<Message, ExchangeError>;

    /// Decode one text frame; `Ok(None)` when the frame carries nothing
    /// the caller needs to see.
    fn decode(&self, frame: &str) -> Result<Option<Self::Event>, ExchangeError>;
}

pub mod decoder;
pub mod lightstream;
pub mod pubnub;
pub mod subscriber;
pub mod transport;

pub use decoder::{decode_ticker_frame, MalformedFrame};
pub use lightstream::{LightstreamCodec, LightstreamEvent, LightstreamTransport, LIGHTSTREAM_URL};
pub use pubnub::{PubNubConfig, PubNubTransport, BITFLYER_SUBSCRIBE_KEY, PUBNUB_ORIGIN};
pub use subscriber::{ticker_channel, RealtimeTickerSubscriber, TimeoutPolicy};
pub use transport::{PushTransport, Subscription, SubscriptionFeed};

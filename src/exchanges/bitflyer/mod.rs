pub mod builder;
pub mod connector;
pub mod realtime;
pub mod rest;
pub mod signer;

pub use builder::{build_connector, build_connector_with_lightstream, build_rest, BASE_URL};
pub use connector::BitflyerConnector;
pub use realtime::{RealtimeTickerSubscriber, TimeoutPolicy};
pub use rest::BitflyerRest;
pub use signer::BitflyerSigner;

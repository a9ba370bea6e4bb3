//! Kernel - exchange-agnostic transport layer
//!
//! The kernel holds only transport concerns; everything bitFlyer specific
//! (endpoint names, header layout, channel names) lives under
//! `crate::exchanges`.
//!
//! ## Transport Layer
//! - `RestClient`: HTTP request executor with endpoint resolution and query canonicalisation
//! - `WsSession`: WebSocket connection management
//!
//! ## Authentication
//! - `Signer`: pluggable request authentication
//!
//! ## Message Handling
//! - `WsCodec`: exchange-specific message encoding/decoding
//!
//! # Example
//! ```rust,no_run
//! use flyerx::core::kernel::*;
//! use flyerx::core::types::Ticker;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let rest_config = RestClientConfig::new(
//!     "https://api.bitflyer.com/v1/".to_string(),
//!     "bitflyer".to_string(),
//! );
//! let rest = RestClientBuilder::new(rest_config).build()?;
//!
//! let ticker: Ticker = rest
//!     .get_json("ticker", &[("product_code", "BTC_JPY")], false)
//!     .await?;
//! println!("{}", ticker.mid_price());
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod rest;
pub mod signer;
pub mod ws;

pub use codec::WsCodec;
pub use rest::{
    apply_query, request_uri, unix_timestamp_secs, ReqwestRest, RestClient, RestClientBuilder,
    RestClientConfig,
};
pub use signer::{hmac_sha256_hex, SignedHeaders, Signer};
pub use ws::{TungsteniteWs, WsConfig, WsSession};

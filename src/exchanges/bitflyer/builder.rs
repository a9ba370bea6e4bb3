use crate::core::config::ExchangeConfig;
use crate::core::errors::ExchangeError;
use crate::core::kernel::{ReqwestRest, RestClientBuilder, RestClientConfig};
use crate::exchanges::bitflyer::{
    connector::BitflyerConnector,
    realtime::{LightstreamTransport, PubNubConfig, PubNubTransport, RealtimeTickerSubscriber},
    rest::BitflyerRest,
    signer::BitflyerSigner,
};
use std::sync::Arc;

pub const BASE_URL: &str = "https://api.bitflyer.com/v1/";

/// Build the REST client, signing requests when credentials are present
pub fn build_rest(config: &ExchangeConfig) -> Result<BitflyerRest<ReqwestRest>, ExchangeError> {
    let base_url = config
        .base_url
        .clone()
        .unwrap_or_else(|| BASE_URL.to_string());

    let rest_config = RestClientConfig::new(base_url, "bitflyer".to_string());
    let mut rest_builder = RestClientBuilder::new(rest_config);

    if config.has_credentials() {
        let signer = Arc::new(BitflyerSigner::new(
            config.api_key().to_string(),
            config.secret_key().to_string(),
        ));
        rest_builder = rest_builder.with_signer(signer);
    }

    Ok(BitflyerRest::new(rest_builder.build()?))
}

/// Create a bitFlyer connector receiving tickers over PubNub
pub fn build_connector(
    config: ExchangeConfig,
) -> Result<BitflyerConnector<ReqwestRest, PubNubTransport>, ExchangeError> {
    let rest = build_rest(&config)?;
    let transport = PubNubTransport::new(PubNubConfig::default())?;

    Ok(BitflyerConnector::new(
        rest,
        RealtimeTickerSubscriber::new(transport),
    ))
}

/// Create a bitFlyer connector receiving tickers over the Lightstream WebSocket
pub fn build_connector_with_lightstream(
    config: ExchangeConfig,
) -> Result<BitflyerConnector<ReqwestRest, LightstreamTransport>, ExchangeError> {
    let rest = build_rest(&config)?;

    Ok(BitflyerConnector::new(
        rest,
        RealtimeTickerSubscriber::new(LightstreamTransport::default()),
    ))
}

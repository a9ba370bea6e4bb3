use crate::core::errors::ExchangeError;
use crate::core::kernel::RestClient;
use crate::core::types::{Balance, Ticker};
use tracing::{error, instrument};

pub const BALANCE_ENDPOINT: &str = "me/getbalance";
pub const TICKER_ENDPOINT: &str = "ticker";

/// Thin typed wrapper around `RestClient` for the bitFlyer Lightning API
pub struct BitflyerRest<R: RestClient> {
    client: R,
}

impl<R: RestClient> BitflyerRest<R> {
    pub fn new(client: R) -> Self {
        Self { client }
    }

    pub fn inner(&self) -> &R {
        &self.client
    }

    /// Get account balances (requires authentication)
    #[instrument(skip(self))]
    pub async fn get_balance(&self) -> Result<Vec<Balance>, ExchangeError> {
        self.client
            .get_json(BALANCE_ENDPOINT, &[], true)
            .await
            .map_err(|e| {
                error!("action=get_balance endpoint={} err={}", BALANCE_ENDPOINT, e);
                e
            })
    }

    /// Get the ticker for a product code such as `BTC_JPY`
    #[instrument(skip(self))]
    pub async fn get_ticker(&self, product_code: &str) -> Result<Ticker, ExchangeError> {
        let params = [("product_code", product_code)];
        self.client
            .get_json(TICKER_ENDPOINT, &params, false)
            .await
            .map_err(|e| {
                error!("action=get_ticker endpoint={} err={}", TICKER_ENDPOINT, e);
                e
            })
    }
}

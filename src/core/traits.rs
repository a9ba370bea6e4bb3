use crate::core::{
    errors::ExchangeError,
    types::{Balance, Ticker},
};
use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[async_trait]
pub trait MarketDataSource {
    /// Snapshot of the current ticker for a product
    async fn get_ticker(&self, product_code: &str) -> Result<Ticker, ExchangeError>;

    /// Stream real-time tickers for a product until `cancel` fires
    ///
    /// `buffer` sizes the returned channel; a consumer that stops draining it
    /// stalls the subscription rather than losing tickers.
    async fn subscribe_ticker(
        &self,
        product_code: &str,
        buffer: usize,
        cancel: CancellationToken,
    ) -> Result<mpsc::Receiver<Ticker>, ExchangeError>;
}

#[async_trait]
pub trait AccountInfo {
    async fn get_balance(&self) -> Result<Vec<Balance>, ExchangeError>;
}

use crate::core::{
    errors::ExchangeError,
    kernel::RestClient,
    traits::{AccountInfo, MarketDataSource},
    types::{Balance, Ticker},
};
use crate::exchanges::bitflyer::realtime::{PubNubTransport, PushTransport, RealtimeTickerSubscriber};
use crate::exchanges::bitflyer::rest::BitflyerRest;
use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

/// bitFlyer connector: REST snapshots plus a real-time ticker feed
pub struct BitflyerConnector<R: RestClient, T: PushTransport = PubNubTransport> {
    pub rest: BitflyerRest<R>,
    pub realtime: RealtimeTickerSubscriber<T>,
}

impl<R: RestClient, T: PushTransport> BitflyerConnector<R, T> {
    pub fn new(rest: BitflyerRest<R>, realtime: RealtimeTickerSubscriber<T>) -> Self {
        Self { rest, realtime }
    }
}

#[async_trait]
impl<R: RestClient, T: PushTransport> AccountInfo for BitflyerConnector<R, T> {
    #[instrument(skip(self), fields(exchange = "bitflyer"))]
    async fn get_balance(&self) -> Result<Vec<Balance>, ExchangeError> {
        self.rest.get_balance().await
    }
}

#[async_trait]
impl<R: RestClient, T: PushTransport> MarketDataSource for BitflyerConnector<R, T> {
    #[instrument(skip(self), fields(exchange = "bitflyer"))]
    async fn get_ticker(&self, product_code: &str) -> Result<Ticker, ExchangeError> {
        self.rest.get_ticker(product_code).await
    }

    #[instrument(skip(self, cancel), fields(exchange = "bitflyer"))]
    async fn subscribe_ticker(
        &self,
        product_code: &str,
        buffer: usize,
        cancel: CancellationToken,
    ) -> Result<mpsc::Receiver<Ticker>, ExchangeError> {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        // the task ends on its own once cancelled or once `rx` is dropped
        let _handle = self.realtime.spawn(product_code, tx, cancel).await?;
        Ok(rx)
    }
}

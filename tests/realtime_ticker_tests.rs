use async_trait::async_trait;
use flyerx::{
    core::{config::ExchangeConfig, errors::ExchangeError, traits::MarketDataSource, types::Ticker},
    exchanges::bitflyer::{
        build_rest,
        realtime::{
            PubNubConfig, PubNubTransport, PushTransport, RealtimeTickerSubscriber, Subscription,
            SubscriptionFeed, TimeoutPolicy, BITFLYER_SUBSCRIBE_KEY,
        },
        BitflyerConnector,
    },
};
use rust_decimal_macros::dec;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

const WAIT: Duration = Duration::from_secs(5);

fn ticker_json(tick_id: i64) -> String {
    format!(
        r#"{{"product_code":"BTC_JPY","timestamp":"2019-04-11T05:14:12.3739915Z","tick_id":{},"best_bid":100,"best_ask":102,"best_bid_size":0.01,"best_ask_size":0.2,"total_bid_depth":2061.3,"total_ask_depth":1590.5,"ltp":101,"volume":9431.1,"volume_by_product":7845.2}}"#,
        tick_id
    )
}

fn batch(tick_id: i64) -> String {
    format!(r#"[[{}], "meta1", "meta2"]"#, ticker_json(tick_id))
}

/// One subscription handed out by `MemoryTransport`
#[derive(Clone)]
struct Opened {
    channel: String,
    feed: SubscriptionFeed,
    stop: CancellationToken,
}

impl Opened {
    async fn message(&self, payload: String) {
        assert!(self.feed.message(payload, &self.stop).await);
    }

    async fn error(&self, report: &str) {
        assert!(self.feed.error(report.to_string(), &self.stop).await);
    }

    async fn timeout(&self) {
        assert!(self.feed.timeout(&self.stop).await);
    }
}

/// In-memory push service driven directly by the test
#[derive(Clone, Default)]
struct MemoryTransport {
    opened: Arc<Mutex<Vec<Opened>>>,
    accept_limit: Option<usize>,
}

impl MemoryTransport {
    fn refusing() -> Self {
        Self::accepting(0)
    }

    /// Hands out `limit` subscriptions, then refuses
    fn accepting(limit: usize) -> Self {
        Self {
            accept_limit: Some(limit),
            ..Self::default()
        }
    }

    fn opened(&self) -> Vec<Opened> {
        self.opened.lock().unwrap().clone()
    }

    fn latest(&self) -> Opened {
        self.opened().last().cloned().expect("no subscription opened")
    }

    /// Drop every feed kept by the transport so the subscriber sees closed sources
    fn close_all(&self) {
        self.opened.lock().unwrap().clear();
    }

    async fn wait_for_subscriptions(&self, count: usize) {
        timeout(WAIT, async {
            while self.opened().len() < count {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("subscription was not opened in time");
    }
}

#[async_trait]
impl PushTransport for MemoryTransport {
    async fn subscribe(&self, channel: &str) -> Result<Subscription, ExchangeError> {
        let accepted = self.opened.lock().unwrap().len();
        if self.accept_limit.is_some_and(|limit| accepted >= limit) {
            return Err(ExchangeError::NetworkError("service unavailable".to_string()));
        }

        let stop = CancellationToken::new();
        let (subscription, feed) = Subscription::channel_pair(channel, 8, stop.clone());
        self.opened.lock().unwrap().push(Opened {
            channel: channel.to_string(),
            feed,
            stop,
        });
        Ok(subscription)
    }
}

async fn next_ticker(rx: &mut mpsc::Receiver<Ticker>) -> Ticker {
    timeout(WAIT, rx.recv())
        .await
        .expect("timed out waiting for a ticker")
        .expect("ticker stream closed")
}

#[cfg(test)]
mod subscriber_tests {
    use super::*;

    #[tokio::test]
    async fn test_subscribes_to_ticker_channel() {
        let transport = MemoryTransport::default();
        let subscriber = RealtimeTickerSubscriber::new(transport.clone());
        let (tx, _rx) = mpsc::channel(4);

        let _handle = subscriber
            .spawn("ETH_JPY", tx, CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(transport.latest().channel, "lightning_ticker_ETH_JPY");
    }

    #[tokio::test]
    async fn test_delivers_first_ticker_of_each_batch() {
        let transport = MemoryTransport::default();
        let subscriber = RealtimeTickerSubscriber::new(transport.clone());
        let (tx, mut rx) = mpsc::channel(4);
        let _handle = subscriber
            .spawn("BTC_JPY", tx, CancellationToken::new())
            .await
            .unwrap();

        let opened = transport.latest();
        opened
            .message(format!(r#"[[{}, {}], "meta"]"#, ticker_json(1), ticker_json(2)))
            .await;

        let ticker = next_ticker(&mut rx).await;
        assert_eq!(ticker.tick_id, 1);
        assert_eq!(ticker.best_bid, dec!(100));
        assert_eq!(ticker.best_ask, dec!(102));
        assert_eq!(ticker.mid_price(), dec!(101));
    }

    #[tokio::test]
    async fn test_malformed_payloads_are_skipped() {
        let transport = MemoryTransport::default();
        let subscriber = RealtimeTickerSubscriber::new(transport.clone());
        let (tx, mut rx) = mpsc::channel(4);
        let _handle = subscriber
            .spawn("BTC_JPY", tx, CancellationToken::new())
            .await
            .unwrap();

        let opened = transport.latest();
        opened.message(r#"[[], "meta1"]"#.to_string()).await;
        opened.message(r#"{"not":"an array"}"#.to_string()).await;
        opened.message("[[{\"product_code\":".to_string()).await;
        opened.message(r#"["meta", []]"#.to_string()).await;
        opened.message(r#"[[{"product_code":"BTC_JPY"}]]"#.to_string()).await;
        opened.message(batch(7)).await;

        let ticker = next_ticker(&mut rx).await;
        assert_eq!(ticker.tick_id, 7);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_errors_and_timeouts_do_not_stop_the_loop() {
        let transport = MemoryTransport::default();
        let subscriber = RealtimeTickerSubscriber::new(transport.clone());
        let (tx, mut rx) = mpsc::channel(4);
        let handle = subscriber
            .spawn("BTC_JPY", tx, CancellationToken::new())
            .await
            .unwrap();

        let opened = transport.latest();
        opened.error("403 Forbidden").await;
        opened.timeout().await;
        opened.error("connection reset").await;
        opened.message(batch(42)).await;

        assert_eq!(next_ticker(&mut rx).await.tick_id, 42);
        assert!(!handle.is_finished());
        assert_eq!(transport.opened().len(), 1);
        assert!(!opened.stop.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancel_releases_subscription() {
        let transport = MemoryTransport::default();
        let subscriber = RealtimeTickerSubscriber::new(transport.clone());
        let (tx, mut rx) = mpsc::channel(4);
        let cancel = CancellationToken::new();
        let handle = subscriber.spawn("BTC_JPY", tx, cancel.clone()).await.unwrap();

        cancel.cancel();
        timeout(WAIT, handle).await.unwrap().unwrap();

        assert!(transport.latest().stop.is_cancelled());
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_cancel_while_sink_is_full() {
        let transport = MemoryTransport::default();
        let subscriber = RealtimeTickerSubscriber::new(transport.clone());
        let (tx, _rx) = mpsc::channel(1);
        let cancel = CancellationToken::new();
        let handle = subscriber.spawn("BTC_JPY", tx, cancel.clone()).await.unwrap();

        let opened = transport.latest();
        opened.message(batch(1)).await;
        opened.message(batch(2)).await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        cancel.cancel();
        timeout(WAIT, handle).await.unwrap().unwrap();
        assert!(opened.stop.is_cancelled());
    }

    #[tokio::test]
    async fn test_dropped_receiver_ends_quiet_subscription() {
        let transport = MemoryTransport::default();
        let subscriber = RealtimeTickerSubscriber::new(transport.clone());
        let (tx, rx) = mpsc::channel(4);
        let handle = subscriber
            .spawn("BTC_JPY", tx, CancellationToken::new())
            .await
            .unwrap();

        // nothing is ever pushed, so no send can fail
        drop(rx);

        timeout(WAIT, handle).await.unwrap().unwrap();
        assert!(transport.latest().stop.is_cancelled());
    }

    #[tokio::test]
    async fn test_dropped_receiver_while_sink_is_full() {
        let transport = MemoryTransport::default();
        let subscriber = RealtimeTickerSubscriber::new(transport.clone());
        let (tx, rx) = mpsc::channel(1);
        let handle = subscriber
            .spawn("BTC_JPY", tx, CancellationToken::new())
            .await
            .unwrap();

        let opened = transport.latest();
        opened.message(batch(1)).await;
        opened.message(batch(2)).await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        drop(rx);
        timeout(WAIT, handle).await.unwrap().unwrap();
        assert!(opened.stop.is_cancelled());
    }

    #[tokio::test]
    async fn test_closed_sources_end_subscription() {
        let transport = MemoryTransport::default();
        let subscriber = RealtimeTickerSubscriber::new(transport.clone());
        let (tx, mut rx) = mpsc::channel(4);
        let handle = subscriber
            .spawn("BTC_JPY", tx, CancellationToken::new())
            .await
            .unwrap();

        transport.close_all();

        timeout(WAIT, handle).await.unwrap().unwrap();
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_resubscribe_policy_opens_fresh_subscription() {
        let transport = MemoryTransport::default();
        let subscriber = RealtimeTickerSubscriber::new(transport.clone())
            .with_timeout_policy(TimeoutPolicy::Resubscribe);
        let (tx, mut rx) = mpsc::channel(4);
        let _handle = subscriber
            .spawn("BTC_JPY", tx, CancellationToken::new())
            .await
            .unwrap();

        let first = transport.latest();
        first.timeout().await;
        transport.wait_for_subscriptions(2).await;

        assert!(first.stop.is_cancelled());
        let second = transport.latest();
        assert_eq!(second.channel, "lightning_ticker_BTC_JPY");

        second.message(batch(9)).await;
        assert_eq!(next_ticker(&mut rx).await.tick_id, 9);
    }

    #[tokio::test]
    async fn test_failed_resubscribe_ends_stream() {
        let transport = MemoryTransport::accepting(1);
        let subscriber = RealtimeTickerSubscriber::new(transport.clone())
            .with_timeout_policy(TimeoutPolicy::Resubscribe);
        let (tx, mut rx) = mpsc::channel(4);
        let handle = subscriber
            .spawn("BTC_JPY", tx, CancellationToken::new())
            .await
            .unwrap();

        let first = transport.latest();
        first.timeout().await;

        assert!(timeout(WAIT, rx.recv()).await.unwrap().is_none());
        timeout(WAIT, handle).await.unwrap().unwrap();
        assert!(first.stop.is_cancelled());
        assert_eq!(transport.opened().len(), 1);
    }

    #[tokio::test]
    async fn test_subscribe_failure_is_returned() {
        let subscriber = RealtimeTickerSubscriber::new(MemoryTransport::refusing());
        let (tx, _rx) = mpsc::channel(4);

        let result = subscriber
            .spawn("BTC_JPY", tx, CancellationToken::new())
            .await;
        assert!(result.as_ref().is_err_and(ExchangeError::is_network));
    }

    #[tokio::test]
    async fn test_connector_subscribe_ticker() {
        let transport = MemoryTransport::default();
        let rest = build_rest(&ExchangeConfig::read_only()).unwrap();
        let connector = BitflyerConnector::new(rest, RealtimeTickerSubscriber::new(transport.clone()));

        let cancel = CancellationToken::new();
        let mut rx = connector
            .subscribe_ticker("BTC_JPY", 4, cancel.clone())
            .await
            .unwrap();

        transport.latest().message(batch(11)).await;
        assert_eq!(next_ticker(&mut rx).await.tick_id, 11);

        cancel.cancel();
        assert!(timeout(WAIT, rx.recv()).await.unwrap().is_none());
    }
}

#[cfg(test)]
mod pubnub_tests {
    use super::*;

    #[tokio::test]
    async fn test_long_poll_follows_timetoken() {
        let mut server = mockito::Server::new_async().await;
        let base = format!(
            "/subscribe/{}/lightning_ticker_BTC_JPY/0",
            BITFLYER_SUBSCRIBE_KEY
        );
        let handshake = server
            .mock("GET", format!("{}/0", base).as_str())
            .with_status(200)
            .with_body(r#"[[], "15000000000000000"]"#)
            .create_async()
            .await;
        let poll = server
            .mock("GET", format!("{}/15000000000000000", base).as_str())
            .with_status(200)
            .with_body(format!(
                r#"[[{}], "15000000000000000", "lightning_ticker_BTC_JPY"]"#,
                ticker_json(5)
            ))
            .expect_at_least(1)
            .create_async()
            .await;

        let transport =
            PubNubTransport::new(PubNubConfig::default().with_origin(server.url())).unwrap();
        let subscriber = RealtimeTickerSubscriber::new(transport);
        let (tx, mut rx) = mpsc::channel(1);
        let cancel = CancellationToken::new();
        let handle = subscriber.spawn("BTC_JPY", tx, cancel.clone()).await.unwrap();

        assert_eq!(next_ticker(&mut rx).await.tick_id, 5);

        cancel.cancel();
        timeout(WAIT, handle).await.unwrap().unwrap();
        handshake.assert_async().await;
        poll.assert_async().await;
    }

    #[tokio::test]
    async fn test_server_errors_are_reported_and_polling_continues() {
        let mut server = mockito::Server::new_async().await;
        let path = format!("/subscribe/{}/ch/0/0", BITFLYER_SUBSCRIBE_KEY);
        server
            .mock("GET", path.as_str())
            .with_status(503)
            .with_body("unavailable")
            .expect_at_least(2)
            .create_async()
            .await;

        let config = PubNubConfig::default()
            .with_origin(server.url())
            .with_error_pause(Duration::from_millis(10));
        let transport = PubNubTransport::new(config).unwrap();
        let mut subscription = transport.subscribe("ch").await.unwrap();

        for _ in 0..2 {
            let report = timeout(WAIT, subscription.errors.recv())
                .await
                .unwrap()
                .unwrap();
            assert!(report.contains("503"));
        }

        subscription.unsubscribe().await;
    }

    #[tokio::test]
    async fn test_poll_timeout_is_signalled() {
        // accepts connections and never answers
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let origin = format!("http://{}", listener.local_addr().unwrap());
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let config = PubNubConfig::default()
            .with_origin(origin)
            .with_long_poll_timeout(Duration::from_millis(50));
        let transport = PubNubTransport::new(config).unwrap();
        let mut subscription = transport.subscribe("ch").await.unwrap();

        for _ in 0..2 {
            timeout(WAIT, subscription.timeouts.recv())
                .await
                .unwrap()
                .unwrap();
        }
        assert!(subscription.errors.try_recv().is_err());

        subscription.unsubscribe().await;
    }

    #[tokio::test]
    async fn test_unsubscribe_during_stalled_body() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        // answers with headers and part of the body, then goes quiet
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let origin = format!("http://{}", listener.local_addr().unwrap());
        let (started_tx, started_rx) = tokio::sync::oneshot::channel();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 1024];
            let _ = socket.read(&mut request).await;
            socket
                .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 64\r\n\r\n[[")
                .await
                .unwrap();
            let _ = started_tx.send(());
            tokio::time::sleep(Duration::from_secs(600)).await;
            drop(socket);
        });

        let transport = PubNubTransport::new(PubNubConfig::default().with_origin(origin)).unwrap();
        let subscription = transport.subscribe("ch").await.unwrap();

        timeout(WAIT, started_rx).await.unwrap().unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        timeout(Duration::from_secs(2), subscription.unsubscribe())
            .await
            .expect("poller kept reading after stop");
    }
}

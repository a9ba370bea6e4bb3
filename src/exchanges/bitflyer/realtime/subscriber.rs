use super::decoder::decode_ticker_frame;
use super::transport::{PushTransport, Subscription};
use crate::core::errors::ExchangeError;
use crate::core::types::Ticker;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, trace, warn};

pub const TICKER_CHANNEL_PREFIX: &str = "lightning_ticker_";

/// `lightning_ticker_<PRODUCT_CODE>`
pub fn ticker_channel(product_code: &str) -> String {
    format!("{}{}", TICKER_CHANNEL_PREFIX, product_code)
}

/// What the subscriber does when the transport reports a timed-out wait
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TimeoutPolicy {
    /// Log and keep the current subscription
    #[default]
    KeepListening,
    /// Release the current subscription and open a fresh one
    Resubscribe,
}

/// Turns a push-channel subscription into a stream of `Ticker` values
pub struct RealtimeTickerSubscriber<T: PushTransport> {
    transport: Arc<T>,
    timeout_policy: TimeoutPolicy,
}

impl<T: PushTransport> Clone for RealtimeTickerSubscriber<T> {
    fn clone(&self) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
            timeout_policy: self.timeout_policy,
        }
    }
}

impl<T: PushTransport> RealtimeTickerSubscriber<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport: Arc::new(transport),
            timeout_policy: TimeoutPolicy::default(),
        }
    }

    pub fn with_timeout_policy(mut self, policy: TimeoutPolicy) -> Self {
        self.timeout_policy = policy;
        self
    }

    pub fn timeout_policy(&self) -> TimeoutPolicy {
        self.timeout_policy
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Subscribe to the ticker channel of `product_code` and forward every
    /// decoded ticker to `sink` until `cancel` fires.
    ///
    /// The first subscription is opened before the task is spawned, so a
    /// transport that cannot subscribe at all fails here.
    #[instrument(skip(self, sink, cancel))]
    pub async fn spawn(
        &self,
        product_code: &str,
        sink: mpsc::Sender<Ticker>,
        cancel: CancellationToken,
    ) -> Result<JoinHandle<()>, ExchangeError> {
        let channel = ticker_channel(product_code);
        let subscription = self.transport.subscribe(&channel).await?;
        info!(channel = %channel, "Subscribed to ticker channel");

        let listener = Listener {
            transport: Arc::clone(&self.transport),
            timeout_policy: self.timeout_policy,
            channel,
            sink,
            cancel,
        };

        Ok(tokio::spawn(listener.run(subscription)))
    }
}

struct Listener<T: PushTransport> {
    transport: Arc<T>,
    timeout_policy: TimeoutPolicy,
    channel: String,
    sink: mpsc::Sender<Ticker>,
    cancel: CancellationToken,
}

impl<T: PushTransport> Listener<T> {
    async fn run(self, mut subscription: Subscription) {
        loop {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => {
                    info!(channel = %self.channel, "Ticker subscription cancelled");
                    break;
                }
                () = self.sink.closed() => {
                    info!(channel = %self.channel, "Ticker receiver dropped");
                    break;
                }
                payload = subscription.messages.recv() => {
                    let Some(payload) = payload else {
                        info!(channel = %self.channel, "Subscription sources closed");
                        break;
                    };
                    if !self.on_message(&payload).await {
                        break;
                    }
                }
                Some(report) = subscription.errors.recv() => {
                    warn!(channel = %self.channel, "Subscription error: {}", report);
                }
                Some(()) = subscription.timeouts.recv() => {
                    warn!(channel = %self.channel, "Subscription timed out");
                    if self.timeout_policy == TimeoutPolicy::Resubscribe {
                        subscription = self.resubscribe(subscription).await;
                    }
                }
            }
        }

        subscription.unsubscribe().await;
        info!(channel = %self.channel, "Ticker subscription released");
    }

    /// Decode and deliver one payload. Returns false once nothing should
    /// be delivered any more.
    async fn on_message(&self, payload: &str) -> bool {
        let ticker = match decode_ticker_frame(payload) {
            Ok(ticker) => ticker,
            Err(reason) => {
                trace!(channel = %self.channel, "Skipping payload ({}): {}", reason, payload);
                return true;
            }
        };

        tokio::select! {
            biased;
            () = self.cancel.cancelled() => false,
            sent = self.sink.send(ticker) => {
                if sent.is_err() {
                    info!(channel = %self.channel, "Ticker receiver dropped");
                }
                sent.is_ok()
            }
        }
    }

    async fn resubscribe(&self, stale: Subscription) -> Subscription {
        stale.unsubscribe().await;
        match self.transport.subscribe(&self.channel).await {
            Ok(fresh) => {
                info!(channel = %self.channel, "Resubscribed after timeout");
                fresh
            }
            Err(e) => {
                warn!(channel = %self.channel, "Resubscribe failed: {}", e);
                closed_subscription(&self.channel)
            }
        }
    }
}

/// A subscription whose sources are already closed
fn closed_subscription(channel: &str) -> Subscription {
    let (subscription, _feed) = Subscription::channel_pair(channel, 1, CancellationToken::new());
    subscription
}

use crate::core::errors::ExchangeError;
use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Client side of a push-messaging service.
///
/// A transport turns one channel name into a live [`Subscription`]. It owns
/// the connection details; the subscriber only sees raw payloads.
#[async_trait]
pub trait PushTransport: Send + Sync + 'static {
    async fn subscribe(&self, channel: &str) -> Result<Subscription, ExchangeError>;
}

/// A live subscription to one channel.
///
/// Three independent sources feed the subscriber:
/// - `messages`: raw success payloads (batch envelopes)
/// - `errors`: human-readable error reports from the service or the connection
/// - `timeouts`: one unit per timed-out wait for data
///
/// Dropping the subscription, or calling [`Subscription::unsubscribe`],
/// stops the transport-side task.
#[derive(Debug)]
pub struct Subscription {
    channel: String,
    pub messages: mpsc::Receiver<String>,
    pub errors: mpsc::Receiver<String>,
    pub timeouts: mpsc::Receiver<()>,
    stop: CancellationToken,
    task: Option<JoinHandle<()>>,
}

/// Sending halves handed to the transport task that feeds a [`Subscription`]
#[derive(Debug, Clone)]
pub struct SubscriptionFeed {
    pub messages: mpsc::Sender<String>,
    pub errors: mpsc::Sender<String>,
    pub timeouts: mpsc::Sender<()>,
}

impl Subscription {
    /// Create a subscription and the feed that writes into it
    pub fn channel_pair(
        channel: impl Into<String>,
        buffer: usize,
        stop: CancellationToken,
    ) -> (Self, SubscriptionFeed) {
        let buffer = buffer.max(1);
        let (messages_tx, messages) = mpsc::channel(buffer);
        let (errors_tx, errors) = mpsc::channel(buffer);
        let (timeouts_tx, timeouts) = mpsc::channel(buffer);

        let subscription = Self {
            channel: channel.into(),
            messages,
            errors,
            timeouts,
            stop,
            task: None,
        };
        let feed = SubscriptionFeed {
            messages: messages_tx,
            errors: errors_tx,
            timeouts: timeouts_tx,
        };

        (subscription, feed)
    }

    /// Attach the transport task so `unsubscribe` can wait for it
    pub fn with_task(mut self, task: JoinHandle<()>) -> Self {
        self.task = Some(task);
        self
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Release the subscription and wait for the transport task to finish
    pub async fn unsubscribe(mut self) {
        self.stop.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl SubscriptionFeed {
    /// Forward a success payload; false once the subscription is gone or stopped
    pub async fn message(&self, payload: String, stop: &CancellationToken) -> bool {
        deliver(&self.messages, payload, stop).await
    }

    pub async fn error(&self, report: String, stop: &CancellationToken) -> bool {
        deliver(&self.errors, report, stop).await
    }

    pub async fn timeout(&self, stop: &CancellationToken) -> bool {
        deliver(&self.timeouts, (), stop).await
    }
}

async fn deliver<T>(tx: &mpsc::Sender<T>, value: T, stop: &CancellationToken) -> bool {
    tokio::select! {
        biased;
        () = stop.cancelled() => false,
        sent = tx.send(value) => sent.is_ok(),
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.stop.cancel();
    }
}

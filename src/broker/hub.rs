//! Broker implementation
//!
//! A single control-loop task owns the subscriber set; every other
//! component interacts with it purely through the command channel.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use crate::error::{Error, Result};

use super::config::BrokerConfig;

/// Requests handled by the broker control loop
enum Command<T> {
    Subscribe(u64, mpsc::Sender<T>),
    Unsubscribe(u64),
    Publish(T),
    Stop,
}

/// A registered, bounded per-consumer inbox
///
/// Exactly one reader owns a `Subscription`. Dropping it requests
/// removal from the broker's active set, so cleanup happens on every
/// exit path of the owning task, including cancellation.
pub struct Subscription<T> {
    id: u64,
    inbox: mpsc::Receiver<T>,
    ctl_tx: mpsc::Sender<Command<T>>,
}

impl<T> Subscription<T> {
    /// Broker-assigned subscriber ID
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Receive the next item, or `None` once the inbox is closed
    /// (broker shutdown or removal).
    pub async fn recv(&mut self) -> Option<T> {
        self.inbox.recv().await
    }

    /// Non-blocking receive
    pub fn try_recv(&mut self) -> std::result::Result<T, mpsc::error::TryRecvError> {
        self.inbox.try_recv()
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        // Best effort; a lost request is recovered by the loop pruning
        // closed inboxes on the next publish.
        let _ = self.ctl_tx.try_send(Command::Unsubscribe(self.id));
    }
}

/// Snapshot of broker counters
#[derive(Debug, Clone, Copy, Default)]
pub struct BrokerStats {
    /// Currently active subscriptions
    pub subscribers: usize,
    /// Items accepted for broadcast
    pub published: u64,
    /// Successful per-subscriber deliveries
    pub delivered: u64,
    /// Per-subscriber drops due to a full inbox
    pub dropped: u64,
}

/// Generic publish/subscribe hub
///
/// Created stopped; `start` (or a spawned `run`) begins the control
/// loop. `publish` is fire-and-forget and blocks only while handing the
/// item to the bounded control queue. `stop` closes every inbox so all
/// blocked readers observe end-of-stream.
pub struct Broker<T> {
    ctl_tx: mpsc::Sender<Command<T>>,
    ctl_rx: Mutex<Option<mpsc::Receiver<Command<T>>>>,
    running: AtomicBool,
    config: BrokerConfig,
    next_subscriber_id: AtomicU64,

    subscribers: AtomicUsize,
    published: AtomicU64,
    delivered: AtomicU64,
    dropped: AtomicU64,
}

impl<T: Clone + Send + 'static> Broker<T> {
    /// Create a new broker with default configuration
    pub fn new() -> Self {
        Self::with_config(BrokerConfig::default())
    }

    /// Create a new broker with custom configuration
    pub fn with_config(config: BrokerConfig) -> Self {
        let (ctl_tx, ctl_rx) = mpsc::channel(config.control_capacity);

        Self {
            ctl_tx,
            ctl_rx: Mutex::new(Some(ctl_rx)),
            running: AtomicBool::new(false),
            config,
            next_subscriber_id: AtomicU64::new(1),
            subscribers: AtomicUsize::new(0),
            published: AtomicU64::new(0),
            delivered: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    /// Get the broker configuration
    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    /// Whether the broker is accepting operations
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Spawn the control loop
    ///
    /// Marks the broker running before the task is scheduled, so
    /// operations issued immediately after `start` queue up for the
    /// loop instead of being rejected.
    pub fn start(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        self.running.store(true, Ordering::SeqCst);
        let broker = Arc::clone(self);
        tokio::spawn(async move { broker.run().await })
    }

    /// Run the control loop until `stop` is called
    ///
    /// The loop exclusively owns the subscriber set and processes
    /// commands strictly one at a time. A second invocation logs a
    /// warning and returns immediately; the first loop keeps running.
    pub async fn run(&self) {
        let rx = {
            let mut slot = self.ctl_rx.lock().unwrap_or_else(|e| e.into_inner());
            slot.take()
        };
        let mut rx = match rx {
            Some(rx) => rx,
            None => {
                tracing::warn!("broker control loop already started");
                return;
            }
        };

        self.running.store(true, Ordering::SeqCst);
        tracing::debug!(
            inbox_capacity = self.config.inbox_capacity,
            "broker control loop started"
        );

        let mut subs: HashMap<u64, mpsc::Sender<T>> = HashMap::new();

        while let Some(cmd) = rx.recv().await {
            match cmd {
                Command::Subscribe(id, tx) => {
                    subs.insert(id, tx);
                    self.subscribers.store(subs.len(), Ordering::Relaxed);
                    tracing::debug!(subscriber = id, total = subs.len(), "subscriber added");
                }
                Command::Unsubscribe(id) => {
                    if subs.remove(&id).is_some() {
                        self.subscribers.store(subs.len(), Ordering::Relaxed);
                        tracing::debug!(subscriber = id, total = subs.len(), "subscriber removed");
                    }
                }
                Command::Publish(item) => {
                    self.published.fetch_add(1, Ordering::Relaxed);

                    let mut closed = Vec::new();
                    for (id, tx) in &subs {
                        match tx.try_send(item.clone()) {
                            Ok(()) => {
                                self.delivered.fetch_add(1, Ordering::Relaxed);
                            }
                            Err(mpsc::error::TrySendError::Full(_)) => {
                                self.dropped.fetch_add(1, Ordering::Relaxed);
                                tracing::trace!(subscriber = *id, "inbox full, item dropped");
                            }
                            Err(mpsc::error::TrySendError::Closed(_)) => {
                                closed.push(*id);
                            }
                        }
                    }
                    for id in closed {
                        subs.remove(&id);
                        tracing::debug!(subscriber = id, "closed inbox pruned");
                    }
                    self.subscribers.store(subs.len(), Ordering::Relaxed);
                }
                Command::Stop => break,
            }
        }

        // Dropping the senders closes every inbox; blocked readers
        // observe end-of-stream.
        subs.clear();
        self.subscribers.store(0, Ordering::Relaxed);
        self.running.store(false, Ordering::SeqCst);
        tracing::debug!("broker control loop stopped");
    }

    /// Request a new bounded inbox
    ///
    /// Returns `Error::Unavailable` once the broker is stopped. Blocks
    /// only to hand the registration to the control loop; the inbox is
    /// created caller-side. If the loop dies before registering it, the
    /// inbox closes and the reader observes immediate end-of-stream.
    pub async fn subscribe(&self) -> Result<Subscription<T>> {
        if !self.is_running() {
            return Err(Error::Unavailable);
        }

        let id = self.next_subscriber_id.fetch_add(1, Ordering::Relaxed);
        let (tx, inbox) = mpsc::channel(self.config.inbox_capacity);
        self.ctl_tx
            .send(Command::Subscribe(id, tx))
            .await
            .map_err(|_| Error::Unavailable)?;

        Ok(Subscription {
            id,
            inbox,
            ctl_tx: self.ctl_tx.clone(),
        })
    }

    /// Remove a subscription from the active set and close its inbox
    pub fn unsubscribe(&self, subscription: Subscription<T>) {
        // Removal is requested by the subscription's drop handler.
        drop(subscription);
    }

    /// Best-effort broadcast to all active subscriptions
    ///
    /// Never fails from the caller's perspective. Blocks only while the
    /// control queue is saturated, never on a slow subscriber.
    pub async fn publish(&self, item: T) {
        if !self.is_running() {
            return;
        }
        if self.ctl_tx.send(Command::Publish(item)).await.is_err() {
            tracing::trace!("broker control loop gone, publish dropped");
        }
    }

    /// Stop the broker
    ///
    /// Clears the running flag first, so no new operations are
    /// accepted, then tells the loop to close every inbox and exit.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        if self.ctl_tx.send(Command::Stop).await.is_err() {
            tracing::debug!("broker control loop already gone");
        }
    }

    /// Snapshot of the broker counters
    pub fn stats(&self) -> BrokerStats {
        BrokerStats {
            subscribers: self.subscribers.load(Ordering::Relaxed),
            published: self.published.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}

impl<T: Clone + Send + 'static> Default for Broker<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_subscribe_publish_receive() {
        let broker = Arc::new(Broker::new());
        broker.start();

        let mut sub = broker.subscribe().await.unwrap();
        broker.publish("hello").await;

        assert_eq!(sub.recv().await, Some("hello"));
    }

    #[tokio::test]
    async fn test_late_subscriber_sees_only_future_items() {
        let broker = Arc::new(Broker::new());
        broker.start();

        let mut s1 = broker.subscribe().await.unwrap();
        broker.publish(1u32).await;
        broker.publish(2u32).await;

        // Registered after the first two publishes were queued, so it
        // must never see a backlog.
        let mut s2 = broker.subscribe().await.unwrap();
        broker.publish(3u32).await;

        assert_eq!(s1.recv().await, Some(1));
        assert_eq!(s1.recv().await, Some(2));
        assert_eq!(s1.recv().await, Some(3));

        assert_eq!(s2.recv().await, Some(3));
        assert!(s2.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_slow_subscriber_drops_do_not_affect_others() {
        let broker = Arc::new(Broker::new());
        broker.start();

        let mut slow = broker.subscribe().await.unwrap();
        let mut fast = broker.subscribe().await.unwrap();

        // Fill the slow inbox to its capacity of 5, draining the fast
        // one as we go so every publish is fully processed.
        for i in 0..5u32 {
            broker.publish(i).await;
            assert_eq!(fast.recv().await, Some(i));
        }

        // These two overflow the slow inbox and must be dropped for it
        // only; the reading subscriber still gets them.
        broker.publish(5).await;
        assert_eq!(fast.recv().await, Some(5));
        broker.publish(6).await;
        assert_eq!(fast.recv().await, Some(6));

        for i in 0..5u32 {
            assert_eq!(slow.recv().await, Some(i));
        }
        assert!(slow.try_recv().is_err());

        let stats = broker.stats();
        assert_eq!(stats.dropped, 2);
        assert_eq!(stats.published, 7);
    }

    #[tokio::test]
    async fn test_publish_never_blocks_on_full_inboxes() {
        let broker = Arc::new(Broker::new());
        broker.start();

        // Never read from it.
        let _stalled = broker.subscribe().await.unwrap();

        let publishes = async {
            for i in 0..100u32 {
                broker.publish(i).await;
            }
        };
        tokio::time::timeout(Duration::from_secs(1), publishes)
            .await
            .expect("publish must not block on a saturated subscriber");
    }

    #[tokio::test]
    async fn test_stop_closes_inboxes_and_rejects_new_subscribers() {
        let broker = Arc::new(Broker::new());
        let handle = broker.start();

        let mut sub = broker.subscribe().await.unwrap();
        broker.stop().await;
        handle.await.unwrap();

        // Every previously obtained inbox reports end-of-stream.
        assert_eq!(sub.recv().await, None);

        // All subsequent operations are unavailable / no-ops.
        assert!(matches!(broker.subscribe().await, Err(Error::Unavailable)));
        broker.publish(0u32).await;
        assert!(!broker.is_running());
    }

    #[tokio::test]
    async fn test_unsubscribe_removes_membership() {
        let broker = Arc::new(Broker::new());
        broker.start();

        let mut keep = broker.subscribe().await.unwrap();
        let gone = broker.subscribe().await.unwrap();

        broker.unsubscribe(gone);

        broker.publish(7u32).await;
        assert_eq!(keep.recv().await, Some(7));

        // The publish after the unsubscribe command has been processed,
        // so the gauge reflects the removal.
        assert_eq!(broker.stats().subscribers, 1);
    }

    #[tokio::test]
    async fn test_dropped_subscription_is_removed_before_next_delivery() {
        let broker = Arc::new(Broker::new());
        broker.start();

        let mut s1 = broker.subscribe().await.unwrap();
        let s2 = broker.subscribe().await.unwrap();

        // Simulates a streaming caller disconnecting mid-feed.
        drop(s2);

        broker.publish(1u32).await;
        assert_eq!(s1.recv().await, Some(1));

        let stats = broker.stats();
        assert_eq!(stats.subscribers, 1);
        // The item was delivered to the surviving subscriber only.
        assert_eq!(stats.delivered, 1);
    }

    #[tokio::test]
    async fn test_concurrent_membership_changes_are_serialized() {
        let broker = Arc::new(Broker::<u32>::new());
        broker.start();

        // Churners subscribe and immediately drop; holders keep theirs.
        let mut tasks = Vec::new();
        for _ in 0..16 {
            let broker = Arc::clone(&broker);
            tasks.push(tokio::spawn(async move {
                let sub = broker.subscribe().await.unwrap();
                drop(sub);
            }));
        }
        let mut holders = Vec::new();
        for _ in 0..4 {
            holders.push(broker.subscribe().await.unwrap());
        }
        for task in tasks {
            task.await.unwrap();
        }

        // A publish round-trip through every holder proves all queued
        // membership commands have been processed.
        broker.publish(42).await;
        for holder in &mut holders {
            assert_eq!(holder.recv().await, Some(42));
        }

        assert_eq!(broker.stats().subscribers, 4);
    }

    #[tokio::test]
    async fn test_double_start_is_harmless() {
        let broker = Arc::new(Broker::new());
        broker.start();
        let second = broker.start();

        // The second loop exits immediately; the first keeps serving.
        second.await.unwrap();

        let mut sub = broker.subscribe().await.unwrap();
        broker.publish(1u8).await;
        assert_eq!(sub.recv().await, Some(1));
    }

    #[tokio::test]
    async fn test_subscribe_before_start_is_unavailable() {
        let broker: Broker<u32> = Broker::new();
        assert!(matches!(broker.subscribe().await, Err(Error::Unavailable)));
    }
}

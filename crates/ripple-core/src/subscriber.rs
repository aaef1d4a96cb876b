// Per-client delivery actor with a bounded inbox and an explicit drop
// policy.
//
// The inbox is a hand-rolled bounded queue (Mutex<VecDeque> + Notify)
// rather than a tokio mpsc channel: DropOldest has to evict from the
// producer side, and an mpsc receiver cannot be stolen from. The queue
// lock is only ever held for push/pop, never across an await.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::sync::{watch, Notify};
use tokio::time::timeout;

use crate::{ClientTransport, Error, Message, Result};

const WRITE_TIMEOUT: Duration = Duration::from_secs(10);
const PING_INTERVAL: Duration = Duration::from_secs(30);
const PING_TIMEOUT: Duration = Duration::from_secs(10);
const HEALTHY_IDLE: Duration = Duration::from_secs(60);
const HEALTHY_DROP_RATE: f64 = 0.1;
const CIRCUIT_BREAKER_TRIP: u64 = 100;

/// What to do when a subscriber's inbox is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DropStrategy {
    /// Evict the oldest queued message to make room for the new one.
    #[default]
    DropOldest,
    /// Discard the incoming message and report a full buffer.
    DropNewest,
    /// Silently discard until the drop counter trips the breaker, then
    /// close the subscriber outright.
    CircuitBreaker,
}

#[derive(Debug, Clone, Copy)]
pub struct SubscriberMetrics {
    pub received: u64,
    pub sent: u64,
    pub dropped: u64,
    /// Messages sitting in the inbox right now.
    pub buffered: usize,
}

enum PushError {
    Full(Message),
    Closed,
}

struct Inbox {
    queue: Mutex<VecDeque<Message>>,
    notify: Notify,
    closed: AtomicBool,
    capacity: usize,
}

impl Inbox {
    fn new(capacity: usize) -> Self {
        Self {
            queue: Mutex::new(VecDeque::with_capacity(capacity)),
            notify: Notify::new(),
            closed: AtomicBool::new(false),
            capacity,
        }
    }

    fn try_push(&self, message: Message) -> std::result::Result<(), PushError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(PushError::Closed);
        }
        {
            let mut queue = self.queue.lock().expect("inbox lock");
            if queue.len() >= self.capacity {
                return Err(PushError::Full(message));
            }
            queue.push_back(message);
        }
        self.notify.notify_one();
        Ok(())
    }

    fn pop_oldest(&self) -> Option<Message> {
        self.queue.lock().expect("inbox lock").pop_front()
    }

    fn len(&self) -> usize {
        self.queue.lock().expect("inbox lock").len()
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    /// Dequeue the next message; drains remaining items after close, then
    /// yields `None`.
    async fn recv(&self) -> Option<Message> {
        loop {
            // Register for a wakeup before checking the queue so a push
            // between the check and the await cannot be missed.
            let notified = self.notify.notified();
            if let Some(message) = self.queue.lock().expect("inbox lock").pop_front() {
                return Some(message);
            }
            if self.closed.load(Ordering::SeqCst) {
                return None;
            }
            notified.await;
        }
    }
}

/// One connected client: identity, bounded inbox, transport handle, drop
/// policy, counters, and the long-lived delivery actor.
pub struct Subscriber {
    id: String,
    tenant_id: String,
    topic: String,
    inbox: Inbox,
    transport: Arc<dyn ClientTransport>,
    strategy: DropStrategy,
    cancel: watch::Sender<bool>,
    closed: AtomicBool,
    started: AtomicBool,
    received: AtomicU64,
    sent: AtomicU64,
    dropped: AtomicU64,
    last_active_ms: AtomicU64,
}

impl Subscriber {
    pub fn new(
        id: impl Into<String>,
        tenant_id: impl Into<String>,
        topic: impl Into<String>,
        transport: Arc<dyn ClientTransport>,
        buffer_size: usize,
    ) -> Self {
        let (cancel, _) = watch::channel(false);
        Self {
            id: id.into(),
            tenant_id: tenant_id.into(),
            topic: topic.into(),
            inbox: Inbox::new(buffer_size.max(1)),
            transport,
            strategy: DropStrategy::default(),
            cancel,
            closed: AtomicBool::new(false),
            started: AtomicBool::new(false),
            received: AtomicU64::new(0),
            sent: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            last_active_ms: AtomicU64::new(now_ms()),
        }
    }

    pub fn with_strategy(mut self, strategy: DropStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Receiver that flips to `true` when the subscriber is closed. The
    /// subscribe adapter parks on this to drive unsubscribe-on-disconnect.
    pub fn cancelled(&self) -> watch::Receiver<bool> {
        self.cancel.subscribe()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Spawn the delivery actor. Subsequent calls are no-ops.
    pub fn start(self: Arc<Self>) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }
        tokio::spawn(async move { self.run_delivery().await });
    }

    /// Non-blocking enqueue with backpressure handling.
    ///
    /// The only await point is the breaker-trip close; delivery itself
    /// happens on the actor, so one slow client never delays another.
    pub async fn send(&self, message: Message) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::Closed(self.id.clone()));
        }
        self.received.fetch_add(1, Ordering::Relaxed);
        match self.inbox.try_push(message) {
            Ok(()) => Ok(()),
            Err(PushError::Closed) => {
                // Raced with close after the counter bump; account the
                // message as dropped so the ledger still balances.
                self.dropped.fetch_add(1, Ordering::Relaxed);
                Err(Error::Closed(self.id.clone()))
            }
            Err(PushError::Full(message)) => self.handle_backpressure(message).await,
        }
    }

    async fn handle_backpressure(&self, message: Message) -> Result<()> {
        metrics::counter!("ripple_subscriber_backpressure_total").increment(1);
        match self.strategy {
            DropStrategy::DropOldest => {
                if self.inbox.pop_oldest().is_some() {
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                }
                match self.inbox.try_push(message) {
                    Ok(()) => Ok(()),
                    Err(_) => {
                        // A concurrent enqueue won the freed slot.
                        self.dropped.fetch_add(1, Ordering::Relaxed);
                        Err(Error::BufferFull(self.id.clone()))
                    }
                }
            }
            DropStrategy::DropNewest => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                Err(Error::BufferFull(self.id.clone()))
            }
            DropStrategy::CircuitBreaker => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                if dropped > CIRCUIT_BREAKER_TRIP {
                    self.close().await;
                    Err(Error::CircuitBreakerTripped(self.id.clone()))
                } else {
                    // Explicit best-effort under overload: the message is
                    // discarded and the send still reports success.
                    Ok(())
                }
            }
        }
    }

    /// Idempotent teardown: fires cancellation, closes the inbox so no
    /// further enqueue can land, and closes the transport normally.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = self.cancel.send(true);
        self.inbox.close();
        self.transport.close().await;
    }

    pub fn metrics(&self) -> SubscriberMetrics {
        SubscriberMetrics {
            received: self.received.load(Ordering::Relaxed),
            sent: self.sent.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            buffered: self.inbox.len(),
        }
    }

    pub fn is_slow(&self) -> bool {
        self.dropped.load(Ordering::Relaxed) > 0
    }

    pub fn is_healthy(&self) -> bool {
        let idle_ms = now_ms().saturating_sub(self.last_active_ms.load(Ordering::Relaxed));
        if idle_ms > HEALTHY_IDLE.as_millis() as u64 {
            return false;
        }
        let received = self.received.load(Ordering::Relaxed);
        if received == 0 {
            return true;
        }
        let dropped = self.dropped.load(Ordering::Relaxed);
        (dropped as f64 / received as f64) < HEALTHY_DROP_RATE
    }

    fn touch(&self) {
        self.last_active_ms.store(now_ms(), Ordering::Relaxed);
    }

    // Delivery actor: inbox drain, periodic ping, cancellation. Any write
    // or ping failure closes the subscriber and ends the actor.
    async fn run_delivery(&self) {
        let mut cancel_rx = self.cancel.subscribe();
        let start = tokio::time::Instant::now() + PING_INTERVAL;
        let mut ping = tokio::time::interval_at(start, PING_INTERVAL);
        ping.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                next = self.inbox.recv() => {
                    let Some(message) = next else {
                        // Inbox closed and drained.
                        return;
                    };
                    match timeout(WRITE_TIMEOUT, self.transport.send(&message)).await {
                        Ok(Ok(())) => {
                            self.sent.fetch_add(1, Ordering::Relaxed);
                            self.touch();
                        }
                        Ok(Err(err)) => {
                            tracing::info!(
                                subscriber_id = %self.id,
                                error = %err,
                                "transport write failed; closing subscriber"
                            );
                            self.close().await;
                            return;
                        }
                        Err(_) => {
                            tracing::info!(
                                subscriber_id = %self.id,
                                "transport write timed out; closing subscriber"
                            );
                            self.close().await;
                            return;
                        }
                    }
                }
                _ = ping.tick() => {
                    match timeout(PING_TIMEOUT, self.transport.ping()).await {
                        Ok(Ok(())) => {}
                        Ok(Err(err)) => {
                            tracing::info!(
                                subscriber_id = %self.id,
                                error = %err,
                                "ping failed; closing subscriber"
                            );
                            self.close().await;
                            return;
                        }
                        Err(_) => {
                            tracing::info!(
                                subscriber_id = %self.id,
                                "ping timed out; closing subscriber"
                            );
                            self.close().await;
                            return;
                        }
                    }
                }
                _ = cancel_rx.changed() => return,
            }
        }
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0)
}

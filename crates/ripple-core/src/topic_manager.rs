// Tenant-scoped topic registry, lifecycle, and the monitor loop feeding
// the adaptive throttler.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ripple_adaptive::{AdaptiveBufferManager, AdaptiveThrottler};
use tokio::sync::{watch, RwLock};

use crate::metrics::ManagerMetrics;
use crate::{Error, Message, Result, Subscriber, Topic, TopicKey};

const MONITOR_INTERVAL: Duration = Duration::from_secs(1);
const TOPIC_CACHE_SIZE: usize = 100;

pub struct TopicManager {
    topics: RwLock<HashMap<TopicKey, Arc<Topic>>>,
    buffers: Arc<AdaptiveBufferManager>,
    throttler: Arc<AdaptiveThrottler>,
    shutdown_tx: watch::Sender<bool>,
    shut_down: AtomicBool,
}

impl TopicManager {
    /// Build the manager and spawn its monitor loop, which pushes the
    /// subscriber census into the throttler every second until shutdown.
    pub fn new(
        buffers: Arc<AdaptiveBufferManager>,
        throttler: Arc<AdaptiveThrottler>,
    ) -> Arc<Self> {
        let (shutdown_tx, _) = watch::channel(false);
        let manager = Arc::new(Self {
            topics: RwLock::new(HashMap::new()),
            buffers,
            throttler,
            shutdown_tx,
            shut_down: AtomicBool::new(false),
        });
        Self::spawn_monitor(&manager);
        manager
    }

    fn spawn_monitor(manager: &Arc<Self>) {
        let manager = Arc::clone(manager);
        let mut shutdown_rx = manager.shutdown_tx.subscribe();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(MONITOR_INTERVAL);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let total = manager.total_subscriber_count().await;
                        let slow = manager.slow_subscriber_count().await;
                        manager.throttler.update_subscribers(slow, total);
                    }
                    _ = shutdown_rx.changed() => return,
                }
            }
        });
    }

    // Double-checked get-or-create: most calls resolve under the read
    // lock; the write-side re-probe covers a racing creator.
    async fn get_or_create(&self, tenant_id: &str, name: &str) -> Arc<Topic> {
        let key = TopicKey::new(tenant_id, name);
        if let Some(topic) = self.topics.read().await.get(&key) {
            return Arc::clone(topic);
        }

        let mut topics = self.topics.write().await;
        if let Some(topic) = topics.get(&key) {
            return Arc::clone(topic);
        }
        let topic = Arc::new(Topic::new(name, tenant_id, TOPIC_CACHE_SIZE));
        topics.insert(key.clone(), Arc::clone(&topic));
        metrics::counter!("ripple_topics_created_total").increment(1);
        tracing::info!(topic = %key, "topic created");
        topic
    }

    /// Publish into `tenant_id:name`, creating the topic on first use.
    pub async fn publish(&self, tenant_id: &str, name: &str, message: Message) -> Result<()> {
        if self.shut_down.load(Ordering::SeqCst) {
            return Err(Error::ShutDown);
        }
        let topic = self.get_or_create(tenant_id, name).await;
        topic.publish(message).await;
        Ok(())
    }

    /// Register a subscriber with `tenant_id:name`, creating the topic on
    /// first use. The buffer manager's ledger is updated here and rolled
    /// back if the topic rejects the subscriber.
    pub async fn subscribe(
        &self,
        tenant_id: &str,
        name: &str,
        subscriber: Arc<Subscriber>,
    ) -> Result<()> {
        if self.shut_down.load(Ordering::SeqCst) {
            return Err(Error::ShutDown);
        }
        if subscriber.tenant_id() != tenant_id {
            return Err(Error::TenantMismatch {
                subscriber_id: subscriber.id().to_string(),
                subscriber_tenant: subscriber.tenant_id().to_string(),
                topic_tenant: tenant_id.to_string(),
            });
        }

        let topic = self.get_or_create(tenant_id, name).await;
        self.buffers.on_subscriber_added();
        match topic.subscribe(subscriber).await {
            Ok(()) => Ok(()),
            Err(err) => {
                self.buffers.on_subscriber_removed();
                Err(err)
            }
        }
    }

    /// Remove a subscriber; the buffer ledger is decremented only when the
    /// removal actually happened.
    pub async fn unsubscribe(&self, tenant_id: &str, name: &str, subscriber_id: &str) -> Result<()> {
        let key = TopicKey::new(tenant_id, name);
        let topic = self
            .topics
            .read()
            .await
            .get(&key)
            .cloned()
            .ok_or_else(|| Error::TopicNotFound(key.to_string()))?;

        topic.unsubscribe(subscriber_id).await?;
        self.buffers.on_subscriber_removed();
        Ok(())
    }

    pub async fn get_topic(&self, tenant_id: &str, name: &str) -> Result<Arc<Topic>> {
        let key = TopicKey::new(tenant_id, name);
        self.topics
            .read()
            .await
            .get(&key)
            .cloned()
            .ok_or_else(|| Error::TopicNotFound(key.to_string()))
    }

    pub async fn topics(&self) -> Vec<Arc<Topic>> {
        self.topics.read().await.values().cloned().collect()
    }

    pub async fn topic_count(&self) -> usize {
        self.topics.read().await.len()
    }

    pub async fn total_subscriber_count(&self) -> usize {
        let topics = self.topics.read().await;
        let mut total = 0;
        for topic in topics.values() {
            total += topic.subscriber_count().await;
        }
        total
    }

    pub async fn slow_subscriber_count(&self) -> usize {
        let topics = self.topics.read().await;
        let mut slow = 0;
        for topic in topics.values() {
            slow += topic.slow_subscriber_count().await;
        }
        slow
    }

    pub async fn metrics(&self) -> ManagerMetrics {
        let topics = self.topics().await;
        let mut topic_metrics = Vec::with_capacity(topics.len());
        let mut total = 0;
        let mut slow = 0;
        for topic in &topics {
            total += topic.subscriber_count().await;
            slow += topic.slow_subscriber_count().await;
            topic_metrics.push(topic.metrics().await);
        }
        ManagerMetrics {
            total_topics: topics.len(),
            total_subscribers: total,
            slow_subscribers: slow,
            topics: topic_metrics,
            throttler_metrics: self.throttler.metrics(),
        }
    }

    /// Stop the monitor loop and close every subscriber. Idempotent; after
    /// shutdown no further delivery occurs and publish/subscribe refuse.
    pub async fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = self.shutdown_tx.send(true);

        let topics = self.topics.read().await;
        for topic in topics.values() {
            for subscriber in topic.snapshot().await {
                subscriber.close().await;
            }
        }
        tracing::info!("topic manager shut down");
    }
}

// One logical channel scoped to a tenant: live subscriber set, recent
// message ring for catch-up, and parallel fan-out.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::metrics::TopicMetrics;
use crate::{Error, Message, RecentCache, Result, Subscriber};

/// How many cached messages a new subscriber is replayed on join.
pub const CATCH_UP_MESSAGES: usize = 50;

pub struct Topic {
    name: String,
    tenant_id: String,
    subscribers: RwLock<HashMap<String, Arc<Subscriber>>>,
    recent: RecentCache,
    messages_published: AtomicU64,
    // Lifetime join count, distinct from the live set size.
    total_subscribers: AtomicU64,
    created_at: DateTime<Utc>,
}

impl Topic {
    pub fn new(
        name: impl Into<String>,
        tenant_id: impl Into<String>,
        cache_size: usize,
    ) -> Self {
        Self {
            name: name.into(),
            tenant_id: tenant_id.into(),
            subscribers: RwLock::new(HashMap::new()),
            recent: RecentCache::new(cache_size),
            messages_published: AtomicU64::new(0),
            total_subscribers: AtomicU64::new(0),
            created_at: Utc::now(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    /// Fan a message out to every current subscriber.
    ///
    /// The membership snapshot is taken under the read lock; delivery then
    /// runs as one task per subscriber so a stalled connection cannot
    /// serialize the others. Per-subscriber failures are logged, never
    /// returned: once the snapshot has been traversed the publish has
    /// succeeded.
    pub async fn publish(&self, message: Message) {
        self.messages_published.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("ripple_publish_total").increment(1);
        self.recent.add(message.clone());

        let snapshot: Vec<Arc<Subscriber>> =
            self.subscribers.read().await.values().cloned().collect();
        if snapshot.is_empty() {
            return;
        }

        let mut deliveries = Vec::with_capacity(snapshot.len());
        for subscriber in snapshot {
            let message = message.clone();
            deliveries.push(tokio::spawn(async move {
                if let Err(err) = subscriber.send(message).await {
                    metrics::counter!("ripple_fanout_dropped_total").increment(1);
                    tracing::info!(
                        subscriber_id = %subscriber.id(),
                        error = %err,
                        kind = err.kind(),
                        "fan-out delivery dropped"
                    );
                }
            }));
        }
        for delivery in deliveries {
            let _ = delivery.await;
        }
    }

    /// Register a subscriber: catch-up replay is enqueued asynchronously,
    /// then the delivery actor starts. Rejects a tenant mismatch.
    pub async fn subscribe(&self, subscriber: Arc<Subscriber>) -> Result<()> {
        if subscriber.tenant_id() != self.tenant_id {
            return Err(Error::TenantMismatch {
                subscriber_id: subscriber.id().to_string(),
                subscriber_tenant: subscriber.tenant_id().to_string(),
                topic_tenant: self.tenant_id.clone(),
            });
        }

        self.subscribers
            .write()
            .await
            .insert(subscriber.id().to_string(), Arc::clone(&subscriber));
        self.total_subscribers.fetch_add(1, Ordering::Relaxed);

        // Catch-up snapshot is taken now; the replay itself must not delay
        // the subscribe, and a replay failure never aborts it.
        let recent = self.recent.last(CATCH_UP_MESSAGES);
        let joined = Arc::clone(&subscriber);
        tokio::spawn(async move {
            for message in recent {
                if let Err(err) = joined.send(message).await {
                    tracing::info!(
                        subscriber_id = %joined.id(),
                        error = %err,
                        "catch-up replay stopped"
                    );
                    return;
                }
            }
        });

        Arc::clone(&subscriber).start();
        tracing::info!(
            subscriber_id = %subscriber.id(),
            tenant_id = %self.tenant_id,
            topic = %self.name,
            "subscriber joined"
        );
        Ok(())
    }

    /// Remove and close a subscriber. Remove-then-close order guarantees no
    /// further publish can fan out to it; the close itself runs outside the
    /// lock.
    pub async fn unsubscribe(&self, subscriber_id: &str) -> Result<()> {
        let removed = self.subscribers.write().await.remove(subscriber_id);
        match removed {
            Some(subscriber) => {
                subscriber.close().await;
                tracing::info!(
                    subscriber_id,
                    tenant_id = %self.tenant_id,
                    topic = %self.name,
                    "subscriber left"
                );
                Ok(())
            }
            None => Err(Error::SubscriberNotFound(subscriber_id.to_string())),
        }
    }

    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.read().await.len()
    }

    pub async fn slow_subscriber_count(&self) -> usize {
        self.subscribers
            .read()
            .await
            .values()
            .filter(|subscriber| subscriber.is_slow())
            .count()
    }

    pub(crate) async fn snapshot(&self) -> Vec<Arc<Subscriber>> {
        self.subscribers.read().await.values().cloned().collect()
    }

    pub fn recent_count(&self) -> usize {
        self.recent.count()
    }

    pub async fn metrics(&self) -> TopicMetrics {
        TopicMetrics {
            name: self.name.clone(),
            tenant_id: self.tenant_id.clone(),
            messages_published: self.messages_published.load(Ordering::Relaxed),
            active_subscribers: self.subscriber_count().await,
            total_subscribers: self.total_subscribers.load(Ordering::Relaxed),
            created_at: self.created_at,
        }
    }
}

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::broadcast;
use tracing::{debug, warn};
use uuid::Uuid;

use sidelines_types::events::{ChangeEvent, ChangeFilter};

const DEFAULT_CAPACITY: usize = 1024;

/// Row-change fan-out. Writers publish every committed insert/update here;
/// readers open filtered subscriptions.
#[derive(Clone)]
pub struct ChangeFeed {
    inner: Arc<FeedInner>,
}

struct FeedInner {
    /// Every subscription receives every event and filters locally.
    broadcast_tx: broadcast::Sender<ChangeEvent>,

    /// Open subscriptions: subscription id -> filter
    subscriptions: RwLock<HashMap<Uuid, ChangeFilter>>,
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl ChangeFeed {
    pub fn new(capacity: usize) -> Self {
        let (broadcast_tx, _) = broadcast::channel(capacity);
        Self {
            inner: Arc::new(FeedInner {
                broadcast_tx,
                subscriptions: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Publish a change. Returns how many subscriptions could see it.
    pub fn publish(&self, event: ChangeEvent) -> usize {
        self.inner.broadcast_tx.send(event).unwrap_or(0)
    }

    /// Open a subscription that yields only events matching `filter`.
    pub fn subscribe(&self, filter: ChangeFilter) -> FeedSubscription {
        let id = Uuid::new_v4();
        let rx = self.inner.broadcast_tx.subscribe();
        self.inner
            .subscriptions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, filter);
        debug!("Feed subscription {} opened on {:?}", id, filter);

        FeedSubscription {
            id,
            filter,
            rx,
            feed: self.inner.clone(),
        }
    }

    /// Number of subscriptions not yet closed.
    pub fn active_subscriptions(&self) -> usize {
        self.inner
            .subscriptions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// A filtered view of the feed. Closing (or dropping) it deregisters it.
pub struct FeedSubscription {
    id: Uuid,
    filter: ChangeFilter,
    rx: broadcast::Receiver<ChangeEvent>,
    feed: Arc<FeedInner>,
}

impl FeedSubscription {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn filter(&self) -> ChangeFilter {
        self.filter
    }

    /// Next matching event, or `None` once the feed itself is gone.
    pub async fn recv(&mut self) -> Option<ChangeEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) if self.filter.matches(&event) => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Feed subscription {} lagged by {} events", self.id, n);
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    pub fn close(self) {}
}

impl Drop for FeedSubscription {
    fn drop(&mut self) {
        if let Ok(mut subs) = self.feed.subscriptions.write() {
            subs.remove(&self.id);
        }
        debug!("Feed subscription {} closed", self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sidelines_types::events::{ChangeRow, Table};
    use sidelines_types::models::{HighlightRow, MessageRow};

    fn message(channel_id: i64, id: i64) -> ChangeEvent {
        ChangeEvent::insert(ChangeRow::Messages(MessageRow {
            id,
            message: format!("msg {}", id),
            inserted_at: Utc::now(),
            user_id: Uuid::new_v4(),
            channel_id,
            is_pinned: false,
        }))
    }

    fn highlight(channel_id: i64, id: i64) -> ChangeEvent {
        ChangeEvent::insert(ChangeRow::Highlights(HighlightRow {
            id,
            channel_id,
            title: "Three".into(),
            description: "Corner three".into(),
            game_time: None,
            highlight_type: "SCORE".into(),
            inserted_at: Utc::now(),
            team_id: None,
            media_url: None,
        }))
    }

    #[tokio::test]
    async fn subscription_only_sees_its_channel_and_table() {
        let feed = ChangeFeed::default();
        let mut sub = feed.subscribe(ChangeFilter::inserts(Table::Messages, 1));

        feed.publish(message(2, 10));
        feed.publish(highlight(1, 11));
        feed.publish(message(1, 12));

        let ev = sub.recv().await.unwrap();
        assert_eq!(ev.row.channel_id(), 1);
        match ev.row {
            ChangeRow::Messages(m) => assert_eq!(m.id, 12),
            other => panic!("unexpected row {:?}", other),
        }
    }

    #[tokio::test]
    async fn close_and_drop_deregister() {
        let feed = ChangeFeed::default();
        let a = feed.subscribe(ChangeFilter::inserts(Table::Messages, 1));
        let b = feed.subscribe(ChangeFilter::inserts(Table::Highlights, 1));
        assert_eq!(feed.active_subscriptions(), 2);

        a.close();
        assert_eq!(feed.active_subscriptions(), 1);
        drop(b);
        assert_eq!(feed.active_subscriptions(), 0);
    }

    #[test]
    fn publish_without_subscribers_is_harmless() {
        let feed = ChangeFeed::default();
        assert_eq!(feed.publish(message(1, 1)), 0);
    }
}

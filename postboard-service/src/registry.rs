//! In-process fanout of new comments to live listeners.
//!
//! Delivery is at most once. A sink whose buffer is full misses the comment;
//! the publisher never waits for a consumer.

use parking_lot::Mutex;
use postboard_common::model::{Id, comment::Comment, post::PostMarker};
use std::collections::HashMap;
use tokio::sync::mpsc::{Sender, error::TrySendError};
use tracing::{debug, warn};

/// Topics are post ids.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    topics: Mutex<HashMap<Id<PostMarker>, Vec<Sender<Comment>>>>,
}

impl SubscriptionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `sink` to the listeners of `topic`. The same sink may be added twice.
    pub fn subscribe(&self, topic: Id<PostMarker>, sink: Sender<Comment>) {
        self.topics.lock().entry(topic).or_default().push(sink);
        debug!(%topic, "Subscribed to comments");
    }

    /// Removes one registration of `sink`. Returns whether it was registered.
    pub fn unsubscribe(&self, topic: Id<PostMarker>, sink: &Sender<Comment>) -> bool {
        let mut topics = self.topics.lock();
        let Some(sinks) = topics.get_mut(&topic) else {
            return false;
        };

        let removed = sinks
            .iter()
            .position(|registered| registered.same_channel(sink))
            .map(|position| sinks.remove(position))
            .is_some();
        if sinks.is_empty() {
            topics.remove(&topic);
        }

        debug!(%topic, removed, "Unsubscribed from comments");
        removed
    }

    /// Offers `comment` to every sink of `topic` without waiting. Sinks whose
    /// receiver is gone are dropped from the topic. Returns the number of sinks
    /// that accepted the comment.
    pub fn publish(&self, topic: Id<PostMarker>, comment: &Comment) -> usize {
        let mut topics = self.topics.lock();
        let Some(sinks) = topics.get_mut(&topic) else {
            return 0;
        };

        let mut delivered = 0;
        sinks.retain(|sink| match sink.try_send(comment.clone()) {
            Ok(()) => {
                delivered += 1;
                true
            }
            Err(TrySendError::Full(_)) => {
                warn!(%topic, comment_id = %comment.id, "Subscriber buffer full, dropping comment");
                true
            }
            Err(TrySendError::Closed(_)) => false,
        });
        if sinks.is_empty() {
            topics.remove(&topic);
        }

        delivered
    }

    #[must_use]
    pub fn subscriber_count(&self, topic: Id<PostMarker>) -> usize {
        self.topics.lock().get(&topic).map_or(0, Vec::len)
    }

    #[must_use]
    pub fn topic_count(&self) -> usize {
        self.topics.lock().len()
    }
}

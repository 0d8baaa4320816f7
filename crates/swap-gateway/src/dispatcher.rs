use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{RwLock, broadcast};
use tracing::trace;
use uuid::Uuid;

use swap_types::events::MatchEvent;

/// Per-match buffer. A subscriber that falls further behind than this gets
/// `Lagged` and is expected to catch up from storage.
const CHANNEL_CAPACITY: usize = 64;

/// Fans change notifications out to the streams watching a match.
///
/// Channels are keyed by match id and created on first subscription. A
/// channel goes away when its last [`Subscription`] is dropped, or on the
/// first publish that finds nobody listening.
#[derive(Clone, Default)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

#[derive(Default)]
struct DispatcherInner {
    /// match_id -> sender shared by every stream open on that match
    channels: RwLock<HashMap<Uuid, broadcast::Sender<MatchEvent>>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to events for a single match. The channel is released
    /// when the returned guard is dropped.
    pub async fn subscribe(&self, match_id: Uuid) -> Subscription {
        let rx = self
            .inner
            .channels
            .write()
            .await
            .entry(match_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe();

        Subscription {
            match_id,
            rx: Some(rx),
            dispatcher: self.clone(),
        }
    }

    /// Drop the channel for a match if nobody is subscribed to it any more.
    pub async fn unsubscribe(&self, match_id: Uuid) {
        let mut channels = self.inner.channels.write().await;
        if channels
            .get(&match_id)
            .is_some_and(|tx| tx.receiver_count() == 0)
        {
            trace!("Last listener left match {}, dropping channel", match_id);
            channels.remove(&match_id);
        }
    }

    /// Publish an event to the match it belongs to. Delivery is best-effort:
    /// with no open stream the event is simply dropped.
    pub async fn publish(&self, event: MatchEvent) {
        let match_id = event.match_id();
        let mut channels = self.inner.channels.write().await;

        let Some(tx) = channels.get(&match_id) else {
            return;
        };
        if tx.send(event).is_err() {
            trace!("No listeners left on match {}, dropping channel", match_id);
            channels.remove(&match_id);
        }
    }

    pub async fn publish_removed(&self, match_ids: &[Uuid]) {
        for &match_id in match_ids {
            self.publish(MatchEvent::MatchRemoved { match_id }).await;
        }
    }

    /// Number of live subscribers on a match.
    pub async fn subscriber_count(&self, match_id: Uuid) -> usize {
        self.inner
            .channels
            .read()
            .await
            .get(&match_id)
            .map_or(0, |tx| tx.receiver_count())
    }

    /// Number of matches with an open channel.
    pub async fn channel_count(&self) -> usize {
        self.inner.channels.read().await.len()
    }
}

/// A live subscription to one match's events.
pub struct Subscription {
    match_id: Uuid,
    /// Only `None` while the guard is being dropped
    rx: Option<broadcast::Receiver<MatchEvent>>,
    dispatcher: Dispatcher,
}

impl Subscription {
    pub async fn recv(&mut self) -> Result<MatchEvent, RecvError> {
        match self.rx.as_mut() {
            Some(rx) => rx.recv().await,
            None => Err(RecvError::Closed),
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        // Release the receiver first so the cleanup sees the real count
        drop(self.rx.take());

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let dispatcher = self.dispatcher.clone();
        let match_id = self.match_id;
        handle.spawn(async move {
            dispatcher.unsubscribe(match_id).await;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    /// Let spawned cleanup tasks run, then report the channel count.
    async fn settled_channel_count(dispatcher: &Dispatcher) -> usize {
        for _ in 0..50 {
            if dispatcher.channel_count().await == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        dispatcher.channel_count().await
    }

    fn created(match_id: Uuid) -> MatchEvent {
        MatchEvent::MessageCreated {
            match_id,
            message_id: Uuid::new_v4(),
            sender_id: Uuid::new_v4(),
        }
    }

    #[tokio::test]
    async fn events_reach_only_their_match() {
        let dispatcher = Dispatcher::new();
        let watched = Uuid::new_v4();
        let other = Uuid::new_v4();

        let mut rx = dispatcher.subscribe(watched).await;
        let mut other_rx = dispatcher.subscribe(other).await;

        let event = created(watched);
        dispatcher.publish(event.clone()).await;

        assert_eq!(rx.recv().await.unwrap(), event);
        let quiet = tokio::time::timeout(Duration::from_millis(50), other_rx.recv()).await;
        assert!(quiet.is_err());
    }

    #[tokio::test]
    async fn every_subscriber_of_a_match_receives() {
        let dispatcher = Dispatcher::new();
        let match_id = Uuid::new_v4();
        let mut first = dispatcher.subscribe(match_id).await;
        let mut second = dispatcher.subscribe(match_id).await;
        assert_eq!(dispatcher.subscriber_count(match_id).await, 2);

        dispatcher.publish_removed(&[match_id]).await;

        let expected = MatchEvent::MatchRemoved { match_id };
        assert_eq!(first.recv().await.unwrap(), expected);
        assert_eq!(second.recv().await.unwrap(), expected);
    }

    #[tokio::test]
    async fn abandoned_channels_are_pruned() {
        let dispatcher = Dispatcher::new();
        let match_id = Uuid::new_v4();

        let rx = dispatcher.subscribe(match_id).await;
        drop(rx);
        assert_eq!(dispatcher.subscriber_count(match_id).await, 0);

        dispatcher.publish(created(match_id)).await;
        assert!(dispatcher.inner.channels.read().await.is_empty());
    }

    #[tokio::test]
    async fn publishing_without_subscribers_is_a_no_op() {
        let dispatcher = Dispatcher::new();
        dispatcher.publish(created(Uuid::new_v4())).await;
        assert!(dispatcher.inner.channels.read().await.is_empty());
    }

    #[tokio::test]
    async fn dropped_subscriptions_release_their_channel() {
        let dispatcher = Dispatcher::new();
        for _ in 0..1000 {
            drop(dispatcher.subscribe(Uuid::new_v4()).await);
        }
        assert_eq!(settled_channel_count(&dispatcher).await, 0);
    }

    #[tokio::test]
    async fn channel_survives_while_another_subscriber_remains() {
        let dispatcher = Dispatcher::new();
        let match_id = Uuid::new_v4();
        let first = dispatcher.subscribe(match_id).await;
        let mut second = dispatcher.subscribe(match_id).await;

        drop(first);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(dispatcher.channel_count().await, 1);

        let event = created(match_id);
        dispatcher.publish(event.clone()).await;
        assert_eq!(second.recv().await.unwrap(), event);

        drop(second);
        assert_eq!(settled_channel_count(&dispatcher).await, 0);
    }
}

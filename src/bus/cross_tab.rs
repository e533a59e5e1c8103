//! Cross-tab signal transport.
//!
//! Models a browser `BroadcastChannel`: every tab connects to the same
//! [`BroadcastHub`], messages travel as CBOR bytes, and a tab never receives
//! what it posted itself.

use async_trait::async_trait;
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use uuid::Uuid;

use super::{BusError, SignalEnvelope, SignalStream, SignalTransport};

/// Shared medium all tabs of one origin are attached to.
#[derive(Clone)]
pub struct BroadcastHub {
    tx: broadcast::Sender<Vec<u8>>,
}

impl BroadcastHub {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        BroadcastHub { tx }
    }
}

/// One tab's handle on the hub.
#[derive(Clone)]
pub struct CrossTabChannel {
    hub: BroadcastHub,
    tab_id: Uuid,
}

impl CrossTabChannel {
    /// Attach a new tab with a fresh id.
    pub fn connect(hub: &BroadcastHub) -> Self {
        CrossTabChannel {
            hub: hub.clone(),
            tab_id: Uuid::new_v4(),
        }
    }

    pub fn tab_id(&self) -> Uuid {
        self.tab_id
    }
}

#[async_trait]
impl SignalTransport for CrossTabChannel {
    async fn publish(&self, mut envelope: SignalEnvelope) -> Result<(), BusError> {
        envelope.origin = self.tab_id;
        let bytes = envelope.to_cbor()?;
        let _ = self.hub.tx.send(bytes);
        Ok(())
    }

    async fn subscribe(&self) -> Result<SignalStream, BusError> {
        let rx = self.hub.tx.subscribe();
        let own = self.tab_id;

        let stream = BroadcastStream::new(rx).filter_map(move |result| match result {
            Ok(bytes) => match SignalEnvelope::from_cbor(&bytes) {
                Ok(envelope) if envelope.origin == own => None,
                Ok(envelope) => Some(envelope),
                Err(e) => {
                    log::warn!("dropping undecodable cross-tab message: {}", e);
                    None
                }
            },
            Err(BroadcastStreamRecvError::Lagged(missed)) => {
                log::warn!("cross-tab subscriber lagged by {} messages", missed);
                Some(SignalEnvelope::lagged())
            }
        });

        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::Signal;
    use std::time::Duration;

    #[tokio::test]
    async fn test_other_tab_receives() {
        let hub = BroadcastHub::new(8);
        let tab_a = CrossTabChannel::connect(&hub);
        let tab_b = CrossTabChannel::connect(&hub);
        let mut stream_b = tab_b.subscribe().await.unwrap();

        let env = SignalEnvelope::new(Signal::GroupCreated, None, Uuid::nil(), Uuid::new_v4());
        tab_a.publish(env.clone()).await.unwrap();

        let received = tokio::time::timeout(Duration::from_millis(100), stream_b.next())
            .await
            .expect("timeout")
            .expect("stream ended");
        assert_eq!(received.id, env.id);
        assert_eq!(received.origin, tab_a.tab_id());
    }

    #[tokio::test]
    async fn test_own_messages_filtered() {
        let hub = BroadcastHub::new(8);
        let tab = CrossTabChannel::connect(&hub);
        let mut stream = tab.subscribe().await.unwrap();

        tab.publish(SignalEnvelope::new(Signal::GroupLeft, None, Uuid::nil(), Uuid::nil()))
            .await
            .unwrap();

        let result = tokio::time::timeout(Duration::from_millis(50), stream.next()).await;
        assert!(result.is_err(), "a tab must not hear its own broadcast");
    }

    #[tokio::test]
    async fn test_garbage_is_skipped() {
        let hub = BroadcastHub::new(8);
        let tab_a = CrossTabChannel::connect(&hub);
        let tab_b = CrossTabChannel::connect(&hub);
        let mut stream_b = tab_b.subscribe().await.unwrap();

        let _ = hub.tx.send(vec![0xFF, 0xFF, 0xFF]);
        let env = SignalEnvelope::new(Signal::GroupsInvalidate, None, Uuid::nil(), Uuid::nil());
        tab_a.publish(env.clone()).await.unwrap();

        let received = stream_b.next().await.unwrap();
        assert_eq!(received.id, env.id);
    }
}

//! Same-window signal transport.
//!
//! Every view in one window shares a `WindowBus` (it is cheap to clone).
//! Delivery is in-process only; other tabs are reached through
//! [`super::CrossTabChannel`].

use async_trait::async_trait;
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

use super::{BusError, SignalEnvelope, SignalStream, SignalTransport};

#[derive(Clone)]
pub struct WindowBus {
    tx: broadcast::Sender<SignalEnvelope>,
}

impl WindowBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        WindowBus { tx }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[async_trait]
impl SignalTransport for WindowBus {
    async fn publish(&self, envelope: SignalEnvelope) -> Result<(), BusError> {
        // No receivers is fine: nobody is mounted to care
        let _ = self.tx.send(envelope);
        Ok(())
    }

    async fn subscribe(&self) -> Result<SignalStream, BusError> {
        let rx = self.tx.subscribe();

        // A lagged receiver missed signals; replace them with one forced resync
        let stream = BroadcastStream::new(rx).filter_map(|result| match result {
            Ok(envelope) => Some(envelope),
            Err(BroadcastStreamRecvError::Lagged(missed)) => {
                log::warn!("window subscriber lagged by {} signals", missed);
                Some(SignalEnvelope::lagged())
            }
        });

        Ok(Box::pin(stream))
    }
}

//! Receiver lifecycle for the node

use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{info, warn};
use votifier_core::{
    KeyPair, ListenerRegistry, ReceiverConfig, ShutdownOutcome, StatsSnapshot, VoteReceiver,
};

use crate::error::NodeError;

/// Owns the listeners and the receiver
pub struct Service {
    registry: Arc<ListenerRegistry>,
    receiver: VoteReceiver,
}

impl Service {
    pub fn new(config: ReceiverConfig, keys: KeyPair) -> Self {
        let registry = Arc::new(ListenerRegistry::new());
        let receiver = VoteReceiver::new(config, Arc::new(keys), registry.clone());
        Self { registry, receiver }
    }

    pub fn registry(&self) -> &Arc<ListenerRegistry> {
        &self.registry
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.receiver.stats()
    }

    pub async fn enable(&mut self) -> Result<SocketAddr, NodeError> {
        let addr = self.receiver.start().await?;
        info!(
            "Votifier enabled on {} with {} listener(s).",
            addr,
            self.registry.len()
        );
        Ok(addr)
    }

    pub async fn disable(&mut self) -> ShutdownOutcome {
        let outcome = self.receiver.shutdown().await;
        if let ShutdownOutcome::Forced { aborted } = outcome {
            warn!("Dropped {} connection(s) still in flight", aborted);
        }
        info!("Votifier disabled.");
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use votifier_core::{ChannelListener, Vote, VoteSender};

    #[tokio::test]
    async fn test_enable_receive_disable() {
        let config = ReceiverConfig::new("127.0.0.1", 0).with_read_timeout(Duration::from_secs(2));
        let keys = KeyPair::generate_with_bits(1024).unwrap();
        let public_key = keys.public_key().clone();
        let mut service = Service::new(config, keys);

        let (listener, mut rx) = ChannelListener::new("test", 4);
        service.registry().register(Arc::new(listener));

        let addr = service.enable().await.unwrap();

        let vote = Vote::new("svc", "dave", "10.1.1.1", "1700000000").unwrap();
        VoteSender::new(addr, public_key)
            .send(&vote)
            .await
            .unwrap();

        let received = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received, vote);

        assert!(matches!(
            service.disable().await,
            ShutdownOutcome::Graceful { .. }
        ));
        assert_eq!(service.stats().delivered, 1);
    }
}

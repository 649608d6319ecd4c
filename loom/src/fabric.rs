//! Fabric: the process-wide bundle of broadcast bus, message queue, shared
//! memory, reference store, and policy manager.
//!
//! Every payload the fabric carries goes through [`Fabric::make_payload`],
//! which consults the policy manager and stores reference-routed bytes in the
//! reference store. Consumers call [`Fabric::open_payload`] to get bytes back
//! regardless of routing.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::bus::{BroadcastBus, BusError, BusMessage, MetadataFilter, Subscription};
use crate::payload::MessagePayload;
use crate::policy::{PolicyManager, RoutingDecision};
use crate::queue::{MessageQueue, OutgoingMessage, QueueError, QueueMessage, ReceiveFilter};
use crate::reference::{ReferenceError, ReferenceStore, StoreOpts};
use crate::shared_memory::SharedMemory;

#[derive(Debug, Error)]
pub enum FabricError {
    #[error(transparent)]
    Bus(#[from] BusError),
    #[error(transparent)]
    Queue(#[from] QueueError),
    #[error(transparent)]
    Reference(#[from] ReferenceError),
}

/// Process-wide communication substrate handles.
///
/// **Interaction**: Built once at startup and shared via `Arc`; workflows,
/// agent runtimes, and the tool executor all talk through it.
pub struct Fabric {
    bus: Arc<BroadcastBus>,
    queue: Arc<MessageQueue>,
    shared_memory: Arc<SharedMemory>,
    references: Arc<dyn ReferenceStore>,
    policy: Arc<PolicyManager>,
}

impl Fabric {
    pub fn new(
        bus: Arc<BroadcastBus>,
        queue: Arc<MessageQueue>,
        shared_memory: Arc<SharedMemory>,
        references: Arc<dyn ReferenceStore>,
        policy: Arc<PolicyManager>,
    ) -> Self {
        Self {
            bus,
            queue,
            shared_memory,
            references,
            policy,
        }
    }

    pub fn bus(&self) -> &Arc<BroadcastBus> {
        &self.bus
    }

    pub fn queue(&self) -> &Arc<MessageQueue> {
        &self.queue
    }

    pub fn shared_memory(&self) -> &Arc<SharedMemory> {
        &self.shared_memory
    }

    pub fn references(&self) -> &Arc<dyn ReferenceStore> {
        &self.references
    }

    pub fn policy(&self) -> &Arc<PolicyManager> {
        &self.policy
    }

    /// Routes bytes into a payload per policy: inline VALUE, or a REFERENCE
    /// stored in the reference store (with the rule's TTL, if any).
    pub async fn make_payload(
        &self,
        message_type: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<MessagePayload, FabricError> {
        match self.policy.decide(message_type, bytes.len()) {
            RoutingDecision::Value => Ok(MessagePayload::Value {
                bytes: bytes.to_vec(),
                content_type: content_type.to_string(),
            }),
            RoutingDecision::Reference => {
                let mut opts = StoreOpts::default().with_content_type(content_type);
                if let Some(ttl) = self.policy.rule(message_type).ttl {
                    opts = opts.with_ttl(ttl);
                }
                let reference = self.references.store(bytes, opts).await?;
                Ok(MessagePayload::Reference {
                    ref_id: reference.id,
                })
            }
        }
    }

    /// Resolves a payload back to bytes regardless of routing.
    pub async fn open_payload(&self, payload: &MessagePayload) -> Result<Vec<u8>, FabricError> {
        match payload {
            MessagePayload::Value { bytes, .. } => Ok(bytes.clone()),
            MessagePayload::Reference { ref_id } => Ok(self.references.resolve(ref_id).await?),
        }
    }

    /// Routes and publishes bytes on a bus topic.
    pub async fn publish(
        &self,
        topic: &str,
        sender: &str,
        message_type: &str,
        bytes: &[u8],
        metadata: HashMap<String, String>,
    ) -> Result<(), FabricError> {
        let payload = self.make_payload(message_type, bytes, "text/plain").await?;
        let mut message = BusMessage::new(topic, sender, payload);
        message.metadata = metadata;
        message
            .metadata
            .insert("message_type".to_string(), message_type.to_string());
        self.bus.publish(message);
        Ok(())
    }

    pub fn subscribe(
        &self,
        pattern: &str,
        filters: Vec<MetadataFilter>,
    ) -> Result<Subscription, FabricError> {
        Ok(self.bus.subscribe(pattern, filters)?)
    }

    /// Routes and sends bytes point-to-point.
    pub async fn send_to(
        &self,
        from: &str,
        to: &str,
        message_type: &str,
        bytes: &[u8],
    ) -> Result<String, FabricError> {
        let payload = self.make_payload(message_type, bytes, "text/plain").await?;
        let id = self
            .queue
            .send(OutgoingMessage::new(from, to, message_type, payload))
            .await?;
        Ok(id)
    }

    pub async fn receive_from_queue(
        &self,
        to: &str,
        filter: Option<ReceiveFilter>,
        timeout: Duration,
    ) -> Result<Option<QueueMessage>, FabricError> {
        Ok(self.queue.receive(to, filter, timeout).await?)
    }
}

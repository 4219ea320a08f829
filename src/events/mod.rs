//! Tenant-scoped event bus and job queue (§4.E, §5).

pub mod queue;
pub mod sse;

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;

use crate::domain::TenantId;

/// A single tenant-scoped occurrence, published by a workflow's `Emit` task or by the scheduler
/// when a job fires. Event-triggered workflows subscribe to `event_type`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub tenant_id: TenantId,
    pub event_type: String,
    pub payload: HashMap<String, Value>,
    pub emitted_at: DateTime<Utc>,
}

/// Capacity of each tenant's broadcast channel. Delivery is best-effort at-most-once (§4.E): a
/// subscriber that's behind by more than this many events silently misses the oldest ones
/// rather than blocking the publisher.
const CHANNEL_CAPACITY: usize = 256;

/// Publishes [`Envelope`]s onto per-tenant broadcast channels. Subscribers that aren't currently
/// listening simply never see the event — there is no durable inbox, matching the at-most-once
/// delivery the specification calls for (any exactly-once guarantee belongs to the outer system
/// that persists workflow executions, not to the bus itself).
pub struct EventBus {
    channels: Mutex<HashMap<TenantId, broadcast::Sender<Envelope>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            channels: Mutex::new(HashMap::new()),
        }
    }

    fn channel_for(&self, tenant_id: TenantId) -> broadcast::Sender<Envelope> {
        let mut channels = self.channels.lock().expect("event bus mutex poisoned");
        channels
            .entry(tenant_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }

    /// Publish an event. Returns the number of active subscribers it reached; `0` is not an
    /// error — publishing with no listeners is the common case for a tenant with no open SSE
    /// connections or event-triggered workflows at that moment.
    pub fn publish(&self, envelope: Envelope) -> usize {
        let sender = self.channel_for(envelope.tenant_id);
        sender.send(envelope).unwrap_or(0)
    }

    /// Subscribe to `tenant_id`'s channel, immediately publishing a `connected` event so the new
    /// listener (e.g. an SSE client) has a confirming first message before anything else happens
    /// to arrive (§4.C).
    pub fn subscribe(&self, tenant_id: TenantId) -> broadcast::Receiver<Envelope> {
        let sender = self.channel_for(tenant_id);
        let receiver = sender.subscribe();
        let _ = sender.send(Envelope {
            tenant_id,
            event_type: "connected".to_string(),
            payload: HashMap::new(),
            emitted_at: Utc::now(),
        });
        receiver
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriber_receives_published_event() {
        let bus = EventBus::new();
        let tenant_id = TenantId::new();
        let mut rx = bus.subscribe(tenant_id);

        let connected = rx.recv().await.unwrap();
        assert_eq!(connected.event_type, "connected");

        bus.publish(Envelope {
            tenant_id,
            event_type: "invoice.created".to_string(),
            payload: HashMap::new(),
            emitted_at: Utc::now(),
        });

        let received = rx.recv().await.unwrap();
        assert_eq!(received.event_type, "invoice.created");
    }

    #[tokio::test]
    async fn subscribing_publishes_a_connected_event_first() {
        let bus = EventBus::new();
        let tenant_id = TenantId::new();
        let mut rx = bus.subscribe(tenant_id);
        let received = rx.recv().await.unwrap();
        assert_eq!(received.event_type, "connected");
        assert_eq!(received.tenant_id, tenant_id);
    }

    #[tokio::test]
    async fn publish_with_no_subscribers_does_not_error() {
        let bus = EventBus::new();
        let tenant_id = TenantId::new();
        let delivered = bus.publish(Envelope {
            tenant_id,
            event_type: "noop".to_string(),
            payload: HashMap::new(),
            emitted_at: Utc::now(),
        });
        assert_eq!(delivered, 0);
    }

    #[tokio::test]
    async fn tenants_are_isolated() {
        let bus = EventBus::new();
        let tenant_a = TenantId::new();
        let tenant_b = TenantId::new();
        let mut rx_b = bus.subscribe(tenant_b);

        bus.publish(Envelope {
            tenant_id: tenant_a,
            event_type: "x".to_string(),
            payload: HashMap::new(),
            emitted_at: Utc::now(),
        });

        assert!(rx_b.try_recv().is_err());
    }
}

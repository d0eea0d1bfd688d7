//! Domain event publishing over NATS.

use crate::domain::events::DomainEvent;

/// Publishes domain events; a publisher without a client drops them.
#[derive(Clone, Default)]
pub struct EventPublisher {
    client: Option<async_nats::Client>,
}

impl EventPublisher {
    pub fn new(client: Option<async_nats::Client>) -> Self {
        Self { client }
    }

    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn is_enabled(&self) -> bool {
        self.client.is_some()
    }

    /// Connect to `url`, falling back to a disabled publisher on failure.
    pub async fn connect(url: Option<&str>) -> Self {
        let Some(url) = url else {
            tracing::info!("NATS_URL not set, domain events disabled");
            return Self::disabled();
        };
        match async_nats::connect(url).await {
            Ok(client) => {
                tracing::info!(url, "connected to NATS");
                Self::new(Some(client))
            }
            Err(err) => {
                tracing::warn!(url, error = %err, "NATS unavailable, domain events disabled");
                Self::disabled()
            }
        }
    }

    /// Publish events in order. Failures are logged; the request that
    /// raised them has already committed.
    pub async fn publish(&self, events: Vec<DomainEvent>) {
        let Some(client) = &self.client else { return };
        for event in events {
            let subject = event.subject();
            let payload = match serde_json::to_vec(&event) {
                Ok(payload) => payload,
                Err(err) => {
                    tracing::error!(subject, error = %err, "failed to serialize event");
                    continue;
                }
            };
            if let Err(err) = client.publish(subject.to_string(), payload.into()).await {
                tracing::warn!(subject, error = %err, "failed to publish event");
            } else {
                tracing::debug!(subject, "event published");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::events::OrderEvent;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_disabled_publisher_drops_events() {
        let publisher = EventPublisher::connect(None).await;
        assert!(!publisher.is_enabled());
        publisher.publish(vec![DomainEvent::Order(OrderEvent::Delivered { order_id: Uuid::new_v4() })]).await;
    }
}

use crate::{
    Entity, EntityKey, LifecycleEvent, NotificationCalculator, NotificationConsumer,
    PropagationConfig, Result,
};
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info};

/// Payload handed to consumers for one propagation run.
#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub event: LifecycleEvent,
    pub source: EntityKey,
    pub targets: Vec<Entity>,
}

/// Explicit save/destroy entry points for the host's persistence layer.
///
/// Call `on_after_save` once a save has succeeded and `on_before_destroy`
/// before the delete runs: the whole run, fetches included, completes inside
/// the call, so the record's associations are read while it still exists.
pub struct LifecycleHook {
    calculator: NotificationCalculator,
    enabled: bool,
    consumers: RwLock<Vec<Arc<dyn NotificationConsumer>>>,
    /// Internal broadcast channel for subscribers that do not implement the trait
    tx: broadcast::Sender<Notification>,
}

impl LifecycleHook {
    pub fn new(calculator: NotificationCalculator, config: &PropagationConfig) -> Self {
        let (tx, _rx) = broadcast::channel(config.broadcast_capacity.max(1));
        Self {
            calculator: calculator.with_config(config),
            enabled: config.enabled,
            consumers: RwLock::new(Vec::new()),
            tx,
        }
    }

    pub fn with_consumer(self, consumer: Arc<dyn NotificationConsumer>) -> Self {
        self.consumers.write().push(consumer);
        self
    }

    pub fn add_consumer(&self, consumer: Arc<dyn NotificationConsumer>) {
        self.consumers.write().push(consumer);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.tx.subscribe()
    }

    pub fn calculator(&self) -> &NotificationCalculator {
        &self.calculator
    }

    pub async fn on_after_save(&self, entity: &Entity) -> Result<Option<Notification>> {
        self.run(LifecycleEvent::Saved, entity).await
    }

    pub async fn on_before_destroy(&self, entity: &Entity) -> Result<Option<Notification>> {
        self.run(LifecycleEvent::Destroyed, entity).await
    }

    async fn run(&self, event: LifecycleEvent, entity: &Entity) -> Result<Option<Notification>> {
        if !self.enabled {
            debug!(source = %entity.key(), %event, "propagation disabled");
            return Ok(None);
        }
        if !self.calculator.needs_to_notify(entity)? {
            return Ok(None);
        }

        let targets = self.calculator.propagate(entity).await?;
        if targets.is_empty() {
            return Ok(None);
        }

        let notification = Notification {
            event,
            source: entity.key(),
            targets,
        };
        info!(
            source = %notification.source,
            %event,
            targets = notification.targets.len(),
            "dispatching notification"
        );

        let consumers = self.consumers.read().clone();
        for consumer in &consumers {
            consumer.notify(&notification);
        }
        // no receivers is fine
        let _ = self.tx.send(notification.clone());

        Ok(Some(notification))
    }
}

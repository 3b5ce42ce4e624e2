//! Subscription manager (C5): wraps each handler with the ack/failure
//! policy, dispatches sync vs async handlers by their tagged variant,
//! supports a debug-mode consumer-group reset, and owns its own topic
//! registry distinct from the general-purpose [`crate::registry::HandlerRegistry`]
//! (C6) that service authors populate.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::json;
use tokio::sync::Mutex as AsyncMutex;

use crate::bus::{EventBus, SubscribeOptions};
use crate::envelope::Envelope;
use crate::error::Result;
use crate::handler::Handler;
use crate::logging::Logger;

/// Manages the set of active topic subscriptions for one service instance.
pub struct SubscriptionManager {
    bus: Arc<dyn EventBus>,
    consumer_group: String,
    consumer_name: String,
    debug_mode: bool,
    logger: Logger,
    topics: HashMap<String, Handler>,
    sync_ack_lock: Arc<AsyncMutex<()>>,
    async_ack_lock: Arc<AsyncMutex<()>>,
}

impl SubscriptionManager {
    pub fn new(
        bus: Arc<dyn EventBus>,
        consumer_group: impl Into<String>,
        consumer_name: impl Into<String>,
        debug_mode: bool,
        logger: Logger,
    ) -> Self {
        Self {
            bus,
            consumer_group: consumer_group.into(),
            consumer_name: consumer_name.into(),
            debug_mode,
            logger,
            topics: HashMap::new(),
            sync_ack_lock: Arc::new(AsyncMutex::new(())),
            async_ack_lock: Arc::new(AsyncMutex::new(())),
        }
    }

    pub fn register_handler(&mut self, topic: impl Into<String>, handler: Handler) {
        self.topics.insert(topic.into(), handler);
    }

    pub fn register_handlers(&mut self, handlers: impl IntoIterator<Item = (String, Handler)>) {
        for (topic, handler) in handlers {
            self.topics.insert(topic, handler);
        }
    }

    pub fn unregister_handler(&mut self, topic: &str) {
        self.topics.remove(topic);
    }

    pub fn clear_handlers(&mut self) {
        self.topics.clear();
    }

    pub fn registered_topics(&self) -> Vec<String> {
        self.topics.keys().cloned().collect()
    }

    /// Destroy this service's consumer group on every registered topic,
    /// then subscribe to each. Debug reset only ever touches the group
    /// name this manager owns, leaving other groups on the same stream
    /// alone.
    pub async fn setup_subscriptions(&self) -> Result<()> {
        if self.debug_mode {
            for topic in self.topics.keys() {
                self.bus.destroy_group(topic, &self.consumer_group).await?;
                self.logger.info(
                    "debug reset: consumer group destroyed",
                    json!({"topic": topic, "group": self.consumer_group}),
                );
            }
        }

        for (topic, handler) in &self.topics {
            let wrapped = self.wrap(topic.clone(), handler.clone());
            let consumer_name = format!("{}-{}", self.consumer_name, topic);
            let opts = SubscribeOptions::new(self.consumer_group.clone(), consumer_name);
            self.bus.subscribe(topic, wrapped, opts).await?;
        }

        Ok(())
    }

    /// Wrap a registered handler in the ack/failure policy. The resulting
    /// handler is always registered with the bus as the async variant
    /// (the ack call is itself async). A sync handler still runs inline
    /// on the worker task, blocking it for the duration of the call, the
    /// same as if it were invoked directly. An async handler is instead
    /// spawned onto the task runtime and the wrapper returns immediately,
    /// so the worker goes straight back to reading the stream rather than
    /// waiting on the handler (and its ack) to finish; the ack lock is
    /// still acquired inside the spawned task, so concurrently-completing
    /// async handlers still serialize their acks against one another.
    fn wrap(&self, topic: String, handler: Handler) -> Handler {
        let bus = self.bus.clone();
        let group = self.consumer_group.clone();
        let logger = self.logger.clone();
        let sync_ack_lock = self.sync_ack_lock.clone();
        let async_ack_lock = self.async_ack_lock.clone();
        let is_async_handler = matches!(handler, Handler::Async(_));

        Handler::r#async(move |message_id: String, envelope: Envelope, payload: serde_json::Value| {
            let bus = bus.clone();
            let topic = topic.clone();
            let group = group.clone();
            let logger = logger.clone();
            let ack_lock = if is_async_handler {
                async_ack_lock.clone()
            } else {
                sync_ack_lock.clone()
            };
            let handler = handler.clone();

            async move {
                if is_async_handler {
                    tokio::spawn(run_and_ack(
                        handler, message_id, envelope, payload, bus, topic, group, logger, ack_lock,
                    ));
                    true
                } else {
                    run_and_ack(
                        handler, message_id, envelope, payload, bus, topic, group, logger, ack_lock,
                    )
                    .await
                }
            }
        })
    }
}

/// Invoke `handler`, then ack the message if it reported success, under
/// the ack lock matching its dispatch kind. Shared by both the inline
/// (sync-handler) and spawned (async-handler) dispatch paths in [`SubscriptionManager::wrap`].
#[allow(clippy::too_many_arguments)]
async fn run_and_ack(
    handler: Handler,
    message_id: String,
    envelope: Envelope,
    payload: serde_json::Value,
    bus: Arc<dyn EventBus>,
    topic: String,
    group: String,
    logger: Logger,
    ack_lock: Arc<AsyncMutex<()>>,
) -> bool {
    let success = handler.invoke(&message_id, &envelope, &payload).await;

    if !success {
        logger.error(
            "handler reported failure, not acknowledging",
            json!({"topic": topic, "message_id": message_id}),
        );
        return false;
    }

    let _guard = ack_lock.lock().await;

    match bus
        .acknowledge(&topic, &group, std::slice::from_ref(&message_id))
        .await
    {
        Ok(_) => {
            logger.debug(
                "message acknowledged",
                json!({"topic": topic, "message_id": message_id}),
            );
            true
        }
        Err(e) => {
            logger.error(
                "acknowledge failed",
                json!({"topic": topic, "message_id": message_id, "error": e.to_string()}),
            );
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::PublishOptions;
    use async_trait::async_trait;
    use serde_json::Value;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct RecordingBus {
        acked: StdMutex<Vec<(String, String, Vec<String>)>>,
        destroyed_groups: StdMutex<Vec<(String, String)>>,
        subscribed: AtomicUsize,
    }

    #[async_trait]
    impl EventBus for RecordingBus {
        async fn publish(
            &self,
            _topic: &str,
            _payload: Value,
            _opts: PublishOptions,
        ) -> Result<String> {
            Ok("1-0".to_string())
        }

        async fn subscribe(
            &self,
            _topic: &str,
            handler: Handler,
            _opts: SubscribeOptions,
        ) -> Result<()> {
            self.subscribed.fetch_add(1, Ordering::SeqCst);
            let env = Envelope::build(json!({"k": 1}), "src", None, None, None);
            handler.invoke("1-0", &env, &json!({"k": 1})).await;
            Ok(())
        }

        async fn acknowledge(
            &self,
            topic: &str,
            group_name: &str,
            message_ids: &[String],
        ) -> Result<i64> {
            self.acked
                .lock()
                .unwrap()
                .push((topic.to_string(), group_name.to_string(), message_ids.to_vec()));
            Ok(message_ids.len() as i64)
        }

        async fn destroy_group(&self, topic: &str, group_name: &str) -> Result<()> {
            self.destroyed_groups
                .lock()
                .unwrap()
                .push((topic.to_string(), group_name.to_string()));
            Ok(())
        }

        async fn stop(&self) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn successful_handler_triggers_exactly_one_ack() {
        let bus = Arc::new(RecordingBus::default());
        let mut manager = SubscriptionManager::new(
            bus.clone(),
            "g",
            "c",
            false,
            Logger::new(),
        );
        manager.register_handler("t1", Handler::sync(|_, _, _| true));
        manager.setup_subscriptions().await.unwrap();

        let acked = bus.acked.lock().unwrap();
        assert_eq!(acked.len(), 1);
        assert_eq!(acked[0].2, vec!["1-0".to_string()]);
    }

    #[tokio::test]
    async fn failing_handler_never_acks() {
        let bus = Arc::new(RecordingBus::default());
        let mut manager = SubscriptionManager::new(bus.clone(), "g", "c", false, Logger::new());
        manager.register_handler("t1", Handler::sync(|_, _, _| false));
        manager.setup_subscriptions().await.unwrap();

        assert!(bus.acked.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn debug_mode_destroys_only_registered_topics() {
        let bus = Arc::new(RecordingBus::default());
        let mut manager = SubscriptionManager::new(bus.clone(), "g", "c", true, Logger::new());
        manager.register_handler("t1", Handler::sync(|_, _, _| true));
        manager.register_handler("t2", Handler::sync(|_, _, _| true));
        manager.setup_subscriptions().await.unwrap();

        let mut destroyed = bus.destroyed_groups.lock().unwrap().clone();
        destroyed.sort();
        assert_eq!(
            destroyed,
            vec![
                ("t1".to_string(), "g".to_string()),
                ("t2".to_string(), "g".to_string())
            ]
        );
    }

    #[tokio::test]
    async fn async_handler_acks_are_spawned_not_awaited_inline() {
        let bus = Arc::new(RecordingBus::default());
        let mut manager = SubscriptionManager::new(bus.clone(), "g", "c", false, Logger::new());
        let (tx, rx) = tokio::sync::oneshot::channel();
        let tx = Arc::new(StdMutex::new(Some(tx)));
        manager.register_handler(
            "t1",
            Handler::r#async(move |_id, _env, _payload| {
                let tx = tx.clone();
                async move {
                    if let Some(tx) = tx.lock().unwrap().take() {
                        let _ = tx.send(());
                    }
                    true
                }
            }),
        );

        manager.setup_subscriptions().await.unwrap();
        rx.await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        let acked = bus.acked.lock().unwrap();
        assert_eq!(acked.len(), 1);
    }

    #[tokio::test]
    async fn register_unregister_clear_update_the_topic_set() {
        let bus = Arc::new(RecordingBus::default());
        let mut manager = SubscriptionManager::new(bus, "g", "c", false, Logger::new());
        manager.register_handler("t1", Handler::sync(|_, _, _| true));
        manager.register_handler("t2", Handler::sync(|_, _, _| true));
        assert_eq!(manager.registered_topics().len(), 2);

        manager.unregister_handler("t1");
        assert_eq!(manager.registered_topics(), vec!["t2".to_string()]);

        manager.clear_handlers();
        assert!(manager.registered_topics().is_empty());
    }
}

//! Service-manager base (C8): the template-method skeleton every service
//! in the system builds on. A service author implements [`ServiceManager`]'s
//! three hooks; [`ServiceRuntime`] wires config, the bus, and the
//! subscription manager together the same way on every service.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use crate::bus::EventBus;
use crate::config::Config;
use crate::error::Result;
use crate::factory::BusFactoryRegistry;
use crate::logging::Logger;
use crate::registry::HandlerRegistry;
use crate::subscription::SubscriptionManager;

/// The three hooks a concrete service fills in. Everything else —
/// loading config, building the bus, wiring subscriptions — is handled
/// by [`ServiceRuntime`].
#[async_trait]
pub trait ServiceManager: Send + Sync {
    /// The name this service is addressed by in config and in the
    /// consumer group/consumer name it defaults to.
    fn service_name(&self) -> &str;

    /// One-time setup for whatever business logic the service owns
    /// (clients, caches, model handles, a republish handle onto `bus`).
    /// Runs after both config and the bus are ready, before subscriptions
    /// are wired. Default is a no-op.
    async fn initialize_business_components(
        &mut self,
        _config: &Config,
        _bus: Arc<dyn EventBus>,
    ) -> Result<()> {
        Ok(())
    }

    /// The topic → handler bindings this service wants active. Called
    /// after `initialize_business_components`, so handlers may close
    /// over state it set up.
    fn message_handlers(&self) -> HandlerRegistry;
}

/// Drives one [`ServiceManager`] through its startup and shutdown
/// sequence.
pub struct ServiceRuntime<S: ServiceManager> {
    manager: S,
    config: Config,
    logger: Logger,
    bus: Option<Arc<dyn EventBus>>,
    running: bool,
}

impl<S: ServiceManager> ServiceRuntime<S> {
    pub fn new(manager: S, config: Config, logger: Logger) -> Self {
        Self {
            manager,
            config,
            logger,
            bus: None,
            running: false,
        }
    }

    pub fn manager(&self) -> &S {
        &self.manager
    }

    pub fn manager_mut(&mut self) -> &mut S {
        &mut self.manager
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Resolve this service's config section, initialize its business
    /// components, build its bus from config, register its handlers
    /// against the topics it declares under `topics.subscribe`, and
    /// start every subscription.
    pub async fn start(&mut self) -> Result<()> {
        let service_name = self.manager.service_name().to_string();
        let service_config = self.config.get_service_config(&service_name);

        let bus_registry = BusFactoryRegistry::with_defaults();
        let bus = bus_registry
            .create_event_bus(&service_config, &service_name, self.logger.clone())
            .await?;

        self.manager
            .initialize_business_components(&service_config, bus.clone())
            .await?;

        let debug_mode = service_config.get_bool_coerced("debug_mode");
        let consumer_group = service_config.get_str_or("consumer_group", &service_name);
        let consumer_name = service_config.get_str_or("consumer_name", &service_name);

        let mut subscription_manager = SubscriptionManager::new(
            bus.clone(),
            consumer_group,
            consumer_name,
            debug_mode,
            self.logger.clone(),
        );

        let handlers = self.manager.message_handlers();
        let (subscribe_topics, _publish_topics) = service_config.get_topics_for_service();

        for topic in &subscribe_topics {
            let handler = handlers.get(topic)?;
            subscription_manager.register_handler(topic.clone(), handler);
        }

        // Handlers bound to topics the config didn't list are still
        // honored: the registry is the source of truth for what a
        // handler does, `topics.subscribe` only orders the startup log.
        for (topic, handler) in handlers.all() {
            if !subscribe_topics.contains(topic) {
                subscription_manager.register_handler(topic.clone(), handler.clone());
            }
        }

        subscription_manager.setup_subscriptions().await?;

        self.bus = Some(bus);
        self.running = true;

        self.logger.info(
            "service started",
            json!({"service": service_name, "topics": subscription_manager.registered_topics()}),
        );

        Ok(())
    }

    /// Stop every subscription and release the bus. Idempotent.
    pub async fn stop(&mut self) -> Result<()> {
        self.running = false;
        if let Some(bus) = self.bus.take() {
            bus.stop().await?;
        }
        self.logger.info(
            "service stopped",
            json!({"service": self.manager.service_name()}),
        );
        Ok(())
    }
}

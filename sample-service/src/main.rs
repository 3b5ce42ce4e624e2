//! Sample worker service - minimal entry point demonstrating the
//! event-bus core's `ServiceManager` skeleton end to end.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use reqre_bus_core::{
    init_logging, Config, Envelope, EventBus, Handler, HandlerRegistry, Logger, PublishOptions,
    ServiceManager, ServiceRuntime,
};
use serde_json::{json, Value};

/// Transforms every `text` field it receives on its input topic to
/// upper case and republishes it on its output topic.
struct UppercaseService {
    bus: Option<Arc<dyn EventBus>>,
    output_topic: String,
}

impl UppercaseService {
    fn new() -> Self {
        Self {
            bus: None,
            output_topic: "uppercased_text".to_string(),
        }
    }
}

#[async_trait]
impl ServiceManager for UppercaseService {
    fn service_name(&self) -> &str {
        "sample-service"
    }

    async fn initialize_business_components(
        &mut self,
        config: &Config,
        bus: Arc<dyn EventBus>,
    ) -> reqre_bus_core::Result<()> {
        let (_subscribe, publish) = config.get_topics_for_service();
        if let Some(topic) = publish.into_iter().next() {
            self.output_topic = topic;
        }
        self.bus = Some(bus);
        Ok(())
    }

    fn message_handlers(&self) -> HandlerRegistry {
        let bus = self
            .bus
            .clone()
            .expect("initialize_business_components runs before message_handlers");
        let output_topic = self.output_topic.clone();

        let mut registry = HandlerRegistry::new();
        registry.register(
            "raw_text",
            Handler::r#async(move |message_id: String, envelope: Envelope, payload: Value| {
                let bus = bus.clone();
                let output_topic = output_topic.clone();
                async move {
                    let Some(text) = payload.get("text").and_then(Value::as_str) else {
                        tracing::warn!(%message_id, "raw_text event missing a text field");
                        return false;
                    };

                    let result = bus
                        .publish(
                            &output_topic,
                            json!({"text": text.to_uppercase()}),
                            PublishOptions {
                                event_type: Some("TextUppercased".to_string()),
                                trace_id: envelope.trace_id.clone(),
                                dialogue_session_id: envelope.dialogue_session_id.clone(),
                            },
                        )
                        .await;

                    result.is_ok()
                }
            }),
        );
        registry
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load(None)?;
    let service_config = config.get_service_config("sample-service");
    let logging_config = service_config.get_section("logging");

    init_logging(
        &logging_config.get_str_or("level", "info"),
        &logging_config.get_str_or("format", "pretty"),
    );

    tracing::info!("sample-service v{}", env!("CARGO_PKG_VERSION"));

    let mut runtime = ServiceRuntime::new(UppercaseService::new(), config, Logger::new());
    runtime.start().await?;

    tokio::signal::ctrl_c().await?;
    runtime.stop().await?;

    Ok(())
}

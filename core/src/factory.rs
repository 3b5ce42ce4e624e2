//! Bus factory (C7): builds a concrete [`EventBus`] from config, so
//! service code never names `RedisStreamBus` directly. A thin registry
//! lets additional transports be added without touching call sites.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::bus::EventBus;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::logging::Logger;
use crate::redis_stream::{RedisStreamBus, RedisStreamBusConfig};

const DEFAULT_STREAM_PREFIX: &str = "events";
const DEFAULT_REDIS_HOST: &str = "localhost";
const DEFAULT_REDIS_PORT: i64 = 6379;
const DEFAULT_REDIS_DB: i64 = 0;

/// Builds an [`EventBus`] of one specific kind from a config section.
#[async_trait]
pub trait BusFactory: Send + Sync {
    async fn create(&self, config: &Config, service_name: &str, logger: Logger) -> Result<Arc<dyn EventBus>>;
}

/// Builds a [`RedisStreamBus`] from an `event_bus.redis` config section,
/// or directly from `event_bus.connection_url` when present.
///
/// Expected shape:
/// ```yaml
/// event_bus:
///   stream_prefix: ai-re
///   redis:
///     host: localhost
///     port: 6379
///     db: 0
///     password: ${REDIS_PASSWORD}
/// ```
pub struct RedisBusFactory;

#[async_trait]
impl BusFactory for RedisBusFactory {
    async fn create(&self, config: &Config, service_name: &str, logger: Logger) -> Result<Arc<dyn EventBus>> {
        let bus_config = config.get_section("event_bus");
        let stream_prefix = bus_config.get_str_or("stream_prefix", DEFAULT_STREAM_PREFIX);

        let url = match bus_config.get_str("connection_url") {
            Some(url) if !url.is_empty() => url,
            _ => {
                let redis_config = bus_config.get_section("redis");
                let host = redis_config.get_str_or("host", DEFAULT_REDIS_HOST);
                let port = redis_config.get_i64("port").unwrap_or(DEFAULT_REDIS_PORT);
                let db = redis_config.get_i64("db").unwrap_or(DEFAULT_REDIS_DB);
                let password = redis_config.get_str("password");

                match password {
                    Some(password) if !password.is_empty() => {
                        format!("redis://:{password}@{host}:{port}/{db}")
                    }
                    _ => format!("redis://{host}:{port}/{db}"),
                }
            }
        };

        let bus = RedisStreamBus::new(
            RedisStreamBusConfig {
                url,
                stream_prefix,
                source_service: service_name.to_string(),
            },
            logger,
        )
        .await?;

        Ok(Arc::new(bus))
    }
}

/// Dispatches to a named [`BusFactory`] by kind, auto-detecting the kind
/// from config when the caller doesn't pin one down.
pub struct BusFactoryRegistry {
    factories: HashMap<String, Arc<dyn BusFactory>>,
}

impl BusFactoryRegistry {
    /// A registry pre-populated with the built-in Redis factory under
    /// the `"redis"` key.
    pub fn with_defaults() -> Self {
        let mut registry = Self {
            factories: HashMap::new(),
        };
        registry.register("redis", Arc::new(RedisBusFactory));
        registry
    }

    pub fn register(&mut self, kind: impl Into<String>, factory: Arc<dyn BusFactory>) {
        self.factories.insert(kind.into(), factory);
    }

    /// Build a bus for `service_name` from `config`, auto-detecting the
    /// transport kind: an explicit `event_bus.kind` wins; otherwise the
    /// presence of an `event_bus.redis` section selects `"redis"`;
    /// otherwise an `event_bus.connection_url` whose scheme is `redis`
    /// or `rediss` also selects `"redis"`; otherwise `"redis"` is
    /// assumed and a warning is logged. The resolved kind is then looked
    /// up in the registry, and an unregistered kind is a config error.
    pub async fn create_event_bus(
        &self,
        config: &Config,
        service_name: &str,
        logger: Logger,
    ) -> Result<Arc<dyn EventBus>> {
        let kind = self.detect_kind(config);
        let factory = self.factories.get(&kind).ok_or_else(|| {
            Error::config(format!("no bus factory registered for kind '{kind}'"))
        })?;
        factory.create(config, service_name, logger).await
    }

    fn detect_kind(&self, config: &Config) -> String {
        let bus_config = config.get_section("event_bus");
        if let Some(kind) = bus_config.get_str("kind") {
            return kind;
        }
        if !bus_config.get_section("redis").is_empty() {
            return "redis".to_string();
        }
        if let Some(scheme) = bus_config.get_str("connection_url").as_deref().and_then(url_scheme) {
            if scheme == "redis" || scheme == "rediss" {
                return "redis".to_string();
            }
        }
        tracing::warn!("event_bus.kind not set and no known transport section found, defaulting to redis");
        "redis".to_string()
    }
}

/// The scheme prefix of a URL, e.g. `"redis"` from `"redis://host:port/0"`.
/// Only the prefix is needed for transport detection, so this stops short
/// of full URL parsing.
fn url_scheme(url: &str) -> Option<&str> {
    url.split_once("://").map(|(scheme, _)| scheme)
}

impl Default for BusFactoryRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

//! Event-bus core: Redis-Streams transport, envelope/topic conventions,
//! the subscription and handler-dispatch model, and the service-manager
//! skeleton every service in the system builds on.

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod bus;
pub mod config;
pub mod envelope;
pub mod error;
pub mod factory;
pub mod handler;
pub mod logging;
pub mod redis_stream;
pub mod registry;
pub mod service;
pub mod subscription;
pub mod topic;

pub use bus::{EventBus, PublishOptions, StartFrom, SubscribeOptions};
pub use config::Config;
pub use envelope::Envelope;
pub use error::{Error, Result};
pub use factory::{BusFactory, BusFactoryRegistry, RedisBusFactory};
pub use handler::Handler;
pub use logging::{init_logging, CaptureSink, Level, LogSink, Logger, Record};
pub use redis_stream::{RedisStreamBus, RedisStreamBusConfig};
pub use registry::HandlerRegistry;
pub use service::{ServiceManager, ServiceRuntime};
pub use subscription::SubscriptionManager;
pub use topic::build_topic_key;

/// Re-export of the types a service implementation typically needs.
pub mod prelude {
    pub use crate::bus::{EventBus, PublishOptions, StartFrom, SubscribeOptions};
    pub use crate::config::Config;
    pub use crate::envelope::Envelope;
    pub use crate::error::{Error, Result};
    pub use crate::factory::BusFactoryRegistry;
    pub use crate::handler::Handler;
    pub use crate::logging::{init_logging, Logger};
    pub use crate::registry::HandlerRegistry;
    pub use crate::service::{ServiceManager, ServiceRuntime};
}

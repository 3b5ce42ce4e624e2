//! Bus interface (C3): the abstract `publish / subscribe / acknowledge /
//! stop` contract every adapter implements.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;
use crate::handler::Handler;

/// Where a newly-created consumer group should start reading from. Only
/// consulted when the group does not already exist; an existing group
/// keeps its own cursor regardless of this value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartFrom {
    /// Only messages published after the group is created (`$`).
    Latest,
    /// Every message currently on the stream (`0`).
    Beginning,
    /// An explicit broker id.
    Id(String),
}

impl Default for StartFrom {
    fn default() -> Self {
        Self::Latest
    }
}

impl StartFrom {
    /// The literal id token `XGROUP CREATE` expects.
    pub fn as_group_create_id(&self) -> String {
        match self {
            StartFrom::Latest => "$".to_string(),
            StartFrom::Beginning => "0".to_string(),
            StartFrom::Id(id) => id.clone(),
        }
    }
}

/// Options accepted by [`EventBus::publish`].
#[derive(Debug, Clone, Default)]
pub struct PublishOptions {
    pub event_type: Option<String>,
    pub trace_id: Option<String>,
    pub dialogue_session_id: Option<String>,
}

/// Options accepted by [`EventBus::subscribe`].
#[derive(Debug, Clone)]
pub struct SubscribeOptions {
    pub group_name: String,
    pub consumer_name: String,
    pub start_from: StartFrom,
    /// When `true`, the adapter acks every successfully-delivered message
    /// after the handler returns, regardless of its result. When `false`
    /// (the only mode the service skeleton ever wires), the caller — the
    /// subscription manager — is solely responsible for acking.
    pub auto_ack: bool,
}

impl SubscribeOptions {
    pub fn new(group_name: impl Into<String>, consumer_name: impl Into<String>) -> Self {
        Self {
            group_name: group_name.into(),
            consumer_name: consumer_name.into(),
            start_from: StartFrom::default(),
            auto_ack: false,
        }
    }
}

/// The abstract event-bus contract. The only component that talks to the
/// broker is whatever implements this trait (see `redis_stream.rs` for the
/// Redis Streams adapter, C4).
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Build an envelope, serialize it, and append it to the stream for
    /// `topic`. Returns the broker-assigned entry id as a string.
    async fn publish(&self, topic: &str, payload: Value, opts: PublishOptions) -> Result<String>;

    /// Ensure the consumer group exists and start exactly one worker for
    /// the `(topic, group, consumer)` triple, invoking `handler` for each
    /// delivered message. If a worker for the same triple already exists,
    /// it is stopped and awaited before the replacement starts.
    async fn subscribe(&self, topic: &str, handler: Handler, opts: SubscribeOptions) -> Result<()>;

    /// Ack zero or more message ids for `(topic, group_name)` in one call.
    /// Returns the count the broker confirms.
    async fn acknowledge(
        &self,
        topic: &str,
        group_name: &str,
        message_ids: &[String],
    ) -> Result<i64>;

    /// Destroy the named consumer group on `topic`. "Group does not exist"
    /// is not an error.
    async fn destroy_group(&self, topic: &str, group_name: &str) -> Result<()>;

    /// Signal every worker to stop, await their termination, and release
    /// the transport.
    async fn stop(&self) -> Result<()>;
}

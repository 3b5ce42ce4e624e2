//! Error taxonomy for the event-bus runtime.

use thiserror::Error;

/// Result type alias used across the event-bus core.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type spanning envelope handling, the bus, subscriptions,
/// and configuration.
#[derive(Error, Debug)]
pub enum Error {
    /// Cannot reach the broker at startup or for a specific operation.
    #[error("connection error: {0}")]
    Connection(String),

    /// Transport failure during publish.
    #[error("publish error: {0}")]
    Publish(String),

    /// Failure during subscribe setup, other than group-already-exists.
    #[error("subscribe error: {0}")]
    Subscribe(String),

    /// `XGROUP CREATE` failed with something other than BUSYGROUP.
    #[error("consumer group error: {0}")]
    ConsumerGroup(String),

    /// `XACK` failed.
    #[error("acknowledge error: {0}")]
    Acknowledge(String),

    /// Envelope could not be encoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Envelope could not be decoded.
    #[error("deserialization error: {0}")]
    Deserialization(String),

    /// A subscribed topic has neither a specific nor a default handler.
    #[error("no handler registered for topic: {0}")]
    NoHandler(String),

    /// Malformed or unreadable configuration.
    #[error("config error: {0}")]
    Config(String),
}

impl Error {
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    pub fn publish(msg: impl Into<String>) -> Self {
        Self::Publish(msg.into())
    }

    pub fn subscribe(msg: impl Into<String>) -> Self {
        Self::Subscribe(msg.into())
    }

    pub fn consumer_group(msg: impl Into<String>) -> Self {
        Self::ConsumerGroup(msg.into())
    }

    pub fn acknowledge(msg: impl Into<String>) -> Self {
        Self::Acknowledge(msg.into())
    }

    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }

    pub fn deserialization(msg: impl Into<String>) -> Self {
        Self::Deserialization(msg.into())
    }

    pub fn no_handler(topic: impl Into<String>) -> Self {
        Self::NoHandler(topic.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn displays_topic_in_no_handler() {
        let err = Error::no_handler("user_message_raw");
        assert_eq!(
            err.to_string(),
            "no handler registered for topic: user_message_raw"
        );
    }

    #[test]
    fn variants_carry_their_message() {
        assert_eq!(
            Error::publish("timeout").to_string(),
            "publish error: timeout"
        );
        assert_eq!(
            Error::consumer_group("WRONGTYPE").to_string(),
            "consumer group error: WRONGTYPE"
        );
    }
}

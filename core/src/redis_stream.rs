//! Redis-Streams adapter (C4): the only component that talks to the
//! broker. Implements [`EventBus`] over `XADD` / `XREADGROUP` / `XACK` /
//! `XGROUP CREATE` / `XGROUP DESTROY`, one cooperative task per
//! subscription.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::streams::{StreamReadOptions, StreamReadReply};
use redis::AsyncCommands;
use serde_json::Value;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

use crate::bus::{EventBus, PublishOptions, StartFrom, SubscribeOptions};
use crate::envelope::Envelope;
use crate::error::{Error, Result};
use crate::handler::Handler;
use crate::logging::Logger;
use crate::topic::build_topic_key;

/// The one field name every stream entry's payload is stored under.
pub const PAYLOAD_FIELD: &str = "payload";

/// Default `COUNT` for `XREADGROUP`.
pub const DEFAULT_COUNT: usize = 10;

/// Default `BLOCK` milliseconds for `XREADGROUP`.
pub const DEFAULT_BLOCK_TIME_MS: usize = 2000;

/// Fixed backoff after a transient transport error in the worker loop.
const TRANSIENT_BACKOFF: Duration = Duration::from_secs(1);

/// Connection parameters for the Redis Streams adapter.
#[derive(Debug, Clone)]
pub struct RedisStreamBusConfig {
    pub url: String,
    /// Prefix joined with every topic via [`build_topic_key`]. May embed a
    /// session timestamp (e.g. `ai-re:20250605143022`).
    pub stream_prefix: String,
    /// Name recorded as `source_service` on every published envelope.
    pub source_service: String,
}

struct Worker {
    stop_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Redis Streams event-bus adapter.
pub struct RedisStreamBus {
    config: RedisStreamBusConfig,
    conn_manager: ConnectionManager,
    logger: Logger,
    workers: Mutex<HashMap<String, Worker>>,
}

impl RedisStreamBus {
    /// Connect to Redis and build the adapter.
    pub async fn new(config: RedisStreamBusConfig, logger: Logger) -> Result<Self> {
        let client = redis::Client::open(config.url.as_str())
            .map_err(|e| Error::connection(e.to_string()))?;
        let conn_manager = client
            .get_connection_manager()
            .await
            .map_err(|e| Error::connection(e.to_string()))?;

        Ok(Self {
            config,
            conn_manager,
            logger,
            workers: Mutex::new(HashMap::new()),
        })
    }

    fn full_key(&self, topic: &str) -> String {
        build_topic_key(&self.config.stream_prefix, topic)
    }

    fn worker_key(full_key: &str, group: &str, consumer: &str) -> String {
        format!("{full_key}:{group}:{consumer}")
    }

    async fn ensure_group(&self, full_key: &str, group: &str, start_from: &StartFrom) -> Result<()> {
        let mut conn = self.conn_manager.clone();
        let id = start_from.as_group_create_id();
        let result: redis::RedisResult<()> =
            conn.xgroup_create_mkstream(full_key, group, &id).await;

        match result {
            Ok(()) => Ok(()),
            Err(e) if e.code() == Some("BUSYGROUP") => Ok(()),
            Err(e) => Err(Error::consumer_group(e.to_string())),
        }
    }
}

#[async_trait]
impl EventBus for RedisStreamBus {
    async fn publish(&self, topic: &str, payload: Value, opts: PublishOptions) -> Result<String> {
        let envelope = Envelope::build(
            payload,
            self.config.source_service.clone(),
            opts.event_type,
            opts.trace_id,
            opts.dialogue_session_id,
        );
        let json = envelope.serialize()?;
        let full_key = self.full_key(topic);

        let mut conn = self.conn_manager.clone();
        let id: String = conn
            .xadd(&full_key, "*", &[(PAYLOAD_FIELD, json.as_str())])
            .await
            .map_err(|e| Error::publish(e.to_string()))?;

        self.logger.debug(
            "event published",
            serde_json::json!({
                "topic": topic,
                "key": full_key,
                "event_type": envelope.event_type,
                "message_id": id,
            }),
        );

        Ok(id)
    }

    async fn subscribe(&self, topic: &str, handler: Handler, opts: SubscribeOptions) -> Result<()> {
        let full_key = self.full_key(topic);
        self.ensure_group(&full_key, &opts.group_name, &opts.start_from)
            .await?;

        let key = Self::worker_key(&full_key, &opts.group_name, &opts.consumer_name);

        let previous = {
            let mut workers = self.workers.lock().await;
            workers.remove(&key)
        };
        if let Some(previous) = previous {
            let _ = previous.stop_tx.send(true);
            let _ = previous.handle.await;
        }

        let (stop_tx, mut stop_rx) = watch::channel(false);
        let conn = self.conn_manager.clone();
        let group = opts.group_name.clone();
        let consumer = opts.consumer_name.clone();
        let auto_ack = opts.auto_ack;
        let logger = self.logger.clone();
        let worker_full_key = full_key.clone();

        let join_handle = tokio::spawn(async move {
            run_worker(
                conn,
                worker_full_key,
                group,
                consumer,
                handler,
                auto_ack,
                logger,
                &mut stop_rx,
            )
            .await;
        });

        self.workers.lock().await.insert(
            key,
            Worker {
                stop_tx,
                handle: join_handle,
            },
        );

        self.logger.debug(
            "subscription started",
            serde_json::json!({
                "topic": topic,
                "key": full_key,
                "group": opts.group_name,
                "consumer": opts.consumer_name,
            }),
        );

        Ok(())
    }

    async fn acknowledge(
        &self,
        topic: &str,
        group_name: &str,
        message_ids: &[String],
    ) -> Result<i64> {
        if message_ids.is_empty() {
            return Ok(0);
        }
        let full_key = self.full_key(topic);
        let mut conn = self.conn_manager.clone();
        conn.xack(&full_key, group_name, message_ids)
            .await
            .map_err(|e| Error::acknowledge(e.to_string()))
    }

    async fn destroy_group(&self, topic: &str, group_name: &str) -> Result<()> {
        let full_key = self.full_key(topic);
        let mut conn = self.conn_manager.clone();
        let result: redis::RedisResult<i64> = conn.xgroup_destroy(&full_key, group_name).await;
        if let Err(e) = result {
            self.logger.debug(
                "group destroy ignored (group or stream absent)",
                serde_json::json!({"key": full_key, "group": group_name, "error": e.to_string()}),
            );
        }
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        let workers = {
            let mut workers = self.workers.lock().await;
            std::mem::take(&mut *workers)
        };
        for (_, worker) in workers {
            let _ = worker.stop_tx.send(true);
            let _ = worker.handle.await;
        }
        Ok(())
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_worker(
    mut conn: ConnectionManager,
    full_key: String,
    group: String,
    consumer: String,
    handler: Handler,
    auto_ack: bool,
    logger: Logger,
    stop_rx: &mut watch::Receiver<bool>,
) {
    let read_opts = StreamReadOptions::default()
        .group(&group, &consumer)
        .count(DEFAULT_COUNT)
        .block(DEFAULT_BLOCK_TIME_MS);

    loop {
        if *stop_rx.borrow() {
            break;
        }

        let read_fut = conn.xread_options(&[full_key.as_str()], &[">"], &read_opts);

        tokio::select! {
            changed = stop_rx.changed() => {
                if changed.is_err() || *stop_rx.borrow() {
                    break;
                }
            }
            result = read_fut => {
                match result {
                    Ok(reply) => handle_reply(&mut conn, &full_key, &group, &handler, auto_ack, &logger, reply).await,
                    Err(e) => {
                        logger.error(
                            "transport error in worker loop",
                            serde_json::json!({"key": full_key, "group": group, "error": e.to_string()}),
                        );
                        tokio::time::sleep(TRANSIENT_BACKOFF).await;
                    }
                }
            }
        }
    }
}

async fn handle_reply(
    conn: &mut ConnectionManager,
    full_key: &str,
    group: &str,
    handler: &Handler,
    auto_ack: bool,
    logger: &Logger,
    reply: StreamReadReply,
) {
    for stream_key in reply.keys {
        for stream_id in stream_key.ids {
            let message_id = stream_id.id.clone();
            let raw_payload: Option<String> = stream_id.get(PAYLOAD_FIELD);

            let Some(raw_payload) = raw_payload else {
                logger.error(
                    "stream entry missing payload field",
                    serde_json::json!({"key": full_key, "message_id": message_id}),
                );
                continue;
            };

            let envelope = match Envelope::parse(&raw_payload) {
                Ok(envelope) => envelope,
                Err(e) => {
                    logger.error(
                        "malformed envelope, leaving message pending",
                        serde_json::json!({"key": full_key, "message_id": message_id, "error": e.to_string()}),
                    );
                    continue;
                }
            };

            let payload = envelope.actual_payload.clone();
            let success = handler.invoke(&message_id, &envelope, &payload).await;

            if auto_ack {
                let ack_result: redis::RedisResult<i64> =
                    conn.xack(full_key, group, &[message_id.clone()]).await;
                if let Err(e) = ack_result {
                    logger.error(
                        "auto-ack failed",
                        serde_json::json!({"key": full_key, "message_id": message_id, "error": e.to_string()}),
                    );
                }
            } else if !success {
                logger.error(
                    "handler reported failure, message left pending",
                    serde_json::json!({"key": full_key, "message_id": message_id}),
                );
            }
        }
    }
}

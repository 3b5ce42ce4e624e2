//! Handler capability types used by C5/C6: a tagged variant per dispatch
//! kind, resolved at registration time rather than inspected at call time
//! (see SPEC_FULL.md Design Notes, "Dynamic dispatch").

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::envelope::Envelope;

/// A synchronous handler: runs on the subscription's worker task, blocking
/// it for the duration of the call. Returns `true` on success.
pub trait SyncHandler: Send + Sync {
    fn call(&self, message_id: &str, envelope: &Envelope, payload: &Value) -> bool;
}

/// A cooperative-async handler: scheduled on the task runtime so the
/// worker can keep reading while it runs. Returns `true` on success.
#[async_trait]
pub trait AsyncHandler: Send + Sync {
    async fn call(&self, message_id: &str, envelope: &Envelope, payload: &Value) -> bool;
}

struct FnSyncHandler<F>(F);

impl<F> SyncHandler for FnSyncHandler<F>
where
    F: Fn(&str, &Envelope, &Value) -> bool + Send + Sync,
{
    fn call(&self, message_id: &str, envelope: &Envelope, payload: &Value) -> bool {
        (self.0)(message_id, envelope, payload)
    }
}

struct FnAsyncHandler<F>(F);

#[async_trait]
impl<F, Fut> AsyncHandler for FnAsyncHandler<F>
where
    F: Fn(String, Envelope, Value) -> Fut + Send + Sync,
    Fut: Future<Output = bool> + Send + 'static,
{
    async fn call(&self, message_id: &str, envelope: &Envelope, payload: &Value) -> bool {
        (self.0)(message_id.to_string(), envelope.clone(), payload.clone()).await
    }
}

/// The two dispatch kinds a topic may be bound to.
#[derive(Clone)]
pub enum Handler {
    Sync(Arc<dyn SyncHandler>),
    Async(Arc<dyn AsyncHandler>),
}

impl Handler {
    /// Wrap a plain closure as a synchronous handler.
    pub fn sync<F>(f: F) -> Self
    where
        F: Fn(&str, &Envelope, &Value) -> bool + Send + Sync + 'static,
    {
        Handler::Sync(Arc::new(FnSyncHandler(f)))
    }

    /// Wrap a closure returning a future as a cooperative-async handler.
    pub fn r#async<F, Fut>(f: F) -> Self
    where
        F: Fn(String, Envelope, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = bool> + Send + 'static,
    {
        Handler::Async(Arc::new(FnAsyncHandler(f)))
    }

    /// Dispatch this handler, awaiting if it is the async variant.
    pub async fn invoke(&self, message_id: &str, envelope: &Envelope, payload: &Value) -> bool {
        match self {
            Handler::Sync(h) => h.call(message_id, envelope, payload),
            Handler::Async(h) => h.call(message_id, envelope, payload).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn env() -> Envelope {
        Envelope::build(json!({"k": 1}), "src", Some("E".into()), None, None)
    }

    #[tokio::test]
    async fn sync_handler_runs_inline() {
        let handler = Handler::sync(|_id, _env, payload| payload["k"] == json!(1));
        assert!(handler.invoke("1-0", &env(), &json!({"k": 1})).await);
        assert!(!handler.invoke("1-0", &env(), &json!({"k": 2})).await);
    }

    #[tokio::test]
    async fn async_handler_runs_cooperatively() {
        let handler = Handler::r#async(|_id, _env, payload| async move { payload["k"] == json!(1) });
        assert!(handler.invoke("1-0", &env(), &json!({"k": 1})).await);
    }
}

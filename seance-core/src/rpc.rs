//! Resilient invocation of the outbound procedure boundary
//!
//! [`Invoker`] drives a named backend operation with bounded retry and linear
//! per-attempt backoff. Linear rather than exponential is deliberate: the
//! caller is an interactive surface and worst-case latency must stay bounded.
//!
//! [`SessionBackend`] is the boundary itself; [`SessionClient`] layers the
//! typed operations the cache coordinator needs on top of it.

use crate::error::{Error, Result};
use crate::types::{QaPair, SessionMessage, ViewLevel};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

/// Observer invoked before each retry. Side effect only: it must not affect
/// control flow, and it is never called for the final failure.
pub type RetryObserver = Arc<dyn Fn(u32, &Error) + Send + Sync>;

/// Default retry behavior for an [`Invoker`].
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Retries after the first failed attempt (total attempts = max_retries + 1)
    pub max_retries: u32,
    /// Attempt N waits `base_delay * N` before retrying
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_millis(250),
        }
    }
}

/// Per-call overrides. Each set field fully replaces the invoker's default
/// for that field; fields are never merged or composed.
#[derive(Default, Clone)]
pub struct CallOptions {
    pub max_retries: Option<u32>,
    pub base_delay: Option<Duration>,
    pub on_retry: Option<RetryObserver>,
}

/// Executes operations against the backend with bounded retry.
///
/// Holds no shared mutable state; concurrent invocations are independent.
#[derive(Clone)]
pub struct Invoker {
    policy: RetryPolicy,
    on_retry: Option<RetryObserver>,
}

impl Invoker {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            on_retry: None,
        }
    }

    /// Attach a default retry observer, used when a call does not override it.
    pub fn with_observer(mut self, on_retry: RetryObserver) -> Self {
        self.on_retry = Some(on_retry);
        self
    }

    /// Run `f` until it succeeds or retries are exhausted.
    ///
    /// `f` is called with the attempt number (starting at 1) and must produce
    /// a fresh future per attempt. The final failure is propagated unchanged;
    /// the call resolves to exactly one success value or one error.
    pub async fn invoke<T, F, Fut>(
        &self,
        operation: &str,
        options: &CallOptions,
        mut f: F,
    ) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_retries = options.max_retries.unwrap_or(self.policy.max_retries);
        let base_delay = options.base_delay.unwrap_or(self.policy.base_delay);
        let observer = options.on_retry.as_ref().or(self.on_retry.as_ref());

        let mut attempt: u32 = 1;
        loop {
            match f(attempt).await {
                Ok(value) => return Ok(value),
                Err(error) if attempt <= max_retries => {
                    if let Some(on_retry) = observer {
                        on_retry(attempt, &error);
                    }
                    tracing::debug!(
                        operation,
                        attempt,
                        max_retries,
                        error = %error,
                        "transient failure, retrying"
                    );
                    tokio::time::sleep(base_delay * attempt).await;
                    attempt += 1;
                }
                Err(error) => return Err(error),
            }
        }
    }
}

/// Future returned by a backend call.
pub type BackendFuture<'a> = Pin<Box<dyn Future<Output = Result<serde_json::Value>> + Send + 'a>>;

/// The outbound procedure boundary.
///
/// Any failure is treated uniformly as an [`Error`] carrying a message; the
/// invoker makes no assumptions about its shape beyond that.
pub trait SessionBackend: Send + Sync {
    fn call<'a>(&'a self, operation: &'a str, args: serde_json::Value) -> BackendFuture<'a>;
}

/// Typed operations over a [`SessionBackend`], each routed through the invoker.
#[derive(Clone)]
pub struct SessionClient {
    backend: Arc<dyn SessionBackend>,
    invoker: Invoker,
}

impl SessionClient {
    pub fn new(backend: Arc<dyn SessionBackend>, invoker: Invoker) -> Self {
        Self { backend, invoker }
    }

    /// Fetch the stored view preference for a session, if any.
    pub async fn view_preference(&self, session_id: &str) -> Result<Option<ViewLevel>> {
        let args = serde_json::json!({ "session_id": session_id });
        let value = self
            .invoker
            .invoke("get_view_preference", &CallOptions::default(), |_| {
                self.backend.call("get_view_preference", args.clone())
            })
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Persist the view preference for a session.
    pub async fn save_view_preference(&self, session_id: &str, level: ViewLevel) -> Result<()> {
        let args = serde_json::json!({ "session_id": session_id, "level": level });
        self.invoker
            .invoke("save_view_preference", &CallOptions::default(), |_| {
                self.backend.call("save_view_preference", args.clone())
            })
            .await?;
        Ok(())
    }

    /// Fetch a session's messages shaped by the given view level.
    pub async fn session_messages(
        &self,
        session_id: &str,
        level: ViewLevel,
    ) -> Result<Vec<SessionMessage>> {
        let args = serde_json::json!({ "session_id": session_id, "level": level });
        let value = self
            .invoker
            .invoke("list_session_messages", &CallOptions::default(), |_| {
                self.backend.call("list_session_messages", args.clone())
            })
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Fetch a session's question/answer pairs.
    pub async fn session_qa_pairs(
        &self,
        session_id: &str,
        level: ViewLevel,
    ) -> Result<Vec<QaPair>> {
        let args = serde_json::json!({ "session_id": session_id, "level": level });
        let value = self
            .invoker
            .invoke("list_session_qa_pairs", &CallOptions::default(), |_| {
                self.backend.call("list_session_qa_pairs", args.clone())
            })
            .await?;
        Ok(serde_json::from_value(value)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    fn backend_error(message: &str) -> Error {
        Error::Backend {
            operation: "op".to_string(),
            message: message.to_string(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_bound_always_failing() {
        let invoker = Invoker::new(RetryPolicy {
            max_retries: 2,
            base_delay: Duration::from_millis(10),
        });
        let calls = Arc::new(AtomicU32::new(0));
        let retries = Arc::new(Mutex::new(Vec::new()));

        let options = CallOptions {
            on_retry: Some({
                let retries = retries.clone();
                Arc::new(move |attempt, _error| retries.lock().unwrap().push(attempt))
            }),
            ..Default::default()
        };

        let c = calls.clone();
        let result: Result<()> = invoker
            .invoke("op", &options, move |_| {
                let c = c.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Err(backend_error("down"))
                }
            })
            .await;

        // 3 attempts total, final error propagated, observer saw attempts 1 and 2
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(matches!(result, Err(Error::Backend { .. })));
        assert_eq!(*retries.lock().unwrap(), vec![1, 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_success_after_one_failure() {
        let invoker = Invoker::new(RetryPolicy {
            max_retries: 2,
            base_delay: Duration::from_millis(10),
        });
        let calls = Arc::new(AtomicU32::new(0));
        let retry_count = Arc::new(AtomicU32::new(0));

        let options = CallOptions {
            on_retry: Some({
                let retry_count = retry_count.clone();
                Arc::new(move |_, _| {
                    retry_count.fetch_add(1, Ordering::SeqCst);
                })
            }),
            ..Default::default()
        };

        let c = calls.clone();
        let result = invoker
            .invoke("op", &options, move |_| {
                let c = c.clone();
                async move {
                    if c.fetch_add(1, Ordering::SeqCst) == 0 {
                        Err(backend_error("transient"))
                    } else {
                        Ok(42u32)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(retry_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_options_replace_defaults() {
        // default would retry twice; the call override disables retry entirely
        let invoker = Invoker::new(RetryPolicy {
            max_retries: 2,
            base_delay: Duration::from_millis(10),
        });
        let calls = Arc::new(AtomicU32::new(0));

        let options = CallOptions {
            max_retries: Some(0),
            ..Default::default()
        };

        let c = calls.clone();
        let result: Result<()> = invoker
            .invoke("op", &options, move |_| {
                let c = c.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Err(backend_error("down"))
                }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_linear_backoff_delays() {
        let invoker = Invoker::new(RetryPolicy {
            max_retries: 2,
            base_delay: Duration::from_millis(100),
        });
        let calls = Arc::new(AtomicU32::new(0));

        let start = tokio::time::Instant::now();
        let c = calls.clone();
        let _: Result<()> = invoker
            .invoke("op", &CallOptions::default(), move |_| {
                let c = c.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Err(backend_error("down"))
                }
            })
            .await;

        // waits are base*1 + base*2 = 300ms under the paused clock
        assert_eq!(start.elapsed(), Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_final_error_propagated_unchanged() {
        let invoker = Invoker::new(RetryPolicy {
            max_retries: 1,
            base_delay: Duration::from_millis(1),
        });

        let result: Result<()> = invoker
            .invoke("op", &CallOptions::default(), |attempt| async move {
                Err(backend_error(&format!("failure #{}", attempt)))
            })
            .await;

        match result {
            Err(Error::Backend { message, .. }) => assert_eq!(message, "failure #2"),
            other => panic!("unexpected result: {:?}", other.map(|_| ())),
        }
    }
}

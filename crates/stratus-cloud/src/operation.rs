//! Long-running operation polling
//!
//! Mutating vendor calls often return an operation handle instead of the
//! finished resource. [`OperationPoller`] queries the handle at a fixed
//! interval until the operation reaches a terminal state or the deadline
//! elapses.
//!
//! ```text
//! Pending ──► Succeeded(payload)
//!    │    └─► Failed(detail)
//!    └──────► Timeout            (deadline elapsed)
//! ```

use crate::config::{MIN_POLL_INTERVAL, PollConfig};
use crate::error::{CloudError, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::time::{Instant, sleep};

/// Scope used to build the status query for an operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum OperationScope {
    Global { project: String },
    Regional { project: String, region: String },
    Zonal { project: String, zone: String },
    /// The operation name is already a full resource path
    Named,
}

impl fmt::Display for OperationScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationScope::Global { project } => write!(f, "projects/{}/global", project),
            OperationScope::Regional { project, region } => {
                write!(f, "projects/{}/regions/{}", project, region)
            }
            OperationScope::Zonal { project, zone } => {
                write!(f, "projects/{}/zones/{}", project, zone)
            }
            OperationScope::Named => Ok(()),
        }
    }
}

/// Opaque reference to an in-progress vendor-side operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationHandle {
    name: String,
    scope: OperationScope,
}

impl OperationHandle {
    pub fn new(name: impl Into<String>, scope: OperationScope) -> Self {
        Self {
            name: name.into(),
            scope,
        }
    }

    /// Handle whose name is a full path such as `operations/abc123`
    pub fn named(name: impl Into<String>) -> Self {
        Self::new(name, OperationScope::Named)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn scope(&self) -> &OperationScope {
        &self.scope
    }
}

impl fmt::Display for OperationHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.scope {
            OperationScope::Named => write!(f, "{}", self.name),
            _ => write!(f, "{}/operations/{}", self.scope, self.name),
        }
    }
}

/// Vendor-supplied failure detail
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationError {
    pub code: Option<String>,
    pub message: String,
    #[serde(default)]
    pub details: serde_json::Value,
}

impl OperationError {
    pub fn new(code: Option<String>, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: serde_json::Value::Null,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }
}

impl fmt::Display for OperationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.code {
            Some(code) => write!(f, "{}: {}", code, self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

/// Observed state of an operation
#[derive(Debug, Clone, PartialEq)]
pub enum OperationStatus {
    Pending,
    Succeeded(serde_json::Value),
    Failed(OperationError),
}

impl OperationStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, OperationStatus::Pending)
    }
}

/// Issues a single status query for an operation
///
/// Implementations map a query failure (network, auth, undecodable body) to
/// [`CloudError::Transport`]; the poller returns it without retrying.
#[async_trait]
pub trait OperationSource: Send + Sync {
    async fn query(&self, handle: &OperationHandle) -> Result<OperationStatus>;
}

#[async_trait]
impl<S: OperationSource + ?Sized> OperationSource for std::sync::Arc<S> {
    async fn query(&self, handle: &OperationHandle) -> Result<OperationStatus> {
        (**self).query(handle).await
    }
}

/// Resolves operations to a terminal result
#[derive(Debug, Clone)]
pub struct OperationPoller<S> {
    source: S,
    config: PollConfig,
}

impl<S: OperationSource> OperationPoller<S> {
    pub fn new(source: S, config: PollConfig) -> Self {
        Self { source, config }
    }

    pub fn config(&self) -> PollConfig {
        self.config
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Same source, different interval or deadline
    pub fn with_config(&self, config: PollConfig) -> Self
    where
        S: Clone,
    {
        Self {
            source: self.source.clone(),
            config,
        }
    }

    /// Poll until the operation finishes, returning its response payload
    pub async fn wait(&self, handle: &OperationHandle) -> Result<serde_json::Value> {
        let start = Instant::now();
        let mut attempts: u32 = 0;

        loop {
            attempts += 1;
            let status = self.source.query(handle).await?;
            tracing::debug!(operation = %handle, attempts, ?status, "Polled operation");

            match status {
                OperationStatus::Succeeded(payload) => {
                    tracing::debug!(operation = %handle, elapsed = ?start.elapsed(), "Operation done");
                    return Ok(payload);
                }
                OperationStatus::Failed(detail) => {
                    return Err(CloudError::OperationFailed {
                        operation: handle.to_string(),
                        detail,
                    });
                }
                OperationStatus::Pending => {}
            }

            let elapsed = start.elapsed();
            if elapsed >= self.config.timeout {
                tracing::warn!(operation = %handle, attempts, "Operation still pending at deadline");
                return Err(CloudError::Timeout {
                    operation: handle.to_string(),
                    elapsed,
                });
            }

            let remaining = self.config.timeout - elapsed;
            let interval = self.config.interval.max(MIN_POLL_INTERVAL);
            sleep(interval.min(remaining)).await;
        }
    }

    /// Poll and decode the response payload into `T`
    pub async fn wait_for<T: DeserializeOwned>(&self, handle: &OperationHandle) -> Result<T> {
        let payload = self.wait(handle).await?;
        Ok(serde_json::from_value(payload)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Replays a fixed status sequence; the last entry repeats forever
    struct ScriptedSource {
        script: Mutex<VecDeque<Result<OperationStatus>>>,
        last: OperationStatus,
        queries: AtomicUsize,
    }

    impl ScriptedSource {
        fn new(script: Vec<Result<OperationStatus>>, last: OperationStatus) -> Self {
            Self {
                script: Mutex::new(script.into()),
                last,
                queries: AtomicUsize::new(0),
            }
        }

        fn always(status: OperationStatus) -> Self {
            Self::new(Vec::new(), status)
        }

        fn queries(&self) -> usize {
            self.queries.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl OperationSource for ScriptedSource {
        async fn query(&self, _handle: &OperationHandle) -> Result<OperationStatus> {
            self.queries.fetch_add(1, Ordering::SeqCst);
            let next = self.script.lock().unwrap().pop_front();
            match next {
                Some(step) => step,
                None => Ok(self.last.clone()),
            }
        }
    }

    fn poll(interval: u64, timeout: u64) -> PollConfig {
        PollConfig::new(Duration::from_secs(interval), Duration::from_secs(timeout))
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_after_two_pending() {
        let source = ScriptedSource::new(
            vec![
                Ok(OperationStatus::Pending),
                Ok(OperationStatus::Pending),
                Ok(OperationStatus::Succeeded(json!({"id": "x"}))),
            ],
            OperationStatus::Pending,
        );
        let poller = OperationPoller::new(source, poll(2, 10));
        let handle = OperationHandle::named("op-1");

        let start = Instant::now();
        let payload = poller.wait(&handle).await.unwrap();

        assert_eq!(payload, json!({"id": "x"}));
        assert_eq!(start.elapsed(), Duration::from_secs(4));
        assert_eq!(poller.source().queries(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_when_always_pending() {
        let poller = OperationPoller::new(
            ScriptedSource::always(OperationStatus::Pending),
            poll(1, 3),
        );
        let handle = OperationHandle::named("op-2");

        let start = Instant::now();
        let err = poller.wait(&handle).await.unwrap_err();

        assert!(err.is_timeout());
        assert_eq!(start.elapsed(), Duration::from_secs(3));
        let queries = poller.source().queries();
        assert!((3..=4).contains(&queries), "issued {} queries", queries);

        // No queries after returning
        tokio::time::advance(Duration::from_secs(10)).await;
        assert_eq!(poller.source().queries(), queries);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_sleeps_only_remaining_time() {
        let poller = OperationPoller::new(
            ScriptedSource::always(OperationStatus::Pending),
            poll(4, 5),
        );
        let start = Instant::now();
        let err = poller.wait(&OperationHandle::named("op")).await.unwrap_err();

        assert!(err.is_timeout());
        assert_eq!(start.elapsed(), Duration::from_secs(5));
        assert_eq!(poller.source().queries(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_first_query_does_not_sleep() {
        let detail = OperationError::new(Some("QUOTA_EXCEEDED".into()), "out of CPUs");
        let poller = OperationPoller::new(
            ScriptedSource::always(OperationStatus::Failed(detail.clone())),
            poll(2, 10),
        );

        let start = Instant::now();
        let err = poller.wait(&OperationHandle::named("op-3")).await.unwrap_err();

        assert_eq!(start.elapsed(), Duration::ZERO);
        assert_eq!(poller.source().queries(), 1);
        match err {
            CloudError::OperationFailed { operation, detail: got } => {
                assert_eq!(operation, "op-3");
                assert_eq!(got, detail);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_error_aborts_polling() {
        let source = ScriptedSource::new(
            vec![
                Ok(OperationStatus::Pending),
                Err(CloudError::Transport("connection reset".into())),
                Ok(OperationStatus::Succeeded(json!({}))),
            ],
            OperationStatus::Pending,
        );
        let poller = OperationPoller::new(source, poll(1, 60));

        let err = poller.wait(&OperationHandle::named("op-4")).await.unwrap_err();

        assert!(matches!(err, CloudError::Transport(ref m) if m == "connection reset"));
        assert_eq!(poller.source().queries(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_decodes_payload() {
        #[derive(Debug, Deserialize, PartialEq)]
        struct Created {
            id: String,
        }

        let poller = OperationPoller::new(
            ScriptedSource::always(OperationStatus::Succeeded(json!({"id": "x"}))),
            PollConfig::default(),
        );
        let created: Created = poller.wait_for(&OperationHandle::named("op")).await.unwrap();
        assert_eq!(created, Created { id: "x".into() });
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_decode_failure() {
        let poller = OperationPoller::new(
            ScriptedSource::always(OperationStatus::Succeeded(json!({"id": 7}))),
            PollConfig::default(),
        );
        let result: Result<Vec<String>> = poller.wait_for(&OperationHandle::named("op")).await;
        tokio_test::assert_err!(&result);
        assert!(matches!(result, Err(CloudError::Json(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_pollers_are_independent() {
        let fast = OperationPoller::new(
            ScriptedSource::new(
                vec![Ok(OperationStatus::Pending)],
                OperationStatus::Succeeded(json!("fast")),
            ),
            poll(1, 10),
        );
        let slow = OperationPoller::new(
            ScriptedSource::new(
                vec![
                    Ok(OperationStatus::Pending),
                    Ok(OperationStatus::Pending),
                    Ok(OperationStatus::Pending),
                ],
                OperationStatus::Succeeded(json!("slow")),
            ),
            poll(1, 10),
        );
        let a = OperationHandle::named("a");
        let b = OperationHandle::named("b");

        let (fast_result, slow_result) = tokio::join!(fast.wait(&a), slow.wait(&b));

        assert_eq!(fast_result.unwrap(), json!("fast"));
        assert_eq!(slow_result.unwrap(), json!("slow"));
        assert_eq!(fast.source().queries(), 2);
        assert_eq!(slow.source().queries(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_interval_is_raised_to_minimum() {
        let config = PollConfig {
            interval: Duration::ZERO,
            timeout: Duration::from_secs(1),
        };
        let poller = OperationPoller::new(ScriptedSource::always(OperationStatus::Pending), config);

        let start = Instant::now();
        let err = poller.wait(&OperationHandle::named("op")).await.unwrap_err();

        assert!(err.is_timeout());
        assert_eq!(start.elapsed(), Duration::from_secs(1));
        // t = 0, 0.1, ..., 1.0
        assert_eq!(poller.source().queries(), 11);
    }

    #[tokio::test(start_paused = true)]
    async fn test_with_config_shares_source() {
        let source = Arc::new(ScriptedSource::always(OperationStatus::Pending));
        let poller = OperationPoller::new(source.clone(), poll(2, 240));
        let short = poller.with_config(poll(1, 2));
        assert_eq!(short.config().timeout, Duration::from_secs(2));
        assert_eq!(poller.config().timeout, Duration::from_secs(240));

        let start = Instant::now();
        let err = short.wait(&OperationHandle::named("op")).await.unwrap_err();

        assert!(err.is_timeout());
        assert_eq!(start.elapsed(), Duration::from_secs(2));
        assert_eq!(source.queries(), 3);
    }

    #[test]
    fn test_status_is_terminal() {
        assert!(!OperationStatus::Pending.is_terminal());
        assert!(OperationStatus::Succeeded(json!({})).is_terminal());
        assert!(OperationStatus::Failed(OperationError::new(None, "boom")).is_terminal());
    }

    #[test]
    fn test_handle_display() {
        let zonal = OperationHandle::new(
            "operation-123",
            OperationScope::Zonal {
                project: "p".into(),
                zone: "us-central1-a".into(),
            },
        );
        assert_eq!(
            zonal.to_string(),
            "projects/p/zones/us-central1-a/operations/operation-123"
        );
        assert_eq!(
            OperationHandle::named("operations/abc").to_string(),
            "operations/abc"
        );
    }

    #[test]
    fn test_operation_error_display() {
        assert_eq!(
            OperationError::new(Some("NOT_FOUND".into()), "gone").to_string(),
            "NOT_FOUND: gone"
        );
        assert_eq!(OperationError::new(None, "boom").to_string(), "boom");
    }
}

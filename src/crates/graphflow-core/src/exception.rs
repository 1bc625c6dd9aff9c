//! Exception operators: [`TryCatchNode`], [`RetryNode`], [`TimeoutNode`], and
//! [`CircuitBreakerNode`]. All four wrap a target function and
//! §7, always *succeed* at the engine level — `exec` never returns `Err`; success
//! and failure of the wrapped target are communicated through a structured
//! `{success, result, error, handled, …}` record instead.
//!
//! The shared `post` logic is grounded on
//! `examples/original_source/src/graph/node_types.py`'s `ExceptionNode.post`:
//! when `handled` is true, route to `next_action` (absent means the default
//! edge); otherwise route to `error_action` (default `"error"`), with
//! `__exit__` passed through unchanged since it is already a valid sentinel.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use crate::node::{sentinel, ExecError, Node, NodeCategory, NodeCore};

type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// An async `input -> output` target a node invokes, matching the Node
/// authoring API's `Retry/Timeout/CircuitBreaker target: input -> output (may
/// throw)` signature.
pub type TargetFn = Arc<dyn Fn(Value) -> BoxFuture<Result<Value, ExecError>> + Send + Sync>;

/// Predicate selecting which errors an operator treats as recoverable; default
/// treats every error as recoverable, matching the Python original's default
/// `exception_types = (Exception,)`.
pub type ExceptionFilter = Arc<dyn Fn(&ExecError) -> bool + Send + Sync>;

fn catch_all() -> ExceptionFilter {
    Arc::new(|_| true)
}

/// Shared `post` behavior for every exception operator.
fn exception_post(result: Option<&Value>) -> Option<String> {
    let result = result?;
    let handled = result
        .get("handled")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);
    if handled {
        result
            .get("next_action")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
    } else {
        let error_action = result
            .get("error_action")
            .and_then(|v| v.as_str())
            .unwrap_or(sentinel::ERROR);
        Some(error_action.to_string())
    }
}

/// `tryFn`/`catchFn` pair. Runs `tryFn`; on a matching error runs `catchFn` with
/// the original input and the error message and reports a handled failure.
/// Errors that don't match [`TryCatchNode`]'s filter propagate unchanged.
pub struct TryCatchNode {
    core: NodeCore,
    try_fn: TargetFn,
    catch_fn: Arc<dyn Fn(Value, &str) -> Value + Send + Sync>,
    matches: ExceptionFilter,
}

impl TryCatchNode {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        try_fn: TargetFn,
        catch_fn: Arc<dyn Fn(Value, &str) -> Value + Send + Sync>,
    ) -> Self {
        TryCatchNode {
            core: NodeCore::new(id, name, NodeCategory::Exception),
            try_fn,
            catch_fn,
            matches: catch_all(),
        }
    }

    /// Restrict which errors this node catches; non-matching errors propagate.
    pub fn with_filter(mut self, matches: ExceptionFilter) -> Self {
        self.matches = matches;
        self
    }
}

#[async_trait]
impl Node for TryCatchNode {
    fn core(&self) -> &NodeCore {
        &self.core
    }
    fn core_mut(&mut self) -> &mut NodeCore {
        &mut self.core
    }

    async fn exec(&mut self) -> Result<Value, ExecError> {
        let input = self.core.take_input();
        match (self.try_fn)(input.clone()).await {
            Ok(result) => Ok(json!({
                "success": true,
                "result": result,
                "error": Value::Null,
                "handled": true,
            })),
            Err(e) if (self.matches)(&e) => {
                let recovered = (self.catch_fn)(input, &e.to_string());
                Ok(json!({
                    "success": false,
                    "result": recovered,
                    "error": e.to_string(),
                    "handled": true,
                    "exception_type": e.to_string(),
                }))
            }
            Err(e) => Err(e),
        }
    }

    async fn post(&mut self) -> Option<String> {
        exception_post(self.core.last_result())
    }
}

/// Retries `target` up to `max_retries + 1` times total, sleeping
/// `retry_delay * backoff_factor^k` between attempts. Errors not matched by
/// [`RetryNode::with_filter`]'s predicate propagate on first occurrence without
/// retrying.
pub struct RetryNode {
    core: NodeCore,
    target: TargetFn,
    max_retries: u32,
    retry_delay: Duration,
    backoff_factor: f64,
    matches: ExceptionFilter,
}

impl RetryNode {
    pub fn new(id: impl Into<String>, name: impl Into<String>, target: TargetFn) -> Self {
        RetryNode {
            core: NodeCore::new(id, name, NodeCategory::Exception),
            target,
            max_retries: 3,
            retry_delay: Duration::from_secs_f64(1.0),
            backoff_factor: 2.0,
            matches: catch_all(),
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn with_backoff_factor(mut self, factor: f64) -> Self {
        self.backoff_factor = factor;
        self
    }

    pub fn with_filter(mut self, matches: ExceptionFilter) -> Self {
        self.matches = matches;
        self
    }
}

#[async_trait]
impl Node for RetryNode {
    fn core(&self) -> &NodeCore {
        &self.core
    }
    fn core_mut(&mut self) -> &mut NodeCore {
        &mut self.core
    }

    async fn exec(&mut self) -> Result<Value, ExecError> {
        let input = self.core.take_input();
        let mut delay = self.retry_delay;
        let mut last_err: Option<ExecError> = None;

        for attempt in 0..=self.max_retries {
            match (self.target)(input.clone()).await {
                Ok(result) => {
                    return Ok(json!({
                        "success": true,
                        "result": result,
                        "attempts": attempt + 1,
                        "error": Value::Null,
                        "handled": true,
                    }))
                }
                Err(e) if (self.matches)(&e) => {
                    tracing::debug!(node = self.core.id(), attempt, error = %e, "retry attempt failed");
                    last_err = Some(e);
                    if attempt < self.max_retries {
                        tokio::time::sleep(delay).await;
                        delay = delay.mul_f64(self.backoff_factor);
                    }
                }
                Err(e) => return Err(e),
            }
        }

        let err = last_err.expect("loop always records an error before exiting");
        Ok(json!({
            "success": false,
            "result": Value::Null,
            "attempts": self.max_retries + 1,
            "error": err.to_string(),
            "handled": true,
            "max_retries_exceeded": true,
        }))
    }

    async fn post(&mut self) -> Option<String> {
        exception_post(self.core.last_result())
    }
}

/// Races `target` against a deadline. On expiry, cancels the target (tokio
/// drops the in-flight future) and reports a handled timeout rather than
/// propagating.
pub struct TimeoutNode {
    core: NodeCore,
    target: TargetFn,
    timeout: Duration,
}

impl TimeoutNode {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        target: TargetFn,
        timeout: Duration,
    ) -> Self {
        TimeoutNode {
            core: NodeCore::new(id, name, NodeCategory::Exception),
            target,
            timeout,
        }
    }
}

#[async_trait]
impl Node for TimeoutNode {
    fn core(&self) -> &NodeCore {
        &self.core
    }
    fn core_mut(&mut self) -> &mut NodeCore {
        &mut self.core
    }

    async fn exec(&mut self) -> Result<Value, ExecError> {
        let input = self.core.take_input();
        let seconds = self.timeout.as_secs_f64();
        match tokio::time::timeout(self.timeout, (self.target)(input)).await {
            Ok(Ok(result)) => Ok(json!({
                "success": true,
                "result": result,
                "timeout": false,
                "timeout_seconds": seconds,
                "handled": true,
            })),
            Ok(Err(e)) => Err(e),
            Err(_elapsed) => {
                tracing::warn!(node = self.core.id(), seconds, "operation timed out");
                Ok(json!({
                    "success": false,
                    "result": Value::Null,
                    "timeout": true,
                    "timeout_seconds": seconds,
                    "handled": true,
                    "error": format!("Operation timed out after {seconds} seconds"),
                }))
            }
        }
    }

    async fn post(&mut self) -> Option<String> {
        exception_post(self.core.last_result())
    }
}

/// CLOSED / OPEN / HALF_OPEN circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    fn as_str(self) -> &'static str {
        match self {
            CircuitState::Closed => "CLOSED",
            CircuitState::Open => "OPEN",
            CircuitState::HalfOpen => "HALF_OPEN",
        }
    }
}

/// Trips to `OPEN` after `failure_threshold` consecutive failures, short-
/// circuiting calls until `timeout` has elapsed, then probes in `HALF_OPEN`
/// until `success_threshold` consecutive successes close it again. State
/// persists across invocations within a run and is part of this node's
/// snapshot [`Node::custom_state`].
pub struct CircuitBreakerNode {
    core: NodeCore,
    target: TargetFn,
    failure_threshold: u32,
    success_threshold: u32,
    timeout: Duration,
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    last_failure_at_ms: Option<i64>,
}

impl CircuitBreakerNode {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        target: TargetFn,
        failure_threshold: u32,
        success_threshold: u32,
        timeout: Duration,
    ) -> Self {
        CircuitBreakerNode {
            core: NodeCore::new(id, name, NodeCategory::Exception),
            target,
            failure_threshold,
            success_threshold,
            timeout,
            state: CircuitState::Closed,
            failure_count: 0,
            success_count: 0,
            last_failure_at_ms: None,
        }
    }

    pub fn state(&self) -> CircuitState {
        self.state
    }
}

#[async_trait]
impl Node for CircuitBreakerNode {
    fn core(&self) -> &NodeCore {
        &self.core
    }
    fn core_mut(&mut self) -> &mut NodeCore {
        &mut self.core
    }

    async fn exec(&mut self) -> Result<Value, ExecError> {
        let input = self.core.take_input();
        let now_ms = Utc::now().timestamp_millis();

        if self.state == CircuitState::Open {
            let elapsed_ok = self
                .last_failure_at_ms
                .map(|last| (now_ms - last) as f64 / 1000.0 > self.timeout.as_secs_f64())
                .unwrap_or(true);
            if elapsed_ok {
                tracing::info!(node = self.core.id(), "circuit breaker half-opening");
                self.state = CircuitState::HalfOpen;
                self.success_count = 0;
            }
        }

        if self.state == CircuitState::Open {
            return Ok(json!({
                "success": false,
                "result": Value::Null,
                "circuit_breaker_state": self.state.as_str(),
                "error": "Circuit breaker is OPEN",
                "handled": true,
                "next_action": "circuit_open",
            }));
        }

        match (self.target)(input).await {
            Ok(result) => {
                match self.state {
                    CircuitState::HalfOpen => {
                        self.success_count += 1;
                        if self.success_count >= self.success_threshold {
                            tracing::info!(node = self.core.id(), "circuit breaker closing");
                            self.state = CircuitState::Closed;
                            self.failure_count = 0;
                        }
                    }
                    CircuitState::Closed => self.failure_count = 0,
                    CircuitState::Open => unreachable!("handled above"),
                }
                Ok(json!({
                    "success": true,
                    "result": result,
                    "circuit_breaker_state": self.state.as_str(),
                    "error": Value::Null,
                    "handled": true,
                }))
            }
            Err(e) => {
                self.failure_count += 1;
                self.last_failure_at_ms = Some(now_ms);
                match self.state {
                    CircuitState::HalfOpen => self.state = CircuitState::Open,
                    CircuitState::Closed if self.failure_count >= self.failure_threshold => {
                        self.state = CircuitState::Open
                    }
                    _ => {}
                }
                let next_action = if self.state == CircuitState::Open {
                    "circuit_trip"
                } else {
                    "error"
                };
                tracing::warn!(node = self.core.id(), state = self.state.as_str(), "circuit breaker observed failure");
                Ok(json!({
                    "success": false,
                    "result": Value::Null,
                    "circuit_breaker_state": self.state.as_str(),
                    "error": e.to_string(),
                    "handled": true,
                    "next_action": next_action,
                }))
            }
        }
    }

    async fn post(&mut self) -> Option<String> {
        exception_post(self.core.last_result())
    }

    fn custom_state(&self) -> Value {
        json!({
            "state": self.state.as_str(),
            "failure_count": self.failure_count,
            "success_count": self.success_count,
            "last_failure_at_ms": self.last_failure_at_ms,
        })
    }

    fn restore_custom_state(&mut self, state: Value) {
        if let Some(s) = state.get("state").and_then(|v| v.as_str()) {
            self.state = match s {
                "OPEN" => CircuitState::Open,
                "HALF_OPEN" => CircuitState::HalfOpen,
                _ => CircuitState::Closed,
            };
        }
        if let Some(n) = state.get("failure_count").and_then(|v| v.as_u64()) {
            self.failure_count = n as u32;
        }
        if let Some(n) = state.get("success_count").and_then(|v| v.as_u64()) {
            self.success_count = n as u32;
        }
        self.last_failure_at_ms = state.get("last_failure_at_ms").and_then(|v| v.as_i64());
    }

    fn reset(&mut self) {
        self.core.reset();
        self.state = CircuitState::Closed;
        self.failure_count = 0;
        self.success_count = 0;
        self.last_failure_at_ms = None;
    }
}

fn ok_fn(value: Value) -> BoxFuture<Result<Value, ExecError>> {
    Box::pin(async move { Ok(value) })
}

#[allow(dead_code)]
fn err_fn(message: &'static str) -> BoxFuture<Result<Value, ExecError>> {
    Box::pin(async move { Err(message.into()) })
}

//! Dispatch engine
//!
//! Resolves a [`FunctionCallRequest`] against the handler registry and always
//! produces exactly one [`FunctionCallResponse`]. Handlers are synchronous, so
//! they run on the blocking pool under a timeout; a handler that overruns is
//! reported as timed out and its eventual result is dropped.

use crate::domain::event::{FunctionCallRequest, FunctionCallResponse};
use crate::domain::handler::{Arguments, HandlerEntry, HandlerRegistry};
use crate::domain::shared::DispatchError;
use crate::infrastructure::metrics;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task;
use tokio::time::timeout;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct DispatchEngine {
    registry: Arc<HandlerRegistry>,
    timeout: Duration,
    max_retries: u32,
}

impl DispatchEngine {
    pub fn new(registry: Arc<HandlerRegistry>, timeout: Duration) -> Self {
        Self {
            registry,
            timeout,
            max_retries: 0,
        }
    }

    /// Retry a timed-out invocation up to `max_retries` more times
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn registry(&self) -> &Arc<HandlerRegistry> {
        &self.registry
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub async fn dispatch(&self, request: FunctionCallRequest) -> FunctionCallResponse {
        let started = Instant::now();
        info!(
            "Function call {} on {}: {}({})",
            request.invocation_id, request.call_id, request.function_name, request.arguments
        );

        let outcome = self.resolve(&request).await;
        let response = FunctionCallResponse {
            invocation_id: request.invocation_id,
            function_name: request.function_name,
            outcome,
        };

        metrics::record_function_call(
            &response.function_name,
            response.status(),
            started.elapsed(),
        );
        match &response.outcome {
            Ok(_) => info!(
                "Function {} ({}) succeeded in {:?}",
                response.function_name,
                response.invocation_id,
                started.elapsed()
            ),
            Err(e) => warn!(
                "Function {} ({}) failed: {}",
                response.function_name, response.invocation_id, e
            ),
        }
        response
    }

    async fn resolve(&self, request: &FunctionCallRequest) -> Result<Map<String, Value>, DispatchError> {
        let entry = self
            .registry
            .lookup(&request.function_name)
            .ok_or_else(|| DispatchError::HandlerNotFound(request.function_name.clone()))?;

        let arguments = entry.schema().validate(&request.arguments)?;

        let mut attempt = 0;
        loop {
            match self.invoke(entry, arguments.clone()).await {
                Err(DispatchError::Timeout(_)) if attempt < self.max_retries => {
                    attempt += 1;
                    debug!(
                        "Retrying {} after timeout ({}/{})",
                        entry.name(),
                        attempt,
                        self.max_retries
                    );
                }
                result => return result,
            }
        }
    }

    async fn invoke(
        &self,
        entry: &HandlerEntry,
        arguments: Arguments,
    ) -> Result<Map<String, Value>, DispatchError> {
        let handler = entry.handler();
        let work = task::spawn_blocking(move || handler.call(&arguments));

        match timeout(self.timeout, work).await {
            Err(_) => Err(DispatchError::Timeout(self.timeout)),
            Ok(Err(join_error)) => {
                warn!("Handler {} panicked: {}", entry.name(), join_error);
                Err(DispatchError::HandlerPanicked)
            }
            Ok(Ok(result)) => result.map_err(DispatchError::from),
        }
    }
}

//! Function handlers invocable by the voice agent

pub mod registry;
pub mod schema;

pub use registry::{HandlerEntry, HandlerRegistry, RegistryBuilder};
pub use schema::{Arguments, FieldKind, FieldSpec, InputSchema};

use crate::domain::shared::DispatchError;
use rand::Rng;
use serde_json::{Map, Value};
use std::fmt;

/// Business-level failure reported by a handler
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerFailure {
    pub code: String,
    pub message: String,
}

impl HandlerFailure {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for HandlerFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl From<HandlerFailure> for DispatchError {
    fn from(failure: HandlerFailure) -> Self {
        DispatchError::Business {
            code: failure.code,
            message: failure.message,
        }
    }
}

/// Result of a handler invocation
pub type HandlerResult = Result<Map<String, Value>, HandlerFailure>;

/// A domain function the agent may call.
///
/// Handlers are plain synchronous functions; the dispatch engine runs them on
/// the blocking pool so they may perform their own I/O.
pub trait FunctionHandler: Send + Sync {
    fn call(&self, arguments: &Arguments) -> HandlerResult;
}

impl<F> FunctionHandler for F
where
    F: Fn(&Arguments) -> HandlerResult + Send + Sync,
{
    fn call(&self, arguments: &Arguments) -> HandlerResult {
        self(arguments)
    }
}

/// Success payload from a JSON object; any other value lands under `result`
pub fn payload(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => {
            let mut map = Map::new();
            map.insert("result".to_string(), other);
            map
        }
    }
}

/// Six-character uppercase alphanumeric code, read back to callers
pub fn generate_code() -> String {
    const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
    let mut rng = rand::thread_rng();
    (0..6)
        .map(|_| CHARSET[rng.gen_range(0..CHARSET.len())] as char)
        .collect()
}

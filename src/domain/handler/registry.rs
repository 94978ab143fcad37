//! Handler registry
//!
//! Populated once at process start through [`RegistryBuilder`], then frozen.
//! The frozen registry is shared across sessions behind an `Arc` and needs no
//! locking because nothing mutates it.

use super::schema::InputSchema;
use super::FunctionHandler;
use crate::domain::shared::{BridgeError, Result};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::info;

/// A registered function
#[derive(Clone)]
pub struct HandlerEntry {
    name: String,
    description: String,
    schema: InputSchema,
    handler: Arc<dyn FunctionHandler>,
}

impl HandlerEntry {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn schema(&self) -> &InputSchema {
        &self.schema
    }

    pub fn handler(&self) -> Arc<dyn FunctionHandler> {
        self.handler.clone()
    }

    /// Function declaration in the agent's settings format
    pub fn definition(&self) -> Value {
        json!({
            "name": self.name,
            "description": self.description,
            "parameters": self.schema.to_json_schema(),
        })
    }
}

impl fmt::Debug for HandlerEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerEntry")
            .field("name", &self.name)
            .field("schema", &self.schema)
            .finish()
    }
}

/// Startup-time registration
#[derive(Default)]
pub struct RegistryBuilder {
    entries: HashMap<String, HandlerEntry>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler. A name may only be registered once.
    pub fn register<H>(
        &mut self,
        name: &str,
        description: &str,
        schema: InputSchema,
        handler: H,
    ) -> Result<&mut Self>
    where
        H: FunctionHandler + 'static,
    {
        if self.entries.contains_key(name) {
            return Err(BridgeError::DuplicateHandler(name.to_string()));
        }
        self.entries.insert(
            name.to_string(),
            HandlerEntry {
                name: name.to_string(),
                description: description.to_string(),
                schema,
                handler: Arc::new(handler),
            },
        );
        info!("Registered function handler: {}", name);
        Ok(self)
    }

    pub fn build(self) -> HandlerRegistry {
        HandlerRegistry {
            entries: self.entries,
        }
    }
}

/// Read-only function name -> handler mapping
#[derive(Debug, Default)]
pub struct HandlerRegistry {
    entries: HashMap<String, HandlerEntry>,
}

impl HandlerRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    pub fn lookup(&self, name: &str) -> Option<&HandlerEntry> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Declarations of every function, sorted by name
    pub fn definitions(&self) -> Vec<Value> {
        self.names()
            .into_iter()
            .filter_map(|name| self.entries.get(name))
            .map(HandlerEntry::definition)
            .collect()
    }
}

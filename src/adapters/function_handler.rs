//! In-process function handlers for the local emulator.
use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use serde_json::json;

use crate::ports::function_handler::{
    FunctionHandler, HandlerError, HandlerResult, ProxyEvent, ProxyResponse,
};

/// Stand-in for a deployed function: logs the event and greets.
#[derive(Debug, Clone, Default)]
pub struct GreetingHandler {
    name: String,
}

impl GreetingHandler {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl FunctionHandler for GreetingHandler {
    async fn invoke(&self, event: ProxyEvent) -> HandlerResult<ProxyResponse> {
        let raw = serde_json::to_string(&event)?;
        tracing::info!(handler = %self.name, event = %raw, "event");
        Ok(ProxyResponse::json(
            200,
            &json!({ "message": "Hello from Lambda!" }),
        ))
    }
}

/// Handlers by integration name.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn FunctionHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry serving a [`GreetingHandler`] under every name.
    pub fn with_greeters<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut registry = Self::new();
        for name in names {
            let name = name.into();
            registry.register(name.clone(), Arc::new(GreetingHandler::new(name)));
        }
        registry
    }

    /// Register (or replace) the handler for `name`.
    pub fn register(&mut self, name: impl Into<String>, handler: Arc<dyn FunctionHandler>) {
        self.handlers.insert(name.into(), handler);
    }

    pub fn get(&self, name: &str) -> HandlerResult<Arc<dyn FunctionHandler>> {
        self.handlers
            .get(name)
            .cloned()
            .ok_or_else(|| HandlerError::NotFound(name.to_string()))
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

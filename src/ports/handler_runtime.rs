use std::path::Path;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::core::request::RequestContext;

/// Error type for handler runtime operations
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum RuntimeError {
    /// The runtime executable could not be started
    #[error("Failed to start runtime '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The runtime produced output that does not follow the reply protocol
    #[error("Invalid runtime reply: {0}")]
    Protocol(String),

    /// Loading the module or running the handler threw
    #[error("{0}")]
    Handler(String),
}

/// Result type for runtime operations
pub type RuntimeResult<T> = Result<T, RuntimeError>;

/// Outcome of invoking a handler module for one request.
#[derive(Debug, Clone, PartialEq)]
pub enum Invocation {
    /// The module exports the request method; carries its return value.
    Handled(Value),
    /// The module has no export for the request method.
    MethodNotFound,
}

/// HandlerRuntime defines the port (interface) for executing handler modules
#[async_trait]
pub trait HandlerRuntime: Send + Sync + 'static {
    /// Load `file` fresh and call the export named after the request method.
    async fn invoke(&self, file: &Path, request: &RequestContext) -> RuntimeResult<Invocation>;
}

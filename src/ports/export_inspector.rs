use std::path::Path;

use async_trait::async_trait;
use thiserror::Error;

/// Error type for export inspection
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum InspectError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The module could not be loaded
    #[error("{0}")]
    Load(String),
}

/// Result type for export inspection
pub type InspectResult<T> = Result<T, InspectError>;

/// ExportInspector defines the port (interface) for listing a handler
/// module's export names without bundling it
#[async_trait]
pub trait ExportInspector: Send + Sync + 'static {
    async fn exports(&self, file: &Path) -> InspectResult<Vec<String>>;
}

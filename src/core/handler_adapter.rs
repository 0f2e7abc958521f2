//! Handler method extraction and bundler entry wrappers.
//!
//! Extraction reads export names only (through an [`ExportInspector`]) so a
//! build can be validated before anything is bundled. Wrapping renders, for
//! every handler, a tiny module that re-exports the handler behind the single
//! normalized entry point expected by the deployment runtime.
use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use crate::{
    core::{
        discovery::HandlerFile,
        handler_module::{HandlerError, HandlerModule},
    },
    ports::export_inspector::ExportInspector,
};

/// Function exported by the runtime module that adapts a handler module.
pub const REQUEST_HANDLER_FACTORY: &str = "createRequestHandler";

/// What a wrapper imports and exports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrapperOptions {
    /// Module providing [`REQUEST_HANDLER_FACTORY`].
    pub runtime_module: String,
    /// Name of the normalized export.
    pub export_name: String,
}

impl Default for WrapperOptions {
    fn default() -> Self {
        Self {
            runtime_module: "@fnly/core".to_string(),
            export_name: "handler".to_string(),
        }
    }
}

/// Export name part of a `file.export` handler string.
pub fn handler_export_name(handler: &str) -> &str {
    handler.rsplit('.').next().unwrap_or(handler)
}

/// Source of the wrapper module for the handler at `original`.
///
/// The original is imported by absolute path so its own relative imports
/// resolve from its real location.
pub fn render_wrapper(original: &Path, options: &WrapperOptions) -> String {
    let original = original.to_string_lossy().replace('\\', "/");
    let original = serde_json::Value::String(original).to_string();
    let runtime_module = serde_json::Value::String(options.runtime_module.clone()).to_string();

    format!(
        "import * as mod from {original};\n\
         import {{ {REQUEST_HANDLER_FACTORY} }} from {runtime_module};\n\
         \n\
         export const {export} = {REQUEST_HANDLER_FACTORY}(mod);\n",
        export = options.export_name,
    )
}

pub struct HandlerAdapter {
    inspector: Arc<dyn ExportInspector>,
    wrapper: WrapperOptions,
}

impl HandlerAdapter {
    pub fn new(inspector: Arc<dyn ExportInspector>, wrapper: WrapperOptions) -> Self {
        Self { inspector, wrapper }
    }

    /// Read and validate the exports of one handler file.
    pub async fn inspect(&self, file: &HandlerFile) -> Result<HandlerModule, Vec<HandlerError>> {
        let exports = self.inspector.exports(&file.path).await.map_err(|e| {
            vec![HandlerError::Inspect {
                file: file.path.clone(),
                message: e.to_string(),
            }]
        })?;
        tracing::debug!("{} exports {:?}", file.relative, exports);
        HandlerModule::from_exports(&file.path, &exports)
    }

    /// Write the wrapper for `file` under `staging_root`, mirroring its
    /// relative path and extension. Returns the wrapper's path.
    pub fn write_wrapper(&self, file: &HandlerFile, staging_root: &Path) -> std::io::Result<PathBuf> {
        let original = if file.path.is_absolute() {
            file.path.clone()
        } else {
            std::path::absolute(&file.path)?
        };

        let wrapper_path = staging_root.join(&file.relative);
        if let Some(parent) = wrapper_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&wrapper_path, render_wrapper(&original, &self.wrapper))?;
        Ok(wrapper_path)
    }
}

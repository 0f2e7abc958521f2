pub mod dev_handler;
pub mod esbuild;
pub mod file_system;
pub mod node_runtime;
pub mod route_watcher;
pub mod source_inspector;

/// Re-export commonly used types from adapters
pub use dev_handler::{DevState, dev_router};
pub use esbuild::EsbuildBundler;
pub use file_system::HandlerFileResolver;
pub use node_runtime::NodeRuntime;
pub use route_watcher::{RebuildEvent, RouteWatcher};
pub use source_inspector::SourceExportInspector;

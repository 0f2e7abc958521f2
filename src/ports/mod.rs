pub mod bundler;
pub mod export_inspector;
pub mod handler_runtime;

//! fnly - file-routed serverless functions.
//!
//! fnly turns a directory of handler modules into HTTP routes. The file
//! `api/users/[id].ts` becomes the route `/users/:id`; each handler module
//! exports one function per HTTP method it answers (`GET`, `POST`, ...).
//! The crate implements a **hexagonal architecture**: routing, validation
//! and build logic live in `core`, external tools (bundler, JavaScript
//! runtime, file watcher, HTTP server) sit behind `ports` and are
//! implemented in `adapters`.
//!
//! # Features
//! - Path-to-route translation in two pattern dialects (`:name` and `{name}`)
//! - Route table with exact and parametrized matching, configurable
//!   tie-breaking and collision handling
//! - Live route rebuilds on file changes (debounced, never overlapping)
//! - Development server running handlers through a Node.js child process
//! - Production builds: method validation, wrapper generation, a single
//!   bundler run and an all-or-nothing swap of bundle and route manifest
//! - Layered configuration (`fnly.toml` + `FNLY_*` environment variables)
//! - Structured tracing and `metrics` facade instrumentation
//!
//! # Quick Example
//! ```no_run
//! use std::path::Path;
//!
//! use fnly::core::{RouteMatcher, RouteTable, ScanOptions};
//!
//! # fn main() -> eyre::Result<()> {
//! let table = RouteTable::scan(Path::new("api"), &ScanOptions::default())?;
//! if let Some(found) = RouteMatcher::default().find("/users/42", &table) {
//!     println!("{} -> {:?}", found.entry.pattern(), found.params);
//! }
//! # Ok(()) }
//! ```
//!
//! # Error Handling
//! Library APIs return domain error types built with `thiserror`; the
//! binary and the configuration loader use `eyre::Result` with context.
pub mod config;
pub mod metrics;
pub mod ports;
pub mod tracing_setup;
pub mod utils;

pub mod adapters;
pub mod core;

// Re-export the specific types needed by the binary crate
pub use crate::{
    adapters::{
        DevState, EsbuildBundler, HandlerFileResolver, NodeRuntime, RouteWatcher,
        SourceExportInspector, dev_router,
    },
    config::FnlyConfig,
    core::{BuildOrchestrator, BuildSettings, RouteMatcher, RouteTable, RouteTableHandle},
    utils::GracefulShutdown,
};

pub mod build;
pub mod discovery;
pub mod export_scanner;
pub mod handler_adapter;
pub mod handler_module;
pub mod manifest;
pub mod matcher;
pub mod method;
pub mod request;
pub mod route_table;
pub mod scheduler;
pub mod translator;

pub use build::{BuildError, BuildOrchestrator, BuildReport, BuildSettings};
pub use matcher::{RouteMatch, RouteMatcher, TieBreak};
pub use method::HttpMethod;
pub use route_table::{CollisionPolicy, RouteEntry, RouteTable, RouteTableHandle, ScanOptions};
pub use translator::{Dialect, translate};

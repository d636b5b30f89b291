pub mod bridge;
pub mod classifier;
pub mod config;
pub mod dedup_cache;
pub mod error;
pub mod error_codes;
pub mod id_allocator;
pub mod input_validation;
pub mod logging;
pub mod media;
pub mod messages;
pub mod move_engine;
pub mod notification;
pub mod observer;
pub mod path_validation;
pub mod permissions;
pub mod service;
pub mod system_integration;
pub mod watcher;


pub use config::{ConfigStore, NavigatorConfig};
pub use error::{NavigatorError, Result};
pub use media::{FileRecord, FileType, SourceKind, WatchEndpoint};
pub use messages::ServiceMessage;
pub use move_engine::{MoveOperation, MoveOrchestrator, MoveResult};
pub use service::{NavigatorService, ServiceHandle};

/// Crate version, as reported by the CLI.
pub fn get_app_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

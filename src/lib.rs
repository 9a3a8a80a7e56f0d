// Org Worker - background worker for community reports and image optimization

pub mod cli;
pub mod config;
pub mod db;
pub mod models;
pub mod processor;
pub mod queue;
pub mod render;
pub mod storage;
pub mod types;
pub mod utils;

// Re-exports for convenience
pub use config::Config;
pub use queue::{Dispatcher, DispatcherConfig, HandlerSet};
pub use types::{WorkerError, WorkerResult};

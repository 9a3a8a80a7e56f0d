// Command-line overrides for the environment configuration

use clap::Parser;

use crate::config::{Config, StorageBackend};

#[derive(Debug, Parser)]
#[command(name = "org-worker", version, about = "Report and image job worker")]
pub struct Cli {
    /// Maximum number of jobs processed at once
    #[arg(short, long, env = "WORKER_CONCURRENCY")]
    pub concurrency: Option<usize>,

    /// Redis list to consume
    #[arg(short, long, env = "TASK_QUEUE")]
    pub queue: Option<String>,

    /// Storage backend (`local` or `s3`)
    #[arg(long, env = "STORAGE_PROVIDER")]
    pub storage: Option<StorageBackend>,

    /// Apply database migrations before consuming
    #[arg(long)]
    pub run_migrations: bool,
}

impl Cli {
    /// Overlay flags onto a loaded configuration.
    pub fn apply(&self, config: &mut Config) {
        if let Some(concurrency) = self.concurrency {
            config.worker.concurrency = concurrency;
        }
        if let Some(queue) = &self.queue {
            config.redis.queue_name = queue.clone();
        }
        if let Some(storage) = self.storage {
            config.storage.provider = storage;
        }
        if self.run_migrations {
            config.database.run_migrations = true;
        }
    }
}

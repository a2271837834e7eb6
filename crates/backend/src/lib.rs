//! Durable storage for workflow instances.
//!
//! The engine talks to an [`InstanceStore`]; [`open_store`] picks the
//! implementation named in [`BackendConfig`].

pub mod config;
pub mod error;
pub mod memory;
pub mod sqlite;
pub mod unavailable;

use async_trait::async_trait;
use conductor_types::{InstanceFilter, InstanceId, WorkflowInstance};
use std::sync::Arc;

pub use config::{BackendConfig, BackendKind};
pub use error::{BackendError, BackendResult};
pub use memory::MemoryStore;
pub use sqlite::SqliteDocumentStore;
pub use unavailable::UnavailableStore;

/// Persistence contract for workflow instances.
///
/// Implementations must tolerate concurrent calls on different instances.
#[async_trait]
pub trait InstanceStore: Send + Sync {
    /// Short backend name used in logs.
    fn name(&self) -> &'static str;

    /// Insert a new instance document.
    async fn store(&self, instance: &WorkflowInstance) -> BackendResult<()>;

    async fn get(&self, instance_id: &InstanceId) -> BackendResult<Option<WorkflowInstance>>;

    /// Replace an existing document. Returns `false` when no document matched.
    async fn update(&self, instance: &WorkflowInstance) -> BackendResult<bool>;

    /// List instances matching the filter, newest first.
    async fn list(&self, filter: &InstanceFilter) -> BackendResult<Vec<WorkflowInstance>>;
}

/// Open the store selected by configuration.
///
/// A backend that cannot be opened is replaced by an [`UnavailableStore`]
/// so callers keep running without durability.
pub async fn open_store(config: &BackendConfig) -> Arc<dyn InstanceStore> {
    match config.kind {
        BackendKind::Memory => Arc::new(MemoryStore::new()),
        BackendKind::Sqlite => match SqliteDocumentStore::connect(config).await {
            Ok(store) => Arc::new(store),
            Err(err) => {
                tracing::warn!(
                    url = %config.url,
                    error = %err,
                    code = err.code(),
                    "persistence backend unavailable, continuing without durability"
                );
                Arc::new(UnavailableStore::new(err.to_string()))
            }
        },
    }
}

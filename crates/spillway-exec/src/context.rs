//! Execution context.
//!
//! The execution context owns the memory and disk monitors shared by every
//! row container of one query, and hands them out when containers are
//! created.

use std::sync::Arc;

use tracing::debug;

use spillway_common::config::ExecutionConfig;
use spillway_common::{ResourceKind, ResourceMonitor, SpillwayResult};

use crate::rowcontainer::{ContainerResources, ContainerSchema, HashedRowContainer};

/// Shared resources for query execution.
#[derive(Debug)]
pub struct ExecutionContext {
    config: ExecutionConfig,
    memory: Arc<ResourceMonitor>,
    disk: Arc<ResourceMonitor>,
}

impl ExecutionContext {
    /// Validates `config` and creates monitors from its budgets.
    pub fn new(config: ExecutionConfig) -> SpillwayResult<Self> {
        config.validate()?;
        let memory = Arc::new(ResourceMonitor::new(
            "memory",
            ResourceKind::Memory,
            config.memory_budget,
        ));
        let disk = Arc::new(ResourceMonitor::new(
            "disk",
            ResourceKind::Disk,
            config.disk_budget,
        ));
        debug!(
            memory_budget = config.memory_budget,
            disk_budget = config.disk_budget,
            file_backed = config.temp_storage.is_file_backed(),
            "created execution context"
        );
        Ok(Self {
            config,
            memory,
            disk,
        })
    }

    /// Creates a context with the testing configuration.
    pub fn for_testing() -> SpillwayResult<Self> {
        Self::new(ExecutionConfig::for_testing())
    }

    /// Returns the configuration.
    pub fn config(&self) -> &ExecutionConfig {
        &self.config
    }

    /// Returns the shared memory monitor.
    pub fn memory_monitor(&self) -> &Arc<ResourceMonitor> {
        &self.memory
    }

    /// Returns the shared disk monitor.
    pub fn disk_monitor(&self) -> &Arc<ResourceMonitor> {
        &self.disk
    }

    /// Resources handed to a new container.
    pub fn resources(&self) -> ContainerResources {
        ContainerResources::new(Arc::clone(&self.memory), Arc::clone(&self.disk))
            .with_temp_storage(self.config.temp_storage.clone())
            .with_sync_scratch_writes(self.config.sync_scratch_writes)
    }

    /// Creates a container drawing on this context's monitors.
    pub fn create_container(&self, schema: ContainerSchema) -> SpillwayResult<HashedRowContainer> {
        HashedRowContainer::new(schema, self.resources())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ColumnType, Row};
    use spillway_common::config::TempStorageConfig;
    use std::path::PathBuf;

    #[test]
    fn test_new_validates_config() {
        let config = ExecutionConfig::for_testing().with_disk_budget(0);
        assert!(ExecutionContext::new(config).is_err());

        let config = ExecutionConfig::for_testing()
            .with_temp_storage(TempStorageConfig::Directory(PathBuf::new()));
        assert!(ExecutionContext::new(config).is_err());
    }

    #[test]
    fn test_monitors_follow_config() {
        let config = ExecutionConfig::for_testing()
            .with_memory_budget(100)
            .with_disk_budget(200);
        let ctx = ExecutionContext::new(config).unwrap();
        assert_eq!(ctx.memory_monitor().budget(), 100);
        assert_eq!(ctx.disk_monitor().budget(), 200);
        assert_eq!(ctx.config().memory_budget, 100);
    }

    #[test]
    fn test_containers_share_monitors() {
        let ctx = ExecutionContext::for_testing().unwrap();
        let schema = ContainerSchema::new(vec![ColumnType::Int], vec![0]);

        let mut a = ctx.create_container(schema.clone()).unwrap();
        let mut b = ctx.create_container(schema).unwrap();
        a.add_row(&Row::ints(&[1])).unwrap();
        let after_a = ctx.memory_monitor().allocated();
        b.add_row(&Row::ints(&[1])).unwrap();
        assert_eq!(ctx.memory_monitor().allocated(), 2 * after_a);

        drop(a);
        drop(b);
        assert_eq!(ctx.memory_monitor().allocated(), 0);
    }
}

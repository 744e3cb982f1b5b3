//! # monodag: per-resource DAG scheduling of monotasks
//!
//! An intra-process task scheduler for a data-processing executor. A coarse
//! unit of work (a *macrotask*) is decomposed into a DAG of fine-grained
//! *monotasks*, each tagged with a resource kind (compute, network, disk).
//! The DAG scheduler tracks dependencies, routes ready monotasks to
//! per-resource sub-schedulers, propagates failures through the graph, and
//! reports each macrotask's terminal status to an execution backend exactly
//! once.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use monodag::{
//!     DiskReadMonotask, LocalDagScheduler, LoggingBackend, MacrotaskContext,
//!     MemoryBlockStore, MonotaskGraphBuilder, SchedulerConfig,
//! };
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     let store = Arc::new(MemoryBlockStore::new());
//!     store.register_block_file("block-7", "disk-0", "/var/data/disk-0/block-7");
//!
//!     let scheduler =
//!         LocalDagScheduler::local(SchedulerConfig::default(), Arc::new(LoggingBackend))
//!             .unwrap();
//!
//!     let context = Arc::new(MacrotaskContext::new(1));
//!     let read = Arc::new(DiskReadMonotask::new(
//!         1,
//!         context.clone(),
//!         "block-7",
//!         "disk-0",
//!         store,
//!     ));
//!     let graph = MonotaskGraphBuilder::new(context)
//!         .add(read, &[])
//!         .build()
//!         .unwrap();
//!
//!     scheduler.submit_batch(graph);
//!     scheduler
//!         .wait_until_all_monotasks_complete(Duration::from_secs(5))
//!         .await;
//! }
//! ```

// Module declarations
pub mod backend;
pub mod config;
pub mod disk;
pub mod error;
pub mod executor;
pub mod graph;
pub mod model;
pub mod scheduler;

// Re-exports for convenience
pub use backend::{ExecutionBackend, LoggingBackend};
pub use config::{SchedulerConfig, SchedulerConfigBuilder};
pub use disk::{BlockStore, CachedBlock, DiskReadMonotask, MemoryBlockStore, StorageLevel};
pub use error::{DagError, Result};
pub use executor::{LocalSubScheduler, SubScheduler};
pub use graph::{MonotaskGraph, MonotaskGraphBuilder};
pub use model::{
    MacrotaskAttemptId, MacrotaskContext, MacrotaskStatus, Monotask, MonotaskId, ResourceKind,
};
pub use scheduler::LocalDagScheduler;

use std::collections::HashMap;
use std::sync::Arc;

impl LocalDagScheduler {
    /// Assembles a scheduler with one [`LocalSubScheduler`] per resource
    /// kind, sized from the config, and binds them for callbacks.
    pub fn local(
        config: SchedulerConfig,
        backend: Arc<dyn ExecutionBackend>,
    ) -> Result<Arc<Self>> {
        config
            .validate()
            .map_err(DagError::InvalidConfiguration)?;

        let compute = LocalSubScheduler::new(ResourceKind::Compute, config.compute_workers);
        let network = LocalSubScheduler::new(ResourceKind::Network, config.network_workers);
        let disk = LocalSubScheduler::new(ResourceKind::Disk, config.disk_workers);

        let mut sub_schedulers: HashMap<ResourceKind, Arc<dyn SubScheduler>> = HashMap::new();
        sub_schedulers.insert(ResourceKind::Compute, compute.clone());
        sub_schedulers.insert(ResourceKind::Network, network.clone());
        sub_schedulers.insert(ResourceKind::Disk, disk.clone());

        let scheduler = LocalDagScheduler::new(sub_schedulers, backend, &config);
        compute.bind(&scheduler);
        network.bind(&scheduler);
        disk.bind(&scheduler);
        Ok(scheduler)
    }
}

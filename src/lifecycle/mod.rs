//! Post-event artifact lifecycle: skeleton extraction, cloud upload, and
//! clip retention.

pub mod cleanup;
pub mod cloud_sync;
pub mod collector;
pub mod extractor;
pub mod scheduler;
pub mod schema;

pub use cleanup::{CleanupStats, ClipCleanup};
pub use cloud_sync::{CloudSync, GcsStore, ObjectStore, StoreError, SyncStats};
pub use collector::SkeletonCollector;
pub use extractor::SkeletonExtractor;
pub use scheduler::CleanupScheduler;

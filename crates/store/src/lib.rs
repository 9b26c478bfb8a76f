//! # fieldmemo store
//!
//! Persistent, three-bucket answer cache.
//!
//! ## Layout
//!
//! ```text
//! TieredCacheStore
//!     │
//!     ├──> MutationLock (one read-modify-write in flight)
//!     │
//!     └──> CacheRepository
//!            ├─> MemoryRepository
//!            └─> JsonFileRepository (atomic snapshot file)
//!
//! ATOMIC_SINGLE     key -> scalar
//! ATOMIC_MULTI      key -> [unique values]
//! SECTION_REPEATER  section -> [{field: value}, ...]
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use fieldmemo_protocol::FieldDescriptor;
//! use fieldmemo_store::{JsonFileRepository, StoreConfig, TieredCacheStore};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let repo = Arc::new(JsonFileRepository::open("cache.json").await?);
//!     let store = TieredCacheStore::open(repo, StoreConfig::default()).await?;
//!     let field = FieldDescriptor::new("#email").with_label("Email");
//!     store.write(&field, "", serde_json::json!("me@example.com")).await?;
//!     println!("{:?}", store.read(&field, "").await);
//!     Ok(())
//! }
//! ```

mod config;
mod entry;
mod error;
mod lock;
mod repository;
mod section;
mod store;

pub use config::StoreConfig;
pub use entry::{unix_ms_now, Bucket, CacheEntry, CacheMetadata, CacheSnapshot, SNAPSHOT_VERSION};
pub use error::{Result, StoreError};
pub use lock::MutationLock;
pub use repository::{load_snapshot, write_snapshot, CacheRepository, JsonFileRepository, MemoryRepository};
pub use section::{resolve_section_name, EDUCATION, OTHER_SECTION, WORK_EXPERIENCE};
pub use store::{bucket_for, CacheHit, CacheStats, HitSource, SweepReport, TieredCacheStore, WriteOutcome};

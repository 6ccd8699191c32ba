//! OpenML client with a local cache.
//!
//! This crate fetches datasets, tasks and train/test splits from an OpenML
//! server and keeps them in an on-disk cache:
//!
//! - Session handling with on-demand re-authentication
//! - Cache-first resolution; remote fetches are committed atomically
//! - Concurrent batch downloads with per-id failures
//! - Dataset listing and upload (never cached)
//!
//! # Quick Start
//!
//! ```no_run
//! use openml_client::{ClientConfig, EntityResolver};
//!
//! # async fn example() -> openml_client::OpenMlResult<()> {
//! let resolver = EntityResolver::from_config(&ClientConfig::from_env())?;
//!
//! let dataset = resolver.get_dataset(61).await?;
//! println!("{} cached at {}", dataset.descriptor.name, dataset.data_path.display());
//!
//! let task = resolver.get_task(59).await?;
//! if let Some(split) = &task.split {
//!     println!("split of task {} at {}", task.id, split.path.display());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration
//!
//! | Environment Variable | Description |
//! |---------------------|-------------|
//! | `OPENML_SERVER` | API base URL (default: `https://www.openml.org/api/v1`) |
//! | `OPENML_USERNAME` | Account name |
//! | `OPENML_PASSWORD` | Account password |
//! | `OPENML_CACHE_DIR` | Cache root (default: `~/.openml/cache`) |
//! | `OPENML_TIMEOUT` | Request timeout in seconds (default: 60) |
//! | `OPENML_SESSION_BUFFER` | Seconds before expiry a session counts as expired (default: 0) |
//! | `OPENML_MAX_CONCURRENT` | Concurrent downloads in batch operations (default: 4) |
//! | `OPENML_VERIFY_CHECKSUMS` | Verify data files against `md5_checksum` (default: off) |

pub mod auth;
pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod payload;
pub mod resolver;
pub mod transport;

// Re-export main types
pub use auth::{Credentials, Session, SessionManager};
pub use cache::{CacheFile, CacheStore, EntityKind};
pub use client::{ListFilters, MetadataKind, RemoteFetcher, UploadKind, UploadReceipt};
pub use config::{ClientConfig, MAX_SESSION_REFRESH_BUFFER_SECS};
pub use error::{OpenMlError, OpenMlResult};
pub use payload::{
    DatasetDescriptor, DatasetFeatures, DatasetQualities, EntityListEntry, EntityStatus,
    EstimationProcedure, Feature, Quality, TaskDescriptor,
};
pub use resolver::{BatchResult, DatasetArtifact, EntityResolver, ResolveSource, Split, Task};
pub use transport::{ApiResponse, FilePart, RequestParams, ReqwestTransport, Transport};

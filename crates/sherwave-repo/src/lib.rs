//! Sherwave Repository Management
//!
//! - **Repository sync**: refresh every `index.yaml` a plan declares
//! - **Pack acquisition**: resolve `repo/pack` references with semver
//!   constraints, download and verify the archive, extract it per release
//! - **Pack dependencies**: populate a pack's `packs/` directory
//!
//! ```rust,no_run
//! use sherwave_core::RepositoryConfig;
//! use sherwave_repo::{sync_repositories, RepositorySettings};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let repos = vec![RepositoryConfig {
//!     name: "stable".into(),
//!     url: "https://packs.example.com".into(),
//! }];
//! sync_repositories(&repos, &RepositorySettings::new("/tmp/sherwave-cache")).await?;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod http;
pub mod index;
pub mod sync;

pub use error::{RepoError, Result};
pub use http::HttpRepository;
pub use index::{PackEntry, RepositoryIndex};
pub use sync::{fetch_chart, sync_repositories, update_dependencies, RepositorySettings};

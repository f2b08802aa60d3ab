//! Target discovery
//!
//! Discovery is a collaborator seam: the engine only needs `discover()` and
//! accepts an empty result (a plan warning, not an error). An invalid or
//! unreachable location is fatal.

use async_trait::async_trait;
use std::path::PathBuf;
use tokio::fs as afs;

use crate::error::SyncError;
use crate::groups;
use crate::types::Target;

#[async_trait]
pub trait TargetDiscovery: Send + Sync {
	async fn discover(&self) -> Result<Vec<Target>, SyncError>;
}

/// Filesystem-backed discovery
///
/// Each directly-contained subdirectory of the location whose name is a
/// non-negative integer is a target: the name is its ID and the
/// subdirectory is its root.
pub struct DirectoryDiscovery {
	location: PathBuf,
}

impl DirectoryDiscovery {
	pub fn new(location: impl Into<PathBuf>) -> Self {
		DirectoryDiscovery { location: location.into() }
	}

	fn fail(&self, err: impl std::fmt::Display) -> SyncError {
		SyncError::DiscoveryFailed {
			location: self.location.display().to_string(),
			message: err.to_string(),
		}
	}
}

#[async_trait]
impl TargetDiscovery for DirectoryDiscovery {
	async fn discover(&self) -> Result<Vec<Target>, SyncError> {
		let meta = afs::metadata(&self.location).await.map_err(|e| self.fail(e))?;
		if !meta.is_dir() {
			return Err(self.fail("not a directory"));
		}

		let mut targets = Vec::new();
		let mut entries = afs::read_dir(&self.location).await.map_err(|e| self.fail(e))?;
		while let Some(entry) = entries.next_entry().await.map_err(|e| self.fail(e))? {
			let file_type = entry.file_type().await.map_err(|e| self.fail(e))?;
			if !file_type.is_dir() {
				continue;
			}
			let name = entry.file_name().to_string_lossy().to_string();
			if groups::is_literal_id(&name) {
				targets.push(Target {
					label: format!("#{}", name),
					root_path: entry.path(),
					id: name,
				});
			}
		}

		targets.sort_by_key(|t| t.id.parse::<u64>().unwrap_or(u64::MAX));
		Ok(targets)
	}
}


// vim: ts=4

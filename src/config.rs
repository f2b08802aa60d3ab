//! Engine configuration
//!
//! The engine consumes an already-validated configuration object; schema
//! validation beyond the serde types (and cycle checks on the group table,
//! see `groups::find_circular_references`) belongs to the caller.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::SyncError;
use crate::types::SyncRule;

/// Configuration for one sync engine instance
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SyncConfig {
	/// Root of the local source tree the rules are expanded against
	pub source_root: PathBuf,

	/// Declarative mapping rules, applied in order
	pub rules: Vec<SyncRule>,

	/// Named target groups; members are target IDs or other group names
	pub target_groups: BTreeMap<String, Vec<String>>,

	pub advanced: AdvancedOptions,
}

impl Default for SyncConfig {
	fn default() -> Self {
		SyncConfig {
			source_root: PathBuf::from("."),
			rules: vec![],
			target_groups: BTreeMap::new(),
			advanced: AdvancedOptions::default(),
		}
	}
}

impl SyncConfig {
	/// Read a configuration file (JSON)
	pub fn load(path: &Path) -> Result<SyncConfig, SyncError> {
		let contents = std::fs::read_to_string(path).map_err(|e| SyncError::InvalidConfig {
			message: format!("cannot read {}: {}", path.display(), e),
		})?;
		serde_json::from_str(&contents).map_err(|e| SyncError::InvalidConfig {
			message: format!("cannot parse {}: {}", path.display(), e),
		})
	}
}

/// Tuning knobs with sensible defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AdvancedOptions {
	/// How long a built plan may be reused from the cache
	pub cache_ttl_ms: u64,

	/// Quiet period after the last detected change before a sync cycle runs
	pub debounce_ms: u64,
}

impl Default for AdvancedOptions {
	fn default() -> Self {
		AdvancedOptions { cache_ttl_ms: 30_000, debounce_ms: 500 }
	}
}


// vim: ts=4

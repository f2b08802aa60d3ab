//! File transfer engine
//!
//! Copies resolved files beneath one target root. Every destination is
//! checked for containment before any I/O: the normalized relative path
//! must not begin with a parent-directory component or be absolute. A batch
//! of N files always attempts all N; individual failures are recorded and
//! never abort the batch.

use std::io;
use std::path::{Path, PathBuf};
use tokio::fs as afs;

use crate::error::TransferErrorKind;
use crate::logging::warn;
use crate::paths;
use crate::types::{ResolvedFileRule, TargetKind, TargetSummary, TransferResult};

/// Per-target result of one `copy_all` batch
#[derive(Debug, Default)]
pub struct TransferOutcome {
	pub succeeded: Vec<TransferResult>,
	pub failed: Vec<TransferResult>,
	pub errors: Vec<String>,
}

impl TransferOutcome {
	pub fn into_summary(self, target_id: &str) -> TargetSummary {
		TargetSummary {
			target_id: target_id.to_string(),
			files_succeeded: self.succeeded.len(),
			files_failed: self.failed.len(),
			results: self.succeeded.into_iter().chain(self.failed).collect(),
		}
	}
}

/// Compute the normalized destination path relative to the target root
///
/// A file-kind destination is used verbatim, permitting rename-on-copy. A
/// directory-kind destination receives the source basename, or the whole
/// source-root-relative path when the rule preserves structure (recursive
/// glob with `flatten` off).
pub fn destination_relative(rule: &ResolvedFileRule) -> PathBuf {
	let base = paths::normalize_relative(&rule.target.path);
	let dest = match rule.target.kind {
		TargetKind::File => base,
		TargetKind::Directory => {
			if !rule.flatten && rule.recursive_glob {
				base.join(&rule.source_relative_path)
			} else {
				match rule.source_absolute_path.file_name() {
					Some(name) => base.join(name),
					None => base,
				}
			}
		}
	};
	paths::normalize_relative(&paths::to_unix_string(&dest))
}

/// Copy every resolved file beneath `target_root`
pub async fn copy_all(rules: &[ResolvedFileRule], target_root: &Path) -> TransferOutcome {
	let mut outcome = TransferOutcome::default();

	for rule in rules {
		let dest = destination_relative(rule);
		match copy_one(rule, &dest, target_root).await {
			Ok(()) => outcome.succeeded.push(TransferResult {
				source_path: paths::to_unix_string(&rule.source_relative_path),
				target_path: paths::to_unix_string(&dest),
				success: true,
				error: None,
			}),
			Err(kind) => {
				let message =
					format!("{}: {}", paths::to_unix_string(&rule.source_relative_path), kind);
				warn!("transfer failed under {}: {}", target_root.display(), message);
				outcome.errors.push(message);
				outcome.failed.push(TransferResult {
					source_path: paths::to_unix_string(&rule.source_relative_path),
					target_path: paths::to_unix_string(&dest),
					success: false,
					error: Some(kind.to_string()),
				});
			}
		}
	}

	outcome
}

async fn copy_one(
	rule: &ResolvedFileRule,
	dest: &Path,
	target_root: &Path,
) -> Result<(), TransferErrorKind> {
	// Containment check before any I/O. `dest` is already normalized, so
	// any surviving `..` is leading and means escape.
	if paths::escapes_root(dest) {
		return Err(TransferErrorKind::SecurityViolation { path: paths::to_unix_string(dest) });
	}

	let dest_abs = target_root.join(dest);

	if let Some(parent) = dest_abs.parent() {
		match afs::metadata(parent).await {
			Ok(meta) if !meta.is_dir() => {
				return Err(TransferErrorKind::DirectoryConflict {
					path: paths::to_unix_string(parent),
				});
			}
			Ok(_) => {}
			Err(_) => {
				if let Err(err) = afs::create_dir_all(parent).await {
					return Err(match err.kind() {
						io::ErrorKind::AlreadyExists | io::ErrorKind::NotADirectory => {
							TransferErrorKind::DirectoryConflict {
								path: paths::to_unix_string(parent),
							}
						}
						_ => TransferErrorKind::from_io(&err),
					});
				}
			}
		}
	}

	afs::copy(&rule.source_absolute_path, &dest_abs)
		.await
		.map_err(|e| TransferErrorKind::from_io(&e))?;

	// Full overwrite semantics: verify we actually produced a regular file.
	let meta = afs::metadata(&dest_abs).await.map_err(|e| TransferErrorKind::from_io(&e))?;
	if !meta.is_file() {
		return Err(TransferErrorKind::Other {
			message: format!("{} is not a regular file after copy", paths::to_unix_string(dest)),
		});
	}

	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::types::TargetSpec;

	fn rule(
		src_rel: &str,
		flatten: bool,
		recursive_glob: bool,
		kind: TargetKind,
		target_path: &str,
	) -> ResolvedFileRule {
		ResolvedFileRule {
			source_absolute_path: PathBuf::from("/src").join(src_rel),
			source_relative_path: PathBuf::from(src_rel),
			flatten,
			recursive_glob,
			target: TargetSpec { kind, path: target_path.to_string() },
			target_ids: vec!["1".to_string()],
		}
	}

	#[test]
	fn test_destination_directory_flat() {
		let r = rule("a/b/c.lua", true, true, TargetKind::Directory, "/all/");
		assert_eq!(destination_relative(&r), PathBuf::from("all/c.lua"));
	}

	#[test]
	fn test_destination_directory_preserves_structure() {
		let r = rule("a/b/c.lua", false, true, TargetKind::Directory, "/all/");
		assert_eq!(destination_relative(&r), PathBuf::from("all/a/b/c.lua"));
	}

	#[test]
	fn test_destination_non_recursive_glob_is_flat() {
		// without a recursive glob there is no structure to preserve
		let r = rule("c.lua", false, false, TargetKind::Directory, "lib");
		assert_eq!(destination_relative(&r), PathBuf::from("lib/c.lua"));
	}

	#[test]
	fn test_destination_file_kind_renames() {
		let r = rule("startup.lua", false, false, TargetKind::File, "boot/init.lua");
		assert_eq!(destination_relative(&r), PathBuf::from("boot/init.lua"));
	}

	#[test]
	fn test_destination_traversal_survives_normalization() {
		let r = rule("c.lua", true, false, TargetKind::File, "folder/../../../evil.lua");
		let dest = destination_relative(&r);
		assert!(paths::escapes_root(&dest));
	}
}

// vim: ts=4

//! Sync plan building
//!
//! Resolves declarative rules against the source tree and the discovered
//! target set into an immutable plan. Recoverable problems become issues on
//! the plan instead of errors; a plan containing any error-severity issue
//! is returned anyway, marked invalid, so the caller can report why.

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::groups;
use crate::logging::debug;
use crate::paths;
use crate::transfer;
use crate::types::{
	IssueCategory, IssueSeverity, PlanIssue, ResolvedFileRule, SyncPlan, SyncRule, Target,
	TargetKind, TargetSpec,
};

/// Build a plan for one cycle
///
/// With a `changed` set (watch mode), each rule's matches are intersected
/// against it by normalized relative path; an empty intersection is a
/// warning, not an error.
pub fn build_plan(
	source_root: &Path,
	rules: &[SyncRule],
	groups: &BTreeMap<String, Vec<String>>,
	available_targets: &[Target],
	changed: Option<&BTreeSet<PathBuf>>,
) -> SyncPlan {
	let mut issues: Vec<PlanIssue> = Vec::new();
	let mut resolved: Vec<ResolvedFileRule> = Vec::new();
	let mut missing: BTreeSet<String> = BTreeSet::new();
	let available_ids: BTreeSet<&str> = available_targets.iter().map(|t| t.id.as_str()).collect();

	if !source_root.is_dir() {
		issues.push(PlanIssue::error(
			IssueCategory::SourceLocation,
			format!("Source root {} is not a directory", source_root.display()),
		));
	}
	if available_targets.is_empty() {
		issues.push(
			PlanIssue::warning(IssueCategory::Target, "No targets discovered".to_string())
				.with_suggestion(
					"Create one numeric subdirectory per target beneath the target location"
						.to_string(),
				),
		);
	}

	for rule in rules {
		let files = match expand_glob(source_root, rule, changed, &mut issues) {
			Some(files) => files,
			None => continue,
		};

		let refs = rule.target_refs.to_vec();
		let (ids, errors) = groups::resolve_refs(&refs, groups);
		let severity =
			if ids.is_empty() { IssueSeverity::Error } else { IssueSeverity::Warning };
		for error in errors {
			issues.push(PlanIssue { category: IssueCategory::Rule, severity, message: error, suggestion: None });
		}
		if ids.is_empty() {
			issues.push(PlanIssue::error(
				IssueCategory::Rule,
				format!("Rule '{}' resolves to no target IDs", rule.source_glob),
			));
			continue;
		}

		// Missing IDs do not block file resolution; the files stay tagged
		// with them so a later cycle can pick the target up when it appears.
		for id in &ids {
			if !available_ids.contains(id.as_str()) {
				missing.insert(id.clone());
			}
		}

		let target = TargetSpec {
			kind: if paths::looks_like_directory(&rule.target_path) {
				TargetKind::Directory
			} else {
				TargetKind::File
			},
			path: rule.target_path.clone(),
		};
		let recursive_glob = rule.source_glob.contains("**");
		let target_ids: Vec<String> = ids.into_iter().collect();

		for absolute in files {
			let relative = match paths::relative_to(&absolute, source_root) {
				Some(rel) => rel,
				None => continue,
			};
			resolved.push(ResolvedFileRule {
				source_absolute_path: absolute,
				source_relative_path: relative,
				flatten: rule.flatten,
				recursive_glob,
				target: target.clone(),
				target_ids: target_ids.clone(),
			});
		}
	}

	detect_duplicate_destinations(&resolved, &mut issues);

	if !resolved.is_empty() {
		let any_available = resolved
			.iter()
			.any(|r| r.target_ids.iter().any(|id| available_ids.contains(id.as_str())));
		if !any_available {
			issues.push(PlanIssue::error(
				IssueCategory::Target,
				"No resolved target is currently available".to_string(),
			));
		}
	}
	if !missing.is_empty() {
		issues.push(PlanIssue::warning(
			IssueCategory::Target,
			format!(
				"Target IDs not currently discovered: {}",
				missing.iter().cloned().collect::<Vec<_>>().join(", ")
			),
		));
	}

	let is_valid = !issues.iter().any(|i| i.severity == IssueSeverity::Error);
	SyncPlan {
		resolved_file_rules: resolved,
		available_targets: available_targets.to_vec(),
		missing_target_ids: missing.into_iter().collect(),
		issues,
		is_valid,
		created_at: SystemTime::now(),
	}
}

/// Expand one rule's glob to concrete files, honoring the changed-set
/// restriction. Returns `None` when the rule should be skipped.
fn expand_glob(
	source_root: &Path,
	rule: &SyncRule,
	changed: Option<&BTreeSet<PathBuf>>,
	issues: &mut Vec<PlanIssue>,
) -> Option<Vec<PathBuf>> {
	let pattern = source_root.join(&rule.source_glob);
	let entries = match glob::glob(&pattern.to_string_lossy()) {
		Ok(entries) => entries,
		Err(err) => {
			issues.push(PlanIssue::error(
				IssueCategory::Rule,
				format!("Invalid glob pattern '{}': {}", rule.source_glob, err),
			));
			return None;
		}
	};

	let mut files: Vec<PathBuf> = Vec::new();
	for entry in entries {
		match entry {
			Ok(path) => {
				if path.is_file() {
					files.push(path);
				}
			}
			Err(err) => debug!("skipping unreadable glob match: {}", err),
		}
	}

	if let Some(changed) = changed {
		files.retain(|absolute| match paths::relative_to(absolute, source_root) {
			Some(rel) => {
				changed.contains(&paths::normalize_relative(&paths::to_unix_string(&rel)))
			}
			None => false,
		});
	}

	if files.is_empty() {
		issues.push(PlanIssue::warning(
			IssueCategory::Rule,
			format!("No matching files for pattern '{}'", rule.source_glob),
		));
		return None;
	}

	Some(files)
}

/// Flag resolved rules that write the identical final path on the same
/// target. Last write wins; this is a warning, never an error.
fn detect_duplicate_destinations(resolved: &[ResolvedFileRule], issues: &mut Vec<PlanIssue>) {
	let mut seen: BTreeMap<(String, PathBuf), String> = BTreeMap::new();

	for rule in resolved {
		let dest = transfer::destination_relative(rule);
		let source = paths::to_unix_string(&rule.source_relative_path);
		for id in &rule.target_ids {
			match seen.entry((id.clone(), dest.clone())) {
				Entry::Occupied(first) => issues.push(PlanIssue::warning(
					IssueCategory::Rule,
					format!(
						"Both {} and {} resolve to {} on target {}; the last write wins",
						first.get(),
						source,
						dest.display(),
						id
					),
				)),
				Entry::Vacant(slot) => {
					slot.insert(source.clone());
				}
			}
		}
	}
}


// vim: ts=4

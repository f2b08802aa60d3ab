//! Core data model shared by planning, transfer and orchestration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::SystemTime;
use uuid::Uuid;

/// A discovered sync destination, identified by a stable numeric ID
///
/// Targets are re-discovered every cycle; two discovery calls may return
/// different sets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
	pub id: String,
	pub root_path: PathBuf,
	pub label: String,
}

/// Target references of one rule: a single token or a list of tokens
///
/// Each token is either a literal numeric target ID or the name of a
/// target group.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TargetRefs {
	One(String),
	Many(Vec<String>),
}

impl TargetRefs {
	pub fn to_vec(&self) -> Vec<String> {
		match self {
			TargetRefs::One(token) => vec![token.clone()],
			TargetRefs::Many(tokens) => tokens.clone(),
		}
	}
}

impl Default for TargetRefs {
	fn default() -> Self {
		TargetRefs::Many(Vec::new())
	}
}

/// One declarative mapping rule from the configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRule {
	/// Glob pattern expanded against the source root
	pub source_glob: String,

	/// Destination path beneath each target root
	pub target_path: String,

	/// Literal target IDs and/or group names
	#[serde(default)]
	pub target_refs: TargetRefs,

	/// Collapse source directory structure into the destination directory
	#[serde(default)]
	pub flatten: bool,
}

/// Whether a rule's destination names a file or a directory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetKind {
	File,
	Directory,
}

/// Destination of a resolved rule: kind plus the raw configured path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetSpec {
	pub kind: TargetKind,
	pub path: String,
}

/// One concrete file-to-destination mapping produced by plan building
///
/// A single source file appears in multiple resolved rules when multiple
/// rules match it.
#[derive(Debug, Clone)]
pub struct ResolvedFileRule {
	pub source_absolute_path: PathBuf,
	pub source_relative_path: PathBuf,
	pub flatten: bool,
	/// The originating glob contained a `**` component
	pub recursive_glob: bool,
	pub target: TargetSpec,
	pub target_ids: Vec<String>,
}

/// Issue category for plan diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum IssueCategory {
	Rule,
	Target,
	SourceLocation,
	Other,
}

/// Issue severity; any `Error` issue invalidates the plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum IssueSeverity {
	Error,
	Warning,
}

/// A diagnostic attached to a sync plan
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanIssue {
	pub category: IssueCategory,
	pub severity: IssueSeverity,
	pub message: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub suggestion: Option<String>,
}

impl PlanIssue {
	pub fn error(category: IssueCategory, message: String) -> Self {
		PlanIssue { category, severity: IssueSeverity::Error, message, suggestion: None }
	}

	pub fn warning(category: IssueCategory, message: String) -> Self {
		PlanIssue { category, severity: IssueSeverity::Warning, message, suggestion: None }
	}

	pub fn with_suggestion(mut self, suggestion: String) -> Self {
		self.suggestion = Some(suggestion);
		self
	}
}

/// The resolved, validated set of copy operations for one cycle
///
/// Immutable once built; a new plan is built rather than mutating an old
/// one, which is what makes plans safely cacheable.
#[derive(Debug, Clone)]
pub struct SyncPlan {
	pub resolved_file_rules: Vec<ResolvedFileRule>,
	pub available_targets: Vec<Target>,
	pub missing_target_ids: Vec<String>,
	pub issues: Vec<PlanIssue>,
	pub is_valid: bool,
	pub created_at: SystemTime,
}

/// Result of copying one file to one target
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferResult {
	pub source_path: String,
	pub target_path: String,
	pub success: bool,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub error: Option<String>,
}

/// Per-target transfer counts and results for one cycle
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetSummary {
	pub target_id: String,
	pub files_succeeded: usize,
	pub files_failed: usize,
	pub results: Vec<TransferResult>,
}

/// Overall outcome classification of one sync cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SummaryStatus {
	Success,
	Warning,
	Error,
}

/// The terminal artifact of one sync cycle, handed to the reporting sink
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationSummary {
	pub cycle_id: Uuid,
	pub status: SummaryStatus,
	pub files_attempted: usize,
	pub files_succeeded: usize,
	pub files_failed: usize,
	pub targets_full: usize,
	pub targets_partial: usize,
	pub targets_failed: usize,
	pub missing_targets: usize,
	pub per_target: Vec<TargetSummary>,
	pub issues: Vec<PlanIssue>,
}

impl OperationSummary {
	/// Aggregate per-target results and plan diagnostics into one summary
	pub fn aggregate(
		issues: Vec<PlanIssue>,
		per_target: Vec<TargetSummary>,
		missing_targets: usize,
		plan_valid: bool,
	) -> Self {
		let files_succeeded: usize = per_target.iter().map(|t| t.files_succeeded).sum();
		let files_failed: usize = per_target.iter().map(|t| t.files_failed).sum();
		let targets_full =
			per_target.iter().filter(|t| t.files_failed == 0 && t.files_succeeded > 0).count();
		let targets_partial =
			per_target.iter().filter(|t| t.files_failed > 0 && t.files_succeeded > 0).count();
		let targets_failed =
			per_target.iter().filter(|t| t.files_failed > 0 && t.files_succeeded == 0).count();

		let has_error = !plan_valid || issues.iter().any(|i| i.severity == IssueSeverity::Error);
		let has_warning = missing_targets > 0
			|| files_failed > 0
			|| issues.iter().any(|i| i.severity == IssueSeverity::Warning);
		let status = if has_error {
			SummaryStatus::Error
		} else if has_warning {
			SummaryStatus::Warning
		} else {
			SummaryStatus::Success
		};

		OperationSummary {
			cycle_id: Uuid::new_v4(),
			status,
			files_attempted: files_succeeded + files_failed,
			files_succeeded,
			files_failed,
			targets_full,
			targets_partial,
			targets_failed,
			missing_targets,
			per_target,
			issues,
		}
	}
}

/// Engine lifecycle state
///
/// `Error` is terminal-equivalent: it forces a stop and is distinguishable
/// from a clean `Stopped` for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
	Idle,
	Starting,
	Running,
	Stopping,
	Stopped,
	Error,
}


// vim: ts=4

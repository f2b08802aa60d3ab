//! Watch-mode change coordination
//!
//! `ChangeCoordinator` owns the debounce deadline and the pending/active
//! change sets. All mutation happens on the watch controller's single task,
//! so the pending-to-active move is one `mem::take` swap: a change event
//! arriving in the same tick lands in the next set, never lost and never
//! double-counted. If this ever moves to a multi-threaded runtime the swap
//! must become an atomic exchange behind a lock.

use globset::{Glob, GlobSet, GlobSetBuilder};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::BTreeSet;
use std::mem;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::error::SyncError;
use crate::logging::warn;
use crate::paths;
use crate::types::SyncRule;

/// Debounce and change-set state machine for watch mode
///
/// A path lives in exactly one of {pending, active} at any instant, or in
/// neither once a cycle completes.
pub struct ChangeCoordinator {
	watched_files: BTreeSet<PathBuf>,
	pending_changes: BTreeSet<PathBuf>,
	active_changes: BTreeSet<PathBuf>,
	sync_in_progress: bool,
	debounce: Duration,
	deadline: Option<Instant>,
}

impl ChangeCoordinator {
	pub fn new(debounce: Duration) -> Self {
		ChangeCoordinator {
			watched_files: BTreeSet::new(),
			pending_changes: BTreeSet::new(),
			active_changes: BTreeSet::new(),
			sync_in_progress: false,
			debounce,
			deadline: None,
		}
	}

	/// Remember a source file that belongs to the current plan
	pub fn track(&mut self, path: PathBuf) {
		self.watched_files.insert(path);
	}

	pub fn is_watched(&self, path: &Path) -> bool {
		self.watched_files.contains(path)
	}

	/// Record a change; returns true when the debounce timer was (re)armed
	///
	/// While a sync is in flight the timer is left alone: the post-cycle
	/// step discovers accumulated pending changes instead.
	pub fn note_change(&mut self, path: PathBuf) -> bool {
		self.pending_changes.insert(path);
		if self.sync_in_progress {
			return false;
		}
		self.deadline = Some(Instant::now() + self.debounce);
		true
	}

	/// Record a removal; returns true when the path was watched
	pub fn note_removed(&mut self, path: &Path) -> bool {
		self.watched_files.remove(path)
	}

	/// Move all pending changes into the active set and start a cycle
	///
	/// Only legal when no sync is in progress, which the deadline
	/// invariant guarantees: a deadline is never armed while one runs.
	pub fn begin_cycle(&mut self) -> BTreeSet<PathBuf> {
		debug_assert!(!self.sync_in_progress);
		self.deadline = None;
		self.sync_in_progress = true;
		self.active_changes = mem::take(&mut self.pending_changes);
		self.active_changes.clone()
	}

	/// Reset after a completed cycle; returns true when pending changes
	/// accumulated mid-cycle and a fresh debounce window was armed
	pub fn finish_cycle(&mut self) -> bool {
		self.active_changes.clear();
		self.sync_in_progress = false;
		if self.pending_changes.is_empty() {
			return false;
		}
		self.deadline = Some(Instant::now() + self.debounce);
		true
	}

	/// Reset after a fatal cycle; state is restored exactly as on success
	/// but no follow-up window is armed
	pub fn abort_cycle(&mut self) {
		self.active_changes.clear();
		self.sync_in_progress = false;
	}

	pub fn clear_deadline(&mut self) {
		self.deadline = None;
	}

	pub fn deadline(&self) -> Option<Instant> {
		self.deadline
	}

	pub fn sync_in_progress(&self) -> bool {
		self.sync_in_progress
	}

	pub fn pending(&self) -> &BTreeSet<PathBuf> {
		&self.pending_changes
	}

	pub fn active(&self) -> &BTreeSet<PathBuf> {
		&self.active_changes
	}
}

/// A filesystem change reduced to what the coordinator cares about,
/// with the path normalized relative to the source root
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FsChange {
	Modified(PathBuf),
	Removed(PathBuf),
}

/// Map a raw watcher event onto coordinator-relevant changes
pub fn classify_event(event: &notify::Event, source_root: &Path) -> Vec<FsChange> {
	let mut changes = Vec::new();

	for path in &event.paths {
		let relative = match paths::relative_to(path, source_root) {
			Some(rel) => rel,
			None => continue,
		};
		let relative = paths::normalize_relative(&paths::to_unix_string(&relative));

		match event.kind {
			notify::EventKind::Remove(_) => changes.push(FsChange::Removed(relative)),
			notify::EventKind::Modify(notify::event::ModifyKind::Name(_)) => {
				// a rename reports the old name as gone and the new one
				// as a fresh file
				if path.exists() {
					changes.push(FsChange::Modified(relative));
				} else {
					changes.push(FsChange::Removed(relative));
				}
			}
			notify::EventKind::Create(_) | notify::EventKind::Modify(_) => {
				changes.push(FsChange::Modified(relative));
			}
			_ => {}
		}
	}

	changes
}

/// Start the backend watcher on the source root
///
/// Raw events are forwarded into a tokio channel from notify's thread;
/// dropping the returned watcher tears the subscription down.
pub fn spawn_watcher(
	source_root: &Path,
) -> Result<(RecommendedWatcher, mpsc::UnboundedReceiver<notify::Event>), SyncError> {
	let (tx, rx) = mpsc::unbounded_channel();

	let mut watcher =
		notify::recommended_watcher(move |result: Result<notify::Event, notify::Error>| {
			match result {
				Ok(event) => {
					let _ = tx.send(event);
				}
				Err(err) => warn!("watcher backend error: {}", err),
			}
		})
		.map_err(|e| SyncError::WatcherFailed { message: e.to_string() })?;

	watcher
		.watch(source_root, RecursiveMode::Recursive)
		.map_err(|e| SyncError::WatcherFailed { message: e.to_string() })?;

	Ok((watcher, rx))
}

/// Compile the rule globs into one matcher for filtering watch events
///
/// Patterns that do not compile are skipped here; plan building reports
/// them as issues.
pub fn rule_matcher(rules: &[SyncRule]) -> GlobSet {
	let mut builder = GlobSetBuilder::new();
	for rule in rules {
		match Glob::new(&paths::normalize_separators(&rule.source_glob)) {
			Ok(glob) => {
				builder.add(glob);
			}
			Err(err) => warn!("ignoring unmatchable pattern '{}': {}", rule.source_glob, err),
		}
	}
	builder.build().unwrap_or_else(|_| GlobSet::empty())
}

#[cfg(test)]
mod tests {
	use super::*;

	fn coordinator() -> ChangeCoordinator {
		ChangeCoordinator::new(Duration::from_millis(100))
	}

	#[test]
	fn test_changes_coalesce_into_one_snapshot() {
		let mut c = coordinator();
		assert!(c.note_change(PathBuf::from("a.lua")));
		assert!(c.note_change(PathBuf::from("b.lua")));
		assert!(c.note_change(PathBuf::from("c.lua")));
		assert!(c.deadline().is_some());

		let active = c.begin_cycle();
		assert_eq!(active.len(), 3);
		assert!(c.pending().is_empty());
		assert!(c.deadline().is_none());
		assert!(c.sync_in_progress());
	}

	#[test]
	fn test_change_during_cycle_lands_in_pending() {
		let mut c = coordinator();
		c.note_change(PathBuf::from("a.lua"));
		let _active = c.begin_cycle();

		// arrives while the cycle is in flight: no timer, next set
		assert!(!c.note_change(PathBuf::from("b.lua")));
		assert!(c.deadline().is_none());
		assert!(c.pending().contains(&PathBuf::from("b.lua")));
		assert!(!c.active().contains(&PathBuf::from("b.lua")));

		// post-cycle discovers it and arms exactly one follow-up window
		assert!(c.finish_cycle());
		assert!(c.deadline().is_some());
		assert!(!c.sync_in_progress());

		let next = c.begin_cycle();
		assert_eq!(next.into_iter().collect::<Vec<_>>(), vec![PathBuf::from("b.lua")]);
	}

	#[test]
	fn test_finish_cycle_without_pending_stays_idle() {
		let mut c = coordinator();
		c.note_change(PathBuf::from("a.lua"));
		c.begin_cycle();
		assert!(!c.finish_cycle());
		assert!(c.deadline().is_none());
		assert!(c.active().is_empty());
	}

	#[test]
	fn test_abort_cycle_resets_without_rearming() {
		let mut c = coordinator();
		c.note_change(PathBuf::from("a.lua"));
		c.begin_cycle();
		c.note_change(PathBuf::from("b.lua"));

		c.abort_cycle();
		assert!(!c.sync_in_progress());
		assert!(c.active().is_empty());
		// the pending change survives the reset but no window is armed
		assert!(c.pending().contains(&PathBuf::from("b.lua")));
		assert!(c.deadline().is_none());
	}

	#[test]
	fn test_note_removed_only_for_watched() {
		let mut c = coordinator();
		c.track(PathBuf::from("a.lua"));
		assert!(c.note_removed(Path::new("a.lua")));
		assert!(!c.note_removed(Path::new("a.lua")));
		assert!(!c.note_removed(Path::new("other.lua")));
	}

	#[test]
	fn test_classify_event_modify() {
		let event = notify::Event::new(notify::EventKind::Modify(
			notify::event::ModifyKind::Data(notify::event::DataChange::Content),
		))
		.add_path(PathBuf::from("/src/lib/a.lua"));

		let changes = classify_event(&event, Path::new("/src"));
		assert_eq!(changes, vec![FsChange::Modified(PathBuf::from("lib/a.lua"))]);
	}

	#[test]
	fn test_classify_event_remove() {
		let event = notify::Event::new(notify::EventKind::Remove(
			notify::event::RemoveKind::File,
		))
		.add_path(PathBuf::from("/src/a.lua"));

		let changes = classify_event(&event, Path::new("/src"));
		assert_eq!(changes, vec![FsChange::Removed(PathBuf::from("a.lua"))]);
	}

	#[test]
	fn test_classify_event_outside_root_ignored() {
		let event = notify::Event::new(notify::EventKind::Create(
			notify::event::CreateKind::File,
		))
		.add_path(PathBuf::from("/elsewhere/a.lua"));

		assert!(classify_event(&event, Path::new("/src")).is_empty());
	}

	#[test]
	fn test_rule_matcher_matches_rule_globs() {
		let rules = vec![crate::types::SyncRule {
			source_glob: "**/*.lua".to_string(),
			target_path: "/".to_string(),
			target_refs: crate::types::TargetRefs::One("1".to_string()),
			flatten: false,
		}];
		let matcher = rule_matcher(&rules);
		assert!(matcher.is_match("lib/a.lua"));
		assert!(!matcher.is_match("README.md"));
	}
}

// vim: ts=4

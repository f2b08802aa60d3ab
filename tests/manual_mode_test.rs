use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::timeout;

use deployr::types::TargetRefs;
use deployr::{
	DirectoryDiscovery, EngineState, OperationSummary, SummaryStatus, SyncConfig, SyncEvent,
	SyncManager, SyncRule,
};

fn write_file(root: &Path, rel: &str, contents: &str) {
	let path = root.join(rel);
	if let Some(parent) = path.parent() {
		fs::create_dir_all(parent).unwrap();
	}
	fs::write(path, contents).unwrap();
}

fn config(source: &Path, rules: Vec<SyncRule>, groups: &[(&str, &[&str])]) -> SyncConfig {
	let mut config = SyncConfig::default();
	config.source_root = source.to_path_buf();
	config.rules = rules;
	config.target_groups = groups
		.iter()
		.map(|(name, members)| {
			(name.to_string(), members.iter().map(|m| m.to_string()).collect())
		})
		.collect::<BTreeMap<_, _>>();
	config
}

fn rule(glob: &str, target_path: &str, refs: &[&str]) -> SyncRule {
	SyncRule {
		source_glob: glob.to_string(),
		target_path: target_path.to_string(),
		target_refs: TargetRefs::Many(refs.iter().map(|r| r.to_string()).collect()),
		flatten: false,
	}
}

async fn next_event(events: &mut UnboundedReceiver<SyncEvent>) -> SyncEvent {
	timeout(Duration::from_secs(10), events.recv())
		.await
		.expect("timed out waiting for event")
		.expect("event channel closed")
}

async fn next_summary(events: &mut UnboundedReceiver<SyncEvent>) -> OperationSummary {
	loop {
		if let SyncEvent::SyncComplete(summary) = next_event(events).await {
			return summary;
		}
	}
}

#[tokio::test]
async fn test_manual_cycle_event_sequence_and_copy() {
	let source = TempDir::new().unwrap();
	let targets = TempDir::new().unwrap();
	write_file(source.path(), "startup.lua", "print('hi')");
	fs::create_dir(targets.path().join("1")).unwrap();
	fs::create_dir(targets.path().join("2")).unwrap();

	let config = config(
		source.path(),
		vec![rule("*.lua", "/", &["all"])],
		&[("all", &["1", "2"])],
	);
	let mut manager = SyncManager::new(config, Arc::new(DirectoryDiscovery::new(targets.path())));
	let (mut controller, mut events) = manager.init_manual_mode().unwrap();
	controller.start().unwrap();

	assert!(matches!(next_event(&mut events).await, SyncEvent::RunStarted));
	match next_event(&mut events).await {
		SyncEvent::SyncPlanned(plan) => {
			assert!(plan.is_valid);
			assert_eq!(plan.resolved_file_rules.len(), 1);
		}
		other => panic!("expected SyncPlanned, got {:?}", other),
	}
	assert!(matches!(next_event(&mut events).await, SyncEvent::SyncStarted));

	let summary = next_summary(&mut events).await;
	assert_eq!(summary.status, SummaryStatus::Success);
	assert_eq!(summary.files_attempted, 2);
	assert_eq!(summary.files_succeeded, 2);
	assert_eq!(summary.targets_full, 2);
	assert_eq!(
		fs::read_to_string(targets.path().join("1/startup.lua")).unwrap(),
		"print('hi')"
	);
	assert_eq!(
		fs::read_to_string(targets.path().join("2/startup.lua")).unwrap(),
		"print('hi')"
	);

	assert!(manager.is_running());
	controller.stop().await;
	assert!(matches!(
		next_event(&mut events).await,
		SyncEvent::ControllerStopped(EngineState::Stopped)
	));
	assert_eq!(manager.state(), EngineState::Stopped);
}

#[tokio::test]
async fn test_missing_target_degrades_to_warning() {
	let source = TempDir::new().unwrap();
	let targets = TempDir::new().unwrap();
	write_file(source.path(), "a.lua", "a");
	fs::create_dir(targets.path().join("1")).unwrap();

	let config = config(source.path(), vec![rule("*.lua", "/", &["1", "999"])], &[]);
	let mut manager = SyncManager::new(config, Arc::new(DirectoryDiscovery::new(targets.path())));
	let (mut controller, mut events) = manager.init_manual_mode().unwrap();
	controller.start().unwrap();

	let summary = next_summary(&mut events).await;
	assert_eq!(summary.status, SummaryStatus::Warning);
	assert_eq!(summary.missing_targets, 1);
	assert_eq!(summary.targets_full, 1);
	assert_eq!(summary.files_failed, 0);
	assert!(targets.path().join("1/a.lua").exists());

	controller.stop().await;
}

#[tokio::test]
async fn test_advance_runs_next_cycle() {
	let source = TempDir::new().unwrap();
	let targets = TempDir::new().unwrap();
	write_file(source.path(), "a.lua", "v1");
	fs::create_dir(targets.path().join("1")).unwrap();

	let config = config(source.path(), vec![rule("*.lua", "/", &["1"])], &[]);
	let mut manager = SyncManager::new(config, Arc::new(DirectoryDiscovery::new(targets.path())));
	let (mut controller, mut events) = manager.init_manual_mode().unwrap();
	controller.start().unwrap();

	let first = next_summary(&mut events).await;
	assert_eq!(first.files_succeeded, 1);

	write_file(source.path(), "a.lua", "v2");
	controller.advance();
	let second = next_summary(&mut events).await;
	assert_eq!(second.files_succeeded, 1);
	assert_ne!(first.cycle_id, second.cycle_id);
	assert_eq!(fs::read_to_string(targets.path().join("1/a.lua")).unwrap(), "v2");

	controller.stop().await;
}

#[tokio::test]
async fn test_target_appearing_between_cycles_is_picked_up() {
	let source = TempDir::new().unwrap();
	let targets = TempDir::new().unwrap();
	write_file(source.path(), "a.lua", "a");
	fs::create_dir(targets.path().join("1")).unwrap();

	let config = config(source.path(), vec![rule("*.lua", "/", &["1", "2"])], &[]);
	let mut manager = SyncManager::new(config, Arc::new(DirectoryDiscovery::new(targets.path())));
	let (mut controller, mut events) = manager.init_manual_mode().unwrap();
	controller.start().unwrap();

	let first = next_summary(&mut events).await;
	assert_eq!(first.missing_targets, 1);

	// target "2" appears; the next cycle must re-discover and re-plan
	// instead of reusing the cached plan
	fs::create_dir(targets.path().join("2")).unwrap();
	controller.advance();
	let second = next_summary(&mut events).await;
	assert_eq!(second.missing_targets, 0);
	assert_eq!(second.targets_full, 2);
	assert!(targets.path().join("2/a.lua").exists());

	controller.stop().await;
}

#[tokio::test]
async fn test_invalid_plan_reports_error_but_engine_stays_running() {
	let source = TempDir::new().unwrap();
	let targets = TempDir::new().unwrap();
	write_file(source.path(), "a.lua", "a");
	fs::create_dir(targets.path().join("1")).unwrap();

	// unknown group name and no literal IDs: the rule cannot resolve
	let config = config(source.path(), vec![rule("*.lua", "/", &["ghosts"])], &[]);
	let mut manager = SyncManager::new(config, Arc::new(DirectoryDiscovery::new(targets.path())));
	let (mut controller, mut events) = manager.init_manual_mode().unwrap();
	controller.start().unwrap();

	let summary = next_summary(&mut events).await;
	assert_eq!(summary.status, SummaryStatus::Error);
	assert_eq!(summary.files_attempted, 0);
	assert!(!targets.path().join("1/a.lua").exists());

	// a plan-level error blocks the cycle, not the engine
	assert!(controller.is_running());
	controller.stop().await;
	assert_eq!(manager.state(), EngineState::Stopped);
}

#[tokio::test]
async fn test_init_is_only_valid_once() {
	let source = TempDir::new().unwrap();
	let targets = TempDir::new().unwrap();
	fs::create_dir(targets.path().join("1")).unwrap();

	let config = config(source.path(), vec![], &[]);
	let mut manager = SyncManager::new(config, Arc::new(DirectoryDiscovery::new(targets.path())));
	let _first = manager.init_manual_mode().unwrap();
	assert!(manager.init_watch_mode().is_err());
	assert!(manager.init_manual_mode().is_err());
}

#[tokio::test]
async fn test_stop_is_idempotent() {
	let source = TempDir::new().unwrap();
	let targets = TempDir::new().unwrap();
	write_file(source.path(), "a.lua", "a");
	fs::create_dir(targets.path().join("1")).unwrap();

	let config = config(source.path(), vec![rule("*.lua", "/", &["1"])], &[]);
	let mut manager = SyncManager::new(config, Arc::new(DirectoryDiscovery::new(targets.path())));
	let (mut controller, mut events) = manager.init_manual_mode().unwrap();
	controller.start().unwrap();
	let _ = next_summary(&mut events).await;

	controller.stop().await;
	controller.stop().await;
	assert_eq!(manager.state(), EngineState::Stopped);
	assert!(!manager.is_running());
}

#[tokio::test]
async fn test_start_twice_fails() {
	let source = TempDir::new().unwrap();
	let targets = TempDir::new().unwrap();
	write_file(source.path(), "a.lua", "a");
	fs::create_dir(targets.path().join("1")).unwrap();

	let config = config(source.path(), vec![rule("*.lua", "/", &["1"])], &[]);
	let mut manager = SyncManager::new(config, Arc::new(DirectoryDiscovery::new(targets.path())));
	let (mut controller, mut events) = manager.init_manual_mode().unwrap();
	controller.start().unwrap();
	assert!(controller.start().is_err());

	let _ = next_summary(&mut events).await;
	controller.stop().await;
}

#[tokio::test]
async fn test_discovery_failure_is_fatal() {
	let source = TempDir::new().unwrap();
	let targets = TempDir::new().unwrap();
	write_file(source.path(), "a.lua", "a");

	let missing = targets.path().join("gone");
	let config = config(source.path(), vec![rule("*.lua", "/", &["1"])], &[]);
	let mut manager = SyncManager::new(config, Arc::new(DirectoryDiscovery::new(missing)));
	let (mut controller, mut events) = manager.init_manual_mode().unwrap();
	controller.start().unwrap();

	loop {
		match next_event(&mut events).await {
			SyncEvent::ControllerStopped(state) => {
				assert_eq!(state, EngineState::Error);
				break;
			}
			SyncEvent::SyncComplete(_) => panic!("fatal discovery error must not complete a cycle"),
			_ => {}
		}
	}
	assert_eq!(manager.state(), EngineState::Error);
	controller.stop().await;
	// an error stop stays distinguishable from a clean stop
	assert_eq!(manager.state(), EngineState::Error);
}

// vim: ts=4

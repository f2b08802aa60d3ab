//! Sync orchestration: lifecycle state machine and mode controllers
//!
//! The manager wires plan building, transfer and result reporting into one
//! cycle, and hands out a mode controller (manual or watch) whose
//! construction and `start()` are deliberately split so callers can attach
//! event listeners before anything executes.

use futures::future;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::cache::{self, PlanCache};
use crate::config::SyncConfig;
use crate::discovery::TargetDiscovery;
use crate::error::SyncError;
use crate::events::{EventSender, SyncEvent};
use crate::logging::{debug, error, info, warn};
use crate::plan;
use crate::transfer;
use crate::types::{EngineState, OperationSummary, ResolvedFileRule, SyncPlan, Target};
use crate::watch::{self, ChangeCoordinator, FsChange};

///////////////////
// Engine state  //
///////////////////

/// Lock-free holder for the engine lifecycle state
pub(crate) struct StateCell(AtomicU8);

impl StateCell {
	fn new() -> Self {
		StateCell(AtomicU8::new(EngineState::Idle as u8))
	}

	pub(crate) fn get(&self) -> EngineState {
		match self.0.load(Ordering::SeqCst) {
			0 => EngineState::Idle,
			1 => EngineState::Starting,
			2 => EngineState::Running,
			3 => EngineState::Stopping,
			4 => EngineState::Stopped,
			_ => EngineState::Error,
		}
	}

	pub(crate) fn set(&self, state: EngineState) {
		self.0.store(state as u8, Ordering::SeqCst);
	}

	pub(crate) fn transition(&self, from: EngineState, to: EngineState) -> bool {
		self.0
			.compare_exchange(from as u8, to as u8, Ordering::SeqCst, Ordering::SeqCst)
			.is_ok()
	}
}

/////////////////
// Engine core //
/////////////////

/// Shared plumbing behind both mode controllers
#[derive(Clone)]
pub(crate) struct EngineCore {
	config: Arc<SyncConfig>,
	discovery: Arc<dyn TargetDiscovery>,
	cache: Arc<PlanCache>,
	events: EventSender,
	state: Arc<StateCell>,
	last_plan: Arc<Mutex<Option<Arc<SyncPlan>>>>,
	last_target_ids: Arc<Mutex<Option<BTreeSet<String>>>>,
}

impl EngineCore {
	/// Run one sync cycle: discover, plan, transfer, summarize
	///
	/// Recoverable problems come back inside the summary; an `Err` from
	/// here is always fatal to the controller.
	async fn run_cycle(
		&self,
		changed: Option<BTreeSet<PathBuf>>,
	) -> Result<OperationSummary, SyncError> {
		let state = self.state.get();
		if state != EngineState::Running {
			return Err(SyncError::InvalidState {
				message: format!("sync cycle requested while {:?}", state),
			});
		}

		let targets = self.discovery.discover().await?;
		self.note_target_set(&targets).await;

		let key = PlanCache::key_for(changed.as_ref());
		let plan = match self.cache.get(&key) {
			Some(plan) => {
				debug!("plan cache hit for key {}", key);
				plan
			}
			None => {
				let built = Arc::new(plan::build_plan(
					&self.config.source_root,
					&self.config.rules,
					&self.config.target_groups,
					&targets,
					changed.as_ref(),
				));
				if built.is_valid {
					self.cache.set(key, built.clone());
				} else {
					// stale entries must not outlive a broken resolution
					self.cache.invalidate("plan resolution failed");
				}
				built
			}
		};
		*self.last_plan.lock().await = Some(plan.clone());
		self.events.emit(SyncEvent::SyncPlanned(plan.clone()));

		if !plan.is_valid {
			warn!("plan is invalid, skipping transfer for this cycle");
			return Ok(OperationSummary::aggregate(
				plan.issues.clone(),
				vec![],
				plan.missing_target_ids.len(),
				false,
			));
		}

		self.events.emit(SyncEvent::SyncStarted);

		// Targets are independent of each other, so they transfer
		// concurrently; files within one target stay in rule order.
		let mut transfers = Vec::new();
		for target in &plan.available_targets {
			let rules: Vec<ResolvedFileRule> = plan
				.resolved_file_rules
				.iter()
				.filter(|r| r.target_ids.iter().any(|id| id == &target.id))
				.cloned()
				.collect();
			if rules.is_empty() {
				continue;
			}
			transfers.push(async move {
				transfer::copy_all(&rules, &target.root_path).await.into_summary(&target.id)
			});
		}
		let per_target = future::join_all(transfers).await;

		let summary = OperationSummary::aggregate(
			plan.issues.clone(),
			per_target,
			plan.missing_target_ids.len(),
			true,
		);
		info!(
			"cycle {}: {}/{} files copied across {} targets",
			summary.cycle_id,
			summary.files_succeeded,
			summary.files_attempted,
			plan.available_targets.len()
		);
		Ok(summary)
	}

	/// Invalidate cached plans when the discovered target set changed
	async fn note_target_set(&self, targets: &[Target]) {
		let ids: BTreeSet<String> = targets.iter().map(|t| t.id.clone()).collect();
		let mut last = self.last_target_ids.lock().await;
		if let Some(previous) = last.as_ref() {
			if previous != &ids {
				self.cache.invalidate("target set changed");
			}
		}
		*last = Some(ids);
	}

	async fn last_plan(&self) -> Option<Arc<SyncPlan>> {
		self.last_plan.lock().await.clone()
	}
}

//////////////////
// Sync manager //
//////////////////

/// Owns the engine configuration and hands out one mode controller
pub struct SyncManager {
	config: Arc<SyncConfig>,
	discovery: Arc<dyn TargetDiscovery>,
	cache: Arc<PlanCache>,
	state: Arc<StateCell>,
	initialized: bool,
}

impl SyncManager {
	pub fn new(config: SyncConfig, discovery: Arc<dyn TargetDiscovery>) -> Self {
		let ttl = std::time::Duration::from_millis(config.advanced.cache_ttl_ms);
		SyncManager {
			config: Arc::new(config),
			discovery,
			cache: Arc::new(PlanCache::new(ttl)),
			state: Arc::new(StateCell::new()),
			initialized: false,
		}
	}

	/// Create the manual-mode controller; valid only once, from `Idle`
	pub fn init_manual_mode(
		&mut self,
	) -> Result<(ManualController, mpsc::UnboundedReceiver<SyncEvent>), SyncError> {
		let (core, rx) = self.init_core()?;
		Ok((ManualController::new(core), rx))
	}

	/// Create the watch-mode controller; valid only once, from `Idle`
	pub fn init_watch_mode(
		&mut self,
	) -> Result<(WatchController, mpsc::UnboundedReceiver<SyncEvent>), SyncError> {
		let debounce = std::time::Duration::from_millis(self.config.advanced.debounce_ms);
		let (core, rx) = self.init_core()?;
		Ok((WatchController::new(core, debounce), rx))
	}

	fn init_core(&mut self) -> Result<(EngineCore, mpsc::UnboundedReceiver<SyncEvent>), SyncError> {
		if self.initialized || self.state.get() != EngineState::Idle {
			return Err(SyncError::InvalidState {
				message: format!("mode init requested while {:?}", self.state.get()),
			});
		}
		self.initialized = true;
		let (events, rx) = EventSender::channel();
		let core = EngineCore {
			config: self.config.clone(),
			discovery: self.discovery.clone(),
			cache: self.cache.clone(),
			events,
			state: self.state.clone(),
			last_plan: Arc::new(Mutex::new(None)),
			last_target_ids: Arc::new(Mutex::new(None)),
		};
		Ok((core, rx))
	}

	pub fn state(&self) -> EngineState {
		self.state.get()
	}

	pub fn is_running(&self) -> bool {
		self.state.get() == EngineState::Running
	}

	pub fn invalidate_cache(&self, reason: &str) {
		self.cache.invalidate(reason);
	}
}

///////////////////////
// Manual controller //
///////////////////////

/// Runs one cycle, publishes the summary, then blocks until `advance()`
pub struct ManualController {
	core: EngineCore,
	advance_tx: mpsc::UnboundedSender<()>,
	advance_rx: Option<mpsc::UnboundedReceiver<()>>,
	stop_tx: mpsc::UnboundedSender<()>,
	stop_rx: Option<mpsc::UnboundedReceiver<()>>,
	task: Option<JoinHandle<()>>,
	sweeper: Option<JoinHandle<()>>,
}

impl ManualController {
	fn new(core: EngineCore) -> Self {
		let (advance_tx, advance_rx) = mpsc::unbounded_channel();
		let (stop_tx, stop_rx) = mpsc::unbounded_channel();
		ManualController {
			core,
			advance_tx,
			advance_rx: Some(advance_rx),
			stop_tx,
			stop_rx: Some(stop_rx),
			task: None,
			sweeper: None,
		}
	}

	pub fn start(&mut self) -> Result<(), SyncError> {
		if !self.core.state.transition(EngineState::Idle, EngineState::Starting) {
			return Err(SyncError::InvalidState {
				message: format!("start requested while {:?}", self.core.state.get()),
			});
		}
		let advance_rx = match self.advance_rx.take() {
			Some(rx) => rx,
			None => {
				return Err(SyncError::InvalidState {
					message: "controller already started".to_string(),
				})
			}
		};
		let stop_rx = match self.stop_rx.take() {
			Some(rx) => rx,
			None => {
				return Err(SyncError::InvalidState {
					message: "controller already started".to_string(),
				})
			}
		};

		self.sweeper = Some(cache::spawn_sweeper(self.core.cache.clone()));
		self.core.state.set(EngineState::Running);
		self.core.events.emit(SyncEvent::RunStarted);
		self.task = Some(tokio::spawn(manual_loop(self.core.clone(), advance_rx, stop_rx)));
		Ok(())
	}

	/// External continue signal for the next cycle
	pub fn advance(&self) {
		let _ = self.advance_tx.send(());
	}

	/// Idempotent shutdown; teardown problems are logged, never re-thrown
	pub async fn stop(&mut self) {
		stop_controller(&self.core, &self.stop_tx, &mut self.task, &mut self.sweeper).await;
	}

	pub fn is_running(&self) -> bool {
		self.core.state.get() == EngineState::Running
	}

	pub fn invalidate_cache(&self, reason: &str) {
		self.core.cache.invalidate(reason);
	}
}

async fn manual_loop(
	core: EngineCore,
	mut advance_rx: mpsc::UnboundedReceiver<()>,
	mut stop_rx: mpsc::UnboundedReceiver<()>,
) {
	while core.state.get() == EngineState::Running {
		match core.run_cycle(None).await {
			Ok(summary) => core.events.emit(SyncEvent::SyncComplete(summary)),
			Err(err) => {
				// shutdown can race the next cycle; that is not a failure
				if core.state.get() == EngineState::Stopping {
					return;
				}
				error!("sync cycle failed: {}", err);
				core.state.set(EngineState::Error);
				core.events.emit(SyncEvent::ControllerStopped(EngineState::Error));
				return;
			}
		}

		tokio::select! {
			signal = advance_rx.recv() => {
				if signal.is_none() {
					break;
				}
			}
			_ = stop_rx.recv() => break,
		}
	}
}

//////////////////////
// Watch controller //
//////////////////////

/// Runs one initial cycle, then reacts to debounced filesystem changes
pub struct WatchController {
	core: EngineCore,
	debounce: std::time::Duration,
	stop_tx: mpsc::UnboundedSender<()>,
	stop_rx: Option<mpsc::UnboundedReceiver<()>>,
	task: Option<JoinHandle<()>>,
	sweeper: Option<JoinHandle<()>>,
}

impl WatchController {
	fn new(core: EngineCore, debounce: std::time::Duration) -> Self {
		let (stop_tx, stop_rx) = mpsc::unbounded_channel();
		WatchController {
			core,
			debounce,
			stop_tx,
			stop_rx: Some(stop_rx),
			task: None,
			sweeper: None,
		}
	}

	pub fn start(&mut self) -> Result<(), SyncError> {
		if !self.core.state.transition(EngineState::Idle, EngineState::Starting) {
			return Err(SyncError::InvalidState {
				message: format!("start requested while {:?}", self.core.state.get()),
			});
		}
		let stop_rx = match self.stop_rx.take() {
			Some(rx) => rx,
			None => {
				return Err(SyncError::InvalidState {
					message: "controller already started".to_string(),
				})
			}
		};

		let source_root = std::fs::canonicalize(&self.core.config.source_root)
			.unwrap_or_else(|_| self.core.config.source_root.clone());
		let (watcher, fs_rx) = match watch::spawn_watcher(&source_root) {
			Ok(pair) => pair,
			Err(err) => {
				error!("{}", err);
				self.core.state.set(EngineState::Error);
				self.core.events.emit(SyncEvent::ControllerStopped(EngineState::Error));
				return Err(err);
			}
		};
		let matcher = watch::rule_matcher(&self.core.config.rules);

		self.sweeper = Some(cache::spawn_sweeper(self.core.cache.clone()));
		self.core.state.set(EngineState::Running);
		self.core.events.emit(SyncEvent::RunStarted);
		self.task = Some(tokio::spawn(watch_loop(
			self.core.clone(),
			watcher,
			fs_rx,
			matcher,
			source_root,
			self.debounce,
			stop_rx,
		)));
		Ok(())
	}

	/// Idempotent shutdown: the watcher and timer go down first, an
	/// in-flight transfer is allowed to finish, no new cycle starts
	pub async fn stop(&mut self) {
		stop_controller(&self.core, &self.stop_tx, &mut self.task, &mut self.sweeper).await;
	}

	pub fn is_running(&self) -> bool {
		self.core.state.get() == EngineState::Running
	}

	pub fn invalidate_cache(&self, reason: &str) {
		self.core.cache.invalidate(reason);
	}
}

async fn stop_controller(
	core: &EngineCore,
	stop_tx: &mpsc::UnboundedSender<()>,
	task: &mut Option<JoinHandle<()>>,
	sweeper: &mut Option<JoinHandle<()>>,
) {
	let state = core.state.get();
	if state == EngineState::Stopped {
		return;
	}
	if state != EngineState::Error {
		core.state.set(EngineState::Stopping);
	}

	let _ = stop_tx.send(());
	if let Some(handle) = task.take() {
		if let Err(err) = handle.await {
			warn!("controller task did not shut down cleanly: {}", err);
		}
	}
	if let Some(handle) = sweeper.take() {
		handle.abort();
	}

	if core.state.get() != EngineState::Error {
		core.state.set(EngineState::Stopped);
		core.events.emit(SyncEvent::ControllerStopped(EngineState::Stopped));
	}
}

async fn watch_loop(
	core: EngineCore,
	watcher: notify::RecommendedWatcher,
	mut fs_rx: mpsc::UnboundedReceiver<notify::Event>,
	matcher: globset::GlobSet,
	source_root: PathBuf,
	debounce: std::time::Duration,
	mut stop_rx: mpsc::UnboundedReceiver<()>,
) {
	// The watcher handle lives here so dropping it is the teardown.
	let mut watcher = Some(watcher);

	match core.run_cycle(None).await {
		Ok(summary) => core.events.emit(SyncEvent::InitialSyncComplete(summary)),
		Err(err) => {
			error!("initial sync failed: {}", err);
			core.state.set(EngineState::Error);
			core.events.emit(SyncEvent::ControllerStopped(EngineState::Error));
			return;
		}
	}

	let mut coordinator = ChangeCoordinator::new(debounce);
	track_plan_sources(&core, &mut coordinator).await;

	let (done_tx, mut done_rx) =
		mpsc::unbounded_channel::<Result<OperationSummary, SyncError>>();
	let mut stopping = false;

	loop {
		let deadline = coordinator.deadline();
		let in_flight = coordinator.sync_in_progress();

		tokio::select! {
			_ = stop_rx.recv() => {
				stopping = true;
				watcher.take();
				coordinator.clear_deadline();
				if !in_flight {
					break;
				}
			}
			maybe_event = fs_rx.recv(), if !stopping => {
				match maybe_event {
					Some(event) => apply_fs_event(&core, &mut coordinator, &matcher, &source_root, event),
					None => {
						error!("watcher channel closed unexpectedly");
						core.state.set(EngineState::Error);
						core.events.emit(SyncEvent::ControllerStopped(EngineState::Error));
						return;
					}
				}
			}
			Some(result) = done_rx.recv() => {
				match result {
					Ok(summary) => {
						core.events.emit(SyncEvent::SyncComplete(summary));
						track_plan_sources(&core, &mut coordinator).await;
						coordinator.finish_cycle();
						if stopping {
							break;
						}
					}
					Err(err) => {
						// state is reset exactly as on success, but no
						// follow-up window is armed
						coordinator.abort_cycle();
						if stopping || core.state.get() == EngineState::Stopping {
							break;
						}
						error!("sync cycle failed: {}", err);
						core.state.set(EngineState::Error);
						core.events.emit(SyncEvent::ControllerStopped(EngineState::Error));
						return;
					}
				}
			}
			_ = wait_for_deadline(deadline), if deadline.is_some() && !in_flight && !stopping => {
				let changed = coordinator.begin_cycle();
				let cycle_core = core.clone();
				let tx = done_tx.clone();
				tokio::spawn(async move {
					let _ = tx.send(cycle_core.run_cycle(Some(changed)).await);
				});
			}
		}
	}
}

async fn wait_for_deadline(deadline: Option<Instant>) {
	match deadline {
		Some(deadline) => tokio::time::sleep_until(deadline).await,
		None => std::future::pending::<()>().await,
	}
}

fn apply_fs_event(
	core: &EngineCore,
	coordinator: &mut ChangeCoordinator,
	matcher: &globset::GlobSet,
	source_root: &std::path::Path,
	event: notify::Event,
) {
	for change in watch::classify_event(&event, source_root) {
		match change {
			FsChange::Removed(relative) => {
				if coordinator.note_removed(&relative) {
					warn!("watched file removed: {}", relative.display());
					core.cache.invalidate("watched file removed");
				}
			}
			FsChange::Modified(relative) => {
				if matcher.is_match(&relative) || coordinator.is_watched(&relative) {
					coordinator.note_change(relative.clone());
					core.events.emit(SyncEvent::FileChanged(relative));
				}
			}
		}
	}
}

async fn track_plan_sources(core: &EngineCore, coordinator: &mut ChangeCoordinator) {
	if let Some(plan) = core.last_plan().await {
		for rule in &plan.resolved_file_rules {
			coordinator.track(rule.source_relative_path.clone());
		}
	}
}


// vim: ts=4

//! Plan cache keyed by requested scope
//!
//! A full plan is stored under a fixed key; a partial (changed-file-set)
//! plan is stored under a hash of the sorted change set, so two requests
//! with the same set hit the same entry regardless of insertion order.
//! Expiry is passive at lookup; the background sweep is memory hygiene
//! only, never correctness.

use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

use crate::logging::debug;
use crate::paths;
use crate::types::SyncPlan;

/// Cache key used for plans built without a changed-file restriction
pub const FULL_PLAN_KEY: &str = "full";

struct CacheSlot {
	plan: Arc<SyncPlan>,
	inserted_at: Instant,
}

/// Key/TTL cache over built sync plans
pub struct PlanCache {
	entries: Mutex<HashMap<String, CacheSlot>>,
	ttl: Duration,
}

impl PlanCache {
	pub fn new(ttl: Duration) -> Self {
		PlanCache { entries: Mutex::new(HashMap::new()), ttl }
	}

	/// Stable key for a plan request
	///
	/// `None` means a full plan. A changed set hashes its sorted unix-style
	/// paths, newline-delimited, through blake3.
	pub fn key_for(changed: Option<&BTreeSet<PathBuf>>) -> String {
		match changed {
			None => FULL_PLAN_KEY.to_string(),
			Some(set) => {
				let mut hasher = blake3::Hasher::new();
				for path in set {
					hasher.update(paths::to_unix_string(path).as_bytes());
					hasher.update(b"\n");
				}
				hasher.finalize().to_hex().to_string()
			}
		}
	}

	pub fn get(&self, key: &str) -> Option<Arc<SyncPlan>> {
		let mut entries = self.lock();
		let expired = match entries.get(key) {
			Some(slot) => {
				if slot.inserted_at.elapsed() < self.ttl {
					return Some(slot.plan.clone());
				}
				true
			}
			None => false,
		};
		if expired {
			entries.remove(key);
		}
		None
	}

	/// Store a plan; invalid plans are never cached
	pub fn set(&self, key: String, plan: Arc<SyncPlan>) {
		if !plan.is_valid {
			return;
		}
		self.lock().insert(key, CacheSlot { plan, inserted_at: Instant::now() });
	}

	/// Drop all entries; idempotent and infallible
	pub fn invalidate(&self, reason: &str) {
		let mut entries = self.lock();
		if !entries.is_empty() {
			debug!("plan cache invalidated ({}): dropping {} entries", reason, entries.len());
		}
		entries.clear();
	}

	/// Remove expired entries; returns how many were dropped
	pub fn sweep(&self) -> usize {
		let mut entries = self.lock();
		let before = entries.len();
		let ttl = self.ttl;
		entries.retain(|_, slot| slot.inserted_at.elapsed() < ttl);
		before - entries.len()
	}

	pub fn len(&self) -> usize {
		self.lock().len()
	}

	pub fn is_empty(&self) -> bool {
		self.lock().is_empty()
	}

	// A poisoned lock only means another thread panicked mid-operation on
	// a plain HashMap; the map itself is still usable.
	fn lock(&self) -> MutexGuard<'_, HashMap<String, CacheSlot>> {
		self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
	}
}

/// Periodic expiry sweep for memory hygiene
pub fn spawn_sweeper(cache: Arc<PlanCache>) -> JoinHandle<()> {
	tokio::spawn(async move {
		let period = cache.ttl.max(Duration::from_secs(1));
		let mut ticker = tokio::time::interval(period);
		ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
		loop {
			ticker.tick().await;
			let dropped = cache.sweep();
			if dropped > 0 {
				debug!("plan cache sweep dropped {} expired entries", dropped);
			}
		}
	})
}


// vim: ts=4

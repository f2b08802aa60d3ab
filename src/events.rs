//! Typed event stream per controller instance
//!
//! Each mode controller owns its own channel; there is no process-wide
//! listener registry. A dropped listener must never fail the engine, so
//! send errors are ignored.

use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::types::{EngineState, OperationSummary, SyncPlan};

/// Lifecycle and cycle events emitted by a mode controller
#[derive(Debug, Clone)]
pub enum SyncEvent {
	/// The controller started and is about to run its first cycle
	RunStarted,

	/// A plan was built (or served from cache) for the coming cycle
	SyncPlanned(Arc<SyncPlan>),

	/// File transfer for one cycle is starting
	SyncStarted,

	/// A cycle finished; the summary is fully reconciled against disk
	SyncComplete(OperationSummary),

	/// The first watch-mode cycle finished; emitted exactly once, before
	/// any regular `SyncComplete`
	InitialSyncComplete(OperationSummary),

	/// A relevant source file changed (normalized relative path)
	FileChanged(PathBuf),

	/// The controller stopped; the state distinguishes clean shutdown
	/// from a forced error stop
	ControllerStopped(EngineState),
}

#[derive(Clone)]
pub struct EventSender {
	tx: mpsc::UnboundedSender<SyncEvent>,
}

impl EventSender {
	pub fn channel() -> (EventSender, mpsc::UnboundedReceiver<SyncEvent>) {
		let (tx, rx) = mpsc::unbounded_channel();
		(EventSender { tx }, rx)
	}

	pub fn emit(&self, event: SyncEvent) {
		let _ = self.tx.send(event);
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn test_emit_and_receive() {
		let (sender, mut rx) = EventSender::channel();
		sender.emit(SyncEvent::RunStarted);
		assert!(matches!(rx.recv().await, Some(SyncEvent::RunStarted)));
	}

	#[tokio::test]
	async fn test_emit_without_listener_is_ignored() {
		let (sender, rx) = EventSender::channel();
		drop(rx);
		sender.emit(SyncEvent::SyncStarted);
	}
}

// vim: ts=4

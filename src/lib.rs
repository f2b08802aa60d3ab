//! # deployr - Rule-Driven Source Tree Fan-Out Synchronizer
//!
//! deployr resolves declarative glob rules against a local source tree and
//! copies the matched files into one or more target directories discovered
//! by numeric ID, either as a one-shot cycle or continuously from
//! filesystem change events.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use deployr::{DirectoryDiscovery, SyncConfig, SyncEvent, SyncManager};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = SyncConfig::load(std::path::Path::new("deployr.json"))?;
//!     let discovery = Arc::new(DirectoryDiscovery::new("./targets"));
//!     let mut manager = SyncManager::new(config, discovery);
//!
//!     let (mut controller, mut events) = manager.init_manual_mode()?;
//!     controller.start()?;
//!     while let Some(event) = events.recv().await {
//!         if let SyncEvent::SyncComplete(summary) = event {
//!             println!("copied {} files", summary.files_succeeded);
//!             break;
//!         }
//!     }
//!     controller.stop().await;
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod config;
pub mod discovery;
pub mod error;
pub mod events;
pub mod groups;
pub mod logging;
pub mod manager;
pub mod paths;
pub mod plan;
pub mod transfer;
pub mod types;
pub mod watch;

// Re-export commonly used types and functions
pub use config::{AdvancedOptions, SyncConfig};
pub use discovery::{DirectoryDiscovery, TargetDiscovery};
pub use error::{SyncError, TransferErrorKind};
pub use events::SyncEvent;
pub use manager::{ManualController, SyncManager, WatchController};
pub use types::{
	EngineState, OperationSummary, SummaryStatus, SyncPlan, SyncRule, Target, TargetRefs,
};

// vim: ts=4

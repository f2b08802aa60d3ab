//! Error types for deployr operations

use std::error::Error;
use std::fmt;
use std::io;

/// Main error type for engine operations
///
/// Every variant here is fatal to the running cycle or engine. Recoverable
/// conditions travel as `PlanIssue`s or per-file `TransferResult`s instead,
/// so the manager can always produce an operation summary.
#[derive(Debug)]
pub enum SyncError {
	/// Target discovery location is invalid or unreachable
	DiscoveryFailed { location: String, message: String },

	/// Filesystem watcher could not be created or attached
	WatcherFailed { message: String },

	/// Operation requested in a lifecycle state that does not allow it
	InvalidState { message: String },

	/// Invalid configuration
	InvalidConfig { message: String },

	/// I/O error
	Io(io::Error),

	/// Generic error message
	Other { message: String },
}

impl fmt::Display for SyncError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			SyncError::DiscoveryFailed { location, message } => {
				write!(f, "Target location {} is unavailable: {}", location, message)
			}
			SyncError::WatcherFailed { message } => {
				write!(f, "Failed to set up file watcher: {}", message)
			}
			SyncError::InvalidState { message } => {
				write!(f, "Invalid engine state: {}", message)
			}
			SyncError::InvalidConfig { message } => {
				write!(f, "Invalid configuration: {}", message)
			}
			SyncError::Io(e) => write!(f, "I/O error: {}", e),
			SyncError::Other { message } => write!(f, "{}", message),
		}
	}
}

impl Error for SyncError {}

impl From<io::Error> for SyncError {
	fn from(e: io::Error) -> Self {
		SyncError::Io(e)
	}
}

impl From<String> for SyncError {
	fn from(e: String) -> Self {
		SyncError::Other { message: e }
	}
}

/// Classified cause of a single failed file transfer
///
/// The `Display` strings are stable and user-facing; the reporting sink
/// shows them verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferErrorKind {
	/// Source file disappeared between planning and copying
	NotFound,

	/// Permission denied on source or destination
	PermissionDenied,

	/// Destination resolves to a directory
	IsADirectory,

	/// Destination is busy or locked by another process
	Busy,

	/// Destination path escapes the target root
	SecurityViolation { path: String },

	/// A non-directory entry occupies the destination directory path
	DirectoryConflict { path: String },

	/// Unclassified I/O failure
	Other { message: String },
}

impl fmt::Display for TransferErrorKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			TransferErrorKind::NotFound => write!(f, "source file not found"),
			TransferErrorKind::PermissionDenied => write!(f, "permission denied"),
			TransferErrorKind::IsADirectory => write!(f, "destination is a directory"),
			TransferErrorKind::Busy => write!(f, "file is busy or locked"),
			TransferErrorKind::SecurityViolation { path } => {
				write!(f, "security violation: {} escapes the target root", path)
			}
			TransferErrorKind::DirectoryConflict { path } => {
				write!(f, "cannot create directory {}: path is occupied by a file", path)
			}
			TransferErrorKind::Other { message } => write!(f, "{}", message),
		}
	}
}

impl Error for TransferErrorKind {}

impl TransferErrorKind {
	/// Map an underlying I/O error onto a stable classification
	pub fn from_io(err: &io::Error) -> Self {
		match err.kind() {
			io::ErrorKind::NotFound => TransferErrorKind::NotFound,
			io::ErrorKind::PermissionDenied => TransferErrorKind::PermissionDenied,
			io::ErrorKind::IsADirectory => TransferErrorKind::IsADirectory,
			io::ErrorKind::ResourceBusy => TransferErrorKind::Busy,
			_ => TransferErrorKind::Other { message: err.to_string() },
		}
	}
}


// vim: ts=4

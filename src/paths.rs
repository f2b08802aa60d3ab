//! Path normalization helpers shared by planning, transfer and watching
//!
//! All destination handling works on lexically normalized relative paths:
//! separators unified to `/`, `.` and `..` segments resolved. Leading `..`
//! segments that would escape a root are preserved, which is what lets
//! callers detect traversal before touching the filesystem.

use std::path::{Component, Path, PathBuf};

/// Convert backslash separators to forward slashes.
pub fn normalize_separators(path: &str) -> String {
	path.replace('\\', "/")
}

/// Lexically resolve `.` and `..` segments of a path string.
///
/// The result is always relative: leading separators are dropped (a rule
/// target of `/all/` means "all/ beneath the target root"). A `..` that
/// cannot be cancelled against an earlier segment is kept at the front.
pub fn normalize_relative(path: &str) -> PathBuf {
	let unified = normalize_separators(path);
	let mut segments: Vec<&str> = Vec::new();

	for segment in unified.split('/') {
		match segment {
			"" | "." => {}
			".." => match segments.last() {
				Some(last) if *last != ".." => {
					segments.pop();
				}
				_ => segments.push(".."),
			},
			_ => segments.push(segment),
		}
	}

	segments.iter().collect()
}

/// True when joining `path` beneath a root could place it outside that root.
pub fn escapes_root(path: &Path) -> bool {
	match path.components().next() {
		Some(Component::ParentDir) => true,
		Some(Component::RootDir) | Some(Component::Prefix(_)) => true,
		_ => path.is_absolute(),
	}
}

/// Infer whether a raw rule path names a directory rather than a file.
///
/// A trailing separator always means directory; otherwise a last segment
/// without an extension does.
pub fn looks_like_directory(path: &str) -> bool {
	let unified = normalize_separators(path);
	if unified.is_empty() || unified.ends_with('/') {
		return true;
	}
	match unified.rsplit('/').next() {
		Some(last) => !last.contains('.'),
		None => true,
	}
}

/// Path of `path` relative to `root`, when it lies beneath it.
pub fn relative_to(path: &Path, root: &Path) -> Option<PathBuf> {
	path.strip_prefix(root).ok().map(|p| p.to_path_buf())
}

/// Render a path with forward slashes for stable messages and cache keys.
pub fn to_unix_string(path: &Path) -> String {
	normalize_separators(&path.to_string_lossy())
}


// vim: ts=4

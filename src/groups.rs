//! Target group resolution
//!
//! Groups form a name-keyed graph: each member is either a literal numeric
//! target ID or the name of another group. Expansion walks the graph with a
//! visited set; cycle detection is a separate pre-validation pass over the
//! whole table so a broken configuration is reported before any rule uses it.

use std::collections::{BTreeMap, BTreeSet};

/// A token shaped like a non-negative integer is always a literal target ID
pub fn is_literal_id(token: &str) -> bool {
	!token.is_empty() && token.chars().all(|c| c.is_ascii_digit())
}

/// Expand a rule's target references into a deduplicated ID set
///
/// Unknown references are reported as error values with the offending name;
/// resolution continues for the remaining tokens. Group names already seen
/// within this resolution are skipped, so even a cyclic table cannot recurse
/// forever here.
pub fn resolve_refs(
	refs: &[String],
	groups: &BTreeMap<String, Vec<String>>,
) -> (BTreeSet<String>, Vec<String>) {
	let mut resolved = BTreeSet::new();
	let mut errors = Vec::new();
	let mut visited = BTreeSet::new();

	for token in refs {
		resolve_token(token, groups, &mut resolved, &mut errors, &mut visited);
	}

	(resolved, errors)
}

fn resolve_token(
	token: &str,
	groups: &BTreeMap<String, Vec<String>>,
	resolved: &mut BTreeSet<String>,
	errors: &mut Vec<String>,
	visited: &mut BTreeSet<String>,
) {
	// Numeric tokens never consult the group table, so a group that happens
	// to be named "1" cannot shadow target ID "1".
	if is_literal_id(token) {
		resolved.insert(token.to_string());
		return;
	}

	match groups.get(token) {
		Some(members) => {
			if !visited.insert(token.to_string()) {
				return;
			}
			for member in members {
				resolve_token(member, groups, resolved, errors, visited);
			}
		}
		None => errors.push(format!("Unknown target reference: {}", token)),
	}
}

/// Detect circular group references across the whole group table
///
/// Returns the first cycle found as the name path from the first occurrence
/// of the repeated group to the repeat, inclusive, so the caller can render
/// `"servers -> clients -> servers"`. Returns an empty list for an acyclic
/// table. Numeric members are target IDs and never close a cycle.
pub fn find_circular_references(groups: &BTreeMap<String, Vec<String>>) -> Vec<String> {
	let mut stack: Vec<String> = Vec::new();
	let mut done: BTreeSet<String> = BTreeSet::new();

	for name in groups.keys() {
		if let Some(cycle) = visit(name, groups, &mut stack, &mut done) {
			return cycle;
		}
	}

	Vec::new()
}

fn visit(
	name: &str,
	groups: &BTreeMap<String, Vec<String>>,
	stack: &mut Vec<String>,
	done: &mut BTreeSet<String>,
) -> Option<Vec<String>> {
	if done.contains(name) {
		return None;
	}
	if let Some(first) = stack.iter().position(|seen| seen == name) {
		let mut cycle: Vec<String> = stack[first..].to_vec();
		cycle.push(name.to_string());
		return Some(cycle);
	}

	let members = match groups.get(name) {
		Some(members) => members,
		None => return None,
	};

	stack.push(name.to_string());
	for member in members {
		if is_literal_id(member) {
			continue;
		}
		if let Some(cycle) = visit(member, groups, stack, done) {
			return Some(cycle);
		}
	}
	stack.pop();
	done.insert(name.to_string());

	None
}

#[cfg(test)]
mod tests {
	use super::*;

	fn table(entries: &[(&str, &[&str])]) -> BTreeMap<String, Vec<String>> {
		entries
			.iter()
			.map(|(name, members)| {
				(name.to_string(), members.iter().map(|m| m.to_string()).collect())
			})
			.collect()
	}

	#[test]
	fn test_resolve_literal_ids() {
		let groups = table(&[]);
		let (resolved, errors) =
			resolve_refs(&["1".to_string(), "42".to_string()], &groups);
		assert_eq!(resolved.len(), 2);
		assert!(resolved.contains("42"));
		assert!(errors.is_empty());
	}

	#[test]
	fn test_resolve_nested_groups() {
		let groups = table(&[("all", &["servers", "3"]), ("servers", &["1", "2"])]);
		let (resolved, errors) = resolve_refs(&["all".to_string()], &groups);
		assert_eq!(
			resolved.into_iter().collect::<Vec<_>>(),
			vec!["1".to_string(), "2".to_string(), "3".to_string()]
		);
		assert!(errors.is_empty());
	}

	#[test]
	fn test_resolve_unknown_ref_continues() {
		let groups = table(&[("servers", &["1"])]);
		let (resolved, errors) =
			resolve_refs(&["ghosts".to_string(), "servers".to_string()], &groups);
		assert!(resolved.contains("1"));
		assert_eq!(errors.len(), 1);
		assert!(errors[0].contains("ghosts"));
	}

	#[test]
	fn test_resolve_cyclic_table_terminates() {
		let groups = table(&[("a", &["b", "1"]), ("b", &["a", "2"])]);
		let (resolved, errors) = resolve_refs(&["a".to_string()], &groups);
		assert_eq!(
			resolved.into_iter().collect::<Vec<_>>(),
			vec!["1".to_string(), "2".to_string()]
		);
		assert!(errors.is_empty());
	}

	#[test]
	fn test_numeric_ref_never_expands_group() {
		// a group literally named "1" must not shadow target ID "1"
		let groups = table(&[("1", &["2", "3"])]);
		let (resolved, errors) = resolve_refs(&["1".to_string()], &groups);
		assert_eq!(resolved.into_iter().collect::<Vec<_>>(), vec!["1".to_string()]);
		assert!(errors.is_empty());
	}

	#[test]
	fn test_cycle_detection_finds_pair() {
		let groups = table(&[("servers", &["clients"]), ("clients", &["servers"])]);
		let cycle = find_circular_references(&groups);
		assert!(!cycle.is_empty());
		assert_eq!(cycle.first(), cycle.last());
		assert!(cycle.len() >= 3);
	}

	#[test]
	fn test_cycle_detection_order_independent() {
		// the cycle is only reachable through a chain starting at the
		// lexically first key; detection must still find it
		let groups = table(&[("aaa", &["alpha"]), ("alpha", &["beta"]), ("beta", &["alpha"])]);
		let cycle = find_circular_references(&groups);
		assert_eq!(
			cycle,
			vec!["alpha".to_string(), "beta".to_string(), "alpha".to_string()]
		);
	}

	#[test]
	fn test_cycle_detection_self_reference() {
		let groups = table(&[("loop", &["loop"])]);
		let cycle = find_circular_references(&groups);
		assert_eq!(cycle, vec!["loop".to_string(), "loop".to_string()]);
	}

	#[test]
	fn test_no_false_positive_on_numeric_group_name() {
		// group "1" containing target ID "1" is not a cycle
		let groups = table(&[("1", &["1"])]);
		assert!(find_circular_references(&groups).is_empty());
	}

	#[test]
	fn test_acyclic_table() {
		let groups = table(&[("all", &["servers", "clients"]), ("servers", &["1"]), ("clients", &["2"])]);
		assert!(find_circular_references(&groups).is_empty());
	}
}

// vim: ts=4

//! Listener set for connection-level liveness reporting
//!
//! Listeners never receive routed messages; the set only backs the
//! listener count exposed through bridge stats.
#![allow(missing_docs)]

use std::collections::HashSet;
use std::fmt::Display;

use arcstr::ArcStr;
use tracing::debug;

/// Opaque listener handle chosen by the caller
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ListenerId(ArcStr);

impl ListenerId {
	pub fn new(id: impl Into<ArcStr>) -> Self {
		Self(id.into())
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl From<&str> for ListenerId {
	fn from(id: &str) -> Self {
		Self::new(id)
	}
}

impl From<String> for ListenerId {
	fn from(id: String) -> Self {
		Self::new(id)
	}
}

impl Display for ListenerId {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "ListenerId({})", self.0)
	}
}

/// Set of listener handles with a cached count
///
/// `count` moves only when the set actually changes, so it always equals
/// the set size.
#[derive(Debug, Default)]
pub struct ListenerSet {
	listeners: HashSet<ListenerId>,
	count: usize,
}

impl ListenerSet {
	pub fn new() -> Self {
		Self::default()
	}

	/// Add a listener. Returns `false` if it was already present.
	pub fn add(&mut self, listener: ListenerId) -> bool {
		let label = listener.to_string();
		let inserted = self.listeners.insert(listener);
		if inserted {
			self.count += 1;
			debug!(listener = %label, "Listener added");
		}
		debug_assert_eq!(self.count, self.listeners.len());
		inserted
	}

	/// Remove a listener. Unknown listeners are a no-op.
	pub fn remove(&mut self, listener: &ListenerId) -> bool {
		let removed = self.listeners.remove(listener);
		if removed {
			self.count -= 1;
			debug!(listener = %listener, "Listener removed");
		}
		debug_assert_eq!(self.count, self.listeners.len());
		removed
	}

	pub fn contains(&self, listener: &ListenerId) -> bool {
		self.listeners.contains(listener)
	}

	pub fn count(&self) -> usize {
		self.count
	}
}

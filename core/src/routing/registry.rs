#![allow(missing_docs)]
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};

use arcstr::ArcStr;
use tracing::debug;

use super::session::{SessionRef, SessionTransport};

/// Registry value for one connection id
///
/// The session is held weakly: the transport layer owns its sessions and
/// the registry must not extend their lifetime.
#[derive(Clone)]
pub struct SubscriberEntry {
	room: ArcStr,
	session: Weak<dyn SessionTransport>,
}

impl SubscriberEntry {
	/// Room the connection joined
	pub fn room(&self) -> &ArcStr {
		&self.room
	}

	/// Live session handle, `None` once the transport dropped it
	pub fn session(&self) -> Option<SessionRef> {
		self.session.upgrade()
	}
}

impl fmt::Debug for SubscriberEntry {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("SubscriberEntry")
			.field("room", &self.room)
			.field("alive", &(self.session.strong_count() > 0))
			.finish()
	}
}

/// In-process mapping from connection id to room and session
///
/// Every operation is total; absence is a value, never an error.
#[derive(Debug, Default)]
pub struct SubscriberRegistry {
	entries: HashMap<ArcStr, SubscriberEntry>,
}

impl SubscriberRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	/// Insert or overwrite the entry for `conn_id`.
	///
	/// Returns the replaced entry, if any.
	pub fn add(
		&mut self,
		conn_id: impl Into<ArcStr>,
		room: impl Into<ArcStr>,
		session: &SessionRef,
	) -> Option<SubscriberEntry> {
		let conn_id = conn_id.into();
		let entry = SubscriberEntry {
			room: room.into(),
			session: Arc::downgrade(session),
		};
		debug!(conn_id = %conn_id, room = %entry.room, "Subscriber added to room");
		self.entries.insert(conn_id, entry)
	}

	/// Remove the entry for `conn_id`; absent ids are a no-op.
	pub fn remove(&mut self, conn_id: &str) -> Option<SubscriberEntry> {
		let removed = self.entries.remove(conn_id);
		if let Some(entry) = &removed {
			debug!(conn_id = %conn_id, room = %entry.room, "Subscriber removed from room");
		}
		removed
	}

	pub fn lookup(&self, conn_id: &str) -> Option<&SubscriberEntry> {
		self.entries.get(conn_id)
	}

	pub fn count(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	/// Snapshot of registered connection ids, in no particular order
	pub fn ids(&self) -> Vec<ArcStr> {
		self.entries.keys().cloned().collect()
	}

	/// Drop every entry
	pub fn clear(&mut self) {
		self.entries.clear();
	}
}

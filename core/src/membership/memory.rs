//! In-process membership store

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use futures::future::{self, BoxFuture};

use super::MembershipStore;
use crate::error::StoreError;

type Lists = HashMap<String, Vec<String>>;

/// Process-local membership store
///
/// Suitable for single-instance deployments and tests. Clones share the
/// same lists.
#[derive(Debug, Clone, Default)]
pub struct InMemoryMembershipStore {
	lists: Arc<Mutex<Lists>>,
}

impl InMemoryMembershipStore {
	/// Create an empty store
	pub fn new() -> Self {
		Self::default()
	}

	/// Append `member` to the list at `room`
	pub fn push(
		&self,
		room: impl Into<String>,
		member: impl Into<String>,
	) -> Result<(), StoreError> {
		self.with_lists(|lists| {
			lists.entry(room.into()).or_default().push(member.into());
		})
	}

	/// Snapshot of the list at `room`
	pub fn members(&self, room: &str) -> Result<Vec<String>, StoreError> {
		self.with_lists(|lists| lists.get(room).cloned().unwrap_or_default())
	}

	/// Remove every element equal to `member`; empty lists disappear
	pub fn remove(&self, room: &str, member: &str) -> Result<usize, StoreError> {
		self.with_lists(|lists| {
			let Some(list) = lists.get_mut(room) else {
				return 0;
			};
			let before = list.len();
			list.retain(|existing| existing != member);
			let removed = before - list.len();
			if list.is_empty() {
				lists.remove(room);
			}
			removed
		})
	}

	fn with_lists<R>(
		&self,
		f: impl FnOnce(&mut Lists) -> R,
	) -> Result<R, StoreError> {
		let mut lists = self.lists.lock().map_err(|_| {
			StoreError::Backend("membership lists lock poisoned".to_string())
		})?;
		Ok(f(&mut lists))
	}
}

impl MembershipStore for InMemoryMembershipStore {
	fn remove_member(
		&self,
		room: &str,
		member: &str,
	) -> BoxFuture<'static, Result<usize, StoreError>> {
		Box::pin(future::ready(self.remove(room, member)))
	}
}

//! Membership store client
//!
//! The membership store is shared by every bridge instance and records,
//! per room, which connections exist and on which host. The bridge only
//! ever removes records: when a routed event targets a connection this
//! instance does not hold, the stale record is dropped.

pub mod memory;
#[cfg(feature = "redis")]
pub mod redis_store;

use futures::future::BoxFuture;

pub use memory::InMemoryMembershipStore;
#[cfg(feature = "redis")]
pub use redis_store::RedisMembershipStore;
use crate::error::StoreError;

/// List-oriented store holding membership records keyed by room
pub trait MembershipStore: Send + Sync + 'static {
	/// Remove every element equal to `member` from the list at `room`.
	///
	/// Resolves to the number of removed elements; zero is not an error.
	fn remove_member(
		&self,
		room: &str,
		member: &str,
	) -> BoxFuture<'static, Result<usize, StoreError>>;
}

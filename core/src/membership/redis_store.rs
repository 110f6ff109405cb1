//! Redis-backed membership store

use futures::future::BoxFuture;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::debug;

use super::MembershipStore;
use crate::error::StoreError;

/// Membership store on a shared Redis instance
///
/// Records live in Redis lists keyed by room; removal is `LREM room 0 member`.
/// The connection manager reconnects on its own, so clones are cheap and
/// share one multiplexed connection.
#[derive(Clone)]
pub struct RedisMembershipStore {
	conn: ConnectionManager,
}

impl RedisMembershipStore {
	/// Connect to `url` (e.g. `redis://127.0.0.1/0`)
	pub async fn connect(url: &str) -> Result<Self, StoreError> {
		let client = redis::Client::open(url)?;
		let conn = ConnectionManager::new(client).await?;
		debug!(url = %url, "Connected to redis membership store");
		Ok(Self { conn })
	}

	/// Wrap an existing connection manager
	pub fn from_manager(conn: ConnectionManager) -> Self {
		Self { conn }
	}
}

impl MembershipStore for RedisMembershipStore {
	fn remove_member(
		&self,
		room: &str,
		member: &str,
	) -> BoxFuture<'static, Result<usize, StoreError>> {
		let mut conn = self.conn.clone();
		let room = room.to_string();
		let member = member.to_string();
		Box::pin(async move {
			let removed: usize = conn.lrem(&room, 0, &member).await?;
			Ok(removed)
		})
	}
}

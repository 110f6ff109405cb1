//! Routes inbound broker events to local sessions
//!
//! A hit delivers the data payload to the resolved session. A miss means
//! this instance does not hold the connection, so the membership record
//! pointing at it is stale and gets removed from the shared store.

use std::sync::Arc;

use arcstr::ArcStr;
use futures::future::BoxFuture;
use tracing::debug;

use crate::error::{DecodeError, DeliveryError, StoreError};
use crate::membership::MembershipStore;
use crate::message::InboundEvent;
use crate::routing::{SessionRef, SubscriberRegistry};

/// Outcome of routing one inbound event
///
/// Both variants carry the follow-up work as a future; the caller decides
/// where and with what timeout it runs.
pub enum Route {
	/// Connection held locally: deliver to its session
	Deliver {
		/// Target connection id
		conn_id: ArcStr,
		/// Broadcast to the single resolved session
		delivery: BoxFuture<'static, Result<(), DeliveryError>>,
	},
	/// Connection not held locally: drop its membership record
	Reconcile {
		/// Target connection id
		conn_id: ArcStr,
		/// Room key of the membership list
		room: ArcStr,
		/// A registry entry existed but its session was already gone
		stale_local: bool,
		/// Store removal; resolves to the number of removed records
		removal: BoxFuture<'static, Result<usize, StoreError>>,
	},
}

impl std::fmt::Debug for Route {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			| Route::Deliver { conn_id, .. } => {
				f.debug_struct("Deliver").field("conn_id", conn_id).finish()
			}
			| Route::Reconcile {
				conn_id,
				room,
				stale_local,
				..
			} => f
				.debug_struct("Reconcile")
				.field("conn_id", conn_id)
				.field("room", room)
				.field("stale_local", stale_local)
				.finish(),
		}
	}
}

/// Stateless router between the registry and the membership store
#[derive(Clone)]
pub struct Dispatcher {
	store: Arc<dyn MembershipStore>,
}

impl Dispatcher {
	/// Dispatcher reconciling misses against `store`
	pub fn new(store: Arc<dyn MembershipStore>) -> Self {
		Self { store }
	}

	/// Decode `payload` and resolve it against `registry`.
	///
	/// Decode failures are returned to the caller, which logs and drops
	/// the message.
	pub fn dispatch(
		&self,
		registry: &SubscriberRegistry,
		payload: &[u8],
	) -> Result<Route, DecodeError> {
		let event = InboundEvent::decode(payload)?;
		debug!(conn_id = %event.uid, room = %event.room, host = %event.host, "Routing event");

		let entry = registry.lookup(&event.uid);
		let session = entry.and_then(|entry| entry.session());
		match session {
			| Some(session) => Ok(self.deliver(event, session)),
			| None => Ok(self.reconcile(event, entry.is_some())),
		}
	}

	fn deliver(&self, event: InboundEvent, session: SessionRef) -> Route {
		let conn_id = ArcStr::from(event.uid.as_str());
		let payload = event.into_envelope().encode();
		let recipients = [Arc::clone(&session)];
		let delivery = session.broadcast(&recipients, payload);
		Route::Deliver { conn_id, delivery }
	}

	fn reconcile(&self, event: InboundEvent, stale_local: bool) -> Route {
		let member = event.member_record().encode();
		let removal = self.store.remove_member(&event.room, &member);
		Route::Reconcile {
			conn_id: ArcStr::from(event.uid),
			room: ArcStr::from(event.room),
			stale_local,
			removal,
		}
	}
}

impl std::fmt::Debug for Dispatcher {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Dispatcher").finish_non_exhaustive()
	}
}

//! Public client of the bridge actor

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use arcstr::ArcStr;
use tokio::sync::watch;

use super::actor::{BridgeActor, BridgeHandler, BridgeStats, Command};
use crate::broker::{AmqpConnector, BrokerConnector, ConnectionState};
use crate::config::BridgeConfig;
use crate::connection::BridgeConnection;
use crate::error::BridgeError;
use crate::membership::MembershipStore;
use crate::routing::{ListenerId, SessionRef};

/// Client of the bridge actor
///
/// Cheap to clone. Every call is a message to the actor, so calls from
/// one task are applied in order.
#[derive(Clone, Debug)]
pub struct Bridge {
	handler: BridgeHandler,
}

impl Bridge {
	/// Start a bridge against a real AMQP broker.
	///
	/// Returns both client and lifecycle handle. The initial connect is
	/// issued before this returns; failures are retried in the background.
	pub async fn connect(
		config: BridgeConfig,
		store: Arc<dyn MembershipStore>,
	) -> Result<(Self, BridgeConnection), BridgeError> {
		let connector = Arc::new(AmqpConnector::new(config.broker.clone()));
		Self::start(config, connector, store).await
	}

	/// Start a bridge with a custom broker connector
	pub async fn start(
		config: BridgeConfig,
		connector: Arc<dyn BrokerConnector>,
		store: Arc<dyn MembershipStore>,
	) -> Result<(Self, BridgeConnection), BridgeError> {
		config.validate()?;
		let (controller, handler) =
			BridgeActor::spawn(config, connector, store);
		let bridge = Self { handler };
		bridge.connect_broker().await?;
		Ok((bridge, BridgeConnection::new(controller)))
	}

	/// Ask for a broker connection.
	///
	/// Ignored while a connection attempt is in flight, established, or
	/// already scheduled for retry.
	pub async fn connect_broker(&self) -> Result<(), BridgeError> {
		self.handler.send(Command::Connect).await
	}

	/// Route events for `conn_id` to `session`, replacing any previous
	/// entry. Returns `true` if an entry was replaced.
	pub async fn add_subscriber(
		&self,
		conn_id: impl Into<ArcStr>,
		room: impl Into<ArcStr>,
		session: SessionRef,
	) -> Result<bool, BridgeError> {
		let conn_id = conn_id.into();
		let room = room.into();
		self.handler
			.request(|reply| Command::AddSubscriber {
				conn_id,
				room,
				session,
				reply,
			})
			.await
	}

	/// Stop routing events for `conn_id`. Returns `false` if it was unknown.
	pub async fn remove_subscriber(
		&self,
		conn_id: impl Into<ArcStr>,
	) -> Result<bool, BridgeError> {
		let conn_id = conn_id.into();
		self.handler
			.request(|reply| Command::RemoveSubscriber { conn_id, reply })
			.await
	}

	/// Room of a registered connection
	pub async fn lookup_subscriber(
		&self,
		conn_id: impl Into<ArcStr>,
	) -> Result<Option<ArcStr>, BridgeError> {
		let conn_id = conn_id.into();
		self.handler
			.request(|reply| Command::LookupSubscriber { conn_id, reply })
			.await
	}

	/// Add a liveness listener. Returns `false` if already present.
	pub async fn add_listener(
		&self,
		listener: impl Into<ListenerId>,
	) -> Result<bool, BridgeError> {
		let listener = listener.into();
		self.handler
			.request(|reply| Command::AddListener { listener, reply })
			.await
	}

	/// Remove a liveness listener. Returns `false` if it was unknown.
	pub async fn remove_listener(
		&self,
		listener: impl Into<ListenerId>,
	) -> Result<bool, BridgeError> {
		let listener = listener.into();
		self.handler
			.request(|reply| Command::RemoveListener { listener, reply })
			.await
	}

	/// Connections in the subscriber registry
	pub async fn subscriber_count(&self) -> Result<usize, BridgeError> {
		Ok(self.stats().await?.subscriber_count)
	}

	/// Registered connection ids, in no particular order
	pub async fn subscriber_ids(&self) -> Result<Vec<ArcStr>, BridgeError> {
		self.handler.request(Command::SubscriberIds).await
	}

	/// Handles in the listener set
	pub async fn listener_count(&self) -> Result<usize, BridgeError> {
		Ok(self.stats().await?.listener_count)
	}

	/// Wall-clock time of the last connection attempt
	pub async fn last_reconnect(&self) -> Result<SystemTime, BridgeError> {
		Ok(self.stats().await?.last_reconnect)
	}

	/// Time since the bridge started; broker reconnects do not reset it
	pub async fn uptime(&self) -> Result<Duration, BridgeError> {
		Ok(self.stats().await?.uptime)
	}

	/// Current broker connection state, without a round trip to the actor
	pub fn connection_state(&self) -> ConnectionState {
		*self.handler.state_watch().borrow()
	}

	/// Snapshot of every accessor at once
	pub async fn stats(&self) -> Result<BridgeStats, BridgeError> {
		self.handler.request(Command::Stats).await
	}

	/// Receiver notified on every connection state change
	pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
		self.handler.state_watch()
	}
}

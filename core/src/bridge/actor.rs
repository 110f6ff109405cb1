#![allow(missing_docs)]
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use arcstr::ArcStr;
use futures::stream::FuturesUnordered;
use futures::StreamExt;
use tokio::sync::mpsc::{self, Receiver, Sender};
use tokio::sync::{oneshot, watch};
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, error, info, warn};

use crate::broker::consumer::{ConsumerTask, EventSink};
use crate::broker::{
	BrokerConnector, ConnectionManager, ConnectionState, LinkEvent,
};
use crate::config::{BridgeConfig, BridgeSettings, Topology};
use crate::dispatcher::{Dispatcher, Route};
use crate::error::{BridgeError, DeliveryError, StoreError};
use crate::membership::MembershipStore;
use crate::routing::{
	ListenerId, ListenerSet, SessionRef, SubscriberRegistry,
};

const SHUTDOWN_GRACE: Duration = Duration::from_millis(500);

/// Point-in-time view of the bridge accessors
#[derive(Debug, Clone, PartialEq)]
pub struct BridgeStats {
	/// Connections in the subscriber registry
	pub subscriber_count: usize,
	/// Handles in the listener set
	pub listener_count: usize,
	/// Broker connection state
	pub state: ConnectionState,
	/// Generation of the current connection attempt
	pub generation: u64,
	/// Wall-clock time of the last connection attempt
	pub last_reconnect: SystemTime,
	/// Time since the bridge started
	pub uptime: Duration,
	/// Deliveries and store removals in flight
	pub pending_tasks: usize,
}

pub enum Command {
	Connect,
	AddSubscriber {
		conn_id: ArcStr,
		room: ArcStr,
		session: SessionRef,
		reply: oneshot::Sender<bool>,
	},
	RemoveSubscriber {
		conn_id: ArcStr,
		reply: oneshot::Sender<bool>,
	},
	LookupSubscriber {
		conn_id: ArcStr,
		reply: oneshot::Sender<Option<ArcStr>>,
	},
	SubscriberIds(oneshot::Sender<Vec<ArcStr>>),
	AddListener {
		listener: ListenerId,
		reply: oneshot::Sender<bool>,
	},
	RemoveListener {
		listener: ListenerId,
		reply: oneshot::Sender<bool>,
	},
	Stats(oneshot::Sender<BridgeStats>),
}

/// Result of a spawned delivery or membership removal
enum PendingOutcome {
	Delivered {
		conn_id: ArcStr,
		seq: u64,
		result: Result<(), DeliveryError>,
	},
	Reconciled {
		conn_id: ArcStr,
		room: ArcStr,
		result: Result<usize, StoreError>,
	},
}

/// Completion signal of the newest delivery queued for one connection
///
/// The next delivery for the same connection waits on it, so a session
/// sees events in broker order.
struct DeliveryTail {
	seq: u64,
	done: oneshot::Receiver<()>,
}

struct RunningConsumer {
	generation: u64,
	stop_tx: oneshot::Sender<()>,
	handle: JoinHandle<()>,
}

/// Single owner of registry, listener set and connection state
pub struct BridgeActor {
	registry: SubscriberRegistry,
	listeners: ListenerSet,
	manager: ConnectionManager,
	dispatcher: Dispatcher,
	connector: Arc<dyn BrokerConnector>,
	topology: Arc<Topology>,
	consumer_tag: Arc<str>,
	settings: BridgeSettings,
	command_rx: Receiver<Command>,
	link_tx: Sender<(u64, LinkEvent)>,
	link_rx: Receiver<(u64, LinkEvent)>,
	shutdown_rx: oneshot::Receiver<()>,
	consumer: Option<RunningConsumer>,
	pending: FuturesUnordered<JoinHandle<PendingOutcome>>,
	delivery_tails: HashMap<ArcStr, DeliveryTail>,
	delivery_seq: u64,
}

impl BridgeActor {
	pub fn spawn(
		config: BridgeConfig,
		connector: Arc<dyn BrokerConnector>,
		store: Arc<dyn MembershipStore>,
	) -> (BridgeController, BridgeHandler) {
		let BridgeConfig {
			topology,
			settings,
			..
		} = config;
		let (command_tx, command_rx) =
			mpsc::channel(settings.command_channel_capacity);
		let (link_tx, link_rx) =
			mpsc::channel(settings.command_channel_capacity);
		let (shutdown_tx, shutdown_rx) = oneshot::channel();
		let manager = ConnectionManager::new(settings.reconnect_delay);
		let state_rx = manager.watch();

		let actor = Self {
			registry: SubscriberRegistry::new(),
			listeners: ListenerSet::new(),
			manager,
			dispatcher: Dispatcher::new(store),
			connector,
			topology: Arc::new(topology),
			consumer_tag: Arc::from(settings.consumer_tag.as_str()),
			settings,
			command_rx,
			link_tx,
			link_rx,
			shutdown_rx,
			consumer: None,
			pending: FuturesUnordered::new(),
			delivery_tails: HashMap::new(),
			delivery_seq: 0,
		};
		let join_handle = tokio::spawn(async move { actor.run().await });

		let controller = BridgeController {
			shutdown_tx,
			join_handle,
		};
		let handler = BridgeHandler {
			command_tx,
			state_rx,
		};
		(controller, handler)
	}

	async fn run(mut self) {
		loop {
			tokio::select! {
				_ = &mut self.shutdown_rx => {
					info!("BridgeActor: Shutdown signal received");
					break;
				}
				Some(done) = self.pending.next() => self.handle_pending(done),
				Some((generation, event)) = self.link_rx.recv() => {
					self.handle_link_event(generation, event);
				}
				cmd = self.command_rx.recv() => {
					if let Some(cmd) = cmd {
						self.handle_command(cmd);
					} else {
						info!("BridgeActor: Command channel closed, exiting");
						break;
					}
				}
			}
		}
		info!("BridgeActor: Exiting run loop");
		self.cleanup().await;
	}

	fn handle_command(&mut self, cmd: Command) {
		match cmd {
			| Command::Connect => self.connect(),
			| Command::AddSubscriber {
				conn_id,
				room,
				session,
				reply,
			} => {
				let replaced =
					self.registry.add(conn_id, room, &session).is_some();
				let _ = reply.send(replaced);
			}
			| Command::RemoveSubscriber { conn_id, reply } => {
				let removed = self.registry.remove(&conn_id).is_some();
				let _ = reply.send(removed);
			}
			| Command::LookupSubscriber { conn_id, reply } => {
				let room = self
					.registry
					.lookup(&conn_id)
					.map(|entry| entry.room().clone());
				let _ = reply.send(room);
			}
			| Command::SubscriberIds(reply) => {
				let _ = reply.send(self.registry.ids());
			}
			| Command::AddListener { listener, reply } => {
				let _ = reply.send(self.listeners.add(listener));
			}
			| Command::RemoveListener { listener, reply } => {
				let _ = reply.send(self.listeners.remove(&listener));
			}
			| Command::Stats(reply) => {
				let _ = reply.send(self.stats());
			}
		}
	}

	fn connect(&mut self) {
		if let Some(generation) = self.manager.begin_connect() {
			info!(generation, "Connecting to broker");
			self.spawn_consumer(generation);
		}
	}

	fn spawn_consumer(&mut self, generation: u64) {
		let (stop_tx, stop_rx) = oneshot::channel();
		let task = ConsumerTask {
			connector: Arc::clone(&self.connector),
			topology: Arc::clone(&self.topology),
			consumer_tag: Arc::clone(&self.consumer_tag),
			sink: EventSink::new(generation, self.link_tx.clone()),
		};
		let handle = tokio::spawn(task.run(stop_rx));
		self.consumer = Some(RunningConsumer {
			generation,
			stop_tx,
			handle,
		});
	}

	fn handle_link_event(&mut self, generation: u64, event: LinkEvent) {
		match event {
			| LinkEvent::Connected => {
				if self.manager.advance(generation, ConnectionState::Connected)
				{
					info!(generation, "Connected to broker");
				}
			}
			| LinkEvent::ChannelOpened => {
				if self
					.manager
					.advance(generation, ConnectionState::ChannelOpen)
				{
					info!(generation, "Channel open, declaring topology");
				}
			}
			| LinkEvent::TopologyReady { queue } => {
				if self
					.manager
					.advance(generation, ConnectionState::TopologyReady)
				{
					info!(generation, queue = %queue, "Queue bound");
				}
			}
			| LinkEvent::Consuming => {
				if self.manager.advance(generation, ConnectionState::Consuming)
				{
					info!(generation, "Consuming broker deliveries");
				}
			}
			| LinkEvent::Delivery(body) => {
				if generation != self.manager.generation()
					|| self.manager.state() != ConnectionState::Consuming
				{
					debug!(generation, "Delivery from abandoned connection dropped");
					return;
				}
				self.handle_delivery(&body);
			}
			| LinkEvent::ConnectFailed(err) | LinkEvent::Closed(err) => {
				if let Some(delay) = self.manager.on_closed(generation) {
					warn!(
						generation,
						error = %err,
						delay = ?delay,
						"Broker connection lost, reconnect scheduled"
					);
					if self
						.consumer
						.as_ref()
						.is_some_and(|c| c.generation == generation)
					{
						self.consumer = None;
					}
					self.schedule_reconnect(generation, delay);
				}
			}
			| LinkEvent::ReconnectDue => {
				if let Some(next) = self.manager.begin_reconnect(generation) {
					self.spawn_consumer(next);
				}
			}
		}
	}

	fn schedule_reconnect(&self, generation: u64, delay: Duration) {
		let link_tx = self.link_tx.clone();
		tokio::spawn(async move {
			tokio::time::sleep(delay).await;
			let _ = link_tx.send((generation, LinkEvent::ReconnectDue)).await;
		});
	}

	fn handle_delivery(&mut self, body: &[u8]) {
		let route = match self.dispatcher.dispatch(&self.registry, body) {
			| Ok(route) => route,
			| Err(err) => {
				warn!(
					payload_size = body.len(),
					error = %err,
					"Dropping malformed broker event"
				);
				return;
			}
		};
		if self.pending.len() >= self.settings.max_pending_tasks {
			error!(
				route = ?route,
				queue_size = self.pending.len(),
				"Too many pending deliveries. Event dropped"
			);
			return;
		}
		match route {
			| Route::Deliver { conn_id, delivery } => {
				self.delivery_seq += 1;
				let seq = self.delivery_seq;
				let (done_tx, done_rx) = oneshot::channel();
				let tail = DeliveryTail { seq, done: done_rx };
				let previous = self.delivery_tails.insert(conn_id.clone(), tail);
				let timeout = self.settings.delivery_timeout;
				self.pending.push(tokio::spawn(async move {
					if let Some(previous) = previous {
						// Resolves on completion or when the predecessor is dropped
						let _ = previous.done.await;
					}
					let result = tokio::time::timeout(timeout, delivery)
						.await
						.unwrap_or(Err(DeliveryError::Timeout {
							timeout_millis: timeout.as_millis() as u64,
						}));
					let _ = done_tx.send(());
					PendingOutcome::Delivered {
						conn_id,
						seq,
						result,
					}
				}));
			}
			| Route::Reconcile {
				conn_id,
				room,
				stale_local,
				removal,
			} => {
				if stale_local {
					debug!(conn_id = %conn_id, "Pruning subscriber whose session is gone");
					self.registry.remove(&conn_id);
				}
				let timeout = self.settings.store_timeout;
				self.pending.push(tokio::spawn(async move {
					let result = tokio::time::timeout(timeout, removal)
						.await
						.unwrap_or(Err(StoreError::Timeout {
							timeout_millis: timeout.as_millis() as u64,
						}));
					PendingOutcome::Reconciled {
						conn_id,
						room,
						result,
					}
				}));
			}
		}
	}

	fn handle_pending(&mut self, done: Result<PendingOutcome, JoinError>) {
		if let Ok(PendingOutcome::Delivered { conn_id, seq, .. }) = &done {
			if self
				.delivery_tails
				.get(conn_id)
				.is_some_and(|tail| tail.seq == *seq)
			{
				self.delivery_tails.remove(conn_id);
			}
		}
		match done {
			| Ok(PendingOutcome::Delivered {
				conn_id,
				result: Ok(()),
				..
			}) => {
				debug!(conn_id = %conn_id, "Event delivered");
			}
			| Ok(PendingOutcome::Delivered {
				conn_id,
				result: Err(err),
				..
			}) => {
				warn!(conn_id = %conn_id, error = %err, "Event delivery failed");
			}
			| Ok(PendingOutcome::Reconciled {
				conn_id,
				room,
				result: Ok(removed),
			}) => {
				debug!(
					conn_id = %conn_id,
					room = %room,
					removed,
					"Stale membership reconciled"
				);
			}
			| Ok(PendingOutcome::Reconciled {
				conn_id,
				room,
				result: Err(err),
			}) => {
				error!(
					conn_id = %conn_id,
					room = %room,
					error = %err,
					"Failed to remove stale membership record"
				);
			}
			| Err(err) => {
				error!(error = ?err, "Failed to complete pending task");
			}
		}
	}

	fn stats(&self) -> BridgeStats {
		BridgeStats {
			subscriber_count: self.registry.count(),
			listener_count: self.listeners.count(),
			state: self.manager.state(),
			generation: self.manager.generation(),
			last_reconnect: self.manager.last_reconnect(),
			uptime: self.manager.uptime(),
			pending_tasks: self.pending.len(),
		}
	}

	/// Release everything the actor owns during shutdown:
	/// 1. Stop the consumer task so the broker connection closes
	/// 2. Let in-flight deliveries finish, bounded by a grace period
	/// 3. Clear routing state
	async fn cleanup(&mut self) {
		self.manager.shutdown();

		if let Some(consumer) = self.consumer.take() {
			let _ = consumer.stop_tx.send(());
			let mut handle = consumer.handle;
			if tokio::time::timeout(SHUTDOWN_GRACE, &mut handle)
				.await
				.is_err()
			{
				warn!(
					generation = consumer.generation,
					"Consumer task did not stop in time, aborting"
				);
				handle.abort();
			}
		}

		let drain_pending = async {
			while let Some(done) = self.pending.next().await {
				self.handle_pending(done);
			}
		};
		let res = tokio::time::timeout(SHUTDOWN_GRACE, drain_pending).await;
		let _ = res.inspect_err(|_| {
			warn!(
				timeout_ms = SHUTDOWN_GRACE.as_millis() as u64,
				"BridgeActor: Pending deliveries abandoned at shutdown"
			);
		});

		self.delivery_tails.clear();
		self.registry.clear();
	}
}

pub struct BridgeController {
	shutdown_tx: oneshot::Sender<()>,
	join_handle: JoinHandle<()>,
}

impl BridgeController {
	pub async fn shutdown(self) -> Result<(), BridgeError> {
		let _ = self.shutdown_tx.send(()).inspect_err(|_| {
			warn!("BridgeController: Shutdown signal already sent");
		});
		self.join_handle.await.map_err(|e| {
			warn!(error = ?e, "BridgeController: Actor run failed");
			BridgeError::from(e)
		})
	}
}

/// Cloneable command sender into the actor
#[derive(Debug, Clone)]
pub struct BridgeHandler {
	command_tx: Sender<Command>,
	state_rx: watch::Receiver<ConnectionState>,
}

impl BridgeHandler {
	pub async fn send(&self, cmd: Command) -> Result<(), BridgeError> {
		self.command_tx
			.send(cmd)
			.await
			.map_err(|_| BridgeError::ChannelClosed)
	}

	/// Send a command built around a reply channel and await the reply.
	pub async fn request<R>(
		&self,
		build: impl FnOnce(oneshot::Sender<R>) -> Command,
	) -> Result<R, BridgeError> {
		let (tx, rx) = oneshot::channel();
		self.send(build(tx)).await?;
		rx.await.map_err(|_| BridgeError::ResponseLost)
	}

	pub fn state_watch(&self) -> watch::Receiver<ConnectionState> {
		self.state_rx.clone()
	}
}

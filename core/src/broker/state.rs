//! Connection state machine
//!
//! ```text
//! Idle -> Connecting -> Connected -> ChannelOpen -> TopologyReady -> Consuming
//!            ^                                                          |
//!            |            (any active state on close/failure)           v
//!            +------- ReconnectPending <------------------------- Closed
//! ```
//!
//! Every connection attempt gets a new generation number. Events tagged
//! with an older generation belong to an abandoned attempt and are
//! ignored.

use std::fmt::Display;
use std::time::{Duration, SystemTime};

use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// State of the single broker connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
	/// No attempt made yet
	Idle,
	/// Connection attempt in flight
	Connecting,
	/// Connection open, no channel yet
	Connected,
	/// Channel open, topology not declared yet
	ChannelOpen,
	/// Exchange and queue declared and bound
	TopologyReady,
	/// Consumer running, deliveries flowing
	Consuming,
	/// Connection dropped or attempt failed
	Closed,
	/// Waiting for the reconnect timer
	ReconnectPending,
}

impl ConnectionState {
	/// States in which a connection attempt is underway or established
	pub fn is_active(self) -> bool {
		matches!(
			self,
			Self::Connecting
				| Self::Connected
				| Self::ChannelOpen
				| Self::TopologyReady
				| Self::Consuming
		)
	}

	/// State the given step is allowed to follow
	fn predecessor_of(self) -> Option<Self> {
		match self {
			| Self::Connected => Some(Self::Connecting),
			| Self::ChannelOpen => Some(Self::Connected),
			| Self::TopologyReady => Some(Self::ChannelOpen),
			| Self::Consuming => Some(Self::TopologyReady),
			| _ => None,
		}
	}
}

impl Display for ConnectionState {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let name = match self {
			| Self::Idle => "idle",
			| Self::Connecting => "connecting",
			| Self::Connected => "connected",
			| Self::ChannelOpen => "channel_open",
			| Self::TopologyReady => "topology_ready",
			| Self::Consuming => "consuming",
			| Self::Closed => "closed",
			| Self::ReconnectPending => "reconnect_pending",
		};
		f.write_str(name)
	}
}

/// Bookkeeping for the broker connection lifecycle
///
/// Holds no I/O resources. The owner asks it whether to start an attempt,
/// feeds it progress and close events, and schedules the reconnect timer
/// when told to.
#[derive(Debug)]
pub struct ConnectionManager {
	state: ConnectionState,
	generation: u64,
	started_at: Instant,
	last_reconnect: SystemTime,
	reconnect_delay: Duration,
	state_tx: watch::Sender<ConnectionState>,
}

impl ConnectionManager {
	/// Idle manager; uptime starts now
	pub fn new(reconnect_delay: Duration) -> Self {
		let (state_tx, _) = watch::channel(ConnectionState::Idle);
		Self {
			state: ConnectionState::Idle,
			generation: 0,
			started_at: Instant::now(),
			last_reconnect: SystemTime::now(),
			reconnect_delay,
			state_tx,
		}
	}

	/// Current state
	pub fn state(&self) -> ConnectionState {
		self.state
	}

	/// Generation of the current (or most recent) attempt
	pub fn generation(&self) -> u64 {
		self.generation
	}

	/// Wall-clock time of the most recent connection attempt
	pub fn last_reconnect(&self) -> SystemTime {
		self.last_reconnect
	}

	/// Time since the manager was created; unaffected by reconnects
	pub fn uptime(&self) -> Duration {
		self.started_at.elapsed()
	}

	/// Fixed delay between a close and the next attempt
	pub fn reconnect_delay(&self) -> Duration {
		self.reconnect_delay
	}

	/// Receiver observing every state change
	pub fn watch(&self) -> watch::Receiver<ConnectionState> {
		self.state_tx.subscribe()
	}

	/// Request a connection attempt.
	///
	/// Returns the generation to start, or `None` when an attempt is
	/// already underway, established, or scheduled by the reconnect timer.
	pub fn begin_connect(&mut self) -> Option<u64> {
		if self.state != ConnectionState::Idle {
			info!(state = %self.state, "Already connecting to broker, connect ignored");
			return None;
		}
		Some(self.start_attempt())
	}

	/// Reconnect timer fired for the attempt that scheduled it.
	pub fn begin_reconnect(&mut self, scheduled_by: u64) -> Option<u64> {
		if self.state != ConnectionState::ReconnectPending
			|| scheduled_by != self.generation
		{
			debug!(
				scheduled_by,
				generation = self.generation,
				state = %self.state,
				"Stale reconnect timer ignored"
			);
			return None;
		}
		info!(generation = self.generation, "Reconnecting to broker");
		Some(self.start_attempt())
	}

	/// Record progress of the current attempt.
	///
	/// Returns `false` for stale or out-of-order steps, which leave the
	/// state untouched.
	pub fn advance(&mut self, generation: u64, next: ConnectionState) -> bool {
		if generation != self.generation {
			debug!(generation, current = self.generation, step = %next, "Stale connection step ignored");
			return false;
		}
		if next.predecessor_of() != Some(self.state) {
			warn!(from = %self.state, to = %next, "Unexpected connection step ignored");
			return false;
		}
		self.set_state(next);
		true
	}

	/// Record that the current attempt failed or its connection dropped.
	///
	/// Returns the delay after which the owner must deliver the reconnect
	/// timer for this generation, or `None` if the event is stale or the
	/// connection is not active.
	pub fn on_closed(&mut self, generation: u64) -> Option<Duration> {
		if generation != self.generation || !self.state.is_active() {
			debug!(generation, current = self.generation, state = %self.state, "Stale close ignored");
			return None;
		}
		self.set_state(ConnectionState::Closed);
		self.set_state(ConnectionState::ReconnectPending);
		Some(self.reconnect_delay)
	}

	/// Move to `Closed` for good; later reconnect timers are ignored.
	pub fn shutdown(&mut self) {
		self.generation += 1;
		self.set_state(ConnectionState::Closed);
	}

	fn start_attempt(&mut self) -> u64 {
		self.generation += 1;
		self.last_reconnect = SystemTime::now();
		self.set_state(ConnectionState::Connecting);
		self.generation
	}

	fn set_state(&mut self, state: ConnectionState) {
		debug!(from = %self.state, to = %state, generation = self.generation, "Connection state change");
		self.state = state;
		self.state_tx.send_replace(state);
	}
}

//! Session transport seam
//!
//! The bridge never writes to end users itself. A session transport is
//! whatever the web-socket layer hands in when a subscriber joins a
//! room; the bridge only asks it to broadcast payloads.

use std::sync::Arc;

use arcstr::ArcStr;
use futures::future::{self, BoxFuture};
use tokio::sync::mpsc::{self, Receiver, Sender};

use crate::error::DeliveryError;

/// Shared handle to a session transport
pub type SessionRef = Arc<dyn SessionTransport>;

/// Delivery side of one end-user session
pub trait SessionTransport: Send + Sync + 'static {
	/// Queue a payload for this session.
	fn send(
		&self,
		payload: ArcStr,
	) -> BoxFuture<'static, Result<(), DeliveryError>>;

	/// Deliver a payload to every session in `recipients`.
	///
	/// Fails with the first delivery error; the remaining sends still run.
	fn broadcast(
		&self,
		recipients: &[SessionRef],
		payload: ArcStr,
	) -> BoxFuture<'static, Result<(), DeliveryError>> {
		let sends = recipients
			.iter()
			.map(|session| session.send(payload.clone()))
			.collect::<Vec<_>>();
		Box::pin(async move {
			future::join_all(sends).await.into_iter().collect()
		})
	}
}

/// Session transport backed by a bounded tokio channel
///
/// The receiving half is drained by the web-socket writer task.
#[derive(Debug, Clone)]
pub struct ChannelSession {
	tx: Sender<ArcStr>,
}

impl ChannelSession {
	/// Create a session and the receiver its writer drains
	pub fn new(capacity: usize) -> (Arc<Self>, Receiver<ArcStr>) {
		let (tx, rx) = mpsc::channel(capacity);
		(Arc::new(Self { tx }), rx)
	}

	/// Whether the writer side has gone away
	pub fn is_closed(&self) -> bool {
		self.tx.is_closed()
	}
}

impl SessionTransport for ChannelSession {
	fn send(
		&self,
		payload: ArcStr,
	) -> BoxFuture<'static, Result<(), DeliveryError>> {
		let tx = self.tx.clone();
		Box::pin(async move {
			tx.send(payload)
				.await
				.map_err(|_| DeliveryError::SessionClosed)
		})
	}
}

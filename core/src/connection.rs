//! Bridge lifecycle management module
//!
//! This module provides the lifecycle handle separated from the [`Bridge`]
//! client so the transport layer can hold clients freely while exactly
//! one owner decides when the process stops.
//!
//! [`Bridge`]: crate::Bridge

use tracing::{error, warn};

use crate::bridge::BridgeController;
use crate::error::BridgeError;

/// Lifecycle handle returned by [`Bridge::start`](crate::Bridge::start)
///
/// Keep it alive for the lifetime of the process and call
/// [`shutdown`](Self::shutdown) before exit.
pub struct BridgeConnection {
	controller: Option<BridgeController>,
}

impl BridgeConnection {
	pub(crate) fn new(controller: BridgeController) -> Self {
		Self {
			controller: Some(controller),
		}
	}

	/// Gracefully shut the bridge down by:
	/// 1. Signalling the actor to leave its loop
	/// 2. Letting the actor stop the consumer task (closing the broker
	///    connection) and drain in-flight deliveries
	/// 3. Waiting for the actor task to finish
	pub async fn shutdown(mut self) -> Result<(), BridgeError> {
		if let Some(controller) = self.controller.take() {
			controller.shutdown().await
		} else {
			warn!("No bridge controller available for shutdown");
			Ok(())
		}
	}
}

impl Drop for BridgeConnection {
	fn drop(&mut self) {
		if self.controller.is_some() {
			error!(
				"BridgeConnection dropped without calling shutdown(). Please \
				 call shutdown() and await its completion before dropping."
			);
		}
	}
}

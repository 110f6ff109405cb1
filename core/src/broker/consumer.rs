//! Consumer task driving one connection attempt
//!
//! The task connects, opens a channel, declares the topology from
//! scratch, and forwards deliveries until the connection drops. Progress
//! is reported as [`LinkEvent`]s tagged with the attempt's generation.

use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::mpsc::Sender;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use super::link::{BrokerConnector, BrokerLink, DeliveryStream};
use crate::config::Topology;
use crate::error::BrokerError;

/// Progress and traffic reported to the bridge actor
#[derive(Debug)]
pub enum LinkEvent {
	/// Connection opened
	Connected,
	/// Channel opened
	ChannelOpened,
	/// Exchange and queue declared, queue bound
	TopologyReady {
		/// Name of the declared queue
		queue: String,
	},
	/// Consumer started
	Consuming,
	/// One message body
	Delivery(Vec<u8>),
	/// Connection attempt failed before a connection existed
	ConnectFailed(BrokerError),
	/// Connection dropped or a setup step failed
	Closed(BrokerError),
	/// Reconnect delay elapsed
	ReconnectDue,
}

/// Generation-tagged sender of link events
#[derive(Debug, Clone)]
pub(crate) struct EventSink {
	generation: u64,
	tx: Sender<(u64, LinkEvent)>,
}

impl EventSink {
	pub(crate) fn new(generation: u64, tx: Sender<(u64, LinkEvent)>) -> Self {
		Self { generation, tx }
	}

	/// Returns `false` once the actor has gone away.
	async fn emit(&self, event: LinkEvent) -> bool {
		self.tx.send((self.generation, event)).await.is_ok()
	}
}

/// Parameters of one consumer task
pub(crate) struct ConsumerTask {
	pub(crate) connector: Arc<dyn BrokerConnector>,
	pub(crate) topology: Arc<Topology>,
	pub(crate) consumer_tag: Arc<str>,
	pub(crate) sink: EventSink,
}

impl ConsumerTask {
	/// Run until the connection drops, setup fails, or `stop` fires.
	pub(crate) async fn run(self, mut stop: oneshot::Receiver<()>) {
		let Self {
			connector,
			topology,
			consumer_tag,
			sink,
		} = self;
		let generation = sink.generation;

		let mut link = match connector.connect().await {
			| Ok(link) => link,
			| Err(err) => {
				warn!(generation, error = %err, "Broker connection attempt failed");
				sink.emit(LinkEvent::ConnectFailed(err)).await;
				return;
			}
		};
		if !sink.emit(LinkEvent::Connected).await {
			return;
		}

		let setup = tokio::select! {
			_ = &mut stop => None,
			res = establish(link.as_mut(), &topology, &consumer_tag, &sink) => Some(res),
		};
		let mut deliveries = match setup {
			| None => {
				close_link(link.as_mut(), generation).await;
				return;
			}
			| Some(Ok(Some(deliveries))) => deliveries,
			| Some(Ok(None)) => return,
			| Some(Err(err)) => {
				warn!(generation, error = %err, "Broker topology setup abandoned");
				close_link(link.as_mut(), generation).await;
				sink.emit(LinkEvent::Closed(err)).await;
				return;
			}
		};

		let reason = loop {
			tokio::select! {
				_ = &mut stop => {
					close_link(link.as_mut(), generation).await;
					return;
				}
				item = deliveries.next() => match item {
					| Some(Ok(body)) => {
						if !sink.emit(LinkEvent::Delivery(body)).await {
							return;
						}
					}
					| Some(Err(err)) => break err,
					| None => break BrokerError::StreamEnded,
				}
			}
		};
		info!(generation, reason = %reason, "Broker connection closed");
		sink.emit(LinkEvent::Closed(reason)).await;
	}
}

/// Declare topology and start consuming.
///
/// `Ok(None)` means the actor disappeared midway.
async fn establish(
	link: &mut dyn BrokerLink,
	topology: &Topology,
	consumer_tag: &str,
	sink: &EventSink,
) -> Result<Option<DeliveryStream>, BrokerError> {
	link.open_channel().await?;
	if !sink.emit(LinkEvent::ChannelOpened).await {
		return Ok(None);
	}

	debug!(exchange = %topology.exchange_name, kind = %topology.exchange_type, "Declaring exchange");
	link.declare_exchange(&topology.exchange_name, &topology.exchange_type)
		.await?;
	let queue = link.declare_queue(&topology.queue_name).await?;
	debug!(queue = %queue, exchange = %topology.exchange_name, "Binding queue");
	link.bind_queue(
		&queue,
		&topology.exchange_name,
		topology.binding_key(&queue),
	)
	.await?;
	if !sink
		.emit(LinkEvent::TopologyReady {
			queue: queue.clone(),
		})
		.await
	{
		return Ok(None);
	}

	let deliveries = link.consume(&queue, consumer_tag).await?;
	if !sink.emit(LinkEvent::Consuming).await {
		return Ok(None);
	}
	Ok(Some(deliveries))
}

async fn close_link(link: &mut dyn BrokerLink, generation: u64) {
	if let Err(err) = link.close().await {
		debug!(generation, error = %err, "Broker connection close failed");
	}
}

//! Subscriber routing module
//!
//! This module holds the in-process routing state owned by the bridge
//! actor: the subscriber registry mapping connection ids to sessions,
//! the coarse listener set used for liveness reporting, and the session
//! transport seam deliveries go through.

pub mod listeners;
/// Connection id to room/session mapping
pub mod registry;
pub mod session;


// Re-export commonly used types for convenience
pub use listeners::{ListenerId, ListenerSet};
pub use registry::{SubscriberEntry, SubscriberRegistry};
pub use session::{ChannelSession, SessionRef, SessionTransport};

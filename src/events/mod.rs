//! Event infrastructure.
//!
//! Lifecycle events are published to an [`EventPublisher`] and come back in
//! through the [`EventRouter`]. In a single process the loop is closed by a
//! [`ChannelPublisher`] and its [`EventDrain`].

mod publisher;
mod router;
mod types;

pub use publisher::{ChannelPublisher, EventDrain, EventPublisher, RecordingPublisher};
pub use router::{EventRouter, Route};
pub use types::*;

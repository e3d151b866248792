//! Session layer
//!
//! Ties the audio and codec building blocks into the two directions of a
//! voice-agent conversation: [`Uplink`] for the microphone and
//! [`PlaybackSession`] behind an [`InboundRouter`] for the reply stream.

pub mod player;
pub mod router;
pub mod uplink;

pub use player::{PlaybackSession, SessionStats};
pub use router::{InboundRouter, RouteEvent};
pub use uplink::Uplink;

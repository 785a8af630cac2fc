//! WebSocket layer: the duplex channel between clients and the coordinator.
//!
//! Each connection is bound to one session and one participant. Inbound
//! envelopes are dispatched to the session controller; outbound events are
//! queued per connection in the hub and drained by the connection's send
//! task, so REST-triggered notifications and controller broadcasts share
//! one delivery path.

pub mod handler;
pub mod hub;
pub mod types;

pub use handler::ws_handler;
pub use hub::{ConnectionHub, ConnectionId};
pub use types::{ClientEnvelope, ServerEvent, SessionMeta, SttTogglePayload};

//! Session coordination module.
//!
//! Owns session lifecycle, participant membership, signal aggregation and
//! the duplex protocol state machine.

pub mod aggregator;
pub mod controller;
pub mod error;
pub mod models;
pub mod registry;

pub use aggregator::SessionSummary;
pub use controller::SessionController;
pub use error::{SessionError, SessionResult};
pub use models::{
    Chat, CreateSessionRequest, JoinSessionRequest, Participant, Session, Signal, TranscriptEntry,
};
pub use registry::SessionRegistry;

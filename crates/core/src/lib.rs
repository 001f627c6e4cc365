//! Core logic of the chat feature: the lazily created session, the message
//! dispatcher and its retry policy.
//!
//! The front-end only ever calls [`Dispatcher::send`] and gets back a
//! [`Reply`]. Everything that can go wrong on the way to the model is
//! absorbed here.

#![deny(missing_docs)]
#![deny(clippy::missing_safety_doc)]

#[macro_use]
extern crate tracing;

pub mod conversation;
mod dispatcher;
mod model_client;
mod retry;
mod session;

pub use dispatcher::{
    Dispatcher, OFFLINE_TEXT, Reply, ReplyOutcome, TRANSMISSION_FAILURE_TEXT,
};
pub use retry::{RetrySchedule, ScheduledBackoff};
pub use session::{ChatSession, ConfigurationError, SessionManager, TurnGuard};

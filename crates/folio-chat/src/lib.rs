//! The chat assistant of the portfolio site, ready to be embedded.
//!
//! [`ChatWidget`] is the UI-side state of the floating chat window: the
//! transcript, the open/closed flag and the pending reply. It talks to the
//! model through a [`core::Dispatcher`], which can be wired to Gemini from
//! the process environment with [`session_manager_from_env`].
//!
//! The crate also ships a small terminal front-end behind the `cli` feature.

#![deny(missing_docs)]

#[macro_use]
extern crate tracing;

mod config;
mod widget;

pub use config::{
    API_KEY_VARS, BASE_URL_VAR, MODEL_VAR, gemini_config_from_env,
    session_manager_from_env,
};
pub use widget::{
    ChatWidget, DispatchOutcome, DispatchState, GREETING, PendingReply, Role,
    Transcript, Turn,
};

/// The persona every chat session is bound to.
pub const SYSTEM_PROMPT: &str = include_str!("./persona.md");

/// Re-exports of [`folio_chat_core`] crate.
pub mod core {
    pub use folio_chat_core::*;
}

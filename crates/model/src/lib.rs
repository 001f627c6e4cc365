//! A provider-neutral protocol for talking to generative language models.
//!
//! The chat core only ever speaks in terms of the types defined here, so
//! the concrete provider (and its wire format) can be swapped without
//! touching the session or retry logic.
//!
//! Types in this crate don't define any behavior, instead they are the
//! constraints that the implementors should adhere to.

#![deny(missing_docs)]

mod error;
mod provider;
mod request;
mod response;

pub use error::*;
pub use provider::*;
pub use request::*;
pub use response::*;

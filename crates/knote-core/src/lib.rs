#![forbid(unsafe_code)]

//! knote core
//!
//! Shared plumbing for the knote crates:
//!
//! - [`Signal`] / [`Subscription`] - synchronous, ordered, same-thread
//!   observer registration used for every notification in the workspace
//! - [`logging`] - tracing subscriber installation (feature `log-init`)
//!
//! # Role in knote
//! `knote-text` and `knote-tree` publish buffer, row and view events through
//! [`Signal`]; `knote-app` wires them together and installs logging.

pub mod signal;

#[cfg(feature = "log-init")]
pub mod logging;

pub use signal::{Signal, Subscription};

#[cfg(feature = "log-init")]
pub use logging::{LoggingConfig, LoggingError, init_logging};

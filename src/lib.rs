//! Variables Management Library
//!
//! Secret-backed variable store for the integration platform.
//!
//! - [`gateway`] talks to the Kubernetes Secret API (or an in-memory stand-in)
//!   and expresses every bulk mutation as one JSON-Patch request built by
//!   [`patch`].
//! - [`catalog`] lists labelled secrets with their decoded contents.
//! - [`mutation`] delivers async patch results through exactly-once callbacks.
//! - [`restore`] brings the default variable baseline back after startup or
//!   loss of the secured variables secret.

pub mod catalog;
pub mod common;
pub mod config;
pub mod constants;
pub mod defaults;
pub mod error;
pub mod gateway;
pub mod metrics;
pub mod mutation;
pub mod patch;
pub mod restore;
pub mod retry;
pub mod secured;
pub mod server;
pub mod watch;

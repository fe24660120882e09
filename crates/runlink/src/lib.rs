//! `runlink`: supervised runtime subprocess bridge.
//!
//! Launches the external agent runtime as a child process, wires its
//! stdin/stdout/stderr to the host as byte channels, injects identification
//! and debug environment, and guarantees bounded-time teardown on explicit
//! disposal or host shutdown:
//! - closing the input channel is the graceful-exit signal (EOF),
//! - a child that ignores it is force-killed, process group included,
//!   after [`bridge::GRACEFUL_EXIT_TIMEOUT`],
//! - the shutdown sweep in [`shutdown`] reaps bridges the host never
//!   disposed.
//!
//! One bridge supervises exactly one child: construct → use → dispose.
//! Pooling, message framing, and runtime installation live elsewhere.

pub mod agent;
pub mod bridge;
pub mod config;
pub mod error;
pub mod shutdown;

pub use bridge::{GRACEFUL_EXIT_TIMEOUT, ProcessBridge};
pub use config::RuntimePathProvider;
pub use error::{Error, Result};

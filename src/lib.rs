#![deny(missing_docs)]

//! This crate bridges a single serial device to TCP clients.
//!
//! Only one client at a time exchanges bytes with the device.
//! Everyone else is queued in arrival order and promoted when the
//! active client disconnects, times out or fails.
//!
//! Bytes pass through untouched in both directions; the gateway
//! interprets no protocol.
//!
//! A failure on the device side is fatal to the whole session layer:
//! [`server::Gateway::start`] returns the failure and the caller decides
//! whether to start over. Connection failures are recovered internally
//! by promoting the next queued client.

/// The command line interface.
pub mod cli;

/// Relates to config files.
pub mod config;

/// Possible errors in this library.
pub mod error;

/// Logging/tracing setup.
pub mod logging;

/// Service lifecycle: starting and stopping the gateway.
pub mod server;

/// Serial device driver.
pub(crate) mod device;

/// The event loop wiring the device to the active connection.
pub(crate) mod dispatcher;

/// The TCP side: listener, connection queue, active connection.
pub(crate) mod gateway;

/// Transient values handed from the I/O workers to the dispatcher.
pub(crate) mod outcome;

//! Byte-stream connections to cameras.
//!
//! This module provides the [`Transport`] trait the command engine drives,
//! plus implementations for TCP and serial lines. Only the camera's engine
//! worker ever holds a transport.

pub mod tcp;

#[cfg(feature = "serial")]
pub mod serial;

#[cfg(any(test, feature = "testutils"))]
pub mod mock;

use std::time::Duration;

use crate::error::{Result, TransportError};
use crate::types::Endpoint;

pub use self::tcp::TcpTransport;

#[cfg(feature = "serial")]
pub use self::serial::SerialTransport;

// =============================================================================
// Transport Trait
// =============================================================================

/// A framed connection to one camera.
///
/// # Contract
///
/// 1. `open` on an open transport reconnects.
/// 2. `read_frame` blocks for at most `timeout` and returns one complete
///    frame, terminator included. Nothing arriving in time is a
///    [`TransportError`] of kind `Timeout`, which leaves the connection open.
/// 3. Bytes received after a frame stay buffered for the next read.
pub trait Transport: Send + 'static {
    /// Connect, replacing any existing connection.
    fn open(&mut self) -> std::result::Result<(), TransportError>;

    fn write(&mut self, bytes: &[u8]) -> std::result::Result<(), TransportError>;

    fn read_frame(&mut self, timeout: Duration) -> std::result::Result<Vec<u8>, TransportError>;

    /// Drop the connection and any buffered bytes.
    fn close(&mut self);

    fn is_open(&self) -> bool;

    /// Human-readable target for logs.
    fn describe(&self) -> String;
}

/// Build the transport for `endpoint`. Nothing is connected until
/// [`Transport::open`].
pub fn for_endpoint(endpoint: &Endpoint, connect_timeout: Duration) -> Result<Box<dyn Transport>> {
    match endpoint {
        Endpoint::Tcp { host, port } => Ok(Box::new(TcpTransport::new(
            host.clone(),
            *port,
            connect_timeout,
        ))),
        #[cfg(feature = "serial")]
        Endpoint::Serial { path } => Ok(Box::new(SerialTransport::new(path.clone()))),
        #[cfg(not(feature = "serial"))]
        Endpoint::Serial { path } => Err(crate::error::Error::invalid_argument(format!(
            "serial support is disabled, cannot open {}",
            path
        ))),
    }
}

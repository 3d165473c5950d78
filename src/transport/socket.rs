//! Raw byte-stream transport.
//!
//! [`Transport`] is a thin wrapper around a TCP connection. It does no
//! framing of its own: bytes read here are handed to the
//! [`ProtocolDriver`](super::ProtocolDriver) unchanged.

// ============================================================================
// Imports
// ============================================================================

use std::io::ErrorKind;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, trace};

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Size of the read buffer. Reads may return fewer bytes.
const READ_BUFFER_SIZE: usize = 16 * 1024;

// ============================================================================
// Transport
// ============================================================================

/// An open TCP connection to a DevTools endpoint.
#[derive(Debug)]
pub struct Transport {
    /// Underlying stream.
    stream: TcpStream,
    /// `host:port` the stream is connected to.
    address: String,
    /// Scratch buffer for reads.
    buffer: Box<[u8]>,
}

impl Transport {
    /// Opens a connection to `address` (`host:port`).
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionRefused`] if nothing is listening
    /// - [`Error::ConnectionTimeout`] if the connect exceeds `connect_timeout`
    /// - [`Error::Connection`] for any other failure
    pub async fn open(address: &str, connect_timeout: Duration) -> Result<Self> {
        let stream = match timeout(connect_timeout, TcpStream::connect(address)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) if e.kind() == ErrorKind::ConnectionRefused => {
                return Err(Error::connection_refused(address));
            }
            Ok(Err(e)) => return Err(Error::connection(format!("{address}: {e}"))),
            Err(_) => {
                return Err(Error::connection_timeout(
                    connect_timeout.as_millis() as u64,
                ));
            }
        };

        stream.set_nodelay(true)?;
        debug!(address, "Transport opened");

        Ok(Self {
            stream,
            address: address.to_string(),
            buffer: vec![0; READ_BUFFER_SIZE].into_boxed_slice(),
        })
    }

    /// Returns the `host:port` this transport is connected to.
    #[inline]
    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Writes all bytes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the write fails.
    pub async fn write(&mut self, bytes: &[u8]) -> Result<()> {
        if bytes.is_empty() {
            return Ok(());
        }
        self.stream.write_all(bytes).await?;
        trace!(len = bytes.len(), "Transport wrote bytes");
        Ok(())
    }

    /// Reads whatever bytes are available, waiting for at least one.
    ///
    /// An empty slice means the peer closed the connection.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the read fails.
    pub async fn read(&mut self) -> Result<&[u8]> {
        let n = self.stream.read(&mut self.buffer).await?;
        trace!(len = n, "Transport read bytes");
        Ok(&self.buffer[..n])
    }

    /// Shuts down the write half and drops the connection.
    pub async fn close(mut self) {
        if let Err(e) = self.stream.shutdown().await {
            debug!(address = %self.address, error = %e, "Transport shutdown failed");
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

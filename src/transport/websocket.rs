//! WebSocket protocol driver.
//!
//! [`ProtocolDriver`] performs the client handshake and frame encoding on
//! top of a [`Transport`](super::Transport) without owning any socket.
//! Raw bytes read from the transport are passed to [`ProtocolDriver::feed`],
//! which returns every fully reassembled message. Bytes the driver wants to
//! send (handshake request, frames, pongs, close replies) accumulate until
//! collected with [`ProtocolDriver::take_outbound`].
//!
//! # Lifecycle
//!
//! ```text
//! start() ──► Handshaking ──feed(101 response)──► Open ──close frame──► Closed
//!                  │                                │
//!                  └──────── malformed input ───────┴──► Closed + Error::Protocol
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::collections::VecDeque;
use std::io::{self, ErrorKind, Read, Write};
use std::mem;

use tokio_tungstenite::tungstenite::client::{IntoClientRequest, client_with_config};
use tokio_tungstenite::tungstenite::handshake::client::ClientHandshake;
use tokio_tungstenite::tungstenite::handshake::{HandshakeError, MidHandshake};
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::tungstenite::{Error as WsError, Message, WebSocket};
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Largest message accepted. Print results are base64 PDFs and get large.
const MAX_MESSAGE_SIZE: usize = 512 * 1024 * 1024;

// ============================================================================
// WireBuffer
// ============================================================================

/// In-memory stream handed to tungstenite.
///
/// Reads drain `inbound` and report `WouldBlock` once it is empty; writes
/// append to `outbound`.
#[derive(Debug, Default)]
struct WireBuffer {
    inbound: VecDeque<u8>,
    outbound: Vec<u8>,
}

impl Read for WireBuffer {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.inbound.is_empty() {
            return Err(ErrorKind::WouldBlock.into());
        }
        self.inbound.read(buf)
    }
}

impl Write for WireBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.outbound.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

// ============================================================================
// DriverEvent
// ============================================================================

/// Notification produced by [`ProtocolDriver::feed`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverEvent {
    /// The handshake completed.
    Open,
    /// A complete text message arrived.
    Message(String),
    /// The peer closed the connection.
    Closed,
}

// ============================================================================
// ProtocolDriver
// ============================================================================

/// Internal driver state.
enum DriverState {
    /// Handshake request sent, waiting for the upgrade response.
    Handshaking(Box<MidHandshake<ClientHandshake<WireBuffer>>>),
    /// Frames can flow.
    Open(Box<WebSocket<WireBuffer>>),
    /// Terminal.
    Closed,
}

/// Client-side WebSocket handshake and framing over caller-supplied bytes.
pub struct ProtocolDriver {
    state: DriverState,
    /// Bytes waiting to be written to the transport.
    outbound: Vec<u8>,
}

impl std::fmt::Debug for ProtocolDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match self.state {
            DriverState::Handshaking(_) => "Handshaking",
            DriverState::Open(_) => "Open",
            DriverState::Closed => "Closed",
        };
        f.debug_struct("ProtocolDriver")
            .field("state", &state)
            .field("outbound", &self.outbound.len())
            .finish()
    }
}

impl ProtocolDriver {
    /// Starts a client handshake for `url` (`ws://host:port/path`).
    ///
    /// The upgrade request is queued in the outbound buffer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] if the URL is not a valid WebSocket URL.
    pub fn start(url: &str) -> Result<Self> {
        let request = url
            .into_client_request()
            .map_err(|e| Error::protocol(format!("Invalid WebSocket URL {url}: {e}")))?;

        let mut config = WebSocketConfig::default();
        config.max_message_size = Some(MAX_MESSAGE_SIZE);
        config.max_frame_size = None;

        let mut driver = Self {
            state: DriverState::Closed,
            outbound: Vec::new(),
        };

        match client_with_config(request, WireBuffer::default(), Some(config)) {
            Err(HandshakeError::Interrupted(mid)) => {
                driver.state = DriverState::Handshaking(Box::new(mid));
            }
            Ok((socket, _)) => {
                driver.state = DriverState::Open(Box::new(socket));
            }
            Err(HandshakeError::Failure(e)) => {
                return Err(Error::protocol(format!("Handshake failed: {e}")));
            }
        }

        driver.collect_outbound();
        debug!(url, "WebSocket handshake started");
        Ok(driver)
    }

    /// Returns `true` once the handshake has completed and before close.
    #[inline]
    #[must_use]
    pub fn is_open(&self) -> bool {
        matches!(self.state, DriverState::Open(_))
    }

    /// Returns `true` after a close frame or a protocol failure.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        matches!(self.state, DriverState::Closed)
    }

    /// Takes the bytes that must be written to the transport.
    #[inline]
    #[must_use]
    pub fn take_outbound(&mut self) -> Vec<u8> {
        mem::take(&mut self.outbound)
    }

    /// Frames a complete text message.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionClosed`] if the driver is closed
    /// - [`Error::Protocol`] if the handshake has not completed
    /// - [`Error::WebSocket`] if framing fails
    pub fn send_text(&mut self, text: String) -> Result<()> {
        let socket = match &mut self.state {
            DriverState::Open(socket) => socket,
            DriverState::Handshaking(_) => {
                return Err(Error::protocol("Cannot send before handshake completes"));
            }
            DriverState::Closed => return Err(Error::ConnectionClosed),
        };

        let result = socket.send(Message::Text(text.into()));
        self.collect_outbound();

        match result {
            Ok(()) => Ok(()),
            Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => {
                self.state = DriverState::Closed;
                Err(Error::ConnectionClosed)
            }
            Err(e) => Err(Error::WebSocket(e)),
        }
    }

    /// Accepts raw bytes from the transport and returns decoded events.
    ///
    /// Partial frames are buffered until the rest arrives.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] on a malformed handshake response or
    /// frame. The driver is closed afterwards.
    pub fn feed(&mut self, bytes: &[u8]) -> Result<Vec<DriverEvent>> {
        let mut events = Vec::new();

        match mem::replace(&mut self.state, DriverState::Closed) {
            DriverState::Handshaking(mut mid) => {
                mid.get_mut().get_mut().inbound.extend(bytes);
                match mid.handshake() {
                    Ok((socket, response)) => {
                        debug!(status = %response.status(), "WebSocket handshake completed");
                        self.state = DriverState::Open(Box::new(socket));
                        events.push(DriverEvent::Open);
                    }
                    Err(HandshakeError::Interrupted(mut mid)) => {
                        self.outbound.append(&mut mid.get_mut().get_mut().outbound);
                        self.state = DriverState::Handshaking(Box::new(mid));
                        return Ok(events);
                    }
                    Err(HandshakeError::Failure(e)) => {
                        return Err(Error::protocol(format!("Handshake failed: {e}")));
                    }
                }
            }
            DriverState::Open(mut socket) => {
                socket.get_mut().inbound.extend(bytes);
                self.state = DriverState::Open(socket);
            }
            DriverState::Closed => {
                trace!(len = bytes.len(), "Ignoring bytes after close");
                return Ok(events);
            }
        }

        self.drain_messages(&mut events)?;
        Ok(events)
    }

    /// Queues a close frame.
    pub fn close(&mut self) {
        if let DriverState::Open(socket) = &mut self.state {
            if let Err(e) = socket.close(None) {
                trace!(error = %e, "Close frame not queued");
            }
            let _ = socket.flush();
        }
        self.collect_outbound();
        self.state = DriverState::Closed;
    }

    /// Reads every complete message currently buffered.
    fn drain_messages(&mut self, events: &mut Vec<DriverEvent>) -> Result<()> {
        loop {
            let DriverState::Open(socket) = &mut self.state else {
                return Ok(());
            };

            let outcome = socket.read();
            match outcome {
                Ok(Message::Text(text)) => {
                    events.push(DriverEvent::Message(text.as_str().to_owned()));
                }
                Ok(Message::Binary(data)) => match String::from_utf8(data.to_vec()) {
                    Ok(text) => events.push(DriverEvent::Message(text)),
                    Err(_) => warn!(len = data.len(), "Ignoring non-UTF-8 binary message"),
                },
                Ok(Message::Close(frame)) => {
                    debug!(?frame, "Close frame received");
                    let _ = socket.flush();
                    self.collect_outbound();
                    self.state = DriverState::Closed;
                    events.push(DriverEvent::Closed);
                    return Ok(());
                }
                // Pongs are queued by tungstenite and written on the next flush.
                Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => {}
                Err(WsError::Io(e)) if e.kind() == ErrorKind::WouldBlock => {
                    self.collect_outbound();
                    return Ok(());
                }
                Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => {
                    self.collect_outbound();
                    self.state = DriverState::Closed;
                    events.push(DriverEvent::Closed);
                    return Ok(());
                }
                Err(e) => {
                    self.state = DriverState::Closed;
                    return Err(Error::protocol(format!("Malformed frame: {e}")));
                }
            }
        }
    }

    /// Moves bytes written by tungstenite into the outbound queue.
    fn collect_outbound(&mut self) {
        let written = match &mut self.state {
            DriverState::Handshaking(mid) => mem::take(&mut mid.get_mut().get_mut().outbound),
            DriverState::Open(socket) => mem::take(&mut socket.get_mut().outbound),
            DriverState::Closed => return,
        };
        self.outbound.extend_from_slice(&written);
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use tokio_tungstenite::tungstenite::accept;

    const URL: &str = "ws://127.0.0.1:9222/devtools/page/T1";

    /// Completes a handshake against an in-memory tungstenite server.
    fn connected_pair() -> (ProtocolDriver, WebSocket<WireBuffer>) {
        let mut client = ProtocolDriver::start(URL).expect("start");
        let request = client.take_outbound();
        assert!(request.starts_with(b"GET /devtools/page/T1 HTTP/1.1"));

        let mut stream = WireBuffer::default();
        stream.inbound.extend(request);
        let mut server = match accept(stream) {
            Ok(server) => server,
            Err(_) => panic!("server handshake did not complete"),
        };

        let reply = mem::take(&mut server.get_mut().outbound);
        let events = client.feed(&reply).expect("feed");
        assert_eq!(events, vec![DriverEvent::Open]);
        assert!(client.is_open());

        (client, server)
    }

    #[test]
    fn test_start_rejects_invalid_url() {
        let err = ProtocolDriver::start("not a url").unwrap_err();
        assert!(matches!(err, Error::Protocol { .. }));
    }

    #[test]
    fn test_handshake_waits_for_full_response() {
        let mut client = ProtocolDriver::start(URL).expect("start");
        let _ = client.take_outbound();

        let events = client.feed(b"HTTP/1.1 101 Switching").expect("feed");
        assert!(events.is_empty());
        assert!(!client.is_open());
        assert!(!client.is_closed());
    }

    #[test]
    fn test_handshake_rejected_is_protocol_error() {
        let mut client = ProtocolDriver::start(URL).expect("start");
        let _ = client.take_outbound();

        let err = client
            .feed(b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\n\r\n")
            .unwrap_err();
        assert!(matches!(err, Error::Protocol { .. }));
        assert!(client.is_closed());
    }

    #[test]
    fn test_send_before_handshake_fails() {
        let mut client = ProtocolDriver::start(URL).expect("start");
        let err = client.send_text("{}".into()).unwrap_err();
        assert!(matches!(err, Error::Protocol { .. }));
    }

    #[test]
    fn test_message_reassembled_from_single_bytes() {
        let (mut client, mut server) = connected_pair();

        let payload = format!(r#"{{"id":1,"result":{{"data":"{}"}}}}"#, "A".repeat(3000));
        server
            .send(Message::Text(payload.clone().into()))
            .expect("server send");
        let wire = mem::take(&mut server.get_mut().outbound);

        let mut events = Vec::new();
        for byte in &wire {
            events.extend(client.feed(std::slice::from_ref(byte)).expect("feed"));
        }
        assert_eq!(events, vec![DriverEvent::Message(payload)]);
    }

    #[test]
    fn test_multiple_messages_in_one_chunk() {
        let (mut client, mut server) = connected_pair();

        server.send(Message::Text("first".into())).expect("send");
        server.send(Message::Text("second".into())).expect("send");
        let wire = mem::take(&mut server.get_mut().outbound);

        let events = client.feed(&wire).expect("feed");
        assert_eq!(
            events,
            vec![
                DriverEvent::Message("first".into()),
                DriverEvent::Message("second".into()),
            ]
        );
    }

    #[test]
    fn test_client_frames_reach_server() {
        let (mut client, mut server) = connected_pair();

        client.send_text(r#"{"id":1,"method":"Page.enable"}"#.into()).expect("send");
        server.get_mut().inbound.extend(client.take_outbound());

        let message = server.read().expect("server read");
        assert_eq!(
            message,
            Message::Text(r#"{"id":1,"method":"Page.enable"}"#.into())
        );
    }

    #[test]
    fn test_close_frame_closes_driver() {
        let (mut client, mut server) = connected_pair();

        server.close(None).expect("close");
        let wire = mem::take(&mut server.get_mut().outbound);

        let events = client.feed(&wire).expect("feed");
        assert_eq!(events, vec![DriverEvent::Closed]);
        assert!(client.is_closed());

        let err = client.send_text("{}".into()).unwrap_err();
        assert!(matches!(err, Error::ConnectionClosed));
    }

    #[test]
    fn test_malformed_frame_is_protocol_error() {
        let (mut client, _server) = connected_pair();

        // FIN with all reserved bits set and a reserved opcode.
        let err = client.feed(&[0xFF, 0x00]).unwrap_err();
        assert!(matches!(err, Error::Protocol { .. }));
        assert!(client.is_closed());
    }

    #[test]
    fn test_local_close_queues_frame() {
        let (mut client, _server) = connected_pair();

        client.close();
        assert!(client.is_closed());
        let wire = client.take_outbound();
        // Masked close frame: opcode 0x8 with FIN.
        assert_eq!(wire.first(), Some(&0x88));
    }
}

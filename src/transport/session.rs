//! Session: one DevTools tab connection and its call/response correlation.
//!
//! A [`Session`] owns one [`Transport`] and one [`ProtocolDriver`] bound to
//! a single browser tab. The caller that issues a call waits on the read
//! loop until the predicate for that call is satisfied; calls are never
//! pipelined, so a session processes them strictly in send order.
//!
//! # State Machine
//!
//! ```text
//! Connecting ──handshake──► Ready ──Page.enable──► Active ──close / peer close / fatal error──► Closed
//! ```
//!
//! Any use of a `Closed` session fails fast with [`Error::ConnectionClosed`].

// ============================================================================
// Imports
// ============================================================================

use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as Base64Standard;
use serde_json::{Value, json};
use tokio::time::timeout;
use tracing::{debug, trace};
use url::Url;

use crate::browser::TargetInfo;
use crate::error::{Error, Result};
use crate::identifiers::CallId;
use crate::protocol::{
    Call, Event, FRAME_STOPPED_LOADING, Inbound, PAGE_ENABLE, PAGE_NAVIGATE, PAGE_PRINT_TO_PDF,
    PrintParams, data_url_for_html,
};

use super::socket::Transport;
use super::websocket::{DriverEvent, ProtocolDriver};

// ============================================================================
// Constants
// ============================================================================

/// Default bound on a single call round trip.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Default bound on opening the transport and completing the handshake.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Characters of a message shown in verbose logs.
const LOG_PREVIEW_CHARS: usize = 64;

// ============================================================================
// SessionOptions
// ============================================================================

/// Timeouts and logging for a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    /// Bound on each `call` / `call_and_wait_for_event`.
    pub call_timeout: Duration,
    /// Bound on transport open plus handshake.
    pub connect_timeout: Duration,
    /// Log message previews at debug level.
    pub verbose: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            call_timeout: DEFAULT_CALL_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            verbose: false,
        }
    }
}

// ============================================================================
// SessionState
// ============================================================================

/// Connection state of a [`Session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Transport open, handshake in progress.
    Connecting,
    /// Handshake done, page events not yet enabled.
    Ready,
    /// Accepting calls.
    Active,
    /// Terminal.
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Connecting => "connecting",
            Self::Ready => "ready",
            Self::Active => "active",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

// ============================================================================
// Session
// ============================================================================

/// One live connection to one browser tab.
///
/// A session is owned by exactly one worker and is never shared, so it
/// needs no internal locking.
pub struct Session {
    /// Raw byte stream.
    transport: Transport,
    /// WebSocket handshake and framing.
    driver: ProtocolDriver,
    /// Tab this session is attached to.
    target: TargetInfo,
    /// Id for the next call.
    next_id: CallId,
    /// Current state.
    state: SessionState,
    /// Decoded messages not yet inspected by a wait loop.
    pending: VecDeque<Inbound>,
    /// Most recently inspected inbound message.
    last_message: Option<Inbound>,
    /// Call sent whose wait has not completed.
    in_flight: Option<CallId>,
    /// Set once a call failed in a way that leaves the tab in doubt.
    faulted: bool,
    /// Timeouts and logging.
    options: SessionOptions,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("target", &self.target.id)
            .field("address", &self.transport.address())
            .field("state", &self.state)
            .field("next_id", &self.next_id)
            .field("in_flight", &self.in_flight)
            .field("faulted", &self.faulted)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Session - Lifecycle
// ============================================================================

impl Session {
    /// Connects to a tab and enables page events.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionRefused`] if nothing listens at the tab address
    /// - [`Error::ConnectionTimeout`] if open plus handshake exceed the connect timeout
    /// - [`Error::Protocol`] if the handshake is malformed
    /// - any error of the `Page.enable` call
    pub async fn connect(target: TargetInfo, options: SessionOptions) -> Result<Self> {
        let address = socket_address(&target.web_socket_debugger_url)?;
        let transport = Transport::open(&address, options.connect_timeout).await?;
        let driver = ProtocolDriver::start(&target.web_socket_debugger_url)?;

        let mut session = Self {
            transport,
            driver,
            target,
            next_id: CallId::FIRST,
            state: SessionState::Connecting,
            pending: VecDeque::new(),
            last_message: None,
            in_flight: None,
            faulted: false,
            options,
        };

        let connect_timeout = session.options.connect_timeout;
        match timeout(connect_timeout, session.handshake()).await {
            Ok(Ok(())) => session.transition(SessionState::Ready),
            Ok(Err(e)) => return Err(e),
            Err(_) => {
                return Err(Error::connection_timeout(
                    connect_timeout.as_millis() as u64,
                ));
            }
        }

        session.call(PAGE_ENABLE, json!({})).await?;
        session.transition(SessionState::Active);

        Ok(session)
    }

    /// Sends a close frame and shuts the transport down.
    pub async fn close(mut self) {
        self.driver.close();
        let outbound = self.driver.take_outbound();
        if let Err(e) = self.transport.write(&outbound).await {
            trace!(error = %e, "Close frame not delivered");
        }
        self.transition(SessionState::Closed);
        self.transport.close().await;
    }

    /// Runs the WebSocket handshake until the driver reports open.
    async fn handshake(&mut self) -> Result<()> {
        self.flush().await?;

        loop {
            let bytes = self.transport.read().await?;
            if bytes.is_empty() {
                self.transition(SessionState::Closed);
                return Err(Error::protocol("Connection closed during handshake"));
            }

            let events = self.driver.feed(bytes)?;
            self.flush().await?;

            let mut open = false;
            for event in events {
                match event {
                    DriverEvent::Open => open = true,
                    DriverEvent::Message(text) => self.pending.push_back(Inbound::parse(&text)?),
                    DriverEvent::Closed => {
                        self.transition(SessionState::Closed);
                        return Err(Error::protocol("Connection closed during handshake"));
                    }
                }
            }

            if open {
                return Ok(());
            }
        }
    }

    fn transition(&mut self, next: SessionState) {
        if self.state != next {
            debug!(target_id = %self.target.id, from = %self.state, to = %next, "Session state changed");
            self.state = next;
        }
    }
}

// ============================================================================
// Session - Accessors
// ============================================================================

impl Session {
    /// Returns the current state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Returns `true` once the session can no longer be used.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state == SessionState::Closed
    }

    /// Returns the tab this session is attached to.
    #[inline]
    #[must_use]
    pub fn target(&self) -> &TargetInfo {
        &self.target
    }

    /// Returns `true` if the session must not be reused.
    ///
    /// That is the case once it has closed, once a call failed with an
    /// error that [requires a reset](Error::requires_reset), or while a
    /// call was abandoned before its reply was read.
    #[inline]
    #[must_use]
    pub fn needs_reset(&self) -> bool {
        self.is_closed() || self.faulted || self.in_flight.is_some()
    }

    /// Returns the id the next call will use.
    #[inline]
    #[must_use]
    pub fn next_call_id(&self) -> CallId {
        self.next_id
    }

    /// Returns the most recently inspected inbound message.
    #[inline]
    #[must_use]
    pub fn last_message(&self) -> Option<&Inbound> {
        self.last_message.as_ref()
    }
}

// ============================================================================
// Session - Calls
// ============================================================================

impl Session {
    /// Sends a call and waits for the response with the same id.
    ///
    /// Events and responses to other ids arriving first are skipped.
    ///
    /// # Errors
    ///
    /// - [`Error::Remote`] if the response carries an `error`
    /// - [`Error::ConnectionClosed`] if the connection closes first
    /// - [`Error::RequestTimeout`] if no response arrives within the call timeout
    pub async fn call(&mut self, method: &str, params: Value) -> Result<Value> {
        let result = self.call_inner(method, params).await;
        self.record(result)
    }

    async fn call_inner(&mut self, method: &str, params: Value) -> Result<Value> {
        let id = self.send_call(method, params).await?;

        let message = self
            .wait_for(id, method, |message| message.is_response_to(id))
            .await?;

        match message {
            Inbound::Response(response) => {
                debug!(%id, method, error = response.is_error(), "Response matched");
                response.into_result(method)
            }
            Inbound::Event(event) => Err(Error::protocol(format!(
                "Expected response to {id}, got event {}",
                event.method
            ))),
        }
    }

    /// Sends a call and waits for an event named `event_name`.
    ///
    /// Used for calls whose completion is signalled by an event. An error
    /// response to the call itself fails immediately.
    ///
    /// # Errors
    ///
    /// - [`Error::Remote`] if the call's own response carries an `error`
    /// - [`Error::ConnectionClosed`] if the connection closes first
    /// - [`Error::RequestTimeout`] if the event does not arrive within the call timeout
    pub async fn call_and_wait_for_event(
        &mut self,
        method: &str,
        params: Value,
        event_name: &str,
    ) -> Result<Event> {
        let result = self.wait_for_event_inner(method, params, event_name).await;
        self.record(result)
    }

    async fn wait_for_event_inner(
        &mut self,
        method: &str,
        params: Value,
        event_name: &str,
    ) -> Result<Event> {
        let id = self.send_call(method, params).await?;

        let message = self
            .wait_for(id, method, |message| match message {
                Inbound::Event(event) => event.method == event_name,
                Inbound::Response(response) => response.id == id && response.is_error(),
            })
            .await?;

        match message {
            Inbound::Event(event) => {
                debug!(%id, method, event = event_name, "Event matched");
                Ok(event)
            }
            Inbound::Response(response) => match response.into_result(method) {
                Err(e) => Err(e),
                Ok(_) => Err(Error::protocol(format!(
                    "Unexpected success while waiting for {event_name}"
                ))),
            },
        }
    }

    /// Loads `html` into the tab and prints it.
    ///
    /// # Errors
    ///
    /// Any error of the two calls, plus [`Error::Protocol`] if the print
    /// result has no `data` field and [`Error::Decode`] if it is not base64.
    pub async fn render_pdf(&mut self, html: &str, params: &PrintParams) -> Result<Vec<u8>> {
        self.call_and_wait_for_event(
            PAGE_NAVIGATE,
            json!({ "url": data_url_for_html(html) }),
            FRAME_STOPPED_LOADING,
        )
        .await?;

        let result = self.call(PAGE_PRINT_TO_PDF, params.to_value()?).await?;
        let data = result
            .get("data")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::protocol("Print result has no data field"));
        let data = self.record(data)?;

        Ok(Base64Standard.decode(data)?)
    }

    /// Marks the session faulted if `result` is an error that requires a reset.
    fn record<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result
            && e.requires_reset()
            && !self.faulted
        {
            debug!(target_id = %self.target.id, error = %e, "Session marked for reset");
            self.faulted = true;
        }
        result
    }
}

// ============================================================================
// Session - Read Loop
// ============================================================================

impl Session {
    /// Assigns the next id and writes the call.
    async fn send_call(&mut self, method: &str, params: Value) -> Result<CallId> {
        match self.state {
            SessionState::Ready | SessionState::Active => {}
            SessionState::Closed => return Err(Error::ConnectionClosed),
            SessionState::Connecting => {
                return Err(Error::protocol("Session handshake has not completed"));
            }
        }

        let id = self.next_id;
        self.next_id = id.next();
        self.in_flight = Some(id);

        let text = Call::new(id, method, params).to_json()?;
        if self.options.verbose {
            debug!(%id, method, preview = preview(&text), "Sending call");
        } else {
            debug!(%id, method, "Sending call");
        }

        if let Err(e) = self.send_text(text).await {
            self.transition(SessionState::Closed);
            return Err(e);
        }

        Ok(id)
    }

    async fn send_text(&mut self, text: String) -> Result<()> {
        self.driver.send_text(text)?;
        self.flush().await
    }

    /// Waits for a message matching `predicate`, bounded by the call timeout.
    ///
    /// Any failure of the read loop closes the session.
    async fn wait_for<F>(&mut self, id: CallId, method: &str, predicate: F) -> Result<Inbound>
    where
        F: FnMut(&Inbound) -> bool,
    {
        let call_timeout = self.options.call_timeout;
        let outcome = timeout(call_timeout, self.read_until(predicate)).await;
        self.in_flight = None;

        match outcome {
            Ok(Ok(message)) => Ok(message),
            Ok(Err(e)) => {
                self.transition(SessionState::Closed);
                Err(e)
            }
            Err(_) => {
                self.transition(SessionState::Closed);
                Err(Error::request_timeout(
                    id,
                    method,
                    call_timeout.as_millis() as u64,
                ))
            }
        }
    }

    /// Reads and decodes until a message satisfies `predicate`.
    async fn read_until<F>(&mut self, mut predicate: F) -> Result<Inbound>
    where
        F: FnMut(&Inbound) -> bool,
    {
        loop {
            while let Some(message) = self.pending.pop_front() {
                if predicate(&message) {
                    self.last_message = Some(message.clone());
                    return Ok(message);
                }
                trace!(id = ?message.id(), method = ?message.method(), "Skipping message");
                self.last_message = Some(message);
            }

            if self.driver.is_closed() {
                return Err(Error::ConnectionClosed);
            }

            let bytes = self.transport.read().await?;
            if bytes.is_empty() {
                debug!(target_id = %self.target.id, "Peer closed the connection");
                return Err(Error::ConnectionClosed);
            }

            let events = self.driver.feed(bytes)?;
            self.flush().await?;

            for event in events {
                match event {
                    DriverEvent::Message(text) => {
                        if self.options.verbose {
                            debug!(preview = preview(&text), "Received");
                        }
                        self.pending.push_back(Inbound::parse(&text)?);
                    }
                    DriverEvent::Closed => {
                        debug!(target_id = %self.target.id, "Close frame received");
                    }
                    DriverEvent::Open => {}
                }
            }
        }
    }

    /// Writes whatever the driver has queued.
    async fn flush(&mut self) -> Result<()> {
        let outbound = self.driver.take_outbound();
        self.transport.write(&outbound).await
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Extracts `host:port` from a `ws://` URL.
fn socket_address(ws_url: &str) -> Result<String> {
    let url = Url::parse(ws_url)
        .map_err(|e| Error::protocol(format!("Invalid WebSocket URL {ws_url}: {e}")))?;

    let host = url
        .host_str()
        .ok_or_else(|| Error::protocol(format!("WebSocket URL has no host: {ws_url}")))?;
    let port = url
        .port_or_known_default()
        .ok_or_else(|| Error::protocol(format!("WebSocket URL has no port: {ws_url}")))?;

    Ok(format!("{host}:{port}"))
}

/// First characters of a message for logging.
fn preview(text: &str) -> &str {
    match text.char_indices().nth(LOG_PREVIEW_CHARS) {
        Some((index, _)) => &text[..index],
        None => text,
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let options = SessionOptions::default();
        assert_eq!(options.call_timeout.as_secs(), 30);
        assert_eq!(options.connect_timeout.as_secs(), 10);
        assert!(!options.verbose);
    }

    #[test]
    fn test_socket_address() {
        assert_eq!(
            socket_address("ws://127.0.0.1:9222/devtools/page/ABC").expect("parse"),
            "127.0.0.1:9222"
        );
        assert_eq!(
            socket_address("ws://localhost/devtools/page/ABC").expect("parse"),
            "localhost:80"
        );
        assert!(socket_address("not a url").is_err());
    }

    #[test]
    fn test_preview_truncates_on_char_boundary() {
        let long = "é".repeat(100);
        assert_eq!(preview(&long).chars().count(), LOG_PREVIEW_CHARS);
        assert_eq!(preview("short"), "short");
    }

    #[test]
    fn test_state_display() {
        assert_eq!(SessionState::Active.to_string(), "active");
        assert_eq!(SessionState::Closed.to_string(), "closed");
    }
}

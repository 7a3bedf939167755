//! Channel events delivered from a transport to the session, and the
//! [`Transport`] boundary itself.
//!
//! The session never touches async code: a transport buffers whatever its
//! connection produced and hands it over on [`Transport::poll`], in arrival
//! order.

use crate::error::Result;

/// A single low-level channel event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// Handshake complete, writes are accepted from now on.
    Opened,
    /// One inbound text frame.
    Message(String),
    /// Network-level failure. The connection is unusable afterwards.
    Error(String),
    /// Remote side closed the channel (or the stream ended).
    Closed { code: u16, reason: String },
}

/// Bidirectional text channel to the simulation backend.
pub trait Transport {
    /// Begin connecting to `endpoint`. Success is reported later as
    /// [`ChannelEvent::Opened`].
    fn open(&mut self, endpoint: &str) -> Result<()>;

    /// Drain pending events without blocking.
    fn poll(&mut self) -> Vec<ChannelEvent>;

    /// Queue one outbound text frame.
    fn send(&mut self, text: String) -> Result<()>;

    /// Close the connection with `code`. Events still queued from this
    /// connection are discarded.
    fn close(&mut self, code: u16);
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn open(&mut self, endpoint: &str) -> Result<()> {
        (**self).open(endpoint)
    }

    fn poll(&mut self) -> Vec<ChannelEvent> {
        (**self).poll()
    }

    fn send(&mut self, text: String) -> Result<()> {
        (**self).send(text)
    }

    fn close(&mut self, code: u16) {
        (**self).close(code)
    }
}

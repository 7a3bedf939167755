//! WebSocket bridge: a Tokio thread owning the simulation channel.
//!
//! ## Threading model
//!
//! ```text
//! Caller thread (session)     │  Bridge thread (Tokio)
//! ─────────────────────────── │ ──────────────────────────────
//! ReplaySession::poll()       │ run_bridge()
//!   → WsBridge::poll()        │   connect_async(endpoint)
//!   → events.try_recv()       │   ws_rx.next() → event_tx.send(ChannelEvent)
//!                             │
//! ReplaySession::send_control │
//!   → WsBridge::send(text)    │   cmd_rx.recv()
//!   → cmd_tx.send(Send(..))   │   → ws_tx.send(Message::Text)
//! ```
//!
//! The bridge thread owns the socket and the runtime. The session thread
//! never touches async code; it only reads from a `crossbeam_channel`
//! receiver. Every `open` spawns a fresh thread and queue, so events from a
//! closed connection can never leak into the next one.
//!
//! Inbound frames are never dropped: when the queue is full the bridge stops
//! reading the socket until the session polls again. `close` waits (bounded by
//! [`CLOSE_TIMEOUT`]) for the thread to flush the close frame and exit.

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use futures::{SinkExt, StreamExt};
use std::thread;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;

use crate::error::{ReplayError, Result};
use crate::events::{ChannelEvent, Transport};
use crate::protocol::{CLOSE_ABNORMAL, CLOSE_NORMAL};

/// Reported when the server closed without a status code.
const CLOSE_NO_STATUS: u16 = 1005;

/// Upper bound on how long `close` waits for the bridge thread to exit.
pub const CLOSE_TIMEOUT: Duration = Duration::from_millis(500);

// ---------------------------------------------------------------------------
// Commands (session thread → bridge thread)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
enum BridgeCommand {
    Send(String),
    Close(u16),
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// How many inbound events to buffer before the socket read stalls.
    pub event_buffer: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self { event_buffer: 1024 }
    }
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

struct BridgeHandle {
    events: Receiver<ChannelEvent>,
    commands: mpsc::UnboundedSender<BridgeCommand>,
    thread: thread::JoinHandle<()>,
}

impl BridgeHandle {
    /// Ask the thread to close with `code`, then wait for it to exit.
    /// Events still queued are discarded so a stalled read can finish.
    fn shutdown(self, code: u16) {
        // The thread may already be gone after a remote close.
        let _ = self.commands.send(BridgeCommand::Close(code));

        let deadline = Instant::now() + CLOSE_TIMEOUT;
        loop {
            match self.events.recv_deadline(deadline) {
                Ok(_) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
                Err(RecvTimeoutError::Timeout) => {
                    log::warn!("[bridge] Thread did not exit within {:?}", CLOSE_TIMEOUT);
                    return;
                }
            }
        }
        if self.thread.join().is_err() {
            log::warn!("[bridge] Thread panicked");
        }
    }
}

/// [`Transport`] over a native WebSocket connection.
#[derive(Default)]
pub struct WsBridge {
    config: BridgeConfig,
    handle: Option<BridgeHandle>,
}

impl WsBridge {
    pub fn new(config: BridgeConfig) -> Self {
        Self {
            config,
            handle: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.handle.is_some()
    }
}

impl Transport for WsBridge {
    fn open(&mut self, endpoint: &str) -> Result<()> {
        if self.handle.is_some() {
            self.close(CLOSE_NORMAL);
        }

        let (event_tx, event_rx) = crossbeam_channel::bounded(self.config.event_buffer.max(1));
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let endpoint = endpoint.to_string();

        let thread = thread::Builder::new()
            .name("traffic-replay-bridge".into())
            .spawn(move || {
                let rt = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(rt) => rt,
                    Err(e) => {
                        log::error!("[bridge] Failed to create Tokio runtime: {}", e);
                        let _ = event_tx.send(ChannelEvent::Error(format!("runtime: {}", e)));
                        return;
                    }
                };
                rt.block_on(run_bridge(endpoint, event_tx, cmd_rx));
            })
            .map_err(|e| ReplayError::Transport(format!("failed to spawn bridge thread: {}", e)))?;

        self.handle = Some(BridgeHandle {
            events: event_rx,
            commands: cmd_tx,
            thread,
        });
        Ok(())
    }

    fn poll(&mut self) -> Vec<ChannelEvent> {
        match &self.handle {
            Some(h) => h.events.try_iter().collect(),
            None => Vec::new(),
        }
    }

    fn send(&mut self, text: String) -> Result<()> {
        let handle = self
            .handle
            .as_ref()
            .ok_or_else(|| ReplayError::Transport("not connected".into()))?;
        handle
            .commands
            .send(BridgeCommand::Send(text))
            .map_err(|_| ReplayError::Transport("bridge thread has exited".into()))
    }

    fn close(&mut self, code: u16) {
        if let Some(handle) = self.handle.take() {
            handle.shutdown(code);
        }
    }
}

impl Drop for WsBridge {
    fn drop(&mut self) {
        self.close(CLOSE_NORMAL);
    }
}

// ---------------------------------------------------------------------------
// Async bridge implementation
// ---------------------------------------------------------------------------

async fn run_bridge(
    endpoint: String,
    event_tx: Sender<ChannelEvent>,
    mut cmd_rx: mpsc::UnboundedReceiver<BridgeCommand>,
) {
    log::info!("[bridge] Connecting to {}", endpoint);

    let ws_stream = match tokio_tungstenite::connect_async(endpoint.as_str()).await {
        Ok((stream, _response)) => stream,
        Err(e) => {
            log::error!("[bridge] Connect failed: {}", e);
            let _ = event_tx.send(ChannelEvent::Error(format!("connect failed: {}", e)));
            return;
        }
    };

    log::info!("[bridge] Connected");
    if event_tx.send(ChannelEvent::Opened).is_err() {
        return;
    }

    let (mut ws_tx, mut ws_rx) = ws_stream.split();

    loop {
        tokio::select! {
            // Inbound: frame from the backend
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        // Blocks while the queue is full; the socket read
                        // stalls until the session catches up.
                        if event_tx.is_full() {
                            log::debug!("[bridge] Event queue full, waiting for the session");
                        }
                        if event_tx.send(ChannelEvent::Message(text)).is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        let (code, reason) = match frame {
                            Some(f) => (u16::from(f.code), f.reason.into_owned()),
                            None => (CLOSE_NO_STATUS, String::new()),
                        };
                        log::info!("[bridge] Server closed the channel ({})", code);
                        let _ = event_tx.send(ChannelEvent::Closed { code, reason });
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        log::warn!("[bridge] WebSocket error: {}", e);
                        let _ = event_tx.send(ChannelEvent::Error(e.to_string()));
                        break;
                    }
                    None => {
                        let _ = event_tx.send(ChannelEvent::Closed {
                            code: CLOSE_ABNORMAL,
                            reason: "stream ended".into(),
                        });
                        break;
                    }
                }
            }

            // Outbound: command from the session thread
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(BridgeCommand::Send(text)) => {
                        if let Err(e) = ws_tx.send(Message::Text(text)).await {
                            log::warn!("[bridge] Send failed: {}", e);
                            let _ = event_tx.send(ChannelEvent::Error(format!("send failed: {}", e)));
                            break;
                        }
                    }
                    Some(BridgeCommand::Close(code)) => {
                        let frame = CloseFrame {
                            code: CloseCode::from(code),
                            reason: "".into(),
                        };
                        let _ = ws_tx.send(Message::Close(Some(frame))).await;
                        let _ = ws_tx.flush().await;
                        break;
                    }
                    // Handle dropped without an explicit close.
                    None => {
                        let _ = ws_tx.close().await;
                        break;
                    }
                }
            }
        }
    }

    log::info!("[bridge] Exiting run loop");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_without_open_is_an_error() {
        let mut bridge = WsBridge::default();
        assert!(matches!(
            bridge.send("{}".into()),
            Err(ReplayError::Transport(_))
        ));
        assert!(bridge.poll().is_empty());
    }

    /// Stand-in for `run_bridge`: optionally stalls on a full queue, then
    /// waits for the close command.
    fn fake_handle(prefill: bool) -> (BridgeHandle, std::sync::Arc<std::sync::atomic::AtomicBool>) {
        use std::sync::atomic::{AtomicBool, Ordering};
        use std::sync::Arc;

        let (event_tx, events) = crossbeam_channel::bounded(1);
        let (commands, mut cmd_rx) = mpsc::unbounded_channel();
        let exited = Arc::new(AtomicBool::new(false));
        let flag = exited.clone();

        if prefill {
            event_tx.send(ChannelEvent::Opened).unwrap();
        }
        let thread = thread::spawn(move || {
            if prefill {
                event_tx
                    .send(ChannelEvent::Message("late".into()))
                    .unwrap();
            }
            assert_eq!(cmd_rx.blocking_recv(), Some(BridgeCommand::Close(1000)));
            flag.store(true, Ordering::SeqCst);
        });
        (
            BridgeHandle {
                events,
                commands,
                thread,
            },
            exited,
        )
    }

    #[test]
    fn shutdown_waits_for_thread_exit() {
        let (handle, exited) = fake_handle(false);
        handle.shutdown(1000);
        assert!(exited.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[test]
    fn shutdown_unblocks_a_stalled_reader() {
        let (handle, exited) = fake_handle(true);
        let started = Instant::now();
        handle.shutdown(1000);
        assert!(exited.load(std::sync::atomic::Ordering::SeqCst));
        assert!(started.elapsed() < CLOSE_TIMEOUT);
    }

    #[test]
    fn close_without_open_is_harmless() {
        let mut bridge = WsBridge::new(BridgeConfig { event_buffer: 4 });
        bridge.close(1000);
        bridge.close(1000);
        assert!(!bridge.is_connected());
    }
}

//! `ReplaySession` — the connection manager for one live replay.
//!
//! A session owns exactly one channel, one entity registry and one overlay
//! layer. It never blocks: the embedding application calls
//! [`ReplaySession::poll`] from its event loop (render tick, timer, …) and
//! every inbound event is handled to completion inside that call.
//!
//! ```text
//! Idle ──start──▶ Connecting ──Opened──▶ Open ──▶ Closing ──▶ ClosedNormal
//!                      │                   │                    ClosedError
//!                      └───── failure ─────┴──────────────────────▶ ┘
//! ```
//!
//! Both closed states accept a fresh `start()`. Every teardown path purges
//! the registry and detaches all overlays before returning.

use crate::control::{ControlChannel, ControlCommand};
use crate::error::{ReplayError, Result};
use crate::events::{ChannelEvent, Transport};
use crate::overlay::{OverlayLayer, SharedMap};
use crate::protocol::{
    self, ControlStatus, DisconnectNotice, InitialConfig, ServerMessage, Telemetry,
    CLOSE_INTERNAL_ERROR, CLOSE_NORMAL,
};
use crate::registry::EntityRegistry;
use crate::speed::SpeedSeries;
use crate::types::FleetStats;

// ---------------------------------------------------------------------------
// State / parameters
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Open,
    Closing,
    ClosedNormal,
    ClosedError,
}

impl ConnectionState {
    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Open => "open",
            ConnectionState::Closing => "closing",
            ConnectionState::ClosedNormal => "closed-normal",
            ConnectionState::ClosedError => "closed-error",
        }
    }

    /// Connecting or open.
    pub fn is_active(self) -> bool {
        matches!(self, ConnectionState::Connecting | ConnectionState::Open)
    }

    pub fn is_closed(self) -> bool {
        matches!(self, ConnectionState::ClosedNormal | ConnectionState::ClosedError)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    User,
    Complete,
    Error,
}

/// Parameters for one simulation run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionParams {
    /// Simulated duration in seconds.
    pub duration: u64,
    pub initial_speed: Option<f64>,
    pub initial_road_block: Option<bool>,
}

impl Default for SessionParams {
    fn default() -> Self {
        Self::new(3600)
    }
}

impl SessionParams {
    pub fn new(duration: u64) -> Self {
        Self {
            duration,
            initial_speed: None,
            initial_road_block: None,
        }
    }

    pub fn with_speed(mut self, multiplier: f64) -> Self {
        self.initial_speed = Some(multiplier);
        self
    }

    pub fn with_road_block(mut self, enabled: bool) -> Self {
        self.initial_road_block = Some(enabled);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.duration == 0 {
            return Err(ReplayError::InvalidParams("duration must be positive".into()));
        }
        if let Some(speed) = self.initial_speed {
            ControlCommand::speed(speed)
                .map_err(|e| ReplayError::InvalidParams(e.to_string()))?;
        }
        Ok(())
    }
}

type ErrorCallback = Box<dyn FnMut(&ReplayError)>;
type CompleteCallback = Box<dyn FnMut()>;

// ---------------------------------------------------------------------------
// ReplaySession
// ---------------------------------------------------------------------------

pub struct ReplaySession<T: Transport> {
    endpoint: String,
    transport: T,
    state: ConnectionState,
    params: SessionParams,

    registry: EntityRegistry,
    overlays: OverlayLayer,
    control: ControlChannel,
    speed: SpeedSeries,
    progress: Option<u32>,
    vehicle_count: Option<usize>,
    ticks: u64,

    on_error: Option<ErrorCallback>,
    on_complete: Option<CompleteCallback>,
    /// Set once a terminal callback fired for the current run.
    reported: bool,
    last_error: Option<String>,
}

impl<T: Transport> ReplaySession<T> {
    pub fn new(endpoint: impl Into<String>, transport: T) -> Self {
        Self {
            endpoint: endpoint.into(),
            transport,
            state: ConnectionState::Idle,
            params: SessionParams::default(),
            registry: EntityRegistry::new(),
            overlays: OverlayLayer::new(),
            control: ControlChannel::new(),
            speed: SpeedSeries::default(),
            progress: None,
            vehicle_count: None,
            ticks: 0,
            on_error: None,
            on_complete: None,
            reported: false,
            last_error: None,
        }
    }

    // -----------------------------------------------------------------------
    // Wiring
    // -----------------------------------------------------------------------

    /// `callback(err)`: at most once per run, after teardown.
    pub fn on_error(&mut self, cb: impl FnMut(&ReplayError) + 'static) {
        self.on_error = Some(Box::new(cb));
    }

    /// `callback()`: once when the backend reports completion.
    pub fn on_complete(&mut self, cb: impl FnMut() + 'static) {
        self.on_complete = Some(Box::new(cb));
    }

    /// Render onto `map`. The session keeps only a weak handle.
    pub fn attach_map(&mut self, map: &SharedMap) {
        self.overlays.attach(map);
        self.overlays.redraw();
    }

    pub fn detach_map(&mut self) {
        self.overlays.detach();
    }

    /// Re-place every overlay after the map projection changed.
    pub fn redraw(&mut self) {
        self.overlays.redraw();
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Open the channel for a new run.
    ///
    /// Returns `Err` only for invalid parameters. A second call while
    /// connecting or open is ignored. Failing to open the channel ends the
    /// run through the error callback.
    pub fn start(&mut self, params: SessionParams) -> Result<()> {
        params.validate()?;

        if self.state.is_active() {
            log::warn!(
                "[session] start() ignored, session already {}",
                self.state
            );
            return Ok(());
        }

        self.purge();
        self.params = params;
        self.control.remember(
            params.initial_speed.or(self.control.speed()),
            params.initial_road_block.unwrap_or(self.control.road_block()),
        );
        self.reported = false;
        self.last_error = None;

        log::info!(
            "[session] Connecting to {} (duration {}s)",
            self.endpoint,
            params.duration
        );
        self.set_state(ConnectionState::Connecting);

        if let Err(e) = self.transport.open(&self.endpoint) {
            self.fail(e);
        }
        Ok(())
    }

    /// End the run. Safe to call any number of times from any state.
    pub fn stop(&mut self, reason: StopReason) {
        match reason {
            StopReason::Error => self.teardown(reason, Some(ReplayError::Aborted), true),
            _ => self.teardown(reason, None, true),
        }
    }

    /// Drain the channel and handle every pending event in order.
    pub fn poll(&mut self) {
        if !self.state.is_active() {
            return;
        }
        for event in self.transport.poll() {
            // Anything queued behind a terminal event belongs to a dead run.
            if !self.state.is_active() {
                break;
            }
            self.handle_event(event);
        }
    }

    fn handle_event(&mut self, event: ChannelEvent) {
        match event {
            ChannelEvent::Opened => {
                if self.state != ConnectionState::Connecting {
                    return;
                }
                self.set_state(ConnectionState::Open);
                log::info!("[session] Connected to {}", self.endpoint);
                if let Err(e) = self.send_initial_config() {
                    self.fail(e);
                }
            }
            ChannelEvent::Message(raw) => self.on_message(&raw),
            ChannelEvent::Error(msg) => self.fail(ReplayError::Transport(msg)),
            ChannelEvent::Closed { code, reason } => {
                if code == CLOSE_NORMAL {
                    log::info!("[session] Remote closed the channel normally");
                    self.teardown(StopReason::User, None, false);
                } else {
                    self.fail(ReplayError::AbnormalClose { code, reason });
                }
            }
        }
    }

    /// Handle one inbound text frame.
    pub fn on_message(&mut self, raw: &str) {
        if self.state != ConnectionState::Open {
            log::debug!("[session] Message ignored in state {}", self.state);
            return;
        }
        match ServerMessage::decode(raw) {
            Ok(ServerMessage::VehiclePositions(telemetry)) => self.apply_telemetry(telemetry),
            Ok(ServerMessage::SimulationComplete) => {
                log::info!("[session] Simulation complete after {} ticks", self.ticks);
                self.stop(StopReason::Complete);
            }
            Ok(ServerMessage::Error { message }) => self.fail(ReplayError::Remote(message)),
            Ok(ServerMessage::Unrecognized) => {
                self.fail(ReplayError::Protocol("unrecognized message".into()))
            }
            Err(e) => self.fail(e),
        }
    }

    fn apply_telemetry(&mut self, telemetry: Telemetry) {
        let entities = self.registry.ingest(&telemetry.data);
        let diff = self.registry.sync(&entities);
        self.overlays.apply(&diff);

        // The backend's own average wins; it covers vehicles the snapshot omits.
        let average = telemetry
            .average_speed
            .filter(|s| s.is_finite())
            .unwrap_or_else(|| SpeedSeries::mean_speed(&entities));
        self.speed.record(average);
        self.vehicle_count = telemetry.vehicle_count;
        if let Some(status) = telemetry.control_status {
            self.control.acknowledge(status);
        }
        if let Some(progress) = telemetry.progress {
            self.progress = Some(progress.min(100));
        }
        self.ticks += 1;

        log::trace!(
            "[session] Tick {}: +{} ~{} -{} ({} live)",
            self.ticks,
            diff.to_create.len(),
            diff.to_update.len(),
            diff.to_remove.len(),
            self.registry.len()
        );
    }

    // -----------------------------------------------------------------------
    // Control
    // -----------------------------------------------------------------------

    /// Change the simulation speed multiplier. `Ok(true)` when the command
    /// went out, `Ok(false)` when it was dropped because the channel is not
    /// open.
    pub fn set_speed(&mut self, multiplier: f64) -> Result<bool> {
        let command = ControlCommand::speed(multiplier)?;
        Ok(self.send_control(command))
    }

    pub fn set_road_block(&mut self, enabled: bool) -> bool {
        self.send_control(ControlCommand::road_block(enabled))
    }

    /// Flip the motorway block and send the new value.
    pub fn toggle_road_block(&mut self) -> bool {
        let enabled = !self.control.road_block();
        self.set_road_block(enabled)
    }

    /// Record the intent and send it if the channel is open. Commands issued
    /// in any other state are dropped, not queued.
    pub fn send_control(&mut self, command: ControlCommand) -> bool {
        let frame = match self.control.prepare(command) {
            Ok(frame) => frame,
            Err(e) => {
                log::warn!("[session] Control command rejected: {}", e);
                return false;
            }
        };
        if self.state != ConnectionState::Open {
            log::debug!(
                "[session] Dropping control command {:?} in state {}",
                command,
                self.state
            );
            return false;
        }
        match self.transport.send(frame) {
            Ok(()) => true,
            Err(e) => {
                self.fail(e);
                false
            }
        }
    }

    // -----------------------------------------------------------------------
    // Read-only views
    // -----------------------------------------------------------------------

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn params(&self) -> SessionParams {
        self.params
    }

    pub fn stats(&self) -> FleetStats {
        self.registry.stats()
    }

    pub fn registry(&self) -> &EntityRegistry {
        &self.registry
    }

    pub fn overlays(&self) -> &OverlayLayer {
        &self.overlays
    }

    pub fn control(&self) -> &ControlChannel {
        &self.control
    }

    pub fn control_status(&self) -> ControlStatus {
        self.control.status()
    }

    pub fn speed_series(&self) -> &SpeedSeries {
        &self.speed
    }

    /// Latest simulation progress in percent.
    pub fn progress(&self) -> Option<u32> {
        self.progress
    }

    /// Vehicle count reported by the backend on the last tick.
    pub fn vehicle_count(&self) -> Option<usize> {
        self.vehicle_count
    }

    /// Telemetry ticks handled in the current run.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Message of the error that ended the last run, if any.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn send_initial_config(&mut self) -> Result<()> {
        let config = InitialConfig {
            duration: self.params.duration,
            simulation_speed: self.control.speed(),
            block_motorway_links: Some(self.control.road_block()),
        };
        let frame = protocol::encode(&config)?;
        log::debug!("[session] Initial config: {}", frame);
        self.transport.send(frame)
    }

    fn fail(&mut self, err: ReplayError) {
        // A broken channel cannot carry the disconnect notice.
        let channel_usable = !matches!(
            err,
            ReplayError::Transport(_) | ReplayError::AbnormalClose { .. }
        );
        self.teardown(StopReason::Error, Some(err), channel_usable);
    }

    fn teardown(&mut self, reason: StopReason, err: Option<ReplayError>, notify: bool) {
        let was = self.state;

        if was.is_active() {
            self.set_state(ConnectionState::Closing);
            if was == ConnectionState::Open && notify {
                let notice = protocol::encode(&DisconnectNotice::Disconnect)
                    .and_then(|frame| self.transport.send(frame));
                if let Err(e) = notice {
                    log::debug!("[session] Disconnect notice not sent: {}", e);
                }
            }
            let code = match reason {
                StopReason::Error => CLOSE_INTERNAL_ERROR,
                StopReason::User | StopReason::Complete => CLOSE_NORMAL,
            };
            self.transport.close(code);
        }

        self.purge();

        if !was.is_active() {
            return;
        }

        match reason {
            StopReason::Error => {
                self.set_state(ConnectionState::ClosedError);
                let err = err.unwrap_or(ReplayError::Aborted);
                log::error!("[session] Session failed: {}", err);
                self.last_error = Some(err.to_string());
                if !self.reported {
                    self.reported = true;
                    if let Some(cb) = self.on_error.as_mut() {
                        cb(&err);
                    }
                }
            }
            StopReason::Complete => {
                self.set_state(ConnectionState::ClosedNormal);
                if !self.reported {
                    self.reported = true;
                    if let Some(cb) = self.on_complete.as_mut() {
                        cb();
                    }
                }
            }
            StopReason::User => {
                self.set_state(ConnectionState::ClosedNormal);
                log::info!("[session] Session stopped");
            }
        }
    }

    /// Drop all per-run state. Desired control values survive.
    fn purge(&mut self) {
        self.registry.clear();
        self.overlays.clear();
        self.speed.clear();
        self.control.reset_status();
        self.progress = None;
        self.vehicle_count = None;
        self.ticks = 0;
    }

    fn set_state(&mut self, next: ConnectionState) {
        if self.state != next {
            log::debug!("[session] {} -> {}", self.state, next);
            self.state = next;
        }
    }
}

impl<T: Transport> std::fmt::Debug for ReplaySession<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplaySession")
            .field("endpoint", &self.endpoint)
            .field("state", &self.state)
            .field("live", &self.registry.len())
            .field("overlays", &self.overlays)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// Transport that opens instantly and records writes.
    #[derive(Default)]
    struct LoopTransport {
        queue: VecDeque<ChannelEvent>,
        sent: Vec<String>,
        closed: Vec<u16>,
        refuse_open: bool,
    }

    impl Transport for LoopTransport {
        fn open(&mut self, _endpoint: &str) -> Result<()> {
            if self.refuse_open {
                return Err(ReplayError::Transport("refused".into()));
            }
            self.queue.push_back(ChannelEvent::Opened);
            Ok(())
        }
        fn poll(&mut self) -> Vec<ChannelEvent> {
            self.queue.drain(..).collect()
        }
        fn send(&mut self, text: String) -> Result<()> {
            self.sent.push(text);
            Ok(())
        }
        fn close(&mut self, code: u16) {
            self.closed.push(code);
            self.queue.clear();
        }
    }

    fn open_session() -> ReplaySession<LoopTransport> {
        let mut s = ReplaySession::new("ws://test", LoopTransport::default());
        s.start(SessionParams::new(60)).unwrap();
        s.poll();
        assert_eq!(s.state(), ConnectionState::Open);
        s
    }

    #[test]
    fn invalid_params_rejected_before_connecting() {
        let mut s = ReplaySession::new("ws://test", LoopTransport::default());
        assert!(matches!(
            s.start(SessionParams::new(0)),
            Err(ReplayError::InvalidParams(_))
        ));
        assert!(s.start(SessionParams::new(10).with_speed(-2.0)).is_err());
        assert_eq!(s.state(), ConnectionState::Idle);
    }

    #[test]
    fn open_sends_initial_config() {
        let s = open_session();
        assert_eq!(
            s.transport().sent[0],
            r#"{"duration":60,"blockMotorwayLinks":false}"#
        );
    }

    #[test]
    fn second_start_is_noop() {
        let mut s = open_session();
        s.start(SessionParams::new(999)).unwrap();
        assert_eq!(s.state(), ConnectionState::Open);
        assert_eq!(s.params().duration, 60);
    }

    #[test]
    fn open_failure_ends_in_error() {
        let mut s = ReplaySession::new(
            "ws://test",
            LoopTransport {
                refuse_open: true,
                ..Default::default()
            },
        );
        s.start(SessionParams::default()).unwrap();
        assert_eq!(s.state(), ConnectionState::ClosedError);
        assert_eq!(s.last_error(), Some("transport error: refused"));
    }

    #[test]
    fn stop_sends_notice_then_closes_normally() {
        let mut s = open_session();
        s.stop(StopReason::User);
        assert_eq!(s.transport().sent.last().unwrap(), r#"{"type":"disconnect"}"#);
        assert_eq!(s.transport().closed, vec![CLOSE_NORMAL]);
        assert_eq!(s.state(), ConnectionState::ClosedNormal);

        s.stop(StopReason::User);
        assert_eq!(s.transport().closed.len(), 1);
    }

    #[test]
    fn control_dropped_unless_open() {
        let mut s = ReplaySession::new("ws://test", LoopTransport::default());
        assert!(!s.set_speed(2.0).unwrap());
        assert!(s.transport().sent.is_empty());
        assert!(s.set_speed(0.0).is_err());

        s.start(SessionParams::new(60)).unwrap();
        // Still connecting.
        assert!(!s.set_road_block(true));
        s.poll();
        assert!(s.set_road_block(false));
        assert_eq!(s.transport().sent.last().unwrap(), r#"{"blockMotorwayLinks":false}"#);
    }

    #[test]
    fn dropped_commands_seed_next_initial_config() {
        let mut s = ReplaySession::new("ws://test", LoopTransport::default());
        s.set_speed(4.0).unwrap();
        s.toggle_road_block();
        s.start(SessionParams::new(30)).unwrap();
        s.poll();
        assert_eq!(
            s.transport().sent[0],
            r#"{"duration":30,"simulationSpeed":4.0,"blockMotorwayLinks":true}"#
        );
    }

    #[test]
    fn restart_after_close() {
        let mut s = open_session();
        s.stop(StopReason::User);
        s.start(SessionParams::new(60)).unwrap();
        s.poll();
        assert_eq!(s.state(), ConnectionState::Open);
    }
}

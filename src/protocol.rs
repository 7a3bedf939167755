//! Simulation channel wire protocol.
//!
//! This module owns **every message that crosses the channel boundary**
//! between the replay client and the simulation backend, plus the payload of
//! the scenario-generation request.
//!
//! ## Directions
//!
//! | Message               | Direction        | Shape                                      |
//! |-----------------------|------------------|--------------------------------------------|
//! | initial configuration | client → server  | `{duration, simulationSpeed?, blockMotorwayLinks?}` |
//! | control update        | client → server  | `{simulationSpeed}` or `{blockMotorwayLinks}` |
//! | disconnect notice     | client → server  | `{type: "disconnect"}`                     |
//! | `vehicle_positions`   | server → client  | full snapshot of live vehicles             |
//! | `simulation_complete` | server → client  | end of run                                 |
//! | `error`               | server → client  | `{message}`                                |
//!
//! ## Design rules
//!
//! 1. Inbound messages decode into one tagged enum; anything else is a
//!    protocol error, never silently skipped.
//! 2. Field names follow the backend's camelCase, except `controlStatus`
//!    members which are snake_case on the wire.
//! 3. Every telemetry message is a complete snapshot, never a delta.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{ReplayError, Result};
use crate::types::LatLng;

// ---------------------------------------------------------------------------
// Close codes
// ---------------------------------------------------------------------------

/// Normal closure (user stop or simulation complete).
pub const CLOSE_NORMAL: u16 = 1000;
/// Closure used by the client when tearing down after a failure.
pub const CLOSE_INTERNAL_ERROR: u16 = 1011;
/// Reported when the stream ended without a close frame.
pub const CLOSE_ABNORMAL: u16 = 1006;

// ---------------------------------------------------------------------------
// Inbound (server → client)
// ---------------------------------------------------------------------------

/// One vehicle inside a `vehicle_positions` snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VehicleState {
    pub id: String,
    pub position: LatLng,
    /// Raw simulator type string (e.g. `"private_car"`).
    #[serde(rename = "type")]
    pub kind: String,
    /// Heading in degrees. Absent in older backends.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub angle: Option<f64>,
    /// Speed in km/h.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
}

/// Backend acknowledgement of the most recent control commands.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ControlStatus {
    #[serde(default)]
    pub speed_applied: bool,
    #[serde(default)]
    pub block_applied: bool,
}

/// Payload of a `vehicle_positions` message.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Telemetry {
    pub data: Vec<VehicleState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub control_status: Option<ControlStatus>,
    /// Simulation progress in percent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vehicle_count: Option<usize>,
    /// Server-side average speed in km/h.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub average_speed: Option<f64>,
}

/// Every message the backend may send.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    VehiclePositions(Telemetry),
    SimulationComplete,
    Error {
        #[serde(default)]
        message: String,
    },
    /// Any other `type` tag.
    #[serde(other)]
    Unrecognized,
}

impl ServerMessage {
    /// Decode a raw text frame. Malformed JSON, missing fields and unknown
    /// message kinds are all protocol errors.
    pub fn decode(raw: &str) -> Result<Self> {
        match serde_json::from_str::<ServerMessage>(raw) {
            Ok(ServerMessage::Unrecognized) => Err(ReplayError::Protocol(format!(
                "unrecognized message: {}",
                truncate(raw, 120)
            ))),
            Ok(msg) => Ok(msg),
            Err(e) => Err(ReplayError::Protocol(format!("malformed message: {}", e))),
        }
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

// ---------------------------------------------------------------------------
// Outbound (client → server)
// ---------------------------------------------------------------------------

/// First message sent once the channel is open.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InitialConfig {
    /// Simulated duration in seconds.
    pub duration: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub simulation_speed: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_motorway_links: Option<bool>,
}

/// Control update sent while the simulation runs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ControlMessage {
    Speed {
        #[serde(rename = "simulationSpeed")]
        simulation_speed: f64,
    },
    RoadBlock {
        #[serde(rename = "blockMotorwayLinks")]
        block_motorway_links: bool,
    },
}

/// Best-effort notice sent before a client-initiated close.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DisconnectNotice {
    Disconnect,
}

pub fn encode<T: Serialize>(msg: &T) -> Result<String> {
    Ok(serde_json::to_string(msg)?)
}

// ---------------------------------------------------------------------------
// Scenario generation (HTTP, outside the session core)
// ---------------------------------------------------------------------------

/// Per-class generation settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VehicleSettings {
    pub count: u32,
    pub fringe_factor: f64,
    pub enabled: bool,
}

/// Boolean generation options.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioOptions {
    pub polygons: bool,
    pub public_transport: bool,
    pub car_only_network: bool,
    pub decal: bool,
    pub left_hand: bool,
}

/// Body of the scenario-generation request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioRequest {
    pub coordinates: LatLng,
    /// Radius around `coordinates` in metres.
    pub radius: f64,
    pub duration: u64,
    /// Keyed by the backend's vehicle type (`passenger`, `rail_urban` …).
    pub vehicles: BTreeMap<String, VehicleSettings>,
    /// Enabled road types per category (`Highway`, `Railway` …).
    pub road_types: BTreeMap<String, Vec<String>>,
    pub options: ScenarioOptions,
}

/// One record of the generation progress stream.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProgressUpdate {
    pub message: String,
    pub progress: f64,
}

//! Control channel: user-issued simulation adjustments sent back over the
//! telemetry connection.
//!
//! Commands are fire-and-forget. The backend acknowledges asynchronously
//! through the `controlStatus` field of a later telemetry tick.

use crate::error::{ReplayError, Result};
use crate::protocol::{self, ControlMessage, ControlStatus};

/// A user intent to adjust the running simulation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ControlCommand {
    SetSpeed(f64),
    SetRoadBlock(bool),
}

impl ControlCommand {
    /// Validated speed command. The multiplier must be finite and positive.
    pub fn speed(multiplier: f64) -> Result<Self> {
        if !multiplier.is_finite() || multiplier <= 0.0 {
            return Err(ReplayError::InvalidControl(format!(
                "speed multiplier must be a positive number, got {}",
                multiplier
            )));
        }
        Ok(ControlCommand::SetSpeed(multiplier))
    }

    pub fn road_block(enabled: bool) -> Self {
        ControlCommand::SetRoadBlock(enabled)
    }

    pub fn to_message(self) -> ControlMessage {
        match self {
            ControlCommand::SetSpeed(simulation_speed) => ControlMessage::Speed { simulation_speed },
            ControlCommand::SetRoadBlock(block_motorway_links) => ControlMessage::RoadBlock {
                block_motorway_links,
            },
        }
    }

    pub fn encode(self) -> Result<String> {
        protocol::encode(&self.to_message())
    }
}

/// Desired control values plus the latest acknowledgement.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ControlChannel {
    speed: Option<f64>,
    road_block: bool,
    status: ControlStatus,
}

impl ControlChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the intent and return the encoded frame to send.
    pub fn prepare(&mut self, command: ControlCommand) -> Result<String> {
        if let ControlCommand::SetSpeed(m) = command {
            ControlCommand::speed(m)?;
        }
        let frame = command.encode()?;
        match command {
            ControlCommand::SetSpeed(m) => {
                self.speed = Some(m);
                self.status.speed_applied = false;
            }
            ControlCommand::SetRoadBlock(enabled) => {
                self.road_block = enabled;
                self.status.block_applied = false;
            }
        }
        Ok(frame)
    }

    /// Store the acknowledgement carried by a telemetry tick.
    pub fn acknowledge(&mut self, status: ControlStatus) {
        if status != self.status {
            log::debug!(
                "[control] Status speed_applied={} block_applied={}",
                status.speed_applied,
                status.block_applied
            );
        }
        self.status = status;
    }

    /// Last desired speed multiplier, if one was ever set.
    pub fn speed(&self) -> Option<f64> {
        self.speed
    }

    pub fn road_block(&self) -> bool {
        self.road_block
    }

    pub fn status(&self) -> ControlStatus {
        self.status
    }

    /// Forget acknowledgements from a finished connection. Desired values
    /// survive so the next session starts with them.
    pub fn reset_status(&mut self) {
        self.status = ControlStatus::default();
    }

    pub(crate) fn remember(&mut self, speed: Option<f64>, road_block: bool) {
        self.speed = speed;
        self.road_block = road_block;
    }
}

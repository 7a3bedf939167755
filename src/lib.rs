//! Traffic Replay
//!
//! Client core for watching a traffic simulation live: streams per-tick
//! vehicle snapshots from the simulation backend and keeps rotated,
//! footprint-sized overlays on a map in sync with them.
//!
//! ## Architecture
//!
//! ```text
//! ReplaySession  (session.rs)        ← lifecycle, callbacks, control
//!   ├── Transport  (events.rs)       ← channel boundary
//!   │     └── WsBridge  (bridge.rs)  ← native WebSocket thread
//!   ├── EntityRegistry  (registry.rs) ← snapshot diff
//!   ├── OverlayLayer  (overlay.rs)   ← one overlay per live id
//!   │     └── geometry.rs            ← bounds, rotation, projection
//!   ├── ControlChannel  (control.rs)
//!   └── SpeedSeries  (speed.rs)
//! ```
//!
//! The session is synchronous and single-threaded. Only the WebSocket
//! bridge runs async code, on its own thread.

pub mod config;
pub mod control;
pub mod error;
pub mod events;
pub mod geometry;
pub mod overlay;
pub mod progress;
pub mod protocol;
pub mod registry;
pub mod session;
pub mod speed;
pub mod types;

// Native transport requires the `transport` feature.
#[cfg(feature = "transport")]
pub mod bridge;

#[cfg(feature = "transport")]
pub use bridge::{BridgeConfig, WsBridge};
pub use config::ReplayConfig;
pub use control::{ControlChannel, ControlCommand};
pub use error::{ReplayError, Result};
pub use events::{ChannelEvent, Transport};
pub use geometry::{compute_bounds, compute_rotation, GeoBounds, ScreenPoint, ScreenRect};
pub use overlay::{MapSurface, OverlayLayer, SharedMap, VehicleOverlay};
pub use progress::ProgressDecoder;
pub use registry::{reconcile, EntityRegistry, LiveEntity, Reconciliation};
pub use session::{ConnectionState, ReplaySession, SessionParams, StopReason};
pub use speed::SpeedSeries;
pub use types::{EntityClass, FleetStats, Footprint, LatLng};

//! On-map representation of live entities.
//!
//! ```text
//! ReplaySession
//!   └── OverlayLayer  (this module)  ← one VehicleOverlay per live id
//!         └── MapSurface (external)  ← add / update / remove, projection
//! ```
//!
//! The layer owns the overlay state (bounds, angle, screen box); the map
//! surface only renders it. The surface belongs to the UI and may disappear
//! at any time, or be borrowed by the UI while the core runs (a pan/zoom
//! handler calling back into the session). In both cases map operations are
//! skipped and the overlay state is still maintained.

use std::cell::{RefCell, RefMut};
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use crate::geometry::{self, GeoBounds, ScreenPoint, ScreenRect};
use crate::registry::{LiveEntity, Reconciliation};
use crate::types::{EntityClass, LatLng};

// ---------------------------------------------------------------------------
// Map surface boundary
// ---------------------------------------------------------------------------

/// Rendering surface provided by the surrounding UI.
pub trait MapSurface {
    /// Project a coordinate to container pixels. `None` while the map has no
    /// projection yet.
    fn project(&self, coord: LatLng) -> Option<ScreenPoint>;

    fn add_overlay(&mut self, overlay: &VehicleOverlay);

    fn update_overlay(&mut self, overlay: &VehicleOverlay);

    fn remove_overlay(&mut self, id: &str);
}

pub type SharedMap = Rc<RefCell<dyn MapSurface>>;

// ---------------------------------------------------------------------------
// Overlay
// ---------------------------------------------------------------------------

/// Rotated, footprint-sized marker for one entity.
#[derive(Debug, Clone, PartialEq)]
pub struct VehicleOverlay {
    pub id: String,
    pub class: EntityClass,
    pub position: LatLng,
    pub bounds: GeoBounds,
    /// Accumulated display angle in degrees (unbounded).
    pub angle: f64,
    /// Last computed screen box, `None` until the map could project it.
    pub screen: Option<ScreenRect>,
}

impl VehicleOverlay {
    pub fn new(entity: &LiveEntity) -> Self {
        let mut overlay = Self {
            id: entity.id.clone(),
            class: entity.class,
            position: entity.position,
            bounds: geometry::compute_bounds(entity.position, entity.class),
            angle: 0.0,
            screen: None,
        };
        overlay.set_position(entity.position, entity.heading);
        overlay
    }

    pub fn icon_path(&self) -> String {
        self.class.icon_path()
    }

    pub fn tint(&self) -> &'static str {
        self.class.tint()
    }

    /// Move to `position` and turn towards `heading` along the short arc.
    /// Without a heading the current angle is kept.
    pub fn set_position(&mut self, position: LatLng, heading: Option<f64>) {
        self.position = position;
        self.bounds = geometry::compute_bounds(position, self.class);
        if let Some(target) = heading {
            self.angle = geometry::compute_rotation(self.angle, target);
        }
    }

    /// Recompute the screen box from the map's current projection.
    pub fn draw(&mut self, map: &dyn MapSurface) {
        let sw = map.project(self.bounds.south_west);
        let ne = map.project(self.bounds.north_east);
        self.screen = match (sw, ne) {
            (Some(sw), Some(ne)) => Some(ScreenRect::from_corners(sw, ne)),
            _ => None,
        };
    }
}

// ---------------------------------------------------------------------------
// Layer
// ---------------------------------------------------------------------------

/// Overlays keyed by entity id, mirrored onto an optional map surface.
#[derive(Default)]
pub struct OverlayLayer {
    overlays: HashMap<String, VehicleOverlay>,
    map: Option<Weak<RefCell<dyn MapSurface>>>,
}

impl OverlayLayer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach the surface. Only a weak handle is kept.
    pub fn attach(&mut self, map: &SharedMap) {
        self.map = Some(Rc::downgrade(map));
    }

    pub fn detach(&mut self) {
        self.map = None;
    }

    pub fn is_map_available(&self) -> bool {
        self.live_map().is_some()
    }

    /// Apply one tick's reconciliation: remove, then update, then create.
    pub fn apply(&mut self, diff: &Reconciliation) {
        let map = self.live_map();
        let mut map = map.as_ref().and_then(|m| Self::borrow(m, "apply"));

        for id in &diff.to_remove {
            if self.overlays.remove(id).is_some() {
                if let Some(map) = map.as_mut() {
                    map.remove_overlay(id);
                }
            }
        }

        for entity in &diff.to_update {
            match self.overlays.get_mut(&entity.id) {
                Some(overlay) => {
                    overlay.set_position(entity.position, entity.heading);
                    if let Some(map) = map.as_mut() {
                        overlay.draw(&**map);
                        map.update_overlay(overlay);
                    }
                }
                None => {
                    log::debug!("[overlay] Update for unknown overlay '{}', creating", entity.id);
                    let overlay = Self::create(entity, &mut map);
                    self.overlays.insert(entity.id.clone(), overlay);
                }
            }
        }

        for entity in &diff.to_create {
            let overlay = Self::create(entity, &mut map);
            self.overlays.insert(entity.id.clone(), overlay);
        }

        if map.is_none() && !diff.is_empty() {
            log::debug!("[overlay] Map unavailable, overlays kept off-screen");
        }
    }

    /// Re-place every overlay after the map projection changed (pan/zoom).
    pub fn redraw(&mut self) {
        let Some(map) = self.live_map() else {
            log::debug!("[overlay] Redraw skipped, map unavailable");
            return;
        };
        let Some(mut map) = Self::borrow(&map, "redraw") else {
            return;
        };
        for overlay in self.overlays.values_mut() {
            overlay.draw(&*map);
            map.update_overlay(overlay);
        }
    }

    /// Detach every overlay from the map and forget them.
    pub fn clear(&mut self) {
        if let Some(map) = self.live_map() {
            if let Some(mut map) = Self::borrow(&map, "clear") {
                for id in self.overlays.keys() {
                    map.remove_overlay(id);
                }
            }
        }
        self.overlays.clear();
    }

    pub fn get(&self, id: &str) -> Option<&VehicleOverlay> {
        self.overlays.get(id)
    }

    pub fn len(&self) -> usize {
        self.overlays.len()
    }

    pub fn is_empty(&self) -> bool {
        self.overlays.is_empty()
    }

    fn create(
        entity: &LiveEntity,
        map: &mut Option<RefMut<'_, dyn MapSurface + 'static>>,
    ) -> VehicleOverlay {
        let mut overlay = VehicleOverlay::new(entity);
        if let Some(map) = map.as_mut() {
            overlay.draw(&**map);
            map.add_overlay(&overlay);
        }
        overlay
    }

    /// Mutable access to the surface, `None` while the UI holds a borrow.
    fn borrow<'a>(
        map: &'a SharedMap,
        op: &str,
    ) -> Option<RefMut<'a, dyn MapSurface + 'static>> {
        match map.try_borrow_mut() {
            Ok(map) => Some(map),
            Err(_) => {
                log::debug!("[overlay] Map busy, {} skipped on the map", op);
                None
            }
        }
    }

    fn live_map(&self) -> Option<SharedMap> {
        self.map.as_ref().and_then(Weak::upgrade)
    }
}

impl std::fmt::Debug for OverlayLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OverlayLayer")
            .field("overlays", &self.overlays.len())
            .field("map_available", &self.is_map_available())
            .finish()
    }
}

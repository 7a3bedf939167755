//! Core replay types shared across all modules.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ---------------------------------------------------------------------------
// Geography
// ---------------------------------------------------------------------------

/// WGS84 coordinate as sent by the simulator (`{lat, lng}`).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

impl std::fmt::Display for LatLng {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.6}, {:.6})", self.lat, self.lng)
    }
}

/// Real-world size of an entity in metres.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Footprint {
    pub width: f64,
    pub length: f64,
}

impl Footprint {
    pub const fn new(width: f64, length: f64) -> Self {
        Self { width, length }
    }
}

// ---------------------------------------------------------------------------
// Entity classes
// ---------------------------------------------------------------------------

const PASSENGER_TINT: &str = "brightness(0) saturate(100%) invert(16%) sepia(96%) saturate(7404%) hue-rotate(359deg) brightness(97%) contrast(113%)";
const TRUCK_TINT: &str = "brightness(0) saturate(100%) invert(72%) sepia(88%) saturate(1099%) hue-rotate(359deg) brightness(102%) contrast(108%)";
const BUS_TINT: &str = "brightness(0) saturate(100%) invert(21%) sepia(96%) saturate(4146%) hue-rotate(238deg) brightness(97%) contrast(108%)";

/// Semantic category of a simulated object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityClass {
    Passenger,
    Truck,
    Bus,
    Motorcycle,
    Bicycle,
    Pedestrian,
    Tram,
    UrbanTrain,
    Train,
    Ship,
}

impl EntityClass {
    pub const ALL: [EntityClass; 10] = [
        EntityClass::Passenger,
        EntityClass::Truck,
        EntityClass::Bus,
        EntityClass::Motorcycle,
        EntityClass::Bicycle,
        EntityClass::Pedestrian,
        EntityClass::Tram,
        EntityClass::UrbanTrain,
        EntityClass::Train,
        EntityClass::Ship,
    ];

    /// Resolve a raw simulator type string (`"private_car"`, `"coach"`,
    /// `"rail_urban"` …) without falling back.
    ///
    /// The input is lower-cased and trimmed. Exact multi-part table keys are
    /// tried first, then the part before the first underscore.
    pub fn lookup(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_lowercase();
        if let Some(class) = Self::from_table(&normalized) {
            return Some(class);
        }
        let prefix = normalized.split('_').next().unwrap_or("");
        Self::from_table(prefix)
    }

    /// Like [`EntityClass::lookup`], but unknown types are logged and
    /// degrade to [`EntityClass::Passenger`].
    pub fn classify(raw: &str) -> Self {
        Self::lookup(raw).unwrap_or_else(|| {
            log::warn!("[types] Unknown vehicle type '{}', using 'passenger'", raw);
            EntityClass::Passenger
        })
    }

    fn from_table(key: &str) -> Option<Self> {
        let class = match key {
            "passenger" | "private" | "emergency" | "authority" | "vip" => EntityClass::Passenger,
            "truck" | "trailer" | "army" => EntityClass::Truck,
            "bus" | "coach" => EntityClass::Bus,
            "motorcycle" | "moped" => EntityClass::Motorcycle,
            "bicycle" | "bike" => EntityClass::Bicycle,
            "pedestrian" | "person" => EntityClass::Pedestrian,
            "tram" => EntityClass::Tram,
            "rail_urban" => EntityClass::UrbanTrain,
            "rail" | "rail_electric" => EntityClass::Train,
            "ship" => EntityClass::Ship,
            _ => return None,
        };
        Some(class)
    }

    /// Canonical name, also used as the icon identifier.
    pub fn as_str(self) -> &'static str {
        match self {
            EntityClass::Passenger => "passenger",
            EntityClass::Truck => "truck",
            EntityClass::Bus => "bus",
            EntityClass::Motorcycle => "motorcycle",
            EntityClass::Bicycle => "bicycle",
            EntityClass::Pedestrian => "pedestrian",
            EntityClass::Tram => "tram",
            EntityClass::UrbanTrain => "urban_train",
            EntityClass::Train => "train",
            EntityClass::Ship => "ship",
        }
    }

    pub fn icon(self) -> &'static str {
        self.as_str()
    }

    /// Asset path of the shared icon for this class.
    pub fn icon_path(self) -> String {
        format!("/images/{}.png", self.icon())
    }

    /// CSS filter used to tint the shared icon.
    pub fn tint(self) -> &'static str {
        match self {
            EntityClass::Truck => TRUCK_TINT,
            EntityClass::Bus => BUS_TINT,
            _ => PASSENGER_TINT,
        }
    }

    pub fn footprint(self) -> Footprint {
        match self {
            EntityClass::Passenger => Footprint::new(1.8, 4.5),
            EntityClass::Truck => Footprint::new(2.5, 8.0),
            EntityClass::Bus => Footprint::new(2.5, 12.0),
            EntityClass::Motorcycle => Footprint::new(0.8, 2.0),
            EntityClass::Bicycle => Footprint::new(0.6, 1.8),
            EntityClass::Pedestrian => Footprint::new(0.5, 0.5),
            EntityClass::Tram => Footprint::new(2.5, 15.0),
            EntityClass::UrbanTrain => Footprint::new(3.0, 20.0),
            EntityClass::Train => Footprint::new(3.2, 25.0),
            EntityClass::Ship => Footprint::new(5.0, 15.0),
        }
    }
}

impl Default for EntityClass {
    fn default() -> Self {
        EntityClass::Passenger
    }
}

impl std::fmt::Display for EntityClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Stats
// ---------------------------------------------------------------------------

/// Live statistics over the current registry, recomputed every tick.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FleetStats {
    pub total: usize,
    pub by_class: BTreeMap<EntityClass, usize>,
}

impl FleetStats {
    pub fn count(&self, class: EntityClass) -> usize {
        self.by_class.get(&class).copied().unwrap_or(0)
    }
}

impl std::fmt::Display for FleetStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "total={}", self.total)?;
        for (class, count) in &self.by_class {
            write!(f, " {}={}", class, count)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_maps_aliases() {
        assert_eq!(EntityClass::classify("private_car"), EntityClass::Passenger);
        assert_eq!(EntityClass::classify("  Coach_Long "), EntityClass::Bus);
        assert_eq!(EntityClass::classify("trailer"), EntityClass::Truck);
        assert_eq!(EntityClass::classify("moped"), EntityClass::Motorcycle);
        assert_eq!(EntityClass::classify("person_walking"), EntityClass::Pedestrian);
        assert_eq!(EntityClass::classify("army_truck"), EntityClass::Truck);
    }

    #[test]
    fn classify_rail_keys() {
        assert_eq!(EntityClass::classify("rail_urban"), EntityClass::UrbanTrain);
        assert_eq!(EntityClass::classify("rail_electric"), EntityClass::Train);
        assert_eq!(EntityClass::classify("rail_cargo"), EntityClass::Train);
    }

    #[test]
    fn unknown_type_defaults_to_passenger() {
        assert_eq!(EntityClass::classify("alien_hovercraft"), EntityClass::Passenger);
        assert_eq!(EntityClass::classify(""), EntityClass::Passenger);
        assert_eq!(EntityClass::lookup("alien_hovercraft"), None);
    }

    #[test]
    fn tint_falls_back_to_passenger() {
        assert_eq!(EntityClass::Ship.tint(), EntityClass::Passenger.tint());
        assert_ne!(EntityClass::Bus.tint(), EntityClass::Truck.tint());
    }

    #[test]
    fn icon_path_uses_canonical_name() {
        assert_eq!(EntityClass::UrbanTrain.icon_path(), "/images/urban_train.png");
    }

    #[test]
    fn footprint_table() {
        assert_eq!(EntityClass::Passenger.footprint(), Footprint::new(1.8, 4.5));
        assert_eq!(EntityClass::Train.footprint(), Footprint::new(3.2, 25.0));
    }
}

//! `EntityRegistry` — local mirror of the live simulated entities, and the
//! snapshot diff that keeps it in sync.
//!
//! Every telemetry tick is a complete enumeration, so each tick is a full
//! re-synchronisation: a missed tick can leave an entity stale for at most
//! one tick.

use std::collections::{HashMap, HashSet};

use crate::protocol::VehicleState;
use crate::types::{EntityClass, FleetStats, LatLng};

// ---------------------------------------------------------------------------
// Live entity
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct LiveEntity {
    pub id: String,
    pub position: LatLng,
    /// Heading in degrees, when the backend sends one.
    pub heading: Option<f64>,
    pub class: EntityClass,
    /// Raw type string as received.
    pub kind: String,
    /// km/h
    pub speed: Option<f64>,
}

// ---------------------------------------------------------------------------
// Reconciliation
// ---------------------------------------------------------------------------

/// Operations needed to move the registry from one snapshot to the next.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reconciliation {
    pub to_create: Vec<LiveEntity>,
    pub to_update: Vec<LiveEntity>,
    pub to_remove: Vec<String>,
}

impl Reconciliation {
    pub fn is_empty(&self) -> bool {
        self.to_create.is_empty() && self.to_update.is_empty() && self.to_remove.is_empty()
    }
}

/// Diff `previous` against a complete incoming snapshot.
///
/// Ids present before but missing now are removed, ids present in both are
/// updated, new ids are created. `incoming` must already be de-duplicated.
pub fn reconcile(previous: &EntityRegistry, incoming: &[LiveEntity]) -> Reconciliation {
    let incoming_ids: HashSet<&str> = incoming.iter().map(|e| e.id.as_str()).collect();

    let mut to_remove: Vec<String> = previous
        .entities
        .keys()
        .filter(|id| !incoming_ids.contains(id.as_str()))
        .cloned()
        .collect();
    to_remove.sort();

    let (to_update, to_create): (Vec<_>, Vec<_>) = incoming
        .iter()
        .cloned()
        .partition(|e| previous.entities.contains_key(&e.id));

    Reconciliation {
        to_create,
        to_update,
        to_remove,
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Live entities keyed by id. Owned by exactly one session.
#[derive(Debug, Default)]
pub struct EntityRegistry {
    entities: HashMap<String, LiveEntity>,
    /// Raw type strings already reported as unknown.
    unknown_kinds: HashSet<String>,
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Turn wire vehicles into live entities, resolving classes and
    /// dropping duplicate ids (last occurrence wins).
    pub fn ingest(&mut self, vehicles: &[VehicleState]) -> Vec<LiveEntity> {
        let mut index: HashMap<&str, usize> = HashMap::with_capacity(vehicles.len());
        let mut out: Vec<LiveEntity> = Vec::with_capacity(vehicles.len());

        for v in vehicles {
            let entity = LiveEntity {
                id: v.id.clone(),
                position: v.position,
                heading: v.angle,
                class: self.resolve_class(&v.kind),
                kind: v.kind.clone(),
                speed: v.speed,
            };
            match index.get(v.id.as_str()) {
                Some(&slot) => {
                    log::warn!("[registry] Duplicate id '{}' in snapshot, keeping last", v.id);
                    out[slot] = entity;
                }
                None => {
                    index.insert(v.id.as_str(), out.len());
                    out.push(entity);
                }
            }
        }
        out
    }

    /// Compute the diff for `incoming` and apply it in one step.
    pub fn sync(&mut self, incoming: &[LiveEntity]) -> Reconciliation {
        let diff = reconcile(self, incoming);
        self.apply(&diff);
        diff
    }

    pub fn apply(&mut self, diff: &Reconciliation) {
        for id in &diff.to_remove {
            self.entities.remove(id);
        }
        for e in diff.to_update.iter().chain(diff.to_create.iter()) {
            self.entities.insert(e.id.clone(), e.clone());
        }
    }

    pub fn get(&self, id: &str) -> Option<&LiveEntity> {
        self.entities.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entities.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &LiveEntity> {
        self.entities.values()
    }

    /// Total and per-class counts over the current entities.
    pub fn stats(&self) -> FleetStats {
        let mut stats = FleetStats {
            total: self.entities.len(),
            ..Default::default()
        };
        for e in self.entities.values() {
            *stats.by_class.entry(e.class).or_insert(0) += 1;
        }
        stats
    }

    /// Purge everything (called on every teardown).
    pub fn clear(&mut self) {
        self.entities.clear();
        self.unknown_kinds.clear();
    }

    fn resolve_class(&mut self, kind: &str) -> EntityClass {
        if let Some(class) = EntityClass::lookup(kind) {
            return class;
        }
        if self.unknown_kinds.insert(kind.to_string()) {
            log::warn!("[registry] Unknown vehicle type '{}', using 'passenger'", kind);
        }
        EntityClass::Passenger
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn vehicle(id: &str, kind: &str) -> VehicleState {
        VehicleState {
            id: id.into(),
            position: LatLng::new(37.5, 127.0),
            kind: kind.into(),
            angle: None,
            speed: None,
        }
    }

    fn snapshot(reg: &mut EntityRegistry, ids: &[&str]) -> Vec<LiveEntity> {
        let vehicles: Vec<_> = ids.iter().map(|id| vehicle(id, "passenger")).collect();
        reg.ingest(&vehicles)
    }

    // ---------------------------------------------------------------
    // Diff
    // ---------------------------------------------------------------

    #[test]
    fn first_snapshot_creates_everything() {
        let mut reg = EntityRegistry::new();
        let incoming = snapshot(&mut reg, &["a", "b"]);
        let diff = reg.sync(&incoming);
        assert_eq!(diff.to_create.len(), 2);
        assert!(diff.to_update.is_empty());
        assert!(diff.to_remove.is_empty());
        assert_eq!(reg.len(), 2);
    }

    #[test]
    fn diff_creates_updates_and_removes() {
        let mut reg = EntityRegistry::new();
        let first = snapshot(&mut reg, &["a", "b"]);
        reg.sync(&first);

        let second = snapshot(&mut reg, &["b", "c"]);
        let diff = reg.sync(&second);

        assert_eq!(diff.to_remove, vec!["a".to_string()]);
        assert_eq!(diff.to_update.len(), 1);
        assert_eq!(diff.to_update[0].id, "b");
        assert_eq!(diff.to_create.len(), 1);
        assert_eq!(diff.to_create[0].id, "c");
        assert!(!reg.contains("a"));
        assert_eq!(reg.len(), 2);
    }

    #[test]
    fn empty_snapshot_removes_all() {
        let mut reg = EntityRegistry::new();
        let first = snapshot(&mut reg, &["a", "b", "c"]);
        reg.sync(&first);

        let diff = reg.sync(&[]);
        assert_eq!(diff.to_remove.len(), 3);
        assert!(reg.is_empty());
    }

    #[test]
    fn reconcile_does_not_mutate() {
        let mut reg = EntityRegistry::new();
        let first = snapshot(&mut reg, &["a"]);
        reg.sync(&first);

        let diff = reconcile(&reg, &[]);
        assert_eq!(diff.to_remove, vec!["a".to_string()]);
        assert!(reg.contains("a"));
    }

    #[test]
    fn update_replaces_position() {
        let mut reg = EntityRegistry::new();
        let first = snapshot(&mut reg, &["a"]);
        reg.sync(&first);

        let mut moved = vehicle("a", "passenger");
        moved.position = LatLng::new(37.6, 127.1);
        moved.angle = Some(45.0);
        let incoming = reg.ingest(&[moved]);
        reg.sync(&incoming);

        let a = reg.get("a").unwrap();
        assert_eq!(a.position, LatLng::new(37.6, 127.1));
        assert_eq!(a.heading, Some(45.0));
    }

    // ---------------------------------------------------------------
    // Ingest
    // ---------------------------------------------------------------

    #[test]
    fn duplicate_ids_keep_last() {
        let mut reg = EntityRegistry::new();
        let mut second = vehicle("a", "bus");
        second.speed = Some(10.0);
        let out = reg.ingest(&[vehicle("a", "truck"), vehicle("b", "truck"), second]);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].id, "a");
        assert_eq!(out[0].class, EntityClass::Bus);
        assert_eq!(out[0].speed, Some(10.0));
    }

    #[test]
    fn unknown_kind_degrades_to_passenger() {
        let mut reg = EntityRegistry::new();
        let out = reg.ingest(&[vehicle("x", "alien_hovercraft")]);
        assert_eq!(out[0].class, EntityClass::Passenger);
        assert_eq!(out[0].kind, "alien_hovercraft");
    }

    // ---------------------------------------------------------------
    // Stats / clear
    // ---------------------------------------------------------------

    #[test]
    fn stats_group_by_class() {
        let mut reg = EntityRegistry::new();
        let incoming = reg.ingest(&[
            vehicle("a", "bus"),
            vehicle("b", "coach"),
            vehicle("c", "private_car"),
        ]);
        reg.sync(&incoming);

        let stats = reg.stats();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.count(EntityClass::Bus), 2);
        assert_eq!(stats.count(EntityClass::Passenger), 1);
        assert_eq!(stats.count(EntityClass::Ship), 0);
    }

    #[test]
    fn clear_resets_everything() {
        let mut reg = EntityRegistry::new();
        let incoming = snapshot(&mut reg, &["a", "b"]);
        reg.sync(&incoming);
        reg.clear();
        assert!(reg.is_empty());
        assert_eq!(reg.stats(), FleetStats::default());
    }

    #[test]
    fn many_entities() {
        let mut reg = EntityRegistry::new();
        let ids: Vec<String> = (0..100).map(|i| format!("e{i}")).collect();
        let refs: Vec<&str> = ids.iter().map(String::as_str).collect();
        let incoming = snapshot(&mut reg, &refs);
        reg.sync(&incoming);
        assert_eq!(reg.len(), 100);

        let incoming = snapshot(&mut reg, &refs[1..]);
        let diff = reg.sync(&incoming);
        assert_eq!(diff.to_remove, vec!["e0".to_string()]);
        assert_eq!(reg.len(), 99);
    }
}

//! In-memory reference store
//!
//! Concurrent maps give per-document atomic writes and nothing more, mirroring the
//! guarantees of the document stores the engine is written against. Useful for tests,
//! the command-line driver, and as a template for real backends.

use super::{PlaceStore, TrailRecordStore, TrailStore};
use crate::{
    Coordinate2D, CrosswayError, DetailLevel, EntityKind, Place, PlaceRef, Rectangle, Result,
    Trail, TrailPreview, geometry,
};
use dashmap::DashMap;
use geo::{Coord, LineString, SimplifyVwIdx};

use std::collections::BTreeMap;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
#[cfg(feature = "serde")]
use std::path::Path;

/// Serializable image of a whole [`InMemoryStore`]
#[cfg(feature = "serde")]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StoreSnapshot {
    pub trails: Vec<Trail>,
    pub places: Vec<Place>,
    /// Maintenance record ids keyed by trail id
    pub maintenance: BTreeMap<String, Vec<String>>,
    /// Accessibility notification ids keyed by trail id
    pub accessibility_notifications: BTreeMap<String, Vec<String>>,
}

/// Trail, place and per-trail record storage backed by sharded concurrent maps
#[derive(Debug, Default)]
pub struct InMemoryStore {
    trails: DashMap<String, Trail>,
    places: DashMap<String, Place>,
    maintenance: DashMap<String, Vec<String>>,
    accessibility_notifications: DashMap<String, Vec<String>>,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a maintenance record to a trail
    pub fn insert_maintenance(&self, trail_id: &str, record_id: impl Into<String>) {
        self.maintenance
            .entry(trail_id.to_string())
            .or_default()
            .push(record_id.into());
    }

    /// Attach an accessibility notification to a trail
    pub fn insert_accessibility_notification(&self, trail_id: &str, record_id: impl Into<String>) {
        self.accessibility_notifications
            .entry(trail_id.to_string())
            .or_default()
            .push(record_id.into());
    }

    pub fn maintenance_count(&self, trail_id: &str) -> usize {
        self.maintenance.get(trail_id).map_or(0, |r| r.len())
    }

    pub fn accessibility_notification_count(&self, trail_id: &str) -> usize {
        self.accessibility_notifications
            .get(trail_id)
            .map_or(0, |r| r.len())
    }

    #[cfg(feature = "serde")]
    pub fn from_snapshot(snapshot: StoreSnapshot) -> Self {
        let store = Self::new();
        for trail in snapshot.trails {
            store.trails.insert(trail.id.clone(), trail);
        }
        for place in snapshot.places {
            store.places.insert(place.id.clone(), place);
        }
        for (trail_id, records) in snapshot.maintenance {
            store.maintenance.insert(trail_id, records);
        }
        for (trail_id, records) in snapshot.accessibility_notifications {
            store.accessibility_notifications.insert(trail_id, records);
        }
        store
    }

    /// Copy out the current contents, ordered by id
    #[cfg(feature = "serde")]
    pub fn snapshot(&self) -> StoreSnapshot {
        StoreSnapshot {
            trails: sorted_values(&self.trails),
            places: sorted_values(&self.places),
            maintenance: self
                .maintenance
                .iter()
                .map(|e| (e.key().clone(), e.value().clone()))
                .collect(),
            accessibility_notifications: self
                .accessibility_notifications
                .iter()
                .map(|e| (e.key().clone(), e.value().clone()))
                .collect(),
        }
    }

    /// Load a JSON snapshot file
    #[cfg(feature = "serde")]
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self> {
        let file = std::fs::File::open(path.as_ref())?;
        let reader = std::io::BufReader::new(file);
        let snapshot: StoreSnapshot = serde_json::from_reader(reader)?;
        tracing::debug!(
            trails = snapshot.trails.len(),
            places = snapshot.places.len(),
            "Loaded store snapshot from {}",
            path.as_ref().display()
        );
        Ok(Self::from_snapshot(snapshot))
    }

    /// Write the current contents as a pretty-printed JSON snapshot
    #[cfg(feature = "serde")]
    pub fn save_json(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = std::fs::File::create(path.as_ref())?;
        let writer = std::io::BufWriter::new(file);
        serde_json::to_writer_pretty(writer, &self.snapshot())?;
        Ok(())
    }

    fn sorted_trails<F>(&self, filter: F) -> Vec<Trail>
    where
        F: Fn(&Trail) -> bool,
    {
        let mut trails: Vec<Trail> = self
            .trails
            .iter()
            .filter(|entry| filter(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();
        trails.sort_by(|a, b| a.id.cmp(&b.id));
        trails
    }
}

#[cfg(feature = "serde")]
fn sorted_values<V: Clone>(map: &DashMap<String, V>) -> Vec<V> {
    let mut entries: Vec<(String, V)> = map
        .iter()
        .map(|e| (e.key().clone(), e.value().clone()))
        .collect();
    entries.sort_by(|a, b| a.0.cmp(&b.0));
    entries.into_iter().map(|(_, v)| v).collect()
}

/// Visvalingam-Whyatt area tolerance (square degrees) for each detail level
fn simplification_tolerance(level: DetailLevel) -> Option<f64> {
    match level {
        DetailLevel::Low => Some(1e-6),
        DetailLevel::Medium => Some(1e-7),
        DetailLevel::High => Some(1e-8),
        DetailLevel::Full => None,
    }
}

/// Reduce the coordinate payload of a trail copy to the requested level
fn with_detail(mut trail: Trail, level: DetailLevel) -> Trail {
    let Some(tolerance) = simplification_tolerance(level) else {
        return trail;
    };
    if trail.coordinates.len() <= 2 {
        return trail;
    }

    let linestring: LineString<f64> = trail
        .coordinates
        .iter()
        .map(|c| c.to_coord())
        .collect::<Vec<Coord<f64>>>()
        .into();
    let kept = linestring.simplify_vw_idx(tolerance);
    trail.coordinates = kept.into_iter().map(|i| trail.coordinates[i]).collect();
    trail
}

fn page<T>(items: Vec<T>, skip: usize, limit: usize) -> Vec<T> {
    items.into_iter().skip(skip).take(limit).collect()
}

fn check_version(kind: EntityKind, id: &str, expected: Option<u64>, actual: u64) -> Result<()> {
    match expected {
        Some(expected) if expected != actual => Err(CrosswayError::VersionConflict {
            kind,
            id: id.to_string(),
            expected,
            actual,
        }),
        _ => Ok(()),
    }
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl TrailStore for InMemoryStore {
    fn get_by_id(&self, id: &str, level: DetailLevel) -> Result<Option<Trail>> {
        Ok(self
            .trails
            .get(id)
            .map(|entry| with_detail(entry.value().clone(), level)))
    }

    fn get_preview_by_id(&self, id: &str) -> Result<Option<TrailPreview>> {
        Ok(self.trails.get(id).map(|entry| entry.value().preview()))
    }

    fn upsert(&self, mut trail: Trail) -> Result<Trail> {
        let mut entry = self.trails.entry(trail.id.clone()).or_insert_with(|| Trail {
            version: 0,
            ..trail.clone()
        });
        trail.version = entry.version + 1;
        *entry = trail.clone();
        Ok(trail)
    }

    fn delete(&self, id: &str) -> Result<Option<Trail>> {
        Ok(self.trails.remove(id).map(|(_, trail)| trail))
    }

    fn find_within_rectangle(
        &self,
        rectangle: &Rectangle,
        skip: usize,
        limit: usize,
        level: DetailLevel,
    ) -> Result<Vec<Trail>> {
        let candidates = self.sorted_trails(|trail| {
            trail
                .bounding_rectangle()
                .is_ok_and(|bounds| bounds.intersects(rectangle))
                && geometry::polyline_intersects_rectangle(&trail.coordinates, rectangle)
        });
        Ok(page(candidates, skip, limit)
            .into_iter()
            .map(|trail| with_detail(trail, level))
            .collect())
    }

    fn find_by_place_id(
        &self,
        place_id: &str,
        skip: usize,
        limit: usize,
        level: DetailLevel,
    ) -> Result<Vec<Trail>> {
        let holders = self.sorted_trails(|trail| trail.location_for(place_id).is_some());
        Ok(page(holders, skip, limit)
            .into_iter()
            .map(|trail| with_detail(trail, level))
            .collect())
    }

    fn find_all(&self, skip: usize, limit: usize, level: DetailLevel) -> Result<Vec<Trail>> {
        let all = self.sorted_trails(|_| true);
        Ok(page(all, skip, limit)
            .into_iter()
            .map(|trail| with_detail(trail, level))
            .collect())
    }

    fn update_locations(
        &self,
        id: &str,
        locations: Vec<PlaceRef>,
        expected_version: Option<u64>,
    ) -> Result<Trail> {
        let mut entry = self
            .trails
            .get_mut(id)
            .ok_or_else(|| CrosswayError::trail_not_found(id))?;
        check_version(EntityKind::Trail, id, expected_version, entry.version)?;

        entry.locations = locations;
        entry.version += 1;
        Ok(entry.value().clone())
    }

    fn count(&self) -> Result<usize> {
        Ok(self.trails.len())
    }
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl PlaceStore for InMemoryStore {
    fn get_by_id(&self, id: &str) -> Result<Option<Place>> {
        Ok(self.places.get(id).map(|entry| entry.value().clone()))
    }

    fn upsert(&self, mut place: Place) -> Result<Place> {
        let mut entry = self.places.entry(place.id.clone()).or_insert_with(|| Place {
            version: 0,
            ..place.clone()
        });
        place.version = entry.version + 1;
        *entry = place.clone();
        Ok(place)
    }

    fn link_trail(
        &self,
        place_id: &str,
        trail_id: &str,
        coordinates: Coordinate2D,
    ) -> Result<Place> {
        let mut entry = self
            .places
            .get_mut(place_id)
            .ok_or_else(|| CrosswayError::place_not_found(place_id))?;

        if entry.attach(trail_id, coordinates) {
            entry.version += 1;
        }
        Ok(entry.value().clone())
    }

    fn remove_trail(
        &self,
        place_id: &str,
        trail_id: &str,
        coordinates: Coordinate2D,
    ) -> Result<Place> {
        let mut entry = self
            .places
            .get_mut(place_id)
            .ok_or_else(|| CrosswayError::place_not_found(place_id))?;

        if entry.detach(trail_id, coordinates) {
            entry.version += 1;
        }
        Ok(entry.value().clone())
    }

    fn update_crossings(
        &self,
        place_id: &str,
        attachments: BTreeMap<String, Coordinate2D>,
        expected_version: Option<u64>,
    ) -> Result<Place> {
        let mut entry = self
            .places
            .get_mut(place_id)
            .ok_or_else(|| CrosswayError::place_not_found(place_id))?;
        check_version(EntityKind::Place, place_id, expected_version, entry.version)?;

        entry.set_attachments(attachments);
        entry.version += 1;
        Ok(entry.value().clone())
    }

    fn find_all(&self, skip: usize, limit: usize) -> Result<Vec<Place>> {
        let mut places: Vec<Place> = self.places.iter().map(|e| e.value().clone()).collect();
        places.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(page(places, skip, limit))
    }
}

impl TrailRecordStore for InMemoryStore {
    fn delete_maintenance_by_trail_id(&self, trail_id: &str) -> Result<usize> {
        Ok(self
            .maintenance
            .remove(trail_id)
            .map_or(0, |(_, records)| records.len()))
    }

    fn delete_accessibility_notifications_by_trail_id(&self, trail_id: &str) -> Result<usize> {
        Ok(self
            .accessibility_notifications
            .remove(trail_id)
            .map_or(0, |(_, records)| records.len()))
    }
}

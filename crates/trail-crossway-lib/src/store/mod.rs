//! Store abstractions consumed by the engine
//!
//! The engine never owns trail or place state: it reads and writes through these traits.
//! Each call is assumed atomic for the single document it touches and nothing more. No
//! cross-document transaction is available, which is why the propagator orders its
//! writes carefully and journals every completed step.
//!
//! Writes bump a per-entity `version`. Passing `expected_version` turns a blind write into
//! a compare-and-swap that fails with `VersionConflict` instead of silently overwriting a
//! concurrent change.

mod memory;

pub use memory::InMemoryStore;
#[cfg(feature = "serde")]
pub use memory::StoreSnapshot;

use crate::{Coordinate2D, DetailLevel, Place, PlaceRef, Rectangle, Result, Trail, TrailPreview};
use std::collections::BTreeMap;

/// Persistence of trails
pub trait TrailStore: Send + Sync {
    /// Read a trail with the coordinate payload reduced to `level`
    fn get_by_id(&self, id: &str, level: DetailLevel) -> Result<Option<Trail>>;

    /// Read only id, version and crossway references
    fn get_preview_by_id(&self, id: &str) -> Result<Option<TrailPreview>>;

    /// Insert or replace a trail, returning the post-write state
    fn upsert(&self, trail: Trail) -> Result<Trail>;

    /// Delete a trail, returning its last state (`None` if it did not exist)
    fn delete(&self, id: &str) -> Result<Option<Trail>>;

    /// Trails whose geometry overlaps `rectangle`, paged and ordered by id
    fn find_within_rectangle(
        &self,
        rectangle: &Rectangle,
        skip: usize,
        limit: usize,
        level: DetailLevel,
    ) -> Result<Vec<Trail>>;

    /// Trails holding a reference to `place_id`, paged and ordered by id
    fn find_by_place_id(
        &self,
        place_id: &str,
        skip: usize,
        limit: usize,
        level: DetailLevel,
    ) -> Result<Vec<Trail>>;

    /// All trails, paged and ordered by id
    fn find_all(&self, skip: usize, limit: usize, level: DetailLevel) -> Result<Vec<Trail>>;

    /// Replace a trail's `locations`
    ///
    /// With `expected_version` set, fails with `VersionConflict` when the stored trail has
    /// moved on since it was read.
    fn update_locations(
        &self,
        id: &str,
        locations: Vec<PlaceRef>,
        expected_version: Option<u64>,
    ) -> Result<Trail>;

    fn count(&self) -> Result<usize>;
}

/// Persistence of places
pub trait PlaceStore: Send + Sync {
    fn get_by_id(&self, id: &str) -> Result<Option<Place>>;

    /// Insert or replace a place, returning the post-write state
    fn upsert(&self, place: Place) -> Result<Place>;

    /// Add `trail_id` to the place's crossing set and record the attachment point
    fn link_trail(&self, place_id: &str, trail_id: &str, coordinates: Coordinate2D)
    -> Result<Place>;

    /// Remove `trail_id` from the place's crossing set and drop its attachment point
    /// unless another crossing trail still attaches there
    fn remove_trail(
        &self,
        place_id: &str,
        trail_id: &str,
        coordinates: Coordinate2D,
    ) -> Result<Place>;

    /// Replace the place's crossings with `attachments` (trail id -> attachment point)
    ///
    /// With `expected_version` set, fails with `VersionConflict` when the stored place has
    /// moved on since it was read.
    fn update_crossings(
        &self,
        place_id: &str,
        attachments: BTreeMap<String, Coordinate2D>,
        expected_version: Option<u64>,
    ) -> Result<Place>;

    /// All places, paged and ordered by id
    fn find_all(&self, skip: usize, limit: usize) -> Result<Vec<Place>>;
}

/// Records keyed by trail id that are owned by other subsystems
///
/// The engine only purges them when a trail is deleted.
pub trait TrailRecordStore: Send + Sync {
    /// Delete maintenance records of a trail, returning how many were removed
    fn delete_maintenance_by_trail_id(&self, trail_id: &str) -> Result<usize>;

    /// Delete accessibility notifications of a trail, returning how many were removed
    fn delete_accessibility_notifications_by_trail_id(&self, trail_id: &str) -> Result<usize>;
}

/// Walk a paged query until a short page comes back
pub(crate) fn collect_pages<T, F>(page_size: usize, mut fetch: F) -> Result<Vec<T>>
where
    F: FnMut(usize, usize) -> Result<Vec<T>>,
{
    let page_size = page_size.max(1);
    let mut all = Vec::new();
    let mut skip = 0;
    loop {
        let page = fetch(skip, page_size)?;
        let fetched = page.len();
        all.extend(page);
        if fetched < page_size {
            return Ok(all);
        }
        skip += fetched;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collect_pages_walks_to_short_page() {
        let data: Vec<usize> = (0..25).collect();
        let mut calls = 0;
        let all = collect_pages(10, |skip, limit| {
            calls += 1;
            Ok(data.iter().skip(skip).take(limit).copied().collect())
        })
        .unwrap();
        assert_eq!(all, data);
        assert_eq!(calls, 3);
    }

    #[test]
    fn test_collect_pages_exact_multiple() {
        let data: Vec<usize> = (0..20).collect();
        let all = collect_pages(10, |skip, limit| {
            Ok(data.iter().skip(skip).take(limit).copied().collect())
        })
        .unwrap();
        assert_eq!(all.len(), 20);
    }
}

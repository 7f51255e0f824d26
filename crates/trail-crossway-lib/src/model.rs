//! Trail and place records
//!
//! A [`Trail`] owns its polyline and the ordered list of places it attaches to. A
//! [`Place`] records the set of trails crossing it. Both sides are denormalized copies of
//! the same bipartite edge set and are kept in step by the propagator; callers should not
//! edit `locations` or `crossing_trail_ids` directly.

use crate::{Coordinate2D, CoordinateWithAltitude, CrosswayError, Result, coordinates, geometry};
use std::collections::{BTreeMap, BTreeSet};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Granularity of the coordinate payload returned by trail reads
///
/// The engine passes this through to the store and never interprets it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum DetailLevel {
    Low,
    Medium,
    High,
    #[default]
    Full,
}

/// A trail-local attachment of a shared place
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct PlaceRef {
    /// Id of the referenced place
    pub place_id: String,
    /// Point on or near the trail where the place attaches
    pub coordinates: Coordinate2D,
    /// Other trails known to cross this same place
    #[cfg_attr(feature = "serde", serde(default))]
    pub encountered_trail_ids: BTreeSet<String>,
}

impl PlaceRef {
    pub fn new(place_id: impl Into<String>, coordinates: Coordinate2D) -> Self {
        Self {
            place_id: place_id.into(),
            coordinates,
            encountered_trail_ids: BTreeSet::new(),
        }
    }

    /// Builder-style helper to seed crossway references
    pub fn with_encountered<I, S>(mut self, trail_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.encountered_trail_ids
            .extend(trail_ids.into_iter().map(Into::into));
        self
    }

    #[inline]
    pub fn has_encountered(&self, trail_id: &str) -> bool {
        self.encountered_trail_ids.contains(trail_id)
    }
}

/// A trail: a polyline plus the places it attaches to, ordered along the polyline
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct Trail {
    pub id: String,
    /// Optimistic-concurrency token, bumped by the store on every write
    #[cfg_attr(feature = "serde", serde(default))]
    pub version: u64,
    pub coordinates: Vec<Coordinate2D>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub locations: Vec<PlaceRef>,
}

impl Trail {
    /// Create an unversioned trail with no place references
    pub fn new(id: impl Into<String>, coordinates: Vec<Coordinate2D>) -> Self {
        Self {
            id: id.into(),
            version: 0,
            coordinates,
            locations: Vec::new(),
        }
    }

    /// Check the polyline has at least two valid points and every reference is well-formed
    pub fn validate(&self) -> Result<()> {
        if self.id.is_empty() {
            return Err(CrosswayError::InvalidInput(
                "Trail id must not be empty".to_string(),
            ));
        }
        if self.coordinates.len() < 2 {
            return Err(CrosswayError::InvalidInput(format!(
                "Trail '{}' needs at least 2 coordinates, got {}",
                self.id,
                self.coordinates.len()
            )));
        }
        coordinates::validate_all(&self.coordinates)?;
        for location in &self.locations {
            if location.place_id.is_empty() {
                return Err(CrosswayError::InvalidInput(format!(
                    "Trail '{}' holds a place reference without place id",
                    self.id
                )));
            }
            location.coordinates.validated()?;
        }
        Ok(())
    }

    /// The reference this trail holds for `place_id`, if any
    pub fn location_for(&self, place_id: &str) -> Option<&PlaceRef> {
        self.locations.iter().find(|l| l.place_id == place_id)
    }

    pub fn location_for_mut(&mut self, place_id: &str) -> Option<&mut PlaceRef> {
        self.locations.iter_mut().find(|l| l.place_id == place_id)
    }

    /// Bounding rectangle of the polyline
    pub fn bounding_rectangle(&self) -> Result<geometry::Rectangle> {
        geometry::outer_rectangle(&self.coordinates)
    }

    /// Total length in meters
    pub fn length_meters(&self) -> f64 {
        coordinates::haversine_length(&self.coordinates)
    }

    /// Lightweight view carrying only crossway references
    pub fn preview(&self) -> TrailPreview {
        TrailPreview {
            id: self.id.clone(),
            version: self.version,
            locations: self
                .locations
                .iter()
                .map(|l| PlaceRefPreview {
                    place_id: l.place_id.clone(),
                    encountered_trail_ids: l.encountered_trail_ids.clone(),
                })
                .collect(),
        }
    }
}

/// Crossway references of a single place attachment, without coordinates
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct PlaceRefPreview {
    pub place_id: String,
    pub encountered_trail_ids: BTreeSet<String>,
}

/// Lightweight trail read: id, version and crossway references only
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct TrailPreview {
    pub id: String,
    pub version: u64,
    pub locations: Vec<PlaceRefPreview>,
}

impl TrailPreview {
    /// Whether this trail already lists `trail_id` as encountered at `place_id`
    pub fn has_encountered_at(&self, place_id: &str, trail_id: &str) -> bool {
        self.locations
            .iter()
            .any(|l| l.place_id == place_id && l.encountered_trail_ids.contains(trail_id))
    }
}

/// A shared point of interest crossed by trails
#[derive(Clone, Debug, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct Place {
    pub id: String,
    #[cfg_attr(feature = "serde", serde(default))]
    pub version: u64,
    #[cfg_attr(feature = "serde", serde(default))]
    pub name: String,
    /// Distinct attachment points contributed by linked trails
    #[cfg_attr(feature = "serde", serde(default))]
    pub coordinates: Vec<Coordinate2D>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub crossing_trail_ids: BTreeSet<String>,
    /// Attachment point of each linked trail
    #[cfg_attr(feature = "serde", serde(default))]
    pub attachments: BTreeMap<String, Coordinate2D>,
}

impl Place {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            ..Default::default()
        }
    }

    /// Record `trail_id` as crossing at `point`, returning whether anything changed
    ///
    /// A trail attaches at a single point; re-attaching elsewhere moves it.
    pub fn attach(&mut self, trail_id: &str, point: Coordinate2D) -> bool {
        let inserted = self.crossing_trail_ids.insert(trail_id.to_string());
        let previous = self.attachments.insert(trail_id.to_string(), point);
        if previous == Some(point) {
            return inserted;
        }
        if let Some(old) = previous {
            self.release_point(old);
        }
        if !self.coordinates.contains(&point) {
            self.coordinates.push(point);
        }
        true
    }

    /// Forget `trail_id`, returning whether anything changed
    ///
    /// The attachment point is dropped only once no remaining trail attaches there.
    /// `point` is used for trails linked before attachments were tracked.
    pub fn detach(&mut self, trail_id: &str, point: Coordinate2D) -> bool {
        let removed = self.crossing_trail_ids.remove(trail_id);
        let point = self.attachments.remove(trail_id).unwrap_or(point);
        let released = self.release_point(point);
        removed || released
    }

    /// Replace crossings and attachments wholesale, deriving `coordinates`
    pub fn set_attachments(&mut self, attachments: BTreeMap<String, Coordinate2D>) {
        self.crossing_trail_ids = attachments.keys().cloned().collect();
        self.coordinates = distinct_points(attachments.values().copied());
        self.attachments = attachments;
    }

    fn release_point(&mut self, point: Coordinate2D) -> bool {
        if self.attachments.values().any(|p| *p == point) {
            return false;
        }
        let before = self.coordinates.len();
        self.coordinates.retain(|p| *p != point);
        self.coordinates.len() != before
    }
}

fn distinct_points(points: impl IntoIterator<Item = Coordinate2D>) -> Vec<Coordinate2D> {
    points.into_iter().fold(Vec::new(), |mut acc, p| {
        if !acc.contains(&p) {
            acc.push(p);
        }
        acc
    })
}

/// A trail crossed by a query line, with the crossing points in query order
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TrailIntersection {
    pub trail: Trail,
    pub points: Vec<CoordinateWithAltitude>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c(lat: f64, lon: f64) -> Coordinate2D {
        Coordinate2D::new(lat, lon)
    }

    #[test]
    fn test_trail_validation() {
        let trail = Trail::new("t-1", vec![c(45.0, 7.0), c(45.1, 7.1)]);
        assert!(trail.validate().is_ok());

        let short = Trail::new("t-2", vec![c(45.0, 7.0)]);
        assert!(matches!(
            short.validate(),
            Err(CrosswayError::InvalidInput(_))
        ));

        let malformed = Trail::new("t-3", vec![c(45.0, 7.0), c(95.0, 7.0)]);
        assert!(malformed.validate().is_err());

        let mut bad_ref = Trail::new("t-4", vec![c(45.0, 7.0), c(45.1, 7.1)]);
        bad_ref.locations.push(PlaceRef::new("", c(45.0, 7.0)));
        assert!(bad_ref.validate().is_err());
    }

    #[test]
    fn test_location_lookup() {
        let mut trail = Trail::new("t-1", vec![c(0.0, 0.0), c(0.0, 1.0)]);
        trail.locations.push(PlaceRef::new("p-1", c(0.0, 0.5)));

        assert!(trail.location_for("p-1").is_some());
        assert!(trail.location_for("p-2").is_none());

        trail
            .location_for_mut("p-1")
            .unwrap()
            .encountered_trail_ids
            .insert("t-9".to_string());
        assert!(trail.location_for("p-1").unwrap().has_encountered("t-9"));
    }

    #[test]
    fn test_preview_keeps_crossway_references() {
        let mut trail = Trail::new("t-1", vec![c(0.0, 0.0), c(0.0, 1.0)]);
        trail.version = 4;
        trail
            .locations
            .push(PlaceRef::new("p-1", c(0.0, 0.5)).with_encountered(["t-2", "t-3"]));
        trail
            .locations
            .push(PlaceRef::new("p-2", c(0.0, 0.8)).with_encountered(["t-4"]));

        let preview = trail.preview();
        assert_eq!(preview.version, 4);
        assert!(preview.has_encountered_at("p-1", "t-2"));
        assert!(!preview.has_encountered_at("p-2", "t-2"));
        assert!(preview.has_encountered_at("p-2", "t-4"));
    }

    #[test]
    fn test_shared_attachment_point_outlives_one_trail() {
        let mut place = Place::new("p-1", "Col");
        assert!(place.attach("t-1", c(0.0, 5.0)));
        assert!(place.attach("t-2", c(0.0, 5.0)));
        assert!(!place.attach("t-2", c(0.0, 5.0)));
        assert_eq!(place.coordinates, vec![c(0.0, 5.0)]);

        assert!(place.detach("t-1", c(0.0, 5.0)));
        assert_eq!(place.crossing_trail_ids, BTreeSet::from(["t-2".to_string()]));
        assert_eq!(place.coordinates, vec![c(0.0, 5.0)]);

        assert!(place.detach("t-2", c(0.0, 5.0)));
        assert!(place.coordinates.is_empty());
        assert!(!place.detach("t-2", c(0.0, 5.0)));
    }

    #[test]
    fn test_reattaching_moves_the_point() {
        let mut place = Place::new("p-1", "Col");
        place.attach("t-1", c(0.0, 5.0));
        assert!(place.attach("t-1", c(0.0, 6.0)));
        assert_eq!(place.coordinates, vec![c(0.0, 6.0)]);
        assert_eq!(place.attachments.len(), 1);
    }

    #[test]
    fn test_set_attachments_derives_crossings() {
        let mut place = Place::new("p-1", "Col");
        place.attach("stale", c(1.0, 1.0));
        place.set_attachments(BTreeMap::from([
            ("t-1".to_string(), c(0.0, 5.0)),
            ("t-2".to_string(), c(0.0, 5.0)),
        ]));
        assert_eq!(
            place.crossing_trail_ids,
            BTreeSet::from(["t-1".to_string(), "t-2".to_string()])
        );
        assert_eq!(place.coordinates, vec![c(0.0, 5.0)]);
    }

    #[test]
    fn test_trail_length() {
        let trail = Trail::new("t-1", vec![c(0.0, 0.0), c(0.0, 0.01)]);
        let length = trail.length_meters();
        assert!(length > 1000.0 && length < 1200.0);
    }
}

//! Read-only view of the trail–place graph
//!
//! Edges live on the trail side (a [`PlaceRef`] in `locations`). The place side and the
//! crossway references are denormalized copies of those edges; this view rebuilds the
//! adjacency from a snapshot and reports every place where the copies disagree.

use crate::{
    DetailLevel, Place, PlaceStore, Result, Trail, TrailPlaceAligner, TrailStore,
    store::collect_pages,
};
use rayon::prelude::*;
use std::collections::{BTreeMap, BTreeSet};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A disagreement between the copies of the graph
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(
    feature = "serde",
    serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")
)]
pub enum GraphViolation {
    /// A trail references a place that does not exist
    MissingPlace { trail_id: String, place_id: String },
    /// A trail references a place whose crossing set does not list it
    MissingCrossing { place_id: String, trail_id: String },
    /// A place lists a trail that holds no reference to it
    DanglingCrossing { place_id: String, trail_id: String },
    /// Two trails hold the same place but the first does not list the second
    MissingCrosswayReference {
        trail_id: String,
        place_id: String,
        other_trail_id: String,
    },
    /// A trail lists another trail at a place the other no longer holds
    StaleCrosswayReference {
        trail_id: String,
        place_id: String,
        other_trail_id: String,
    },
    /// A trail's `locations` are not in order along its polyline
    Unaligned { trail_id: String },
}

impl GraphViolation {
    /// Whether the consistency model allows this state to persist after unlink or delete
    ///
    /// Stale crossway references are left behind on purpose and only cleared by
    /// reconciliation.
    pub fn is_tolerated(&self) -> bool {
        matches!(self, GraphViolation::StaleCrosswayReference { .. })
    }
}

/// Snapshot of trails and places with the adjacency derived from trail `locations`
#[derive(Debug, Clone, Default)]
pub struct CrosswayGraph {
    trails: BTreeMap<String, Trail>,
    places: BTreeMap<String, Place>,
    /// place id -> ids of trails holding a reference to it
    holders: BTreeMap<String, BTreeSet<String>>,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl CrosswayGraph {
    pub fn new(trails: Vec<Trail>, places: Vec<Place>) -> Self {
        let mut holders: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for trail in &trails {
            for location in &trail.locations {
                holders
                    .entry(location.place_id.clone())
                    .or_default()
                    .insert(trail.id.clone());
            }
        }

        Self {
            trails: trails.into_iter().map(|t| (t.id.clone(), t)).collect(),
            places: places.into_iter().map(|p| (p.id.clone(), p)).collect(),
            holders,
        }
    }

    /// Read every trail and place out of the stores, `page_size` documents at a time
    pub fn load(
        trails: &dyn TrailStore,
        places: &dyn PlaceStore,
        page_size: usize,
    ) -> Result<Self> {
        #[cfg(feature = "profiling")]
        profiling::scope!("graph::load");

        let all_trails = collect_pages(page_size, |skip, limit| {
            trails.find_all(skip, limit, DetailLevel::Full)
        })?;
        let all_places = collect_pages(page_size, |skip, limit| places.find_all(skip, limit))?;
        tracing::debug!(
            trails = all_trails.len(),
            places = all_places.len(),
            "Loaded crossway graph"
        );
        Ok(Self::new(all_trails, all_places))
    }

    pub fn trail(&self, id: &str) -> Option<&Trail> {
        self.trails.get(id)
    }

    pub fn place(&self, id: &str) -> Option<&Place> {
        self.places.get(id)
    }

    /// Every (trail id, place id) edge, ordered
    pub fn edges(&self) -> Vec<(&str, &str)> {
        self.holders
            .iter()
            .flat_map(|(place_id, trail_ids)| {
                trail_ids
                    .iter()
                    .map(move |trail_id| (trail_id.as_str(), place_id.as_str()))
            })
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Trails holding a reference to `place_id`
    pub fn trails_at(&self, place_id: &str) -> BTreeSet<&str> {
        self.holders
            .get(place_id)
            .map(|ids| ids.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Trails sharing at least one place with `trail_id`, derived from the edges
    pub fn crossing_trails(&self, trail_id: &str) -> BTreeSet<&str> {
        let Some(trail) = self.trails.get(trail_id) else {
            return BTreeSet::new();
        };
        trail
            .locations
            .iter()
            .flat_map(|l| self.trails_at(&l.place_id))
            .filter(|id| *id != trail_id)
            .collect()
    }

    /// Every disagreement between the stored copies, sorted
    pub fn violations(&self) -> Vec<GraphViolation> {
        #[cfg(feature = "profiling")]
        profiling::scope!("graph::violations");

        let trail_side: Vec<GraphViolation> = self
            .trails
            .par_iter()
            .flat_map_iter(|(_, trail)| self.trail_violations(trail))
            .collect();
        let place_side: Vec<GraphViolation> = self
            .places
            .par_iter()
            .flat_map_iter(|(_, place)| self.place_violations(place))
            .collect();

        let mut all: Vec<GraphViolation> = trail_side.into_iter().chain(place_side).collect();
        all.sort();
        all
    }

    /// Whether the graph holds only violations the consistency model tolerates
    pub fn is_consistent(&self) -> bool {
        self.violations().iter().all(GraphViolation::is_tolerated)
    }

    fn trail_violations(&self, trail: &Trail) -> Vec<GraphViolation> {
        let mut found = Vec::new();

        if !TrailPlaceAligner::is_aligned(&trail.coordinates, &trail.locations) {
            found.push(GraphViolation::Unaligned {
                trail_id: trail.id.clone(),
            });
        }

        for location in &trail.locations {
            let place_id = &location.place_id;
            match self.places.get(place_id) {
                None => found.push(GraphViolation::MissingPlace {
                    trail_id: trail.id.clone(),
                    place_id: place_id.clone(),
                }),
                Some(place) if !place.crossing_trail_ids.contains(&trail.id) => {
                    found.push(GraphViolation::MissingCrossing {
                        place_id: place_id.clone(),
                        trail_id: trail.id.clone(),
                    })
                }
                Some(_) => {}
            }

            let holders = self.trails_at(place_id);
            for other in holders.iter().filter(|id| **id != trail.id) {
                if !location.has_encountered(other) {
                    found.push(GraphViolation::MissingCrosswayReference {
                        trail_id: trail.id.clone(),
                        place_id: place_id.clone(),
                        other_trail_id: other.to_string(),
                    });
                }
            }
            for other in &location.encountered_trail_ids {
                if !holders.contains(other.as_str()) {
                    found.push(GraphViolation::StaleCrosswayReference {
                        trail_id: trail.id.clone(),
                        place_id: place_id.clone(),
                        other_trail_id: other.clone(),
                    });
                }
            }
        }

        found
    }

    fn place_violations(&self, place: &Place) -> Vec<GraphViolation> {
        let holders = self.trails_at(&place.id);
        place
            .crossing_trail_ids
            .iter()
            .filter(|trail_id| !holders.contains(trail_id.as_str()))
            .map(|trail_id| GraphViolation::DanglingCrossing {
                place_id: place.id.clone(),
                trail_id: trail_id.clone(),
            })
            .collect()
    }
}

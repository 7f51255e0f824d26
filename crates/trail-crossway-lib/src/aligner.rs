//! Ordering of place references along a trail
//!
//! The canonical order of a trail's `locations` is by arc-length position of each
//! reference's projection onto the trail polyline. The sort is stable, so references
//! projecting onto the same position keep their relative input order and re-sorting an
//! already sorted list is a no-op.

use crate::{Coordinate2D, PlaceRef, geometry};

/// Orders [`PlaceRef`]s along a trail polyline
#[derive(Debug, Clone, Copy, Default)]
pub struct TrailPlaceAligner;

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl TrailPlaceAligner {
    /// Sort references ascending by the arc-length position of their nearest point on
    /// `trail_coordinates`
    ///
    /// Trails with fewer than two coordinates carry no usable ordering, so the input is
    /// returned as is.
    pub fn sort_locations_by_trail_coordinates(
        trail_coordinates: &[Coordinate2D],
        refs: Vec<PlaceRef>,
    ) -> Vec<PlaceRef> {
        if trail_coordinates.len() < 2 || refs.len() < 2 {
            return refs;
        }

        let mut keyed: Vec<(f64, PlaceRef)> = refs
            .into_iter()
            .map(|place_ref| {
                let position = geometry::project_onto_polyline(&place_ref.coordinates, trail_coordinates)
                    .map_or(0.0, |projection| projection.position);
                (position, place_ref)
            })
            .collect();

        // `sort_by` is stable: equal positions keep input order
        keyed.sort_by(|a, b| a.0.total_cmp(&b.0));

        keyed.into_iter().map(|(_, place_ref)| place_ref).collect()
    }

    /// Whether `refs` is already in canonical order for the trail
    pub fn is_aligned(trail_coordinates: &[Coordinate2D], refs: &[PlaceRef]) -> bool {
        let positions: Vec<f64> = refs
            .iter()
            .map(|r| {
                geometry::project_onto_polyline(&r.coordinates, trail_coordinates)
                    .map_or(0.0, |projection| projection.position)
            })
            .collect();
        positions.windows(2).all(|w| w[0] <= w[1])
    }
}

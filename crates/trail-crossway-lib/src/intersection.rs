//! Which trails a query line crosses, and where
//!
//! A bounding-rectangle store query narrows the candidates, an exact segment test
//! filters them in parallel, and every surviving trail gets its crossing points
//! enriched with altitude in a single batched lookup.

use crate::{
    AltitudeEnricher, Config, Coordinate2D, CrosswayError, DetailLevel, Rectangle, Result, Trail,
    TrailIntersection, TrailStore, coordinates, geometry,
};
use rayon::prelude::*;
use std::sync::Arc;

/// Intersection queries over a [`TrailStore`]
#[derive(Clone)]
pub struct TrailIntersectionService {
    trails: Arc<dyn TrailStore>,
    enricher: Arc<dyn AltitudeEnricher>,
    config: Config,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl TrailIntersectionService {
    pub fn new(
        trails: Arc<dyn TrailStore>,
        enricher: Arc<dyn AltitudeEnricher>,
        config: Config,
    ) -> Self {
        Self {
            trails,
            enricher,
            config,
        }
    }

    /// Trails in the `skip`/`limit` page of rectangle candidates that `query_line` crosses
    ///
    /// Points are ordered as `query_line` is traversed. A trail overlapping the query
    /// line only collinearly is returned with no points.
    pub fn find_intersections(
        &self,
        query_line: &[Coordinate2D],
        skip: usize,
        limit: usize,
    ) -> Result<Vec<TrailIntersection>> {
        #[cfg(feature = "profiling")]
        profiling::scope!("intersection::find_intersections");

        if query_line.len() < 2 {
            return Err(CrosswayError::InvalidInput(format!(
                "Query line needs at least 2 coordinates, got {}",
                query_line.len()
            )));
        }
        coordinates::validate_all(query_line)?;
        let rectangle = geometry::outer_rectangle(query_line)?;

        let candidates = self.trails.find_within_rectangle(
            &rectangle,
            skip,
            limit,
            self.config.intersection_detail,
        )?;
        let candidate_count = candidates.len();
        let epsilon = self.config.intersection_epsilon;

        let intersections: Vec<TrailIntersection> = candidates
            .into_par_iter()
            .filter(|trail| {
                geometry::segments_intersect_with_tolerance(query_line, &trail.coordinates, epsilon)
            })
            .map(|trail| self.enrich(query_line, trail))
            .collect::<Result<Vec<_>>>()?;

        tracing::debug!(
            candidates = candidate_count,
            crossing = intersections.len(),
            "Intersection query over {:?}",
            rectangle
        );
        Ok(intersections)
    }

    /// Trails overlapping `rectangle`, paged
    pub fn find_trails_within_rectangle(
        &self,
        rectangle: &Rectangle,
        skip: usize,
        limit: usize,
        level: DetailLevel,
    ) -> Result<Vec<Trail>> {
        self.trails.find_within_rectangle(rectangle, skip, limit, level)
    }

    fn enrich(&self, query_line: &[Coordinate2D], trail: Trail) -> Result<TrailIntersection> {
        let points = geometry::intersection_points_with_tolerance(
            query_line,
            &trail.coordinates,
            self.config.intersection_epsilon,
        );
        if points.is_empty() {
            return Ok(TrailIntersection {
                trail,
                points: Vec::new(),
            });
        }

        let lookup: Vec<(f64, f64)> = points.iter().map(|p| (p.latitude, p.longitude)).collect();
        let altitudes = self.enricher.batch_lookup(&lookup).map_err(|e| {
            CrosswayError::EnrichmentUnavailable(format!("Lookup for trail '{}' failed: {e}", trail.id))
        })?;
        if altitudes.len() != points.len() {
            return Err(CrosswayError::EnrichmentUnavailable(format!(
                "Lookup for trail '{}' returned {} altitudes for {} points",
                trail.id,
                altitudes.len(),
                points.len()
            )));
        }

        let points = points
            .into_iter()
            .zip(altitudes)
            .map(|(point, altitude)| point.with_altitude(altitude))
            .collect();
        Ok(TrailIntersection { trail, points })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enrichment::MockAltitudeEnricher;
    use crate::{ConstantAltitudeEnricher, InMemoryStore};

    fn c(lat: f64, lon: f64) -> Coordinate2D {
        Coordinate2D::new(lat, lon)
    }

    fn store_with(trails: Vec<Trail>) -> Arc<InMemoryStore> {
        let store = Arc::new(InMemoryStore::new());
        for trail in trails {
            TrailStore::upsert(store.as_ref(), trail).unwrap();
        }
        store
    }

    #[test]
    fn test_single_crossing_at_origin() {
        let store = store_with(vec![Trail::new("t-1", vec![c(0.0, -1.0), c(0.0, 1.0)])]);
        let service = TrailIntersectionService::new(
            store,
            Arc::new(ConstantAltitudeEnricher::new(350.0)),
            Config::default(),
        );

        let found = service
            .find_intersections(&[c(-1.0, 0.0), c(1.0, 0.0)], 0, 10)
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].trail.id, "t-1");
        assert_eq!(found[0].points.len(), 1);
        let point = found[0].points[0];
        assert!(point.latitude.abs() < 1e-12 && point.longitude.abs() < 1e-12);
        assert_eq!(point.altitude, 350.0);
    }

    #[test]
    fn test_candidates_not_crossing_are_dropped() {
        // Inside the query rectangle but never touching the diagonal
        let store = store_with(vec![
            Trail::new("near", vec![c(0.8, -0.9), c(0.9, -0.8)]),
            Trail::new("crossing", vec![c(1.0, -1.0), c(-1.0, 1.0)]),
        ]);
        let service = TrailIntersectionService::new(
            store,
            Arc::new(ConstantAltitudeEnricher::default()),
            Config::default(),
        );

        let found = service
            .find_intersections(&[c(-1.0, -1.0), c(1.0, 1.0)], 0, 10)
            .unwrap();
        let ids: Vec<&str> = found.iter().map(|i| i.trail.id.as_str()).collect();
        assert_eq!(ids, vec!["crossing"]);
    }

    #[test]
    fn test_one_batched_lookup_per_trail() {
        let store = store_with(vec![Trail::new(
            "zigzag",
            vec![c(-1.0, 0.0), c(1.0, 1.0), c(-1.0, 2.0), c(1.0, 3.0)],
        )]);
        let mut enricher = MockAltitudeEnricher::new();
        enricher
            .expect_batch_lookup()
            .times(1)
            .returning(|points| Ok(points.iter().map(|(_, lon)| *lon * 10.0).collect()));
        let service =
            TrailIntersectionService::new(store, Arc::new(enricher), Config::default());

        let found = service
            .find_intersections(&[c(0.0, -1.0), c(0.0, 4.0)], 0, 10)
            .unwrap();
        let points = &found[0].points;
        assert_eq!(points.len(), 3);
        // Query line order, altitudes attached in order
        assert!(points.windows(2).all(|w| w[0].longitude < w[1].longitude));
        for point in points {
            assert!((point.altitude - point.longitude * 10.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_enrichment_failure_is_reported() {
        let store = store_with(vec![Trail::new("t-1", vec![c(0.0, -1.0), c(0.0, 1.0)])]);
        let mut enricher = MockAltitudeEnricher::new();
        enricher
            .expect_batch_lookup()
            .returning(|_| Err(CrosswayError::Store("elevation service down".to_string())));
        let service =
            TrailIntersectionService::new(store, Arc::new(enricher), Config::default());

        let err = service
            .find_intersections(&[c(-1.0, 0.0), c(1.0, 0.0)], 0, 10)
            .unwrap_err();
        assert!(matches!(err, CrosswayError::EnrichmentUnavailable(_)));
    }

    #[test]
    fn test_short_altitude_response_is_reported() {
        let store = store_with(vec![Trail::new("t-1", vec![c(0.0, -1.0), c(0.0, 1.0)])]);
        let mut enricher = MockAltitudeEnricher::new();
        enricher.expect_batch_lookup().returning(|_| Ok(Vec::new()));
        let service =
            TrailIntersectionService::new(store, Arc::new(enricher), Config::default());

        assert!(matches!(
            service.find_intersections(&[c(-1.0, 0.0), c(1.0, 0.0)], 0, 10),
            Err(CrosswayError::EnrichmentUnavailable(_))
        ));
    }

    #[test]
    fn test_query_line_validation() {
        let service = TrailIntersectionService::new(
            store_with(Vec::new()),
            Arc::new(ConstantAltitudeEnricher::default()),
            Config::default(),
        );
        assert!(matches!(
            service.find_intersections(&[], 0, 10),
            Err(CrosswayError::InvalidInput(_))
        ));
        assert!(matches!(
            service.find_intersections(&[c(0.0, 0.0)], 0, 10),
            Err(CrosswayError::InvalidInput(_))
        ));
        assert!(service
            .find_intersections(&[c(0.0, 0.0), c(1.0, 1.0)], 0, 10)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_rectangle_passthrough() {
        let store = store_with(vec![
            Trail::new("in", vec![c(0.0, 0.0), c(0.5, 0.5)]),
            Trail::new("out", vec![c(10.0, 10.0), c(11.0, 11.0)]),
        ]);
        let service = TrailIntersectionService::new(
            store,
            Arc::new(ConstantAltitudeEnricher::default()),
            Config::default(),
        );
        let rect = Rectangle::from_corners(c(-1.0, -1.0), c(1.0, 1.0));
        let trails = service
            .find_trails_within_rectangle(&rect, 0, 10, DetailLevel::Low)
            .unwrap();
        assert_eq!(trails.len(), 1);
        assert_eq!(trails[0].id, "in");
    }
}

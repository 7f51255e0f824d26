//! Performance benchmarks for trail-crossway-lib
//!
//! Run with: cargo bench --package trail-crossway-lib

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::sync::Arc;
use trail_crossway_lib::{
    ConstantAltitudeEnricher, Config, Coordinate2D, CrossReferencePropagator, InMemoryStore,
    Place, PlaceRef, PlaceStore, Trail, TrailIntersectionService, TrailPlaceAligner, TrailStore,
    geometry,
};

/// Generate a wiggly trail with the specified number of points
fn generate_trail(id: &str, num_points: usize, base_lat: f64, base_lon: f64) -> Trail {
    let coordinates = (0..num_points)
        .map(|i| {
            let t = i as f64 / num_points as f64;
            let lat = base_lat + t * 0.1 + (t * 50.0).sin() * 0.001;
            let lon = base_lon + t * 0.1 + (t * 30.0).cos() * 0.001;
            Coordinate2D::new(lat, lon)
        })
        .collect();
    Trail::new(id, coordinates)
}

/// Generate trails spread across an area
fn generate_store(num_trails: usize, points_per_trail: usize) -> Arc<InMemoryStore> {
    let store = Arc::new(InMemoryStore::new());
    for i in 0..num_trails {
        let lat_offset = (i % 10) as f64 * 0.01;
        let lon_offset = (i / 10) as f64 * 0.01;
        let trail = generate_trail(
            &format!("trail-{i:04}"),
            points_per_trail,
            45.0 + lat_offset,
            7.0 + lon_offset,
        );
        TrailStore::upsert(store.as_ref(), trail).unwrap();
    }
    store
}

// ============================================================================
// Core Benchmarks
// ============================================================================

fn bench_geometry(c: &mut Criterion) {
    let mut group = c.benchmark_group("geometry");

    let trail = generate_trail("t", 10_000, 45.0, 7.0);
    let query = [Coordinate2D::new(45.0, 7.1), Coordinate2D::new(45.1, 7.0)];

    group.throughput(Throughput::Elements(trail.coordinates.len() as u64));
    group.bench_function("segments_intersect_10k", |b| {
        b.iter(|| geometry::segments_intersect(&query, &trail.coordinates));
    });
    group.bench_function("intersection_points_10k", |b| {
        b.iter(|| geometry::intersection_points(&query, &trail.coordinates));
    });

    group.finish();
}

fn bench_alignment(c: &mut Criterion) {
    let mut group = c.benchmark_group("alignment");

    let trail = generate_trail("t", 5_000, 45.0, 7.0);
    for num_refs in [10, 100] {
        let refs: Vec<PlaceRef> = (0..num_refs)
            .rev()
            .map(|i| {
                let point = trail.coordinates[i * trail.coordinates.len() / num_refs];
                PlaceRef::new(format!("p-{i}"), point)
            })
            .collect();

        group.bench_with_input(BenchmarkId::new("sort", num_refs), &refs, |b, refs| {
            b.iter(|| {
                TrailPlaceAligner::sort_locations_by_trail_coordinates(
                    &trail.coordinates,
                    refs.clone(),
                )
            });
        });
    }

    group.finish();
}

fn bench_intersections(c: &mut Criterion) {
    let mut group = c.benchmark_group("intersections");
    group.sample_size(20);

    let store = generate_store(100, 1_000);
    let service = TrailIntersectionService::new(
        store,
        Arc::new(ConstantAltitudeEnricher::new(0.0)),
        Config::default(),
    );
    let query = [Coordinate2D::new(44.9, 7.2), Coordinate2D::new(45.3, 6.9)];

    group.bench_function("100_trails_1k_each", |b| {
        b.iter(|| service.find_intersections(&query, 0, 100).unwrap());
    });

    group.finish();
}

fn bench_propagation(c: &mut Criterion) {
    let mut group = c.benchmark_group("propagation");
    group.sample_size(20);

    group.bench_function("link_50_trails_to_one_place", |b| {
        b.iter(|| {
            let store = generate_store(50, 100);
            PlaceStore::upsert(store.as_ref(), Place::new("hub", "Hub")).unwrap();
            let propagator = CrossReferencePropagator::new(
                store.clone(),
                store.clone(),
                store.clone(),
                Config::default(),
            );
            for i in 0..50 {
                propagator
                    .link_trail_to_place(
                        &format!("trail-{i:04}"),
                        PlaceRef::new("hub", Coordinate2D::new(45.05, 7.05)),
                    )
                    .unwrap();
            }
        });
    });

    group.finish();
}

// ============================================================================
// Criterion Configuration
// ============================================================================

criterion_group!(
    benches,
    bench_geometry,
    bench_alignment,
    bench_intersections,
    bench_propagation,
);

criterion_main!(benches);

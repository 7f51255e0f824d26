//! Command dispatch against snapshot files

use clap::Parser;
use std::path::PathBuf;
use trail_crossway_cli::{Settings, run};
use trail_crossway_lib::{
    Coordinate2D, InMemoryStore, Place, PlaceStore, StoreSnapshot, Trail, TrailStore,
};

fn c(lat: f64, lon: f64) -> Coordinate2D {
    Coordinate2D::new(lat, lon)
}

/// Snapshot file removed on drop
struct TempSnapshot(PathBuf);

impl TempSnapshot {
    fn new(name: &str) -> Self {
        let path = std::env::temp_dir().join(format!(
            "trail-crossway-cli-{name}-{}.json",
            std::process::id()
        ));
        let store = InMemoryStore::new();
        TrailStore::upsert(&store, Trail::new("a", vec![c(0.0, 0.0), c(0.0, 10.0)])).unwrap();
        TrailStore::upsert(&store, Trail::new("b", vec![c(-5.0, 5.0), c(5.0, 5.0)])).unwrap();
        PlaceStore::upsert(&store, Place::new("x", "Col")).unwrap();
        store.save_json(&path).unwrap();
        Self(path)
    }

    fn path(&self) -> &str {
        self.0.to_str().unwrap()
    }

    fn load(&self) -> StoreSnapshot {
        InMemoryStore::load_json(&self.0).unwrap().snapshot()
    }
}

impl Drop for TempSnapshot {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.0);
    }
}

fn settings(args: &[&str]) -> Settings {
    Settings::try_parse_from(std::iter::once("trail-crossway").chain(args.iter().copied()))
        .unwrap()
}

#[test]
fn test_link_with_save_persists_crossways() {
    let snapshot = TempSnapshot::new("link");
    for trail in ["a", "b"] {
        let output = run(&settings(&[
            "--store",
            snapshot.path(),
            "--save",
            "link",
            "--trail",
            trail,
            "--place",
            "x",
            "--at",
            "0,5",
        ]))
        .unwrap();
        assert_eq!(output.command, "link");
    }

    let saved = snapshot.load();
    let place = saved.places.iter().find(|p| p.id == "x").unwrap();
    assert_eq!(place.crossing_trail_ids.len(), 2);
    let a = saved.trails.iter().find(|t| t.id == "a").unwrap();
    assert!(a.location_for("x").unwrap().has_encountered("b"));

    let check = run(&settings(&["--store", snapshot.path(), "check"])).unwrap();
    assert!(check.success);
    assert_eq!(check.result["violations"].as_array().unwrap().len(), 0);
}

#[test]
fn test_without_save_the_snapshot_is_untouched() {
    let snapshot = TempSnapshot::new("nosave");
    let before = snapshot.load();
    run(&settings(&[
        "--store",
        snapshot.path(),
        "link",
        "--trail",
        "a",
        "--place",
        "x",
        "--at",
        "0,5",
    ]))
    .unwrap();
    assert_eq!(snapshot.load(), before);
}

#[test]
fn test_intersect_reports_crossing_points() {
    let snapshot = TempSnapshot::new("intersect");
    let output = run(&settings(&[
        "--store",
        snapshot.path(),
        "intersect",
        "--line",
        "-1,2;1,2",
        "--altitude",
        "800",
    ]))
    .unwrap();

    let found = output.result.as_array().unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0]["trail"]["id"], "a");
    assert_eq!(found[0]["points"][0]["altitude"], 800.0);
}

#[test]
fn test_journal_is_included_on_request() {
    let snapshot = TempSnapshot::new("journal");
    let output = run(&settings(&[
        "--store",
        snapshot.path(),
        "--journal",
        "link",
        "--trail",
        "a",
        "--place",
        "x",
        "--at",
        "0,5",
    ]))
    .unwrap();
    assert!(!output.journal.unwrap().is_empty());
}

#[test]
fn test_errors_carry_context() {
    let snapshot = TempSnapshot::new("errors");
    let err = run(&settings(&[
        "--store",
        snapshot.path(),
        "link",
        "--trail",
        "ghost",
        "--place",
        "x",
        "--at",
        "0,5",
    ]))
    .unwrap_err();
    assert!(format!("{err:#}").contains("ghost"));

    let err = run(&settings(&["--store", "/nonexistent/snapshot.json", "check"])).unwrap_err();
    assert!(err.to_string().contains("Loading store snapshot"));
}

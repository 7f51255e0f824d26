//! Command dispatch over a snapshot-backed in-memory store

use crate::settings::{Command, Settings};
use anyhow::Context;
use serde::Serialize;
use std::sync::Arc;
use trail_crossway_lib::{
    ConstantAltitudeEnricher, CrossReferencePropagator, CrosswayGraph, InMemoryJournal,
    InMemoryStore, JournalEntry, PlaceRef, Rectangle, Trail, TrailIntersectionService,
};

/// What a command prints on stdout
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandOutput {
    pub command: &'static str,
    pub result: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub journal: Option<Vec<JournalEntry>>,
    /// False when the command ran but found the store in an unacceptable state
    #[serde(skip)]
    pub success: bool,
}

/// Run the selected command, persisting the store afterwards when `--save` is set
pub fn run(settings: &Settings) -> anyhow::Result<CommandOutput> {
    let config = settings.engine_config()?;
    let store = Arc::new(match &settings.store {
        Some(path) => InMemoryStore::load_json(path)
            .with_context(|| format!("Loading store snapshot {}", path.display()))?,
        None => InMemoryStore::new(),
    });
    let journal = Arc::new(InMemoryJournal::new());
    let propagator =
        CrossReferencePropagator::new(store.clone(), store.clone(), store.clone(), config.clone())
            .with_journal(journal.clone());

    let mut success = true;
    let (command, result) = match &settings.command {
        Command::Intersect {
            line,
            skip,
            limit,
            altitude,
        } => {
            let service = TrailIntersectionService::new(
                store.clone(),
                Arc::new(ConstantAltitudeEnricher::new(*altitude)),
                config.clone(),
            );
            let found = service.find_intersections(&line.0, *skip, *limit)?;
            ("intersect", serde_json::to_value(found)?)
        }
        Command::Within {
            rect,
            skip,
            limit,
            detail,
        } => {
            let [a, b] = rect.0.as_slice() else {
                anyhow::bail!("A rectangle needs exactly 2 corners, got {}", rect.0.len());
            };
            let service = TrailIntersectionService::new(
                store.clone(),
                Arc::new(ConstantAltitudeEnricher::default()),
                config.clone(),
            );
            let trails = service.find_trails_within_rectangle(
                &Rectangle::from_corners(*a, *b),
                *skip,
                *limit,
                (*detail).into(),
            )?;
            ("within", serde_json::to_value(trails)?)
        }
        Command::Link { trail, place, at } => {
            let linked = propagator
                .link_trail_to_place(trail, PlaceRef::new(place.clone(), *at))
                .with_context(|| format!("Linking trail '{trail}' to place '{place}'"))?;
            ("link", serde_json::to_value(linked)?)
        }
        Command::Unlink { trail, place, at } => {
            let unlinked = propagator
                .unlink_place_from_trail(trail, &PlaceRef::new(place.clone(), *at))
                .with_context(|| format!("Unlinking place '{place}' from trail '{trail}'"))?;
            ("unlink", serde_json::to_value(unlinked)?)
        }
        Command::Delete { trail } => {
            let deleted = propagator
                .delete_trail(trail)
                .with_context(|| format!("Deleting trail '{trail}'"))?;
            ("delete", serde_json::to_value(deleted)?)
        }
        Command::Save { file } => {
            let reader = std::io::BufReader::new(
                std::fs::File::open(file)
                    .with_context(|| format!("Opening trail {}", file.display()))?,
            );
            let trail: Trail = serde_json::from_reader(reader)
                .with_context(|| format!("Parsing trail {}", file.display()))?;
            let saved = propagator.save_trail(trail)?;
            ("save", serde_json::to_value(saved)?)
        }
        Command::RemovePlace { place } => {
            let touched = propagator.remove_place_from_all_trails(place)?;
            (
                "remove-place",
                serde_json::json!({ "placeId": place, "trailsTouched": touched }),
            )
        }
        Command::Reconcile { place } => {
            let report = propagator.reconcile_place(place)?;
            ("reconcile", serde_json::to_value(report)?)
        }
        Command::Check => {
            let graph = CrosswayGraph::load(store.as_ref(), store.as_ref(), config.page_size)?;
            let violations = graph.violations();
            success = violations.iter().all(|v| v.is_tolerated());
            (
                "check",
                serde_json::json!({
                    "consistent": success,
                    "edges": graph.edges().len(),
                    "violations": violations,
                }),
            )
        }
    };

    if let (true, Some(path)) = (settings.save, &settings.store) {
        store
            .save_json(path)
            .with_context(|| format!("Saving store snapshot {}", path.display()))?;
        tracing::info!("Saved store snapshot to {}", path.display());
    }

    Ok(CommandOutput {
        command,
        result,
        journal: settings.journal.then(|| journal.entries()),
        success,
    })
}

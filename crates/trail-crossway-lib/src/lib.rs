//! Trail Crossway Library - Consistency engine for trails crossing shared places
//!
//! Trails and places form a bipartite graph: a trail attaches to a place through a
//! [`PlaceRef`] in its `locations`, and a place records every trail crossing it. Trails
//! that share a place learn about each other through crossway references
//! (`encountered_trail_ids`). This library keeps both sides of that graph in step while
//! running against a store that offers no cross-document transactions.
//!
//! # Architecture
//!
//! - **[`geometry`]**: Pure polyline routines (bounding rectangles, segment intersection,
//!   projection)
//! - **[`TrailPlaceAligner`]**: Orders place references along a trail
//! - **[`CrossReferencePropagator`]**: Link / unlink / delete protocol and reconciliation
//! - **[`TrailIntersectionService`]**: Which trails cross a query line, and where
//! - **[`store`]**: Store traits plus the [`InMemoryStore`] reference implementation
//! - **[`CrosswayGraph`]**: Read-only adjacency view used to check graph invariants
//!
//! # Consistency Model
//!
//! Multi-entity operations are sequences of independent store writes executed in a
//! fixed order. Nothing is rolled back on failure; each completed step is recorded in an
//! [`OperationJournal`] and [`CrossReferencePropagator::reconcile_place`] repairs a place
//! after the fact.

pub mod aligner;
mod config;
pub mod coordinates;
pub mod enrichment;
pub mod geometry;
mod graph;
pub mod intersection;
pub mod journal;
mod model;
pub mod propagator;
pub mod store;

// Public API exports
pub use aligner::TrailPlaceAligner;
pub use config::Config;
pub use coordinates::{Coordinate2D, CoordinateWithAltitude};
pub use enrichment::{AltitudeEnricher, ConstantAltitudeEnricher};
pub use geometry::Rectangle;
pub use graph::{CrosswayGraph, GraphViolation};
pub use intersection::TrailIntersectionService;
pub use journal::{InMemoryJournal, JournalEntry, NoopJournal, OperationJournal};
pub use model::{
    DetailLevel, Place, PlaceRef, PlaceRefPreview, Trail, TrailIntersection, TrailPreview,
};
pub use propagator::{CrossReferencePropagator, ReconcileReport};
pub use store::{InMemoryStore, PlaceStore, TrailRecordStore, TrailStore};
#[cfg(feature = "serde")]
pub use store::StoreSnapshot;

/// Kind of entity an error refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Trail,
    Place,
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntityKind::Trail => f.write_str("trail"),
            EntityKind::Place => f.write_str("place"),
        }
    }
}

/// Error types for the crossway engine
#[derive(Debug, thiserror::Error)]
pub enum CrosswayError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("No {kind} found with id '{id}'")]
    NotFound { kind: EntityKind, id: String },

    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    #[error("Altitude enrichment unavailable: {0}")]
    EnrichmentUnavailable(String),

    #[error("Version conflict on {kind} '{id}': expected {expected}, found {actual}")]
    VersionConflict {
        kind: EntityKind,
        id: String,
        expected: u64,
        actual: u64,
    },

    #[error("Store error: {0}")]
    Store(String),

    #[cfg(feature = "serde")]
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CrosswayError {
    pub(crate) fn trail_not_found(id: &str) -> Self {
        CrosswayError::NotFound {
            kind: EntityKind::Trail,
            id: id.to_string(),
        }
    }

    pub(crate) fn place_not_found(id: &str) -> Self {
        CrosswayError::NotFound {
            kind: EntityKind::Place,
            id: id.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CrosswayError>;

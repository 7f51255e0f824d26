//! Link, unlink and delete protocol for the trail–place graph
//!
//! Every operation is a fixed sequence of single-document store writes. Trail-side
//! writes come before place-side writes on link, and the trail delete comes before place
//! cleanup on delete, so a crash midway leaves a place under-referenced rather than
//! pointing at a trail that does not exist.
//!
//! Trail writes are compare-and-swap on the trail `version`. A conflicting writer makes
//! the step reload the trail, re-apply its edit and try again, up to
//! [`Config::max_conflict_retries`] times.
//!
//! Unlink and delete do not remove the affected trail from other trails'
//! `encountered_trail_ids`. Those stale references are tolerated by readers and cleared
//! by [`CrossReferencePropagator::reconcile_place`].

use crate::{
    Config, Coordinate2D, CrosswayError, DetailLevel, EntityKind, OperationJournal, PlaceRef,
    PlaceStore, Result, Trail, TrailPlaceAligner, TrailPreview, TrailRecordStore, TrailStore,
    journal::{JournalEntry, NoopJournal, Operation, Outcome, Step},
    store::collect_pages,
};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// What [`CrossReferencePropagator::reconcile_place`] repaired
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct ReconcileReport {
    pub place_id: String,
    /// Trails holding a reference to the place
    pub holders: Vec<String>,
    /// Crossing ids dropped because the trail holds no reference to the place
    pub crossing_ids_removed: Vec<String>,
    /// Holders that were missing from the crossing set
    pub crossing_ids_added: Vec<String>,
    /// Crossway references added across all holders
    pub references_added: usize,
    /// Stale crossway references purged across all holders
    pub references_removed: usize,
    /// Holders whose reference to the place was rewritten
    pub trails_rewritten: Vec<String>,
}

impl ReconcileReport {
    /// Whether the place needed no repair
    pub fn is_clean(&self) -> bool {
        self.crossing_ids_removed.is_empty()
            && self.crossing_ids_added.is_empty()
            && self.trails_rewritten.is_empty()
    }
}

/// Result of a versioned edit of a single trail
enum TrailEdit {
    Written(Trail),
    Unchanged(Trail),
    Missing,
}

/// Orchestrates multi-document updates of trails and places
#[derive(Clone)]
pub struct CrossReferencePropagator {
    trails: Arc<dyn TrailStore>,
    places: Arc<dyn PlaceStore>,
    records: Arc<dyn TrailRecordStore>,
    journal: Arc<dyn OperationJournal>,
    config: Config,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl CrossReferencePropagator {
    pub fn new(
        trails: Arc<dyn TrailStore>,
        places: Arc<dyn PlaceStore>,
        records: Arc<dyn TrailRecordStore>,
        config: Config,
    ) -> Self {
        Self {
            trails,
            places,
            records,
            journal: Arc::new(NoopJournal),
            config,
        }
    }

    /// Record completed steps into `journal`
    pub fn with_journal(mut self, journal: Arc<dyn OperationJournal>) -> Self {
        self.journal = journal;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Attach `place_ref` to a trail and propagate the new crossway to every trail
    /// already crossing the place
    ///
    /// Returns the linked trail in its final state.
    pub fn link_trail_to_place(&self, trail_id: &str, place_ref: PlaceRef) -> Result<Trail> {
        #[cfg(feature = "profiling")]
        profiling::scope!("propagator::link_trail_to_place");

        let place_ref = self.checked_place_ref(trail_id, place_ref)?;
        self.places
            .get_by_id(&place_ref.place_id)?
            .ok_or_else(|| CrosswayError::place_not_found(&place_ref.place_id))?;

        let linked = match self.edit_trail(trail_id, |trail| merge_place_ref(trail, &place_ref))? {
            TrailEdit::Missing => return Err(CrosswayError::trail_not_found(trail_id)),
            TrailEdit::Written(trail) => {
                self.record(Operation::Link, trail_id, Step::TrailSide, Outcome::Completed);
                trail
            }
            TrailEdit::Unchanged(trail) => {
                self.record(Operation::Link, trail_id, Step::TrailSide, Outcome::Unchanged);
                trail
            }
        };
        tracing::debug!(trail_id, place_id = %place_ref.place_id, "Trail side linked");

        let linked = self.connect(Operation::Link, trail_id, &place_ref)?.unwrap_or(linked);

        tracing::info!(
            trail_id,
            place_id = %place_ref.place_id,
            crossways = linked
                .location_for(&place_ref.place_id)
                .map_or(0, |l| l.encountered_trail_ids.len()),
            "Linked trail to place"
        );
        Ok(linked)
    }

    /// Detach a place from a trail, trail side first
    ///
    /// Other trails keep listing `trail_id` as encountered at the place.
    pub fn unlink_place_from_trail(&self, trail_id: &str, place_ref: &PlaceRef) -> Result<Trail> {
        let place_id = place_ref.place_id.as_str();
        let mut removed_at = place_ref.coordinates;

        let trail = match self.edit_trail(trail_id, |trail| {
            match trail.locations.iter().position(|l| l.place_id == place_id) {
                Some(index) => {
                    removed_at = trail.locations.remove(index).coordinates;
                    true
                }
                None => false,
            }
        })? {
            TrailEdit::Missing => return Err(CrosswayError::trail_not_found(trail_id)),
            TrailEdit::Written(trail) => {
                self.record(Operation::Unlink, trail_id, Step::TrailSide, Outcome::Completed);
                trail
            }
            TrailEdit::Unchanged(trail) => {
                self.record(Operation::Unlink, trail_id, Step::TrailSide, Outcome::Unchanged);
                trail
            }
        };

        self.detach_place(Operation::Unlink, trail_id, place_id, removed_at)?;
        tracing::info!(trail_id, place_id, "Unlinked place from trail");
        Ok(trail)
    }

    /// Delete a trail, then clean up the places it crossed and the records it owned
    ///
    /// Returns the trail as it was before deletion.
    pub fn delete_trail(&self, trail_id: &str) -> Result<Trail> {
        let trail = self
            .trails
            .delete(trail_id)?
            .ok_or_else(|| CrosswayError::trail_not_found(trail_id))?;
        self.record(Operation::Delete, trail_id, Step::TrailSide, Outcome::Completed);

        for location in &trail.locations {
            self.detach_place(
                Operation::Delete,
                trail_id,
                &location.place_id,
                location.coordinates,
            )?;
        }

        self.purge_records(trail_id);
        tracing::info!(
            trail_id,
            places = trail.locations.len(),
            "Deleted trail"
        );
        Ok(trail)
    }

    /// Insert or replace a trail and bring places and crossway references in line with
    /// its `locations`
    ///
    /// Places the previous version referenced and the new one does not are detached.
    pub fn save_trail(&self, mut trail: Trail) -> Result<Trail> {
        #[cfg(feature = "profiling")]
        profiling::scope!("propagator::save_trail");

        trail.validate()?;
        for location in &mut trail.locations {
            self.places
                .get_by_id(&location.place_id)?
                .ok_or_else(|| CrosswayError::place_not_found(&location.place_id))?;
            location.encountered_trail_ids.remove(&trail.id);
        }

        let previous = self.trails.get_by_id(&trail.id, DetailLevel::Full)?;
        trail.locations = TrailPlaceAligner::sort_locations_by_trail_coordinates(
            &trail.coordinates,
            std::mem::take(&mut trail.locations),
        );

        let mut saved = self.trails.upsert(trail)?;
        let trail_id = saved.id.clone();
        self.record(Operation::Save, &trail_id, Step::TrailSide, Outcome::Completed);

        if let Some(previous) = previous {
            for dropped in previous
                .locations
                .iter()
                .filter(|l| saved.location_for(&l.place_id).is_none())
            {
                self.detach_place(
                    Operation::Save,
                    &trail_id,
                    &dropped.place_id,
                    dropped.coordinates,
                )?;
            }
        }

        for place_ref in saved.locations.clone() {
            if let Some(updated) = self.connect(Operation::Save, &trail_id, &place_ref)? {
                saved = updated;
            }
        }

        tracing::info!(
            trail_id = %trail_id,
            version = saved.version,
            places = saved.locations.len(),
            length_m = saved.length_meters(),
            "Saved trail"
        );
        Ok(saved)
    }

    /// Strip every trail's reference to `place_id`
    ///
    /// The place, if it still exists, stops listing those trails. Returns how many trails
    /// were rewritten.
    pub fn remove_place_from_all_trails(&self, place_id: &str) -> Result<usize> {
        let holders = collect_pages(self.config.page_size, |skip, limit| {
            self.trails
                .find_by_place_id(place_id, skip, limit, DetailLevel::Low)
        })?;

        let mut touched = 0;
        for holder in &holders {
            let mut removed_at = None;
            let edit = self.edit_trail(&holder.id, |trail| {
                match trail.locations.iter().position(|l| l.place_id == place_id) {
                    Some(index) => {
                        removed_at = Some(trail.locations.remove(index).coordinates);
                        true
                    }
                    None => false,
                }
            })?;
            if !matches!(edit, TrailEdit::Written(_)) {
                continue;
            }
            touched += 1;
            self.record(
                Operation::RemovePlace,
                place_id,
                Step::Repair {
                    trail_id: holder.id.clone(),
                },
                Outcome::Completed,
            );
            if let Some(coordinates) = removed_at {
                self.detach_place(Operation::RemovePlace, &holder.id, place_id, coordinates)?;
            }
        }

        tracing::info!(place_id, trails = touched, "Removed place from trails");
        Ok(touched)
    }

    /// Rebuild both copies of a place's edges from the trails holding it
    ///
    /// The place's crossing set becomes exactly the holders, and every holder lists every
    /// other holder as encountered at the place. Running it twice changes nothing the
    /// second time. The place write is compare-and-swap on its `version`, so a link racing
    /// with the rebuild makes it re-read and start over.
    pub fn reconcile_place(&self, place_id: &str) -> Result<ReconcileReport> {
        #[cfg(feature = "profiling")]
        profiling::scope!("propagator::reconcile_place");

        let mut attempt = 0;
        let (place, holder_ids) = loop {
            let place = self
                .places
                .get_by_id(place_id)?
                .ok_or_else(|| CrosswayError::place_not_found(place_id))?;
            let holders = collect_pages(self.config.page_size, |skip, limit| {
                self.trails
                    .find_by_place_id(place_id, skip, limit, DetailLevel::Low)
            })?;
            let attachments: BTreeMap<String, Coordinate2D> = holders
                .iter()
                .filter_map(|t| t.location_for(place_id).map(|l| (t.id.clone(), l.coordinates)))
                .collect();
            let holder_ids: BTreeSet<String> = attachments.keys().cloned().collect();

            if place.crossing_trail_ids == holder_ids && place.attachments == attachments {
                break (place, holder_ids);
            }
            match self
                .places
                .update_crossings(place_id, attachments, Some(place.version))
            {
                Ok(_) => {
                    self.record(
                        Operation::Reconcile,
                        place_id,
                        Step::PlaceSide {
                            place_id: place_id.to_string(),
                        },
                        Outcome::Completed,
                    );
                    break (place, holder_ids);
                }
                Err(CrosswayError::VersionConflict {
                    expected, actual, ..
                }) if attempt < self.config.max_conflict_retries => {
                    attempt += 1;
                    tracing::debug!(place_id, expected, actual, attempt, "Version conflict, retrying");
                }
                Err(e) => return Err(e),
            }
        };

        let mut report = ReconcileReport {
            place_id: place_id.to_string(),
            holders: holder_ids.iter().cloned().collect(),
            crossing_ids_removed: place
                .crossing_trail_ids
                .difference(&holder_ids)
                .cloned()
                .collect(),
            crossing_ids_added: holder_ids
                .difference(&place.crossing_trail_ids)
                .cloned()
                .collect(),
            ..Default::default()
        };

        for holder_id in &holder_ids {
            let expected: BTreeSet<String> = holder_ids
                .iter()
                .filter(|id| *id != holder_id)
                .cloned()
                .collect();
            let mut delta = (0, 0);
            let edit = self.edit_trail(holder_id, |trail| {
                let Some(location) = trail.location_for_mut(place_id) else {
                    return false;
                };
                delta = (
                    expected.difference(&location.encountered_trail_ids).count(),
                    location.encountered_trail_ids.difference(&expected).count(),
                );
                if delta == (0, 0) {
                    return false;
                }
                location.encountered_trail_ids = expected.clone();
                true
            })?;

            let outcome = match edit {
                TrailEdit::Written(_) => {
                    report.references_added += delta.0;
                    report.references_removed += delta.1;
                    report.trails_rewritten.push(holder_id.clone());
                    Outcome::Completed
                }
                TrailEdit::Unchanged(_) => Outcome::Unchanged,
                TrailEdit::Missing => {
                    tracing::warn!(place_id, trail_id = %holder_id, "Holder vanished during reconciliation");
                    Outcome::SkippedMissingTrail
                }
            };
            self.record(
                Operation::Reconcile,
                place_id,
                Step::Repair {
                    trail_id: holder_id.clone(),
                },
                outcome,
            );
        }

        tracing::info!(
            place_id,
            holders = report.holders.len(),
            crossing_removed = report.crossing_ids_removed.len(),
            crossing_added = report.crossing_ids_added.len(),
            references_added = report.references_added,
            references_removed = report.references_removed,
            "Reconciled place"
        );
        Ok(report)
    }

    /// Place side, existing crossways and propagation for one reference of `trail_id`
    ///
    /// Returns the linked trail if the existing-crossway step rewrote it.
    fn connect(
        &self,
        operation: Operation,
        trail_id: &str,
        place_ref: &PlaceRef,
    ) -> Result<Option<Trail>> {
        let place_id = place_ref.place_id.as_str();

        let place = self
            .places
            .link_trail(place_id, trail_id, place_ref.coordinates)?;
        self.record(
            operation,
            trail_id,
            Step::PlaceSide {
                place_id: place_id.to_string(),
            },
            Outcome::Completed,
        );

        // Crossing ids whose trail is gone are never written as crossway references
        let mut others: BTreeMap<String, TrailPreview> = BTreeMap::new();
        for other in place.crossing_trail_ids.iter().filter(|id| *id != trail_id) {
            match self.trails.get_preview_by_id(other)? {
                Some(preview) => {
                    others.insert(other.clone(), preview);
                }
                None => {
                    tracing::warn!(
                        place_id,
                        trail_id = %other,
                        "Place lists a trail that no longer exists, skipping"
                    );
                    self.record(
                        operation,
                        trail_id,
                        Step::Propagation {
                            trail_id: other.clone(),
                        },
                        Outcome::SkippedMissingTrail,
                    );
                }
            }
        }

        let linked = match self.edit_trail(trail_id, |trail| {
            let Some(location) = trail.location_for_mut(place_id) else {
                return false;
            };
            let before = location.encountered_trail_ids.len();
            location
                .encountered_trail_ids
                .extend(others.keys().cloned());
            location.encountered_trail_ids.len() != before
        })? {
            TrailEdit::Missing => {
                return Err(CrosswayError::InvariantViolation(format!(
                    "Trail '{trail_id}' disappeared while linking place '{place_id}'"
                )));
            }
            TrailEdit::Written(trail) => {
                self.record(
                    operation,
                    trail_id,
                    Step::ExistingCrossways {
                        place_id: place_id.to_string(),
                    },
                    Outcome::Completed,
                );
                Some(trail)
            }
            TrailEdit::Unchanged(_) => None,
        };
        tracing::debug!(trail_id, place_id, others = others.len(), "Existing crossways recorded");

        for (other, preview) in &others {
            self.propagate_to(operation, trail_id, place_ref, other, preview)?;
        }

        Ok(linked)
    }

    /// Make `other` list `trail_id` as encountered at the place of `place_ref`
    ///
    /// Membership is checked at this place only; listing `trail_id` at another shared
    /// place does not count.
    fn propagate_to(
        &self,
        operation: Operation,
        trail_id: &str,
        place_ref: &PlaceRef,
        other: &str,
        preview: &TrailPreview,
    ) -> Result<()> {
        let place_id = place_ref.place_id.as_str();
        let step = Step::Propagation {
            trail_id: other.to_string(),
        };

        if preview.has_encountered_at(place_id, trail_id) {
            self.record(operation, trail_id, step, Outcome::Unchanged);
            return Ok(());
        }

        let mut seed = place_ref.encountered_trail_ids.clone();
        seed.insert(trail_id.to_string());
        seed.remove(other);

        let edit = self.edit_trail(other, |trail| match trail.location_for_mut(place_id) {
            Some(location) => location.encountered_trail_ids.insert(trail_id.to_string()),
            None => {
                trail.locations.push(PlaceRef {
                    place_id: place_id.to_string(),
                    coordinates: place_ref.coordinates,
                    encountered_trail_ids: seed.clone(),
                });
                true
            }
        })?;

        let outcome = match edit {
            TrailEdit::Missing => {
                return Err(CrosswayError::InvariantViolation(format!(
                    "Trail '{other}' crossing place '{place_id}' could not be loaded"
                )));
            }
            TrailEdit::Written(_) => Outcome::Completed,
            TrailEdit::Unchanged(_) => Outcome::Unchanged,
        };
        tracing::debug!(trail_id, other, place_id, "Propagated crossway");
        self.record(operation, trail_id, step, outcome);
        Ok(())
    }

    /// Place-side removal of `trail_id`, skipping places that no longer exist
    fn detach_place(
        &self,
        operation: Operation,
        trail_id: &str,
        place_id: &str,
        coordinates: Coordinate2D,
    ) -> Result<()> {
        let step = Step::PlaceSide {
            place_id: place_id.to_string(),
        };
        match self.places.remove_trail(place_id, trail_id, coordinates) {
            Ok(_) => {
                self.record(operation, trail_id, step, Outcome::Completed);
                Ok(())
            }
            Err(CrosswayError::NotFound {
                kind: EntityKind::Place,
                ..
            }) => {
                tracing::warn!(trail_id, place_id, "Referenced place no longer exists, skipping");
                self.record(operation, trail_id, step, Outcome::SkippedMissingPlace);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Purge records owned by a deleted trail; failures are logged, never returned
    fn purge_records(&self, trail_id: &str) {
        let maintenance = self.records.delete_maintenance_by_trail_id(trail_id);
        let notifications = self
            .records
            .delete_accessibility_notifications_by_trail_id(trail_id);

        let outcome = match (maintenance, notifications) {
            (Ok(maintenance), Ok(notifications)) => {
                tracing::info!(
                    trail_id,
                    maintenance,
                    notifications,
                    "Purged trail records"
                );
                Outcome::Completed
            }
            (maintenance, notifications) => {
                let reasons: Vec<String> = [maintenance.err(), notifications.err()]
                    .into_iter()
                    .flatten()
                    .map(|e| e.to_string())
                    .collect();
                tracing::warn!(trail_id, errors = ?reasons, "Failed to purge trail records");
                Outcome::Failed(reasons.join("; "))
            }
        };
        self.record(Operation::Delete, trail_id, Step::RecordPurge, outcome);
    }

    /// Load, edit, realign and write a trail's `locations` with compare-and-swap
    ///
    /// `edit` returns whether it changed anything; it is re-applied to a fresh read after
    /// every version conflict.
    fn edit_trail<F>(&self, trail_id: &str, mut edit: F) -> Result<TrailEdit>
    where
        F: FnMut(&mut Trail) -> bool,
    {
        let mut attempt = 0;
        loop {
            let Some(mut trail) = self.trails.get_by_id(trail_id, DetailLevel::Full)? else {
                return Ok(TrailEdit::Missing);
            };
            if !edit(&mut trail) {
                return Ok(TrailEdit::Unchanged(trail));
            }

            let locations = TrailPlaceAligner::sort_locations_by_trail_coordinates(
                &trail.coordinates,
                std::mem::take(&mut trail.locations),
            );
            match self
                .trails
                .update_locations(trail_id, locations, Some(trail.version))
            {
                Ok(written) => return Ok(TrailEdit::Written(written)),
                Err(CrosswayError::VersionConflict {
                    expected, actual, ..
                }) if attempt < self.config.max_conflict_retries => {
                    attempt += 1;
                    tracing::debug!(trail_id, expected, actual, attempt, "Version conflict, retrying");
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn checked_place_ref(&self, trail_id: &str, mut place_ref: PlaceRef) -> Result<PlaceRef> {
        if trail_id.is_empty() {
            return Err(CrosswayError::InvalidInput(
                "Trail id must not be empty".to_string(),
            ));
        }
        if place_ref.place_id.is_empty() {
            return Err(CrosswayError::InvalidInput(
                "Place reference without place id".to_string(),
            ));
        }
        place_ref.coordinates = place_ref.coordinates.validated()?;
        place_ref.encountered_trail_ids.remove(trail_id);
        Ok(place_ref)
    }

    fn record(&self, operation: Operation, subject: &str, step: Step, outcome: Outcome) {
        self.journal
            .record(JournalEntry::new(operation, subject, step, outcome));
    }
}

/// Replace or append the trail's reference for `place_ref.place_id`
///
/// A replaced reference keeps the union of old and new crossway references.
fn merge_place_ref(trail: &mut Trail, place_ref: &PlaceRef) -> bool {
    match trail.location_for_mut(&place_ref.place_id) {
        Some(existing) => {
            let moved = existing.coordinates != place_ref.coordinates;
            let before = existing.encountered_trail_ids.len();
            existing.coordinates = place_ref.coordinates;
            existing
                .encountered_trail_ids
                .extend(place_ref.encountered_trail_ids.iter().cloned());
            moved || existing.encountered_trail_ids.len() != before
        }
        None => {
            trail.locations.push(place_ref.clone());
            true
        }
    }
}

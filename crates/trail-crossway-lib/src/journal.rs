//! Step journal for multi-write operations
//!
//! The store offers no transaction spanning a trail and a place, so an operation that
//! fails midway leaves the graph partially updated. Every completed step is recorded
//! here; the last entry for an operation tells a caller where to resume or what to
//! repair with `reconcile_place`.

use std::sync::Mutex;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Engine operation a journal entry belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub enum Operation {
    Link,
    Unlink,
    Delete,
    Save,
    RemovePlace,
    Reconcile,
}

/// Step within an operation
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(
    feature = "serde",
    serde(rename_all = "camelCase", rename_all_fields = "camelCase")
)]
pub enum Step {
    /// The subject trail's own `locations` were written
    TrailSide,
    /// A place's crossing set was written
    PlaceSide { place_id: String },
    /// The linked trail learned about trails already crossing the place
    ExistingCrossways { place_id: String },
    /// Another trail learned about the linked trail
    Propagation { trail_id: String },
    /// Maintenance and accessibility records were purged
    RecordPurge,
    /// A holder's crossway references were rewritten during reconciliation
    Repair { trail_id: String },
}

/// Result of a step
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub enum Outcome {
    Completed,
    /// Nothing needed writing
    Unchanged,
    /// A crossing id pointed at a trail that no longer exists
    SkippedMissingTrail,
    /// A place reference pointed at a place that no longer exists
    SkippedMissingPlace,
    Failed(String),
}

/// One recorded step
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct JournalEntry {
    pub operation: Operation,
    /// Id of the trail (or place, for place-scoped operations) the operation was called on
    pub subject: String,
    pub step: Step,
    pub outcome: Outcome,
}

impl JournalEntry {
    pub fn new(operation: Operation, subject: &str, step: Step, outcome: Outcome) -> Self {
        Self {
            operation,
            subject: subject.to_string(),
            step,
            outcome,
        }
    }
}

/// Sink for [`JournalEntry`]s
pub trait OperationJournal: Send + Sync {
    fn record(&self, entry: JournalEntry);
}

/// Journal that drops every entry
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopJournal;

impl OperationJournal for NoopJournal {
    #[inline]
    fn record(&self, _entry: JournalEntry) {}
}

/// Journal keeping every entry in memory, in recording order
#[derive(Debug, Default)]
pub struct InMemoryJournal {
    entries: Mutex<Vec<JournalEntry>>,
}

impl InMemoryJournal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<JournalEntry> {
        match self.entries.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Most recent entry recorded for `operation` on `subject`
    pub fn last_step(&self, operation: Operation, subject: &str) -> Option<JournalEntry> {
        self.entries()
            .into_iter()
            .rev()
            .find(|e| e.operation == operation && e.subject == subject)
    }

    pub fn clear(&self) {
        if let Ok(mut guard) = self.entries.lock() {
            guard.clear();
        }
    }
}

impl OperationJournal for InMemoryJournal {
    fn record(&self, entry: JournalEntry) {
        tracing::trace!(?entry, "Journal");
        if let Ok(mut guard) = self.entries.lock() {
            guard.push(entry);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_memory_journal_keeps_order() {
        let journal = InMemoryJournal::new();
        journal.record(JournalEntry::new(
            Operation::Link,
            "t-1",
            Step::TrailSide,
            Outcome::Completed,
        ));
        journal.record(JournalEntry::new(
            Operation::Link,
            "t-1",
            Step::PlaceSide {
                place_id: "p-1".to_string(),
            },
            Outcome::Completed,
        ));
        journal.record(JournalEntry::new(
            Operation::Delete,
            "t-2",
            Step::TrailSide,
            Outcome::Completed,
        ));

        assert_eq!(journal.entries().len(), 3);
        let last = journal.last_step(Operation::Link, "t-1").unwrap();
        assert!(matches!(last.step, Step::PlaceSide { .. }));
        assert!(journal.last_step(Operation::Unlink, "t-1").is_none());

        journal.clear();
        assert!(journal.entries().is_empty());
    }

    #[test]
    fn test_noop_journal_accepts_entries() {
        NoopJournal.record(JournalEntry::new(
            Operation::Reconcile,
            "p-1",
            Step::RecordPurge,
            Outcome::Unchanged,
        ));
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_entry_json_is_camel_case() {
        let entry = JournalEntry::new(
            Operation::RemovePlace,
            "p-1",
            Step::Repair {
                trail_id: "t-1".to_string(),
            },
            Outcome::SkippedMissingTrail,
        );
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "operation": "removePlace",
                "subject": "p-1",
                "step": { "repair": { "trailId": "t-1" } },
                "outcome": "skippedMissingTrail",
            })
        );

        let step = serde_json::to_value(Step::ExistingCrossways {
            place_id: "p-1".to_string(),
        })
        .unwrap();
        assert_eq!(step, serde_json::json!({ "existingCrossways": { "placeId": "p-1" } }));
    }
}

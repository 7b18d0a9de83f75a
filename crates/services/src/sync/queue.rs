use fitness_core::model::{OwnerId, WorkoutId};
use serde::{Deserialize, Serialize};
use storage::record::WorkoutRecord;
use storage::repository::StorageError;

/// A remote write waiting to be sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum PendingOp {
    Create { record: WorkoutRecord },
    Update { record: WorkoutRecord },
    Delete { owner_id: OwnerId },
}

impl PendingOp {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            PendingOp::Create { .. } => "create",
            PendingOp::Update { .. } => "update",
            PendingOp::Delete { .. } => "delete",
        }
    }

    /// Fold a newer operation for the same workout into this one.
    fn supersede(self, newer: PendingOp) -> PendingOp {
        match (self, newer) {
            // Never reached the remote as far as we know: still a create, with the newest body.
            (PendingOp::Create { .. }, PendingOp::Update { record }) => PendingOp::Create { record },
            (_, newer) => newer,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingEntry {
    pub seq: u64,
    pub workout_id: WorkoutId,
    pub op: PendingOp,
}

/// What `PendingQueue::push` did with the new operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enqueued {
    Appended,
    Collapsed { previous: &'static str },
}

/// Ordered queue holding at most one entry per workout id.
///
/// A newer operation for an id already queued replaces that entry in place,
/// so per-id order is preserved and redundant calls are never made.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingQueue {
    next_seq: u64,
    entries: Vec<PendingEntry>,
}

impl PendingQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, workout_id: WorkoutId, op: PendingOp) -> Enqueued {
        self.next_seq += 1;
        let seq = self.next_seq;

        if let Some(entry) = self.entries.iter_mut().find(|e| e.workout_id == workout_id) {
            let previous = entry.op.name();
            entry.op = entry.op.clone().supersede(op);
            entry.seq = seq;
            return Enqueued::Collapsed { previous };
        }

        self.entries.push(PendingEntry {
            seq,
            workout_id,
            op,
        });
        Enqueued::Appended
    }

    #[must_use]
    pub fn front(&self) -> Option<&PendingEntry> {
        self.entries.first()
    }

    /// Remove the entry for `workout_id` only if it is still the attempt `seq`.
    ///
    /// Returns `false` when the entry was replaced meanwhile and must stay queued.
    pub fn remove(&mut self, workout_id: WorkoutId, seq: u64) -> bool {
        let before = self.entries.len();
        self.entries
            .retain(|e| !(e.workout_id == workout_id && e.seq == seq));
        self.entries.len() != before
    }

    #[must_use]
    pub fn contains(&self, workout_id: WorkoutId) -> bool {
        self.entries.iter().any(|e| e.workout_id == workout_id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PendingEntry> {
        self.entries.iter()
    }

    /// # Errors
    ///
    /// Returns `StorageError::Serialization` if encoding fails.
    pub fn to_json(&self) -> Result<String, StorageError> {
        serde_json::to_string(self).map_err(|e| StorageError::Serialization(e.to_string()))
    }

    /// # Errors
    ///
    /// Returns `StorageError::Serialization` for a malformed queue.
    pub fn from_json(raw: &str) -> Result<Self, StorageError> {
        serde_json::from_str(raw).map_err(|e| StorageError::Serialization(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fitness_core::model::{Workout, WorkoutDraft};
    use fitness_core::time::fixed_now;

    fn record(name: &str) -> WorkoutRecord {
        let workout = Workout::create(
            WorkoutId::generate(),
            OwnerId::new("u1"),
            WorkoutDraft::new(name),
            fixed_now(),
        )
        .unwrap();
        WorkoutRecord::from_workout(&workout)
    }

    fn update(record: &WorkoutRecord) -> PendingOp {
        PendingOp::Update {
            record: record.clone(),
        }
    }

    #[test]
    fn updates_then_delete_collapse_to_one_delete() {
        let w1 = record("W1");
        let mut queue = PendingQueue::new();
        assert_eq!(queue.push(w1.id, update(&w1)), Enqueued::Appended);
        assert_eq!(
            queue.push(w1.id, update(&w1)),
            Enqueued::Collapsed { previous: "update" }
        );
        queue.push(
            w1.id,
            PendingOp::Delete {
                owner_id: w1.owner_id.clone(),
            },
        );

        assert_eq!(queue.len(), 1);
        let entry = queue.front().unwrap();
        assert_eq!(entry.workout_id, w1.id);
        assert_eq!(entry.op.name(), "delete");
    }

    #[test]
    fn update_after_create_stays_a_create_with_new_body() {
        let original = record("Before");
        let mut renamed = original.clone();
        renamed.name = "After".into();

        let mut queue = PendingQueue::new();
        queue.push(
            original.id,
            PendingOp::Create {
                record: original.clone(),
            },
        );
        queue.push(original.id, update(&renamed));

        assert_eq!(
            queue.front().unwrap().op,
            PendingOp::Create { record: renamed }
        );
    }

    #[test]
    fn replacement_keeps_queue_position() {
        let a = record("A");
        let b = record("B");
        let mut queue = PendingQueue::new();
        queue.push(a.id, update(&a));
        queue.push(b.id, update(&b));
        queue.push(a.id, update(&a));

        let order: Vec<_> = queue.iter().map(|e| e.workout_id).collect();
        assert_eq!(order, vec![a.id, b.id]);
    }

    #[test]
    fn stale_sequence_does_not_dequeue_newer_entry() {
        let a = record("A");
        let mut queue = PendingQueue::new();
        queue.push(a.id, update(&a));
        let attempted = queue.front().unwrap().seq;
        queue.push(a.id, update(&a));

        assert!(!queue.remove(a.id, attempted));
        assert!(queue.contains(a.id));
        let current = queue.front().unwrap().seq;
        assert!(queue.remove(a.id, current));
        assert!(queue.is_empty());
    }

    #[test]
    fn queue_survives_serialization() {
        let a = record("A");
        let mut queue = PendingQueue::new();
        queue.push(a.id, PendingOp::Create { record: a.clone() });
        queue.push(
            WorkoutId::generate(),
            PendingOp::Delete {
                owner_id: OwnerId::new("u1"),
            },
        );

        let restored = PendingQueue::from_json(&queue.to_json().unwrap()).unwrap();
        assert_eq!(restored, queue);
    }
}

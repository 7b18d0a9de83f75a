//! Completion percentages derived from nested completion flags.
//!
//! Everything here is pure; callers re-run it after every completion change.

use crate::model::{ActiveSession, Exercise};

/// Per-exercise progress. Exercises carry no partial credit, so this is 0 or 100.
#[must_use]
pub fn compute_exercise_progress(exercise: &Exercise) -> u8 {
    if exercise.is_completed() { 100 } else { 0 }
}

/// `round(100 × completed / total)`, or 0 for an empty list. Halves round up.
#[must_use]
pub fn compute_workout_progress(exercises: &[Exercise]) -> u8 {
    let total = exercises.len();
    if total == 0 {
        return 0;
    }
    let completed = exercises.iter().filter(|e| e.is_completed()).count();
    let rounded = (200 * completed + total) / (2 * total);
    u8::try_from(rounded).unwrap_or(100)
}

/// A workout is complete when it has exercises and all of them are completed.
#[must_use]
pub fn is_workout_complete(exercises: &[Exercise]) -> bool {
    !exercises.is_empty() && exercises.iter().all(Exercise::is_completed)
}

/// Sum of `weight × reps` over every completed set in the session.
#[must_use]
pub fn compute_session_volume(session: &ActiveSession) -> f64 {
    session
        .exercises()
        .iter()
        .flat_map(|entry| entry.sets())
        .map(|set| set.volume())
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ExerciseDraft, OwnerId, Reps, SetEntry, Workout, WorkoutDraft, WorkoutId};
    use crate::time::fixed_now;

    fn exercises(flags: &[bool]) -> Vec<Exercise> {
        flags
            .iter()
            .enumerate()
            .map(|(i, done)| {
                ExerciseDraft::new(format!("E{i}"), 3, Reps::Count(10))
                    .validate()
                    .unwrap()
                    .with_completed(*done)
            })
            .collect()
    }

    #[test]
    fn empty_list_is_zero_and_incomplete() {
        assert_eq!(compute_workout_progress(&[]), 0);
        assert!(!is_workout_complete(&[]));
    }

    #[test]
    fn exercise_progress_is_binary() {
        let list = exercises(&[true, false]);
        assert_eq!(compute_exercise_progress(&list[0]), 100);
        assert_eq!(compute_exercise_progress(&list[1]), 0);
    }

    #[test]
    fn rounds_to_nearest_percent() {
        assert_eq!(compute_workout_progress(&exercises(&[true, false])), 50);
        assert_eq!(compute_workout_progress(&exercises(&[true, true, false])), 67);
        assert_eq!(compute_workout_progress(&exercises(&[true, false, false])), 33);
        let mut eighth = vec![false; 8];
        eighth[0] = true;
        assert_eq!(compute_workout_progress(&exercises(&eighth)), 13);
    }

    #[test]
    fn hundred_only_when_everything_is_done() {
        for n in 1..=12 {
            let all = exercises(&vec![true; n]);
            assert_eq!(compute_workout_progress(&all), 100);
            assert!(is_workout_complete(&all));

            let mut flags = vec![true; n];
            flags[n - 1] = false;
            let partial = exercises(&flags);
            let progress = compute_workout_progress(&partial);
            assert!(progress < 100, "{n} exercises gave {progress}");
            assert!(!is_workout_complete(&partial));
        }
    }

    #[test]
    fn workout_progress_is_idempotent() {
        let list = exercises(&[true, false, true]);
        assert_eq!(
            compute_workout_progress(&list),
            compute_workout_progress(&list)
        );
    }

    #[test]
    fn session_volume_sums_completed_sets() {
        let draft = WorkoutDraft::new("Pull")
            .with_exercise(ExerciseDraft::new("Deadlift", 1, Reps::Count(5)))
            .with_exercise(ExerciseDraft::new("Curl", 3, Reps::Count(12)));
        let workout =
            Workout::create(WorkoutId::generate(), OwnerId::new("u1"), draft, fixed_now()).unwrap();
        let mut session = ActiveSession::begin(&workout, fixed_now());
        session.record_set(0, SetEntry::completed(140.0, 5).unwrap()).unwrap();
        session.record_set(1, SetEntry::completed(12.5, 12).unwrap()).unwrap();
        session.record_set(1, SetEntry::completed(12.5, 10).unwrap()).unwrap();

        let volume = compute_session_volume(&session);
        assert!((volume - 975.0).abs() < f64::EPSILON);
    }
}

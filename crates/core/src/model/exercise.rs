use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ExerciseError {
    #[error("exercise name cannot be empty")]
    EmptyName,

    #[error("prescribed sets must be >= 1")]
    InvalidSets,

    #[error("prescribed reps must be >= 1")]
    InvalidRepCount,

    #[error("prescribed reps description cannot be empty")]
    EmptyRepDescription,
}

//
// ─── REPS ──────────────────────────────────────────────────────────────────────
//

/// Prescribed repetitions: a plain count or free text such as "8-12" or "AMRAP".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Reps {
    Count(u32),
    Described(String),
}

impl Reps {
    /// Minimum rep count a set must reach to satisfy this prescription.
    ///
    /// Descriptions use their first integer ("8-12" yields 8). `None` means
    /// the description carries no number, so any set with reps counts.
    #[must_use]
    pub fn target(&self) -> Option<u32> {
        match self {
            Reps::Count(n) => Some(*n),
            Reps::Described(text) => {
                let digits: String = text
                    .chars()
                    .skip_while(|c| !c.is_ascii_digit())
                    .take_while(char::is_ascii_digit)
                    .collect();
                digits.parse().ok()
            }
        }
    }

    fn validate(&self) -> Result<(), ExerciseError> {
        match self {
            Reps::Count(0) => Err(ExerciseError::InvalidRepCount),
            Reps::Described(text) if text.trim().is_empty() => {
                Err(ExerciseError::EmptyRepDescription)
            }
            _ => Ok(()),
        }
    }
}

impl fmt::Display for Reps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reps::Count(n) => write!(f, "{n}"),
            Reps::Described(text) => f.write_str(text),
        }
    }
}

//
// ─── EXERCISE ──────────────────────────────────────────────────────────────────
//

/// Unvalidated exercise input, as typed by the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExerciseDraft {
    pub name: String,
    pub target: String,
    pub equipment: String,
    pub sets: u32,
    pub reps: Reps,
    pub rest_seconds: u32,
}

impl ExerciseDraft {
    #[must_use]
    pub fn new(name: impl Into<String>, sets: u32, reps: Reps) -> Self {
        Self {
            name: name.into(),
            target: String::new(),
            equipment: String::new(),
            sets,
            reps,
            rest_seconds: 0,
        }
    }

    #[must_use]
    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = target.into();
        self
    }

    #[must_use]
    pub fn with_equipment(mut self, equipment: impl Into<String>) -> Self {
        self.equipment = equipment.into();
        self
    }

    #[must_use]
    pub fn with_rest_seconds(mut self, rest_seconds: u32) -> Self {
        self.rest_seconds = rest_seconds;
        self
    }

    /// Validate into an `Exercise` that starts out not completed.
    ///
    /// # Errors
    ///
    /// Returns `ExerciseError` if the name is blank, `sets` is zero, or the
    /// rep prescription is empty.
    pub fn validate(self) -> Result<Exercise, ExerciseError> {
        Exercise::from_persisted(
            self.name,
            self.target,
            self.equipment,
            self.sets,
            self.reps,
            self.rest_seconds,
            false,
        )
    }
}

/// A prescribed exercise embedded in a workout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exercise {
    name: String,
    target: String,
    equipment: String,
    sets: u32,
    reps: Reps,
    rest_seconds: u32,
    completed: bool,
}

impl Exercise {
    /// Rehydrate an exercise from storage, re-checking its invariants.
    ///
    /// # Errors
    ///
    /// Same conditions as [`ExerciseDraft::validate`].
    pub fn from_persisted(
        name: String,
        target: String,
        equipment: String,
        sets: u32,
        reps: Reps,
        rest_seconds: u32,
        completed: bool,
    ) -> Result<Self, ExerciseError> {
        if name.trim().is_empty() {
            return Err(ExerciseError::EmptyName);
        }
        if sets == 0 {
            return Err(ExerciseError::InvalidSets);
        }
        reps.validate()?;

        Ok(Self {
            name,
            target,
            equipment,
            sets,
            reps,
            rest_seconds,
            completed,
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Target muscle group.
    #[must_use]
    pub fn target(&self) -> &str {
        &self.target
    }

    #[must_use]
    pub fn equipment(&self) -> &str {
        &self.equipment
    }

    #[must_use]
    pub fn sets(&self) -> u32 {
        self.sets
    }

    #[must_use]
    pub fn reps(&self) -> &Reps {
        &self.reps
    }

    #[must_use]
    pub fn rest_seconds(&self) -> u32 {
        self.rest_seconds
    }

    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.completed
    }

    pub fn set_completed(&mut self, completed: bool) {
        self.completed = completed;
    }

    #[must_use]
    pub fn with_completed(mut self, completed: bool) -> Self {
        self.completed = completed;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn draft_rejects_blank_name() {
        let err = ExerciseDraft::new("  ", 3, Reps::Count(10))
            .validate()
            .unwrap_err();
        assert_eq!(err, ExerciseError::EmptyName);
    }

    #[test]
    fn draft_rejects_zero_sets() {
        let err = ExerciseDraft::new("Squat", 0, Reps::Count(5))
            .validate()
            .unwrap_err();
        assert_eq!(err, ExerciseError::InvalidSets);
    }

    #[test]
    fn draft_rejects_empty_rep_prescriptions() {
        assert_eq!(
            ExerciseDraft::new("Squat", 3, Reps::Count(0))
                .validate()
                .unwrap_err(),
            ExerciseError::InvalidRepCount
        );
        assert_eq!(
            ExerciseDraft::new("Squat", 3, Reps::Described(" ".into()))
                .validate()
                .unwrap_err(),
            ExerciseError::EmptyRepDescription
        );
    }

    #[test]
    fn validated_exercise_starts_incomplete() {
        let exercise = ExerciseDraft::new("Bench Press", 4, Reps::Count(8))
            .with_target("chest")
            .with_equipment("barbell")
            .with_rest_seconds(90)
            .validate()
            .unwrap();
        assert!(!exercise.is_completed());
        assert_eq!(exercise.target(), "chest");
        assert_eq!(exercise.rest_seconds(), 90);
    }

    #[test]
    fn rep_targets_from_descriptions() {
        assert_eq!(Reps::Count(12).target(), Some(12));
        assert_eq!(Reps::Described("8-12".into()).target(), Some(8));
        assert_eq!(Reps::Described("about 15 each side".into()).target(), Some(15));
        assert_eq!(Reps::Described("AMRAP".into()).target(), None);
    }
}

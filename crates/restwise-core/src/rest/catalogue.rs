//! Exercise catalogue lookup.
//!
//! The engine only needs one property of an exercise: its difficulty class,
//! which decides the base rest.

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DifficultyClass {
    /// Multi-joint, heavily loaded movements (squat, deadlift, bench press).
    Compound,
    /// Secondary multi-joint work (rows, lunges, dips).
    Accessory,
    /// Single-joint movements (curls, raises, extensions).
    Isolation,
}

impl fmt::Display for DifficultyClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DifficultyClass::Compound => write!(f, "compound"),
            DifficultyClass::Accessory => write!(f, "accessory"),
            DifficultyClass::Isolation => write!(f, "isolation"),
        }
    }
}

/// Source of exercise difficulty classifications.
#[async_trait]
pub trait ExerciseCatalogue: Send + Sync {
    /// # Errors
    /// `CoreError::NotFound` for unknown exercises, `Unavailable` when the
    /// backing service cannot be reached.
    async fn difficulty_class(&self, exercise_id: &str) -> Result<DifficultyClass>;
}

const BUILTIN_EXERCISES: &[(&str, DifficultyClass)] = &[
    ("back-squat", DifficultyClass::Compound),
    ("front-squat", DifficultyClass::Compound),
    ("deadlift", DifficultyClass::Compound),
    ("romanian-deadlift", DifficultyClass::Compound),
    ("bench-press", DifficultyClass::Compound),
    ("overhead-press", DifficultyClass::Compound),
    ("pull-up", DifficultyClass::Compound),
    ("barbell-row", DifficultyClass::Accessory),
    ("dumbbell-row", DifficultyClass::Accessory),
    ("lunge", DifficultyClass::Accessory),
    ("dip", DifficultyClass::Accessory),
    ("incline-dumbbell-press", DifficultyClass::Accessory),
    ("lat-pulldown", DifficultyClass::Accessory),
    ("leg-press", DifficultyClass::Accessory),
    ("bicep-curl", DifficultyClass::Isolation),
    ("tricep-extension", DifficultyClass::Isolation),
    ("lateral-raise", DifficultyClass::Isolation),
    ("leg-extension", DifficultyClass::Isolation),
    ("leg-curl", DifficultyClass::Isolation),
    ("calf-raise", DifficultyClass::Isolation),
];

/// In-process catalogue: a built-in table plus user-defined entries.
#[derive(Debug, Clone, Default)]
pub struct StaticCatalogue {
    entries: BTreeMap<String, DifficultyClass>,
}

impl StaticCatalogue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builtin() -> Self {
        let entries = BUILTIN_EXERCISES
            .iter()
            .map(|(id, class)| (id.to_string(), *class))
            .collect();
        Self { entries }
    }

    /// Built-in table extended (and overridden) by `extra`.
    pub fn with_overrides<'a>(
        extra: impl IntoIterator<Item = (&'a String, &'a DifficultyClass)>,
    ) -> Self {
        let mut catalogue = Self::builtin();
        for (id, class) in extra {
            catalogue.insert(id.clone(), *class);
        }
        catalogue
    }

    pub fn insert(&mut self, exercise_id: impl Into<String>, class: DifficultyClass) {
        self.entries.insert(exercise_id.into(), class);
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, DifficultyClass)> {
        self.entries.iter().map(|(id, class)| (id.as_str(), *class))
    }

    pub fn lookup(&self, exercise_id: &str) -> Option<DifficultyClass> {
        self.entries.get(exercise_id).copied()
    }
}

#[async_trait]
impl ExerciseCatalogue for StaticCatalogue {
    async fn difficulty_class(&self, exercise_id: &str) -> Result<DifficultyClass> {
        self.lookup(exercise_id)
            .ok_or_else(|| CoreError::exercise_not_found(exercise_id))
    }
}

//! Historical recovery data.
//!
//! Storage of past sets belongs to the caller; the engine only reads an
//! aggregated [`HistoricalProfile`] through [`HistoryProvider`].
//! [`InMemoryHistory`] is a small reference provider used by the CLI and tests.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// Sets compared against the overall mean when computing the fatigue trend.
const TREND_WINDOW: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RecoveryStat {
    pub mean_seconds: f64,
    pub samples: u32,
    /// Mean set number of the samples, so fatigue can be accounted for.
    #[serde(default = "first_set")]
    pub mean_set_number: f64,
}

fn first_set() -> f64 {
    1.0
}

/// Recovery the user showed under some effort and fatigue.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ObservedRecovery {
    pub mean_seconds: f64,
    pub mean_set_number: f64,
    /// Mean RPE of the samples; `None` when none of them carried one.
    pub effort: Option<f64>,
}

/// Aggregated view of a user's past sets for one exercise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalProfile {
    pub sample_count: u32,
    pub mean_recovery_seconds: f64,
    /// Observed recovery keyed by RPE.
    #[serde(default)]
    pub recovery_by_rpe: BTreeMap<u8, RecoveryStat>,
    /// -1.0 .. 1.0; positive when recent sessions needed more rest than usual.
    #[serde(default)]
    pub fatigue_trend: f64,
    #[serde(default = "first_set")]
    pub mean_set_number: f64,
    /// Mean RPE over the samples that recorded one.
    #[serde(default)]
    pub mean_effort: Option<f64>,
}

impl HistoricalProfile {
    /// Observed recovery at `rpe`, or the overall figures when that RPE has no samples.
    pub fn observed_recovery(&self, rpe: Option<u8>) -> ObservedRecovery {
        let bucket = rpe.and_then(|r| {
            self.recovery_by_rpe
                .get(&r)
                .filter(|stat| stat.samples > 0)
                .map(|stat| (r, stat))
        });
        match bucket {
            Some((rpe, stat)) => ObservedRecovery {
                mean_seconds: stat.mean_seconds,
                mean_set_number: stat.mean_set_number,
                effort: Some(rpe as f64),
            },
            None => ObservedRecovery {
                mean_seconds: self.mean_recovery_seconds,
                mean_set_number: self.mean_set_number,
                effort: self.mean_effort,
            },
        }
    }
}

/// Source of historical profiles.
#[async_trait]
pub trait HistoryProvider: Send + Sync {
    /// `Ok(None)` when the user has no history for the exercise.
    ///
    /// # Errors
    /// `CoreError::Unavailable` when the backing service cannot be reached.
    async fn fetch_profile(
        &self,
        user_id: &str,
        exercise_id: &str,
    ) -> Result<Option<HistoricalProfile>>;
}

/// A completed set and the rest the user actually took before the next one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetRecord {
    pub user_id: String,
    pub exercise_id: String,
    pub set_number: u32,
    #[serde(default)]
    pub perceived_effort: Option<u8>,
    pub rest_taken_seconds: u32,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct HistoryFile {
    records: Vec<SetRecord>,
}

/// Thread-safe in-memory history provider.
#[derive(Debug, Default)]
pub struct InMemoryHistory {
    records: RwLock<HashMap<(String, String), Vec<SetRecord>>>,
    offline: AtomicBool,
}

impl InMemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, record: SetRecord) {
        let key = (record.user_id.clone(), record.exercise_id.clone());
        let mut guard = match self.records.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.entry(key).or_default().push(record);
    }

    /// Simulate an outage: every fetch fails with `Unavailable` while set.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.read_records().values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Aggregate the stored records for a user/exercise pair.
    pub fn profile(&self, user_id: &str, exercise_id: &str) -> Option<HistoricalProfile> {
        let guard = self.read_records();
        let records = guard.get(&(user_id.to_string(), exercise_id.to_string()))?;
        aggregate(records)
    }

    /// # Errors
    /// Fails if the file cannot be read or is not a valid history document.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let file: HistoryFile = serde_json::from_str(&content)?;
        let history = Self::new();
        for record in file.records {
            history.record(record);
        }
        Ok(history)
    }

    /// # Errors
    /// Fails if the file cannot be written.
    pub fn save(&self, path: &Path) -> Result<()> {
        let mut records: Vec<SetRecord> = self.read_records().values().flatten().cloned().collect();
        records.sort_by(|a, b| a.recorded_at.cmp(&b.recorded_at));
        let content = serde_json::to_string_pretty(&HistoryFile { records })?;
        std::fs::write(path, content)?;
        Ok(())
    }

    fn read_records(&self) -> std::sync::RwLockReadGuard<'_, HashMap<(String, String), Vec<SetRecord>>> {
        match self.records.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[async_trait]
impl HistoryProvider for InMemoryHistory {
    async fn fetch_profile(
        &self,
        user_id: &str,
        exercise_id: &str,
    ) -> Result<Option<HistoricalProfile>> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(CoreError::Unavailable("history store is offline".into()));
        }
        Ok(self.profile(user_id, exercise_id))
    }
}

fn aggregate(records: &[SetRecord]) -> Option<HistoricalProfile> {
    if records.is_empty() {
        return None;
    }

    let mut ordered: Vec<&SetRecord> = records.iter().collect();
    ordered.sort_by(|a, b| a.recorded_at.cmp(&b.recorded_at));

    let total: f64 = ordered.iter().map(|r| r.rest_taken_seconds as f64).sum();
    let mean = total / ordered.len() as f64;

    let mean_set_number =
        ordered.iter().map(|r| r.set_number as f64).sum::<f64>() / ordered.len() as f64;

    // rpe -> (rest sum, set number sum, samples)
    let mut by_rpe: BTreeMap<u8, (f64, f64, u32)> = BTreeMap::new();
    for record in &ordered {
        if let Some(rpe) = record.perceived_effort {
            let entry = by_rpe.entry(rpe).or_insert((0.0, 0.0, 0));
            entry.0 += record.rest_taken_seconds as f64;
            entry.1 += record.set_number as f64;
            entry.2 += 1;
        }
    }
    let rated: u32 = by_rpe.values().map(|(_, _, n)| n).sum();
    let mean_effort = (rated > 0).then(|| {
        by_rpe
            .iter()
            .map(|(rpe, (_, _, n))| *rpe as f64 * *n as f64)
            .sum::<f64>()
            / rated as f64
    });
    let recovery_by_rpe = by_rpe
        .into_iter()
        .map(|(rpe, (rest_sum, set_sum, samples))| {
            (
                rpe,
                RecoveryStat {
                    mean_seconds: rest_sum / samples as f64,
                    samples,
                    mean_set_number: set_sum / samples as f64,
                },
            )
        })
        .collect();

    let fatigue_trend = if ordered.len() > TREND_WINDOW && mean > 0.0 {
        let recent = &ordered[ordered.len() - TREND_WINDOW..];
        let recent_mean =
            recent.iter().map(|r| r.rest_taken_seconds as f64).sum::<f64>() / TREND_WINDOW as f64;
        ((recent_mean - mean) / mean).clamp(-1.0, 1.0)
    } else {
        0.0
    };

    Some(HistoricalProfile {
        sample_count: ordered.len() as u32,
        mean_recovery_seconds: mean,
        recovery_by_rpe,
        fatigue_trend,
        mean_set_number,
        mean_effort,
    })
}

//! Adaptive rest calculation.
//!
//! ```text
//! base(difficulty) -> rpe -> fatigue(set) -> personalization(history) -> bounds
//! ```
//!
//! Adjustments are appended in that order, so two calls with the same input
//! and the same profile produce identical calculations.

use std::sync::Arc;

use tracing::{debug, warn};

use super::calculation::{AdaptiveRestCalculation, Adjustment, AdjustmentReason};
use super::catalogue::ExerciseCatalogue;
use super::history::{HistoricalProfile, HistoryProvider};
use super::input::PerformanceInput;
use super::tuning::RestTuning;
use crate::error::{ErrorKind, Result, ValidationError};

/// What the history lookup produced.
enum HistoryOutcome {
    Profile(HistoricalProfile),
    Missing,
    Unavailable,
}

/// Stateless rest engine. Cheap to clone and safe to share across tasks.
#[derive(Clone)]
pub struct RestEngine {
    catalogue: Arc<dyn ExerciseCatalogue>,
    history: Arc<dyn HistoryProvider>,
    tuning: RestTuning,
}

impl RestEngine {
    pub fn new(catalogue: Arc<dyn ExerciseCatalogue>, history: Arc<dyn HistoryProvider>) -> Self {
        Self {
            catalogue,
            history,
            tuning: RestTuning::default(),
        }
    }

    pub fn with_tuning(mut self, tuning: RestTuning) -> Self {
        self.tuning = tuning;
        self
    }

    /// Recommend a rest duration for the set described by `input`.
    ///
    /// # Errors
    /// `InvalidInput` for malformed input, `NotFound` for unknown exercises.
    /// An unreachable history service is not an error: the personalization
    /// step is skipped and the confidence lowered instead.
    pub async fn calculate(
        &self,
        user_id: &str,
        exercise_id: &str,
        input: &PerformanceInput,
    ) -> Result<AdaptiveRestCalculation> {
        if user_id.trim().is_empty() {
            return Err(ValidationError::EmptyIdentifier("user id").into());
        }
        if exercise_id.trim().is_empty() {
            return Err(ValidationError::EmptyIdentifier("exercise id").into());
        }
        input.validate()?;

        let class = self.catalogue.difficulty_class(exercise_id).await?;
        let base = self.tuning.base.for_class(class).max(1);
        debug!(exercise_id, %class, base, "base rest");

        let mut adjustments = Vec::with_capacity(4);
        if let Some(rpe) = input.perceived_effort {
            push(&mut adjustments, AdjustmentReason::Rpe, self.rpe_delta(rpe));
        }
        push(
            &mut adjustments,
            AdjustmentReason::Fatigue,
            self.fatigue_delta(input.set_number),
        );

        let history = match self.history.fetch_profile(user_id, exercise_id).await {
            Ok(Some(profile)) => HistoryOutcome::Profile(profile),
            Ok(None) => HistoryOutcome::Missing,
            Err(err) if err.kind() == ErrorKind::Unavailable => {
                warn!(user_id, exercise_id, error = %err, "history unavailable, skipping personalization");
                HistoryOutcome::Unavailable
            }
            Err(err) => return Err(err),
        };

        if let HistoryOutcome::Profile(profile) = &history {
            push(
                &mut adjustments,
                AdjustmentReason::Personalization,
                self.personalization_delta(base, profile, input.perceived_effort),
            );
        }

        let raw = base as i64 + adjustments.iter().map(|a| a.delta_seconds as i64).sum::<i64>();
        let recommended = self.tuning.clamp(raw);
        if recommended as i64 != raw {
            let delta = i32::try_from(recommended as i64 - raw)
                .unwrap_or(if raw > recommended as i64 { i32::MIN } else { i32::MAX });
            push(&mut adjustments, AdjustmentReason::Bounds, delta);
        }

        Ok(AdaptiveRestCalculation {
            recommended_rest_seconds: recommended,
            base_rest_seconds: base,
            adjustments,
            confidence: self.confidence(&history, input.perceived_effort.is_some()),
        })
    }

    /// Linear in RPE around the neutral point; negative below it.
    fn rpe_delta(&self, rpe: u8) -> i32 {
        (rpe as i32 - self.tuning.rpe_neutral as i32) * self.tuning.seconds_per_rpe_point as i32
    }

    /// Grows with each set after the first, capped.
    fn fatigue_delta(&self, set_number: u32) -> i32 {
        let sets_before = set_number.saturating_sub(1) as u64;
        let delta = sets_before.saturating_mul(self.tuning.fatigue_seconds_per_set as u64);
        delta.min(self.tuning.fatigue_cap_seconds as u64) as i32
    }

    fn personalization_weight(&self, samples: u32) -> f64 {
        let n = samples as f64;
        let k = self.tuning.personalization_half_saturation as f64;
        if n + k <= 0.0 {
            return 0.0;
        }
        (n / (n + k)).min(self.tuning.personalization_max_influence)
    }

    /// Fatigue the model expects after `mean_set_number` sets, unrounded.
    fn expected_fatigue(&self, mean_set_number: f64) -> f64 {
        let sets_before = (mean_set_number - 1.0).max(0.0);
        (sets_before * self.tuning.fatigue_seconds_per_set as f64)
            .min(self.tuning.fatigue_cap_seconds as f64)
    }

    /// Observed recovery at `rpe` minus what the unpersonalized model would
    /// have recommended for the same effort and set numbers.
    fn residual(&self, base: u32, profile: &HistoricalProfile, rpe: Option<u8>) -> f64 {
        let observed = profile.observed_recovery(rpe);
        let effort = observed
            .effort
            .map(|e| (e - self.tuning.rpe_neutral as f64) * self.tuning.seconds_per_rpe_point as f64)
            .unwrap_or(0.0);
        let expected = base as f64 + effort + self.expected_fatigue(observed.mean_set_number);
        observed.mean_seconds - expected
    }

    fn personal_shift(&self, base: u32, profile: &HistoricalProfile, rpe: Option<u8>) -> f64 {
        let weight = self.personalization_weight(profile.sample_count);
        let trend = profile.fatigue_trend.clamp(-1.0, 1.0) * self.tuning.fatigue_trend_seconds as f64;
        (self.residual(base, profile, rpe) + trend) * weight
    }

    /// Personalization for the current set.
    ///
    /// With an RPE, the personalized effort curve `rpe_delta(r) + shift(r)`
    /// is replaced by its running maximum over `1..=r`, so a harder set never
    /// gets less rest than an easier one.
    fn personalization_delta(&self, base: u32, profile: &HistoricalProfile, rpe: Option<u8>) -> i32 {
        let limit = self.tuning.ceiling_seconds as f64
            + 10.0 * self.tuning.seconds_per_rpe_point as f64;
        match rpe {
            None => round_half_up(self.personal_shift(base, profile, None).clamp(-limit, limit)),
            Some(rpe) => {
                let envelope = (1..=rpe)
                    .map(|r| self.rpe_delta(r) as f64 + self.personal_shift(base, profile, Some(r)))
                    .fold(f64::NEG_INFINITY, f64::max)
                    .clamp(-limit, limit);
                round_half_up(envelope) - self.rpe_delta(rpe)
            }
        }
    }

    fn confidence(&self, history: &HistoryOutcome, has_rpe: bool) -> f64 {
        let levels = &self.tuning.confidence;
        let base = match history {
            HistoryOutcome::Profile(profile) => {
                let n = profile.sample_count as f64;
                let k = self.tuning.personalization_half_saturation as f64;
                let saturation = if n + k > 0.0 { n / (n + k) } else { 0.0 };
                levels.with_history + (1.0 - levels.with_history) * saturation
            }
            HistoryOutcome::Missing => levels.no_history,
            HistoryOutcome::Unavailable => levels.degraded,
        };
        let penalty = if has_rpe { 0.0 } else { levels.missing_rpe_penalty };
        (base - penalty).clamp(0.0, 1.0)
    }
}

/// Monotone rounding: `round_half_up(a) <= round_half_up(b)` whenever `a <= b`.
fn round_half_up(value: f64) -> i32 {
    (value + 0.5).floor() as i32
}

fn push(adjustments: &mut Vec<Adjustment>, reason: AdjustmentReason, delta_seconds: i32) {
    debug!(reason = reason.as_str(), delta_seconds, "rest adjustment");
    adjustments.push(Adjustment {
        reason,
        delta_seconds,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;
    use crate::rest::catalogue::{DifficultyClass, StaticCatalogue};
    use crate::rest::history::{InMemoryHistory, RecoveryStat, SetRecord};
    use async_trait::async_trait;
    use chrono::{Duration, Utc};
    use std::collections::BTreeMap;

    struct FixedHistory(Option<HistoricalProfile>);

    #[async_trait]
    impl HistoryProvider for FixedHistory {
        async fn fetch_profile(&self, _: &str, _: &str) -> Result<Option<HistoricalProfile>> {
            Ok(self.0.clone())
        }
    }

    struct DownHistory;

    #[async_trait]
    impl HistoryProvider for DownHistory {
        async fn fetch_profile(&self, _: &str, _: &str) -> Result<Option<HistoricalProfile>> {
            Err(CoreError::Unavailable("connection refused".into()))
        }
    }

    fn engine_with(history: Arc<dyn HistoryProvider>) -> RestEngine {
        RestEngine::new(Arc::new(StaticCatalogue::builtin()), history)
    }

    fn slow_recoverer(samples: u32) -> HistoricalProfile {
        let mut by_rpe = BTreeMap::new();
        by_rpe.insert(
            8,
            RecoveryStat {
                mean_seconds: 200.0,
                samples,
                mean_set_number: 1.0,
            },
        );
        HistoricalProfile {
            sample_count: samples,
            mean_recovery_seconds: 200.0,
            recovery_by_rpe: by_rpe,
            fatigue_trend: 0.0,
            mean_set_number: 1.0,
            mean_effort: Some(8.0),
        }
    }

    /// Rests 200s at RPE 9 and 60s at RPE 6, ten first sets each.
    fn effort_sensitive() -> HistoricalProfile {
        let mut by_rpe = BTreeMap::new();
        for (rpe, mean_seconds) in [(6, 60.0), (9, 200.0)] {
            by_rpe.insert(
                rpe,
                RecoveryStat {
                    mean_seconds,
                    samples: 10,
                    mean_set_number: 1.0,
                },
            );
        }
        HistoricalProfile {
            sample_count: 20,
            mean_recovery_seconds: 130.0,
            recovery_by_rpe: by_rpe,
            fatigue_trend: 0.0,
            mean_set_number: 1.0,
            mean_effort: Some(7.5),
        }
    }

    #[tokio::test]
    async fn no_history_uses_base_rpe_and_fatigue() {
        let engine = engine_with(Arc::new(InMemoryHistory::new()));
        let input = PerformanceInput::new(1, 10).with_effort(7);
        let calc = engine.calculate("u1", "bench-press", &input).await.unwrap();

        assert_eq!(calc.base_rest_seconds, 120);
        let reasons: Vec<_> = calc.adjustments.iter().map(|a| a.reason).collect();
        assert_eq!(reasons, vec![AdjustmentReason::Rpe, AdjustmentReason::Fatigue]);
        assert_eq!(calc.recommended_rest_seconds, 132);
        assert!(calc.confidence < 0.5);
    }

    #[tokio::test]
    async fn missing_rpe_records_no_rpe_adjustment() {
        let engine = engine_with(Arc::new(InMemoryHistory::new()));
        let calc = engine
            .calculate("u1", "bicep-curl", &PerformanceInput::new(2, 12))
            .await
            .unwrap();
        assert!(calc.adjustment(AdjustmentReason::Rpe).is_none());
        assert_eq!(calc.recommended_rest_seconds, 70);
    }

    #[tokio::test]
    async fn fatigue_is_capped() {
        let engine = engine_with(Arc::new(InMemoryHistory::new()));
        let calc = engine
            .calculate("u1", "deadlift", &PerformanceInput::new(40, 3))
            .await
            .unwrap();
        assert_eq!(calc.adjustment(AdjustmentReason::Fatigue).unwrap().delta_seconds, 60);
    }

    #[tokio::test]
    async fn slow_recoverer_is_shifted_up() {
        let engine = engine_with(Arc::new(FixedHistory(Some(slow_recoverer(30)))));
        let input = PerformanceInput::new(1, 5).with_effort(8);
        let calc = engine.calculate("u1", "back-squat", &input).await.unwrap();

        // expected at rpe 8: 120 + 24 = 144; observed 200; weight capped at 0.5
        let personal = calc.adjustment(AdjustmentReason::Personalization).unwrap();
        assert_eq!(personal.delta_seconds, 28);
        assert!(calc.confidence > 0.5);
    }

    #[tokio::test]
    async fn sparse_history_has_little_influence() {
        let engine = engine_with(Arc::new(FixedHistory(Some(slow_recoverer(1)))));
        let input = PerformanceInput::new(1, 5).with_effort(8);
        let calc = engine.calculate("u1", "back-squat", &input).await.unwrap();
        let personal = calc.adjustment(AdjustmentReason::Personalization).unwrap();
        // weight = 1 / 11
        assert_eq!(personal.delta_seconds, 5);
    }

    #[tokio::test]
    async fn history_from_late_sets_matching_the_model_is_neutral() {
        let history = InMemoryHistory::new();
        for i in 0..30 {
            history.record(SetRecord {
                user_id: "u1".into(),
                exercise_id: "back-squat".into(),
                set_number: 5,
                perceived_effort: Some(8),
                rest_taken_seconds: 184,
                recorded_at: Utc::now() - Duration::minutes(60 - i),
            });
        }
        let engine = engine_with(Arc::new(history));
        let input = PerformanceInput::new(5, 5).with_effort(8);
        let calc = engine.calculate("u1", "back-squat", &input).await.unwrap();

        // 120 + 24 + 40 is exactly what this user rests
        assert_eq!(calc.adjustment(AdjustmentReason::Personalization).unwrap().delta_seconds, 0);
        assert_eq!(calc.recommended_rest_seconds, 184);
    }

    #[tokio::test]
    async fn personalization_follows_the_supplied_effort() {
        let engine = engine_with(Arc::new(FixedHistory(Some(effort_sensitive()))));

        let hard = engine
            .calculate("u1", "back-squat", &PerformanceInput::new(1, 5).with_effort(9))
            .await
            .unwrap();
        // observed 200 vs 156 expected, weight 0.5
        assert_eq!(hard.adjustment(AdjustmentReason::Personalization).unwrap().delta_seconds, 22);
        assert_eq!(hard.recommended_rest_seconds, 178);

        let easy = engine
            .calculate("u1", "back-squat", &PerformanceInput::new(1, 5).with_effort(6))
            .await
            .unwrap();
        // shortened, but never below what RPE 5 would get
        assert_eq!(easy.adjustment(AdjustmentReason::Personalization).unwrap().delta_seconds, -16);
        assert_eq!(easy.recommended_rest_seconds, 104);
    }

    #[tokio::test]
    async fn personalized_rest_never_drops_with_effort() {
        let engine = engine_with(Arc::new(FixedHistory(Some(effort_sensitive()))));
        let mut previous = 0;
        for rpe in 1..=10 {
            let input = PerformanceInput::new(1, 5).with_effort(rpe);
            let calc = engine.calculate("u1", "back-squat", &input).await.unwrap();
            assert!(
                calc.recommended_rest_seconds >= previous,
                "rpe {rpe}: {} < {previous}",
                calc.recommended_rest_seconds
            );
            previous = calc.recommended_rest_seconds;
        }
    }

    #[tokio::test]
    async fn extreme_history_is_clamped_without_wrapping() {
        for mean in [1e12, -1e12] {
            let mut profile = slow_recoverer(30);
            profile.mean_recovery_seconds = mean;
            profile.recovery_by_rpe.clear();
            let engine = engine_with(Arc::new(FixedHistory(Some(profile))));
            let input = PerformanceInput::new(1, 5).with_effort(8);
            let calc = engine.calculate("u1", "back-squat", &input).await.unwrap();

            let expected = if mean > 0.0 { 300 } else { 15 };
            assert_eq!(calc.recommended_rest_seconds, expected);
            assert!(calc.adjustment(AdjustmentReason::Bounds).is_some());
            assert_eq!(
                calc.base_rest_seconds as i64 + calc.total_delta(),
                calc.recommended_rest_seconds as i64
            );
        }
    }

    #[tokio::test]
    async fn unavailable_history_degrades() {
        let engine = engine_with(Arc::new(DownHistory));
        let input = PerformanceInput::new(2, 8).with_effort(8);
        let calc = engine.calculate("u1", "back-squat", &input).await.unwrap();
        assert!(calc.adjustment(AdjustmentReason::Personalization).is_none());
        assert_eq!(calc.confidence, 0.25);
    }

    #[tokio::test]
    async fn clamp_is_recorded_as_bounds() {
        let tuning = RestTuning {
            ceiling_seconds: 130,
            ..RestTuning::default()
        };
        let engine = engine_with(Arc::new(InMemoryHistory::new())).with_tuning(tuning);
        let input = PerformanceInput::new(5, 3).with_effort(10);
        let calc = engine.calculate("u1", "back-squat", &input).await.unwrap();

        assert_eq!(calc.recommended_rest_seconds, 130);
        let bounds = calc.adjustment(AdjustmentReason::Bounds).unwrap();
        assert!(bounds.delta_seconds < 0);
        assert_eq!(
            calc.base_rest_seconds as i64 + calc.total_delta(),
            calc.recommended_rest_seconds as i64
        );
    }

    #[tokio::test]
    async fn unknown_exercise_is_not_found() {
        let engine = engine_with(Arc::new(InMemoryHistory::new()));
        let err = engine
            .calculate("u1", "moon-jump", &PerformanceInput::new(1, 5))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn invalid_input_is_rejected_before_lookup() {
        let engine = engine_with(Arc::new(DownHistory));
        let err = engine
            .calculate("u1", "moon-jump", &PerformanceInput::new(0, 5))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);

        let err = engine
            .calculate("", "back-squat", &PerformanceInput::new(1, 5))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[tokio::test]
    async fn custom_catalogue_entries_are_used() {
        let mut catalogue = StaticCatalogue::new();
        catalogue.insert("sled-push", DifficultyClass::Isolation);
        let engine = RestEngine::new(Arc::new(catalogue), Arc::new(InMemoryHistory::new()));
        let calc = engine
            .calculate("u1", "sled-push", &PerformanceInput::new(1, 1))
            .await
            .unwrap();
        assert_eq!(calc.base_rest_seconds, 60);
    }
}

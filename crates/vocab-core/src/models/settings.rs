//! Review algorithm settings model

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

const MINUTE_MS: i64 = 60_000;
const HOUR_MS: i64 = 60 * MINUTE_MS;

/// What happens once a card reaches the highest score level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MaxScoreBehavior {
    /// Keep reviewing at the max interval forever
    #[default]
    Cap,
    /// Stop surfacing the card as due
    Archive,
}

/// Answer quality chosen by the learner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rating {
    Again,
    Hard,
    Good,
    Easy,
}

impl Rating {
    /// All ratings from weakest to strongest.
    pub const ALL: [Self; 4] = [Self::Again, Self::Hard, Self::Good, Self::Easy];

    /// Lowercase label, matching the serialized form.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Again => "again",
            Self::Hard => "hard",
            Self::Good => "good",
            Self::Easy => "easy",
        }
    }
}

/// Score adjustment applied for each rating
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RatingAdjustments {
    pub again: i32,
    pub hard: i32,
    pub good: i32,
    pub easy: i32,
}

impl RatingAdjustments {
    /// Adjustment for a given rating.
    #[must_use]
    pub const fn for_rating(&self, rating: Rating) -> i32 {
        match rating {
            Rating::Again => self.again,
            Rating::Hard => self.hard,
            Rating::Good => self.good,
            Rating::Easy => self.easy,
        }
    }
}

impl Default for RatingAdjustments {
    fn default() -> Self {
        Self {
            again: -2,
            hard: -1,
            good: 1,
            easy: 2,
        }
    }
}

/// Interval table and policies driving the scheduler.
///
/// `intervals` maps every level in `0..=max_score` to a duration in
/// milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlgorithmSettings {
    pub intervals: BTreeMap<u32, i64>,
    pub max_score: u32,
    #[serde(default)]
    pub max_score_behavior: MaxScoreBehavior,
    #[serde(default = "default_snooze_delay_ms")]
    pub snooze_delay_ms: i64,
    #[serde(default)]
    pub rating_adjustments: RatingAdjustments,
}

const fn default_snooze_delay_ms() -> i64 {
    MINUTE_MS
}

impl AlgorithmSettings {
    /// Build a table where level 0 is `level_zero_ms` and each level `n >= 1`
    /// is `base_ms * factor^(n-1)`.
    #[must_use]
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
    pub fn exponential(level_zero_ms: i64, base_ms: i64, factor: f64, max_score: u32) -> Self {
        let mut intervals = BTreeMap::new();
        intervals.insert(0, level_zero_ms);
        let mut current = base_ms as f64;
        for level in 1..=max_score {
            intervals.insert(level, current.round().min(i64::MAX as f64) as i64);
            current *= factor;
        }

        Self {
            intervals,
            max_score,
            max_score_behavior: MaxScoreBehavior::Cap,
            snooze_delay_ms: default_snooze_delay_ms(),
            rating_adjustments: RatingAdjustments::default(),
        }
    }

    /// Builder-style override of the max score behavior.
    #[must_use]
    pub const fn with_behavior(mut self, behavior: MaxScoreBehavior) -> Self {
        self.max_score_behavior = behavior;
        self
    }

    /// Check that the table covers every level and holds no negative values.
    pub fn validate(&self) -> Result<(), String> {
        for level in 0..=self.max_score {
            match self.intervals.get(&level) {
                None => return Err(format!("intervals is missing level {level}")),
                Some(value) if *value < 0 => {
                    return Err(format!("interval for level {level} must not be negative"));
                }
                Some(_) => {}
            }
        }
        if self.snooze_delay_ms < 0 {
            return Err("snoozeDelayMs must not be negative".to_string());
        }
        Ok(())
    }
}

impl Default for AlgorithmSettings {
    fn default() -> Self {
        Self::exponential(10 * MINUTE_MS, HOUR_MS, 2.5, 8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_table_shape() {
        let settings = AlgorithmSettings::default();
        assert_eq!(settings.max_score, 8);
        assert_eq!(settings.intervals[&0], 600_000);
        assert_eq!(settings.intervals[&1], 3_600_000);
        assert_eq!(settings.intervals[&2], 9_000_000);
        assert_eq!(settings.intervals[&3], 22_500_000);
        assert_eq!(settings.max_score_behavior, MaxScoreBehavior::Cap);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_missing_level() {
        let mut settings = AlgorithmSettings::default();
        settings.intervals.remove(&4);
        let err = settings.validate().unwrap_err();
        assert!(err.contains("level 4"));
    }

    #[test]
    fn test_validate_rejects_negative_interval() {
        let mut settings = AlgorithmSettings::default();
        settings.intervals.insert(2, -5);
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_json_round_trip_uses_camel_case() {
        let settings = AlgorithmSettings::default().with_behavior(MaxScoreBehavior::Archive);
        let json = serde_json::to_string(&settings).unwrap();
        assert!(json.contains("\"maxScoreBehavior\":\"archive\""));
        let parsed: AlgorithmSettings = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, settings);
    }

    #[test]
    fn test_rating_adjustments_lookup() {
        let adjustments = RatingAdjustments::default();
        assert_eq!(adjustments.for_rating(Rating::Again), -2);
        assert_eq!(adjustments.for_rating(Rating::Easy), 2);
    }
}

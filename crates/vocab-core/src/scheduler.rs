//! Review scheduler
//!
//! Pure functions that turn a card's current score plus a rating adjustment
//! into a new score and the time the card is due again. The interval for each
//! score level comes from [`AlgorithmSettings`]; nothing here reads the clock
//! or touches storage.

use crate::models::{AlgorithmSettings, MaxScoreBehavior, Rating};

/// Shortest interval ever scheduled for a rating, so a card at level 0 is never
/// due again immediately.
pub const MIN_REVIEW_INTERVAL_MS: i64 = 60_000;

/// Shortest snooze delay.
pub const MIN_SNOOZE_DELAY_MS: i64 = 1_000;

/// `nextReviewAt` used for archived cards (9999-12-31T23:59:59Z).
pub const ARCHIVED_NEXT_REVIEW_AT: i64 = 253_402_300_799_000;

/// Result of scheduling a review
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReviewOutcome {
    /// New score, clamped at zero
    pub score: u32,
    /// Time the card becomes due again
    pub next_review_at: i64,
    /// Card reached the max score under [`MaxScoreBehavior::Archive`]
    pub archived: bool,
}

/// Compute the new score and due time for a rating adjustment.
pub fn compute_next_review(
    current_score: u32,
    rating_adjustment: i32,
    settings: &AlgorithmSettings,
    now: i64,
) -> ReviewOutcome {
    let raw = i64::from(current_score) + i64::from(rating_adjustment);
    let score = u32::try_from(raw.max(0)).unwrap_or(u32::MAX);

    if score >= settings.max_score && settings.max_score_behavior == MaxScoreBehavior::Archive {
        return ReviewOutcome {
            score,
            next_review_at: ARCHIVED_NEXT_REVIEW_AT.max(now),
            archived: true,
        };
    }

    let level = score.min(settings.max_score);
    ReviewOutcome {
        score,
        next_review_at: now.saturating_add(interval_for_level(level, settings)),
        archived: false,
    }
}

/// Compute the outcome of a [`Rating`] using the configured adjustments.
pub fn compute_for_rating(
    current_score: u32,
    rating: Rating,
    settings: &AlgorithmSettings,
    now: i64,
) -> ReviewOutcome {
    let adjustment = settings.rating_adjustments.for_rating(rating);
    compute_next_review(current_score, adjustment, settings, now)
}

/// Interval for a level, floored at [`MIN_REVIEW_INTERVAL_MS`].
///
/// A level missing from the table falls back to the closest lower level.
pub fn interval_for_level(level: u32, settings: &AlgorithmSettings) -> i64 {
    let configured = settings
        .intervals
        .range(..=level)
        .next_back()
        .map_or(0, |(_, interval)| *interval);
    configured.max(MIN_REVIEW_INTERVAL_MS)
}

/// Due time for the "review again later" directive.
pub fn snooze_until(settings: &AlgorithmSettings, now: i64) -> i64 {
    now.saturating_add(settings.snooze_delay_ms.max(MIN_SNOOZE_DELAY_MS))
}

/// Preview the due time each rating would produce, weakest first.
pub fn preview_intervals(
    current_score: u32,
    settings: &AlgorithmSettings,
    now: i64,
) -> [(Rating, ReviewOutcome); 4] {
    Rating::ALL.map(|rating| (rating, compute_for_rating(current_score, rating, settings, now)))
}

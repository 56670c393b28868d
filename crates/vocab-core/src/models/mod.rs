//! Data models for vocab

mod card;
mod settings;
mod sync_conflict;

pub use card::{Card, CardEdit, CardId};
pub use settings::{AlgorithmSettings, MaxScoreBehavior, Rating, RatingAdjustments};
pub use sync_conflict::SyncConflict;

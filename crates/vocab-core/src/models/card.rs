//! Card model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// A unique identifier for a card, using UUID v7 (time-sortable).
///
/// Generated by whichever device creates the card, so creation works offline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CardId(Uuid);

impl CardId {
    /// Create a new unique card ID using UUID v7
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the string representation of this ID
    #[must_use]
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for CardId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for CardId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s.trim())?))
    }
}

/// One vocabulary item with its review schedule.
///
/// The same shape is used for store rows, sync payloads and exports. All
/// timestamps are Unix milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Card {
    /// Unique identifier
    pub id: CardId,
    /// Word or phrase being learned
    pub original: String,
    /// Translation shown on the back of the card
    pub translation: String,
    /// Article or other free-form metadata (e.g. grammatical gender)
    #[serde(default)]
    pub article: String,
    /// Learning strength, never negative
    #[serde(default)]
    pub score: u32,
    /// Creation timestamp, immutable
    pub created_at: i64,
    /// Most recent rating, 0 until the first review
    #[serde(default)]
    pub last_reviewed_at: i64,
    /// The card is due once this time has passed
    pub next_review_at: i64,
    /// Most recent mutation of any field; the sync cursor key
    pub updated_at: i64,
    /// Tombstone timestamp, `None` while live
    #[serde(default)]
    pub deleted_at: Option<i64>,
}

impl Card {
    /// Create a new card that is due immediately.
    #[must_use]
    pub fn new(
        original: impl Into<String>,
        translation: impl Into<String>,
        article: impl Into<String>,
        now: i64,
    ) -> Self {
        Self {
            id: CardId::new(),
            original: original.into(),
            translation: translation.into(),
            article: article.into(),
            score: 0,
            created_at: now,
            last_reviewed_at: 0,
            next_review_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    /// Whether this card has been soft-deleted.
    #[must_use]
    pub const fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Whether this card is live and its review time has passed.
    #[must_use]
    pub const fn is_due(&self, now: i64) -> bool {
        !self.is_deleted() && self.next_review_at <= now
    }
}

/// Display-field changes applied by an edit. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardEdit {
    pub original: Option<String>,
    pub translation: Option<String>,
    pub article: Option<String>,
}

impl CardEdit {
    /// True when the edit would not change anything.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.original.is_none() && self.translation.is_none() && self.article.is_none()
    }
}

//! vocab-core - Core library for vocab
//!
//! This crate contains the card model, the local record store, the review
//! scheduler, and the sync client shared by every vocab interface.

pub mod clock;
pub mod db;
pub mod error;
pub mod export;
pub mod models;
pub mod scheduler;
pub mod services;
pub mod sync;
pub mod util;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{Error, Result};
pub use models::{AlgorithmSettings, Card, CardEdit, CardId, MaxScoreBehavior, Rating, SyncConflict};

use std::path::Path;

use crate::cli::RatingArg;
use crate::commands::common::{
    card_label, format_due, normalize_card_identifier, now_ms, open_service, resolve_card,
};
use crate::error::CliError;

pub async fn run_rate(
    id: &str,
    rating: Option<RatingArg>,
    adjust: Option<i32>,
    db_path: &Path,
) -> Result<(), CliError> {
    let normalized_id = normalize_card_identifier(id)?;
    let service = open_service(db_path)?;
    let card = resolve_card(&normalized_id, &service).await?;

    let updated = match (rating, adjust) {
        (_, Some(adjustment)) => service.rate_with_adjustment(&card.id, adjustment).await?,
        (Some(rating), None) => service.rate(&card.id, rating.into()).await?,
        (None, None) => return Err(CliError::MissingRating),
    };

    println!(
        "{}  score {} -> {}  next review {}",
        card_label(&updated),
        card.score,
        updated.score,
        format_due(updated.next_review_at, now_ms())
    );
    Ok(())
}

pub async fn run_snooze(id: &str, db_path: &Path) -> Result<(), CliError> {
    let normalized_id = normalize_card_identifier(id)?;
    let service = open_service(db_path)?;
    let card = resolve_card(&normalized_id, &service).await?;

    let updated = service.snooze(&card.id).await?;
    println!(
        "{}  next review {}",
        card_label(&updated),
        format_due(updated.next_review_at, now_ms())
    );
    Ok(())
}

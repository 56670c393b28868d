use std::path::Path;

use vocab_core::CardEdit;

use crate::commands::common::{normalize_card_identifier, open_service, resolve_card};
use crate::error::CliError;

pub async fn run_edit(id: &str, edit: CardEdit, db_path: &Path) -> Result<(), CliError> {
    let normalized_id = normalize_card_identifier(id)?;
    let service = open_service(db_path)?;
    let card = resolve_card(&normalized_id, &service).await?;

    let updated = service.edit(&card.id, edit).await?;
    println!("{}", updated.id);
    Ok(())
}

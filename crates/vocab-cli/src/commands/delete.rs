use std::path::Path;

use crate::commands::common::{normalize_card_identifier, open_service, resolve_card};
use crate::error::CliError;

pub async fn run_delete(id: &str, db_path: &Path) -> Result<(), CliError> {
    let normalized_id = normalize_card_identifier(id)?;
    let service = open_service(db_path)?;
    let card = resolve_card(&normalized_id, &service).await?;

    service.soft_delete(&card.id).await?;
    println!("{}", card.id);
    Ok(())
}

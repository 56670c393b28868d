use std::path::Path;

use crate::commands::common::open_service;
use crate::error::CliError;

pub async fn run_add(
    original: &str,
    translation: &str,
    article: &str,
    db_path: &Path,
) -> Result<(), CliError> {
    let service = open_service(db_path)?;
    let card = service.create(original, translation, article).await?;

    println!("{}", card.id);
    Ok(())
}

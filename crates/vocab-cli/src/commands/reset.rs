use std::path::Path;

use crate::commands::common::open_service;
use crate::error::CliError;

pub async fn run_reset(confirmed: bool, db_path: &Path) -> Result<(), CliError> {
    if !confirmed {
        return Err(CliError::ResetNotConfirmed);
    }

    let service = open_service(db_path)?;
    let count = service.reset_all().await?;
    println!("Reset {count} cards");
    Ok(())
}

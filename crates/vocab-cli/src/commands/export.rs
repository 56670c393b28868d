use std::path::Path;

use vocab_core::export::render_cards_export;

use crate::cli::ExportFormat;
use crate::commands::common::{list_all_cards, open_service};
use crate::error::CliError;

pub async fn run_export(
    format: ExportFormat,
    output_path: Option<&Path>,
    db_path: &Path,
) -> Result<(), CliError> {
    let service = open_service(db_path)?;
    let cards = list_all_cards(&service).await?;
    let rendered = render_cards_export(&cards, format.into())?;

    if let Some(path) = output_path {
        std::fs::write(path, rendered)?;
        println!("{}", path.display());
    } else {
        println!("{rendered}");
    }

    Ok(())
}

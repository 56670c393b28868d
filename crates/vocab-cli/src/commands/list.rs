use std::path::Path;

use vocab_core::Card;

use crate::commands::common::{
    card_to_list_item, format_card_lines, now_ms, open_service, CardListItem,
};
use crate::error::CliError;

pub async fn run_list(
    limit: usize,
    offset: usize,
    as_json: bool,
    db_path: &Path,
) -> Result<(), CliError> {
    let service = open_service(db_path)?;
    let cards = service.list(limit, offset).await?;
    print_cards(&cards, as_json, "No cards yet. Add one with `vocab add <original> <translation>`.")
}

pub async fn run_due(limit: usize, as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let service = open_service(db_path)?;
    let mut cards = service.due_now().await?;
    let total = cards.len();
    cards.truncate(limit);

    print_cards(&cards, as_json, "Nothing is due right now.")?;
    if !as_json && total > cards.len() {
        println!("... and {} more", total - cards.len());
    }
    Ok(())
}

fn print_cards(cards: &[Card], as_json: bool, empty_message: &str) -> Result<(), CliError> {
    let now = now_ms();

    if as_json {
        let json_items = cards
            .iter()
            .map(|card| card_to_list_item(card, now))
            .collect::<Vec<CardListItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
        return Ok(());
    }

    if cards.is_empty() {
        println!("{empty_message}");
        return Ok(());
    }

    for line in format_card_lines(cards, now) {
        println!("{line}");
    }
    Ok(())
}

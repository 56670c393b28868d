use std::path::Path;

use chrono::Utc;
use serde::Serialize;
use vocab_core::scheduler::ARCHIVED_NEXT_REVIEW_AT;
use vocab_core::services::CardService;
use vocab_core::{Card, CardId, SyncConflict};

use crate::error::CliError;

const SHORT_ID_LEN: usize = 13;
const PAGE_SIZE: usize = 500;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CardListItem {
    #[serde(flatten)]
    pub card: Card,
    pub due: String,
    pub last_reviewed: String,
}

#[derive(Debug, Serialize)]
pub struct SyncConflictItem {
    pub id: i64,
    pub card_id: String,
    pub local_updated_at: i64,
    pub incoming_updated_at: i64,
    pub resolved_at: i64,
    pub resolved_at_iso: String,
    pub strategy: String,
}

pub fn open_service(db_path: &Path) -> Result<CardService, CliError> {
    Ok(CardService::open_path(db_path)?)
}

pub async fn list_all_cards(service: &CardService) -> Result<Vec<Card>, CliError> {
    let mut cards = Vec::new();
    let mut offset = 0usize;

    loop {
        let batch = service.list(PAGE_SIZE, offset).await?;
        let count = batch.len();
        cards.extend(batch);

        if count < PAGE_SIZE {
            break;
        }
        offset += count;
    }

    Ok(cards)
}

pub async fn resolve_card(card_query: &str, service: &CardService) -> Result<Card, CliError> {
    if let Ok(card_id) = card_query.parse::<CardId>() {
        if let Some(card) = service.get(&card_id).await? {
            return Ok(card);
        }
    }

    let query = card_query.to_ascii_lowercase();
    let mut matching = list_all_cards(service)
        .await?
        .into_iter()
        .filter(|card| card.id.to_string().starts_with(&query))
        .collect::<Vec<_>>();

    match matching.len() {
        0 => Err(CliError::CardNotFound(card_query.to_string())),
        1 => Ok(matching.remove(0)),
        _ => {
            let options = matching
                .iter()
                .take(3)
                .map(|card| short_id(&card.id))
                .collect::<Vec<_>>()
                .join(", ");

            Err(CliError::AmbiguousCardId(format!(
                "ID prefix '{card_query}' is ambiguous; matches: {options}"
            )))
        }
    }
}

pub fn normalize_card_identifier(id: &str) -> Result<String, CliError> {
    let trimmed = id.trim();
    if trimmed.is_empty() {
        Err(CliError::EmptyCardId)
    } else {
        Ok(trimmed.to_string())
    }
}

pub fn short_id(id: &CardId) -> String {
    id.to_string().chars().take(SHORT_ID_LEN).collect()
}

pub fn card_label(card: &Card) -> String {
    if card.article.is_empty() {
        card.original.clone()
    } else {
        format!("{} {}", card.article, card.original)
    }
}

pub fn format_card_lines(cards: &[Card], now_ms: i64) -> Vec<String> {
    cards
        .iter()
        .map(|card| {
            let short_id = short_id(&card.id);
            let label = truncate(&card_label(card), 28);
            let translation = truncate(&card.translation, 28);
            let due = format_due(card.next_review_at, now_ms);
            format!(
                "{short_id:<13}  {label:<28}  {translation:<28}  {:>3}  {due}",
                card.score
            )
        })
        .collect()
}

pub fn card_to_list_item(card: &Card, now_ms: i64) -> CardListItem {
    CardListItem {
        card: card.clone(),
        due: format_due(card.next_review_at, now_ms),
        last_reviewed: if card.last_reviewed_at == 0 {
            "never".to_string()
        } else {
            format_relative_time(card.last_reviewed_at, now_ms)
        },
    }
}

pub fn sync_conflict_to_item(conflict: &SyncConflict) -> SyncConflictItem {
    SyncConflictItem {
        id: conflict.id,
        card_id: conflict.card_id.clone(),
        local_updated_at: conflict.local_updated_at,
        incoming_updated_at: conflict.incoming_updated_at,
        resolved_at: conflict.resolved_at,
        resolved_at_iso: format_sync_timestamp(conflict.resolved_at),
        strategy: conflict.strategy.clone(),
    }
}

pub fn format_sync_conflict_lines(conflicts: &[SyncConflict]) -> Vec<String> {
    conflicts
        .iter()
        .map(|conflict| {
            format!(
                "{}  {:<4}  card={}  local={} incoming={}",
                format_sync_timestamp(conflict.resolved_at),
                conflict.strategy,
                conflict.card_id,
                conflict.local_updated_at,
                conflict.incoming_updated_at
            )
        })
        .collect()
}

pub fn format_sync_timestamp(timestamp_ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(timestamp_ms).map_or_else(
        || timestamp_ms.to_string(),
        |date_time| date_time.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    )
}

/// "due", "archived" or a relative span such as "in 3h".
pub fn format_due(next_review_at: i64, now_ms: i64) -> String {
    if next_review_at >= ARCHIVED_NEXT_REVIEW_AT {
        "archived".to_string()
    } else if next_review_at <= now_ms {
        "due".to_string()
    } else {
        format!("in {}", format_span(next_review_at - now_ms))
    }
}

pub fn format_relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    let diff = now_ms.saturating_sub(timestamp_ms);
    if diff < 60_000 {
        "just now".to_string()
    } else {
        format!("{} ago", format_span(diff))
    }
}

pub fn format_span(diff: i64) -> String {
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;
    let week = 7 * day;
    let month = 30 * day;
    let year = 365 * day;

    if diff < minute {
        format!("{}s", diff / 1_000)
    } else if diff < hour {
        format!("{}m", diff / minute)
    } else if diff < day {
        format!("{}h", diff / hour)
    } else if diff < week {
        format!("{}d", diff / day)
    } else if diff < month {
        format!("{}w", diff / week)
    } else if diff < year {
        format!("{}mo", diff / month)
    } else {
        format!("{}y", diff / year)
    }
}

fn truncate(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        value.to_string()
    } else {
        let take_len = max_chars.saturating_sub(3);
        let mut truncated = value.chars().take(take_len).collect::<String>();
        truncated.push_str("...");
        truncated
    }
}

pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

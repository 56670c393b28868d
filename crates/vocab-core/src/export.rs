//! Card export rendering

use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::scheduler::ARCHIVED_NEXT_REVIEW_AT;
use crate::Card;

/// Export output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Json,
    Markdown,
}

impl ExportFormat {
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Markdown => "md",
        }
    }
}

/// Render cards as pretty-printed JSON using the sync wire shape.
pub fn render_json_export(cards: &[Card]) -> serde_json::Result<String> {
    serde_json::to_string_pretty(cards)
}

/// Render cards as a Markdown table.
#[must_use]
pub fn render_markdown_export(cards: &[Card]) -> String {
    let mut output = String::new();
    let _ = writeln!(output, "| Original | Article | Translation | Score | Next review |");
    let _ = writeln!(output, "| --- | --- | --- | ---: | --- |");

    for card in cards {
        let _ = writeln!(
            output,
            "| {} | {} | {} | {} | {} |",
            escape_cell(&card.original),
            escape_cell(&card.article),
            escape_cell(&card.translation),
            card.score,
            format_due(card.next_review_at),
        );
    }

    output
}

/// Render cards based on the selected format.
pub fn render_cards_export(cards: &[Card], format: ExportFormat) -> serde_json::Result<String> {
    match format {
        ExportFormat::Json => render_json_export(cards),
        ExportFormat::Markdown => Ok(render_markdown_export(cards)),
    }
}

/// Deterministic default file name for exports.
#[must_use]
pub fn suggested_export_file_name(format: ExportFormat, timestamp_ms: i64) -> String {
    format!("vocab-export-{timestamp_ms}.{}", format.extension())
}

fn escape_cell(value: &str) -> String {
    value.replace('|', "\\|").replace('\n', " ")
}

fn format_due(next_review_at: i64) -> String {
    if next_review_at >= ARCHIVED_NEXT_REVIEW_AT {
        return "archived".to_string();
    }
    DateTime::<Utc>::from_timestamp_millis(next_review_at).map_or_else(
        || next_review_at.to_string(),
        |due| due.format("%Y-%m-%d %H:%M").to_string(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn card() -> Card {
        let mut card = Card::new("Haus", "house | home", "das", 0);
        card.score = 3;
        card.next_review_at = 1_700_000_000_000;
        card
    }

    #[test]
    fn markdown_export_renders_table_rows() {
        let rendered = render_markdown_export(&[card()]);
        let lines: Vec<&str> = rendered.lines().collect();

        assert_eq!(lines.len(), 3);
        assert_eq!(
            lines[2],
            "| Haus | das | house \\| home | 3 | 2023-11-14 22:13 |"
        );
    }

    #[test]
    fn markdown_export_marks_archived_cards() {
        let mut archived = card();
        archived.next_review_at = ARCHIVED_NEXT_REVIEW_AT;
        let rendered = render_markdown_export(&[archived]);
        assert!(rendered.contains("| archived |"));
    }

    #[test]
    fn json_export_uses_wire_names() {
        let rendered = render_cards_export(&[card()], ExportFormat::Json).unwrap();
        assert!(rendered.contains("\"nextReviewAt\": 1700000000000"));
    }

    #[test]
    fn suggested_export_file_name_uses_format_extension() {
        assert_eq!(
            suggested_export_file_name(ExportFormat::Json, 123),
            "vocab-export-123.json"
        );
        assert_eq!(
            suggested_export_file_name(ExportFormat::Markdown, 456),
            "vocab-export-456.md"
        );
    }
}

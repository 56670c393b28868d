use std::path::Path;

use vocab_core::sync::{
    FileCursorStore, HttpSyncTransport, SyncClient, SyncClientConfig, SyncOutcome, SyncReport,
};

use crate::commands::common::{
    format_sync_conflict_lines, open_service, sync_conflict_to_item, SyncConflictItem,
};
use crate::config::EffectiveConfig;
use crate::error::CliError;

pub async fn run_sync(config: &EffectiveConfig, as_json: bool) -> Result<(), CliError> {
    let (server_url, token) = config.sync_credentials()?;
    let client_config = SyncClientConfig::default();

    let service = open_service(&config.db_path)?;
    let transport = HttpSyncTransport::new(server_url, token, client_config.request_timeout)?;
    let cursor = FileCursorStore::new(&config.cursor_path);
    let client = SyncClient::with_config(service, transport, cursor, client_config);

    match client.sync().await? {
        SyncOutcome::Completed(report) => {
            if as_json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("{}", format_sync_report(&report));
            }
        }
        SyncOutcome::Coalesced => println!("Sync already in progress"),
    }
    Ok(())
}

pub fn format_sync_report(report: &SyncReport) -> String {
    let mut line = format!(
        "Sync completed: pushed {}, pulled {}, applied {}",
        report.pushed, report.pulled, report.applied
    );
    if report.kept_local > 0 {
        line.push_str(&format!(", kept {} newer local", report.kept_local));
    }
    line
}

pub async fn run_sync_conflicts(
    limit: usize,
    as_json: bool,
    db_path: &Path,
) -> Result<(), CliError> {
    let service = open_service(db_path)?;
    let conflicts = service.list_conflicts(limit).await?;

    if as_json {
        let json_items = conflicts
            .iter()
            .map(sync_conflict_to_item)
            .collect::<Vec<SyncConflictItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
        return Ok(());
    }

    if conflicts.is_empty() {
        println!("No sync conflicts recorded.");
        return Ok(());
    }

    for line in format_sync_conflict_lines(&conflicts) {
        println!("{line}");
    }
    Ok(())
}

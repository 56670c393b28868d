use std::path::{Path, PathBuf};

use vocab_core::{AlgorithmSettings, MaxScoreBehavior, Rating};

use crate::cli::{BehaviorArg, SettingsCommands};
use crate::commands::common::{format_span, open_service};
use crate::error::CliError;

pub async fn run_settings(command: SettingsCommands, db_path: &Path) -> Result<(), CliError> {
    match command {
        SettingsCommands::Show { json } => run_settings_show(json, db_path).await,
        SettingsCommands::Set {
            max_score,
            behavior,
            snooze_delay_ms,
            interval,
            from_file,
        } => {
            let update = SettingsUpdate {
                max_score,
                behavior,
                snooze_delay_ms,
                intervals: interval
                    .iter()
                    .map(|raw| parse_interval_arg(raw))
                    .collect::<Result<_, _>>()?,
            };
            run_settings_set(update, from_file, db_path).await
        }
    }
}

async fn run_settings_show(as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let service = open_service(db_path)?;
    let settings = service.load_settings().await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&settings)?);
    } else {
        for line in format_settings_lines(&settings) {
            println!("{line}");
        }
    }
    Ok(())
}

async fn run_settings_set(
    update: SettingsUpdate,
    from_file: Option<PathBuf>,
    db_path: &Path,
) -> Result<(), CliError> {
    let service = open_service(db_path)?;

    let settings = if let Some(path) = from_file {
        let raw = std::fs::read_to_string(&path)?;
        serde_json::from_str::<AlgorithmSettings>(&raw)?
    } else {
        if update.is_empty() {
            return Err(CliError::InvalidSetting(
                "nothing to change; pass at least one option".to_string(),
            ));
        }
        update.apply(service.load_settings().await?)
    };

    service.save_settings(&settings).await?;
    for line in format_settings_lines(&settings) {
        println!("{line}");
    }
    Ok(())
}

#[derive(Debug, Default)]
pub struct SettingsUpdate {
    pub max_score: Option<u32>,
    pub behavior: Option<BehaviorArg>,
    pub snooze_delay_ms: Option<i64>,
    pub intervals: Vec<(u32, i64)>,
}

impl SettingsUpdate {
    const fn is_empty(&self) -> bool {
        self.max_score.is_none()
            && self.behavior.is_none()
            && self.snooze_delay_ms.is_none()
            && self.intervals.is_empty()
    }

    pub fn apply(self, mut settings: AlgorithmSettings) -> AlgorithmSettings {
        if let Some(max_score) = self.max_score {
            settings.max_score = max_score;
        }
        if let Some(behavior) = self.behavior {
            settings.max_score_behavior = behavior.into();
        }
        if let Some(delay) = self.snooze_delay_ms {
            settings.snooze_delay_ms = delay;
        }
        settings.intervals.extend(self.intervals);

        let max_score = settings.max_score;
        settings.intervals.retain(|level, _| *level <= max_score);
        settings
    }
}

pub fn parse_interval_arg(raw: &str) -> Result<(u32, i64), CliError> {
    let invalid = || CliError::InvalidSetting(format!("expected LEVEL=MS, got `{raw}`"));
    let (level, value) = raw.split_once('=').ok_or_else(invalid)?;
    let level = level.trim().parse::<u32>().map_err(|_| invalid())?;
    let value = value.trim().parse::<i64>().map_err(|_| invalid())?;
    Ok((level, value))
}

pub fn format_settings_lines(settings: &AlgorithmSettings) -> Vec<String> {
    let behavior = match settings.max_score_behavior {
        MaxScoreBehavior::Cap => "cap",
        MaxScoreBehavior::Archive => "archive",
    };
    let adjustments = Rating::ALL
        .iter()
        .map(|rating| {
            format!(
                "{} {:+}",
                rating.label(),
                settings.rating_adjustments.for_rating(*rating)
            )
        })
        .collect::<Vec<_>>()
        .join(", ");

    let mut lines = vec![
        format!("max score:          {} ({behavior})", settings.max_score),
        format!(
            "snooze delay:       {}",
            format_span(settings.snooze_delay_ms)
        ),
        format!("rating adjustments: {adjustments}"),
        "intervals:".to_string(),
    ];
    lines.extend(
        settings
            .intervals
            .iter()
            .map(|(level, interval)| format!("  level {level:<3} {}", format_span(*interval))),
    );
    lines
}

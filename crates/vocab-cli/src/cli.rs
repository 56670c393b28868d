use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use vocab_core::{MaxScoreBehavior, Rating};

#[derive(Parser)]
#[command(name = "vocab")]
#[command(about = "Review vocabulary cards from the command line")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Optional path to local database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,

    /// Sync service base URL (overrides config and VOCAB_SERVER_URL)
    #[arg(long, global = true, value_name = "URL")]
    pub server_url: Option<String>,

    /// Bearer token for the sync service (overrides config and VOCAB_SYNC_TOKEN)
    #[arg(long, global = true, value_name = "TOKEN")]
    pub token: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create a new card, due immediately
    #[command(alias = "new")]
    Add {
        /// Word or phrase being learned
        original: String,
        /// Meaning shown on the back of the card
        translation: String,
        /// Grammatical article (der/die/das, ...)
        #[arg(short, long, default_value = "")]
        article: String,
    },
    /// List cards, soonest due first
    List {
        /// Number of cards to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
        /// Number of cards to skip
        #[arg(long, default_value = "0")]
        offset: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List cards that are due for review now
    Due {
        /// Number of cards to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Record a review answer for a card
    Rate {
        /// Card ID or unique ID prefix
        id: String,
        /// Answer quality
        #[arg(value_enum, required_unless_present = "adjust")]
        rating: Option<RatingArg>,
        /// Explicit score adjustment instead of a named rating
        #[arg(long, allow_negative_numbers = true, conflicts_with = "rating")]
        adjust: Option<i32>,
    },
    /// Show a card again after the configured short delay
    Snooze {
        /// Card ID or unique ID prefix
        id: String,
    },
    /// Edit a card's text fields
    Edit {
        /// Card ID or unique ID prefix
        id: String,
        /// New original text
        #[arg(long)]
        original: Option<String>,
        /// New translation
        #[arg(long)]
        translation: Option<String>,
        /// New article (empty string clears it)
        #[arg(long)]
        article: Option<String>,
    },
    /// Delete a card
    Delete {
        /// Card ID or unique ID prefix
        id: String,
    },
    /// Reset every card to score 0, due now
    Reset {
        /// Confirm the reset
        #[arg(long)]
        yes: bool,
    },
    /// Show or change review algorithm settings
    Settings {
        #[command(subcommand)]
        command: SettingsCommands,
    },
    /// Exchange changes with the sync service
    Sync {
        #[command(subcommand)]
        command: Option<SyncCommands>,
        /// Output the round report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Export cards
    Export {
        /// Export format
        #[arg(long, value_enum, default_value_t = ExportFormat::Json)]
        format: ExportFormat,
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
    /// Generate shell completion scripts
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: CompletionShell,
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
    /// Show or change persisted CLI configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum RatingArg {
    Again,
    Hard,
    Good,
    Easy,
}

impl From<RatingArg> for Rating {
    fn from(value: RatingArg) -> Self {
        match value {
            RatingArg::Again => Self::Again,
            RatingArg::Hard => Self::Hard,
            RatingArg::Good => Self::Good,
            RatingArg::Easy => Self::Easy,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum BehaviorArg {
    Cap,
    Archive,
}

impl From<BehaviorArg> for MaxScoreBehavior {
    fn from(value: BehaviorArg) -> Self {
        match value {
            BehaviorArg::Cap => Self::Cap,
            BehaviorArg::Archive => Self::Archive,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum ExportFormat {
    Json,
    Markdown,
}

impl From<ExportFormat> for vocab_core::export::ExportFormat {
    fn from(value: ExportFormat) -> Self {
        match value {
            ExportFormat::Json => Self::Json,
            ExportFormat::Markdown => Self::Markdown,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum CompletionShell {
    Bash,
    Zsh,
    Fish,
}

#[derive(Subcommand)]
pub enum SettingsCommands {
    /// Print the current settings
    Show {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Update selected settings; unspecified values are kept
    Set {
        /// Highest score level
        #[arg(long)]
        max_score: Option<u32>,
        /// What happens once a card reaches the max score
        #[arg(long, value_enum)]
        behavior: Option<BehaviorArg>,
        /// Delay used by `vocab snooze`, in milliseconds
        #[arg(long, value_name = "MS")]
        snooze_delay_ms: Option<i64>,
        /// Interval for one level, e.g. `--interval 3=86400000` (repeatable)
        #[arg(long, value_name = "LEVEL=MS")]
        interval: Vec<String>,
        /// Replace all settings with the JSON document at PATH
        #[arg(long, value_name = "PATH", conflicts_with_all = ["max_score", "behavior", "snooze_delay_ms", "interval"])]
        from_file: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
pub enum SyncCommands {
    /// List recently resolved sync conflicts
    Conflicts {
        /// Number of conflicts to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum ConfigKey {
    ServerUrl,
    Token,
    DbPath,
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Print the effective configuration (token redacted)
    Show,
    /// Persist a configuration value
    Set {
        #[arg(value_enum)]
        key: ConfigKey,
        value: String,
    },
    /// Remove a persisted configuration value
    Unset {
        #[arg(value_enum)]
        key: ConfigKey,
    },
}

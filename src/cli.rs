use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Default, Parser)]
#[command(
    version,
    about = "Read, create, update and delete calendar events as JSON"
)]
pub struct Cli {
    /// Inclusive RFC3339 start of the read window (e.g. 2025-05-07T00:00:00Z)
    #[arg(long)]
    pub start: Option<String>,
    /// Exclusive RFC3339 end of the read window (e.g. 2025-05-08T00:00:00Z)
    #[arg(long)]
    pub end: Option<String>,
    /// Also create a demo event in the default calendar while reading
    #[arg(long)]
    pub create: bool,
    /// Create the event described by the JSON object on stdin
    #[arg(long)]
    pub create_json: bool,
    /// Apply the partial update described by the JSON object on stdin
    #[arg(long)]
    pub update_json: bool,
    /// Delete the event with this identifier
    #[arg(long, value_name = "ID")]
    pub delete_id: Option<String>,
    /// Path to the SQLite calendar database
    #[arg(long)]
    pub database: Option<PathBuf>,
    /// Path to a config.toml (defaults to the platform config directory)
    #[arg(long)]
    pub config: Option<PathBuf>,
}

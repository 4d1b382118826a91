// crates/devdash-server/src/cli/mod.rs
// CLI module for devdash commands

use clap::{Parser, Subcommand};

pub mod projects;
pub mod refresh;

pub use projects::{
    run_activity, run_list, run_metadata, run_override, run_pin, run_show, run_status, run_touch,
};
pub use refresh::run_refresh;

#[derive(Parser)]
#[command(name = "devdash")]
#[command(about = "Local project dashboard: scan, score and annotate your dev directory")]
#[command(version)]
pub struct Cli {
    /// Debug-level logging on stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Scan the dev root and store fresh snapshots
    Refresh,

    /// All projects in dashboard order
    List,

    /// Merged view of one project
    Show {
        /// Project id
        id: String,
    },

    /// Most recent activity for a project
    Activity {
        /// Project id
        id: String,
    },

    /// Toggle the pinned flag
    Pin {
        /// Project id
        id: String,
    },

    /// Record that the project was opened
    Touch {
        /// Project id
        id: String,

        /// Tool the project was opened in (e.g. vscode, terminal)
        #[arg(long)]
        tool: Option<String>,
    },

    /// Apply an override patch (e.g. '{"statusOverride": "stale"}')
    Override {
        /// Project id
        id: String,

        /// JSON patch; null clears a field
        json: String,
    },

    /// Apply a metadata patch (e.g. '{"goal": "ship v1"}')
    Metadata {
        /// Project id
        id: String,

        /// JSON patch; null clears a field
        json: String,
    },

    /// Last refresh and effective configuration
    Status,
}

/// Pretty JSON on stdout
pub fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

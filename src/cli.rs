use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "collabmap")]
#[command(about = "Slack Collaboration Map assistant: who knows about this, and where is it discussed", long_about = None)]
#[command(version)]
pub(crate) struct Cli {
    #[command(subcommand)]
    pub(crate) command: Command,
}

#[derive(Subcommand)]
pub(crate) enum Command {
    /// Run the Socket Mode bot (reacts to the trigger emoji and @mentions).
    Run,

    /// Build a collaboration map for a message from the command line.
    Map {
        /// The message text to map
        text: String,
        /// Maximum search results to gather
        #[arg(short = 'n', long, default_value_t = 50)]
        limit: usize,
        /// Also search shared files
        #[arg(long)]
        files: bool,
        /// Output the full report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Extract search keywords from a message (debugging aid).
    Keywords {
        /// The message text to extract from
        text: String,
    },
}

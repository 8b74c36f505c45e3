use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Command line interface for the typing record bot.
#[derive(Parser, Debug, Default)]
#[command(author, version, about)]
pub struct Cli {
    /// Path to configuration file.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
    /// Override the record file location.
    #[arg(long, global = true)]
    pub record_file: Option<PathBuf>,
    /// Connect to a chat gateway at host:port instead of using stdio.
    #[arg(long, global = true)]
    pub connect: Option<String>,
    /// Enable or disable logging (true/false).
    #[arg(long, global = true)]
    pub logging: Option<bool>,
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Connect to the chat gateway and start watching (default).
    Run,
    /// Operations on the stored typing record.
    Record {
        #[command(subcommand)]
        command: RecordCommand,
    },
}

#[derive(Subcommand, Debug)]
pub enum RecordCommand {
    /// Print the stored record.
    Show,
}

//! CLI definitions and plumbing.

use std::path::Path;

use clap::{ArgAction, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Increase logging verbosity (repeatable)
    #[arg(short = 'v', long, action = ArgAction::Count, global = true)]
    pub verbose: u8,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Resolve every call in a fixture and print the references
    Resolve {
        fixture: Box<Path>,
        /// Language settings overriding the fixture's own
        #[arg(short = 's', long)]
        settings: Option<Box<Path>>,
    },
    /// Print the scope tower a fixture describes
    DumpTower { fixture: Box<Path> },
}

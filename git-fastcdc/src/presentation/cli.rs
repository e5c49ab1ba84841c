use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(author, version, about = "Content-defined chunking filter for git", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Configure the filter in the current repository
    Install,
    /// Deconfigure the filter and drop its attribute lines
    Remove,
    /// Serve the long-running filter protocol on stdin/stdout (called by git)
    Process,
    /// Delete chunk files no longer referenced by any tracked manifest
    Prune,
}

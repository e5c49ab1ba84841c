pub mod handlers;

use clap::Parser;
use fastcdc_core::{GitStore, ObjectStore, Result};
use tracing_subscriber::EnvFilter;

use crate::presentation::cli::{Cli, Commands};

pub fn run() -> Result<()> {
    // stdout carries the packet protocol; diagnostics go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let git = GitStore::new();
    // Every subcommand operates relative to the repository root.
    std::env::set_current_dir(git.repo_root()?)?;
    match cli.command {
        Commands::Install => handlers::handle_install(&git),
        Commands::Remove => handlers::handle_remove(&git),
        Commands::Process => handlers::handle_process(&git),
        Commands::Prune => handlers::handle_prune(&git),
    }
}

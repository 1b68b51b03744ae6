pub mod calc;
pub mod collection;
pub mod db;
pub mod find;
pub mod genome;
pub mod query;

use std::path::PathBuf;

use anyhow::{Context, Result};
use log::debug;

use crate::cli::{Cli, Commands};
use crate::config::{current_db_path, ConfigHandle};
use crate::db::{describe_source, Database};
use crate::errors::KmerDbError;

pub fn dispatch_command(cli: Cli) -> Result<()> {
    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    // Allow re-init of the logger for tests.
    let _ = env_logger::Builder::new().filter_level(log_level).try_init();

    match cli.command {
        Commands::Find(args) => find::run_find(args),
        Commands::Db(cmd) => db::run_db(cmd, &cli.db),
        Commands::Genome(cmd) => genome::run_genome(cmd, &cli.db),
        Commands::GenomeSet(cmd) => genome::run_genome_set(cmd, &cli.db),
        Commands::Collection(cmd) => collection::run_collection(cmd, &cli.db),
        Commands::Calc(args) => calc::run_calc(args, cli.threads, &cli.db),
        Commands::Query(args) => query::run_query(args, cli.threads, &cli.db),
    }
}

/// The registry in the user config directory.
pub(crate) fn config_handle() -> Result<ConfigHandle> {
    ConfigHandle::default_location()
        .map(ConfigHandle::new)
        .context("Could not determine the user config directory")
}

/// Opens the database this invocation should work on: the `--db` flag
/// when given, otherwise the standard lookup order.
pub(crate) fn open_current_db(db_flag: &Option<PathBuf>) -> Result<Database> {
    if let Some(path) = db_flag {
        return Database::open(path);
    }
    let config = config_handle()?;
    let cwd = std::env::current_dir()?;
    let (path, source) =
        current_db_path(&cwd, &config)?.ok_or(KmerDbError::NoCurrentDatabase)?;
    debug!("Using database at {:?} ({})", path, describe_source(source));
    Database::open(&path)
}

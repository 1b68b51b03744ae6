//! Database directory management and the registered-database registry.

use std::path::PathBuf;

use anyhow::{Context, Result};
use log::info;

use crate::cli::DbCommands;
use crate::db::{db_version, is_db_directory, Database, CURRENT_DB_VERSION};
use crate::errors::KmerDbError;

use super::{config_handle, open_current_db};

pub fn run_db(cmd: DbCommands, db_flag: &Option<PathBuf>) -> Result<()> {
    match cmd {
        DbCommands::Init { path, overwrite } => {
            let db = Database::create(&path, overwrite)?;
            println!(
                "Created k-mer database (version {}) at {:?}",
                CURRENT_DB_VERSION,
                db.directory()
            );
            Ok(())
        }

        DbCommands::Info => {
            let db = open_current_db(db_flag)?;
            let catalog = db.catalog()?;
            let counts = catalog.table_counts()?;
            let revision = catalog.schema_revision()?;
            println!("Database:        {:?}", db.directory());
            println!("Version:         {}", db_version(db.directory())?);
            println!(
                "Schema revision: {}",
                revision.as_deref().unwrap_or("(unrecorded)")
            );
            println!("Genomes:         {}", counts.genomes);
            println!("Genome sets:     {}", counts.genome_sets);
            println!("Collections:     {}", counts.collections);
            println!("K-mer sets:      {}", counts.kmer_sets);
            Ok(())
        }

        DbCommands::Register {
            name,
            path,
            default,
        } => {
            let path = std::fs::canonicalize(&path)
                .with_context(|| format!("Cannot resolve {path:?}"))?;
            if !is_db_directory(&path) {
                return Err(KmerDbError::NotADatabase(path).into());
            }
            let config = config_handle()?;
            config.register(&name, &path)?;
            if default {
                config.set_default(&name)?;
            }
            info!("Registered database {name:?} at {path:?}");
            println!("Registered {name:?}");
            Ok(())
        }

        DbCommands::Unregister { name } => {
            config_handle()?.unregister(&name)?;
            println!("Unregistered {name:?}");
            Ok(())
        }

        DbCommands::SetDefault { name } => {
            config_handle()?.set_default(&name)?;
            println!("Default database is now {name:?}");
            Ok(())
        }

        DbCommands::List => {
            let entries = config_handle()?.list()?;
            if entries.is_empty() {
                println!("No databases registered");
                return Ok(());
            }
            for (name, path, is_default) in entries {
                let marker = if is_default { "*" } else { " " };
                println!("{marker} {name}: {}", path.display());
            }
            Ok(())
        }
    }
}

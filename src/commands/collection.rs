//! K-mer collection management.

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde_json::json;

use crate::cli::{CollectionCommands, CollectionCreateArgs};
use crate::db::CollectionOptions;
use crate::store::StorageFormatKind;

use super::open_current_db;

pub fn run_collection(cmd: CollectionCommands, db_flag: &Option<PathBuf>) -> Result<()> {
    match cmd {
        CollectionCommands::Create(args) => run_create(args, db_flag),
        CollectionCommands::List => {
            let db = open_current_db(db_flag)?;
            let catalog = db.catalog()?;
            for collection in catalog.list_collections()? {
                let sets = catalog.kmer_set_count(collection.id)?;
                println!(
                    "{}: [{} - {}] \"{}\" ({} calculated sets)",
                    collection.id, collection.k, collection.prefix, collection.title, sets
                );
            }
            Ok(())
        }
        CollectionCommands::Rm { id } => {
            let db = open_current_db(db_flag)?;
            let collection = db.catalog()?.collection(id)?;
            db.remove_kmer_collection(&collection)?;
            println!("Removed k-mer collection \"{}\"", collection.title);
            Ok(())
        }
    }
}

fn run_create(args: CollectionCreateArgs, db_flag: &Option<PathBuf>) -> Result<()> {
    let db = open_current_db(db_flag)?;
    let format = StorageFormatKind::parse(&args.format)?;
    let parameters = args
        .parameters
        .as_deref()
        .map(serde_json::from_str)
        .transpose()
        .context("--parameters is not valid JSON")?
        .unwrap_or_else(|| json!({}));

    let collection = db.create_kmer_collection(&CollectionOptions {
        title: args.title,
        prefix: args.prefix,
        k: args.k,
        format,
        parameters,
    })?;
    println!(
        "K-mer collection \"{}\" created with ID {}",
        collection.title, collection.id
    );
    Ok(())
}

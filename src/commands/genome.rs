//! Genome import, listing and removal, plus genome-set management.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};

use crate::cli::{GenomeAddArgs, GenomeCommands, GenomeSetCommands};
use crate::db::catalog::{Compression, NewGenome};
use crate::db::GenomeImportOptions;
use crate::genbank::is_accession;
use crate::parse::inspect_seq_file;

use super::open_current_db;

pub fn run_genome(cmd: GenomeCommands, db_flag: &Option<PathBuf>) -> Result<()> {
    match cmd {
        GenomeCommands::Add(args) => run_genome_add(args, db_flag),
        GenomeCommands::List => {
            let db = open_current_db(db_flag)?;
            for genome in db.catalog()?.list_genomes()? {
                let organism = genome.organism.as_deref().unwrap_or("-");
                println!(
                    "{}: \"{}\" [{}] ({})",
                    genome.id, genome.description, organism, genome.filename
                );
            }
            Ok(())
        }
        GenomeCommands::Rm { id } => {
            let db = open_current_db(db_flag)?;
            let genome = db.catalog()?.genome(id)?;
            db.remove_genome(&genome)?;
            println!("Removed genome \"{}\"", genome.description);
            Ok(())
        }
    }
}

fn run_genome_add(args: GenomeAddArgs, db_flag: &Option<PathBuf>) -> Result<()> {
    let db = open_current_db(db_flag)?;
    let info = inspect_seq_file(&args.src);

    let src_compression = match &args.src_compression {
        Some(s) => Compression::parse(s)?,
        None if info.gzip => Compression::Gzip,
        None => Compression::None,
    };
    // Stored in the source's compression unless asked otherwise.
    let compression = match &args.compression {
        Some(s) => Compression::parse(s)?,
        None => src_compression,
    };

    let file_format = match args.format {
        Some(format) => format,
        None => info
            .format
            .context("Could not infer the file format; pass --format")?
            .to_string(),
    };
    if file_format != "fasta" {
        bail!("Unsupported file format {file_format:?}; only fasta genomes can be stored");
    }

    if let Some(acc) = &args.gb_acc {
        if !is_accession(acc) {
            log::warn!("{acc:?} does not look like a GenBank accession");
        }
    }

    let extra = args
        .extra
        .as_deref()
        .map(serde_json::from_str)
        .transpose()
        .context("--extra is not valid JSON")?;

    let new = NewGenome {
        description: args.description,
        organism: args.organism,
        gb_db: args.gb_db,
        gb_id: args.gb_id,
        gb_acc: args.gb_acc,
        gb_summary: None,
        gb_taxid: args.taxid,
        tax_genus: args.genus,
        tax_species: args.species,
        tax_strain: args.strain,
        file_format,
        compression,
        is_assembled: args.assembled,
        extra,
    };
    let options = GenomeImportOptions {
        src_compression,
        keep_src: !args.r#move,
        genome_sets: args.genome_sets,
    };

    let genome = db.store_genome(&args.src, &new, &options)?;
    println!(
        "Imported genome \"{}\" with id {} as {:?}",
        genome.description, genome.id, genome.filename
    );
    Ok(())
}

pub fn run_genome_set(cmd: GenomeSetCommands, db_flag: &Option<PathBuf>) -> Result<()> {
    match cmd {
        GenomeSetCommands::Create { name, description } => {
            let db = open_current_db(db_flag)?;
            let set = db
                .catalog()?
                .insert_genome_set(&name, description.as_deref(), None)?;
            println!("Created genome set \"{}\" with id {}", set.name, set.id);
            Ok(())
        }
        GenomeSetCommands::List => {
            let db = open_current_db(db_flag)?;
            for set in db.catalog()?.list_genome_sets()? {
                let description = set.description.as_deref().unwrap_or("-");
                println!("{}: \"{}\" ({})", set.id, set.name, description);
            }
            Ok(())
        }
    }
}

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[clap(author, version, about = "Whole-genome prefix-indexed k-mer databases", long_about = None)]
#[clap(propagate_version = true)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,

    #[clap(
        short,
        long,
        global = true,
        default_value_t = 0,
        help = "Number of threads to use (0 for all logical cores)"
    )]
    pub threads: usize,

    #[clap(short, long, global = true, action = clap::ArgAction::Count, help = "Verbosity level (e.g., -v, -vv)")]
    pub verbose: u8,

    #[clap(
        long,
        global = true,
        help = "Database directory (overrides the usual lookup rules)"
    )]
    pub db: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Find k-mers in a sequence file without a database
    Find(FindArgs),
    /// Manage database directories and the registry
    #[clap(subcommand)]
    Db(DbCommands),
    /// Manage stored reference genomes
    #[clap(subcommand)]
    Genome(GenomeCommands),
    /// Manage named genome sets
    #[clap(subcommand)]
    GenomeSet(GenomeSetCommands),
    /// Manage reference k-mer collections
    #[clap(subcommand)]
    Collection(CollectionCommands),
    /// Calculate missing k-mer sets for a collection
    Calc(CalcArgs),
    /// Query sequences against a reference collection
    Query(QueryArgs),
}

/// Output modes of the find command; exactly one applies.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum FindOutput {
    /// Sorted list of distinct k-mer suffixes
    List,
    /// K-mer suffixes with occurrence counts, most frequent first
    Counts,
    /// Histogram of occurrence counts
    Hist,
    /// Raw boolean vector over the whole index space
    Bool,
}

#[derive(Parser, Debug)]
pub struct FindArgs {
    #[clap(short, long, default_value_t = 16, help = "Length of k-mers to find, prefix included")]
    pub k: usize,

    #[clap(
        short = 'q',
        long,
        default_value = "ATGAC",
        help = "K-mers must start with this sequence"
    )]
    pub prefix: String,

    #[clap(
        short = 'Q',
        long,
        help = "Filter k-mers containing PHRED scores below this value"
    )]
    pub threshold: Option<u8>,

    #[clap(short, long, value_enum, default_value_t = FindOutput::List, help = "Output mode")]
    pub output: FindOutput,

    #[clap(short, long, help = "Process every sequence file in the source directory")]
    pub batch: bool,

    #[clap(long, help = "Overwrite existing output files")]
    pub overwrite: bool,

    #[clap(short, long, help = "Display progress")]
    pub progress: bool,

    #[clap(help = "Source sequence file (or directory in batch mode)")]
    pub src: PathBuf,

    #[clap(help = "Output file (or directory in batch mode); stdout when omitted")]
    pub dest: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum DbCommands {
    /// Create a new database directory
    Init {
        #[clap(help = "Directory to create the database in")]
        path: PathBuf,
        #[clap(long, help = "Clear database files already present in the directory")]
        overwrite: bool,
    },
    /// Show the current database and its contents
    Info,
    /// Register a database directory under a name
    Register {
        name: String,
        path: PathBuf,
        #[clap(long, help = "Also make this the default database")]
        default: bool,
    },
    /// Remove a registration
    Unregister { name: String },
    /// Make a registered database the default
    SetDefault { name: String },
    /// List registered databases
    List,
}

#[derive(Subcommand, Debug)]
pub enum GenomeCommands {
    /// Import a genome file into the database
    Add(GenomeAddArgs),
    /// List stored genomes
    List,
    /// Remove a genome and its stored file
    Rm {
        #[clap(help = "Genome id (as shown by genome list)")]
        id: i64,
    },
}

#[derive(Parser, Debug)]
pub struct GenomeAddArgs {
    #[clap(help = "Sequence file to import")]
    pub src: PathBuf,

    #[clap(short, long, required = true, help = "Unique description of the genome")]
    pub description: String,

    #[clap(
        long,
        required = true,
        action = clap::ArgAction::Set,
        help = "Whether the sequence is an assembled genome (true|false)"
    )]
    pub assembled: bool,

    #[clap(long, help = "Organism name")]
    pub organism: Option<String>,

    #[clap(long, help = "External archive database name (e.g. nuccore, assembly)")]
    pub gb_db: Option<String>,

    #[clap(long, help = "External archive numeric id")]
    pub gb_id: Option<i64>,

    #[clap(long, help = "External archive accession")]
    pub gb_acc: Option<String>,

    #[clap(long, help = "Taxonomy id")]
    pub taxid: Option<i64>,

    #[clap(long, help = "Genus")]
    pub genus: Option<String>,

    #[clap(long, help = "Species")]
    pub species: Option<String>,

    #[clap(long, help = "Strain")]
    pub strain: Option<String>,

    #[clap(
        long,
        help = "Stored file format (inferred from the file name when omitted; must be fasta)"
    )]
    pub format: Option<String>,

    #[clap(
        long,
        help = "Compression to store the blob with (none|gzip; source compression when omitted)"
    )]
    pub compression: Option<String>,

    #[clap(
        long,
        help = "Compression of the source file (none|gzip; inferred from the file name when omitted)"
    )]
    pub src_compression: Option<String>,

    #[clap(long, help = "Move the source file instead of copying it")]
    pub r#move: bool,

    #[clap(long = "set", help = "Genome set(s) to join, by name")]
    pub genome_sets: Vec<String>,

    #[clap(long, help = "Opaque extra JSON attached to the genome row")]
    pub extra: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum GenomeSetCommands {
    /// Create a named genome set
    Create {
        name: String,
        #[clap(long, help = "Optional description")]
        description: Option<String>,
    },
    /// List genome sets
    List,
}

#[derive(Subcommand, Debug)]
pub enum CollectionCommands {
    /// Create a new k-mer collection
    Create(CollectionCreateArgs),
    /// List k-mer collections
    List,
    /// Remove a collection and every set computed under it
    Rm {
        #[clap(help = "Collection id (as shown by collection list)")]
        id: i64,
    },
}

#[derive(Parser, Debug)]
pub struct CollectionCreateArgs {
    #[clap(help = "Length of k-mers to find, INCLUDING prefix")]
    pub k: usize,

    #[clap(help = "Nucleotide sequence k-mers must start with")]
    pub prefix: String,

    #[clap(help = "Unique title for the collection")]
    pub title: String,

    #[clap(long, default_value = "coords", help = "Storage format (raw|coords)")]
    pub format: String,

    #[clap(long, help = "Free-form parameters JSON recorded on the collection")]
    pub parameters: Option<String>,
}

#[derive(Parser, Debug)]
pub struct CalcArgs {
    #[clap(help = "Collection id (as shown by collection list)")]
    pub collection_id: i64,

    #[clap(short, long, help = "Display progress")]
    pub progress: bool,
}

#[derive(Parser, Debug)]
pub struct QueryArgs {
    #[clap(help = "Collection id (as shown by collection list)")]
    pub collection_id: i64,

    #[clap(help = "Query sequence file, or a directory of sequence files")]
    pub src: PathBuf,

    #[clap(
        short = 'q',
        long,
        help = "Filter k-mers in the query containing PHRED scores below this value"
    )]
    pub q_threshold: Option<u8>,

    #[clap(
        short = 'c',
        long,
        default_value_t = 1,
        help = "Keep k-mers occurring at least this many times in the query"
    )]
    pub c_threshold: u32,

    #[clap(
        short,
        long,
        default_value = "all",
        help = "Query metric to use (hamming|jaccard|asym_jacc|all)"
    )]
    pub metric: String,

    #[clap(short, long, default_value_t = 10, help = "Number of results per query and metric")]
    pub n_results: usize,

    #[clap(long, help = "Write the ranked match table to a CSV file")]
    pub csv: Option<PathBuf>,

    #[clap(long, help = "Don't print results to stdout")]
    pub no_print: bool,

    #[clap(short, long, help = "Display progress")]
    pub progress: bool,
}

pub fn parse_cli() -> Cli {
    Cli::parse()
}

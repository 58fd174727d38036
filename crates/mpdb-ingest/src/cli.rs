//! Command-line interface definition

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// MPDB ingest - curate membrane protein structures from public databases
#[derive(Parser, Debug)]
#[command(name = "mpdb-ingest")]
#[command(author, version, about, long_about = None)]
#[command(arg_required_else_help = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Verbose output (debug level)
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Pipeline configuration file
#[derive(Args, Debug, Clone)]
pub struct ConfigArg {
    /// Path to the JSON configuration
    #[arg(short, long, env = "MPDB_CONFIG", default_value = crate::config::DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Search, curate and write the dataset
    Run {
        #[command(flatten)]
        config: ConfigArg,
    },

    /// Run the configured search and print the matching entries
    Search {
        #[command(flatten)]
        config: ConfigArg,
    },

    /// Print the query tree an expression compiles to, without searching
    Compile {
        /// Take the expression and labels from a configuration file
        #[arg(short, long, conflicts_with_all = ["expression", "parameters"], required_unless_present = "expression")]
        config: Option<PathBuf>,

        /// Boolean label expression, e.g. "(A & B) | C"
        #[arg(short, long, requires = "parameters")]
        expression: Option<String>,

        /// JSON list of {"label", "parameters"} objects
        #[arg(short, long, requires = "expression")]
        parameters: Option<PathBuf>,
    },

    /// Curate a given list of entries, skipping the search
    Curate {
        #[command(flatten)]
        config: ConfigArg,

        /// Comma-separated PDB identifiers
        #[arg(short, long, value_delimiter = ',', required = true)]
        entries: Vec<String>,
    },

    /// Run a UniProt SPARQL query and print the bindings
    Uniprot {
        /// File holding the SPARQL query; `$entries` is replaced by the entries
        #[arg(short, long)]
        query: PathBuf,

        /// Comma-separated entries bound into the query
        #[arg(short, long, value_delimiter = ',')]
        entries: Vec<String>,

        /// SPARQL endpoint
        #[arg(long, env = "MPDB_UNIPROT_ENDPOINT")]
        endpoint: Option<String>,
    },

    /// Fetch AlphaFold predictions for UniProt accessions
    Alphafold {
        /// Comma-separated UniProt accessions
        #[arg(short, long, value_delimiter = ',', required = true)]
        accessions: Vec<String>,

        /// Also download the predicted models into this directory
        #[arg(short, long)]
        download: Option<PathBuf>,

        /// AlphaFold DB base URL
        #[arg(long, env = "MPDB_ALPHAFOLD_ENDPOINT")]
        endpoint: Option<String>,
    },
}

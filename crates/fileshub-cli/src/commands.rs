use clap::{ArgGroup, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "fileshub")]
#[command(about = "Catalog documents and quarantine their duplicates", long_about = None)]
pub struct Cli {
    /// Database file (overrides `database_path` from the configuration)
    #[arg(long, global = true, value_name = "PATH")]
    pub db: Option<String>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Add files and directories to the catalog, quarantining duplicates
    Add {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        /// Also write the duplicates found to a CSV file
        #[arg(long, value_name = "FILE")]
        csv: Option<PathBuf>,
    },
    /// Re-examine every catalogued file for changes
    Update {
        #[arg(long, value_name = "FILE")]
        csv: Option<PathBuf>,
    },
    /// Declare DUPLICATE a duplicate of OF, whatever their content
    Duplicate {
        duplicate: PathBuf,
        of: PathBuf,
    },
    /// Print content hashes without touching the database
    Hash {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Look documents up in the catalog and the quarantine
    #[command(group(ArgGroup::new("query").required(true).args(["id", "hash", "filename", "path"])))]
    Search {
        #[arg(long)]
        id: Option<i64>,
        #[arg(long)]
        hash: Option<String>,
        /// Filename pattern; `*` matches anything
        #[arg(long)]
        filename: Option<String>,
        /// Path pattern; `*` matches anything
        #[arg(long)]
        path: Option<String>,
    },
    /// Print configuration values
    PrintConfig,
}

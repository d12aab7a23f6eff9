mod commands;
mod logging;
mod progress;

use std::path::{Path, PathBuf};
use std::process;

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use clap::{CommandFactory, Parser};
use colored::*;
use commands::{Cli, Commands};
use dotenv::dotenv;
use fileshub_core::hasher::{hash_files, hash_pool};
use fileshub_core::scanner::collect_files;
use fileshub_core::{
    AppConfig, BatchResult, DedupEngine, Document, DuplicateReport, FsFingerprinter,
    SearchQuery,
};
use progress::CliReporter;
use tracing::{error, info};

fn main() {
    dotenv().ok();

    let _guard = logging::init_logger();

    let mut config = match fileshub_core::config::load_configuration() {
        Ok(config) => config,
        Err(err) => {
            error!("Error loading configuration: {}", err);
            process::exit(1);
        }
    };

    let args = Cli::parse();
    if let Some(db) = args.db {
        config.database_path = db;
    }

    let outcome = match args.command {
        Some(Commands::Add { paths, csv }) => run_add(&config, &paths, csv.as_deref()),
        Some(Commands::Update { csv }) => run_update(&config, csv.as_deref()),
        Some(Commands::Duplicate { duplicate, of }) => run_duplicate(&config, &duplicate, &of),
        Some(Commands::Hash { paths }) => run_hash(&config, &paths),
        Some(Commands::Search {
            id,
            hash,
            filename,
            path,
        }) => {
            let query = match (id, hash, filename, path) {
                (Some(id), _, _, _) => SearchQuery::ById(id),
                (_, Some(hash), _, _) => SearchQuery::ByHash(hash),
                (_, _, Some(pattern), _) => SearchQuery::ByFilename(pattern),
                (_, _, _, Some(pattern)) => SearchQuery::ByPath(pattern),
                (None, None, None, None) => {
                    let _ = Cli::command().print_long_help();
                    return;
                }
            };
            run_search(&config, &query)
        }
        Some(Commands::PrintConfig) => {
            println!("Configuration: {:?}", config);
            Ok(())
        }
        None => {
            let _ = Cli::command().print_long_help();
            Ok(())
        }
    };

    if let Err(err) = outcome {
        error!("Error: {:#}", err);
        process::exit(1);
    }
}

fn open_engine(config: &AppConfig) -> Result<DedupEngine> {
    DedupEngine::open(config)
        .with_context(|| format!("Failed to open database {}", config.database_path))
}

fn run_add(config: &AppConfig, inputs: &[PathBuf], csv: Option<&Path>) -> Result<()> {
    let paths = collect_files(inputs, &config.ignore_patterns);
    info!("{} files to add", format!("{}", paths.len()).cyan());

    let engine = open_engine(config)?;
    let mut report = DuplicateReport::new();
    let result = engine.add_files(&paths, &mut report, &CliReporter::new())?;
    finish_batch(&engine, &result, &report, csv)
}

fn run_update(config: &AppConfig, csv: Option<&Path>) -> Result<()> {
    let engine = open_engine(config)?;
    let mut report = DuplicateReport::new();
    let result = engine.rescan_all(&mut report, &CliReporter::new())?;
    finish_batch(&engine, &result, &report, csv)
}

fn finish_batch(
    engine: &DedupEngine,
    result: &BatchResult,
    report: &DuplicateReport,
    csv: Option<&Path>,
) -> Result<()> {
    println!();
    report.display();
    if let Some(csv) = csv {
        report
            .write_csv(csv)
            .with_context(|| format!("Failed to write {}", csv.display()))?;
        info!("Duplicates written to {}", csv.display());
    }

    let (catalogued, quarantined) = engine.store_counts()?;
    info!(
        "Catalog: {} documents, quarantine: {} duplicates ({:.2}s)",
        format!("{}", catalogued).green(),
        format!("{}", quarantined).red(),
        result.duration.as_secs_f64(),
    );
    Ok(())
}

fn run_duplicate(config: &AppConfig, duplicate: &Path, original: &Path) -> Result<()> {
    let engine = open_engine(config)?;
    let mut report = DuplicateReport::new();
    let outcome = engine.mark_duplicate(duplicate, original, &mut report)?;
    println!(
        "{} -> {}: {:?}",
        duplicate.display(),
        original.display(),
        outcome
    );
    Ok(())
}

fn run_hash(config: &AppConfig, inputs: &[PathBuf]) -> Result<()> {
    let paths = collect_files(inputs, &config.ignore_patterns);
    let fingerprinter = FsFingerprinter::new(config.hash_algorithm);
    let pool = hash_pool(config.hash_workers)?;
    for (path, digest) in hash_files(&fingerprinter, &paths, &pool) {
        match digest {
            Ok(digest) => println!("{}  {}", digest, path.display()),
            Err(err) => eprintln!("{}  {}", "unreadable".yellow(), err),
        }
    }
    Ok(())
}

fn run_search(config: &AppConfig, query: &SearchQuery) -> Result<()> {
    let engine = open_engine(config)?;
    let found = engine.search(query)?;
    if found.is_empty() {
        println!("No document found.");
        return Ok(());
    }
    for doc in &found {
        print_document(doc);
    }
    Ok(())
}

fn print_document(doc: &Document) {
    let modified = DateTime::from_timestamp_millis(doc.last_modified)
        .map(|t| t.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| doc.last_modified.to_string());
    let status = match doc.duplicate_of() {
        None => format!("catalog #{}", doc.id).green(),
        Some(original) => format!("quarantine #{} (duplicate of #{})", doc.id, original).red(),
    };
    println!("{}", status);
    println!("  path:     {}", doc.canonical_path);
    println!("  modified: {}", modified);
    println!("  hash:     {}", doc.content_hash);
    if let Some(comment) = &doc.comment {
        println!("  comment:  {}", comment);
    }
}

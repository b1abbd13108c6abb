use anyhow::Result;
use clap::{Parser, Subcommand};
use pubscout_core::{DocumentRecord, Engine, SearchConfig};
use serde_json::Value;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::{fmt, EnvFilter};
use walkdir::WalkDir;

#[derive(Parser)]
#[command(name = "pubscout-indexer")]
#[command(about = "Build and refresh the publications search index", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest record files and commit a segment checkpoint
    Build {
        /// Input path: a JSONL/JSON file or a directory of them
        #[arg(long)]
        input: String,
        /// Engine data directory (record log + segments)
        #[arg(long, default_value = "./data")]
        data_dir: String,
        /// Ranking configuration file (JSON), defaults otherwise
        #[arg(long)]
        config: Option<String>,
    },
    /// Run ingest-then-checkpoint repeatedly on a fixed cadence
    Refresh {
        #[arg(long)]
        input: String,
        #[arg(long, default_value = "./data")]
        data_dir: String,
        #[arg(long)]
        config: Option<String>,
        /// Seconds between cycles
        #[arg(long, default_value_t = 3600)]
        interval_secs: u64,
    },
    /// Rebuild the segment from the record log, recovering a corrupt index
    Rebuild {
        #[arg(long, default_value = "./data")]
        data_dir: String,
        #[arg(long)]
        config: Option<String>,
    },
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Build {
            input,
            data_dir,
            config,
        } => {
            let engine = Engine::open(&data_dir, load_config(config.as_deref())?)?;
            run_batch(&engine, Path::new(&input))
        }
        Commands::Refresh {
            input,
            data_dir,
            config,
            interval_secs,
        } => {
            let engine = Engine::open(&data_dir, load_config(config.as_deref())?)?;
            loop {
                if let Err(err) = run_batch(&engine, Path::new(&input)) {
                    tracing::error!(%err, "refresh cycle failed, retrying next cycle");
                }
                tracing::info!(interval_secs, "sleeping until next refresh");
                std::thread::sleep(Duration::from_secs(interval_secs));
            }
        }
        Commands::Rebuild { data_dir, config } => {
            let engine = Engine::recover(&data_dir, load_config(config.as_deref())?)?;
            tracing::info!(docs = engine.stats().docs, "rebuild complete");
            Ok(())
        }
    }
}

fn load_config(path: Option<&str>) -> Result<SearchConfig> {
    Ok(match path {
        Some(p) => SearchConfig::load(p)?,
        None => SearchConfig::default(),
    })
}

#[derive(Default)]
struct BatchStats {
    ingested: usize,
    skipped: usize,
}

/// Ingest every record file under `input`, then commit one checkpoint for
/// the whole batch. Undecodable or malformed records are skipped and
/// counted, never fatal.
fn run_batch(engine: &Engine, input: &Path) -> Result<()> {
    let files = discover_inputs(input);
    if files.is_empty() {
        tracing::warn!(input = %input.display(), "no record files found");
    }

    let mut batch = BatchStats::default();
    for file in files {
        if file.extension().and_then(|s| s.to_str()) == Some("jsonl") {
            ingest_jsonl(engine, &file, &mut batch)?;
        } else {
            ingest_json(engine, &file, &mut batch)?;
        }
    }
    engine.checkpoint()?;
    tracing::info!(
        ingested = batch.ingested,
        skipped = batch.skipped,
        docs = engine.stats().docs,
        "batch committed"
    );
    Ok(())
}

fn discover_inputs(input: &Path) -> Vec<PathBuf> {
    if input.is_dir() {
        let mut files: Vec<PathBuf> = WalkDir::new(input)
            .into_iter()
            .filter_map(|e| e.ok())
            .map(|e| e.into_path())
            .filter(|p| {
                p.is_file()
                    && matches!(
                        p.extension().and_then(|s| s.to_str()),
                        Some("json") | Some("jsonl")
                    )
            })
            .collect();
        files.sort();
        files
    } else if input.is_file() {
        vec![input.to_path_buf()]
    } else {
        Vec::new()
    }
}

fn ingest_jsonl(engine: &Engine, file: &Path, batch: &mut BatchStats) -> Result<()> {
    let reader = BufReader::new(File::open(file)?);
    for (lineno, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<DocumentRecord>(&line) {
            Ok(record) => ingest_record(engine, record, batch)?,
            Err(err) => {
                batch.skipped += 1;
                tracing::warn!(file = %file.display(), line = lineno + 1, %err, "skipping undecodable record");
            }
        }
    }
    Ok(())
}

fn ingest_json(engine: &Engine, file: &Path, batch: &mut BatchStats) -> Result<()> {
    let json: Value = serde_json::from_reader(BufReader::new(File::open(file)?))?;
    match json {
        Value::Array(items) => {
            for item in items {
                ingest_value(engine, item, batch)?;
            }
        }
        item @ Value::Object(_) => ingest_value(engine, item, batch)?,
        _ => tracing::warn!(file = %file.display(), "unsupported json shape"),
    }
    Ok(())
}

fn ingest_value(engine: &Engine, value: Value, batch: &mut BatchStats) -> Result<()> {
    match serde_json::from_value::<DocumentRecord>(value) {
        Ok(record) => ingest_record(engine, record, batch),
        Err(err) => {
            batch.skipped += 1;
            tracing::warn!(%err, "skipping undecodable record");
            Ok(())
        }
    }
}

fn ingest_record(engine: &Engine, record: DocumentRecord, batch: &mut BatchStats) -> Result<()> {
    match engine.ingest(record) {
        Ok(()) => {
            batch.ingested += 1;
            Ok(())
        }
        Err(pubscout_core::Error::MalformedRecord(reason)) => {
            batch.skipped += 1;
            tracing::warn!(%reason, "skipping malformed record");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

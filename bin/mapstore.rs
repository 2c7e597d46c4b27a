use std::fs;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use mapstore::{Document, Index, IndexConfig, Mapping, RangeValue};
use serde_json::Value;
use tracing::info;

#[derive(Parser)]
#[command(name = "mapstore")]
#[command(about = "Document mapping and columnar segment storage", long_about = None)]
struct Args {
    /// Data directory for segments and the manifest
    #[arg(long, env = "MAPSTORE_DATA_DIR", default_value = "./data")]
    data_dir: PathBuf,

    /// Refresh automatically once this many documents are buffered
    #[arg(long, env = "MAPSTORE_MAX_BUFFERED_DOCS", default_value = "50000")]
    max_buffered_docs: usize,

    /// Merge the smallest segments once there are more than this
    #[arg(long, env = "MAPSTORE_MAX_SEGMENTS", default_value = "10")]
    max_segments: usize,

    /// Disable folding of update-only segments into their predecessors
    #[arg(long, env = "MAPSTORE_NO_UPDATE_FOLDING")]
    no_update_folding: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Define or extend the mapping from a JSON file
    Mapping { file: PathBuf },
    /// Print the current mapping
    ShowMapping,
    /// Index newline-delimited JSON documents
    Bulk {
        file: PathBuf,
        /// Field holding the document id; the line number is used when absent
        #[arg(long, default_value = "id")]
        id_field: String,
    },
    /// Partially update a document with a JSON object
    Update { id: String, changes: String },
    Delete { id: String },
    Get { id: String },
    /// Ids of documents whose field lies in [lo, hi]
    Search { field: String, lo: String, hi: String },
    /// Ids of documents whose field contains the term
    Term { field: String, term: String },
    /// Ids of documents whose doc value equals the value (JSON or a bare string)
    Value { field: String, value: String },
    /// List segments as JSON
    Segments,
    /// Merge down to at most this many segments
    ForceMerge {
        #[arg(default_value = "1")]
        max_segments: usize,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("MAPSTORE_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    info!("Starting mapstore v{}", mapstore::VERSION);

    let config = IndexConfig::persistent(&args.data_dir)
        .with_max_buffered_docs(args.max_buffered_docs)
        .with_max_segments(args.max_segments)
        .with_update_folding(!args.no_update_folding);
    let index = Index::open(config)
        .with_context(|| format!("opening index at {}", args.data_dir.display()))?;

    match args.command {
        Command::Mapping { file } => {
            let body = fs::read_to_string(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            index.define_mapping(Mapping::from_json_str(&body)?)?;
            // Commits the mapping
            index.refresh()?;
            println!("{}", serde_json::to_string_pretty(&index.mapping().to_json())?);
        }
        Command::ShowMapping => {
            println!("{}", serde_json::to_string_pretty(&index.mapping().to_json())?);
        }
        Command::Bulk { file, id_field } => {
            let reader = BufReader::new(
                fs::File::open(&file).with_context(|| format!("opening {}", file.display()))?,
            );
            let mut written = 0usize;
            for (line_no, line) in reader.lines().enumerate() {
                let line = line?;
                if line.trim().is_empty() {
                    continue;
                }
                let mut body: Value = serde_json::from_str(&line)
                    .with_context(|| format!("line {}", line_no + 1))?;
                let id = match body.as_object_mut().and_then(|o| o.remove(&id_field)) {
                    Some(Value::String(id)) => id,
                    Some(other) => other.to_string(),
                    None => line_no.to_string(),
                };
                let result = index
                    .index(Document::from_json(id, body)?)
                    .with_context(|| format!("line {}", line_no + 1))?;
                if result.is_change() {
                    written += 1;
                }
            }
            let sealed = index.refresh()?;
            info!(written, sealed, "Bulk load complete");
        }
        Command::Update { id, changes } => {
            let changes = match serde_json::from_str(&changes)? {
                Value::Object(map) => map,
                _ => bail!("update body must be a JSON object"),
            };
            let result = index.update(&id, &changes)?;
            index.refresh()?;
            println!("{}", serde_json::to_string(&result)?);
        }
        Command::Delete { id } => {
            let result = index.delete(&id)?;
            index.refresh()?;
            println!("{}", serde_json::to_string(&result)?);
        }
        Command::Get { id } => match index.get(&id)? {
            Some(doc) => println!("{}", serde_json::to_string_pretty(&doc)?),
            None => bail!("document [{}] not found", id),
        },
        Command::Search { field, lo, hi } => {
            let ids = index.search(&field, parse_bound(&lo)?, parse_bound(&hi)?)?;
            println!("{}", serde_json::to_string(&ids)?);
        }
        Command::Term { field, term } => {
            let ids = index.term_search(&field, &term)?;
            println!("{}", serde_json::to_string(&ids)?);
        }
        Command::Value { field, value } => {
            let value = serde_json::from_str(&value).unwrap_or(Value::String(value));
            let ids = index.value_search(&field, value)?;
            println!("{}", serde_json::to_string(&ids)?);
        }
        Command::Segments => {
            println!("{}", serde_json::to_string_pretty(&index.list_segments())?);
        }
        Command::ForceMerge { max_segments } => {
            let merged = index.force_merge(max_segments)?;
            info!(merged, "Force merge complete");
        }
    }

    Ok(())
}

fn parse_bound(raw: &str) -> Result<RangeValue> {
    if let Ok(v) = raw.parse::<i64>() {
        return Ok(RangeValue::Long(v));
    }
    raw.parse::<f64>()
        .map(RangeValue::Double)
        .with_context(|| format!("invalid range bound [{}]", raw))
}

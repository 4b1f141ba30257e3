use std::fs::File;
use std::io::{self, BufReader, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use assessrec::catalog::read_catalog;
use assessrec::embedder::{embed_all, normalize};
use assessrec::{logging, EmbedderArgs, FlatIndex, IndexArgs, IndexedAssessment, PgVectorIndex};
use clap::Parser;
use tokio::runtime::Runtime;
use tracing::info;

#[derive(Parser, Debug)]
#[command(
    name = "assessrec-index",
    about = "Embed the cleaned catalog and write a flat index or load a pgvector table"
)]
struct IndexCli {
    /// Cleaned catalog CSV
    #[arg(long, env = "ASSESSREC_CATALOG", default_value = "data/catalog_clean.csv")]
    catalog: PathBuf,

    #[command(flatten)]
    embedder: EmbedderArgs,

    #[command(flatten)]
    index: IndexArgs,

    /// Create the vector extension/table automatically if missing
    #[arg(long, env = "ASSESSREC_PG_PREPARE", default_value_t = true, action = clap::ArgAction::Set)]
    prepare_table: bool,

    /// Number of rows upserted per transaction
    #[arg(long, env = "ASSESSREC_PG_BATCH", default_value_t = 128)]
    upsert_batch: usize,

    /// Log at debug level
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let cli = IndexCli::parse();
    logging::init(cli.verbose);

    let file =
        File::open(&cli.catalog).with_context(|| format!("failed to open {:?}", cli.catalog))?;
    let records = read_catalog(BufReader::new(file))?;
    anyhow::ensure!(!records.is_empty(), "catalog {:?} has no records", cli.catalog);

    let embedder = cli.embedder.build()?;
    let total = records.len();
    let mut entries = Vec::with_capacity(total);
    for chunk in records.chunks(embedder.batch_size().max(1)) {
        let texts: Vec<&str> = chunk.iter().map(|record| record.search_text.as_str()).collect();
        let embeddings = embed_all(embedder.as_ref(), &texts)?;
        for (record, mut embedding) in chunk.iter().cloned().zip(embeddings) {
            normalize(&mut embedding);
            entries.push(IndexedAssessment { record, embedding });
        }
        render_progress("Embedded", entries.len(), total)?;
    }
    println!();
    let index = FlatIndex::new(entries)?;
    info!(entries = index.len(), dims = index.dims(), model = embedder.model(), "embedded catalog");

    match cli.index.database_url.as_deref() {
        Some(database_url) => {
            let runtime = Runtime::new().context("failed to start tokio runtime")?;
            runtime.block_on(load_pgvector(&cli, database_url, index.entries(), index.dims()))?;
        }
        None => {
            FlatIndex::write(&cli.index.index_path, index.entries())?;
            info!(path = %cli.index.index_path.display(), "wrote flat index");
        }
    }
    Ok(())
}

async fn load_pgvector(
    cli: &IndexCli,
    database_url: &str,
    entries: &[IndexedAssessment],
    dims: usize,
) -> Result<()> {
    let table = cli.index.table_name()?;
    let qualified = table.qualified();
    let mut index = PgVectorIndex::connect(database_url, table).await?;
    if cli.prepare_table {
        index.prepare(dims).await?;
    }
    let mut loaded = 0usize;
    for batch in entries.chunks(cli.upsert_batch.max(1)) {
        index.upsert(batch).await?;
        loaded += batch.len();
        render_progress("Upserted", loaded, entries.len())?;
    }
    println!();
    info!(table = %qualified, rows = loaded, "loaded pgvector table");
    Ok(())
}

fn render_progress(verb: &str, done: usize, total: usize) -> Result<()> {
    let pct = if total == 0 {
        100.0
    } else {
        (done as f64 / total as f64) * 100.0
    };
    print!("\r{verb} {done}/{total} ({pct:.1}%)");
    io::stdout().flush()?;
    Ok(())
}

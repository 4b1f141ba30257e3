use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::PathBuf;

use anyhow::{Context, Result};
use assessrec::catalog::{clean_catalog, read_raw_rows, validate_catalog, write_catalog};
use assessrec::logging;
use clap::Parser;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(
    name = "assessrec-prepare",
    about = "Clean scraped catalog rows into the indexable catalog CSV"
)]
struct PrepareCli {
    /// Scraper CSV output
    #[arg(
        long,
        env = "ASSESSREC_SCRAPE_OUTPUT",
        default_value = "data/shl_individual_test_solutions.csv"
    )]
    input: PathBuf,

    /// Cleaned catalog CSV
    #[arg(long, env = "ASSESSREC_CATALOG", default_value = "data/catalog_clean.csv")]
    output: PathBuf,

    /// Fail instead of warning when validation finds problems
    #[arg(long, default_value_t = false)]
    strict: bool,

    /// Log at debug level
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let cli = PrepareCli::parse();
    logging::init(cli.verbose);

    let input =
        File::open(&cli.input).with_context(|| format!("failed to open {:?}", cli.input))?;
    let rows = read_raw_rows(BufReader::new(input))?;
    let records = clean_catalog(&rows);
    info!(
        raw = rows.len(),
        cleaned = records.len(),
        dropped = rows.len() - records.len(),
        "cleaned catalog"
    );

    let issues = validate_catalog(&records);
    for issue in &issues {
        warn!(%issue, "catalog validation");
    }
    anyhow::ensure!(
        !cli.strict || issues.is_empty(),
        "catalog failed validation with {} problem(s)",
        issues.len()
    );

    let output =
        File::create(&cli.output).with_context(|| format!("failed to create {:?}", cli.output))?;
    write_catalog(BufWriter::new(output), &records)?;
    info!(output = %cli.output.display(), records = records.len(), "wrote cleaned catalog");
    Ok(())
}

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use assessrec::eval::{read_queries, write_predictions, PredictionRow, EVAL_K};
use assessrec::{logging, RecommenderArgs};
use clap::Parser;
use tracing::info;

#[derive(Parser, Debug)]
#[command(
    name = "assessrec-predict",
    about = "Run the pipeline over unlabelled queries and write a Query,Assessment_url CSV"
)]
struct PredictCli {
    /// Test CSV; queries come from the `query` column or the first column
    #[arg(long, env = "ASSESSREC_TEST_DATA", default_value = "data/Test.csv")]
    queries: PathBuf,

    /// Predictions CSV
    #[arg(
        long,
        env = "ASSESSREC_PREDICTIONS",
        default_value = "submission/predictions.csv"
    )]
    output: PathBuf,

    #[command(flatten)]
    recommender: RecommenderArgs,

    /// Log at debug level
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = PredictCli::parse();
    logging::init(cli.verbose);

    let file =
        File::open(&cli.queries).with_context(|| format!("failed to open {:?}", cli.queries))?;
    let queries = read_queries(BufReader::new(file))?;
    anyhow::ensure!(!queries.is_empty(), "{:?} contains no queries", cli.queries);

    let recommender = cli.recommender.build().await?;
    let total = queries.len();
    let mut rows = Vec::new();
    for (idx, query) in queries.into_iter().enumerate() {
        let recommendation = recommender
            .recommend(&query, EVAL_K)
            .await
            .with_context(|| format!("pipeline failed for query {:?}", query))?;
        rows.extend(recommendation.items.iter().map(|item| PredictionRow {
            query: query.clone(),
            assessment_url: item.record.url.clone(),
        }));
        render_progress(idx + 1, total)?;
    }
    println!();

    if let Some(parent) = cli.output.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_context(|| format!("failed to create {:?}", parent))?;
    }
    let output =
        File::create(&cli.output).with_context(|| format!("failed to create {:?}", cli.output))?;
    write_predictions(BufWriter::new(output), &rows)?;
    info!(output = %cli.output.display(), rows = rows.len(), queries = total, "wrote predictions");
    Ok(())
}

fn render_progress(done: usize, total: usize) -> Result<()> {
    let pct = (done as f64 / total.max(1) as f64) * 100.0;
    print!("\rPredicted {done}/{total} ({pct:.1}%)");
    io::stdout().flush()?;
    Ok(())
}

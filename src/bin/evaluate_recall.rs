use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use assessrec::eval::{load_labelled_queries, CaseReport, EvalReport, EvalSummary, EVAL_K};
use assessrec::{logging, RecommenderArgs};
use clap::Parser;
use tracing::info;

#[derive(Parser, Debug)]
#[command(
    name = "assessrec-eval",
    about = "Measure Recall@10 of the recommendation pipeline against labelled queries"
)]
struct EvalCli {
    /// Labelled CSV with `query` and `assessment_url` columns
    #[arg(long, env = "ASSESSREC_EVAL_DATA", default_value = "data/Train.csv")]
    labelled: PathBuf,

    /// Optional JSON report output path
    #[arg(long, env = "ASSESSREC_EVAL_REPORT")]
    report_json: Option<PathBuf>,

    #[command(flatten)]
    recommender: RecommenderArgs,

    /// Log at debug level
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = EvalCli::parse();
    logging::init(cli.verbose);

    let file = File::open(&cli.labelled)
        .with_context(|| format!("failed to open {:?}", cli.labelled))?;
    let cases = load_labelled_queries(BufReader::new(file))?;
    anyhow::ensure!(!cases.is_empty(), "evaluation file contains no cases");
    info!(cases = cases.len(), "loaded labelled queries");

    let recommender = cli.recommender.build().await?;
    let mut reports = Vec::with_capacity(cases.len());
    for case in cases {
        let start = Instant::now();
        let recommendation = recommender
            .recommend(&case.query, EVAL_K)
            .await
            .with_context(|| format!("pipeline failed for query {:?}", case.query))?;
        let latency_ms = start.elapsed().as_secs_f64() * 1000.0;
        let predicted = recommendation
            .items
            .iter()
            .map(|item| item.record.url.clone())
            .collect();
        let report = CaseReport::new(case, predicted, EVAL_K, latency_ms);
        println!("Query: {}", report.query);
        println!("Recall@{EVAL_K}: {:.2}\n", report.recall);
        reports.push(report);
    }

    let report = EvalReport {
        summary: EvalSummary::from_cases(&reports, EVAL_K),
        cases: reports,
    };
    render_summary(&report.summary);
    if let Some(path) = cli.report_json {
        write_report(&report, &path)?;
        println!("wrote JSON report to {:?}", path);
    }
    Ok(())
}

fn render_summary(summary: &EvalSummary) {
    println!("--- Recall Evaluation Summary ---");
    println!("cases: {}", summary.total_cases);
    println!("mean recall@{}: {:.3}", summary.k, summary.mean_recall);
    println!("hit rate: {:.3}", summary.hit_rate);
    println!("mean reciprocal rank: {:.3}", summary.mean_reciprocal_rank);
    println!("avg pipeline latency (ms): {:.2}", summary.avg_latency_ms);
}

fn write_report(report: &EvalReport, path: &PathBuf) -> Result<()> {
    let file = File::create(path).with_context(|| format!("failed to create {:?}", path))?;
    serde_json::to_writer_pretty(file, report).context("failed to write JSON report")?;
    Ok(())
}

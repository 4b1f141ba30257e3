//! Offline evaluation: URL normalisation, Recall@K, labelled-set loading and prediction CSVs.

use std::collections::{HashMap, HashSet};
use std::io::{Read, Write};

use anyhow::{anyhow, Context, Result};
use serde::Serialize;

/// Cut-off used by the evaluation and prediction tools.
pub const EVAL_K: usize = 10;

/// Canonical assessment identifier: the last path segment of `url`, lower-cased, with any
/// query string and trailing slashes removed.
pub fn normalize_url(url: &str) -> String {
    let without_query = url.split('?').next().unwrap_or_default();
    without_query
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or_default()
        .to_lowercase()
}

/// Share of distinct true identifiers found among the first `k` predictions.
///
/// Returns 0.0 when `truth` normalises to an empty set.
pub fn recall_at_k<P, T>(predicted: &[P], truth: &[T], k: usize) -> f64
where
    P: AsRef<str>,
    T: AsRef<str>,
{
    let true_ids: HashSet<String> = truth.iter().map(|url| normalize_url(url.as_ref())).collect();
    if true_ids.is_empty() {
        return 0.0;
    }
    let predicted_ids: HashSet<String> = predicted
        .iter()
        .take(k)
        .map(|url| normalize_url(url.as_ref()))
        .collect();
    predicted_ids.intersection(&true_ids).count() as f64 / true_ids.len() as f64
}

/// A query and the assessment URLs labelled relevant for it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LabelledQuery {
    /// Query text exactly as it appears in the file.
    pub query: String,
    /// Relevant URLs in file order.
    pub relevant_urls: Vec<String>,
}

/// Reads a `query,assessment_url` CSV and groups rows by query in first-seen order.
///
/// Header names are matched after trimming and lower-casing.
pub fn load_labelled_queries<R: Read>(reader: R) -> Result<Vec<LabelledQuery>> {
    let mut csv = csv::Reader::from_reader(reader);
    let headers = normalized_headers(&mut csv)?;
    let query_col = column(&headers, "query")?;
    let url_col = column(&headers, "assessment_url")?;

    let mut groups: Vec<LabelledQuery> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();
    for (idx, row) in csv.records().enumerate() {
        let row = row.with_context(|| format!("invalid labelled row {}", idx + 2))?;
        let query = row.get(query_col).unwrap_or_default();
        let url = row.get(url_col).unwrap_or_default().trim();
        if query.trim().is_empty() || url.is_empty() {
            continue;
        }
        let slot = *positions.entry(query.to_string()).or_insert_with(|| {
            groups.push(LabelledQuery {
                query: query.to_string(),
                relevant_urls: Vec::new(),
            });
            groups.len() - 1
        });
        groups[slot].relevant_urls.push(url.to_string());
    }
    Ok(groups)
}

/// Reads unlabelled queries from the `query` column, or the first column when there is none.
/// Blank cells are skipped.
pub fn read_queries<R: Read>(reader: R) -> Result<Vec<String>> {
    let mut csv = csv::Reader::from_reader(reader);
    let headers = normalized_headers(&mut csv)?;
    let col = headers.iter().position(|h| h == "query").unwrap_or(0);
    let mut queries = Vec::new();
    for (idx, row) in csv.records().enumerate() {
        let row = row.with_context(|| format!("invalid query row {}", idx + 2))?;
        if let Some(query) = row.get(col).filter(|q| !q.trim().is_empty()) {
            queries.push(query.to_string());
        }
    }
    Ok(queries)
}

fn normalized_headers<R: Read>(csv: &mut csv::Reader<R>) -> Result<Vec<String>> {
    let headers = csv.headers().context("failed to read CSV header")?;
    Ok(headers
        .iter()
        .map(|header| header.trim().trim_start_matches('\u{feff}').trim().to_lowercase())
        .collect())
}

fn column(headers: &[String], name: &str) -> Result<usize> {
    headers
        .iter()
        .position(|header| header == name)
        .ok_or_else(|| anyhow!("missing `{name}` column (found {headers:?})"))
}

/// Per-query outcome.
#[derive(Debug, Clone, Serialize)]
pub struct CaseReport {
    /// Evaluated query.
    pub query: String,
    /// Labelled URLs.
    pub relevant_urls: Vec<String>,
    /// URLs returned by the pipeline, best first.
    pub predicted_urls: Vec<String>,
    /// Recall at the report's cut-off.
    pub recall: f64,
    /// 1-based rank of the first relevant prediction.
    pub best_rank: Option<usize>,
    /// Pipeline wall time.
    pub latency_ms: f64,
}

impl CaseReport {
    /// Scores `predicted` against the labelled case.
    pub fn new(case: LabelledQuery, predicted_urls: Vec<String>, k: usize, latency_ms: f64) -> Self {
        let recall = recall_at_k(&predicted_urls, &case.relevant_urls, k);
        let relevant: HashSet<String> = case
            .relevant_urls
            .iter()
            .map(|url| normalize_url(url))
            .collect();
        let best_rank = predicted_urls
            .iter()
            .take(k)
            .position(|url| relevant.contains(&normalize_url(url)))
            .map(|idx| idx + 1);
        Self {
            query: case.query,
            relevant_urls: case.relevant_urls,
            predicted_urls,
            recall,
            best_rank,
            latency_ms,
        }
    }
}

/// Aggregates over all cases.
#[derive(Debug, Clone, Serialize)]
pub struct EvalSummary {
    /// Number of evaluated queries.
    pub total_cases: usize,
    /// Cut-off.
    pub k: usize,
    /// Mean Recall@K.
    pub mean_recall: f64,
    /// Share of queries with at least one relevant prediction.
    pub hit_rate: f64,
    /// Mean of 1 / best rank (0 for misses).
    pub mean_reciprocal_rank: f64,
    /// Mean pipeline wall time.
    pub avg_latency_ms: f64,
}

impl EvalSummary {
    /// Summarises `cases`; all means are 0 for an empty slice.
    pub fn from_cases(cases: &[CaseReport], k: usize) -> Self {
        let total_cases = cases.len();
        let mean = |sum: f64| {
            if total_cases == 0 {
                0.0
            } else {
                sum / total_cases as f64
            }
        };
        Self {
            total_cases,
            k,
            mean_recall: mean(cases.iter().map(|case| case.recall).sum()),
            hit_rate: mean(cases.iter().filter(|case| case.best_rank.is_some()).count() as f64),
            mean_reciprocal_rank: mean(
                cases
                    .iter()
                    .filter_map(|case| case.best_rank)
                    .map(|rank| 1.0 / rank as f64)
                    .sum(),
            ),
            avg_latency_ms: mean(cases.iter().map(|case| case.latency_ms).sum()),
        }
    }
}

/// Full evaluation output, written as JSON on request.
#[derive(Debug, Clone, Serialize)]
pub struct EvalReport {
    /// Aggregates.
    pub summary: EvalSummary,
    /// Per-query detail.
    pub cases: Vec<CaseReport>,
}

/// One line of the predictions CSV.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionRow {
    /// Query text.
    #[serde(rename = "Query")]
    pub query: String,
    /// Recommended assessment URL.
    #[serde(rename = "Assessment_url")]
    pub assessment_url: String,
}

/// Writes `Query,Assessment_url` rows with a header.
pub fn write_predictions<W: Write>(writer: W, rows: &[PredictionRow]) -> Result<()> {
    let mut csv = csv::Writer::from_writer(writer);
    if rows.is_empty() {
        csv.write_record(["Query", "Assessment_url"])?;
    }
    for row in rows {
        csv.serialize(row)?;
    }
    csv.flush().context("failed to flush predictions CSV")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_url_keeps_lowercased_slug() {
        assert_eq!(
            normalize_url("https://www.shl.com/products/product-catalog/view/Foo-Bar/?x=1"),
            "foo-bar"
        );
        assert_eq!(normalize_url("https://host/a/b//"), "b");
        assert_eq!(normalize_url("plain-slug"), "plain-slug");
        assert_eq!(normalize_url(""), "");
    }

    #[test]
    fn recall_counts_distinct_normalized_hits() {
        let truth = [
            "https://www.shl.com/solutions/products/product-catalog/view/java-8-new/",
            "https://www.shl.com/products/product-catalog/view/core-java/",
        ];
        let predicted = [
            "https://www.shl.com/products/product-catalog/view/Java-8-New",
            "https://www.shl.com/products/product-catalog/view/java-8-new/?ref=1",
            "https://www.shl.com/products/product-catalog/view/sql/",
        ];
        assert!((recall_at_k(&predicted, &truth, 10) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn recall_ignores_predictions_past_k() {
        let truth = ["a/x", "a/y"];
        let predicted = ["a/q", "a/x", "a/y"];
        assert!((recall_at_k(&predicted, &truth, 2) - 0.5).abs() < 1e-9);
        assert!((recall_at_k(&predicted, &truth, 3) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn recall_with_empty_truth_is_zero() {
        let truth: [&str; 0] = [];
        assert_eq!(recall_at_k(&["a/x"], &truth, 10), 0.0);
    }

    #[test]
    fn labelled_rows_group_by_query_in_order() {
        let csv = " Query ,Assessment_url\n\
                   second,https://h/view/b/\n\
                   first,https://h/view/a/\n\
                   second,https://h/view/c/\n";
        let cases = load_labelled_queries(csv.as_bytes()).unwrap();
        assert_eq!(cases.len(), 2);
        assert_eq!(cases[0].query, "second");
        assert_eq!(
            cases[0].relevant_urls,
            vec!["https://h/view/b/", "https://h/view/c/"]
        );
        assert_eq!(cases[1].query, "first");
    }

    #[test]
    fn labelled_file_without_url_column_fails() {
        let err = load_labelled_queries("query,url\nq,u\n".as_bytes()).unwrap_err();
        assert!(err.to_string().contains("assessment_url"));
    }

    #[test]
    fn queries_come_from_query_column_or_first_column() {
        let named = "id,Query\n1,find java devs\n2,\n";
        assert_eq!(read_queries(named.as_bytes()).unwrap(), vec!["find java devs"]);
        let unnamed = "Text\nanalyst role\n";
        assert_eq!(read_queries(unnamed.as_bytes()).unwrap(), vec!["analyst role"]);
    }

    #[test]
    fn case_report_tracks_best_rank() {
        let case = LabelledQuery {
            query: "q".into(),
            relevant_urls: vec!["https://h/view/b/".into()],
        };
        let report = CaseReport::new(
            case,
            vec!["https://h/view/a/".into(), "https://h/view/B".into()],
            EVAL_K,
            12.0,
        );
        assert_eq!(report.best_rank, Some(2));
        assert!((report.recall - 1.0).abs() < 1e-9);

        let summary = EvalSummary::from_cases(&[report], EVAL_K);
        assert_eq!(summary.total_cases, 1);
        assert!((summary.mean_reciprocal_rank - 0.5).abs() < 1e-9);
        assert!((summary.hit_rate - 1.0).abs() < 1e-9);
    }

    #[test]
    fn empty_summary_is_zeroed() {
        let summary = EvalSummary::from_cases(&[], EVAL_K);
        assert_eq!(summary.mean_recall, 0.0);
        assert_eq!(summary.avg_latency_ms, 0.0);
    }

    #[test]
    fn predictions_csv_has_expected_header() {
        let rows = vec![
            PredictionRow {
                query: "java, sql".into(),
                assessment_url: "https://h/view/a/".into(),
            },
            PredictionRow {
                query: "java, sql".into(),
                assessment_url: "https://h/view/b/".into(),
            },
        ];
        let mut out = Vec::new();
        write_predictions(&mut out, &rows).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(
            text.lines().collect::<Vec<_>>(),
            vec![
                "Query,Assessment_url",
                "\"java, sql\",https://h/view/a/",
                "\"java, sql\",https://h/view/b/",
            ]
        );
    }
}

//! Assessment catalog records and the cleaning pass that turns scraped rows into index input.

use std::collections::HashSet;
use std::fmt;
use std::io::{Read, Write};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Minimum catalog size expected from a complete scrape of the individual test solutions.
pub const MIN_CATALOG_SIZE: usize = 377;

/// Single-letter assessment category code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TestType {
    /// Knowledge & skills.
    K,
    /// Personality & behavior.
    P,
    /// Simulation / work sample.
    S,
    /// Anything the cleaner could not classify.
    Unknown,
}

impl TestType {
    /// Maps a raw catalog key string (e.g. `"A B P"`, `"K S"`) to a single code.
    ///
    /// Knowledge wins over simulation, which wins over the personality/behavioral family.
    pub fn normalize(raw: &str) -> Self {
        let raw = raw.to_uppercase();
        if raw.contains('K') {
            return Self::K;
        }
        if raw.contains('S') {
            return Self::S;
        }
        if ['P', 'A', 'B', 'C', 'D', 'E']
            .iter()
            .any(|code| raw.contains(*code))
        {
            return Self::P;
        }
        Self::Unknown
    }

    /// Inverse of [`TestType::code`].
    pub fn from_code(code: &str) -> Self {
        match code.trim() {
            "K" => Self::K,
            "P" => Self::P,
            "S" => Self::S,
            _ => Self::Unknown,
        }
    }

    /// Code as written to CSV and the index.
    pub fn code(&self) -> &'static str {
        match self {
            Self::K => "K",
            Self::P => "P",
            Self::S => "S",
            Self::Unknown => "Unknown",
        }
    }

    /// Human readable label used by the HTTP response, if the code has one.
    pub fn label(&self) -> Option<&'static str> {
        match self {
            Self::K => Some("Knowledge & Skills"),
            Self::P => Some("Personality & Behavior"),
            Self::S => Some("Simulation"),
            Self::Unknown => None,
        }
    }
}

impl fmt::Display for TestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// One product row as emitted by the catalog scraper.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawCatalogRow {
    /// Product name from the catalog table link.
    pub name: String,
    /// Absolute product page URL.
    pub url: String,
    /// Page heading, falls back to `name`.
    #[serde(default)]
    pub title: String,
    /// Short description or meta description.
    #[serde(default)]
    pub description: String,
    /// Overview block.
    #[serde(default)]
    pub overview: String,
    /// Category or breadcrumb tail.
    #[serde(default)]
    pub category: String,
    /// Raw "Remote Testing" cell.
    #[serde(default)]
    pub remote_testing: String,
    /// Raw "Adaptive/IRT" cell.
    #[serde(default)]
    pub adaptive_irt: String,
    /// Raw test type key letters.
    #[serde(default)]
    pub test_type: String,
    /// Feature bullets joined with ` | `.
    #[serde(default)]
    pub features: String,
    /// Benefit bullets joined with ` | `.
    #[serde(default)]
    pub benefits: String,
    /// Detail paragraphs joined with ` | `.
    #[serde(default)]
    pub details: String,
    /// Free text such as "Approximate Completion Time in minutes = 30".
    #[serde(default)]
    pub duration: String,
    /// Language text.
    #[serde(default)]
    pub language: String,
    /// RFC 3339 timestamp of the fetch.
    #[serde(default)]
    pub scraped_at: String,
    /// `success` or `error`.
    #[serde(default)]
    pub status: String,
}

/// Cleaned catalog entry. Read-only at request time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogRecord {
    /// Display name of the assessment.
    pub assessment_name: String,
    /// Canonical product URL.
    pub url: String,
    /// Whitespace-normalized description.
    #[serde(default)]
    pub description: String,
    /// Normalized category code.
    pub test_type: TestType,
    /// Completion time in minutes when the catalog states one.
    #[serde(default)]
    pub duration: Option<u32>,
    /// Whether the assessment can be taken remotely.
    #[serde(default)]
    pub remote_testing: bool,
    /// Whether the assessment is adaptive (IRT based).
    #[serde(default)]
    pub adaptive_irt: bool,
    /// Text submitted to the embedding model.
    #[serde(default)]
    pub search_text: String,
}

impl CatalogRecord {
    /// Cleans a scraped row. Returns `None` when the row has no usable name or URL.
    pub fn from_raw(row: &RawCatalogRow) -> Option<Self> {
        let assessment_name = clean_text(&row.name);
        let url = clean_text(&row.url);
        if assessment_name.is_empty() || url.is_empty() {
            return None;
        }
        let description = clean_text(&row.description);
        let test_type = TestType::normalize(&clean_text(&row.test_type));
        let search_text = build_search_text(&assessment_name, &description, test_type);
        Some(Self {
            assessment_name,
            url,
            description,
            test_type,
            duration: parse_duration_minutes(&row.duration),
            remote_testing: parse_flag(&row.remote_testing),
            adaptive_irt: parse_flag(&row.adaptive_irt),
            search_text,
        })
    }
}

/// Collapses whitespace runs into single spaces and trims the ends.
pub fn clean_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Embedding-ready text for a catalog entry.
pub fn build_search_text(name: &str, description: &str, test_type: TestType) -> String {
    format!(
        "Assessment Name: {name}. Description: {description}. Assessment Type: {}. \
         This assessment is suitable for evaluating relevant job skills.",
        test_type.code()
    )
}

/// First integer found in the duration text, e.g. `"max 30 minutes"` → 30.
pub fn parse_duration_minutes(text: &str) -> Option<u32> {
    let digits: String = text
        .chars()
        .skip_while(|ch| !ch.is_ascii_digit())
        .take_while(|ch| ch.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

/// Interprets catalog yes/no cells; the catalog renders "yes" as a filled dot.
pub fn parse_flag(text: &str) -> bool {
    matches!(
        clean_text(text).to_lowercase().as_str(),
        "yes" | "y" | "true" | "1" | "✓" | "●" | "•"
    )
}

/// Cleans every row, dropping unusable rows and duplicate URLs (first occurrence wins).
pub fn clean_catalog(rows: &[RawCatalogRow]) -> Vec<CatalogRecord> {
    let mut seen = HashSet::new();
    rows.iter()
        .filter_map(CatalogRecord::from_raw)
        .filter(|record| seen.insert(record.url.clone()))
        .collect()
}

/// Problems found by [`validate_catalog`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogIssue {
    /// Fewer records than a complete scrape yields.
    TooFewRecords {
        /// Records present.
        found: usize,
        /// Records expected at minimum.
        expected: usize,
    },
    /// Records whose test type could not be classified.
    UnknownTestTypes(Vec<String>),
    /// Records whose URL is not https.
    InsecureUrls(Vec<String>),
}

impl fmt::Display for CatalogIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooFewRecords { found, expected } => {
                write!(f, "only {found} assessments (expected at least {expected})")
            }
            Self::UnknownTestTypes(names) => {
                write!(f, "{} assessments with unknown test type", names.len())
            }
            Self::InsecureUrls(urls) => write!(f, "{} URLs do not start with https", urls.len()),
        }
    }
}

/// Sanity checks applied after cleaning.
pub fn validate_catalog(records: &[CatalogRecord]) -> Vec<CatalogIssue> {
    let mut issues = Vec::new();
    if records.len() < MIN_CATALOG_SIZE {
        issues.push(CatalogIssue::TooFewRecords {
            found: records.len(),
            expected: MIN_CATALOG_SIZE,
        });
    }
    let unknown: Vec<String> = records
        .iter()
        .filter(|record| record.test_type == TestType::Unknown)
        .map(|record| record.assessment_name.clone())
        .collect();
    if !unknown.is_empty() {
        issues.push(CatalogIssue::UnknownTestTypes(unknown));
    }
    let insecure: Vec<String> = records
        .iter()
        .filter(|record| !record.url.starts_with("https"))
        .map(|record| record.url.clone())
        .collect();
    if !insecure.is_empty() {
        issues.push(CatalogIssue::InsecureUrls(insecure));
    }
    issues
}

/// Reads scraper output (headered CSV).
pub fn read_raw_rows<R: Read>(reader: R) -> Result<Vec<RawCatalogRow>> {
    let mut csv_reader = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
    let mut rows = Vec::new();
    for (idx, row) in csv_reader.deserialize().enumerate() {
        let row: RawCatalogRow =
            row.with_context(|| format!("invalid scraped row at record {}", idx + 1))?;
        rows.push(row);
    }
    Ok(rows)
}

/// Writes scraped rows as a headered CSV.
pub fn write_raw_rows<W: Write>(writer: W, rows: &[RawCatalogRow]) -> Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    for row in rows {
        csv_writer.serialize(row).context("failed to write scraped row")?;
    }
    csv_writer.flush().context("failed to flush scraped CSV")?;
    Ok(())
}

/// Reads a cleaned catalog CSV.
pub fn read_catalog<R: Read>(reader: R) -> Result<Vec<CatalogRecord>> {
    let mut csv_reader = csv::Reader::from_reader(reader);
    let mut records = Vec::new();
    for (idx, record) in csv_reader.deserialize().enumerate() {
        let record: CatalogRecord =
            record.with_context(|| format!("invalid catalog record at row {}", idx + 1))?;
        records.push(record);
    }
    Ok(records)
}

/// Writes a cleaned catalog CSV.
pub fn write_catalog<W: Write>(writer: W, records: &[CatalogRecord]) -> Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    for record in records {
        csv_writer
            .serialize(record)
            .with_context(|| format!("failed to write catalog record {}", record.url))?;
    }
    csv_writer.flush().context("failed to flush catalog CSV")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(name: &str, url: &str, test_type: &str) -> RawCatalogRow {
        RawCatalogRow {
            name: name.to_string(),
            url: url.to_string(),
            test_type: test_type.to_string(),
            ..RawCatalogRow::default()
        }
    }

    #[test]
    fn test_type_priority() {
        assert_eq!(TestType::normalize("K"), TestType::K);
        assert_eq!(TestType::normalize("p k"), TestType::K);
        assert_eq!(TestType::normalize("S P"), TestType::S);
        assert_eq!(TestType::normalize("A B"), TestType::P);
        assert_eq!(TestType::normalize("E"), TestType::P);
        assert_eq!(TestType::normalize(""), TestType::Unknown);
        assert_eq!(TestType::normalize("X"), TestType::Unknown);
    }

    #[test]
    fn cleaning_collapses_whitespace_and_builds_search_text() {
        let mut row = raw("  Core   Java\n(Advanced) ", " https://x.test/java/ ", "K");
        row.description = "Measures\tJava   knowledge.".to_string();
        row.duration = "Approximate Completion Time in minutes = 13".to_string();
        row.remote_testing = "Yes".to_string();
        let record = CatalogRecord::from_raw(&row).expect("usable row");

        assert_eq!(record.assessment_name, "Core Java (Advanced)");
        assert_eq!(record.url, "https://x.test/java/");
        assert_eq!(record.duration, Some(13));
        assert!(record.remote_testing);
        assert!(!record.adaptive_irt);
        assert_eq!(
            record.search_text,
            "Assessment Name: Core Java (Advanced). Description: Measures Java knowledge.. \
             Assessment Type: K. This assessment is suitable for evaluating relevant job skills."
        );
    }

    #[test]
    fn clean_catalog_drops_blank_and_duplicate_urls() {
        let rows = vec![
            raw("First", "https://x.test/a", "K"),
            raw("", "https://x.test/b", "K"),
            raw("Second", "https://x.test/a", "P"),
            raw("Third", "https://x.test/c", "S"),
        ];
        let records = clean_catalog(&rows);
        let names: Vec<_> = records.iter().map(|r| r.assessment_name.as_str()).collect();
        assert_eq!(names, vec!["First", "Third"]);
    }

    #[test]
    fn validation_reports_each_problem() {
        let records = clean_catalog(&[
            raw("Ok", "https://x.test/a", "K"),
            raw("Odd", "http://x.test/b", "Z"),
        ]);
        let issues = validate_catalog(&records);
        assert_eq!(issues.len(), 3);
        assert!(matches!(issues[0], CatalogIssue::TooFewRecords { found: 2, .. }));
        assert_eq!(issues[1], CatalogIssue::UnknownTestTypes(vec!["Odd".to_string()]));
        assert_eq!(
            issues[2],
            CatalogIssue::InsecureUrls(vec!["http://x.test/b".to_string()])
        );
    }

    #[test]
    fn catalog_csv_round_trips_through_writer() {
        let records = clean_catalog(&[raw("Ok", "https://x.test/a", "K")]);
        let mut buf = Vec::new();
        write_catalog(&mut buf, &records).expect("write");
        let parsed = read_catalog(buf.as_slice()).expect("read");
        assert_eq!(parsed, records);
    }
}

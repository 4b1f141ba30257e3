//! Postgres/pgvector backend for the assessment index.

use anyhow::{anyhow, Context, Result};
use pgvector::Vector;
use tokio_postgres::{Client, NoTls, Row};
use tracing::error;

use crate::catalog::{CatalogRecord, TestType};
use crate::index::IndexedAssessment;
use crate::retriever::RetrievedItem;

/// Fully-qualified Postgres table name (schema + table).
#[derive(Debug, Clone)]
pub struct TableName {
    schema: String,
    table: String,
}

impl TableName {
    /// Builds a new table identifier.
    pub fn new<S, T>(schema: S, table: T) -> Result<Self>
    where
        S: Into<String>,
        T: Into<String>,
    {
        let schema = schema.into();
        let table = table.into();
        anyhow::ensure!(!schema.trim().is_empty(), "schema name is required");
        anyhow::ensure!(!table.trim().is_empty(), "table name is required");
        Ok(Self { schema, table })
    }

    /// Fully-qualified table reference with quoted identifiers.
    pub fn qualified(&self) -> String {
        format!("{}.{}", quote_ident(&self.schema), quote_ident(&self.table))
    }
}

/// Quotes Postgres identifiers, escaping embedded quotes.
pub fn quote_ident(input: &str) -> String {
    let escaped = input.replace('"', "\"\"");
    format!("\"{}\"", escaped)
}

/// Assessment table in a pgvector-enabled database.
pub struct PgVectorIndex {
    client: Client,
    table: TableName,
    search_sql: String,
}

impl PgVectorIndex {
    /// Connects and spawns the connection driver on the current runtime.
    pub async fn connect(database_url: &str, table: TableName) -> Result<Self> {
        let (client, connection) = tokio_postgres::connect(database_url, NoTls)
            .await
            .with_context(|| format!("failed to connect to Postgres at {}", database_url))?;
        tokio::spawn(async move {
            if let Err(err) = connection.await {
                error!(error = %err, "postgres connection error");
            }
        });
        let search_sql = search_sql(&table);
        Ok(Self {
            client,
            table,
            search_sql,
        })
    }

    /// Creates the vector extension and assessment table when missing.
    pub async fn prepare(&self, dims: usize) -> Result<()> {
        anyhow::ensure!(dims > 0, "embedding dimension must be positive");
        self.client
            .execute("CREATE EXTENSION IF NOT EXISTS vector", &[])
            .await
            .context("failed to ensure pgvector extension")?;
        let ddl = format!(
            "CREATE TABLE IF NOT EXISTS {} (
                url TEXT PRIMARY KEY,
                assessment_name TEXT NOT NULL,
                description TEXT NOT NULL,
                test_type TEXT NOT NULL,
                duration INTEGER,
                remote_testing BOOLEAN NOT NULL,
                adaptive_irt BOOLEAN NOT NULL,
                search_text TEXT NOT NULL,
                embedding VECTOR({dims}) NOT NULL
            )",
            self.table.qualified()
        );
        self.client
            .execute(&ddl, &[])
            .await
            .context("failed to create assessment table")?;
        Ok(())
    }

    /// Upserts a batch of rows keyed on URL inside one transaction.
    pub async fn upsert(&mut self, entries: &[IndexedAssessment]) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let sql = upsert_sql(&self.table);
        let transaction = self.client.transaction().await?;
        let statement = transaction.prepare(&sql).await?;
        for entry in entries {
            let record = &entry.record;
            let vector = Vector::from(entry.embedding.clone());
            let duration = record
                .duration
                .map(i32::try_from)
                .transpose()
                .map_err(|_| anyhow!("duration for {} exceeds i32 range", record.url))?;
            transaction
                .execute(
                    &statement,
                    &[
                        &record.url,
                        &record.assessment_name,
                        &record.description,
                        &record.test_type.code(),
                        &duration,
                        &record.remote_testing,
                        &record.adaptive_irt,
                        &record.search_text,
                        &vector,
                    ],
                )
                .await
                .with_context(|| format!("failed to upsert assessment {}", record.url))?;
        }
        transaction.commit().await?;
        Ok(())
    }

    /// Top `k` rows by inner product with `embedding`.
    pub async fn search(&self, embedding: &[f32], k: usize) -> Result<Vec<RetrievedItem>> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let vector = Vector::from(embedding.to_vec());
        let rows = self
            .client
            .query(self.search_sql.as_str(), &[&vector, &(k as i64)])
            .await
            .context("pgvector search failed")?;
        rows.iter().map(item_from_row).collect()
    }
}

fn item_from_row(row: &Row) -> Result<RetrievedItem> {
    let test_type: String = row.try_get("test_type")?;
    let duration: Option<i32> = row.try_get("duration")?;
    let negative_inner: f64 = row.try_get("distance")?;
    Ok(RetrievedItem {
        record: CatalogRecord {
            assessment_name: row.try_get("assessment_name")?,
            url: row.try_get("url")?,
            description: row.try_get("description")?,
            test_type: TestType::from_code(&test_type),
            duration: duration.and_then(|d| u32::try_from(d).ok()),
            remote_testing: row.try_get("remote_testing")?,
            adaptive_irt: row.try_get("adaptive_irt")?,
            search_text: row.try_get("search_text")?,
        },
        score: -negative_inner as f32,
    })
}

fn search_sql(table: &TableName) -> String {
    // `<#>` is negative inner product, so ascending order is best-first.
    format!(
        "SELECT url, assessment_name, description, test_type, duration, remote_testing, \
            adaptive_irt, search_text, (embedding <#> $1)::float8 AS distance \
         FROM {} ORDER BY embedding <#> $1 ASC LIMIT $2",
        table.qualified()
    )
}

fn upsert_sql(table: &TableName) -> String {
    format!(
        "INSERT INTO {} \
            (url, assessment_name, description, test_type, duration, remote_testing, \
             adaptive_irt, search_text, embedding) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
         ON CONFLICT (url) DO UPDATE SET \
            assessment_name = EXCLUDED.assessment_name, \
            description = EXCLUDED.description, \
            test_type = EXCLUDED.test_type, \
            duration = EXCLUDED.duration, \
            remote_testing = EXCLUDED.remote_testing, \
            adaptive_irt = EXCLUDED.adaptive_irt, \
            search_text = EXCLUDED.search_text, \
            embedding = EXCLUDED.embedding",
        table.qualified()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn qualified_names_are_quoted() {
        let table = TableName::new("public", "shl\"assessments").unwrap();
        assert_eq!(table.qualified(), "\"public\".\"shl\"\"assessments\"");
        assert!(TableName::new(" ", "t").is_err());
    }

    #[test]
    fn search_sql_orders_by_negative_inner_product() {
        let table = TableName::new("public", "assessments").unwrap();
        let sql = search_sql(&table);
        assert!(sql.contains("FROM \"public\".\"assessments\""));
        assert!(sql.contains("ORDER BY embedding <#> $1 ASC LIMIT $2"));
        assert!(upsert_sql(&table).contains("ON CONFLICT (url) DO UPDATE"));
    }
}

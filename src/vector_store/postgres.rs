use anyhow::Context;
use async_trait::async_trait;
use pgvector::Vector;
use tokio_postgres::types::Json;
use tokio_postgres::{Client, Row};
use tracing::debug;

use super::{check_dimensions, ChunkProperties, EmbeddingRecord, HybridQuery, VectorHit, VectorStore};
use crate::chunk::ChunkId;
use crate::error::StoreError;
use crate::pg::TableName;

const STORE: &str = "vector";

/// pgvector-backed store with a generated `tsvector` column for keyword scoring.
///
/// Keyword score is `ts_rank_cd(..., 32)`, which maps ranks into `[0, 1)` so
/// it blends with cosine similarity on the same scale.
pub struct PgVectorStore {
    client: Client,
    dimensions: usize,
    upsert_sql: String,
    query_sql: String,
    ids_sql: String,
}

impl PgVectorStore {
    /// Wraps a connected client, creating the table and indexes when `prepare` is set.
    pub async fn new(
        client: Client,
        table: TableName,
        dimensions: usize,
        prepare: bool,
    ) -> anyhow::Result<Self> {
        anyhow::ensure!(dimensions > 0, "embedding dimension must be positive");
        if prepare {
            ensure_schema(&client, &table, dimensions).await?;
        }
        Ok(Self {
            client,
            dimensions,
            upsert_sql: upsert_sql(&table),
            query_sql: hybrid_sql(&table),
            ids_sql: ids_sql(&table),
        })
    }
}

#[async_trait]
impl VectorStore for PgVectorStore {
    async fn upsert(&self, record: &EmbeddingRecord) -> Result<(), StoreError> {
        check_dimensions(self.dimensions, &record.vector)?;
        let vector = Vector::from(record.vector.clone());
        let properties = Json(&record.properties);
        self.client
            .execute(
                self.upsert_sql.as_str(),
                &[
                    &record.chunk_id.as_str(),
                    &record.properties.fingerprint.as_str(),
                    &record.properties.text,
                    &properties,
                    &vector,
                ],
            )
            .await
            .map_err(|err| StoreError::unavailable(STORE, err))?;
        debug!(chunk_id = %record.chunk_id, "upserted vector row");
        Ok(())
    }

    async fn hybrid_query(&self, query: &HybridQuery<'_>) -> Result<Vec<VectorHit>, StoreError> {
        check_dimensions(self.dimensions, query.vector)?;
        if query.limit == 0 {
            return Ok(Vec::new());
        }
        let vector = Vector::from(query.vector.to_vec());
        let alpha = f64::from(query.alpha);
        let limit = i64::try_from(query.limit).unwrap_or(i64::MAX);
        let rows = self
            .client
            .query(
                self.query_sql.as_str(),
                &[&vector, &query.text.trim(), &alpha, &limit],
            )
            .await
            .map_err(|err| StoreError::unavailable(STORE, err))?;
        rows.iter().map(hit_from_row).collect()
    }

    async fn chunk_ids(
        &self,
        after: Option<&ChunkId>,
        limit: usize,
    ) -> Result<Vec<ChunkId>, StoreError> {
        let cursor = after.map(ChunkId::as_str).unwrap_or("");
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = self
            .client
            .query(self.ids_sql.as_str(), &[&cursor, &limit])
            .await
            .map_err(|err| StoreError::unavailable(STORE, err))?;
        Ok(rows
            .iter()
            .map(|row| ChunkId::from_stored(row.get::<_, String>("chunk_id")))
            .collect())
    }
}

fn hit_from_row(row: &Row) -> Result<VectorHit, StoreError> {
    let chunk_id: String = row
        .try_get("chunk_id")
        .map_err(|err| StoreError::unavailable(STORE, err))?;
    let Json(properties): Json<ChunkProperties> = row
        .try_get("properties")
        .map_err(|err| StoreError::unavailable(STORE, err))?;
    let score: f64 = row
        .try_get("score")
        .map_err(|err| StoreError::unavailable(STORE, err))?;
    Ok(VectorHit {
        chunk_id: ChunkId::from_stored(chunk_id),
        score,
        properties,
    })
}

async fn ensure_schema(client: &Client, table: &TableName, dims: usize) -> anyhow::Result<()> {
    client
        .execute("CREATE EXTENSION IF NOT EXISTS vector", &[])
        .await
        .context("failed to ensure pgvector extension")?;
    let ddl = format!(
        "CREATE TABLE IF NOT EXISTS {} (
            chunk_id TEXT PRIMARY KEY,
            seq BIGSERIAL NOT NULL,
            fingerprint TEXT NOT NULL,
            text TEXT NOT NULL,
            properties JSONB NOT NULL,
            embedding VECTOR({dims}) NOT NULL,
            text_tsv TSVECTOR GENERATED ALWAYS AS (to_tsvector('english', text)) STORED
        )",
        table.qualified()
    );
    client
        .execute(&ddl, &[])
        .await
        .context("failed to create vector table")?;
    let fts_index = format!(
        "CREATE INDEX IF NOT EXISTS {} ON {} USING GIN (text_tsv)",
        table.index_name("text_tsv"),
        table.qualified()
    );
    client
        .execute(&fts_index, &[])
        .await
        .context("failed to ensure text_tsv GIN index")?;
    Ok(())
}

fn upsert_sql(table: &TableName) -> String {
    format!(
        "INSERT INTO {} (chunk_id, fingerprint, text, properties, embedding) \
            VALUES ($1, $2, $3, $4, $5) \
            ON CONFLICT (chunk_id) DO UPDATE SET \
                fingerprint = EXCLUDED.fingerprint, \
                text = EXCLUDED.text, \
                properties = EXCLUDED.properties, \
                embedding = EXCLUDED.embedding",
        table.qualified()
    )
}

fn hybrid_sql(table: &TableName) -> String {
    format!(
        "WITH query AS (SELECT plainto_tsquery('english', $2) AS q)
        SELECT
            chunk_id,
            properties,
            $3::float8 * COALESCE(NULLIF(1 - (embedding <=> $1), 'NaN'::float8), 0) +
                (1 - $3::float8) * COALESCE(ts_rank_cd(text_tsv, query.q, 32), 0)::float8 AS score
        FROM {table}
        CROSS JOIN query
        ORDER BY score DESC, seq ASC
        LIMIT $4",
        table = table.qualified()
    )
}

fn ids_sql(table: &TableName) -> String {
    format!(
        "SELECT chunk_id FROM {} WHERE chunk_id > $1 ORDER BY chunk_id ASC LIMIT $2",
        table.qualified()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hybrid_sql_blends_and_breaks_ties_by_insertion() {
        let table = TableName::new("public", "menu_chunks").expect("table");
        let sql = hybrid_sql(&table);
        assert!(sql.contains("\"public\".\"menu_chunks\""));
        assert!(sql.contains("ts_rank_cd(text_tsv, query.q, 32)"));
        assert!(sql.contains("ORDER BY score DESC, seq ASC"));
    }

    #[test]
    fn zero_norm_similarity_scores_as_zero() {
        let table = TableName::new("public", "menu_chunks").expect("table");
        let sql = hybrid_sql(&table);
        assert!(sql.contains("COALESCE(NULLIF(1 - (embedding <=> $1), 'NaN'::float8), 0)"));
    }

    #[test]
    fn upsert_is_keyed_by_chunk_id() {
        let table = TableName::new("public", "menu_chunks").expect("table");
        assert!(upsert_sql(&table).contains("ON CONFLICT (chunk_id) DO UPDATE"));
    }
}

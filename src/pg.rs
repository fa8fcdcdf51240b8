//! Postgres helpers shared by the vector and graph store backends.

use anyhow::{Context, Result};
use tokio_postgres::{Client, NoTls};
use tracing::error;

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

    /// Sibling table in the same schema, named `<table>_<suffix>`.
    pub fn with_suffix(&self, suffix: &str) -> Self {
        Self {
            schema: self.schema.clone(),
            table: format!("{}_{}", self.table, suffix),
        }
    }

    /// Index name scoped to this table, e.g. `public_chunks_text_tsv_idx`.
    pub fn index_name(&self, purpose: &str) -> String {
        quote_ident(&format!(
            "{}_{}_{}_idx",
            sanitize_ident(&self.schema),
            sanitize_ident(&self.table),
            purpose
        ))
    }
}

/// Quotes Postgres identifiers, escaping embedded quotes.
pub fn quote_ident(input: &str) -> String {
    let escaped = input.replace('"', "\"\"");
    format!("\"{}\"", escaped)
}

fn sanitize_ident(input: &str) -> String {
    input
        .chars()
        .map(|ch| if ch.is_ascii_alphanumeric() { ch } else { '_' })
        .collect()
}

/// Opens a connection and drives it on a background task.
pub async fn connect(database_url: &str) -> Result<Client> {
    let (client, connection) = tokio_postgres::connect(database_url, NoTls)
        .await
        .context("failed to connect to Postgres")?;
    tokio::spawn(async move {
        if let Err(err) = connection.await {
            error!(error = %err, "postgres connection error");
        }
    });
    Ok(client)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quotes_and_suffixes_identifiers() {
        let table = TableName::new("public", "menu\"chunks").expect("valid table");
        assert_eq!(table.qualified(), "\"public\".\"menu\"\"chunks\"");
        assert_eq!(
            table.with_suffix("nodes").qualified(),
            "\"public\".\"menu\"\"chunks_nodes\""
        );
        assert_eq!(
            table.index_name("text_tsv"),
            "\"public_menu_chunks_text_tsv_idx\""
        );
    }

    #[test]
    fn rejects_blank_names() {
        assert!(TableName::new(" ", "chunks").is_err());
        assert!(TableName::new("public", "").is_err());
    }
}

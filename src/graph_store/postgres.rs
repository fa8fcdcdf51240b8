use anyhow::Context;
use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio_postgres::types::Json;
use tokio_postgres::{Client, GenericClient};
use tracing::debug;

use super::{GraphContext, GraphStore, GraphWrite, MenuItem, NodeLabel};
use crate::chunk::ChunkId;
use crate::error::StoreError;
use crate::pg::TableName;

const STORE: &str = "graph";

/// Graph store over two Postgres tables, `<base>_nodes` and `<base>_edges`.
///
/// Nodes are keyed by `(label, key)` and edges by `(kind, src, dst)`, so every
/// write is an `ON CONFLICT` merge. Each chunk merges inside one transaction
/// on a dedicated write connection; lookups share an unlocked read connection
/// so concurrent enrichment queries pipeline instead of queueing.
pub struct PgGraphStore {
    writer: Mutex<Client>,
    reader: Client,
    sql: GraphSql,
}

struct GraphSql {
    merge_node: String,
    merge_chunk_node: String,
    merge_has_chunk: String,
    merge_serves: String,
    chunk_exists: String,
    chunk_sources: String,
    menu: String,
}

impl PgGraphStore {
    /// Wraps a write and a read connection, creating the tables when
    /// `prepare` is set.
    pub async fn new(
        writer: Client,
        reader: Client,
        base: TableName,
        prepare: bool,
    ) -> anyhow::Result<Self> {
        let nodes = base.with_suffix("nodes");
        let edges = base.with_suffix("edges");
        if prepare {
            ensure_schema(&writer, &nodes, &edges).await?;
        }
        Ok(Self {
            writer: Mutex::new(writer),
            reader,
            sql: GraphSql::new(&nodes, &edges),
        })
    }
}

impl GraphSql {
    fn new(nodes: &TableName, edges: &TableName) -> Self {
        let nodes = nodes.qualified();
        let edges = edges.qualified();
        Self {
            merge_node: format!(
                "INSERT INTO {nodes} (label, key, props) VALUES ($1, $2, '{{}}'::jsonb) \
                    ON CONFLICT (label, key) DO NOTHING"
            ),
            merge_chunk_node: format!(
                "INSERT INTO {nodes} (label, key, props) VALUES ('Chunk', $1, $2) \
                    ON CONFLICT (label, key) DO UPDATE SET props = EXCLUDED.props"
            ),
            merge_has_chunk: format!(
                "INSERT INTO {edges} (kind, src_label, src_key, dst_label, dst_key, props) \
                    VALUES ('HAS_CHUNK', $1, $2, 'Chunk', $3, '{{}}'::jsonb) \
                    ON CONFLICT (kind, src_label, src_key, dst_label, dst_key) DO NOTHING"
            ),
            merge_serves: format!(
                "INSERT INTO {edges} AS e (kind, src_label, src_key, dst_label, dst_key, props) \
                    VALUES ('SERVES', 'Restaurant', $1, 'Dish', $2, \
                        CASE WHEN $3::int4 IS NULL THEN '{{}}'::jsonb ELSE jsonb_build_object('price', $3::int4) END) \
                    ON CONFLICT (kind, src_label, src_key, dst_label, dst_key) DO UPDATE SET \
                        props = CASE WHEN $3::int4 IS NULL THEN e.props ELSE EXCLUDED.props END"
            ),
            chunk_exists: format!("SELECT 1 FROM {nodes} WHERE label = 'Chunk' AND key = $1"),
            chunk_sources: format!(
                "SELECT src_label, src_key FROM {edges} \
                    WHERE kind = 'HAS_CHUNK' AND dst_label = 'Chunk' AND dst_key = $1 \
                    ORDER BY src_label, src_key"
            ),
            menu: format!(
                "SELECT dst_key, (props->>'price')::int4 AS price FROM {edges} \
                    WHERE kind = 'SERVES' AND src_label = 'Restaurant' AND src_key = $1 \
                    ORDER BY dst_key"
            ),
        }
    }
}

#[async_trait]
impl GraphStore for PgGraphStore {
    async fn merge_chunk(&self, write: &GraphWrite) -> Result<(), StoreError> {
        let mut client = self.writer.lock().await;
        let tx = client
            .transaction()
            .await
            .map_err(|err| StoreError::unavailable(STORE, err))?;
        merge_in(&tx, &self.sql, write)
            .await
            .map_err(|err| StoreError::unavailable(STORE, err))?;
        tx.commit()
            .await
            .map_err(|err| StoreError::unavailable(STORE, err))?;
        debug!(chunk_id = %write.chunk_id, dishes = write.dishes.len(), "merged graph chunk");
        Ok(())
    }

    async fn chunk_context(&self, chunk_id: &ChunkId) -> Result<Option<GraphContext>, StoreError> {
        let client = &self.reader;
        let exists = client
            .query_opt(self.sql.chunk_exists.as_str(), &[&chunk_id.as_str()])
            .await
            .map_err(|err| StoreError::unavailable(STORE, err))?;
        if exists.is_none() {
            return Ok(None);
        }

        let sources = client
            .query(self.sql.chunk_sources.as_str(), &[&chunk_id.as_str()])
            .await
            .map_err(|err| StoreError::unavailable(STORE, err))?;
        let mut context = GraphContext::default();
        for row in &sources {
            let label: String = row.get("src_label");
            let key: String = row.get("src_key");
            if label == NodeLabel::Restaurant.as_str() && context.restaurant.is_none() {
                context.restaurant = Some(key);
            } else if label == NodeLabel::Dish.as_str() {
                context.featured_dishes.push(key);
            }
        }

        if let Some(restaurant) = &context.restaurant {
            let rows = client
                .query(self.sql.menu.as_str(), &[restaurant])
                .await
                .map_err(|err| StoreError::unavailable(STORE, err))?;
            context.menu = rows
                .iter()
                .map(|row| MenuItem {
                    name: row.get("dst_key"),
                    price: row
                        .get::<_, Option<i32>>("price")
                        .and_then(|price| u32::try_from(price).ok()),
                })
                .collect();
        }
        Ok(Some(context))
    }

    async fn has_chunk(&self, chunk_id: &ChunkId) -> Result<bool, StoreError> {
        let row = self
            .reader
            .query_opt(self.sql.chunk_exists.as_str(), &[&chunk_id.as_str()])
            .await
            .map_err(|err| StoreError::unavailable(STORE, err))?;
        Ok(row.is_some())
    }
}

async fn merge_in<C: GenericClient>(
    client: &C,
    sql: &GraphSql,
    write: &GraphWrite,
) -> Result<(), tokio_postgres::Error> {
    let chunk_id = write.chunk_id.as_str();
    let props = Json(serde_json::json!({ "text": write.text }));
    client
        .execute(sql.merge_chunk_node.as_str(), &[&chunk_id, &props])
        .await?;

    let restaurant = write.restaurant.as_deref();
    if let Some(name) = restaurant {
        client
            .execute(sql.merge_node.as_str(), &[&NodeLabel::Restaurant.as_str(), &name])
            .await?;
        client
            .execute(
                sql.merge_has_chunk.as_str(),
                &[&NodeLabel::Restaurant.as_str(), &name, &chunk_id],
            )
            .await?;
    }
    for dish in &write.dishes {
        let dish_name = dish.name.as_str();
        client
            .execute(sql.merge_node.as_str(), &[&NodeLabel::Dish.as_str(), &dish_name])
            .await?;
        client
            .execute(
                sql.merge_has_chunk.as_str(),
                &[&NodeLabel::Dish.as_str(), &dish_name, &chunk_id],
            )
            .await?;
        if let Some(name) = restaurant {
            let price = dish.price.and_then(|price| i32::try_from(price).ok());
            client
                .execute(sql.merge_serves.as_str(), &[&name, &dish_name, &price])
                .await?;
        }
    }
    Ok(())
}

async fn ensure_schema(client: &Client, nodes: &TableName, edges: &TableName) -> anyhow::Result<()> {
    let nodes_ddl = format!(
        "CREATE TABLE IF NOT EXISTS {} (
            label TEXT NOT NULL,
            key TEXT NOT NULL,
            props JSONB NOT NULL DEFAULT '{{}}'::jsonb,
            PRIMARY KEY (label, key)
        )",
        nodes.qualified()
    );
    client
        .execute(&nodes_ddl, &[])
        .await
        .context("failed to create graph node table")?;
    let edges_ddl = format!(
        "CREATE TABLE IF NOT EXISTS {} (
            kind TEXT NOT NULL,
            src_label TEXT NOT NULL,
            src_key TEXT NOT NULL,
            dst_label TEXT NOT NULL,
            dst_key TEXT NOT NULL,
            props JSONB NOT NULL DEFAULT '{{}}'::jsonb,
            PRIMARY KEY (kind, src_label, src_key, dst_label, dst_key)
        )",
        edges.qualified()
    );
    client
        .execute(&edges_ddl, &[])
        .await
        .context("failed to create graph edge table")?;
    let dst_index = format!(
        "CREATE INDEX IF NOT EXISTS {} ON {} (dst_label, dst_key)",
        edges.index_name("dst"),
        edges.qualified()
    );
    client
        .execute(&dst_index, &[])
        .await
        .context("failed to ensure graph edge index")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merges_are_conflict_keyed() {
        let base = TableName::new("public", "menu_graph").expect("table");
        let sql = GraphSql::new(&base.with_suffix("nodes"), &base.with_suffix("edges"));
        assert!(sql.merge_node.contains("\"public\".\"menu_graph_nodes\""));
        assert!(sql.merge_node.contains("ON CONFLICT (label, key) DO NOTHING"));
        assert!(sql
            .merge_serves
            .contains("ON CONFLICT (kind, src_label, src_key, dst_label, dst_key) DO UPDATE"));
        assert!(sql.menu.contains("ORDER BY dst_key"));
    }

    // Runs only when MENURAG_TEST_DATABASE_URL points at a scratch database.
    #[tokio::test(flavor = "current_thread")]
    async fn lookups_do_not_wait_on_the_write_lock() {
        let Ok(url) = std::env::var("MENURAG_TEST_DATABASE_URL") else {
            return;
        };
        let base = TableName::new("public", format!("menurag_graph_{}", std::process::id()))
            .expect("table");
        let writer = crate::pg::connect(&url).await.expect("writer");
        let reader = crate::pg::connect(&url).await.expect("reader");
        let store = PgGraphStore::new(writer, reader, base.clone(), true)
            .await
            .expect("store");
        let chunk_id = ChunkId::from_stored("c1");
        store
            .merge_chunk(&GraphWrite {
                chunk_id: chunk_id.clone(),
                text: "Paneer Tikka ₹250".into(),
                restaurant: Some("Bikanervala".into()),
                dishes: vec![crate::chunk::DishMention {
                    name: "Paneer Tikka".into(),
                    price: Some(250),
                }],
            })
            .await
            .expect("merge");

        let held = store.writer.lock().await;
        let lookups = futures_util::future::join_all(
            (0..4).map(|_| store.chunk_context(&chunk_id)),
        );
        let contexts = tokio::time::timeout(std::time::Duration::from_secs(5), lookups)
            .await
            .expect("lookups finish while a merge holds the writer");
        for context in contexts {
            let context = context.expect("lookup").expect("chunk present");
            assert_eq!(context.restaurant.as_deref(), Some("Bikanervala"));
        }
        drop(held);

        let drop_sql = format!(
            "DROP TABLE IF EXISTS {}, {}",
            base.with_suffix("nodes").qualified(),
            base.with_suffix("edges").qualified()
        );
        store.reader.batch_execute(&drop_sql).await.expect("cleanup");
    }
}

//! The store handle: connection, retries, batched upserts, reads.

use crate::bolt::{json_to_bolt, rows_to_bolt};
use crate::config::StoreConfig;
use crate::errors::{Result, StoreError};
use crate::fulltext::{FulltextHit, escape_query};
use crate::schema::{EdgeSpec, NodeLabel, node_upsert_statement, schema_statements};

use neo4rs::{ConfigBuilder, Graph, query};
use rand::Rng;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Parameter list handed to the generic query helpers.
pub type Params = Vec<(&'static str, Value)>;

/// Thread-safe handle to the graph store. Cloning shares the underlying
/// connection pool.
#[derive(Clone)]
pub struct GraphStore {
    graph: Graph,
    cfg: StoreConfig,
}

impl GraphStore {
    /// Connect and verify the store answers a trivial query.
    pub async fn connect(cfg: StoreConfig) -> Result<Self> {
        let driver_cfg = ConfigBuilder::default()
            .uri(&cfg.uri)
            .user(&cfg.user)
            .password(&cfg.password)
            .db(cfg.database.as_str())
            .max_connections(cfg.max_connections)
            .build()
            .map_err(StoreError::from_driver)?;

        let graph = Graph::connect(driver_cfg)
            .await
            .map_err(StoreError::from_driver)?;

        let store = Self { graph, cfg };
        store.fetch_count("RETURN 0 AS n", vec![]).await?;
        info!("store: connected -> {}", store.cfg.uri);
        Ok(store)
    }

    /// Idempotent schema application: constraints, range indexes, fulltext.
    pub async fn apply_schema(&self) -> Result<()> {
        let stmts = schema_statements();
        for stmt in &stmts {
            self.run(stmt, vec![]).await?;
        }
        info!("store: schema applied ({} statements)", stmts.len());
        Ok(())
    }

    /// Destructive reset: removes every node and relationship.
    pub async fn wipe(&self) -> Result<()> {
        warn!("store: wiping graph");
        self.run("MATCH (n) DETACH DELETE n", vec![]).await
    }

    /// Upsert a batch of node rows (flat JSON objects including the label's
    /// key property). Returns the number of rows submitted.
    pub async fn batch_upsert_nodes(&self, label: NodeLabel, rows: &[Value]) -> Result<usize> {
        if rows.is_empty() {
            return Ok(0);
        }
        let stmt = node_upsert_statement(label);
        self.run_with_rows(&stmt, rows).await?;
        debug!("store: upserted {} {} node(s)", rows.len(), label);
        Ok(rows.len())
    }

    /// Upsert a batch of edge rows (`{from, to, props}` objects). Endpoints
    /// are matched by key; rows with missing endpoints are dropped by MERGE
    /// semantics. Returns the number of rows submitted.
    pub async fn batch_upsert_edges(&self, spec: EdgeSpec, rows: &[Value]) -> Result<usize> {
        if rows.is_empty() {
            return Ok(0);
        }
        let stmt = spec.upsert_statement();
        self.run_with_rows(&stmt, rows).await?;
        debug!("store: upserted {} {} edge(s)", rows.len(), spec.edge);
        Ok(rows.len())
    }

    /// Run several statements in one write transaction: all or nothing.
    pub async fn run_in_txn(&self, statements: Vec<(String, Params)>) -> Result<()> {
        let mut txn = self
            .graph
            .start_txn()
            .await
            .map_err(StoreError::from_driver)?;

        for (stmt, params) in &statements {
            let mut q = query(stmt);
            for (key, value) in params {
                if let Some(bolt) = json_to_bolt(value) {
                    q = q.param(key, bolt);
                }
            }
            if let Err(err) = txn.run(q).await {
                let mapped = StoreError::from_driver(err);
                if let Err(rb) = txn.rollback().await {
                    warn!("store: rollback failed: {rb}");
                }
                return Err(mapped);
            }
        }

        txn.commit().await.map_err(StoreError::from_driver)
    }

    /// Fire a write statement with retry on transient failures.
    pub async fn run(&self, cypher: &str, params: Params) -> Result<()> {
        self.with_retry(cypher, &params, |q| async {
            self.graph.run(q).await.map_err(StoreError::from_driver)
        })
        .await
    }

    /// Fetch a single integer; an empty result yields 0, never an error.
    pub async fn fetch_count(&self, cypher: &str, params: Params) -> Result<i64> {
        let rows = self.fetch_maps(cypher, params, &["n"]).await?;
        Ok(rows
            .first()
            .and_then(|r| r.get("n"))
            .and_then(Value::as_i64)
            .unwrap_or(0))
    }

    /// Fetch rows as JSON objects containing the requested columns.
    pub async fn fetch_maps(
        &self,
        cypher: &str,
        params: Params,
        columns: &[&str],
    ) -> Result<Vec<serde_json::Map<String, Value>>> {
        self.with_retry(cypher, &params, |q| async {
            let mut stream = self
                .graph
                .execute(q)
                .await
                .map_err(StoreError::from_driver)?;
            let mut out = Vec::new();
            while let Some(row) = stream.next().await.map_err(StoreError::from_driver)? {
                let mut obj = serde_json::Map::new();
                for col in columns {
                    let value: Value = row
                        .get::<Value>(col)
                        .map_err(|e| StoreError::Decode(format!("column {col}: {e}")))?;
                    obj.insert((*col).to_string(), value);
                }
                out.push(obj);
            }
            Ok(out)
        })
        .await
    }

    /// Fulltext sweep with reserved-character escaping. Results are scored
    /// hits identified by the node's key property.
    pub async fn fulltext_search(
        &self,
        index: &str,
        term: &str,
        limit: usize,
    ) -> Result<Vec<FulltextHit>> {
        let cypher = "CALL db.index.fulltext.queryNodes($index, $q) YIELD node, score \
                      RETURN coalesce(node.id, node.uid, node.slug, node.path, node.hash) AS key, \
                             labels(node)[0] AS label, score \
                      LIMIT $limit";
        let params: Params = vec![
            ("index", Value::String(index.to_string())),
            ("q", Value::String(escape_query(term))),
            ("limit", Value::from(limit as i64)),
        ];
        let rows = self.fetch_maps(cypher, params, &["key", "label", "score"]).await?;
        Ok(rows
            .into_iter()
            .filter_map(|r| {
                Some(FulltextHit {
                    key: r.get("key")?.as_str()?.to_string(),
                    label: r.get("label")?.as_str()?.to_string(),
                    score: r.get("score")?.as_f64()?,
                })
            })
            .collect())
    }

    async fn run_with_rows(&self, stmt: &str, rows: &[Value]) -> Result<()> {
        let bolt_rows = rows_to_bolt(rows);
        self.retry_loop(|| {
            let q = query(stmt).param("rows", bolt_rows.clone());
            async { self.graph.run(q).await.map_err(StoreError::from_driver) }
        })
        .await
    }

    async fn with_retry<T, F, Fut>(&self, cypher: &str, params: &Params, op: F) -> Result<T>
    where
        F: Fn(neo4rs::Query) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.retry_loop(|| {
            let mut q = query(cypher);
            for (key, value) in params {
                if let Some(bolt) = json_to_bolt(value) {
                    q = q.param(key, bolt);
                }
            }
            op(q)
        })
        .await
    }

    /// Exponential backoff (250 ms base, doubling, with jitter) for transient
    /// failures; everything else is returned on the first attempt.
    async fn retry_loop<T, F, Fut>(&self, make: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let budget = self.cfg.max_retries.max(1);
        let timeout = Duration::from_secs(self.cfg.query_timeout_s);
        let mut last = String::new();

        for attempt in 0..budget {
            let outcome = match tokio::time::timeout(timeout, make()).await {
                Ok(res) => res,
                Err(_) => Err(StoreError::Unavailable(format!(
                    "query timeout after {}s",
                    self.cfg.query_timeout_s
                ))),
            };
            match outcome {
                Ok(v) => return Ok(v),
                Err(err) if err.is_transient() && attempt + 1 < budget => {
                    let base = 250u64 * (1u64 << attempt.min(6));
                    let jitter = rand::thread_rng().gen_range(0..=base / 2);
                    let delay = Duration::from_millis(base + jitter);
                    warn!(
                        "store: transient failure (attempt {}/{}), retrying in {:?}: {err}",
                        attempt + 1,
                        budget,
                        delay
                    );
                    last = err.to_string();
                    tokio::time::sleep(delay).await;
                }
                Err(err) if err.is_transient() => {
                    return Err(StoreError::RetriesExhausted {
                        attempts: budget,
                        last: if last.is_empty() { err.to_string() } else { last },
                    });
                }
                Err(err) => return Err(err),
            }
        }
        unreachable!("retry loop always returns")
    }
}

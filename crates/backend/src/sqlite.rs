//! Document store on SQLite.
//!
//! Each instance is one JSON document. `tenant_id`, `status` and `created_at`
//! are copied into indexed columns so listing never parses documents it
//! filters out.

use crate::{BackendConfig, BackendError, BackendResult, InstanceStore};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use conductor_types::{InstanceFilter, InstanceId, WorkflowInstance};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{QueryBuilder, Row, Sqlite};
use std::str::FromStr;
use std::time::Duration;

const SCHEMA: [&str; 3] = [
    r#"
    CREATE TABLE IF NOT EXISTS workflow_instances (
        instance_id TEXT PRIMARY KEY,
        workflow_name TEXT NOT NULL,
        tenant_id TEXT NOT NULL,
        status TEXT NOT NULL,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        document TEXT NOT NULL
    );
    "#,
    r#"CREATE INDEX IF NOT EXISTS workflow_instances_tenant_created
        ON workflow_instances(tenant_id, created_at DESC);"#,
    r#"CREATE INDEX IF NOT EXISTS workflow_instances_status
        ON workflow_instances(status);"#,
];

#[derive(Debug, Clone)]
pub struct SqliteDocumentStore {
    pool: SqlitePool,
}

impl SqliteDocumentStore {
    /// Connect using `config.url` and create the schema if needed.
    pub async fn connect(config: &BackendConfig) -> BackendResult<Self> {
        let options = SqliteConnectOptions::from_str(&config.url)
            .map_err(|e| BackendError::Unavailable(e.to_string()))?
            .create_if_missing(true);

        // Every connection to `:memory:` is its own database.
        let in_memory = config.url.contains(":memory:") || config.url.contains("mode=memory");
        let mut pool_options = SqlitePoolOptions::new()
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs.max(1)));
        pool_options = if in_memory {
            pool_options
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            pool_options.max_connections(config.max_connections.max(1))
        };

        let pool = pool_options
            .connect_with(options)
            .await
            .map_err(|e| BackendError::Unavailable(e.to_string()))?;

        let store = Self { pool };
        store.initialize_schema().await?;
        tracing::debug!(url = %config.url, in_memory, "sqlite document store ready");
        Ok(store)
    }

    async fn initialize_schema(&self) -> BackendResult<()> {
        for stmt in SCHEMA {
            sqlx::query(stmt).execute(&self.pool).await?;
        }
        Ok(())
    }

    /// Fixed-width timestamps keep lexical and chronological order equal.
    fn timestamp(value: DateTime<Utc>) -> String {
        value.to_rfc3339_opts(SecondsFormat::Micros, true)
    }

    fn decode(document: &str) -> BackendResult<WorkflowInstance> {
        Ok(serde_json::from_str(document)?)
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl InstanceStore for SqliteDocumentStore {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    async fn store(&self, instance: &WorkflowInstance) -> BackendResult<()> {
        let document = serde_json::to_string(instance)?;
        sqlx::query(
            r#"
            INSERT INTO workflow_instances
                (instance_id, workflow_name, tenant_id, status, created_at, updated_at, document)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(instance.instance_id.to_string())
        .bind(&instance.workflow_name)
        .bind(&instance.tenant_id)
        .bind(instance.status.as_str())
        .bind(Self::timestamp(instance.created_at))
        .bind(Self::timestamp(Utc::now()))
        .bind(document)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, instance_id: &InstanceId) -> BackendResult<Option<WorkflowInstance>> {
        let row = sqlx::query("SELECT document FROM workflow_instances WHERE instance_id = ?")
            .bind(instance_id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(record) => {
                let document: String = record.try_get("document")?;
                Ok(Some(Self::decode(&document)?))
            }
            None => Ok(None),
        }
    }

    async fn update(&self, instance: &WorkflowInstance) -> BackendResult<bool> {
        let document = serde_json::to_string(instance)?;
        let result = sqlx::query(
            r#"
            UPDATE workflow_instances
            SET status = ?, updated_at = ?, document = ?
            WHERE instance_id = ?
            "#,
        )
        .bind(instance.status.as_str())
        .bind(Self::timestamp(Utc::now()))
        .bind(document)
        .bind(instance.instance_id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list(&self, filter: &InstanceFilter) -> BackendResult<Vec<WorkflowInstance>> {
        let mut query: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT document FROM workflow_instances WHERE 1 = 1");
        if let Some(tenant_id) = &filter.tenant_id {
            query.push(" AND tenant_id = ").push_bind(tenant_id.clone());
        }
        if let Some(status) = filter.status {
            query.push(" AND status = ").push_bind(status.as_str());
        }
        query
            .push(" ORDER BY created_at DESC, instance_id DESC LIMIT ")
            .push_bind(i64::try_from(filter.limit).unwrap_or(i64::MAX))
            .push(" OFFSET ")
            .push_bind(i64::try_from(filter.offset).unwrap_or(i64::MAX));

        let rows = query.build().fetch_all(&self.pool).await?;
        rows.into_iter()
            .map(|row| {
                let document: String = row.try_get("document")?;
                Self::decode(&document)
            })
            .collect()
    }
}

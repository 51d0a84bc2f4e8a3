//! Metrics persistence
//!
//! One row per flush window: `(id, volume, velocity, right_align, left_align, timestamp)`.
//! Two backends:
//! - JSONL file (one JSON object per line), the default
//! - PostgreSQL table, created on first use (feature `postgres`)

use crate::domain::types::MetricsRecord;
use crate::infra::config::{Config, PersistenceBackend};
use crate::io::error::SinkError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

/// Durable destination for flushed metrics
#[async_trait]
pub trait PersistenceSink: Send + Sync {
    async fn append_metrics_record(&self, record: &MetricsRecord) -> Result<(), SinkError>;

    fn name(&self) -> &'static str;
}

/// Appends records to a JSONL file
pub struct JsonlMetricsSink {
    file_path: PathBuf,
}

impl JsonlMetricsSink {
    pub fn new(file_path: impl AsRef<Path>) -> Self {
        let file_path = file_path.as_ref().to_path_buf();
        info!(file_path = %file_path.display(), "jsonl_sink_initialized");
        Self { file_path }
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }
}

#[async_trait]
impl PersistenceSink for JsonlMetricsSink {
    async fn append_metrics_record(&self, record: &MetricsRecord) -> Result<(), SinkError> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        // Create parent directories if they don't exist
        if let Some(parent) = self.file_path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.file_path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;

        debug!(file = %self.file_path.display(), bytes = line.len(), "metrics_record_written");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "jsonl"
    }
}

/// Reject table names that would need quoting
pub fn is_valid_table_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(feature = "postgres")]
pub use postgres::PostgresMetricsSink;

#[cfg(feature = "postgres")]
mod postgres {
    use super::*;
    use sqlx::postgres::PgPoolOptions;
    use sqlx::PgPool;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;
    use tracing::warn;

    /// Inserts records into a PostgreSQL table
    pub struct PostgresMetricsSink {
        pool: PgPool,
        table: String,
        table_ready: AtomicBool,
    }

    impl PostgresMetricsSink {
        /// Create a lazily-connecting pool; the database may come up after the gateway
        pub fn connect_lazy(database_url: &str, table: &str) -> Result<Self, SinkError> {
            if !is_valid_table_name(table) {
                return Err(SinkError::Unavailable(format!("invalid table name {:?}", table)));
            }

            let pool = PgPoolOptions::new()
                .max_connections(2)
                .acquire_timeout(Duration::from_secs(5))
                .connect_lazy(database_url)?;

            Ok(Self { pool, table: table.to_string(), table_ready: AtomicBool::new(false) })
        }

        /// Probe the latest id; create the table if the probe fails
        pub async fn ensure_table(&self) -> Result<(), SinkError> {
            let probe = format!("SELECT id FROM {} ORDER BY id DESC LIMIT 1", self.table);
            match sqlx::query(&probe).fetch_optional(&self.pool).await {
                Ok(_) => {
                    debug!(table = %self.table, "metrics_table_present");
                }
                Err(e) => {
                    info!(table = %self.table, probe_error = %e, "metrics_table_creating");
                    let create = format!(
                        "CREATE TABLE IF NOT EXISTS {} (id SERIAL PRIMARY KEY, volume REAL, \
                         velocity REAL, right_align REAL, left_align REAL, \
                         timestamp TIMESTAMP WITHOUT TIME ZONE)",
                        self.table
                    );
                    sqlx::query(&create).execute(&self.pool).await?;
                }
            }
            self.table_ready.store(true, Ordering::Relaxed);
            Ok(())
        }
    }

    #[async_trait]
    impl PersistenceSink for PostgresMetricsSink {
        async fn append_metrics_record(&self, record: &MetricsRecord) -> Result<(), SinkError> {
            if !self.table_ready.load(Ordering::Relaxed) {
                if let Err(e) = self.ensure_table().await {
                    warn!(table = %self.table, error = %e, "metrics_table_unavailable");
                    return Err(e);
                }
            }

            let insert = format!(
                "INSERT INTO {} (volume, velocity, right_align, left_align, timestamp) \
                 VALUES ($1, $2, $3, $4, $5)",
                self.table
            );
            sqlx::query(&insert)
                .bind(record.volume as f32)
                .bind(record.velocity as f32)
                .bind(record.right_align as f32)
                .bind(record.left_align as f32)
                .bind(record.timestamp.naive_utc())
                .execute(&self.pool)
                .await?;
            Ok(())
        }

        fn name(&self) -> &'static str {
            "postgres"
        }
    }
}

/// Build the sink selected in config
pub async fn build_persistence_sink(config: &Config) -> anyhow::Result<Arc<dyn PersistenceSink>> {
    match config.persistence_backend() {
        PersistenceBackend::Jsonl => Ok(Arc::new(JsonlMetricsSink::new(config.persistence_file()))),
        #[cfg(feature = "postgres")]
        PersistenceBackend::Postgres => {
            let url = config
                .database_url()
                .ok_or_else(|| anyhow::anyhow!("persistence.database_url is required for postgres"))?;
            let sink = PostgresMetricsSink::connect_lazy(url, config.persistence_table())?;
            if let Err(e) = sink.ensure_table().await {
                // Retried on the first insert
                tracing::warn!(error = %e, "metrics_table_bootstrap_deferred");
            }
            Ok(Arc::new(sink))
        }
        #[cfg(not(feature = "postgres"))]
        PersistenceBackend::Postgres => {
            anyhow::bail!("postgres backend requires building with the `postgres` feature")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use std::fs;
    use tempfile::tempdir;

    fn record(volume: f64) -> MetricsRecord {
        MetricsRecord {
            volume,
            velocity: 0.025,
            right_align: 0.5,
            left_align: -0.3,
            alignment_samples: 30,
            timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_write_record() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("metrics.jsonl");
        let sink = JsonlMetricsSink::new(&file_path);

        sink.append_metrics_record(&record(0.5)).await.unwrap();

        let content = fs::read_to_string(&file_path).unwrap();
        assert!(content.ends_with('\n'));
        let parsed: serde_json::Value = serde_json::from_str(content.trim()).unwrap();
        assert_eq!(parsed["volume"], 0.5);
        assert_eq!(parsed["velocity"], 0.025);
        assert_eq!(parsed["right_align"], 0.5);
        assert_eq!(parsed["left_align"], -0.3);
        assert_eq!(parsed["alignment_samples"], 30);
        assert_eq!(parsed["timestamp"], "2024-05-01T12:00:00Z");
    }

    #[tokio::test]
    async fn test_append_mode() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("metrics.jsonl");
        fs::write(&file_path, "{\"existing\":\"data\"}\n").unwrap();

        let sink = JsonlMetricsSink::new(&file_path);
        sink.append_metrics_record(&record(1.0)).await.unwrap();
        sink.append_metrics_record(&record(2.0)).await.unwrap();

        let content = fs::read_to_string(&file_path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].contains("existing"));
        for line in &lines[1..] {
            let _parsed: serde_json::Value = serde_json::from_str(line).unwrap();
        }
    }

    #[tokio::test]
    async fn test_creates_parent_directories() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("nested").join("dir").join("metrics.jsonl");
        let sink = JsonlMetricsSink::new(&nested);
        sink.append_metrics_record(&record(1.0)).await.unwrap();
        assert!(nested.exists());
    }

    #[tokio::test]
    async fn test_unwritable_path_is_an_error() {
        let dir = tempdir().unwrap();
        // A directory cannot be opened for appending
        let sink = JsonlMetricsSink::new(dir.path());
        assert!(matches!(
            sink.append_metrics_record(&record(1.0)).await,
            Err(SinkError::Io(_))
        ));
    }

    #[test]
    fn test_table_name_validation() {
        assert!(is_valid_table_name("metrics"));
        assert!(is_valid_table_name("_metrics_2"));
        assert!(!is_valid_table_name(""));
        assert!(!is_valid_table_name("2metrics"));
        assert!(!is_valid_table_name("metrics; DROP TABLE x"));
        assert!(!is_valid_table_name("public.metrics"));
    }

    #[tokio::test]
    async fn test_build_default_sink_is_jsonl() {
        let sink = build_persistence_sink(&Config::default()).await.unwrap();
        assert_eq!(sink.name(), "jsonl");
    }
}

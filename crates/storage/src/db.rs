use bankin_core::{BatchStats, CustomerKey, ResolvedBy, RowDisposition};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{sqlite::SqlitePoolOptions, Pool, Sqlite, SqliteConnection};
use std::path::Path;
use thiserror::Error;

pub type DbPool = Pool<Sqlite>;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Db(#[from] sqlx::Error),
    #[error("Stored JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Corrupt stored value: {0}")]
    Corrupt(String),
}

pub async fn create_db(path: &Path) -> Result<DbPool, sqlx::Error> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect(&format!("sqlite:{}?mode=rwc", path.display()))
        .await?;

    sqlx::query("PRAGMA journal_mode = WAL")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA foreign_keys = ON")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA synchronous = NORMAL")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA busy_timeout = 5000")
        .execute(&pool)
        .await?;

    run_migrations(&pool).await?;

    Ok(pool)
}

async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS runs (
            id TEXT PRIMARY KEY,
            input_path TEXT NOT NULL,
            output_path TEXT NOT NULL,
            profile TEXT NOT NULL,
            input_sha256 TEXT NOT NULL,
            started_at TEXT NOT NULL,
            finished_at TEXT NOT NULL,
            stats TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_runs_sha ON runs(input_sha256)")
        .execute(pool)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS row_dispositions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            run_id TEXT NOT NULL,
            row_index INTEGER NOT NULL,
            original_candidate TEXT NOT NULL,
            final_name TEXT NOT NULL,
            resolved_by TEXT NOT NULL,
            customer_id TEXT,
            customer_number TEXT,
            score REAL,
            remark TEXT,
            FOREIGN KEY (run_id) REFERENCES runs(id) ON DELETE CASCADE
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS ai_traces (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            run_id TEXT NOT NULL,
            row_index INTEGER NOT NULL,
            matched INTEGER NOT NULL,
            trace TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            FOREIGN KEY (run_id) REFERENCES runs(id) ON DELETE CASCADE
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

// ── Runs ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct NewRun<'a> {
    pub input_path: &'a Path,
    pub output_path: &'a Path,
    pub profile: &'a str,
    pub input_sha256: &'a str,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub stats: &'a BatchStats,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunRecord {
    pub id: String,
    pub input_path: String,
    pub output_path: String,
    pub profile: String,
    pub input_sha256: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub stats: BatchStats,
}

type RunRow = (String, String, String, String, String, DateTime<Utc>, DateTime<Utc>, String);

const RUN_COLUMNS: &str =
    "id, input_path, output_path, profile, input_sha256, started_at, finished_at, stats";

fn run_from_row(r: RunRow) -> Result<RunRecord, StorageError> {
    Ok(RunRecord {
        id: r.0,
        input_path: r.1,
        output_path: r.2,
        profile: r.3,
        input_sha256: r.4,
        started_at: r.5,
        finished_at: r.6,
        stats: serde_json::from_str(&r.7)?,
    })
}

/// A reasoning trace to store alongside its run.
#[derive(Debug, Clone)]
pub struct NewTrace<'a, T> {
    pub row_index: usize,
    pub matched: bool,
    pub trace: &'a T,
}

/// Records a run with its dispositions and traces in one transaction and
/// returns the generated run id.
pub async fn record_batch<T: Serialize>(
    pool: &DbPool,
    run: &NewRun<'_>,
    dispositions: &[RowDisposition],
    traces: &[NewTrace<'_, T>],
) -> Result<String, StorageError> {
    let mut tx = pool.begin().await?;
    let id = insert_run(&mut *tx, run).await?;
    insert_dispositions(&mut *tx, &id, dispositions).await?;
    for trace in traces {
        insert_trace(&mut *tx, &id, trace).await?;
    }
    tx.commit().await?;
    Ok(id)
}

async fn insert_run(conn: &mut SqliteConnection, run: &NewRun<'_>) -> Result<String, StorageError> {
    let id = uuid::Uuid::new_v4().to_string();
    sqlx::query(
        "INSERT INTO runs (id, input_path, output_path, profile, input_sha256, started_at, finished_at, stats) VALUES (?, ?, ?, ?, ?, ?, ?, ?)"
    )
    .bind(&id)
    .bind(run.input_path.display().to_string())
    .bind(run.output_path.display().to_string())
    .bind(run.profile)
    .bind(run.input_sha256)
    .bind(run.started_at)
    .bind(run.finished_at)
    .bind(serde_json::to_string(run.stats)?)
    .execute(&mut *conn)
    .await?;
    Ok(id)
}

pub async fn get_run(pool: &DbPool, id: &str) -> Result<Option<RunRecord>, StorageError> {
    let row = sqlx::query_as::<_, RunRow>(&format!("SELECT {RUN_COLUMNS} FROM runs WHERE id = ?"))
        .bind(id)
        .fetch_optional(pool)
        .await?;
    row.map(run_from_row).transpose()
}

/// Earlier runs over byte-identical input, oldest first.
pub async fn find_runs_by_hash(pool: &DbPool, input_sha256: &str) -> Result<Vec<RunRecord>, StorageError> {
    let rows = sqlx::query_as::<_, RunRow>(&format!(
        "SELECT {RUN_COLUMNS} FROM runs WHERE input_sha256 = ? ORDER BY started_at"
    ))
    .bind(input_sha256)
    .fetch_all(pool)
    .await?;
    rows.into_iter().map(run_from_row).collect()
}

// ── Row dispositions ─────────────────────────────────────────────────────────

async fn insert_dispositions(
    conn: &mut SqliteConnection,
    run_id: &str,
    dispositions: &[RowDisposition],
) -> Result<(), sqlx::Error> {
    for d in dispositions {
        sqlx::query(
            "INSERT INTO row_dispositions (run_id, row_index, original_candidate, final_name, resolved_by, customer_id, customer_number, score, remark) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"
        )
        .bind(run_id)
        .bind(d.row_index as i64)
        .bind(&d.original_candidate)
        .bind(&d.final_name)
        .bind(d.resolved_by.as_str())
        .bind(d.registry_key.as_ref().map(|k| k.id.as_str()))
        .bind(d.registry_key.as_ref().map(|k| k.number.as_str()))
        .bind(d.score)
        .bind(d.remark.as_deref())
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

pub async fn get_run_dispositions(pool: &DbPool, run_id: &str) -> Result<Vec<RowDisposition>, StorageError> {
    let rows = sqlx::query_as::<
        _,
        (i64, String, String, String, Option<String>, Option<String>, Option<f64>, Option<String>),
    >(
        "SELECT row_index, original_candidate, final_name, resolved_by, customer_id, customer_number, score, remark FROM row_dispositions WHERE run_id = ? ORDER BY row_index"
    )
    .bind(run_id)
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|r| -> Result<RowDisposition, StorageError> {
            let resolved_by: ResolvedBy = r.3.parse().map_err(StorageError::Corrupt)?;
            let registry_key = match (r.4, r.5) {
                (Some(id), Some(number)) => Some(CustomerKey { id, number }),
                _ => None,
            };
            Ok(RowDisposition {
                row_index: r.0 as usize,
                original_candidate: r.1,
                final_name: r.2,
                resolved_by,
                registry_key,
                score: r.6,
                remark: r.7,
            })
        })
        .collect()
}

// ── Assisted-match traces ────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct AiTraceRecord {
    pub row_index: usize,
    pub matched: bool,
    pub trace: serde_json::Value,
}

async fn insert_trace<T: Serialize>(
    conn: &mut SqliteConnection,
    run_id: &str,
    trace: &NewTrace<'_, T>,
) -> Result<(), StorageError> {
    sqlx::query("INSERT INTO ai_traces (run_id, row_index, matched, trace) VALUES (?, ?, ?, ?)")
        .bind(run_id)
        .bind(trace.row_index as i64)
        .bind(trace.matched as i64)
        .bind(serde_json::to_string(trace.trace)?)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

pub async fn get_ai_traces(pool: &DbPool, run_id: &str) -> Result<Vec<AiTraceRecord>, StorageError> {
    let rows = sqlx::query_as::<_, (i64, i64, String)>(
        "SELECT row_index, matched, trace FROM ai_traces WHERE run_id = ? ORDER BY row_index, id",
    )
    .bind(run_id)
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|r| -> Result<AiTraceRecord, StorageError> {
            Ok(AiTraceRecord {
                row_index: r.0 as usize,
                matched: r.1 != 0,
                trace: serde_json::from_str(&r.2)?,
            })
        })
        .collect()
}

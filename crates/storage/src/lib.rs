pub mod db;

pub use db::{
    create_db, find_runs_by_hash, get_ai_traces, get_run, get_run_dispositions, record_batch, AiTraceRecord, DbPool,
    NewRun, NewTrace, RunRecord, StorageError,
};

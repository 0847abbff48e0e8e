use std::path::{Path, PathBuf};

use bankin_assist::{AiTrace, DisambiguationRequest, Disambiguator, LanguageModel, MatchDecision};
use bankin_core::{
    is_populated, BatchSpec, BatchStats, ResolvedBy, RowDisposition, TransactionRow, REMARK_MISSING_NAME,
    REMARK_NOT_FOUND,
};
use bankin_import::{
    clean, compose_description, predict, reconcile, BatchFile, BatchFileError, DescriptionParser, ProfileError,
    RegistryError, RegistryKind, Tier,
};
use bankin_storage::{DbPool, NewRun, NewTrace, StorageError};
use chrono::Utc;
use serde::Serialize;
use thiserror::Error;

use crate::context::ResolutionContext;
use crate::hash;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Batch file error: {0}")]
    BatchFile(#[from] BatchFileError),
    #[error("Profile error: {0}")]
    Profile(#[from] ProfileError),
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("Database error: {0}")]
    Db(#[from] sqlx::Error),
    #[error("Report serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Why one row could not be processed. The batch carries on.
#[derive(Debug, Error)]
pub enum RowError {
    #[error("Invalid posting date: {0}")]
    InvalidDate(String),
}

/// Everything one batch decided, row by row.
#[derive(Debug, Serialize)]
pub struct BatchReport {
    pub input: PathBuf,
    pub output: PathBuf,
    /// Where the JSON copy of this report was written.
    pub report_path: PathBuf,
    pub profile: String,
    pub input_sha256: String,
    /// Set when the report was recorded in the audit store.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    pub dispositions: Vec<RowDisposition>,
    pub traces: Vec<AiTrace>,
    /// Rows that lost cells past the last input column.
    pub overlong_rows: Vec<usize>,
    pub stats: BatchStats,
}

struct RowOutcome {
    disposition: RowDisposition,
    trace: Option<AiTrace>,
    /// Whether the row's fields changed and must be written back.
    modified: bool,
}

/// Orchestrates: read → parse → clean → suggest → reconcile → assist → write.
pub struct BatchPipeline<M: LanguageModel> {
    context: ResolutionContext,
    assistant: Option<Disambiguator<M>>,
    store: Option<DbPool>,
}

impl<M: LanguageModel> BatchPipeline<M> {
    pub fn new(context: ResolutionContext) -> Self {
        Self {
            context,
            assistant: None,
            store: None,
        }
    }

    pub fn with_assistant(mut self, assistant: Disambiguator<M>) -> Self {
        self.assistant = Some(assistant);
        self
    }

    pub fn with_store(mut self, pool: DbPool) -> Self {
        self.store = Some(pool);
        self
    }

    pub fn context(&self) -> &ResolutionContext {
        &self.context
    }

    pub fn assistant(&self) -> Option<&Disambiguator<M>> {
        self.assistant.as_ref()
    }

    /// Processes one batch file and writes the derived output file.
    pub async fn run_batch(&self, spec: &BatchSpec, output_dir: Option<&Path>) -> Result<BatchReport, PipelineError> {
        let started_at = Utc::now();
        let output = spec.output_path(output_dir);
        tracing::info!("Processing batch: {} ({})", spec.input.display(), spec.profile);

        let bytes = tokio::fs::read(&spec.input).await?;
        let input_sha256 = hash::fingerprint(&bytes);
        if let Some(pool) = &self.store {
            let earlier = bankin_storage::find_runs_by_hash(pool, &input_sha256).await?;
            if !earlier.is_empty() {
                tracing::info!("Input seen in {} earlier run(s); transferred rows stay untouched", earlier.len());
            }
        }

        let profile = self.context.profiles.get(&spec.profile)?;
        let parser = DescriptionParser::new(profile)?;
        let mut file = BatchFile::read(bytes.as_slice(), &profile.columns)?;
        let tiers = self.context.tiers()?;
        let directory = self.context.directory_tier()?;

        let mut report = BatchReport {
            input: spec.input.clone(),
            output: output.clone(),
            report_path: spec.report_path(output_dir),
            profile: spec.profile.clone(),
            input_sha256,
            run_id: None,
            dispositions: Vec::with_capacity(file.len()),
            traces: Vec::new(),
            overlong_rows: file.overlong_rows().to_vec(),
            stats: BatchStats::default(),
        };

        for mut row in file.rows() {
            let outcome = match self.process_row(&mut row, &parser, &tiers, directory.as_ref()).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::warn!("Row {} failed: {e}", row.index + 1);
                    row.remarks = e.to_string();
                    let mut disposition = RowDisposition::untouched(row.index, &row.customer_name, ResolvedBy::Failed);
                    disposition.remark = Some(e.to_string());
                    RowOutcome {
                        disposition,
                        trace: None,
                        modified: true,
                    }
                }
            };

            if outcome.modified {
                file.apply(&row);
            }
            report.stats.record(outcome.disposition.resolved_by);
            if let Some(trace) = outcome.trace {
                report.stats.ai_invocations += 1;
                if trace.failed() {
                    report.stats.ai_failures += 1;
                }
                report.traces.push(trace);
            }
            report.dispositions.push(outcome.disposition);
        }

        let mut buf = Vec::new();
        file.write(&mut buf)?;
        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&output, buf).await?;

        let s = &report.stats;
        tracing::info!(
            "Batch done: {} rows processed, {} matched (alias {}, directory {}, assistant {}), {} unresolved, {} transferred, {} skipped, {} failed",
            s.processed,
            s.matched(),
            s.matched_alias,
            s.matched_directory,
            s.matched_assistant,
            s.unresolved,
            s.already_transferred,
            s.skipped,
            s.failed
        );
        tracing::info!("Wrote {}", output.display());

        tokio::fs::write(&report.report_path, serde_json::to_vec_pretty(&report)?).await?;
        tracing::info!("Wrote report {}", report.report_path.display());

        if let Some(pool) = &self.store {
            report.run_id = Some(self.persist(pool, &report, started_at).await?);
        }
        Ok(report)
    }

    async fn process_row(
        &self,
        row: &mut TransactionRow,
        parser: &DescriptionParser,
        tiers: &[Tier<'_>],
        directory: Option<&Tier<'_>>,
    ) -> Result<RowOutcome, RowError> {
        if row.is_transferred() {
            return Ok(untouched(row, ResolvedBy::AlreadyTransferred));
        }
        if row.raw_date.is_empty() {
            return Ok(untouched(row, ResolvedBy::Skipped));
        }
        if row.posting_date.is_none() {
            return Err(RowError::InvalidDate(row.raw_date.clone()));
        }

        let candidate = if is_populated(&row.customer_name) {
            row.customer_name.trim().to_string()
        } else {
            let extraction = parser.extract_fields(&row.descriptions);
            let cleaned = clean(&extraction.candidate);
            row.description = compose_description(&cleaned.extra, &extraction.residual);
            predict(&extraction.candidate, self.context.suggester())
        };

        let mut disposition = RowDisposition::untouched(row.index, &candidate, ResolvedBy::Unresolved);
        let mut trace = None;

        let matched = reconcile(&candidate, tiers);
        if matched.matched {
            disposition.final_name = matched.canonical_name.unwrap_or_else(|| candidate.clone());
            disposition.resolved_by = match matched.registry {
                Some(RegistryKind::AliasTable) => ResolvedBy::AliasTable,
                _ => ResolvedBy::Directory,
            };
            disposition.registry_key = matched.registry_key;
            disposition.score = Some(matched.score);
        } else if let (Some(assistant), Some(directory)) = (&self.assistant, directory) {
            let descriptions: Vec<String> = row
                .descriptions
                .populated()
                .into_iter()
                .map(str::to_string)
                .collect();
            if !descriptions.is_empty() {
                let request = DisambiguationRequest {
                    row_index: row.index,
                    candidate: candidate.clone(),
                    descriptions,
                };
                let ai = assistant.resolve(&request, directory).await;
                if let MatchDecision::Matched { name, key, confidence } = &ai.decision {
                    disposition.final_name = name.clone();
                    disposition.resolved_by = ResolvedBy::Assistant;
                    disposition.registry_key = key.clone();
                    disposition.score = Some(confidence / 100.0);
                }
                trace = Some(ai);
            }
        }

        if disposition.resolved_by == ResolvedBy::Unresolved {
            let remark = if candidate.is_empty() {
                REMARK_MISSING_NAME
            } else {
                REMARK_NOT_FOUND
            };
            row.remarks = remark.to_string();
            disposition.remark = Some(remark.to_string());
        }
        row.customer_name = disposition.final_name.clone();

        tracing::debug!(
            "Row {}: {:?} -> {:?} via {}",
            row.index + 1,
            disposition.original_candidate,
            disposition.final_name,
            disposition.resolved_by
        );
        Ok(RowOutcome {
            disposition,
            trace,
            modified: true,
        })
    }

    async fn persist(
        &self,
        pool: &DbPool,
        report: &BatchReport,
        started_at: chrono::DateTime<Utc>,
    ) -> Result<String, PipelineError> {
        let traces: Vec<NewTrace<'_, AiTrace>> = report
            .traces
            .iter()
            .map(|trace| NewTrace {
                row_index: trace.row_index,
                matched: trace.decision.is_match(),
                trace,
            })
            .collect();
        let run_id = bankin_storage::record_batch(
            pool,
            &NewRun {
                input_path: &report.input,
                output_path: &report.output,
                profile: &report.profile,
                input_sha256: &report.input_sha256,
                started_at,
                finished_at: Utc::now(),
                stats: &report.stats,
            },
            &report.dispositions,
            &traces,
        )
        .await?;
        tracing::info!("Recorded run {run_id}");
        Ok(run_id)
    }
}

fn untouched(row: &TransactionRow, resolved_by: ResolvedBy) -> RowOutcome {
    RowOutcome {
        disposition: RowDisposition::untouched(row.index, &row.customer_name, resolved_by),
        trace: None,
        modified: false,
    }
}

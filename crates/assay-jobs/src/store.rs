use std::path::Path;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, MutexGuard};
use rusqlite::{Connection, OptionalExtension, Row, params};

use crate::settings::AnalysisSettings;
use crate::types::{AnalysisDefinition, JobRecord, JobStatus, new_id};
use crate::workflow::Workflow;
use crate::{JobError, Result};

mod embedded {
    use refinery::embed_migrations;
    embed_migrations!("migrations");
}

/// Fields of a job that are written when it reaches a terminal state.
#[derive(Debug, Clone, Default)]
pub struct JobOutcome {
    pub output: Option<String>,
    pub report: Option<String>,
}

const JOB_COLUMNS: &str = "j.id, j.analysis_id, a.name, j.status, j.output, j.report, j.created_at, j.updated_at";

/// Thin repository over SQLite for analyses and job records.
///
/// Thread-safe via internal `Mutex<Connection>`; independent runs share one
/// store and only ever touch their own rows.
pub struct JobStore {
    conn: Mutex<Connection>,
}

impl JobStore {
    /// Open (or create) the database at `path` and run pending migrations.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;

        let mut store = Self {
            conn: Mutex::new(conn),
        };
        store.run_migrations()?;
        Ok(store)
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;

        let mut store = Self {
            conn: Mutex::new(conn),
        };
        store.run_migrations()?;
        Ok(store)
    }

    fn run_migrations(&mut self) -> Result<()> {
        let conn = self.conn.get_mut();
        embedded::migrations::runner()
            .run(conn)
            .map_err(|e| JobError::Migration(e.to_string()))?;
        Ok(())
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock()
    }

    // ── Analyses ────────────────────────────────────────────────────

    pub fn create_analysis(&self, name: &str, settings: &AnalysisSettings) -> Result<AnalysisDefinition> {
        let name = validate_name(name)?;
        validate_settings(settings)?;
        let id = new_id();
        let now = Utc::now();
        let now_str = now.to_rfc3339();

        self.conn().execute(
            "INSERT INTO analyses (id, name, settings, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![id, name, settings.to_text()?, now_str, now_str],
        )?;

        Ok(AnalysisDefinition {
            id,
            name,
            settings: settings.clone(),
            created_at: now,
            updated_at: now,
        })
    }

    pub fn get_analysis(&self, id: &str) -> Result<AnalysisDefinition> {
        let raw = self
            .conn()
            .query_row(
                "SELECT id, name, settings, created_at, updated_at FROM analyses WHERE id = ?1",
                params![id],
                row_to_raw_analysis,
            )
            .optional()?
            .ok_or_else(|| JobError::AnalysisNotFound(id.to_string()))?;
        raw.into_definition()
    }

    /// List analyses, newest first, optionally filtered by a case-insensitive
    /// substring of the name.
    ///
    /// A row whose stored settings no longer parse is listed with empty
    /// settings rather than failing the whole listing.
    pub fn list_analyses(&self, search: Option<&str>) -> Result<Vec<AnalysisDefinition>> {
        let pattern = search
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| format!("%{}%", escape_like(s)));

        let raws = {
            let conn = self.conn();
            let mut stmt = conn.prepare(
                "SELECT id, name, settings, created_at, updated_at FROM analyses
                 WHERE ?1 IS NULL OR name LIKE ?1 ESCAPE '\\'
                 ORDER BY created_at DESC, rowid DESC",
            )?;
            let iter = stmt.query_map(params![pattern], row_to_raw_analysis)?;
            iter.collect::<std::result::Result<Vec<_>, _>>()?
        };

        Ok(raws.into_iter().map(RawAnalysis::into_listing).collect())
    }

    /// Update the name and/or settings of an analysis.
    pub fn update_analysis(
        &self,
        id: &str,
        name: Option<&str>,
        settings: Option<&AnalysisSettings>,
    ) -> Result<AnalysisDefinition> {
        if name.is_none() && settings.is_none() {
            return Err(JobError::Validation("nothing to update".to_string()));
        }
        let name = name.map(validate_name).transpose()?;
        if let Some(settings) = settings {
            validate_settings(settings)?;
        }
        let settings_text = settings.map(AnalysisSettings::to_text).transpose()?;

        let updated = self.conn().execute(
            "UPDATE analyses SET
                name = COALESCE(?1, name),
                settings = CASE WHEN ?2 IS NULL THEN settings ELSE ?2 END,
                updated_at = ?3
             WHERE id = ?4",
            params![name, settings_text, Utc::now().to_rfc3339(), id],
        )?;
        if updated == 0 {
            return Err(JobError::AnalysisNotFound(id.to_string()));
        }
        self.get_analysis(id)
    }

    /// Delete an analysis. Its job records are kept.
    pub fn delete_analysis(&self, id: &str) -> Result<()> {
        let deleted = self
            .conn()
            .execute("DELETE FROM analyses WHERE id = ?1", params![id])?;
        if deleted == 0 {
            return Err(JobError::AnalysisNotFound(id.to_string()));
        }
        Ok(())
    }

    /// Insert an analysis without validating its settings.
    #[cfg(test)]
    pub(crate) fn insert_unchecked_analysis(&self, name: &str, settings_text: &str) -> Result<String> {
        let id = new_id();
        let now = Utc::now().to_rfc3339();
        self.conn().execute(
            "INSERT INTO analyses (id, name, settings, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![id, name, settings_text, now, now],
        )?;
        Ok(id)
    }

    // ── Jobs ────────────────────────────────────────────────────────

    /// Insert a new `pending` job record under a caller-chosen identifier.
    pub fn create_job(&self, id: &str, analysis_id: &str) -> Result<JobRecord> {
        let now = Utc::now().to_rfc3339();
        self.conn().execute(
            "INSERT INTO jobs (id, analysis_id, status, created_at, updated_at)
             VALUES (?1, ?2, 'pending', ?3, ?4)",
            params![id, analysis_id, now, now],
        )?;
        self.get_job(id)
    }

    pub fn get_job(&self, id: &str) -> Result<JobRecord> {
        let sql = format!(
            "SELECT {JOB_COLUMNS} FROM jobs j LEFT JOIN analyses a ON a.id = j.analysis_id
             WHERE j.id = ?1"
        );
        let raw = self
            .conn()
            .query_row(&sql, params![id], row_to_raw_job)
            .optional()?
            .ok_or_else(|| JobError::JobNotFound(id.to_string()))?;
        raw.into_record()
    }

    /// List jobs, newest first, optionally only those of one analysis.
    pub fn list_jobs(&self, analysis_id: Option<&str>) -> Result<Vec<JobRecord>> {
        let sql = format!(
            "SELECT {JOB_COLUMNS} FROM jobs j LEFT JOIN analyses a ON a.id = j.analysis_id
             WHERE ?1 IS NULL OR j.analysis_id = ?1
             ORDER BY j.created_at DESC, j.rowid DESC"
        );
        let raws = {
            let conn = self.conn();
            let mut stmt = conn.prepare(&sql)?;
            let iter = stmt.query_map(params![analysis_id], row_to_raw_job)?;
            iter.collect::<std::result::Result<Vec<_>, _>>()?
        };
        raws.into_iter().map(RawJob::into_record).collect()
    }

    /// Set a job's status.
    ///
    /// Re-applying the current status is a no-op; any move other than
    /// `pending` to a terminal state is rejected.
    pub fn set_status(&self, id: &str, status: JobStatus) -> Result<JobRecord> {
        self.finalize(id, status, JobOutcome::default())
    }

    /// Set a job's status together with its output summary and report.
    pub fn finalize(&self, id: &str, status: JobStatus, outcome: JobOutcome) -> Result<JobRecord> {
        {
            let conn = self.conn();
            let current: String = conn
                .query_row("SELECT status FROM jobs WHERE id = ?1", params![id], |row| {
                    row.get(0)
                })
                .optional()?
                .ok_or_else(|| JobError::JobNotFound(id.to_string()))?;
            let current: JobStatus = current.parse()?;

            if !current.can_transition_to(status) {
                return Err(JobError::InvalidTransition {
                    id: id.to_string(),
                    from: current,
                    to: status,
                });
            }

            conn.execute(
                "UPDATE jobs SET
                    status = ?1,
                    output = COALESCE(?2, output),
                    report = COALESCE(?3, report),
                    updated_at = ?4
                 WHERE id = ?5",
                params![
                    status.as_str(),
                    outcome.output,
                    outcome.report,
                    Utc::now().to_rfc3339(),
                    id
                ],
            )?;
        }
        self.get_job(id)
    }
}

// ── Row mapping ─────────────────────────────────────────────────────

/// Columns as stored; settings and status are decoded outside the row callback
/// so their errors surface as [`JobError`]s.
struct RawAnalysis {
    id: String,
    name: String,
    settings: Option<String>,
    created_at: String,
    updated_at: String,
}

impl RawAnalysis {
    fn into_definition(self) -> Result<AnalysisDefinition> {
        let settings = AnalysisSettings::from_text(self.settings.as_deref())?;
        Ok(self.with_settings(settings))
    }

    fn into_listing(self) -> AnalysisDefinition {
        let settings = AnalysisSettings::from_text(self.settings.as_deref()).unwrap_or_else(|e| {
            tracing::warn!(analysis_id = %self.id, error = %e, "Unreadable analysis settings");
            AnalysisSettings::default()
        });
        self.with_settings(settings)
    }

    fn with_settings(self, settings: AnalysisSettings) -> AnalysisDefinition {
        AnalysisDefinition {
            settings,
            id: self.id,
            name: self.name,
            created_at: parse_dt(&self.created_at),
            updated_at: parse_dt(&self.updated_at),
        }
    }
}

fn row_to_raw_analysis(row: &Row<'_>) -> rusqlite::Result<RawAnalysis> {
    Ok(RawAnalysis {
        id: row.get(0)?,
        name: row.get(1)?,
        settings: row.get(2)?,
        created_at: row.get(3)?,
        updated_at: row.get(4)?,
    })
}

struct RawJob {
    id: String,
    analysis_id: String,
    analysis_name: Option<String>,
    status: String,
    output: Option<String>,
    report: Option<String>,
    created_at: String,
    updated_at: String,
}

impl RawJob {
    fn into_record(self) -> Result<JobRecord> {
        Ok(JobRecord {
            status: self.status.parse()?,
            id: self.id,
            analysis_id: self.analysis_id,
            analysis_name: self.analysis_name,
            output: self.output,
            report: self.report,
            created_at: parse_dt(&self.created_at),
            updated_at: parse_dt(&self.updated_at),
        })
    }
}

fn row_to_raw_job(row: &Row<'_>) -> rusqlite::Result<RawJob> {
    Ok(RawJob {
        id: row.get(0)?,
        analysis_id: row.get(1)?,
        analysis_name: row.get(2)?,
        status: row.get(3)?,
        output: row.get(4)?,
        report: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

fn parse_dt(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_default()
}

fn validate_name(name: &str) -> Result<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(JobError::Validation("name is required".to_string()));
    }
    Ok(trimmed.to_string())
}

/// Unsupported step kinds are rejected when the analysis is written, not when it runs.
fn validate_settings(settings: &AnalysisSettings) -> Result<()> {
    Workflow::resolve(settings).map_err(|e| JobError::Validation(e.to_string()))?;
    Ok(())
}

fn escape_like(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

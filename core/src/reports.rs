//! Report generation.
//!
//! A report row is created synchronously in `queued` by the producer, then a
//! worker claims the matching job and drives it `processing -> ready` (or
//! `failed`). Generation is idempotent-safe: every attempt re-derives the
//! artifact from scratch, overwriting whatever a prior attempt left behind.

use crate::{
    artifacts::{estimate_size_mb, safe_filename, ArtifactCategory, ArtifactStore},
    error::{PipelineError, PipelineResult},
    queue::{JobPayload, JobQueue},
    store::ComplianceStore,
    types::{now_millis, ReportId, UnixMillis},
};
use chrono::{Datelike, NaiveDate, Utc};
use std::fs;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportPeriod {
    Week,
    Month,
    Year,
}

impl ReportPeriod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportPeriod::Week => "week",
            ReportPeriod::Month => "month",
            ReportPeriod::Year => "year",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "week" => Some(ReportPeriod::Week),
            "month" => Some(ReportPeriod::Month),
            "year" => Some(ReportPeriod::Year),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    Pdf,
    Excel,
    Csv,
}

impl ReportFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportFormat::Pdf => "pdf",
            ReportFormat::Excel => "excel",
            ReportFormat::Csv => "csv",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pdf" => Some(ReportFormat::Pdf),
            "excel" => Some(ReportFormat::Excel),
            "csv" => Some(ReportFormat::Csv),
            _ => None,
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            ReportFormat::Pdf => "application/pdf",
            ReportFormat::Excel => "application/vnd.ms-excel",
            ReportFormat::Csv => "text/csv",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ReportFormat::Pdf => "pdf",
            // Excel consumers open the same delimited text; only the mime
            // type differs.
            ReportFormat::Excel | ReportFormat::Csv => "csv",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportStatus {
    Queued,
    Processing,
    Ready,
    Failed,
}

impl ReportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportStatus::Queued => "queued",
            ReportStatus::Processing => "processing",
            ReportStatus::Ready => "ready",
            ReportStatus::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "queued" => Some(ReportStatus::Queued),
            "processing" => Some(ReportStatus::Processing),
            "ready" => Some(ReportStatus::Ready),
            "failed" => Some(ReportStatus::Failed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReportRow {
    pub id: ReportId,
    pub period: ReportPeriod,
    pub format: ReportFormat,
    pub status: ReportStatus,
    pub size_mb: Option<f64>,
    pub file_url: Option<String>,
    pub mime_type: Option<String>,
    pub error: Option<String>,
    pub created_at: UnixMillis,
}

/// Aggregate snapshot the summary tables are built from.
#[derive(Debug, Clone, Copy)]
pub struct ReportSummary {
    pub stations: i64,
    pub audits_this_month: i64,
    pub pending_complaints: i64,
}

/// Create the report row in `queued` state. The caller should follow up with
/// [`enqueue_report_generation`].
pub fn create_report(
    store: &ComplianceStore,
    period: ReportPeriod,
    format: ReportFormat,
) -> PipelineResult<ReportId> {
    store.insert_report(period, format, now_millis())
}

/// Hand the report to the reports queue. If enqueueing itself fails the row
/// is immediately marked `failed` with the enqueue error, so no `queued`
/// report is ever left behind with no job that will execute it.
pub fn enqueue_report_generation(
    queue: &JobQueue,
    store: &ComplianceStore,
    report_id: ReportId,
) -> PipelineResult<()> {
    match queue.enqueue(&JobPayload::GenerateReport { report_id }) {
        Ok(job_id) => {
            log::info!("report {report_id} queued as job {job_id}");
            Ok(())
        }
        Err(err) => {
            let message = format!("enqueue failed: {err}");
            if let Err(mark_err) = store.mark_report_failed(report_id, &message) {
                log::error!("could not mark report {report_id} failed: {mark_err}");
            }
            Err(err)
        }
    }
}

pub struct ReportGenerator {
    artifacts: ArtifactStore,
}

impl ReportGenerator {
    pub fn new(artifacts: ArtifactStore) -> Self {
        Self { artifacts }
    }

    /// Generate the artifact for `report_id`. Invoked by a worker.
    ///
    /// A missing row is fatal for the job (retrying cannot manufacture it).
    /// Any failure after the row is claimed marks it `failed` with the error
    /// message and re-raises so the queue's retry policy can decide.
    pub fn generate(&self, store: &ComplianceStore, report_id: ReportId) -> PipelineResult<ReportRow> {
        let report = store
            .get_report(report_id)?
            .ok_or_else(|| PipelineError::not_found("report", report_id))?;

        store.mark_report_processing(report_id)?;

        match self.render_and_store(store, &report) {
            Ok(()) => {
                let updated = store
                    .get_report(report_id)?
                    .ok_or_else(|| PipelineError::not_found("report", report_id))?;
                log::info!(
                    "report {report_id} ready ({} {})",
                    updated.period.as_str(),
                    updated.format.as_str()
                );
                Ok(updated)
            }
            Err(err) => {
                if let Err(mark_err) = store.mark_report_failed(report_id, &err.to_string()) {
                    log::error!("could not mark report {report_id} failed: {mark_err}");
                }
                Err(err)
            }
        }
    }

    fn render_and_store(&self, store: &ComplianceStore, report: &ReportRow) -> PipelineResult<()> {
        let summary = ReportSummary {
            stations: store.station_count()?,
            audits_this_month: store.audit_count_since(start_of_current_month())?,
            pending_complaints: store.pending_complaint_count()?,
        };
        let generated_at = Utc::now().to_rfc3339();

        let base_name = safe_filename(&format!(
            "report_{}_{}_{}",
            report.period.as_str(),
            report.format.as_str(),
            now_millis()
        ));
        let filename = format!("{base_name}.{}", report.format.extension());
        let scratch = self.artifacts.scratch_path(ArtifactCategory::Reports, &filename);

        match report.format {
            ReportFormat::Pdf => fs::write(&scratch, render_pdf(&summary, &generated_at))?,
            ReportFormat::Excel | ReportFormat::Csv => {
                fs::write(&scratch, render_csv(&summary, &generated_at))?
            }
        }

        let size_bytes = fs::metadata(&scratch)?.len();
        let mime = report.format.mime_type();
        let stored = self
            .artifacts
            .store(ArtifactCategory::Reports, &filename, &scratch, Some(mime))?;

        store.mark_report_ready(
            report.id,
            estimate_size_mb(size_bytes),
            &stored.file_url,
            mime,
        )?;
        Ok(())
    }
}

/// Unix millis at the first instant of the current month (UTC).
fn start_of_current_month() -> UnixMillis {
    let now = Utc::now();
    NaiveDate::from_ymd_opt(now.year(), now.month(), 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc().timestamp_millis())
        .unwrap_or(0)
}

fn render_csv(summary: &ReportSummary, generated_at: &str) -> String {
    [
        "metric,value".to_string(),
        format!("stations,{}", summary.stations),
        format!("audits_this_month,{}", summary.audits_this_month),
        format!("pending_complaints,{}", summary.pending_complaints),
        format!("generated_at,{generated_at}"),
    ]
    .join("\n")
}

/// Minimal single-page PDF with the summary as text lines. Enough structure
/// for any conforming viewer: catalog, page tree, one page, Helvetica, one
/// content stream, a correct xref table.
fn render_pdf(summary: &ReportSummary, generated_at: &str) -> Vec<u8> {
    let escape = |s: &str| s.replace('\\', "\\\\").replace('(', "\\(").replace(')', "\\)");

    let mut content = String::new();
    content.push_str("BT /F1 18 Tf 40 760 Td (Fuel Subsidy Compliance Report) Tj ET\n");
    let lines = [
        format!("Generated: {}", escape(generated_at)),
        format!("Stations: {}", summary.stations),
        format!("Audits this month: {}", summary.audits_this_month),
        format!("Pending complaints: {}", summary.pending_complaints),
    ];
    let mut y = 724;
    for line in &lines {
        content.push_str(&format!("BT /F1 12 Tf 40 {y} Td ({line}) Tj ET\n"));
        y -= 18;
    }

    let objects = [
        "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
        "<< /Type /Pages /Kids [3 0 R] /Count 1 >>".to_string(),
        "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] \
         /Resources << /Font << /F1 4 0 R >> >> /Contents 5 0 R >>"
            .to_string(),
        "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>".to_string(),
        format!("<< /Length {} >>\nstream\n{}endstream", content.len(), content),
    ];

    let mut out = String::from("%PDF-1.4\n");
    let mut offsets = Vec::with_capacity(objects.len());
    for (index, body) in objects.iter().enumerate() {
        offsets.push(out.len());
        out.push_str(&format!("{} 0 obj\n{}\nendobj\n", index + 1, body));
    }

    let xref_start = out.len();
    out.push_str(&format!("xref\n0 {}\n", objects.len() + 1));
    out.push_str("0000000000 65535 f \n");
    for offset in &offsets {
        out.push_str(&format!("{offset:010} 00000 n \n"));
    }
    out.push_str(&format!(
        "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
        objects.len() + 1,
        xref_start
    ));

    out.into_bytes()
}

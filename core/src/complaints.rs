//! Complaint intake.
//!
//! Recording the complaint is the primary operation; the supervisor
//! notification that follows is strictly secondary and must never make the
//! intake fail — its enqueue is best-effort by contract.

use crate::{
    artifacts::{safe_filename, ArtifactCategory, ArtifactStore, StoredArtifact},
    error::PipelineResult,
    notifications::{enqueue_notification_best_effort, PushPayload},
    queue::{JobQueue, NotifyTarget},
    store::ComplianceStore,
    types::{now_millis, UnixMillis},
};
use std::fs;

#[derive(Debug, Clone)]
pub struct ComplaintRow {
    pub id: i64,
    pub station_name: String,
    pub kind: String,
    pub detail: Option<String>,
    pub photo_url: Option<String>,
    pub status: String,
    pub created_at: UnixMillis,
}

#[derive(Debug, Clone)]
pub struct NewComplaint {
    pub station_name: String,
    pub kind: String,
    pub detail: Option<String>,
    pub photo_url: Option<String>,
}

/// Store an uploaded complaint photo. The filename comes from the client and
/// is sanitized before it touches the filesystem; a uuid prefix keeps
/// concurrent uploads from colliding.
pub fn store_complaint_photo(
    artifacts: &ArtifactStore,
    original_filename: &str,
    bytes: &[u8],
    content_type: Option<&str>,
) -> PipelineResult<StoredArtifact> {
    let filename = format!("{}_{}", uuid::Uuid::new_v4(), safe_filename(original_filename));
    let scratch = artifacts.scratch_path(ArtifactCategory::Complaints, &filename);
    fs::write(&scratch, bytes)?;
    artifacts.store(ArtifactCategory::Complaints, &filename, &scratch, content_type)
}

/// Record a complaint and schedule the supervisor notification.
pub fn submit_complaint(
    store: &ComplianceStore,
    queue: &JobQueue,
    input: NewComplaint,
) -> PipelineResult<ComplaintRow> {
    let complaint = store.insert_complaint(&input, now_millis())?;

    enqueue_notification_best_effort(
        queue,
        NotifyTarget::Supervisor,
        PushPayload {
            title: "New complaint".into(),
            body: format!("{}: {}", complaint.station_name, complaint.kind),
            data: serde_json::json!({
                "complaintId": complaint.id,
                "stationName": complaint.station_name,
                "type": complaint.kind,
            }),
        },
    );

    Ok(complaint)
}

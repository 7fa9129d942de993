//! Shared primitive types used across the pipeline.

/// Rowid of a user in the relational store.
pub type UserId = i64;

/// Rowid of a station.
pub type StationId = i64;

/// Rowid of a vehicle.
pub type VehicleId = i64;

/// Rowid of a fuel transaction.
pub type TransactionId = i64;

/// Rowid of a report.
pub type ReportId = i64;

/// Rowid of a notification.
pub type NotificationId = i64;

/// Rowid of a queued job.
pub type JobId = i64;

/// Wall-clock instant as unix epoch milliseconds.
pub type UnixMillis = i64;

/// Current wall-clock time in unix epoch milliseconds.
pub fn now_millis() -> UnixMillis {
    chrono::Utc::now().timestamp_millis()
}

//! fuelwatch-core: compliance scoring and delivery pipeline for a
//! fuel-subsidy monitoring backend.
//!
//! The crate is organized around a SQLite store shared by a producer side
//! (transaction recording, complaint intake, report requests) and worker
//! processes that drain two durable job queues (report generation, push
//! notifications). Scoring is deterministic and local; the external risk
//! model and the push gateway are best-effort collaborators that can never
//! fail the core operations.

pub mod analysis;
pub mod artifacts;
pub mod complaints;
pub mod config;
pub mod devices;
pub mod error;
pub mod notifications;
pub mod push;
pub mod queue;
pub mod reports;
pub mod risk_model;
pub mod store;
pub mod transactions;
pub mod types;
pub mod worker;

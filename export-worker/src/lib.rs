//! export-worker: asynchronous guild export pipeline
//!
//! Requests are queued by [`requests::submit`], leased and processed by the
//! [`daemon::WorkerDaemon`], stored encrypted by [`artifacts::ArtifactStore`]
//! and handed out through [`download::DownloadGate`].

pub mod archive;
pub mod artifacts;
pub mod collectors;
pub mod config;
pub mod daemon;
pub mod db;
pub mod download;
pub mod error;
pub mod requests;
pub mod storage;

#[cfg(test)]
mod testing;

pub use config::Config;
pub use daemon::{RetentionSweeper, WorkerDaemon};
pub use download::{Download, DownloadGate};
pub use error::{ExportError, ExportResult, ServiceError, ServiceResult};

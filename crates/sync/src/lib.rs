//! Orchestration of a mirror run: walk the gallery, resolve model
//! metadata, download what is missing and persist sidecars.

pub mod controller;
pub mod report;

pub use controller::{Downloader, SyncError, SyncOptions};
pub use report::SyncReport;

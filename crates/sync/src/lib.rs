//! Reconciliation and maintenance operations over the fleet entities.
//!
//! Every operation reloads the lists it needs, rebuilds its lookup maps and
//! issues sequential, paced calls through a [`vrfleet_client::Gateway`].
//! Per-item failures are recorded in the returned report; only failures to
//! load the initial state abort an operation.

pub mod accounts;
pub mod app_devices;
pub mod catalog;
pub mod cleanup;
pub mod device_apps;
pub mod devices;
pub mod error;
pub mod installed;
pub mod links;
pub mod options;
pub mod report;

pub use error::SyncError;
pub use options::ReconcileOptions;
pub use report::{ItemIssue, ReconcileReport, RefreshReport};

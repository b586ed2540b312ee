pub mod association;
pub mod backoff;
pub mod directory;
pub mod error;
pub mod import;
pub mod import_format;
pub mod models;
pub mod navigation;
pub mod reconcile;
pub mod types;

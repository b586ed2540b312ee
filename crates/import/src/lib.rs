//! Bulk loading of fleet data: CSV / JSON imports and versioned seed files.

pub mod data_import;
pub mod error;
pub mod log;
pub mod seed;
pub mod upsert;

pub use data_import::{import_file, run_import, ImportRequest, ImportSummary};
pub use error::ImportError;
pub use log::ImportLog;
pub use seed::{run_seed, SeedFile, SeedSummary};
pub use upsert::{PhaseOutcome, PhaseSettings};

//! Client layer for the hosted entity backend.
//!
//! [`store::EntityStore`] is the raw collection surface, implemented over
//! HTTP by [`http::HttpStore`] and in process by [`memory::MemoryStore`].
//! [`gateway::Gateway`] adds typed decoding, the rate-limit retry wrapper,
//! the optional token bucket and batch pacing on top.

pub mod error;
pub mod gateway;
pub mod http;
pub mod memory;
pub mod retry;
pub mod store;

pub use error::ClientError;
pub use gateway::Gateway;
pub use store::{filter_by, EntityStore, Filter, Record};

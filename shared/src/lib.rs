//! Shared types for the export service
//!
//! Domain models persisted by the worker, the guild data document it
//! exports, and the error codes surfaced to API consumers.

pub mod error;
pub mod guild_data;
pub mod models;
pub mod util;

pub use serde::{Deserialize, Serialize};

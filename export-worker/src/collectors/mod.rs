//! Data collectors, one per request kind

pub mod guild_data;
pub mod transcripts;

pub use guild_data::{GuildDataCollector, GuildDataSource, SectionRow};
pub use transcripts::TranscriptCollector;

/// Collector output plus the ids of items that could not be read
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Collected<T> {
    pub data: T,
    pub failed: Vec<i32>,
}

//! Ticketing database reader for the guild data collector

use async_trait::async_trait;
use sqlx::PgPool;

use crate::collectors::{GuildDataSource, SectionRow};

#[derive(Clone)]
pub struct PgGuildSource {
    pool: PgPool,
}

impl PgGuildSource {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl GuildDataSource for PgGuildSource {
    async fn fetch_page<R: SectionRow>(
        &self,
        _section: &'static str,
        query: &'static str,
        guild_id: i64,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<R>, sqlx::Error> {
        sqlx::query_as::<_, R>(query)
            .bind(guild_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
    }
}

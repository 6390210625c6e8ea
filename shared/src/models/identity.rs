//! Verified caller identity

use serde::{Deserialize, Serialize};

/// Caller identity as supplied by the authentication layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: i64,
    pub owned_guild_ids: Vec<i64>,
}

impl Identity {
    pub fn new(user_id: i64, owned_guild_ids: Vec<i64>) -> Self {
        Self {
            user_id,
            owned_guild_ids,
        }
    }

    pub fn owns_guild(&self, guild_id: i64) -> bool {
        self.owned_guild_ids.contains(&guild_id)
    }
}

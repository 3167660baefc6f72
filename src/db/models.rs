use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct OptionCount {
    pub option_name: String,
    pub vote_count: i64,
}

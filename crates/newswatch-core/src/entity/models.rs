use serde::{Deserialize, Serialize};

/// A tracked account whose posts are checked on every tick
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub id: String,
    /// Twitter user id
    pub external_id: String,
    pub display_name: String,
}

/// Data required to start tracking an entity
#[derive(Debug, Clone)]
pub struct NewEntity {
    pub external_id: String,
    pub display_name: String,
}


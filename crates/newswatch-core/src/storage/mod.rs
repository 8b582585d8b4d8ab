mod database;
mod entity_repo;

pub use database::Database;
pub use entity_repo::{EntityRepository, SqlEntityDirectory};

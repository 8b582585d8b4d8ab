mod models;

pub use models::{Entity, NewEntity};

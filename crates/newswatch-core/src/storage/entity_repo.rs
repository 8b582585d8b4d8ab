use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::FromRow;
use uuid::Uuid;

use super::Database;
use crate::entity::{Entity, NewEntity};
use crate::scheduler::EntityDirectory;
use crate::{Error, Result};

/// Repository for tracked entity CRUD operations
pub struct EntityRepository<'a> {
    db: &'a Database,
}

#[derive(FromRow)]
struct EntityRow {
    id: String,
    twitter_id: String,
    display_name: String,
}

impl From<EntityRow> for Entity {
    fn from(row: EntityRow) -> Self {
        Entity {
            id: row.id,
            external_id: row.twitter_id,
            display_name: row.display_name,
        }
    }
}

impl<'a> EntityRepository<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Start tracking an entity
    pub async fn create(&self, new_entity: &NewEntity) -> Result<Entity> {
        let id = Uuid::new_v4().to_string();

        sqlx::query(
            r#"
            INSERT INTO entities (id, twitter_id, display_name, created_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&new_entity.external_id)
        .bind(&new_entity.display_name)
        .bind(Utc::now())
        .execute(self.db.pool())
        .await?;

        self.find_by_external_id(&new_entity.external_id)
            .await?
            .ok_or(Error::EntityNotFound(new_entity.external_id.clone()))
    }

    /// Find an entity by its Twitter id
    pub async fn find_by_external_id(&self, external_id: &str) -> Result<Option<Entity>> {
        let row: Option<EntityRow> = sqlx::query_as(
            r#"
            SELECT id, twitter_id, display_name
            FROM entities
            WHERE twitter_id = ?
            "#,
        )
        .bind(external_id)
        .fetch_optional(self.db.pool())
        .await?;

        Ok(row.map(Entity::from))
    }

    /// Get every tracked entity, oldest first
    pub async fn list_all(&self) -> Result<Vec<Entity>> {
        let rows: Vec<EntityRow> = sqlx::query_as(
            r#"
            SELECT id, twitter_id, display_name
            FROM entities
            ORDER BY created_at ASC, display_name ASC
            "#,
        )
        .fetch_all(self.db.pool())
        .await?;

        Ok(rows.into_iter().map(Entity::from).collect())
    }

    /// Stop tracking an entity
    pub async fn delete_by_external_id(&self, external_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM entities WHERE twitter_id = ?")
            .bind(external_id)
            .execute(self.db.pool())
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

/// `EntityDirectory` backed by the entity table
pub struct SqlEntityDirectory {
    db: Arc<Database>,
}

impl SqlEntityDirectory {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl EntityDirectory for SqlEntityDirectory {
    async fn list_entities(&self) -> Result<Vec<Entity>> {
        EntityRepository::new(&self.db).list_all().await
    }
}

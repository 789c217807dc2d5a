use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tracing::error;
use uuid::Uuid;

use crate::db::models::Project;
use crate::error::DatabaseError;

/// Entity-agnostic write contract consumed by the HTTP handlers.
#[async_trait]
pub trait Repository<T: Send + Sync>: Send + Sync {
    async fn find(&self, id: Uuid) -> Result<T, DatabaseError>;
    async fn create(&self, entity: &T) -> Result<(), DatabaseError>;
    async fn update(&self, entity: &T) -> Result<(), DatabaseError>;
    async fn delete(&self, id: Uuid) -> Result<(), DatabaseError>;
}

pub struct ProjectRepo {
    pool: Arc<PgPool>,
}

impl ProjectRepo {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Builds a pool that connects on first use, so the service can start
    /// before the database is reachable.
    pub fn connect_lazy(url: &str, max_connections: u32) -> Result<Self, DatabaseError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(5))
            .connect_lazy(url)
            .map_err(|e| DatabaseError::ConnectionError(e.to_string()))?;

        Ok(Self::new(Arc::new(pool)))
    }
}

#[async_trait]
impl Repository<Project> for ProjectRepo {
    async fn find(&self, id: Uuid) -> Result<Project, DatabaseError> {
        sqlx::query_as::<_, Project>(
            r#"
            SELECT id, owner_id, name, description, created_at, updated_at
            FROM projects WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(self.pool.as_ref())
        .await
        .map_err(|e| {
            error!(function = "ProjectRepo::find", error = %e, "select failed");
            DatabaseError::from(e)
        })?
        .ok_or(DatabaseError::NotFound)
    }

    async fn create(&self, project: &Project) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            INSERT INTO projects (id, owner_id, name, description, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(project.id)
        .bind(&project.owner_id)
        .bind(&project.name)
        .bind(&project.description)
        .bind(project.created_at)
        .bind(project.updated_at)
        .execute(self.pool.as_ref())
        .await
        .map_err(|e| {
            error!(function = "ProjectRepo::create", error = %e, "insert failed");
            DatabaseError::from(e)
        })?;

        Ok(())
    }

    async fn update(&self, project: &Project) -> Result<(), DatabaseError> {
        let result = sqlx::query(
            r#"
            UPDATE projects SET name = $1, description = $2, updated_at = $3
            WHERE id = $4 AND owner_id = $5
            "#,
        )
        .bind(&project.name)
        .bind(&project.description)
        .bind(project.updated_at)
        .bind(project.id)
        .bind(&project.owner_id)
        .execute(self.pool.as_ref())
        .await
        .map_err(|e| {
            error!(function = "ProjectRepo::update", error = %e, "update failed");
            DatabaseError::from(e)
        })?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound);
        }
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<(), DatabaseError> {
        let result = sqlx::query("DELETE FROM projects WHERE id = $1")
            .bind(id)
            .execute(self.pool.as_ref())
            .await
            .map_err(|e| {
                error!(function = "ProjectRepo::delete", error = %e, "delete failed");
                DatabaseError::from(e)
            })?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound);
        }
        Ok(())
    }
}

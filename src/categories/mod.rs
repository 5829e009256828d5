// Category registry - one category per distinct house type string
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row};
use std::sync::Arc;

use crate::db::models::Category;
use crate::db::{self, RepositoryError};
use crate::state::DbPool;

#[async_trait]
pub trait CategoryRegistry: Send + Sync {
    /// Return the category named `name`, creating it if this is the first
    /// listing of that house type. Safe under concurrent callers: at most one
    /// row per name ever exists.
    async fn resolve_or_create(&self, name: &str) -> Result<Category, RepositoryError>;

    async fn find_by_id(&self, id: &str) -> Result<Option<Category>, RepositoryError>;

    /// All categories, ordered by name.
    async fn list(&self) -> Result<Vec<Category>, RepositoryError>;
}

pub type DynCategoryRegistry = Arc<dyn CategoryRegistry>;

pub struct SqliteCategoryRegistry {
    pool: DbPool,
}

impl SqliteCategoryRegistry {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn category_from_row(row: &Row<'_>) -> rusqlite::Result<Category> {
    Ok(Category {
        id: row.get(0)?,
        name: row.get(1)?,
        created_at: db::parse_timestamp(2, &row.get::<_, String>(2)?)?,
    })
}

#[async_trait]
impl CategoryRegistry for SqliteCategoryRegistry {
    async fn resolve_or_create(&self, name: &str) -> Result<Category, RepositoryError> {
        let conn = self.pool.get()?;

        // The UNIQUE(name) index arbitrates between racing creators; the
        // loser's insert is a no-op and both read back the same row.
        let inserted = conn.execute(
            "INSERT INTO categories (id, name, created_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(name) DO NOTHING",
            params![
                uuid::Uuid::now_v7().to_string(),
                name,
                db::format_timestamp(Utc::now()),
            ],
        )?;

        let category = conn.query_row(
            "SELECT id, name, created_at FROM categories WHERE name = ?1",
            params![name],
            category_from_row,
        )?;

        if inserted > 0 {
            tracing::info!("New category created: {}", category.name);
        }
        Ok(category)
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Category>, RepositoryError> {
        let conn = self.pool.get()?;
        let category = conn
            .query_row(
                "SELECT id, name, created_at FROM categories WHERE id = ?1",
                params![id],
                category_from_row,
            )
            .optional()?;
        Ok(category)
    }

    async fn list(&self) -> Result<Vec<Category>, RepositoryError> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare("SELECT id, name, created_at FROM categories ORDER BY name")?;
        let categories = stmt
            .query_map([], category_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(categories)
    }
}

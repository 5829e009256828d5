// Repository pattern - every user query states which accounts it can see
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row};
use std::sync::Arc;

use crate::db::models::{Role, User};
use crate::db::{self, RepositoryError};
use crate::state::DbPool;

/// Which accounts a lookup may return. Deactivated users are invisible to
/// everything except uniqueness checks, so callers pick explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activity {
    ActiveOnly,
    IncludeInactive,
}

impl Activity {
    fn clause(self) -> &'static str {
        match self {
            Activity::ActiveOnly => " AND active = 1",
            Activity::IncludeInactive => "",
        }
    }
}

/// Fields for a new account; the credential is already hashed.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub phone_number: String,
    pub password_hash: String,
    pub role: Role,
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn create(&self, user: NewUser) -> Result<User, RepositoryError>;

    async fn find_by_id(&self, id: &str, activity: Activity)
        -> Result<Option<User>, RepositoryError>;

    async fn find_by_email(
        &self,
        email: &str,
        activity: Activity,
    ) -> Result<Option<User>, RepositoryError>;

    /// Soft-delete. Returns false if no active account had this id.
    async fn deactivate(&self, id: &str) -> Result<bool, RepositoryError>;
}

pub type DynUserRepository = Arc<dyn UserRepository>;

pub struct SqliteUserRepository {
    pool: DbPool,
}

impl SqliteUserRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

const USER_COLUMNS: &str =
    "id, name, email, phone_number, password_hash, role, active, created_at";

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    let role: String = row.get(5)?;
    Ok(User {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        phone_number: row.get(3)?,
        password_hash: row.get(4)?,
        role: role.parse().unwrap_or_default(),
        active: row.get(6)?,
        created_at: db::parse_timestamp(7, &row.get::<_, String>(7)?)?,
    })
}

#[async_trait]
impl UserRepository for SqliteUserRepository {
    async fn create(&self, user: NewUser) -> Result<User, RepositoryError> {
        let conn = self.pool.get()?;
        let id = uuid::Uuid::now_v7().to_string();
        let created_at = Utc::now();

        conn.execute(
            "INSERT INTO users (id, name, email, phone_number, password_hash, role, active, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1, ?7)",
            params![
                id,
                user.name,
                user.email,
                user.phone_number,
                user.password_hash,
                user.role.as_str(),
                db::format_timestamp(created_at),
            ],
        )?;

        Ok(User {
            id,
            name: user.name,
            email: user.email,
            phone_number: user.phone_number,
            password_hash: user.password_hash,
            role: user.role,
            active: true,
            created_at,
        })
    }

    async fn find_by_id(
        &self,
        id: &str,
        activity: Activity,
    ) -> Result<Option<User>, RepositoryError> {
        let conn = self.pool.get()?;
        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = ?1{}",
            activity.clause()
        );
        let user = conn
            .query_row(&sql, params![id], user_from_row)
            .optional()?;
        Ok(user)
    }

    async fn find_by_email(
        &self,
        email: &str,
        activity: Activity,
    ) -> Result<Option<User>, RepositoryError> {
        let conn = self.pool.get()?;
        // email column is COLLATE NOCASE
        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = ?1{}",
            activity.clause()
        );
        let user = conn
            .query_row(&sql, params![email.trim()], user_from_row)
            .optional()?;
        Ok(user)
    }

    async fn deactivate(&self, id: &str) -> Result<bool, RepositoryError> {
        let conn = self.pool.get()?;
        let rows = conn.execute(
            "UPDATE users SET active = 0 WHERE id = ?1 AND active = 1",
            params![id],
        )?;
        Ok(rows > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_repo() -> (SqliteUserRepository, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let pool = db::create_pool(&temp_dir.path().join("test.db")).unwrap();
        db::run_migrations(&pool).unwrap();
        (SqliteUserRepository::new(pool), temp_dir)
    }

    fn new_user(email: &str) -> NewUser {
        NewUser {
            name: "Grace".into(),
            email: email.into(),
            phone_number: "+1 555 010 2030".into(),
            password_hash: "$2b$04$hash".into(),
            role: Role::Broker,
        }
    }

    #[tokio::test]
    async fn create_and_find_by_id() {
        let (repo, _temp) = create_test_repo();
        let created = repo.create(new_user("grace@example.com")).await.unwrap();

        let found = repo
            .find_by_id(&created.id, Activity::ActiveOnly)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.email, "grace@example.com");
        assert_eq!(found.role, Role::Broker);
        assert_eq!(found.password_hash, "$2b$04$hash");
        assert!(found.active);
    }

    #[tokio::test]
    async fn email_lookup_ignores_case() {
        let (repo, _temp) = create_test_repo();
        repo.create(new_user("grace@example.com")).await.unwrap();

        let found = repo
            .find_by_email("GRACE@Example.com", Activity::ActiveOnly)
            .await
            .unwrap();
        assert!(found.is_some());
    }

    #[tokio::test]
    async fn duplicate_email_is_a_conflict() {
        let (repo, _temp) = create_test_repo();
        repo.create(new_user("grace@example.com")).await.unwrap();

        let err = repo
            .create(new_user("Grace@Example.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict(_)));
    }

    #[tokio::test]
    async fn deactivated_users_are_hidden_from_active_lookups() {
        let (repo, _temp) = create_test_repo();
        let user = repo.create(new_user("grace@example.com")).await.unwrap();

        assert!(repo.deactivate(&user.id).await.unwrap());
        assert!(!repo.deactivate(&user.id).await.unwrap());

        assert!(repo
            .find_by_id(&user.id, Activity::ActiveOnly)
            .await
            .unwrap()
            .is_none());
        assert!(repo
            .find_by_email("grace@example.com", Activity::ActiveOnly)
            .await
            .unwrap()
            .is_none());

        let hidden = repo
            .find_by_id(&user.id, Activity::IncludeInactive)
            .await
            .unwrap()
            .unwrap();
        assert!(!hidden.active);
    }

    #[tokio::test]
    async fn missing_user_is_none() {
        let (repo, _temp) = create_test_repo();
        assert!(repo
            .find_by_id("nope", Activity::IncludeInactive)
            .await
            .unwrap()
            .is_none());
    }
}

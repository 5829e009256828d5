use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use rusqlite::params;
use std::sync::Arc;
use thiserror::Error;

use crate::db::models::Role;
use crate::db::{self, RepositoryError};
use crate::state::DbPool;

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("Invalid token")]
    Invalid,

    #[error("Token expired")]
    Expired,

    #[error(transparent)]
    Storage(#[from] RepositoryError),
}

/// What a verified bearer token says about its holder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenClaims {
    pub subject_id: String,
    pub role: Role,
}

#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Bearer token boundary: issue a token for a subject, and turn a presented
/// token back into claims.
#[async_trait]
pub trait TokenService: Send + Sync {
    async fn issue(&self, subject_id: &str, role: Role) -> Result<IssuedToken, TokenError>;

    async fn verify(&self, token: &str) -> Result<TokenClaims, TokenError>;
}

pub type DynTokenService = Arc<dyn TokenService>;

/// Opaque random tokens recorded server-side with their expiry.
pub struct SqliteTokenService {
    pool: DbPool,
    ttl: Duration,
}

impl SqliteTokenService {
    /// `ttl` comes from `AuthConfig::token_ttl`, which bounds it.
    pub fn new(pool: DbPool, ttl: Duration) -> Self {
        Self { pool, ttl }
    }

    /// Drop tokens that expired before `before`. Returns how many were removed.
    pub fn purge_expired(&self, before: DateTime<Utc>) -> Result<usize, RepositoryError> {
        let conn = self.pool.get()?;
        let removed = conn.execute(
            "DELETE FROM tokens WHERE expires_at <= ?1",
            params![db::format_timestamp(before)],
        )?;
        Ok(removed)
    }
}

/// Generate a cryptographically random 32-byte hex token.
pub fn generate_token() -> String {
    let bytes: [u8; 32] = rand::thread_rng().gen();
    hex::encode(bytes)
}

fn looks_like_token(token: &str) -> bool {
    token.len() == 64 && token.chars().all(|c| c.is_ascii_hexdigit())
}

#[async_trait]
impl TokenService for SqliteTokenService {
    async fn issue(&self, subject_id: &str, role: Role) -> Result<IssuedToken, TokenError> {
        let conn = self.pool.get().map_err(RepositoryError::from)?;

        let token = generate_token();
        let now = Utc::now();
        let expires_at = now + self.ttl;

        conn.execute(
            "INSERT INTO tokens (token, user_id, role, expires_at, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                token,
                subject_id,
                role.as_str(),
                db::format_timestamp(expires_at),
                db::format_timestamp(now),
            ],
        )
        .map_err(RepositoryError::from)?;

        Ok(IssuedToken { token, expires_at })
    }

    async fn verify(&self, token: &str) -> Result<TokenClaims, TokenError> {
        if !looks_like_token(token) {
            return Err(TokenError::Invalid);
        }

        let conn = self.pool.get().map_err(RepositoryError::from)?;
        let row = conn.query_row(
            "SELECT user_id, role, expires_at FROM tokens WHERE token = ?1",
            params![token],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    db::parse_timestamp(2, &row.get::<_, String>(2)?)?,
                ))
            },
        );

        let (subject_id, role, expires_at) = match row {
            Ok(found) => found,
            Err(rusqlite::Error::QueryReturnedNoRows) => return Err(TokenError::Invalid),
            Err(e) => return Err(RepositoryError::from(e).into()),
        };

        if expires_at <= Utc::now() {
            return Err(TokenError::Expired);
        }

        let role = role.parse::<Role>().map_err(|_| TokenError::Invalid)?;
        Ok(TokenClaims { subject_id, role })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup() -> (SqliteTokenService, DbPool, TempDir) {
        let tmp = TempDir::new().unwrap();
        let pool = db::create_pool(&tmp.path().join("test.db")).unwrap();
        db::run_migrations(&pool).unwrap();
        pool.get()
            .unwrap()
            .execute(
                "INSERT INTO users (id, name, email, phone_number, password_hash, created_at)
                 VALUES ('u1', 'Ada', 'ada@example.com', '+15550001111', 'x', '')",
                [],
            )
            .unwrap();
        (SqliteTokenService::new(pool.clone(), Duration::hours(1)), pool, tmp)
    }

    #[test]
    fn generate_token_is_64_hex_chars() {
        let token = generate_token();
        assert_eq!(token.len(), 64);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn generate_token_is_unique() {
        assert_ne!(generate_token(), generate_token());
    }

    #[tokio::test]
    async fn issued_token_verifies_to_its_subject() {
        let (tokens, _pool, _tmp) = setup();
        let issued = tokens.issue("u1", Role::Broker).await.unwrap();
        assert!(issued.expires_at > Utc::now());

        let claims = tokens.verify(&issued.token).await.unwrap();
        assert_eq!(
            claims,
            TokenClaims {
                subject_id: "u1".into(),
                role: Role::Broker
            }
        );
    }

    #[tokio::test]
    async fn unknown_or_malformed_token_is_invalid() {
        let (tokens, _pool, _tmp) = setup();
        assert!(matches!(
            tokens.verify(&generate_token()).await,
            Err(TokenError::Invalid)
        ));
        assert!(matches!(
            tokens.verify("not a token").await,
            Err(TokenError::Invalid)
        ));
    }

    #[tokio::test]
    async fn past_expiry_is_reported_as_expired() {
        let (tokens, pool, _tmp) = setup();
        let token = generate_token();
        pool.get()
            .unwrap()
            .execute(
                "INSERT INTO tokens (token, user_id, role, expires_at, created_at)
                 VALUES (?1, 'u1', 'user', ?2, ?2)",
                params![token, db::format_timestamp(Utc::now() - Duration::hours(2))],
            )
            .unwrap();

        assert!(matches!(
            tokens.verify(&token).await,
            Err(TokenError::Expired)
        ));
        assert_eq!(tokens.purge_expired(Utc::now()).unwrap(), 1);
        assert!(matches!(
            tokens.verify(&token).await,
            Err(TokenError::Invalid)
        ));
    }
}

pub mod domain;
pub mod repository;

use crate::auth::credentials::DynCredentialService;
use crate::db::models::User;
use crate::error::{AppError, AppResult};

pub use domain::{Registration, ValidRegistration};
pub use repository::{Activity, DynUserRepository, NewUser, SqliteUserRepository, UserRepository};

/// Identity store: account lookups that only ever see active users, plus
/// registration and credential checks orchestrated over the credential
/// service.
#[derive(Clone)]
pub struct IdentityStore {
    users: DynUserRepository,
    credentials: DynCredentialService,
}

impl IdentityStore {
    pub fn new(users: DynUserRepository, credentials: DynCredentialService) -> Self {
        Self { users, credentials }
    }

    pub async fn find_active_by_id(&self, id: &str) -> AppResult<Option<User>> {
        Ok(self.users.find_by_id(id, Activity::ActiveOnly).await?)
    }

    pub async fn find_active_by_email(&self, email: &str) -> AppResult<Option<User>> {
        Ok(self.users.find_by_email(email, Activity::ActiveOnly).await?)
    }

    pub async fn verify_credential(&self, user: &User, candidate: &str) -> AppResult<bool> {
        let credentials = self.credentials.clone();
        let candidate = candidate.to_string();
        let stored = user.password_hash.clone();
        // bcrypt is deliberately slow; keep it off the async workers
        tokio::task::spawn_blocking(move || credentials.verify(&candidate, &stored))
            .await
            .map_err(|e| AppError::Internal(format!("credential check panicked: {e}")))
    }

    pub async fn register(&self, registration: &Registration) -> AppResult<User> {
        let valid = registration.validate()?;

        // Inactive accounts still own their email address
        if self
            .users
            .find_by_email(&valid.email, Activity::IncludeInactive)
            .await?
            .is_some()
        {
            return Err(AppError::Conflict(
                "User with this email already exists".into(),
            ));
        }

        let credentials = self.credentials.clone();
        let password = valid.password.clone();
        let password_hash = tokio::task::spawn_blocking(move || credentials.hash(&password))
            .await
            .map_err(|e| AppError::Internal(format!("credential hashing panicked: {e}")))?
            .map_err(|e| AppError::Internal(format!("credential hashing failed: {e}")))?;

        let user = self
            .users
            .create(NewUser {
                name: valid.name,
                email: valid.email,
                phone_number: valid.phone_number,
                password_hash,
                role: valid.role,
            })
            .await
            .map_err(|e| match AppError::from(e) {
                AppError::Conflict(_) => {
                    AppError::Conflict("User with this email already exists".into())
                }
                other => other,
            })?;

        tracing::info!("User registered: {}", user.email);
        Ok(user)
    }

    /// Resolve an email/password pair to an active account.
    pub async fn authenticate(&self, email: &str, password: &str) -> AppResult<User> {
        if email.trim().is_empty() || password.is_empty() {
            return Err(AppError::Validation(
                "Please provide email and password".into(),
            ));
        }

        let invalid = || AppError::Authentication("Invalid email or password".into());

        let user = self.find_active_by_email(email).await?.ok_or_else(invalid)?;
        if !self.verify_credential(&user, password).await? {
            tracing::warn!("Failed login for {}", user.email);
            return Err(invalid());
        }

        tracing::info!("User logged in: {}", user.email);
        Ok(user)
    }

    pub async fn deactivate(&self, id: &str) -> AppResult<bool> {
        let changed = self.users.deactivate(id).await?;
        if changed {
            tracing::info!("User deactivated: {}", id);
        }
        Ok(changed)
    }
}

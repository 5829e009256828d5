// Request authorization. Every request walks the same transitions:
//   Unauthenticated -> TokenPresented -> TokenValidated -> UserResolved
// and ends Authorized or Denied. Nothing is cached between requests.

use crate::auth::tokens::{TokenClaims, TokenError, TokenService};
use crate::db::models::{Listing, Role};
use crate::error::AppError;
use crate::users::IdentityStore;

/// Why a request was refused, and at which transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Denial {
    /// No bearer credential on the request
    MissingCredential,
    InvalidToken,
    ExpiredToken,
    /// Token was good but its subject is unknown or deactivated
    UserNotFound,
    /// Authenticated, but the listing belongs to someone else
    NotOwner,
}

impl Denial {
    pub fn reason(&self) -> &'static str {
        match self {
            Denial::MissingCredential => "Authorization required",
            Denial::InvalidToken => "Invalid token",
            Denial::ExpiredToken => "Token expired",
            Denial::UserNotFound => "User not found",
            Denial::NotOwner => "You are not the owner of this listing",
        }
    }
}

impl From<Denial> for AppError {
    fn from(denial: Denial) -> Self {
        match denial {
            Denial::NotOwner => AppError::Authorization(denial.reason().to_string()),
            _ => AppError::Authentication(denial.reason().to_string()),
        }
    }
}

/// The resolved caller of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: Role,
}

/// Pull the token out of an `Authorization: Bearer <token>` header value.
/// Surrounding quotes, which some clients add, are stripped.
pub fn bearer_token(header: Option<&str>) -> Result<&str, Denial> {
    let value = header.ok_or(Denial::MissingCredential)?.trim();
    let (scheme, token) = value
        .split_once(char::is_whitespace)
        .ok_or(Denial::MissingCredential)?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(Denial::MissingCredential);
    }
    let token = token.trim().trim_matches(|c| c == '"' || c == '\'');
    if token.is_empty() {
        return Err(Denial::MissingCredential);
    }
    Ok(token)
}

pub struct AuthGuard<'a> {
    tokens: &'a dyn TokenService,
    identity: &'a IdentityStore,
}

impl<'a> AuthGuard<'a> {
    pub fn new(tokens: &'a dyn TokenService, identity: &'a IdentityStore) -> Self {
        Self { tokens, identity }
    }

    /// Run the request from `Unauthenticated` through `UserResolved`.
    pub async fn resolve(&self, authorization: Option<&str>) -> Result<Caller, AppError> {
        let token = bearer_token(authorization)?;

        let claims: TokenClaims = match self.tokens.verify(token).await {
            Ok(claims) => claims,
            Err(TokenError::Invalid) => return Err(Denial::InvalidToken.into()),
            Err(TokenError::Expired) => return Err(Denial::ExpiredToken.into()),
            Err(TokenError::Storage(e)) => return Err(e.into()),
        };

        let user = self
            .identity
            .find_active_by_id(&claims.subject_id)
            .await?
            .ok_or(Denial::UserNotFound)?;

        Ok(Caller {
            id: user.id,
            name: user.name,
            email: user.email,
            role: claims.role,
        })
    }
}

/// Final transition for mutations: only the owner may touch a listing.
pub fn ensure_owner(caller_id: &str, listing: &Listing) -> Result<(), Denial> {
    if listing.owner_id == caller_id {
        Ok(())
    } else {
        Err(Denial::NotOwner)
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Broker,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Broker => "broker",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "broker" => Ok(Role::Broker),
            "admin" => Ok(Role::Admin),
            other => Err(format!("Role must be one of: user, broker, admin (got '{other}')")),
        }
    }
}

/// A registered account. The credential hash and the active flag never
/// leave the server.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    pub phone_number: String,
    #[serde(skip)]
    pub password_hash: String,
    pub role: Role,
    #[serde(skip)]
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// Reference to an image held by the asset service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageRef {
    pub asset_id: String,
    pub url: String,
}

/// A listing row as stored, with bare owner/category references.
#[derive(Debug, Clone, PartialEq)]
pub struct Listing {
    pub id: String,
    pub title: String,
    pub slug: String,
    pub description: String,
    pub address: String,
    pub price: f64,
    pub house_type: String,
    pub number_of_rooms: u32,
    pub rented: bool,
    pub images: Vec<ImageRef>,
    pub owner_id: String,
    pub category_id: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OwnerSummary {
    pub id: String,
    pub name: String,
    pub email: String,
}

impl From<&User> for OwnerSummary {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            name: user.name.clone(),
            email: user.email.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategorySummary {
    pub id: String,
    pub name: String,
}

impl From<&Category> for CategorySummary {
    fn from(category: &Category) -> Self {
        Self {
            id: category.id.clone(),
            name: category.name.clone(),
        }
    }
}

/// A listing joined with its owner and category summaries, as returned to
/// callers. A summary is `None` when the referenced record is no longer
/// visible (e.g. the owner was deactivated).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingView {
    pub id: String,
    pub title: String,
    pub slug: String,
    pub description: String,
    pub address: String,
    pub price: f64,
    pub house_type: String,
    pub number_of_rooms: u32,
    pub rented: bool,
    pub image: Vec<ImageRef>,
    pub user: Option<OwnerSummary>,
    pub category: Option<CategorySummary>,
    pub created_at: DateTime<Utc>,
}

impl ListingView {
    pub fn new(
        listing: Listing,
        user: Option<OwnerSummary>,
        category: Option<CategorySummary>,
    ) -> Self {
        Self {
            id: listing.id,
            title: listing.title,
            slug: listing.slug,
            description: listing.description,
            address: listing.address,
            price: listing.price,
            house_type: listing.house_type,
            number_of_rooms: listing.number_of_rooms,
            rented: listing.rented,
            image: listing.images,
            user,
            category,
            created_at: listing.created_at,
        }
    }
}

// Listing input validation and slug derivation. Pure; no storage access.
use serde::Deserialize;

use crate::db::models::ImageRef;
use crate::error::{AppError, AppResult};
use crate::storage::validate_asset_id;

pub const MAX_TITLE_CHARS: usize = 100;

/// Untrusted create payload. Everything is optional so that missing fields
/// can be reported together instead of failing at the first one.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingInput {
    pub title: Option<String>,
    pub description: Option<String>,
    pub address: Option<String>,
    pub price: Option<f64>,
    pub house_type: Option<String>,
    pub number_of_rooms: Option<i64>,
    pub image: Option<Vec<ImageRef>>,
}

/// A create payload that passed validation, with its slug derived.
#[derive(Debug, Clone, PartialEq)]
pub struct NewListing {
    pub title: String,
    pub slug: String,
    pub description: String,
    pub address: String,
    pub price: f64,
    pub house_type: String,
    pub number_of_rooms: u32,
    pub images: Vec<ImageRef>,
}

fn text(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

fn missing_fields(fields: &[(&'static str, bool)]) -> AppResult<()> {
    let missing: Vec<&str> = fields
        .iter()
        .filter(|(_, present)| !present)
        .map(|(name, _)| *name)
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(AppError::Validation(format!(
            "Missing required fields: {}",
            missing.join(", ")
        )))
    }
}

fn checked_title(raw: &str) -> AppResult<(String, String)> {
    let title = raw.trim().to_string();
    if title.chars().count() > MAX_TITLE_CHARS {
        return Err(AppError::Validation(format!(
            "Title cannot exceed {MAX_TITLE_CHARS} characters"
        )));
    }
    let slug = slugify(&title);
    if slug.is_empty() {
        return Err(AppError::Validation(
            "Title must contain at least one letter or digit".into(),
        ));
    }
    Ok((title, slug))
}

fn checked_price(price: f64) -> AppResult<f64> {
    if !price.is_finite() || price < 0.0 {
        return Err(AppError::Validation("Price cannot be negative".into()));
    }
    Ok(price)
}

fn checked_rooms(rooms: i64) -> AppResult<u32> {
    if rooms < 1 {
        return Err(AppError::Validation("At least 1 room required".into()));
    }
    u32::try_from(rooms).map_err(|_| AppError::Validation("Number of rooms is too large".into()))
}

fn checked_images(images: &[ImageRef]) -> AppResult<Vec<ImageRef>> {
    if images
        .iter()
        .any(|img| img.asset_id.trim().is_empty() || img.url.trim().is_empty())
    {
        return Err(AppError::Validation(
            "Every image needs an assetId and a url".into(),
        ));
    }
    for image in images {
        validate_asset_id(&image.asset_id).map_err(|e| AppError::Validation(e.to_string()))?;
    }
    Ok(images.to_vec())
}

impl ListingInput {
    pub fn validate(&self) -> AppResult<NewListing> {
        missing_fields(&[
            ("title", text(&self.title).is_some()),
            ("description", text(&self.description).is_some()),
            ("address", text(&self.address).is_some()),
            ("price", self.price.is_some()),
            ("houseType", text(&self.house_type).is_some()),
            ("image", self.image.as_ref().is_some_and(|i| !i.is_empty())),
        ])?;

        let (title, slug) = checked_title(text(&self.title).unwrap_or_default())?;
        let price = checked_price(self.price.unwrap_or_default())?;
        let number_of_rooms = match self.number_of_rooms {
            Some(rooms) => checked_rooms(rooms)?,
            None => {
                return Err(AppError::Validation(
                    "Number of rooms is required".into(),
                ))
            }
        };
        let images = checked_images(self.image.as_deref().unwrap_or_default())?;

        Ok(NewListing {
            title,
            slug,
            description: text(&self.description).unwrap_or_default().to_string(),
            address: text(&self.address).unwrap_or_default().to_string(),
            price,
            house_type: text(&self.house_type).unwrap_or_default().to_string(),
            number_of_rooms,
            images,
        })
    }
}

/// Untrusted update payload. Absent fields are left as they are.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub address: Option<String>,
    pub price: Option<f64>,
    pub house_type: Option<String>,
    pub number_of_rooms: Option<i64>,
    pub rented: Option<bool>,
    pub image: Option<Vec<ImageRef>>,
}

/// Validated changes. `title` and `slug` always travel together.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListingChanges {
    pub title: Option<(String, String)>,
    pub description: Option<String>,
    pub address: Option<String>,
    pub price: Option<f64>,
    pub house_type: Option<String>,
    pub category_id: Option<String>,
    pub number_of_rooms: Option<u32>,
    pub rented: Option<bool>,
    pub images: Option<Vec<ImageRef>>,
}

fn non_blank(field: &str, value: &Option<String>) -> AppResult<Option<String>> {
    match value {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => {
            Err(AppError::Validation(format!("{field} cannot be empty")))
        }
        Some(raw) => Ok(Some(raw.trim().to_string())),
    }
}

impl ListingPatch {
    pub fn validate(&self) -> AppResult<ListingChanges> {
        let title = match &self.title {
            None => None,
            Some(raw) if raw.trim().is_empty() => {
                return Err(AppError::Validation("title cannot be empty".into()))
            }
            Some(raw) => Some(checked_title(raw)?),
        };

        let images = match &self.image {
            None => None,
            Some(images) if images.is_empty() => {
                return Err(AppError::Validation(
                    "A listing needs at least one image".into(),
                ))
            }
            Some(images) => Some(checked_images(images)?),
        };

        Ok(ListingChanges {
            title,
            description: non_blank("description", &self.description)?,
            address: non_blank("address", &self.address)?,
            price: self.price.map(checked_price).transpose()?,
            house_type: non_blank("houseType", &self.house_type)?,
            category_id: None,
            number_of_rooms: self.number_of_rooms.map(checked_rooms).transpose()?,
            rented: self.rented,
            images,
        })
    }
}

/// URL slug: transliterated to ASCII, lower-cased, with every run of other
/// characters collapsed into a single `-`.
pub fn slugify(title: &str) -> String {
    slug::slugify(title)
}

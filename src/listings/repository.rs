// Listing persistence. Filters, sorting and paging are pushed into SQL.
use async_trait::async_trait;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, OptionalExtension, Row};
use std::sync::Arc;

use crate::db::models::{ImageRef, Listing};
use crate::db::{self, RepositoryError};
use crate::listings::domain::ListingChanges;
use crate::listings::search::{ListingFilter, Page, SortKey};
use crate::state::DbPool;

#[async_trait]
pub trait ListingRepository: Send + Sync {
    async fn insert(&self, listing: &Listing) -> Result<(), RepositoryError>;

    async fn find_by_id(&self, id: &str) -> Result<Option<Listing>, RepositoryError>;

    async fn find_by_slug(&self, slug: &str) -> Result<Option<Listing>, RepositoryError>;

    /// Newest first.
    async fn find_by_category(&self, category_id: &str) -> Result<Vec<Listing>, RepositoryError>;

    /// True if another listing (not `exclude_id`) already uses this title or slug.
    async fn is_taken(
        &self,
        title: &str,
        slug: &str,
        exclude_id: Option<&str>,
    ) -> Result<bool, RepositoryError>;

    /// Apply the supplied changes in one statement. Returns false if no row
    /// had this id.
    async fn update(&self, id: &str, changes: &ListingChanges) -> Result<bool, RepositoryError>;

    async fn delete(&self, id: &str) -> Result<bool, RepositoryError>;

    /// One page of matching listings plus the size of the whole matching set.
    async fn search(
        &self,
        filter: &ListingFilter,
        sort: SortKey,
        page: Page,
    ) -> Result<(Vec<Listing>, u64), RepositoryError>;
}

pub type DynListingRepository = Arc<dyn ListingRepository>;

pub struct SqliteListingRepository {
    pool: DbPool,
}

impl SqliteListingRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

const LISTING_COLUMNS: &str = "id, title, slug, description, address, price, house_type, \
     number_of_rooms, rented, images, user_id, category_id, created_at";

fn listing_from_row(row: &Row<'_>) -> rusqlite::Result<Listing> {
    let images: String = row.get(9)?;
    let images: Vec<ImageRef> = serde_json::from_str(&images).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(9, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(Listing {
        id: row.get(0)?,
        title: row.get(1)?,
        slug: row.get(2)?,
        description: row.get(3)?,
        address: row.get(4)?,
        price: row.get(5)?,
        house_type: row.get(6)?,
        number_of_rooms: row.get(7)?,
        rented: row.get(8)?,
        images,
        owner_id: row.get(10)?,
        category_id: row.get(11)?,
        created_at: db::parse_timestamp(12, &row.get::<_, String>(12)?)?,
    })
}

/// Lower-cased pattern with LIKE wildcards escaped, so the keyword matches
/// literally against `ulower(column)`.
fn like_pattern(keyword: &str) -> String {
    let mut pattern = String::with_capacity(keyword.len() + 2);
    pattern.push('%');
    for c in keyword.to_lowercase().chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

/// WHERE clause and its positional parameters.
fn where_clause(filter: &ListingFilter) -> (String, Vec<Value>) {
    let mut conditions: Vec<&str> = Vec::new();
    let mut values: Vec<Value> = Vec::new();

    if filter.available_only {
        conditions.push("rented = 0");
    }
    if let Some(min) = filter.min_price {
        conditions.push("price >= ?");
        values.push(Value::Real(min));
    }
    if let Some(max) = filter.max_price {
        conditions.push("price <= ?");
        values.push(Value::Real(max));
    }
    if let Some(rooms) = filter.min_rooms {
        conditions.push("number_of_rooms >= ?");
        values.push(Value::Integer(i64::from(rooms)));
    }
    if let Some(house_type) = &filter.house_type {
        conditions.push("house_type = ?");
        values.push(Value::Text(house_type.clone()));
    }
    if let Some(keyword) = &filter.keyword {
        conditions.push(
            "(ulower(title) LIKE ? ESCAPE '\\' \
             OR ulower(description) LIKE ? ESCAPE '\\' \
             OR ulower(address) LIKE ? ESCAPE '\\')",
        );
        let pattern = like_pattern(keyword);
        for _ in 0..3 {
            values.push(Value::Text(pattern.clone()));
        }
    }

    if conditions.is_empty() {
        (String::new(), values)
    } else {
        (format!(" WHERE {}", conditions.join(" AND ")), values)
    }
}

#[async_trait]
impl ListingRepository for SqliteListingRepository {
    async fn insert(&self, listing: &Listing) -> Result<(), RepositoryError> {
        let conn = self.pool.get()?;
        conn.execute(
            &format!(
                "INSERT INTO listings ({LISTING_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)"
            ),
            params![
                listing.id,
                listing.title,
                listing.slug,
                listing.description,
                listing.address,
                listing.price,
                listing.house_type,
                listing.number_of_rooms,
                listing.rented,
                serde_json::to_string(&listing.images)?,
                listing.owner_id,
                listing.category_id,
                db::format_timestamp(listing.created_at),
            ],
        )?;
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Listing>, RepositoryError> {
        let conn = self.pool.get()?;
        let listing = conn
            .query_row(
                &format!("SELECT {LISTING_COLUMNS} FROM listings WHERE id = ?1"),
                params![id],
                listing_from_row,
            )
            .optional()?;
        Ok(listing)
    }

    async fn find_by_slug(&self, slug: &str) -> Result<Option<Listing>, RepositoryError> {
        let conn = self.pool.get()?;
        let listing = conn
            .query_row(
                &format!("SELECT {LISTING_COLUMNS} FROM listings WHERE slug = ?1"),
                params![slug],
                listing_from_row,
            )
            .optional()?;
        Ok(listing)
    }

    async fn find_by_category(&self, category_id: &str) -> Result<Vec<Listing>, RepositoryError> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {LISTING_COLUMNS} FROM listings WHERE category_id = ?1
             ORDER BY {}",
            SortKey::Newest.order_by()
        ))?;
        let listings = stmt
            .query_map(params![category_id], listing_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(listings)
    }

    async fn is_taken(
        &self,
        title: &str,
        slug: &str,
        exclude_id: Option<&str>,
    ) -> Result<bool, RepositoryError> {
        let conn = self.pool.get()?;
        let taken: bool = conn.query_row(
            "SELECT EXISTS(
                SELECT 1 FROM listings
                WHERE (title = ?1 OR slug = ?2) AND (?3 IS NULL OR id != ?3)
             )",
            params![title, slug, exclude_id],
            |row| row.get(0),
        )?;
        Ok(taken)
    }

    async fn update(&self, id: &str, changes: &ListingChanges) -> Result<bool, RepositoryError> {
        let mut sets: Vec<&str> = Vec::new();
        let mut values: Vec<Value> = Vec::new();

        if let Some((title, slug)) = &changes.title {
            sets.push("title = ?");
            values.push(Value::Text(title.clone()));
            sets.push("slug = ?");
            values.push(Value::Text(slug.clone()));
        }
        if let Some(description) = &changes.description {
            sets.push("description = ?");
            values.push(Value::Text(description.clone()));
        }
        if let Some(address) = &changes.address {
            sets.push("address = ?");
            values.push(Value::Text(address.clone()));
        }
        if let Some(price) = changes.price {
            sets.push("price = ?");
            values.push(Value::Real(price));
        }
        if let Some(house_type) = &changes.house_type {
            sets.push("house_type = ?");
            values.push(Value::Text(house_type.clone()));
        }
        if let Some(category_id) = &changes.category_id {
            sets.push("category_id = ?");
            values.push(Value::Text(category_id.clone()));
        }
        if let Some(rooms) = changes.number_of_rooms {
            sets.push("number_of_rooms = ?");
            values.push(Value::Integer(i64::from(rooms)));
        }
        if let Some(rented) = changes.rented {
            sets.push("rented = ?");
            values.push(Value::Integer(i64::from(rented)));
        }
        if let Some(images) = &changes.images {
            sets.push("images = ?");
            values.push(Value::Text(serde_json::to_string(images)?));
        }

        let conn = self.pool.get()?;
        if sets.is_empty() {
            let exists: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM listings WHERE id = ?1)",
                params![id],
                |row| row.get(0),
            )?;
            return Ok(exists);
        }

        values.push(Value::Text(id.to_string()));
        let rows = conn.execute(
            &format!("UPDATE listings SET {} WHERE id = ?", sets.join(", ")),
            params_from_iter(values),
        )?;
        Ok(rows > 0)
    }

    async fn delete(&self, id: &str) -> Result<bool, RepositoryError> {
        let conn = self.pool.get()?;
        let rows = conn.execute("DELETE FROM listings WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    async fn search(
        &self,
        filter: &ListingFilter,
        sort: SortKey,
        page: Page,
    ) -> Result<(Vec<Listing>, u64), RepositoryError> {
        let conn = self.pool.get()?;
        let (clause, mut values) = where_clause(filter);

        let total: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM listings{clause}"),
            params_from_iter(values.iter()),
            |row| row.get(0),
        )?;

        values.push(Value::Integer(i64::from(page.limit)));
        values.push(Value::Integer(
            i64::try_from(page.offset()).unwrap_or(i64::MAX),
        ));
        let mut stmt = conn.prepare(&format!(
            "SELECT {LISTING_COLUMNS} FROM listings{clause} ORDER BY {} LIMIT ? OFFSET ?",
            sort.order_by()
        ))?;
        let listings = stmt
            .query_map(params_from_iter(values.iter()), listing_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok((listings, total.max(0) as u64))
    }
}

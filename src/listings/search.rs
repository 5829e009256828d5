// Search input parsing, sort policy and pagination math.
use serde::{Deserialize, Serialize};

use crate::db::models::Listing;
use crate::error::{AppError, AppResult};

/// Raw query-string parameters. Everything arrives as text so that bad
/// numbers can be reported by field name instead of as a generic 400.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchParams {
    pub keyword: Option<String>,
    pub min_price: Option<String>,
    pub max_price: Option<String>,
    #[serde(alias = "minRooms")]
    pub rooms: Option<String>,
    pub house_type: Option<String>,
    pub sort: Option<String>,
    pub page: Option<String>,
    pub limit: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortKey {
    #[default]
    Newest,
    Oldest,
    PriceAsc,
    PriceDesc,
}

impl SortKey {
    /// Unknown keys fall back to `Newest`.
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            Some("oldest") => SortKey::Oldest,
            Some("priceAsc") => SortKey::PriceAsc,
            Some("priceDesc") => SortKey::PriceDesc,
            _ => SortKey::Newest,
        }
    }

    /// ORDER BY clause. Every key ends with `created_at, id` so the order is
    /// total and two identical searches page identically.
    pub fn order_by(&self) -> &'static str {
        match self {
            SortKey::Newest => "created_at DESC, id DESC",
            SortKey::Oldest => "created_at ASC, id ASC",
            SortKey::PriceAsc => "price ASC, created_at DESC, id DESC",
            SortKey::PriceDesc => "price DESC, created_at DESC, id DESC",
        }
    }
}

/// A validated 1-based page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub number: u32,
    pub limit: u32,
}

impl Page {
    pub fn new(number: i64, limit: i64) -> AppResult<Self> {
        if number < 1 {
            return Err(AppError::Validation("page must be at least 1".into()));
        }
        if limit < 1 {
            return Err(AppError::Validation("limit must be at least 1".into()));
        }
        let number = u32::try_from(number)
            .map_err(|_| AppError::Validation("page is too large".into()))?;
        let limit =
            u32::try_from(limit).map_err(|_| AppError::Validation("limit is too large".into()))?;
        Ok(Self { number, limit })
    }

    /// Page from the `page`/`limit` query parameters, defaulting to the
    /// first page of `default_limit` items.
    pub fn from_params(params: &SearchParams, default_limit: u32) -> AppResult<Self> {
        Self::new(
            parse_integer("page", &params.page)?.unwrap_or(1),
            parse_integer("limit", &params.limit)?.unwrap_or(i64::from(default_limit)),
        )
    }

    pub fn offset(&self) -> u64 {
        (u64::from(self.number) - 1) * u64::from(self.limit)
    }

    pub fn total_pages(&self, total: u64) -> u64 {
        total.div_ceil(u64::from(self.limit))
    }
}

/// One page of results plus the numbers a client needs to render a pager.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Paginated<T> {
    #[serde(rename = "data")]
    pub items: Vec<T>,
    pub total: u64,
    pub total_pages: u64,
    pub current_page: u32,
}

impl<T> Paginated<T> {
    pub fn new(items: Vec<T>, total: u64, page: Page) -> Self {
        Self {
            items,
            total,
            total_pages: page.total_pages(total),
            current_page: page.number,
        }
    }
}

/// Predicate over listings. The repository translates it to SQL; `matches`
/// is the same predicate in memory.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListingFilter {
    pub available_only: bool,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub min_rooms: Option<u32>,
    /// Already trimmed and non-empty
    pub keyword: Option<String>,
    pub house_type: Option<String>,
}

impl ListingFilter {
    pub fn matches(&self, listing: &Listing) -> bool {
        if self.available_only && listing.rented {
            return false;
        }
        if self.min_price.is_some_and(|min| listing.price < min) {
            return false;
        }
        if self.max_price.is_some_and(|max| listing.price > max) {
            return false;
        }
        if self.min_rooms.is_some_and(|min| listing.number_of_rooms < min) {
            return false;
        }
        if let Some(house_type) = &self.house_type {
            if &listing.house_type != house_type {
                return false;
            }
        }
        if let Some(keyword) = &self.keyword {
            let needle = keyword.to_lowercase();
            let hit = [&listing.title, &listing.description, &listing.address]
                .iter()
                .any(|field| field.to_lowercase().contains(&needle));
            if !hit {
                return false;
            }
        }
        true
    }
}

/// A fully validated search request.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchQuery {
    pub filter: ListingFilter,
    pub sort: SortKey,
    pub page: Page,
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

fn parse_number(field: &str, value: &Option<String>) -> AppResult<Option<f64>> {
    match non_empty(value) {
        None => Ok(None),
        Some(raw) => raw
            .parse::<f64>()
            .ok()
            .filter(|n| n.is_finite())
            .map(Some)
            .ok_or_else(|| AppError::Validation(format!("{field} must be a number"))),
    }
}

fn parse_integer(field: &str, value: &Option<String>) -> AppResult<Option<i64>> {
    match non_empty(value) {
        None => Ok(None),
        Some(raw) => raw
            .parse::<i64>()
            .map(Some)
            .map_err(|_| AppError::Validation(format!("{field} must be an integer"))),
    }
}

impl SearchQuery {
    pub fn from_params(params: &SearchParams, default_limit: u32) -> AppResult<Self> {
        let min_price = parse_number("minPrice", &params.min_price)?;
        let max_price = parse_number("maxPrice", &params.max_price)?;

        // Fewer than one room is no constraint at all
        let min_rooms = parse_integer("rooms", &params.rooms)?
            .filter(|&rooms| rooms > 0)
            .map(|rooms| u32::try_from(rooms).unwrap_or(u32::MAX));

        let house_type = non_empty(&params.house_type)
            .filter(|t| *t != "all")
            .map(str::to_string);

        let page = Page::from_params(params, default_limit)?;

        Ok(Self {
            filter: ListingFilter {
                available_only: true,
                min_price,
                max_price,
                min_rooms,
                keyword: non_empty(&params.keyword).map(str::to_string),
                house_type,
            },
            sort: SortKey::parse(params.sort.as_deref()),
            page,
        })
    }
}

pub mod domain;
pub mod repository;
pub mod search;
pub mod service;

pub use domain::{slugify, ListingInput, ListingPatch};
pub use repository::{DynListingRepository, ListingRepository, SqliteListingRepository};
pub use search::{ListingFilter, Page, Paginated, SearchParams, SearchQuery, SortKey};
pub use service::ListingService;

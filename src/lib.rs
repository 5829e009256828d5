// Library exports for abode
// Integration tests and the binary both build on these modules

pub mod auth;
pub mod categories;
pub mod config;
pub mod db;
pub mod error;
pub mod extractors;
pub mod listings;
pub mod routes;
pub mod state;
pub mod storage;
pub mod users;

// odc-gee - Library root

pub mod auth;
pub mod config;
pub mod engine;
pub mod error;
pub mod loader;
pub mod models;

pub use error::{LoadError, QueryError};
pub use loader::{AuthenticatedLoader, LoaderSettings};

// Query engine boundary
// The loader only needs `load`; everything about the backend stays behind this trait

mod earth_engine;

use async_trait::async_trait;

use crate::auth::SessionSnapshot;
use crate::error::QueryError;
use crate::models::{Dataset, Query};

pub use earth_engine::{EarthEngineClient, EngineSettings};

/// Underlying data-query engine.
///
/// Implementations authenticate with the bearer token in `auth` and must
/// report expired or invalid credentials as [`QueryError::Unauthenticated`];
/// that is the only error the loader retries.
#[async_trait]
pub trait QueryEngine: Send + Sync {
    async fn load(&self, query: &Query, auth: &SessionSnapshot) -> Result<Dataset, QueryError>;
}

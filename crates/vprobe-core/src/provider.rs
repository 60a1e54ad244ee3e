//! Environment provider abstraction.

use async_trait::async_trait;

use crate::error::Result;
use crate::handler::InstanceHandler;
use crate::query::QueryParams;
use crate::types::EnvKind;

/// A queryable environment able to enumerate candidate instances.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Name of the provider, unique within a client.
    fn name(&self) -> &str;

    /// Kind of environment this provider searches.
    fn env(&self) -> EnvKind;

    /// Enumerate the handlers of every running instance matching `params`.
    ///
    /// No filters selects every instance. Zero matches is an empty result.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend is unreachable or the query malformed.
    async fn query(&self, params: &[QueryParams]) -> Result<Vec<Box<dyn InstanceHandler>>>;
}

use crate::runtime::contract::{InvalidationRequest, InvalidationStatus};

pub trait DistributionProvider {
    /// Submits the request and returns the provider-assigned invalidation id.
    fn create_invalidation(&self, request: &InvalidationRequest) -> Result<String, String>;

    fn invalidation_status(
        &self,
        distribution_id: &str,
        invalidation_id: &str,
    ) -> Result<InvalidationStatus, String>;
}

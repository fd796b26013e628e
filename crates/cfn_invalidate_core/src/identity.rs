use uuid::Uuid;

use crate::contract::{RequestType, ValidationError};

pub const PHYSICAL_ID_PREFIX: &str = "invalidate.";

/// Physical resource id shared by every lifecycle call of one resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceIdentity(String);

impl ResourceIdentity {
    pub fn generate() -> Self {
        Self(format!("{PHYSICAL_ID_PREFIX}{}", Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl std::fmt::Display for ResourceIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Create always mints a new id; Update and Delete must relay the existing one.
pub fn resolve_identity(
    request_type: RequestType,
    existing: Option<&str>,
) -> Result<ResourceIdentity, ValidationError> {
    if request_type == RequestType::Create {
        return Ok(ResourceIdentity::generate());
    }

    match existing {
        Some(value) if !value.is_empty() => Ok(ResourceIdentity(value.to_string())),
        _ => Err(ValidationError::new(format!(
            "invalid request: request type is '{request_type}' but 'PhysicalResourceId' is not defined"
        ))),
    }
}

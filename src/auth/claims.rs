use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::repo_types::Role;

/// JWT payload used for authentication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,    // user ID
    pub role: Role,   // authorization tier at issuance
    pub name: String, // display name at issuance
    pub iat: usize,   // issued at (unix timestamp)
    pub exp: usize,   // expires at (unix timestamp)
    pub iss: String,  // issuer
    pub aud: String,  // audience
}

/// Verified identity attached to a request once the gate lets it through.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionUser {
    pub id: Uuid,
    pub role: Role,
    pub name: String,
}

impl From<Claims> for SessionUser {
    fn from(c: Claims) -> Self {
        Self {
            id: c.sub,
            role: c.role,
            name: c.name,
        }
    }
}

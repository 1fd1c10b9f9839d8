use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// JWT payload carried by every session credential.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Claims {
    pub id: Uuid,          // user ID
    pub email: String,
    pub school_id: Uuid,
    pub iat: usize,        // issued at (unix timestamp)
    pub exp: usize,        // expires at (unix timestamp)
    pub iss: String,
    pub aud: String,
}

/// Identity asserted by a session credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionIdentity {
    pub id: Uuid,
    pub email: String,
    pub school_id: Uuid,
}

impl From<Claims> for SessionIdentity {
    fn from(c: Claims) -> Self {
        Self {
            id: c.id,
            email: c.email,
            school_id: c.school_id,
        }
    }
}

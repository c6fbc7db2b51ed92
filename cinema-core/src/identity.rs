use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::{CoreError, CoreResult};

pub const ROLE_ADMIN: &str = "admin";
pub const ROLE_EDITOR: &str = "editor";
pub const ROLE_VIEWER: &str = "viewer";

/// Roles allowed to reserve seats and read their own history.
pub const BOOKING_ROLES: &[&str] = &[ROLE_ADMIN, ROLE_EDITOR, ROLE_VIEWER];
/// Roles allowed to mutate the catalog.
pub const CATALOG_ROLES: &[&str] = &[ROLE_ADMIN, ROLE_EDITOR];

/// Verified identity of a caller, independent of the token format it came from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    pub subject: String,
    pub roles: HashSet<String>,
}

impl Claims {
    pub fn new<I, R>(subject: impl Into<String>, roles: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<String>,
    {
        Self {
            subject: subject.into(),
            roles: roles.into_iter().map(Into::into).collect(),
        }
    }
}

/// `admin` satisfies every check; an empty requirement admits any verified caller.
pub fn has_required_role(roles: &HashSet<String>, required: &[&str]) -> bool {
    if roles.contains(ROLE_ADMIN) || required.is_empty() {
        return true;
    }
    required.iter().any(|role| roles.contains(*role))
}

pub fn authorize(claims: &Claims, required: &[&str]) -> CoreResult<()> {
    if has_required_role(&claims.roles, required) {
        Ok(())
    } else {
        Err(CoreError::Forbidden("Insufficient rights".to_string()))
    }
}

/// Boundary to the identity provider: bearer token in, claims out.
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    /// Fails with `CoreError::Unauthenticated` for garbled, expired or unsigned tokens.
    async fn verify(&self, token: &str) -> CoreResult<Claims>;
}

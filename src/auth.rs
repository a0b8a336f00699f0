use std::collections::HashMap;

use anyhow::anyhow;

use crate::error::{LibError, Result};
use crate::models::{Role, UserId};

/// Identity resolved from an access token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller {
    pub id: UserId,
    pub role: Role,
}

impl Caller {
    pub fn user(id: UserId) -> Self {
        Self {
            id,
            role: Role::User,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// Token validation seam. Issuing and verifying tokens happens elsewhere;
/// graph code only needs the subject and the admin flag.
pub trait ResolvesCaller {
    fn resolve_caller(&self, token: &str) -> Result<Caller>;

    fn is_admin(&self, token: &str) -> bool {
        self.resolve_caller(token)
            .map(|caller| caller.is_admin())
            .unwrap_or(false)
    }
}

/// Fixed token-to-caller table, for development servers and tests.
#[derive(Debug, Clone, Default)]
pub struct TokenTable {
    tokens: HashMap<String, Caller>,
}

impl TokenTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(mut self, token: impl Into<String>, caller: Caller) -> Self {
        self.insert(token, caller);
        self
    }

    pub fn insert(&mut self, token: impl Into<String>, caller: Caller) {
        self.tokens.insert(token.into(), caller);
    }
}

impl ResolvesCaller for TokenTable {
    fn resolve_caller(&self, token: &str) -> Result<Caller> {
        self.tokens.get(token).copied().ok_or_else(|| {
            LibError::unauthenticated("Invalid access token", anyhow!("unknown bearer token"))
        })
    }
}

/// Extracts the token from an `Authorization: Bearer <token>` header value.
pub fn bearer_token(header: &str) -> Result<&str> {
    match header.strip_prefix("Bearer ") {
        Some(token) if !token.trim().is_empty() => Ok(token.trim()),
        _ => Err(LibError::unauthenticated(
            "Invalid Authorization header",
            anyhow!("authorization header is not a bearer token"),
        )),
    }
}

#[cfg(feature = "api")]
mod extract {
    use anyhow::anyhow;
    use axum::extract::FromRequestParts;
    use axum::http::header::AUTHORIZATION;
    use axum::http::request::Parts;

    use super::{Caller, ResolvesCaller, bearer_token};
    use crate::api::AppError;
    use crate::error::LibError;

    /// Caller resolved from the request's bearer token.
    #[derive(Debug, Clone, Copy)]
    pub struct AuthenticatedCaller(pub Caller);

    impl<S> FromRequestParts<S> for AuthenticatedCaller
    where
        S: ResolvesCaller + Send + Sync,
    {
        type Rejection = AppError;

        async fn from_request_parts(
            parts: &mut Parts,
            state: &S,
        ) -> std::result::Result<Self, Self::Rejection> {
            let header = parts
                .headers
                .get(AUTHORIZATION)
                .and_then(|value| value.to_str().ok())
                .ok_or_else(|| {
                    LibError::unauthenticated(
                        "Missing Authorization header",
                        anyhow!("request had no authorization header"),
                    )
                })?;
            let token = bearer_token(header)?;
            Ok(Self(state.resolve_caller(token)?))
        }
    }
}

#[cfg(feature = "api")]
pub use extract::AuthenticatedCaller;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn bearer_token_requires_prefix() {
        assert_eq!(bearer_token("Bearer abc").expect("token"), "abc");
        let err = bearer_token("Basic abc").expect_err("not bearer");
        assert_eq!(err.kind, ErrorKind::Unauthenticated);
        assert!(bearer_token("Bearer   ").is_err());
    }

    #[test]
    fn token_table_resolves_known_tokens() {
        let table = TokenTable::new()
            .with_token("t1", Caller::user(UserId(1)))
            .with_token(
                "root",
                Caller {
                    id: UserId(2),
                    role: Role::Admin,
                },
            );

        assert_eq!(table.resolve_caller("t1").expect("t1").id, UserId(1));
        assert!(!table.is_admin("t1"));
        assert!(table.is_admin("root"));
        assert!(!table.is_admin("missing"));
        let err = table.resolve_caller("missing").expect_err("unknown token");
        assert_eq!(err.kind, ErrorKind::Unauthenticated);
    }
}

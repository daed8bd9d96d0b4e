//! Caller identity extracted from the bearer token.

use axum::{async_trait, extract::FromRequestParts, http::{header::AUTHORIZATION, request::Parts}};
use uuid::Uuid;

use crate::domain::aggregates::Role;
use crate::{AppState, EcommerceError};

#[derive(Clone, Copy, Debug)]
pub struct AuthUser {
    pub id: Uuid,
    pub role: Role,
}

/// An authenticated caller whose stored role is `admin` or `superadmin`.
///
/// The role is read from the user record on every request, so a demotion
/// takes effect before the token expires.
#[derive(Clone, Copy, Debug)]
pub struct AdminUser(pub AuthUser);

fn bearer(parts: &Parts) -> Option<&str> {
    parts.headers.get(AUTHORIZATION)?.to_str().ok()?.strip_prefix("Bearer ").map(str::trim).filter(|t| !t.is_empty())
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = EcommerceError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer(parts).ok_or_else(|| EcommerceError::Unauthorized("Authentication required".into()))?;
        let claims = state.accounts.verify_token(token)?;
        Ok(Self { id: claims.sub, role: claims.role })
    }
}

#[async_trait]
impl FromRequestParts<AppState> for AdminUser {
    type Rejection = EcommerceError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let caller = AuthUser::from_request_parts(parts, state).await?;
        let role = match state.accounts.load(caller.id).await {
            Ok(user) => user.role,
            Err(EcommerceError::NotFound(_)) => return Err(EcommerceError::Unauthorized("Authentication required".into())),
            Err(e) => return Err(e),
        };
        if !role.is_admin() { return Err(EcommerceError::Unauthorized("Admin access required".into())); }
        Ok(Self(AuthUser { id: caller.id, role }))
    }
}

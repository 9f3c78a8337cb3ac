//! Authorization gate.
//!
//! Every protected handler takes one of [`AuthUser`], [`Authorized<UserOrAdmin>`] or
//! [`Authorized<AdminOnly>`] as its first extractor. Extraction runs before any body
//! parsing, so a rejected request never reaches the handler. Verification is stateless:
//! the token's claims are trusted until expiry and no store lookup happens here.

use std::marker::PhantomData;

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
};
use tracing::warn;

use super::{claims::SessionUser, jwt::JwtKeys, repo_types::Role};
use crate::error::ApiError;

/// Roles a route accepts. An empty set accepts any verified identity.
pub trait RolePolicy: Send + Sync + 'static {
    const ALLOWED: &'static [Role];
}

#[derive(Debug, Clone, Copy)]
pub struct AnyRole;
#[derive(Debug, Clone, Copy)]
pub struct UserOrAdmin;
#[derive(Debug, Clone, Copy)]
pub struct AdminOnly;

impl RolePolicy for AnyRole {
    const ALLOWED: &'static [Role] = &[];
}

impl RolePolicy for UserOrAdmin {
    const ALLOWED: &'static [Role] = &[Role::User, Role::Admin];
}

impl RolePolicy for AdminOnly {
    const ALLOWED: &'static [Role] = &[Role::Admin];
}

/// Runs the three gate steps: token presence, signature/expiry, role membership.
pub fn authorize(
    headers: &HeaderMap,
    keys: &JwtKeys,
    allowed: &[Role],
) -> Result<SessionUser, ApiError> {
    let header = headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .map(str::trim)
        .filter(|h| !h.is_empty())
        .ok_or(ApiError::Unauthenticated)?;

    let token = header
        .strip_prefix("Bearer ")
        .or_else(|| header.strip_prefix("bearer "))
        .map(str::trim)
        .ok_or(ApiError::InvalidToken)?;
    if token.is_empty() {
        return Err(ApiError::Unauthenticated);
    }

    let user = SessionUser::from(keys.verify(token).map_err(|e| {
        warn!(error = %e, "rejected session token");
        e
    })?);

    if !allowed.is_empty() && !allowed.contains(&user.role) {
        warn!(user_id = %user.id, role = %user.role, "insufficient role");
        return Err(ApiError::Forbidden);
    }
    Ok(user)
}

/// Any authenticated identity.
#[derive(Debug, Clone)]
pub struct AuthUser(pub SessionUser);

/// An authenticated identity whose role is in `P::ALLOWED`.
#[derive(Debug, Clone)]
pub struct Authorized<P: RolePolicy>(pub SessionUser, pub PhantomData<P>);

#[async_trait]
impl<S, P> FromRequestParts<S> for Authorized<P>
where
    S: Send + Sync,
    P: RolePolicy,
    JwtKeys: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let keys = JwtKeys::from_ref(state);
        let user = authorize(&parts.headers, &keys, P::ALLOWED)?;
        parts.extensions.insert(user.clone());
        Ok(Authorized(user, PhantomData))
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    JwtKeys: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Authorized(user, _) = Authorized::<AnyRole>::from_request_parts(parts, state).await?;
        Ok(AuthUser(user))
    }
}

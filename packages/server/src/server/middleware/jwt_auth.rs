use crate::common::OwnerId;
use crate::domains::auth::JwtService;
use crate::server::error::ApiError;
use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::debug;

/// Authenticated owner from a verified JWT
#[derive(Clone, Debug)]
pub struct AuthUser {
    pub owner_id: OwnerId,
    pub is_admin: bool,
}

/// JWT authentication middleware
///
/// Extracts JWT token from Authorization header, verifies it, and adds AuthUser to request extensions.
/// Requests without a valid token continue unauthenticated; handlers that need an
/// owner take `AuthUser` as an extractor and reject with 401.
pub async fn jwt_auth_middleware(
    jwt_service: Arc<JwtService>,
    mut request: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Response {
    let auth_user = bearer_token(request.headers())
        .and_then(|token| authenticate(token, &jwt_service));

    if let Some(user) = auth_user {
        debug!(owner_id = %user.owner_id, "Authenticated request");
        request.extensions_mut().insert(user);
    }

    next.run(request).await
}

/// Verify a raw token and resolve the owner it was issued for.
pub fn authenticate(token: &str, jwt_service: &JwtService) -> Option<AuthUser> {
    let claims = jwt_service.verify_token(token).ok()?;
    let owner_id = claims.owner_id().ok()?;

    Some(AuthUser {
        owner_id,
        is_admin: claims.is_admin,
    })
}

/// Token from the Authorization header, with or without the `Bearer ` prefix.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let auth_str = headers.get("authorization")?.to_str().ok()?;
    Some(auth_str.strip_prefix("Bearer ").unwrap_or(auth_str))
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthUser>()
            .cloned()
            .ok_or(ApiError::Unauthorized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers_with(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", value.parse().unwrap());
        headers
    }

    #[test]
    fn test_authenticate_with_bearer() {
        let jwt_service = JwtService::new("test_secret", "test_issuer".to_string());
        let owner_id = OwnerId::new();
        let token = jwt_service.create_token(owner_id).unwrap();

        let headers = headers_with(&format!("Bearer {}", token));
        let user = bearer_token(&headers)
            .and_then(|t| authenticate(t, &jwt_service))
            .unwrap();

        assert_eq!(user.owner_id, owner_id);
        assert!(!user.is_admin);
    }

    #[test]
    fn test_authenticate_without_bearer_prefix() {
        let jwt_service = JwtService::new("test_secret", "test_issuer".to_string());
        let owner_id = OwnerId::new();
        let token = jwt_service.create_token(owner_id).unwrap();

        let headers = headers_with(&token);
        let user = bearer_token(&headers).and_then(|t| authenticate(t, &jwt_service));

        assert_eq!(user.map(|u| u.owner_id), Some(owner_id));
    }

    #[test]
    fn test_no_auth_header() {
        assert!(bearer_token(&HeaderMap::new()).is_none());
    }

    #[test]
    fn test_invalid_token() {
        let jwt_service = JwtService::new("test_secret", "test_issuer".to_string());
        assert!(authenticate("invalid_token", &jwt_service).is_none());
    }

    #[test]
    fn test_token_from_other_issuer_rejected() {
        let ours = JwtService::new("test_secret", "test_issuer".to_string());
        let theirs = JwtService::new("test_secret", "other_issuer".to_string());
        let token = theirs.create_token(OwnerId::new()).unwrap();

        assert!(authenticate(&token, &ours).is_none());
    }
}

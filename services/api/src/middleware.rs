//! Authentication middleware for JWT token validation

use axum::{
    extract::State,
    http::{HeaderMap, Request},
    middleware::Next,
    response::Response,
};
use booking::BookingError;
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::{error::ApiError, state::AppState};

/// JWT claims structure
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Id of the staff user in the booking store
    pub sub: Uuid,
    #[serde(default)]
    pub roles: Vec<String>,
    /// Expiration time
    pub exp: u64,
}

/// Authenticated staff member
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
}

pub fn bearer_token(headers: &HeaderMap) -> Result<&str, ApiError> {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|header| header.to_str().ok())
        .and_then(|header| header.strip_prefix("Bearer "))
        .ok_or(ApiError::Unauthorized)
}

pub fn decode_claims(token: &str, key: &DecodingKey) -> Result<Claims, ApiError> {
    let mut validation = Validation::new(Algorithm::RS256);
    validation.validate_exp = true;

    jsonwebtoken::decode::<Claims>(token, key, &validation)
        .map(|data| data.claims)
        .map_err(|e| {
            warn!("Failed to validate token: {}", e);
            ApiError::Unauthorized
        })
}

/// Validates the bearer token and requires its subject to be an active staff user
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let token = bearer_token(req.headers())?;
    let claims = decode_claims(token, &state.decoding_key)?;

    let staff = match state.lifecycle.require_staff(claims.sub).await {
        Ok(user) => user,
        Err(BookingError::NotFound { .. }) | Err(BookingError::Forbidden(_)) => {
            return Err(ApiError::Forbidden(format!(
                "user {} is not a staff member",
                claims.sub
            )));
        }
        Err(e) => {
            error!("Failed to resolve staff user {}: {}", claims.sub, e);
            return Err(e.into());
        }
    };

    debug!("Staff {} authenticated with roles {:?}", staff.id, claims.roles);
    req.extensions_mut().insert(AuthUser { id: staff.id });

    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_bearer_token_extraction() {
        let mut headers = HeaderMap::new();
        assert!(matches!(bearer_token(&headers), Err(ApiError::Unauthorized)));

        headers.insert(
            axum::http::header::AUTHORIZATION,
            HeaderValue::from_static("Basic abc"),
        );
        assert!(matches!(bearer_token(&headers), Err(ApiError::Unauthorized)));

        headers.insert(
            axum::http::header::AUTHORIZATION,
            HeaderValue::from_static("Bearer abc.def.ghi"),
        );
        assert_eq!(bearer_token(&headers).unwrap(), "abc.def.ghi");
    }

    #[test]
    fn test_malformed_token_is_unauthorized() {
        let key = DecodingKey::from_secret(b"secret");
        assert!(matches!(
            decode_claims("not-a-jwt", &key),
            Err(ApiError::Unauthorized)
        ));
    }
}

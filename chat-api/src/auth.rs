use axum::{
    extract::Request,
    http::header::AUTHORIZATION,
    response::{IntoResponse, Response},
};
use chat_core::types::{Actor, PlatformRole};
use chat_core::ChatError;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing;

use crate::error::ApiError;
use crate::server::ApiState;

/// JWT claims issued by the identity provider.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    #[serde(default)]
    pub role: PlatformRole,
    pub exp: usize,
}

/// Extract JWT token from an `Authorization: Bearer` header
pub fn extract_token(auth_header: Option<&str>) -> Option<String> {
    auth_header?
        .strip_prefix("Bearer ")
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Sign a token for `actor` valid for `expires_in_secs`.
pub fn generate_token(actor: &Actor, secret: &str, expires_in_secs: u64) -> Result<String, ChatError> {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| ChatError::Internal(e.into()))?
        .as_secs();

    let claims = Claims {
        sub: actor.user_id.clone(),
        role: actor.role,
        exp: (now + expires_in_secs) as usize,
    };

    encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_ref())).map_err(|e| {
        tracing::error!("Failed to generate JWT token: {}", e);
        ChatError::Internal(e.into())
    })
}

/// Verify a token and resolve the caller it names.
pub fn verify_token(token: &str, secret: &str) -> Result<Actor, ChatError> {
    let decoding_key = DecodingKey::from_secret(secret.as_ref());

    match decode::<Claims>(token, &decoding_key, &Validation::default()) {
        Ok(data) if !data.claims.sub.trim().is_empty() => Ok(Actor {
            user_id: data.claims.sub,
            role: data.claims.role,
        }),
        Ok(_) => Err(ChatError::Unauthenticated),
        Err(e) => {
            tracing::debug!("JWT verification failed: {}", e);
            Err(ChatError::Unauthenticated)
        }
    }
}

/// Resolves the bearer token into an [`Actor`] request extension.
///
/// A request without a token passes through anonymously; each operation
/// decides whether it needs a caller. A token that does not verify is
/// rejected here.
pub async fn auth_middleware(mut req: Request, next: axum::middleware::Next) -> Response {
    let auth_header = req.headers().get(AUTHORIZATION).and_then(|h| h.to_str().ok());

    let Some(token) = extract_token(auth_header) else {
        return next.run(req).await;
    };

    let Some(state) = req.extensions().get::<ApiState>() else {
        tracing::error!("API state missing from request extensions");
        return ApiError(ChatError::Internal(anyhow::anyhow!("missing api state"))).into_response();
    };

    match verify_token(&token, &state.jwt_secret) {
        Ok(actor) => {
            tracing::debug!("Authenticated user: {}", actor.user_id);
            req.extensions_mut().insert(actor);
            next.run(req).await
        }
        Err(e) => ApiError(e).into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret";

    #[test]
    fn bearer_prefix_is_required() {
        assert_eq!(extract_token(Some("Bearer abc")), Some("abc".to_string()));
        assert_eq!(extract_token(Some("Basic abc")), None);
        assert_eq!(extract_token(Some("Bearer   ")), None);
        assert_eq!(extract_token(None), None);
    }

    #[test]
    fn token_carries_user_and_role() {
        let token = generate_token(&Actor::admin("root"), SECRET, 3600).unwrap();
        let actor = verify_token(&token, SECRET).unwrap();
        assert_eq!(actor, Actor::admin("root"));
    }

    #[test]
    fn wrong_secret_is_unauthenticated() {
        let token = generate_token(&Actor::user("alice"), SECRET, 3600).unwrap();
        assert!(matches!(verify_token(&token, "other"), Err(ChatError::Unauthenticated)));
        assert!(matches!(verify_token("not-a-jwt", SECRET), Err(ChatError::Unauthenticated)));
    }
}

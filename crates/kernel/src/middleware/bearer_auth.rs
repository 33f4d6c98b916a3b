//! Bearer token authentication middleware.
//!
//! Checks Authorization: Bearer <token> headers, verifies the HS256 JWT
//! issued by the external auth service, and sets the caller context.

use axum::{
    body::Body,
    extract::{FromRequestParts, State},
    http::{Request, StatusCode, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::state::AppState;

/// Claims carried by an access token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject (user id in the auth service).
    pub sub: String,
    /// Role code.
    pub role: String,
    /// Expiry (Unix seconds).
    pub exp: u64,
}

/// Verifies access tokens against the shared secret.
#[derive(Clone)]
pub struct TokenVerifier {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl TokenVerifier {
    pub fn new(secret: &[u8]) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_aud = false;
        validation.set_required_spec_claims(&["exp", "sub"]);
        Self {
            decoding_key: DecodingKey::from_secret(secret),
            validation,
        }
    }

    /// Decode and validate a token.
    pub fn verify(&self, token: &str) -> jsonwebtoken::errors::Result<TokenClaims> {
        jsonwebtoken::decode::<TokenClaims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
    }
}

/// Who is making the request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Caller {
    pub subject: Option<String>,
    pub role_code: Option<String>,
}

impl Caller {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn is_anonymous(&self) -> bool {
        self.role_code.is_none()
    }
}

impl From<TokenClaims> for Caller {
    fn from(claims: TokenClaims) -> Self {
        Self {
            subject: Some(claims.sub),
            role_code: Some(claims.role),
        }
    }
}

impl<S: Send + Sync> FromRequestParts<S> for Caller {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<Caller>()
            .cloned()
            .unwrap_or_default())
    }
}

/// Middleware to authenticate Bearer JWT tokens.
///
/// If a valid Bearer token is present, sets the caller in request
/// extensions. If no token is present, passes through without modification.
/// If an invalid token is present, returns 401.
pub async fn authenticate_bearer_token(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let auth_header = request
        .headers()
        .get("Authorization")
        .and_then(|v| v.to_str().ok());

    let Some(auth_header) = auth_header else {
        return next.run(request).await;
    };

    let Some(token) = auth_header.strip_prefix("Bearer ") else {
        return next.run(request).await;
    };

    let claims = match state.tokens().verify(token.trim()) {
        Ok(c) => c,
        Err(e) => {
            debug!(error = %e, "invalid bearer token");
            return (
                StatusCode::UNAUTHORIZED,
                [("WWW-Authenticate", "Bearer error=\"invalid_token\"")],
                axum::Json(serde_json::json!({
                    "kind": "Unauthorized",
                    "message": "invalid token",
                })),
            )
                .into_response();
        }
    };

    debug!(sub = %claims.sub, role = %claims.role, "bearer token accepted");
    request.extensions_mut().insert(Caller::from(claims));

    next.run(request).await
}

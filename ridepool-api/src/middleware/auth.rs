use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts},
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use ridepool_core::{Caller, Role};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    pub exp: usize,
}

impl Claims {
    pub fn into_caller(self) -> Caller {
        let role = self.role.as_deref().map(Role::from_claim).unwrap_or_default();
        let caller = Caller::new(self.sub, role);
        match self.name {
            Some(name) if !name.trim().is_empty() => caller.with_name(name),
            _ => caller,
        }
    }
}

pub fn issue_token(claims: &Claims, secret: &str) -> Result<String, jsonwebtoken::errors::Error> {
    encode(&Header::default(), claims, &EncodingKey::from_secret(secret.as_bytes()))
}

fn bearer_token(req: &Request) -> Option<&str> {
    req.headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
}

/// Resolves the bearer token into a `Caller` extension. Requests without a
/// valid token pass through anonymous; protected handlers reject them.
pub async fn identity_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Response {
    if let Some(token) = bearer_token(&req) {
        match decode::<Claims>(
            token,
            &DecodingKey::from_secret(state.auth.secret.as_bytes()),
            &Validation::default(),
        ) {
            Ok(data) => {
                let caller = data.claims.into_caller();
                req.extensions_mut().insert(caller);
            }
            Err(e) => tracing::debug!("Rejected bearer token: {}", e),
        }
    }

    next.run(req).await
}

/// Extractor for handlers that need a signed-in caller.
pub struct Authenticated(pub Caller);

impl<S> FromRequestParts<S> for Authenticated
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let caller = Caller::require(parts.extensions.get::<Caller>().cloned())?;
        Ok(Authenticated(caller))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claims_map_to_caller() {
        let claims = Claims {
            sub: "u1".to_string(),
            name: Some("Ana".to_string()),
            role: Some("driver".to_string()),
            exp: 0,
        };
        let caller = claims.into_caller();
        assert_eq!(caller.uid, "u1");
        assert_eq!(caller.role, Role::Driver);
        assert_eq!(caller.display_name.as_deref(), Some("Ana"));

        let bare = Claims {
            sub: "u2".to_string(),
            name: Some("  ".to_string()),
            role: None,
            exp: 0,
        };
        let caller = bare.into_caller();
        assert_eq!(caller.role, Role::Traveler);
        assert!(caller.display_name.is_none());
    }

    #[test]
    fn test_issued_token_decodes() {
        let claims = Claims {
            sub: "u1".to_string(),
            name: None,
            role: Some("admin".to_string()),
            exp: 4_102_444_800,
        };
        let token = issue_token(&claims, "secret").unwrap();
        let decoded = decode::<Claims>(
            &token,
            &DecodingKey::from_secret(b"secret"),
            &Validation::default(),
        )
        .unwrap();
        assert_eq!(decoded.claims.sub, "u1");
        assert!(decode::<Claims>(&token, &DecodingKey::from_secret(b"other"), &Validation::default()).is_err());
    }
}

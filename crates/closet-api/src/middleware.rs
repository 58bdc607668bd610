use std::str::FromStr;

use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use axum_extra::headers::{Authorization, HeaderMapExt, authorization::Bearer};
use jsonwebtoken::{DecodingKey, Validation, decode};
use uuid::Uuid;

use closet_types::api::Claims;

use crate::AppState;
use crate::error::ApiError;

/// Legacy identity header sent by the web client.
pub const USER_ID_HEADER: &str = "x-user-id";

/// The acting user, inserted as a request extension on protected routes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Identity {
    pub user_id: Uuid,
}

/// Turns request headers into an acting identity. Only establishes *who*
/// is calling; ownership checks happen in the handlers.
pub trait IdentityResolver: Send + Sync {
    fn resolve(&self, headers: &HeaderMap) -> Result<Identity, ApiError>;
}

/// `Authorization: Bearer <jwt>` as issued by signup/login.
pub struct BearerIdentity {
    key: DecodingKey,
}

impl BearerIdentity {
    pub fn new(secret: &str) -> Self {
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
        }
    }
}

impl IdentityResolver for BearerIdentity {
    fn resolve(&self, headers: &HeaderMap) -> Result<Identity, ApiError> {
        let bearer = headers
            .typed_get::<Authorization<Bearer>>()
            .ok_or_else(|| ApiError::Unauthorized("missing bearer token".into()))?;

        let token_data = decode::<Claims>(bearer.token(), &self.key, &Validation::default())
            .map_err(|_| ApiError::Unauthorized("invalid or expired token".into()))?;

        Ok(Identity {
            user_id: token_data.claims.sub,
        })
    }
}

/// `X-USER-ID: <uuid>`, trusted as-is. A stand-in for real session auth,
/// only enabled by configuration.
pub struct HeaderIdentity;

impl IdentityResolver for HeaderIdentity {
    fn resolve(&self, headers: &HeaderMap) -> Result<Identity, ApiError> {
        let user_id = headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<Uuid>().ok())
            .ok_or_else(|| ApiError::Unauthorized("missing or invalid X-USER-ID header".into()))?;

        Ok(Identity { user_id })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IdentityMode {
    #[default]
    Bearer,
    Header,
}

impl FromStr for IdentityMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bearer" | "jwt" => Ok(Self::Bearer),
            "header" => Ok(Self::Header),
            other => Err(anyhow::anyhow!("unknown identity mode '{}'", other)),
        }
    }
}

impl IdentityMode {
    pub fn resolver(self, jwt_secret: &str) -> Box<dyn IdentityResolver> {
        match self {
            Self::Bearer => Box::new(BearerIdentity::new(jwt_secret)),
            Self::Header => Box::new(HeaderIdentity),
        }
    }
}

/// Resolve the caller and store the [`Identity`] for the handler.
pub async fn require_identity(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let identity = state.identity.resolve(req.headers())?;
    req.extensions_mut().insert(identity);
    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn header_identity_parses_uuid() {
        let id = Uuid::new_v4();
        let mut headers = HeaderMap::new();
        headers.insert(USER_ID_HEADER, HeaderValue::from_str(&id.to_string()).unwrap());
        assert_eq!(HeaderIdentity.resolve(&headers).unwrap().user_id, id);

        headers.insert(USER_ID_HEADER, HeaderValue::from_static("1"));
        assert!(matches!(
            HeaderIdentity.resolve(&headers),
            Err(ApiError::Unauthorized(_))
        ));
    }

    #[test]
    fn bearer_identity_rejects_foreign_tokens() {
        let id = Uuid::new_v4();
        let token = crate::auth::create_token("secret-a", id, "a@kyonggi.ac.kr").unwrap();

        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", token)).unwrap(),
        );

        let ok = BearerIdentity::new("secret-a").resolve(&headers).unwrap();
        assert_eq!(ok.user_id, id);
        assert!(BearerIdentity::new("secret-b").resolve(&headers).is_err());
        assert!(BearerIdentity::new("secret-a").resolve(&HeaderMap::new()).is_err());
    }

    #[test]
    fn identity_mode_parsing() {
        assert_eq!("bearer".parse::<IdentityMode>().unwrap(), IdentityMode::Bearer);
        assert_eq!("JWT".parse::<IdentityMode>().unwrap(), IdentityMode::Bearer);
        assert_eq!("header".parse::<IdentityMode>().unwrap(), IdentityMode::Header);
        assert!("cookie".parse::<IdentityMode>().is_err());
    }
}

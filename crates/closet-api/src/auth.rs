use std::sync::OnceLock;

use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use jsonwebtoken::{EncodingKey, Header, encode};
use tracing::info;
use uuid::Uuid;

use closet_db::models::UserRow;
use closet_types::api::{AuthResponse, Claims, LoginRequest, SignupRequest, UserResponse};

use crate::common::{parse_uuid, require};
use crate::error::ApiError;
use crate::{AppState, run_blocking};

const TOKEN_LIFETIME_DAYS: i64 = 30;

const BAD_CREDENTIALS: &str = "invalid email or password";

pub async fn signup(
    State(state): State<AppState>,
    Json(req): Json<SignupRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let email = require(req.email, "email")?.trim().to_lowercase();
    let password = require(req.password, "password")?;
    let nickname = require(req.nickname, "nickname")?.trim().to_string();

    if !email_in_domain(&email, &state.email_domain) {
        return Err(ApiError::validation(format!(
            "email must be a @{} address",
            state.email_domain
        )));
    }

    let user = run_blocking(&state, move |s| {
        let password_hash = hash_password(&password)?;
        let user_id = Uuid::new_v4().to_string();

        s.db.create_user(&user_id, &email, &password_hash, &nickname)?
            .ok_or_else(|| ApiError::Conflict("email already registered".into()))
    })
    .await?;

    info!("New account {} ({})", user.id, user.email);

    let token = create_token(&state.jwt_secret, parse_uuid(&user.id, "user id"), &user.email)?;

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            user: user_response(user),
            token,
        }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    let email = require(req.email, "email")?.trim().to_lowercase();
    let password = require(req.password, "password")?;

    let user = run_blocking(&state, move |s| {
        let Some(user) = s.db.get_user_by_email(&email)? else {
            // Same work as a real check so response time does not reveal
            // whether the account exists.
            let _ = verify_password(&password, dummy_hash());
            return Err(ApiError::Unauthorized(BAD_CREDENTIALS.into()));
        };

        if !verify_password(&password, &user.password) {
            return Err(ApiError::Unauthorized(BAD_CREDENTIALS.into()));
        }
        Ok(user)
    })
    .await?;

    let token = create_token(&state.jwt_secret, parse_uuid(&user.id, "user id"), &user.email)?;

    Ok(Json(AuthResponse {
        user: user_response(user),
        token,
    }))
}

/// Sign a bearer token for `user_id`.
pub fn create_token(secret: &str, user_id: Uuid, email: &str) -> anyhow::Result<String> {
    let claims = Claims {
        sub: user_id,
        email: email.to_string(),
        exp: (chrono::Utc::now() + chrono::Duration::days(TOKEN_LIFETIME_DAYS)).timestamp()
            as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}

pub(crate) fn user_response(user: UserRow) -> UserResponse {
    UserResponse {
        id: parse_uuid(&user.id, "user id"),
        email: user.email,
        nickname: user.nickname,
        profile_image_url: user.profile_image_url,
    }
}

/// `local@domain` with a non-empty local part. `email` is already
/// lower-cased.
fn email_in_domain(email: &str, domain: &str) -> bool {
    match email.rsplit_once('@') {
        Some((local, host)) => !local.is_empty() && host == domain,
        None => false,
    }
}

fn hash_password(password: &str) -> Result<String, ApiError> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("password hashing failed: {}", e)))?
        .to_string();
    Ok(hash)
}

/// False for a wrong password and for a stored hash that does not parse.
fn verify_password(password: &str, stored: &str) -> bool {
    PasswordHash::new(stored)
        .map(|parsed| {
            Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok()
        })
        .unwrap_or(false)
}

fn dummy_hash() -> &'static str {
    static DUMMY: OnceLock<String> = OnceLock::new();
    DUMMY.get_or_init(|| {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(b"closet-dummy-password", &salt)
            .map(|h| h.to_string())
            .unwrap_or_default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_domain_check() {
        assert!(email_in_domain("kim@kyonggi.ac.kr", "kyonggi.ac.kr"));
        assert!(!email_in_domain("@kyonggi.ac.kr", "kyonggi.ac.kr"));
        assert!(!email_in_domain("kim@gmail.com", "kyonggi.ac.kr"));
        assert!(!email_in_domain("kim@evil-kyonggi.ac.kr", "kyonggi.ac.kr"));
        assert!(!email_in_domain("kyonggi.ac.kr", "kyonggi.ac.kr"));
    }

    #[test]
    fn password_hash_round_trip() {
        let hash = hash_password("hunter22").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password("hunter22", &hash));
        assert!(!verify_password("hunter23", &hash));
        assert!(!verify_password("hunter22", "not-a-phc-string"));
    }

    #[test]
    fn dummy_hash_is_a_real_hash() {
        assert!(dummy_hash().starts_with("$argon2id$"));
        assert!(!verify_password("anything", dummy_hash()));
    }
}

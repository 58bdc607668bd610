pub mod auth;
pub mod community;
pub mod error;
pub mod files;
pub mod messages;
pub mod middleware;
pub mod posts;
pub mod recommend;
pub mod storage;
pub mod users;

mod common;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json, Router,
    extract::DefaultBodyLimit,
    routing::{delete, get, patch, post, put},
};
use tracing::error;

use closet_db::Database;

use crate::error::{ApiError, normalize_errors};
use crate::middleware::{IdentityMode, IdentityResolver, require_identity};
use crate::recommend::Recommender;
use crate::storage::FileStore;

pub type AppState = Arc<AppStateInner>;

/// Runtime knobs the request layer needs. Built by the server binary from
/// its environment.
#[derive(Debug, Clone)]
pub struct Settings {
    pub jwt_secret: String,
    pub identity: IdentityMode,
    /// Institutional e-mail domain accepted at signup, without the `@`.
    pub email_domain: String,
    pub upload_dir: PathBuf,
    /// Base used to build file URLs, e.g. `http://localhost:8080`.
    pub public_url: String,
    /// Per-file upload limit.
    pub max_upload_bytes: usize,
    pub recommend_url: String,
    pub recommend_timeout: Duration,
}

pub struct AppStateInner {
    pub db: Database,
    pub identity: Box<dyn IdentityResolver>,
    pub jwt_secret: String,
    pub email_domain: String,
    pub files: FileStore,
    pub recommender: Recommender,
}

impl AppStateInner {
    pub async fn new(db: Database, settings: Settings) -> anyhow::Result<AppState> {
        let files = FileStore::new(
            settings.upload_dir,
            &settings.public_url,
            settings.max_upload_bytes,
        )
        .await?;
        let recommender = Recommender::new(&settings.recommend_url, settings.recommend_timeout)?;

        Ok(Arc::new(Self {
            db,
            identity: settings.identity.resolver(&settings.jwt_secret),
            jwt_secret: settings.jwt_secret,
            email_domain: settings
                .email_domain
                .trim()
                .trim_start_matches('@')
                .to_ascii_lowercase(),
            files,
            recommender,
        }))
    }
}

/// Run blocking store work (SQLite, password hashing) off the async
/// runtime.
pub(crate) async fn run_blocking<F, T>(state: &AppState, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&AppStateInner) -> Result<T, ApiError> + Send + 'static,
    T: Send + 'static,
{
    let state = state.clone();
    tokio::task::spawn_blocking(move || f(&state))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::Internal(anyhow::anyhow!("blocking task failed"))
        })?
}

/// Every route of the service. CORS and access logging are left to the
/// binary.
pub fn router(state: AppState) -> Router {
    // Room for several images per multipart request
    let body_limit = state.files.max_size().saturating_mul(8);

    let public_routes = Router::new()
        .route("/health", get(health))
        .route("/auth/signup", post(auth::signup))
        .route("/auth/login", post(auth::login))
        .route("/users/{id}", get(users::get_user))
        .route("/posts", get(posts::list_posts))
        .route("/posts/{id}", get(posts::get_post))
        .route("/posts/{id}/comments", get(posts::list_comments))
        .route("/community/posts", get(community::list_posts))
        .route("/community/posts/{id}", get(community::get_post))
        .route("/community/posts/{id}/comments", get(community::list_comments))
        .route("/files/{name}", get(files::download_file))
        .route("/ai/recommend", post(recommend::recommend));

    let protected_routes = Router::new()
        .route("/users/me", get(users::me).put(users::update_me).patch(users::update_me))
        .route("/posts", post(posts::create_post))
        .route(
            "/posts/{id}",
            put(posts::update_post)
                .patch(posts::update_post)
                .delete(posts::delete_post),
        )
        .route("/posts/{id}/comments", post(posts::create_comment))
        .route("/posts/comments/{id}", delete(posts::delete_comment))
        .route("/community/posts", post(community::create_post))
        .route(
            "/community/posts/{id}",
            patch(community::update_post).delete(community::delete_post),
        )
        .route("/community/posts/{id}/like", post(community::like_post))
        .route("/community/posts/{id}/comments", post(community::create_comment))
        .route("/community/comments/{id}", delete(community::delete_comment))
        .route("/messages", post(messages::send_message))
        .route("/messages/inbox", get(messages::inbox))
        .route("/messages/sent", get(messages::sent))
        .route("/messages/unread-count", get(messages::unread_count))
        .route("/messages/conversation", get(messages::conversation))
        .route(
            "/messages/{id}",
            get(messages::read_message).delete(messages::delete_message),
        )
        .route("/files/images", post(files::upload_images))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            require_identity,
        ));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(axum::middleware::from_fn(normalize_errors))
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

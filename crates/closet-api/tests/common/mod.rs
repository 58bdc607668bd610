#![allow(dead_code)]

use std::path::PathBuf;
use std::time::Duration;

use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode},
    response::Response,
};
use serde_json::{Value, json};
use tempfile::TempDir;
use tower::ServiceExt;
use uuid::Uuid;

use closet_api::middleware::{IdentityMode, USER_ID_HEADER};
use closet_api::{AppStateInner, Settings, router};
use closet_db::Database;

pub const DOMAIN: &str = "kyonggi.ac.kr";
pub const PASSWORD: &str = "correct horse";

/// A signed-up user, usable as the acting identity in either mode.
#[derive(Debug, Clone)]
pub struct Actor {
    pub id: Uuid,
    pub token: String,
}

pub struct TestApp {
    pub router: Router,
    pub mode: IdentityMode,
    pub upload_dir: PathBuf,
    _dir: TempDir,
}

impl TestApp {
    pub async fn new(mode: IdentityMode) -> Self {
        // Nothing listens on the discard port; recommendation calls fail fast.
        Self::with_recommender(mode, "http://127.0.0.1:9").await
    }

    pub async fn with_recommender(mode: IdentityMode, recommend_url: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(&dir.path().join("closet.db")).unwrap();
        let upload_dir = dir.path().join("uploads");
        let settings = Settings {
            jwt_secret: "test-secret".into(),
            identity: mode,
            email_domain: DOMAIN.into(),
            upload_dir: upload_dir.clone(),
            public_url: "http://localhost:8080".into(),
            max_upload_bytes: 1024,
            recommend_url: recommend_url.into(),
            recommend_timeout: Duration::from_secs(2),
        };
        let state = AppStateInner::new(db, settings).await.unwrap();

        Self {
            router: router(state),
            mode,
            upload_dir,
            _dir: dir,
        }
    }

    pub async fn send(&self, req: Request<Body>) -> Response {
        self.router.clone().oneshot(req).await.unwrap()
    }

    pub async fn call(
        &self,
        method: Method,
        uri: &str,
        actor: Option<&Actor>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(actor) = actor {
            builder = self.authorize(builder, actor);
        }
        if body.is_some() {
            builder = builder.header("content-type", "application/json");
        }
        let body = match body {
            Some(v) => Body::from(serde_json::to_string(&v).unwrap()),
            None => Body::empty(),
        };

        let resp = self.send(builder.body(body).unwrap()).await;
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), 1024 * 1024)
            .await
            .unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, json)
    }

    pub fn authorize(
        &self,
        builder: axum::http::request::Builder,
        actor: &Actor,
    ) -> axum::http::request::Builder {
        match self.mode {
            IdentityMode::Bearer => {
                builder.header("authorization", format!("Bearer {}", actor.token))
            }
            IdentityMode::Header => builder.header(USER_ID_HEADER, actor.id.to_string()),
        }
    }

    pub async fn signup(&self, nickname: &str) -> Actor {
        let (status, body) = self
            .call(
                Method::POST,
                "/auth/signup",
                None,
                Some(json!({
                    "email": format!("{}@{}", nickname, DOMAIN),
                    "password": PASSWORD,
                    "nickname": nickname,
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "signup failed: {}", body);

        Actor {
            id: body["user"]["id"].as_str().unwrap().parse().unwrap(),
            token: body["token"].as_str().unwrap().to_string(),
        }
    }

    pub async fn create_post(&self, actor: &Actor, title: &str) -> Value {
        let (status, body) = self
            .call(
                Method::POST,
                "/posts",
                Some(actor),
                Some(json!({ "title": title, "content": "barely worn" })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "create post failed: {}", body);
        body
    }

    pub async fn create_community_post(&self, actor: &Actor, title: &str) -> Value {
        let (status, body) = self
            .call(
                Method::POST,
                "/community/posts",
                Some(actor),
                Some(json!({ "title": title, "content": "hello board" })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "create community post failed: {}", body);
        body
    }
}

pub fn id_of(body: &Value) -> String {
    body["id"].as_str().unwrap().to_string()
}

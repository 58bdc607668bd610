//! Proxy to the external image-similarity service.
//!
//! The service takes an image URL and answers with the ids of the most
//! similar marketplace posts. It is optional: any failure to reach it or
//! understand it degrades to an empty recommendation list.

use std::collections::HashMap;
use std::time::Duration;

use axum::{Json, extract::State};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use closet_types::api::{PostSummary, RecommendRequest};

use crate::common::require;
use crate::error::ApiError;
use crate::posts::post_summary;
use crate::{AppState, run_blocking};

const DEFAULT_TOP_N: i64 = 5;
const MAX_TOP_N: i64 = 50;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UpstreamRequest<'a> {
    image_url: &'a str,
    top_n: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpstreamResponse {
    #[serde(default)]
    similar_ids: Option<Vec<Value>>,
}

#[derive(Debug, thiserror::Error)]
pub enum RecommendError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid response from recommender: {0}")]
    InvalidResponse(String),
}

/// HTTP client for the similarity service.
#[derive(Debug)]
pub struct Recommender {
    client: Client,
    base_url: String,
}

impl Recommender {
    pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Post ids most similar to `image_url`, best match first.
    pub async fn similar_ids(
        &self,
        image_url: &str,
        top_n: i64,
    ) -> Result<Vec<String>, RecommendError> {
        let url = format!("{}/recommend", self.base_url);
        let body: UpstreamResponse = self
            .client
            .post(&url)
            .json(&UpstreamRequest { image_url, top_n })
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        body.similar_ids
            .unwrap_or_default()
            .into_iter()
            .map(|id| match id {
                Value::String(s) => Ok(s),
                Value::Number(n) => Ok(n.to_string()),
                other => Err(RecommendError::InvalidResponse(format!(
                    "unexpected id {}",
                    other
                ))),
            })
            .collect()
    }
}

/// POST /ai/recommend: similar marketplace posts for an image, in the
/// upstream's rank order. Unknown ids are skipped.
pub async fn recommend(
    State(state): State<AppState>,
    Json(req): Json<RecommendRequest>,
) -> Result<Json<Vec<PostSummary>>, ApiError> {
    let image_url = require(req.image_url, "imageUrl")?;
    let top_n = effective_top_n(req.top_n);

    let mut ids = match state.recommender.similar_ids(image_url.trim(), top_n).await {
        Ok(ids) => ids,
        Err(e) => {
            warn!("Recommendation service unavailable: {}", e);
            return Ok(Json(vec![]));
        }
    };
    // The upstream may ignore topN; never look up more ids than were asked for.
    if ids.len() > top_n as usize {
        debug!("Recommendation service returned {} ids, keeping {}", ids.len(), top_n);
        ids.truncate(top_n as usize);
    }
    if ids.is_empty() {
        debug!("Recommendation service returned no matches");
        return Ok(Json(vec![]));
    }

    let rank: HashMap<String, usize> = ids
        .iter()
        .enumerate()
        .map(|(i, id)| (id.clone(), i))
        .collect();

    let mut rows = run_blocking(&state, move |s| Ok(s.db.get_posts_by_ids(&ids)?)).await?;
    rows.sort_by_key(|row| rank.get(&row.id).copied().unwrap_or(usize::MAX));

    Ok(Json(rows.into_iter().map(post_summary).collect()))
}

fn effective_top_n(requested: Option<i64>) -> i64 {
    match requested {
        Some(n) if n > 0 => n.min(MAX_TOP_N),
        _ => DEFAULT_TOP_N,
    }
}

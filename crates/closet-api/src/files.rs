use axum::{
    Extension, Json,
    extract::{Multipart, Path, State, multipart::MultipartError},
    http::{StatusCode, header},
    response::IntoResponse,
};
use tracing::{debug, info, warn};

use closet_types::api::ImageUploadResponse;

use crate::AppState;
use crate::error::ApiError;
use crate::middleware::Identity;
use crate::storage::content_type_for;

/// Form field names accepted for uploaded images.
const FILE_FIELDS: [&str; 2] = ["files", "file"];

/// POST /files/images: multipart upload of one or more images. Returns
/// the public URL of each stored file in upload order. All or nothing:
/// if any part fails, files already stored for this request are removed.
pub async fn upload_images(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    mut multipart: Multipart,
) -> Result<Json<ImageUploadResponse>, ApiError> {
    let mut names = Vec::new();

    if let Err(e) = receive_images(&state, &mut multipart, &mut names).await {
        for name in &names {
            if let Err(cleanup) = state.files.remove(name).await {
                warn!("Failed to remove {} after rejected upload: {}", name, cleanup);
            }
        }
        return Err(e);
    }

    if names.is_empty() {
        return Err(ApiError::validation("at least one non-empty file is required"));
    }

    info!("User {} uploaded {} image(s)", identity.user_id, names.len());

    let urls = names.iter().map(|name| state.files.url_for(name)).collect();
    Ok(Json(ImageUploadResponse { urls }))
}

/// Store each non-empty file part, pushing its name as soon as it is on disk.
async fn receive_images(
    state: &AppState,
    multipart: &mut Multipart,
    names: &mut Vec<String>,
) -> Result<(), ApiError> {
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if !field.name().is_some_and(|n| FILE_FIELDS.contains(&n)) {
            debug!("Skipping multipart field {:?}", field.name());
            continue;
        }

        let original_name = field.file_name().map(str::to_string);
        let data = field.bytes().await.map_err(multipart_error)?;
        if data.is_empty() {
            continue;
        }

        names.push(state.files.store(&data, original_name.as_deref()).await?);
    }
    Ok(())
}

/// GET /files/{name}: serve a stored file inline.
pub async fn download_file(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let data = state.files.retrieve(&name).await?;

    Ok((
        [
            (header::CONTENT_TYPE, content_type_for(&name)),
            (header::CONTENT_DISPOSITION, "inline"),
        ],
        data,
    ))
}

fn multipart_error(e: MultipartError) -> ApiError {
    match e.status() {
        StatusCode::PAYLOAD_TOO_LARGE => ApiError::PayloadTooLarge(e.body_text()),
        _ => ApiError::validation(e.body_text()),
    }
}

//! Photo endpoints for petitions and user profiles.
//!
//! Uploads are raw bodies whose `Content-Type` names the image format. A
//! replacement is written and referenced before the previous blob is removed,
//! so a row never points at a missing file.

use axum::{
    Extension,
    extract::State,
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use tracing::{info, warn};

use petition_types::models::ImageType;

use crate::error::{ApiError, ApiResult};
use crate::extract::ResourceId;
use crate::middleware::AuthenticatedUser;
use crate::petitions::load_petition;
use crate::state::AppState;

fn image_type_of(headers: &HeaderMap) -> ApiResult<ImageType> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    ImageType::from_mime(content_type).ok_or_else(|| {
        ApiError::bad_request(format!(
            "photo must be image/jpeg, image/png, image/gif type, but it was: {}",
            content_type
        ))
    })
}

fn check_upload(headers: &HeaderMap, body: &Bytes) -> ApiResult<ImageType> {
    let image_type = image_type_of(headers)?;
    if body.is_empty() {
        return Err(ApiError::bad_request("empty image"));
    }
    Ok(image_type)
}

async fn photo_response(state: &AppState, filename: Option<String>) -> ApiResult<Response> {
    let filename = filename.ok_or(ApiError::NotFound)?;
    let (bytes, image_type) = state
        .photos
        .retrieve(&filename)
        .await?
        .ok_or(ApiError::NotFound)?;

    Ok(([(header::CONTENT_TYPE, image_type.mime())], bytes).into_response())
}

/// Removes a replaced blob. The row no longer references it, so a failure
/// here only leaves an orphan for the sweep.
async fn discard_previous(state: &AppState, previous: Option<&str>) {
    if let Some(previous) = previous {
        if let Err(e) = state.photos.delete(previous).await {
            warn!("Failed to delete replaced photo {}: {}", previous, e);
        }
    }
}

fn created_or_replaced(previous: &Option<String>) -> StatusCode {
    if previous.is_some() {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    }
}

// -- Petition photos --

pub async fn get_petition_photo(
    State(state): State<AppState>,
    ResourceId(petition_id): ResourceId,
) -> ApiResult<Response> {
    let filename = state
        .run_db(move |db| Ok(db.get_petition_photo_filename(petition_id)))
        .await?;
    photo_response(&state, filename).await
}

pub async fn set_petition_photo(
    State(state): State<AppState>,
    ResourceId(petition_id): ResourceId,
    Extension(AuthenticatedUser(caller)): Extension<AuthenticatedUser>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<StatusCode> {
    let petition = load_petition(&state, petition_id).await?;
    if petition.author_id != caller {
        return Err(ApiError::Forbidden);
    }
    let image_type = check_upload(&headers, &body)?;

    let previous = state
        .run_db(move |db| Ok(db.get_petition_photo_filename(petition_id)))
        .await?;

    let filename = state.photos.store(&body, image_type).await?;
    let stored = filename.clone();
    state
        .run_db(move |db| db.set_petition_photo_filename(petition_id, &stored))
        .await?;
    discard_previous(&state, previous.as_deref()).await;

    info!("Petition {} photo set to {}", petition_id, filename);
    Ok(created_or_replaced(&previous))
}

// -- User photos --

async fn user_exists(state: &AppState, user_id: i64) -> ApiResult<()> {
    state
        .run_db(move |db| db.get_user_by_id(user_id))
        .await?
        .map(|_| ())
        .ok_or(ApiError::NotFound)
}

pub async fn get_user_photo(
    State(state): State<AppState>,
    ResourceId(user_id): ResourceId,
) -> ApiResult<Response> {
    let filename = state
        .run_db(move |db| Ok(db.get_user_photo_filename(user_id)))
        .await?;
    photo_response(&state, filename).await
}

pub async fn set_user_photo(
    State(state): State<AppState>,
    ResourceId(user_id): ResourceId,
    Extension(AuthenticatedUser(caller)): Extension<AuthenticatedUser>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<StatusCode> {
    user_exists(&state, user_id).await?;
    if caller != user_id {
        return Err(ApiError::Forbidden);
    }
    let image_type = check_upload(&headers, &body)?;

    let previous = state
        .run_db(move |db| Ok(db.get_user_photo_filename(user_id)))
        .await?;

    let filename = state.photos.store(&body, image_type).await?;
    let stored = filename.clone();
    state
        .run_db(move |db| db.set_user_photo_filename(user_id, Some(&stored)))
        .await?;
    discard_previous(&state, previous.as_deref()).await;

    info!("User {} photo set to {}", user_id, filename);
    Ok(created_or_replaced(&previous))
}

pub async fn delete_user_photo(
    State(state): State<AppState>,
    ResourceId(user_id): ResourceId,
    Extension(AuthenticatedUser(caller)): Extension<AuthenticatedUser>,
) -> ApiResult<StatusCode> {
    user_exists(&state, user_id).await?;
    if caller != user_id {
        return Err(ApiError::Forbidden);
    }

    let previous = state
        .run_db(move |db| Ok(db.get_user_photo_filename(user_id)))
        .await?
        .ok_or(ApiError::NotFound)?;

    state
        .run_db(move |db| db.set_user_photo_filename(user_id, None))
        .await?;
    discard_previous(&state, Some(&previous)).await;

    info!("User {} photo removed", user_id);
    Ok(StatusCode::OK)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn with_content_type(value: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(value));
        headers
    }

    #[test]
    fn upload_type_comes_from_content_type() {
        let body = Bytes::from_static(b"GIF89a");
        assert_eq!(
            check_upload(&with_content_type("image/gif"), &body).unwrap(),
            ImageType::Gif
        );
    }

    #[test]
    fn unsupported_type_names_what_was_sent() {
        let body = Bytes::from_static(b"hello");
        let err = check_upload(&with_content_type("text/plain"), &body).unwrap_err();
        assert!(matches!(
            err,
            ApiError::BadRequest(ref m)
                if m == "photo must be image/jpeg, image/png, image/gif type, but it was: text/plain"
        ));
    }

    #[test]
    fn empty_upload_is_rejected_after_type_check() {
        let err = check_upload(&with_content_type("image/png"), &Bytes::new()).unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(ref m) if m == "empty image"));
    }
}

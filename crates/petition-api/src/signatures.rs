use axum::{Extension, Json, extract::State, http::StatusCode};
use chrono::Utc;
use tracing::info;

use petition_db::is_unique_violation;
use petition_types::api::SignatureView;
use petition_types::models::is_closed;

use crate::error::{ApiError, ApiResult};
use crate::extract::ResourceId;
use crate::middleware::AuthenticatedUser;
use crate::petitions::load_petition;
use crate::state::AppState;

const SIGNED_TWICE: &str = "cannot sign a petition more than once";
const CLOSED: &str = "cannot sign a petition that has closed";
const NOT_SIGNED: &str = "cannot remove signature from a petition without first signing it";

pub async fn view(
    State(state): State<AppState>,
    ResourceId(petition_id): ResourceId,
) -> ApiResult<Json<Vec<SignatureView>>> {
    load_petition(&state, petition_id).await?;

    let signatures = state
        .run_db(move |db| db.get_signatures(petition_id))
        .await?;
    Ok(Json(signatures))
}

pub async fn add(
    State(state): State<AppState>,
    ResourceId(petition_id): ResourceId,
    Extension(AuthenticatedUser(signatory_id)): Extension<AuthenticatedUser>,
) -> ApiResult<StatusCode> {
    let petition = load_petition(&state, petition_id).await?;
    if petition.author_id == signatory_id {
        return Err(ApiError::ForbiddenBecause("cannot sign a petition you created"));
    }

    let already_signed = state
        .run_db(move |db| db.has_signed(petition_id, signatory_id))
        .await?;
    if already_signed {
        return Err(ApiError::ForbiddenBecause(SIGNED_TWICE));
    }

    let now = Utc::now();
    if is_closed(petition.closing_date, now) {
        return Err(ApiError::ForbiddenBecause(CLOSED));
    }

    // A concurrent sign by the same user loses on the primary key.
    match state
        .run_db(move |db| db.add_signature(petition_id, signatory_id, now))
        .await
    {
        Ok(()) => {
            info!("User {} signed petition {}", signatory_id, petition_id);
            Ok(StatusCode::CREATED)
        }
        Err(e) if is_unique_violation(&e) => Err(ApiError::ForbiddenBecause(SIGNED_TWICE)),
        Err(e) => Err(e.into()),
    }
}

pub async fn remove(
    State(state): State<AppState>,
    ResourceId(petition_id): ResourceId,
    Extension(AuthenticatedUser(signatory_id)): Extension<AuthenticatedUser>,
) -> ApiResult<StatusCode> {
    let petition = load_petition(&state, petition_id).await?;
    if petition.author_id == signatory_id {
        return Err(ApiError::ForbiddenBecause(
            "cannot remove signature from a petition you created",
        ));
    }

    let signed = state
        .run_db(move |db| db.has_signed(petition_id, signatory_id))
        .await?;
    if !signed {
        return Err(ApiError::ForbiddenBecause(NOT_SIGNED));
    }

    if is_closed(petition.closing_date, Utc::now()) {
        return Err(ApiError::ForbiddenBecause(CLOSED));
    }

    let removed = state
        .run_db(move |db| db.remove_signature(petition_id, signatory_id))
        .await?;
    if removed != 1 {
        return Err(ApiError::ForbiddenBecause(NOT_SIGNED));
    }

    info!("User {} removed signature from petition {}", signatory_id, petition_id);
    Ok(StatusCode::OK)
}

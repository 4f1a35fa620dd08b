use std::collections::HashMap;

use axum::{
    Extension, Json,
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use bytes::Bytes;
use chrono::Utc;
use tracing::info;

use petition_db::models::{NewPetition, PetitionChanges, PetitionRow};
use petition_types::api::{
    CreatePetitionRequest, CreatePetitionResponse, PatchPetitionRequest, PetitionDetail,
    PetitionSummary, SearchQuery,
};
use petition_types::models::{Category, is_closed};
use petition_types::schema::{self, unstringify};

use crate::error::{ApiError, ApiResult};
use crate::extract::{ResourceId, validated_body, validated_value};
use crate::middleware::AuthenticatedUser;
use crate::state::AppState;

const CLOSING_DATE_IN_PAST: &str = "closingDate must be in the future";
const UNKNOWN_CATEGORY: &str = "categoryId does not match any existing category";

/// Loads a petition or answers 404.
pub(crate) async fn load_petition(state: &AppState, petition_id: i64) -> ApiResult<PetitionRow> {
    state
        .run_db(move |db| db.get_petition(petition_id))
        .await?
        .ok_or(ApiError::NotFound)
}

async fn category_exists(state: &AppState, category_id: i64) -> ApiResult<bool> {
    Ok(state
        .run_db(move |db| db.category_exists(category_id))
        .await?)
}

fn to_detail(row: PetitionRow) -> PetitionDetail {
    PetitionDetail {
        petition_id: row.petition_id,
        title: row.title,
        category: row.category,
        author_name: row.author_name,
        author_id: row.author_id,
        author_city: row.author_city,
        author_country: row.author_country,
        signature_count: row.signature_count,
        description: row.description,
        created_date: row.created_date,
        closing_date: row.closing_date,
    }
}

pub async fn search(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> ApiResult<Json<Vec<PetitionSummary>>> {
    let value = unstringify(&params, &["q"]);
    let query: SearchQuery = validated_value(&value, schema::PETITION_SEARCH, false)?;

    // 0 is never a category; it skips the check and filters to nothing
    if let Some(category_id) = query.category_id.filter(|&id| id != 0) {
        if !category_exists(&state, category_id).await? {
            return Err(ApiError::bad_request("invalid category ID"));
        }
    }

    let petitions = state
        .run_db(move |db| db.search_petitions(&query))
        .await?;
    Ok(Json(petitions))
}

pub async fn create(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(author_id)): Extension<AuthenticatedUser>,
    body: Bytes,
) -> ApiResult<impl IntoResponse> {
    let req: CreatePetitionRequest = validated_body(&body, schema::POST_PETITION, false)?;

    let now = Utc::now();
    if is_closed(req.closing_date, now) {
        return Err(ApiError::bad_request(CLOSING_DATE_IN_PAST));
    }
    if !category_exists(&state, req.category_id).await? {
        return Err(ApiError::bad_request(UNKNOWN_CATEGORY));
    }

    let petition_id = state
        .run_db(move |db| {
            db.create_petition(&NewPetition {
                title: &req.title,
                description: &req.description,
                author_id,
                category_id: req.category_id,
                created_date: now,
                closing_date: req.closing_date,
            })
        })
        .await?;

    info!("User {} created petition {}", author_id, petition_id);
    Ok((StatusCode::CREATED, Json(CreatePetitionResponse { petition_id })))
}

pub async fn view(
    State(state): State<AppState>,
    ResourceId(petition_id): ResourceId,
) -> ApiResult<Json<PetitionDetail>> {
    let row = load_petition(&state, petition_id).await?;
    Ok(Json(to_detail(row)))
}

pub async fn modify(
    State(state): State<AppState>,
    ResourceId(petition_id): ResourceId,
    Extension(AuthenticatedUser(caller)): Extension<AuthenticatedUser>,
    body: Bytes,
) -> ApiResult<StatusCode> {
    let checked = validated_body::<PatchPetitionRequest>(&body, schema::PATCH_PETITION, true);

    let petition = load_petition(&state, petition_id).await?;
    if petition.author_id != caller {
        return Err(ApiError::Forbidden);
    }

    let req = checked?;
    if let Some(category_id) = req.category_id {
        if !category_exists(&state, category_id).await? {
            return Err(ApiError::bad_request(UNKNOWN_CATEGORY));
        }
    }

    let now = Utc::now();
    if is_closed(petition.closing_date, now) {
        return Err(ApiError::bad_request("cannot edit a petition that has closed"));
    }
    if is_closed(req.closing_date, now) {
        return Err(ApiError::bad_request(CLOSING_DATE_IN_PAST));
    }

    let changes = PetitionChanges {
        title: req.title,
        description: req.description,
        category_id: req.category_id,
        closing_date: req.closing_date,
    };
    state
        .run_db(move |db| db.update_petition(petition_id, &changes))
        .await?;

    info!("User {} modified petition {}", caller, petition_id);
    Ok(StatusCode::OK)
}

/// The row goes first (in one transaction with its signatures); the blob is
/// removed afterwards. A blob left behind by a failed removal is unreferenced
/// and gets reclaimed by the photo sweep.
pub async fn delete(
    State(state): State<AppState>,
    ResourceId(petition_id): ResourceId,
    Extension(AuthenticatedUser(caller)): Extension<AuthenticatedUser>,
) -> ApiResult<StatusCode> {
    let petition = load_petition(&state, petition_id).await?;
    if petition.author_id != caller {
        return Err(ApiError::Forbidden);
    }

    let photo = state
        .run_db(move |db| db.delete_petition(petition_id))
        .await?;

    if let Some(filename) = photo {
        state.photos.delete(&filename).await?;
    }

    info!("User {} deleted petition {}", caller, petition_id);
    Ok(StatusCode::OK)
}

pub async fn categories(State(state): State<AppState>) -> ApiResult<Json<Vec<Category>>> {
    let categories = state.run_db(|db| db.get_categories()).await?;
    Ok(Json(categories))
}

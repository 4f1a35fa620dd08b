use axum::{
    Extension, Json,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use bytes::Bytes;
use tracing::info;

use petition_db::is_unique_violation;
use petition_db::models::{NewUser, UserChanges};
use petition_types::api::{
    ChangeUserRequest, LoginRequest, LoginResponse, RegisterRequest, RegisterResponse, UserProfile,
};
use petition_types::schema;

use crate::credentials;
use crate::error::{ApiError, ApiResult};
use crate::extract::{ResourceId, check_email, validated_body};
use crate::middleware::AuthenticatedUser;
use crate::state::AppState;

const EMAIL_IN_USE: &str = "email already in use";

fn invalid_login() -> ApiError {
    ApiError::bad_request("invalid email/password supplied")
}

pub async fn register(
    State(state): State<AppState>,
    body: Bytes,
) -> ApiResult<impl IntoResponse> {
    let req: RegisterRequest = validated_body(&body, schema::REGISTER_USER, false)?;
    check_email(&req.email)?;

    let password_hash = credentials::hash_password(&req.password)?;

    let result = state
        .run_db(move |db| {
            db.create_user(&NewUser {
                name: &req.name,
                email: &req.email,
                password_hash: &password_hash,
                city: req.city.as_deref(),
                country: req.country.as_deref(),
            })
        })
        .await;

    match result {
        Ok(user_id) => {
            info!("Registered user {}", user_id);
            Ok((StatusCode::CREATED, Json(RegisterResponse { user_id })))
        }
        Err(e) if is_unique_violation(&e) => Err(ApiError::bad_request(EMAIL_IN_USE)),
        Err(e) => Err(e.into()),
    }
}

/// Every failure (unknown email or wrong password) gets the same answer.
pub async fn login(
    State(state): State<AppState>,
    body: Bytes,
) -> ApiResult<Json<LoginResponse>> {
    let req: LoginRequest = validated_body(&body, schema::LOGIN, false)?;

    let email = req.email.clone();
    let user = state
        .run_db(move |db| db.get_user_by_email(&email))
        .await?
        .ok_or_else(invalid_login)?;

    if !credentials::verify_password(&req.password, &user.password) {
        return Err(invalid_login());
    }

    let token = credentials::generate_token();
    let user_id = user.user_id;
    let issued = token.clone();
    state
        .run_db(move |db| db.set_auth_token(user_id, Some(&issued)))
        .await?;

    info!("User {} logged in", user_id);
    Ok(Json(LoginResponse { user_id, token }))
}

pub async fn logout(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(user_id)): Extension<AuthenticatedUser>,
) -> ApiResult<StatusCode> {
    state
        .run_db(move |db| db.set_auth_token(user_id, None))
        .await?;

    info!("User {} logged out", user_id);
    Ok(StatusCode::OK)
}

/// Email is only included when the caller is looking at their own profile.
pub async fn view(
    State(state): State<AppState>,
    ResourceId(user_id): ResourceId,
    caller: Option<Extension<AuthenticatedUser>>,
) -> ApiResult<Json<UserProfile>> {
    let is_self = caller.is_some_and(|Extension(AuthenticatedUser(id))| id == user_id);

    let user = state
        .run_db(move |db| db.get_user_by_id(user_id))
        .await?
        .ok_or(ApiError::NotFound)?;

    Ok(Json(UserProfile {
        name: user.name,
        city: user.city,
        country: user.country,
        email: is_self.then_some(user.email),
    }))
}

fn check_change(body: &Bytes) -> ApiResult<ChangeUserRequest> {
    let req: ChangeUserRequest = validated_body(body, schema::CHANGE_USER, false)?;
    if req.has_no_changes() {
        return Err(ApiError::bad_request("you must provide some details to update"));
    }
    if let Some(email) = &req.email {
        check_email(email)?;
    }
    Ok(req)
}

/// Existence and ownership are reported before anything wrong with the body.
pub async fn change(
    State(state): State<AppState>,
    ResourceId(user_id): ResourceId,
    Extension(AuthenticatedUser(caller)): Extension<AuthenticatedUser>,
    body: Bytes,
) -> ApiResult<StatusCode> {
    let checked = check_change(&body);

    let user = state
        .run_db(move |db| db.get_user_by_id(user_id))
        .await?
        .ok_or(ApiError::NotFound)?;

    if caller != user_id {
        return Err(ApiError::Forbidden);
    }

    let req = checked?;

    let password_hash = match &req.password {
        Some(password) => {
            let current_matches = req
                .current_password
                .as_deref()
                .is_some_and(|current| {
                    !current.is_empty() && credentials::verify_password(current, &user.password)
                });
            if !current_matches {
                return Err(ApiError::bad_request("incorrect password"));
            }
            Some(credentials::hash_password(password)?)
        }
        None => None,
    };

    let changes = UserChanges {
        name: req.name,
        email: req.email,
        password_hash,
        city: req.city,
        country: req.country,
    };

    match state.run_db(move |db| db.update_user(user_id, &changes)).await {
        Ok(()) => {
            info!("Updated user {}", user_id);
            Ok(StatusCode::OK)
        }
        Err(e) if is_unique_violation(&e) => Err(ApiError::bad_request(EMAIL_IN_USE)),
        Err(e) => Err(e.into()),
    }
}

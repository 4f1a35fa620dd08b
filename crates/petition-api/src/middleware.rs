use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use axum_extra::headers::{Authorization, HeaderMapExt, authorization::Bearer};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Legacy header carrying the bare token.
pub const X_AUTHORIZATION: &str = "x-authorization";

/// Id of the user whose session token accompanied the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthenticatedUser(pub i64);

fn token_from(headers: &HeaderMap) -> Option<String> {
    if let Some(Authorization(bearer)) = headers.typed_get::<Authorization<Bearer>>() {
        return Some(bearer.token().to_string());
    }

    headers
        .get(X_AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_string)
}

async fn resolve_user(state: &AppState, headers: &HeaderMap) -> ApiResult<Option<i64>> {
    let Some(token) = token_from(headers) else {
        return Ok(None);
    };
    let user_id = state
        .run_db(move |db| db.get_user_id_by_token(&token))
        .await?;
    Ok(user_id)
}

/// Rejects with 401 unless the session token maps to a user.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> ApiResult<Response> {
    let user_id = resolve_user(&state, req.headers())
        .await?
        .ok_or(ApiError::Unauthorized)?;

    req.extensions_mut().insert(AuthenticatedUser(user_id));
    Ok(next.run(req).await)
}

/// Attaches the caller's identity when a valid token is present; never rejects
/// for a missing or unknown token.
pub async fn optional_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> ApiResult<Response> {
    if let Some(user_id) = resolve_user(&state, req.headers()).await? {
        req.extensions_mut().insert(AuthenticatedUser(user_id));
    }
    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use axum::http::header::AUTHORIZATION;

    #[test]
    fn bearer_token_is_preferred() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc123"));
        headers.insert(X_AUTHORIZATION, HeaderValue::from_static("legacy"));
        assert_eq!(token_from(&headers).as_deref(), Some("abc123"));
    }

    #[test]
    fn legacy_header_is_accepted() {
        let mut headers = HeaderMap::new();
        headers.insert(X_AUTHORIZATION, HeaderValue::from_static("legacy"));
        assert_eq!(token_from(&headers).as_deref(), Some("legacy"));
    }

    #[test]
    fn no_token_without_headers() {
        assert_eq!(token_from(&HeaderMap::new()), None);
        let mut headers = HeaderMap::new();
        headers.insert(X_AUTHORIZATION, HeaderValue::from_static("   "));
        assert_eq!(token_from(&headers), None);
    }
}

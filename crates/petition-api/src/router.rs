use axum::{
    Router, middleware,
    routing::{delete, get, patch, post, put},
};

use crate::middleware::{optional_auth, require_auth};
use crate::state::AppState;
use crate::{health, petitions, photos, signatures, users};

/// Normalises a configured root URL to `/segment[/segment...]`, or `""` for
/// mounting at the top level.
pub fn normalize_root_url(root_url: &str) -> String {
    let trimmed = root_url.trim().trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{}", trimmed)
    }
}

/// All API routes mounted under `root_url`, plus `/health` at the top level.
pub fn build_router(state: AppState, root_url: &str) -> Router {
    let auth = middleware::from_fn_with_state(state.clone(), require_auth);
    let maybe_auth = middleware::from_fn_with_state(state.clone(), optional_auth);

    let api = Router::new()
        // Users
        .route("/users/register", post(users::register))
        .route("/users/login", post(users::login))
        .route("/users/logout", post(users::logout).route_layer(auth.clone()))
        .route(
            "/users/{id}",
            get(users::view)
                .route_layer(maybe_auth)
                .merge(patch(users::change).route_layer(auth.clone())),
        )
        .route(
            "/users/{id}/photo",
            get(photos::get_user_photo).merge(
                put(photos::set_user_photo)
                    .delete(photos::delete_user_photo)
                    .route_layer(auth.clone()),
            ),
        )
        // Petitions
        .route(
            "/petitions",
            get(petitions::search).merge(post(petitions::create).route_layer(auth.clone())),
        )
        .route("/petitions/categories", get(petitions::categories))
        .route(
            "/petitions/{id}",
            get(petitions::view).merge(
                patch(petitions::modify)
                    .delete(petitions::delete)
                    .route_layer(auth.clone()),
            ),
        )
        .route(
            "/petitions/{id}/photo",
            get(photos::get_petition_photo)
                .merge(put(photos::set_petition_photo).route_layer(auth.clone())),
        )
        .route(
            "/petitions/{id}/signatures",
            get(signatures::view).merge(
                post(signatures::add)
                    .merge(delete(signatures::remove))
                    .route_layer(auth),
            ),
        );

    let root_url = normalize_root_url(root_url);
    let app = if root_url.is_empty() {
        api
    } else {
        Router::new().nest(&root_url, api)
    };

    app.route("/health", get(health::health_check))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::normalize_root_url;

    #[test]
    fn root_url_is_normalised() {
        assert_eq!(normalize_root_url("/api/v1"), "/api/v1");
        assert_eq!(normalize_root_url("api/v1/"), "/api/v1");
        assert_eq!(normalize_root_url("/"), "");
        assert_eq!(normalize_root_url(""), "");
    }
}

use std::sync::Arc;

use axum::handler::Handler;
use axum::http::{
    header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
    HeaderValue, Method, StatusCode,
};
use axum::routing::{get, patch};
use axum::Router;
use common_auth::AuthGuard;
use common_observability::AuthMetrics;
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::handlers::{
    create_actor, create_movie, delete_actor, delete_movie, health, list_actors, list_movies,
    update_actor, update_movie, Catalog, DELETE_ACTORS, DELETE_MOVIES, GET_ACTORS, GET_MOVIES,
    PATCH_ACTORS, PATCH_MOVIES, POST_ACTORS, POST_MOVIES,
};

#[derive(Clone)]
pub struct AppState {
    pub guard: AuthGuard,
    pub metrics: AuthMetrics,
    pub catalog: Arc<Catalog>,
}

impl AppState {
    pub fn new(guard: AuthGuard, metrics: AuthMetrics) -> Self {
        Self {
            guard,
            metrics,
            catalog: Arc::new(Catalog::default()),
        }
    }
}

async fn render_metrics(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> Result<String, StatusCode> {
    state
        .metrics
        .render()
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

/// Every catalog route sits behind the guard with its own permission.
pub fn build_router(state: AppState) -> Router {
    let guard = state.guard.clone();

    Router::new()
        .route("/healthz", get(health))
        .route("/metrics", get(render_metrics))
        .route(
            "/actors",
            get(list_actors.layer(guard.require(GET_ACTORS)))
                .post(create_actor.layer(guard.require(POST_ACTORS))),
        )
        .route(
            "/actors/:id",
            patch(update_actor.layer(guard.require(PATCH_ACTORS)))
                .delete(delete_actor.layer(guard.require(DELETE_ACTORS))),
        )
        .route(
            "/movies",
            get(list_movies.layer(guard.require(GET_MOVIES)))
                .post(create_movie.layer(guard.require(POST_MOVIES))),
        )
        .route(
            "/movies/:id",
            patch(update_movie.layer(guard.require(PATCH_MOVIES)))
                .delete(delete_movie.layer(guard.require(DELETE_MOVIES))),
        )
        .with_state(state)
}

pub fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(
            allowed_origins
                .iter()
                .filter_map(|origin| origin.parse::<HeaderValue>().ok())
                .collect::<Vec<_>>(),
        ))
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE])
        .allow_headers([ACCEPT, AUTHORIZATION, CONTENT_TYPE])
}

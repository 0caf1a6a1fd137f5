use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use common_auth::AuthContext;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::RwLock;
use tracing::info;

use crate::app::AppState;

pub const GET_ACTORS: &str = "get:actors";
pub const POST_ACTORS: &str = "post:actors";
pub const PATCH_ACTORS: &str = "patch:actors";
pub const DELETE_ACTORS: &str = "delete:actors";
pub const GET_MOVIES: &str = "get:movies";
pub const POST_MOVIES: &str = "post:movies";
pub const PATCH_MOVIES: &str = "patch:movies";
pub const DELETE_MOVIES: &str = "delete:movies";

#[derive(Debug, Clone, Serialize)]
pub struct Actor {
    pub id: u64,
    pub name: String,
    pub age: u32,
    pub gender: String,
}

#[derive(Debug, Deserialize)]
pub struct NewActor {
    pub name: String,
    pub age: u32,
    pub gender: String,
}

/// Partial update; absent fields keep their current value.
#[derive(Debug, Default, Deserialize)]
pub struct ActorChanges {
    pub name: Option<String>,
    pub age: Option<u32>,
    pub gender: Option<String>,
}

impl ActorChanges {
    fn is_empty(&self) -> bool {
        self.name.is_none() && self.age.is_none() && self.gender.is_none()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Movie {
    pub id: u64,
    pub title: String,
    pub release_date: String,
}

#[derive(Debug, Deserialize)]
pub struct NewMovie {
    pub title: String,
    pub release_date: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct MovieChanges {
    pub title: Option<String>,
    pub release_date: Option<String>,
}

impl MovieChanges {
    fn is_empty(&self) -> bool {
        self.title.is_none() && self.release_date.is_none()
    }
}

/// In-memory actors and movies; persistence lives outside this service.
#[derive(Default)]
pub struct Catalog {
    next_actor_id: AtomicU64,
    next_movie_id: AtomicU64,
    actors: RwLock<BTreeMap<u64, Actor>>,
    movies: RwLock<BTreeMap<u64, Movie>>,
}

impl Catalog {
    fn allocate_actor_id(&self) -> u64 {
        self.next_actor_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn allocate_movie_id(&self) -> u64 {
        self.next_movie_id.fetch_add(1, Ordering::Relaxed) + 1
    }
}

fn non_blank(value: Option<String>) -> Result<Option<String>, CatalogError> {
    match value {
        Some(value) if value.trim().is_empty() => {
            Err(CatalogError::Unprocessable("fields must not be blank"))
        }
        Some(value) => Ok(Some(value.trim().to_string())),
        None => Ok(None),
    }
}

#[derive(Debug)]
pub enum CatalogError {
    NotFound(&'static str),
    Unprocessable(&'static str),
}

impl IntoResponse for CatalogError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            CatalogError::NotFound(message) => (StatusCode::NOT_FOUND, message),
            CatalogError::Unprocessable(message) => (StatusCode::UNPROCESSABLE_ENTITY, message),
        };
        let body = json!({
            "success": false,
            "error": status.as_u16(),
            "message": message,
        });
        (status, Json(body)).into_response()
    }
}

pub async fn health() -> &'static str {
    "ok"
}

pub async fn list_actors(State(state): State<AppState>) -> Json<Value> {
    let actors = state.catalog.actors.read().await;
    let actors: Vec<&Actor> = actors.values().collect();
    Json(json!({ "success": true, "actors": actors }))
}

pub async fn create_actor(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(new_actor): Json<NewActor>,
) -> Result<Json<Value>, CatalogError> {
    if new_actor.name.trim().is_empty() || new_actor.gender.trim().is_empty() {
        return Err(CatalogError::Unprocessable("name and gender are required"));
    }

    let actor = Actor {
        id: state.catalog.allocate_actor_id(),
        name: new_actor.name.trim().to_string(),
        age: new_actor.age,
        gender: new_actor.gender.trim().to_string(),
    };
    state
        .catalog
        .actors
        .write()
        .await
        .insert(actor.id, actor.clone());

    info!(actor_id = actor.id, created_by = auth.claims.subject(), "actor created");
    Ok(Json(json!({ "success": true, "actor": actor })))
}

pub async fn update_actor(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(actor_id): Path<u64>,
    Json(changes): Json<ActorChanges>,
) -> Result<Json<Value>, CatalogError> {
    if changes.is_empty() {
        return Err(CatalogError::Unprocessable("request contains no actor fields"));
    }
    let name = non_blank(changes.name)?;
    let gender = non_blank(changes.gender)?;

    let mut actors = state.catalog.actors.write().await;
    let actor = actors
        .get_mut(&actor_id)
        .ok_or(CatalogError::NotFound("actor not found"))?;
    if let Some(name) = name {
        actor.name = name;
    }
    if let Some(age) = changes.age {
        actor.age = age;
    }
    if let Some(gender) = gender {
        actor.gender = gender;
    }
    let actor = actor.clone();
    drop(actors);

    info!(actor_id, updated_by = auth.claims.subject(), "actor updated");
    Ok(Json(json!({ "success": true, "updated": actor_id, "actor": actor })))
}

pub async fn delete_actor(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(actor_id): Path<u64>,
) -> Result<Json<Value>, CatalogError> {
    let removed = state.catalog.actors.write().await.remove(&actor_id);
    if removed.is_none() {
        return Err(CatalogError::NotFound("actor not found"));
    }

    info!(actor_id, deleted_by = auth.claims.subject(), "actor deleted");
    Ok(Json(json!({ "success": true, "delete": actor_id })))
}

pub async fn list_movies(State(state): State<AppState>) -> Json<Value> {
    let movies = state.catalog.movies.read().await;
    let movies: Vec<&Movie> = movies.values().collect();
    Json(json!({ "success": true, "movies": movies }))
}

pub async fn create_movie(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(new_movie): Json<NewMovie>,
) -> Result<Json<Value>, CatalogError> {
    if new_movie.title.trim().is_empty() || new_movie.release_date.trim().is_empty() {
        return Err(CatalogError::Unprocessable("title and release_date are required"));
    }

    let movie = Movie {
        id: state.catalog.allocate_movie_id(),
        title: new_movie.title.trim().to_string(),
        release_date: new_movie.release_date.trim().to_string(),
    };
    state
        .catalog
        .movies
        .write()
        .await
        .insert(movie.id, movie.clone());

    info!(movie_id = movie.id, created_by = auth.claims.subject(), "movie created");
    Ok(Json(json!({ "success": true, "movie": movie })))
}

pub async fn update_movie(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(movie_id): Path<u64>,
    Json(changes): Json<MovieChanges>,
) -> Result<Json<Value>, CatalogError> {
    if changes.is_empty() {
        return Err(CatalogError::Unprocessable("request contains no movie fields"));
    }
    let title = non_blank(changes.title)?;
    let release_date = non_blank(changes.release_date)?;

    let mut movies = state.catalog.movies.write().await;
    let movie = movies
        .get_mut(&movie_id)
        .ok_or(CatalogError::NotFound("movie not found"))?;
    if let Some(title) = title {
        movie.title = title;
    }
    if let Some(release_date) = release_date {
        movie.release_date = release_date;
    }
    let movie = movie.clone();
    drop(movies);

    info!(movie_id, updated_by = auth.claims.subject(), "movie updated");
    Ok(Json(json!({ "success": true, "updated": movie_id, "movie": movie })))
}

pub async fn delete_movie(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(movie_id): Path<u64>,
) -> Result<Json<Value>, CatalogError> {
    let removed = state.catalog.movies.write().await.remove(&movie_id);
    if removed.is_none() {
        return Err(CatalogError::NotFound("movie not found"));
    }

    info!(movie_id, deleted_by = auth.claims.subject(), "movie deleted");
    Ok(Json(json!({ "success": true, "delete": movie_id })))
}

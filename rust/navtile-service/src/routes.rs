use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::{get, post}, Json, Router};
use serde::{Deserialize, Serialize};
use tracing::{info, info_span, warn};

use navtile_core::{PathResult, PolyRef};

use crate::errors::AppError;
use crate::state::{AppState, MeshState};

type Point = [f32; 3];

#[derive(Debug, Serialize)]
pub struct Health {
    pub status: &'static str,
    pub version: &'static str,
    pub loaded: bool,
    pub tiles: usize,
    pub mesh_hash: Option<String>,
    pub loaded_at_unix: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct NearestRequest {
    pub center: Point,
    pub half_extents: Option<Point>,
}

#[derive(Debug, Serialize)]
pub struct PointOnMesh {
    pub poly_ref: PolyRef,
    pub point: Point,
}

#[derive(Debug, Deserialize)]
pub struct PathRequest {
    pub start: Point,
    pub end: Point,
}

#[derive(Debug, Deserialize)]
pub struct FollowRequest {
    pub start: Point,
    pub end: Point,
    pub step: f32,
}

#[derive(Debug, Serialize)]
pub struct PathResponse {
    pub points: Vec<Point>,
    pub partial: bool,
    pub buffer_too_small: bool,
}

impl From<PathResult<'_>> for PathResponse {
    fn from(r: PathResult<'_>) -> Self {
        PathResponse { points: r.points.to_vec(), partial: r.status.partial, buffer_too_small: r.status.buffer_too_small }
    }
}

#[derive(Debug, Serialize)]
pub struct Reloaded {
    pub reloaded: bool,
    pub tiles: usize,
    pub mesh_hash: String,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/nearest", post(nearest))
        .route("/straight_path", post(straight_path))
        .route("/follow_path", post(follow_path))
        .route("/random_point", get(random_point))
        .route("/admin/reload", post(reload))
        .with_state(state)
}

fn finite(name: &str, p: &Point) -> Result<(), AppError> {
    if p.iter().all(|v| v.is_finite()) {
        Ok(())
    } else {
        Err(AppError::BadRequest(format!("{name} must be finite")))
    }
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let current = state.current.load();
    let loaded = current.loaded.as_ref();
    Json(Health {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        loaded: loaded.is_some(),
        tiles: loaded.map(|l| l.search.tile_count()).unwrap_or(0),
        mesh_hash: loaded.map(|l| l.mesh_hash.clone()),
        loaded_at_unix: loaded.map(|l| l.loaded_at_unix),
    })
}

async fn nearest(State(state): State<AppState>, Json(req): Json<NearestRequest>) -> Result<Json<PointOnMesh>, AppError> {
    finite("center", &req.center)?;
    let current = state.current.load();
    let half_extents = req.half_extents.unwrap_or(current.options.half_extents);
    finite("half_extents", &half_extents)?;
    let q = current.require()?.query()?;
    let (poly_ref, point) = q.find_nearest_point(req.center, half_extents)?;
    Ok(Json(PointOnMesh { poly_ref, point }))
}

async fn straight_path(State(state): State<AppState>, Json(req): Json<PathRequest>) -> Result<Json<PathResponse>, AppError> {
    finite("start", &req.start)?;
    finite("end", &req.end)?;
    let current = state.current.load();
    let mut q = current.require()?.query()?;
    let res = PathResponse::from(q.find_straight_path(req.start, req.end)?);
    info!(points = res.points.len(), partial = res.partial, "straight_path done");
    Ok(Json(res))
}

async fn follow_path(State(state): State<AppState>, Json(req): Json<FollowRequest>) -> Result<Json<PathResponse>, AppError> {
    finite("start", &req.start)?;
    finite("end", &req.end)?;
    let current = state.current.load();
    let mut q = current.require()?.query()?;
    let res = PathResponse::from(q.find_follow_path(req.start, req.end, req.step)?);
    info!(points = res.points.len(), partial = res.partial, step = req.step, "follow_path done");
    Ok(Json(res))
}

async fn random_point(State(state): State<AppState>) -> Result<Json<PointOnMesh>, AppError> {
    let current = state.current.load();
    let q = current.require()?.query()?;
    let (poly_ref, point) = q.find_random_point(&mut rand::rng())?;
    Ok(Json(PointOnMesh { poly_ref, point }))
}

async fn reload(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let span = info_span!("reload");
    let _enter = span.enter();

    let current = state.current.load_full();
    let path = current.path.clone().ok_or_else(|| AppError::BadRequest("NAVTILE_MESH is not set".into()))?;
    let next = match MeshState::load(&path, current.options.clone()) {
        Ok(s) => s,
        Err(e) => {
            warn!(error = %format!("{e:#}"), path = ?path, "reload failed, keeping current tile set");
            return Err(AppError::Internal(e));
        }
    };
    let body = Reloaded {
        reloaded: true,
        tiles: next.loaded.as_ref().map(|l| l.search.tile_count()).unwrap_or(0),
        mesh_hash: next.loaded.as_ref().map(|l| l.mesh_hash.clone()).unwrap_or_default(),
    };
    state.current.store(Arc::new(next));
    info!(tiles = body.tiles, hash = %body.mesh_hash, "tile set swapped");
    Ok((StatusCode::OK, Json(body)))
}

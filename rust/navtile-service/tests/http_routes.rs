use axum::{body::Body, http::{Request, StatusCode}, Router};
use http_body_util::BodyExt;
use navtile_core::fixtures::grid_navmesh;
use navtile_core::tileset::save_tileset;
use navtile_core::QueryOptions;
use navtile_service::{build_router, AppState, MeshState};
use serde_json::{json, Value};
use tempfile::NamedTempFile;
use tower::ServiceExt; // for `oneshot`

fn tileset_file(tx: i32, tz: i32) -> NamedTempFile {
    let tmp = NamedTempFile::new().unwrap();
    save_tileset(&grid_navmesh(tx, tz, 3, &[]).unwrap(), tmp.path()).unwrap();
    tmp
}

fn loaded_app(file: &NamedTempFile) -> Router {
    build_router(AppState::new(MeshState::load(file.path(), QueryOptions::default()).unwrap()))
}

async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut req = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(v) => {
            req = req.header("content-type", "application/json");
            Body::from(v.to_string())
        }
        None => Body::empty(),
    };
    let res = app.clone().oneshot(req.body(body).unwrap()).await.unwrap();
    let status = res.status();
    let bytes = res.into_body().collect().await.unwrap().to_bytes();
    let v = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
    (status, v)
}

#[tokio::test]
async fn health_reports_the_loaded_mesh() {
    let file = tileset_file(2, 2);
    let app = loaded_app(&file);
    let (status, v) = call(&app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(v["loaded"], true);
    assert_eq!(v["tiles"], 4);
    assert_eq!(v["mesh_hash"].as_str().unwrap().len(), 64);
    assert!(v.get("version").is_some());
}

#[tokio::test]
async fn queries_answer_over_http() {
    let file = tileset_file(2, 1);
    let app = loaded_app(&file);

    let (status, v) = call(&app, "POST", "/nearest", Some(json!({ "center": [1.5, 1.0, 1.5] }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(v["point"], json!([1.5, 0.0, 1.5]));
    assert!(v["poly_ref"].as_u64().unwrap() > 0);

    let (status, v) = call(&app, "POST", "/straight_path", Some(json!({ "start": [0.5, 0.0, 0.5], "end": [5.5, 0.0, 0.5] }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(v["points"], json!([[0.5, 0.0, 0.5], [5.5, 0.0, 0.5]]));
    assert_eq!(v["partial"], false);

    let (status, v) =
        call(&app, "POST", "/follow_path", Some(json!({ "start": [0.5, 0.0, 0.5], "end": [2.5, 0.0, 0.5], "step": 0.5 }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(v["points"].as_array().unwrap().len(), 5);
    assert_eq!(v["buffer_too_small"], false);

    let (status, v) = call(&app, "GET", "/random_point", None).await;
    assert_eq!(status, StatusCode::OK);
    let p = v["point"].as_array().unwrap();
    assert!((0.0..=6.0).contains(&p[0].as_f64().unwrap()));
}

#[tokio::test]
async fn query_errors_map_to_status_codes() {
    let file = tileset_file(1, 1);
    let app = loaded_app(&file);

    let (status, v) = call(&app, "POST", "/nearest", Some(json!({ "center": [50.0, 0.0, 50.0], "half_extents": [1.0, 1.0, 1.0] }))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(v["error"]["code"], "not_found");

    let (status, v) =
        call(&app, "POST", "/follow_path", Some(json!({ "start": [0.5, 0.0, 0.5], "end": [1.5, 0.0, 0.5], "step": 0.0 }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(v["error"]["code"], "bad_request");
}

#[tokio::test]
async fn unloaded_service_is_unavailable_until_reload() {
    let file = tileset_file(1, 1);
    let app = build_router(AppState::new(MeshState::unloaded(Some(file.path().to_path_buf()), QueryOptions::default())));

    let (status, v) = call(&app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(v["loaded"], false);

    let (status, v) = call(&app, "GET", "/random_point", None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(v["error"]["code"], "unavailable");

    let (status, v) = call(&app, "POST", "/admin/reload", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(v["reloaded"], true);
    assert_eq!(v["tiles"], 1);

    let (status, _) = call(&app, "GET", "/random_point", None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn reload_without_a_path_is_rejected() {
    let app = build_router(AppState::new(MeshState::unloaded(None, QueryOptions::default())));
    let (status, _) = call(&app, "POST", "/admin/reload", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

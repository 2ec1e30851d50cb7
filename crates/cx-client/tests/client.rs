//! Exercises the client against an in-process fake of the chart API.

use std::time::Duration;

use axum::extract::{Multipart, Path, Query};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use cx_client::{ApiClient, ApiError, ClientOptions, Credentials, UploadFile};
use cx_core::{ExportFilter, ExportFormat, JobId, JobStatus};
use serde::Deserialize;
use serde_json::{json, Value};

const TOKEN: &str = "tok-1";

const PNG_1X1: &[u8] = &[
    0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44,
    0x52, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1F,
    0x15, 0xC4, 0x89, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x44, 0x41, 0x54, 0x78, 0xDA, 0x63, 0x64,
    0xF8, 0xCF, 0x50, 0x0F, 0x00, 0x03, 0x86, 0x01, 0x80, 0x5A, 0x34, 0x7D, 0x6B, 0x00, 0x00,
    0x00, 0x00, 0x49, 0x45, 0x4E, 0x44, 0xAE, 0x42, 0x60, 0x82,
];

fn authorized(headers: &HeaderMap) -> bool {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == format!("Bearer {TOKEN}"));
    let cookie = headers
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains(&format!("access_token={TOKEN}")));
    bearer || cookie
}

fn unauthorized() -> (StatusCode, Json<Value>) {
    (StatusCode::UNAUTHORIZED, Json(json!({ "detail": "Not authenticated" })))
}

fn job_json(id: u64, status: &str) -> Value {
    json!({
        "id": id,
        "status": status,
        "original_filename": "chart.png",
        "mime_type": "image/png",
        "created_at": "2024-05-01T10:00:00",
        "result_json": if status == "done" {
            json!({ "panels": [{ "id": "p0", "series": [{ "id": "s0", "points": [[0, 1], [1, 2]] }] }] })
        } else {
            Value::Null
        }
    })
}

async fn register(Json(body): Json<Value>) -> impl IntoResponse {
    let email = body["email"].as_str().unwrap_or_default();
    if !email.contains('@') {
        let detail = json!({ "detail": [
            { "loc": ["body", "email"], "msg": "value is not a valid email address" }
        ] });
        return (StatusCode::UNPROCESSABLE_ENTITY, Json(detail));
    }
    (
        StatusCode::CREATED,
        Json(json!({ "id": 1, "email": email, "is_active": true, "created_at": "2024-05-01T10:00:00" })),
    )
}

async fn login(Json(body): Json<Value>) -> impl IntoResponse {
    if body["password"] != "secret" {
        let detail = Json(json!({ "detail": "Incorrect email or password" }));
        return (StatusCode::UNAUTHORIZED, HeaderMap::new(), detail);
    }
    let mut headers = HeaderMap::new();
    headers.insert(
        header::SET_COOKIE,
        format!("access_token={TOKEN}; Path=/; HttpOnly").parse().unwrap(),
    );
    let token = Json(json!({ "access_token": TOKEN, "token_type": "bearer" }));
    (StatusCode::OK, headers, token)
}

async fn me(headers: HeaderMap) -> impl IntoResponse {
    if !authorized(&headers) {
        return unauthorized();
    }
    (StatusCode::OK, Json(json!({ "id": 1, "email": "a@b.c", "is_active": true })))
}

async fn upload(headers: HeaderMap, mut multipart: Multipart) -> impl IntoResponse {
    if !authorized(&headers) {
        return unauthorized();
    }
    while let Some(field) = multipart.next_field().await.unwrap() {
        if field.name() == Some("file") {
            let name = field.file_name().unwrap_or_default().to_string();
            let mime = field.content_type().unwrap_or_default().to_string();
            let bytes = field.bytes().await.unwrap();
            let mut job = job_json(41, "uploaded");
            job["original_filename"] = json!(name);
            job["mime_type"] = json!(mime);
            job["n_series"] = json!(bytes.len());
            return (StatusCode::CREATED, Json(job));
        }
    }
    (StatusCode::UNPROCESSABLE_ENTITY, Json(json!({ "detail": [{ "msg": "field required" }] })))
}

async fn get_chart(headers: HeaderMap, Path(id): Path<u64>) -> impl IntoResponse {
    if !authorized(&headers) {
        return unauthorized();
    }
    if id == 404 {
        return (StatusCode::NOT_FOUND, Json(json!({ "detail": "Chart not found" })));
    }
    (StatusCode::OK, Json(job_json(id, "done")))
}

async fn delete_chart(headers: HeaderMap, Path(_id): Path<u64>) -> impl IntoResponse {
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED;
    }
    StatusCode::NO_CONTENT
}

#[derive(Deserialize)]
struct Page {
    skip: u32,
    limit: u32,
}

async fn list_charts(headers: HeaderMap, Query(page): Query<Page>) -> impl IntoResponse {
    if !authorized(&headers) {
        return unauthorized();
    }
    let jobs: Vec<Value> = (1..=3u64)
        .skip(page.skip as usize)
        .take(page.limit as usize)
        .map(|id| job_json(id, "processing"))
        .collect();
    (StatusCode::OK, Json(Value::Array(jobs)))
}

async fn artifact(Path((_id, key)): Path<(u64, String)>) -> impl IntoResponse {
    if key == "a/b" {
        return (StatusCode::OK, PNG_1X1.to_vec());
    }
    (StatusCode::NOT_FOUND, b"missing".to_vec())
}

#[derive(Deserialize)]
struct ExportQuery {
    series_id: Option<String>,
}

async fn export_csv(Path(id): Path<u64>, Query(query): Query<ExportQuery>) -> String {
    match query.series_id {
        Some(series) => format!("series_id,x,y\n{series},0,1\n"),
        None => format!("series_id,x,y\ns{id},0,1\n"),
    }
}

async fn spawn_backend() -> String {
    let api = Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/me", get(me))
        .route("/auth/logout", post(|| async { Json(json!({ "ok": true })) }))
        .route("/charts", get(list_charts))
        .route("/charts/upload", post(upload))
        .route("/charts/{id}", get(get_chart).delete(delete_chart))
        .route("/charts/{id}/artifact/{key}", get(artifact))
        .route("/charts/{id}/export.csv", get(export_csv));
    let app = Router::new().nest("/api/v1", api);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("http://{addr}/api/v1")
}

fn client(base_url: String, token: Option<&str>) -> ApiClient {
    ApiClient::new(ClientOptions {
        base_url,
        timeout: Duration::from_secs(5),
        token: token.map(str::to_string),
    })
    .unwrap()
}

fn creds(password: &str) -> Credentials {
    Credentials {
        email: "a@b.c".into(),
        password: password.into(),
    }
}

#[tokio::test]
async fn test_login_enables_authenticated_calls() {
    let api = client(spawn_backend().await, None);

    let err = api.me().await.unwrap_err();
    assert!(err.is_unauthorized());
    assert_eq!(err.to_string(), "Not authenticated");

    let token = api.login(&creds("secret")).await.unwrap();
    assert_eq!(token.access_token, TOKEN);
    assert_eq!(api.me().await.unwrap().email, "a@b.c");

    api.logout().await.unwrap();
    assert_eq!(api.token(), None);
}

#[tokio::test]
async fn test_wrong_password_surfaces_detail() {
    let api = client(spawn_backend().await, None);
    let err = api.login(&creds("nope")).await.unwrap_err();
    assert_eq!(err.to_string(), "Incorrect email or password");
    assert_eq!(api.token(), None);
}

#[tokio::test]
async fn test_register_validation_errors_are_joined() {
    let api = client(spawn_backend().await, None);
    let bad = Credentials {
        email: "not-an-email".into(),
        password: "pw".into(),
    };
    let err = api.register(&bad).await.unwrap_err();
    assert_eq!(err.status(), Some(422));
    assert_eq!(err.to_string(), "value is not a valid email address");

    let user = api.register(&creds("pw")).await.unwrap();
    assert_eq!(user.id, 1);
}

#[tokio::test]
async fn test_upload_sends_multipart_file_field() {
    let api = client(spawn_backend().await, Some(TOKEN));
    let file = UploadFile::from_bytes("my chart.png".into(), PNG_1X1.to_vec()).unwrap();

    let job = api.upload(&file).await.unwrap();
    assert_eq!(job.id.get(), 41);
    assert_eq!(job.status, JobStatus::Uploaded);
    assert_eq!(job.original_filename.as_deref(), Some("my chart.png"));
    assert_eq!(job.mime_type.as_deref(), Some("image/png"));
    assert_eq!(job.n_series, Some(PNG_1X1.len() as u32));
}

#[tokio::test]
async fn test_get_list_delete() {
    let api = client(spawn_backend().await, Some(TOKEN));

    let job = api.get_job(JobId::new(7).unwrap()).await.unwrap();
    assert_eq!(job.status, JobStatus::Done);
    assert!(job.can_export());

    let err = api.get_job(JobId::new(404).unwrap()).await.unwrap_err();
    assert!(matches!(err, ApiError::Http { status: 404, .. }));
    assert_eq!(err.to_string(), "Chart not found");

    let page = api.list_jobs(1, 5).await.unwrap();
    let ids: Vec<u64> = page.iter().map(|j| j.id.get()).collect();
    assert_eq!(ids, vec![2, 3]);

    api.delete_job(JobId::new(3).unwrap()).await.unwrap();
}

#[tokio::test]
async fn test_artifacts_and_export() {
    let api = client(spawn_backend().await, Some(TOKEN));
    let id = JobId::new(5).unwrap();

    let bytes = api.artifact(id, "a/b").await.unwrap();
    assert_eq!(bytes, PNG_1X1);

    let err = api.artifact(id, "converted_plot").await.unwrap_err();
    assert_eq!(err.to_string(), "404 Not Found - missing");

    let csv = api.export(id, ExportFormat::Csv).await.unwrap();
    assert_eq!(csv, "series_id,x,y\ns5,0,1\n");

    let filter = ExportFilter {
        series: Some("p0/s0".into()),
    };
    let csv = api.export_with(id, ExportFormat::Csv, &filter).await.unwrap();
    assert_eq!(csv, "series_id,x,y\np0/s0,0,1\n");
}

#[tokio::test]
async fn test_connection_refused_is_transport_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let api = client(format!("http://{addr}"), None);
    let err = api.get_job(JobId::new(1).unwrap()).await.unwrap_err();
    assert!(matches!(err, ApiError::Reqwest(_)));
}

#[tokio::test]
async fn test_truncated_error_body_falls_back_to_status_line() {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = [0u8; 1024];
        let _ = socket.read(&mut buf).await;
        let head = "HTTP/1.1 500 Internal Server Error\r\ncontent-length: 100\r\n\r\nshort";
        socket.write_all(head.as_bytes()).await.unwrap();
    });

    let api = client(format!("http://{addr}"), None);
    let err = api.get_job(JobId::new(1).unwrap()).await.unwrap_err();
    assert_eq!(err.status(), Some(500));
    assert_eq!(err.to_string(), "500 Internal Server Error");
}

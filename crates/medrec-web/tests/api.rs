//! 路由级测试：内存存储 + 临时上传目录

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use chrono::{Duration, Utc};
use http_body_util::BodyExt;
use medrec_database::MemoryStore;
use medrec_storage::{ContentStore, UploadPolicy};
use medrec_web::{create_app, AccessPolicy, AppState, Identity, TokenService};
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use tower::ServiceExt;

const SECRET: &str = "integration-secret";
const BOUNDARY: &str = "medrec-test-boundary";

struct TestApp {
    app: Router,
    _dir: tempfile::TempDir,
    upload_dir: std::path::PathBuf,
}

async fn test_app_with(configure: impl FnOnce(AppState) -> AppState) -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let upload_dir = dir.path().join("uploads");
    let content = ContentStore::new(&upload_dir);
    content.init().await.unwrap();

    let state = AppState::new(
        Arc::new(MemoryStore::new()),
        content,
        TokenService::new(SECRET, Duration::hours(1)),
        UploadPolicy::default(),
    );

    TestApp {
        app: create_app(configure(state)),
        _dir: dir,
        upload_dir,
    }
}

async fn test_app() -> TestApp {
    test_app_with(|state| state).await
}

impl TestApp {
    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, body)
    }

    async fn send_json(&self, method: &str, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        self.send(builder.body(Body::from(body.to_string())).unwrap()).await
    }

    async fn send_empty(&self, method: &str, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        self.send(builder.body(Body::empty()).unwrap()).await
    }

    async fn send_multipart(
        &self,
        method: &str,
        uri: &str,
        token: &str,
        body: Vec<u8>,
    ) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .body(Body::from(body))
            .unwrap();
        self.send(request).await
    }

    async fn create_patient(&self, uid: &str) -> Value {
        let (status, body) = self
            .send_json(
                "POST",
                "/api/patients",
                None,
                json!({ "uid": uid, "name": "Alice", "age": 30, "gender": "Female" }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        body
    }

    async fn token_for(&self, uid: &str) -> String {
        let (status, body) = self
            .send_json("POST", "/api/patients/verify-uid", None, json!({ "uid": uid }))
            .await;
        assert_eq!(status, StatusCode::OK);
        body["token"].as_str().unwrap().to_string()
    }

    async fn uploaded_files(&self) -> usize {
        let mut entries = tokio::fs::read_dir(&self.upload_dir).await.unwrap();
        let mut count = 0;
        while entries.next_entry().await.unwrap().is_some() {
            count += 1;
        }
        count
    }
}

fn multipart_body(uid: Option<&str>, file: Option<(&str, &str, &[u8])>) -> Vec<u8> {
    let mut body = Vec::new();
    if let Some(uid) = uid {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"uid\"\r\n\r\n{}\r\n",
                BOUNDARY, uid
            )
            .as_bytes(),
        );
    }
    if let Some((file_name, content_type, data)) = file {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"report\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
                BOUNDARY, file_name, content_type
            )
            .as_bytes(),
        );
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    body
}

#[tokio::test]
async fn test_patient_round_trip() {
    let app = test_app().await;
    let created = app.create_patient("P1").await;

    let (status, fetched) = app.send_empty("GET", "/api/patients/P1", None).await;
    assert_eq!(status, StatusCode::OK);
    for field in ["_id", "uid", "name", "age", "gender"] {
        assert_eq!(fetched[field], created[field], "field {}", field);
    }
    assert_eq!(fetched["name"], "Alice");
    assert_eq!(fetched["age"], 30);
}

#[tokio::test]
async fn test_patient_update_is_sparse() {
    let app = test_app().await;
    app.create_patient("P1").await;

    let (status, updated) = app
        .send_json(
            "PUT",
            "/api/patients/P1",
            None,
            json!({ "otherFields": { "phone": "555-0100" } }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["otherFields"]["phone"], "555-0100");
    assert_eq!(updated["name"], "Alice");
    assert_eq!(updated["gender"], "Female");

    let (status, body) = app
        .send_json("PUT", "/api/patients/nobody", None, json!({ "name": "X" }))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "Patient not found");
}

#[tokio::test]
async fn test_patient_create_validation_and_conflict() {
    let app = test_app().await;

    let (status, _) = app
        .send_json("POST", "/api/patients", None, json!({ "name": "No Uid" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    app.create_patient("P1").await;
    let (status, _) = app
        .send_json("POST", "/api/patients", None, json!({ "uid": "P1", "name": "Again" }))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_patient_delete_by_internal_id() {
    let app = test_app().await;
    let created = app.create_patient("P1").await;
    let id = created["_id"].as_str().unwrap();

    let (status, _) = app.send_empty("DELETE", "/api/patients/P1", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = app
        .send_empty("DELETE", &format!("/api/patients/{}", id), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Patient deleted successfully");

    let (status, _) = app.send_empty("GET", "/api/patients/P1", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_verify_unknown_uid_issues_no_token() {
    let app = test_app().await;

    let (status, body) = app
        .send_json("POST", "/api/patients/verify-uid", None, json!({ "uid": "ghost" }))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "UID not found");
    assert!(body.get("token").is_none());
}

#[tokio::test]
async fn test_verify_uid_returns_token_role_and_uid() {
    let app = test_app().await;
    let created = app.create_patient("P1").await;

    let (status, body) = app
        .send_json("POST", "/api/patients/verify-uid", None, json!({ "uid": "P1" }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["uid"], "P1");
    assert_eq!(body["role"], "patient");

    let identity = TokenService::new(SECRET, Duration::hours(1))
        .verify(body["token"].as_str().unwrap())
        .unwrap();
    assert_eq!(identity.id, created["_id"].as_str().unwrap());
}

#[tokio::test]
async fn test_protected_routes_require_bearer_token() {
    let app = test_app().await;
    app.create_patient("P1").await;

    let (status, body) = app.send_empty("GET", "/api/reports/by-uid/P1", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Access token is missing or invalid");

    let (status, _) = app
        .send_empty("GET", "/api/reports/by-uid/P1", Some("garbage"))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_expired_token_is_rejected() {
    let app = test_app().await;
    let created = app.create_patient("P1").await;

    let expired = TokenService::new(SECRET, Duration::hours(1))
        .issue_at(
            &Identity {
                id: created["_id"].as_str().unwrap().to_string(),
                role: "patient".to_string(),
            },
            Utc::now() - Duration::hours(2),
        )
        .unwrap();

    let (status, body) = app
        .send_empty("GET", "/api/reports/by-uid/P1", Some(&expired.token))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["message"], "Token has expired");
}

#[tokio::test]
async fn test_executable_upload_is_rejected() {
    let app = test_app().await;
    app.create_patient("P1").await;
    let token = app.token_for("P1").await;

    for mime in ["application/pdf", "application/x-msdownload", "image/png"] {
        let (status, _) = app
            .send_multipart(
                "POST",
                "/api/reports/by-uid",
                &token,
                multipart_body(Some("P1"), Some(("payload.exe", mime, b"MZ"))),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "mime {}", mime);
    }
    assert_eq!(app.uploaded_files().await, 0);
}

#[tokio::test]
async fn test_upload_edge_cases() {
    let app = test_app().await;
    app.create_patient("P1").await;
    let token = app.token_for("P1").await;

    let (status, body) = app
        .send_multipart("POST", "/api/reports/by-uid", &token, multipart_body(Some("P1"), None))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "No file uploaded");

    let (status, _) = app
        .send_multipart(
            "POST",
            "/api/reports/by-uid",
            &token,
            multipart_body(Some("nobody"), Some(("x.pdf", "application/pdf", b"%PDF"))),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let oversized = vec![0u8; 10 * 1024 * 1024 + 1];
    let (status, _) = app
        .send_multipart(
            "POST",
            "/api/reports/by-uid",
            &token,
            multipart_body(Some("P1"), Some(("big.pdf", "application/pdf", &oversized))),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    assert_eq!(app.uploaded_files().await, 0);
}

#[tokio::test]
async fn test_upload_creates_single_linked_report() {
    let app = test_app().await;
    let patient = app.create_patient("P1").await;
    let token = app.token_for("P1").await;

    let (status, report) = app
        .send_multipart(
            "POST",
            "/api/reports/by-uid",
            &token,
            multipart_body(Some("P1"), Some(("scan.png", "image/png", b"\x89PNG"))),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(report["patientId"], patient["_id"]);
    assert_eq!(report["fileName"], "scan.png");
    assert_eq!(report["fileType"], "image/png");
    assert!(Path::new(report["filePath"].as_str().unwrap()).exists());

    let (status, reports) = app.send_empty("GET", "/api/reports/by-uid/P1", Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reports.as_array().map(Vec::len), Some(1));
    assert_eq!(app.uploaded_files().await, 1);
}

#[tokio::test]
async fn test_update_without_file_keeps_metadata() {
    let app = test_app().await;
    app.create_patient("P1").await;
    let token = app.token_for("P1").await;

    let (_, report) = app
        .send_multipart(
            "POST",
            "/api/reports/by-uid",
            &token,
            multipart_body(Some("P1"), Some(("x.pdf", "application/pdf", b"%PDF"))),
        )
        .await;
    let uri = format!("/api/reports/by-uid/P1/{}", report["_id"].as_str().unwrap());

    let (status, unchanged) = app
        .send_multipart("PUT", &uri, &token, multipart_body(None, None))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(unchanged["filePath"], report["filePath"]);
    assert_eq!(unchanged["fileName"], "x.pdf");
    assert_eq!(unchanged["fileType"], "application/pdf");

    let (status, replaced) = app
        .send_multipart(
            "PUT",
            &uri,
            &token,
            multipart_body(None, Some(("y.jpg", "image/jpeg", b"\xff\xd8"))),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(replaced["fileName"], "y.jpg");
    assert_eq!(app.uploaded_files().await, 1);
}

#[tokio::test]
async fn test_update_without_multipart_body() {
    let app = test_app().await;
    app.create_patient("P1").await;
    let token = app.token_for("P1").await;

    let (_, report) = app
        .send_multipart(
            "POST",
            "/api/reports/by-uid",
            &token,
            multipart_body(Some("P1"), Some(("x.pdf", "application/pdf", b"%PDF"))),
        )
        .await;
    let uri = format!("/api/reports/by-uid/P1/{}", report["_id"].as_str().unwrap());

    let (status, unchanged) = app.send_empty("PUT", &uri, Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(unchanged, report);

    let (status, body) = app
        .send_empty("PUT", "/api/reports/by-uid/nobody/x", Some(&token))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "Patient not found");

    // 声明为 multipart 却缺少边界仍是 400
    let request = Request::builder()
        .method("PUT")
        .uri(&uri)
        .header(header::CONTENT_TYPE, "multipart/form-data")
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap();
    let (status, _) = app.send(request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_upload_records_mime_without_parameters() {
    let app = test_app().await;
    app.create_patient("P1").await;
    let token = app.token_for("P1").await;

    let (status, report) = app
        .send_multipart(
            "POST",
            "/api/reports/by-uid",
            &token,
            multipart_body(
                Some("P1"),
                Some(("x.pdf", "Application/PDF; name=x.pdf", b"%PDF")),
            ),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(report["fileType"], "application/pdf");
}

#[tokio::test]
async fn test_download_report_file() {
    let app = test_app().await;
    app.create_patient("P1").await;
    let token = app.token_for("P1").await;

    let (_, report) = app
        .send_multipart(
            "POST",
            "/api/reports/by-uid",
            &token,
            multipart_body(Some("P1"), Some(("x.pdf", "application/pdf", b"%PDF-1.7"))),
        )
        .await;

    let request = Request::builder()
        .uri(format!(
            "/api/reports/by-uid/P1/{}/file",
            report["_id"].as_str().unwrap()
        ))
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap();
    let response = app.app.clone().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "application/pdf");
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&bytes[..], b"%PDF-1.7");
}

#[tokio::test]
async fn test_report_lifecycle_scenario() {
    let app = test_app().await;

    let (status, _) = app
        .send_json(
            "POST",
            "/api/patients",
            None,
            json!({ "uid": "P1", "name": "Alice", "age": 30, "gender": "Female" }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let token = app.token_for("P1").await;

    let file = vec![b'a'; 1024];
    let (status, report) = app
        .send_multipart(
            "POST",
            "/api/reports/by-uid",
            &token,
            multipart_body(Some("P1"), Some(("x.pdf", "application/pdf", &file))),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(report["fileName"], "x.pdf");
    let file_path = report["filePath"].as_str().unwrap().to_string();

    let (status, reports) = app.send_empty("GET", "/api/reports/by-uid/P1", Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reports.as_array().map(Vec::len), Some(1));

    let (status, body) = app
        .send_empty(
            "DELETE",
            &format!("/api/reports/by-uid/P1/{}", report["_id"].as_str().unwrap()),
            Some(&token),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Report deleted successfully");
    assert!(!Path::new(&file_path).exists());

    // 空列表按约定返回 404
    let (status, body) = app.send_empty("GET", "/api/reports/by-uid/P1", Some(&token)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "No reports found");
}

#[tokio::test]
async fn test_prescription_lifecycle() {
    let app = test_app().await;
    app.create_patient("P1").await;
    let token = app.token_for("P1").await;

    let (status, _) = app
        .send_empty("GET", "/api/prescriptions/by-uid/P1", Some(&token))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, prescription) = app
        .send_json(
            "POST",
            "/api/prescriptions/by-uid",
            Some(&token),
            json!({ "uid": "P1", "medication": "Amoxicillin", "date": "2024-05-01" }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(prescription["uid"], "P1");
    let uri = format!(
        "/api/prescriptions/by-uid/P1/{}",
        prescription["_id"].as_str().unwrap()
    );

    let (status, updated) = app
        .send_json("PUT", &uri, Some(&token), json!({ "date": "2024-06-01" }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["medication"], "Amoxicillin");
    assert_eq!(updated["date"], "2024-06-01");

    let (status, list) = app
        .send_empty("GET", "/api/prescriptions/by-uid/P1", Some(&token))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list.as_array().map(Vec::len), Some(1));

    let (status, _) = app.send_empty("DELETE", &uri, Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = app.send_empty("DELETE", &uri, Some(&token)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_role_policy_is_enforced_when_configured() {
    let app = test_app_with(|state| state.with_access_policy(AccessPolicy::admin_only())).await;
    app.create_patient("P1").await;
    let token = app.token_for("P1").await;

    let (status, body) = app.send_empty("GET", "/api/reports/by-uid/P1", Some(&token)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["message"], "Insufficient role");

    let (status, _) = app
        .send_json("PUT", "/api/patients/P1", None, json!({ "role": "admin" }))
        .await;
    assert_eq!(status, StatusCode::OK);
    let admin_token = app.token_for("P1").await;

    let (status, _) = app
        .send_empty("GET", "/api/reports/by-uid/P1", Some(&admin_token))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_patient_routes_can_be_protected() {
    let app = test_app_with(|state| state.with_protected_patient_routes(true)).await;

    let (status, _) = app
        .send_json("POST", "/api/patients", None, json!({ "uid": "P1", "name": "Alice" }))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // verify-uid 始终公开
    let (status, _) = app
        .send_json("POST", "/api/patients/verify-uid", None, json!({ "uid": "P1" }))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_health() {
    let app = test_app().await;
    let (status, body) = app.send_empty("GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}
